use anyhow::Result;
use pages_action_core::{models::Deployment, util::short_sha};

use crate::actions::ActionsEnv;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentState {
    Success,
    Failure,
    InProgress,
}

impl DeploymentState {
    /// Derived from the `deploy` stage; anything but success or failure is still running.
    pub fn from_deployment(deployment: &Deployment) -> Self {
        match deployment.stage("deploy").map(|s| s.status.as_str()) {
            Some("success") => Self::Success,
            Some("failure") => Self::Failure,
            _ => Self::InProgress,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::Success => "✅ Deployment successful!",
            Self::Failure => "🚫 Deployment failed",
            Self::InProgress => "⚡️ Deployment in progress...",
        }
    }
}

pub fn render_summary(deployment: &Deployment, alias_url: &str, sha: &str) -> String {
    format!(
        "# Deploying with Cloudflare Pages

| Name                    | Result |
| ----------------------- | - |
| **Last commit:**        | `{}` |
| **Status**:             | {} |
| **Preview URL**:        | {} |
| **Branch Preview URL**: | {} |
",
        short_sha(sha, 8),
        DeploymentState::from_deployment(deployment).message(),
        deployment.url,
        alias_url
    )
}

/// Overwrite the job summary with the current deployment state.
pub fn write_job_summary(
    env: &ActionsEnv,
    deployment: &Deployment,
    alias_url: &str,
    sha: &str,
) -> Result<()> {
    env.write_summary(&render_summary(deployment, alias_url, sha))
}
