use std::fmt;

use serde::{Deserialize, Serialize};

/// A Cloudflare Pages project.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct Project {
    pub name: String,
    pub production_branch: String,
}

/// Snapshot of a Cloudflare Pages deployment. The platform owns the real state;
/// the first read after a deploy may still be in progress.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct Deployment {
    pub id: String,
    pub url: String,
    pub environment: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub stages: Vec<Stage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_trigger: Option<DeploymentTrigger>,
}

impl Deployment {
    pub fn stage(&self, name: &str) -> Option<&Stage> { self.stages.iter().find(|s| s.name == name) }

    pub fn commit_hash(&self) -> Option<&str> {
        self.deployment_trigger.as_ref().and_then(|t| t.metadata.commit_hash.as_deref())
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct Stage {
    pub name: String,
    pub status: String,
}

#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct DeploymentTrigger {
    #[serde(default)]
    pub metadata: DeploymentTriggerMetadata,
}

#[derive(Debug, Clone, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct DeploymentTriggerMetadata {
    #[serde(default)]
    pub commit_hash: Option<String>,
}

/// Status shown in the pull request comment.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum CommentStatus {
    Building,
    Success,
    Fail,
}

impl CommentStatus {
    pub fn icon(&self) -> &'static str {
        match self {
            Self::Building => "🔨",
            Self::Success => "✅",
            Self::Fail => "❌",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Building => "Building",
            Self::Success => "Ready",
            Self::Fail => "Failed",
        }
    }
}

impl fmt::Display for CommentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.icon(), self.label())
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
