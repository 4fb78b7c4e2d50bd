use std::process::Stdio;

use tokio::process::Command;

use crate::{Error, Result};

/// A single `wrangler pages deploy` invocation.
pub struct WranglerDeploy<'a> {
    pub version: &'a str,
    pub directory: &'a str,
    pub project_name: &'a str,
    pub branch: &'a str,
    pub api_token: &'a str,
    pub account_id: &'a str,
    /// Relative to the current directory; empty means the current directory.
    pub working_directory: &'a str,
}

impl WranglerDeploy<'_> {
    pub fn command(&self) -> Command {
        let mut command = Command::new("npx");
        command
            .arg(format!("wrangler@{}", self.version))
            .args(["pages", "deploy", self.directory])
            .arg(format!("--project-name={}", self.project_name))
            .arg(format!("--branch={}", self.branch))
            .env("CLOUDFLARE_API_TOKEN", self.api_token)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        if !self.account_id.is_empty() {
            command.env("CLOUDFLARE_ACCOUNT_ID", self.account_id);
        }
        if !self.working_directory.is_empty() {
            command.current_dir(self.working_directory);
        }
        command
    }

    pub async fn run(&self) -> Result<()> {
        tracing::info!(
            "Deploying {} to Cloudflare Pages project {} (branch {})",
            self.directory,
            self.project_name,
            self.branch
        );
        wait(self.command()).await
    }
}

async fn wait(mut command: Command) -> Result<()> {
    let status = command.status().await?;
    if !status.success() {
        return Err(Error::Wrangler(status));
    }
    Ok(())
}
