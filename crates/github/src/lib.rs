pub mod actions;
pub mod comments;
pub mod context;
pub mod deployments;
pub mod summary;

use anyhow::{Context, Result};
use octocrab::Octocrab;

use crate::actions::ActionsEnv;

/// GitHub REST client scoped to the repository running the workflow.
#[derive(Clone)]
pub struct GitHub {
    pub client: Octocrab,
    pub owner: String,
    pub repo: String,
}

impl GitHub {
    pub fn new(token: Option<&str>, env: &ActionsEnv) -> Result<Self> {
        let mut builder = Octocrab::builder();
        if let Some(token) = token {
            builder = builder.personal_token(token.to_string());
        }
        if let Some(api_url) = &env.api_url {
            builder = builder
                .base_uri(api_url.as_str())
                .with_context(|| format!("Invalid GitHub API URL {api_url}"))?;
        }
        let client = builder.build().context("Failed to create GitHub client")?;
        Ok(Self {
            client,
            owner: env.repository_owner.clone(),
            repo: env.repository_name.clone(),
        })
    }
}
