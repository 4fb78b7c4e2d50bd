pub mod wrangler;

use std::process::ExitStatus;

use pages_action_core::{
    config::RunConfig,
    models::{Deployment, Project},
};
use reqwest::StatusCode;
use serde::{Deserialize, de::DeserializeOwned};

use crate::wrangler::WranglerDeploy;

pub const API_BASE_URL: &str = "https://api.cloudflare.com/client/v4";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to get Cloudflare Pages {resource}, API returned non-200: {status}: {body}")]
    Api { resource: &'static str, status: StatusCode, body: String },
    #[error(
        "Failed to get Cloudflare Pages project, project does not exist. Check the project name or create it!"
    )]
    ProjectNotFound,
    #[error("Failed to get Cloudflare Pages deployment for project \"{0}\"")]
    NoDeployment(String),
    #[error("wrangler pages deploy failed: {0}")]
    Wrangler(ExitStatus),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Operations the deploy sequence needs from Cloudflare Pages.
#[allow(async_fn_in_trait)]
pub trait PagesApi {
    async fn get_project(&self) -> Result<Project>;

    /// Run `wrangler pages deploy` for `branch`, then read back the latest deployment.
    /// The record returned may not reflect the new deployment yet.
    async fn deploy(&self, branch: &str) -> Result<Deployment>;

    async fn get_latest_deployment(&self) -> Result<Deployment>;
}

#[derive(Deserialize)]
struct ApiResponse<T> {
    result: Option<T>,
}

#[derive(Clone)]
pub struct Cloudflare {
    client: reqwest::Client,
    base_url: String,
    api_token: String,
    account_id: String,
    project_name: String,
    directory: String,
    working_directory: String,
    wrangler_version: String,
}

impl Cloudflare {
    pub fn new(config: &RunConfig) -> Result<Self> { Self::with_base_url(config, API_BASE_URL) }

    pub fn with_base_url(config: &RunConfig, base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("pages-action/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
            account_id: config.account_id.clone(),
            project_name: config.project_name.clone(),
            directory: config.directory.clone(),
            working_directory: config.working_directory.clone(),
            wrangler_version: config.wrangler_version().to_string(),
        })
    }

    fn project_url(&self) -> String {
        format!("{}/accounts/{}/pages/projects/{}", self.base_url, self.account_id, self.project_name)
    }

    async fn get<T: DeserializeOwned>(&self, resource: &'static str, url: &str) -> Result<Option<T>> {
        let response = self.client.get(url).bearer_auth(&self.api_token).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("Cloudflare API returned non-200: {}", status);
            tracing::error!("API returned: {}", body);
            return Err(Error::Api { resource, status, body });
        }
        let ApiResponse { result } = response.json::<ApiResponse<T>>().await?;
        Ok(result)
    }
}

impl PagesApi for Cloudflare {
    async fn get_project(&self) -> Result<Project> {
        self.get::<Project>("project", &self.project_url()).await?.ok_or(Error::ProjectNotFound)
    }

    async fn deploy(&self, branch: &str) -> Result<Deployment> {
        WranglerDeploy {
            version: &self.wrangler_version,
            directory: &self.directory,
            project_name: &self.project_name,
            branch,
            api_token: &self.api_token,
            account_id: &self.account_id,
            working_directory: &self.working_directory,
        }
        .run()
        .await?;
        self.get_latest_deployment().await
    }

    async fn get_latest_deployment(&self) -> Result<Deployment> {
        let url = format!("{}/deployments", self.project_url());
        let deployments = self.get::<Vec<Deployment>>("deployment", &url).await?.unwrap_or_default();
        deployments.into_iter().next().ok_or_else(|| Error::NoDeployment(self.project_name.clone()))
    }
}

/// Branch name passed to wrangler.
///
/// An explicit override always wins. Preview deployments are prefixed with the
/// head repository owner so branches from different forks don't collide.
pub fn deploy_branch_name(
    branch_override: Option<&str>,
    is_production: bool,
    branch_owner: &str,
    branch: &str,
) -> String {
    match branch_override {
        Some(branch) => branch.to_string(),
        None if is_production => branch.to_string(),
        None => format!("{branch_owner}-{branch}"),
    }
}
