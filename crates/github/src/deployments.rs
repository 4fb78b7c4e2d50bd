use anyhow::{Context, Result};
use http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::GitHub;

const DESCRIPTION: &str = "Cloudflare Pages";

/// A GitHub deployment created for this run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GithubDeploymentRecord {
    pub id: u64,
    pub environment: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewDeployment {
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub auto_merge: bool,
    pub description: &'static str,
    pub required_contexts: Vec<String>,
    pub environment: String,
    pub production_environment: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewDeploymentStatus {
    pub state: &'static str,
    pub environment: String,
    pub environment_url: String,
    pub production_environment: bool,
    pub log_url: String,
    pub description: &'static str,
    pub auto_inactive: bool,
}

#[allow(async_fn_in_trait)]
pub trait DeploymentRecords {
    /// Returns `None` unless GitHub answered 201 Created.
    async fn create_deployment(&self, request: &NewDeployment) -> Result<Option<GithubDeploymentRecord>>;

    async fn create_deployment_status(
        &self,
        deployment_id: u64,
        request: &NewDeploymentStatus,
    ) -> Result<()>;
}

impl DeploymentRecords for GitHub {
    async fn create_deployment(&self, request: &NewDeployment) -> Result<Option<GithubDeploymentRecord>> {
        let route = format!("/repos/{}/{}/deployments", self.owner, self.repo);
        let response =
            self.client._post(route, Some(request)).await.context("Failed to create deployment")?;
        let status = response.status();
        if status != StatusCode::CREATED {
            tracing::warn!("GitHub deployment for {} not created (status {})", request.git_ref, status);
            return Ok(None);
        }
        let body = self.client.body_to_string(response).await?;
        let record = serde_json::from_str(&body).context("Failed to parse deployment response")?;
        Ok(Some(record))
    }

    async fn create_deployment_status(
        &self,
        deployment_id: u64,
        request: &NewDeploymentStatus,
    ) -> Result<()> {
        let route =
            format!("/repos/{}/{}/deployments/{}/statuses", self.owner, self.repo, deployment_id);
        let _: serde_json::Value = self
            .client
            .post(route, Some(request))
            .await
            .with_context(|| format!("Failed to create status for deployment {deployment_id}"))?;
        Ok(())
    }
}

/// Create a deployment record for `sha` in `environment`.
pub async fn create_record<D>(
    records: &D,
    sha: &str,
    environment: &str,
    is_production: bool,
) -> Result<Option<GithubDeploymentRecord>>
where
    D: DeploymentRecords,
{
    let request = NewDeployment {
        git_ref: sha.to_string(),
        auto_merge: false,
        description: DESCRIPTION,
        required_contexts: vec![],
        environment: environment.to_string(),
        production_environment: is_production,
    };
    let record = records.create_deployment(&request).await?;
    if let Some(record) = &record {
        tracing::info!("Created GitHub deployment {} ({})", record.id, record.environment);
    }
    Ok(record)
}

/// Where a Cloudflare Pages deployment can be inspected.
pub fn dashboard_log_url(account_id: &str, project_name: &str, cf_deployment_id: &str) -> String {
    format!("https://dash.cloudflare.com/{account_id}/pages/view/{project_name}/{cf_deployment_id}")
}

/// Arguments for [`attach_status`].
pub struct StatusUpdate<'a> {
    pub environment_url: &'a str,
    pub cf_deployment_id: &'a str,
    pub account_id: &'a str,
    pub project_name: &'a str,
    pub is_production: bool,
}

/// Mark the record as successfully deployed.
///
/// The state is always `success`: the record tracks that a deployment was made,
/// not the outcome of the Pages build.
pub async fn attach_status<D>(
    records: &D,
    record: &GithubDeploymentRecord,
    update: &StatusUpdate<'_>,
) -> Result<()>
where
    D: DeploymentRecords,
{
    let request = NewDeploymentStatus {
        state: "success",
        environment: record.environment.clone(),
        environment_url: update.environment_url.to_string(),
        production_environment: update.is_production,
        log_url: dashboard_log_url(update.account_id, update.project_name, update.cf_deployment_id),
        description: DESCRIPTION,
        auto_inactive: false,
    };
    records.create_deployment_status(record.id, &request).await
}
