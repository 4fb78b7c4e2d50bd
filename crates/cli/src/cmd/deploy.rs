use std::time::Duration;

use anyhow::Result;
use argp::FromArgs;
use pages_action_cloudflare::{Cloudflare, PagesApi, deploy_branch_name};
use pages_action_core::{
    config::{ConfigError, RunConfig},
    models::{CommentStatus, Deployment},
    util::short_sha,
};
use pages_action_github::{
    GitHub,
    actions::ActionsEnv,
    comments::{CommentRow, CommentTarget, IssueComments, reconcile},
    context::{PullRequestLookup, RunContext, resolve_context},
    deployments::{DeploymentRecords, StatusUpdate, attach_status, create_record},
    summary::write_job_summary,
};
use time::OffsetDateTime;
use tokio::time::sleep;

/// Wait between triggering a deployment and reading it back. Cloudflare's deployment
/// list is eventually consistent with the wrangler upload; this is a fixed delay, not a poll.
pub const CONSISTENCY_DELAY: Duration = Duration::from_secs(5);

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// Deploy with wrangler and report the deployment to GitHub (reads INPUT_* and GITHUB_*).
#[argp(subcommand, name = "deploy")]
pub struct Args {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployOutputs {
    pub id: String,
    pub url: String,
    pub environment: String,
    pub alias: String,
}

impl DeployOutputs {
    pub fn pairs(&self) -> [(&'static str, &str); 4] {
        [
            ("id", &self.id),
            ("url", &self.url),
            ("environment", &self.environment),
            ("alias", &self.alias),
        ]
    }
}

pub async fn run(_args: Args) -> Result<()> {
    start(RunConfig::from_env, ActionsEnv::from_env, |config, env| {
        Ok((Cloudflare::new(config)?, GitHub::new(config.github_token(), env)?))
    })
    .await?;
    Ok(())
}

/// Load the configuration, then the Actions environment, then connect and deploy.
/// Configuration errors always come first and nothing is contacted if loading fails.
pub async fn start<L, E, C, P, G>(load: L, load_env: E, connect: C) -> Result<DeployOutputs>
where
    L: FnOnce() -> Result<RunConfig, ConfigError>,
    E: FnOnce() -> Result<ActionsEnv>,
    C: FnOnce(&RunConfig, &ActionsEnv) -> Result<(P, G)>,
    P: PagesApi,
    G: IssueComments + PullRequestLookup + DeploymentRecords,
{
    let config = load()?;
    let env = load_env()?;
    let (pages, github) = connect(&config, &env)?;
    execute(&config, &env, &pages, &github).await
}

/// Run the deployment. On failure, a `fail` row is posted on the pull request
/// (best-effort) before the original error is returned.
pub async fn execute<P, G>(
    config: &RunConfig,
    env: &ActionsEnv,
    pages: &P,
    github: &G,
) -> Result<DeployOutputs>
where
    P: PagesApi,
    G: IssueComments + PullRequestLookup + DeploymentRecords,
{
    let mut resolved = None;
    match deploy(config, env, pages, github, &mut resolved).await {
        Ok(outputs) => Ok(outputs),
        Err(err) => {
            tracing::error!("Deployment failed: {:#}", err);
            let context = resolved.unwrap_or_else(|| RunContext::fallback(env));
            if let Err(e) =
                post_comment(config, env, github, &context, CommentStatus::Fail, String::new()).await
            {
                tracing::warn!("Failed to post failure comment: {:?}", e);
            }
            Err(err)
        }
    }
}

async fn deploy<P, G>(
    config: &RunConfig,
    env: &ActionsEnv,
    pages: &P,
    github: &G,
    resolved: &mut Option<RunContext>,
) -> Result<DeployOutputs>
where
    P: PagesApi,
    G: IssueComments + PullRequestLookup + DeploymentRecords,
{
    let context: &RunContext = resolved.insert(resolve_context(config, env, github).await?);

    if let Err(e) =
        post_comment(config, env, github, context, CommentStatus::Building, String::new()).await
    {
        tracing::warn!("Failed to post building comment: {:?}", e);
    }

    let project = pages.get_project().await?;
    let is_production = context.branch == project.production_branch
        && !context.is_pull_request
        && !context.is_workflow_run;
    tracing::info!(
        "Deploying {} from branch {} ({})",
        project.name,
        context.branch,
        if is_production { "production" } else { "preview" }
    );

    let record = match config.deployment_name() {
        Some(name) if config.comments_enabled() => {
            create_record(github, &context.sha, name, is_production).await?
        }
        Some(name) => {
            tracing::warn!("Skipping GitHub deployment {}: no gitHubToken configured", name);
            None
        }
        None => None,
    };

    let branch = deploy_branch_name(
        config.branch_override(),
        is_production,
        &context.branch_owner,
        &context.branch,
    );
    let deployment = pages.deploy(&branch).await?;
    write_job_summary(env, &deployment, &deployment.url, &context.sha)?;

    if let Some(record) = &record {
        attach_status(github, record, &StatusUpdate {
            environment_url: &deployment.url,
            cf_deployment_id: &deployment.id,
            account_id: &config.account_id,
            project_name: &config.project_name,
            is_production,
        })
        .await?;
    }

    sleep(CONSISTENCY_DELAY).await;
    let deployment = pages.get_latest_deployment().await?;
    let alias = resolve_alias(&deployment, is_production);

    post_comment(
        config,
        env,
        github,
        context,
        CommentStatus::Success,
        format!("[Visit Preview]({alias})"),
    )
    .await?;

    let outputs = DeployOutputs {
        id: deployment.id.clone(),
        url: deployment.url.clone(),
        environment: deployment.environment.clone(),
        alias,
    };
    for (name, value) in outputs.pairs() {
        env.set_output(name, value)?;
    }
    write_job_summary(env, &deployment, &outputs.alias, &context.sha)?;
    Ok(outputs)
}

/// Preview deployments prefer the branch alias over the per-deployment URL.
pub fn resolve_alias(deployment: &Deployment, is_production: bool) -> String {
    if !is_production && let Some(alias) = deployment.aliases.first() {
        alias.clone()
    } else {
        deployment.url.clone()
    }
}

async fn post_comment<C>(
    config: &RunConfig,
    env: &ActionsEnv,
    comments: &C,
    context: &RunContext,
    status: CommentStatus,
    preview: String,
) -> Result<()>
where
    C: IssueComments,
{
    if !config.comments_enabled() || !context.has_pull_request() {
        return Ok(());
    }
    let Some(issue_number) = context.issue_number else {
        return Ok(());
    };
    let target = CommentTarget {
        issue_number,
        repo_name: env.repository_name.clone(),
        project_name: config.project_name.clone(),
    };
    let row = CommentRow {
        project_name: config.project_name.clone(),
        status,
        preview,
        sha: short_sha(&context.sha, 7).to_string(),
        run_url: env.run_url(context.run_id),
        updated: OffsetDateTime::now_utc(),
    };
    reconcile(comments, &target, &row).await?;
    Ok(())
}
