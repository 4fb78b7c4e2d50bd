use anyhow::{Context, Result};
use pages_action_core::config::RunConfig;

use crate::{
    GitHub,
    actions::{ActionsEnv, HeadRef, OwnerRef, PullRequestRef, RepositoryRef},
};

/// Facts about the current run, resolved once from the event payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    pub is_pull_request: bool,
    pub is_workflow_run: bool,
    pub branch: String,
    pub branch_owner: String,
    pub issue_number: Option<u64>,
    pub run_id: u64,
    pub sha: String,
}

impl RunContext {
    /// Best-effort context built from raw event fields only, without API calls.
    /// Used for failure reporting when resolution did not complete.
    pub fn fallback(env: &ActionsEnv) -> Self {
        let workflow_run = env.event.workflow_run.as_ref();
        let pull_request = env
            .event
            .pull_request
            .as_ref()
            .or_else(|| workflow_run.and_then(|r| r.pull_requests.first()));
        Self {
            is_pull_request: env.is_pull_request(),
            is_workflow_run: env.is_workflow_run(),
            branch: [env.head_ref.as_str(), env.ref_name.as_str()]
                .into_iter()
                .find(|b| !b.is_empty())
                .unwrap_or_default()
                .to_string(),
            branch_owner: env.repository_owner.clone(),
            issue_number: pull_request
                .map(|pr| pr.number)
                .or(env.event.issue.as_ref().map(|i| i.number))
                .or(env.event.number),
            run_id: workflow_run.map_or(env.run_id, |r| r.id),
            sha: pull_request.map_or_else(|| env.sha.clone(), |pr| pr.head.sha.clone()),
        }
    }

    /// Whether this run can be tied to a pull request to comment on.
    pub fn has_pull_request(&self) -> bool {
        (self.is_pull_request || self.is_workflow_run) && self.issue_number.is_some()
    }
}

/// Pull request search used to recover the PR behind a `workflow_run` event.
#[allow(async_fn_in_trait)]
pub trait PullRequestLookup {
    /// Open pull requests whose head matches `owner:branch`.
    async fn pull_requests_for_head(&self, head: &str) -> Result<Vec<PullRequestRef>>;
}

impl PullRequestLookup for GitHub {
    async fn pull_requests_for_head(&self, head: &str) -> Result<Vec<PullRequestRef>> {
        let page = self
            .client
            .pulls(&self.owner, &self.repo)
            .list()
            .head(head)
            .send()
            .await
            .with_context(|| format!("Failed to list pull requests for {head}"))?;
        tracing::info!("Found {} pull requests for {}", page.items.len(), head);
        Ok(page
            .items
            .into_iter()
            .map(|pr| PullRequestRef {
                number: pr.number,
                title: pr.title,
                head: HeadRef {
                    ref_field: pr.head.ref_field,
                    sha: pr.head.sha,
                    repo: pr.head.repo.map(|repo| RepositoryRef {
                        name: Some(repo.name),
                        owner: repo.owner.map(|o| OwnerRef { login: o.login }),
                    }),
                },
            })
            .collect())
    }
}

/// Resolve branch, owner, pull request, run and commit for this run.
///
/// Only `workflow_run` events touch the network: their payload may not carry the
/// pull request, so it is looked up by `owner:branch`. Without a GitHub token the
/// lookup is skipped, since nothing would be reported on the pull request.
pub async fn resolve_context<L>(config: &RunConfig, env: &ActionsEnv, lookup: &L) -> Result<RunContext>
where L: PullRequestLookup {
    let is_workflow_run = env.is_workflow_run();
    let workflow_run = if is_workflow_run { env.event.workflow_run.as_ref() } else { None };
    let event_pull_request = env.event.pull_request.as_ref();

    let branch = [
        config.branch.as_str(),
        event_pull_request.map_or("", |pr| pr.head.ref_field.as_str()),
        workflow_run.and_then(|r| r.head_branch.as_deref()).unwrap_or_default(),
        env.head_ref.as_str(),
        env.ref_name.as_str(),
    ]
    .into_iter()
    .find(|b| !b.is_empty())
    .context("Unable to determine branch name")?
    .to_string();

    let branch_owner = workflow_run
        .and_then(|r| r.head_repository.as_ref())
        .and_then(|repo| repo.owner.as_ref())
        .or_else(|| {
            event_pull_request
                .and_then(|pr| pr.head.repo.as_ref())
                .and_then(|repo| repo.owner.as_ref())
        })
        .map_or_else(|| env.repository_owner.clone(), |owner| owner.login.clone());

    let pull_request = match workflow_run {
        Some(run) => match run.pull_requests.first() {
            Some(pr) => Some(pr.clone()),
            None if !config.comments_enabled() => {
                tracing::debug!("No gitHubToken, skipping pull request lookup for {}", branch);
                event_pull_request.cloned()
            }
            None => {
                let listed = lookup
                    .pull_requests_for_head(&format!("{branch_owner}:{branch}"))
                    .await
                    .context("Failed to fetch pull requests for workflow run")?;
                listed
                    .into_iter()
                    .find(|pr| pr.title.is_some() && pr.title == run.display_title)
                    .or_else(|| event_pull_request.cloned())
            }
        },
        None => event_pull_request.cloned(),
    };

    let issue_number = pull_request
        .as_ref()
        .map(|pr| pr.number)
        .or(env.event.issue.as_ref().map(|i| i.number))
        .or(env.event.number);
    let run_id = workflow_run.map_or(env.run_id, |r| r.id);
    let sha = pull_request
        .as_ref()
        .map(|pr| pr.head.sha.clone())
        .or_else(|| workflow_run.map(|r| r.head_sha.clone()))
        .unwrap_or_else(|| env.sha.clone());

    let context = RunContext {
        is_pull_request: env.is_pull_request(),
        is_workflow_run,
        branch,
        branch_owner,
        issue_number,
        run_id,
        sha,
    };
    tracing::debug!("Detected settings: {:?}", context);
    Ok(context)
}
