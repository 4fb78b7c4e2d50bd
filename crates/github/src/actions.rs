use std::{
    fs::{File, OpenOptions},
    io::{BufReader, Write},
    path::PathBuf,
};

use anyhow::{Context, Result, bail};
use serde::Deserialize;

/// Subset of the webhook payload found at `GITHUB_EVENT_PATH`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventPayload {
    #[serde(default)]
    pub pull_request: Option<PullRequestRef>,
    #[serde(default)]
    pub workflow_run: Option<WorkflowRunEvent>,
    #[serde(default)]
    pub issue: Option<IssueRef>,
    #[serde(default)]
    pub number: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PullRequestRef {
    pub number: u64,
    #[serde(default)]
    pub title: Option<String>,
    pub head: HeadRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HeadRef {
    #[serde(rename = "ref")]
    pub ref_field: String,
    pub sha: String,
    #[serde(default)]
    pub repo: Option<RepositoryRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RepositoryRef {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub owner: Option<OwnerRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OwnerRef {
    pub login: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorkflowRunEvent {
    pub id: u64,
    #[serde(default)]
    pub head_branch: Option<String>,
    pub head_sha: String,
    #[serde(default)]
    pub display_title: Option<String>,
    #[serde(default)]
    pub head_repository: Option<RepositoryRef>,
    #[serde(default)]
    pub pull_requests: Vec<PullRequestRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IssueRef {
    pub number: u64,
}

/// Everything the action reads from the runner environment, captured once at startup.
#[derive(Debug, Clone, Default)]
pub struct ActionsEnv {
    pub event_name: String,
    pub event: EventPayload,
    pub repository_owner: String,
    pub repository_name: String,
    pub server_url: String,
    pub api_url: Option<String>,
    pub sha: String,
    pub run_id: u64,
    pub head_ref: String,
    pub ref_name: String,
    pub output_file: Option<PathBuf>,
    pub step_summary_file: Option<PathBuf>,
}

impl ActionsEnv {
    pub fn from_env() -> Result<Self> {
        let var = |name: &str| std::env::var(name).unwrap_or_default();
        let path = |name: &str| std::env::var_os(name).filter(|v| !v.is_empty()).map(PathBuf::from);

        let event = match path("GITHUB_EVENT_PATH") {
            Some(event_path) => {
                let file = BufReader::new(
                    File::open(&event_path)
                        .with_context(|| format!("Failed to open {}", event_path.display()))?,
                );
                serde_json::from_reader(file)
                    .with_context(|| format!("Failed to parse {}", event_path.display()))?
            }
            None => EventPayload::default(),
        };
        let repository = var("GITHUB_REPOSITORY");
        let (repository_owner, repository_name) = match repository.split_once('/') {
            Some((owner, name)) => (owner.to_string(), name.to_string()),
            None => (var("GITHUB_REPOSITORY_OWNER"), repository),
        };
        let run_id = match var("GITHUB_RUN_ID") {
            id if id.is_empty() => 0,
            id => id.parse().with_context(|| format!("Invalid GITHUB_RUN_ID {id}"))?,
        };
        let server_url = match var("GITHUB_SERVER_URL") {
            url if url.is_empty() => "https://github.com".to_string(),
            url => url,
        };
        Ok(Self {
            event_name: var("GITHUB_EVENT_NAME"),
            event,
            repository_owner,
            repository_name,
            server_url,
            api_url: Some(var("GITHUB_API_URL")).filter(|v| !v.is_empty()),
            sha: var("GITHUB_SHA"),
            run_id,
            head_ref: var("GITHUB_HEAD_REF"),
            ref_name: var("GITHUB_REF_NAME"),
            output_file: path("GITHUB_OUTPUT"),
            step_summary_file: path("GITHUB_STEP_SUMMARY"),
        })
    }

    pub fn is_pull_request(&self) -> bool {
        matches!(self.event_name.as_str(), "pull_request" | "pull_request_target")
    }

    pub fn is_workflow_run(&self) -> bool { self.event_name == "workflow_run" }

    pub fn run_url(&self, run_id: u64) -> String {
        format!(
            "{}/{}/{}/actions/runs/{}",
            self.server_url, self.repository_owner, self.repository_name, run_id
        )
    }

    /// Set a step output.
    pub fn set_output(&self, name: &str, value: &str) -> Result<()> {
        if value.contains(['\n', '\r']) {
            bail!("Output {name} must be a single line");
        }
        match &self.output_file {
            Some(output_file) => {
                let mut file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(output_file)
                    .with_context(|| format!("Failed to open {}", output_file.display()))?;
                writeln!(file, "{name}={value}")
                    .with_context(|| format!("Failed to write {}", output_file.display()))?;
            }
            None => println!("::set-output name={name}::{value}"),
        }
        Ok(())
    }

    /// Replace the job summary for this step.
    pub fn write_summary(&self, markdown: &str) -> Result<()> {
        let Some(summary_file) = &self.step_summary_file else {
            tracing::debug!("GITHUB_STEP_SUMMARY not set, skipping job summary");
            return Ok(());
        };
        std::fs::write(summary_file, markdown)
            .with_context(|| format!("Failed to write {}", summary_file.display()))
    }
}

/// Mark the step as failed with an `::error::` workflow command.
pub fn set_failed(message: &str) { println!("::error::{}", escape_data(message)); }

fn escape_data(value: &str) -> String {
    value.replace('%', "%25").replace('\r', "%0D").replace('\n', "%0A")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workflow_run_payload() {
        let payload: EventPayload = serde_json::from_str(
            r#"{
                "action": "completed",
                "workflow_run": {
                    "id": 42,
                    "head_branch": "feature-x",
                    "head_sha": "0123456789abcdef",
                    "display_title": "Add feature",
                    "head_repository": { "name": "site", "owner": { "login": "alice" } },
                    "pull_requests": [
                        { "number": 7, "head": { "ref": "feature-x", "sha": "0123456789abcdef", "repo": { "id": 1, "name": "site" } } }
                    ]
                }
            }"#,
        )
        .unwrap();
        let run = payload.workflow_run.unwrap();
        assert_eq!(run.id, 42);
        assert_eq!(run.head_repository.unwrap().owner.unwrap().login, "alice");
        assert_eq!(run.pull_requests[0].number, 7);
        assert_eq!(run.pull_requests[0].title, None);
        assert!(payload.pull_request.is_none());
    }

    #[test]
    fn test_event_kinds() {
        let env = ActionsEnv { event_name: "pull_request_target".to_string(), ..Default::default() };
        assert!(env.is_pull_request());
        assert!(!env.is_workflow_run());
        let env = ActionsEnv { event_name: "workflow_run".to_string(), ..Default::default() };
        assert!(!env.is_pull_request());
        assert!(env.is_workflow_run());
    }

    #[test]
    fn test_run_url() {
        let env = ActionsEnv {
            server_url: "https://github.com".to_string(),
            repository_owner: "octo".to_string(),
            repository_name: "site".to_string(),
            ..Default::default()
        };
        assert_eq!(env.run_url(99), "https://github.com/octo/site/actions/runs/99");
    }

    #[test]
    fn test_set_output_file() {
        let dir = tempfile::tempdir().unwrap();
        let output_file = dir.path().join("output");
        let env = ActionsEnv { output_file: Some(output_file.clone()), ..Default::default() };
        env.set_output("id", "a").unwrap();
        env.set_output("alias", "https://x").unwrap();
        assert_eq!(std::fs::read_to_string(&output_file).unwrap(), "id=a\nalias=https://x\n");

        let err = env.set_output("url", "line\nbreak").unwrap_err();
        assert_eq!(err.to_string(), "Output url must be a single line");
        assert_eq!(std::fs::read_to_string(&output_file).unwrap(), "id=a\nalias=https://x\n");
    }

    #[test]
    fn test_write_summary_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let summary_file = dir.path().join("summary.md");
        let env = ActionsEnv { step_summary_file: Some(summary_file.clone()), ..Default::default() };
        env.write_summary("first").unwrap();
        env.write_summary("second").unwrap();
        assert_eq!(std::fs::read_to_string(&summary_file).unwrap(), "second");
        ActionsEnv::default().write_summary("ignored").unwrap();
    }

    #[test]
    fn test_escape_data() {
        assert_eq!(escape_data("100% broken\nsee logs"), "100%25 broken%0Asee logs");
    }
}
