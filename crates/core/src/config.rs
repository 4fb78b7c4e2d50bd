/// Used when the `wranglerVersion` input is left empty.
pub const DEFAULT_WRANGLER_VERSION: &str = "3";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Input required and not supplied: {0}")]
    MissingInput(&'static str),
}

/// Action inputs, read once before any network activity.
#[derive(Debug, Clone, Default)]
pub struct RunConfig {
    pub api_token: String,
    pub account_id: String,
    pub project_name: String,
    pub directory: String,
    pub github_token: String,
    pub branch: String,
    pub deployment_name: String,
    pub working_directory: String,
    pub wrangler_version: String,
}

impl RunConfig {
    /// Load the configuration from an input lookup.
    ///
    /// `lookup` receives the input name as declared in `action.yml` (e.g. `projectName`).
    /// Values are trimmed and empty values count as absent.
    pub fn from_inputs<F>(lookup: F) -> Result<Self, ConfigError>
    where F: Fn(&str) -> Option<String> {
        let input = |name: &'static str, required: bool| -> Result<String, ConfigError> {
            let value = lookup(name).map(|v| v.trim().to_string()).unwrap_or_default();
            if required && value.is_empty() {
                return Err(ConfigError::MissingInput(name));
            }
            Ok(value)
        };
        Ok(Self {
            api_token: input("apiToken", true)?,
            account_id: input("accountId", true)?,
            project_name: input("projectName", true)?,
            directory: input("directory", true)?,
            github_token: input("gitHubToken", false)?,
            branch: input("branch", false)?,
            deployment_name: input("deploymentName", false)?,
            working_directory: input("workingDirectory", false)?,
            wrangler_version: input("wranglerVersion", false)?,
        })
    }

    /// Load the configuration from `INPUT_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_inputs(|name| std::env::var(input_env_name(name)).ok())
    }

    pub fn branch_override(&self) -> Option<&str> { non_empty(&self.branch) }

    pub fn deployment_name(&self) -> Option<&str> { non_empty(&self.deployment_name) }

    pub fn github_token(&self) -> Option<&str> { non_empty(&self.github_token) }

    pub fn wrangler_version(&self) -> &str {
        non_empty(&self.wrangler_version).unwrap_or(DEFAULT_WRANGLER_VERSION)
    }

    /// Comments and deployment records are only posted with a GitHub token.
    pub fn comments_enabled(&self) -> bool { self.github_token().is_some() }
}

/// Environment variable name for an action input, matching the runner's convention.
pub fn input_env_name(name: &str) -> String {
    format!("INPUT_{}", name.replace(' ', "_").to_uppercase())
}

fn non_empty(value: &str) -> Option<&str> { (!value.is_empty()).then_some(value) }
