use anyhow::{Context, Result, anyhow};
use argp::FromArgs;
use pages_action_core::models::Deployment;
use pages_action_github::summary::render_summary;
use serde::Deserialize;
use typed_path::Utf8NativePathBuf;

use crate::cmd::deploy::resolve_alias;

// For argp::FromArgs
fn native_path(value: &str) -> Result<Utf8NativePathBuf, String> {
    Ok(Utf8NativePathBuf::from(value))
}

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// Render the job summary markdown for a saved Cloudflare Pages deployment.
#[argp(subcommand, name = "summary")]
pub struct Args {
    #[argp(option, short = 'i', from_str_fn(native_path))]
    /// deployment JSON file (a deployment object or a deployments list response)
    input: Utf8NativePathBuf,
    #[argp(option, short = 's')]
    /// commit sha (defaults to the deployment's commit hash)
    sha: Option<String>,
    #[argp(option, short = 'a')]
    /// branch preview URL (defaults to the deployment's first alias)
    alias: Option<String>,
    #[argp(option, short = 'o', from_str_fn(native_path))]
    /// write markdown summary to output file
    output: Option<Utf8NativePathBuf>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DeploymentInput {
    Single(Deployment),
    List { result: Vec<Deployment> },
}

fn parse_deployment(data: &[u8]) -> Result<Deployment> {
    match serde_json::from_slice(data)? {
        DeploymentInput::Single(deployment) => Ok(deployment),
        DeploymentInput::List { result } => {
            result.into_iter().next().ok_or_else(|| anyhow!("Deployment list is empty"))
        }
    }
}

fn summarize(deployment: &Deployment, sha: Option<&str>, alias: Option<&str>) -> String {
    let sha = sha.or(deployment.commit_hash()).unwrap_or_default();
    let alias = alias.map_or_else(|| resolve_alias(deployment, false), str::to_string);
    render_summary(deployment, &alias, sha)
}

pub fn run(args: Args) -> Result<()> {
    let data = std::fs::read(args.input.with_platform_encoding())
        .with_context(|| format!("Failed to read {}", args.input))?;
    let deployment =
        parse_deployment(&data).with_context(|| format!("Failed to parse {}", args.input))?;
    let summary = summarize(&deployment, args.sha.as_deref(), args.alias.as_deref());
    if let Some(out_path) = &args.output {
        std::fs::write(out_path.with_platform_encoding(), summary)
            .with_context(|| format!("Failed to write output file '{}'", out_path))?;
    } else {
        println!("{}", summary);
    }
    Ok(())
}
