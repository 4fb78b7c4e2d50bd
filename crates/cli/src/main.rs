mod cmd;

use argp::FromArgs;
use pages_action_github::actions::set_failed;
use tracing_subscriber::{
    EnvFilter, Layer, filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt,
};

#[derive(FromArgs, PartialEq, Debug)]
/// Deploy a static site to Cloudflare Pages and report it on GitHub.
struct TopLevel {
    #[argp(subcommand)]
    command: SubCommand,
}

#[derive(FromArgs, PartialEq, Debug)]
#[argp(subcommand)]
enum SubCommand {
    Deploy(cmd::deploy::Args),
    Summary(cmd::summary::Args),
}

#[tokio::main]
async fn main() {
    let env_filter = EnvFilter::builder()
        // Default to info level
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(env_filter))
        .init();

    let args: TopLevel = argp::parse_args_or_exit(argp::DEFAULT);
    let result = match args.command {
        SubCommand::Deploy(args) => cmd::deploy::run(args).await,
        SubCommand::Summary(args) => cmd::summary::run(args),
    };
    if let Err(e) = result {
        set_failed(&format!("{e:#}"));
        std::process::exit(1);
    }
}
