mod cmd;
mod output;
mod profile;

use clap::{Parser, Subcommand};
use cmd::{
    pipeline::PipelineArgs, run::RunArgs, status::StatusArgs, trigger::TriggerArgs,
    wait::AwaitArgs, ConnectionArgs,
};

#[derive(Parser)]
#[command(
    name = "relay",
    about = "Trigger remote CI workflows and wait for them to finish",
    version,
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    conn: ConnectionArgs,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dispatch workflows and return immediately
    Trigger(TriggerArgs),

    /// Wait for the latest run of each workflow to finish
    Await(AwaitArgs),

    /// Dispatch workflows, then wait for the runs they started
    Run(RunArgs),

    /// Show the latest run of each workflow without waiting
    Status(StatusArgs),

    /// Run the stages of a pipeline file in order
    Pipeline(PipelineArgs),
}

fn main() {
    // Profile variables must be in the environment before clap reads it.
    let profile =
        std::env::var(profile::PROFILE_VAR).unwrap_or_else(|_| profile::DEFAULT_PROFILE.into());
    let loaded = std::env::current_dir()
        .map_err(anyhow::Error::from)
        .and_then(|dir| profile::load_profile(&dir, &profile));

    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match &loaded {
        Ok(Some(path)) => {
            tracing::debug!(profile = %profile, path = %path.display(), "loaded profile")
        }
        Ok(None) => tracing::debug!(profile = %profile, "no profile file"),
        Err(e) => tracing::warn!(profile = %profile, "{e:#}"),
    }

    let result = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(anyhow::Error::from)
        .and_then(|rt| rt.block_on(dispatch(cli)));

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(cmd::exit_code(&e));
    }
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let conn = &cli.conn;
    match cli.command {
        Commands::Trigger(args) => cmd::trigger::run(conn, args, cli.json).await,
        Commands::Await(args) => cmd::wait::run(conn, args, cli.json).await,
        Commands::Run(args) => cmd::run::run(conn, args, cli.json).await,
        Commands::Status(args) => cmd::status::run(conn, args, cli.json).await,
        Commands::Pipeline(args) => cmd::pipeline::run(conn, args, cli.json).await,
    }
}
