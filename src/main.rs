//! story-server CLI entry point.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use story_server::config::{ConfigOverrides, ServerConfig};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "story-server", version, about = "Index story files and serve them to devices")]
struct Cli {
    /// Project root holding package.json and the stories directory
    #[arg(long, global = true)]
    project_root: Option<PathBuf>,

    /// Directory scanned and watched for story files
    #[arg(long, global = true, env = "STORY_SERVER_WATCH_ROOT")]
    watch_root: Option<PathBuf>,

    /// Port for the HTTP and push channel server
    #[arg(long, global = true, env = "STORY_SERVER_PORT")]
    port: Option<u16>,

    /// Stories directory, relative to the project root
    #[arg(long, global = true)]
    stories_dir: Option<String>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Index, watch and serve (default)
    Serve,
    /// Create the stories directory with an empty manifest and loader
    Init,
    /// Index once and print a summary
    Index,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            project_root: self.project_root.clone(),
            watch_root: self.watch_root.clone(),
            port: self.port,
            stories_dir: self.stories_dir.clone(),
        }
    }
}

/// Log level: `--debug`, then `RUST_LOG`, then info.
fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("story_server=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("story_server=info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = ServerConfig::resolve(&cli.overrides()).context("resolving configuration")?;
    tracing::debug!(?config, "Resolved configuration");

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            story_server::run_server(&config, shutdown_signal()).await?;
        }
        Command::Init => {
            let report = story_server::init_project(&config).await?;
            println!(
                "{} (manifest {}, loader {})",
                config.stories_dir_path().display(),
                if report.created_manifest { "created" } else { "kept" },
                if report.created_loader { "created" } else { "kept" },
            );
        }
        Command::Index => {
            let records = story_server::index_once(&config).await?;
            let stories: usize = records.iter().map(|r| r.stories.len()).sum();
            for record in &records {
                println!("{}\t{}\t{}", record.id, record.relative_path, record.stories.len());
            }
            println!("{} files, {} stories", records.len(), stories);
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start runtime: {}", e);
            return ExitCode::from(1);
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::from(1)
        }
    }
}
