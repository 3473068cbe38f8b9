//! Workbench server binary.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use workbench::monitoring::init_tracing;
use workbench::{server, Result, Workbench, WorkbenchConfig};

#[derive(Parser)]
#[command(name = "workbench", about = "Plugin-based analysis engine server", version)]
struct Args {
    /// TOML configuration file.
    #[arg(long, env = "WORKBENCH_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address, overriding the configuration file.
    #[arg(long)]
    listen: Option<String>,

    /// Plugin directory, overriding the configuration file.
    #[arg(long)]
    plugin_dir: Option<PathBuf>,

    /// Do not watch the plugin directory for changes.
    #[arg(long, default_value_t = false)]
    no_watch: bool,
}

impl Args {
    fn load_config(&self) -> Result<WorkbenchConfig> {
        let mut config = match &self.config {
            Some(path) => WorkbenchConfig::load(path)?,
            None => WorkbenchConfig::default(),
        };
        if let Some(listen) = &self.listen {
            config.server.listen = listen.clone();
        }
        if let Some(dir) = &self.plugin_dir {
            config.plugins.dir = dir.clone();
        }
        if self.no_watch {
            config.plugins.watch = false;
        }
        Ok(config)
    }
}

async fn run(config: WorkbenchConfig) -> Result<()> {
    let workbench = Workbench::init(config).await?;
    let listener = TcpListener::bind(&workbench.config().server.listen).await?;

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received");
            signal.cancel();
        }
    });

    let served = server::serve(listener, workbench.service().clone(), shutdown).await;
    workbench.shutdown().await;
    served
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();
    let config = match args.load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("workbench: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = init_tracing(&config.logging) {
        eprintln!("workbench: {}", e);
        return ExitCode::FAILURE;
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "workbench stopped");
            ExitCode::FAILURE
        }
    }
}
