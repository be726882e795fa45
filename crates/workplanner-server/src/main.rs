//! `workplanner-reportd`: serve or generate manager reports.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use workplanner_core::{ManagerId, Settings};
use workplanner_server::config::SettingsArgs;
use workplanner_server::{build_state, http, AppState};

#[derive(Parser)]
#[command(name = "workplanner-reportd")]
#[command(author, version, about = "Per-manager project reports over HTTP and RPC")]
struct Cli {
    #[command(flatten)]
    settings: SettingsArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP and RPC front ends until Ctrl-C.
    Serve,
    /// Run only the HTTP front end.
    ServeHttp,
    /// Run only the RPC front end.
    ServeRpc,
    /// Build one manager's report offline and print it as JSON.
    Generate {
        #[arg(long)]
        manager_id: ManagerId,
        /// Write the JSON here instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// List the managers known to the store.
    Managers,
}

fn main() {
    init_tracing();

    if let Err(err) = run() {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.settings.into_settings();
    let state = build_state(&settings)?;

    match cli.command {
        Commands::Serve => serve(settings, state, true, true),
        Commands::ServeHttp => serve(settings, state, true, false),
        Commands::ServeRpc => serve(settings, state, false, true),
        Commands::Generate { manager_id, out } => generate(&state, manager_id, out),
        Commands::Managers => {
            for id in state.service.manager_ids() {
                println!("{id}");
            }
            Ok(())
        }
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn generate(state: &AppState, manager_id: ManagerId, out: Option<PathBuf>) -> Result<()> {
    let report = state
        .service
        .manager_report(manager_id)
        .with_context(|| format!("generating report for manager {manager_id}"))?;
    let json = serde_json::to_string_pretty(&report)?;
    match out {
        Some(path) => {
            fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
            info!(manager_id, path = %path.display(), "report written");
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn serve(settings: Settings, state: AppState, with_http: bool, with_rpc: bool) -> Result<()> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting tokio runtime")?;
    rt.block_on(serve_async(settings, Arc::new(state), with_http, with_rpc))
}

async fn serve_async(
    settings: Settings,
    state: Arc<AppState>,
    with_http: bool,
    with_rpc: bool,
) -> Result<()> {
    let (stop_tx, stop_rx) = watch::channel(false);
    let stopped = |mut rx: watch::Receiver<bool>| async move {
        let _ = rx.wait_for(|stop| *stop).await;
    };

    let mut tasks = tokio::task::JoinSet::new();
    if with_http {
        let addr = settings.http_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| anyhow!("http: failed to bind {addr}: {e}"))?;
        tasks.spawn(http::serve(listener, state.clone(), stopped(stop_rx.clone())));
    }
    if with_rpc {
        let addr = settings.rpc_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| anyhow!("rpc: failed to bind {addr}: {e}"))?;
        let server = Arc::new(state.rpc_server(settings.rpc_workers));
        tasks.spawn(server.serve(listener, stopped(stop_rx.clone())));
    }

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("waiting for Ctrl-C")?;
            info!("shutdown requested");
            let _ = stop_tx.send(true);
        }
        Some(joined) = tasks.join_next() => {
            joined.context("server task panicked")??;
            let _ = stop_tx.send(true);
        }
    }

    while let Some(joined) = tasks.join_next().await {
        joined.context("server task panicked")??;
    }
    Ok(())
}
