//! `recovery` — the CLI entry point for merge and dump recovery (spec.md
//! §6 "CLI surface"). Parses flags, resolves them against an optional TOML
//! config file, wires up logging/metrics, and dispatches to
//! `recovery-core`'s `merge` or `dump` orchestrators against the bundled
//! filesystem storage backend.

mod addr;
mod config;
mod dump_file;
mod fs_backend;
mod options;
mod routes_file;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use recovery_core::ctx::Ctx;
use recovery_core::key::Timestamp;
use recovery_util::shutdown;

use crate::options::{Cli, Command};

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _log_guard = match init_logging(&cli) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("failed to initialize logging: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start tokio runtime: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!(error = ?e, "recovery run failed");
            ExitCode::FAILURE
        }
    }
}

/// Set up `tracing`, to stderr or `--log-file`, filtered by `--log-level`
/// (falling back to `RUST_LOG`). The returned guard must be held for the
/// duration of the program; dropping it early stops flushing to a file
/// writer (spec.md §6, SPEC_FULL.md §1.2).
fn init_logging(cli: &Cli) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let level = cli.log_level.clone().unwrap_or_else(|| "info".to_string());
    let filter = EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("info"));

    match &cli.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            tracing_subscriber::fmt().with_env_filter(filter).with_writer(writer).init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            Ok(None)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    let settings = config::resolve(&cli)?;

    if let Some(monitor_addr) = settings.monitor {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(monitor_addr)
            .install()
            .context("installing prometheus exporter")?;
        info!(%monitor_addr, "serving prometheus metrics");
    }

    let routes = Arc::new(routes_file::load(&settings.routes_file)?);
    let groups = if settings.groups.is_empty() {
        routes.groups()
    } else {
        settings.groups.iter().copied().map(recovery_core::address::GroupId).collect()
    };

    let self_address = addr::parse(&settings.address)?;
    let remotes = settings
        .remotes
        .iter()
        .map(|s| addr::parse(s))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let (one_node, command_groups, dump_file) = match &cli.command {
        Command::Merge { one_node } => {
            let one_node = one_node.as_deref().map(addr::parse).transpose()?;
            (one_node, groups.clone(), None)
        }
        Command::Dump { dump_file: path } => (None, groups.clone(), Some(path.clone())),
    };

    let ctx = Ctx {
        chunk_size: settings.chunk_size,
        batch_size: settings.batch_size,
        attempts: settings.attempts,
        wait_timeout: Duration::from_millis(settings.wait_timeout_ms),
        safe: cli.safe,
        dry_run: cli.dry_run,
        tmp_dir: settings.tmp_dir,
        timestamp_floor: Timestamp(settings.timestamp_floor),
        nprocess: settings.nprocess,
        one_node,
        address: self_address,
        remotes,
        groups: command_groups,
        routes,
        monitor: settings.monitor,
        log_file: settings.log_file,
        log_level: settings.log_level,
        dump_file,
    };

    let backend = Arc::new(fs_backend::FsBackend::new(settings.storage_root)?);
    let (sender, receiver) = shutdown::pair();
    install_ctrlc_handler(sender);

    let (ok, stats) = match &cli.command {
        Command::Merge { .. } => recovery_core::worker_pool::run(&ctx, backend.as_ref(), backend.as_ref(), receiver).await?,
        Command::Dump { dump_file: path } => {
            let records = Arc::new(dump_file::load(path)?);
            recovery_core::dump::process_dump_across_groups(records, &ctx.groups, &ctx, backend.as_ref(), receiver).await?
        }
    };

    info!(
        ok,
        skipped = stats.skipped,
        read = stats.read,
        read_bytes = stats.read_bytes,
        write = stats.write,
        written_bytes = stats.written_bytes,
        removed = stats.removed,
        read_failed = stats.read_failed,
        write_failed = stats.write_failed,
        remove_failed = stats.remove_failed,
        "recovery run summary"
    );

    Ok(ok)
}

fn install_ctrlc_handler(sender: shutdown::ShutdownSender) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down worker pool");
            sender.shutdown();
        }
    });
}
