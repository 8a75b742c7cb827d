//! TOML config-file loading, merged with CLI flags per spec.md's "config
//! loading" external collaborator (spec.md §1) — CLI flags always win over
//! the config file, and a hardcoded default wins only when neither is set.

use std::path::PathBuf;

use anyhow::Context;
use serde::Deserialize;

use crate::options::Cli;

/// The subset of [`Cli`]'s fields a TOML config file may supply. Every
/// field mirrors a CLI flag name (`snake_case` instead of `kebab-case`).
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub routes_file: Option<PathBuf>,
    pub address: Option<String>,
    #[serde(default)]
    pub remotes: Vec<String>,
    pub storage_root: Option<PathBuf>,
    pub chunk_size: Option<u64>,
    pub batch_size: Option<usize>,
    pub attempts: Option<u32>,
    pub wait_timeout_ms: Option<u64>,
    pub tmp_dir: Option<PathBuf>,
    pub timestamp_floor: Option<u64>,
    pub nprocess: Option<usize>,
    #[serde(default)]
    pub groups: Vec<u32>,
    pub log_file: Option<PathBuf>,
    pub log_level: Option<String>,
    pub monitor: Option<std::net::SocketAddr>,
}

impl FileConfig {
    /// Load and parse a TOML config file from `path`.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("parsing config file {}", path.display()))
    }
}

/// The fully-resolved settings a run needs, after folding `--config` (if
/// any) underneath the CLI flags and a final hardcoded default underneath
/// that.
pub struct Resolved {
    pub routes_file: PathBuf,
    pub address: String,
    pub remotes: Vec<String>,
    pub storage_root: PathBuf,
    pub chunk_size: u64,
    pub batch_size: usize,
    pub attempts: u32,
    pub wait_timeout_ms: u64,
    pub tmp_dir: PathBuf,
    pub timestamp_floor: u64,
    pub nprocess: usize,
    pub groups: Vec<u32>,
    pub log_file: Option<PathBuf>,
    pub log_level: String,
    pub monitor: Option<std::net::SocketAddr>,
}

/// Merge `cli` over an optionally-loaded `--config` file, applying
/// hardcoded defaults for anything still unset.
pub fn resolve(cli: &Cli) -> anyhow::Result<Resolved> {
    let file = match &cli.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };

    let remotes = if !cli.remotes.is_empty() {
        cli.remotes.clone()
    } else {
        file.remotes
    };
    let groups = if !cli.groups.is_empty() {
        cli.groups.clone()
    } else {
        file.groups
    };

    Ok(Resolved {
        routes_file: cli
            .routes_file
            .clone()
            .or(file.routes_file)
            .context("--routes-file is required (flag, env, or config file)")?,
        address: cli
            .address
            .clone()
            .or(file.address)
            .context("--address is required (flag, env, or config file)")?,
        remotes,
        storage_root: cli
            .storage_root
            .clone()
            .or(file.storage_root)
            .context("--storage-root is required (flag, env, or config file)")?,
        chunk_size: cli.chunk_size.or(file.chunk_size).unwrap_or(1 << 20),
        batch_size: cli.batch_size.or(file.batch_size).unwrap_or(100),
        attempts: cli.attempts.or(file.attempts).unwrap_or(3),
        wait_timeout_ms: cli.wait_timeout_ms.or(file.wait_timeout_ms).unwrap_or(1000),
        tmp_dir: cli.tmp_dir.clone().or(file.tmp_dir).unwrap_or_else(|| PathBuf::from("/tmp")),
        timestamp_floor: cli.timestamp_floor.or(file.timestamp_floor).unwrap_or(0),
        nprocess: cli.nprocess.or(file.nprocess).unwrap_or(4),
        groups,
        log_file: cli.log_file.clone().or(file.log_file),
        log_level: cli.log_level.clone().or(file.log_level).unwrap_or_else(|| "info".to_string()),
        monitor: cli.monitor.or(file.monitor),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once(&"recovery").chain(args))
    }

    #[test]
    fn cli_flags_win_over_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("recovery.toml");
        std::fs::write(
            &config_path,
            r#"
            routes_file = "/from/config/routes.json"
            address = "10.0.0.1:1025:inet"
            storage_root = "/from/config/storage"
            batch_size = 10
            "#,
        )
        .unwrap();

        let cli = parse(&[
            "--config",
            config_path.to_str().unwrap(),
            "--batch-size",
            "50",
            "merge",
        ]);
        let resolved = resolve(&cli).unwrap();
        assert_eq!(resolved.routes_file, PathBuf::from("/from/config/routes.json"));
        assert_eq!(resolved.batch_size, 50);
    }

    #[test]
    fn missing_required_field_is_an_error() {
        let cli = parse(&["--address", "10.0.0.1:1025:inet", "merge"]);
        assert!(resolve(&cli).is_err());
    }

    #[test]
    fn hardcoded_default_applies_when_nothing_set() {
        let cli = parse(&[
            "--routes-file",
            "/r.json",
            "--address",
            "10.0.0.1:1025:inet",
            "--storage-root",
            "/s",
            "merge",
        ]);
        let resolved = resolve(&cli).unwrap();
        assert_eq!(resolved.chunk_size, 1 << 20);
        assert_eq!(resolved.attempts, 3);
    }
}
