//! Command-line surface for the `recovery` binary, mirroring the
//! `clap::Parser`-derived `Options` struct `readyset/src/lib.rs` uses for
//! its own adapter binary: long flags with `env` fallbacks, `value_parser`s
//! for typed fields, and doc comments doubling as `--help` text.
//!
//! Every field that can also come from `--config` is left `Option`-typed
//! here (no `default_value_t`) so [`crate::config::resolve`] can tell
//! "the user didn't pass this" apart from "the user passed the default" and
//! apply the config-file / hardcoded-default fallback in the right order.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Recover data placement within a consistent-hash replica group.
#[derive(Parser, Debug)]
#[command(name = "recovery", version)]
pub struct Cli {
    /// Load defaults from a TOML config file; any flag given on the command
    /// line overrides the corresponding config-file value.
    #[arg(long, env = "RECOVERY_CONFIG")]
    pub config: Option<PathBuf>,

    /// JSON file describing the routing table for every group this run
    /// touches (see the `routes_file` module for the schema). Acquiring the
    /// table from the live cluster is out of scope for this crate; this
    /// flag is the file-based stand-in.
    #[arg(long, env = "RECOVERY_ROUTES_FILE")]
    pub routes_file: Option<PathBuf>,

    /// This process's own contact address (`host:port:family`), used only
    /// to label the local storage-backend root.
    #[arg(long, env = "RECOVERY_ADDRESS")]
    pub address: Option<String>,

    /// Bootstrap remote addresses (`host:port:family`), comma-separated.
    #[arg(long = "remote", env = "RECOVERY_REMOTES", value_delimiter = ',')]
    pub remotes: Vec<String>,

    /// Root directory the bundled filesystem storage backend stores
    /// objects under, one subdirectory per node address.
    #[arg(long, env = "RECOVERY_STORAGE_ROOT")]
    pub storage_root: Option<PathBuf>,

    /// Bytes above which an object is read/written in chunks.
    #[arg(long, env = "RECOVERY_CHUNK_SIZE")]
    pub chunk_size: Option<u64>,

    /// Number of iterator records per recovery batch.
    #[arg(long, env = "RECOVERY_BATCH_SIZE")]
    pub batch_size: Option<usize>,

    /// Maximum attempts per storage operation before it's marked failed.
    #[arg(long, env = "RECOVERY_ATTEMPTS")]
    pub attempts: Option<u32>,

    /// Initial per-call session timeout, in milliseconds; doubles on retry.
    #[arg(long, env = "RECOVERY_WAIT_TIMEOUT_MS")]
    pub wait_timeout_ms: Option<u64>,

    /// Suppress all remove operations.
    #[arg(long, env = "RECOVERY_SAFE")]
    pub safe: bool,

    /// Suppress all mutating operations (read, write, remove); lookups
    /// still happen when a check is performed.
    #[arg(long, env = "RECOVERY_DRY_RUN")]
    pub dry_run: bool,

    /// Directory the iterator spills enumeration results to.
    #[arg(long, env = "RECOVERY_TMP_DIR")]
    pub tmp_dir: Option<PathBuf>,

    /// Lower bound (milliseconds since epoch) of the iterator's timestamp
    /// window; keys older than this are never enumerated.
    #[arg(long, env = "RECOVERY_TIMESTAMP_FLOOR")]
    pub timestamp_floor: Option<u64>,

    /// Maximum number of concurrent worker-pool workers.
    #[arg(long, env = "RECOVERY_NPROCESS")]
    pub nprocess: Option<usize>,

    /// Groups to process, comma-separated. Defaults to every group named in
    /// `routes_file`.
    #[arg(long = "group", env = "RECOVERY_GROUPS", value_delimiter = ',')]
    pub groups: Vec<u32>,

    /// Log file path; if unset, logs go to stderr.
    #[arg(long, env = "RECOVERY_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// `tracing`/`RUST_LOG`-style log level filter.
    #[arg(long, env = "RECOVERY_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Address to serve Prometheus metrics on; metrics are not exported if
    /// unset.
    #[arg(long, env = "RECOVERY_MONITOR")]
    pub monitor: Option<SocketAddr>,

    #[command(subcommand)]
    pub command: Command,
}

/// The two recovery modes named by spec.md §1.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Scan nodes for misplaced keys and move or delete them (spec.md
    /// §§2-6).
    Merge {
        /// Restrict the run to a single node's foreign ranges within its
        /// group, rather than every node in every requested group.
        #[arg(long)]
        one_node: Option<String>,
    },
    /// Recover keys named in a file by probing every replica in the group
    /// (spec.md §4.7).
    Dump {
        /// Text file, one key per line in hex form.
        #[arg(long, env = "RECOVERY_DUMP_FILE")]
        dump_file: PathBuf,
    },
}
