//! CLI configuration management.
//!
//! ```text
//! Cli
//! ├── storage: StorageConfig   # endpoint, credentials, default bucket
//! ├── bucket: Option<String>   # per-invocation bucket override
//! └── command: Command         # the operation to run
//! ```
//!
//! Every storage option can be provided via CLI arguments or environment
//! variables. Use `--help` to see all available options.

use std::path::PathBuf;
use std::process;

use bucketry_minio::StorageConfig;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::{TRACING_TARGET_CONFIG, TRACING_TARGET_STARTUP};

/// Complete CLI configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "bucketry")]
#[command(about = "Upload, inspect and download objects in MinIO")]
#[command(version)]
pub struct Cli {
    /// MinIO connection and default bucket.
    #[clap(flatten)]
    pub storage: StorageConfig,

    /// Bucket to use instead of the configured default.
    #[arg(long, global = true, env = "BUCKETRY_BUCKET")]
    pub bucket: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Operations available from the command line.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Upload a local file under a freshly derived key.
    Upload {
        /// File to upload.
        path: PathBuf,
    },

    /// Upload standard input under a key derived from `--name`.
    UploadStdin {
        /// File name the key is derived from.
        #[arg(long)]
        name: String,
    },

    /// Print size, etag and content type of an object.
    Stat {
        /// Object key.
        key: String,
    },

    /// Download an object into a directory.
    Download {
        /// Object key.
        key: String,

        /// Target directory; the file is named after the key's final segment.
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },

    /// Write an object to standard output.
    Cat {
        /// Object key.
        key: String,
    },

    /// Check that the server is reachable with the configured credentials.
    Ping,
}

impl Command {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Upload { .. } => "upload",
            Self::UploadStdin { .. } => "upload-stdin",
            Self::Stat { .. } => "stat",
            Self::Download { .. } => "download",
            Self::Cat { .. } => "cat",
            Self::Ping => "ping",
        }
    }
}

impl Cli {
    /// Loads environment variables from .env file (if enabled) and parses CLI arguments.
    pub fn init() -> Self {
        Self::load_dotenv();
        Self::parse()
    }

    /// Loads environment variables from .env file if the dotenv feature is enabled.
    #[cfg(feature = "dotenv")]
    fn load_dotenv() {
        if let Err(err) = dotenvy::dotenv()
            && !err.not_found()
        {
            eprintln!("Warning: failed to load .env file: {err}");
        }
    }

    #[cfg(not(feature = "dotenv"))]
    fn load_dotenv() {}

    /// Initializes tracing with environment-based filtering.
    ///
    /// Logs go to stderr so that stdout carries only command output.
    pub fn init_tracing() {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    /// Logs configuration (no sensitive information).
    pub fn log(&self) {
        tracing::debug!(
            target: TRACING_TARGET_STARTUP,
            version = env!("CARGO_PKG_VERSION"),
            pid = process::id(),
            arch = std::env::consts::ARCH,
            os = std::env::consts::OS,
            features = ?Self::enabled_features(),
            "Build information"
        );

        let credentials = self.storage.credentials();
        tracing::info!(
            target: TRACING_TARGET_CONFIG,
            endpoint = %self.storage.endpoint_masked(),
            access_key = %credentials.access_key_masked(),
            bucket = %self.bucket.as_deref().unwrap_or(&self.storage.bucket_name),
            request_timeout = ?self.storage.request_timeout(),
            command = self.command.name(),
            "Storage configuration"
        );
    }

    /// Returns a list of enabled compile-time features.
    fn enabled_features() -> Vec<&'static str> {
        [cfg!(feature = "dotenv").then_some("dotenv")]
            .into_iter()
            .flatten()
            .collect()
    }
}
