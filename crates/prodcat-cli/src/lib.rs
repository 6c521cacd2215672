//! # prodcat-cli
//!
//! Command-line interface for the shared product catalog.
//!
//! ## Commands
//!
//! - `prodcat update` - Merge a product version's data into the catalog
//! - `prodcat show` - Print an installed product version
//!
//! ## Configuration
//!
//! Every option can also be set through the environment, so the binary can
//! run unchanged as an install job:
//!
//! - `PRODUCT`, `PRODUCT_VERSION` - Product version to update
//! - `CONFIG_MAP`, `CONFIG_MAP_NAMESPACE` - Catalog record (default
//!   `services/cray-product-catalog`)
//! - `YAML_CONTENT_FILE` or `YAML_CONTENT_STRING` - Data to merge
//! - `SET_ACTIVE_VERSION`, `REMOVE_ACTIVE_FIELD` - Active flag handling
//! - `KUBERNETES_API_URL`, `KUBERNETES_TOKEN` - API server overrides
//! - `PRODCAT_LOG_FORMAT` - `json` or `pretty` logs

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
// CLI uses print! macros intentionally
#![allow(clippy::print_stdout)]
#![allow(clippy::print_stderr)]

pub mod commands;

use std::path::Path;

use clap::{Parser, Subcommand};

use prodcat_catalog::CatalogError;
use prodcat_catalog::kube::{API_URL_ENV, KubeConfig, SERVICE_ACCOUNT_DIR, TOKEN_ENV};

/// Exit status for invalid inputs.
pub const EXIT_CONFIGURATION: u8 = 2;

/// Exit status for every other failure.
pub const EXIT_FAILURE: u8 = 1;

/// Product catalog command-line interface.
#[derive(Debug, Parser)]
#[command(name = "prodcat")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Kubernetes API server URL (defaults to the in-cluster service).
    #[arg(long, global = true, env = API_URL_ENV)]
    pub api_url: Option<String>,

    /// Kubernetes bearer token (defaults to the mounted service account).
    #[arg(long, global = true, env = TOKEN_ENV, hide_env_values = true)]
    pub token: Option<String>,

    /// Skip TLS certificate verification of the API server.
    #[arg(long, global = true)]
    pub insecure_skip_tls_verify: bool,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Get the effective configuration.
    #[must_use]
    pub fn config(&self) -> Config {
        Config {
            api_url: self.api_url.clone(),
            token: self.token.clone(),
            insecure_skip_tls_verify: self.insecure_skip_tls_verify,
            format: self.format.clone(),
        }
    }
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Merge a product version's data into the catalog.
    Update(commands::update::UpdateArgs),
    /// Print an installed product version.
    Show(commands::show::ShowArgs),
}

/// Output format.
#[derive(Debug, Clone, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output.
    Json,
}

/// CLI configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Kubernetes API server URL override.
    pub api_url: Option<String>,
    /// Kubernetes bearer token override.
    pub token: Option<String>,
    /// Skip TLS certificate verification.
    pub insecure_skip_tls_verify: bool,
    /// Output format.
    pub format: OutputFormat,
}

impl Config {
    /// Resolves the Kubernetes connection, preferring explicit overrides over
    /// the in-cluster environment.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the API server cannot be located.
    pub fn kube_config(&self) -> prodcat_catalog::Result<KubeConfig> {
        let config = KubeConfig::from_env_with(
            |key| match key {
                API_URL_ENV => self.api_url.clone(),
                TOKEN_ENV => self.token.clone(),
                other => std::env::var(other).ok(),
            },
            Path::new(SERVICE_ACCOUNT_DIR),
        )?;
        Ok(config.with_accept_invalid_certs(self.insecure_skip_tls_verify))
    }
}

/// Maps a command failure to the process exit status.
#[must_use]
pub fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<CatalogError>() {
        Some(e) if e.is_configuration() => EXIT_CONFIGURATION,
        _ => EXIT_FAILURE,
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Context as _;

    use super::*;

    #[test]
    fn test_cli_config_from_flags() {
        let cli = Cli::parse_from([
            "prodcat",
            "--api-url",
            "https://10.96.0.1:443",
            "--token",
            "token-abc",
            "--format",
            "json",
            "show",
            "sat",
        ]);

        let config = cli.config();
        assert_eq!(config.api_url.as_deref(), Some("https://10.96.0.1:443"));
        assert_eq!(config.token.as_deref(), Some("token-abc"));
        assert!(matches!(config.format, OutputFormat::Json));

        let kube = config.kube_config().expect("kube config");
        assert_eq!(kube.api_url, "https://10.96.0.1:443");
        assert_eq!(kube.token.as_deref(), Some("token-abc"));
    }

    #[test]
    fn test_exit_codes() {
        let config_err = anyhow::Error::from(CatalogError::configuration("both flags"))
            .context("update failed");
        assert_eq!(exit_code(&config_err), EXIT_CONFIGURATION);

        let retries = anyhow::Error::from(CatalogError::RetriesExhausted { attempts: 3 });
        assert_eq!(exit_code(&retries), EXIT_FAILURE);

        let other: anyhow::Result<()> = Err(std::io::Error::other("boom")).context("io");
        assert_eq!(exit_code(&other.expect_err("error")), EXIT_FAILURE);
    }
}
