//! Application context: unified state passed to every command handler.
//!
//! `AppContext` owns the terminal output settings and the loaded agent
//! configuration, and knows how to wire the production adapters into an
//! `UpdateOrchestrator`.

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::application::ports::ConfigStore;
use crate::application::services::update::{UpdateOrchestrator, UpdatePorts, UpdateSettings};
use crate::domain::{AgentConfig, ConfigError};
use crate::infra::catalog::HttpCatalogClient;
use crate::infra::command_runner::TokioCommandRunner;
use crate::infra::config::YamlConfigStore;
use crate::infra::download::HttpDownloader;
use crate::infra::fs::LocalStorage;
use crate::infra::health::HttpHealthChecker;
use crate::infra::snapshot::HookSnapshotter;
use crate::infra::state::FileUpdateStore;
use crate::infra::supervisor::Supervisorctl;
use crate::output::{OutputContext, TerminalNotifier};

/// The orchestrator wired with production adapters.
pub type Orchestrator = UpdateOrchestrator<
    HttpCatalogClient,
    HttpDownloader,
    FileUpdateStore,
    LocalStorage,
    HookSnapshotter<TokioCommandRunner>,
    Supervisorctl<TokioCommandRunner>,
    HttpHealthChecker,
    TerminalNotifier,
>;

/// Output rendering flags.
pub struct OutputFlags {
    /// Disable ANSI color output.
    pub no_color: bool,
    /// Suppress non-error output.
    pub quiet: bool,
}

/// Flags passed from the top-level CLI to `AppContext::new`.
pub struct AppFlags {
    /// Output rendering options.
    pub output: OutputFlags,
    /// Explicit config file (`--config`).
    pub config: Option<PathBuf>,
}

/// Catalog identity, from flags or the environment.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct CredentialArgs {
    /// Instance UUID registered with the update catalog
    #[arg(long, env = "UPDATE_AGENT_UUID")]
    pub uuid: Option<String>,

    /// Bearer token for the update catalog
    #[arg(long, env = "UPDATE_AGENT_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
}

/// Unified application context passed to every command handler.
pub struct AppContext {
    /// Terminal output context (colors, quiet mode).
    pub output: OutputContext,
    /// Loaded and validated configuration.
    pub config: AgentConfig,
    /// Where the configuration was read from.
    pub config_path: PathBuf,
}

impl AppContext {
    /// Construct an `AppContext` from top-level CLI flags.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read, parsed or validated.
    pub fn new(flags: AppFlags) -> Result<Self> {
        let store = YamlConfigStore::new(flags.config);
        let config_path = store.path()?;
        let config = store.load()?;
        Ok(Self {
            output: OutputContext::new(flags.output.no_color, flags.output.quiet),
            config,
            config_path,
        })
    }

    /// Build an orchestrator from the production adapters.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be constructed.
    pub fn orchestrator(&self) -> Result<Orchestrator> {
        let config = &self.config;
        let ports = UpdatePorts {
            catalog: HttpCatalogClient::new(config)?,
            downloader: HttpDownloader::new(config).context("building download HTTP client")?,
            store: FileUpdateStore::new(&config.instance_home),
            storage: LocalStorage::new(config),
            snapshots: HookSnapshotter::new(TokioCommandRunner::default(), config.snapshot.clone()),
            supervisor: Supervisorctl::new(TokioCommandRunner::default()),
            health: HttpHealthChecker::new(config)?,
            notifier: TerminalNotifier::new(self.output),
        };
        Ok(UpdateOrchestrator::new(ports, UpdateSettings::from(config)))
    }

    /// Build an orchestrator and authenticate it with `credentials`.
    ///
    /// # Errors
    ///
    /// Returns an error if either credential is missing.
    pub fn authenticated(&self, credentials: &CredentialArgs) -> Result<Orchestrator> {
        let uuid = credentials
            .uuid
            .as_deref()
            .ok_or(ConfigError::Missing("--uuid (or UPDATE_AGENT_UUID)"))?;
        let token = credentials
            .token
            .as_deref()
            .ok_or(ConfigError::Missing("--token (or UPDATE_AGENT_TOKEN)"))?;
        let orchestrator = self.orchestrator()?;
        orchestrator.authenticate(uuid, token);
        Ok(orchestrator)
    }
}
