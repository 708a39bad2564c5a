use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use axum::{
    Router,
    routing::{get, post, put},
};
use gatehouse_auth::{ProviderRegistry, ReconcileService, Reconciler, ReloadConfig};
use gatehouse_config::{ConfigError, ConfigurationManager, FileWatcherConfig};
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

use crate::{cli::default_validators, handlers, observability};

/// Shared state for HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ConfigurationManager>,
    pub registry: Arc<ProviderRegistry>,
    pub service: Arc<ReconcileService>,
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::healthz))
        .route("/auth/providers", get(handlers::list_providers))
        .route("/config/validate", post(handlers::validate_config))
        .route("/config", put(handlers::put_config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub struct ServerBuilder {
    config_path: PathBuf,
    addr: SocketAddr,
    reload: ReloadConfig,
    watch_debounce: Duration,
}

pub struct GatehouseServer {
    addr: SocketAddr,
    state: AppState,
}

impl ServerBuilder {
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            addr: SocketAddr::from(([127, 0, 0, 1], 8090)),
            reload: ReloadConfig::default(),
            watch_debounce: Duration::from_millis(500),
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_reload_config(mut self, reload: ReloadConfig) -> Self {
        self.reload = reload;
        self
    }

    pub fn with_watch_debounce(mut self, debounce: Duration) -> Self {
        self.watch_debounce = debounce;
        self
    }

    /// Load the configuration file and wire the reconciliation pipeline.
    ///
    /// Nothing runs until [`GatehouseServer::run`].
    pub async fn build(self) -> Result<GatehouseServer, ConfigError> {
        let manager = Arc::new(
            ConfigurationManager::builder()
                .with_file_watcher(
                    FileWatcherConfig::new(&self.config_path).with_debounce(self.watch_debounce),
                )
                .with_validators(default_validators())
                .build()
                .await?,
        );

        tracing::info!(
            path = %self.config_path.display(),
            providers = manager.config().auth.providers.len(),
            "Configuration loaded"
        );

        let registry = Arc::new(ProviderRegistry::new());
        let reconciler = Arc::new(Reconciler::new(registry.clone()));
        let service = Arc::new(ReconcileService::new(
            reconciler,
            manager.clone(),
            self.reload,
        ));

        Ok(GatehouseServer {
            addr: self.addr,
            state: AppState {
                config: manager,
                registry,
                service,
            },
        })
    }
}

impl GatehouseServer {
    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let AppState {
            config, service, ..
        } = self.state.clone();

        observability::apply_logging_level(&config.config().logging.level);
        let logging = spawn_logging_follower(config.clone());

        let reconcile = tokio::spawn({
            let service = service.clone();
            async move { service.run().await }
        });
        config.start_watching().await?;

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(listener, build_app(self.state))
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        config.stop_watching().await;
        service.shutdown();
        if !join_or_abort(reconcile, Duration::from_secs(5)).await {
            tracing::warn!("Reconciliation task did not stop in time, aborted");
        }
        logging.abort();

        tracing::info!("Server stopped");
        Ok(())
    }
}

/// Re-apply `[logging] level` whenever an accepted document changes it.
fn spawn_logging_follower(config: Arc<ConfigurationManager>) -> JoinHandle<()> {
    let mut rx = config.subscribe();
    let mut current = config.config().logging.level.clone();

    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(_) | Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {
                    let level = config.config().logging.level.clone();
                    if level != current {
                        if observability::apply_logging_level(&level) {
                            tracing::info!(level = %level, "Log level updated");
                        }
                        current = level;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Wait for `task` to finish, aborting it once `timeout` elapses.
///
/// Returns `false` if the task had to be aborted.
async fn join_or_abort(mut task: JoinHandle<()>, timeout: Duration) -> bool {
    if tokio::time::timeout(timeout, &mut task).await.is_ok() {
        return true;
    }
    task.abort();
    false
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
