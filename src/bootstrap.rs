//! Application bootstrap sequencer.
//!
//! Startup follows a fixed total order:
//!
//! 1. `bind_runtime`: synchronous runtime binding (data directory).
//!    Failure is fatal; there is no retry.
//! 2. `init_backend`: asynchronous backend initialization (SQLite store,
//!    flow engine, flow-service handshake). Awaited to completion before
//!    anything is served. Failure aborts startup; the daemon never reaches
//!    `Running` against an unreachable backend.
//! 3. `hand_off`: terminal handoff: the root router is constructed and
//!    registered exactly once, then the serve loop owns the remaining
//!    process lifetime.
//!
//! Each step consumes the previous stage, so running steps out of order or
//! twice does not compile. Transitions are published on a watch channel so
//! the ordering can be asserted from tests.

use std::sync::Arc;

use anyhow::{Context as _, Result};
use tokio::sync::watch;
use tracing::info;

use crate::config::AppConfig;
use crate::flows::{FlowRunner, GenkitClient, SimulatedRunner};
use crate::storage::Storage;
use crate::{jobs, rest, AppContext};

/// Bootstrap lifecycle phases, in the only order they can occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    RuntimeBound,
    BackendReady,
    Running,
}

/// Entry point of the bootstrap sequence.
pub struct Sequencer {
    config: Arc<AppConfig>,
    phase_tx: watch::Sender<Phase>,
}

impl Sequencer {
    pub fn new(config: Arc<AppConfig>) -> (Self, watch::Receiver<Phase>) {
        let (phase_tx, phase_rx) = watch::channel(Phase::Uninitialized);
        (Self { config, phase_tx }, phase_rx)
    }

    /// Step 1: bind to the host runtime. Synchronous; fatal on failure.
    pub fn bind_runtime(self) -> Result<BoundRuntime> {
        std::fs::create_dir_all(&self.config.data_dir).with_context(|| {
            format!(
                "cannot create data directory '{}'",
                self.config.data_dir.display()
            )
        })?;
        self.phase_tx.send_replace(Phase::RuntimeBound);
        info!(data_dir = %self.config.data_dir.display(), "runtime bound");
        Ok(BoundRuntime {
            config: self.config,
            phase_tx: self.phase_tx,
        })
    }
}

/// Sequencer after step 1. The only thing it can do is initialize the backend.
pub struct BoundRuntime {
    config: Arc<AppConfig>,
    phase_tx: watch::Sender<Phase>,
}

impl BoundRuntime {
    /// Step 2: initialize the backend; open storage and stand up the flow
    /// engine. When a remote flow service is configured, a failed handshake
    /// fails the whole bootstrap.
    pub async fn init_backend(self) -> Result<BackendReady> {
        let storage = Arc::new(
            Storage::new_with_slow_query(
                &self.config.data_dir,
                self.config.observability.slow_query_threshold_ms,
            )
            .await
            .context("failed to open storage")?,
        );

        let flows: Arc<dyn FlowRunner> = match &self.config.flow_base_url {
            Some(url) => {
                let client = GenkitClient::new(
                    url,
                    self.config.flow_api_key.as_deref(),
                    self.config.flow_timeout_secs,
                )?;
                client.handshake().await?;
                Arc::new(client)
            }
            None => Arc::new(SimulatedRunner::new()),
        };

        let ctx = Arc::new(AppContext {
            config: self.config,
            storage,
            flows,
            started_at: std::time::Instant::now(),
        });

        self.phase_tx.send_replace(Phase::BackendReady);
        info!("backend ready");
        Ok(BackendReady {
            ctx,
            phase_tx: self.phase_tx,
        })
    }
}

/// Sequencer after step 2, holding the fully built application context.
pub struct BackendReady {
    ctx: Arc<AppContext>,
    phase_tx: watch::Sender<Phase>,
}

impl BackendReady {
    pub fn context(&self) -> Arc<AppContext> {
        self.ctx.clone()
    }

    /// Step 3: terminal handoff. Spawns the background jobs, constructs and
    /// registers the root router exactly once, and enters the serve loop.
    /// Returns only if the server fails.
    pub async fn hand_off(self) -> Result<()> {
        jobs::spawn_all(self.ctx.clone());

        let bind = format!("{}:{}", self.ctx.config.bind_address, self.ctx.config.port);
        let listener = tokio::net::TcpListener::bind(&bind)
            .await
            .with_context(|| format!("cannot bind {bind}"))?;
        let router = rest::build_router(self.ctx.clone());

        self.phase_tx.send_replace(Phase::Running);
        info!(addr = %listener.local_addr()?, "aviatord running");
        axum::serve(listener, router)
            .await
            .context("server terminated")?;
        Ok(())
    }
}

/// Run the whole sequence: bind → await backend → hand off.
pub async fn run(config: Arc<AppConfig>) -> Result<()> {
    let (sequencer, _phase) = Sequencer::new(config);
    sequencer.bind_runtime()?.init_backend().await?.hand_off().await
}
