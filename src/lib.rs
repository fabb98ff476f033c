pub mod bootstrap;
pub mod config;
pub mod error;
pub mod flows;
pub mod jobs;
pub mod rest;
pub mod storage;

use std::sync::Arc;

use config::AppConfig;
use flows::FlowRunner;
use storage::Storage;

/// Shared application state passed to every HTTP handler and background job.
///
/// Built exactly once by the bootstrap sequencer and threaded through as an
/// explicit capability reference; nothing in the daemon reaches for ambient
/// global state.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub storage: Arc<Storage>,
    /// Flow engine: remote Genkit-style service, or the simulated runner
    /// when no flow service is configured.
    pub flows: Arc<dyn FlowRunner>,
    pub started_at: std::time::Instant,
}
