use crate::app_store::AppStore;
use crate::server_store::ServerStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// What a job gets to work with while it runs.
#[derive(Clone)]
pub struct JobContext {
    /// Cancelled on shutdown for jobs that allow it.
    pub cancellation_token: CancellationToken,

    /// Invites, sessions and other team data the jobs clean up.
    pub app_store: Arc<dyn AppStore>,

    /// Job history and the audit log.
    pub server_store: Arc<dyn ServerStore>,
}

impl JobContext {
    pub fn new(
        cancellation_token: CancellationToken,
        app_store: Arc<dyn AppStore>,
        server_store: Arc<dyn ServerStore>,
    ) -> Self {
        Self {
            cancellation_token,
            app_store,
            server_store,
        }
    }

    /// Derives a context for a single run, sharing the stores.
    pub fn with_token(&self, cancellation_token: CancellationToken) -> Self {
        Self {
            cancellation_token,
            app_store: Arc::clone(&self.app_store),
            server_store: Arc::clone(&self.server_store),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}
