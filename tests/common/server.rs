//! Test server lifecycle management
//!
//! Each test gets an isolated server with its own databases on a random port.

use super::constants::*;
use std::sync::Arc;
use std::time::Duration;
use teamspace_server::app_store::SqliteAppStore;
use teamspace_server::background_jobs::{create_scheduler, maintenance_jobs, JobContext};
use teamspace_server::changelog::ChangelogSubscriptions;
use teamspace_server::rate_limit::RateLimiter;
use teamspace_server::server::{make_app, RequestsLoggingLevel, ServerConfig};
use teamspace_server::server_store::SqliteServerStore;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Test server instance with isolated databases
///
/// When dropped, the server (and scheduler, if any) shut down and the temp
/// directory is removed.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    #[allow(dead_code)]
    pub port: u16,

    /// App store for seeding and inspecting records directly
    #[allow(dead_code)]
    pub app_store: Arc<SqliteAppStore>,

    #[allow(dead_code)]
    pub server_store: Arc<SqliteServerStore>,

    _temp_db_dir: TempDir,
    shutdown_token: CancellationToken,
}

impl TestServer {
    /// Spawns a server with no admin token and no scheduler.
    pub async fn spawn() -> Self {
        Self::spawn_inner(None, false).await
    }

    /// Spawns a server with the admin API enabled (bearer [`ADMIN_TOKEN`])
    /// and a running scheduler holding every maintenance job.
    #[allow(dead_code)]
    pub async fn spawn_with_scheduler() -> Self {
        Self::spawn_inner(Some(ADMIN_TOKEN), true).await
    }

    /// Admin API enabled but no scheduler behind it.
    #[allow(dead_code)]
    pub async fn spawn_admin_without_scheduler() -> Self {
        Self::spawn_inner(Some(ADMIN_TOKEN), false).await
    }

    async fn spawn_inner(admin_token: Option<&str>, with_scheduler: bool) -> Self {
        let temp_db_dir = TempDir::new().expect("Failed to create temp dir");
        let app_store = Arc::new(
            SqliteAppStore::new(temp_db_dir.path().join("app.db"))
                .expect("Failed to open app store"),
        );
        let server_store = Arc::new(
            SqliteServerStore::new(temp_db_dir.path().join("server.db"))
                .expect("Failed to open server store"),
        );

        let shutdown_token = CancellationToken::new();

        let scheduler_handle = if with_scheduler {
            let job_context = JobContext::new(
                CancellationToken::new(),
                app_store.clone(),
                server_store.clone(),
            );
            let (mut scheduler, handle) =
                create_scheduler(server_store.clone(), shutdown_token.clone(), job_context);
            for job in maintenance_jobs() {
                scheduler.register_job(job).await;
            }
            tokio::spawn(async move { scheduler.run().await });
            Some(handle)
        } else {
            None
        };

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let config = ServerConfig {
            requests_logging_level: RequestsLoggingLevel::None,
            port,
            admin_token: admin_token.map(str::to_string),
        };
        let app = make_app(
            config,
            Arc::new(RateLimiter::with_default_policies()),
            ChangelogSubscriptions::new(app_store.clone()),
            scheduler_handle,
        );

        let server_shutdown = shutdown_token.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(server_shutdown.cancelled_owned())
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url,
            port,
            app_store,
            server_store,
            _temp_db_dir: temp_db_dir,
            shutdown_token,
        };

        server.wait_for_ready().await;

        server
    }

    /// Polls `/` until the server answers
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(format!("{}/", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => return,
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown_token.cancel();
    }
}
