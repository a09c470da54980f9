//! HTTP client for end-to-end tests
//!
//! Wraps reqwest with one method per endpoint. When API routes or request
//! formats change, update only this file.

use super::constants::*;
use reqwest::Response;
use serde_json::json;
use std::time::Duration;

pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    #[allow(dead_code)]
    pub client: reqwest::Client,
    pub base_url: String,
    /// Sent as a bearer token on admin requests when set
    admin_token: Option<String>,
}

#[allow(dead_code)]
impl TestClient {
    /// Creates a client that sends no admin token
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self {
            client,
            base_url,
            admin_token: None,
        }
    }

    /// Creates a client that authenticates admin requests with [`ADMIN_TOKEN`]
    pub fn admin(base_url: String) -> Self {
        Self::with_admin_token(base_url, ADMIN_TOKEN)
    }

    pub fn with_admin_token(base_url: String, token: &str) -> Self {
        Self {
            admin_token: Some(token.to_string()),
            ..Self::new(base_url)
        }
    }

    fn admin_get(&self, path: &str) -> reqwest::RequestBuilder {
        self.with_admin_auth(self.client.get(format!("{}{}", self.base_url, path)))
    }

    fn with_admin_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.admin_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    // ========================================================================
    // Home
    // ========================================================================

    /// GET /
    pub async fn get_home(&self) -> Response {
        self.client
            .get(format!("{}/", self.base_url))
            .send()
            .await
            .expect("Home request failed")
    }

    // ========================================================================
    // Changelog Endpoints
    // ========================================================================

    /// POST /v1/changelog/subscribe
    pub async fn changelog_subscribe(&self, email: &str) -> Response {
        self.client
            .post(format!("{}/v1/changelog/subscribe", self.base_url))
            .json(&json!({ "email": email }))
            .send()
            .await
            .expect("Subscribe request failed")
    }

    /// POST /v1/changelog/unsubscribe
    pub async fn changelog_unsubscribe(&self, token: &str) -> Response {
        self.client
            .post(format!("{}/v1/changelog/unsubscribe", self.base_url))
            .json(&json!({ "token": token }))
            .send()
            .await
            .expect("Unsubscribe request failed")
    }

    /// GET /v1/changelog/subscribed?email={email}
    pub async fn changelog_is_subscribed(&self, email: &str) -> Response {
        self.client
            .get(format!("{}/v1/changelog/subscribed", self.base_url))
            .query(&[("email", email)])
            .send()
            .await
            .expect("Subscribed request failed")
    }

    // ========================================================================
    // Rate Limit Endpoints
    // ========================================================================

    /// GET /v1/rate-limits
    pub async fn get_rate_limits(&self) -> Response {
        self.client
            .get(format!("{}/v1/rate-limits", self.base_url))
            .send()
            .await
            .expect("Rate limits request failed")
    }

    /// GET /v1/rate-limits/{policy}/check?actor={actor}
    pub async fn check_rate_limit(&self, policy: &str, actor: &str) -> Response {
        self.client
            .get(format!("{}/v1/rate-limits/{}/check", self.base_url, policy))
            .query(&[("actor", actor)])
            .send()
            .await
            .expect("Rate limit check request failed")
    }

    // ========================================================================
    // Plan Endpoints
    // ========================================================================

    /// GET /v1/plans
    pub async fn get_plans(&self) -> Response {
        self.client
            .get(format!("{}/v1/plans", self.base_url))
            .send()
            .await
            .expect("Plans request failed")
    }

    /// GET /v1/plans/{tier}/usage?key={key}&current={current}
    pub async fn get_plan_usage(&self, tier: &str, key: &str, current: u64) -> Response {
        self.client
            .get(format!("{}/v1/plans/{}/usage", self.base_url, tier))
            .query(&[("key", key.to_string()), ("current", current.to_string())])
            .send()
            .await
            .expect("Plan usage request failed")
    }

    // ========================================================================
    // Admin Job Endpoints
    // ========================================================================

    /// GET /v1/admin/jobs
    pub async fn admin_list_jobs(&self) -> Response {
        self.admin_get("/v1/admin/jobs")
            .send()
            .await
            .expect("List jobs request failed")
    }

    /// GET /v1/admin/jobs/{job_id}
    pub async fn admin_get_job(&self, job_id: &str) -> Response {
        self.admin_get(&format!("/v1/admin/jobs/{}", job_id))
            .send()
            .await
            .expect("Get job request failed")
    }

    /// POST /v1/admin/jobs/{job_id}/trigger
    pub async fn admin_trigger_job(&self, job_id: &str) -> Response {
        self.with_admin_auth(self.client.post(format!(
            "{}/v1/admin/jobs/{}/trigger",
            self.base_url, job_id
        )))
        .send()
        .await
        .expect("Trigger job request failed")
    }

    /// GET /v1/admin/jobs/{job_id}/history?limit={limit}
    pub async fn admin_get_job_history(&self, job_id: &str, limit: usize) -> Response {
        self.admin_get(&format!("/v1/admin/jobs/{}/history", job_id))
            .query(&[("limit", limit)])
            .send()
            .await
            .expect("Get job history request failed")
    }

    /// GET /v1/admin/jobs/audit?job_id={job_id}
    pub async fn admin_get_job_audit(&self, job_id: Option<&str>) -> Response {
        let mut request = self.admin_get("/v1/admin/jobs/audit");
        if let Some(job_id) = job_id {
            request = request.query(&[("job_id", job_id)]);
        }
        request.send().await.expect("Get job audit request failed")
    }

    /// Polls the job until it is no longer running and has a finished
    /// last run. Returns that run.
    pub async fn wait_for_finished_run(&self, job_id: &str) -> serde_json::Value {
        let start = std::time::Instant::now();
        loop {
            let job: serde_json::Value = self
                .admin_get_job(job_id)
                .await
                .json()
                .await
                .expect("Job is not JSON");
            let last_run = &job["last_run"];
            if job["is_running"] == false && !last_run.is_null() && last_run["status"] != "running"
            {
                return last_run.clone();
            }
            if start.elapsed() > Duration::from_millis(JOB_FINISH_TIMEOUT_MS) {
                panic!("Job {} did not finish within {}ms", job_id, JOB_FINISH_TIMEOUT_MS);
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }
}
