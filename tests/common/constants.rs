//! Shared constants for end-to-end tests

// ============================================================================
// Admin API
// ============================================================================

/// Token the admin-enabled test server expects
pub const ADMIN_TOKEN: &str = "e2e-admin-token";

pub const INVITES_JOB_ID: &str = "cleanup_expired_invites";
pub const SESSIONS_JOB_ID: &str = "cleanup_stale_sessions";
pub const CREDITS_JOB_ID: &str = "reset_monthly_credits";
pub const SUBSCRIPTIONS_JOB_ID: &str = "sync_subscriptions";

// ============================================================================
// Rate limit policies
// ============================================================================

pub const SEND_INVITE_POLICY: &str = "sendInvite";
pub const AI_REQUEST_POLICY: &str = "aiRequest";
pub const FAILED_LOGIN_POLICY: &str = "failedLogin";

// ============================================================================
// Test Timeouts and Configuration
// ============================================================================

/// Maximum time to wait for server to become ready (milliseconds)
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// Timeout for individual HTTP requests (seconds)
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Polling interval when waiting for server ready (milliseconds)
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 50;

/// Maximum time to wait for a triggered job to finish (milliseconds)
pub const JOB_FINISH_TIMEOUT_MS: u64 = 5000;
