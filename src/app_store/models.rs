use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A pending invitation of an email address into a team.
///
/// Created by the team-invite flow, deleted only by the expired-invite cleanup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invite {
    pub id: String,
    pub team_id: String,
    pub email: String,
    pub role: String,
    /// Unix milliseconds
    pub created_at: i64,
}

impl Invite {
    pub fn new(team_id: &str, email: &str, role: &str, created_at: i64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            team_id: team_id.to_string(),
            email: email.to_string(),
            role: role.to_string(),
            created_at,
        }
    }
}

/// A login session issued by the auth provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub id: String,
    pub user_id: String,
    /// Unix milliseconds
    pub expiration_time: i64,
}

impl AuthSession {
    pub fn new(user_id: &str, expiration_time: i64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            expiration_time,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangelogSubscriber {
    pub id: String,
    /// Normalized (trimmed, lowercase)
    pub email: String,
    /// 64 hex chars, the only handle an unsubscribe link carries
    pub unsubscribe_token: String,
    /// Unix milliseconds
    pub subscribed_at: i64,
}
