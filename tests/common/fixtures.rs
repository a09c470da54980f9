//! Records seeded straight into the app store before a test drives the API.

use chrono::Utc;
use teamspace_server::app_store::{
    AuthSession, AuthSessionStore, ChangelogStore, Invite, InviteStore,
};

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

pub fn days_ago_ms(days: i64) -> i64 {
    Utc::now().timestamp_millis() - days * DAY_MS
}

/// Inserts one invite per entry, created `days` ago. Returns their ids.
pub fn seed_invites(store: &dyn InviteStore, ages_in_days: &[i64]) -> Vec<String> {
    ages_in_days
        .iter()
        .enumerate()
        .map(|(i, days)| {
            let invite = Invite::new(
                "team-e2e",
                &format!("invitee{}@example.com", i),
                "member",
                days_ago_ms(*days),
            );
            store.insert_invite(&invite).expect("Failed to seed invite");
            invite.id
        })
        .collect()
}

/// Inserts one session per entry, expired `days` ago (negative is in the future).
pub fn seed_sessions(store: &dyn AuthSessionStore, expired_days_ago: &[i64]) -> Vec<String> {
    expired_days_ago
        .iter()
        .map(|days| {
            let session = AuthSession::new("user-e2e", days_ago_ms(*days));
            store
                .insert_auth_session(&session)
                .expect("Failed to seed session");
            session.id
        })
        .collect()
}

/// The unsubscribe token stored for `email`, as the changelog mail would carry it.
pub fn unsubscribe_token_for(store: &dyn ChangelogStore, email: &str) -> String {
    store
        .get_changelog_subscriber_by_email(email)
        .expect("Failed to read changelog subscriber")
        .expect("No changelog subscriber for email")
        .unsubscribe_token
}
