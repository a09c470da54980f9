//! Changelog mailing list: subscribe, unsubscribe by token, membership lookup.

use crate::app_store::{ChangelogStore, ChangelogSubscriber};
use chrono::Utc;
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

const UNSUBSCRIBE_TOKEN_BYTES: usize = 32;

#[derive(Debug, Error)]
pub enum ChangelogError {
    #[error("Invalid email address: {0:?}")]
    InvalidEmail(String),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// The token is the only credential for unsubscribing and reaches the
/// subscriber through changelog mail, so this type is not serializable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscribeOutcome {
    Subscribed { unsubscribe_token: String },
    AlreadySubscribed,
}

impl SubscribeOutcome {
    pub fn status(&self) -> SubscribeStatus {
        match self {
            SubscribeOutcome::Subscribed { .. } => SubscribeStatus::Subscribed,
            SubscribeOutcome::AlreadySubscribed => SubscribeStatus::AlreadySubscribed,
        }
    }
}

/// What an HTTP caller learns about a subscribe request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubscribeStatus {
    Subscribed,
    AlreadySubscribed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UnsubscribeOutcome {
    Unsubscribed,
    NotFound,
}

/// 32 random bytes, hex encoded.
pub fn generate_unsubscribe_token() -> String {
    let mut bytes = [0u8; UNSUBSCRIBE_TOKEN_BYTES];
    rand::rng().fill(&mut bytes);
    hex::encode(bytes)
}

fn normalize_email(email: &str) -> Result<String, ChangelogError> {
    let normalized = email.trim().to_lowercase();
    if normalized.is_empty() || !normalized.contains('@') {
        return Err(ChangelogError::InvalidEmail(email.to_string()));
    }
    Ok(normalized)
}

#[derive(Clone)]
pub struct ChangelogSubscriptions {
    store: Arc<dyn ChangelogStore>,
}

impl ChangelogSubscriptions {
    pub fn new(store: Arc<dyn ChangelogStore>) -> Self {
        Self { store }
    }

    pub fn subscribe(&self, email: &str) -> Result<SubscribeOutcome, ChangelogError> {
        let email = normalize_email(email)?;
        if self.store.get_changelog_subscriber_by_email(&email)?.is_some() {
            return Ok(SubscribeOutcome::AlreadySubscribed);
        }

        let subscriber = ChangelogSubscriber {
            id: Uuid::new_v4().to_string(),
            email,
            unsubscribe_token: generate_unsubscribe_token(),
            subscribed_at: Utc::now().timestamp_millis(),
        };
        if let Err(err) = self.store.insert_changelog_subscriber(&subscriber) {
            // A concurrent subscribe for the same address wins the unique index.
            if self
                .store
                .get_changelog_subscriber_by_email(&subscriber.email)?
                .is_some()
            {
                debug!("Concurrent subscribe for {}: {:#}", subscriber.email, err);
                return Ok(SubscribeOutcome::AlreadySubscribed);
            }
            return Err(err.into());
        }

        info!("New changelog subscriber {}", subscriber.id);
        Ok(SubscribeOutcome::Subscribed {
            unsubscribe_token: subscriber.unsubscribe_token,
        })
    }

    /// Tokens are single use: the subscriber row is gone after the first
    /// successful call.
    pub fn unsubscribe(&self, token: &str) -> Result<UnsubscribeOutcome, ChangelogError> {
        let token = token.trim();
        if token.is_empty() {
            return Ok(UnsubscribeOutcome::NotFound);
        }
        if self.store.delete_changelog_subscriber_by_token(token)? {
            info!("Changelog subscriber unsubscribed");
            Ok(UnsubscribeOutcome::Unsubscribed)
        } else {
            Ok(UnsubscribeOutcome::NotFound)
        }
    }

    /// Malformed addresses are reported as not subscribed.
    pub fn is_subscribed(&self, email: &str) -> Result<bool, ChangelogError> {
        let Ok(email) = normalize_email(email) else {
            return Ok(false);
        };
        Ok(self
            .store
            .get_changelog_subscriber_by_email(&email)?
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_store::SqliteAppStore;
    use anyhow::{anyhow, Result};
    use tempfile::TempDir;

    fn create_subscriptions() -> (ChangelogSubscriptions, Arc<SqliteAppStore>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteAppStore::new(temp_dir.path().join("app.db")).unwrap());
        let subscriptions = ChangelogSubscriptions::new(store.clone());
        (subscriptions, store, temp_dir)
    }

    fn token_of(outcome: SubscribeOutcome) -> String {
        match outcome {
            SubscribeOutcome::Subscribed { unsubscribe_token } => unsubscribe_token,
            other => panic!("expected Subscribed, got {:?}", other),
        }
    }

    #[test]
    fn test_token_is_64_hex_chars_and_unique() {
        let a = generate_unsubscribe_token();
        let b = generate_unsubscribe_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_subscribe_normalizes_email() {
        let (subscriptions, store, _dir) = create_subscriptions();

        let token = token_of(subscriptions.subscribe("  Alice@Example.COM ").unwrap());

        let stored = store
            .get_changelog_subscriber_by_email("alice@example.com")
            .unwrap()
            .unwrap();
        assert_eq!(stored.unsubscribe_token, token);
        assert!(subscriptions.is_subscribed("ALICE@example.com").unwrap());
    }

    #[test]
    fn test_second_subscribe_is_already_subscribed() {
        let (subscriptions, _store, _dir) = create_subscriptions();

        token_of(subscriptions.subscribe("bob@example.com").unwrap());
        assert_eq!(
            subscriptions.subscribe("Bob@example.com").unwrap(),
            SubscribeOutcome::AlreadySubscribed
        );
    }

    #[test]
    fn test_invalid_email_rejected() {
        let (subscriptions, _store, _dir) = create_subscriptions();

        for email in ["", "   ", "not-an-email"] {
            assert!(matches!(
                subscriptions.subscribe(email),
                Err(ChangelogError::InvalidEmail(_))
            ));
        }
        assert!(!subscriptions.is_subscribed("not-an-email").unwrap());
    }

    #[test]
    fn test_unsubscribe_token_is_single_use() {
        let (subscriptions, _store, _dir) = create_subscriptions();
        let token = token_of(subscriptions.subscribe("carol@example.com").unwrap());

        assert_eq!(
            subscriptions.unsubscribe(&token).unwrap(),
            UnsubscribeOutcome::Unsubscribed
        );
        assert_eq!(
            subscriptions.unsubscribe(&token).unwrap(),
            UnsubscribeOutcome::NotFound
        );
        assert!(!subscriptions.is_subscribed("carol@example.com").unwrap());
    }

    #[test]
    fn test_unknown_token_is_not_found() {
        let (subscriptions, _store, _dir) = create_subscriptions();
        assert_eq!(
            subscriptions.unsubscribe(&"0".repeat(64)).unwrap(),
            UnsubscribeOutcome::NotFound
        );
        assert_eq!(
            subscriptions.unsubscribe("").unwrap(),
            UnsubscribeOutcome::NotFound
        );
    }

    #[test]
    fn test_resubscribe_after_unsubscribe_issues_new_token() {
        let (subscriptions, _store, _dir) = create_subscriptions();
        let first = token_of(subscriptions.subscribe("dave@example.com").unwrap());
        subscriptions.unsubscribe(&first).unwrap();

        let second = token_of(subscriptions.subscribe("dave@example.com").unwrap());
        assert_ne!(first, second);
    }

    struct FailingStore;

    impl ChangelogStore for FailingStore {
        fn insert_changelog_subscriber(&self, _: &ChangelogSubscriber) -> Result<()> {
            Err(anyhow!("store unavailable"))
        }

        fn get_changelog_subscriber_by_email(
            &self,
            _: &str,
        ) -> Result<Option<ChangelogSubscriber>> {
            Err(anyhow!("store unavailable"))
        }

        fn delete_changelog_subscriber_by_token(&self, _: &str) -> Result<bool> {
            Err(anyhow!("store unavailable"))
        }
    }

    #[test]
    fn test_store_failure_is_distinct_from_not_found() {
        let subscriptions = ChangelogSubscriptions::new(Arc::new(FailingStore));

        assert!(matches!(
            subscriptions.unsubscribe("abc"),
            Err(ChangelogError::Store(_))
        ));
        assert!(matches!(
            subscriptions.subscribe("eve@example.com"),
            Err(ChangelogError::Store(_))
        ));
    }

    #[test]
    fn test_outcome_serialization() {
        assert_eq!(
            serde_json::to_value(UnsubscribeOutcome::NotFound).unwrap(),
            serde_json::json!({ "status": "not_found" })
        );
        assert_eq!(
            serde_json::to_value(SubscribeOutcome::AlreadySubscribed.status()).unwrap(),
            serde_json::json!({ "status": "already_subscribed" })
        );
    }

    #[test]
    fn test_subscribed_status_carries_no_token() {
        let (subscriptions, _store, _temp_dir) = create_subscriptions();
        let outcome = subscriptions.subscribe("mail@example.com").unwrap();
        assert!(matches!(outcome, SubscribeOutcome::Subscribed { .. }));

        assert_eq!(
            serde_json::to_value(outcome.status()).unwrap(),
            serde_json::json!({ "status": "subscribed" })
        );
    }
}
