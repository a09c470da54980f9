use super::models::{AuthSession, ChangelogSubscriber, Invite};
use super::schema::APP_VERSIONED_SCHEMAS;
use super::{AuthSessionStore, ChangelogStore, InviteStore};
use crate::sqlite_persistence::open_versioned_database;
use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Clone)]
pub struct SqliteAppStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteAppStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned_database(db_path.as_ref(), APP_VERSIONED_SCHEMAS, "app")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("app database connection lock poisoned"))
    }

    fn row_to_invite(row: &rusqlite::Row) -> rusqlite::Result<Invite> {
        Ok(Invite {
            id: row.get("id")?,
            team_id: row.get("team_id")?,
            email: row.get("email")?,
            role: row.get("role")?,
            created_at: row.get("created_at")?,
        })
    }

    fn row_to_auth_session(row: &rusqlite::Row) -> rusqlite::Result<AuthSession> {
        Ok(AuthSession {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            expiration_time: row.get("expiration_time")?,
        })
    }

    fn row_to_subscriber(row: &rusqlite::Row) -> rusqlite::Result<ChangelogSubscriber> {
        Ok(ChangelogSubscriber {
            id: row.get("id")?,
            email: row.get("email")?,
            unsubscribe_token: row.get("unsubscribe_token")?,
            subscribed_at: row.get("subscribed_at")?,
        })
    }
}

impl InviteStore for SqliteAppStore {
    fn insert_invite(&self, invite: &Invite) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO invites (id, team_id, email, role, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                invite.id,
                invite.team_id,
                invite.email,
                invite.role,
                invite.created_at
            ],
        )
        .with_context(|| format!("Failed to insert invite {}", invite.id))?;
        Ok(())
    }

    fn get_all_invites(&self) -> Result<Vec<Invite>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT id, team_id, email, role, created_at FROM invites")?;
        let invites = stmt
            .query_map([], Self::row_to_invite)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(invites)
    }

    fn delete_invite(&self, id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM invites WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }
}

impl AuthSessionStore for SqliteAppStore {
    fn insert_auth_session(&self, session: &AuthSession) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO auth_sessions (id, user_id, expiration_time) VALUES (?1, ?2, ?3)",
            params![session.id, session.user_id, session.expiration_time],
        )
        .with_context(|| format!("Failed to insert auth session {}", session.id))?;
        Ok(())
    }

    fn get_all_auth_sessions(&self) -> Result<Vec<AuthSession>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id, user_id, expiration_time FROM auth_sessions")?;
        let sessions = stmt
            .query_map([], Self::row_to_auth_session)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(sessions)
    }

    fn delete_auth_session(&self, id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM auth_sessions WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }
}

impl ChangelogStore for SqliteAppStore {
    fn insert_changelog_subscriber(&self, subscriber: &ChangelogSubscriber) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO changelog_subscribers (id, email, unsubscribe_token, subscribed_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                subscriber.id,
                subscriber.email,
                subscriber.unsubscribe_token,
                subscriber.subscribed_at
            ],
        )
        .context("Failed to insert changelog subscriber")?;
        Ok(())
    }

    fn get_changelog_subscriber_by_email(
        &self,
        email: &str,
    ) -> Result<Option<ChangelogSubscriber>> {
        let conn = self.conn()?;
        let subscriber = conn
            .query_row(
                "SELECT id, email, unsubscribe_token, subscribed_at
                 FROM changelog_subscribers WHERE email = ?1",
                params![email],
                Self::row_to_subscriber,
            )
            .optional()?;
        Ok(subscriber)
    }

    fn delete_changelog_subscriber_by_token(&self, token: &str) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM changelog_subscribers WHERE unsubscribe_token = ?1",
            params![token],
        )?;
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (SqliteAppStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteAppStore::new(temp_dir.path().join("app.db")).unwrap();
        (store, temp_dir)
    }

    #[test]
    fn test_invite_insert_scan_delete() {
        let (store, _temp_dir) = create_test_store();

        let invite = Invite::new("team-1", "a@example.com", "member", 1_000);
        store.insert_invite(&invite).unwrap();
        store
            .insert_invite(&Invite::new("team-1", "b@example.com", "admin", 2_000))
            .unwrap();

        let all = store.get_all_invites().unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.contains(&invite));

        assert!(store.delete_invite(&invite.id).unwrap());
        assert!(!store.delete_invite(&invite.id).unwrap());
        assert_eq!(store.get_all_invites().unwrap().len(), 1);
    }

    #[test]
    fn test_auth_session_insert_scan_delete() {
        let (store, _temp_dir) = create_test_store();

        let session = AuthSession::new("user-1", 5_000);
        store.insert_auth_session(&session).unwrap();

        assert_eq!(store.get_all_auth_sessions().unwrap(), vec![session.clone()]);
        assert!(store.delete_auth_session(&session.id).unwrap());
        assert!(!store.delete_auth_session("missing").unwrap());
        assert!(store.get_all_auth_sessions().unwrap().is_empty());
    }

    #[test]
    fn test_changelog_subscriber_lookup_and_single_use_delete() {
        let (store, _temp_dir) = create_test_store();

        let subscriber = ChangelogSubscriber {
            id: "s1".to_string(),
            email: "reader@example.com".to_string(),
            unsubscribe_token: "ab".repeat(32),
            subscribed_at: 42,
        };
        store.insert_changelog_subscriber(&subscriber).unwrap();

        assert_eq!(
            store
                .get_changelog_subscriber_by_email("reader@example.com")
                .unwrap(),
            Some(subscriber.clone())
        );
        assert!(store
            .get_changelog_subscriber_by_email("nobody@example.com")
            .unwrap()
            .is_none());

        assert!(store
            .delete_changelog_subscriber_by_token(&subscriber.unsubscribe_token)
            .unwrap());
        assert!(!store
            .delete_changelog_subscriber_by_token(&subscriber.unsubscribe_token)
            .unwrap());
    }

    #[test]
    fn test_duplicate_subscriber_email_is_rejected() {
        let (store, _temp_dir) = create_test_store();
        let first = ChangelogSubscriber {
            id: "s1".to_string(),
            email: "dup@example.com".to_string(),
            unsubscribe_token: "t1".to_string(),
            subscribed_at: 0,
        };
        let second = ChangelogSubscriber {
            id: "s2".to_string(),
            unsubscribe_token: "t2".to_string(),
            ..first.clone()
        };
        store.insert_changelog_subscriber(&first).unwrap();
        assert!(store.insert_changelog_subscriber(&second).is_err());
    }
}
