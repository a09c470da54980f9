//! The document store the maintenance jobs and the changelog flow run against.
//!
//! Each collection gets its own narrow trait so a job only sees the records it
//! is allowed to touch; [`AppStore`] bundles them for wiring.

mod models;
mod schema;
mod sqlite_app_store;

pub use models::{AuthSession, ChangelogSubscriber, Invite};
pub use schema::APP_VERSIONED_SCHEMAS;
pub use sqlite_app_store::SqliteAppStore;

use anyhow::Result;

pub trait InviteStore: Send + Sync {
    fn insert_invite(&self, invite: &Invite) -> Result<()>;

    /// Full collection scan.
    fn get_all_invites(&self) -> Result<Vec<Invite>>;

    /// Returns false if no invite had this id.
    fn delete_invite(&self, id: &str) -> Result<bool>;
}

pub trait AuthSessionStore: Send + Sync {
    fn insert_auth_session(&self, session: &AuthSession) -> Result<()>;

    /// Full collection scan.
    fn get_all_auth_sessions(&self) -> Result<Vec<AuthSession>>;

    /// Returns false if no session had this id.
    fn delete_auth_session(&self, id: &str) -> Result<bool>;
}

pub trait ChangelogStore: Send + Sync {
    fn insert_changelog_subscriber(&self, subscriber: &ChangelogSubscriber) -> Result<()>;

    fn get_changelog_subscriber_by_email(&self, email: &str)
        -> Result<Option<ChangelogSubscriber>>;

    /// Deletes the subscriber holding `token` in a single statement, so two
    /// concurrent unsubscribes with the same token cannot both succeed.
    fn delete_changelog_subscriber_by_token(&self, token: &str) -> Result<bool>;
}

pub trait AppStore: InviteStore + AuthSessionStore + ChangelogStore {}

impl<T: InviteStore + AuthSessionStore + ChangelogStore> AppStore for T {}
