//! Schema of the application database holding the documents the maintenance
//! jobs and the changelog flow operate on.

use crate::sqlite_column;
use crate::sqlite_persistence::{SqlType, Table, VersionedSchema};

// TODO: the cleanup jobs scan these collections in full; switch them to range
// queries on idx_invites_created_at / idx_auth_sessions_expiration once the
// stores grow past a few thousand rows.
const INVITES_TABLE_V1: Table = Table {
    name: "invites",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("team_id", &SqlType::Text, non_null = true),
        sqlite_column!("email", &SqlType::Text, non_null = true),
        sqlite_column!("role", &SqlType::Text, non_null = true),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true),
    ],
    indices: &[
        ("idx_invites_team_id", "team_id"),
        ("idx_invites_created_at", "created_at"),
    ],
};

const AUTH_SESSIONS_TABLE_V1: Table = Table {
    name: "auth_sessions",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("user_id", &SqlType::Text, non_null = true),
        sqlite_column!("expiration_time", &SqlType::Integer, non_null = true),
    ],
    indices: &[
        ("idx_auth_sessions_user_id", "user_id"),
        ("idx_auth_sessions_expiration", "expiration_time"),
    ],
};

const CHANGELOG_SUBSCRIBERS_TABLE_V1: Table = Table {
    name: "changelog_subscribers",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("email", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!(
            "unsubscribe_token",
            &SqlType::Text,
            non_null = true,
            is_unique = true
        ),
        sqlite_column!("subscribed_at", &SqlType::Integer, non_null = true),
    ],
    indices: &[],
};

pub const APP_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[
        INVITES_TABLE_V1,
        AUTH_SESSIONS_TABLE_V1,
        CHANGELOG_SUBSCRIBERS_TABLE_V1,
    ],
    migration: None,
}];
