//! SQLite schema definitions for the engine database.
//!
//! This module defines the tables holding backup jobs, their scheduling state,
//! execution history, webhooks and the webhook delivery log.

use crate::sqlite_column;
use crate::sqlite_persistence::{
    Column, ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema,
};

// =============================================================================
// Version 1 - Backups, schedules and executions
// =============================================================================

const BACKUPS_TABLE_V1: Table = Table {
    name: "backups",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true), // UUID
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("database_id", &SqlType::Text, non_null = true),
        sqlite_column!("destination_id", &SqlType::Text, non_null = true),
        sqlite_column!("cron_expression", &SqlType::Text, non_null = true),
        sqlite_column!("retention_days", &SqlType::Integer, non_null = true),
        sqlite_column!("is_active", &SqlType::Integer, non_null = true),
        sqlite_column!("created_at", &SqlType::Text, non_null = true),
        sqlite_column!("updated_at", &SqlType::Text, non_null = true),
    ],
    indices: &[("idx_backups_created_at", "created_at DESC")],
};

const BACKUP_FK_CASCADE: ForeignKey = ForeignKey {
    foreign_table: "backups",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Cascade,
};

const BACKUP_FK_SET_NULL: ForeignKey = ForeignKey {
    foreign_table: "backups",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::SetNull,
};

/// Next/last fire time per backup, kept so a restart can detect missed runs.
const BACKUP_SCHEDULES_TABLE_V1: Table = Table {
    name: "backup_schedules",
    columns: &[
        sqlite_column!(
            "backup_id",
            &SqlType::Text,
            is_primary_key = true,
            foreign_key = Some(&BACKUP_FK_CASCADE)
        ),
        sqlite_column!("next_run_at", &SqlType::Text, non_null = true),
        sqlite_column!("last_run_at", &SqlType::Text),
    ],
    indices: &[],
};

/// Execution history. Rows outlive their backup (`backup_id` becomes NULL).
const EXECUTIONS_TABLE_V1: Table = Table {
    name: "executions",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!(
            "backup_id",
            &SqlType::Text,
            foreign_key = Some(&BACKUP_FK_SET_NULL)
        ),
        sqlite_column!("database_id", &SqlType::Text, non_null = true),
        sqlite_column!("destination_id", &SqlType::Text, non_null = true),
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!("path", &SqlType::Text),
        sqlite_column!("file_size", &SqlType::Integer),
        sqlite_column!("error", &SqlType::Text),
        sqlite_column!("started_at", &SqlType::Text, non_null = true),
        sqlite_column!("finished_at", &SqlType::Text),
    ],
    indices: &[
        ("idx_executions_backup_id", "backup_id"),
        ("idx_executions_database_id", "database_id"),
        ("idx_executions_destination_id", "destination_id"),
        ("idx_executions_status", "status"),
        ("idx_executions_started_at", "started_at DESC"),
    ],
};

// =============================================================================
// Version 2 - Webhooks and delivery log
// =============================================================================

const WEBHOOKS_TABLE_V2: Table = Table {
    name: "webhooks",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("event_type", &SqlType::Text, non_null = true),
        sqlite_column!("target_ids", &SqlType::Text, non_null = true), // JSON array
        sqlite_column!("is_active", &SqlType::Integer, non_null = true),
        sqlite_column!("method", &SqlType::Text, non_null = true),
        sqlite_column!("url", &SqlType::Text, non_null = true),
        sqlite_column!("headers", &SqlType::Text), // JSON object
        sqlite_column!("body", &SqlType::Text),    // JSON template
        sqlite_column!("created_at", &SqlType::Text, non_null = true),
        sqlite_column!("updated_at", &SqlType::Text, non_null = true),
    ],
    indices: &[
        ("idx_webhooks_event_type", "event_type"),
        ("idx_webhooks_created_at", "created_at DESC"),
    ],
};

const WEBHOOK_FK_CASCADE: ForeignKey = ForeignKey {
    foreign_table: "webhooks",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Cascade,
};

const WEBHOOK_EXECUTIONS_TABLE_V2: Table = Table {
    name: "webhook_executions",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!(
            "webhook_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&WEBHOOK_FK_CASCADE)
        ),
        sqlite_column!("event_id", &SqlType::Text, non_null = true),
        sqlite_column!("event_type", &SqlType::Text, non_null = true),
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!("attempts", &SqlType::Integer, non_null = true),
        sqlite_column!("request_method", &SqlType::Text, non_null = true),
        sqlite_column!("request_url", &SqlType::Text, non_null = true),
        sqlite_column!("request_body", &SqlType::Text),
        sqlite_column!("response_status", &SqlType::Integer),
        sqlite_column!("error", &SqlType::Text),
        sqlite_column!("duration_ms", &SqlType::Integer, non_null = true),
        sqlite_column!("created_at", &SqlType::Text, non_null = true),
    ],
    indices: &[(
        "idx_webhook_executions_webhook_created",
        "webhook_id, created_at DESC",
    )],
};

fn migrate_v1_to_v2(conn: &rusqlite::Connection) -> anyhow::Result<()> {
    WEBHOOKS_TABLE_V2.create(conn)?;
    WEBHOOK_EXECUTIONS_TABLE_V2.create(conn)?;
    Ok(())
}

// =============================================================================
// Versioned Schema Definition
// =============================================================================

/// Version 1: backups, backup_schedules, executions
/// Version 2: webhooks, webhook_executions
pub const ENGINE_VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 1,
        tables: &[BACKUPS_TABLE_V1, BACKUP_SCHEDULES_TABLE_V1, EXECUTIONS_TABLE_V1],
        migration: None,
    },
    VersionedSchema {
        version: 2,
        tables: &[
            BACKUPS_TABLE_V1,
            BACKUP_SCHEDULES_TABLE_V1,
            EXECUTIONS_TABLE_V1,
            WEBHOOKS_TABLE_V2,
            WEBHOOK_EXECUTIONS_TABLE_V2,
        ],
        migration: Some(migrate_v1_to_v2),
    },
];
