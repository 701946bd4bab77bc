//! Diesel row models for deployment persistence.

use super::schema::{config_audits, config_deployments};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;

/// Deployment record.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = config_deployments)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct DeploymentRow {
    /// Deployment identifier.
    pub id: uuid::Uuid,
    /// Owning organisation.
    pub org_id: uuid::Uuid,
    /// Operator-facing name.
    pub name: String,
    /// Global version.
    pub version: i64,
    /// Exact configuration text.
    pub content: String,
    /// Content hash as hex.
    pub config_hash: String,
    /// Strategy payload.
    pub strategy: Value,
    /// Targeting tags payload.
    pub target_tags: Value,
    /// Tag match mode.
    pub tag_match: String,
    /// Current stage index.
    pub current_stage: i32,
    /// Lifecycle status.
    pub status: String,
    /// Validation override flag.
    pub validation_overridden: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
    /// Start timestamp.
    pub started_at: Option<DateTime<Utc>>,
    /// Terminal timestamp.
    pub finished_at: Option<DateTime<Utc>>,
}

/// Audit record.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = config_audits)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct AuditRow {
    /// Audit row identifier.
    pub id: uuid::Uuid,
    /// Delivered deployment.
    pub deployment_id: uuid::Uuid,
    /// Target agent.
    pub agent_id: uuid::Uuid,
    /// Owning organisation.
    pub org_id: uuid::Uuid,
    /// Deployment version.
    pub version: i64,
    /// Content hash as hex.
    pub config_hash: String,
    /// Delivery status.
    pub status: String,
    /// Status detail.
    pub status_message: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Send timestamp.
    pub sent_at: Option<DateTime<Utc>>,
    /// Report timestamp.
    pub status_reported_at: Option<DateTime<Utc>>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Result of `nextval` on the version sequence.
#[derive(Debug, Clone, Copy, QueryableByName)]
pub struct NextVersionRow {
    /// Issued value.
    #[diesel(sql_type = diesel::sql_types::BigInt)]
    pub version: i64,
}
