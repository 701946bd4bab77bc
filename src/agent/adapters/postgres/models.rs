//! Diesel row models for agent directory persistence.

use super::schema::{agent_tags, agents};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;

/// Query result row for agent records.
#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = agents)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(treat_none_as_null = true)]
pub struct AgentRow {
    /// Surrogate agent identifier.
    pub id: uuid::Uuid,
    /// Owning organisation.
    pub org_id: uuid::Uuid,
    /// Instance identifier.
    pub instance_uid: String,
    /// Display name.
    pub name: Option<String>,
    /// Optimistic concurrency revision.
    pub revision: i64,
    /// Connection lifecycle status.
    pub connection_status: String,
    /// Last transport used.
    pub transport: Option<String>,
    /// Stored sequence number.
    pub last_sequence_num: i64,
    /// Registration-failure marker.
    pub registration_failed: bool,
    /// Raw agent capability bits.
    pub agent_capabilities: i64,
    /// Raw server capability bits.
    pub server_capabilities: i64,
    /// Inference flag.
    pub capabilities_inferred: bool,
    /// Deployment mode.
    pub deployment_mode: String,
    /// Directed configuration payload.
    pub config_target: Option<Value>,
    /// Remote-config report payload.
    pub remote_config: Option<Value>,
    /// Effective-config report payload.
    pub effective_config: Option<Value>,
    /// Outstanding full state request.
    pub full_state_requested: bool,
    /// Health report payload.
    pub reported_health: Option<Value>,
    /// Description attributes payload.
    pub attributes: Value,
    /// Last contact time.
    pub last_seen_at: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Tag association row.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = agent_tags)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct AgentTagRow {
    /// Tagged agent.
    pub agent_id: uuid::Uuid,
    /// Normalised tag text.
    pub tag: String,
}
