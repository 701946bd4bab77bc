//! Diesel schema for deployment persistence.

diesel::table! {
    /// Configuration deployments.
    config_deployments (id) {
        /// Deployment identifier.
        id -> Uuid,
        /// Owning organisation.
        org_id -> Uuid,
        /// Operator-facing name.
        #[max_length = 255]
        name -> Varchar,
        /// Global version, unique.
        version -> Int8,
        /// Exact configuration text.
        content -> Text,
        /// SHA-256 of `content` as lowercase hex.
        #[max_length = 64]
        config_hash -> Varchar,
        /// Rollout strategy as JSONB.
        strategy -> Jsonb,
        /// Targeting tags as JSONB.
        target_tags -> Jsonb,
        /// Tag match mode.
        #[max_length = 8]
        tag_match -> Varchar,
        /// Index of the current stage.
        current_stage -> Int4,
        /// Lifecycle status.
        #[max_length = 32]
        status -> Varchar,
        /// Whether failed validation was overridden.
        validation_overridden -> Bool,
        /// Creation timestamp.
        created_at -> Timestamptz,
        /// Last update timestamp.
        updated_at -> Timestamptz,
        /// When targets were first stamped.
        started_at -> Nullable<Timestamptz>,
        /// When a terminal status was reached.
        finished_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    /// Per-agent delivery ledger.
    config_audits (id) {
        /// Audit row identifier.
        id -> Uuid,
        /// Delivered deployment.
        deployment_id -> Uuid,
        /// Target agent.
        agent_id -> Uuid,
        /// Owning organisation.
        org_id -> Uuid,
        /// Version of the deployment.
        version -> Int8,
        /// Hash of the deployment content.
        #[max_length = 64]
        config_hash -> Varchar,
        /// Delivery status.
        #[max_length = 16]
        status -> Varchar,
        /// Agent- or rollback-supplied detail.
        status_message -> Nullable<Text>,
        /// Creation timestamp.
        created_at -> Timestamptz,
        /// When the configuration was sent.
        sent_at -> Nullable<Timestamptz>,
        /// When the agent last reported on it.
        status_reported_at -> Nullable<Timestamptz>,
        /// Last update timestamp.
        updated_at -> Timestamptz,
    }
}

diesel::joinable!(config_audits -> config_deployments (deployment_id));
diesel::allow_tables_to_appear_in_same_query!(config_deployments, config_audits);
