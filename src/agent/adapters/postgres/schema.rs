//! Diesel schema for agent directory persistence.

diesel::table! {
    /// Registered agents.
    agents (id) {
        /// Surrogate agent identifier.
        id -> Uuid,
        /// Owning organisation.
        org_id -> Uuid,
        /// Agent-chosen instance identifier, unique per organisation.
        #[max_length = 255]
        instance_uid -> Varchar,
        /// Display name from `service.name`.
        #[max_length = 255]
        name -> Nullable<Varchar>,
        /// Optimistic concurrency revision.
        revision -> Int8,
        /// Connection lifecycle status.
        #[max_length = 32]
        connection_status -> Varchar,
        /// Last transport used.
        #[max_length = 32]
        transport -> Nullable<Varchar>,
        /// Highest sequence number seen on the current connection.
        last_sequence_num -> Int8,
        /// Registration-failure marker.
        registration_failed -> Bool,
        /// Raw agent capability bit-field.
        agent_capabilities -> Int8,
        /// Raw server capability bit-field last offered.
        server_capabilities -> Int8,
        /// Whether the agent capabilities were inferred.
        capabilities_inferred -> Bool,
        /// Declared deployment mode.
        #[max_length = 32]
        deployment_mode -> Varchar,
        /// Last directed configuration as JSONB.
        config_target -> Nullable<Jsonb>,
        /// Last remote-config status report as JSONB.
        remote_config -> Nullable<Jsonb>,
        /// Last effective-config report as JSONB.
        effective_config -> Nullable<Jsonb>,
        /// Whether a full state report is outstanding.
        full_state_requested -> Bool,
        /// Last component health report as JSONB.
        reported_health -> Nullable<Jsonb>,
        /// Flattened description attributes as JSONB.
        attributes -> Jsonb,
        /// Last contact time.
        last_seen_at -> Nullable<Timestamptz>,
        /// Creation timestamp.
        created_at -> Timestamptz,
        /// Last update timestamp.
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Targeting tags, one row per (agent, tag).
    agent_tags (agent_id, tag) {
        /// Tagged agent.
        agent_id -> Uuid,
        /// Normalised tag text.
        #[max_length = 64]
        tag -> Varchar,
    }
}

diesel::joinable!(agent_tags -> agents (agent_id));
diesel::allow_tables_to_appear_in_same_query!(agents, agent_tags);
