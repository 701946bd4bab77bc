//! `PostgreSQL` repository implementation for the agent directory.

use super::{
    models::{AgentRow, AgentTagRow},
    schema::{agent_tags, agents},
};
use crate::agent::{
    domain::{
        Agent, AgentId, AgentTag, ConnectionStatus, DeploymentMode, InstanceUid, OrgId,
        PersistedAgentData, TagMatch, TransportType,
    },
    ports::{AgentRepository, AgentRepositoryError, AgentRepositoryResult},
};
use crate::capability::{AgentCapabilities, ServerCapabilities};
use async_trait::async_trait;
use diesel::dsl::count_star;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};

/// `PostgreSQL` connection pool type used by the agent directory adapter.
pub type AgentPgPool = Pool<ConnectionManager<PgConnection>>;

/// `PostgreSQL`-backed agent repository.
#[derive(Debug, Clone)]
pub struct PostgresAgentRepository {
    pool: AgentPgPool,
}

impl PostgresAgentRepository {
    /// Creates a new repository from a `PostgreSQL` connection pool.
    #[must_use]
    pub const fn new(pool: AgentPgPool) -> Self {
        Self { pool }
    }

    async fn run_blocking<F, T>(&self, f: F) -> AgentRepositoryResult<T>
    where
        F: FnOnce(&mut PgConnection) -> AgentRepositoryResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool.get().map_err(AgentRepositoryError::persistence)?;
            f(&mut connection)
        })
        .await
        .map_err(AgentRepositoryError::persistence)?
    }
}

impl From<DieselError> for AgentRepositoryError {
    fn from(err: DieselError) -> Self {
        Self::persistence(err)
    }
}

#[async_trait]
impl AgentRepository for PostgresAgentRepository {
    async fn insert(&self, agent: &Agent) -> AgentRepositoryResult<()> {
        let row = agent_to_row(agent)?;
        let tag_rows = tag_rows(agent);
        let org_id = agent.org_id();
        let instance_uid = agent.instance_uid().clone();

        self.run_blocking(move |connection| {
            connection.transaction::<_, AgentRepositoryError, _>(|tx| {
                diesel::insert_into(agents::table)
                    .values(&row)
                    .execute(tx)
                    .map_err(|err| match err {
                        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                            AgentRepositoryError::DuplicateInstance {
                                org_id,
                                instance_uid: instance_uid.clone(),
                            }
                        }
                        other => AgentRepositoryError::persistence(other),
                    })?;
                if !tag_rows.is_empty() {
                    diesel::insert_into(agent_tags::table)
                        .values(&tag_rows)
                        .execute(tx)?;
                }
                Ok(())
            })
        })
        .await
    }

    async fn update(&self, agent: &mut Agent) -> AgentRepositoryResult<()> {
        let id = agent.id();
        let expected = agent.revision();
        let mut row = agent_to_row(agent)?;
        row.revision = to_db_int(expected.saturating_add(1))?;
        let expected_db = to_db_int(expected)?;
        let replacement_tags = tag_rows(agent);

        self.run_blocking(move |connection| {
            connection.transaction::<_, AgentRepositoryError, _>(|tx| {
                let updated = diesel::update(
                    agents::table
                        .filter(agents::id.eq(id.into_inner()))
                        .filter(agents::revision.eq(expected_db)),
                )
                .set(&row)
                .execute(tx)?;

                if updated == 0 {
                    let exists: i64 = agents::table
                        .filter(agents::id.eq(id.into_inner()))
                        .select(count_star())
                        .first(tx)?;
                    return Err(if exists == 0 {
                        AgentRepositoryError::NotFound(id)
                    } else {
                        AgentRepositoryError::ConcurrentModification { id, expected }
                    });
                }

                diesel::delete(agent_tags::table.filter(agent_tags::agent_id.eq(id.into_inner())))
                    .execute(tx)?;
                if !replacement_tags.is_empty() {
                    diesel::insert_into(agent_tags::table)
                        .values(&replacement_tags)
                        .execute(tx)?;
                }
                Ok(())
            })
        })
        .await?;

        agent.advance_revision();
        Ok(())
    }

    async fn find_by_id(&self, id: AgentId) -> AgentRepositoryResult<Option<Agent>> {
        self.run_blocking(move |connection| {
            let rows = agents::table
                .filter(agents::id.eq(id.into_inner()))
                .select(AgentRow::as_select())
                .load::<AgentRow>(connection)?;
            Ok(hydrate(connection, rows)?.into_iter().next())
        })
        .await
    }

    async fn find_by_instance_uid(
        &self,
        org_id: OrgId,
        instance_uid: &InstanceUid,
    ) -> AgentRepositoryResult<Option<Agent>> {
        let uid = instance_uid.as_str().to_owned();
        self.run_blocking(move |connection| {
            let rows = agents::table
                .filter(agents::org_id.eq(org_id.into_inner()))
                .filter(agents::instance_uid.eq(&uid))
                .select(AgentRow::as_select())
                .load::<AgentRow>(connection)?;
            Ok(hydrate(connection, rows)?.into_iter().next())
        })
        .await
    }

    async fn list_by_org(&self, org_id: OrgId) -> AgentRepositoryResult<Vec<Agent>> {
        self.run_blocking(move |connection| {
            let rows = agents::table
                .filter(agents::org_id.eq(org_id.into_inner()))
                .order(agents::id.asc())
                .select(AgentRow::as_select())
                .load::<AgentRow>(connection)?;
            hydrate(connection, rows)
        })
        .await
    }

    async fn list_by_tags(
        &self,
        org_id: OrgId,
        tags: &[AgentTag],
        mode: TagMatch,
    ) -> AgentRepositoryResult<Vec<Agent>> {
        let wanted: Vec<String> = tags.iter().map(|tag| tag.as_str().to_owned()).collect();
        let wanted_tags = tags.to_vec();
        self.run_blocking(move |connection| {
            let mut query = agents::table
                .filter(agents::org_id.eq(org_id.into_inner()))
                .order(agents::id.asc())
                .select(AgentRow::as_select())
                .into_boxed();
            if !wanted.is_empty() {
                let tagged = agent_tags::table
                    .filter(agent_tags::tag.eq_any(wanted))
                    .select(agent_tags::agent_id);
                query = query.filter(agents::id.eq_any(tagged));
            }
            let rows = query.load::<AgentRow>(connection)?;
            let agents = hydrate(connection, rows)?;
            // `All` needs every tag; the SQL prefilter only guarantees one.
            Ok(agents
                .into_iter()
                .filter(|agent| mode.matches(&wanted_tags, agent.tags()))
                .collect())
        })
        .await
    }
}

fn hydrate(
    connection: &mut PgConnection,
    rows: Vec<AgentRow>,
) -> AgentRepositoryResult<Vec<Agent>> {
    let ids: Vec<uuid::Uuid> = rows.iter().map(|row| row.id).collect();
    let mut tags_by_agent: HashMap<uuid::Uuid, BTreeSet<String>> = HashMap::new();
    for tag_row in agent_tags::table
        .filter(agent_tags::agent_id.eq_any(ids))
        .select(AgentTagRow::as_select())
        .load::<AgentTagRow>(connection)?
    {
        tags_by_agent
            .entry(tag_row.agent_id)
            .or_default()
            .insert(tag_row.tag);
    }
    rows.into_iter()
        .map(|row| {
            let tags = tags_by_agent.remove(&row.id).unwrap_or_default();
            row_to_agent(row, tags)
        })
        .collect()
}

fn tag_rows(agent: &Agent) -> Vec<AgentTagRow> {
    agent
        .tags()
        .iter()
        .map(|tag| AgentTagRow {
            agent_id: agent.id().into_inner(),
            tag: tag.as_str().to_owned(),
        })
        .collect()
}

pub(crate) fn agent_to_row(agent: &Agent) -> AgentRepositoryResult<AgentRow> {
    Ok(AgentRow {
        id: agent.id().into_inner(),
        org_id: agent.org_id().into_inner(),
        instance_uid: agent.instance_uid().as_str().to_owned(),
        name: agent.name().map(str::to_owned),
        revision: to_db_int(agent.revision())?,
        connection_status: agent.connection_status().as_str().to_owned(),
        transport: agent.transport().map(|transport| transport.as_str().to_owned()),
        last_sequence_num: to_db_int(agent.last_sequence_num())?,
        registration_failed: agent.registration_failed(),
        agent_capabilities: agent.agent_capabilities().encode().cast_signed(),
        server_capabilities: agent.server_capabilities().encode().cast_signed(),
        capabilities_inferred: agent.capabilities_inferred(),
        deployment_mode: agent.deployment_mode().as_str().to_owned(),
        config_target: to_json_opt(agent.config_target().as_ref())?,
        remote_config: to_json_opt(agent.remote_config())?,
        effective_config: to_json_opt(agent.effective_config())?,
        full_state_requested: agent.full_state_requested(),
        reported_health: to_json_opt(agent.reported_health())?,
        attributes: serde_json::to_value(agent.attributes())
            .map_err(AgentRepositoryError::persistence)?,
        last_seen_at: agent.last_seen_at(),
        created_at: agent.created_at(),
        updated_at: agent.updated_at(),
    })
}

pub(crate) fn row_to_agent(
    row: AgentRow,
    tags: BTreeSet<String>,
) -> AgentRepositoryResult<Agent> {
    let AgentRow {
        id,
        org_id,
        instance_uid,
        name,
        revision,
        connection_status,
        transport,
        last_sequence_num,
        registration_failed,
        agent_capabilities,
        server_capabilities,
        capabilities_inferred,
        deployment_mode,
        config_target,
        remote_config,
        effective_config,
        full_state_requested,
        reported_health,
        attributes,
        last_seen_at,
        created_at,
        updated_at,
    } = row;

    let parsed_tags = tags
        .into_iter()
        .map(AgentTag::new)
        .collect::<Result<BTreeSet<_>, _>>()
        .map_err(AgentRepositoryError::persistence)?;

    let data = PersistedAgentData {
        id: AgentId::from_uuid(id),
        org_id: OrgId::from_uuid(org_id),
        instance_uid: InstanceUid::new(instance_uid).map_err(AgentRepositoryError::persistence)?,
        name,
        revision: from_db_int(revision)?,
        connection_status: ConnectionStatus::try_from(connection_status.as_str())
            .map_err(AgentRepositoryError::persistence)?,
        transport: transport
            .as_deref()
            .map(TransportType::try_from)
            .transpose()
            .map_err(AgentRepositoryError::persistence)?,
        last_sequence_num: from_db_int(last_sequence_num)?,
        registration_failed,
        agent_capabilities: AgentCapabilities::decode(agent_capabilities.cast_unsigned()),
        server_capabilities: ServerCapabilities::decode(server_capabilities.cast_unsigned()),
        capabilities_inferred,
        deployment_mode: DeploymentMode::try_from(deployment_mode.as_str())
            .map_err(AgentRepositoryError::persistence)?,
        tags: parsed_tags,
        config_target: from_json_opt(config_target)?,
        remote_config: from_json_opt(remote_config)?,
        effective_config: from_json_opt(effective_config)?,
        full_state_requested,
        reported_health: from_json_opt(reported_health)?,
        attributes: serde_json::from_value(attributes)
            .map_err(AgentRepositoryError::persistence)?,
        last_seen_at,
        created_at,
        updated_at,
    };
    Ok(Agent::from_persisted(data))
}

fn to_db_int(value: u64) -> AgentRepositoryResult<i64> {
    i64::try_from(value).map_err(AgentRepositoryError::persistence)
}

fn from_db_int(value: i64) -> AgentRepositoryResult<u64> {
    u64::try_from(value).map_err(AgentRepositoryError::persistence)
}

fn to_json_opt<T: Serialize>(value: Option<&T>) -> AgentRepositoryResult<Option<Value>> {
    value
        .map(serde_json::to_value)
        .transpose()
        .map_err(AgentRepositoryError::persistence)
}

fn from_json_opt<T: DeserializeOwned>(value: Option<Value>) -> AgentRepositoryResult<Option<T>> {
    value
        .map(serde_json::from_value)
        .transpose()
        .map_err(AgentRepositoryError::persistence)
}
