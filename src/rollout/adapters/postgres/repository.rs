//! `PostgreSQL` repository implementation for deployments and audits.

use super::{
    models::{AuditRow, DeploymentRow},
    schema::{config_audits, config_deployments},
};
use crate::agent::domain::{AgentId, AgentTag, OrgId, TagMatch};
use crate::pipeline::domain::ConfigHash;
use crate::rollout::{
    domain::{
        AuditId, AuditStatus, ConfigAudit, ConfigDeployment, ConfigVersion, DeploymentId,
        DeploymentName, DeploymentStatus, PersistedAuditData, PersistedDeploymentData,
        RolloutStrategy,
    },
    ports::{DeploymentRepository, DeploymentRepositoryError, DeploymentRepositoryResult},
};
use async_trait::async_trait;
use diesel::dsl::count_star;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::result::{DatabaseErrorKind, Error as DieselError};

/// `PostgreSQL` connection pool type used by deployment adapters.
pub type DeploymentPgPool = Pool<ConnectionManager<PgConnection>>;

/// `PostgreSQL`-backed deployment repository.
#[derive(Debug, Clone)]
pub struct PostgresDeploymentRepository {
    pool: DeploymentPgPool,
}

impl PostgresDeploymentRepository {
    /// Creates a new repository from a `PostgreSQL` connection pool.
    #[must_use]
    pub const fn new(pool: DeploymentPgPool) -> Self {
        Self { pool }
    }

    async fn run_blocking<F, T>(&self, f: F) -> DeploymentRepositoryResult<T>
    where
        F: FnOnce(&mut PgConnection) -> DeploymentRepositoryResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool.get().map_err(DeploymentRepositoryError::persistence)?;
            f(&mut connection)
        })
        .await
        .map_err(DeploymentRepositoryError::persistence)?
    }
}

impl From<DieselError> for DeploymentRepositoryError {
    fn from(err: DieselError) -> Self {
        Self::persistence(err)
    }
}

#[async_trait]
impl DeploymentRepository for PostgresDeploymentRepository {
    async fn insert(
        &self,
        deployment: &ConfigDeployment,
        audits: &[ConfigAudit],
    ) -> DeploymentRepositoryResult<()> {
        let deployment_row = deployment_to_row(deployment)?;
        let audit_rows = audits.iter().map(audit_to_row).collect::<Result<Vec<_>, _>>()?;
        let deployment_id = deployment.id();
        let first_agent = audits.first().map(ConfigAudit::agent_id);

        self.run_blocking(move |connection| {
            connection.transaction::<_, DeploymentRepositoryError, _>(|tx| {
                diesel::insert_into(config_deployments::table)
                    .values(&deployment_row)
                    .execute(tx)
                    .map_err(|err| match err {
                        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                            DeploymentRepositoryError::DuplicateDeployment(deployment_id)
                        }
                        other => DeploymentRepositoryError::persistence(other),
                    })?;
                insert_audit_rows(tx, &audit_rows, deployment_id, first_agent)
            })
        })
        .await
    }

    async fn update(&self, deployment: &ConfigDeployment) -> DeploymentRepositoryResult<()> {
        let id = deployment.id();
        let status = deployment.status().as_str().to_owned();
        let current_stage = i32::try_from(deployment.current_stage())
            .map_err(DeploymentRepositoryError::persistence)?;
        let updated_at = deployment.updated_at();
        let started_at = deployment.started_at();
        let finished_at = deployment.finished_at();

        self.run_blocking(move |connection| {
            let updated = diesel::update(
                config_deployments::table.filter(config_deployments::id.eq(id.into_inner())),
            )
            .set((
                config_deployments::status.eq(&status),
                config_deployments::current_stage.eq(current_stage),
                config_deployments::updated_at.eq(updated_at),
                config_deployments::started_at.eq(started_at),
                config_deployments::finished_at.eq(finished_at),
            ))
            .execute(connection)?;
            if updated == 0 {
                return Err(DeploymentRepositoryError::NotFound(id));
            }
            Ok(())
        })
        .await
    }

    async fn find(
        &self,
        id: DeploymentId,
    ) -> DeploymentRepositoryResult<Option<ConfigDeployment>> {
        self.run_blocking(move |connection| {
            let row = config_deployments::table
                .filter(config_deployments::id.eq(id.into_inner()))
                .select(DeploymentRow::as_select())
                .first::<DeploymentRow>(connection)
                .optional()?;
            row.map(row_to_deployment).transpose()
        })
        .await
    }

    async fn list_by_org(
        &self,
        org_id: OrgId,
    ) -> DeploymentRepositoryResult<Vec<ConfigDeployment>> {
        self.run_blocking(move |connection| {
            let rows = config_deployments::table
                .filter(config_deployments::org_id.eq(org_id.into_inner()))
                .order(config_deployments::version.desc())
                .select(DeploymentRow::as_select())
                .load::<DeploymentRow>(connection)?;
            rows.into_iter().map(row_to_deployment).collect()
        })
        .await
    }

    async fn insert_audits(&self, audits: &[ConfigAudit]) -> DeploymentRepositoryResult<()> {
        let Some(first) = audits.first() else {
            return Ok(());
        };
        let deployment_id = first.deployment_id();
        let first_agent = Some(first.agent_id());
        let audit_rows = audits.iter().map(audit_to_row).collect::<Result<Vec<_>, _>>()?;

        self.run_blocking(move |connection| {
            connection.transaction::<_, DeploymentRepositoryError, _>(|tx| {
                insert_audit_rows(tx, &audit_rows, deployment_id, first_agent)
            })
        })
        .await
    }

    async fn update_audit(
        &self,
        audit: &ConfigAudit,
        expected: AuditStatus,
    ) -> DeploymentRepositoryResult<()> {
        let id = audit.id().into_inner();
        let deployment_id = audit.deployment_id();
        let agent_id = audit.agent_id();
        let status = audit.status().as_str().to_owned();
        let message = audit.status_message().map(str::to_owned);
        let sent_at = audit.sent_at();
        let reported_at = audit.status_reported_at();
        let updated_at = audit.updated_at();

        self.run_blocking(move |connection| {
            let updated = diesel::update(
                config_audits::table
                    .filter(config_audits::id.eq(id))
                    .filter(config_audits::status.eq(expected.as_str())),
            )
            .set((
                config_audits::status.eq(&status),
                config_audits::status_message.eq(&message),
                config_audits::sent_at.eq(sent_at),
                config_audits::status_reported_at.eq(reported_at),
                config_audits::updated_at.eq(updated_at),
            ))
            .execute(connection)?;
            if updated > 0 {
                return Ok(());
            }
            let exists: i64 = config_audits::table
                .filter(config_audits::id.eq(id))
                .select(count_star())
                .first(connection)?;
            Err(if exists == 0 {
                DeploymentRepositoryError::AuditNotFound {
                    deployment_id,
                    agent_id,
                }
            } else {
                DeploymentRepositoryError::StaleAudit { agent_id, expected }
            })
        })
        .await
    }

    async fn list_audits(
        &self,
        deployment_id: DeploymentId,
    ) -> DeploymentRepositoryResult<Vec<ConfigAudit>> {
        self.run_blocking(move |connection| {
            let rows = config_audits::table
                .filter(config_audits::deployment_id.eq(deployment_id.into_inner()))
                .order(config_audits::agent_id.asc())
                .select(AuditRow::as_select())
                .load::<AuditRow>(connection)?;
            rows.into_iter().map(row_to_audit).collect()
        })
        .await
    }

    async fn list_audits_for_agent(
        &self,
        agent_id: AgentId,
    ) -> DeploymentRepositoryResult<Vec<ConfigAudit>> {
        self.run_blocking(move |connection| {
            let rows = config_audits::table
                .filter(config_audits::agent_id.eq(agent_id.into_inner()))
                .order(config_audits::version.desc())
                .select(AuditRow::as_select())
                .load::<AuditRow>(connection)?;
            rows.into_iter().map(row_to_audit).collect()
        })
        .await
    }

    async fn find_audit_by_hash(
        &self,
        agent_id: AgentId,
        hash: ConfigHash,
    ) -> DeploymentRepositoryResult<Option<ConfigAudit>> {
        let hash_hex = hash.to_string();
        self.run_blocking(move |connection| {
            let row = config_audits::table
                .filter(config_audits::agent_id.eq(agent_id.into_inner()))
                .filter(config_audits::config_hash.eq(&hash_hex))
                .order(config_audits::version.desc())
                .select(AuditRow::as_select())
                .first::<AuditRow>(connection)
                .optional()?;
            row.map(row_to_audit).transpose()
        })
        .await
    }

    async fn next_pending_audit(
        &self,
        agent_id: AgentId,
    ) -> DeploymentRepositoryResult<Option<ConfigAudit>> {
        self.run_blocking(move |connection| {
            let row = config_audits::table
                .filter(config_audits::agent_id.eq(agent_id.into_inner()))
                .filter(config_audits::status.eq(AuditStatus::Pending.as_str()))
                .order(config_audits::version.desc())
                .select(AuditRow::as_select())
                .first::<AuditRow>(connection)
                .optional()?;
            row.map(row_to_audit).transpose()
        })
        .await
    }
}

fn insert_audit_rows(
    connection: &mut PgConnection,
    rows: &[AuditRow],
    deployment_id: DeploymentId,
    first_agent: Option<AgentId>,
) -> DeploymentRepositoryResult<()> {
    if rows.is_empty() {
        return Ok(());
    }
    diesel::insert_into(config_audits::table)
        .values(rows)
        .execute(connection)
        .map_err(|err| match (err, first_agent) {
            (DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _), Some(agent_id)) => {
                DeploymentRepositoryError::DuplicateAudit {
                    deployment_id,
                    agent_id,
                }
            }
            (DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _), _) => {
                DeploymentRepositoryError::NotFound(deployment_id)
            }
            (other, _) => DeploymentRepositoryError::persistence(other),
        })?;
    Ok(())
}

pub(crate) fn deployment_to_row(
    deployment: &ConfigDeployment,
) -> DeploymentRepositoryResult<DeploymentRow> {
    Ok(DeploymentRow {
        id: deployment.id().into_inner(),
        org_id: deployment.org_id().into_inner(),
        name: deployment.name().as_str().to_owned(),
        version: to_db_version(deployment.version())?,
        content: deployment.content().to_owned(),
        config_hash: deployment.hash().to_string(),
        strategy: serde_json::to_value(deployment.strategy())
            .map_err(DeploymentRepositoryError::persistence)?,
        target_tags: serde_json::to_value(deployment.target_tags())
            .map_err(DeploymentRepositoryError::persistence)?,
        tag_match: deployment.tag_match().as_str().to_owned(),
        current_stage: i32::try_from(deployment.current_stage())
            .map_err(DeploymentRepositoryError::persistence)?,
        status: deployment.status().as_str().to_owned(),
        validation_overridden: deployment.validation_overridden(),
        created_at: deployment.created_at(),
        updated_at: deployment.updated_at(),
        started_at: deployment.started_at(),
        finished_at: deployment.finished_at(),
    })
}

pub(crate) fn row_to_deployment(
    row: DeploymentRow,
) -> DeploymentRepositoryResult<ConfigDeployment> {
    let DeploymentRow {
        id,
        org_id,
        name,
        version,
        content,
        config_hash,
        strategy,
        target_tags,
        tag_match,
        current_stage,
        status,
        validation_overridden,
        created_at,
        updated_at,
        started_at,
        finished_at,
    } = row;

    let parsed_strategy: RolloutStrategy =
        serde_json::from_value(strategy).map_err(DeploymentRepositoryError::persistence)?;
    parsed_strategy
        .validate()
        .map_err(DeploymentRepositoryError::persistence)?;
    let parsed_tags: Vec<AgentTag> =
        serde_json::from_value(target_tags).map_err(DeploymentRepositoryError::persistence)?;

    let data = PersistedDeploymentData {
        id: DeploymentId::from_uuid(id),
        org_id: OrgId::from_uuid(org_id),
        name: DeploymentName::new(&name).map_err(DeploymentRepositoryError::persistence)?,
        version: from_db_version(version)?,
        content,
        hash: config_hash
            .parse()
            .map_err(DeploymentRepositoryError::persistence)?,
        strategy: parsed_strategy,
        target_tags: parsed_tags,
        tag_match: TagMatch::try_from(tag_match.as_str())
            .map_err(DeploymentRepositoryError::persistence)?,
        current_stage: usize::try_from(current_stage)
            .map_err(DeploymentRepositoryError::persistence)?,
        status: DeploymentStatus::try_from(status.as_str())
            .map_err(DeploymentRepositoryError::persistence)?,
        validation_overridden,
        created_at,
        updated_at,
        started_at,
        finished_at,
    };
    Ok(ConfigDeployment::from_persisted(data))
}

pub(crate) fn audit_to_row(audit: &ConfigAudit) -> DeploymentRepositoryResult<AuditRow> {
    Ok(AuditRow {
        id: audit.id().into_inner(),
        deployment_id: audit.deployment_id().into_inner(),
        agent_id: audit.agent_id().into_inner(),
        org_id: audit.org_id().into_inner(),
        version: to_db_version(audit.version())?,
        config_hash: audit.config_hash().to_string(),
        status: audit.status().as_str().to_owned(),
        status_message: audit.status_message().map(str::to_owned),
        created_at: audit.created_at(),
        sent_at: audit.sent_at(),
        status_reported_at: audit.status_reported_at(),
        updated_at: audit.updated_at(),
    })
}

pub(crate) fn row_to_audit(row: AuditRow) -> DeploymentRepositoryResult<ConfigAudit> {
    let AuditRow {
        id,
        deployment_id,
        agent_id,
        org_id,
        version,
        config_hash,
        status,
        status_message,
        created_at,
        sent_at,
        status_reported_at,
        updated_at,
    } = row;

    let data = PersistedAuditData {
        id: AuditId::from_uuid(id),
        deployment_id: DeploymentId::from_uuid(deployment_id),
        agent_id: AgentId::from_uuid(agent_id),
        org_id: OrgId::from_uuid(org_id),
        version: from_db_version(version)?,
        config_hash: config_hash
            .parse()
            .map_err(DeploymentRepositoryError::persistence)?,
        status: AuditStatus::try_from(status.as_str())
            .map_err(DeploymentRepositoryError::persistence)?,
        status_message,
        created_at,
        sent_at,
        status_reported_at,
        updated_at,
    };
    Ok(ConfigAudit::from_persisted(data))
}

fn to_db_version(version: ConfigVersion) -> DeploymentRepositoryResult<i64> {
    i64::try_from(version.value()).map_err(DeploymentRepositoryError::persistence)
}

fn from_db_version(value: i64) -> DeploymentRepositoryResult<ConfigVersion> {
    u64::try_from(value)
        .map(ConfigVersion::new)
        .map_err(DeploymentRepositoryError::persistence)
}
