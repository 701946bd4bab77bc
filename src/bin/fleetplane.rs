//! Fleetplane server.
//!
//! Usage:
//!
//! ```text
//! fleetplane --listen 0.0.0.0:4320 --agents-file agents.yaml \
//!     [--database-url postgres://fleet@localhost/fleet]
//! ```
//!
//! Without a database URL every store is kept in memory and versions are
//! only unique within this process.

use anyhow::{Context, Result};
use clap::Parser;
use diesel::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool};
use fleetplane::agent::{adapters::postgres::PostgresAgentRepository, ports::AgentRepository};
use fleetplane::app::{ControlPlane, InMemoryControlPlane};
use fleetplane::config::{EnrollmentFile, Settings};
use fleetplane::distribution::{
    adapters::memory::InMemoryDistributionRepository, ports::DistributionRepository,
};
use fleetplane::rollout::{
    adapters::postgres::{PostgresDeploymentRepository, PostgresVersionSequence},
    ports::{DeploymentRepository, VersionSequence},
};
use fleetplane::transport::{TransportState, router};
use mockable::{Clock, DefaultClock};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let capabilities = settings.capabilities()?;
    let enrollment = match settings.agents_file.as_deref() {
        Some(path) => EnrollmentFile::load(path)
            .with_context(|| format!("failed to load enrollment file {}", path.display()))?,
        None => {
            warn!("no enrollment file given; every connection will be refused");
            EnrollmentFile::default()
        }
    };

    if let Some(url) = settings.database_url.as_deref() {
        let pool = Pool::builder()
            .max_size(settings.pool_size)
            .build(ConnectionManager::<PgConnection>::new(url))
            .context("failed to build PostgreSQL pool")?;
        info!(pool_size = settings.pool_size, "using PostgreSQL stores");
        let plane = ControlPlane::new(
            Arc::new(PostgresAgentRepository::new(pool.clone())),
            Arc::new(PostgresDeploymentRepository::new(pool.clone())),
            Arc::new(PostgresVersionSequence::new(pool)),
            Arc::new(InMemoryDistributionRepository::new()),
            Arc::new(DefaultClock),
            capabilities,
        );
        serve(&plane, &settings, &enrollment).await
    } else {
        info!("using in-memory stores");
        serve(&InMemoryControlPlane::in_memory(capabilities), &settings, &enrollment).await
    }
}

async fn serve<A, D, S, P, C>(
    plane: &ControlPlane<A, D, S, P, C>,
    settings: &Settings,
    enrollment: &EnrollmentFile,
) -> Result<()>
where
    A: AgentRepository + 'static,
    D: DeploymentRepository + 'static,
    S: VersionSequence + 'static,
    P: DistributionRepository + 'static,
    C: Clock + Send + Sync + 'static,
{
    plane
        .enroll(enrollment)
        .await
        .context("failed to register enrolled agents")?;
    plane
        .offer_heartbeat(enrollment.organisations(), settings.heartbeat_interval_secs)
        .await
        .context("failed to publish connection settings")?;

    let state = TransportState::new(plane.handler(), Arc::new(enrollment.authenticator()))
        .with_max_frame_bytes(settings.max_frame_bytes);
    let listener = TcpListener::bind(settings.listen)
        .await
        .with_context(|| format!("failed to bind {}", settings.listen))?;
    info!(
        listen = %settings.listen,
        agents = enrollment.entries().len(),
        "fleetplane listening"
    );
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server terminated abnormally")
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
