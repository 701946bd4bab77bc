//! Translation between wire messages and domain values.

use super::proto::{
    self, AgentConfigFile, AgentConfigMap, AgentRemoteConfig, ConnectionSettingsOffers,
    ConnectionSettingsStatuses, DownloadableFile, Header, Headers, OpAmpConnectionSettings,
    PackageAvailable, PackageStatusEnum, PackageType, PackagesAvailable, RemoteConfigStatuses,
    any_value,
};
use crate::agent::domain::{
    AgentDescription, EffectiveConfig, RemoteConfigState, RemoteConfigStatus, ReportedHealth,
};
use crate::distribution::domain::{
    ConnectionSettingsOffer, PackageKind, PackageStatus, ReportedPackage, ReportedSettings,
    SettingsStatus,
};
use crate::distribution::services::PackageDelivery;
use crate::pipeline::domain::ConfigHash;
use crate::rollout::domain::ConfigDeployment;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};

/// File name the remote configuration is delivered under.
pub(super) const CONFIG_FILE_NAME: &str = "collector.yaml";

const CONFIG_CONTENT_TYPE: &str = "text/yaml";

/// Flattens wire attributes; array and map values are skipped.
pub(super) fn description_from_wire(description: &proto::AgentDescription) -> AgentDescription {
    AgentDescription {
        identifying: attributes(&description.identifying_attributes),
        non_identifying: attributes(&description.non_identifying_attributes),
    }
}

fn attributes(pairs: &[proto::KeyValue]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .filter_map(|pair| {
            let value = match pair.value.as_ref()?.value.as_ref()? {
                any_value::Value::StringValue(text) => text.clone(),
                any_value::Value::BoolValue(flag) => flag.to_string(),
                any_value::Value::IntValue(number) => number.to_string(),
                any_value::Value::DoubleValue(number) => number.to_string(),
                any_value::Value::BytesValue(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            };
            Some((pair.key.clone(), value))
        })
        .collect()
}

pub(super) fn health_from_wire(health: &proto::ComponentHealth, now: DateTime<Utc>) -> ReportedHealth {
    ReportedHealth {
        healthy: health.healthy,
        status: health.status.clone(),
        last_error: non_empty(&health.last_error),
        components: health
            .component_health_map
            .iter()
            .map(|(name, component)| (name.clone(), component.healthy))
            .collect(),
        reported_at: now,
    }
}

/// Joins the reported files in name order and hashes the result.
///
/// A single-file report hashes to exactly the bytes of that file, so it
/// matches the hash of the deployment it came from.
pub(super) fn effective_config_from_wire(
    config: &proto::EffectiveConfig,
    now: DateTime<Utc>,
) -> Option<EffectiveConfig> {
    let files = &config.config_map.as_ref()?.config_map;
    let mut names: Vec<&String> = files.keys().collect();
    names.sort();
    let mut body = Vec::new();
    for name in names {
        if let Some(file) = files.get(name) {
            body.extend_from_slice(&file.body);
        }
    }
    Some(EffectiveConfig {
        hash: ConfigHash::of(&body),
        content: String::from_utf8_lossy(&body).into_owned(),
        reported_at: now,
    })
}

/// Returns `None` for status values outside the schema.
pub(super) fn remote_config_from_wire(
    status: &proto::RemoteConfigStatus,
    now: DateTime<Utc>,
) -> Option<RemoteConfigState> {
    let mapped = match RemoteConfigStatuses::try_from(status.status).ok()? {
        RemoteConfigStatuses::Unset => RemoteConfigStatus::Unset,
        RemoteConfigStatuses::Applied => RemoteConfigStatus::Applied,
        RemoteConfigStatuses::Applying => RemoteConfigStatus::Applying,
        RemoteConfigStatuses::Failed => RemoteConfigStatus::Failed,
    };
    Some(RemoteConfigState {
        status: mapped,
        hash: hash_from_wire(&status.last_remote_config_hash),
        error_message: non_empty(&status.error_message),
        reported_at: now,
    })
}

pub(super) fn packages_from_wire(statuses: &proto::PackageStatuses) -> Vec<ReportedPackage> {
    let mut reports: Vec<ReportedPackage> = statuses
        .packages
        .iter()
        .filter_map(|(key, package)| {
            let status = match PackageStatusEnum::try_from(package.status).ok()? {
                PackageStatusEnum::Installed => PackageStatus::Installed,
                PackageStatusEnum::InstallPending
                | PackageStatusEnum::Installing
                | PackageStatusEnum::Downloading => PackageStatus::Installing,
                PackageStatusEnum::InstallFailed => PackageStatus::Failed,
            };
            let name = if package.name.is_empty() {
                key.clone()
            } else {
                package.name.clone()
            };
            Some(ReportedPackage {
                name,
                status,
                hash: hash_from_wire(&package.server_offered_hash),
                error_message: non_empty(&package.error_message),
            })
        })
        .collect();
    reports.sort_by(|a, b| a.name.cmp(&b.name));
    reports
}

pub(super) fn settings_from_wire(status: &proto::ConnectionSettingsStatus) -> Option<ReportedSettings> {
    let mapped = match ConnectionSettingsStatuses::try_from(status.status).ok()? {
        ConnectionSettingsStatuses::Unset => SettingsStatus::Unset,
        ConnectionSettingsStatuses::Applied => SettingsStatus::Applied,
        ConnectionSettingsStatuses::Applying => SettingsStatus::Applying,
        ConnectionSettingsStatuses::Failed => SettingsStatus::Failed,
    };
    Some(ReportedSettings {
        status: mapped,
        hash: hash_from_wire(&status.last_connection_settings_hash),
        error_message: non_empty(&status.error_message),
    })
}

pub(super) fn remote_config_to_wire(deployment: &ConfigDeployment) -> AgentRemoteConfig {
    let file = AgentConfigFile {
        body: deployment.content().as_bytes().to_vec(),
        content_type: CONFIG_CONTENT_TYPE.to_owned(),
    };
    AgentRemoteConfig {
        config: Some(AgentConfigMap {
            config_map: HashMap::from([(CONFIG_FILE_NAME.to_owned(), file)]),
        }),
        config_hash: deployment.hash().as_bytes().to_vec(),
    }
}

pub(super) fn packages_to_wire(delivery: &PackageDelivery) -> PackagesAvailable {
    PackagesAvailable {
        packages: delivery
            .offers
            .iter()
            .map(|offer| {
                let kind = match offer.kind() {
                    PackageKind::TopLevel => PackageType::TopLevel,
                    PackageKind::Addon => PackageType::Addon,
                };
                let available = PackageAvailable {
                    r#type: kind.into(),
                    version: offer.version().to_owned(),
                    file: Some(DownloadableFile {
                        download_url: offer.download_url().to_owned(),
                        content_hash: offer.hash().as_bytes().to_vec(),
                    }),
                    hash: offer.hash().as_bytes().to_vec(),
                };
                (offer.name().as_str().to_owned(), available)
            })
            .collect(),
        all_packages_hash: delivery.hash.as_bytes().to_vec(),
    }
}

pub(super) fn settings_to_wire(offer: &ConnectionSettingsOffer) -> ConnectionSettingsOffers {
    let headers = (!offer.headers().is_empty()).then(|| Headers {
        headers: offer
            .headers()
            .iter()
            .map(|(key, value)| Header {
                key: key.clone(),
                value: value.clone(),
            })
            .collect(),
    });
    ConnectionSettingsOffers {
        hash: offer.hash().as_bytes().to_vec(),
        opamp: Some(OpAmpConnectionSettings {
            destination_endpoint: offer.endpoint().unwrap_or_default().to_owned(),
            headers,
            heartbeat_interval_seconds: offer.heartbeat_interval_secs(),
        }),
    }
}

fn hash_from_wire(bytes: &[u8]) -> Option<ConfigHash> {
    if bytes.is_empty() {
        return None;
    }
    ConfigHash::from_wire(bytes).ok()
}

fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}
