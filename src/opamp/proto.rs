//! OpAMP wire messages.
//!
//! Hand-written prost definitions for the subset of `opamp.proto` the
//! control plane reads and writes. Field numbers follow the published
//! schema; fields this server never inspects are left out and skipped as
//! unknown on decode. Message-typed fields are `Option`s, so absence is
//! distinguishable from an empty sub-message. Scalars decode to their zero
//! value when absent.

#![expect(
    missing_docs,
    reason = "field names and numbers mirror the OpAMP schema one to one"
)]

use prost::{Enumeration, Message};
use std::collections::HashMap;

/// Message sent by an agent.
#[derive(Clone, PartialEq, Message)]
pub struct AgentToServer {
    #[prost(bytes = "vec", tag = "1")]
    pub instance_uid: Vec<u8>,
    #[prost(uint64, tag = "2")]
    pub sequence_num: u64,
    #[prost(message, optional, tag = "3")]
    pub agent_description: Option<AgentDescription>,
    #[prost(uint64, tag = "4")]
    pub capabilities: u64,
    #[prost(message, optional, tag = "5")]
    pub health: Option<ComponentHealth>,
    #[prost(message, optional, tag = "6")]
    pub effective_config: Option<EffectiveConfig>,
    #[prost(message, optional, tag = "7")]
    pub remote_config_status: Option<RemoteConfigStatus>,
    #[prost(message, optional, tag = "8")]
    pub package_statuses: Option<PackageStatuses>,
    #[prost(message, optional, tag = "9")]
    pub agent_disconnect: Option<AgentDisconnect>,
    #[prost(uint64, tag = "10")]
    pub flags: u64,
    #[prost(message, optional, tag = "14")]
    pub available_components: Option<AvailableComponents>,
    #[prost(message, optional, tag = "15")]
    pub connection_settings_status: Option<ConnectionSettingsStatus>,
}

/// Bits of [`AgentToServer::flags`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum AgentToServerFlags {
    Unspecified = 0,
    RequestInstanceUid = 1,
}

/// Message sent to an agent.
#[derive(Clone, PartialEq, Message)]
pub struct ServerToAgent {
    #[prost(bytes = "vec", tag = "1")]
    pub instance_uid: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub error_response: Option<ServerErrorResponse>,
    #[prost(message, optional, tag = "3")]
    pub remote_config: Option<AgentRemoteConfig>,
    #[prost(message, optional, tag = "4")]
    pub connection_settings: Option<ConnectionSettingsOffers>,
    #[prost(message, optional, tag = "5")]
    pub packages_available: Option<PackagesAvailable>,
    #[prost(uint64, tag = "6")]
    pub flags: u64,
    #[prost(uint64, tag = "7")]
    pub capabilities: u64,
}

/// Bits of [`ServerToAgent::flags`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum ServerToAgentFlags {
    Unspecified = 0,
    ReportFullState = 1,
    ReportAvailableComponents = 2,
}

/// Error returned in place of normal processing.
#[derive(Clone, PartialEq, Message)]
pub struct ServerErrorResponse {
    #[prost(enumeration = "ServerErrorResponseType", tag = "1")]
    pub r#type: i32,
    #[prost(string, tag = "2")]
    pub error_message: String,
    #[prost(oneof = "server_error_response::Details", tags = "3")]
    pub details: Option<server_error_response::Details>,
}

/// Nested types of [`ServerErrorResponse`].
pub mod server_error_response {
    use super::RetryInfo;
    use prost::Oneof;

    /// Extra detail for the error.
    #[derive(Clone, PartialEq, Oneof)]
    pub enum Details {
        #[prost(message, tag = "3")]
        RetryInfo(RetryInfo),
    }
}

/// Error categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum ServerErrorResponseType {
    Unknown = 0,
    BadRequest = 1,
    Unavailable = 2,
}

/// Back-off hint for [`ServerErrorResponseType::Unavailable`].
#[derive(Clone, PartialEq, Message)]
pub struct RetryInfo {
    #[prost(uint64, tag = "1")]
    pub retry_after_nanoseconds: u64,
}

/// Identifying and descriptive attributes.
#[derive(Clone, PartialEq, Message)]
pub struct AgentDescription {
    #[prost(message, repeated, tag = "1")]
    pub identifying_attributes: Vec<KeyValue>,
    #[prost(message, repeated, tag = "2")]
    pub non_identifying_attributes: Vec<KeyValue>,
}

/// Attribute entry.
#[derive(Clone, PartialEq, Message)]
pub struct KeyValue {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(message, optional, tag = "2")]
    pub value: Option<AnyValue>,
}

/// Attribute value; array and map values are not read.
#[derive(Clone, PartialEq, Message)]
pub struct AnyValue {
    #[prost(oneof = "any_value::Value", tags = "1, 2, 3, 4, 7")]
    pub value: Option<any_value::Value>,
}

/// Nested types of [`AnyValue`].
pub mod any_value {
    use prost::Oneof;

    /// Scalar attribute value.
    #[derive(Clone, PartialEq, Oneof)]
    pub enum Value {
        #[prost(string, tag = "1")]
        StringValue(String),
        #[prost(bool, tag = "2")]
        BoolValue(bool),
        #[prost(int64, tag = "3")]
        IntValue(i64),
        #[prost(double, tag = "4")]
        DoubleValue(f64),
        #[prost(bytes, tag = "7")]
        BytesValue(Vec<u8>),
    }
}

/// Health of the agent or one of its components.
#[derive(Clone, PartialEq, Message)]
pub struct ComponentHealth {
    #[prost(bool, tag = "1")]
    pub healthy: bool,
    #[prost(fixed64, tag = "2")]
    pub start_time_unix_nano: u64,
    #[prost(string, tag = "3")]
    pub last_error: String,
    #[prost(string, tag = "4")]
    pub status: String,
    #[prost(fixed64, tag = "5")]
    pub status_time_unix_nano: u64,
    #[prost(map = "string, message", tag = "6")]
    pub component_health_map: HashMap<String, ComponentHealth>,
}

/// Configuration the agent is running.
#[derive(Clone, PartialEq, Message)]
pub struct EffectiveConfig {
    #[prost(message, optional, tag = "1")]
    pub config_map: Option<AgentConfigMap>,
}

/// Named configuration files.
#[derive(Clone, PartialEq, Message)]
pub struct AgentConfigMap {
    #[prost(map = "string, message", tag = "1")]
    pub config_map: HashMap<String, AgentConfigFile>,
}

/// One configuration file.
#[derive(Clone, PartialEq, Message)]
pub struct AgentConfigFile {
    #[prost(bytes = "vec", tag = "1")]
    pub body: Vec<u8>,
    #[prost(string, tag = "2")]
    pub content_type: String,
}

/// Remote configuration offered to the agent.
#[derive(Clone, PartialEq, Message)]
pub struct AgentRemoteConfig {
    #[prost(message, optional, tag = "1")]
    pub config: Option<AgentConfigMap>,
    #[prost(bytes = "vec", tag = "2")]
    pub config_hash: Vec<u8>,
}

/// Agent's report on the last remote configuration.
#[derive(Clone, PartialEq, Message)]
pub struct RemoteConfigStatus {
    #[prost(bytes = "vec", tag = "1")]
    pub last_remote_config_hash: Vec<u8>,
    #[prost(enumeration = "RemoteConfigStatuses", tag = "2")]
    pub status: i32,
    #[prost(string, tag = "3")]
    pub error_message: String,
}

/// Remote configuration states.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum RemoteConfigStatuses {
    Unset = 0,
    Applied = 1,
    Applying = 2,
    Failed = 3,
}

/// Agent's report on its packages.
#[derive(Clone, PartialEq, Message)]
pub struct PackageStatuses {
    #[prost(map = "string, message", tag = "1")]
    pub packages: HashMap<String, PackageStatus>,
    #[prost(bytes = "vec", tag = "2")]
    pub server_provided_all_packages_hash: Vec<u8>,
    #[prost(string, tag = "3")]
    pub error_message: String,
}

/// One package's install state.
#[derive(Clone, PartialEq, Message)]
pub struct PackageStatus {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub agent_has_version: String,
    #[prost(bytes = "vec", tag = "3")]
    pub agent_has_hash: Vec<u8>,
    #[prost(string, tag = "4")]
    pub server_offered_version: String,
    #[prost(bytes = "vec", tag = "5")]
    pub server_offered_hash: Vec<u8>,
    #[prost(enumeration = "PackageStatusEnum", tag = "6")]
    pub status: i32,
    #[prost(string, tag = "7")]
    pub error_message: String,
}

/// Package install states.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum PackageStatusEnum {
    Installed = 0,
    InstallPending = 1,
    Installing = 2,
    InstallFailed = 3,
    Downloading = 4,
}

/// Packages offered to the agent.
#[derive(Clone, PartialEq, Message)]
pub struct PackagesAvailable {
    #[prost(map = "string, message", tag = "1")]
    pub packages: HashMap<String, PackageAvailable>,
    #[prost(bytes = "vec", tag = "2")]
    pub all_packages_hash: Vec<u8>,
}

/// One offered package.
#[derive(Clone, PartialEq, Message)]
pub struct PackageAvailable {
    #[prost(enumeration = "PackageType", tag = "1")]
    pub r#type: i32,
    #[prost(string, tag = "2")]
    pub version: String,
    #[prost(message, optional, tag = "3")]
    pub file: Option<DownloadableFile>,
    #[prost(bytes = "vec", tag = "4")]
    pub hash: Vec<u8>,
}

/// Package kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum PackageType {
    TopLevel = 0,
    Addon = 1,
}

/// Where to fetch a package.
#[derive(Clone, PartialEq, Message)]
pub struct DownloadableFile {
    #[prost(string, tag = "1")]
    pub download_url: String,
    #[prost(bytes = "vec", tag = "2")]
    pub content_hash: Vec<u8>,
}

/// Connection settings offered to the agent.
#[derive(Clone, PartialEq, Message)]
pub struct ConnectionSettingsOffers {
    #[prost(bytes = "vec", tag = "1")]
    pub hash: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub opamp: Option<OpAmpConnectionSettings>,
}

/// Settings for the OpAMP connection itself.
#[derive(Clone, PartialEq, Message)]
pub struct OpAmpConnectionSettings {
    #[prost(string, tag = "1")]
    pub destination_endpoint: String,
    #[prost(message, optional, tag = "2")]
    pub headers: Option<Headers>,
    #[prost(uint64, tag = "4")]
    pub heartbeat_interval_seconds: u64,
}

/// Extra request headers.
#[derive(Clone, PartialEq, Message)]
pub struct Headers {
    #[prost(message, repeated, tag = "1")]
    pub headers: Vec<Header>,
}

/// One request header.
#[derive(Clone, PartialEq, Message)]
pub struct Header {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(string, tag = "2")]
    pub value: String,
}

/// Agent's report on offered connection settings.
#[derive(Clone, PartialEq, Message)]
pub struct ConnectionSettingsStatus {
    #[prost(bytes = "vec", tag = "1")]
    pub last_connection_settings_hash: Vec<u8>,
    #[prost(enumeration = "ConnectionSettingsStatuses", tag = "2")]
    pub status: i32,
    #[prost(string, tag = "3")]
    pub error_message: String,
}

/// Connection-settings states.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum ConnectionSettingsStatuses {
    Unset = 0,
    Applied = 1,
    Applying = 2,
    Failed = 3,
}

/// Agent is about to disconnect.
#[derive(Clone, PartialEq, Message)]
pub struct AgentDisconnect {}

/// Digest of the components an agent has available.
#[derive(Clone, PartialEq, Message)]
pub struct AvailableComponents {
    #[prost(bytes = "vec", tag = "2")]
    pub hash: Vec<u8>,
}

/// Sub-messages kept as raw bytes, used when a full decode fails so each
/// part can be decoded on its own.
#[derive(Clone, PartialEq, Message)]
pub(crate) struct AgentToServerEnvelope {
    #[prost(bytes = "vec", tag = "1")]
    pub instance_uid: Vec<u8>,
    #[prost(uint64, tag = "2")]
    pub sequence_num: u64,
    #[prost(bytes = "vec", optional, tag = "3")]
    pub agent_description: Option<Vec<u8>>,
    #[prost(uint64, tag = "4")]
    pub capabilities: u64,
    #[prost(bytes = "vec", optional, tag = "5")]
    pub health: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "6")]
    pub effective_config: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "7")]
    pub remote_config_status: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "8")]
    pub package_statuses: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "9")]
    pub agent_disconnect: Option<Vec<u8>>,
    #[prost(uint64, tag = "10")]
    pub flags: u64,
    #[prost(bytes = "vec", optional, tag = "14")]
    pub available_components: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "15")]
    pub connection_settings_status: Option<Vec<u8>>,
}
