//! Domain model for package and connection-settings distribution.

mod delivery;
mod error;
mod package;
mod settings;

pub use delivery::{Delivery, DeliveryReport, LedgerStatus};
pub use error::{DistributionDomainError, ParseDistributionValueError};
pub use package::{
    PackageKind, PackageName, PackageOffer, PackageRecord, PackageStatus, ReportedPackage,
};
pub use settings::{ConnectionSettingsOffer, ReportedSettings, SettingsRecord, SettingsStatus};
