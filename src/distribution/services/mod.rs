//! Service layer for package and connection-settings distribution.

mod distribution;

pub use distribution::{
    DistributionError, DistributionResult, DistributionService, PackageDelivery,
    PublishPackageRequest,
};
