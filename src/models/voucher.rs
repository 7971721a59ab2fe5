use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Unit of the data bundle a voucher grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CapacityUnit {
    Mb,
    Gb,
}

impl CapacityUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            CapacityUnit::Mb => "MB",
            CapacityUnit::Gb => "GB",
        }
    }
}

impl FromStr for CapacityUnit {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "MB" => Ok(CapacityUnit::Mb),
            "GB" => Ok(CapacityUnit::Gb),
            _ => Err(()),
        }
    }
}

impl fmt::Display for CapacityUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Service tier of the bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BundleTier {
    Standard,
    Premium,
}

impl BundleTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            BundleTier::Standard => "standard",
            BundleTier::Premium => "premium",
        }
    }
}

impl FromStr for BundleTier {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "standard" => Ok(BundleTier::Standard),
            "premium" => Ok(BundleTier::Premium),
            _ => Err(()),
        }
    }
}

impl fmt::Display for BundleTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable description of what a buyer is purchasing. These coordinates
/// identify one voucher bucket and must match exactly between the buy
/// request and the later claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherRequest {
    pub tenant_id: String,
    /// Access duration class, e.g. "1d", "7d", "30d" or "hourly".."yearly"
    pub duration_class: String,
    pub capacity_unit: CapacityUnit,
    pub bundle_size: i64,
    pub bundle_tier: BundleTier,
    pub location_id: String,
}

impl VoucherRequest {
    /// Synchronous validation, checked before any store or network call.
    pub fn validate(&self) -> Result<()> {
        if self.tenant_id.trim().is_empty() {
            return Err(AppError::BadRequest("tenant_id is required".into()));
        }
        if self.duration_class.trim().is_empty() {
            return Err(AppError::BadRequest("duration_class is required".into()));
        }
        if self.location_id.trim().is_empty() {
            return Err(AppError::BadRequest("location_id is required".into()));
        }
        if self.bundle_size <= 0 {
            return Err(AppError::BadRequest(
                "bundle_size must be a positive integer".into(),
            ));
        }
        Ok(())
    }

    /// Stable key for cache entries and logging.
    pub fn bucket_key(&self) -> String {
        format!(
            "{}/{}/{}/{}/{}/{}",
            self.tenant_id,
            self.duration_class,
            self.capacity_unit,
            self.bundle_size,
            self.bundle_tier,
            self.location_id
        )
    }
}

/// One redeemable code. The bucket coordinates live on the row, not here;
/// a claim removes the row, so a `Voucher` value only exists in transit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Voucher {
    pub id: String,
    pub code: String,
}

/// Bulk inventory upload: codes destined for one bucket.
#[derive(Debug, Deserialize)]
pub struct CreateVoucherBatch {
    #[serde(flatten)]
    pub request: VoucherRequest,
    pub codes: Vec<String>,
}
