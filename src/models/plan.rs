use serde::{Deserialize, Serialize};

use super::{BundleTier, CapacityUnit, VoucherRequest};

/// A purchasable price plan. A plan pins down the voucher bucket its
/// buyers draw from plus the charge amount.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub duration_class: String,
    pub capacity_unit: CapacityUnit,
    pub bundle_size: i64,
    pub bundle_tier: BundleTier,
    pub location_id: String,
    /// Charge amount in minor units (kobo for NGN)
    pub amount_minor: i64,
    pub currency: String,
    pub created_at: i64,
}

impl Plan {
    /// The bucket this plan sells from.
    pub fn voucher_request(&self) -> VoucherRequest {
        VoucherRequest {
            tenant_id: self.tenant_id.clone(),
            duration_class: self.duration_class.clone(),
            capacity_unit: self.capacity_unit,
            bundle_size: self.bundle_size,
            bundle_tier: self.bundle_tier,
            location_id: self.location_id.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreatePlan {
    pub name: String,
    pub duration_class: String,
    pub capacity_unit: CapacityUnit,
    pub bundle_size: i64,
    pub bundle_tier: BundleTier,
    pub location_id: String,
    pub amount_minor: i64,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    "NGN".to_string()
}
