use serde::{Deserialize, Serialize};

/// A portal operator. Every plan, voucher bucket and claim session is
/// namespaced under a tenant; buckets of different tenants never contend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    pub name: String,
    /// Shown to buyers when a paid purchase cannot be fulfilled
    pub support_contact: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateTenant {
    pub name: String,
    #[serde(default)]
    pub support_contact: Option<String>,
    /// Physical network locations to register alongside the tenant
    #[serde(default)]
    pub locations: Vec<String>,
}

/// A physical network location (an access point site) of a tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkLocation {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
}
