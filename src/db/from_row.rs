//! Row mapping trait and helpers for reducing boilerplate in queries.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::*;

/// Parse a string column into an enum type, converting parse errors to
/// rusqlite errors instead of panicking on unexpected stored values.
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// Trait for constructing a type from a database row.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

/// Query for multiple results.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============ SQL SELECT Constants ============

pub const TENANT_COLS: &str = "id, name, support_contact, created_at";

pub const LOCATION_COLS: &str = "id, tenant_id, name";

pub const PLAN_COLS: &str = "id, tenant_id, name, duration_class, capacity_unit, bundle_size, bundle_tier, location_id, amount_minor, currency, created_at";

pub const VOUCHER_COLS: &str = "id, code";

pub const CLAIM_SESSION_COLS: &str = "id, tenant_id, payment_reference, provider, duration_class, capacity_unit, bundle_size, bundle_tier, location_id, amount_minor, currency, email, stage, claimed_voucher_code, last_error, verify_attempts, created_at, updated_at";

// ============ FromRow Implementations ============

impl FromRow for Tenant {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Tenant {
            id: row.get(0)?,
            name: row.get(1)?,
            support_contact: row.get(2)?,
            created_at: row.get(3)?,
        })
    }
}

impl FromRow for NetworkLocation {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(NetworkLocation {
            id: row.get(0)?,
            tenant_id: row.get(1)?,
            name: row.get(2)?,
        })
    }
}

impl FromRow for Plan {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Plan {
            id: row.get(0)?,
            tenant_id: row.get(1)?,
            name: row.get(2)?,
            duration_class: row.get(3)?,
            capacity_unit: parse_enum(row, 4, "capacity_unit")?,
            bundle_size: row.get(5)?,
            bundle_tier: parse_enum(row, 6, "bundle_tier")?,
            location_id: row.get(7)?,
            amount_minor: row.get(8)?,
            currency: row.get(9)?,
            created_at: row.get(10)?,
        })
    }
}

impl FromRow for Voucher {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Voucher {
            id: row.get(0)?,
            code: row.get(1)?,
        })
    }
}

impl FromRow for ClaimSession {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let tenant_id: String = row.get(1)?;
        Ok(ClaimSession {
            id: row.get(0)?,
            tenant_id: tenant_id.clone(),
            payment_reference: row.get(2)?,
            provider: parse_enum(row, 3, "provider")?,
            request: VoucherRequest {
                tenant_id,
                duration_class: row.get(4)?,
                capacity_unit: parse_enum(row, 5, "capacity_unit")?,
                bundle_size: row.get(6)?,
                bundle_tier: parse_enum(row, 7, "bundle_tier")?,
                location_id: row.get(8)?,
            },
            amount_minor: row.get(9)?,
            currency: row.get(10)?,
            email: row.get(11)?,
            stage: parse_enum(row, 12, "stage")?,
            claimed_voucher_code: row.get(13)?,
            last_error: row.get(14)?,
            verify_attempts: row.get(15)?,
            created_at: row.get(16)?,
            updated_at: row.get(17)?,
        })
    }
}
