use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::*;

use super::from_row::{
    query_all, query_one, FromRow, CLAIM_SESSION_COLS, LOCATION_COLS, PLAN_COLS, TENANT_COLS,
    VOUCHER_COLS,
};
use super::CountCache;

fn now() -> i64 {
    Utc::now().timestamp()
}

fn gen_id() -> String {
    Uuid::new_v4().to_string()
}

// ============ Tenants & Locations ============

pub fn create_tenant(
    conn: &mut Connection,
    input: &CreateTenant,
) -> Result<(Tenant, Vec<NetworkLocation>)> {
    let tx = conn.transaction()?;
    let tenant = Tenant {
        id: gen_id(),
        name: input.name.clone(),
        support_contact: input.support_contact.clone(),
        created_at: now(),
    };
    tx.execute(
        "INSERT INTO tenants (id, name, support_contact, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![tenant.id, tenant.name, tenant.support_contact, tenant.created_at],
    )
    .map_err(|e| conflict_on_unique(e, "A tenant with this name already exists"))?;

    let mut locations = Vec::with_capacity(input.locations.len());
    for name in &input.locations {
        let location = NetworkLocation {
            id: gen_id(),
            tenant_id: tenant.id.clone(),
            name: name.clone(),
        };
        tx.execute(
            "INSERT INTO locations (id, tenant_id, name) VALUES (?1, ?2, ?3)",
            params![location.id, location.tenant_id, location.name],
        )?;
        locations.push(location);
    }
    tx.commit()?;
    Ok((tenant, locations))
}

pub fn get_tenant_by_id(conn: &Connection, id: &str) -> Result<Option<Tenant>> {
    query_one(
        conn,
        &format!("SELECT {} FROM tenants WHERE id = ?1", TENANT_COLS),
        params![id],
    )
}

pub fn get_location(
    conn: &Connection,
    tenant_id: &str,
    location_id: &str,
) -> Result<Option<NetworkLocation>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM locations WHERE tenant_id = ?1 AND id = ?2",
            LOCATION_COLS
        ),
        params![tenant_id, location_id],
    )
}

// ============ Plans ============

pub fn create_plan(conn: &Connection, tenant_id: &str, input: &CreatePlan) -> Result<Plan> {
    let location = get_location(conn, tenant_id, &input.location_id)?
        .ok_or_else(|| AppError::BadRequest("Unknown location for this tenant".into()))?;

    let plan = Plan {
        id: gen_id(),
        tenant_id: tenant_id.to_string(),
        name: input.name.clone(),
        duration_class: input.duration_class.clone(),
        capacity_unit: input.capacity_unit,
        bundle_size: input.bundle_size,
        bundle_tier: input.bundle_tier,
        location_id: location.id,
        amount_minor: input.amount_minor,
        currency: input.currency.clone(),
        created_at: now(),
    };
    conn.execute(
        "INSERT INTO plans (id, tenant_id, name, duration_class, capacity_unit, bundle_size, bundle_tier, location_id, amount_minor, currency, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            plan.id,
            plan.tenant_id,
            plan.name,
            plan.duration_class,
            plan.capacity_unit.as_str(),
            plan.bundle_size,
            plan.bundle_tier.as_str(),
            plan.location_id,
            plan.amount_minor,
            plan.currency,
            plan.created_at
        ],
    )
    .map_err(|e| conflict_on_unique(e, "A plan with this name already exists"))?;
    Ok(plan)
}

pub fn get_plan_by_id(conn: &Connection, tenant_id: &str, plan_id: &str) -> Result<Option<Plan>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM plans WHERE tenant_id = ?1 AND id = ?2",
            PLAN_COLS
        ),
        params![tenant_id, plan_id],
    )
}

pub fn list_plans(conn: &Connection, tenant_id: &str) -> Result<Vec<Plan>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM plans WHERE tenant_id = ?1 ORDER BY amount_minor",
            PLAN_COLS
        ),
        params![tenant_id],
    )
}

// ============ Voucher store ============

/// Claim failure kinds. `Empty` and `BucketNotFound` are business
/// failures; `Store` covers any write that could not be confirmed, which
/// must never be reported as success.
#[derive(Debug, thiserror::Error)]
pub enum VoucherClaimError {
    #[error("no vouchers available for this bundle")]
    Empty,

    #[error("no voucher inventory exists for this bundle")]
    BucketNotFound,

    #[error("voucher store write failed: {0}")]
    Store(AppError),
}

impl From<rusqlite::Error> for VoucherClaimError {
    fn from(e: rusqlite::Error) -> Self {
        VoucherClaimError::Store(AppError::Database(e))
    }
}

/// Bulk-insert codes into the bucket for `request`, registering the bucket
/// if it is new. Duplicate codes are the uploader's responsibility.
pub fn add_vouchers(
    conn: &mut Connection,
    request: &VoucherRequest,
    codes: &[String],
) -> Result<usize> {
    request.validate()?;

    let tx = conn.transaction()?;
    let now = now();
    tx.execute(
        "INSERT OR IGNORE INTO voucher_buckets (tenant_id, duration_class, capacity_unit, bundle_size, bundle_tier, location_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            request.tenant_id,
            request.duration_class,
            request.capacity_unit.as_str(),
            request.bundle_size,
            request.bundle_tier.as_str(),
            request.location_id,
            now
        ],
    )?;
    for code in codes {
        tx.execute(
            "INSERT INTO vouchers (id, tenant_id, duration_class, capacity_unit, bundle_size, bundle_tier, location_id, code, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                gen_id(),
                request.tenant_id,
                request.duration_class,
                request.capacity_unit.as_str(),
                request.bundle_size,
                request.bundle_tier.as_str(),
                request.location_id,
                code,
                now
            ],
        )?;
    }
    tx.commit()?;
    Ok(codes.len())
}

/// Number of currently available vouchers in the bucket.
pub fn count_vouchers(conn: &Connection, request: &VoucherRequest) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM vouchers
         WHERE tenant_id = ?1 AND duration_class = ?2 AND capacity_unit = ?3
           AND bundle_size = ?4 AND bundle_tier = ?5 AND location_id = ?6",
        params![
            request.tenant_id,
            request.duration_class,
            request.capacity_unit.as_str(),
            request.bundle_size,
            request.bundle_tier.as_str(),
            request.location_id
        ],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Cached variant of `count_vouchers`. Called on every plan-card render
/// and before every purchase, so counts are served from a short-TTL cache.
pub fn count_vouchers_cached(
    conn: &Connection,
    cache: &CountCache,
    request: &VoucherRequest,
) -> Result<i64> {
    let key = request.bucket_key();
    if let Some(count) = cache.get(&key) {
        return Ok(count);
    }
    let count = count_vouchers(conn, request)?;
    cache.put(key, count);
    Ok(count)
}

/// Pick one voucher uniformly at random from the bucket and delete it,
/// inside the open write transaction. The IMMEDIATE transaction holds the
/// write lock for the whole pick-and-delete, so no two callers can
/// receive the same code.
fn claim_from_bucket(
    tx: &Transaction,
    request: &VoucherRequest,
) -> std::result::Result<Voucher, VoucherClaimError> {
    let bucket_known: bool = tx.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM voucher_buckets
            WHERE tenant_id = ?1 AND duration_class = ?2 AND capacity_unit = ?3
              AND bundle_size = ?4 AND bundle_tier = ?5 AND location_id = ?6)",
        params![
            request.tenant_id,
            request.duration_class,
            request.capacity_unit.as_str(),
            request.bundle_size,
            request.bundle_tier.as_str(),
            request.location_id
        ],
        |row| row.get(0),
    )?;
    if !bucket_known {
        return Err(VoucherClaimError::BucketNotFound);
    }

    let voucher: Option<Voucher> = tx
        .query_row(
            &format!(
                "DELETE FROM vouchers WHERE id = (
                    SELECT id FROM vouchers
                    WHERE tenant_id = ?1 AND duration_class = ?2 AND capacity_unit = ?3
                      AND bundle_size = ?4 AND bundle_tier = ?5 AND location_id = ?6
                    ORDER BY RANDOM() LIMIT 1)
                 RETURNING {}",
                VOUCHER_COLS
            ),
            params![
                request.tenant_id,
                request.duration_class,
                request.capacity_unit.as_str(),
                request.bundle_size,
                request.bundle_tier.as_str(),
                request.location_id
            ],
            Voucher::from_row,
        )
        .optional()?;

    voucher.ok_or(VoucherClaimError::Empty)
}

/// Atomically remove one random voucher from the bucket. Commits before
/// the code is released to the caller; a failed commit is a claim failure.
pub fn claim_voucher_atomic(
    conn: &mut Connection,
    request: &VoucherRequest,
) -> std::result::Result<Voucher, VoucherClaimError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let voucher = claim_from_bucket(&tx, request)?;
    tx.commit()?;
    Ok(voucher)
}

/// The claim step of the coordinator: remove one voucher, write the code
/// into the session row, and overwrite the tenant's active-voucher slot
/// for the bucket, all in one transaction. Either the buyer's session has
/// the code durably recorded, or the voucher was never removed.
pub fn claim_and_record(
    conn: &mut Connection,
    session_id: &str,
    request: &VoucherRequest,
) -> std::result::Result<Voucher, VoucherClaimError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let voucher = claim_from_bucket(&tx, request)?;
    let now = now();

    tx.execute(
        "UPDATE claim_sessions
         SET stage = 'claimed', claimed_voucher_code = ?1, last_error = NULL, updated_at = ?2
         WHERE id = ?3",
        params![voucher.code, now, session_id],
    )?;
    tx.execute(
        "INSERT INTO active_vouchers (tenant_id, duration_class, capacity_unit, bundle_size, bundle_tier, location_id, code, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(tenant_id, duration_class, capacity_unit, bundle_size, bundle_tier, location_id)
         DO UPDATE SET code = excluded.code, updated_at = excluded.updated_at",
        params![
            request.tenant_id,
            request.duration_class,
            request.capacity_unit.as_str(),
            request.bundle_size,
            request.bundle_tier.as_str(),
            request.location_id,
            voucher.code,
            now
        ],
    )?;

    tx.commit()?;
    Ok(voucher)
}

/// Most recently claimed code for this bucket, if any.
pub fn get_active_voucher(conn: &Connection, request: &VoucherRequest) -> Result<Option<String>> {
    conn.query_row(
        "SELECT code FROM active_vouchers
         WHERE tenant_id = ?1 AND duration_class = ?2 AND capacity_unit = ?3
           AND bundle_size = ?4 AND bundle_tier = ?5 AND location_id = ?6",
        params![
            request.tenant_id,
            request.duration_class,
            request.capacity_unit.as_str(),
            request.bundle_size,
            request.bundle_tier.as_str(),
            request.location_id
        ],
        |row| row.get(0),
    )
    .optional()
    .map_err(Into::into)
}

// ============ Claim sessions ============

pub fn create_claim_session(
    conn: &Connection,
    input: &CreateClaimSession,
) -> Result<ClaimSession> {
    let now = now();
    let session = ClaimSession {
        id: gen_id(),
        tenant_id: input.tenant_id.clone(),
        payment_reference: input.payment_reference.clone(),
        provider: input.provider,
        request: input.request.clone(),
        amount_minor: input.amount_minor,
        currency: input.currency.clone(),
        email: input.email.clone(),
        stage: ClaimStage::Initiated,
        claimed_voucher_code: None,
        last_error: None,
        verify_attempts: 0,
        created_at: now,
        updated_at: now,
    };
    conn.execute(
        "INSERT INTO claim_sessions (id, tenant_id, payment_reference, provider, duration_class, capacity_unit, bundle_size, bundle_tier, location_id, amount_minor, currency, email, stage, claimed_voucher_code, last_error, verify_attempts, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, NULL, NULL, 0, ?14, ?15)",
        params![
            session.id,
            session.tenant_id,
            session.payment_reference,
            session.provider.as_str(),
            session.request.duration_class,
            session.request.capacity_unit.as_str(),
            session.request.bundle_size,
            session.request.bundle_tier.as_str(),
            session.request.location_id,
            session.amount_minor,
            session.currency,
            session.email,
            session.stage.as_str(),
            session.created_at,
            session.updated_at
        ],
    )
    .map_err(|e| conflict_on_unique(e, "A purchase with this payment reference already exists"))?;
    Ok(session)
}

pub fn get_claim_session(
    conn: &Connection,
    tenant_id: &str,
    session_id: &str,
) -> Result<Option<ClaimSession>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM claim_sessions WHERE tenant_id = ?1 AND id = ?2",
            CLAIM_SESSION_COLS
        ),
        params![tenant_id, session_id],
    )
}

pub fn get_claim_session_by_reference(
    conn: &Connection,
    tenant_id: &str,
    reference: &str,
) -> Result<Option<ClaimSession>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM claim_sessions WHERE tenant_id = ?1 AND payment_reference = ?2",
            CLAIM_SESSION_COLS
        ),
        params![tenant_id, reference],
    )
}

/// Reference lookup without a tenant, for webhook deliveries. References
/// carry enough entropy to be globally unique.
pub fn get_claim_session_by_reference_global(
    conn: &Connection,
    reference: &str,
) -> Result<Option<ClaimSession>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM claim_sessions WHERE payment_reference = ?1",
            CLAIM_SESSION_COLS
        ),
        params![reference],
    )
}

/// Persist a stage transition. The whole field-set is written in one
/// UPDATE so an abandoned request can never leave a half-written session.
pub fn transition_claim_stage(
    conn: &Connection,
    session_id: &str,
    stage: ClaimStage,
    last_error: Option<&str>,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE claim_sessions SET stage = ?1, last_error = ?2, updated_at = ?3 WHERE id = ?4",
        params![stage.as_str(), last_error, now(), session_id],
    )?;
    Ok(affected > 0)
}

pub fn record_verify_attempts(conn: &Connection, session_id: &str, attempts: i64) -> Result<()> {
    conn.execute(
        "UPDATE claim_sessions SET verify_attempts = verify_attempts + ?1, updated_at = ?2 WHERE id = ?3",
        params![attempts, now(), session_id],
    )?;
    Ok(())
}

/// Finish a session with a code that was not freshly removed from the
/// bucket (the active-voucher fallback).
pub fn record_claimed_code(conn: &Connection, session_id: &str, code: &str) -> Result<()> {
    conn.execute(
        "UPDATE claim_sessions
         SET stage = 'claimed', claimed_voucher_code = ?1, last_error = NULL, updated_at = ?2
         WHERE id = ?3",
        params![code, now(), session_id],
    )?;
    Ok(())
}

/// Webhook path: mark a session's charge as verified. Only pre-claim
/// stages are eligible, which is what makes duplicate deliveries no-ops.
pub fn mark_session_verified_by_reference(conn: &Connection, reference: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE claim_sessions SET stage = 'verified', last_error = NULL, updated_at = ?1
         WHERE payment_reference = ?2
           AND stage IN ('initiated', 'verifying', 'verification_failed')",
        params![now(), reference],
    )?;
    Ok(affected > 0)
}

// ============ Stats ============

#[derive(Debug, Serialize)]
pub struct StageTally {
    pub stage: String,
    pub sessions: i64,
}

pub fn count_sessions_by_stage(conn: &Connection, tenant_id: &str) -> Result<Vec<StageTally>> {
    let mut stmt = conn.prepare(
        "SELECT stage, COUNT(*) FROM claim_sessions WHERE tenant_id = ?1 GROUP BY stage ORDER BY stage",
    )?;
    let rows = stmt
        .query_map(params![tenant_id], |row| {
            Ok(StageTally {
                stage: row.get(0)?,
                sessions: row.get(1)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[derive(Debug, Serialize)]
pub struct BucketStats {
    pub duration_class: String,
    pub capacity_unit: String,
    pub bundle_size: i64,
    pub bundle_tier: String,
    pub location_id: String,
    pub available: i64,
}

pub fn list_buckets_with_counts(conn: &Connection, tenant_id: &str) -> Result<Vec<BucketStats>> {
    let mut stmt = conn.prepare(
        "SELECT b.duration_class, b.capacity_unit, b.bundle_size, b.bundle_tier, b.location_id,
                (SELECT COUNT(*) FROM vouchers v
                 WHERE v.tenant_id = b.tenant_id AND v.duration_class = b.duration_class
                   AND v.capacity_unit = b.capacity_unit AND v.bundle_size = b.bundle_size
                   AND v.bundle_tier = b.bundle_tier AND v.location_id = b.location_id)
         FROM voucher_buckets b WHERE b.tenant_id = ?1
         ORDER BY b.duration_class, b.bundle_size",
    )?;
    let rows = stmt
        .query_map(params![tenant_id], |row| {
            Ok(BucketStats {
                duration_class: row.get(0)?,
                capacity_unit: row.get(1)?,
                bundle_size: row.get(2)?,
                bundle_tier: row.get(3)?,
                location_id: row.get(4)?,
                available: row.get(5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============ Helpers ============

/// Map a UNIQUE constraint violation to a Conflict, pass everything else
/// through as a database error.
fn conflict_on_unique(e: rusqlite::Error, msg: &str) -> AppError {
    match &e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            AppError::Conflict(msg.to_string())
        }
        _ => AppError::Database(e),
    }
}
