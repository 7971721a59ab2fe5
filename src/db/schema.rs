use rusqlite::Connection;

/// Initialize the database schema.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        -- Tenants (portal operators; everything below is namespaced by tenant)
        CREATE TABLE IF NOT EXISTS tenants (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            support_contact TEXT,
            created_at INTEGER NOT NULL
        );

        -- Physical network locations of a tenant
        CREATE TABLE IF NOT EXISTS locations (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            UNIQUE(tenant_id, name)
        );
        CREATE INDEX IF NOT EXISTS idx_locations_tenant ON locations(tenant_id);

        -- Price plans; each plan sells from exactly one voucher bucket
        CREATE TABLE IF NOT EXISTS plans (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            duration_class TEXT NOT NULL,
            capacity_unit TEXT NOT NULL CHECK (capacity_unit IN ('MB', 'GB')),
            bundle_size INTEGER NOT NULL CHECK (bundle_size > 0),
            bundle_tier TEXT NOT NULL CHECK (bundle_tier IN ('standard', 'premium')),
            location_id TEXT NOT NULL REFERENCES locations(id) ON DELETE CASCADE,
            amount_minor INTEGER NOT NULL CHECK (amount_minor > 0),
            currency TEXT NOT NULL DEFAULT 'NGN',
            created_at INTEGER NOT NULL,
            UNIQUE(tenant_id, name)
        );
        CREATE INDEX IF NOT EXISTS idx_plans_tenant ON plans(tenant_id);

        -- Voucher buckets: one row per known coordinate set. Lets the store
        -- tell an exhausted bucket (empty) from coordinates nobody ever
        -- uploaded to (not found).
        CREATE TABLE IF NOT EXISTS voucher_buckets (
            tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
            duration_class TEXT NOT NULL,
            capacity_unit TEXT NOT NULL CHECK (capacity_unit IN ('MB', 'GB')),
            bundle_size INTEGER NOT NULL,
            bundle_tier TEXT NOT NULL CHECK (bundle_tier IN ('standard', 'premium')),
            location_id TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            PRIMARY KEY (tenant_id, duration_class, capacity_unit, bundle_size, bundle_tier, location_id)
        );

        -- Available vouchers. A claim deletes the row; claimed codes never
        -- linger here in a "used" state.
        CREATE TABLE IF NOT EXISTS vouchers (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
            duration_class TEXT NOT NULL,
            capacity_unit TEXT NOT NULL CHECK (capacity_unit IN ('MB', 'GB')),
            bundle_size INTEGER NOT NULL,
            bundle_tier TEXT NOT NULL CHECK (bundle_tier IN ('standard', 'premium')),
            location_id TEXT NOT NULL,
            code TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_vouchers_bucket
            ON vouchers(tenant_id, duration_class, capacity_unit, bundle_size, bundle_tier, location_id);

        -- Claim sessions: the durable bridge between the payment redirect
        -- and the voucher claim. One session per (tenant, reference).
        CREATE TABLE IF NOT EXISTS claim_sessions (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
            payment_reference TEXT NOT NULL,
            provider TEXT NOT NULL CHECK (provider IN ('paystack', 'flutterwave')),
            duration_class TEXT NOT NULL,
            capacity_unit TEXT NOT NULL CHECK (capacity_unit IN ('MB', 'GB')),
            bundle_size INTEGER NOT NULL,
            bundle_tier TEXT NOT NULL CHECK (bundle_tier IN ('standard', 'premium')),
            location_id TEXT NOT NULL,
            amount_minor INTEGER NOT NULL,
            currency TEXT NOT NULL,
            email TEXT NOT NULL,
            stage TEXT NOT NULL CHECK (stage IN (
                'initiated', 'verifying', 'verified', 'claiming', 'claimed',
                'verification_failed', 'claim_failed'
            )),
            claimed_voucher_code TEXT,
            last_error TEXT,
            verify_attempts INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE(tenant_id, payment_reference)
        );
        CREATE INDEX IF NOT EXISTS idx_claim_sessions_reference ON claim_sessions(payment_reference);
        CREATE INDEX IF NOT EXISTS idx_claim_sessions_tenant_stage ON claim_sessions(tenant_id, stage);

        -- Most recently claimed code per (tenant, bucket). Overwritten on
        -- each successful claim; the fallback served when a paid claim
        -- finds the bucket empty, and the recovery path for a client that
        -- lost a claimed code.
        CREATE TABLE IF NOT EXISTS active_vouchers (
            tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
            duration_class TEXT NOT NULL,
            capacity_unit TEXT NOT NULL CHECK (capacity_unit IN ('MB', 'GB')),
            bundle_size INTEGER NOT NULL,
            bundle_tier TEXT NOT NULL CHECK (bundle_tier IN ('standard', 'premium')),
            location_id TEXT NOT NULL,
            code TEXT NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (tenant_id, duration_class, capacity_unit, bundle_size, bundle_tier, location_id)
        );
        "#,
    )?;
    Ok(())
}
