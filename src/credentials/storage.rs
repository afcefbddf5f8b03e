//! Encrypted credential storage using SQLite.
//!
//! Holds host-platform OAuth grants (keyed by tenant) and payment gateway credentials
//! (keyed by tenant and mode). All secrets are encrypted at rest using AES-256-GCM.

use super::encryption::SealedField;
use super::{GatewayCredential, GatewayCredentialFields, GatewayMode, HostAuthGrant};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Encrypted credential storage backed by SQLite.
///
/// # Schema
/// ```sql
/// CREATE TABLE host_grants (
///     tenant_id TEXT PRIMARY KEY,
///     account_id TEXT NOT NULL,
///     user_id TEXT NOT NULL,
///     access_token TEXT NOT NULL,         -- Encrypted
///     access_token_nonce TEXT NOT NULL,
///     refresh_token TEXT NOT NULL,        -- Encrypted
///     refresh_token_nonce TEXT NOT NULL,
///     expires_at TEXT NOT NULL,           -- RFC 3339
///     created_at TEXT NOT NULL,
///     updated_at TEXT NOT NULL
/// );
///
/// CREATE TABLE gateway_credentials (
///     id INTEGER PRIMARY KEY,
///     tenant_id TEXT NOT NULL,
///     mode TEXT NOT NULL,                 -- 'sandbox' | 'production'
///     api_key TEXT NOT NULL,              -- Encrypted
///     api_key_nonce TEXT NOT NULL,
///     signing_secret TEXT NOT NULL,       -- Encrypted
///     signing_secret_nonce TEXT NOT NULL,
///     collection_id TEXT NOT NULL,
///     verified INTEGER NOT NULL DEFAULT 0,
///     revision INTEGER NOT NULL DEFAULT 1,
///     created_at TEXT NOT NULL,
///     updated_at TEXT NOT NULL,
///     UNIQUE(tenant_id, mode)
/// );
/// ```
///
/// # Invariants
/// - Saves are single `INSERT ... ON CONFLICT DO UPDATE` statements, so a reader never
///   observes a key with no record during a replacement
/// - A grant refresh writes access token, refresh token and expiry in one statement
/// - Every gateway save resets `verified` and bumps `revision`
///
/// # Thread Safety
/// - Connection is wrapped in a Mutex; the guard is never held across an `.await`
pub struct CredentialStore {
    conn: Mutex<Connection>,
    encryption_key: Vec<u8>,
}

impl CredentialStore {
    /// Creates or opens a credential store.
    ///
    /// # Arguments
    /// * `db_path` - Path to SQLite database file (`:memory:` for tests)
    /// * `encryption_key` - Base64-encoded 32-byte master key
    pub fn new<P: AsRef<Path>>(db_path: P, encryption_key: &str) -> Result<Self> {
        let key_bytes =
            super::encryption::validate_key(encryption_key).context("Invalid encryption key")?;

        let conn = Connection::open(db_path).context("Failed to open database")?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS host_grants (
                tenant_id TEXT PRIMARY KEY,
                account_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                access_token TEXT NOT NULL,
                access_token_nonce TEXT NOT NULL,
                refresh_token TEXT NOT NULL,
                refresh_token_nonce TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS gateway_credentials (
                id INTEGER PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                mode TEXT NOT NULL CHECK (mode IN ('sandbox', 'production')),
                api_key TEXT NOT NULL,
                api_key_nonce TEXT NOT NULL,
                signing_secret TEXT NOT NULL,
                signing_secret_nonce TEXT NOT NULL,
                collection_id TEXT NOT NULL,
                verified INTEGER NOT NULL DEFAULT 0,
                revision INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(tenant_id, mode)
            );
            "#,
        )
        .context("Failed to create credential tables")?;

        Ok(Self {
            conn: Mutex::new(conn),
            encryption_key: key_bytes,
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Credential store lock poisoned"))
    }

    /// Stores a host grant, replacing any existing grant for the same tenant.
    pub fn upsert_grant(&self, grant: &HostAuthGrant) -> Result<()> {
        let access = SealedField::seal(&grant.access_token, &self.encryption_key, "access token")?;
        let refresh =
            SealedField::seal(&grant.refresh_token, &self.encryption_key, "refresh token")?;
        let now = Utc::now().to_rfc3339();

        self.conn()?
            .execute(
                r#"
                INSERT INTO host_grants (
                    tenant_id, account_id, user_id,
                    access_token, access_token_nonce,
                    refresh_token, refresh_token_nonce,
                    expires_at, created_at, updated_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
                ON CONFLICT(tenant_id) DO UPDATE SET
                    account_id = excluded.account_id,
                    user_id = excluded.user_id,
                    access_token = excluded.access_token,
                    access_token_nonce = excluded.access_token_nonce,
                    refresh_token = excluded.refresh_token,
                    refresh_token_nonce = excluded.refresh_token_nonce,
                    expires_at = excluded.expires_at,
                    updated_at = excluded.updated_at
                "#,
                params![
                    grant.tenant_id,
                    grant.account_id,
                    grant.user_id,
                    access.ciphertext,
                    access.nonce,
                    refresh.ciphertext,
                    refresh.nonce,
                    grant.expires_at.to_rfc3339(),
                    now,
                ],
            )
            .context("Failed to store host grant")?;

        Ok(())
    }

    /// Retrieves the host grant for a tenant.
    ///
    /// # Returns
    /// * `Ok(Some(HostAuthGrant))` - Grant found and decrypted
    /// * `Ok(None)` - Tenant never authorized
    pub fn get_grant(&self, tenant_id: &str) -> Result<Option<HostAuthGrant>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                r#"
                SELECT tenant_id, account_id, user_id,
                       access_token, access_token_nonce,
                       refresh_token, refresh_token_nonce,
                       expires_at
                FROM host_grants
                WHERE tenant_id = ?1
                "#,
                params![tenant_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        SealedField {
                            ciphertext: row.get(3)?,
                            nonce: row.get(4)?,
                        },
                        SealedField {
                            ciphertext: row.get(5)?,
                            nonce: row.get(6)?,
                        },
                        row.get::<_, String>(7)?,
                    ))
                },
            )
            .optional()
            .context("Failed to query host grant")?;

        let Some((tenant_id, account_id, user_id, access, refresh, expires_at)) = row else {
            return Ok(None);
        };

        Ok(Some(HostAuthGrant {
            tenant_id,
            account_id,
            user_id,
            access_token: access.open(&self.encryption_key, "access token")?,
            refresh_token: refresh.open(&self.encryption_key, "refresh token")?,
            expires_at: parse_timestamp(&expires_at)?,
        }))
    }

    /// Replaces the token triple of an existing grant in a single statement.
    ///
    /// # Returns
    /// * `Ok(true)` - Grant updated
    /// * `Ok(false)` - No grant exists for the tenant
    pub fn update_grant_tokens(
        &self,
        tenant_id: &str,
        access_token: &str,
        refresh_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool> {
        let access = SealedField::seal(access_token, &self.encryption_key, "access token")?;
        let refresh = SealedField::seal(refresh_token, &self.encryption_key, "refresh token")?;

        let rows_affected = self
            .conn()?
            .execute(
                r#"
                UPDATE host_grants SET
                    access_token = ?2,
                    access_token_nonce = ?3,
                    refresh_token = ?4,
                    refresh_token_nonce = ?5,
                    expires_at = ?6,
                    updated_at = ?7
                WHERE tenant_id = ?1
                "#,
                params![
                    tenant_id,
                    access.ciphertext,
                    access.nonce,
                    refresh.ciphertext,
                    refresh.nonce,
                    expires_at.to_rfc3339(),
                    Utc::now().to_rfc3339(),
                ],
            )
            .context("Failed to update host grant tokens")?;

        Ok(rows_affected > 0)
    }

    /// Saves gateway credentials for `(tenant_id, mode)`, fully replacing any prior
    /// record for that pair. The stored record is unverified with a new revision.
    pub fn upsert_gateway_credential(
        &self,
        tenant_id: &str,
        mode: GatewayMode,
        fields: &GatewayCredentialFields,
    ) -> Result<GatewayCredential> {
        let api_key = SealedField::seal(&fields.api_key, &self.encryption_key, "api key")?;
        let secret = SealedField::seal(
            &fields.signing_secret,
            &self.encryption_key,
            "signing secret",
        )?;
        let now = Utc::now().to_rfc3339();

        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO gateway_credentials (
                tenant_id, mode,
                api_key, api_key_nonce,
                signing_secret, signing_secret_nonce,
                collection_id, verified, revision,
                created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, 1, ?8, ?8)
            ON CONFLICT(tenant_id, mode) DO UPDATE SET
                api_key = excluded.api_key,
                api_key_nonce = excluded.api_key_nonce,
                signing_secret = excluded.signing_secret,
                signing_secret_nonce = excluded.signing_secret_nonce,
                collection_id = excluded.collection_id,
                verified = 0,
                revision = gateway_credentials.revision + 1,
                updated_at = excluded.updated_at
            "#,
            params![
                tenant_id,
                mode.as_str(),
                api_key.ciphertext,
                api_key.nonce,
                secret.ciphertext,
                secret.nonce,
                fields.collection_id,
                now,
            ],
        )
        .context("Failed to store gateway credentials")?;

        // Read back under the same guard so the returned revision is the one just written
        let stored = select_gateway_credential(&conn, tenant_id, mode)?
            .ok_or_else(|| anyhow!("Gateway credentials vanished after upsert"))?;
        self.open_gateway_row(stored)
    }

    /// Retrieves gateway credentials for `(tenant_id, mode)`.
    pub fn get_gateway_credential(
        &self,
        tenant_id: &str,
        mode: GatewayMode,
    ) -> Result<Option<GatewayCredential>> {
        let conn = self.conn()?;
        match select_gateway_credential(&conn, tenant_id, mode)? {
            Some(row) => Ok(Some(self.open_gateway_row(row)?)),
            None => Ok(None),
        }
    }

    /// Sets the `verified` flag, but only if the record is still at `revision`.
    ///
    /// # Returns
    /// * `Ok(true)` - Flag updated
    /// * `Ok(false)` - Record was replaced (or removed) since that revision was read
    pub fn set_gateway_verified(
        &self,
        tenant_id: &str,
        mode: GatewayMode,
        revision: i64,
        verified: bool,
    ) -> Result<bool> {
        let rows_affected = self
            .conn()?
            .execute(
                r#"
                UPDATE gateway_credentials
                SET verified = ?4, updated_at = ?5
                WHERE tenant_id = ?1 AND mode = ?2 AND revision = ?3
                "#,
                params![
                    tenant_id,
                    mode.as_str(),
                    revision,
                    verified,
                    Utc::now().to_rfc3339()
                ],
            )
            .context("Failed to update verification flag")?;

        Ok(rows_affected > 0)
    }

    fn open_gateway_row(&self, row: GatewayRow) -> Result<GatewayCredential> {
        Ok(GatewayCredential {
            api_key: row.api_key.open(&self.encryption_key, "api key")?,
            signing_secret: row
                .signing_secret
                .open(&self.encryption_key, "signing secret")?,
            tenant_id: row.tenant_id,
            mode: row.mode,
            collection_id: row.collection_id,
            verified: row.verified,
            revision: row.revision,
            updated_at: parse_timestamp(&row.updated_at)?,
        })
    }
}

/// Gateway credential row before decryption.
struct GatewayRow {
    tenant_id: String,
    mode: GatewayMode,
    api_key: SealedField,
    signing_secret: SealedField,
    collection_id: String,
    verified: bool,
    revision: i64,
    updated_at: String,
}

impl GatewayRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let mode: String = row.get(1)?;
        let mode = mode.parse::<GatewayMode>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                1,
                rusqlite::types::Type::Text,
                e.into(),
            )
        })?;

        Ok(Self {
            tenant_id: row.get(0)?,
            mode,
            api_key: SealedField {
                ciphertext: row.get(2)?,
                nonce: row.get(3)?,
            },
            signing_secret: SealedField {
                ciphertext: row.get(4)?,
                nonce: row.get(5)?,
            },
            collection_id: row.get(6)?,
            verified: row.get(7)?,
            revision: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }
}

fn select_gateway_credential(
    conn: &Connection,
    tenant_id: &str,
    mode: GatewayMode,
) -> Result<Option<GatewayRow>> {
    conn.query_row(
        r#"
        SELECT tenant_id, mode,
               api_key, api_key_nonce,
               signing_secret, signing_secret_nonce,
               collection_id, verified, revision, updated_at
        FROM gateway_credentials
        WHERE tenant_id = ?1 AND mode = ?2
        "#,
        params![tenant_id, mode.as_str()],
        GatewayRow::from_row,
    )
    .optional()
    .context("Failed to query gateway credentials")
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("Failed to parse stored timestamp '{}'", value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use chrono::Duration;

    fn create_test_store() -> CredentialStore {
        let key = BASE64.encode([0u8; 32]);
        CredentialStore::new(":memory:", &key).unwrap()
    }

    fn grant(tenant: &str, access: &str) -> HostAuthGrant {
        HostAuthGrant {
            tenant_id: tenant.to_string(),
            account_id: "company-1".to_string(),
            user_id: "user-1".to_string(),
            access_token: access.to_string(),
            refresh_token: format!("{}-refresh", access),
            expires_at: Utc::now() + Duration::hours(1),
        }
    }

    fn fields(api_key: &str) -> GatewayCredentialFields {
        GatewayCredentialFields {
            api_key: api_key.to_string(),
            signing_secret: format!("{}-secret", api_key),
            collection_id: format!("{}-collection", api_key),
        }
    }

    #[test]
    fn test_grant_roundtrip() {
        let store = create_test_store();
        let original = grant("loc-1", "access-1");
        store.upsert_grant(&original).unwrap();

        let stored = store.get_grant("loc-1").unwrap().unwrap();
        assert_eq!(stored.access_token, "access-1");
        assert_eq!(stored.refresh_token, "access-1-refresh");
        assert_eq!(stored.account_id, "company-1");
        assert_eq!(
            stored.expires_at.timestamp(),
            original.expires_at.timestamp()
        );
    }

    #[test]
    fn test_grant_replaced_by_second_upsert() {
        let store = create_test_store();
        store.upsert_grant(&grant("loc-1", "first")).unwrap();
        store.upsert_grant(&grant("loc-1", "second")).unwrap();

        let stored = store.get_grant("loc-1").unwrap().unwrap();
        assert_eq!(stored.access_token, "second");
        assert_eq!(stored.refresh_token, "second-refresh");

        let count: i64 = store
            .conn()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM host_grants", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_missing_grant() {
        let store = create_test_store();
        assert!(store.get_grant("unknown").unwrap().is_none());
    }

    #[test]
    fn test_update_grant_tokens() {
        let store = create_test_store();
        store.upsert_grant(&grant("loc-1", "old")).unwrap();

        let new_expiry = Utc::now() + Duration::hours(24);
        assert!(store
            .update_grant_tokens("loc-1", "new-access", "new-refresh", new_expiry)
            .unwrap());

        let stored = store.get_grant("loc-1").unwrap().unwrap();
        assert_eq!(stored.access_token, "new-access");
        assert_eq!(stored.refresh_token, "new-refresh");
        assert_eq!(stored.expires_at.timestamp(), new_expiry.timestamp());
        assert_eq!(stored.user_id, "user-1");

        assert!(!store
            .update_grant_tokens("loc-2", "a", "r", new_expiry)
            .unwrap());
    }

    #[test]
    fn test_tokens_encrypted_at_rest() {
        let store = create_test_store();
        store.upsert_grant(&grant("loc-1", "plain-access")).unwrap();
        store
            .upsert_gateway_credential("loc-1", GatewayMode::Sandbox, &fields("plain-key"))
            .unwrap();

        let conn = store.conn().unwrap();
        let raw_token: String = conn
            .query_row("SELECT access_token FROM host_grants", [], |r| r.get(0))
            .unwrap();
        let raw_key: String = conn
            .query_row("SELECT api_key FROM gateway_credentials", [], |r| r.get(0))
            .unwrap();
        assert_ne!(raw_token, "plain-access");
        assert_ne!(raw_key, "plain-key");
    }

    #[test]
    fn test_gateway_upsert_and_get() {
        let store = create_test_store();
        let saved = store
            .upsert_gateway_credential("loc-1", GatewayMode::Sandbox, &fields("key-a"))
            .unwrap();
        assert_eq!(saved.revision, 1);
        assert!(!saved.verified);

        let stored = store
            .get_gateway_credential("loc-1", GatewayMode::Sandbox)
            .unwrap()
            .unwrap();
        assert_eq!(stored.fields(), fields("key-a"));
        assert_eq!(stored.mode, GatewayMode::Sandbox);
    }

    #[test]
    fn test_gateway_replace_bumps_revision_and_resets_verified() {
        let store = create_test_store();
        let first = store
            .upsert_gateway_credential("loc-1", GatewayMode::Production, &fields("key-a"))
            .unwrap();
        assert!(store
            .set_gateway_verified("loc-1", GatewayMode::Production, first.revision, true)
            .unwrap());

        let second = store
            .upsert_gateway_credential("loc-1", GatewayMode::Production, &fields("key-b"))
            .unwrap();
        assert_eq!(second.revision, first.revision + 1);
        assert!(!second.verified);
        assert_eq!(second.fields(), fields("key-b"));
    }

    #[test]
    fn test_modes_are_independent() {
        let store = create_test_store();
        let sandbox = store
            .upsert_gateway_credential("loc-1", GatewayMode::Sandbox, &fields("sandbox"))
            .unwrap();
        store
            .set_gateway_verified("loc-1", GatewayMode::Sandbox, sandbox.revision, true)
            .unwrap();

        store
            .upsert_gateway_credential("loc-1", GatewayMode::Production, &fields("live"))
            .unwrap();

        let sandbox = store
            .get_gateway_credential("loc-1", GatewayMode::Sandbox)
            .unwrap()
            .unwrap();
        assert_eq!(sandbox.fields(), fields("sandbox"));
        assert!(sandbox.verified);
    }

    #[test]
    fn test_stale_revision_cannot_be_verified() {
        let store = create_test_store();
        let first = store
            .upsert_gateway_credential("loc-1", GatewayMode::Sandbox, &fields("key-a"))
            .unwrap();
        store
            .upsert_gateway_credential("loc-1", GatewayMode::Sandbox, &fields("key-b"))
            .unwrap();

        assert!(!store
            .set_gateway_verified("loc-1", GatewayMode::Sandbox, first.revision, true)
            .unwrap());
        let stored = store
            .get_gateway_credential("loc-1", GatewayMode::Sandbox)
            .unwrap()
            .unwrap();
        assert!(!stored.verified);
    }

    #[test]
    fn test_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("paybridge.db");
        let key = BASE64.encode([9u8; 32]);

        {
            let store = CredentialStore::new(&path, &key).unwrap();
            store.upsert_grant(&grant("loc-1", "durable")).unwrap();
        }

        let reopened = CredentialStore::new(&path, &key).unwrap();
        let stored = reopened.get_grant("loc-1").unwrap().unwrap();
        assert_eq!(stored.access_token, "durable");
    }

    #[test]
    fn test_invalid_encryption_key() {
        assert!(CredentialStore::new(":memory:", "short").is_err());
        assert!(CredentialStore::new(":memory:", "not-valid-base64!@#$").is_err());
    }
}
