//! Schema versioning and forward-only migrations.
//!
//! The store tracks its schema version in the meta namespace. Opening a
//! store with an older schema upgrades it in place; data is never silently
//! dropped. Migrations are forward-only: downgrades are refused with
//! [`StoreError::SchemaTooNew`].

use crate::backend::{KvBackend, Namespace};
use crate::error::{StoreError, StoreResult};
use ciborium::value::Value;

/// Meta key holding the schema version as 4 little-endian bytes.
pub(crate) const SCHEMA_VERSION_KEY: &[u8] = b"schema_version";

/// The schema version this build reads and writes.
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

/// A single forward schema migration.
///
/// Migrations are registered in version order and each one upgrades the
/// store from `version() - 1` to `version()`.
pub trait Migration {
    /// Target schema version of this migration.
    fn version(&self) -> u32;

    /// Human-readable name.
    fn name(&self) -> &str;

    /// Applies the migration to the backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the upgrade cannot be completed; the version
    /// marker is only advanced on success.
    fn up(&self, backend: &dyn KvBackend) -> StoreResult<()>;
}

/// Result of running pending migrations at open.
#[derive(Debug, Clone)]
pub struct MigrationRunResult {
    /// Schema version found on disk.
    pub from_version: u32,
    /// Schema version after the run.
    pub to_version: u32,
    /// Names of the migrations that were applied, in order.
    pub applied: Vec<String>,
}

/// Reads the schema version marker, if present.
fn read_version(backend: &dyn KvBackend) -> StoreResult<Option<u32>> {
    match backend.get(Namespace::Meta, SCHEMA_VERSION_KEY)? {
        Some(bytes) => {
            let arr: [u8; 4] = bytes
                .as_slice()
                .try_into()
                .map_err(|_| StoreError::corrupted("schema version marker is malformed"))?;
            Ok(Some(u32::from_le_bytes(arr)))
        }
        None => Ok(None),
    }
}

fn write_version(backend: &dyn KvBackend, version: u32) -> StoreResult<()> {
    backend.put(Namespace::Meta, SCHEMA_VERSION_KEY, &version.to_le_bytes())
}

/// Runs all pending migrations against the backend.
///
/// A store with no version marker and no data is initialized straight to
/// [`CURRENT_SCHEMA_VERSION`]. A store with data but no marker predates
/// version tracking and is treated as schema 1.
///
/// # Errors
///
/// Returns [`StoreError::SchemaTooNew`] if the on-disk version is ahead of
/// this build, and [`StoreError::MigrationFailed`] if an upgrade step fails.
pub fn run_pending(backend: &dyn KvBackend) -> StoreResult<MigrationRunResult> {
    let found = read_version(backend)?;

    let from_version = match found {
        Some(v) => v,
        None => {
            let empty = Namespace::ALL
                .iter()
                .try_fold(true, |acc, ns| Ok::<_, StoreError>(acc && backend.count(*ns)? == 0))?;
            if empty {
                write_version(backend, CURRENT_SCHEMA_VERSION)?;
                return Ok(MigrationRunResult {
                    from_version: CURRENT_SCHEMA_VERSION,
                    to_version: CURRENT_SCHEMA_VERSION,
                    applied: Vec::new(),
                });
            }
            // Pre-versioning data
            1
        }
    };

    if from_version > CURRENT_SCHEMA_VERSION {
        return Err(StoreError::SchemaTooNew {
            found: from_version,
            supported: CURRENT_SCHEMA_VERSION,
        });
    }

    let mut applied = Vec::new();
    let mut version = from_version;

    for migration in builtin_migrations() {
        if migration.version() <= version {
            continue;
        }
        tracing::info!(
            version = migration.version(),
            name = migration.name(),
            "applying schema migration"
        );
        migration.up(backend).map_err(|e| {
            StoreError::migration_failed(migration.version(), e.to_string())
        })?;
        version = migration.version();
        write_version(backend, version)?;
        applied.push(migration.name().to_string());
    }

    Ok(MigrationRunResult {
        from_version,
        to_version: version,
        applied,
    })
}

/// The registered migrations, in version order.
fn builtin_migrations() -> Vec<Box<dyn Migration>> {
    vec![Box::new(BackfillActionSeq)]
}

/// v1 → v2: queue records gained a `seq` tie-breaker field.
///
/// Schema 1 ordered pending actions by `enqueued_at` alone, which is
/// ambiguous for actions enqueued within the same millisecond. This
/// migration assigns `seq` to old records in `enqueued_at` order (key order
/// breaking ties) so replay order stays total after the upgrade.
struct BackfillActionSeq;

impl Migration for BackfillActionSeq {
    fn version(&self) -> u32 {
        2
    }

    fn name(&self) -> &str {
        "backfill_action_seq"
    }

    fn up(&self, backend: &dyn KvBackend) -> StoreResult<()> {
        let entries = backend.iterate(Namespace::PendingActions)?;

        let mut decoded: Vec<(Vec<u8>, Value, u64)> = Vec::with_capacity(entries.len());
        for (key, bytes) in entries {
            let value: Value = ciborium::from_reader(bytes.as_slice())
                .map_err(|e| StoreError::codec(format!("queue record unreadable: {e}")))?;
            let enqueued_at = map_field_u64(&value, "enqueued_at").ok_or_else(|| {
                StoreError::codec("queue record is missing enqueued_at".to_string())
            })?;
            decoded.push((key, value, enqueued_at));
        }

        decoded.sort_by(|a, b| a.2.cmp(&b.2).then_with(|| a.0.cmp(&b.0)));

        for (seq, (key, value, _)) in decoded.into_iter().enumerate() {
            let Value::Map(mut fields) = value else {
                return Err(StoreError::codec("queue record is not a map".to_string()));
            };
            if fields
                .iter()
                .any(|(k, _)| matches!(k, Value::Text(t) if t == "seq"))
            {
                continue;
            }
            fields.push((Value::Text("seq".to_string()), Value::from(seq as u64)));

            let mut buf = Vec::new();
            ciborium::into_writer(&Value::Map(fields), &mut buf)
                .map_err(|e| StoreError::codec(format!("queue record unwritable: {e}")))?;
            backend.put(Namespace::PendingActions, &key, &buf)?;
        }

        Ok(())
    }
}

/// Extracts an unsigned integer field from a CBOR map value.
fn map_field_u64(value: &Value, field: &str) -> Option<u64> {
    let Value::Map(fields) = value else {
        return None;
    };
    fields.iter().find_map(|(k, v)| match (k, v) {
        (Value::Text(t), Value::Integer(i)) if t == field => u64::try_from(i128::from(*i)).ok(),
        _ => None,
    })
}
