//! Account metadata with optimistic versioning.
//!
//! Each entry carries a version bumped on every write. A caller that
//! passes a non-zero expected version gets `InvalidDataVersion` when
//! the stored entry is absent or at a different version; version 0
//! means "don't care" and can also create the entry.

use tessera_common::{ErrorCode, OpResult};

use crate::environment::Environment;
use crate::error::Result;
use crate::types::{Address, MetadataEntry};

use super::{load_source, OpOutcome};

/// Maximum metadata key length in bytes.
pub const METADATA_KEY_MAX: usize = 1024;
/// Maximum metadata value length in bytes.
pub const METADATA_VALUE_MAX: usize = 256 * 1024;

pub(super) fn check_sizes(key: &str, value: &str) -> OpResult {
    if key.is_empty() || key.len() > METADATA_KEY_MAX {
        return OpResult::error(
            ErrorCode::InvalidParameter,
            format!("metadata key length {} out of range", key.len()),
        );
    }
    if value.len() > METADATA_VALUE_MAX {
        return OpResult::error(
            ErrorCode::InvalidParameter,
            format!("metadata value length {} exceeds cap", value.len()),
        );
    }
    OpResult::ok()
}

pub(super) fn apply(
    env: &mut Environment,
    source: &Address,
    key: &str,
    value: &str,
    version: u64,
    delete: bool,
) -> Result<OpOutcome> {
    let mut src = match load_source(env, source)? {
        Ok(acc) => acc,
        Err(fail) => return Ok(fail),
    };
    let existing = src.metadata.get(key).cloned();

    if let Some(entry) = &existing {
        if version != 0 && entry.version != version {
            return Ok(OpOutcome::fail(
                ErrorCode::InvalidDataVersion,
                format!(
                    "metadata {key} at version {}, expected {version}",
                    entry.version
                ),
            ));
        }
    } else {
        if delete {
            return Ok(OpOutcome::fail(
                ErrorCode::InvalidDataVersion,
                format!("metadata {key} not present, cannot delete"),
            ));
        }
        if version != 0 {
            return Ok(OpOutcome::fail(
                ErrorCode::InvalidDataVersion,
                format!("metadata {key} not present, expected version {version}"),
            ));
        }
    }

    if delete {
        src.metadata.remove(key);
    } else {
        let next_version = existing.map(|e| e.version + 1).unwrap_or(1);
        src.metadata.insert(
            key.to_string(),
            MetadataEntry {
                value: value.to_string(),
                version: next_version,
            },
        );
    }
    env.put_account(src);
    Ok(OpOutcome::ok())
}
