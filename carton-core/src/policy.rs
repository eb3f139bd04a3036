use crate::error::{CartonError, Result};
use serde::{Deserialize, Serialize};

/// Limits enforced while extracting.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Policy {
    pub max_entries: Option<u64>,
    /// Per-entry uncompressed size limit.
    pub max_entry_size: Option<u64>,
    pub max_total_size: Option<u64>,
    /// Symlink targets must still resolve inside the destination.
    pub allow_symlinks: bool,
}

/// Running totals checked against a [`Policy`].
#[derive(Debug, Default)]
pub(crate) struct Budget {
    entries: u64,
    total: u64,
}

impl Budget {
    pub(crate) fn admit_entry(&mut self, policy: &Policy, name: &str, size: u64) -> Result<()> {
        self.entries += 1;
        if let Some(max) = policy.max_entries {
            if self.entries > max {
                return Err(CartonError::QuotaExceeded(format!(
                    "archive contains more than {max} entries"
                )));
            }
        }
        if let Some(max) = policy.max_entry_size {
            if size > max {
                return Err(CartonError::QuotaExceeded(format!(
                    "entry {name} size {size} exceeds limit {max}"
                )));
            }
        }
        Ok(())
    }

    /// Checks the bytes actually produced for one entry, since its header
    /// size can lie.
    pub(crate) fn admit_entry_bytes(
        &self,
        policy: &Policy,
        name: &str,
        written: u64,
    ) -> Result<()> {
        if let Some(max) = policy.max_entry_size {
            if written > max {
                return Err(CartonError::QuotaExceeded(format!(
                    "entry {name} size {written} exceeds limit {max}"
                )));
            }
        }
        Ok(())
    }

    /// Counts payload bytes as they are actually written, since headers can lie.
    pub(crate) fn admit_bytes(&mut self, policy: &Policy, n: u64) -> Result<()> {
        self.total = self.total.saturating_add(n);
        if let Some(max) = policy.max_total_size {
            if self.total > max {
                return Err(CartonError::QuotaExceeded(format!(
                    "total uncompressed size {} exceeds limit {max}",
                    self.total
                )));
            }
        }
        Ok(())
    }
}
