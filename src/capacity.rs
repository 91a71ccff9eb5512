//! Capacity models
//!
//! An index is either serverless (unbounded, usage-billed) or pod-based
//! (a fixed record limit with a meaningful fullness ratio). The variant
//! chosen at index creation decides whether quota checks run on the write
//! path and which filtered operations are available.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum CapacityModel {
    /// Unbounded capacity. Filtered deletes and filtered stats are not
    /// available; callers list by ID prefix and delete by explicit ID.
    Serverless,
    /// Bounded capacity with a fullness ratio.
    Pod { capacity: usize },
}

impl CapacityModel {
    /// Check whether `net_new` additional records fit. `current` is the
    /// record count before the write.
    pub fn check_write(&self, current: usize, net_new: usize) -> Result<()> {
        match self {
            CapacityModel::Serverless => Ok(()),
            CapacityModel::Pod { capacity } => {
                if current + net_new > *capacity {
                    Err(Error::CapacityExceeded(format!(
                        "namespace holds {} records, {} more would exceed capacity {}",
                        current, net_new, capacity
                    )))
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Fraction of provisioned capacity consumed. Reported as 0.0 for
    /// serverless, where fullness is not applicable.
    pub fn fullness(&self, record_count: usize) -> f32 {
        match self {
            CapacityModel::Serverless => 0.0,
            CapacityModel::Pod { capacity } => {
                if *capacity == 0 {
                    0.0
                } else {
                    record_count as f32 / *capacity as f32
                }
            }
        }
    }

    pub fn supports_filtered_delete(&self) -> bool {
        matches!(self, CapacityModel::Pod { .. })
    }

    pub fn supports_filtered_stats(&self) -> bool {
        matches!(self, CapacityModel::Pod { .. })
    }
}

impl Default for CapacityModel {
    fn default() -> Self {
        CapacityModel::Serverless
    }
}
