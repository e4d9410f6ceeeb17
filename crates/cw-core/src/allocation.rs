//! Effective share computation for distribution targets.
//!
//! A target is either *assigned* (carries basis points) or *unassigned*.
//! Assigned weights are kept as-is while they fit in 100%; when they exceed
//! it, every assigned weight is scaled down proportionally and unassigned
//! targets get nothing. Any room left under 100% is split equally across the
//! unassigned targets, or reported as undistributed when there are none.
//!
//! All divisions floor. The list editor preview and the list review screen
//! both go through [`allocate`], so they always agree.

use serde::Serialize;

use crate::error::ValidationError;

/// 100% in basis points.
pub const FULL_ALLOCATION_BPS: u32 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Allocation {
    /// Effective basis points, one per input target, in input order.
    pub effective: Vec<u32>,
    /// Sum of assigned basis points (`A`).
    pub assigned_total: u64,
    /// Number of unassigned targets (`u`).
    pub unassigned_count: usize,
    /// Remainder left when `A < 10000` and no target is unassigned.
    pub undistributed_bps: u32,
    /// Basis points lost to flooring (always fewer than the target count).
    pub rounding_dust_bps: u32,
}

impl Allocation {
    pub fn is_oversubscribed(&self) -> bool {
        self.assigned_total > u64::from(FULL_ALLOCATION_BPS)
    }

    pub fn total_bps(&self) -> u32 {
        self.effective.iter().sum()
    }

    pub fn undistributed_percent(&self) -> f64 {
        bps_to_percent(self.undistributed_bps)
    }

    /// Operator-facing note, e.g. `"60% undistributed"`.
    pub fn summary(&self) -> Option<String> {
        if self.is_oversubscribed() {
            Some(format!(
                "assigned shares total {}%, scaled down to 100%",
                bps_to_percent_u64(self.assigned_total)
            ))
        } else if self.undistributed_bps > 0 {
            Some(format!("{}% undistributed", self.undistributed_percent()))
        } else {
            None
        }
    }
}

/// Compute each target's effective basis points.
pub fn allocate(targets: &[Option<u16>]) -> Allocation {
    let full = u64::from(FULL_ALLOCATION_BPS);
    let assigned_total: u64 = targets.iter().flatten().map(|bp| u64::from(*bp)).sum();
    let unassigned_count = targets.iter().filter(|t| t.is_none()).count();

    let effective: Vec<u32> = if assigned_total > full {
        targets
            .iter()
            .map(|t| match t {
                // Quotient is at most 10000 since bp <= A.
                Some(bp) => (u64::from(*bp) * full / assigned_total) as u32,
                None => 0,
            })
            .collect()
    } else {
        let share = if unassigned_count > 0 {
            ((full - assigned_total) / unassigned_count as u64) as u32
        } else {
            0
        };
        targets
            .iter()
            .map(|t| match t {
                Some(bp) => u32::from(*bp),
                None => share,
            })
            .collect()
    };

    let total: u32 = effective.iter().sum();
    let undistributed_bps = if assigned_total < full && unassigned_count == 0 {
        FULL_ALLOCATION_BPS - total
    } else {
        0
    };
    let rounding_dust_bps = FULL_ALLOCATION_BPS - total - undistributed_bps;

    Allocation {
        effective,
        assigned_total,
        unassigned_count,
        undistributed_bps,
        rounding_dust_bps,
    }
}

pub fn bps_to_percent(bps: u32) -> f64 {
    f64::from(bps) / 100.0
}

fn bps_to_percent_u64(bps: u64) -> f64 {
    bps as f64 / 100.0
}

/// Convert a human percent to basis points with `round(percent * 100)`.
///
/// `index` identifies the target in error messages.
pub fn percent_to_bps(index: usize, percent: f64) -> Result<u16, ValidationError> {
    if !percent.is_finite() || !(0.0..=100.0).contains(&percent) {
        return Err(ValidationError::PercentOutOfRange { index, percent });
    }
    Ok((percent * 100.0).round() as u16)
}

/// Reject raw basis points above 100%.
pub fn check_bps(index: usize, basis_points: u32) -> Result<u16, ValidationError> {
    if basis_points > FULL_ALLOCATION_BPS {
        return Err(ValidationError::BasisPointsOutOfRange {
            index,
            basis_points,
        });
    }
    Ok(basis_points as u16)
}
