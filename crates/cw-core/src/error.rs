use crate::types::TimestampNanos;

/// Errors raised by client-side validation, before any remote call is made.
///
/// Anything that fails here is never sent to the agent. Callers surface the
/// message to the operator and leave local state untouched.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    /// Interval is below the remote minimum of 60 seconds.
    #[error("interval of {seconds}s is below the minimum of {min}s")]
    IntervalTooShort { seconds: u64, min: u64 },

    /// Interval exceeds one year.
    #[error("interval of {seconds}s exceeds the maximum of {max}s")]
    IntervalTooLong { seconds: u64, max: u64 },

    /// The randomized window's upper bound must be strictly greater than the
    /// base interval.
    #[error("max interval {max}s must be greater than interval {interval}s")]
    MaxIntervalNotGreater { interval: u64, max: u64 },

    #[error("max interval of {seconds}s exceeds the maximum of {max}s")]
    MaxIntervalTooLong { seconds: u64, max: u64 },

    /// A scheduled start or next-run time that is not in the future.
    #[error("scheduled time {at} is not in the future (now {now})")]
    ScheduleInPast {
        at: TimestampNanos,
        now: TimestampNanos,
    },

    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    #[error("no token ledger selected")]
    MissingToken,

    #[error("a distribution list needs at least one target")]
    NoTargets,

    /// Target at `index` (zero-based) has no account owner.
    #[error("target {index} has no recipient")]
    MissingRecipient { index: usize },

    #[error("invalid principal {0:?}")]
    InvalidPrincipal(String),

    #[error("target {index} percent {percent} is outside 0..=100")]
    PercentOutOfRange { index: usize, percent: f64 },

    #[error("target {index} basis points {basis_points} exceed 10000")]
    BasisPointsOutOfRange { index: usize, basis_points: u32 },

    #[error("invalid subaccount: {0}")]
    InvalidSubaccount(String),
}
