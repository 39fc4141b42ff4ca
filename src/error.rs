//! Error kinds and local-handling policy (spec.md §7).
//!
//! Only [`NavError::Fatal`] ever propagates out of an epoch call; everything
//! else is either skipped locally (logged) or downgraded to a flag on the
//! [`crate::supervisor::Solution`] record, per the "never throws across the
//! boundary for expected conditions" rule.

use thiserror::Error;

/// Conditions that can stop a measurement update or a full epoch from
/// running to completion.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum NavError {
    /// Non-finite IMU sample, or Δt outside `(0, MAXDT]`.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Innovation covariance `S` could not be factored (Cholesky/LU).
    #[error("innovation covariance is singular")]
    SingularInnovation,

    /// One or more fusion gates failed; epoch falls through to propagate-only.
    #[error("gate failed: {0}")]
    GateFailed(GateFailure),

    /// `Σ diag(P_pos)/3` exceeded the divergence threshold.
    #[error("covariance diverged")]
    Diverged,

    /// State-buffer allocation failed at construction time. Never recovered.
    #[error("fatal: {0}")]
    Fatal(String),
}

/// Which per-GNSS-epoch gate (spec.md §4.5 table) failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum GateFailure {
    TimeSync,
    SatelliteCount,
    Gdop,
    GnssNedCovariance,
    VelocitySanity,
}

impl std::fmt::Display for GateFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::TimeSync => "time sync",
            Self::SatelliteCount => "satellite count",
            Self::Gdop => "GDOP",
            Self::GnssNedCovariance => "GNSS NED covariance",
            Self::VelocitySanity => "velocity sanity",
        };
        write!(f, "{name}")
    }
}

/// Reason a single satellite observation was excluded from the measurement
/// batch (spec.md §4.3 "Satellite exclusion policy").
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RejectReason {
    Unhealthy,
    LowElevation,
    Duplicate,
    CorrectionFailure,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Unhealthy => "unhealthy SV",
            Self::LowElevation => "elevation below mask",
            Self::Duplicate => "duplicate observation",
            Self::CorrectionFailure => "tropo/iono correction failure",
        };
        write!(f, "{name}")
    }
}
