//! Tightly-coupled INS/GNSS navigation engine core.
//!
//! A single-threaded, pure-function estimator: a strapdown inertial
//! integrator in ECEF, an error-state EKF covariance propagator, a GNSS
//! pseudorange/Doppler measurement engine, and a fusion supervisor tying the
//! three together into a state machine a caller drives one epoch at a time.
//! The crate owns no I/O and no internal concurrency; see
//! [`supervisor::Estimator`] for the entry point.

pub mod config;
pub mod covariance;
pub mod error;
pub mod frame;
pub mod measurement;
pub mod state;
pub mod strapdown;
pub mod supervisor;

pub use config::NavConfig;
pub use error::NavError;
pub use state::NavState;
pub use supervisor::{Estimator, FusionState, GnssEpoch, Solution};
