//! Construction-time configuration (spec.md §6 "Construction inputs").
//!
//! Grounded on `examples/xhlsa-gojo/motion_tracker_rs/src/sensor_fusion.rs`'s
//! `FusionConfig`: one flat struct holding every tunable, a `Default` impl
//! that picks sane defaults, and named constructors for the IMU-grade
//! presets that the teacher expresses as `FusionConfig::default()`.

use nalgebra::Vector3;

/// IMU grade, selecting default noise PSDs (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImuGrade {
    Consumer,
    Tactical,
}

/// EKF option flags (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EkfOptions {
    /// Use the matrix-exponential (truncated Taylor) Φ instead of the
    /// first-order `I + F·Δt` approximation.
    pub precise_phi: bool,
    /// Replace the static Q with the adaptive, residual-driven estimate.
    pub adaptive_q: bool,
    /// Scale process noise by `NavConfig::pn_scale_factor` (e.g. to inflate
    /// Q during known-dynamic segments).
    pub scale_pn: bool,
    /// Enable the extended variant (zenith tropo delay + float ambiguities).
    pub phase_on: bool,
}

/// Initial 1-sigma uncertainties used to seed the covariance (spec.md §6).
#[derive(Debug, Clone, Copy)]
pub struct InitialUncertainty {
    pub attitude_rad: f64,
    pub velocity_mps: f64,
    pub position_m: f64,
    pub accel_bias: f64,
    pub gyro_bias: f64,
    pub clock_offset_m: f64,
    pub clock_drift_mps: f64,
}

/// Process-noise PSDs (continuous-time spectral densities), one set per IMU
/// grade (spec.md §4.2 "Building Q").
#[derive(Debug, Clone, Copy)]
pub struct ProcessNoise {
    pub gyro_psd: f64,
    pub accel_psd: f64,
    pub accel_bias_psd: f64,
    pub gyro_bias_psd: f64,
    pub clock_phase_psd: f64,
    pub clock_freq_psd: f64,
}

/// Per-GNSS-epoch gate thresholds (spec.md §4.5 table).
#[derive(Debug, Clone, Copy)]
pub struct GateThresholds {
    pub max_time_sync_s: f64,
    pub min_satellites: usize,
    pub max_gdop: f64,
    pub max_ned_sigma_m: f64,
}

/// Attitude-recheck (straight-line heading) parameters (spec.md §4.5).
#[derive(Debug, Clone, Copy)]
pub struct AttitudeRecheck {
    pub n_pos_epochs: usize,
    pub max_heading_std_deg: f64,
    pub min_velocity_mps: f64,
    pub max_gyro_rate: f64,
    pub max_yaw_delta_deg: f64,
}

/// Divergence-recovery threshold (spec.md §4.5 `Diverged` state).
#[derive(Debug, Clone, Copy)]
pub struct DivergenceThresholds {
    pub max_mean_pos_variance: f64,
}

/// Maximum Δt accepted by the strapdown integrator before a warning is
/// logged (spec.md §4.1). Propagation still runs past this.
pub const MAXDT: f64 = 1.0;

/// Clock-jump detection threshold in meters (spec.md §8 scenario 6, §4.7 of
/// SPEC_FULL.md).
pub const CLOCK_JUMP_THRESHOLD_M: f64 = 10_000.0;

/// Full estimator configuration.
#[derive(Debug, Clone)]
pub struct NavConfig {
    pub grade: ImuGrade,
    pub ekf_options: EkfOptions,
    pub initial_uncertainty: InitialUncertainty,
    pub process_noise: ProcessNoise,
    pub gates: GateThresholds,
    pub attitude_recheck: AttitudeRecheck,
    pub divergence: DivergenceThresholds,
    /// Lever arm from IMU to GNSS antenna, body frame (m).
    pub lever_arm: Vector3<f64>,
    /// Multiplier applied to Q when `ekf_options.scale_pn` is set (spec.md
    /// §4.2 "Q scaling").
    pub pn_scale_factor: f64,
    /// Gauss-Markov correlation time for biases (s); `None` selects pure
    /// random-walk bias propagation (spec.md §4.2 "Bias blocks").
    pub bias_correlation_time_s: Option<f64>,
}

impl NavConfig {
    pub fn consumer() -> Self {
        Self::for_grade(ImuGrade::Consumer)
    }

    pub fn tactical() -> Self {
        Self::for_grade(ImuGrade::Tactical)
    }

    fn for_grade(grade: ImuGrade) -> Self {
        let process_noise = match grade {
            ImuGrade::Consumer => ProcessNoise {
                gyro_psd: 1.0e-6,
                accel_psd: 2.5e-3,
                accel_bias_psd: 1.0e-7,
                gyro_bias_psd: 1.0e-10,
                clock_phase_psd: 1.0,
                clock_freq_psd: 0.1,
            },
            ImuGrade::Tactical => ProcessNoise {
                gyro_psd: 1.0e-9,
                accel_psd: 2.5e-5,
                accel_bias_psd: 1.0e-9,
                gyro_bias_psd: 1.0e-13,
                clock_phase_psd: 1.0,
                clock_freq_psd: 0.1,
            },
        };
        let initial_uncertainty = match grade {
            ImuGrade::Consumer => InitialUncertainty {
                attitude_rad: 0.1,
                velocity_mps: 1.0,
                position_m: 10.0,
                accel_bias: 0.5,
                gyro_bias: 0.01,
                clock_offset_m: 100.0,
                clock_drift_mps: 10.0,
            },
            ImuGrade::Tactical => InitialUncertainty {
                attitude_rad: 0.01,
                velocity_mps: 0.3,
                position_m: 10.0,
                accel_bias: 0.05,
                gyro_bias: 0.001,
                clock_offset_m: 100.0,
                clock_drift_mps: 10.0,
            },
        };
        Self {
            grade,
            ekf_options: EkfOptions::default(),
            initial_uncertainty,
            process_noise,
            gates: GateThresholds {
                max_time_sync_s: 0.002,
                min_satellites: 4,
                max_gdop: 2.5,
                max_ned_sigma_m: 5.0,
            },
            attitude_recheck: AttitudeRecheck {
                n_pos_epochs: 3,
                max_heading_std_deg: 8.0,
                min_velocity_mps: 2.0,
                max_gyro_rate: 0.02,
                max_yaw_delta_deg: 15.0,
            },
            divergence: DivergenceThresholds {
                max_mean_pos_variance: 100.0,
            },
            lever_arm: Vector3::zeros(),
            pn_scale_factor: 1.0,
            bias_correlation_time_s: None,
        }
    }
}

impl Default for NavConfig {
    fn default() -> Self {
        Self::consumer()
    }
}
