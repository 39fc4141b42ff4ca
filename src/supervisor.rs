//! Fusion supervisor (spec.md §4.5, §2 Component E): the `Estimator`
//! orchestrates strapdown propagation, covariance propagation, GNSS
//! measurement fusion, and the lifecycle state machine, and is the only
//! public entry point a caller drives.
//!
//! Grounded on `examples/xhlsa-gojo/motion_tracker_rs/src/sensor_fusion.rs`'s
//! `SensorFusion::process_imu`/`process_gps` epoch-loop shape (predict,
//! gate, update, flag) generalized to the five-way gate table and four-state
//! machine spec.md §4.5 specifies. The EKF update (S/K/Joseph form), the
//! divergence check, and the attitude recheck are cross-checked against
//! `examples/original_source/lib/gnssins/INS_GNSS.c`'s `chkpcov` and
//! `rechkatt`.

use crate::config::NavConfig;
use crate::covariance::{adaptive_q, build_phi, build_q, default_covariance, propagate_p};
use crate::error::{GateFailure, NavError, RejectReason};
use crate::frame::ecef_to_geodetic;
use crate::measurement::{build_row, check_exclusion, stack_rows, MeasurementConfig, SatelliteObservation};
use crate::state::{NavState, StateLayout};
use crate::strapdown::debias;
use nalgebra::{DMatrix, DVector, Vector3};

/// Fusion lifecycle state (spec.md §4.5 "State machine").
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum FusionState {
    Uninitialised,
    NavigateOnly,
    Integrated,
    Diverged,
}

/// One GNSS epoch's observations plus timestamp, for the time-sync gate.
pub struct GnssEpoch {
    pub time_s: f64,
    pub observations: Vec<SatelliteObservation>,
    /// Reported GDOP from the GNSS receiver/positioning solution (spec.md
    /// §6 "Per-GNSS-epoch input").
    pub gdop: f64,
    /// Reported NED position covariance diagonal (σ_N, σ_E in meters) from
    /// the GNSS receiver/positioning solution (spec.md §6, §4.5 "GNSS NED
    /// covariance" gate) — not derived from the estimator's own `P`.
    pub reported_ned_sigma_m: (f64, f64),
    pub measurement: MeasurementConfig,
}

/// Per-epoch solution record (spec.md §3 "Solution record"). Expected
/// conditions never panic or propagate as `Err`; they show up here as flags.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Solution {
    pub time_s: f64,
    pub state: NavState,
    pub fusion_state: FusionState,
    pub gates_failed: Vec<GateFailure>,
    pub satellites_rejected: Vec<(u32, RejectReason)>,
    pub diverged_this_epoch: bool,
    pub clock_jump_detected: bool,
}

/// The single-threaded, cooperative estimator core (spec.md §5 "Threading
/// model"): one instance per thread, no internal concurrency, no async.
pub struct Estimator {
    config: NavConfig,
    state: NavState,
    layout: StateLayout,
    p: DMatrix<f64>,
    fusion_state: FusionState,
    last_imu_time_s: Option<f64>,
    last_gnss_time_s: Option<f64>,
    last_clock_offset: f64,
    last_omega_b: Vector3<f64>,
    heading_history: Vec<(f64, f64)>, // (time_s, yaw_rad) for attitude recheck
    /// Residual-driven Q estimate from the last accepted update, used in
    /// place of the static Q when `ekf_options.adaptive_q` is set (spec.md
    /// §4.2 "Q may be replaced by an adaptive estimate").
    adaptive_q_estimate: Option<DMatrix<f64>>,
}

impl Estimator {
    pub fn new(config: NavConfig, mut initial_state: NavState) -> Self {
        if config.ekf_options.phase_on && initial_state.tropo_zenith.is_none() {
            initial_state.tropo_zenith = Some(0.0);
        }
        let layout = initial_state.layout();
        let p = default_covariance(&layout, &config);
        let last_clock_offset = initial_state.clock_offset;
        Self {
            config,
            state: initial_state,
            layout,
            p,
            fusion_state: FusionState::Uninitialised,
            last_imu_time_s: None,
            last_gnss_time_s: None,
            last_clock_offset,
            last_omega_b: Vector3::zeros(),
            heading_history: Vec::new(),
            adaptive_q_estimate: None,
        }
    }

    pub fn state(&self) -> &NavState {
        &self.state
    }

    pub fn fusion_state(&self) -> FusionState {
        self.fusion_state
    }

    /// Serialize the estimator's state and covariance for checkpointing
    /// (spec.md §6 "export_state"/"import_state").
    pub fn export_state(&self) -> (NavState, DMatrix<f64>) {
        (self.state.clone(), self.p.clone())
    }

    pub fn import_state(&mut self, state: NavState, p: DMatrix<f64>) {
        self.layout = state.layout();
        self.state = state;
        self.p = p;
    }

    /// Propagate the state and covariance by one IMU sample (spec.md §4.1,
    /// §4.2). `time_s` is the sample's timestamp; Δt is derived from the
    /// previous call.
    pub fn step_imu(&mut self, time_s: f64, f_b_raw: Vector3<f64>, omega_b_raw: Vector3<f64>) {
        let dt = match self.last_imu_time_s {
            Some(prev) => time_s - prev,
            None => {
                self.last_imu_time_s = Some(time_s);
                if self.fusion_state == FusionState::Uninitialised {
                    self.fusion_state = FusionState::NavigateOnly;
                }
                return;
            }
        };
        self.last_imu_time_s = Some(time_s);
        if dt <= 0.0 || !dt.is_finite() {
            log::warn!("supervisor: non-positive or non-finite IMU dt={dt}, skipping epoch");
            return;
        }

        let (f_b, omega_b) = debias(f_b_raw, omega_b_raw, self.state.b_a, self.state.b_g);
        self.last_omega_b = omega_b;
        let phi = build_phi(&self.layout, &self.state, f_b, dt, &self.config);
        crate::strapdown::propagate(&mut self.state, dt, f_b, omega_b);

        let q = self.effective_q(dt);
        self.p = propagate_p(&self.p, &phi, &q);

        if self.fusion_state == FusionState::Uninitialised {
            self.fusion_state = FusionState::NavigateOnly;
        }
    }

    /// Run one GNSS measurement epoch: gates, satellite exclusion, EKF
    /// update, closed-loop correction, divergence check, attitude recheck
    /// (spec.md §4.3, §4.4, §4.5).
    pub fn step_gnss(&mut self, epoch: &GnssEpoch) -> Result<Solution, NavError> {
        let mut gates_failed = Vec::new();

        if let Some(prev) = self.last_gnss_time_s {
            if (epoch.time_s - prev).abs() < f64::EPSILON {
                gates_failed.push(GateFailure::TimeSync);
            }
        }
        if let Some(imu_t) = self.last_imu_time_s {
            if (epoch.time_s - imu_t).abs() > self.config.gates.max_time_sync_s {
                gates_failed.push(GateFailure::TimeSync);
            }
        }

        let mut admitted = Vec::new();
        let mut rejected = Vec::new();
        for sat in &epoch.observations {
            let seen_ids: Vec<u32> = admitted.iter().map(|s: &&SatelliteObservation| s.sat_id).collect();
            match check_exclusion(sat, &epoch.measurement, &seen_ids, true) {
                Ok(()) => admitted.push(sat),
                Err(reason) => rejected.push((sat.sat_id, reason)),
            }
        }

        if admitted.len() < self.config.gates.min_satellites {
            gates_failed.push(GateFailure::SatelliteCount);
        }
        if epoch.gdop >= self.config.gates.max_gdop {
            gates_failed.push(GateFailure::Gdop);
        }
        let (sigma_n, sigma_e) = epoch.reported_ned_sigma_m;
        let ned_sigma_m = (sigma_n * sigma_n + sigma_e * sigma_e).sqrt();
        if ned_sigma_m >= self.config.gates.max_ned_sigma_m {
            gates_failed.push(GateFailure::GnssNedCovariance);
        }
        if self.state.v_e.norm() > 1000.0 {
            gates_failed.push(GateFailure::VelocitySanity);
        }

        self.last_gnss_time_s = Some(epoch.time_s);

        if !gates_failed.is_empty() {
            self.fusion_state = match self.fusion_state {
                FusionState::Diverged => FusionState::Diverged,
                _ => FusionState::NavigateOnly,
            };
            return Ok(Solution {
                time_s: epoch.time_s,
                state: self.state.clone(),
                fusion_state: self.fusion_state,
                gates_failed,
                satellites_rejected: rejected,
                diverged_this_epoch: false,
                clock_jump_detected: false,
            });
        }

        let rows: Vec<_> = admitted
            .iter()
            .map(|sat| {
                build_row(
                    &self.layout,
                    self.state.r_e,
                    self.state.v_e,
                    self.state.clock_offset,
                    self.state.clock_drift,
                    sat,
                    0.0,
                    0.0,
                    0.0,
                    &epoch.measurement,
                )
            })
            .collect();
        let (h, z, r) = stack_rows(&self.layout, &rows);

        let diverged_this_epoch = match self.update(&h, &z, &r) {
            Ok(()) => false,
            Err(NavError::SingularInnovation) => {
                log::warn!("supervisor: singular innovation covariance, skipping update");
                false
            }
            Err(e) => return Err(e),
        };

        let clock_jump_detected = self.check_clock_jump();

        self.record_heading(epoch.time_s);
        self.run_attitude_recheck();

        let diverged_by_covariance = self.check_divergence();
        if diverged_by_covariance {
            self.fusion_state = FusionState::Diverged;
            self.p = default_covariance(&self.layout, &self.config);
        } else if self.fusion_state != FusionState::Diverged {
            self.fusion_state = FusionState::Integrated;
        } else {
            self.fusion_state = FusionState::NavigateOnly;
        }

        Ok(Solution {
            time_s: epoch.time_s,
            state: self.state.clone(),
            fusion_state: self.fusion_state,
            gates_failed,
            satellites_rejected: rejected,
            diverged_this_epoch: diverged_this_epoch || diverged_by_covariance,
            clock_jump_detected,
        })
    }

    /// Process noise for the next IMU propagation (spec.md §4.2): the
    /// residual-driven adaptive estimate from the last accepted update when
    /// `adaptive_q` is set and one is available, else the static Q; scaled
    /// by `pn_scale_factor` when `scale_pn` is set.
    fn effective_q(&self, dt: f64) -> DMatrix<f64> {
        let mut q = match (&self.adaptive_q_estimate, self.config.ekf_options.adaptive_q) {
            (Some(aq), true) => aq.clone(),
            _ => build_q(&self.layout, dt, &self.config.process_noise),
        };
        if self.config.ekf_options.scale_pn {
            q *= self.config.pn_scale_factor;
        }
        q
    }

    /// Error-state EKF update (spec.md §4.4): innovation, gain via Cholesky
    /// (falling back to LU), Joseph-form covariance update, closed-loop
    /// state correction.
    fn update(&mut self, h: &DMatrix<f64>, z: &DVector<f64>, r: &DMatrix<f64>) -> Result<(), NavError> {
        let s = h * &self.p * h.transpose() + r;
        let k = match s.clone().cholesky() {
            Some(chol) => {
                let s_inv = chol.inverse();
                &self.p * h.transpose() * s_inv
            }
            None => {
                let lu = s.clone().lu();
                let s_inv = lu.try_inverse().ok_or(NavError::SingularInnovation)?;
                &self.p * h.transpose() * s_inv
            }
        };

        let dx = &k * z;
        self.state.apply_correction(&dx, &self.layout);

        let nx = self.layout.dim();
        let identity = DMatrix::<f64>::identity(nx, nx);
        let ikh = &identity - &k * h;
        self.p = &ikh * &self.p * ikh.transpose() + &k * r * k.transpose();
        self.p = crate::covariance::symmetrize(&self.p);

        if self.config.ekf_options.adaptive_q {
            let innovation_outer = z * z.transpose();
            self.adaptive_q_estimate = Some(adaptive_q(&k, &innovation_outer));
        }

        Ok(())
    }

    /// `chkpcov`-style divergence check (spec.md §4.5 `Integrated` state):
    /// mean position-block variance exceeding the threshold flags
    /// divergence.
    fn check_divergence(&self) -> bool {
        let pos = self.layout.position;
        let mean_var = (self.p[(pos, pos)] + self.p[(pos + 1, pos + 1)] + self.p[(pos + 2, pos + 2)]) / 3.0;
        mean_var > self.config.divergence.max_mean_pos_variance
    }

    /// Flags a clock-jump event when the receiver clock offset steps by more
    /// than the configured threshold between consecutive GNSS epochs
    /// (SPEC_FULL.md §4.7, supplementing spec.md from `original_source`'s
    /// receiver-clock-reset handling).
    fn check_clock_jump(&mut self) -> bool {
        let delta = (self.state.clock_offset - self.last_clock_offset).abs();
        self.last_clock_offset = self.state.clock_offset;
        delta > crate::config::CLOCK_JUMP_THRESHOLD_M
    }

    fn record_heading(&mut self, time_s: f64) {
        let c_b_n = crate::frame::ned_to_ecef_rotation(&ecef_to_geodetic(&self.state.r_e)).transpose() * self.state.c_b_e;
        let (_, _, yaw) = crate::frame::dcm_to_euler(&c_b_n);
        self.heading_history.push((time_s, yaw));
        let window_start = time_s - self.config.attitude_recheck.n_pos_epochs as f64;
        self.heading_history.retain(|(t, _)| *t >= window_start);
    }

    /// `rechkatt`-style attitude recheck (spec.md §4.5 "Periodic attitude
    /// recheck"): when recent motion is straight and fast enough, re-derive
    /// yaw from the velocity vector and nudge the state toward it.
    fn run_attitude_recheck(&mut self) {
        let cfg = &self.config.attitude_recheck;
        if self.heading_history.len() < cfg.n_pos_epochs {
            return;
        }
        if self.state.v_e.norm() < cfg.min_velocity_mps {
            return;
        }
        if self.last_omega_b.norm() >= cfg.max_gyro_rate {
            return; // turning, not straight-line motion
        }

        let yaws: Vec<f64> = self.heading_history.iter().map(|(_, y)| *y).collect();
        let mean = yaws.iter().sum::<f64>() / yaws.len() as f64;
        let variance = yaws.iter().map(|y| (y - mean).powi(2)).sum::<f64>() / yaws.len() as f64;
        let std_deg = variance.sqrt().to_degrees();
        if std_deg > cfg.max_heading_std_deg {
            return; // not straight-line motion, skip recheck
        }

        let pos_geo = ecef_to_geodetic(&self.state.r_e);
        let c_e_n = crate::frame::ned_to_ecef_rotation(&pos_geo).transpose();
        let v_n = c_e_n * self.state.v_e;
        let yaw_from_vel = v_n.y.atan2(v_n.x);

        let delta = angle_wrap(yaw_from_vel - mean);
        if delta.abs().to_degrees() < cfg.max_yaw_delta_deg {
            return; // within tolerance, attitude hasn't drifted enough to correct
        }

        let new_yaw = mean + 0.5 * delta;
        let c_b_n_old = c_e_n * self.state.c_b_e;
        let (roll, pitch, _) = crate::frame::dcm_to_euler(&c_b_n_old);
        let c_b_n_new = euler_to_dcm(roll, pitch, new_yaw);
        self.state.c_b_e = crate::frame::ned_to_ecef_rotation(&pos_geo) * c_b_n_new;
        crate::state::orthonormalize(&mut self.state.c_b_e);
    }
}

fn angle_wrap(angle: f64) -> f64 {
    let two_pi = std::f64::consts::TAU;
    let mut a = angle % two_pi;
    if a > std::f64::consts::PI {
        a -= two_pi;
    } else if a < -std::f64::consts::PI {
        a += two_pi;
    }
    a
}

fn euler_to_dcm(roll: f64, pitch: f64, yaw: f64) -> nalgebra::Matrix3<f64> {
    let (sr, cr) = roll.sin_cos();
    let (sp, cp) = pitch.sin_cos();
    let (sy, cy) = yaw.sin_cos();
    nalgebra::Matrix3::new(
        cp * cy,
        sr * sp * cy - cr * sy,
        cr * sp * cy + sr * sy,
        cp * sy,
        sr * sp * sy + cr * cy,
        cr * sp * sy - sr * cy,
        -sp,
        sr * cp,
        cr * cp,
    )
}

/// Minimum ratio of the horizontal Earth-rate signal to gyro noise required
/// for gyrocompassing to be trusted (spec.md §8 scenario 5 "SNR > 3").
const GYROCOMPASS_MIN_SNR: f64 = 3.0;

/// Coarse static alignment: levelling (roll/pitch from mean specific force)
/// plus gyrocompassing (yaw from the gyro's projection of Earth rate onto
/// the horizontal plane), given a short window of stationary IMU samples at
/// a known latitude (SPEC_FULL.md §4.6, supplementing spec.md from
/// `original_source`'s initial-alignment handling). Returns `Err` when the
/// gyrocompassing SNR check (spec.md §8 scenario 5) fails.
pub fn coarse_align(
    f_b_samples: &[Vector3<f64>],
    omega_b_samples: &[Vector3<f64>],
    lat_rad: f64,
) -> Result<NavState, NavError> {
    let n = f_b_samples.len().max(1) as f64;
    let mean_f = f_b_samples.iter().fold(Vector3::zeros(), |acc, f| acc + f) / n;
    // A level, stationary accelerometer reads specific force opposing local
    // gravity-down, i.e. f_b ≈ -g_b (see strapdown::propagate's convention).
    let g_b = -mean_f;
    // For a level body (c_b_n ≈ I) this already has g_b ≈ (0, 0, +g).
    let roll = g_b.y.atan2(g_b.z);
    let pitch = (-g_b.x).atan2((g_b.y * g_b.y + g_b.z * g_b.z).sqrt());

    let n_g = omega_b_samples.len().max(1) as f64;
    let mean_omega = omega_b_samples.iter().fold(Vector3::zeros(), |acc, w| acc + w) / n_g;
    let noise_var = omega_b_samples
        .iter()
        .map(|w| (w - mean_omega).norm_squared())
        .sum::<f64>()
        / (3.0 * n_g);
    let noise_std = noise_var.sqrt();

    // Horizontal component of Earth rate, the gyrocompassing signal.
    let earth_rate_horizontal = crate::frame::OMEGA_IE * lat_rad.cos();
    let snr = if noise_std > 0.0 {
        earth_rate_horizontal / noise_std
    } else {
        f64::INFINITY
    };
    if snr <= GYROCOMPASS_MIN_SNR {
        return Err(NavError::InvalidInput(format!(
            "gyrocompassing SNR {snr:.2} at or below required {GYROCOMPASS_MIN_SNR}"
        )));
    }

    // Project the measured rate into the leveled (yaw-unresolved) frame and
    // recover yaw from its horizontal components against the known,
    // north-pointing Earth-rate vector (see DESIGN.md for the derivation).
    let c_b_n_rp = euler_to_dcm(roll, pitch, 0.0);
    let w_partial = c_b_n_rp * mean_omega;
    let yaw = (-w_partial.y).atan2(w_partial.x);

    let c_b_n = euler_to_dcm(roll, pitch, yaw);

    let mut state = NavState::identity_at_rest();
    let pos = crate::frame::Geodetic {
        lat_rad,
        lon_rad: 0.0,
        height_m: 0.0,
    };
    state.r_e = crate::frame::geodetic_to_ecef(&pos);
    state.c_b_e = crate::frame::ned_to_ecef_rotation(&pos) * c_b_n;
    Ok(state)
}
