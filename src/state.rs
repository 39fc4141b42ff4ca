//! Centralised state-vector index table (spec.md §9 "Magic indices"
//! redesign flag) and the nominal navigation state (spec.md §3 "Navigation
//! state").
//!
//! Grounded on `examples/xhlsa-gojo/motion_tracker_rs/src/types/linalg.rs`'s
//! named-constant table (`STATE_DIM_15`, `MEASURE_DIM_GPS_POS`, ...),
//! generalized from a fixed-size compile-time table to a runtime
//! `StateLayout` because the extended variant's ambiguity-state count `N`
//! is not known until satellites are sighted (spec.md §3 "Lifecycles").

use nalgebra::{DVector, Matrix3, Vector3};

/// Baseline error-state dimension (spec.md §3 "Error state").
pub const BASELINE_DIM: usize = 17;

/// Symbolic block offsets into the (baseline) error-state vector and the
/// 17-row block of any extended state. All Φ and H builders read these
/// instead of hard-coded indices.
#[derive(Debug, Clone, Copy)]
pub struct StateLayout {
    pub attitude: usize,
    pub velocity: usize,
    pub position: usize,
    pub accel_bias: usize,
    pub gyro_bias: usize,
    pub clock_offset: usize,
    pub clock_drift: usize,
    /// `Some(index)` when the extended (phase-enabled) variant is active.
    pub tropo: Option<usize>,
    /// Start index and count of the float-ambiguity block.
    pub ambiguities: (usize, usize),
}

impl StateLayout {
    /// Baseline 17-state layout (no tropo, no ambiguities).
    pub fn baseline() -> Self {
        Self {
            attitude: 0,
            velocity: 3,
            position: 6,
            accel_bias: 9,
            gyro_bias: 12,
            clock_offset: 15,
            clock_drift: 16,
            tropo: None,
            ambiguities: (BASELINE_DIM, 0),
        }
    }

    /// Extended layout: baseline block plus one zenith-tropo state
    /// followed by `n_ambiguities` float-ambiguity states.
    pub fn extended(n_ambiguities: usize) -> Self {
        let mut layout = Self::baseline();
        layout.tropo = Some(BASELINE_DIM);
        layout.ambiguities = (BASELINE_DIM + 1, n_ambiguities);
        layout
    }

    /// Total error-state / covariance dimension `nx`.
    pub fn dim(&self) -> usize {
        let base = BASELINE_DIM;
        let tropo = if self.tropo.is_some() { 1 } else { 0 };
        base + tropo + self.ambiguities.1
    }

    /// Rebuild this layout with a different ambiguity count, preserving
    /// whether the tropo state is active.
    pub fn with_ambiguity_count(&self, n_ambiguities: usize) -> Self {
        if self.tropo.is_some() {
            Self::extended(n_ambiguities)
        } else {
            Self::baseline()
        }
    }
}

/// Nominal navigation state (spec.md §3): attitude, velocity and position
/// in ECEF, IMU biases, receiver clock, and (extended variant) zenith tropo
/// delay and per-satellite float ambiguities.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct NavState {
    /// Body-to-ECEF direction cosine matrix.
    pub c_b_e: Matrix3<f64>,
    /// ECEF velocity (m/s).
    pub v_e: Vector3<f64>,
    /// ECEF position (m).
    pub r_e: Vector3<f64>,
    /// Accelerometer bias (m/s^2).
    pub b_a: Vector3<f64>,
    /// Gyroscope bias (rad/s).
    pub b_g: Vector3<f64>,
    /// Receiver clock offset (m).
    pub clock_offset: f64,
    /// Receiver clock drift (m/s).
    pub clock_drift: f64,
    /// Zenith tropospheric delay (m), extended variant only.
    pub tropo_zenith: Option<f64>,
    /// Float ambiguities (m), keyed by satellite-frequency id, extended
    /// variant only. Created on first sighting, removed on an outage
    /// timeout or cycle slip (spec.md §3 "Lifecycles").
    pub ambiguities: Vec<(u32, f64)>,
}

impl NavState {
    pub fn identity_at_rest() -> Self {
        Self {
            c_b_e: Matrix3::identity(),
            v_e: Vector3::zeros(),
            r_e: Vector3::zeros(),
            b_a: Vector3::zeros(),
            b_g: Vector3::zeros(),
            clock_offset: 0.0,
            clock_drift: 0.0,
            tropo_zenith: None,
            ambiguities: Vec::new(),
        }
    }

    pub fn layout(&self) -> StateLayout {
        match self.tropo_zenith {
            Some(_) => StateLayout::extended(self.ambiguities.len()),
            None => StateLayout::baseline(),
        }
    }

    /// Apply a closed-loop correction from an error-state vector, then the
    /// caller is responsible for zeroing `dx` for the non-clock states
    /// (spec.md §4.4 "Closed-loop correction").
    pub fn apply_correction(&mut self, dx: &DVector<f64>, layout: &StateLayout) {
        let d_phi = Vector3::new(
            dx[layout.attitude],
            dx[layout.attitude + 1],
            dx[layout.attitude + 2],
        );
        let correction = nalgebra::Matrix3::identity() - crate::frame::skew(&d_phi);
        self.c_b_e = correction * self.c_b_e;
        orthonormalize(&mut self.c_b_e);

        for i in 0..3 {
            self.v_e[i] -= dx[layout.velocity + i];
            self.r_e[i] -= dx[layout.position + i];
            self.b_a[i] += dx[layout.accel_bias + i];
            self.b_g[i] += dx[layout.gyro_bias + i];
        }
        self.clock_offset += dx[layout.clock_offset];
        self.clock_drift += dx[layout.clock_drift];

        if let Some(tropo_idx) = layout.tropo {
            if let Some(t) = self.tropo_zenith.as_mut() {
                *t += dx[tropo_idx];
            }
        }
        let (amb_start, amb_n) = layout.ambiguities;
        for (i, (_, n)) in self.ambiguities.iter_mut().enumerate().take(amb_n) {
            *n += dx[amb_start + i];
        }
    }
}

/// Re-orthonormalize a DCM via Gram-Schmidt, restoring the
/// orthonormal-within-float-error invariant (spec.md §4.1, §8 property 1)
/// after a repeated small-angle correction.
pub fn orthonormalize(c: &mut Matrix3<f64>) {
    let mut x = c.column(0).into_owned();
    let mut y = c.column(1).into_owned();
    x.normalize_mut();
    y -= x * x.dot(&y);
    y.normalize_mut();
    let z = x.cross(&y);
    c.set_column(0, &x);
    c.set_column(1, &y);
    c.set_column(2, &z);
}
