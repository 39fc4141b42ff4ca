//! Strapdown navigation integrator in ECEF (spec.md §4.1, §2 Component B).
//!
//! Grounded on `examples/xhlsa-gojo/motion_tracker_rs/src/filters/ekf_15d.rs`
//! `Ekf15d::predict` for the overall predict-step shape (correct IMU with
//! current bias, integrate attitude, rotate specific force to the reference
//! frame, integrate velocity and position), generalized from the teacher's
//! quaternion/local-frame mechanization to the two-sample ECEF mechanization
//! with first-order Earth-rotation compensation that spec.md §4.1 specifies
//! (matching `Nav_equations_ECEF` in
//! `examples/original_source/lib/gnssins/INS_GNSS.c`).

use crate::config::MAXDT;
use crate::frame::{normal_gravity_ecef, omega_ie_skew, rotation_z, skew, OMEGA_IE};
use crate::state::NavState;
use nalgebra::{Matrix3, Vector3};

/// Small-angle threshold below which the exact rotation-vector series is
/// replaced by its first-order fallback (spec.md §4.1 step 3).
const SMALL_ANGLE_EPS: f64 = 1e-8;

/// Propagate `state` one step given de-biased body-frame specific force and
/// angular rate averaged over `dt` seconds (spec.md §4.1 contract).
///
/// `dt` outside `(0, MAXDT]` logs a warning but still integrates, per
/// spec.md §4.1 "Invariants".
pub fn propagate(state: &mut NavState, dt: f64, f_b: Vector3<f64>, omega_b: Vector3<f64>) {
    if dt <= 0.0 || !dt.is_finite() {
        log::warn!("strapdown: non-positive or non-finite dt={dt}, skipping epoch");
        return;
    }
    if dt > MAXDT {
        log::warn!("strapdown: dt={dt} exceeds MAXDT={MAXDT}, integrating anyway");
    }

    let c_b_e_old = state.c_b_e;
    let v_e_old = state.v_e;
    let r_e_old = state.r_e;

    // Step 1: Earth-rotation compensation over the interval.
    let alpha_ie = OMEGA_IE * dt;
    let c_earth = rotation_z(-alpha_ie);

    // Step 2-3: body-frame incremental DCM from the rotation vector.
    let alpha_b = omega_b * dt;
    let a = skew(&alpha_b);
    let m = alpha_b.norm();
    let c_new_old = if m < SMALL_ANGLE_EPS {
        Matrix3::identity() + a
    } else {
        Matrix3::identity() + (m.sin() / m) * a + ((1.0 - m.cos()) / (m * m)) * (a * a)
    };

    // Step 4.
    let c_b_e_new = c_earth * c_b_e_old * c_new_old;

    // Step 5: average DCM over the interval.
    let half_skew_ie = 0.5 * skew(&Vector3::new(0.0, 0.0, alpha_ie));
    let c_bar = if m < SMALL_ANGLE_EPS {
        c_b_e_old - half_skew_ie * c_b_e_old
    } else {
        let series = ((1.0 - m.cos()) / (m * m)) * a + ((1.0 - m.sin() / m) / (m * m)) * (a * a);
        c_b_e_old * (Matrix3::identity() + series) - half_skew_ie * c_b_e_old
    };

    // Step 6-7: specific force to ECEF, gravity, Coriolis, velocity update.
    let f_e = c_bar * f_b;
    let g_e = normal_gravity_ecef(&r_e_old);
    let coriolis = 2.0 * omega_ie_skew() * v_e_old;
    let v_e_new = v_e_old + dt * (f_e + g_e - coriolis);

    // Step 8: trapezoidal position update.
    let r_e_new = r_e_old + 0.5 * dt * (v_e_old + v_e_new);

    state.c_b_e = c_b_e_new;
    crate::state::orthonormalize(&mut state.c_b_e);
    state.v_e = v_e_new;
    state.r_e = r_e_new;
}

/// Remove accelerometer and gyroscope bias from a raw IMU sample
/// (spec.md §4.1 "de-biased body-frame specific force and angular rate").
pub fn debias(
    f_b_raw: Vector3<f64>,
    omega_b_raw: Vector3<f64>,
    b_a: Vector3<f64>,
    b_g: Vector3<f64>,
) -> (Vector3<f64>, Vector3<f64>) {
    (f_b_raw - b_a, omega_b_raw - b_g)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{geodetic_to_ecef, ned_to_ecef_rotation, Geodetic};
    use approx::assert_relative_eq;

    fn stationary_state_at(lat_deg: f64) -> NavState {
        let pos = Geodetic {
            lat_rad: lat_deg.to_radians(),
            lon_rad: 0.0,
            height_m: 0.0,
        };
        let r_e = geodetic_to_ecef(&pos);
        let c_b_n = ned_to_ecef_rotation(&pos).transpose(); // body = NED at rest, identity attitude in NED
        NavState {
            c_b_e: ned_to_ecef_rotation(&pos) * c_b_n,
            v_e: Vector3::zeros(),
            r_e,
            ..NavState::identity_at_rest()
        }
    }

    #[test]
    fn stationary_specific_force_holds_position() {
        let mut state = stationary_state_at(45.0);
        let r0 = state.r_e;
        let dt = 0.01;
        let steps = 6000; // 60 seconds @ 100 Hz
        for _ in 0..steps {
            // Specific force that exactly cancels local gravity, expressed
            // in ECEF via the current attitude (identity body->NED here).
            let g_e = normal_gravity_ecef(&state.r_e);
            let f_b = state.c_b_e.transpose() * (-g_e);
            propagate(&mut state, dt, f_b, Vector3::zeros());
        }
        let drift = (state.r_e - r0).norm();
        assert!(drift < 1.0, "drift was {drift} m");
        assert!(state.v_e.norm() < 0.1);

        let frob_dev = (state.c_b_e.transpose() * state.c_b_e - Matrix3::identity()).norm();
        assert!(frob_dev < 1e-9);
    }

    #[test]
    fn zero_dt_is_a_no_op() {
        let mut state = stationary_state_at(10.0);
        let before = state.r_e;
        propagate(&mut state, 0.0, Vector3::zeros(), Vector3::zeros());
        assert_relative_eq!(state.r_e, before);
    }

    #[test]
    fn maxdt_boundary_still_integrates() {
        let mut state = stationary_state_at(0.0);
        let g_e = normal_gravity_ecef(&state.r_e);
        let f_b = state.c_b_e.transpose() * (-g_e);
        propagate(&mut state, MAXDT, f_b, Vector3::zeros());
        propagate(&mut state, MAXDT + 1e-6, f_b, Vector3::zeros());
        assert!(state.r_e.iter().all(|x| x.is_finite()));
    }
}
