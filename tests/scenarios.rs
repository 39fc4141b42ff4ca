//! End-to-end fusion scenarios (spec.md §8).

use insfusion_core::config::NavConfig;
use insfusion_core::frame::{ecef_to_geodetic, geodetic_to_ecef, ned_to_ecef_rotation, Geodetic};
use insfusion_core::measurement::{MeasurementConfig, SatelliteObservation};
use insfusion_core::state::NavState;
use insfusion_core::supervisor::{Estimator, FusionState, GnssEpoch};
use nalgebra::Vector3;

fn stationary_state_at(lat_deg: f64, lon_deg: f64) -> NavState {
    let pos = Geodetic {
        lat_rad: lat_deg.to_radians(),
        lon_rad: lon_deg.to_radians(),
        height_m: 0.0,
    };
    let r_e = geodetic_to_ecef(&pos);
    NavState {
        c_b_e: ned_to_ecef_rotation(&pos),
        v_e: Vector3::zeros(),
        r_e,
        ..NavState::identity_at_rest()
    }
}

/// Satellites spread in azimuth and elevation around the receiver's local
/// NED frame, for well-conditioned (low-GDOP) geometry.
fn satellites_in_view(r_e: Vector3<f64>, count: usize) -> Vec<SatelliteObservation> {
    let orbit_radius = 2.656e7;
    let pos = ecef_to_geodetic(&r_e);
    let c_n_e = ned_to_ecef_rotation(&pos);
    (0..count)
        .map(|i| {
            let az = (i as f64) * std::f64::consts::TAU / count as f64;
            let el = 30f64.to_radians() + 40f64.to_radians() * ((i % 3) as f64 / 2.0);
            let u_ned = Vector3::new(el.cos() * az.cos(), el.cos() * az.sin(), -el.sin());
            let sat_pos = r_e + orbit_radius * (c_n_e * u_ned);
            let pseudorange_m = (sat_pos - r_e).norm();
            // `sat_pos` above is the true, already-rotated line-of-sight
            // position; the measurement engine expects the raw
            // (pre-Sagnac) ECEF position and applies the rotation itself,
            // so undo it here to keep the synthetic truth self-consistent.
            let c_sag = insfusion_core::frame::rotation_z(
                -insfusion_core::frame::OMEGA_IE * pseudorange_m / insfusion_core::measurement::SPEED_OF_LIGHT,
            );
            let sat_pos_raw = c_sag.transpose() * sat_pos;
            SatelliteObservation {
                sat_id: i as u32,
                pseudorange_m,
                doppler_mps: 0.0,
                sat_pos_ecef: sat_pos_raw,
                sat_vel_ecef: Vector3::zeros(),
                elevation_rad: el,
                healthy: true,
            }
        })
        .collect()
}

fn measurement_config() -> MeasurementConfig {
    MeasurementConfig {
        elevation_mask_rad: 10f64.to_radians(),
        sigma0_pseudorange_m: 3.0,
        sigma0_doppler_mps: 0.5,
    }
}

/// Scenario 1: static stationary — a level, motionless receiver with good
/// satellite geometry should converge to `Integrated` and stay bounded.
#[test]
fn static_stationary_converges_to_integrated() {
    let state = stationary_state_at(45.0, -93.0);
    let r_e = state.r_e;
    let mut est = Estimator::new(NavConfig::consumer(), state);

    let dt = 0.1;
    let mut t = 0.0;
    for step in 0..50 {
        t += dt;
        let g_e = insfusion_core::frame::normal_gravity_ecef(&r_e);
        let f_b = est.state().c_b_e.transpose() * (-g_e);
        est.step_imu(t, f_b, Vector3::zeros());

        if step % 10 == 0 {
            let epoch = GnssEpoch {
                time_s: t,
                observations: satellites_in_view(r_e, 6),
                gdop: 1.5,
                reported_ned_sigma_m: (2.0, 2.0),
                measurement: measurement_config(),
            };
            let solution = est.step_gnss(&epoch).unwrap();
            if step >= 20 {
                assert_eq!(solution.fusion_state, FusionState::Integrated);
            }
        }
    }
    assert!((est.state().r_e - r_e).norm() < 50.0);
}

/// Scenario 2: pure strapdown drift — no GNSS corrections arrive, so
/// position error grows only from the uncompensated residual accelerometer
/// bias; it must stay within the configured grade's bound over 60 s.
#[test]
fn pure_strapdown_drift_stays_within_grade_bound() {
    for (config, residual_bias, bound_m) in [
        (NavConfig::consumer(), 0.01, 500.0),
        (NavConfig::tactical(), 0.0005, 10.0),
    ] {
        let state = stationary_state_at(45.0, -93.0);
        let r_e = state.r_e;
        let mut est = Estimator::new(config, state);

        let dt = 0.01;
        let mut t = 0.0;
        for _ in 0..6000 {
            t += dt;
            let g_e = insfusion_core::frame::normal_gravity_ecef(&r_e);
            // Truth specific force exactly cancels gravity; the estimator is
            // fed an uncompensated residual bias on top of it, representative
            // of what survives this IMU grade's own calibration.
            let f_b = est.state().c_b_e.transpose() * (-g_e) + Vector3::new(residual_bias, 0.0, 0.0);
            est.step_imu(t, f_b, Vector3::zeros());
        }
        let drift = (est.state().r_e - r_e).norm();
        assert!(drift <= bound_m, "grade bound {bound_m} m exceeded: drift={drift} m");
    }
}

/// Scenario 4: divergence recovery — a long outage lets `P`'s position block
/// grow, then a clean GNSS batch must shrink `sum(diag(P_pos))` by at least
/// 95% within 10 updates.
#[test]
fn divergence_recovery_after_outage_shrinks_covariance() {
    let state = stationary_state_at(45.0, -93.0);
    let r_e = state.r_e;
    let mut est = Estimator::new(NavConfig::consumer(), state);

    let dt = 0.1;
    let mut t = 0.0;
    for _ in 0..1200 {
        // 120 s of GNSS outage.
        t += dt;
        let g_e = insfusion_core::frame::normal_gravity_ecef(&r_e);
        let f_b = est.state().c_b_e.transpose() * (-g_e);
        est.step_imu(t, f_b, Vector3::zeros());
    }

    let layout = est.state().layout();
    let pos_variance_sum = |p: &nalgebra::DMatrix<f64>| {
        let pos = layout.position;
        p[(pos, pos)] + p[(pos + 1, pos + 1)] + p[(pos + 2, pos + 2)]
    };
    let pos_var_before = pos_variance_sum(&est.export_state().1);

    for _ in 0..10 {
        t += dt;
        let g_e = insfusion_core::frame::normal_gravity_ecef(&r_e);
        let f_b = est.state().c_b_e.transpose() * (-g_e);
        est.step_imu(t, f_b, Vector3::zeros());

        let epoch = GnssEpoch {
            time_s: t,
            observations: satellites_in_view(r_e, 6),
            gdop: 1.5,
            reported_ned_sigma_m: (2.0, 2.0),
            measurement: measurement_config(),
        };
        est.step_gnss(&epoch).unwrap();
    }

    let pos_var_after = pos_variance_sum(&est.export_state().1);
    assert!(
        pos_var_after <= 0.05 * pos_var_before,
        "expected >=95% covariance reduction: before={pos_var_before} after={pos_var_after}"
    );
}

/// Scenario 3: gate reject — too few satellites keeps the estimator in
/// `NavigateOnly` and flags the satellite-count gate, without touching the
/// propagated state.
#[test]
fn gate_reject_on_insufficient_satellites() {
    let state = stationary_state_at(0.0, 0.0);
    let r_e = state.r_e;
    let mut est = Estimator::new(NavConfig::consumer(), state);

    est.step_imu(0.0, Vector3::new(0.0, 0.0, 9.81), Vector3::zeros());
    est.step_imu(0.1, Vector3::new(0.0, 0.0, 9.81), Vector3::zeros());

    let epoch = GnssEpoch {
        time_s: 0.1,
        observations: satellites_in_view(r_e, 2),
        gdop: 1.5,
        reported_ned_sigma_m: (2.0, 2.0),
        measurement: measurement_config(),
    };
    let solution = est.step_gnss(&epoch).unwrap();
    assert!(!solution.gates_failed.is_empty());
    assert_eq!(solution.fusion_state, FusionState::NavigateOnly);
}

/// Scenario 5: coarse alignment — leveling from a stationary IMU window
/// recovers a near-zero roll/pitch attitude, and gyrocompassing recovers
/// yaw within 1° when the Earth-rate SNR exceeds 3.
#[test]
fn coarse_alignment_levels_and_gyrocompasses() {
    let lat = 45f64.to_radians();
    let known_yaw = 90f64.to_radians();
    let k = insfusion_core::frame::OMEGA_IE * lat.cos();
    let mean_omega = Vector3::new(
        k * known_yaw.cos(),
        -k * known_yaw.sin(),
        -insfusion_core::frame::OMEGA_IE * lat.sin(),
    );
    let accel_samples: Vec<Vector3<f64>> = (0..100).map(|_| Vector3::new(0.0, 0.0, -9.80665)).collect();
    let gyro_samples: Vec<Vector3<f64>> = (0..100).map(|_| mean_omega).collect();

    let state = insfusion_core::supervisor::coarse_align(&accel_samples, &gyro_samples, lat).unwrap();
    let pos = ecef_to_geodetic(&state.r_e);
    let c_b_n = ned_to_ecef_rotation(&pos).transpose() * state.c_b_e;
    let (roll, pitch, yaw) = insfusion_core::frame::dcm_to_euler(&c_b_n);
    assert!(roll.abs() < 1e-6);
    assert!(pitch.abs() < 1e-6);
    assert!((yaw - known_yaw).abs().to_degrees() < 1.0);
}

/// Scenario 6: clock jump — a large step in receiver clock offset between
/// GNSS epochs is flagged non-fatally on the solution record.
#[test]
fn clock_jump_is_flagged_without_erroring() {
    let mut state = stationary_state_at(45.0, -93.0);
    state.clock_offset = 0.0;
    let r_e = state.r_e;
    let mut est = Estimator::new(NavConfig::consumer(), state);

    est.step_imu(0.0, Vector3::new(0.0, 0.0, 9.81), Vector3::zeros());
    est.step_imu(0.1, Vector3::new(0.0, 0.0, 9.81), Vector3::zeros());

    let mut sats = satellites_in_view(r_e, 6);
    for sat in sats.iter_mut() {
        sat.pseudorange_m += 20_000.0; // step the solved clock offset by ~20 km
    }
    let epoch = GnssEpoch {
        time_s: 0.1,
        observations: sats,
        gdop: 1.5,
        reported_ned_sigma_m: (2.0, 2.0),
        measurement: measurement_config(),
    };
    let solution = est.step_gnss(&epoch).unwrap();
    assert!(solution.clock_jump_detected);
}
