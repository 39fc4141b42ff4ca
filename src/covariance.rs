//! Covariance propagator: builds Φ and Q for a Δt and propagates P
//! (spec.md §4.2, §2 Component C).
//!
//! Grounded on `examples/xhlsa-gojo/motion_tracker_rs/src/filters/es_ekf.rs`
//! (`build_es_ekf_jacobian` / `build_process_noise`: block-diagonal Φ/Q
//! construction keyed by state slots, then `P = F·P·F^T + Q`), generalized
//! from that filter's fixed 8-state layout to the 17(+N)-state layout in
//! `crate::state::StateLayout`, and from a simple Euler propagation to the
//! trapezoidal `P = Φ(P + ½Q)Φ^T + ½Q` discretisation spec.md §4.2 requires.
//! The optional precise Φ (truncated Taylor matrix exponential) follows
//! `precPhi`/`expmat` in
//! `examples/original_source/lib/gnssins/INS_GNSS.c`.

use crate::config::{NavConfig, ProcessNoise};
use crate::frame::{normal_gravity_ecef, omega_ie_skew, skew};
use crate::state::{NavState, StateLayout};
use nalgebra::{DMatrix, Matrix3, Vector3};

/// Order of the truncated Taylor series used for the precise (matrix
/// exponential) Φ, matching the reference's `ORDERS` constant.
const PRECISE_PHI_ORDER: usize = 4;

/// Build the continuous-time dynamics matrix `F` (spec.md §4.2 "Optional
/// precise Φ"), used directly for the first-order Φ and as the basis for
/// the matrix-exponential Φ.
pub fn build_f(
    layout: &StateLayout,
    state: &NavState,
    f_b: Vector3<f64>,
    config: &NavConfig,
) -> DMatrix<f64> {
    let nx = layout.dim();
    let mut f = DMatrix::<f64>::zeros(nx, nx);

    let c_b_e = state.c_b_e;
    let r_e = state.r_e;
    let re_norm = r_e.norm();
    let geocentric_r = crate::frame::geocentric_radius(crate::frame::ecef_to_geodetic(&r_e).lat_rad);

    let omega_ie = omega_ie_skew();
    let f_ie = c_b_e * f_b;
    let f_ie_skew = skew(&f_ie);
    let g_e = normal_gravity_ecef(&r_e);

    set_block(&mut f, layout.attitude, layout.attitude, &(-omega_ie));
    set_block(&mut f, layout.attitude, layout.gyro_bias, &c_b_e);

    set_block(&mut f, layout.velocity, layout.velocity, &(-2.0 * omega_ie));
    set_block(&mut f, layout.velocity, layout.attitude, &(-f_ie_skew));
    if re_norm > 0.0 {
        let vel_pos = -(2.0 / (geocentric_r * re_norm)) * (g_e * r_e.transpose());
        set_block(&mut f, layout.velocity, layout.position, &vel_pos);
    }
    set_block(&mut f, layout.velocity, layout.accel_bias, &c_b_e);

    set_block(&mut f, layout.position, layout.velocity, &Matrix3::identity());

    let tau = config.bias_correlation_time_s;
    set_bias_block(&mut f, layout.accel_bias, tau);
    set_bias_block(&mut f, layout.gyro_bias, tau);

    f[(layout.clock_offset, layout.clock_drift)] = 1.0;

    f
}

fn set_block(m: &mut DMatrix<f64>, row: usize, col: usize, block: &Matrix3<f64>) {
    for i in 0..3 {
        for j in 0..3 {
            m[(row + i, col + j)] = block[(i, j)];
        }
    }
}

/// Gauss-Markov decay rate for a bias block: `-1/tau` on the diagonal, or
/// zero (pure random walk) when `tau` is `None` (spec.md §4.2 "Bias blocks").
fn set_bias_block(f: &mut DMatrix<f64>, start: usize, tau: Option<f64>) {
    if let Some(tau) = tau {
        for i in 0..3 {
            f[(start + i, start + i)] = -1.0 / tau;
        }
    }
}

/// Build the discrete-time state transition matrix Φ for interval `dt`.
///
/// With `config.ekf_options.precise_phi` set, uses the truncated Taylor
/// series of `exp(F·dt)`; otherwise the first-order `Φ = I + F·dt`
/// (spec.md §4.2).
pub fn build_phi(
    layout: &StateLayout,
    state: &NavState,
    f_b: Vector3<f64>,
    dt: f64,
    config: &NavConfig,
) -> DMatrix<f64> {
    let nx = layout.dim();
    let f = build_f(layout, state, f_b, config);
    if config.ekf_options.precise_phi {
        matrix_exp_taylor(&(f * dt), PRECISE_PHI_ORDER)
    } else {
        DMatrix::identity(nx, nx) + f * dt
    }
}

/// Truncated Taylor series `exp(A) ≈ I + A + A²/2! + ... + A^order/order!`.
fn matrix_exp_taylor(a: &DMatrix<f64>, order: usize) -> DMatrix<f64> {
    let n = a.nrows();
    let mut e = DMatrix::<f64>::identity(n, n);
    let mut term = DMatrix::<f64>::identity(n, n);
    for k in 1..=order {
        term = &term * a / (k as f64);
        e += &term;
    }
    e
}

/// Build the (diagonal) process-noise matrix Q for interval `dt`
/// (spec.md §4.2 "Building Q").
pub fn build_q(layout: &StateLayout, dt: f64, psd: &ProcessNoise) -> DMatrix<f64> {
    let nx = layout.dim();
    let mut q = DMatrix::<f64>::zeros(nx, nx);
    for i in 0..3 {
        q[(layout.attitude + i, layout.attitude + i)] = psd.gyro_psd * dt;
        q[(layout.velocity + i, layout.velocity + i)] = psd.accel_psd * dt;
        q[(layout.accel_bias + i, layout.accel_bias + i)] = psd.accel_bias_psd * dt;
        q[(layout.gyro_bias + i, layout.gyro_bias + i)] = psd.gyro_bias_psd * dt;
    }
    q[(layout.clock_offset, layout.clock_offset)] = psd.clock_phase_psd * dt;
    q[(layout.clock_drift, layout.clock_drift)] = psd.clock_freq_psd * dt;
    q
}

/// Propagate the covariance: `P+ = Φ(P + ½Q)Φ^T + ½Q` (spec.md §4.2
/// trapezoidal discretisation). Symmetrizes the result on exit, which also
/// repairs the `P⁺ stays symmetric` invariant against float-accumulated
/// asymmetry.
pub fn propagate_p(p: &DMatrix<f64>, phi: &DMatrix<f64>, q: &DMatrix<f64>) -> DMatrix<f64> {
    let half_q = 0.5 * q;
    let propagated = phi * (p + &half_q) * phi.transpose() + &half_q;
    symmetrize(&propagated)
}

pub fn symmetrize(p: &DMatrix<f64>) -> DMatrix<f64> {
    0.5 * (p + p.transpose())
}

/// Seed a diagonal covariance from the configured initial uncertainties
/// (spec.md §4.5 `Uninitialised` state "seed P from defaults").
pub fn default_covariance(layout: &StateLayout, config: &NavConfig) -> DMatrix<f64> {
    let nx = layout.dim();
    let u = &config.initial_uncertainty;
    let mut p = DMatrix::<f64>::zeros(nx, nx);
    for i in 0..3 {
        p[(layout.attitude + i, layout.attitude + i)] = u.attitude_rad.powi(2);
        p[(layout.velocity + i, layout.velocity + i)] = u.velocity_mps.powi(2);
        p[(layout.position + i, layout.position + i)] = u.position_m.powi(2);
        p[(layout.accel_bias + i, layout.accel_bias + i)] = u.accel_bias.powi(2);
        p[(layout.gyro_bias + i, layout.gyro_bias + i)] = u.gyro_bias.powi(2);
    }
    p[(layout.clock_offset, layout.clock_offset)] = u.clock_offset_m.powi(2);
    p[(layout.clock_drift, layout.clock_drift)] = u.clock_drift_mps.powi(2);
    if let Some(tropo_idx) = layout.tropo {
        p[(tropo_idx, tropo_idx)] = 1.0; // 1 m^2, generic zenith-delay prior
    }
    let (amb_start, amb_n) = layout.ambiguities;
    for i in 0..amb_n {
        p[(amb_start + i, amb_start + i)] = 100.0; // wide prior, meters^2
    }
    p
}

/// Adaptive Q estimate from the running outer product of observed
/// residuals, scaled through the Kalman gain (spec.md §4.2 "adaptive
/// estimate"). `innovation_outer` is the running average of `v v^T` for the
/// last accepted update; `k` is the Kalman gain from that update.
pub fn adaptive_q(k: &DMatrix<f64>, innovation_outer: &DMatrix<f64>) -> DMatrix<f64> {
    let raw = k * innovation_outer * k.transpose();
    symmetrize(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::NavState;

    #[test]
    fn propagated_p_is_symmetric_and_psd_diag() {
        let layout = StateLayout::baseline();
        let config = NavConfig::consumer();
        let state = NavState::identity_at_rest();
        let p0 = default_covariance(&layout, &config);
        let phi = build_phi(&layout, &state, Vector3::new(0.0, 0.0, 9.81), 0.1, &config);
        let q = build_q(&layout, 0.1, &config.process_noise);
        let p1 = propagate_p(&p0, &phi, &q);

        let asym = (&p1 - p1.transpose()).norm() / p1.norm();
        assert!(asym < 1e-9);
        for i in 0..layout.dim() {
            assert!(p1[(i, i)] >= -1e-12);
        }
    }

    #[test]
    fn precise_phi_close_to_first_order_for_small_dt() {
        let layout = StateLayout::baseline();
        let mut config = NavConfig::consumer();
        let state = NavState::identity_at_rest();
        let f_b = Vector3::new(0.0, 0.0, 9.81);

        config.ekf_options.precise_phi = false;
        let phi_first_order = build_phi(&layout, &state, f_b, 0.001, &config);

        config.ekf_options.precise_phi = true;
        let phi_precise = build_phi(&layout, &state, f_b, 0.001, &config);

        let diff = (&phi_first_order - &phi_precise).norm();
        assert!(diff < 1e-4, "diff was {diff}");
    }
}
