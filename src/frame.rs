//! Frame & gravity primitives (spec.md §2 Component A).
//!
//! A small, internal set of formulas needed by the strapdown integrator,
//! covariance propagator and measurement engine: skew-symmetric operator,
//! WGS84 normal gravity in ECEF, geocentric radius, and ECEF↔geodetic
//! conversion. This is deliberately minimal — a full-featured geodetic
//! library (arbitrary datums, high-precision conversions) is the external
//! "coordinate library" spec.md §1/§6 name as out of scope; this module only
//! supplies what the navigation math in §4 consumes directly, mirroring how
//! `examples/original_source/lib/gnssins/INS_GNSS.c` calls `Gravity_ECEF`,
//! `georadi` and `ecef2pos` as plain in-file helpers rather than through an
//! external dependency.

use nalgebra::{Matrix3, UnitQuaternion, Vector3};

/// WGS84 equatorial radius (m).
pub const WGS84_A: f64 = 6_378_137.0;
/// WGS84 flattening.
pub const WGS84_F: f64 = 1.0 / 298.257_223_563;
/// WGS84 first eccentricity.
pub const WGS84_E: f64 = 0.081_819_190_842_5;
/// WGS84 Earth gravitational constant (m^3/s^2).
pub const WGS84_MU: f64 = 3.986_004_418e14;
/// WGS84 second gravitational constant (J2).
pub const WGS84_J2: f64 = 1.082_627e-3;
/// Earth rotation rate (rad/s).
pub const OMEGA_IE: f64 = 7.292_115e-5;

/// Skew-symmetric matrix of a 3-vector, such that `skew(a) * b == a.cross(&b)`.
pub fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}

/// Skew-symmetric matrix of the Earth rotation vector `[0, 0, omega_ie]`.
pub fn omega_ie_skew() -> Matrix3<f64> {
    skew(&Vector3::new(0.0, 0.0, OMEGA_IE))
}

/// Rotation about the ECEF Z axis by angle `angle` (radians), used for both
/// the Earth-rotation compensation in strapdown mechanization and the
/// Sagnac correction in the measurement engine.
pub fn rotation_z(angle: f64) -> Matrix3<f64> {
    let (s, c) = angle.sin_cos();
    Matrix3::new(c, s, 0.0, -s, c, 0.0, 0.0, 0.0, 1.0)
}

/// WGS84 normal gravity expressed in ECEF, including the J2 oblateness
/// term and the centrifugal contribution (Somigliana-consistent closed form
/// standard to strapdown-INS references).
pub fn normal_gravity_ecef(r_e: &Vector3<f64>) -> Vector3<f64> {
    let mag_r = r_e.norm();
    if mag_r == 0.0 {
        return Vector3::zeros();
    }
    let z_scale = 5.0 * (r_e.z / mag_r).powi(2);
    let j2_term = 1.5 * WGS84_J2 * (WGS84_A / mag_r).powi(2);
    let gamma = -WGS84_MU / mag_r.powi(3)
        * Vector3::new(
            r_e.x + j2_term * (1.0 - z_scale) * r_e.x,
            r_e.y + j2_term * (1.0 - z_scale) * r_e.y,
            r_e.z + j2_term * (3.0 - z_scale) * r_e.z,
        );
    gamma + Vector3::new(OMEGA_IE.powi(2) * r_e.x, OMEGA_IE.powi(2) * r_e.y, 0.0)
}

/// Geocentric radius of the WGS84 ellipsoid at geodetic latitude `lat_rad`.
pub fn geocentric_radius(lat_rad: f64) -> f64 {
    let e2 = WGS84_E * WGS84_E;
    let num = (lat_rad.cos()).powi(2) + ((1.0 - e2).powi(2)) * (lat_rad.sin()).powi(2);
    WGS84_A / (1.0 - e2 * lat_rad.sin().powi(2)).sqrt() * num.sqrt()
}

/// Geodetic position: latitude and longitude in radians, ellipsoidal height
/// in meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geodetic {
    pub lat_rad: f64,
    pub lon_rad: f64,
    pub height_m: f64,
}

/// ECEF to geodetic (Bowring's method, converges in a handful of iterations
/// for terrestrial heights).
pub fn ecef_to_geodetic(r_e: &Vector3<f64>) -> Geodetic {
    let e2 = WGS84_E * WGS84_E;
    let p = (r_e.x * r_e.x + r_e.y * r_e.y).sqrt();
    let lon_rad = r_e.y.atan2(r_e.x);

    if p < 1e-12 {
        let lat_rad = if r_e.z >= 0.0 {
            std::f64::consts::FRAC_PI_2
        } else {
            -std::f64::consts::FRAC_PI_2
        };
        return Geodetic {
            lat_rad,
            lon_rad,
            height_m: r_e.z.abs() - WGS84_A * (1.0 - WGS84_F),
        };
    }

    let mut lat_rad = (r_e.z / p).atan2(1.0 - e2);
    for _ in 0..6 {
        let sin_lat = lat_rad.sin();
        let n = WGS84_A / (1.0 - e2 * sin_lat * sin_lat).sqrt();
        let h = p / lat_rad.cos() - n;
        lat_rad = (r_e.z / p).atan2(1.0 - e2 * n / (n + h));
    }
    let sin_lat = lat_rad.sin();
    let n = WGS84_A / (1.0 - e2 * sin_lat * sin_lat).sqrt();
    let height_m = p / lat_rad.cos() - n;

    Geodetic {
        lat_rad,
        lon_rad,
        height_m,
    }
}

/// Geodetic to ECEF.
pub fn geodetic_to_ecef(pos: &Geodetic) -> Vector3<f64> {
    let e2 = WGS84_E * WGS84_E;
    let sin_lat = pos.lat_rad.sin();
    let n = WGS84_A / (1.0 - e2 * sin_lat * sin_lat).sqrt();
    Vector3::new(
        (n + pos.height_m) * pos.lat_rad.cos() * pos.lon_rad.cos(),
        (n + pos.height_m) * pos.lat_rad.cos() * pos.lon_rad.sin(),
        (n * (1.0 - e2) + pos.height_m) * sin_lat,
    )
}

/// Rotation matrix from the local NED tangent frame to ECEF, at the given
/// geodetic position.
pub fn ned_to_ecef_rotation(pos: &Geodetic) -> Matrix3<f64> {
    let (sin_lat, cos_lat) = pos.lat_rad.sin_cos();
    let (sin_lon, cos_lon) = pos.lon_rad.sin_cos();
    Matrix3::new(
        -sin_lat * cos_lon,
        -sin_lon,
        -cos_lat * cos_lon,
        -sin_lat * sin_lon,
        cos_lon,
        -cos_lat * sin_lon,
        cos_lat,
        0.0,
        -sin_lat,
    )
}

/// Direction cosine matrix to unit quaternion.
pub fn dcm_to_quaternion(c: &Matrix3<f64>) -> UnitQuaternion<f64> {
    UnitQuaternion::from_matrix(c)
}

/// Unit quaternion to direction cosine matrix.
pub fn quaternion_to_dcm(q: &UnitQuaternion<f64>) -> Matrix3<f64> {
    *q.to_rotation_matrix().matrix()
}

/// Extract roll/pitch/yaw (radians) from a body-to-NED DCM, in the standard
/// aerospace ZYX convention.
pub fn dcm_to_euler(c_b_n: &Matrix3<f64>) -> (f64, f64, f64) {
    let pitch = -c_b_n[(2, 0)].asin();
    let roll = c_b_n[(2, 1)].atan2(c_b_n[(2, 2)]);
    let yaw = c_b_n[(1, 0)].atan2(c_b_n[(0, 0)]);
    (roll, pitch, yaw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn skew_matches_cross_product() {
        let a = Vector3::new(1.0, 2.0, 3.0);
        let b = Vector3::new(4.0, -1.0, 2.0);
        let via_skew = skew(&a) * b;
        let via_cross = a.cross(&b);
        assert_relative_eq!(via_skew, via_cross, epsilon = 1e-12);
    }

    #[test]
    fn ecef_geodetic_round_trip() {
        let pos = Geodetic {
            lat_rad: 45.0f64.to_radians(),
            lon_rad: -93.0f64.to_radians(),
            height_m: 250.0,
        };
        let r_e = geodetic_to_ecef(&pos);
        let back = ecef_to_geodetic(&r_e);
        assert_relative_eq!(back.lat_rad, pos.lat_rad, epsilon = 1e-9);
        assert_relative_eq!(back.lon_rad, pos.lon_rad, epsilon = 1e-9);
        assert_relative_eq!(back.height_m, pos.height_m, epsilon = 1e-6);
    }

    #[test]
    fn gravity_points_roughly_down_at_equator() {
        let r_e = Vector3::new(WGS84_A, 0.0, 0.0);
        let g = normal_gravity_ecef(&r_e);
        // Dominant component should be along -x (toward Earth center).
        assert!(g.x < -9.0);
        assert!(g.x.abs() > g.y.abs());
        assert!(g.x.abs() > g.z.abs());
    }

    #[test]
    fn geocentric_radius_between_polar_and_equatorial() {
        let r_eq = geocentric_radius(0.0);
        let r_pole = geocentric_radius(std::f64::consts::FRAC_PI_2);
        assert!(r_pole < r_eq);
        assert!(r_eq <= WGS84_A + 1.0);
    }
}
