//! Spherical geometry primitives
//!
//! Coordinates are stored in radians and embedded on the unit sphere as
//! 3-vectors for directional statistics. The region models keep running
//! un-normalized vector sums per region; the mean direction is only
//! normalized at scoring time.

/// A geographic coordinate in radians.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    /// Latitude in radians
    pub lat: f64,

    /// Longitude in radians
    pub lng: f64,
}

impl Coordinate {
    /// Create a coordinate from radians.
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Create a coordinate from degrees (the lexicon file format).
    pub fn from_degrees(lat: f64, lng: f64) -> Self {
        Self {
            lat: lat.to_radians(),
            lng: lng.to_radians(),
        }
    }

    /// Latitude in degrees.
    pub fn lat_degrees(&self) -> f64 {
        self.lat.to_degrees()
    }

    /// Longitude in degrees.
    pub fn lng_degrees(&self) -> f64 {
        self.lng.to_degrees()
    }

    /// Embed on the unit sphere as (x, y, z).
    pub fn cartesian(&self) -> [f64; 3] {
        let (sin_lat, cos_lat) = self.lat.sin_cos();
        let (sin_lng, cos_lng) = self.lng.sin_cos();
        [cos_lat * cos_lng, cos_lat * sin_lng, sin_lat]
    }

    /// Recover a coordinate from a (not necessarily unit) 3-vector.
    ///
    /// Returns `None` for the zero vector, which has no direction.
    pub fn from_cartesian(v: [f64; 3]) -> Option<Self> {
        let norm = vec_norm(&v);
        if norm < 1e-12 {
            return None;
        }
        let lat = (v[2] / norm).clamp(-1.0, 1.0).asin();
        let lng = v[1].atan2(v[0]);
        Some(Self { lat, lng })
    }

    /// Great-circle distance to another coordinate, in radians.
    pub fn distance(&self, other: &Coordinate) -> f64 {
        let cos_angle = self.lat.sin() * other.lat.sin()
            + self.lat.cos() * other.lat.cos() * (other.lng - self.lng).cos();
        cos_angle.clamp(-1.0, 1.0).acos()
    }
}

/// Unnormalized von Mises-Fisher kernel between a unit vector and a
/// region's running mean sum.
///
/// The mean sum is normalized lazily here; a zero sum (region holds no
/// coordinate mass) scores every candidate equally.
pub fn spherical_density(x: &[f64; 3], mean_sum: &[f64; 3], kappa: f64) -> f64 {
    let norm = vec_norm(mean_sum);
    if norm < 1e-12 {
        return 1.0;
    }
    let dot = x[0] * mean_sum[0] + x[1] * mean_sum[1] + x[2] * mean_sum[2];
    (kappa * dot / norm).exp()
}

/// Add `scale * x` into `acc`. The running region mean sums are
/// maintained with +1/-1 scales as tokens are assigned and removed.
pub fn vec_axpy(acc: &mut [f64; 3], scale: f64, x: &[f64; 3]) {
    acc[0] += scale * x[0];
    acc[1] += scale * x[1];
    acc[2] += scale * x[2];
}

/// Euclidean norm of a 3-vector.
pub fn vec_norm(v: &[f64; 3]) -> f64 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cartesian_is_unit() {
        let coords = [
            Coordinate::from_degrees(0.0, 0.0),
            Coordinate::from_degrees(30.1, -97.7), // Austin
            Coordinate::from_degrees(-33.9, 151.2),
            Coordinate::from_degrees(90.0, 0.0),
        ];
        for c in coords {
            let v = c.cartesian();
            assert!((vec_norm(&v) - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_cartesian_roundtrip() {
        let c = Coordinate::from_degrees(48.85, 2.35);
        let back = Coordinate::from_cartesian(c.cartesian()).unwrap();
        assert!((back.lat - c.lat).abs() < 1e-10);
        assert!((back.lng - c.lng).abs() < 1e-10);
    }

    #[test]
    fn test_zero_sum_has_no_direction() {
        assert!(Coordinate::from_cartesian([0.0, 0.0, 0.0]).is_none());
    }

    #[test]
    fn test_distance() {
        let a = Coordinate::from_degrees(0.0, 0.0);
        let b = Coordinate::from_degrees(0.0, 90.0);
        assert!((a.distance(&b) - std::f64::consts::FRAC_PI_2).abs() < 1e-10);
        assert!(a.distance(&a) < 1e-10);
    }

    #[test]
    fn test_density_prefers_alignment() {
        let mean = [1.0, 0.0, 0.0];
        let aligned = Coordinate::from_degrees(0.0, 0.0).cartesian();
        let sideways = Coordinate::from_degrees(0.0, 90.0).cartesian();
        let opposite = Coordinate::from_degrees(0.0, 180.0).cartesian();

        let d_aligned = spherical_density(&aligned, &mean, 4.0);
        let d_side = spherical_density(&sideways, &mean, 4.0);
        let d_opposite = spherical_density(&opposite, &mean, 4.0);

        assert!(d_aligned > d_side);
        assert!(d_side > d_opposite);
    }

    #[test]
    fn test_density_ignores_sum_magnitude() {
        // The kernel reads direction only; a region with 100 assigned
        // coordinates must score like one with a single coordinate in
        // the same place.
        let x = Coordinate::from_degrees(10.0, 20.0).cartesian();
        let small = [0.3, 0.1, 0.2];
        let large = [3.0, 1.0, 2.0];
        let a = spherical_density(&x, &small, 8.0);
        let b = spherical_density(&x, &large, 8.0);
        assert!((a - b).abs() < 1e-9);
    }

    #[test]
    fn test_zero_mean_uniform() {
        let x = Coordinate::from_degrees(45.0, 45.0).cartesian();
        assert_eq!(spherical_density(&x, &[0.0; 3], 8.0), 1.0);
    }
}
