use crate::model::{Vec3, normalized};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Three bracketing Sun/Earth ephemeris samples.
///
/// Direction vectors at an arbitrary epoch are obtained by quadratic Lagrange
/// interpolation of the three raw (non-unit) position samples, followed by
/// normalization. The three epochs must be distinct and should bracket the
/// observation span.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Ephemeris {
    pub mjd: [f64; 3],
    /// Raw asteroid->Sun vectors at the three epochs, au
    pub sun: [Vec3; 3],
    /// Raw asteroid->Earth vectors at the three epochs, au
    pub earth: [Vec3; 3],
}

impl Ephemeris {
    pub fn new(mjd: [f64; 3], sun: [Vec3; 3], earth: [Vec3; 3]) -> Self {
        Self { mjd, sun, earth }
    }

    /// Interpolated unit (Sun, Earth) direction vectors at `mjd`.
    pub fn directions_at(&self, mjd: f64) -> (Vec3, Vec3) {
        let [t0, t1, t2] = self.mjd;
        let r = [
            (mjd - t1) * (mjd - t2) / ((t0 - t1) * (t0 - t2)),
            (mjd - t0) * (mjd - t2) / ((t1 - t0) * (t1 - t2)),
            (mjd - t0) * (mjd - t1) / ((t2 - t0) * (t2 - t1)),
        ];
        let mut sun = [0.0; 3];
        let mut earth = [0.0; 3];
        for i in 0..3 {
            for k in 0..3 {
                sun[k] += self.sun[i][k] * r[i];
                earth[k] += self.earth[i][k] * r[i];
            }
        }
        (normalized(sun), normalized(earth))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    /// Quadratic interpolation must reproduce any quadratic position law
    /// exactly at epochs between the nodes.
    #[test]
    fn reproduces_quadratic_law() {
        let quad = |t: f64| [1.0 + 0.3 * t + 0.02 * t * t, 0.5 - 0.1 * t, 0.2 + 0.05 * t * t];
        let mjd = [0.0, 5.0, 10.0];
        let sun = [quad(0.0), quad(5.0), quad(10.0)];
        let earth = sun;
        let eph = Ephemeris::new(mjd, sun, earth);

        for &t in &[1.3, 4.0, 7.7, 9.9] {
            let expected = normalized(quad(t));
            let (s, e) = eph.directions_at(t);
            for k in 0..3 {
                assert_relative_eq!(s[k], expected[k], epsilon = 1e-12);
                assert_relative_eq!(e[k], expected[k], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn returns_unit_vectors() {
        let eph = Ephemeris::new(
            [0.0, 1.0, 2.0],
            [[2.0, 0.0, 0.0], [2.0, 0.5, 0.0], [2.0, 1.0, 0.1]],
            [[1.5, 0.0, 0.2], [1.5, 0.4, 0.2], [1.6, 0.8, 0.2]],
        );
        let (s, e) = eph.directions_at(0.7);
        let norm = |v: Vec3| (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
        assert_relative_eq!(norm(s), 1.0, epsilon = 1e-12);
        assert_relative_eq!(norm(e), 1.0, epsilon = 1e-12);
    }
}
