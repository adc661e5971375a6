//! Photometric projection models.
//!
//! All laws consume the Sun and Earth unit direction vectors expressed in the
//! body `(b, c, a)` basis and return an apparent magnitude. Degenerate
//! geometry (antiparallel illumination/view directions in the ellipsoid law)
//! yields a recoverable NaN that the evaluator maps to the sentinel score.

use crate::model::{Vec3, cross, dot};

use enum_dispatch::enum_dispatch;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Photometric shape of the body: axis ratios `c < b < a = 1`, plus the dark
/// hemisphere albedo `kappa` used by the two-tone sphere law.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Shape {
    pub b: f64,
    pub c: f64,
    pub kappa: f64,
}

/// Sun-Earth phase angle at the current geometry, rad.
#[inline]
pub fn phase_angle(sun: Vec3, earth: Vec3) -> f64 {
    dot(sun, earth).clamp(-1.0, 1.0).acos()
}

#[enum_dispatch]
pub trait BrightnessLawTrait {
    /// Predicted magnitude for the given shape and body-frame geometry.
    fn magnitude(&self, shape: &Shape, sun: Vec3, earth: Vec3) -> f64;
}

/// Single-scattering triaxial-ellipsoid law of Muinonen & Lumme (2015),
/// converted from their a-b-c frame to the b-c-a body frame.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub struct Ellipsoid;

impl BrightnessLawTrait for Ellipsoid {
    fn magnitude(&self, shape: &Shape, sun: Vec3, earth: Vec3) -> f64 {
        let b2 = shape.b * shape.b;
        let c2 = shape.c * shape.c;
        // The two scalars of eq. (12), with a = 1
        let scalar_sun = (sun[0] * sun[0] / b2 + sun[1] * sun[1] / c2 + sun[2] * sun[2]).sqrt();
        let scalar_earth =
            (earth[0] * earth[0] / b2 + earth[1] * earth[1] / c2 + earth[2] * earth[2]).sqrt();

        // Phase-like angle alpha' of eq. (13)
        let cos_alpha_p = (sun[0] * earth[0] / b2 + sun[1] * earth[1] / c2 + sun[2] * earth[2])
            / (scalar_sun * scalar_earth);
        // Round-off can push the cosine slightly past 1
        let sin_alpha_p = (1.0 - cos_alpha_p * cos_alpha_p).max(0.0).sqrt();
        let alpha_p = sin_alpha_p.atan2(cos_alpha_p);

        // Eq. (14); `scalar` vanishes at antiparallel geometry and the whole
        // expression degenerates to NaN, which the caller treats as unusable
        let scalar = (scalar_sun * scalar_sun
            + scalar_earth * scalar_earth
            + 2.0 * scalar_sun * scalar_earth * cos_alpha_p)
            .sqrt();
        let cos_lambda_p = (scalar_sun + scalar_earth * cos_alpha_p) / scalar;
        let sin_lambda_p = scalar_earth * sin_alpha_p / scalar;
        let lambda_p = sin_lambda_p.atan2(cos_lambda_p);

        // Eq. (10), isotropic single-particle scattering P(alpha) = 1
        let flux = shape.b * shape.c * scalar_sun * scalar_earth / scalar
            * ((lambda_p - alpha_p).cos()
                + cos_lambda_p
                + sin_lambda_p
                    * (lambda_p - alpha_p).sin()
                    * (1.0 / ((0.5 * lambda_p).tan() * (0.5 * (alpha_p - lambda_p)).tan())).ln());
        -2.5 * flux.log10()
    }
}

/// Projected silhouette area of a rectangular prism with half-sides
/// `a = 1 > b > c`; the phase angle is taken as zero, so the brightness is
/// proportional to the summed projected areas of the three visible faces.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub struct RectPrism;

impl BrightnessLawTrait for RectPrism {
    fn magnitude(&self, shape: &Shape, _sun: Vec3, earth: Vec3) -> f64 {
        // Body-frame axis vectors scaled by the half-side lengths
        let a: Vec3 = [0.0, 0.0, 1.0];
        let b: Vec3 = [shape.b, 0.0, 0.0];
        let c: Vec3 = [0.0, shape.c, 0.0];

        // Axes projected onto the plane of sky
        let ap = cross(a, earth);
        let bp = cross(b, earth);
        let cp = cross(c, earth);

        let ab = dot(cross(ap, bp), cross(ap, bp));
        let ac = dot(cross(ap, cp), cross(ap, cp));
        let bc = dot(cross(bp, cp), cross(bp, cp));

        // Round-off may leave the squared areas slightly negative
        let area = ab.max(0.0).sqrt() + ac.max(0.0).sqrt() + bc.max(0.0).sqrt();
        -2.5 * (4.0 * area).log10()
    }
}

/// Two-tone sphere: the `+a` hemisphere is dark (albedo `kappa < 1`), the
/// opposite one bright (albedo 1), mixed by the cosine of the angle between
/// the long axis and the view direction. Zero phase angle is assumed.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub struct TwoToneSphere;

impl BrightnessLawTrait for TwoToneSphere {
    fn magnitude(&self, shape: &Shape, _sun: Vec3, earth: Vec3) -> f64 {
        // earth[2] is the cosine of the angle between `a` and the view direction
        let cos_alpha = earth[2];
        -2.5 * (0.5 * (shape.kappa * (1.0 + cos_alpha) + (1.0 - cos_alpha))).log10()
    }
}

/// Brightness law active for a run; exactly one variant is selected by the
/// run configuration.
#[enum_dispatch(BrightnessLawTrait)]
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum BrightnessModel {
    Ellipsoid,
    RectPrism,
    TwoToneSphere,
}

impl Default for BrightnessModel {
    fn default() -> Self {
        Self::Ellipsoid(Ellipsoid)
    }
}
