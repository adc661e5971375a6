//! Coordinate geometry of the tumbling body.
//!
//! The body frame follows the Samarasinha & A'Hearn (1991) convention:
//! the axes `b`-`c`-`a` (intermediate, short, long) map to body x-y-z, with
//! moments of inertia `Il < Ii < Is` for `a > b > c` and `Il` set to 1.

pub type Vec3 = [f64; 3];

#[inline]
pub fn dot(u: Vec3, v: Vec3) -> f64 {
    u[0] * v[0] + u[1] * v[1] + u[2] * v[2]
}

#[inline]
pub fn cross(u: Vec3, v: Vec3) -> Vec3 {
    [
        u[1] * v[2] - u[2] * v[1],
        u[2] * v[0] - u[0] * v[2],
        u[0] * v[1] - u[1] * v[0],
    ]
}

#[inline]
pub fn normalized(v: Vec3) -> Vec3 {
    let norm = dot(v, v).sqrt();
    [v[0] / norm, v[1] / norm, v[2] / norm]
}

#[inline]
fn axpby(a: f64, x: Vec3, b: f64, y: Vec3) -> Vec3 {
    [
        a * x[0] + b * y[0],
        a * x[1] + b * y[1],
        a * x[2] + b * y[2],
    ]
}

/// Inertial frame aligned with the angular-momentum direction.
///
/// `m` is the unit angular-momentum vector given by the polar angles
/// (theta_M, phi_M); `xm` and `ym` complete a right-handed orthonormal triple
/// with `xm` chosen as the normalized `[y-hat x m]`. Both are fixed for the
/// whole evaluation.
#[derive(Clone, Copy, Debug)]
pub struct MomentumFrame {
    pub m: Vec3,
    pub xm: Vec3,
    pub ym: Vec3,
}

impl MomentumFrame {
    pub fn new(theta_m: f64, phi_m: f64) -> Self {
        let (sin_t, cos_t) = theta_m.sin_cos();
        let (sin_p, cos_p) = phi_m.sin_cos();
        let m = [sin_t * cos_p, sin_t * sin_p, cos_t];
        let norm = (m[2] * m[2] + m[0] * m[0]).sqrt();
        let xm = [m[2] / norm, 0.0, -m[0] / norm];
        let ym = cross(m, xm);
        Self { m, xm, ym }
    }
}

/// Orthonormal body axes expressed in the inertial frame.
///
/// `a` is the long axis (rotation axis in LAM), `b` the intermediate and
/// `c` the short one.
#[derive(Clone, Copy, Debug)]
pub struct BodyFrame {
    pub a: Vec3,
    pub b: Vec3,
    pub c: Vec3,
}

impl BodyFrame {
    /// Apply the 3-1-3 Euler rotation (phi, theta, psi) to the basis
    /// `(x, y, z)` via two chained axis-angle (Rodrigues) rotations.
    fn chain(x: Vec3, y: Vec3, z: Vec3, phi: f64, theta: f64, psi: f64) -> Self {
        let (sin_phi, cos_phi) = phi.sin_cos();
        // Node vector [z x a], obtained by rotating x towards y by phi
        let n = axpby(cos_phi, x, sin_phi, y);
        let p = cross(n, z);
        let (sin_theta, cos_theta) = theta.sin_cos();
        // Long axis: z rotated by theta towards p around the node vector
        let a = axpby(cos_theta, z, sin_theta, p);
        let w = cross(a, n);
        let (sin_psi, cos_psi) = psi.sin_cos();
        // Intermediate axis: n rotated by psi towards w around a
        let b = axpby(cos_psi, n, sin_psi, w);
        let c = cross(a, b);
        Self { a, b, c }
    }

    /// Body axes from the current Euler angles relative to the momentum frame.
    pub fn from_euler(frame: &MomentumFrame, phi: f64, theta: f64, psi: f64) -> Self {
        Self::chain(frame.xm, frame.ym, frame.m, phi, theta, psi)
    }

    /// Fixed secondary rotation decoupling the photometric axes from the
    /// kinematic ones; the same Euler chain with `(b, c, a)` as the basis.
    pub fn rotated(&self, theta_r: f64, phi_r: f64, psi_r: f64) -> Self {
        Self::chain(self.b, self.c, self.a, phi_r, theta_r, psi_r)
    }

    /// Components of an inertial vector in the body `(b, c, a)` basis.
    #[inline]
    pub fn to_body(&self, v: Vec3) -> Vec3 {
        [dot(self.b, v), dot(self.c, v), dot(self.a, v)]
    }
}
