//! Rotation-state evolution between observation epochs.
//!
//! Euler-angle ODEs are set up as in Kaasalainen (2001) but for the
//! Samarasinha & A'Hearn (1991) L-convention, which keeps the derivatives
//! small for small `I1`. The free regime integrates the three Euler angles
//! directly; the torqued regime adds the three body-frame angular-velocity
//! components governed by the Euler rigid-body equations.

use serde::{Deserialize, Serialize};

/// Principal moments of inertia of the triaxial body, with the long-axis
/// moment `Il` normalized to 1 so that `1 < Ii < Is`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Inertia {
    is: f64,
    ii: f64,
}

impl Inertia {
    /// From the physical axis ratios `c < b < a = 1`.
    pub fn from_axes(b_tumb: f64, c_tumb: f64) -> Self {
        let b2 = b_tumb * b_tumb;
        let c2 = c_tumb * c_tumb;
        Self {
            is: (1.0 + b2) / (b2 + c2),
            ii: (1.0 + c2) / (b2 + c2),
        }
    }

    #[inline]
    pub fn is(&self) -> f64 {
        self.is
    }

    #[inline]
    pub fn ii(&self) -> f64 {
        self.ii
    }

    #[inline]
    pub fn is_inv(&self) -> f64 {
        1.0 / self.is
    }

    #[inline]
    pub fn ii_inv(&self) -> f64 {
        1.0 / self.ii
    }
}

/// Initial Euler nutation angle implied by energy, momentum and inertia.
///
/// The plus sign of the square root is always valid because theta is
/// restricted to `[0, pi]`.
pub fn initial_theta(es: f64, psi0: f64, inertia: &Inertia) -> f64 {
    let sin_psi = psi0.sin();
    let denom = sin_psi * sin_psi * (inertia.ii_inv() - inertia.is_inv()) + inertia.is_inv() - 1.0;
    ((es - 1.0) / denom).sqrt().asin()
}

/// Body-frame angular-velocity components `(Omega_i, Omega_s, Omega_l)`
/// implied by the initial Euler angles.
pub fn initial_body_rates(l: f64, inertia: &Inertia, theta: f64, psi: f64) -> [f64; 3] {
    let (sin_theta, cos_theta) = theta.sin_cos();
    let (sin_psi, cos_psi) = psi.sin_cos();
    [
        l * inertia.ii_inv() * sin_theta * sin_psi,
        l * inertia.is_inv() * sin_theta * cos_psi,
        l * cos_theta,
    ]
}

/// Transient ODE state: three Euler angles, plus the three body rates in the
/// torqued regime.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RotationState {
    y: [f64; 6],
    n_ode: usize,
}

impl RotationState {
    pub fn free(phi: f64, theta: f64, psi: f64) -> Self {
        Self {
            y: [phi, theta, psi, 0.0, 0.0, 0.0],
            n_ode: 3,
        }
    }

    pub fn torqued(omega: [f64; 3], phi: f64, theta: f64, psi: f64) -> Self {
        Self {
            y: [omega[0], omega[1], omega[2], phi, theta, psi],
            n_ode: 6,
        }
    }

    /// Current `(phi, theta, psi)`.
    #[inline]
    pub fn euler_angles(&self) -> (f64, f64, f64) {
        if self.n_ode == 3 {
            (self.y[0], self.y[1], self.y[2])
        } else {
            (self.y[3], self.y[4], self.y[5])
        }
    }

    /// Body rates, torqued regime only.
    pub fn body_rates(&self) -> Option<[f64; 3]> {
        (self.n_ode == 6).then(|| [self.y[0], self.y[1], self.y[2]])
    }
}

/// Dynamical coefficients fixed over one integration leg.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Dynamics {
    /// No external torque; `l` is the angular momentum magnitude (rad/day),
    /// `ip = (1/Ii + 1/Is)/2` and `im = (1/Ii - 1/Is)/2`.
    Free { l: f64, ip: f64, im: f64 },
    /// Constant co-moving torque; `mu` are the inertia-difference factors of
    /// the Euler equations and `torque` the per-axis accelerations (rad/day^2).
    Torqued { mu: [f64; 3], torque: [f64; 3] },
}

impl Dynamics {
    pub fn free(l: f64, inertia: &Inertia) -> Self {
        Self::Free {
            l,
            ip: 0.5 * (inertia.ii_inv() + inertia.is_inv()),
            im: 0.5 * (inertia.ii_inv() - inertia.is_inv()),
        }
    }

    pub fn torqued(inertia: &Inertia, torque: [f64; 3]) -> Self {
        // Il = 1
        Self::Torqued {
            mu: [
                (inertia.is() - 1.0) * inertia.ii_inv(),
                (1.0 - inertia.ii()) * inertia.is_inv(),
                inertia.ii() - inertia.is(),
            ],
            torque,
        }
    }

    /// Swap the torque triple mid-evaluation (two-phase torque model).
    pub fn set_torque(&mut self, k: [f64; 3]) {
        if let Self::Torqued { torque, .. } = self {
            *torque = k;
        }
    }

    #[inline]
    pub fn n_ode(&self) -> usize {
        match self {
            Self::Free { .. } => 3,
            Self::Torqued { .. } => 6,
        }
    }

    fn derivatives(&self, y: &[f64; 6], f: &mut [f64; 6]) {
        match *self {
            Self::Free { l, ip, im } => {
                // y = [phi, theta, psi]
                f[0] = l * (ip - im * (2.0 * y[2]).cos());
                f[1] = l * im * y[1].sin() * (2.0 * y[2]).sin();
                // Assuming Il = 1
                f[2] = y[1].cos() * (l - f[0]);
            }
            Self::Torqued { mu, torque } => {
                // y = [Omega_i, Omega_s, Omega_l, phi, theta, psi]
                f[0] = mu[0] * y[1] * y[2] + torque[0];
                f[1] = mu[1] * y[2] * y[0] + torque[1];
                f[2] = mu[2] * y[0] * y[1] + torque[2];
                let (sin_psi, cos_psi) = y[5].sin_cos();
                f[3] = (y[0] * sin_psi + y[1] * cos_psi) / y[4].sin();
                f[4] = y[0] * cos_psi - y[1] * sin_psi;
                f[5] = y[2] - f[3] * y[4].cos();
            }
        }
    }

    /// Advance the state from `t1` to `t2` with fixed-step RK4.
    ///
    /// The step count is `floor(|t2 - t1| / max_step) + 1`, so the step size
    /// never exceeds `max_step` and the truncation error stays bounded no
    /// matter how far apart the observations are. Never fails; an inaccurate
    /// result only degrades the downstream chi-squared.
    pub fn advance(&self, state: &mut RotationState, t1: f64, t2: f64, max_step: f64) {
        let span = t2 - t1;
        if span == 0.0 {
            return;
        }
        let n_steps = (span.abs() / max_step) as usize + 1;
        let h = span / n_steps as f64;
        let n = self.n_ode();
        debug_assert_eq!(n, state.n_ode);

        let y = &mut state.y;
        for _ in 0..n_steps {
            let mut k1 = [0.0; 6];
            let mut k2 = [0.0; 6];
            let mut k3 = [0.0; 6];
            let mut k4 = [0.0; 6];
            let mut f = [0.0; 6];

            self.derivatives(y, &mut k1);
            for j in 0..n {
                f[j] = y[j] + 0.5 * h * k1[j];
            }
            self.derivatives(&f, &mut k2);
            for j in 0..n {
                f[j] = y[j] + 0.5 * h * k2[j];
            }
            self.derivatives(&f, &mut k3);
            for j in 0..n {
                f[j] = y[j] + h * k3[j];
            }
            self.derivatives(&f, &mut k4);
            for j in 0..n {
                y[j] += h / 6.0 * (k1[j] + 2.0 * k2[j] + 2.0 * k3[j] + k4[j]);
            }
        }
    }
}
