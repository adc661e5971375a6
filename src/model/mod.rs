mod brightness;
pub use brightness::{
    BrightnessLawTrait, BrightnessModel, Ellipsoid, RectPrism, Shape, TwoToneSphere, phase_angle,
};

mod dynamics;
pub use dynamics::{Dynamics, Inertia, RotationState, initial_body_rates, initial_theta};

mod frame;
pub use frame::{BodyFrame, MomentumFrame, Vec3, cross, dot, normalized};
