#![doc = include_str!("../README.md")]

mod chi2;
mod data;
mod error;
mod model;
mod params;
mod search;
mod simplex;

pub use chi2::{Chi2Config, Evaluator, Score};
pub use data::{Ephemeris, Observation, ObservationSet};
pub use error::{BoundaryViolation, DataError, EvalError, SENTINEL_SCORE, TableError};
pub use model::{
    BodyFrame, BrightnessLawTrait, BrightnessModel, Dynamics, Ellipsoid, Inertia, MomentumFrame,
    RectPrism, RotationState, Shape, TwoToneSphere, Vec3, initial_body_rates, initial_theta,
    phase_angle,
};
pub use params::{
    Bounds, Freeze, ParamDescriptor, ParamKind, ParamTable, Periodicity, Scale, SearchStage,
    complete_elliptic_k, to_normalized, to_physical,
};
pub use search::{BestSlot, SearchConfig, SearchState, TumblerSearch, WaveSummary};
pub use simplex::{RoundResult, RoundStatus, SimplexConfig, SimplexSearch};

#[cfg(test)]
mod tests;
