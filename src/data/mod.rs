mod ephemeris;
pub use ephemeris::Ephemeris;

mod observation;
pub use observation::{Observation, ObservationSet};
