use crate::data::Ephemeris;
use crate::error::DataError;
use crate::model::{Vec3, normalized};

use serde::{Deserialize, Serialize};

/// One photometric sample.
///
/// `sun` and `earth` are unit asteroid->Sun and asteroid->Earth direction
/// vectors in the inertial (barycentric) frame; [ObservationSet] constructors
/// normalize raw vectors. `mjd` is the light-time-corrected epoch and `weight`
/// the inverse variance of `mag`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Observation {
    pub mjd: f64,
    pub mag: f64,
    pub weight: f64,
    pub filter: usize,
    pub sun: Vec3,
    pub earth: Vec3,
}

/// Immutable observation set shared read-only by all workers.
///
/// Observations are ordered by epoch within each segment; segments are
/// contiguous spans sharing one set of initial-condition parameters.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ObservationSet {
    obs: Vec<Observation>,
    n_filters: usize,
    seg_starts: Vec<usize>,
}

impl ObservationSet {
    /// Single-segment set from observations with precomputed direction vectors.
    pub fn new(obs: Vec<Observation>, n_filters: usize) -> Result<Self, DataError> {
        Self::with_segments(obs, n_filters, vec![0])
    }

    /// Multi-segment set; `seg_starts` are the first indices of each segment,
    /// starting with 0.
    pub fn with_segments(
        mut obs: Vec<Observation>,
        n_filters: usize,
        seg_starts: Vec<usize>,
    ) -> Result<Self, DataError> {
        if obs.is_empty() {
            return Err(DataError::Empty);
        }
        if seg_starts.first() != Some(&0)
            || !seg_starts.windows(2).all(|w| w[0] < w[1])
            || seg_starts.last().copied().unwrap_or(0) >= obs.len()
        {
            return Err(DataError::BadSegmentBounds);
        }
        for (index, o) in obs.iter().enumerate() {
            if o.filter >= n_filters {
                return Err(DataError::FilterOutOfRange {
                    index,
                    filter: o.filter,
                    n_filters,
                });
            }
        }
        for (index, pair) in obs.windows(2).enumerate() {
            // Epoch order is only required within a segment
            if !seg_starts.contains(&(index + 1)) && pair[1].mjd <= pair[0].mjd {
                return Err(DataError::UnsortedEpochs { index: index + 1 });
            }
        }
        for o in obs.iter_mut() {
            o.sun = normalized(o.sun);
            o.earth = normalized(o.earth);
        }
        Ok(Self {
            obs,
            n_filters,
            seg_starts,
        })
    }

    /// Set whose direction vectors are interpolated from an ephemeris triple.
    ///
    /// `points` are `(mjd, mag, weight, filter)` tuples; the stored `sun` and
    /// `earth` vectors are filled by quadratic interpolation at each epoch.
    pub fn from_ephemeris(
        points: Vec<(f64, f64, f64, usize)>,
        eph: &Ephemeris,
        n_filters: usize,
        seg_starts: Vec<usize>,
    ) -> Result<Self, DataError> {
        let obs = points
            .into_iter()
            .map(|(mjd, mag, weight, filter)| {
                let (sun, earth) = eph.directions_at(mjd);
                Observation {
                    mjd,
                    mag,
                    weight,
                    filter,
                    sun,
                    earth,
                }
            })
            .collect();
        Self::with_segments(obs, n_filters, seg_starts)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.obs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.obs.is_empty()
    }

    #[inline]
    pub fn n_filters(&self) -> usize {
        self.n_filters
    }

    #[inline]
    pub fn n_segments(&self) -> usize {
        self.seg_starts.len()
    }

    pub fn observations(&self) -> &[Observation] {
        &self.obs
    }

    /// The observations of segment `iseg` and the index of its first point.
    pub fn segment(&self, iseg: usize) -> (usize, &[Observation]) {
        let start = self.seg_starts[iseg];
        let end = self
            .seg_starts
            .get(iseg + 1)
            .copied()
            .unwrap_or(self.obs.len());
        (start, &self.obs[start..end])
    }
}
