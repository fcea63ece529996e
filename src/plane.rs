//! Movement plane detection.
//!
//! Finds the 2D plane containing the dominant motion so that trajectories can
//! be projected before angle extraction, removing incidental off-axis wobble.
//!
//! Algorithm: the covariance of the last `window` positions is decomposed
//! with a symmetric eigensolver. The eigenvector of the smallest eigenvalue is
//! the plane normal, the largest gives the first in-plane axis.
//!
//! Refits are rate-limited to once every `refit_interval` samples, or earlier
//! when the newest positions drift off the cached plane for several
//! consecutive samples. A fit that does not have enough distinct samples, or
//! whose eigenvalue spread is too flat to define a normal, is discarded and
//! the previous plane is kept. Before the first good fit the plane is the
//! identity, whose projection is a no-op.

use nalgebra::{Matrix3, SymmetricEigen};
use tracing::{debug, warn};

use crate::history::BoundedHistory;
use crate::types::Vec3;

/// Parameters for plane fitting.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct PlaneConfig {
    /// Number of recent positions fitted (K).
    pub window: usize,
    /// Refit after this many new samples (M).
    pub refit_interval: usize,
    /// Minimum distinct positions before a fit is attempted.
    pub min_samples: usize,
    /// Reject when smallest/middle eigenvalue exceeds this (near-isotropic motion).
    pub isotropy_ratio: f64,
    /// Variance (m²) below which an axis is considered empty.
    pub min_variance: f64,
    /// Off-plane distance (m) that counts as drift from the cached plane.
    pub drift_tolerance: f64,
    /// Consecutive drifting samples that force an early refit.
    pub drift_samples: usize,
}

impl Default for PlaneConfig {
    fn default() -> Self {
        Self {
            window: 60,
            refit_interval: 15,
            min_samples: 20,
            isotropy_ratio: 0.3,
            min_variance: 1e-6,
            drift_tolerance: 0.03,
            drift_samples: 5,
        }
    }
}

/// A fitted movement plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovementPlane {
    /// Unit normal (smallest-variance direction).
    pub normal: Vec3,
    /// Unit in-plane axis of largest variance.
    pub basis_u: Vec3,
    /// `normal × basis_u`.
    pub basis_v: Vec3,
    /// Centroid of the fitted window.
    pub centroid: Vec3,
    /// Samples in the window at fit time. Zero for the identity plane.
    pub sample_count_at_fit: usize,
    pub fitted_at: f64,
}

impl MovementPlane {
    /// XY plane through the origin. Projection through it is a no-op.
    pub fn identity() -> Self {
        Self {
            normal: Vec3::z(),
            basis_u: Vec3::x(),
            basis_v: Vec3::y(),
            centroid: Vec3::zeros(),
            sample_count_at_fit: 0,
            fitted_at: 0.0,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.sample_count_at_fit == 0
    }

    /// Removes the normal component of a displacement.
    pub fn project_vector(&self, v: &Vec3) -> Vec3 {
        if self.is_identity() {
            return *v;
        }
        v - self.normal * self.normal.dot(v)
    }

    /// Projects a point onto the plane.
    pub fn project_point(&self, p: &Vec3) -> Vec3 {
        if self.is_identity() {
            return *p;
        }
        let offset = p - self.centroid;
        p - self.normal * self.normal.dot(&offset)
    }

    /// Coordinates of a point along `(basis_u, basis_v)`, relative to the centroid.
    pub fn in_plane_coords(&self, p: &Vec3) -> (f64, f64) {
        let offset = p - self.centroid;
        (offset.dot(&self.basis_u), offset.dot(&self.basis_v))
    }

    /// Unsigned distance from the plane.
    pub fn distance(&self, p: &Vec3) -> f64 {
        if self.is_identity() {
            return 0.0;
        }
        self.normal.dot(&(p - self.centroid)).abs()
    }
}

impl Default for MovementPlane {
    fn default() -> Self {
        Self::identity()
    }
}

/// Why a fit attempt was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitRejection {
    TooFewSamples,
    Stationary,
    /// Motion along a single line; any plane containing it fits equally.
    Linear,
    Isotropic,
}

/// Cached plane fitter over a rolling position window.
#[derive(Debug, Clone)]
pub struct PlaneDetector {
    config: PlaneConfig,
    positions: BoundedHistory<Vec3>,
    plane: MovementPlane,
    samples_since_fit: usize,
    drift_run: usize,
    refits: u64,
    rejected_fits: u64,
}

impl PlaneDetector {
    pub fn new(config: PlaneConfig) -> Self {
        Self {
            positions: BoundedHistory::new(config.window),
            config,
            plane: MovementPlane::identity(),
            samples_since_fit: 0,
            drift_run: 0,
            refits: 0,
            rejected_fits: 0,
        }
    }

    /// Adds a position; refits if due. Returns true when the plane changed.
    pub fn push(&mut self, timestamp: f64, position: Vec3) -> bool {
        self.positions.push(position);
        self.samples_since_fit += 1;

        if !self.plane.is_identity() {
            if self.plane.distance(&position) > self.config.drift_tolerance {
                self.drift_run += 1;
            } else {
                self.drift_run = 0;
            }
        }

        let drifted = self.drift_run >= self.config.drift_samples.max(1);
        let due = self.samples_since_fit >= self.config.refit_interval.max(1) || drifted;
        if !due {
            return false;
        }

        self.samples_since_fit = 0;
        self.drift_run = 0;
        match self.fit(timestamp) {
            Ok(plane) => {
                debug!(
                    normal = ?plane.normal.as_slice(),
                    samples = plane.sample_count_at_fit,
                    drifted,
                    "movement plane refit"
                );
                self.plane = plane;
                self.refits += 1;
                true
            }
            Err(reason) => {
                self.rejected_fits += 1;
                if self.rejected_fits == 1 {
                    warn!(?reason, "plane fit rejected, keeping previous plane");
                } else {
                    debug!(?reason, "plane fit rejected, keeping previous plane");
                }
                false
            }
        }
    }

    pub fn plane(&self) -> &MovementPlane {
        &self.plane
    }

    pub fn refits(&self) -> u64 {
        self.refits
    }

    pub fn rejected_fits(&self) -> u64 {
        self.rejected_fits
    }

    pub fn reset(&mut self) {
        self.positions.clear();
        self.plane = MovementPlane::identity();
        self.samples_since_fit = 0;
        self.drift_run = 0;
        self.refits = 0;
        self.rejected_fits = 0;
    }

    fn distinct_samples(&self) -> usize {
        let mut count = 0;
        let mut previous: Option<&Vec3> = None;
        for p in self.positions.iter() {
            let distinct = previous.map(|q| (p - q).norm() > 1e-9).unwrap_or(true);
            if distinct {
                count += 1;
            }
            previous = Some(p);
        }
        count
    }

    fn fit(&self, timestamp: f64) -> Result<MovementPlane, FitRejection> {
        if self.distinct_samples() < self.config.min_samples {
            return Err(FitRejection::TooFewSamples);
        }

        let n = self.positions.len() as f64;
        let centroid = self.positions.iter().fold(Vec3::zeros(), |acc, p| acc + p) / n;
        let covariance = self
            .positions
            .iter()
            .fold(Matrix3::zeros(), |acc, p| {
                let d = p - centroid;
                acc + d * d.transpose()
            })
            / n;

        let eigen = SymmetricEigen::new(covariance);
        let mut order = [0usize, 1, 2];
        order.sort_by(|&a, &b| eigen.eigenvalues[a].total_cmp(&eigen.eigenvalues[b]));
        let (small, mid, large) = (order[0], order[1], order[2]);
        let lambda_small = eigen.eigenvalues[small].max(0.0);
        let lambda_mid = eigen.eigenvalues[mid];
        let lambda_large = eigen.eigenvalues[large];

        if !lambda_large.is_finite() || lambda_large < self.config.min_variance {
            return Err(FitRejection::Stationary);
        }
        if lambda_mid < self.config.min_variance {
            return Err(FitRejection::Linear);
        }
        if lambda_small / lambda_mid > self.config.isotropy_ratio {
            return Err(FitRejection::Isotropic);
        }

        let normal = canonical(eigen.eigenvectors.column(small).normalize());
        let basis_u = canonical(eigen.eigenvectors.column(large).normalize());
        let basis_v = normal.cross(&basis_u).normalize();

        Ok(MovementPlane {
            normal,
            basis_u,
            basis_v,
            centroid,
            sample_count_at_fit: self.positions.len(),
            fitted_at: timestamp,
        })
    }
}

/// Flips a unit vector so its dominant component is positive, making the
/// eigensolver's arbitrary sign deterministic across refits.
fn canonical(v: Vec3) -> Vec3 {
    if v[v.iamax()] < 0.0 {
        -v
    } else {
        v
    }
}
