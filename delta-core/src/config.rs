use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::{
    error::{DeltaError, DeltaResult},
    model::{BifurcationMode, GrowthLaw},
    types::Tag,
};

/// Model and region parameters of a delta simulation.
///
/// Missing fields of a serialized config are filled from [`Config::default`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base step length of a growing tip.
    pub ds: f64,
    /// Exponent applied to the normalized `a1` when sizing a step.
    pub eta: f64,
    pub bifurcation_mode: BifurcationMode,
    pub bifurcation_threshold: f64,
    /// Branches shorter than this never fork.
    pub bifurcation_min_dist: f64,
    /// Half of the opening angle between two child branches.
    pub bifurcation_angle: f64,
    pub growth_law: GrowthLaw,
    /// Tips with `a1` below this stop growing.
    pub growth_threshold: f64,
    /// Below this branch length `eta` is ignored.
    pub growth_min_distance: f64,
    /// Full ribbon width of a river branch.
    pub river_width: f64,
    /// Edge tag of river banks.
    pub river_tag: Tag,
    pub smoothness_degree: f64,
    pub ignored_smoothness_length: f64,
    /// Tolerance of the non-linear step; tips bending further are flattened.
    pub max_curvature_distance: f64,
    /// Growth stops once a tip reaches this height.
    pub maximal_river_height: Option<f64>,
    pub width: f64,
    pub height: f64,
    /// Horizontal position of the river source on the bottom edge.
    pub source_x: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ds: 0.01,
            eta: 1.0,
            bifurcation_mode: BifurcationMode::A3OverA1,
            bifurcation_threshold: -0.1,
            bifurcation_min_dist: 0.05,
            bifurcation_angle: PI / 5.0,
            growth_law: GrowthLaw::CubicRoot,
            growth_threshold: 0.0,
            growth_min_distance: 0.005,
            river_width: 1e-7,
            river_tag: 100,
            smoothness_degree: 0.0,
            ignored_smoothness_length: 0.01,
            max_curvature_distance: 0.0,
            maximal_river_height: None,
            width: 1.0,
            height: 1.0,
            source_x: 0.25,
        }
    }
}

fn invalid(name: &'static str, value: f64, reason: &'static str) -> DeltaError {
    DeltaError::InvalidParameter { name, value, reason }
}

impl Config {
    /// Rejects impossible values and logs a warning for suspicious ones.
    pub fn validate(&self) -> DeltaResult<()> {
        if self.width < 0.0 {
            return Err(invalid("width", self.width, "must not be negative"));
        }
        if self.height < 0.0 {
            return Err(invalid("height", self.height, "must not be negative"));
        }
        if self.source_x < 0.0 || self.source_x > self.width {
            return Err(invalid("source_x", self.source_x, "must lie on the bottom edge"));
        }
        if let Some(h) = self.maximal_river_height {
            if h < 0.0 {
                return Err(invalid("maximal_river_height", h, "must not be negative"));
            }
            if h > self.height {
                log::warn!("maximal_river_height {h} exceeds the region height and has no effect");
            }
        }
        if self.ds <= 0.0 {
            return Err(invalid("ds", self.ds, "must be positive"));
        }
        if self.bifurcation_min_dist < 0.0 {
            return Err(invalid("bifurcation_min_dist", self.bifurcation_min_dist, "must not be negative"));
        }
        if self.growth_threshold < 0.0 {
            return Err(invalid("growth_threshold", self.growth_threshold, "must not be negative"));
        }
        if self.growth_min_distance < 0.0 {
            return Err(invalid("growth_min_distance", self.growth_min_distance, "must not be negative"));
        }
        if self.river_width < 0.0 {
            return Err(invalid("river_width", self.river_width, "must not be negative"));
        }
        if self.river_width > 0.1 * self.ds {
            return Err(invalid("river_width", self.river_width, "must not exceed a tenth of ds"));
        }

        if self.width > 1000.0 || self.height > 1000.0 {
            log::warn!("region {}x{} is unusually large", self.width, self.height);
        }
        if self.bifurcation_threshold.abs() > 100.0 {
            log::warn!("bifurcation_threshold {} is unusually large", self.bifurcation_threshold);
        }
        if self.ds < 1e-7 || self.ds > 1000.0 {
            log::warn!("ds = {} is outside the usual range", self.ds);
        }
        Ok(())
    }

    /// Whether `tip_height` has reached the configured stop height.
    pub fn height_reached(&self, tip_height: f64) -> bool {
        self.maximal_river_height.is_some_and(|h| tip_height >= h)
    }
}
