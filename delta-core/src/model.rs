//! Growth and bifurcation rules.
//!
//! Every function here is pure: it reads the model parameters from
//! [`Config`] and the series coefficients `(a1, a2, a3)` of one tip, and
//! decides whether that tip grows, forks, or where its next point lies.

use std::f64::consts::FRAC_PI_2;

use serde::{Deserialize, Serialize};

use crate::{
    config::Config,
    error::{DeltaError, DeltaResult},
    geometry::{EPS, Point, PointExt, Polar},
    types::Series,
};

/// Which comparison decides that a tip forks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BifurcationMode {
    /// Tips never fork.
    None,
    /// Fork when `a3 / a1 <= threshold`.
    #[default]
    A3OverA1,
    /// Fork when `a1 >= threshold`.
    A1,
    /// Both of the above must hold.
    Both,
}

impl BifurcationMode {
    pub const ALL: [BifurcationMode; 4] = [Self::None, Self::A3OverA1, Self::A1, Self::Both];

    pub fn label(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::A3OverA1 => "a3/a1",
            Self::A1 => "a1",
            Self::Both => "a3/a1 and a1",
        }
    }
}

/// Closed-form law turning the `a2 / a1` ratio into a turn angle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GrowthLaw {
    Arctan,
    #[default]
    CubicRoot,
}

impl GrowthLaw {
    pub const ALL: [GrowthLaw; 2] = [Self::Arctan, Self::CubicRoot];

    pub fn label(self) -> &'static str {
        match self {
            Self::Arctan => "arctan",
            Self::CubicRoot => "cubic root",
        }
    }
}

/// Bifurcation test on the coefficients alone, without the distance gate.
pub fn q_bifurcate(cfg: &Config, a: &Series) -> bool {
    let ratio = a[2] / a[0];
    let by_ratio = ratio <= cfg.bifurcation_threshold;
    let by_a1 = a[0] >= cfg.bifurcation_threshold;

    let fork = match cfg.bifurcation_mode {
        BifurcationMode::None => false,
        BifurcationMode::A3OverA1 => by_ratio,
        BifurcationMode::A1 => by_a1,
        BifurcationMode::Both => by_ratio && by_a1,
    };
    log::debug!(
        "q_bifurcate: mode {:?}, a3/a1 = {ratio}, a1 = {}, threshold {} -> {fork}",
        cfg.bifurcation_mode,
        a[0],
        cfg.bifurcation_threshold
    );
    fork
}

/// Bifurcation test gated by the length of the branch the tip sits on.
///
/// A branch shorter than `bifurcation_min_dist` never forks, whatever the
/// coefficients say.
pub fn q_bifurcate_at(cfg: &Config, a: &Series, branch_length: f64) -> bool {
    q_bifurcate(cfg, a) && branch_length >= cfg.bifurcation_min_dist
}

/// A tip grows while `a1` reaches the growth threshold.
pub fn q_growth(cfg: &Config, a: &Series) -> bool {
    a[0] >= cfg.growth_threshold
}

/// Next step of a tip, relative to its current heading.
///
/// ### Parameters
/// - `cfg` - Model parameters: `ds`, `eta`, `growth_min_distance` and the
///   selected [`GrowthLaw`].
/// - `a` - Series coefficients of the tip.
/// - `branch_length` - Length of the branch the tip belongs to. Below
///   `growth_min_distance` the exponent `eta` is dropped, so a freshly
///   forked branch advances by exactly `ds`.
/// - `max_a1` - Largest `a1` over all tips, used to normalize `a1`.
///
/// ### Returns
/// A [`Polar`] whose radius is the step length `ds * a1^eta` and whose
/// angle is the turn away from the tip heading.
///
/// The cubic-root law evaluates `27 / 2` as `13.5`. Older runs that
/// truncated it to `13` take slightly shorter curved steps.
///
/// ### Errors
/// [`DeltaError::InvalidParameter`] when `max_a1` is not positive, when the
/// tip's own `a1` is not positive, or when the law yields no finite step
/// for the ratio `a2 / a1`.
pub fn next_point(cfg: &Config, a: &Series, branch_length: f64, max_a1: f64) -> DeltaResult<Polar> {
    if max_a1 <= 0.0 || !max_a1.is_finite() {
        return Err(DeltaError::InvalidParameter {
            name: "max_a1",
            value: max_a1,
            reason: "series normalization needs a positive maximum",
        });
    }

    let a1 = a[0] / max_a1;
    if a1 <= 0.0 || !a1.is_finite() {
        return Err(DeltaError::InvalidParameter {
            name: "a1",
            value: a[0],
            reason: "a growing tip needs a positive a1",
        });
    }
    let eta = if branch_length < cfg.growth_min_distance {
        0.0
    } else {
        cfg.eta
    };
    let beta = a[1] / a1;
    let dl = cfg.ds * a1.powf(eta);

    let step = match cfg.growth_law {
        GrowthLaw::Arctan => Polar::new(dl, -(2.0 * beta * dl.sqrt()).atan()),
        GrowthLaw::CubicRoot if beta.abs() < EPS => Polar::new(dl, 0.0),
        GrowthLaw::CubicRoot => {
            let b2 = beta * beta;
            let dy = ((13.5 * dl / b2 + 1.0).powf(2.0 / 3.0) - 1.0) / (9.0 * b2);
            let radicand = dy.powi(3) / b2 + dy.powi(4) / (b2 * beta);
            if radicand.is_nan() || radicand < 0.0 {
                return Err(DeltaError::InvalidParameter {
                    name: "a2/a1",
                    value: beta,
                    reason: "cubic root law has no real step for this ratio",
                });
            }
            let dx = 2.0 * radicand.sqrt();
            Polar::from_point(Point::new(dx, dy).rotated(-FRAC_PI_2))?
        }
    };
    if !step.r.is_finite() || !step.phi.is_finite() {
        return Err(DeltaError::InvalidParameter {
            name: "a2/a1",
            value: beta,
            reason: "growth law gives no finite step for this ratio",
        });
    }
    log::debug!(
        "next_point: a1/max = {a1}, beta = {beta}, eta = {eta} -> r = {}, phi = {}",
        step.r,
        step.phi
    );
    Ok(step)
}
