//! Stand-in for the field solver: random but plausible series coefficients.

use std::collections::BTreeMap;

use delta_core::{
    boundary::SimpleBoundary,
    error::DeltaResult,
    phases::SeriesSolver,
    region::BoundaryConditions,
    tree::SourcePoints,
    types::{BranchId, Series},
};
use rand::{Rng, SeedableRng, rngs::StdRng};

/// Draws `(a1, a2, a3)` for every tip from a seeded generator.
///
/// `a1` is uniform in `[0.2, 1]`, `a2 / a1` uniform in `±turn`. With
/// probability `fork_chance` the ratio `a3 / a1` is strongly negative so
/// the default bifurcation rule fires; otherwise it stays positive.
pub struct RandomSeries {
    rng: StdRng,
    pub turn: f64,
    pub fork_chance: f64,
}

impl RandomSeries {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            turn: 0.5,
            fork_chance: 0.05,
        }
    }

    fn draw(&mut self) -> Series {
        let a1 = self.rng.random_range(0.2..=1.0);
        let turn = self.turn.abs();
        let a2 = a1 * self.rng.random_range(-turn..=turn);
        let a3 = if self.rng.random_bool(self.fork_chance.clamp(0.0, 1.0)) {
            -a1
        } else {
            a1 * self.rng.random_range(0.0..=0.5)
        };
        [a1, a2, a3]
    }
}

impl SeriesSolver for RandomSeries {
    fn series(
        &mut self,
        _boundary: &SimpleBoundary,
        _conditions: &BoundaryConditions,
        tips: &SourcePoints,
    ) -> DeltaResult<BTreeMap<BranchId, Series>> {
        Ok(tips.keys().map(|&id| (id, self.draw())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use delta_core::geometry::Point;

    fn tips() -> SourcePoints {
        SourcePoints::from([(1, (Point::ZERO, 0.0)), (4, (Point::X, 1.0))])
    }

    #[test]
    fn one_entry_per_tip() {
        let mut solver = RandomSeries::new(7);
        let series = solver
            .series(&SimpleBoundary::default(), &BoundaryConditions::default(), &tips())
            .unwrap();
        assert_eq!(series.keys().copied().collect::<Vec<_>>(), vec![1, 4]);
        for a in series.values() {
            assert!((0.2..=1.0).contains(&a[0]));
            assert!(a[1].abs() <= 0.5 * a[0] + 1e-12);
        }
    }

    #[test]
    fn same_seed_same_series() {
        let mut a = RandomSeries::new(42);
        let mut b = RandomSeries::new(42);
        for _ in 0..5 {
            assert_eq!(a.draw(), b.draw());
        }
    }

    #[test]
    fn certain_fork_gives_negative_ratio() {
        let mut solver = RandomSeries::new(1);
        solver.fork_chance = 1.0;
        let a = solver.draw();
        assert!(a[2] / a[0] <= -0.1);
    }
}
