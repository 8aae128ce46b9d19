use std::collections::BTreeMap;

use crate::{
    boundary::SimpleBoundary,
    boundary_generator::{RibbonParams, generate_boundary},
    branch::Branch,
    config::Config,
    error::{DeltaError, DeltaResult},
    geometry::Polar,
    model::{BifurcationMode, next_point, q_bifurcate_at, q_growth},
    region::{BoundaryConditions, Region, Sources},
    series::SeriesHistory,
    tree::{SourcePoints, Tree},
    types::{BranchId, Series},
};

/// Upper bound on the corrector cycles of one non-linear step.
pub const MAX_NON_LINEAR_CYCLES: usize = 100;

/// Branch length passed to [`next_point`] while shrinking, large enough
/// that the near-fork step limit never applies.
const SHRINK_BRANCH_LENGTH: f64 = 100.0;

/// Source of the series coefficients of every tip.
///
/// Implementations mesh the boundary, solve the field on it and integrate
/// the solution around each tip. Closures with the same signature
/// implement the trait too, which is how tests script the coefficients.
pub trait SeriesSolver {
    /// ### Parameters
    /// - `boundary` - Combined closed boundary with its hole points.
    /// - `conditions` - Boundary condition of every edge tag.
    /// - `tips` - Position and heading of every tip, keyed by branch id.
    ///
    /// ### Returns
    /// The `(a1, a2, a3)` coefficients of each tip.
    ///
    /// ### Errors
    /// Whatever the solver fails with, usually [`DeltaError::Solver`].
    fn series(
        &mut self,
        boundary: &SimpleBoundary,
        conditions: &BoundaryConditions,
        tips: &SourcePoints,
    ) -> DeltaResult<BTreeMap<BranchId, Series>>;
}

impl<F> SeriesSolver for F
where
    F: FnMut(&SimpleBoundary, &BoundaryConditions, &SourcePoints) -> DeltaResult<BTreeMap<BranchId, Series>>,
{
    fn series(
        &mut self,
        boundary: &SimpleBoundary,
        conditions: &BoundaryConditions,
        tips: &SourcePoints,
    ) -> DeltaResult<BTreeMap<BranchId, Series>> {
        self(boundary, conditions, tips)
    }
}

/// Everything a growing delta consists of: the parameters, the fixed
/// region with its source anchors, the tree of branches and the history
/// of coefficients seen so far.
#[derive(Clone, Debug)]
pub struct Simulation {
    pub config: Config,
    pub region: Region,
    pub sources: Sources,
    pub conditions: BoundaryConditions,
    pub tree: Tree,
    pub history: SeriesHistory,
}

impl Simulation {
    /// Builds a simulation over `region`, with one source branch per anchor.
    ///
    /// ### Errors
    /// Invalid configuration values, a malformed region, or anchors that
    /// do not name a vertex of the region.
    pub fn new(
        config: Config,
        region: Region,
        sources: Sources,
        conditions: BoundaryConditions,
    ) -> DeltaResult<Self> {
        config.validate()?;
        region.check()?;
        let mut tree = Tree::new();
        tree.initialize(&region.source_points_and_angles(&sources)?)?;
        Ok(Self {
            config,
            region,
            sources,
            conditions,
            tree,
            history: SeriesHistory::new(),
        })
    }

    /// Rectangular region of `config.width x config.height` with a single
    /// source at `config.source_x` on the bottom edge, under Laplace
    /// boundary conditions.
    pub fn from_config(config: Config) -> DeltaResult<Self> {
        let (region, sources) = Region::rectangular(config.width, config.height, config.source_x)?;
        let conditions = BoundaryConditions::laplace(config.river_tag);
        Self::new(config, region, sources, conditions)
    }

    /// Drops all growth and recorded history, leaving one bare source
    /// branch per anchor.
    pub fn reset(&mut self) -> DeltaResult<()> {
        self.tree.clear();
        self.tree
            .initialize(&self.region.source_points_and_angles(&self.sources)?)?;
        self.history.clear();
        Ok(())
    }

    /// Region boundary with every river spliced in.
    pub fn generate_boundary(&self) -> DeltaResult<SimpleBoundary> {
        generate_boundary(
            &self.region,
            &self.sources,
            &self.tree,
            &RibbonParams::from(&self.config),
        )
    }

    /// Runs `solver` on the current geometry.
    pub fn evaluate_series(&self, solver: &mut dyn SeriesSolver) -> DeltaResult<BTreeMap<BranchId, Series>> {
        let boundary = self.generate_boundary()?;
        let tips = self.tree.tip_ids_points_angles()?;
        solver.series(&boundary, &self.conditions, &tips)
    }

    /// Largest `a1` among `series`, `0.0` when empty.
    pub fn max_a1(series: &BTreeMap<BranchId, Series>) -> f64 {
        series.values().map(|a| a[0]).fold(0.0, f64::max)
    }

    fn growing_tip(&self, id: BranchId) -> DeltaResult<&Branch> {
        if self.tree.has_sub_branches(id)? {
            return Err(DeltaError::AlreadyHasChildren(id));
        }
        self.tree.branch(id)
    }

    /// Advances every tip whose coefficients allow growth.
    ///
    /// A tip that meets the bifurcation rule forks into two children at
    /// `±bifurcation_angle` around its heading, each one `ds` long.
    /// Otherwise the tip gets the step computed by [`next_point`].
    ///
    /// ### Errors
    /// [`DeltaError::EmptyTree`], or a series entry that names a missing
    /// branch or one that already forked.
    pub fn grow_tree(&mut self, series: &BTreeMap<BranchId, Series>, max_a1: f64) -> DeltaResult<()> {
        if self.tree.is_empty() {
            return Err(DeltaError::EmptyTree("grow_tree"));
        }
        let cfg = &self.config;
        for (&id, a) in series {
            if !q_growth(cfg, a) {
                continue;
            }
            let tip = self.growing_tip(id)?;
            let length = tip.length();

            if q_bifurcate_at(cfg, a, length) {
                let (point, angle) = (tip.tip_point(), tip.tip_angle()?);
                let mut left = Branch::new(point, angle + cfg.bifurcation_angle);
                left.add_polar(Polar::new(cfg.ds, 0.0), cfg.river_tag)?;
                let mut right = Branch::new(point, angle - cfg.bifurcation_angle);
                right.add_polar(Polar::new(cfg.ds, 0.0), cfg.river_tag)?;
                self.tree.add_sub_branches(id, left, right)?;
            } else {
                let step = next_point(cfg, a, length, max_a1)?;
                self.tree.branch_mut(id)?.add_polar(step, cfg.river_tag)?;
            }
        }
        Ok(())
    }

    /// Retracts every tip whose coefficients allow growth by the length
    /// it would have grown.
    pub fn shrink_tree(&mut self, series: &BTreeMap<BranchId, Series>, max_a1: f64) -> DeltaResult<()> {
        if self.tree.is_empty() {
            return Err(DeltaError::EmptyTree("shrink_tree"));
        }
        let cfg = &self.config;
        for (&id, a) in series {
            if !q_growth(cfg, a) {
                continue;
            }
            self.growing_tip(id)?;
            let step = next_point(cfg, a, SHRINK_BRANCH_LENGTH, max_a1)?;
            self.tree.branch_mut(id)?.shrink(step.r)?;
        }
        Ok(())
    }

    fn advance(&mut self, solver: &mut dyn SeriesSolver, max_a1: Option<f64>) -> DeltaResult<BTreeMap<BranchId, Series>> {
        let series = self.evaluate_series(solver)?;
        let max_a1 = max_a1.unwrap_or_else(|| Self::max_a1(&series));
        self.grow_tree(&series, max_a1)?;
        Ok(series)
    }

    /// One forward step: solve, grow, record the coefficients.
    pub fn linear_step(&mut self, solver: &mut dyn SeriesSolver) -> DeltaResult<BTreeMap<BranchId, Series>> {
        let series = self.advance(solver, None)?;
        self.history.record(&series);
        Ok(series)
    }

    /// One backward step: solve, shrink, then retract forks whose
    /// children have shrunk to nothing.
    ///
    /// The length difference of the retracted children is stored in the
    /// history of their parent.
    pub fn shrink_step(&mut self, solver: &mut dyn SeriesSolver) -> DeltaResult<BTreeMap<BranchId, Series>> {
        let series = self.evaluate_series(solver)?;
        self.shrink_tree(&series, Self::max_a1(&series))?;

        // Children carry larger ids than their ancestors, so descending
        // order retracts nested forks bottom up.
        for id in self.tree.zero_length_tip_branches_ids(0.01 * self.config.ds).into_iter().rev() {
            if !self.tree.contains(id) {
                continue;
            }
            let (left, right) = self.tree.sub_branches(id)?;
            let diff = (left.length() - right.length()).abs();
            self.history.record_length_diff(id, diff);
            self.tree.delete_sub_branches(id)?;
            log::debug!("fork of branch {id} retracted, children differed by {diff}");
        }
        Ok(series)
    }

    /// Forward step with a curvature correction.
    ///
    /// After a regular first step, half steps without bifurcation are
    /// repeated: while the tips bend by at least `max_curvature_distance`
    /// their last bend is flattened and the trial point dropped. The first
    /// trial that stays straight enough is undone and the loop ends.
    ///
    /// ### Returns
    /// The number of trial half steps taken.
    pub fn non_linear_step(&mut self, solver: &mut dyn SeriesSolver) -> DeltaResult<usize> {
        let series = self.advance(solver, None)?;
        let cycles = self.correct_curvature(solver, None)?;
        self.history.record(&series);
        Ok(cycles)
    }

    fn correct_curvature(&mut self, solver: &mut dyn SeriesSolver, max_a1: Option<f64>) -> DeltaResult<usize> {
        let mut cycles = 0;
        loop {
            cycles += 1;
            let mode = std::mem::replace(&mut self.config.bifurcation_mode, BifurcationMode::None);
            let trial = self.advance(solver, max_a1);
            self.config.bifurcation_mode = mode;
            trial?;

            let bend = self.tree.maximal_tip_curvature_distance();
            if bend < self.config.max_curvature_distance {
                break;
            }
            if cycles == MAX_NON_LINEAR_CYCLES {
                log::warn!("curvature still {bend} after {cycles} cycles, giving up");
                break;
            }
            self.tree.flatten_tip_curvature()?;
            self.tree.remove_tip_points()?;
        }
        self.tree.remove_tip_points()?;
        log::debug!("non-linear step settled after {cycles} cycles");
        Ok(cycles)
    }

    /// Shrinks the tree `steps` times, grows it back with non-linear steps
    /// and records how far each tip ended up from where it started.
    ///
    /// The second half step of regrowth `i` normalizes by the `a1` maximum
    /// of shrink `i + 1`, so growth retraces the shrinking. The tree is
    /// left in its shrunk state.
    pub fn backward_step(&mut self, solver: &mut dyn SeriesSolver, steps: usize) -> DeltaResult<()> {
        let initial = self.tree.tip_ids_and_points();
        let mut first_series = None;
        let mut maxima = Vec::with_capacity(steps);
        for _ in 0..steps {
            let series = self.shrink_step(solver)?;
            maxima.push(Self::max_a1(&series));
            first_series.get_or_insert(series);
        }

        let shrunk = self.tree.clone();
        let mode = std::mem::replace(&mut self.config.bifurcation_mode, BifurcationMode::None);
        let regrown = self.regrow(solver, &maxima);
        self.config.bifurcation_mode = mode;
        let forward = std::mem::replace(&mut self.tree, shrunk);
        regrown?;

        if let Some(series) = first_series {
            self.history.record_backward(
                &series,
                &initial,
                &self.tree.tip_ids_and_points(),
                &forward.tip_ids_and_points(),
            );
        }
        log::info!("backward step of {steps} shrinks done");
        Ok(())
    }

    fn regrow(&mut self, solver: &mut dyn SeriesSolver, maxima: &[f64]) -> DeltaResult<()> {
        for (i, &max_a1) in maxima.iter().enumerate() {
            self.advance(solver, Some(max_a1))?;
            self.correct_curvature(solver, maxima.get(i + 1).copied())?;
        }
        Ok(())
    }

    /// Undoes the last [`Simulation::linear_step`]: every tip loses its
    /// last point and its last recorded coefficients.
    pub fn revert_last_step(&mut self) -> DeltaResult<()> {
        let tips = self.tree.tip_ids();
        self.tree.remove_tip_points()?;
        self.history.pop_last(&tips);
        Ok(())
    }

    /// Whether some tip has reached `maximal_river_height`.
    pub fn growth_stop_condition(&self) -> bool {
        self.tree
            .tip_points()
            .iter()
            .any(|p| self.config.height_reached(p.y))
    }

    /// Runs up to `steps` linear steps, stopping early once the stop
    /// height is reached.
    ///
    /// ### Returns
    /// The number of steps actually taken.
    pub fn run(&mut self, solver: &mut dyn SeriesSolver, steps: usize) -> DeltaResult<usize> {
        for step in 0..steps {
            if self.growth_stop_condition() {
                log::info!("stop height reached after {step} steps");
                return Ok(step);
            }
            log::info!("step {step}: {} tips", self.tree.tip_ids().len());
            self.linear_step(solver)?;
        }
        Ok(steps)
    }
}
