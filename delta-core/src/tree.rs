use std::collections::BTreeMap;
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

use serde::{Deserialize, Serialize};

use crate::{
    boundary::{Edge, SimpleBoundary},
    branch::Branch,
    error::{DeltaError, DeltaResult},
    geometry::{Point, Polar},
    types::{AUTO_BRANCH_ID, BranchId, INVALID_BRANCH_ID, Tag},
};

/// Source point and heading for each branch id, as used by
/// [`Tree::initialize`].
pub type SourcePoints = BTreeMap<BranchId, (Point, f64)>;

/// Forest of branches keyed by handle.
///
/// `relations` maps a parent to its `(left, right)` children. Children are
/// always freshly minted ids, so no branch can become its own ancestor.
/// A branch without a relation entry is a tip.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    branches: BTreeMap<BranchId, Branch>,
    relations: BTreeMap<BranchId, (BranchId, BranchId)>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole tree with one source branch per entry.
    pub fn initialize(&mut self, sources: &SourcePoints) -> DeltaResult<()> {
        self.clear();
        for (&id, &(point, angle)) in sources {
            self.add_branch(Branch::new(point, angle), id)?;
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.branches.clear();
        self.relations.clear();
    }

    pub fn len(&self) -> usize {
        self.branches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    pub fn contains(&self, id: BranchId) -> bool {
        self.branches.contains_key(&id)
    }

    /// All branch ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = BranchId> + '_ {
        self.branches.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (BranchId, &Branch)> + '_ {
        self.branches.iter().map(|(&id, b)| (id, b))
    }

    pub fn branch(&self, id: BranchId) -> DeltaResult<&Branch> {
        self.branches.get(&id).ok_or(DeltaError::MissingBranch(id))
    }

    pub fn branch_mut(&mut self, id: BranchId) -> DeltaResult<&mut Branch> {
        self.branches
            .get_mut(&id)
            .ok_or(DeltaError::MissingBranch(id))
    }

    fn ensure_exists(&self, id: BranchId) -> DeltaResult<()> {
        if self.branches.contains_key(&id) {
            Ok(())
        } else {
            Err(DeltaError::MissingBranch(id))
        }
    }

    pub fn is_valid_id(id: BranchId) -> bool {
        id >= 1 && id != INVALID_BRANCH_ID
    }

    /// Smallest positive id not used by any branch.
    pub fn generate_new_id(&self) -> BranchId {
        let mut candidate = 1;
        for &id in self.branches.keys() {
            if id != candidate {
                break;
            }
            candidate += 1;
        }
        candidate
    }

    /// Inserts `branch` under `id`, or under a freshly minted id when `id`
    /// is [`AUTO_BRANCH_ID`].
    ///
    /// ### Returns
    /// The id the branch was stored under.
    ///
    /// ### Errors
    /// [`DeltaError::DuplicateBranchId`] or [`DeltaError::InvalidBranchId`].
    pub fn add_branch(&mut self, branch: Branch, id: BranchId) -> DeltaResult<BranchId> {
        let id = if id == AUTO_BRANCH_ID {
            self.generate_new_id()
        } else {
            id
        };
        if self.branches.contains_key(&id) {
            return Err(DeltaError::DuplicateBranchId(id));
        }
        if !Self::is_valid_id(id) {
            return Err(DeltaError::InvalidBranchId(id));
        }
        self.branches.insert(id, branch);
        Ok(id)
    }

    /// Bifurcates the tip `parent` into two new branches.
    ///
    /// ### Returns
    /// The `(left, right)` ids minted for the children.
    ///
    /// ### Errors
    /// [`DeltaError::MissingBranch`] or [`DeltaError::AlreadyHasChildren`].
    pub fn add_sub_branches(
        &mut self,
        parent: BranchId,
        left: Branch,
        right: Branch,
    ) -> DeltaResult<(BranchId, BranchId)> {
        if self.has_sub_branches(parent)? {
            return Err(DeltaError::AlreadyHasChildren(parent));
        }
        let left_id = self.add_branch(left, AUTO_BRANCH_ID)?;
        let right_id = self.add_branch(right, AUTO_BRANCH_ID)?;
        self.relations.insert(parent, (left_id, right_id));
        log::debug!("branch {parent} bifurcated into {left_id} and {right_id}");
        Ok((left_id, right_id))
    }

    /// Removes a source branch together with everything grown from it.
    ///
    /// ### Errors
    /// [`DeltaError::MissingBranch`], or [`DeltaError::IsSubBranch`] when
    /// `id` is one half of a bifurcation; use
    /// [`Tree::delete_sub_branches`] on its parent instead.
    pub fn delete_branch(&mut self, id: BranchId) -> DeltaResult<()> {
        if self.has_parent(id)? {
            return Err(DeltaError::IsSubBranch(id));
        }
        if self.has_sub_branches(id)? {
            self.delete_sub_branches(id)?;
        }
        self.branches.remove(&id);
        Ok(())
    }

    /// Removes every descendant of `id`; `id` itself stays as a tip.
    ///
    /// ### Errors
    /// [`DeltaError::MissingBranch`] or [`DeltaError::NoChildren`].
    pub fn delete_sub_branches(&mut self, id: BranchId) -> DeltaResult<()> {
        let (left, right) = self.sub_branch_ids(id)?;
        for child in [left, right] {
            if self.relations.contains_key(&child) {
                self.delete_sub_branches(child)?;
            }
            self.branches.remove(&child);
        }
        self.relations.remove(&id);
        log::debug!("sub branches {left} and {right} of {id} removed");
        Ok(())
    }

    pub fn has_sub_branches(&self, id: BranchId) -> DeltaResult<bool> {
        self.ensure_exists(id)?;
        Ok(self.relations.contains_key(&id))
    }

    pub fn sub_branch_ids(&self, id: BranchId) -> DeltaResult<(BranchId, BranchId)> {
        self.ensure_exists(id)?;
        self.relations
            .get(&id)
            .copied()
            .ok_or(DeltaError::NoChildren(id))
    }

    pub fn sub_branches(&self, id: BranchId) -> DeltaResult<(&Branch, &Branch)> {
        let (left, right) = self.sub_branch_ids(id)?;
        Ok((self.branch(left)?, self.branch(right)?))
    }

    fn find_parent(&self, id: BranchId) -> Option<BranchId> {
        self.relations
            .iter()
            .find(|(_, children)| children.0 == id || children.1 == id)
            .map(|(&parent, _)| parent)
    }

    pub fn has_parent(&self, id: BranchId) -> DeltaResult<bool> {
        self.ensure_exists(id)?;
        Ok(self.find_parent(id).is_some())
    }

    /// A source branch is one that no other branch bifurcated into.
    pub fn is_source_branch(&self, id: BranchId) -> DeltaResult<bool> {
        Ok(!self.has_parent(id)?)
    }

    pub fn parent_id(&self, id: BranchId) -> DeltaResult<BranchId> {
        self.ensure_exists(id)?;
        self.find_parent(id).ok_or(DeltaError::NoParent(id))
    }

    pub fn parent(&self, id: BranchId) -> DeltaResult<&Branch> {
        self.branch(self.parent_id(id)?)
    }

    /// Sibling of a sub branch.
    pub fn adjacent_id(&self, id: BranchId) -> DeltaResult<BranchId> {
        let (left, right) = self.sub_branch_ids(self.parent_id(id)?)?;
        Ok(if left == id { right } else { left })
    }

    pub fn tip_ids(&self) -> Vec<BranchId> {
        self.branches
            .keys()
            .copied()
            .filter(|id| !self.relations.contains_key(id))
            .collect()
    }

    pub fn tip_points(&self) -> Vec<Point> {
        self.tip_ids_and_points().into_values().collect()
    }

    pub fn tip_ids_and_points(&self) -> BTreeMap<BranchId, Point> {
        self.branches
            .iter()
            .filter(|(id, _)| !self.relations.contains_key(*id))
            .map(|(&id, b)| (id, b.tip_point()))
            .collect()
    }

    /// Tip points with their current headings, keyed by tip id.
    pub fn tip_ids_points_angles(&self) -> DeltaResult<SourcePoints> {
        self.branches
            .iter()
            .filter(|(id, _)| !self.relations.contains_key(*id))
            .map(|(&id, b)| -> DeltaResult<_> { Ok((id, (b.tip_point(), b.tip_angle()?))) })
            .collect()
    }

    fn check_batch(&self, ids: &[BranchId], values: usize, tags: &[Tag]) -> DeltaResult<()> {
        if ids.len() != values {
            return Err(DeltaError::LengthMismatch {
                context: "batch ids/values",
                left: ids.len(),
                right: values,
            });
        }
        if ids.len() != tags.len() {
            return Err(DeltaError::LengthMismatch {
                context: "batch ids/tags",
                left: ids.len(),
                right: tags.len(),
            });
        }
        ids.iter().try_for_each(|&id| self.ensure_exists(id))
    }

    fn apply_absolute(&mut self, ids: &[BranchId], targets: Vec<Point>, tags: &[Tag]) -> DeltaResult<()> {
        for ((&id, p), &tag) in ids.iter().zip(targets).zip(tags) {
            self.branch_mut(id)?.add_absolute_point(p, tag);
        }
        Ok(())
    }

    /// Adds `points[i]` relative to the tip of branch `ids[i]`.
    ///
    /// All ids are checked before any branch changes; on error the tree is
    /// left untouched.
    pub fn add_points(&mut self, ids: &[BranchId], points: &[Point], tags: &[Tag]) -> DeltaResult<()> {
        self.check_batch(ids, points.len(), tags)?;
        let targets = ids
            .iter()
            .zip(points)
            .map(|(&id, &p)| Ok(self.branch(id)?.tip_point() + p))
            .collect::<DeltaResult<Vec<_>>>()?;
        self.apply_absolute(ids, targets, tags)
    }

    /// Adds `polars[i]` relative to the tip heading of branch `ids[i]`.
    ///
    /// All-or-nothing like [`Tree::add_points`].
    pub fn add_polars(&mut self, ids: &[BranchId], polars: &[Polar], tags: &[Tag]) -> DeltaResult<()> {
        self.check_batch(ids, polars.len(), tags)?;
        let targets = ids
            .iter()
            .zip(polars)
            .map(|(&id, p)| {
                let b = self.branch(id)?;
                let step = Polar::new(p.r, p.phi + b.tip_angle()?);
                Ok(b.tip_point() + step.to_point())
            })
            .collect::<DeltaResult<Vec<_>>>()?;
        self.apply_absolute(ids, targets, tags)
    }

    /// Adds `polars[i]`, in global orientation, to the tip of `ids[i]`.
    ///
    /// All-or-nothing like [`Tree::add_points`].
    pub fn add_absolute_polars(
        &mut self,
        ids: &[BranchId],
        polars: &[Polar],
        tags: &[Tag],
    ) -> DeltaResult<()> {
        self.check_batch(ids, polars.len(), tags)?;
        let targets = ids
            .iter()
            .zip(polars)
            .map(|(&id, p)| Ok(self.branch(id)?.tip_point() + p.to_point()))
            .collect::<DeltaResult<Vec<_>>>()?;
        self.apply_absolute(ids, targets, tags)
    }

    /// Largest [`Branch::tip_curvature_distance`] over all tips with at
    /// least three vertices, `0.0` if there are none.
    pub fn maximal_tip_curvature_distance(&self) -> f64 {
        self.tip_ids()
            .into_iter()
            .filter_map(|id| self.branches.get(&id)?.tip_curvature_distance())
            .fold(0.0, f64::max)
    }

    /// Flattens the last bend of every tip.
    ///
    /// ### Errors
    /// [`DeltaError::TooFewVertices`] if any tip has fewer than three
    /// vertices.
    pub fn flatten_tip_curvature(&mut self) -> DeltaResult<()> {
        for id in self.tip_ids() {
            self.branch_mut(id)?.flatten_tip()?;
        }
        Ok(())
    }

    /// Retracts every tip by one vertex. Tips reduced to their source
    /// vertex take their sibling with them: the parent's bifurcation is
    /// deleted.
    pub fn remove_tip_points(&mut self) -> DeltaResult<()> {
        let mut collapsed = Vec::new();
        for id in self.tip_ids() {
            let branch = self.branch_mut(id)?;
            if branch.vertex_count() >= 2 {
                branch.remove_tip_point()?;
            }
            if branch.vertex_count() == 1 {
                collapsed.push(id);
            }
        }
        for id in collapsed {
            if self.contains(id) && self.has_parent(id)? {
                self.delete_sub_branches(self.parent_id(id)?)?;
            }
        }
        Ok(())
    }

    /// Parents of tip branches whose length is at most `zero_length`,
    /// sorted and deduplicated.
    pub fn zero_length_tip_branches_ids(&self, zero_length: f64) -> Vec<BranchId> {
        let mut parents: Vec<BranchId> = self
            .tip_ids()
            .into_iter()
            .filter(|id| {
                self.branches
                    .get(id)
                    .is_some_and(|b| b.length() <= zero_length)
            })
            .filter_map(|id| self.find_parent(id))
            .collect();
        parents.sort_unstable();
        parents.dedup();
        parents
    }

    /// Fixture generator: grows branch `id` by `n` steps of
    /// `Polar{ds, dalpha}`, then bifurcates it at `±pi/4` and grows both
    /// children by `n` steps as well. An empty tree is first initialized
    /// with branch `id` at the origin pointing up.
    ///
    /// ### Returns
    /// Ids of the two new children.
    pub fn grow_test_tree(
        &mut self,
        tag: Tag,
        id: BranchId,
        ds: f64,
        n: usize,
        dalpha: f64,
    ) -> DeltaResult<(BranchId, BranchId)> {
        if self.is_empty() {
            self.initialize(&SourcePoints::from([(id, (Point::ZERO, FRAC_PI_2))]))?;
        }
        if self.has_sub_branches(id)? {
            return Err(DeltaError::AlreadyHasChildren(id));
        }

        let source = self.branch_mut(id)?;
        for _ in 0..n {
            source.add_polar(Polar::new(ds, dalpha), tag)?;
        }

        let tip = source.tip_point();
        let heading = source.tip_angle()?;
        let mut left = Branch::new(tip, heading + FRAC_PI_4);
        let mut right = Branch::new(tip, heading - FRAC_PI_4);
        for _ in 0..n {
            left.add_polar(Polar::new(ds, dalpha), tag)?;
            right.add_polar(Polar::new(ds, dalpha), tag)?;
        }

        self.add_sub_branches(id, left, right)
    }

    /// The last segment of every tip as a set of open two-vertex pieces,
    /// each tagged like the segment it copies.
    pub fn tip_boundary(&self) -> SimpleBoundary {
        let mut out = SimpleBoundary::default();
        for id in self.tip_ids() {
            let Some(branch) = self.branches.get(&id) else {
                continue;
            };
            let (Some(tag), [.., a, b]) = (branch.tip_tag(), branch.vertices()) else {
                continue;
            };
            let start = out.vertices.len();
            out.vertices.extend([*a, *b]);
            out.edges.push(Edge::new(start, start + 1, tag));
        }
        out
    }
}
