/// Handle of a branch inside a [`crate::tree::Tree`].
///
/// Handles are positive integers minted by the tree. `0` and
/// [`INVALID_BRANCH_ID`] are reserved and never name a branch.
pub type BranchId = u32;

/// Sentinel that asks [`crate::tree::Tree::add_branch`] to mint a fresh id.
pub const AUTO_BRANCH_ID: BranchId = BranchId::MAX;

/// Largest representable handle, reserved as invalid.
pub const INVALID_BRANCH_ID: BranchId = BranchId::MAX;

/// Boundary-condition tag carried by every edge.
pub type Tag = i64;

/// Identifier of a named [`crate::boundary::SimpleBoundary`] inside a
/// [`crate::region::Region`].
pub type BoundaryId = i64;

/// Position of a vertex inside a vertex sequence.
pub type VertexPos = usize;

/// Per-tip series coefficients `(a1, a2, a3)` produced by the field solver.
pub type Series = [f64; 3];
