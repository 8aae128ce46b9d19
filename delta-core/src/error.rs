//! Unified error type for `delta-core` operations.
//!
//! Every fallible operation in the crate returns [`DeltaResult`]. Errors are
//! never retried internally; they propagate to whoever drives the
//! simulation loop, which is expected to abort the current step.

use thiserror::Error;

use crate::types::{BoundaryId, BranchId, Tag};

/// Result alias used throughout the crate.
pub type DeltaResult<T> = Result<T, DeltaError>;

/// Errors raised by geometry, tree and boundary operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DeltaError {
    /// Tried to remove the source vertex of a branch.
    #[error("last branch point can't be removed")]
    LastPoint,
    /// The operation needs more vertices than the object has.
    #[error("{context}: at least {required} vertices required, found {found}")]
    TooFewVertices {
        context: &'static str,
        required: usize,
        found: usize,
    },
    /// An index fell outside its valid range.
    #[error("{context}: index {index} out of range (len {len})")]
    IndexOutOfRange {
        context: &'static str,
        index: usize,
        len: usize,
    },
    /// Normalizing or taking the angle of a vector with (near) zero norm.
    #[error("{0}: vector norm is zero")]
    ZeroLength(&'static str),
    /// Branch ids must be in `1..u32::MAX`.
    #[error("invalid branch id {0}")]
    InvalidBranchId(BranchId),
    /// A branch with this id is already stored.
    #[error("branch {0} already exists")]
    DuplicateBranchId(BranchId),
    /// No branch with this id.
    #[error("branch {0} does not exist")]
    MissingBranch(BranchId),
    /// Bifurcating a branch that already has children.
    #[error("branch {0} already has sub branches")]
    AlreadyHasChildren(BranchId),
    /// Asking for the children of a tip.
    #[error("branch {0} doesn't have sub branches")]
    NoChildren(BranchId),
    /// Deleting a sub branch on its own would leave half a bifurcation.
    #[error("branch {0} is a sub branch; delete its parent's sub branches instead")]
    IsSubBranch(BranchId),
    /// Asking for the parent of a source branch.
    #[error("branch {0} doesn't have a parent branch")]
    NoParent(BranchId),
    /// Batch inputs of different lengths.
    #[error("{context}: input lengths differ ({left} vs {right})")]
    LengthMismatch {
        context: &'static str,
        left: usize,
        right: usize,
    },
    /// A region needs exactly one outer boundary.
    #[error("region must have exactly one outer boundary, found {0}")]
    OuterBoundaryCount(usize),
    /// Boundary ids or edge tags collide between named boundaries.
    #[error("boundary id {0} is used more than once")]
    DuplicateBoundaryId(BoundaryId),
    /// Edge tag reused by two named boundaries.
    #[error("edge tag {0} is used by more than one boundary")]
    DuplicateTag(Tag),
    /// A closed boundary must have as many edges as vertices.
    #[error("{context}: {vertices} vertices but {edges} edges")]
    VertexEdgeMismatch {
        context: String,
        vertices: usize,
        edges: usize,
    },
    /// A spliced boundary no longer closes back onto its first vertex.
    #[error("boundary '{0}' is not a closed loop")]
    OpenLoop(String),
    /// No named boundary with this id.
    #[error("boundary {0} does not exist")]
    MissingBoundary(BoundaryId),
    /// The tree is empty but an anchor references it.
    #[error("{0}: tree is empty")]
    EmptyTree(&'static str),
    /// A configuration value is out of its valid range.
    #[error("invalid parameter {name} = {value}: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },
    /// Failure reported by an external series solver.
    #[error("series solver: {0}")]
    Solver(String),
}
