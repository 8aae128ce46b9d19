//! The fixed enclosing domain: named boundaries, source anchors and the
//! boundary conditions attached to edge tags.

use std::collections::{BTreeMap, HashMap};
use std::f64::consts::{PI, TAU};

use serde::{Deserialize, Serialize};

use crate::{
    boundary::SimpleBoundary,
    error::{DeltaError, DeltaResult},
    geometry::{Point, PointExt},
    tree::SourcePoints,
    types::{BoundaryId, BranchId, Tag, VertexPos},
};

/// Anchors binding a source branch to a vertex of a named boundary.
pub type Sources = BTreeMap<BranchId, (BoundaryId, VertexPos)>;

/// Named boundaries of the simulation domain.
///
/// Exactly one of them is the outer boundary; the rest are holes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Region {
    boundaries: BTreeMap<BoundaryId, SimpleBoundary>,
}

impl Region {
    pub fn new() -> Self {
        Self::default()
    }

    /// ### Errors
    /// [`DeltaError::DuplicateBoundaryId`] if `id` is taken.
    pub fn add_boundary(&mut self, id: BoundaryId, boundary: SimpleBoundary) -> DeltaResult<()> {
        if self.boundaries.contains_key(&id) {
            return Err(DeltaError::DuplicateBoundaryId(id));
        }
        self.boundaries.insert(id, boundary);
        Ok(())
    }

    pub fn boundary(&self, id: BoundaryId) -> DeltaResult<&SimpleBoundary> {
        self.boundaries
            .get(&id)
            .ok_or(DeltaError::MissingBoundary(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = (BoundaryId, &SimpleBoundary)> + '_ {
        self.boundaries.iter().map(|(&id, b)| (id, b))
    }

    pub fn len(&self) -> usize {
        self.boundaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boundaries.is_empty()
    }

    /// Total vertex count over all named boundaries.
    pub fn vertex_count(&self) -> usize {
        self.boundaries.values().map(|b| b.vertices.len()).sum()
    }

    /// Total edge count over all named boundaries.
    pub fn edge_count(&self) -> usize {
        self.boundaries.values().map(|b| b.edges.len()).sum()
    }

    /// Validates the region before it is handed to the generator.
    ///
    /// ### Errors
    /// - [`DeltaError::OuterBoundaryCount`] unless exactly one boundary is
    ///   outer (an empty region counts as zero).
    /// - [`DeltaError::VertexEdgeMismatch`] for a boundary whose edge count
    ///   differs from its vertex count.
    /// - [`DeltaError::DuplicateTag`] if two named boundaries share a tag.
    pub fn check(&self) -> DeltaResult<()> {
        if self.boundaries.is_empty() {
            return Err(DeltaError::OuterBoundaryCount(0));
        }

        let mut owner: HashMap<Tag, BoundaryId> = HashMap::new();
        for (&id, b) in &self.boundaries {
            if b.vertices.len() != b.edges.len() {
                return Err(DeltaError::VertexEdgeMismatch {
                    context: format!("boundary {id}"),
                    vertices: b.vertices.len(),
                    edges: b.edges.len(),
                });
            }
            for e in &b.edges {
                match owner.insert(e.tag, id) {
                    Some(other) if other != id => return Err(DeltaError::DuplicateTag(e.tag)),
                    _ => {}
                }
            }
        }

        let outer = self.boundaries.values().filter(|b| !b.inner).count();
        if outer != 1 {
            return Err(DeltaError::OuterBoundaryCount(outer));
        }
        Ok(())
    }

    pub fn outer_boundary(&self) -> DeltaResult<&SimpleBoundary> {
        let mut outer = self.boundaries.values().filter(|b| !b.inner);
        match (outer.next(), outer.next()) {
            (Some(b), None) => Ok(b),
            _ => Err(DeltaError::OuterBoundaryCount(
                self.boundaries.values().filter(|b| !b.inner).count(),
            )),
        }
    }

    /// Hole markers of all boundaries.
    pub fn holes(&self) -> Vec<Point> {
        self.boundaries
            .values()
            .flat_map(|b| b.holes.iter().copied())
            .collect()
    }

    /// Positions of the neighbours of `pos` in a closed loop of `len`
    /// vertices, wrapping around both ends.
    pub fn adjacent_vertex_positions(len: usize, pos: VertexPos) -> DeltaResult<(VertexPos, VertexPos)> {
        if pos >= len {
            return Err(DeltaError::IndexOutOfRange {
                context: "adjacent vertices",
                index: pos,
                len,
            });
        }
        let left = if pos == 0 { len - 1 } else { pos - 1 };
        let right = if pos == len - 1 { 0 } else { pos + 1 };
        Ok((left, right))
    }

    /// Direction pointing into the domain at `center`, bisecting the turn
    /// from `left -> center` to `center -> right`.
    ///
    /// For a counter-clockwise outer loop (or clockwise hole) this is the
    /// inward normal, i.e. the direction a source branch starts growing.
    pub fn normal_angle(left: Point, center: Point, right: Point) -> DeltaResult<f64> {
        let incoming = center - left;
        let outgoing = right - center;
        let mut angle = (PI + incoming.turn_to(outgoing)?) / 2.0 + incoming.heading()?;
        if angle >= TAU {
            angle -= TAU;
        } else if angle <= -TAU {
            angle += TAU;
        }
        Ok(angle)
    }

    /// [`Region::normal_angle`] at vertex `pos` of a closed loop.
    pub fn vertex_normal_angle(vertices: &[Point], pos: VertexPos) -> DeltaResult<f64> {
        let (left, right) = Self::adjacent_vertex_positions(vertices.len(), pos)?;
        Self::normal_angle(vertices[left], vertices[pos], vertices[right])
    }

    /// Source point and inward heading for every anchor, ready for
    /// [`crate::tree::Tree::initialize`].
    pub fn source_points_and_angles(&self, sources: &Sources) -> DeltaResult<SourcePoints> {
        sources
            .iter()
            .map(|(&id, &(boundary_id, pos))| -> DeltaResult<_> {
                let b = self.boundary(boundary_id)?;
                let point = *b.vertices.get(pos).ok_or(DeltaError::IndexOutOfRange {
                    context: "source anchor",
                    index: pos,
                    len: b.vertices.len(),
                })?;
                Ok((id, (point, Self::vertex_normal_angle(&b.vertices, pos)?)))
            })
            .collect()
    }

    /// Unit-style rectangle `width x height` with a single source on the
    /// bottom edge at `x = source_x`.
    ///
    /// Vertices run counter-clockwise from the origin and the edges are
    /// tagged 1..=5; the source anchor is branch 1 at vertex 1.
    pub fn rectangular(width: f64, height: f64, source_x: f64) -> DeltaResult<(Region, Sources)> {
        let mut region = Region::new();
        region.add_boundary(1, outer_rectangle(width, height, source_x)?)?;
        Ok((region, Sources::from([(1, (1, 1))])))
    }

    /// [`Region::rectangular`] with two square holes, each carrying its own
    /// source anchor.
    pub fn rectangular_with_hole(
        width: f64,
        height: f64,
        source_x: f64,
    ) -> DeltaResult<(Region, Sources)> {
        let (w, h) = (width, height);
        let mut region = Region::new();
        region.add_boundary(1, outer_rectangle(w, h, source_x)?)?;
        region.add_boundary(
            2,
            SimpleBoundary::closed_loop(
                vec![
                    Point::new(0.25 * w, 0.75 * h),
                    Point::new(0.75 * w, 0.75 * h),
                    Point::new(0.75 * w, 0.25 * h),
                    Point::new(0.25 * w, 0.25 * h),
                ],
                &[6, 7, 8, 9],
            )?
            .inner(true)
            .with_holes(vec![Point::new(0.5 * w, 0.5 * h)])
            .with_name("hole"),
        )?;
        region.add_boundary(
            3,
            SimpleBoundary::closed_loop(
                vec![
                    Point::new(0.8 * w, 0.9 * h),
                    Point::new(0.9 * w, 0.9 * h),
                    Point::new(0.9 * w, 0.8 * h),
                    Point::new(0.8 * w, 0.8 * h),
                ],
                &[10, 11, 12, 13],
            )?
            .inner(true)
            .with_holes(vec![Point::new(0.85 * w, 0.85 * h)])
            .with_name("small hole"),
        )?;
        Ok((region, Sources::from([(1, (1, 1)), (2, (2, 1)), (3, (3, 3))])))
    }
}

fn outer_rectangle(width: f64, height: f64, source_x: f64) -> DeltaResult<SimpleBoundary> {
    Ok(SimpleBoundary::closed_loop(
        vec![
            Point::new(0.0, 0.0),
            Point::new(source_x, 0.0),
            Point::new(width, 0.0),
            Point::new(width, height),
            Point::new(0.0, height),
        ],
        &[1, 2, 3, 4, 5],
    )?
    .with_name("outer rectangular boundary"))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoundaryKind {
    Dirichlet,
    Neumann,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundaryCondition {
    pub kind: BoundaryKind,
    pub value: f64,
}

impl BoundaryCondition {
    pub const fn dirichlet(value: f64) -> Self {
        Self {
            kind: BoundaryKind::Dirichlet,
            value,
        }
    }

    pub const fn neumann(value: f64) -> Self {
        Self {
            kind: BoundaryKind::Neumann,
            value,
        }
    }
}

/// Boundary condition for each edge tag, passed along to the solver.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundaryConditions(pub BTreeMap<Tag, BoundaryCondition>);

impl BoundaryConditions {
    /// Conditions of the given kind only.
    pub fn of_kind(&self, kind: BoundaryKind) -> BoundaryConditions {
        BoundaryConditions(
            self.0
                .iter()
                .filter(|(_, bc)| bc.kind == kind)
                .map(|(&tag, &bc)| (tag, bc))
                .collect(),
        )
    }

    pub fn get(&self, tag: Tag) -> Option<&BoundaryCondition> {
        self.0.get(&tag)
    }

    /// Laplace setup for [`Region::rectangular`]: the bottom edges and the
    /// river are absorbing, the top edge carries a unit flux.
    pub fn laplace(river_tag: Tag) -> Self {
        Self(BTreeMap::from([
            (1, BoundaryCondition::dirichlet(0.0)),
            (2, BoundaryCondition::dirichlet(0.0)),
            (3, BoundaryCondition::neumann(0.0)),
            (4, BoundaryCondition::neumann(1.0)),
            (5, BoundaryCondition::neumann(0.0)),
            (river_tag, BoundaryCondition::dirichlet(0.0)),
        ]))
    }

    /// [`BoundaryConditions::laplace`] plus the edges of the two holes of
    /// [`Region::rectangular_with_hole`].
    pub fn laplace_with_hole(river_tag: Tag) -> Self {
        let mut bc = Self::laplace(river_tag);
        bc.0.extend((6..=9).map(|t| (t, BoundaryCondition::dirichlet(0.0))));
        bc.0.extend((10..=13).map(|t| (t, BoundaryCondition::dirichlet(1.0))));
        bc
    }
}
