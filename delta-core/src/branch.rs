use serde::{Deserialize, Serialize};

use crate::{
    boundary::{Edge, SimpleBoundary},
    error::{DeltaError, DeltaResult},
    geometry::{Point, PointExt, Polar},
    types::Tag,
};

/// Snap tolerance used by [`Branch::shrink`] when the requested length
/// lands on a vertex.
const SHRINK_EPS: f64 = 1e-5;

/// Polyline describing one river segment, grown from its source vertex.
///
/// A branch always holds at least one vertex, and
/// `edges.len() == vertices.len() - 1` after every operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawBranch")]
pub struct Branch {
    source_angle: f64,
    vertices: Vec<Point>,
    edges: Vec<Edge>,
}

/// Unchecked serialized form of a [`Branch`].
#[derive(Deserialize)]
struct RawBranch {
    source_angle: f64,
    vertices: Vec<Point>,
    edges: Vec<Edge>,
}

impl TryFrom<RawBranch> for Branch {
    type Error = DeltaError;

    fn try_from(raw: RawBranch) -> DeltaResult<Self> {
        let n = raw.vertices.len();
        if n == 0 {
            return Err(DeltaError::TooFewVertices {
                context: "branch",
                required: 1,
                found: 0,
            });
        }
        if raw.edges.len() != n - 1 {
            return Err(DeltaError::VertexEdgeMismatch {
                context: "branch".to_string(),
                vertices: n,
                edges: raw.edges.len(),
            });
        }
        for (i, e) in raw.edges.iter().enumerate() {
            if e.start != i || e.end != i + 1 {
                return Err(DeltaError::IndexOutOfRange {
                    context: "branch edge",
                    index: i,
                    len: raw.edges.len(),
                });
            }
        }
        Ok(Self {
            source_angle: raw.source_angle,
            vertices: raw.vertices,
            edges: raw.edges,
        })
    }
}

impl Branch {
    /// Creates a branch with a single vertex at `source_point`.
    ///
    /// ### Parameters
    /// - `source_point`: first vertex, never removed.
    /// - `source_angle`: heading used while the branch has no edges.
    pub fn new(source_point: Point, source_angle: f64) -> Self {
        Self {
            source_angle,
            vertices: vec![source_point],
            edges: Vec::new(),
        }
    }

    pub fn vertices(&self) -> &[Point] {
        &self.vertices
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Number of vertices, at least 1.
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn vertex(&self, i: usize) -> DeltaResult<Point> {
        self.vertices
            .get(i)
            .copied()
            .ok_or(DeltaError::IndexOutOfRange {
                context: "branch vertex",
                index: i,
                len: self.vertices.len(),
            })
    }

    /// Appends `p` as the new tip, connected by an edge tagged `tag`.
    pub fn add_absolute_point(&mut self, p: Point, tag: Tag) {
        let n = self.vertices.len();
        self.edges.push(Edge::new(n - 1, n, tag));
        self.vertices.push(p);
    }

    /// Appends `tip + p` where `p` is in global polar coordinates.
    pub fn add_absolute_polar(&mut self, p: Polar, tag: Tag) {
        self.add_absolute_point(self.tip_point() + p.to_point(), tag);
    }

    /// Appends `tip + p`.
    pub fn add_point(&mut self, p: Point, tag: Tag) {
        self.add_absolute_point(self.tip_point() + p, tag);
    }

    /// Appends a step whose angle is relative to the current tip heading.
    ///
    /// `Polar::new(ds, 0.0)` continues straight ahead. On a branch with a
    /// single vertex the heading is the source angle.
    ///
    /// ### Errors
    /// [`DeltaError::ZeroLength`] if the last segment is degenerate.
    pub fn add_polar(&mut self, p: Polar, tag: Tag) -> DeltaResult<()> {
        let heading = self.tip_angle()?;
        self.add_absolute_polar(Polar::new(p.r, p.phi + heading), tag);
        Ok(())
    }

    /// Removes the tip vertex and its edge.
    ///
    /// ### Errors
    /// [`DeltaError::LastPoint`] if only the source vertex is left.
    pub fn remove_tip_point(&mut self) -> DeltaResult<()> {
        if self.vertices.len() <= 1 {
            return Err(DeltaError::LastPoint);
        }
        self.vertices.pop();
        self.edges.pop();
        Ok(())
    }

    /// Retracts the branch by arc length `len` starting from the tip.
    ///
    /// Whole segments are removed while `len` exceeds them; a partially
    /// consumed segment is cut short and keeps its tag. A request within
    /// `1e-5` of a vertex snaps to that vertex. The source vertex is never
    /// removed, so shrinking by more than [`Branch::length`] leaves exactly
    /// one vertex.
    pub fn shrink(&mut self, mut len: f64) -> DeltaResult<()> {
        while len > 0.0 && self.vertices.len() > 1 {
            let tip = self.tip_vector()?;
            let tip_len = tip.length();

            if len < tip_len - SHRINK_EPS {
                let tag = self.edges.last().map_or(0, |e| e.tag);
                self.remove_tip_point()?;
                self.add_point(tip * (1.0 - len / tip_len), tag);
                break;
            } else if (len - tip_len).abs() <= SHRINK_EPS {
                self.remove_tip_point()?;
                break;
            }

            len -= tip_len;
            self.remove_tip_point()?;
        }
        Ok(())
    }

    /// Last vertex.
    pub fn tip_point(&self) -> Point {
        self.vertices[self.vertices.len() - 1]
    }

    pub fn source_point(&self) -> Point {
        self.vertices[0]
    }

    pub fn source_angle(&self) -> f64 {
        self.source_angle
    }

    pub fn set_source_angle(&mut self, phi: f64) {
        self.source_angle = phi;
    }

    /// Vector from vertex `i - 1` to vertex `i`, `i` in `1..vertex_count()`.
    pub fn vector(&self, i: usize) -> DeltaResult<Point> {
        if i == 0 || i >= self.vertices.len() {
            return Err(DeltaError::IndexOutOfRange {
                context: "branch vector",
                index: i,
                len: self.vertices.len(),
            });
        }
        Ok(self.vertices[i] - self.vertices[i - 1])
    }

    /// Vector of the last segment.
    ///
    /// ### Errors
    /// [`DeltaError::TooFewVertices`] on a single-vertex branch.
    pub fn tip_vector(&self) -> DeltaResult<Point> {
        let n = self.vertices.len();
        if n < 2 {
            return Err(DeltaError::TooFewVertices {
                context: "tip vector",
                required: 2,
                found: n,
            });
        }
        Ok(self.vertices[n - 1] - self.vertices[n - 2])
    }

    /// Heading of the tip: the source angle for a single vertex, otherwise
    /// the angle of the last segment.
    pub fn tip_angle(&self) -> DeltaResult<f64> {
        if self.vertices.len() == 1 {
            return Ok(self.source_angle);
        }
        self.tip_vector()?.heading()
    }

    /// Sum of segment lengths.
    pub fn length(&self) -> f64 {
        self.vertices
            .windows(2)
            .map(|w| (w[1] - w[0]).length())
            .sum()
    }

    /// Mean segment length.
    ///
    /// ### Errors
    /// [`DeltaError::TooFewVertices`] on a single-vertex branch.
    pub fn average_step(&self) -> DeltaResult<f64> {
        if self.edges.is_empty() {
            return Err(DeltaError::TooFewVertices {
                context: "average step",
                required: 2,
                found: self.vertices.len(),
            });
        }
        Ok(self.length() / self.edges.len() as f64)
    }

    /// Tag of the last edge, if any.
    pub fn tip_tag(&self) -> Option<Tag> {
        self.edges.last().map(|e| e.tag)
    }

    /// Distance between the penultimate vertex and the midpoint of its two
    /// neighbours, or `None` with fewer than three vertices.
    pub fn tip_curvature_distance(&self) -> Option<f64> {
        let n = self.vertices.len();
        if n < 3 {
            return None;
        }
        let mid = (self.vertices[n - 1] + self.vertices[n - 3]) / 2.0;
        Some((mid - self.vertices[n - 2]).length())
    }

    /// Moves the penultimate vertex onto the midpoint of its neighbours.
    ///
    /// ### Errors
    /// [`DeltaError::TooFewVertices`] with fewer than three vertices.
    pub fn flatten_tip(&mut self) -> DeltaResult<()> {
        let n = self.vertices.len();
        if n < 3 {
            return Err(DeltaError::TooFewVertices {
                context: "flatten tip curvature",
                required: 3,
                found: n,
            });
        }
        self.vertices[n - 2] = (self.vertices[n - 1] + self.vertices[n - 3]) / 2.0;
        Ok(())
    }

    /// Copy of the branch coarsened with [`SimpleBoundary::smoothed`].
    pub fn smoothed(&self, min_degree: f64, ignored_distance: f64) -> DeltaResult<Branch> {
        let line = SimpleBoundary::new(self.vertices.clone(), self.edges.clone());
        let smooth = line.smoothed(min_degree, ignored_distance)?;
        Ok(Branch {
            source_angle: self.source_angle,
            vertices: smooth.vertices,
            edges: smooth.edges,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::EPS;
    use proptest::prelude::*;
    use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

    fn straight(n: usize, ds: f64) -> Branch {
        let mut b = Branch::new(Point::ZERO, FRAC_PI_2);
        for _ in 0..n {
            b.add_polar(Polar::new(ds, 0.0), 100).unwrap();
        }
        b
    }

    #[test]
    fn new_branch_has_single_vertex() {
        let b = Branch::new(Point::new(0.5, 0.0), FRAC_PI_2);
        assert_eq!(b.vertex_count(), 1);
        assert!(b.edges().is_empty());
        assert_eq!(b.length(), 0.0);
        assert_eq!(b.tip_angle().unwrap(), FRAC_PI_2);
        assert!(b.tip_vector().is_err());
    }

    #[test]
    fn relative_polar_follows_tip_heading() {
        let mut b = Branch::new(Point::ZERO, FRAC_PI_2);
        b.add_polar(Polar::new(1.0, 0.0), 7).unwrap();
        assert!(b.tip_point().approx_eq(Point::new(0.0, 1.0)));

        b.add_polar(Polar::new(1.0, -FRAC_PI_2), 8).unwrap();
        assert!(b.tip_point().approx_eq(Point::new(1.0, 1.0)));
        assert!(b.tip_angle().unwrap().abs() < EPS);

        assert_eq!(b.edges()[0], Edge::new(0, 1, 7));
        assert_eq!(b.edges()[1], Edge::new(1, 2, 8));
    }

    #[test]
    fn absolute_polar_ignores_heading() {
        let mut b = Branch::new(Point::ZERO, FRAC_PI_2);
        b.add_absolute_polar(Polar::new(2.0, 0.0), 1);
        assert!(b.tip_point().approx_eq(Point::new(2.0, 0.0)));
        b.add_point(Point::new(0.0, 1.0), 1);
        assert!(b.tip_point().approx_eq(Point::new(2.0, 1.0)));
    }

    #[test]
    fn average_step_needs_a_segment() {
        assert!(Branch::new(Point::ZERO, 0.0).average_step().is_err());
        let b = straight(4, 0.25);
        assert!((b.average_step().unwrap() - 0.25).abs() < EPS);
        assert!(b.vertex(4).is_ok());
        assert!(b.vertex(5).is_err());
    }

    #[test]
    fn source_vertex_cannot_be_removed() {
        let mut b = straight(1, 0.1);
        b.remove_tip_point().unwrap();
        assert_eq!(b.remove_tip_point(), Err(DeltaError::LastPoint));
        assert_eq!(b.vertex_count(), 1);
    }

    #[test]
    fn vector_index_is_checked() {
        let b = straight(2, 0.5);
        assert!(b.vector(1).unwrap().approx_eq(Point::new(0.0, 0.5)));
        assert!(b.vector(0).is_err());
        assert!(b.vector(3).is_err());
    }

    #[test]
    fn shrink_by_full_length_leaves_source() {
        let mut b = straight(5, 0.1);
        b.shrink(b.length()).unwrap();
        assert_eq!(b.vertex_count(), 1);
        assert_eq!(b.source_point(), Point::ZERO);

        b.shrink(1.0).unwrap();
        assert_eq!(b.vertex_count(), 1);
    }

    #[test]
    fn shrink_cuts_partial_segment_and_keeps_tag() {
        let mut b = Branch::new(Point::ZERO, 0.0);
        b.add_polar(Polar::new(1.0, 0.0), 3).unwrap();
        b.add_polar(Polar::new(1.0, FRAC_PI_4), 4).unwrap();

        b.shrink(0.25).unwrap();
        assert_eq!(b.vertex_count(), 3);
        assert!((b.length() - 1.75).abs() < 1e-9);
        assert_eq!(b.tip_tag(), Some(4));
        assert!((b.tip_angle().unwrap() - FRAC_PI_4).abs() < 1e-9);
    }

    #[test]
    fn shrink_snaps_to_vertex() {
        let mut b = straight(3, 1.0);
        b.shrink(1.0 + 5e-6).unwrap();
        assert_eq!(b.vertex_count(), 3);
        assert!((b.length() - 2.0).abs() < EPS);
    }

    #[test]
    fn shrink_by_zero_changes_nothing() {
        let mut b = straight(3, 0.1);
        let before = b.clone();
        b.shrink(0.0).unwrap();
        assert_eq!(b, before);

        let mut bare = Branch::new(Point::ZERO, 0.0);
        bare.shrink(0.0).unwrap();
        assert_eq!(bare, Branch::new(Point::ZERO, 0.0));
    }

    #[test]
    fn deserialization_checks_vertex_and_edge_counts() {
        let b = straight(2, 0.5);
        let json = serde_json::to_string(&b).unwrap();
        assert_eq!(serde_json::from_str::<Branch>(&json).unwrap(), b);

        let empty = r#"{"source_angle":0.0,"vertices":[],"edges":[]}"#;
        assert!(serde_json::from_str::<Branch>(empty).is_err());

        let dangling = r#"{"source_angle":0.0,"vertices":[[0.0,0.0]],"edges":[{"start":0,"end":1,"tag":1}]}"#;
        assert!(serde_json::from_str::<Branch>(dangling).is_err());

        let skipped = r#"{"source_angle":0.0,"vertices":[[0.0,0.0],[1.0,0.0]],"edges":[{"start":0,"end":5,"tag":1}]}"#;
        assert!(serde_json::from_str::<Branch>(skipped).is_err());
    }

    #[test]
    fn flatten_tip_removes_zig_zag() {
        let mut b = Branch::new(Point::ZERO, FRAC_PI_2);
        b.add_absolute_point(Point::new(0.1, 1.0), 1);
        b.add_absolute_point(Point::new(0.0, 2.0), 1);

        assert!((b.tip_curvature_distance().unwrap() - 0.1).abs() < 1e-12);
        b.flatten_tip().unwrap();
        assert!(b.vertex(1).unwrap().approx_eq(Point::new(0.0, 1.0)));
        assert!(b.tip_curvature_distance().unwrap() < EPS);

        let mut short = straight(1, 0.1);
        assert_eq!(short.tip_curvature_distance(), None);
        assert!(short.flatten_tip().is_err());
    }

    #[test]
    fn smoothing_a_straight_branch_keeps_endpoints() {
        let b = straight(10, 0.1);
        let s = b.smoothed(5.0, 0.0).unwrap();
        assert_eq!(s.vertex_count(), 2);
        assert_eq!(s.source_point(), b.source_point());
        assert!(s.tip_point().approx_eq(b.tip_point()));
        assert!((s.length() - b.length()).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn vertices_exceed_edges_by_one(
            steps in proptest::collection::vec((0.001f64..1.0, -1.0f64..1.0), 0..40)
        ) {
            let mut b = Branch::new(Point::new(0.3, 0.0), FRAC_PI_2);
            let mut expected = 0.0;
            for (r, phi) in steps {
                b.add_polar(Polar::new(r, phi), 1).unwrap();
                expected += r;
                prop_assert_eq!(b.vertex_count(), b.edges().len() + 1);
            }
            prop_assert!((b.length() - expected).abs() < 1e-9);
        }

        #[test]
        fn shrink_removes_requested_length(
            steps in proptest::collection::vec(0.01f64..1.0, 1..20),
            fraction in 0.0f64..1.5,
        ) {
            let mut b = Branch::new(Point::ZERO, 0.0);
            for r in &steps {
                b.add_polar(Polar::new(*r, 0.3), 1).unwrap();
            }
            let before = b.length();
            b.shrink(before * fraction).unwrap();

            prop_assert!(b.vertex_count() >= 1);
            prop_assert_eq!(b.vertex_count(), b.edges().len() + 1);
            let expected = (before * (1.0 - fraction)).max(0.0);
            prop_assert!((b.length() - expected).abs() < 1e-4);
        }
    }
}
