//! Closed polygons with tagged edges, and the splicing primitives used to
//! fuse branch ribbons into them.

use serde::{Deserialize, Serialize};

use crate::{
    error::{DeltaError, DeltaResult},
    geometry::{EPS, Point, PointExt},
    types::{Tag, VertexPos},
};

/// Edge between two vertex positions, carrying a boundary-condition tag.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub start: VertexPos,
    pub end: VertexPos,
    pub tag: Tag,
}

impl Edge {
    pub const fn new(start: VertexPos, end: VertexPos, tag: Tag) -> Self {
        Self { start, end, tag }
    }
}

/// A single polygon: vertices, tagged edges and hole markers.
///
/// When used as a region boundary it is a closed loop and
/// `edges.len() == vertices.len()`. Ribbon fragments spliced into it are
/// open polylines with one edge fewer than vertices.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SimpleBoundary {
    pub vertices: Vec<Point>,
    pub edges: Vec<Edge>,
    /// Points strictly inside holes, handed to the mesher.
    pub holes: Vec<Point>,
    /// `true` for an inner (hole) boundary, `false` for the outer one.
    pub inner: bool,
    pub name: String,
}

impl SimpleBoundary {
    pub fn new(vertices: Vec<Point>, edges: Vec<Edge>) -> Self {
        Self {
            vertices,
            edges,
            ..Self::default()
        }
    }

    /// Builds a closed loop where edge `i` joins vertex `i` to vertex
    /// `i + 1` (wrapping to 0) and carries `tags[i]`.
    ///
    /// ### Errors
    /// [`DeltaError::LengthMismatch`] when `tags` and `vertices` differ in length.
    pub fn closed_loop(vertices: Vec<Point>, tags: &[Tag]) -> DeltaResult<Self> {
        if vertices.len() != tags.len() {
            return Err(DeltaError::LengthMismatch {
                context: "closed_loop",
                left: vertices.len(),
                right: tags.len(),
            });
        }
        let n = vertices.len();
        let edges = tags
            .iter()
            .enumerate()
            .map(|(i, &tag)| Edge::new(i, (i + 1) % n, tag))
            .collect();
        Ok(Self::new(vertices, edges))
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_holes(mut self, holes: Vec<Point>) -> Self {
        self.holes = holes;
        self
    }

    pub fn inner(mut self, inner: bool) -> Self {
        self.inner = inner;
        self
    }

    /// Concatenates `other` onto the end of `self`.
    ///
    /// `other`'s edge endpoints are shifted by the vertex count `self` had
    /// before the call; holes are concatenated as well.
    pub fn append(&mut self, other: &SimpleBoundary) {
        let offset = self.vertices.len();
        self.vertices.extend_from_slice(&other.vertices);
        self.edges.extend(
            other
                .edges
                .iter()
                .map(|e| Edge::new(e.start + offset, e.end + offset, e.tag)),
        );
        self.holes.extend_from_slice(&other.holes);
    }

    /// Replaces the vertex at `pos` with all vertices of `fragment`.
    ///
    /// Existing edges are re-indexed so that the edge entering `pos` now
    /// enters the first inserted vertex and the edge leaving `pos` now
    /// leaves the last one. With `k` inserted vertices each edge gets
    /// exactly one of:
    ///
    /// 1. `start >= pos && end > pos` - both endpoints shift by `k - 1`;
    /// 2. `start < pos && end > pos` - only `end` shifts;
    /// 3. `start >= pos && end <= pos` (the wrap-around closing edge) -
    ///    only `start` shifts.
    ///
    /// `fragment`'s own edges are inserted at edge index `pos` with their
    /// endpoints offset by `pos`. An empty fragment leaves `self` untouched.
    ///
    /// ### Errors
    /// [`DeltaError::IndexOutOfRange`] if `pos` does not name a vertex.
    pub fn replace_element(&mut self, pos: VertexPos, fragment: &SimpleBoundary) -> DeltaResult<()> {
        if fragment.vertices.is_empty() {
            return Ok(());
        }
        let len = self.vertices.len();
        if (len == 0 && pos != 0) || (len > 0 && pos >= len) {
            return Err(DeltaError::IndexOutOfRange {
                context: "replace_element",
                index: pos,
                len,
            });
        }

        if len > 0 {
            self.vertices.remove(pos);
        }
        self.vertices
            .splice(pos..pos, fragment.vertices.iter().copied());

        let shift = fragment.vertices.len() - 1;
        for e in &mut self.edges {
            if e.start >= pos && e.end > pos {
                e.start += shift;
                e.end += shift;
            } else if e.start < pos && e.end > pos {
                e.end += shift;
            } else if e.start >= pos && e.end <= pos {
                e.start += shift;
            }
        }

        let at = pos.min(self.edges.len());
        self.edges.splice(
            at..at,
            fragment
                .edges
                .iter()
                .map(|e| Edge::new(e.start + pos, e.end + pos, e.tag)),
        );
        self.holes.extend_from_slice(&fragment.holes);
        Ok(())
    }

    /// Rewrites edges as a consecutive chain `(0,1), (1,2), ...`, keeping
    /// the existing tags in order. A `closed` chain gets one edge per
    /// vertex, the last one returning to vertex 0.
    pub fn fix_edge_indices(&mut self, closed: bool) {
        let n = self.vertices.len();
        if n == 0 {
            self.edges.clear();
            return;
        }
        let count = if closed { n } else { n - 1 };
        let tag_at = |i: usize, edges: &[Edge]| edges.get(i).or(edges.last()).map_or(0, |e| e.tag);
        self.edges = (0..count)
            .map(|i| Edge::new(i, (i + 1) % n, tag_at(i, &self.edges)))
            .collect();
    }

    /// Checks that every vertex has exactly one incoming and one outgoing
    /// edge, i.e. the edges form one or more closed loops.
    ///
    /// ### Errors
    /// [`DeltaError::VertexEdgeMismatch`] on differing counts and
    /// [`DeltaError::OpenLoop`] when the edges do not close up.
    pub fn check_closed(&self) -> DeltaResult<()> {
        let n = self.vertices.len();
        if n != self.edges.len() {
            return Err(DeltaError::VertexEdgeMismatch {
                context: format!("boundary '{}'", self.name),
                vertices: n,
                edges: self.edges.len(),
            });
        }
        let mut incoming = vec![0u8; n];
        let mut outgoing = vec![0u8; n];
        for e in &self.edges {
            if e.start >= n || e.end >= n {
                return Err(DeltaError::OpenLoop(self.name.clone()));
            }
            outgoing[e.start] += 1;
            incoming[e.end] += 1;
        }
        if incoming.iter().chain(&outgoing).any(|&c| c != 1) {
            return Err(DeltaError::OpenLoop(self.name.clone()));
        }
        Ok(())
    }

    /// Coarsens the polyline by dropping vertices whose accumulated turning
    /// angle stays under `min_degree` degrees.
    ///
    /// Walks from the last vertex toward the first. A vertex is kept once
    /// the turning accumulated since the previously kept vertex reaches
    /// `min_degree`, or while the walked distance from the end is still
    /// within `ignored_distance`. First and last vertices are always kept.
    /// Returns an unchanged copy when `min_degree` is zero or there are at
    /// most four vertices.
    ///
    /// ### Errors
    /// [`DeltaError::InvalidParameter`] for negative parameters and
    /// [`DeltaError::ZeroLength`] if two consecutive vertices coincide.
    pub fn smoothed(&self, min_degree: f64, ignored_distance: f64) -> DeltaResult<SimpleBoundary> {
        if ignored_distance < 0.0 {
            return Err(DeltaError::InvalidParameter {
                name: "ignored_distance",
                value: ignored_distance,
                reason: "must be non-negative",
            });
        }
        if min_degree.abs() < EPS || self.vertices.len() <= 4 || self.edges.is_empty() {
            return Ok(self.clone());
        }
        if min_degree < 0.0 {
            return Err(DeltaError::InvalidParameter {
                name: "min_degree",
                value: min_degree,
                reason: "must be non-negative",
            });
        }

        let v = &self.vertices;
        let n = v.len();
        let closed = self.edges.last().is_some_and(|e| e.end == 0);
        let tag_of = |i: usize| self.edges.get(i).map_or(0, |e| e.tag);

        let mut vertices = vec![v[n - 1]];
        let mut edges = vec![*self.edges.last().unwrap_or(&Edge::default())];

        let mut accum_degree = 0.0;
        let mut accum_ds = 0.0;
        for i in (1..n - 1).rev() {
            let v1 = v[i] - v[i + 1];
            let v2 = v[i - 1] - v[i];
            accum_degree += v1.turn_to(v2)?.to_degrees();
            accum_ds += v1.length();

            if accum_degree.abs() >= min_degree - EPS || accum_ds <= ignored_distance {
                accum_degree = 0.0;
                vertices.push(v[i]);
                edges.push(Edge::new(0, 0, tag_of(i)));
            }
        }

        vertices.push(v[0]);
        edges.push(Edge::new(0, 0, tag_of(0)));

        vertices.reverse();
        edges.reverse();

        let mut smooth = SimpleBoundary {
            vertices,
            edges,
            holes: self.holes.clone(),
            inner: self.inner,
            name: self.name.clone(),
        };
        smooth.fix_edge_indices(closed);
        Ok(smooth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pentagon() -> SimpleBoundary {
        SimpleBoundary::closed_loop(
            vec![
                Point::new(0.0, 0.0),
                Point::new(0.5, 0.0),
                Point::new(1.0, 0.0),
                Point::new(1.0, 1.0),
                Point::new(0.0, 1.0),
            ],
            &[1, 2, 3, 4, 5],
        )
        .unwrap()
    }

    fn fragment(k: usize, tag: Tag) -> SimpleBoundary {
        let vertices = (0..k).map(|i| Point::new(10.0 + i as f64, 0.0)).collect();
        let edges = (0..k.saturating_sub(1))
            .map(|i| Edge::new(i, i + 1, tag))
            .collect();
        SimpleBoundary::new(vertices, edges)
    }

    fn edge_triples(b: &SimpleBoundary) -> Vec<(usize, usize, Tag)> {
        b.edges.iter().map(|e| (e.start, e.end, e.tag)).collect()
    }

    #[test]
    fn closed_loop_wraps_last_edge() {
        let b = pentagon();
        assert_eq!(
            edge_triples(&b),
            vec![(0, 1, 1), (1, 2, 2), (2, 3, 3), (3, 4, 4), (4, 0, 5)]
        );
        assert!(b.check_closed().is_ok());
    }

    #[test]
    fn closed_loop_rejects_mismatched_tags() {
        let err = SimpleBoundary::closed_loop(vec![Point::ZERO; 3], &[1, 2]).unwrap_err();
        assert!(matches!(err, DeltaError::LengthMismatch { .. }));
    }

    #[test]
    fn replace_element_in_the_middle() {
        let mut b = pentagon();
        b.replace_element(1, &fragment(4, 0)).unwrap();

        assert_eq!(b.vertices.len(), 8);
        assert_eq!(
            edge_triples(&b),
            vec![
                (0, 1, 1),
                (1, 2, 0),
                (2, 3, 0),
                (3, 4, 0),
                (4, 5, 2),
                (5, 6, 3),
                (6, 7, 4),
                (7, 0, 5)
            ]
        );
        assert_eq!(b.vertices[1], Point::new(10.0, 0.0));
        assert_eq!(b.vertices[5], Point::new(1.0, 0.0));
        assert!(b.check_closed().is_ok());
    }

    #[test]
    fn replace_element_at_first_vertex() {
        let mut b = pentagon();
        b.replace_element(0, &fragment(3, 9)).unwrap();

        assert_eq!(b.vertices.len(), 7);
        assert_eq!(
            edge_triples(&b),
            vec![
                (0, 1, 9),
                (1, 2, 9),
                (2, 3, 1),
                (3, 4, 2),
                (4, 5, 3),
                (5, 6, 4),
                (6, 0, 5)
            ]
        );
        assert!(b.check_closed().is_ok());
    }

    #[test]
    fn replace_element_at_last_vertex() {
        let mut b = pentagon();
        b.replace_element(4, &fragment(3, 9)).unwrap();

        assert_eq!(b.vertices.len(), 7);
        assert_eq!(
            edge_triples(&b),
            vec![
                (0, 1, 1),
                (1, 2, 2),
                (2, 3, 3),
                (3, 4, 4),
                (4, 5, 9),
                (5, 6, 9),
                (6, 0, 5)
            ]
        );
        assert!(b.check_closed().is_ok());
    }

    #[test]
    fn replace_element_with_single_vertex_keeps_indices() {
        let mut b = pentagon();
        let original = b.clone();
        b.replace_element(2, &fragment(1, 7)).unwrap();

        assert_eq!(b.edges, original.edges);
        assert_eq!(b.vertices[2], Point::new(10.0, 0.0));
    }

    #[test]
    fn replace_element_with_empty_fragment_is_noop() {
        let mut b = pentagon();
        let original = b.clone();
        b.replace_element(3, &SimpleBoundary::default()).unwrap();
        assert_eq!(b, original);
    }

    #[test]
    fn replace_element_out_of_range_fails() {
        let mut b = pentagon();
        let err = b.replace_element(5, &fragment(2, 0)).unwrap_err();
        assert_eq!(
            err,
            DeltaError::IndexOutOfRange {
                context: "replace_element",
                index: 5,
                len: 5
            }
        );
    }

    #[test]
    fn append_shifts_edges_and_collects_holes() {
        let mut a = pentagon();
        let hole = SimpleBoundary::closed_loop(
            vec![
                Point::new(0.25, 0.25),
                Point::new(0.75, 0.25),
                Point::new(0.75, 0.75),
            ],
            &[6, 7, 8],
        )
        .unwrap()
        .with_holes(vec![Point::new(0.5, 0.4)]);

        a.append(&hole);

        assert_eq!(a.vertices.len(), 8);
        assert_eq!(&edge_triples(&a)[5..], &[(5, 6, 6), (6, 7, 7), (7, 5, 8)]);
        assert_eq!(a.holes, vec![Point::new(0.5, 0.4)]);
        assert!(a.check_closed().is_ok());
    }

    #[test]
    fn check_closed_detects_broken_chain() {
        let mut b = pentagon();
        b.edges[4].end = 1;
        assert!(matches!(b.check_closed(), Err(DeltaError::OpenLoop(_))));

        b.edges.pop();
        assert!(matches!(
            b.check_closed(),
            Err(DeltaError::VertexEdgeMismatch { .. })
        ));
    }

    #[test]
    fn fix_edge_indices_open_and_closed() {
        let mut b = SimpleBoundary::new(
            vec![Point::ZERO, Point::X, Point::ONE],
            vec![Edge::new(7, 3, 11), Edge::new(9, 9, 12)],
        );
        b.fix_edge_indices(false);
        assert_eq!(edge_triples(&b), vec![(0, 1, 11), (1, 2, 12)]);

        b.fix_edge_indices(true);
        assert_eq!(edge_triples(&b), vec![(0, 1, 11), (1, 2, 12), (2, 0, 12)]);
    }

    #[test]
    fn smoothing_is_identity_for_zero_degree() {
        let b = pentagon();
        assert_eq!(b.smoothed(0.0, 0.01).unwrap(), b);
    }

    #[test]
    fn smoothing_drops_collinear_vertices() {
        let vertices: Vec<Point> = (0..8).map(|i| Point::new(0.0, i as f64)).collect();
        let edges = (0..7).map(|i| Edge::new(i, i + 1, 100)).collect();
        let line = SimpleBoundary::new(vertices, edges);

        let smooth = line.smoothed(10.0, 0.0).unwrap();
        assert_eq!(smooth.vertices, vec![Point::new(0.0, 0.0), Point::new(0.0, 7.0)]);
        assert_eq!(edge_triples(&smooth), vec![(0, 1, 100)]);
    }

    #[test]
    fn smoothing_keeps_vertices_near_the_end() {
        let vertices: Vec<Point> = (0..8).map(|i| Point::new(0.0, i as f64)).collect();
        let edges = (0..7).map(|i| Edge::new(i, i + 1, 100)).collect();
        let line = SimpleBoundary::new(vertices, edges);

        let smooth = line.smoothed(10.0, 2.5).unwrap();
        assert_eq!(
            smooth.vertices,
            vec![
                Point::new(0.0, 0.0),
                Point::new(0.0, 5.0),
                Point::new(0.0, 6.0),
                Point::new(0.0, 7.0)
            ]
        );
        assert_eq!(smooth.edges.len(), 3);
    }

    #[test]
    fn smoothing_rejects_negative_parameters() {
        let b = pentagon();
        assert!(b.smoothed(1.0, -1.0).is_err());
        let long = SimpleBoundary::new(
            (0..6).map(|i| Point::new(i as f64, (i % 2) as f64)).collect(),
            (0..5).map(|i| Edge::new(i, i + 1, 0)).collect(),
        );
        assert!(long.smoothed(-5.0, 0.0).is_err());
    }
}
