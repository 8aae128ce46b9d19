//! Fuses the tree into the region: every source anchor vertex is replaced
//! by the two-sided ribbon of its branch (and, recursively, of everything
//! grown from it), then all named boundaries are joined into one closed
//! polygon for the mesher.

use std::f64::consts::FRAC_PI_2;

use crate::{
    boundary::{Edge, SimpleBoundary},
    config::Config,
    error::{DeltaError, DeltaResult},
    geometry::{Point, PointExt, Polar},
    region::{Region, Sources},
    tree::Tree,
    types::{BranchId, Tag, VertexPos},
};

/// Relative amount trimmed from both ends of a segment before an
/// intersection test, so shared endpoints do not count.
const END_TRIM: f64 = 5e-6;

/// Parameters of ribbon construction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RibbonParams {
    /// Full width of a river branch; each side is offset by half of it.
    pub river_width: f64,
    /// Tag used for ribbon edges of a branch that has no edges yet.
    pub river_tag: Tag,
    /// Branches are coarsened with [`crate::branch::Branch::smoothed`]
    /// when this is positive.
    pub smoothness_degree: f64,
    pub ignored_smoothness_length: f64,
}

impl Default for RibbonParams {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for RibbonParams {
    fn from(cfg: &Config) -> Self {
        Self {
            river_width: cfg.river_width,
            river_tag: cfg.river_tag,
            smoothness_degree: cfg.smoothness_degree,
            ignored_smoothness_length: cfg.ignored_smoothness_length,
        }
    }
}

/// Ribbon of branch `id` and all its descendants as an open polyline.
///
/// The fragment starts on the left bank at the branch source, runs up to
/// the tip (or around every child), and comes back down the right bank.
/// At a fork the left child's last right-bank vertex is dropped, so the
/// right child's first left-bank vertex is the single joint between the
/// two. A branch that has not grown yet yields its source point alone.
pub fn branch_ribbon(tree: &Tree, id: BranchId, params: &RibbonParams) -> DeltaResult<SimpleBoundary> {
    let mut tagged = Vec::new();
    push_ribbon(tree, id, params, &mut tagged)?;

    let vertices: Vec<Point> = tagged.iter().map(|&(p, _)| p).collect();
    // each vertex carries the tag of the edge that enters it
    let edges = tagged
        .iter()
        .enumerate()
        .skip(1)
        .map(|(i, &(_, tag))| Edge::new(i - 1, i, tag))
        .collect();
    Ok(SimpleBoundary::new(vertices, edges))
}

fn push_ribbon(
    tree: &Tree,
    id: BranchId,
    params: &RibbonParams,
    out: &mut Vec<(Point, Tag)>,
) -> DeltaResult<()> {
    let stored = tree.branch(id)?;
    let smoothed;
    let branch = if params.smoothness_degree > 0.0 {
        smoothed = stored.smoothed(params.smoothness_degree, params.ignored_smoothness_length)?;
        &smoothed
    } else {
        stored
    };

    let vertices = branch.vertices();
    let n = vertices.len();
    let half = params.river_width / 2.0;
    let tag = |i: usize| branch.edges().get(i).map_or(params.river_tag, |e| e.tag);

    let mut left = Vec::with_capacity(n);
    let mut right = Vec::with_capacity(n);
    for i in 0..n {
        let (l, r) = if i == 0 {
            let phi = branch.source_angle();
            (
                vertices[0] + Polar::new(half, phi + FRAC_PI_2).to_point(),
                vertices[0] + Polar::new(half, phi - FRAC_PI_2).to_point(),
            )
        } else {
            let dir = branch.vector(i)?.unit()?;
            (
                vertices[i] + dir.rotated(FRAC_PI_2) * half,
                vertices[i] + dir.rotated(-FRAC_PI_2) * half,
            )
        };
        left.push((l, tag(i.saturating_sub(1))));
        right.push((r, tag(i)));
    }

    out.extend_from_slice(&left[..n - 1]);
    if tree.has_sub_branches(id)? {
        let (left_id, right_id) = tree.sub_branch_ids(id)?;
        push_ribbon(tree, left_id, params, out)?;
        // the inner banks meet in the fork; keep only the right child's
        // first vertex there
        out.pop();
        push_ribbon(tree, right_id, params, out)?;
    } else {
        out.push((vertices[n - 1], tag(n.saturating_sub(2))));
    }
    out.extend(right[..n - 1].iter().rev());
    Ok(())
}

/// Builds the combined, mesh-ready boundary.
///
/// Named boundaries are processed in id order. Each anchor on a boundary
/// has its vertex replaced by [`branch_ribbon`]; anchors further along the
/// same boundary move forward by the number of vertices added. Every
/// spliced boundary must still close back onto its first vertex before it
/// is appended to the result.
///
/// ### Errors
/// - [`DeltaError::EmptyTree`] if an anchor exists but the tree is empty.
/// - [`DeltaError::MissingBranch`] / [`DeltaError::MissingBoundary`] for
///   anchors naming unknown branches or boundaries.
/// - [`DeltaError::OpenLoop`] / [`DeltaError::VertexEdgeMismatch`] if the
///   result is not a set of closed loops.
pub fn generate_boundary(
    region: &Region,
    sources: &Sources,
    tree: &Tree,
    params: &RibbonParams,
) -> DeltaResult<SimpleBoundary> {
    for &(boundary_id, _) in sources.values() {
        region.boundary(boundary_id)?;
    }
    if !sources.is_empty() && tree.is_empty() {
        return Err(DeltaError::EmptyTree("generate_boundary"));
    }

    let mut combined = SimpleBoundary::default();
    for (boundary_id, named) in region.iter() {
        let mut boundary = named.clone();
        let mut anchors: Vec<(BranchId, VertexPos)> = sources
            .iter()
            .filter(|(_, (b, _))| *b == boundary_id)
            .map(|(&id, &(_, pos))| (id, pos))
            .collect();

        for i in 0..anchors.len() {
            let (id, pos) = anchors[i];
            let ribbon = branch_ribbon(tree, id, params)?;
            boundary.replace_element(pos, &ribbon)?;

            let added = ribbon.vertices.len().saturating_sub(1);
            if added > 0 {
                for (_, other) in anchors.iter_mut().skip(i + 1) {
                    if *other > pos {
                        *other += added;
                    }
                }
            }
        }

        if !anchors.is_empty() {
            if boundary.edges.last().is_some_and(|e| e.end != 0) {
                return Err(DeltaError::OpenLoop(boundary.name.clone()));
            }
            boundary.check_closed()?;
        }
        combined.append(&boundary);
    }

    if combined.vertices.len() != combined.edges.len() {
        return Err(DeltaError::VertexEdgeMismatch {
            context: "generated boundary".to_string(),
            vertices: combined.vertices.len(),
            edges: combined.edges.len(),
        });
    }
    log::debug!(
        "generated boundary: {} vertices, {} holes",
        combined.vertices.len(),
        combined.holes.len()
    );
    Ok(combined)
}

/// Whether segments `p1-q1` and `p2-q2` cross.
///
/// Both segments are shortened by a relative `5e-6` at each end first,
/// so segments that merely share an endpoint are not reported.
pub fn segments_intersect(p1: Point, q1: Point, p2: Point, q2: Point) -> bool {
    let (r1, r2) = (q1 - p1, q2 - p2);
    let (p1, q1) = (p1 + r1 * END_TRIM, q1 - r1 * END_TRIM);
    let (p2, q2) = (p2 + r2 * END_TRIM, q2 - r2 * END_TRIM);

    let o1 = orientation(p1, q1, p2);
    let o2 = orientation(p1, q1, q2);
    let o3 = orientation(p2, q2, p1);
    let o4 = orientation(p2, q2, q1);

    if o1 != o2 && o3 != o4 {
        return true;
    }
    (o1 == 0 && strictly_within(p1, p2, q1))
        || (o2 == 0 && strictly_within(p1, q2, q1))
        || (o3 == 0 && strictly_within(p2, p1, q2))
        || (o4 == 0 && strictly_within(p2, q1, q2))
}

/// `0` collinear, `1` clockwise, `2` counter-clockwise.
fn orientation(p: Point, q: Point, r: Point) -> u8 {
    let val = (q.y - p.y) * (r.x - q.x) - (q.x - p.x) * (r.y - q.y);
    if val == 0.0 {
        0
    } else if val > 0.0 {
        1
    } else {
        2
    }
}

/// `q` lies strictly inside the bounding box of `p-r`.
fn strictly_within(p: Point, q: Point, r: Point) -> bool {
    q.x < p.x.max(r.x) && q.x > p.x.min(r.x) && q.y < p.y.max(r.y) && q.y > p.y.min(r.y)
}

/// Number of (tip segment, boundary edge) pairs that cross. A tip segment
/// identical to a boundary edge is not counted.
pub fn count_boundary_intersections(region_boundary: &SimpleBoundary, tip_boundary: &SimpleBoundary) -> usize {
    let seg = |b: &SimpleBoundary, e: &Edge| (b.vertices[e.start], b.vertices[e.end]);
    tip_boundary
        .edges
        .iter()
        .map(|te| {
            let (p1, q1) = seg(tip_boundary, te);
            region_boundary
                .edges
                .iter()
                .filter(|be| {
                    let (p2, q2) = seg(region_boundary, be);
                    !(p1 == p2 && q1 == q2) && segments_intersect(p1, q1, p2, q2)
                })
                .count()
        })
        .sum()
}

fn distance_to_segment(a: Point, b: Point, p: Point) -> f64 {
    let ab = b - a;
    let len2 = ab.length_squared();
    if len2 == 0.0 {
        return (p - a).length();
    }
    let t = ((p - a).dot(ab) / len2).clamp(0.0, 1.0);
    (p - (a + ab * t)).length()
}

/// Shortest distance from `point` to any edge of `boundary`;
/// `f64::INFINITY` when the boundary has no edges.
pub fn distance_to_boundary(boundary: &SimpleBoundary, point: Point) -> f64 {
    boundary
        .edges
        .iter()
        .map(|e| distance_to_segment(boundary.vertices[e.start], boundary.vertices[e.end], point))
        .fold(f64::INFINITY, f64::min)
}

pub fn distance_from_points_to_boundary(boundary: &SimpleBoundary, points: &[Point]) -> f64 {
    points
        .iter()
        .map(|&p| distance_to_boundary(boundary, p))
        .fold(f64::INFINITY, f64::min)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{branch::Branch, geometry::EPS, tree::SourcePoints};
    use std::f64::consts::PI;

    fn params(width: f64) -> RibbonParams {
        RibbonParams {
            river_width: width,
            ..RibbonParams::default()
        }
    }

    fn rectangle_setup(source_x: f64) -> (Region, Sources, Tree) {
        let (region, sources) = Region::rectangular(1.0, 1.0, source_x).unwrap();
        let mut tree = Tree::new();
        tree.initialize(&region.source_points_and_angles(&sources).unwrap())
            .unwrap();
        (region, sources, tree)
    }

    #[test]
    fn ungrown_tree_reproduces_region() {
        let (region, sources, tree) = rectangle_setup(0.25);
        let out = generate_boundary(&region, &sources, &tree, &params(1e-3)).unwrap();

        assert_eq!(out.vertices.len(), region.vertex_count());
        assert_eq!(out.edges.len(), region.edge_count());
        assert_eq!(&out.vertices, &region.boundary(1).unwrap().vertices);
    }

    #[test]
    fn ungrown_tree_with_holes_reproduces_region() {
        let (region, sources) = Region::rectangular_with_hole(1.0, 1.0, 0.25).unwrap();
        let mut tree = Tree::new();
        tree.initialize(&region.source_points_and_angles(&sources).unwrap())
            .unwrap();

        let out = generate_boundary(&region, &sources, &tree, &params(1e-3)).unwrap();
        assert_eq!(out.vertices.len(), 13);
        assert_eq!(out.edges.len(), 13);
        assert_eq!(out.holes.len(), 2);
        out.check_closed().unwrap();
    }

    #[test]
    fn single_step_becomes_three_vertices() {
        let eps = 1e-3;
        let (region, sources, mut tree) = rectangle_setup(0.5);
        tree.branch_mut(1)
            .unwrap()
            .add_polar(Polar::new(0.1, 0.0), 100)
            .unwrap();

        let out = generate_boundary(&region, &sources, &tree, &params(eps)).unwrap();

        assert_eq!(out.vertices.len(), 7);
        assert!(out.vertices[1].approx_eq(Point::new(0.5 - eps / 2.0, 0.0)));
        assert!(out.vertices[2].approx_eq(Point::new(0.5, 0.1)));
        assert!(out.vertices[3].approx_eq(Point::new(0.5 + eps / 2.0, 0.0)));
        assert_eq!(out.edges[0], Edge::new(0, 1, 1));
        assert_eq!(out.edges[1], Edge::new(1, 2, 100));
        assert_eq!(out.edges[2], Edge::new(2, 3, 100));
        assert_eq!(out.edges[3], Edge::new(3, 4, 2));
        assert_eq!(out.edges[6], Edge::new(6, 0, 5));
        out.check_closed().unwrap();
    }

    #[test]
    fn ribbon_of_straight_branch_has_parallel_banks() {
        let mut tree = Tree::new();
        tree.initialize(&SourcePoints::from([(1, (Point::ZERO, PI / 2.0))]))
            .unwrap();
        for _ in 0..3 {
            tree.branch_mut(1)
                .unwrap()
                .add_polar(Polar::new(1.0, 0.0), 7)
                .unwrap();
        }

        let ribbon = branch_ribbon(&tree, 1, &params(0.2)).unwrap();
        // 3 left + tip + 3 right
        assert_eq!(ribbon.vertices.len(), 7);
        assert_eq!(ribbon.edges.len(), 6);
        for (i, y) in [0.0, 1.0, 2.0].into_iter().enumerate() {
            assert!(ribbon.vertices[i].approx_eq(Point::new(-0.1, y)));
            assert!(ribbon.vertices[6 - i].approx_eq(Point::new(0.1, y)));
        }
        assert!(ribbon.vertices[3].approx_eq(Point::new(0.0, 3.0)));
        assert!(ribbon.edges.iter().all(|e| e.tag == 7));
    }

    #[test]
    fn ribbon_edges_follow_branch_tags() {
        let mut tree = Tree::new();
        tree.add_branch(Branch::new(Point::ZERO, PI / 2.0), 1).unwrap();
        let b = tree.branch_mut(1).unwrap();
        b.add_polar(Polar::new(1.0, 0.0), 10).unwrap();
        b.add_polar(Polar::new(1.0, 0.0), 20).unwrap();

        let ribbon = branch_ribbon(&tree, 1, &params(0.1)).unwrap();
        let tags: Vec<Tag> = ribbon.edges.iter().map(|e| e.tag).collect();
        assert_eq!(tags, vec![10, 20, 20, 10]);
    }

    #[test]
    fn bifurcation_wraps_both_children() {
        let width = 0.01;
        let mut tree = Tree::new();
        let (l, r) = tree.grow_test_tree(100, 1, 0.1, 2, 0.0).unwrap();
        let ribbon = branch_ribbon(&tree, 1, &params(width)).unwrap();

        // parent banks 2 + 2, children 5 each, one fork vertex dropped
        assert_eq!(ribbon.vertices.len(), 2 + 5 - 1 + 5 + 2);
        assert_eq!(ribbon.edges.len(), ribbon.vertices.len() - 1);

        let tips: Vec<Point> = [l, r]
            .iter()
            .map(|&id| tree.branch(id).unwrap().tip_point())
            .collect();
        assert!(tips.iter().all(|t| ribbon.vertices.contains(t)));

        let right = tree.branch(r).unwrap();
        let joint = right.source_point()
            + Polar::new(width / 2.0, right.source_angle() + PI / 2.0).to_point();
        assert!(ribbon.vertices[6].approx_eq(joint));
    }

    #[test]
    fn grown_tree_splices_into_closed_boundary() {
        let (region, sources, mut tree) = rectangle_setup(0.5);
        tree.branch_mut(1)
            .unwrap()
            .add_polar(Polar::new(0.1, 0.0), 100)
            .unwrap();
        let b = tree.branch(1).unwrap();
        let (tip, phi) = (b.tip_point(), b.tip_angle().unwrap());
        let (l, r) = tree
            .add_sub_branches(1, Branch::new(tip, phi + 0.5), Branch::new(tip, phi - 0.5))
            .unwrap();
        for _ in 0..3 {
            tree.add_polars(&[l, r], &[Polar::new(0.05, 0.0); 2], &[100, 100])
                .unwrap();
        }

        let out = generate_boundary(&region, &sources, &tree, &params(1e-3)).unwrap();
        out.check_closed().unwrap();
        assert_eq!(out.vertices.len(), 5 - 1 + 1 + 7 - 1 + 7 + 1);
        assert_eq!(out.edges.last().unwrap().end, 0);
        assert_eq!(count_boundary_intersections(&out, &tree.tip_boundary()), 0);
    }

    #[test]
    fn later_anchors_shift_after_splice() {
        let mut region = Region::new();
        region
            .add_boundary(
                1,
                SimpleBoundary::closed_loop(
                    vec![
                        Point::new(0.0, 0.0),
                        Point::new(0.25, 0.0),
                        Point::new(0.75, 0.0),
                        Point::new(1.0, 0.0),
                        Point::new(1.0, 1.0),
                        Point::new(0.0, 1.0),
                    ],
                    &[1, 2, 3, 4, 5, 6],
                )
                .unwrap(),
            )
            .unwrap();
        let sources = Sources::from([(1, (1, 1)), (2, (1, 2))]);
        let mut tree = Tree::new();
        tree.initialize(&region.source_points_and_angles(&sources).unwrap())
            .unwrap();
        tree.add_polars(&[1, 2], &[Polar::new(0.1, 0.0); 2], &[100, 100])
            .unwrap();

        let out = generate_boundary(&region, &sources, &tree, &params(1e-2)).unwrap();
        assert_eq!(out.vertices.len(), 10);
        assert!(out.vertices[2].approx_eq(Point::new(0.25, 0.1)));
        assert!(out.vertices[5].approx_eq(Point::new(0.75, 0.1)));
        out.check_closed().unwrap();
    }

    #[test]
    fn anchors_need_a_tree() {
        let (region, sources) = Region::rectangular(1.0, 1.0, 0.5).unwrap();
        assert_eq!(
            generate_boundary(&region, &sources, &Tree::new(), &params(1e-3)),
            Err(DeltaError::EmptyTree("generate_boundary"))
        );

        let mut tree = Tree::new();
        tree.add_branch(Branch::new(Point::ZERO, 0.0), 5).unwrap();
        assert_eq!(
            generate_boundary(&region, &sources, &tree, &params(1e-3)),
            Err(DeltaError::MissingBranch(1))
        );

        let stray = Sources::from([(5, (9, 0))]);
        assert_eq!(
            generate_boundary(&region, &stray, &tree, &params(1e-3)),
            Err(DeltaError::MissingBoundary(9))
        );
    }

    #[test]
    fn crossing_segments_are_detected() {
        let o = Point::ZERO;
        assert!(segments_intersect(o, Point::ONE, Point::new(0.0, 1.0), Point::new(1.0, 0.0)));
        assert!(!segments_intersect(o, Point::X, Point::new(0.0, 1.0), Point::ONE));
        // shared endpoint only
        assert!(!segments_intersect(o, Point::X, Point::X, Point::ONE));
        // collinear overlap
        assert!(segments_intersect(o, Point::splat(2.0), Point::ONE, Point::splat(3.0)));
    }

    #[test]
    fn tip_crossing_the_region_is_counted() {
        let (region, _) = Region::rectangular(1.0, 1.0, 0.5).unwrap();
        let outer = region.boundary(1).unwrap();
        let tip = SimpleBoundary::new(
            vec![Point::new(0.5, 0.9), Point::new(0.5, 1.1)],
            vec![Edge::new(0, 1, 100)],
        );
        assert_eq!(count_boundary_intersections(outer, &tip), 1);
    }

    #[test]
    fn distances_use_closest_edge() {
        let (region, _) = Region::rectangular(1.0, 1.0, 0.5).unwrap();
        let outer = region.boundary(1).unwrap();
        assert!((distance_to_boundary(outer, Point::new(0.5, 0.2)) - 0.2).abs() < EPS);
        assert!((distance_to_boundary(outer, Point::new(2.0, 0.5)) - 1.0).abs() < EPS);

        let points = [Point::new(0.5, 0.5), Point::new(0.9, 0.5)];
        assert!((distance_from_points_to_boundary(outer, &points) - 0.1).abs() < EPS);
        assert_eq!(
            distance_to_boundary(&SimpleBoundary::default(), Point::ZERO),
            f64::INFINITY
        );
    }
}
