//! Delaunay triangulation of a deduplicated 2D point cloud, with point
//! location for ground-elevation queries.

use std::collections::HashSet;

use tracing::info;

use crate::point::Point;
use crate::point_index::PointIndex;
use crate::primitives;
use crate::triangulate::{OTri, TriPool};

pub struct Delaunay {
    points: Vec<Point>,
    index: Option<PointIndex>,
    pool: TriPool,
    valid: Vec<i32>,
    point2tri: Vec<i32>,
}

impl Delaunay {
    /// Triangulate `points`. Duplicate (x, y) pairs are removed first; the
    /// point order is not preserved. `with_index` additionally builds the
    /// search index required by [`find_triangle`](Self::find_triangle).
    pub fn new(mut points: Vec<Point>, with_index: bool) -> Delaunay {
        assert!(points.len() >= 3);

        let before = points.len();
        points.sort_by(Point::lexcomp2);
        points.dedup_by(|p, q| Point::same2(p, q));
        info!("creating delaunay: {} -> {} point(s)", before, points.len());
        assert!(points.len() >= 2, "all points coincide");

        let mut delaunay = Delaunay {
            points,
            index: None,
            pool: TriPool::new(),
            valid: Vec::new(),
            point2tri: Vec::new(),
        };
        delaunay.triangulate();
        if with_index {
            delaunay.index = Some(PointIndex::build(&delaunay.points, false));
        }
        delaunay
    }

    fn triangulate(&mut self) {
        // Permute into recursion order: alternating axes, with subsets of
        // up to 3 vertices always sorted by x.
        let order = PointIndex::build(&self.points, true);
        let points: Vec<Point> = order.rank().iter().map(|&r| self.points[r]).collect();
        self.points = points;

        let n = self.points.len();
        let (_, hullright) = self.pool.divconq(&self.points, 0, n, true);
        self.finalize(hullright);
    }

    // Breadth-first walk over the adjacency graph collecting interior
    // triangles and one incident handle per vertex.
    fn finalize(&mut self, start: OTri) {
        self.valid.clear();
        self.point2tri.clear();
        self.point2tri.resize(self.points.len(), -1);

        let mut discovered: HashSet<i32> = HashSet::new();
        let mut queue = vec![start];

        while let Some(mut otri) = queue.pop() {
            if !discovered.insert(otri.tri) {
                continue;
            }

            let p1 = self.pool.org(otri);
            let p2 = self.pool.dest(otri);
            let p3 = self.pool.apex(otri);

            if p1 >= 0 && p2 >= 0 && p3 >= 0 {
                debug_assert!(
                    Point::det(
                        &self.points[p1 as usize],
                        &self.points[p2 as usize],
                        &self.points[p3 as usize],
                    ) > 0.0
                );

                self.valid.push(otri.encode());

                self.point2tri[p1 as usize] = otri.encode();
                otri.next();
                self.point2tri[p2 as usize] = otri.encode();
                otri.next();
                self.point2tri[p3 as usize] = otri.encode();
                otri.next();
            }

            queue.push(self.pool.sym(otri));
            otri.next();
            queue.push(self.pool.sym(otri));
            otri.next();
            queue.push(self.pool.sym(otri));
        }
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn pool(&self) -> &TriPool {
        &self.pool
    }

    /// Encoded O-tris of the interior triangles.
    pub fn valid_triangles(&self) -> &[i32] {
        &self.valid
    }

    pub fn triangle_count(&self) -> usize {
        self.valid.len()
    }

    /// Vertex index triples (org, dest, apex) of the interior triangles.
    pub fn triangles(&self) -> impl Iterator<Item = [i32; 3]> + '_ {
        self.valid.iter().map(|&enc| {
            let otri = OTri::decode(enc);
            [self.pool.org(otri), self.pool.dest(otri), self.pool.apex(otri)]
        })
    }

    /// Ground elevation under `query`: Some((x, y, interpolated z)) inside
    /// the hull, None outside.
    pub fn find_triangle_point(&self, query: &Point) -> Option<Point> {
        let otri = self.find_triangle(query);
        let p1 = self.pool.org(otri);
        let p2 = self.pool.dest(otri);
        let p3 = self.pool.apex(otri);

        if p1 >= 0 && p2 >= 0 && p3 >= 0 {
            let z = primitives::interpolate(
                query,
                &self.points[p1 as usize],
                &self.points[p2 as usize],
                &self.points[p3 as usize],
            );
            Some(Point::new(query.x, query.y, z))
        } else {
            None
        }
    }

    /// Walk from a search-index start towards `query`, crossing each edge
    /// that separates it from the start triangle's centroid. Lands on the
    /// containing triangle, or on a ghost when the query is outside the hull.
    pub fn find_triangle(&self, query: &Point) -> OTri {
        let index = self.index.as_ref().expect("delaunay built without index");
        let start = index.find(query);
        let encoded = self.point2tri[start];
        if encoded < 0 {
            // Fully degenerate triangulation: only ghosts exist.
            return OTri::new(0, 0);
        }
        let mut otri = OTri::decode(encoded);

        let center = self.triangle_center(otri);

        let mut started = false;
        loop {
            if !self.valid_triangle(otri) {
                break;
            }

            // Only the first step may go backwards over the entry edge.
            if !started && self.intersect_edge(query, &center, otri) {
                otri = self.pool.sym(otri);
                started = true;
                continue;
            }

            otri.next();
            if self.intersect_edge(query, &center, otri) {
                otri = self.pool.sym(otri);
                started = true;
                continue;
            }

            otri.next();
            if self.intersect_edge(query, &center, otri) {
                otri = self.pool.sym(otri);
                started = true;
                continue;
            }

            break;
        }

        otri
    }

    fn valid_triangle(&self, otri: OTri) -> bool {
        self.pool.org(otri) >= 0 && self.pool.dest(otri) >= 0 && self.pool.apex(otri) >= 0
    }

    fn triangle_center(&self, otri: OTri) -> Point {
        let p1 = self.pool.org(otri);
        let p2 = self.pool.dest(otri);
        let p3 = self.pool.apex(otri);
        (self.points[p1 as usize] + self.points[p2 as usize] + self.points[p3 as usize]) / 3.0
    }

    fn intersect_edge(&self, query: &Point, cursor: &Point, otri: OTri) -> bool {
        let e1 = self.pool.org(otri);
        let e2 = self.pool.dest(otri);
        primitives::inter_segments(
            query,
            cursor,
            &self.points[e1 as usize],
            &self.points[e2 as usize],
        )
    }

    /// Per-vertex normals: the average of the incident non-ghost face
    /// normals, normalized. `model_points` supplies the coordinates (the
    /// mesh builder passes model-frame positions) and must align with
    /// [`points`](Self::points).
    pub fn vertex_normals(&self, model_points: &[Point]) -> Vec<Point> {
        let face_normals = self.pool.face_normals(model_points);
        let mut normals = Vec::with_capacity(self.point2tri.len());

        for &enc in &self.point2tri {
            if enc < 0 {
                // Vertex of a fully degenerate region; no incident face.
                normals.push(Point::default());
                continue;
            }
            let otri = OTri::decode(enc);
            debug_assert!(self.pool.org(otri) >= 0);

            let mut normal = Point::default();
            let mut count = 0;

            let mut iter = otri;
            loop {
                let dest = self.pool.dest(iter);
                let apex = self.pool.apex(iter);
                // Skip faces touching the hull ghosts.
                if dest >= 0 && apex >= 0 {
                    normal += face_normals[iter.tri as usize];
                    count += 1;
                }

                iter = self.pool.sym(iter);
                iter.next();
                if iter == otri {
                    break;
                }
            }

            debug_assert!(count > 0);
            normal.normalize3();
            normals.push(normal);
        }
        normals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::triangulate::GHOST;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_cloud(n: usize, seed: u64) -> Vec<Point> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| {
                Point::new(
                    rng.gen_range(0.0..1.0),
                    rng.gen_range(0.0..1.0),
                    rng.gen_range(0.0..100.0),
                )
            })
            .collect()
    }

    #[test]
    fn three_points_ccw() {
        let points = vec![
            Point::new(0.0, 0.0, 10.0),
            Point::new(1.0, 0.0, 20.0),
            Point::new(0.0, 1.0, 30.0),
        ];
        let delaunay = Delaunay::new(points, true);
        assert_eq!(delaunay.triangle_count(), 1);

        let found = delaunay
            .find_triangle_point(&Point::new2(0.25, 0.25))
            .expect("query is inside the hull");
        assert_relative_eq!(found.z, 17.5, max_relative = 1e-12);
    }

    #[test]
    fn collinear_triple_has_no_ground() {
        let points = vec![
            Point::new2(0.0, 0.0),
            Point::new2(1.0, 0.0),
            Point::new2(2.0, 0.0),
        ];
        let delaunay = Delaunay::new(points, true);
        assert_eq!(delaunay.triangle_count(), 0);
        assert!(delaunay.find_triangle_point(&Point::new2(1.0, 1.0)).is_none());
    }

    #[test]
    fn duplicates_are_removed() {
        let points = vec![
            Point::new2(0.0, 0.0),
            Point::new2(0.0, 0.0),
            Point::new2(1.0, 0.0),
            Point::new2(0.0, 1.0),
        ];
        let delaunay = Delaunay::new(points, true);
        assert_eq!(delaunay.points().len(), 3);
        assert_eq!(delaunay.triangle_count(), 1);
        let found = delaunay
            .find_triangle_point(&Point::new2(0.25, 0.25))
            .expect("query is inside the hull");
        assert_relative_eq!(found.z, 0.0, max_relative = 1e-12);
    }

    #[test]
    fn all_interior_triangles_are_ccw() {
        let delaunay = Delaunay::new(random_cloud(200, 42), false);
        assert!(delaunay.triangle_count() > 0);
        for [a, b, c] in delaunay.triangles() {
            let det = Point::det(
                &delaunay.points()[a as usize],
                &delaunay.points()[b as usize],
                &delaunay.points()[c as usize],
            );
            assert!(det > 0.0);
        }
    }

    #[test]
    fn adjacency_is_symmetric() {
        let delaunay = Delaunay::new(random_cloud(150, 7), false);
        let pool = delaunay.pool();

        // Every triangle reachable from the interior set.
        let mut discovered = std::collections::HashSet::new();
        let mut queue: Vec<OTri> = delaunay
            .valid_triangles()
            .iter()
            .map(|&enc| OTri::decode(enc))
            .collect();
        while let Some(otri) = queue.pop() {
            if !discovered.insert(otri.tri) {
                continue;
            }
            for orient in 0..3 {
                let ot = OTri::new(otri.tri, orient);
                let neighbor = pool.sym(ot);
                assert_eq!(pool.sym(neighbor), ot, "adjacency must be symmetric");
                assert_eq!(pool.org(ot), pool.dest(neighbor));
                assert_eq!(pool.dest(ot), pool.org(neighbor));
                queue.push(neighbor);
            }
        }
    }

    #[test]
    fn delaunay_condition_holds() {
        let delaunay = Delaunay::new(random_cloud(120, 11), false);
        let pool = delaunay.pool();
        let points = delaunay.points();

        for &enc in delaunay.valid_triangles() {
            let otri = OTri::decode(enc);
            for orient in 0..3 {
                let ot = OTri::new(otri.tri, orient);
                let neighbor = pool.sym(ot);
                let d = pool.apex(neighbor);
                if d == GHOST {
                    continue;
                }
                let a = pool.org(ot);
                let b = pool.dest(ot);
                let c = pool.apex(ot);
                let v = Point::incircle(
                    &points[a as usize],
                    &points[b as usize],
                    &points[c as usize],
                    &points[d as usize],
                );
                assert!(v <= 1e-9, "edge ({}, {}) is not locally delaunay: {}", a, b, v);
            }
        }
    }

    #[test]
    fn point_location_matches_barycentric_containment() {
        let delaunay = Delaunay::new(random_cloud(300, 23), true);
        let points = delaunay.points();

        // Query the centroid of every interior triangle; the walk must land
        // on a triangle actually containing it.
        for [a, b, c] in delaunay.triangles() {
            let centroid = (points[a as usize] + points[b as usize] + points[c as usize]) / 3.0;
            let otri = delaunay.find_triangle(&centroid);
            let p1 = delaunay.pool().org(otri);
            let p2 = delaunay.pool().dest(otri);
            let p3 = delaunay.pool().apex(otri);
            assert!(p1 >= 0 && p2 >= 0 && p3 >= 0, "centroid must be inside the hull");
            let coeffs = crate::primitives::interpolate_coeffs(
                &centroid,
                &points[p1 as usize],
                &points[p2 as usize],
                &points[p3 as usize],
            );
            for w in [coeffs.x, coeffs.y, coeffs.z] {
                assert!(w >= -1e-9, "landing triangle does not contain the query");
            }
        }
    }

    #[test]
    fn queries_outside_the_hull_find_no_ground() {
        let delaunay = Delaunay::new(random_cloud(50, 31), true);
        for q in [
            Point::new2(5.0, 5.0),
            Point::new2(-4.0, 0.5),
            Point::new2(0.5, -3.0),
        ] {
            assert!(delaunay.find_triangle_point(&q).is_none());
        }
    }

    #[test]
    fn locate_on_edge() {
        // Query collinear with a triangle edge: the walk must still
        // terminate and report a containing triangle.
        let points = vec![
            Point::new(0.0, 0.0, 0.0),
            Point::new(2.0, 0.0, 4.0),
            Point::new(1.0, 2.0, 8.0),
            Point::new(1.0, -2.0, 8.0),
        ];
        let delaunay = Delaunay::new(points, true);
        let found = delaunay
            .find_triangle_point(&Point::new2(1.0, 0.0))
            .expect("point on the shared edge is inside the hull");
        assert_relative_eq!(found.z, 2.0, max_relative = 1e-9);
    }

    #[test]
    fn vertex_normals_of_a_flat_grid_point_up() {
        let mut points = Vec::new();
        for i in 0..5 {
            for j in 0..5 {
                points.push(Point::new(i as f64, j as f64, 3.0));
            }
        }
        let delaunay = Delaunay::new(points, false);
        let normals = delaunay.vertex_normals(delaunay.points());
        assert_eq!(normals.len(), delaunay.points().len());
        for n in normals {
            assert_relative_eq!(n.x, 0.0, epsilon = 1e-12);
            assert_relative_eq!(n.y, 0.0, epsilon = 1e-12);
            assert_relative_eq!(n.z.abs(), 1.0, epsilon = 1e-12);
        }
    }
}
