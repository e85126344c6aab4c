//! Oriented-triangle pool and divide-and-conquer Delaunay construction.
//!
//! Triangles live in a flat, append-only pool and are addressed by integer
//! handles; an [`OTri`] is one directed edge of a triangle, encoded as
//! `(tri << 2) | orient`. The convex hull is represented uniformly with
//! ghost triangles whose missing vertex is the [`GHOST`] sentinel.

use crate::point::Point;

/// Vertex index standing for the point at infinity.
pub const GHOST: i32 = -1;

/// A directed edge on a triangle: the pool index plus a rotation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OTri {
    pub tri: i32,
    pub orient: i32,
}

impl OTri {
    pub fn new(tri: i32, orient: i32) -> OTri {
        OTri { tri, orient }
    }

    pub fn next(&mut self) {
        self.orient = (self.orient + 1) % 3;
    }

    pub fn prev(&mut self) {
        self.orient = (self.orient + 2) % 3;
    }

    pub fn encode(self) -> i32 {
        (self.tri << 2) | self.orient
    }

    pub fn decode(val: i32) -> OTri {
        OTri {
            tri: val >> 2,
            orient: val & 3,
        }
    }
}

#[derive(Debug, Clone)]
struct Triangle {
    // Encoded neighbor O-tris, -1 when unset.
    n: [i32; 3],
    // Vertex indices, GHOST for the point at infinity.
    v: [i32; 3],
}

impl Default for Triangle {
    fn default() -> Triangle {
        Triangle {
            n: [-1; 3],
            v: [GHOST; 3],
        }
    }
}

fn ccw(points: &[Point], a: i32, b: i32, c: i32) -> f64 {
    Point::det(
        &points[a as usize],
        &points[b as usize],
        &points[c as usize],
    )
}

fn incircle(points: &[Point], a: i32, b: i32, c: i32, d: i32) -> f64 {
    Point::incircle(
        &points[a as usize],
        &points[b as usize],
        &points[c as usize],
        &points[d as usize],
    )
}

#[derive(Default)]
pub struct TriPool {
    pool: Vec<Triangle>,
}

impl TriPool {
    pub fn new() -> TriPool {
        TriPool::default()
    }

    pub fn len(&self) -> usize {
        self.pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    pub fn apex(&self, otri: OTri) -> i32 {
        self.pool[otri.tri as usize].v[otri.orient as usize]
    }

    pub fn org(&self, otri: OTri) -> i32 {
        self.pool[otri.tri as usize].v[((otri.orient + 1) % 3) as usize]
    }

    pub fn dest(&self, otri: OTri) -> i32 {
        self.pool[otri.tri as usize].v[((otri.orient + 2) % 3) as usize]
    }

    /// Cross to the adjacent triangle over the current directed edge.
    pub fn sym(&self, otri: OTri) -> OTri {
        OTri::decode(self.pool[otri.tri as usize].n[otri.orient as usize])
    }

    fn set_vertices(&mut self, otri: OTri, org: i32, dest: i32, apex: i32) {
        let tri = &mut self.pool[otri.tri as usize];
        tri.v[otri.orient as usize] = apex;
        tri.v[((otri.orient + 1) % 3) as usize] = org;
        tri.v[((otri.orient + 2) % 3) as usize] = dest;
    }

    fn set_org(&mut self, otri: OTri, vertex: i32) {
        self.pool[otri.tri as usize].v[((otri.orient + 1) % 3) as usize] = vertex;
    }

    fn set_dest(&mut self, otri: OTri, vertex: i32) {
        self.pool[otri.tri as usize].v[((otri.orient + 2) % 3) as usize] = vertex;
    }

    // Make two O-tris each other's neighbor over their current directed
    // edges; the edges must be opposite.
    fn bind(&mut self, otri1: OTri, otri2: OTri) {
        debug_assert!(
            self.org(otri1) == self.dest(otri2) && self.dest(otri1) == self.org(otri2)
        );
        self.pool[otri1.tri as usize].n[otri1.orient as usize] = otri2.encode();
        self.pool[otri2.tri as usize].n[otri2.orient as usize] = otri1.encode();
    }

    fn make_triangle(&mut self, org: i32, dest: i32, apex: i32) -> OTri {
        let otri = OTri::new(self.pool.len() as i32, 0);
        self.pool.push(Triangle::default());
        self.set_vertices(otri, org, dest, apex);
        otri
    }

    /// Triangulate `points[begin..end]` (already in recursion order) by
    /// divide-and-conquer; returns the far-left and far-right hull handles.
    pub fn divconq(
        &mut self,
        points: &[Point],
        begin: usize,
        end: usize,
        mut usex: bool,
    ) -> (OTri, OTri) {
        if end <= begin + 3 {
            usex = true;
        }

        let (farleft, farright) = if end == begin + 2 {
            self.edge(begin as i32)
        } else if end == begin + 3 {
            self.triangle(points, begin as i32)
        } else {
            let diff = (end - begin) / 2;
            let (farleft, innerleft) = self.divconq(points, begin, begin + diff, !usex);
            let (innerright, farright) = self.divconq(points, begin + diff, end, !usex);
            self.merge_hulls(points, usex, farleft, innerleft, innerright, farright)
        };

        debug_assert!(self.dest(farleft) < 0);
        debug_assert!(self.org(farright) < 0);
        (farleft, farright)
    }

    // Two points: a degenerate hull of two mutually bound ghost triangles.
    fn edge(&mut self, begin: i32) -> (OTri, OTri) {
        let mut farleft = self.make_triangle(begin, begin + 1, GHOST);
        let mut farright = self.make_triangle(begin + 1, begin, GHOST);

        self.bind(farleft, farright);
        farleft.prev();
        farright.next();

        self.bind(farleft, farright);
        farleft.prev();
        farright.next();

        self.bind(farleft, farright);
        farleft = farright;
        farleft.prev();
        (farleft, farright)
    }

    // Three points: one interior triangle ringed by ghosts, or a degenerate
    // chain when collinear.
    fn triangle(&mut self, points: &[Point], begin: i32) -> (OTri, OTri) {
        let area = ccw(points, begin, begin + 1, begin + 2);

        if area == 0.0 {
            // Collinear.
            let mut tri0 = self.make_triangle(begin, begin + 1, GHOST);
            let mut tri1 = self.make_triangle(begin + 1, begin, GHOST);
            let mut tri2 = self.make_triangle(begin + 2, begin + 1, GHOST);
            let mut tri3 = self.make_triangle(begin + 1, begin + 2, GHOST);

            self.bind(tri0, tri1);
            self.bind(tri2, tri3);

            tri0.next();
            tri1.prev();
            tri2.next();
            tri3.prev();
            self.bind(tri0, tri3);
            self.bind(tri1, tri2);

            tri0.next();
            tri1.prev();
            tri2.next();
            tri3.prev();
            self.bind(tri0, tri1);
            self.bind(tri2, tri3);

            (tri1, tri2)
        } else {
            let (midtri, mut tri1, mut tri2, mut tri3) = if area > 0.0 {
                let midtri = self.make_triangle(begin, begin + 1, begin + 2);
                let tri1 = self.make_triangle(begin + 1, begin, GHOST);
                let tri2 = self.make_triangle(begin + 2, begin + 1, GHOST);
                let tri3 = self.make_triangle(begin, begin + 2, GHOST);
                (midtri, tri1, tri2, tri3)
            } else {
                let midtri = self.make_triangle(begin, begin + 2, begin + 1);
                let tri1 = self.make_triangle(begin + 2, begin, GHOST);
                let tri2 = self.make_triangle(begin + 1, begin + 2, GHOST);
                let tri3 = self.make_triangle(begin, begin + 1, GHOST);
                (midtri, tri1, tri2, tri3)
            };

            let mut mid = midtri;
            self.bind(mid, tri1);
            mid.next();
            self.bind(mid, tri2);
            mid.next();
            self.bind(mid, tri3);

            tri1.prev();
            tri2.next();
            self.bind(tri1, tri2);

            tri1.prev();
            tri3.prev();
            self.bind(tri1, tri3);

            tri2.next();
            tri3.prev();
            self.bind(tri2, tri3);

            let farleft = tri1;
            let farright = if area > 0.0 {
                tri2
            } else {
                let mut fr = farleft;
                fr.next();
                fr
            };
            (farleft, farright)
        }
    }

    // Walk counter-clockwise around the hull.
    fn walk_ccw(
        &self,
        points: &[Point],
        otri: &mut OTri,
        pred: impl Fn(&Point, &Point) -> bool,
    ) {
        let mut org = self.org(*otri);
        let mut apex = self.apex(*otri);
        while pred(&points[apex as usize], &points[org as usize]) {
            otri.next();
            *otri = self.sym(*otri);
            org = apex;
            apex = self.apex(*otri);
        }
    }

    // Walk clockwise around the hull.
    fn walk_cw(
        &self,
        points: &[Point],
        otri: &mut OTri,
        pred: impl Fn(&Point, &Point) -> bool,
    ) {
        let mut dest = self.dest(*otri);
        let mut apex = self.apex(*otri);
        while pred(&points[apex as usize], &points[dest as usize]) {
            otri.prev();
            *otri = self.sym(*otri);
            dest = apex;
            apex = self.apex(*otri);
        }
    }

    // Shift the extremal hull handles from leftmost/rightmost to
    // topmost/bottommost before a horizontal-cut merge.
    fn prepare_horiz(
        &self,
        points: &[Point],
        farleft: &mut OTri,
        innerleft: &mut OTri,
        innerright: &mut OTri,
        farright: &mut OTri,
    ) {
        self.walk_ccw(points, farleft, |apex, org| apex.y < org.y);
        *farright = self.sym(*farright);
        self.walk_ccw(points, farright, |apex, org| apex.y > org.y);
        *farright = self.sym(*farright);

        *innerleft = self.sym(*innerleft);
        self.walk_ccw(points, innerleft, |apex, org| apex.y > org.y);
        *innerleft = self.sym(*innerleft);
        self.walk_ccw(points, innerright, |apex, org| apex.y < org.y);
    }

    // Restore the extremal handles to leftmost/rightmost after the merge.
    fn restore_horiz(&self, points: &[Point], farleft: &mut OTri, farright: &mut OTri) {
        *farleft = self.sym(*farleft);
        self.walk_cw(points, farleft, |apex, dest| apex.x < dest.x);
        *farleft = self.sym(*farleft);
        self.walk_cw(points, farright, |apex, dest| apex.x > dest.x);
    }

    // Flip edges below the left candidate until the seam edge is locally
    // Delaunay; advances `upperleft` to the new exposed vertex.
    fn knit_left(
        &mut self,
        points: &[Point],
        leftcand: &mut OTri,
        lowerleft: i32,
        lowerright: i32,
        upperleft: &mut i32,
    ) {
        let mut nextedge = *leftcand;
        nextedge.prev();
        nextedge = self.sym(nextedge);
        let mut nextapex = self.apex(nextedge);

        if nextapex == GHOST {
            return;
        }
        let mut badedge = incircle(points, lowerleft, lowerright, *upperleft, nextapex) > 0.0;

        while badedge {
            // Edge flip.
            nextedge.next();
            let topcasing = self.sym(nextedge);
            nextedge.next();
            let sidecasing = self.sym(nextedge);
            leftcand.next();
            let outercasing = self.sym(*leftcand);

            self.set_vertices(*leftcand, GHOST, nextapex, lowerleft);
            self.set_vertices(nextedge, nextapex, GHOST, *upperleft);

            self.bind(*leftcand, nextedge);
            leftcand.next();
            nextedge.prev();
            self.bind(*leftcand, sidecasing);
            leftcand.next();
            self.bind(nextedge, topcasing);
            nextedge.prev();
            self.bind(nextedge, outercasing);

            *upperleft = nextapex;
            nextedge = sidecasing;
            nextapex = self.apex(nextedge);

            if nextapex == GHOST {
                return;
            }
            badedge = incircle(points, lowerleft, lowerright, *upperleft, nextapex) > 0.0;
        }
    }

    fn knit_right(
        &mut self,
        points: &[Point],
        rightcand: &mut OTri,
        lowerleft: i32,
        lowerright: i32,
        upperright: &mut i32,
    ) {
        let mut nextedge = *rightcand;
        nextedge.next();
        nextedge = self.sym(nextedge);
        let mut nextapex = self.apex(nextedge);

        if nextapex == GHOST {
            return;
        }
        let mut badedge = incircle(points, lowerleft, lowerright, *upperright, nextapex) > 0.0;

        while badedge {
            // Edge flip, mirrored.
            nextedge.prev();
            let topcasing = self.sym(nextedge);
            nextedge.prev();
            let sidecasing = self.sym(nextedge);
            rightcand.prev();
            let outercasing = self.sym(*rightcand);

            self.set_vertices(*rightcand, nextapex, GHOST, lowerright);
            self.set_vertices(nextedge, GHOST, nextapex, *upperright);

            self.bind(*rightcand, nextedge);
            rightcand.prev();
            nextedge.next();
            self.bind(*rightcand, sidecasing);
            rightcand.prev();
            self.bind(nextedge, topcasing);
            nextedge.next();
            self.bind(nextedge, outercasing);

            *upperright = nextapex;
            nextedge = sidecasing;
            nextapex = self.apex(nextedge);

            if nextapex == GHOST {
                return;
            }
            badedge = incircle(points, lowerleft, lowerright, *upperright, nextapex) > 0.0;
        }
    }

    fn merge_hulls(
        &mut self,
        points: &[Point],
        usex: bool,
        mut farleft: OTri,
        mut innerleft: OTri,
        mut innerright: OTri,
        mut farright: OTri,
    ) -> (OTri, OTri) {
        // Horizontal cut.
        if !usex {
            self.prepare_horiz(points, &mut farleft, &mut innerleft, &mut innerright, &mut farright);
        }

        let mut innerleftdest = self.dest(innerleft);
        let mut innerleftapex = self.apex(innerleft);
        let mut innerrightorg = self.org(innerright);
        let mut innerrightapex = self.apex(innerright);

        // Find the tangent below both hulls.
        let mut changemade = true;
        while changemade {
            changemade = false;

            // Move to the bottom of the left hull.
            if ccw(points, innerleftdest, innerleftapex, innerrightorg) > 0.0 {
                innerleft.prev();
                innerleft = self.sym(innerleft);
                innerleftdest = innerleftapex;
                innerleftapex = self.apex(innerleft);
                changemade = true;
            }

            // Move to the bottom of the right hull.
            if ccw(points, innerrightapex, innerrightorg, innerleftdest) > 0.0 {
                innerright.next();
                innerright = self.sym(innerright);
                innerrightorg = innerrightapex;
                innerrightapex = self.apex(innerright);
                changemade = true;
            }
        }

        // Next "gear tooth" on each side.
        let mut leftcand = self.sym(innerleft);
        let mut rightcand = self.sym(innerright);

        // New ghost triangle at the bottom.
        let mut baseedge = self.make_triangle(innerrightorg, innerleftdest, GHOST);
        baseedge.next();
        self.bind(baseedge, innerleft);
        baseedge.next();
        self.bind(baseedge, innerright);
        baseedge.next();

        // Patch the far handles if the tangent took their vertex.
        let farleftpt = self.org(farleft);
        if innerleftdest == farleftpt {
            farleft = baseedge;
            farleft.next();
        }
        let farrightpt = self.dest(farright);
        if innerrightorg == farrightpt {
            farright = baseedge;
            farright.prev();
        }

        // Current endpoints of the seam.
        let mut lowerleft = innerleftdest;
        let mut lowerright = innerrightorg;
        let mut upperleft = self.apex(leftcand);
        let mut upperright = self.apex(rightcand);

        // Zipper the gap between the two hulls.
        loop {
            let leftfinished = ccw(points, upperleft, lowerleft, lowerright) <= 0.0;
            let rightfinished = ccw(points, upperright, lowerleft, lowerright) <= 0.0;

            if leftfinished && rightfinished {
                // New bounding ghost triangle on top.
                let mut nextedge = self.make_triangle(lowerleft, lowerright, GHOST);

                self.bind(nextedge, baseedge);
                nextedge.next();
                self.bind(nextedge, rightcand);
                nextedge.next();
                self.bind(nextedge, leftcand);

                if !usex {
                    self.restore_horiz(points, &mut farleft, &mut farright);
                }
                return (farleft, farright);
            }

            if !leftfinished {
                self.knit_left(points, &mut leftcand, lowerleft, lowerright, &mut upperleft);
            }
            if !rightfinished {
                self.knit_right(points, &mut rightcand, lowerleft, lowerright, &mut upperright);
            }

            if leftfinished
                || (!rightfinished
                    && incircle(points, upperleft, lowerleft, lowerright, upperright) > 0.0)
            {
                // Add the edge lowerleft -> upperright.
                self.set_org(rightcand, lowerleft);
                self.bind(baseedge, rightcand);
                baseedge = rightcand;
                baseedge.prev();
                lowerright = upperright;
                rightcand = self.sym(baseedge);
                upperright = self.apex(rightcand);
            } else {
                // Add the edge upperleft -> lowerright.
                self.set_dest(leftcand, lowerright);
                self.bind(baseedge, leftcand);
                baseedge = leftcand;
                baseedge.next();
                lowerleft = upperleft;
                leftcand = self.sym(baseedge);
                upperleft = self.apex(leftcand);
            }
        }
    }

    /// Face normals from the current vertex coordinates; zero for triangles
    /// touching a ghost vertex.
    pub fn face_normals(&self, points: &[Point]) -> Vec<Point> {
        let mut normals = Vec::with_capacity(self.pool.len());
        for tri in &self.pool {
            let [p1, p2, p3] = tri.v;

            let mut normal = Point::default();
            if p1 >= 0 && p2 >= 0 && p3 >= 0 {
                let a = points[p1 as usize];
                let b = points[p2 as usize];
                let c = points[p3 as usize];
                normal = (b - a).cross(&(c - a));
            }
            normals.push(normal);
        }
        normals
    }

    /// Vertex triple of a triangle record, for invariant checks.
    pub fn vertices(&self, tri: usize) -> [i32; 3] {
        self.pool[tri].v
    }
}
