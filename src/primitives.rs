//! Planar predicates shared by the triangulation and the point-location walk.

use crate::point::Point;

/// Check if the segments ]p1, p2] and [q1, q2] intersect.
///
/// Parallel segments are considered not to intersect. The asymmetry between
/// the two open ends (`a < 1`, `b <= 1`) is load-bearing for the walk
/// termination in point location; keep it.
pub fn inter_segments(p1: &Point, p2: &Point, q1: &Point, q2: &Point) -> bool {
    // I = a.p1 + (1-a).p2 = b.q1 + (1-b).q2 with 0 <= a, b <= 1
    let dp = *p2 - *p1;
    let dq = *q2 - *q1;
    let d2 = *q2 - *p2;

    let det = dq.det2(&dp);
    if det == 0.0 {
        return false;
    }

    let a = d2.det2(&dq) / det;
    let b = d2.det2(&dp) / det;

    a >= 0.0 && b >= 0.0 && a < 1.0 && b <= 1.0
}

/// Barycentric coordinates of p in the triangle {p1, p2, p3}, packed as a
/// Point (a, b, c) with a + b + c = 1.
pub fn interpolate_coeffs(p: &Point, p1: &Point, p2: &Point, p3: &Point) -> Point {
    // p1.x*a + p2.x*b + p3.x*c = p.x
    // p1.y*a + p2.y*b + p3.y*c = p.y
    //      a +      b +      c = 1
    let det = p1.det2(p2) + p2.det2(p3) + p3.det2(p1);

    let p12 = *p2 - *p1;
    let p23 = *p3 - *p2;
    let p31 = *p1 - *p3;
    let a = (-p23.y * p.x + p23.x * p.y + p2.det2(p3)) / det;
    let b = (-p31.y * p.x + p31.x * p.y + p3.det2(p1)) / det;
    let c = (-p12.y * p.x + p12.x * p.y + p1.det2(p2)) / det;

    Point::new(a, b, c)
}

/// Interpolate p.z from the triangle {p1, p2, p3}.
pub fn interpolate(p: &Point, p1: &Point, p2: &Point, p3: &Point) -> f64 {
    let c = interpolate_coeffs(p, p1, p2, p3);
    c.x * p1.z + c.y * p2.z + c.z * p3.z
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn crossing_segments_intersect() {
        let p1 = Point::new2(0.0, 0.0);
        let p2 = Point::new2(2.0, 2.0);
        let q1 = Point::new2(0.0, 2.0);
        let q2 = Point::new2(2.0, 0.0);
        assert!(inter_segments(&p1, &p2, &q1, &q2));
        assert!(inter_segments(&q1, &q2, &p1, &p2));
    }

    #[test]
    fn parallel_segments_do_not_intersect() {
        let p1 = Point::new2(0.0, 0.0);
        let p2 = Point::new2(1.0, 0.0);
        let q1 = Point::new2(0.0, 1.0);
        let q2 = Point::new2(1.0, 1.0);
        assert!(!inter_segments(&p1, &p2, &q1, &q2));
        // Collinear overlap counts as parallel too.
        assert!(!inter_segments(&p1, &p2, &p1, &p2));
    }

    #[test]
    fn half_open_ends_are_asymmetric() {
        // The intersection point is p1 itself: a = 1 is excluded.
        let p1 = Point::new2(0.0, 0.0);
        let p2 = Point::new2(2.0, 0.0);
        let q1 = Point::new2(0.0, -1.0);
        let q2 = Point::new2(0.0, 1.0);
        assert!(!inter_segments(&p1, &p2, &q1, &q2));

        // The intersection point is p2: a = 0 is included.
        let r1 = Point::new2(2.0, -1.0);
        let r2 = Point::new2(2.0, 1.0);
        assert!(inter_segments(&p1, &p2, &r1, &r2));

        // The intersection point is q2: b = 0 is included.
        let s1 = Point::new2(1.0, -1.0);
        let s2 = Point::new2(1.0, 0.0);
        assert!(inter_segments(&p1, &p2, &s1, &s2));

        // The intersection point is q1: b = 1 is included.
        assert!(inter_segments(&p1, &p2, &s2, &s1));
    }

    #[test]
    fn barycentric_weights_sum_to_one() {
        let p1 = Point::new(0.0, 0.0, 10.0);
        let p2 = Point::new(1.0, 0.0, 20.0);
        let p3 = Point::new(0.0, 1.0, 30.0);
        let q = Point::new2(0.25, 0.25);
        let c = interpolate_coeffs(&q, &p1, &p2, &p3);
        assert_relative_eq!(c.x + c.y + c.z, 1.0, max_relative = 1e-12);
        assert_relative_eq!(interpolate(&q, &p1, &p2, &p3), 17.5, max_relative = 1e-12);
    }

    #[test]
    fn interpolation_matches_vertices() {
        let p1 = Point::new(0.0, 0.0, 1.0);
        let p2 = Point::new(4.0, 0.0, 2.0);
        let p3 = Point::new(0.0, 4.0, 3.0);
        assert_relative_eq!(interpolate(&p1, &p1, &p2, &p3), 1.0, max_relative = 1e-12);
        assert_relative_eq!(interpolate(&p2, &p1, &p2, &p3), 2.0, max_relative = 1e-12);
        assert_relative_eq!(interpolate(&p3, &p1, &p2, &p3), 3.0, max_relative = 1e-12);
    }
}
