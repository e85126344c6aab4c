//! Balanced 2D search index: a binary partition tree that alternates its
//! splitting axis per level (x at even depths, y at odd ones).
//!
//! The leaf order exposed by [`PointIndex::rank`] is exactly the recursion
//! order consumed by the divide-and-conquer triangulation — the two are
//! coupled on purpose, so this cannot be swapped for an ordinary k-d tree.
//! `find` descends the split values and returns an approximate nearest point,
//! good enough as a walk start for point location.

use crate::point::Point;

pub struct PointIndex {
    n: usize,
    split: Vec<f64>,
    rank_internal: Vec<i32>,
    rank: Vec<usize>,
}

impl PointIndex {
    /// Build the tree over `points`. With `triad_sort`, subsets of up to 3
    /// points stay sorted by x regardless of the active axis, as required by
    /// the triangulation base cases.
    pub fn build(points: &[Point], triad_sort: bool) -> PointIndex {
        let n = points.len();
        assert!(n > 0);

        let mut log2n = 0usize;
        let mut pow = 1usize;
        while pow < n {
            pow <<= 1;
            log2n += 1;
        }

        // Index permutations sorted by x and by y; the triad variant breaks
        // ties on the cross coordinate to make the order total.
        let mut xind: Vec<usize> = (0..n).collect();
        let mut yind: Vec<usize> = (0..n).collect();
        if triad_sort {
            xind.sort_by(|&a, &b| {
                points[a]
                    .x
                    .total_cmp(&points[b].x)
                    .then(points[a].y.total_cmp(&points[b].y))
            });
            yind.sort_by(|&a, &b| {
                points[a]
                    .y
                    .total_cmp(&points[b].y)
                    .then(points[a].x.total_cmp(&points[b].x))
            });
        } else {
            xind.sort_by(|&a, &b| points[a].x.total_cmp(&points[b].x));
            yind.sort_by(|&a, &b| points[a].y.total_cmp(&points[b].y));
        }

        let mut rank = vec![0usize; n];
        let mut split = vec![0.0; pow];
        build_level(
            points, &mut xind, &mut yind, &mut rank, 0, n, log2n, 0, true, triad_sort, &mut split,
        );

        let mut rank_internal = vec![-1i32; pow];
        for (i, &r) in rank.iter().enumerate() {
            rank_internal[r] = i as i32;
        }
        let rank = rank_internal
            .iter()
            .filter(|&&j| j >= 0)
            .map(|&j| j as usize)
            .collect();

        PointIndex {
            n,
            split,
            rank_internal,
            rank,
        }
    }

    /// Index of the leaf whose split path matches `p`'s coordinates.
    pub fn find(&self, p: &Point) -> usize {
        let mut begin = 0usize;
        let mut end = self.n;
        let mut i = 0usize;
        let mut r = 0usize;
        let mut pow = 1usize;
        let mut side = false;

        while pow < self.n {
            let diff = (end - begin) / 2;
            let value = if side { p.y } else { p.x };

            if diff > 0 && value < self.split[i] {
                i = 2 * i + 1;
                r *= 2;
                end = begin + diff;
            } else {
                i = 2 * i + 2;
                r = 2 * r + 1;
                begin += diff;
            }

            pow <<= 1;
            side = !side;
        }

        debug_assert!(self.rank_internal[r] >= 0);
        self.rank_internal[r] as usize
    }

    /// Point indices in leaf order.
    pub fn rank(&self) -> &[usize] {
        &self.rank
    }
}

#[allow(clippy::too_many_arguments)]
fn build_level(
    points: &[Point],
    act: &mut [usize],
    cross: &mut [usize],
    rank: &mut [usize],
    begin: usize,
    end: usize,
    log2n: usize,
    spliti: usize,
    usex: bool,
    triad_sort: bool,
    split: &mut [f64],
) {
    // Triad subsets fall back to the x-major permutation.
    if triad_sort && end - begin <= 3 && !usex {
        build_level(
            points, cross, act, rank, begin, end, log2n, spliti, !usex, triad_sort, split,
        );
        return;
    }

    let diff = (end - begin) / 2;
    if log2n == 0 {
        return;
    }

    // Rank bit for this level follows the active-axis permutation.
    for i in begin..begin + diff {
        let r = act[i];
        rank[r] *= 2;
    }
    for i in begin + diff..end {
        let r = act[i];
        rank[r] = 2 * rank[r] + 1;
    }

    if diff > 0 {
        let p1 = &points[act[begin + diff - 1]];
        let p2 = &points[act[begin + diff]];
        split[spliti] = if usex {
            (p1.x + p2.x) / 2.0
        } else {
            (p1.y + p2.y) / 2.0
        };
    }

    // Stable-partition the cross-axis permutation by the new rank bit.
    let mut part: Vec<usize> = Vec::with_capacity(end - begin);
    part.extend(cross[begin..end].iter().copied().filter(|&a| rank[a] % 2 == 0));
    part.extend(cross[begin..end].iter().copied().filter(|&a| rank[a] % 2 == 1));
    cross[begin..end].copy_from_slice(&part);

    // Recurse with the axes swapped.
    build_level(
        points,
        cross,
        act,
        rank,
        begin,
        begin + diff,
        log2n - 1,
        2 * spliti + 1,
        !usex,
        triad_sort,
        split,
    );
    build_level(
        points,
        cross,
        act,
        rank,
        begin + diff,
        end,
        log2n - 1,
        2 * spliti + 2,
        !usex,
        triad_sort,
        split,
    );
}
