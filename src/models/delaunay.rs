//! Delaunay triangulation (Bowyer-Watson)
//!
//! Incremental insertion into a super-triangle, then removal of every
//! triangle touching a super vertex. Input points must be distinct. With
//! fewer than three non-collinear points the triangulation is empty.
//!
//! Points are inserted in a bucketed snake order and located by walking
//! across triangle neighbours from the last insertion, so the cavity of each
//! new point is found without scanning the whole mesh.

use std::collections::HashMap;

/// Triangle as indices into the point list, counter-clockwise
pub type Triangle = [usize; 3];

/// Neighbour across the edge opposite each vertex
type Adjacency = [Option<usize>; 3];

/// Triangles below this (doubled) area are treated as degenerate
const AREA_EPS: f64 = 1e-14;

#[derive(Debug, Clone)]
pub struct Triangulation {
    points: Vec<[f64; 2]>,
    triangles: Vec<Triangle>,
    neighbors: Vec<Adjacency>,
    /// Orientation tolerance scaled to the point spread
    tol: f64,
}

/// Working mesh during insertion
struct Mesh {
    points: Vec<[f64; 2]>,
    triangles: Vec<Triangle>,
    neighbors: Vec<Adjacency>,
    alive: Vec<bool>,
    tol: f64,
}

impl Mesh {
    fn orient(&self, a: usize, b: usize, p: [f64; 2]) -> f64 {
        orient(self.points[a], self.points[b], p)
    }

    /// Triangle containing `p` (on its boundary counts), walking from `start`
    fn locate(&self, start: usize, p: [f64; 2]) -> usize {
        let mut current = start;
        'walk: for _ in 0..self.triangles.len() {
            let t = self.triangles[current];
            for k in 0..3 {
                if self.orient(t[(k + 1) % 3], t[(k + 2) % 3], p) < -self.tol {
                    if let Some(next) = self.neighbors[current][k] {
                        current = next;
                        continue 'walk;
                    }
                }
            }
            return current;
        }

        // Walk did not settle; fall back to a scan
        (0..self.triangles.len())
            .filter(|&i| self.alive[i])
            .find(|&i| {
                let t = self.triangles[i];
                (0..3).all(|k| self.orient(t[(k + 1) % 3], t[(k + 2) % 3], p) >= -self.tol)
            })
            .unwrap_or(current)
    }

    /// Insert point `i`, returning one of the new triangles
    fn insert(&mut self, i: usize, hint: usize) -> usize {
        let p = self.points[i];
        let start = self.locate(hint, p);

        // Seeds: the containing triangle, plus the neighbour across any edge `p` lies on
        let mut cavity = vec![start];
        let t = self.triangles[start];
        for k in 0..3 {
            if self.orient(t[(k + 1) % 3], t[(k + 2) % 3], p).abs() <= self.tol {
                if let Some(n) = self.neighbors[start][k] {
                    cavity.push(n);
                }
            }
        }

        let mut in_cavity: HashMap<usize, bool> = cavity.iter().map(|&c| (c, true)).collect();
        let mut next = 0;
        while next < cavity.len() {
            let c = cavity[next];
            next += 1;
            for n in self.neighbors[c].into_iter().flatten() {
                if in_cavity.contains_key(&n) {
                    continue;
                }
                let bad = in_circumcircle(&self.points, &self.triangles[n], p);
                in_cavity.insert(n, bad);
                if bad {
                    cavity.push(n);
                }
            }
        }

        // Cavity boundary, counter-clockwise, with the triangle outside each edge
        let mut boundary: Vec<(usize, usize, Option<usize>, usize)> = Vec::new();
        for &c in &cavity {
            let t = self.triangles[c];
            for k in 0..3 {
                let outer = self.neighbors[c][k];
                if outer.map_or(true, |o| !in_cavity.get(&o).copied().unwrap_or(false)) {
                    boundary.push((t[(k + 1) % 3], t[(k + 2) % 3], outer, c));
                }
            }
        }

        for &c in &cavity {
            self.alive[c] = false;
        }

        let mut by_start: HashMap<usize, usize> = HashMap::with_capacity(boundary.len());
        let mut created = Vec::with_capacity(boundary.len());
        for (a, b, outer, old) in boundary {
            let idx = self.triangles.len();
            self.triangles.push([a, b, i]);
            self.neighbors.push([None, None, outer]);
            self.alive.push(true);
            if let Some(o) = outer {
                for slot in self.neighbors[o].iter_mut() {
                    if *slot == Some(old) {
                        *slot = Some(idx);
                    }
                }
            }
            by_start.insert(a, idx);
            created.push(idx);
        }

        // Stitch the fan around `p`: [a, b, p] meets [b, c, p] along b-p
        for &idx in &created {
            let b = self.triangles[idx][1];
            if let Some(&fan) = by_start.get(&b) {
                self.neighbors[idx][0] = Some(fan);
                self.neighbors[fan][1] = Some(idx);
            }
        }

        created.last().copied().unwrap_or(hint)
    }
}

impl Triangulation {
    pub fn new(points: &[[f64; 2]]) -> Self {
        let n = points.len();
        let empty = |tol| Self {
            points: points.to_vec(),
            triangles: Vec::new(),
            neighbors: Vec::new(),
            tol,
        };
        if n < 3 {
            return empty(0.0);
        }

        let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
        let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for p in points {
            min_x = min_x.min(p[0]);
            min_y = min_y.min(p[1]);
            max_x = max_x.max(p[0]);
            max_y = max_y.max(p[1]);
        }
        let span = (max_x - min_x).max(max_y - min_y);
        let tol = 1e-12 * span * span;
        if span <= 0.0 {
            return empty(tol);
        }

        let cx = 0.5 * (min_x + max_x);
        let cy = 0.5 * (min_y + max_y);
        let radius = 100.0 * span.max(1.0);

        let mut work: Vec<[f64; 2]> = points.to_vec();
        let sqrt3 = 3f64.sqrt();
        work.push([cx - sqrt3 * radius, cy - radius]);
        work.push([cx + sqrt3 * radius, cy - radius]);
        work.push([cx, cy + 2.0 * radius]);

        let mut mesh = Mesh {
            points: work,
            triangles: vec![[n, n + 1, n + 2]],
            neighbors: vec![[None; 3]],
            alive: vec![true],
            tol,
        };

        let mut hint = 0;
        for i in insertion_order(points, [min_x, min_y], [max_x - min_x, max_y - min_y]) {
            hint = mesh.insert(i, hint);
        }

        // Keep real, non-degenerate triangles and remap adjacency onto them
        let mut remap = vec![None; mesh.triangles.len()];
        let mut triangles = Vec::new();
        for (idx, t) in mesh.triangles.iter().enumerate() {
            let real = t.iter().all(|&v| v < n);
            if mesh.alive[idx] && real && doubled_area(&mesh.points, t).abs() > AREA_EPS {
                remap[idx] = Some(triangles.len());
                triangles.push(*t);
            }
        }
        let neighbors = mesh
            .triangles
            .iter()
            .enumerate()
            .filter(|(idx, _)| remap[*idx].is_some())
            .map(|(idx, _)| mesh.neighbors[idx].map(|nb| nb.and_then(|o| remap[o])))
            .collect();

        Self { points: points.to_vec(), triangles, neighbors, tol }
    }

    pub fn points(&self) -> &[[f64; 2]] {
        &self.points
    }

    pub fn triangles(&self) -> &[Triangle] {
        &self.triangles
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Containing triangle and barycentric weights of `q`, if `q` lies in
    /// the convex hull of the triangulated points
    pub fn locate(&self, q: [f64; 2]) -> Option<(Triangle, [f64; 3])> {
        if self.triangles.is_empty() {
            return None;
        }

        // Walk from the first triangle; leaving through a hull edge falls back to a scan
        let mut current = 0;
        'walk: for _ in 0..self.triangles.len() {
            let t = self.triangles[current];
            for k in 0..3 {
                let (a, b) = (self.points[t[(k + 1) % 3]], self.points[t[(k + 2) % 3]]);
                if orient(a, b, q) < -self.tol {
                    match self.neighbors[current][k] {
                        Some(next) => {
                            current = next;
                            continue 'walk;
                        }
                        None => break 'walk,
                    }
                }
            }
            return Some((t, self.barycentric(&t, q)));
        }

        self.triangles.iter().find_map(|t| {
            let w = self.barycentric(t, q);
            w.iter().all(|&wi| wi >= -1e-12).then_some((*t, w))
        })
    }

    fn barycentric(&self, t: &Triangle, q: [f64; 2]) -> [f64; 3] {
        let [a, b, c] = [self.points[t[0]], self.points[t[1]], self.points[t[2]]];
        let det = (b[1] - c[1]) * (a[0] - c[0]) + (c[0] - b[0]) * (a[1] - c[1]);
        let w0 = ((b[1] - c[1]) * (q[0] - c[0]) + (c[0] - b[0]) * (q[1] - c[1])) / det;
        let w1 = ((c[1] - a[1]) * (q[0] - c[0]) + (a[0] - c[0]) * (q[1] - c[1])) / det;
        [w0, w1, 1.0 - w0 - w1]
    }
}

/// Bucket the bounding box into rows and visit them in alternating
/// direction, so consecutive insertions stay close together
fn insertion_order(points: &[[f64; 2]], origin: [f64; 2], extent: [f64; 2]) -> Vec<usize> {
    let buckets = ((points.len() as f64).sqrt() / 2.0).ceil().max(1.0);
    let max_bucket = buckets as usize - 1;
    let bucket = |v: f64, k: usize| {
        if extent[k] > 0.0 {
            (((v - origin[k]) / extent[k] * buckets) as usize).min(max_bucket)
        } else {
            0
        }
    };

    let mut keyed: Vec<(usize, usize, f64, usize)> = points
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let row = bucket(p[1], 1);
            if row % 2 == 0 {
                (row, bucket(p[0], 0), p[0], i)
            } else {
                (row, max_bucket - bucket(p[0], 0), -p[0], i)
            }
        })
        .collect();
    keyed.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)).then(a.2.total_cmp(&b.2)));
    keyed.into_iter().map(|(_, _, _, i)| i).collect()
}

fn orient(a: [f64; 2], b: [f64; 2], c: [f64; 2]) -> f64 {
    (b[0] - a[0]) * (c[1] - a[1]) - (c[0] - a[0]) * (b[1] - a[1])
}

fn doubled_area(pts: &[[f64; 2]], t: &Triangle) -> f64 {
    orient(pts[t[0]], pts[t[1]], pts[t[2]])
}

/// Strictly inside the circumcircle of a counter-clockwise triangle
fn in_circumcircle(pts: &[[f64; 2]], t: &Triangle, p: [f64; 2]) -> bool {
    let [a, b, c] = [pts[t[0]], pts[t[1]], pts[t[2]]];
    let (ax, ay) = (a[0] - p[0], a[1] - p[1]);
    let (bx, by) = (b[0] - p[0], b[1] - p[1]);
    let (cx, cy) = (c[0] - p[0], c[1] - p[1]);
    let det = (ax * ax + ay * ay) * (bx * cy - cx * by)
        - (bx * bx + by * by) * (ax * cy - cx * ay)
        + (cx * cx + cy * cy) * (ax * by - bx * ay);
    det > 0.0
}
