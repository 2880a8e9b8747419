//! 3D convex hull
//!
//! Incremental construction in double precision over a closed triangle
//! mesh. Each inserted point removes the connected region of faces it sees,
//! found by walking face adjacency from the face it lies farthest above, and
//! is joined to the boundary loop of that region. Points within a small
//! relative distance of a face are treated as lying on it, so dense samples
//! of a flat face do not fragment the hull. Points are inserted from the
//! farthest to the nearest relative to the initial simplex, which lets true
//! corners enter first on box-like inputs.

use std::collections::{HashMap, HashSet};

use nalgebra::Vector3;
use tabletop_core::{Bounded, Point3f};
use tracing::trace;

/// Relative tolerance, scaled by the bounding box diagonal of the input
const RELATIVE_EPSILON: f64 = 1e-6;

/// Face normals closer than this (as `1 - cos`) count as the same direction
const COPLANAR_COSINE: f64 = 1e-6;

/// A triangulated convex hull with its enclosed volume and surface area
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConvexHull {
    vertices: Vec<Point3f>,
    faces: Vec<[usize; 3]>,
    corners: Vec<usize>,
    volume: f32,
    area: f32,
}

#[derive(Debug, Clone)]
struct Face {
    vertices: [usize; 3],
    normal: Vector3<f64>,
    offset: f64,
    alive: bool,
}

impl Face {
    fn new(points: &[Vector3<f64>], vertices: [usize; 3]) -> Self {
        let [a, b, c] = vertices.map(|v| points[v]);
        let normal = (b - a).cross(&(c - a));
        let norm = normal.norm();
        let normal = if norm > 0.0 { normal / norm } else { normal };
        Self {
            vertices,
            normal,
            offset: normal.dot(&a),
            alive: true,
        }
    }

    fn distance(&self, point: &Vector3<f64>) -> f64 {
        self.normal.dot(point) - self.offset
    }

    fn edges(&self) -> [(usize, usize); 3] {
        let [a, b, c] = self.vertices;
        [(a, b), (b, c), (c, a)]
    }
}

/// Closed triangle mesh; every directed edge belongs to exactly one face
#[derive(Debug, Default)]
struct Mesh {
    faces: Vec<Face>,
    edges: HashMap<(usize, usize), usize>,
}

impl Mesh {
    fn add(&mut self, points: &[Vector3<f64>], vertices: [usize; 3]) {
        let face = Face::new(points, vertices);
        let id = self.faces.len();
        for edge in face.edges() {
            self.edges.insert(edge, id);
        }
        self.faces.push(face);
    }

    fn remove(&mut self, id: usize) {
        let face = &mut self.faces[id];
        face.alive = false;
        for edge in face.edges() {
            self.edges.remove(&edge);
        }
    }

    fn alive(&self) -> impl Iterator<Item = (usize, &Face)> + '_ {
        self.faces.iter().enumerate().filter(|(_, f)| f.alive)
    }

    /// Face `point` lies farthest above, if any lies more than `epsilon` above
    fn farthest_visible(&self, point: &Vector3<f64>, epsilon: f64) -> Option<usize> {
        self.alive()
            .map(|(id, face)| (id, face.distance(point)))
            .filter(|&(_, distance)| distance > epsilon)
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id)
    }

    /// Connected faces visible from `point`, starting at `seed`, together
    /// with the boundary edges of that region as a closed loop.
    ///
    /// Returns `None` when the boundary is not one simple loop, which only
    /// happens when `point` lies within rounding of the hull.
    fn visible_region(
        &self,
        point: &Vector3<f64>,
        seed: usize,
        epsilon: f64,
    ) -> Option<(Vec<usize>, Vec<(usize, usize)>)> {
        let mut visible = vec![seed];
        let mut marked = HashSet::from([seed]);
        let mut horizon = Vec::new();
        let mut frontier = vec![seed];

        while let Some(id) = frontier.pop() {
            for (a, b) in self.faces[id].edges() {
                let neighbor = *self.edges.get(&(b, a))?;
                if marked.contains(&neighbor) {
                    continue;
                }
                if self.faces[neighbor].distance(point) > epsilon {
                    marked.insert(neighbor);
                    visible.push(neighbor);
                    frontier.push(neighbor);
                } else {
                    horizon.push((a, b));
                }
            }
        }

        let boundary = closed_loop(&horizon)?;
        Some((visible, boundary))
    }

    /// Every edge has its twin and the face count matches a sphere
    fn is_closed(&self) -> bool {
        let faces = self.alive().count();
        let vertices: HashSet<usize> = self.alive().flat_map(|(_, f)| f.vertices).collect();
        self.edges.keys().all(|&(a, b)| self.edges.contains_key(&(b, a)))
            && self.edges.len() == 3 * faces
            && faces + 4 <= 2 * vertices.len()
    }
}

/// Orders boundary edges into one loop, or `None` if they form several
/// loops or a vertex is visited twice.
fn closed_loop(edges: &[(usize, usize)]) -> Option<Vec<(usize, usize)>> {
    let mut next = HashMap::with_capacity(edges.len());
    for &(a, b) in edges {
        if next.insert(a, b).is_some() {
            return None;
        }
    }

    let &(start, _) = edges.first()?;
    let mut ordered = Vec::with_capacity(edges.len());
    let mut current = start;
    loop {
        let following = *next.get(&current)?;
        ordered.push((current, following));
        current = following;
        if current == start {
            break;
        }
        if ordered.len() > edges.len() {
            return None;
        }
    }
    (ordered.len() == edges.len()).then_some(ordered)
}

impl ConvexHull {
    /// Convex hull of the finite points in `points`.
    ///
    /// Fewer than four points, or points that are collinear or coplanar,
    /// produce an empty hull with zero volume and area.
    pub fn compute(points: &[Point3f]) -> Self {
        let finite: Vec<Point3f> = points
            .iter()
            .copied()
            .filter(|p| p.coords.iter().all(|c| c.is_finite()))
            .collect();
        if finite.len() < 4 {
            return Self::default();
        }

        let epsilon = finite[..].diagonal() as f64 * RELATIVE_EPSILON;
        let cast: Vec<Vector3<f64>> = finite.iter().map(|p| p.coords.cast::<f64>()).collect();

        let Some(simplex) = initial_simplex(&cast, epsilon) else {
            trace!("{} points span less than three dimensions", finite.len());
            return Self::default();
        };

        let interior = simplex.iter().map(|&i| cast[i]).sum::<Vector3<f64>>() / 4.0;
        let mut mesh = Mesh::default();
        for [a, b, c] in [
            [simplex[0], simplex[1], simplex[2]],
            [simplex[0], simplex[1], simplex[3]],
            [simplex[0], simplex[2], simplex[3]],
            [simplex[1], simplex[2], simplex[3]],
        ] {
            if Face::new(&cast, [a, b, c]).distance(&interior) > 0.0 {
                mesh.add(&cast, [a, c, b]);
            } else {
                mesh.add(&cast, [a, b, c]);
            }
        }

        let mut order: Vec<usize> = (0..cast.len()).filter(|i| !simplex.contains(i)).collect();
        order.sort_by(|&a, &b| {
            let da = (cast[a] - interior).norm_squared();
            let db = (cast[b] - interior).norm_squared();
            db.total_cmp(&da).then(a.cmp(&b))
        });

        let mut skipped = 0;
        for index in order {
            let point = &cast[index];
            let Some(seed) = mesh.farthest_visible(point, epsilon) else {
                continue;
            };
            let Some((visible, horizon)) = mesh.visible_region(point, seed, epsilon) else {
                skipped += 1;
                continue;
            };

            for id in visible {
                mesh.remove(id);
            }
            // horizon edges keep the orientation they had in the removed faces
            for (a, b) in horizon {
                mesh.add(&cast, [a, b, index]);
            }
        }
        if skipped > 0 {
            trace!("{} points within rounding of the hull were not inserted", skipped);
        }
        debug_assert!(mesh.is_closed(), "convex hull mesh is not a closed surface");

        let faces: Vec<&Face> = mesh.alive().map(|(_, f)| f).collect();
        let mut volume = 0.0;
        let mut area = 0.0;
        for face in &faces {
            let [a, b, c] = face.vertices.map(|v| cast[v]);
            volume += (a - interior).dot(&(b - a).cross(&(c - a))) / 6.0;
            area += (b - a).cross(&(c - a)).norm() / 2.0;
        }

        let mut used: Vec<usize> = faces.iter().flat_map(|f| f.vertices).collect();
        used.sort_unstable();
        used.dedup();
        let remap = |v: usize| used.binary_search(&v).unwrap_or_default();

        // A vertex is a corner when its incident faces span at least three
        // directions; vertices inside a flat face or along an edge are not.
        let mut directions: Vec<Vec<Vector3<f64>>> = vec![Vec::new(); used.len()];
        for face in faces.iter().filter(|f| f.normal.norm_squared() > 0.0) {
            for vertex in face.vertices {
                let seen = &mut directions[remap(vertex)];
                if !seen.iter().any(|n| n.dot(&face.normal) > 1.0 - COPLANAR_COSINE) {
                    seen.push(face.normal);
                }
            }
        }
        let corners = directions
            .iter()
            .enumerate()
            .filter(|(_, seen)| seen.len() >= 3)
            .map(|(i, _)| i)
            .collect();

        Self {
            vertices: used.iter().map(|&v| finite[v]).collect(),
            faces: faces.iter().map(|f| f.vertices.map(remap)).collect(),
            corners,
            volume: volume.max(0.0) as f32,
            area: area as f32,
        }
    }

    /// Hull vertices, a subset of the input points
    pub fn vertices(&self) -> &[Point3f] {
        &self.vertices
    }

    /// Vertices where three or more non-coplanar faces meet
    pub fn corners(&self) -> impl Iterator<Item = &Point3f> + '_ {
        self.corners.iter().map(|&i| &self.vertices[i])
    }

    /// Outward-facing triangles as indices into [`vertices`](Self::vertices)
    pub fn faces(&self) -> &[[usize; 3]] {
        &self.faces
    }

    /// Enclosed volume, always `>= 0`
    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Total surface area
    pub fn area(&self) -> f32 {
        self.area
    }

    /// True when the input did not span three dimensions
    pub fn is_degenerate(&self) -> bool {
        self.faces.is_empty()
    }

    /// Mean of the hull corners
    ///
    /// Hull vertices that merely lie on a flat face or an edge are left out,
    /// so the result does not depend on how densely faces were sampled.
    pub fn centroid(&self) -> Option<Point3f> {
        if self.corners.is_empty() {
            return None;
        }
        let sum = self
            .corners()
            .fold(Vector3::<f64>::zeros(), |acc, p| acc + p.coords.cast::<f64>());
        Some(Point3f::from((sum / self.corners.len() as f64).cast::<f32>()))
    }
}

/// Convex hull of `points`, see [`ConvexHull::compute`].
pub fn convex_hull(points: &[Point3f]) -> ConvexHull {
    ConvexHull::compute(points)
}

/// Four affinely independent points, or `None` if the set is flat.
fn initial_simplex(points: &[Vector3<f64>], epsilon: f64) -> Option<[usize; 4]> {
    let argmax = |score: &dyn Fn(&Vector3<f64>) -> f64| -> (usize, f64) {
        points
            .iter()
            .enumerate()
            .map(|(i, p)| (i, score(p)))
            .fold((0, f64::NEG_INFINITY), |best, current| {
                if current.1 > best.1 {
                    current
                } else {
                    best
                }
            })
    };

    let (i0, _) = argmax(&|p| -p.x);
    let p0 = points[i0];

    let (i1, spread) = argmax(&|p| (p - p0).norm());
    if spread <= epsilon {
        return None;
    }
    let direction = (points[i1] - p0) / spread;

    let (i2, offset) = argmax(&|p| (p - p0).cross(&direction).norm());
    if offset <= epsilon {
        return None;
    }
    let normal = (points[i1] - p0).cross(&(points[i2] - p0)).normalize();

    let (i3, height) = argmax(&|p| normal.dot(&(p - p0)).abs());
    if height <= epsilon {
        return None;
    }

    Some([i0, i1, i2, i3])
}
