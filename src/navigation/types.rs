use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use super::math::FixedNum;

/// Default cluster edge length for hierarchical pathfinding (32×32 cells).
///
/// Larger clusters mean fewer entrances and a smaller abstract graph, but
/// coarser cost granularity and more work per intra-cluster search.
pub const DEFAULT_CLUSTER_SIZE: usize = 32;

/// Index of an entrance in the cluster graph arena.
pub type EntranceId = usize;

/// Index of a cluster in the cluster graph arena (row-major).
pub type ClusterId = usize;

/// The two agent populations that navigate the city, each on its own grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AgentClass {
    Pedestrian,
    Vehicle,
}

impl AgentClass {
    pub const ALL: [AgentClass; 2] = [AgentClass::Pedestrian, AgentClass::Vehicle];

    #[inline]
    pub fn as_index(self) -> usize {
        self as usize
    }
}

/// A position on the ground plane. `z` is the world depth axis; the height of
/// returned path points comes from the navigation domain, never from here.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f32,
    pub z: f32,
}

impl Point2D {
    pub const fn new(x: f32, z: f32) -> Self {
        Self { x, z }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.z.is_finite()
    }

    pub fn distance_squared(&self, other: Point2D) -> f32 {
        let dx = self.x - other.x;
        let dz = self.z - other.z;
        dx * dx + dz * dz
    }
}

/// Integer grid coordinates. `y` is the grid row, which maps to world `z`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize, PartialOrd, Ord)]
pub struct GridCell {
    pub x: usize,
    pub y: usize,
}

impl GridCell {
    pub const fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }

    #[inline]
    pub fn manhattan(&self, other: GridCell) -> usize {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }

    #[inline]
    pub fn chebyshev(&self, other: GridCell) -> usize {
        self.x.abs_diff(other.x).max(self.y.abs_diff(other.y))
    }
}

/// Inclusive rectangle of grid cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellRect {
    pub min_x: usize,
    pub min_y: usize,
    pub max_x: usize,
    pub max_y: usize,
}

impl CellRect {
    pub const fn new(min_x: usize, min_y: usize, max_x: usize, max_y: usize) -> Self {
        Self { min_x, min_y, max_x, max_y }
    }

    #[inline]
    pub fn contains(&self, cell: GridCell) -> bool {
        cell.x >= self.min_x && cell.x <= self.max_x && cell.y >= self.min_y && cell.y <= self.max_y
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.max_x - self.min_x + 1
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.max_y - self.min_y + 1
    }

    #[inline]
    pub fn area(&self) -> usize {
        self.width() * self.height()
    }
}

/// Axis-aligned world-space box on the ground plane.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorldRect {
    pub min: Point2D,
    pub max: Point2D,
}

impl WorldRect {
    pub fn new(min: Point2D, max: Point2D) -> Self {
        Self {
            min: Point2D::new(min.x.min(max.x), min.z.min(max.z)),
            max: Point2D::new(min.x.max(max.x), min.z.max(max.z)),
        }
    }

    pub fn contains(&self, p: Point2D) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.z >= self.min.z && p.z <= self.max.z
    }
}

/// A city block footprint supplied by the layout generator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Plot {
    pub id: u64,
    pub x: f32,
    pub z: f32,
    pub width: f32,
    pub depth: f32,
}

impl Plot {
    pub fn new(id: u64, x: f32, z: f32, width: f32, depth: f32) -> Self {
        Self { id, x, z, width, depth }
    }

    pub fn is_valid(&self) -> bool {
        self.x.is_finite()
            && self.z.is_finite()
            && self.width.is_finite()
            && self.depth.is_finite()
            && self.width > 0.0
            && self.depth > 0.0
    }
}

/// A zebra crossing: centre, heading in radians (walking direction), and
/// length along that heading.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Crosswalk {
    pub position: Point2D,
    pub angle: f32,
    pub length: f32,
}

impl Crosswalk {
    pub fn new(position: Point2D, angle: f32, length: f32) -> Self {
        Self { position, angle, length }
    }

    pub fn is_valid(&self) -> bool {
        self.position.is_finite() && self.angle.is_finite() && self.length.is_finite() && self.length > 0.0
    }
}

/// Answer to a navigation query. `path` is `None` when no route exists, in
/// which case `length` is zero.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PathResult {
    pub path: Option<Vec<Vec3>>,
    pub length: f32,
}

impl PathResult {
    pub fn none() -> Self {
        Self { path: None, length: 0.0 }
    }

    pub fn found(path: Vec<Vec3>, length: f32) -> Self {
        Self { path: Some(path), length }
    }

    pub fn is_found(&self) -> bool {
        self.path.is_some()
    }
}

/// Open-set entry shared by the grid and abstract searches.
/// Ordered so that `BinaryHeap` pops the lowest `cost` first.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) struct State {
    pub cost: FixedNum,
    pub g: FixedNum,
    pub node: usize,
}

impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        other.cost.cmp(&self.cost)
            // prefer deeper nodes on ties so searches run straight at the goal
            .then_with(|| self.g.cmp(&other.g))
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
