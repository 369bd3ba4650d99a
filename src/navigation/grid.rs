use bevy::prelude::*;
use std::sync::Arc;
use super::types::{CellRect, GridCell, Point2D};

pub const WALKABLE: u8 = 0;
pub const BLOCKED: u8 = 1;

/// Dense walkability grid for one navigation domain.
///
/// One byte per cell, row-major (`y * width + x`), `WALKABLE` or `BLOCKED`.
/// The cell buffer sits behind an `Arc` so cloning the grid (or handing the
/// buffer to another thread) never copies it. Searches only ever read it.
///
/// # Coordinates
///
/// - **world → grid:** `floor(world * scale + offset)`
/// - **grid → world:** `(grid + 0.5 - offset) / scale` (cell centre)
///
/// `offset_x`/`offset_z` are expressed in cells. World `z` maps to grid `y`.
///
/// # Example
///
/// ```rust,ignore
/// let mut grid = WalkabilityGrid::new(64, 64, 1.0, 32.0, 32.0, 0.1);
/// grid.set_walkable(10, 10, true);
///
/// if let Some(cell) = grid.nearest_walkable(Point2D::new(-21.7, -22.2)) {
///     let waypoint = grid.grid_to_world(cell);
/// }
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct WalkabilityGrid {
    pub width: usize,
    pub height: usize,
    /// Cells per world unit.
    pub scale: f32,
    pub offset_x: f32,
    pub offset_z: f32,
    /// World Y of every point returned for this grid.
    pub domain_height: f32,
    cells: Arc<Vec<u8>>,
}

impl Default for WalkabilityGrid {
    fn default() -> Self {
        Self::new(0, 0, 1.0, 0.0, 0.0, 0.0)
    }
}

impl WalkabilityGrid {
    /// Allocate a fully blocked grid.
    pub fn new(width: usize, height: usize, scale: f32, offset_x: f32, offset_z: f32, domain_height: f32) -> Self {
        Self {
            width,
            height,
            scale,
            offset_x,
            offset_z,
            domain_height,
            cells: Arc::new(vec![BLOCKED; width * height]),
        }
    }

    /// Fully walkable grid with the origin at grid (0, 0). Mostly for tests and tools.
    pub fn open(width: usize, height: usize) -> Self {
        let mut grid = Self::new(width, height, 1.0, 0.0, 0.0, 0.0);
        grid.fill(true);
        grid
    }

    /// Build from rows of text, `#` blocked and anything else walkable.
    /// Row 0 is grid `y = 0`.
    pub fn from_ascii(rows: &[&str]) -> Self {
        let height = rows.len();
        let width = rows.iter().map(|r| r.len()).max().unwrap_or(0);
        let mut grid = Self::new(width, height, 1.0, 0.0, 0.0, 0.0);
        for (y, row) in rows.iter().enumerate() {
            for (x, ch) in row.bytes().enumerate() {
                if ch != b'#' {
                    grid.set_walkable(x, y, true);
                }
            }
        }
        grid
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    pub fn cell_index(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }

    #[inline]
    pub fn in_bounds(&self, x: usize, y: usize) -> bool {
        x < self.width && y < self.height
    }

    #[inline]
    pub fn in_bounds_signed(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height
    }

    /// Out-of-bounds cells are blocked.
    #[inline]
    pub fn is_walkable(&self, x: usize, y: usize) -> bool {
        self.in_bounds(x, y) && self.cells[self.cell_index(x, y)] == WALKABLE
    }

    #[inline]
    pub fn is_walkable_cell(&self, cell: GridCell) -> bool {
        self.is_walkable(cell.x, cell.y)
    }

    #[inline]
    pub fn is_walkable_signed(&self, x: i64, y: i64) -> bool {
        self.in_bounds_signed(x, y) && self.cells[self.cell_index(x as usize, y as usize)] == WALKABLE
    }

    /// Mark a cell. Only valid while the grid is being built; if the buffer is
    /// already shared this copies it first.
    pub fn set_walkable(&mut self, x: usize, y: usize, walkable: bool) {
        if !self.in_bounds(x, y) {
            return;
        }
        let idx = self.cell_index(x, y);
        Arc::make_mut(&mut self.cells)[idx] = if walkable { WALKABLE } else { BLOCKED };
    }

    pub fn fill(&mut self, walkable: bool) {
        let value = if walkable { WALKABLE } else { BLOCKED };
        Arc::make_mut(&mut self.cells).fill(value);
    }

    /// Raw cell buffer.
    #[inline]
    pub fn cells(&self) -> &[u8] {
        &self.cells
    }

    /// Shared handle to the cell buffer.
    pub fn shared_cells(&self) -> Arc<Vec<u8>> {
        Arc::clone(&self.cells)
    }

    pub fn walkable_count(&self) -> usize {
        self.cells.iter().filter(|&&c| c == WALKABLE).count()
    }

    /// The whole grid as an inclusive rectangle. `None` for an empty grid.
    pub fn bounds(&self) -> Option<CellRect> {
        if self.is_empty() {
            return None;
        }
        Some(CellRect::new(0, 0, self.width - 1, self.height - 1))
    }

    /// Unclamped projection of a world position onto grid coordinates.
    #[inline]
    pub fn world_to_grid(&self, world: Point2D) -> (i64, i64) {
        let gx = (world.x * self.scale + self.offset_x).floor();
        let gy = (world.z * self.scale + self.offset_z).floor();
        (gx as i64, gy as i64)
    }

    /// Projection that fails for positions outside the grid.
    pub fn world_to_cell(&self, world: Point2D) -> Option<GridCell> {
        if !world.is_finite() {
            return None;
        }
        let (gx, gy) = self.world_to_grid(world);
        self.in_bounds_signed(gx, gy).then(|| GridCell::new(gx as usize, gy as usize))
    }

    /// Clamp signed grid coordinates into the grid. `None` for an empty grid.
    pub fn clamp_cell(&self, x: i64, y: i64) -> Option<GridCell> {
        if self.is_empty() {
            return None;
        }
        let cx = x.clamp(0, self.width as i64 - 1) as usize;
        let cy = y.clamp(0, self.height as i64 - 1) as usize;
        Some(GridCell::new(cx, cy))
    }

    /// Cell centre on the ground plane.
    #[inline]
    pub fn grid_to_point(&self, cell: GridCell) -> Point2D {
        Point2D::new(
            (cell.x as f32 + 0.5 - self.offset_x) / self.scale,
            (cell.y as f32 + 0.5 - self.offset_z) / self.scale,
        )
    }

    /// Cell centre at this domain's height.
    #[inline]
    pub fn grid_to_world(&self, cell: GridCell) -> Vec3 {
        let p = self.grid_to_point(cell);
        Vec3::new(p.x, self.domain_height, p.z)
    }

    /// Closest walkable cell to a world position.
    ///
    /// Tests the direct projection (clamped into the grid) first, then scans
    /// square rings of growing Chebyshev radius. The first ring holding any
    /// walkable cell wins; within it the cell with the smallest squared grid
    /// distance to the projection is returned.
    pub fn nearest_walkable(&self, world: Point2D) -> Option<GridCell> {
        if !world.is_finite() {
            return None;
        }
        let (gx, gy) = self.world_to_grid(world);
        let center = self.clamp_cell(gx, gy)?;
        self.nearest_walkable_to(center)
    }

    /// Ring scan around an in-bounds cell.
    pub fn nearest_walkable_to(&self, center: GridCell) -> Option<GridCell> {
        if self.is_walkable_cell(center) {
            return Some(center);
        }

        let cx = center.x as i64;
        let cy = center.y as i64;
        let max_radius = self.width.max(self.height) as i64;

        for r in 1..=max_radius {
            let mut best: Option<(i64, GridCell)> = None;
            for dy in -r..=r {
                let on_edge_row = dy == -r || dy == r;
                let step = if on_edge_row { 1 } else { 2 * r as usize };
                for dx in (-r..=r).step_by(step) {
                    let (x, y) = (cx + dx, cy + dy);
                    if !self.is_walkable_signed(x, y) {
                        continue;
                    }
                    let d2 = dx * dx + dy * dy;
                    if best.is_none_or(|(bd, _)| d2 < bd) {
                        best = Some((d2, GridCell::new(x as usize, y as usize)));
                    }
                }
            }
            if let Some((_, cell)) = best {
                return Some(cell);
            }
        }
        None
    }
}
