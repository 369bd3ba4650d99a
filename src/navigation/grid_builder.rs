//! Rasterizes city layout geometry onto walkability grids.
//!
//! Every feature is snapped to a cell-size multiple and marked by testing cell
//! centres against its world-space footprint. Adjacent features that share an
//! edge therefore meet without seams, whatever the grid scale.

use bevy::prelude::*;
use std::time::Instant;
use citynav_macros::profile;
use super::config::NavigationConfig;
use super::grid::WalkabilityGrid;
use super::types::{AgentClass, Crosswalk, GridCell, Plot, Point2D, WorldRect};

/// Round a world distance to the nearest cell multiple.
#[inline]
fn snap(value: f32, cell: f32) -> f32 {
    (value / cell).round() * cell
}

/// Write access to a grid under construction, in world coordinates.
pub struct Rasterizer<'a> {
    grid: &'a mut WalkabilityGrid,
    cell: f32,
}

impl<'a> Rasterizer<'a> {
    pub fn new(grid: &'a mut WalkabilityGrid) -> Self {
        let cell = 1.0 / grid.scale;
        Self { grid, cell }
    }

    #[inline]
    pub fn cell_size(&self) -> f32 {
        self.cell
    }

    #[inline]
    pub fn snap(&self, value: f32) -> f32 {
        snap(value, self.cell)
    }

    /// Visit every cell whose centre lies in `area` (inclusive bounds, for range only).
    fn for_cells_in(&mut self, area: WorldRect, mut test: impl FnMut(Point2D) -> bool) -> usize {
        if self.grid.is_empty() {
            return 0;
        }
        let (x0, y0) = self.grid.world_to_grid(area.min);
        let (x1, y1) = self.grid.world_to_grid(area.max);
        let max_x = self.grid.width as i64 - 1;
        let max_y = self.grid.height as i64 - 1;
        let (x0, x1) = (x0.clamp(0, max_x) as usize, x1.clamp(0, max_x) as usize);
        let (y0, y1) = (y0.clamp(0, max_y) as usize, y1.clamp(0, max_y) as usize);

        let mut marked = 0;
        for y in y0..=y1 {
            for x in x0..=x1 {
                let centre = self.grid.grid_to_point(GridCell::new(x, y));
                if test(centre) {
                    self.grid.set_walkable(x, y, true);
                    marked += 1;
                }
            }
        }
        marked
    }

    /// Mark cells inside `outer` but outside `inner` (both half-open).
    pub fn fill_ring(&mut self, outer: WorldRect, inner: WorldRect) -> usize {
        self.for_cells_in(outer, |p| {
            let in_outer = p.x >= outer.min.x && p.x < outer.max.x && p.z >= outer.min.z && p.z < outer.max.z;
            let in_inner = p.x >= inner.min.x && p.x < inner.max.x && p.z >= inner.min.z && p.z < inner.max.z;
            in_outer && !in_inner
        })
    }

    /// Mark cells inside a rectangle centred on `centre`, rotated by `angle`
    /// radians. `half_length` runs along the heading, `half_width` across it.
    pub fn fill_rotated_rect(&mut self, centre: Point2D, angle: f32, half_length: f32, half_width: f32) -> usize {
        let (sin, cos) = angle.sin_cos();
        let ext_x = half_length * cos.abs() + half_width * sin.abs();
        let ext_z = half_length * sin.abs() + half_width * cos.abs();
        let bbox = WorldRect::new(
            Point2D::new(centre.x - ext_x, centre.z - ext_z),
            Point2D::new(centre.x + ext_x, centre.z + ext_z),
        );
        self.for_cells_in(bbox, |p| {
            let dx = p.x - centre.x;
            let dz = p.z - centre.z;
            let along = dx * cos + dz * sin;
            let across = -dx * sin + dz * cos;
            along.abs() <= half_length && across.abs() <= half_width
        })
    }

    /// Mark cells whose centres lie within `radius` of `centre`.
    pub fn fill_disc(&mut self, centre: Point2D, radius: f32) -> usize {
        let bbox = WorldRect::new(
            Point2D::new(centre.x - radius, centre.z - radius),
            Point2D::new(centre.x + radius, centre.z + radius),
        );
        let r2 = radius * radius;
        self.for_cells_in(bbox, |p| p.distance_squared(centre) <= r2)
    }
}

/// Plot rectangle snapped to the grid and grown by `margin` on every side.
fn expanded_plot(plot: &Plot, cell: f32, margin: f32) -> WorldRect {
    let x = snap(plot.x, cell);
    let z = snap(plot.z, cell);
    let w = snap(plot.width, cell);
    let d = snap(plot.depth, cell);
    WorldRect::new(
        Point2D::new(x - margin, z - margin),
        Point2D::new(x + w + margin, z + d + margin),
    )
}

/// Per-domain marking rules.
pub trait WalkabilityRules {
    fn agent(&self) -> AgentClass;

    fn mark_plot(&self, raster: &mut Rasterizer, plot: &Plot);

    fn mark_crosswalk(&self, raster: &mut Rasterizer, crosswalk: &Crosswalk);
}

/// Sidewalk ring around every plot plus crosswalk footprints.
#[derive(Clone, Debug)]
pub struct PedestrianRules {
    pub sidewalk_width: f32,
    /// Painted width across the walking direction.
    pub crosswalk_width: f32,
}

impl PedestrianRules {
    pub fn from_config(config: &NavigationConfig) -> Self {
        Self {
            sidewalk_width: config.sidewalk_width,
            crosswalk_width: config.crosswalk_width(),
        }
    }
}

impl WalkabilityRules for PedestrianRules {
    fn agent(&self) -> AgentClass {
        AgentClass::Pedestrian
    }

    fn mark_plot(&self, raster: &mut Rasterizer, plot: &Plot) {
        let cell = raster.cell_size();
        let inner = expanded_plot(plot, cell, 0.0);
        let outer = expanded_plot(plot, cell, snap(self.sidewalk_width, cell));
        raster.fill_ring(outer, inner);
    }

    fn mark_crosswalk(&self, raster: &mut Rasterizer, crosswalk: &Crosswalk) {
        let centre = Point2D::new(raster.snap(crosswalk.position.x), raster.snap(crosswalk.position.z));
        let half_length = raster.snap(crosswalk.length) * 0.5;
        raster.fill_rotated_rect(centre, crosswalk.angle, half_length, self.crosswalk_width * 0.5);
    }
}

/// Road ring outside the sidewalk plus intersection pads at crosswalks.
#[derive(Clone, Debug)]
pub struct VehicleRules {
    pub sidewalk_width: f32,
    pub road_width: f32,
}

impl VehicleRules {
    pub fn from_config(config: &NavigationConfig) -> Self {
        Self {
            sidewalk_width: config.sidewalk_width,
            road_width: config.road_width,
        }
    }
}

impl WalkabilityRules for VehicleRules {
    fn agent(&self) -> AgentClass {
        AgentClass::Vehicle
    }

    fn mark_plot(&self, raster: &mut Rasterizer, plot: &Plot) {
        let cell = raster.cell_size();
        let sidewalk = snap(self.sidewalk_width, cell);
        let road = snap(self.road_width, cell);
        let inner = expanded_plot(plot, cell, sidewalk);
        let outer = expanded_plot(plot, cell, sidewalk + road);
        raster.fill_ring(outer, inner);
    }

    fn mark_crosswalk(&self, raster: &mut Rasterizer, crosswalk: &Crosswalk) {
        let centre = Point2D::new(raster.snap(crosswalk.position.x), raster.snap(crosswalk.position.z));
        raster.fill_disc(centre, self.road_width);
    }
}

/// Sizes a grid around the layout and applies a rule set to it.
pub struct GridBuilder<'a> {
    config: &'a NavigationConfig,
}

impl<'a> GridBuilder<'a> {
    pub fn new(config: &'a NavigationConfig) -> Self {
        Self { config }
    }

    /// World bounds of the layout, grown by the street margin and snapped
    /// outward to cell multiples. `None` when nothing valid was supplied.
    pub fn layout_bounds(&self, plots: &[Plot], crosswalks: &[Crosswalk]) -> Option<WorldRect> {
        let cell = self.config.cell_size();
        let margin = self.config.sidewalk_width + self.config.road_width + cell;

        let mut min = Point2D::new(f32::MAX, f32::MAX);
        let mut max = Point2D::new(f32::MIN, f32::MIN);
        let mut any = false;

        for plot in plots.iter().filter(|p| p.is_valid()) {
            min.x = min.x.min(plot.x);
            min.z = min.z.min(plot.z);
            max.x = max.x.max(plot.x + plot.width);
            max.z = max.z.max(plot.z + plot.depth);
            any = true;
        }
        if !any {
            return None;
        }
        for crosswalk in crosswalks.iter().filter(|c| c.is_valid()) {
            let reach = crosswalk.length * 0.5;
            min.x = min.x.min(crosswalk.position.x - reach);
            min.z = min.z.min(crosswalk.position.z - reach);
            max.x = max.x.max(crosswalk.position.x + reach);
            max.z = max.z.max(crosswalk.position.z + reach);
        }

        Some(WorldRect::new(
            Point2D::new(((min.x - margin) / cell).floor() * cell, ((min.z - margin) / cell).floor() * cell),
            Point2D::new(((max.x + margin) / cell).ceil() * cell, ((max.z + margin) / cell).ceil() * cell),
        ))
    }

    /// Allocate a fully blocked grid covering the layout.
    pub fn allocate(&self, plots: &[Plot], crosswalks: &[Crosswalk], agent: AgentClass) -> WalkabilityGrid {
        let scale = self.config.grid_scale;
        let height = self.config.domain_height(agent);
        let Some(bounds) = self.layout_bounds(plots, crosswalks) else {
            warn!("[GRID] No valid plots for {:?} grid; navigation will find no paths", agent);
            return WalkabilityGrid::new(0, 0, scale, 0.0, 0.0, height);
        };
        let width = ((bounds.max.x - bounds.min.x) * scale).round().max(0.0) as usize;
        let depth = ((bounds.max.z - bounds.min.z) * scale).round().max(0.0) as usize;
        let cells = width.checked_mul(depth);
        if cells.is_none_or(|n| n > self.config.max_grid_cells) {
            error!(
                "[GRID] Layout bounds {:?} need a {}x{} {:?} grid, over the {} cell limit; navigation will find no paths",
                bounds, width, depth, agent, self.config.max_grid_cells
            );
            return WalkabilityGrid::new(0, 0, scale, 0.0, 0.0, height);
        }
        WalkabilityGrid::new(width, depth, scale, -bounds.min.x * scale, -bounds.min.z * scale, height)
    }

    /// Build a grid and rasterize the layout with `rules`. Malformed plots and
    /// crosswalks are skipped with a warning.
    pub fn build<R: WalkabilityRules + ?Sized>(&self, rules: &R, plots: &[Plot], crosswalks: &[Crosswalk]) -> WalkabilityGrid {
        let start = Instant::now();
        let agent = rules.agent();
        let mut grid = self.allocate(plots, crosswalks, agent);

        let mut skipped = 0;
        {
            let mut raster = Rasterizer::new(&mut grid);
            for plot in plots {
                if !plot.is_valid() {
                    warn!("[GRID] Skipping plot {} with invalid geometry: {:?}", plot.id, plot);
                    skipped += 1;
                    continue;
                }
                rules.mark_plot(&mut raster, plot);
            }
            for crosswalk in crosswalks {
                if !crosswalk.is_valid() {
                    warn!("[GRID] Skipping crosswalk with invalid geometry: {:?}", crosswalk);
                    skipped += 1;
                    continue;
                }
                rules.mark_crosswalk(&mut raster, crosswalk);
            }
        }

        info!(
            "[GRID] Built {:?} grid {}x{} ({} walkable cells, {} features skipped) in {:?}",
            agent,
            grid.width,
            grid.height,
            grid.walkable_count(),
            skipped,
            start.elapsed()
        );
        grid
    }
}

#[profile(5)]
pub fn build_grid(config: &NavigationConfig, plots: &[Plot], crosswalks: &[Crosswalk], agent: AgentClass) -> WalkabilityGrid {
    let builder = GridBuilder::new(config);
    match agent {
        AgentClass::Pedestrian => builder.build(&PedestrianRules::from_config(config), plots, crosswalks),
        AgentClass::Vehicle => builder.build(&VehicleRules::from_config(config), plots, crosswalks),
    }
}

pub fn build_pedestrian_grid(config: &NavigationConfig, plots: &[Plot], crosswalks: &[Crosswalk]) -> WalkabilityGrid {
    build_grid(config, plots, crosswalks, AgentClass::Pedestrian)
}

pub fn build_vehicle_grid(config: &NavigationConfig, plots: &[Plot], crosswalks: &[Crosswalk]) -> WalkabilityGrid {
    build_grid(config, plots, crosswalks, AgentClass::Vehicle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_plot() -> Vec<Plot> {
        vec![Plot::new(1, 0.0, 0.0, 10.0, 10.0)]
    }

    fn cell_at(grid: &WalkabilityGrid, x: f32, z: f32) -> GridCell {
        grid.world_to_cell(Point2D::new(x, z)).unwrap()
    }

    #[test]
    fn test_bounds_include_street_margin() {
        let config = NavigationConfig::default();
        let grid = build_pedestrian_grid(&config, &single_plot(), &[]);
        // margin = 2 + 6 + 1 on each side of a 10x10 plot
        assert_eq!(grid.width, 28);
        assert_eq!(grid.height, 28);
        assert_eq!(grid.offset_x, 9.0);
        assert_eq!(grid.domain_height, config.pedestrian_height);
    }

    #[test]
    fn test_pedestrian_sidewalk_ring() {
        let config = NavigationConfig::default();
        let grid = build_pedestrian_grid(&config, &single_plot(), &[]);

        // plot interior blocked
        assert!(!grid.is_walkable_cell(cell_at(&grid, 5.0, 5.0)));
        // sidewalk walkable on every side
        assert!(grid.is_walkable_cell(cell_at(&grid, -1.5, 5.0)));
        assert!(grid.is_walkable_cell(cell_at(&grid, 11.5, 5.0)));
        assert!(grid.is_walkable_cell(cell_at(&grid, 5.0, -0.5)));
        assert!(grid.is_walkable_cell(cell_at(&grid, 5.0, 10.5)));
        assert!(grid.is_walkable_cell(cell_at(&grid, -1.5, -1.5)));
        // road blocked for pedestrians
        assert!(!grid.is_walkable_cell(cell_at(&grid, -4.5, 5.0)));

        // ring of 14x14 minus 10x10
        assert_eq!(grid.walkable_count(), 14 * 14 - 10 * 10);
    }

    #[test]
    fn test_vehicle_road_ring_excludes_sidewalk() {
        let config = NavigationConfig::default();
        let grid = build_vehicle_grid(&config, &single_plot(), &[]);

        assert!(!grid.is_walkable_cell(cell_at(&grid, -1.5, 5.0)));
        assert!(grid.is_walkable_cell(cell_at(&grid, -2.5, 5.0)));
        assert!(grid.is_walkable_cell(cell_at(&grid, -7.5, 5.0)));
        assert!(!grid.is_walkable_cell(cell_at(&grid, -8.5, 5.0)));
        assert_eq!(grid.walkable_count(), 26 * 26 - 14 * 14);
        assert_eq!(grid.domain_height, config.vehicle_height);
    }

    #[test]
    fn test_crosswalk_footprint_bridges_road() {
        let config = NavigationConfig::default();
        let plots = vec![Plot::new(1, 0.0, 0.0, 10.0, 10.0), Plot::new(2, 26.0, 0.0, 10.0, 10.0)];
        // crosses the 16-unit street between the two sidewalks, walking along x
        let crosswalks = vec![Crosswalk::new(Point2D::new(18.0, 5.0), 0.0, 12.0)];
        let grid = build_pedestrian_grid(&config, &plots, &crosswalks);

        for x in 12..24 {
            let c = cell_at(&grid, x as f32 + 0.5, 5.5);
            assert!(grid.is_walkable_cell(c), "crosswalk gap at x={}", x);
        }
        // 5.5 wide: cells with centres within 2.75 of z = 5
        assert!(grid.is_walkable_cell(cell_at(&grid, 18.5, 7.5)));
        assert!(!grid.is_walkable_cell(cell_at(&grid, 18.5, 8.5)));
    }

    #[test]
    fn test_rotated_crosswalk() {
        let config = NavigationConfig::default();
        let crosswalks = vec![Crosswalk::new(Point2D::new(-5.0, 5.0), std::f32::consts::FRAC_PI_2, 8.0)];
        let grid = build_pedestrian_grid(&config, &single_plot(), &crosswalks);
        // heading along z: long in z, narrow in x
        assert!(grid.is_walkable_cell(cell_at(&grid, -4.5, 8.5)));
        assert!(!grid.is_walkable_cell(cell_at(&grid, -8.5, 5.5)));
    }

    #[test]
    fn test_vehicle_intersection_pad() {
        let config = NavigationConfig::default();
        let crosswalks = vec![Crosswalk::new(Point2D::new(-5.0, 5.0), 0.0, 8.0)];
        let grid = build_vehicle_grid(&config, &single_plot(), &crosswalks);
        // pad covers the sidewalk cells within road_width of the centre
        assert!(grid.is_walkable_cell(cell_at(&grid, -1.5, 5.5)));
        assert!(!grid.is_walkable_cell(cell_at(&grid, -1.5, 10.5)));
    }

    #[test]
    fn test_invalid_features_are_skipped() {
        let config = NavigationConfig::default();
        let plots = vec![
            Plot::new(1, 0.0, 0.0, 10.0, 10.0),
            Plot::new(2, f32::NAN, 0.0, 10.0, 10.0),
            Plot::new(3, 0.0, 0.0, -4.0, 10.0),
        ];
        let crosswalks = vec![Crosswalk::new(Point2D::new(0.0, 0.0), f32::NAN, 4.0)];
        let grid = build_pedestrian_grid(&config, &plots, &crosswalks);
        let clean = build_pedestrian_grid(&config, &single_plot(), &[]);
        assert_eq!(grid, clean);
    }

    #[test]
    fn test_no_valid_plots_gives_empty_grid() {
        let config = NavigationConfig::default();
        let grid = build_pedestrian_grid(&config, &[Plot::new(1, f32::INFINITY, 0.0, 1.0, 1.0)], &[]);
        assert!(grid.is_empty());
    }

    #[test]
    fn test_adjacent_plots_share_seamless_sidewalk() {
        let config = NavigationConfig { grid_scale: 2.0, ..Default::default() };
        // two plots separated by exactly two sidewalks
        let plots = vec![Plot::new(1, 0.0, 0.0, 10.0, 10.0), Plot::new(2, 14.0, 0.0, 10.0, 10.0)];
        let grid = build_pedestrian_grid(&config, &plots, &[]);
        for step in 0..8 {
            let x = 10.0 + step as f32 * 0.5 + 0.25;
            assert!(grid.is_walkable_cell(cell_at(&grid, x, 5.25)), "seam at x={}", x);
        }
    }

    #[test]
    fn test_far_apart_plots_do_not_allocate_huge_grid() {
        let config = NavigationConfig::default();
        let plots = vec![Plot::new(1, 0.0, 0.0, 10.0, 10.0), Plot::new(2, 100_000.0, 100_000.0, 10.0, 10.0)];
        for agent in AgentClass::ALL {
            let grid = build_grid(&config, &plots, &[], agent);
            assert!(grid.is_empty(), "{:?} grid should be refused", agent);
        }

        // same layout fits once the limit allows it
        let config = NavigationConfig { max_grid_cells: 28 * 28, ..Default::default() };
        assert_eq!(build_pedestrian_grid(&config, &single_plot(), &[]).len(), 28 * 28);
        let config = NavigationConfig { max_grid_cells: 28 * 28 - 1, ..Default::default() };
        assert!(build_pedestrian_grid(&config, &single_plot(), &[]).is_empty());
    }
}
