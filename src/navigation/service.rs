use bevy::prelude::*;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;
use citynav_macros::profile;
use super::astar::{cells_to_world, SearchOptions};
use super::config::NavigationConfig;
use super::grid::WalkabilityGrid;
use super::grid_builder::build_grid;
use super::hierarchical::{HierarchicalSearch, HierarchyStats};
use super::path_cache::{PathCache, PathCacheStats};
use super::simplify::polyline_length;
use super::types::{AgentClass, CellRect, Crosswalk, GridCell, PathResult, Plot, Point2D, WorldRect};

/// Navigation for every agent class: one grid and one HPA* per class, plus a
/// shared path cache.
///
/// Built once per city layout and handed to consumers as a bevy resource (or
/// by reference). Queries take `&self`; only the cache is guarded by a lock,
/// and the lock is never held while searching.
///
/// # Example
///
/// ```rust,ignore
/// let service = NavigationService::build(config, &plots, &crosswalks);
/// let result = service.find_path(Point2D::new(3.0, 4.0), Point2D::new(90.0, 12.0), AgentClass::Pedestrian);
/// if let Some(waypoints) = result.path {
///     // walk them
/// }
/// ```
#[derive(Resource)]
pub struct NavigationService {
    config: NavigationConfig,
    domains: [HierarchicalSearch; 2],
    cache: Mutex<PathCache>,
}

impl NavigationService {
    /// Rasterize the layout for both agent classes and precompute their
    /// cluster graphs.
    #[profile(50)]
    pub fn build(config: NavigationConfig, plots: &[Plot], crosswalks: &[Crosswalk]) -> Self {
        let pedestrian = build_grid(&config, plots, crosswalks, AgentClass::Pedestrian);
        let vehicle = build_grid(&config, plots, crosswalks, AgentClass::Vehicle);
        Self::from_grids(config, pedestrian, vehicle)
    }

    /// Wrap prebuilt grids.
    pub fn from_grids(config: NavigationConfig, pedestrian: WalkabilityGrid, vehicle: WalkabilityGrid) -> Self {
        let start = Instant::now();
        let options = SearchOptions::from_config(&config);
        let build = |grid| HierarchicalSearch::new(grid, config.cluster_size, options, config.materialize_hops);
        let domains = [build(pedestrian), build(vehicle)];
        let cache = Mutex::new(PathCache::from_config(&config));
        info!(
            "[NAV] Navigation ready in {:?}: pedestrian {} entrances, vehicle {} entrances",
            start.elapsed(),
            domains[0].graph().entrance_count(),
            domains[1].graph().entrance_count()
        );
        Self { config, domains, cache }
    }

    pub fn config(&self) -> &NavigationConfig {
        &self.config
    }

    pub fn domain(&self, agent: AgentClass) -> &HierarchicalSearch {
        &self.domains[agent.as_index()]
    }

    pub fn grid(&self, agent: AgentClass) -> &WalkabilityGrid {
        self.domain(agent).grid()
    }

    pub fn hierarchy_stats(&self, agent: AgentClass) -> HierarchyStats {
        self.domain(agent).stats()
    }

    /// Grid cell under a world position, if it lies on the grid.
    pub fn world_to_grid(&self, world: Point2D, agent: AgentClass) -> Option<GridCell> {
        self.grid(agent).world_to_cell(world)
    }

    pub fn nearest_walkable(&self, world: Point2D, agent: AgentClass) -> Option<GridCell> {
        self.domain(agent).nearest_walkable(world)
    }

    fn lock_cache(&self) -> MutexGuard<'_, PathCache> {
        self.cache.lock().unwrap_or_else(|poisoned| {
            warn!("[PATH CACHE] Cache mutex was poisoned; continuing with its last state");
            poisoned.into_inner()
        })
    }

    pub fn find_path(&self, start: Point2D, end: Point2D, agent: AgentClass) -> PathResult {
        self.find_path_with(start, end, agent, None, None)
    }

    /// As [`NavigationService::find_path`], reusing endpoint cells the caller
    /// already knows.
    pub fn find_path_with(
        &self,
        start: Point2D,
        end: Point2D,
        agent: AgentClass,
        start_cell: Option<GridCell>,
        end_cell: Option<GridCell>,
    ) -> PathResult {
        self.find_path_at(start, end, agent, start_cell, end_cell, Instant::now())
    }

    /// Query with an explicit clock for cache expiry.
    pub fn find_path_at(
        &self,
        start: Point2D,
        end: Point2D,
        agent: AgentClass,
        start_cell: Option<GridCell>,
        end_cell: Option<GridCell>,
        now: Instant,
    ) -> PathResult {
        let domain = self.domain(agent);
        let grid = domain.grid();

        let resolve = |known: Option<GridCell>, world: Point2D| match known {
            Some(cell) if grid.is_walkable_cell(cell) => Some(cell),
            Some(cell) if grid.in_bounds(cell.x, cell.y) => grid.nearest_walkable_to(cell),
            _ => domain.nearest_walkable(world),
        };
        let (Some(start_cell), Some(end_cell)) = (resolve(start_cell, start), resolve(end_cell, end)) else {
            debug!("[NAV] No walkable {:?} cell near {:?} or {:?}", agent, start, end);
            return PathResult::none();
        };

        if start_cell == end_cell {
            return PathResult::found(vec![grid.grid_to_world(start_cell)], 0.0);
        }

        if let Some((path, length)) = self.lock_cache().get_at(start_cell, end_cell, agent, now) {
            return PathResult::found(path, length);
        }

        let Some(cells) = domain.find_path_cells(start_cell, end_cell) else {
            debug!("[NAV] No {:?} path from {:?} to {:?}", agent, start_cell, end_cell);
            return PathResult::none();
        };
        let world = cells_to_world(grid, &cells);
        let length = polyline_length(&world);
        let stored = self.lock_cache().put_at(start_cell, end_cell, agent, &world, length, now);
        PathResult::found(stored, length)
    }

    pub fn cache_stats(&self) -> PathCacheStats {
        self.lock_cache().stats()
    }

    /// Drop cached paths that start or end inside `area`, for every agent
    /// class. The grids themselves are not rebuilt.
    pub fn invalidate_area(&self, area: WorldRect) -> usize {
        let mut cache = self.lock_cache();
        let mut removed = 0;
        for agent in AgentClass::ALL {
            let grid = self.grid(agent);
            let (min_x, min_y) = grid.world_to_grid(area.min);
            let (max_x, max_y) = grid.world_to_grid(area.max);
            let (Some(lo), Some(hi)) = (grid.clamp_cell(min_x, min_y), grid.clamp_cell(max_x, max_y)) else {
                continue;
            };
            let outside = max_x < 0 || max_y < 0 || min_x >= grid.width as i64 || min_y >= grid.height as i64;
            if outside {
                continue;
            }
            removed += cache.invalidate_area_for(agent, CellRect::new(lo.x, lo.y, hi.x, hi.y));
        }
        info!("[PATH CACHE] Invalidated {} cached paths in {:?}", removed, area);
        removed
    }

    pub fn invalidate_all(&self) -> usize {
        let removed = self.lock_cache().invalidate_all();
        info!("[PATH CACHE] Invalidated all {} cached paths", removed);
        removed
    }

    pub fn trim_cache(&self, target: usize) -> usize {
        self.lock_cache().trim(target)
    }

    pub fn purge_expired(&self) -> usize {
        self.lock_cache().purge_expired(Instant::now())
    }
}
