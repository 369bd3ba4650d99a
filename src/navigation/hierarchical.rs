use bevy::prelude::*;
use fixedbitset::FixedBitSet;
use rustc_hash::FxHashMap;
use std::collections::BinaryHeap;
use citynav_macros::profile;
use super::astar::{cells_to_world, SearchOptions, SingleLevelSearch};
use super::cluster::{ClusterGraph, ClusterGraphStats};
use super::components::GridComponents;
use super::graph_build::build_cluster_graph;
use super::grid::WalkabilityGrid;
use super::math::FixedNum;
use super::types::{CellRect, ClusterId, EntranceId, GridCell, Point2D, State};

/// HPA* over one walkability grid.
///
/// # Algorithm
///
/// 1. **Snap:** both endpoints to their nearest walkable cell
/// 2. **Local:** endpoints in the same cluster are solved directly on the grid
/// 3. **Abstract:** A* over the entrance graph, seeded with every start-cluster
///    entrance reachable from the start cell inside its cluster. Expanding an
///    end-cluster entrance offers a virtual goal node whose cost includes the
///    in-cluster leg to the end cell, so the exit entrance is chosen by total
///    cost.
/// 4. **Refine:** walk the parent chain and stitch the seed leg, each hop and
///    the exit leg into one cell path
///
/// Anything that goes wrong in 3 or 4 falls back to a full-grid search. The
/// abstract graph is built once in [`HierarchicalSearch::new`] and never
/// mutated, so `&self` queries can run concurrently.
#[derive(Clone, Debug)]
pub struct HierarchicalSearch {
    grid: WalkabilityGrid,
    graph: ClusterGraph,
    components: GridComponents,
    search: SingleLevelSearch,
    /// Re-solve intra-cluster hops into full cell paths at query time.
    /// When false, hops contribute only their entrance cells.
    materialize_hops: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct HierarchyStats {
    pub graph: ClusterGraphStats,
    pub components: usize,
}

impl HierarchicalSearch {
    #[profile(20)]
    pub fn new(grid: WalkabilityGrid, cluster_size: usize, options: SearchOptions, materialize_hops: bool) -> Self {
        let search = SingleLevelSearch::new(options);
        let graph = build_cluster_graph(&grid, cluster_size, &search);
        let components = GridComponents::build(&grid);
        Self { grid, graph, components, search, materialize_hops }
    }

    pub fn grid(&self) -> &WalkabilityGrid {
        &self.grid
    }

    pub fn graph(&self) -> &ClusterGraph {
        &self.graph
    }

    pub fn single_level(&self) -> &SingleLevelSearch {
        &self.search
    }

    pub fn stats(&self) -> HierarchyStats {
        HierarchyStats {
            graph: self.graph.stats(),
            components: self.components.count(),
        }
    }

    /// Nearest walkable cell to a world position on this grid.
    pub fn nearest_walkable(&self, world: Point2D) -> Option<GridCell> {
        self.grid.nearest_walkable(world)
    }

    /// Whether two cells can reach each other at all.
    pub fn connected(&self, a: GridCell, b: GridCell) -> bool {
        self.components.connected(a, b)
    }

    /// World-space path between two positions, at the grid's domain height.
    pub fn find_path(&self, start: Point2D, end: Point2D) -> Option<Vec<Vec3>> {
        let start_cell = self.nearest_walkable(start)?;
        let end_cell = self.nearest_walkable(end)?;
        self.find_path_cells(start_cell, end_cell)
            .map(|cells| cells_to_world(&self.grid, &cells))
    }

    /// Cell path between two walkable cells.
    pub fn find_path_cells(&self, start: GridCell, end: GridCell) -> Option<Vec<GridCell>> {
        if !self.grid.is_walkable_cell(start) || !self.grid.is_walkable_cell(end) {
            return None;
        }
        if start == end {
            return Some(vec![start]);
        }
        if !self.components.connected(start, end) {
            debug!("[HPA] {:?} and {:?} are in different components", start, end);
            return None;
        }

        let (Some(start_cluster), Some(end_cluster)) = (self.graph.cluster_of(start), self.graph.cluster_of(end)) else {
            error!("[HPA] Could not assign {:?} -> {:?} to clusters; using full-grid search", start, end);
            return self.search.find_cells(&self.grid, start, end);
        };

        if start_cluster == end_cluster {
            return self.search.find_cells(&self.grid, start, end);
        }

        match self.abstract_search(start, end, start_cluster, end_cluster) {
            Some(cells) => Some(cells),
            None => {
                warn!(
                    "[HPA] Hierarchical search failed for {:?} -> {:?}; falling back to full-grid search",
                    start, end
                );
                self.search.find_cells(&self.grid, start, end)
            }
        }
    }

    fn cluster_rect(&self, id: ClusterId) -> Option<CellRect> {
        self.graph.cluster(id).map(|c| c.rect)
    }

    fn abstract_search(
        &self,
        start: GridCell,
        end: GridCell,
        start_cluster: ClusterId,
        end_cluster: ClusterId,
    ) -> Option<Vec<GridCell>> {
        let start_rect = self.cluster_rect(start_cluster)?;
        let end_rect = self.cluster_rect(end_cluster)?;
        let start_entrances = &self.graph.cluster(start_cluster)?.entrances;
        let end_entrances = &self.graph.cluster(end_cluster)?.entrances;
        if start_entrances.is_empty() || end_entrances.is_empty() {
            debug!("[HPA] Start or end cluster has no entrances");
            return None;
        }

        let end_cells: Vec<GridCell> = end_entrances
            .iter()
            .filter_map(|&id| self.graph.entrance(id).map(|e| e.cell))
            .collect();
        let heuristic = |cell: GridCell| -> FixedNum {
            let d = end_cells.iter().map(|&c| cell.manhattan(c)).min().unwrap_or(0);
            FixedNum::from_num(d)
        };

        let goal = self.graph.entrance_count();
        let mut open = BinaryHeap::new();
        let mut closed = FixedBitSet::with_capacity(goal + 1);
        let mut g_score: FxHashMap<usize, FixedNum> = FxHashMap::default();
        let mut parent: FxHashMap<usize, EntranceId> = FxHashMap::default();
        let mut seed_paths: FxHashMap<EntranceId, Vec<GridCell>> = FxHashMap::default();
        let mut exit_paths: FxHashMap<EntranceId, Vec<GridCell>> = FxHashMap::default();

        for &id in start_entrances {
            let cell = self.graph.entrance(id)?.cell;
            let Some(path) = self.search.find_cells_in(&self.grid, start_rect, start, cell, true) else {
                continue;
            };
            let g = FixedNum::from_num(path.len() - 1);
            seed_paths.insert(id, path);
            g_score.insert(id, g);
            open.push(State { cost: g + heuristic(cell), g, node: id });
        }

        while let Some(State { g, node, .. }) = open.pop() {
            if closed.contains(node) || g > g_score.get(&node).copied().unwrap_or(FixedNum::MAX) {
                continue;
            }
            if node == goal {
                return self.refine(goal, &parent, &seed_paths, &exit_paths);
            }
            closed.insert(node);

            let entrance = self.graph.entrance(node)?;
            if entrance.cluster == end_cluster {
                let exit = match exit_paths.get(&node) {
                    Some(path) => Some(path.len()),
                    None => self
                        .search
                        .find_cells_in(&self.grid, end_rect, entrance.cell, end, true)
                        .map(|path| {
                            let len = path.len();
                            exit_paths.insert(node, path);
                            len
                        }),
                };
                if let Some(len) = exit {
                    let total = g + FixedNum::from_num(len - 1);
                    if total < g_score.get(&goal).copied().unwrap_or(FixedNum::MAX) {
                        g_score.insert(goal, total);
                        parent.insert(goal, node);
                        open.push(State { cost: total, g: total, node: goal });
                    }
                }
            }

            for edge in self.graph.neighbors(node) {
                let tentative = g + edge.cost;
                if tentative < g_score.get(&edge.target).copied().unwrap_or(FixedNum::MAX) {
                    let Some(target) = self.graph.entrance(edge.target) else { continue };
                    g_score.insert(edge.target, tentative);
                    parent.insert(edge.target, node);
                    closed.set(edge.target, false);
                    open.push(State {
                        cost: tentative + heuristic(target.cell),
                        g: tentative,
                        node: edge.target,
                    });
                }
            }
        }

        None
    }

    /// Turn the abstract parent chain into a cell path.
    fn refine(
        &self,
        goal: usize,
        parent: &FxHashMap<usize, EntranceId>,
        seed_paths: &FxHashMap<EntranceId, Vec<GridCell>>,
        exit_paths: &FxHashMap<EntranceId, Vec<GridCell>>,
    ) -> Option<Vec<GridCell>> {
        let mut chain = Vec::new();
        let mut current = *parent.get(&goal)?;
        chain.push(current);
        // seeds have no parent
        while let Some(&prev) = parent.get(&current) {
            chain.push(prev);
            current = prev;
            if chain.len() > self.graph.entrance_count() {
                error!("[HPA] Parent chain does not terminate; abandoning reconstruction");
                return None;
            }
        }
        chain.reverse();

        let first = *chain.first()?;
        let last = *chain.last()?;
        let mut cells = seed_paths.get(&first)?.clone();

        for pair in chain.windows(2) {
            let a = self.graph.entrance(pair[0])?;
            let b = self.graph.entrance(pair[1])?;
            if self.materialize_hops && a.cluster == b.cluster {
                let rect = self.cluster_rect(a.cluster)?;
                let hop = self.search.find_cells_in(&self.grid, rect, a.cell, b.cell, true)?;
                cells.extend_from_slice(&hop[1..]);
            } else {
                cells.push(b.cell);
            }
        }

        cells.extend_from_slice(exit_paths.get(&last)?.get(1..)?);
        cells.dedup();
        Some(cells)
    }
}
