use bevy::prelude::*;
use std::time::Instant;
use citynav_macros::profile;
use super::astar::SingleLevelSearch;
use super::cluster::{ClusterGraph, EdgeKind};
use super::grid::WalkabilityGrid;
use super::math::FixedNum;
use super::types::{CellRect, GridCell};

/// Build the abstract graph for `grid`.
///
/// # Phases
///
/// 1. **Clusters:** tile the grid into `cluster_size` blocks
/// 2. **Entrances:** scan each cluster's border for walkable cells that step
///    out into a walkable cell of another cluster
/// 3. **Inter-cluster edges:** cost 1 between entrances that are grid
///    neighbours in different clusters
/// 4. **Intra-cluster edges:** shortest path between every entrance pair of a
///    cluster, searched inside the cluster only, cost = steps
///
/// # Performance
///
/// Phase 4 dominates: O(E²) window searches per cluster for E entrances.
pub fn build_cluster_graph(grid: &WalkabilityGrid, cluster_size: usize, search: &SingleLevelSearch) -> ClusterGraph {
    let start = Instant::now();
    let cluster_size = cluster_size.max(1);
    let mut graph = ClusterGraph::with_layout(cluster_size, grid.width, grid.height);

    find_entrances(&mut graph, grid);
    connect_inter_cluster(&mut graph, grid);
    connect_intra_cluster(&mut graph, grid, search);

    graph.build_time = start.elapsed();
    let stats = graph.stats();
    info!(
        "[HPA] Cluster graph: {}x{} clusters of {}, {} entrances, {} inter / {} intra edges, built in {:?}",
        graph.clusters_x,
        graph.clusters_y,
        cluster_size,
        stats.entrances,
        stats.inter_edges,
        stats.intra_edges,
        stats.build_time
    );
    graph
}

/// Cells on the inner border of `rect`, each once, row by row.
fn border_cells(rect: CellRect) -> impl Iterator<Item = GridCell> {
    (rect.min_y..=rect.max_y).flat_map(move |y| {
        let full_row = y == rect.min_y || y == rect.max_y;
        let xs: Box<dyn Iterator<Item = usize>> = if full_row {
            Box::new(rect.min_x..=rect.max_x)
        } else if rect.min_x == rect.max_x {
            Box::new(std::iter::once(rect.min_x))
        } else {
            Box::new([rect.min_x, rect.max_x].into_iter())
        };
        xs.map(move |x| GridCell::new(x, y))
    })
}

/// Orthogonal neighbours of `cell` that lie inside the grid.
fn grid_neighbors(cell: GridCell, width: usize, height: usize) -> impl Iterator<Item = GridCell> {
    let GridCell { x, y } = cell;
    [
        (x.checked_sub(1), Some(y)),
        (Some(x + 1).filter(|&v| v < width), Some(y)),
        (Some(x), y.checked_sub(1)),
        (Some(x), Some(y + 1).filter(|&v| v < height)),
    ]
    .into_iter()
    .filter_map(|(nx, ny)| Some(GridCell::new(nx?, ny?)))
}

pub(super) fn find_entrances(graph: &mut ClusterGraph, grid: &WalkabilityGrid) {
    for cluster_id in 0..graph.clusters.len() {
        let rect = graph.clusters[cluster_id].rect;
        for cell in border_cells(rect) {
            if !grid.is_walkable_cell(cell) {
                continue;
            }
            let crosses = grid_neighbors(cell, grid.width, grid.height)
                .any(|n| !rect.contains(n) && grid.is_walkable_cell(n));
            if crosses {
                graph.add_entrance(cluster_id, cell);
            }
        }
    }
}

pub(super) fn connect_inter_cluster(graph: &mut ClusterGraph, grid: &WalkabilityGrid) {
    for id in 0..graph.entrances.len() {
        let entrance = graph.entrances[id];
        for n in grid_neighbors(entrance.cell, grid.width, grid.height) {
            let Some(other) = graph.entrance_at(n) else { continue };
            if graph.entrances[other].cluster != entrance.cluster {
                graph.add_edge(id, other, FixedNum::ONE, EdgeKind::Inter);
            }
        }
    }
}

#[profile(10)]
pub(super) fn connect_intra_cluster(graph: &mut ClusterGraph, grid: &WalkabilityGrid, search: &SingleLevelSearch) {
    for cluster_id in 0..graph.clusters.len() {
        let rect = graph.clusters[cluster_id].rect;
        let ids = graph.clusters[cluster_id].entrances.clone();
        for (i, &a) in ids.iter().enumerate() {
            for &b in &ids[i + 1..] {
                let from = graph.entrances[a].cell;
                let to = graph.entrances[b].cell;
                if let Some(cells) = search.find_cells_in(grid, rect, from, to, true) {
                    let steps = FixedNum::from_num(cells.len().saturating_sub(1));
                    graph.add_edge(a, b, steps, EdgeKind::Intra);
                }
            }
        }
    }
}
