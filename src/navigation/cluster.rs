use bevy::prelude::*;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::time::Duration;
use super::math::FixedNum;
use super::types::{CellRect, ClusterId, EntranceId, GridCell};

/// A fixed-size tile of the grid. Clusters on the last row/column are clipped
/// to the grid bounds.
#[derive(Clone, Debug, PartialEq)]
pub struct Cluster {
    pub id: ClusterId,
    pub rect: CellRect,
    /// Entrances inside this cluster, in discovery order.
    pub entrances: Vec<EntranceId>,
}

/// A walkable border cell with a walkable neighbour in another cluster.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Entrance {
    pub id: EntranceId,
    pub cluster: ClusterId,
    pub cell: GridCell,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EdgeKind {
    /// Between adjacent entrances of neighbouring clusters (cost 1).
    Inter,
    /// Between two entrances of the same cluster (shortest in-cluster path).
    Intra,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AbstractEdge {
    pub target: EntranceId,
    pub cost: FixedNum,
    pub kind: EdgeKind,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ClusterGraphStats {
    pub clusters: usize,
    pub entrances: usize,
    pub inter_edges: usize,
    pub intra_edges: usize,
    pub build_time: Duration,
}

/// Abstract graph over cluster entrances.
///
/// Entrances live in an arena indexed by `EntranceId`; edges are stored as
/// undirected index pairs in a flat adjacency table (`edges[id]`), so the
/// graph has no shared ownership or cycles to manage. Immutable once built.
#[derive(Clone, Debug, Default)]
pub struct ClusterGraph {
    pub cluster_size: usize,
    pub clusters_x: usize,
    pub clusters_y: usize,
    pub clusters: Vec<Cluster>,
    pub entrances: Vec<Entrance>,
    pub(super) edges: Vec<SmallVec<[AbstractEdge; 8]>>,
    pub(super) entrance_lookup: FxHashMap<GridCell, EntranceId>,
    pub(super) build_time: Duration,
}

impl ClusterGraph {
    pub(super) fn with_layout(cluster_size: usize, grid_width: usize, grid_height: usize) -> Self {
        let clusters_x = grid_width.div_ceil(cluster_size);
        let clusters_y = grid_height.div_ceil(cluster_size);
        let mut clusters = Vec::with_capacity(clusters_x * clusters_y);
        for cy in 0..clusters_y {
            for cx in 0..clusters_x {
                let min_x = cx * cluster_size;
                let min_y = cy * cluster_size;
                let rect = CellRect::new(
                    min_x,
                    min_y,
                    (min_x + cluster_size).min(grid_width) - 1,
                    (min_y + cluster_size).min(grid_height) - 1,
                );
                clusters.push(Cluster { id: clusters.len(), rect, entrances: Vec::new() });
            }
        }
        Self {
            cluster_size,
            clusters_x,
            clusters_y,
            clusters,
            ..Default::default()
        }
    }

    #[inline]
    pub fn cluster(&self, id: ClusterId) -> Option<&Cluster> {
        self.clusters.get(id)
    }

    #[inline]
    pub fn entrance(&self, id: EntranceId) -> Option<&Entrance> {
        self.entrances.get(id)
    }

    /// O(1) lookup by coordinate.
    #[inline]
    pub fn entrance_at(&self, cell: GridCell) -> Option<EntranceId> {
        self.entrance_lookup.get(&cell).copied()
    }

    pub fn neighbors(&self, id: EntranceId) -> &[AbstractEdge] {
        self.edges.get(id).map(|e| e.as_slice()).unwrap_or(&[])
    }

    #[inline]
    pub fn entrance_count(&self) -> usize {
        self.entrances.len()
    }

    /// Number of undirected edges.
    pub fn edge_count(&self) -> usize {
        self.edges.iter().map(|e| e.len()).sum::<usize>() / 2
    }

    /// Cluster containing `cell`, by direct index with a linear-scan fallback.
    pub fn cluster_of(&self, cell: GridCell) -> Option<ClusterId> {
        if self.cluster_size > 0 {
            let cx = cell.x / self.cluster_size;
            let cy = cell.y / self.cluster_size;
            if cx < self.clusters_x && cy < self.clusters_y {
                let id = cy * self.clusters_x + cx;
                if self.clusters[id].rect.contains(cell) {
                    return Some(id);
                }
            }
        }
        let found = self.clusters.iter().find(|c| c.rect.contains(cell)).map(|c| c.id);
        if found.is_none() {
            error!("[HPA] Cell {:?} is not inside any cluster", cell);
        }
        found
    }

    /// Register an entrance at `cell`, or return the existing one.
    pub(super) fn add_entrance(&mut self, cluster: ClusterId, cell: GridCell) -> EntranceId {
        if let Some(&id) = self.entrance_lookup.get(&cell) {
            return id;
        }
        let id = self.entrances.len();
        self.entrances.push(Entrance { id, cluster, cell });
        self.edges.push(SmallVec::new());
        self.entrance_lookup.insert(cell, id);
        self.clusters[cluster].entrances.push(id);
        id
    }

    /// Insert an undirected edge. Re-adding an existing edge is a no-op.
    pub(super) fn add_edge(&mut self, a: EntranceId, b: EntranceId, cost: FixedNum, kind: EdgeKind) {
        if a == b || a >= self.edges.len() || b >= self.edges.len() {
            return;
        }
        if self.edges[a].iter().any(|e| e.target == b) {
            return;
        }
        self.edges[a].push(AbstractEdge { target: b, cost, kind });
        self.edges[b].push(AbstractEdge { target: a, cost, kind });
    }

    pub fn stats(&self) -> ClusterGraphStats {
        let mut inter = 0;
        let mut intra = 0;
        for edge in self.edges.iter().flatten() {
            match edge.kind {
                EdgeKind::Inter => inter += 1,
                EdgeKind::Intra => intra += 1,
            }
        }
        ClusterGraphStats {
            clusters: self.clusters.len(),
            entrances: self.entrances.len(),
            inter_edges: inter / 2,
            intra_edges: intra / 2,
            build_time: self.build_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_clips_last_clusters() {
        let graph = ClusterGraph::with_layout(32, 70, 40);
        assert_eq!((graph.clusters_x, graph.clusters_y), (3, 2));
        assert_eq!(graph.clusters[2].rect, CellRect::new(64, 0, 69, 31));
        assert_eq!(graph.clusters[5].rect, CellRect::new(64, 32, 69, 39));
    }

    #[test]
    fn test_cluster_of() {
        let graph = ClusterGraph::with_layout(32, 70, 40);
        assert_eq!(graph.cluster_of(GridCell::new(0, 0)), Some(0));
        assert_eq!(graph.cluster_of(GridCell::new(33, 5)), Some(1));
        assert_eq!(graph.cluster_of(GridCell::new(69, 39)), Some(5));
        assert_eq!(graph.cluster_of(GridCell::new(70, 0)), None);
    }

    #[test]
    fn test_add_edge_is_idempotent() {
        let mut graph = ClusterGraph::with_layout(4, 8, 4);
        let a = graph.add_entrance(0, GridCell::new(3, 1));
        let b = graph.add_entrance(1, GridCell::new(4, 1));
        assert_eq!(graph.add_entrance(1, GridCell::new(4, 1)), b);
        graph.add_edge(a, b, FixedNum::ONE, EdgeKind::Inter);
        graph.add_edge(b, a, FixedNum::ONE, EdgeKind::Inter);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.neighbors(a).len(), 1);
        assert_eq!(graph.neighbors(b)[0].target, a);
        assert_eq!(graph.stats().inter_edges, 1);
    }
}
