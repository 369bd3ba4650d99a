//! City navigation: walkability grids, HPA* and the shared path cache.
//!
//! Pedestrians and vehicles each get their own grid, rasterized from the same
//! city layout, and their own cluster graph. [`NavigationService`] is the entry
//! point; [`NavigationPlugin`] wires it into a bevy app through messages.

mod math;
mod types;
mod config;
mod grid;
mod grid_builder;
mod astar;
mod cluster;
mod graph_build;
mod components;
mod hierarchical;
mod simplify;
mod path_cache;
mod service;
mod systems;


// ============================================================================
// PUBLIC API
// ============================================================================

pub use math::{FixedNum, DIAGONAL_COST, STRAIGHT_COST};
pub use types::{AgentClass, CellRect, ClusterId, Crosswalk, EntranceId, GridCell, PathResult, Plot, Point2D, WorldRect, DEFAULT_CLUSTER_SIZE};
pub use config::{ConfigError, Heuristic, NavigationConfig, SearchAlgorithm};
pub use grid::{WalkabilityGrid, BLOCKED, WALKABLE};
pub use grid_builder::{build_grid, build_pedestrian_grid, build_vehicle_grid, GridBuilder, PedestrianRules, Rasterizer, VehicleRules, WalkabilityRules};
pub use astar::{cells_to_world, path_cost, SearchOptions, SingleLevelSearch};
pub use cluster::{AbstractEdge, Cluster, ClusterGraph, ClusterGraphStats, EdgeKind, Entrance};
pub use graph_build::build_cluster_graph;
pub use components::GridComponents;
pub use hierarchical::{HierarchicalSearch, HierarchyStats};
pub use simplify::{polyline_length, simplify_rdp};
pub use path_cache::{PathCache, PathCacheStats, PathKey};
pub use service::NavigationService;
pub use systems::{BuildNavigation, InvalidateNavigation, NavPath, NavPathFailed, PathRequest};

use bevy::prelude::*;

/// Registers navigation messages and systems.
///
/// Uses the [`NavigationConfig`] resource if one is already inserted,
/// otherwise the defaults. The [`NavigationService`] resource appears after
/// the first [`BuildNavigation`] message.
pub struct NavigationPlugin;

impl Plugin for NavigationPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<NavigationConfig>();
        app.add_message::<BuildNavigation>();
        app.add_message::<PathRequest>();
        app.add_message::<InvalidateNavigation>();
        app.add_systems(
            Update,
            (
                systems::build_navigation,
                systems::apply_invalidations,
                systems::process_path_requests,
            )
                .chain(),
        );
    }
}
