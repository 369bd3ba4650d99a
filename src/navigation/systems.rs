use bevy::prelude::*;
use super::config::NavigationConfig;
use super::service::NavigationService;
use super::types::{AgentClass, Crosswalk, Plot, Point2D, WorldRect};

/// Build (or rebuild) navigation for a finished city layout.
#[derive(Message, Debug, Clone)]
pub struct BuildNavigation {
    pub plots: Vec<Plot>,
    pub crosswalks: Vec<Crosswalk>,
}

#[derive(Message, Debug, Clone)]
pub struct PathRequest {
    pub entity: Entity,
    pub start: Point2D,
    pub goal: Point2D,
    pub agent: AgentClass,
}

/// Drop cached paths touching `area`, or the whole cache for `None`.
#[derive(Message, Debug, Clone)]
pub struct InvalidateNavigation {
    pub area: Option<WorldRect>,
}

/// Route handed to an entity in answer to a [`PathRequest`].
#[derive(Component, Debug, Clone, PartialEq)]
pub struct NavPath {
    pub waypoints: Vec<Vec3>,
    pub length: f32,
    pub current_index: usize,
}

impl NavPath {
    pub fn current(&self) -> Option<Vec3> {
        self.waypoints.get(self.current_index).copied()
    }

    pub fn advance(&mut self) -> Option<Vec3> {
        if self.current_index < self.waypoints.len() {
            self.current_index += 1;
        }
        self.current()
    }

    pub fn is_finished(&self) -> bool {
        self.current_index >= self.waypoints.len()
    }
}

/// Marker for entities whose last request found no route.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct NavPathFailed;

pub(super) fn build_navigation(
    mut requests: MessageReader<BuildNavigation>,
    mut commands: Commands,
    config: Res<NavigationConfig>,
) {
    // only the newest layout matters
    let Some(request) = requests.read().last() else { return };
    info!(
        "[NAV] Building navigation for {} plots and {} crosswalks",
        request.plots.len(),
        request.crosswalks.len()
    );
    let service = NavigationService::build(config.clone(), &request.plots, &request.crosswalks);
    commands.insert_resource(service);
}

pub(super) fn process_path_requests(
    mut path_requests: MessageReader<PathRequest>,
    mut commands: Commands,
    service: Option<Res<NavigationService>>,
) {
    if path_requests.is_empty() {
        return;
    }
    let Some(service) = service else {
        warn!("[NAV] {} path requests dropped: navigation not built yet", path_requests.len());
        path_requests.clear();
        return;
    };

    let start_time = std::time::Instant::now();
    let mut count = 0;
    for request in path_requests.read() {
        count += 1;
        let result = service.find_path(request.start, request.goal, request.agent);
        let Ok(mut entity) = commands.get_entity(request.entity) else {
            continue;
        };
        match result.path {
            Some(waypoints) => {
                entity.try_remove::<NavPathFailed>();
                entity.try_insert(NavPath { waypoints, length: result.length, current_index: 0 });
            }
            None => {
                entity.try_remove::<NavPath>();
                entity.try_insert(NavPathFailed);
            }
        }
    }

    let elapsed = start_time.elapsed();
    if elapsed.as_millis() > 100 {
        warn!("[NAV] Slow batch: {:?} for {} path requests", elapsed, count);
    }
}

pub(super) fn apply_invalidations(
    mut invalidations: MessageReader<InvalidateNavigation>,
    service: Option<Res<NavigationService>>,
) {
    let Some(service) = service else {
        invalidations.clear();
        return;
    };
    for message in invalidations.read() {
        match message.area {
            Some(area) => {
                service.invalidate_area(area);
            }
            None => {
                service.invalidate_all();
            }
        }
    }
}
