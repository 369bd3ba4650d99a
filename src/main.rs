use bevy::prelude::*;

use citynav::navigation::{
    AgentClass, BuildNavigation, Crosswalk, NavPath, NavPathFailed, NavigationConfig, NavigationPlugin,
    NavigationService, PathRequest, Plot, Point2D,
};

use bevy::app::ScheduleRunnerPlugin;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const CONFIG_PATH: &str = "assets/navigation.ron";
const LOG_PREFIX: &str = "citynav";
const AGENTS_PER_CLASS: usize = 200;

fn setup_file_logging() -> String {
    let log_dir = PathBuf::from("logs");
    if let Err(e) = fs::create_dir_all(&log_dir) {
        eprintln!("Failed to create logs directory: {}", e);
    }

    cleanup_old_logs(&log_dir, 25);

    let now = chrono::Local::now();
    let log_filename = format!("{}_{}.log", LOG_PREFIX, now.format("%Y%m%d_%H%M%S"));
    let log_path_str = log_dir.join(&log_filename).to_string_lossy().to_string();

    // one file per run
    let file_appender = RollingFileAppender::new(Rotation::NEVER, &log_dir, &log_filename);

    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false);

    let stdout_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(false);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("bevy_ecs=info,citynav=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();

    log_path_str
}

fn cleanup_old_logs(log_dir: &Path, keep_count: usize) {
    let Ok(entries) = fs::read_dir(log_dir) else { return };
    let mut log_files: Vec<_> = entries
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path()
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|s| s.starts_with(LOG_PREFIX) && s.ends_with(".log"))
        })
        .collect();

    // oldest first
    log_files.sort_by_key(|e| e.metadata().ok().and_then(|m| m.modified().ok()));

    if log_files.len() > keep_count {
        for file in log_files.iter().take(log_files.len() - keep_count) {
            let _ = fs::remove_file(file.path());
        }
    }
}

/// A procedurally laid out block grid: square plots separated by streets,
/// with a crosswalk halfway along every street segment.
#[derive(Resource, Clone, Debug)]
struct CityLayout {
    plots: Vec<Plot>,
    crosswalks: Vec<Crosswalk>,
    extent: Point2D,
}

impl CityLayout {
    fn generate(rng: &mut StdRng, config: &NavigationConfig, blocks_x: usize, blocks_z: usize) -> Self {
        let street = 2.0 * config.sidewalk_width + config.road_width;
        let block = 40.0;
        let pitch = block + street;
        let mut plots = Vec::new();
        let mut crosswalks = Vec::new();

        for bz in 0..blocks_z {
            for bx in 0..blocks_x {
                let x0 = bx as f32 * pitch;
                let z0 = bz as f32 * pitch;
                // roughly one block in ten is left empty as a plaza
                if !rng.random_bool(0.1) {
                    plots.push(Plot::new(plots.len() as u64, x0, z0, block, block));
                }

                if bx + 1 < blocks_x {
                    let position = Point2D::new(x0 + block + street * 0.5, z0 + block * 0.5);
                    crosswalks.push(Crosswalk::new(position, 0.0, street));
                }
                if bz + 1 < blocks_z {
                    let position = Point2D::new(x0 + block * 0.5, z0 + block + street * 0.5);
                    crosswalks.push(Crosswalk::new(position, std::f32::consts::FRAC_PI_2, street));
                }
            }
        }

        let extent = Point2D::new(blocks_x as f32 * pitch - street, blocks_z as f32 * pitch - street);
        Self { plots, crosswalks, extent }
    }
}

#[derive(Component)]
struct DemoAgent;

#[derive(Resource)]
struct DemoState {
    rng: StdRng,
    dispatched_at: Option<Instant>,
    expected: usize,
}

fn request_build(layout: Res<CityLayout>, mut build: MessageWriter<BuildNavigation>) {
    info!(
        "[NAV] Requesting navigation for {} plots and {} crosswalks",
        layout.plots.len(),
        layout.crosswalks.len()
    );
    build.write(BuildNavigation {
        plots: layout.plots.clone(),
        crosswalks: layout.crosswalks.clone(),
    });
}

fn dispatch_queries(
    mut commands: Commands,
    mut state: ResMut<DemoState>,
    layout: Res<CityLayout>,
    service: Option<Res<NavigationService>>,
    mut requests: MessageWriter<PathRequest>,
) {
    if state.dispatched_at.is_some() || service.is_none() {
        return;
    }

    let extent = layout.extent;
    for agent in AgentClass::ALL {
        for _ in 0..AGENTS_PER_CLASS {
            let start = Point2D::new(state.rng.random_range(0.0..extent.x), state.rng.random_range(0.0..extent.z));
            let goal = Point2D::new(state.rng.random_range(0.0..extent.x), state.rng.random_range(0.0..extent.z));
            let entity = commands.spawn(DemoAgent).id();
            requests.write(PathRequest { entity, start, goal, agent });
        }
    }
    state.expected = AgentClass::ALL.len() * AGENTS_PER_CLASS;
    state.dispatched_at = Some(Instant::now());
    info!("[NAV] Dispatched {} path requests", state.expected);
}

fn report_results(
    state: Res<DemoState>,
    agents: Query<(Option<&NavPath>, Has<NavPathFailed>), With<DemoAgent>>,
    service: Option<Res<NavigationService>>,
    mut exit: MessageWriter<AppExit>,
) {
    let (Some(dispatched_at), Some(service)) = (state.dispatched_at, service) else { return };

    let mut found = 0;
    let mut failed = 0;
    let mut total_length = 0.0;
    for (path, has_failed) in &agents {
        if let Some(path) = path {
            found += 1;
            total_length += path.length;
        } else if has_failed {
            failed += 1;
        }
    }
    if found + failed < state.expected {
        return;
    }

    info!(
        "[NAV] {} routes found, {} unreachable in {:?} (mean length {:.1})",
        found,
        failed,
        dispatched_at.elapsed(),
        if found > 0 { total_length / found as f32 } else { 0.0 }
    );
    for agent in AgentClass::ALL {
        let stats = service.hierarchy_stats(agent);
        info!(
            "[HPA] {:?}: {} clusters, {} entrances, {} inter / {} intra edges, {} components",
            agent,
            stats.graph.clusters,
            stats.graph.entrances,
            stats.graph.inter_edges,
            stats.graph.intra_edges,
            stats.components
        );
    }
    let cache = service.cache_stats();
    info!(
        "[PATH CACHE] {} entries, {} hits, {} misses ({:.0}% hit rate), {} evictions",
        cache.size,
        cache.hits,
        cache.misses,
        cache.hit_rate() * 100.0,
        cache.evictions
    );
    exit.write(AppExit::Success);
}

fn main() {
    let log_file = setup_file_logging();

    println!("╔══════════════════════════════════════════════════════════╗");
    println!("║  citynav - Logging to file                               ║");
    println!("╠══════════════════════════════════════════════════════════╣");
    println!("║  Log file: {:<45} ║", log_file);
    println!("╚══════════════════════════════════════════════════════════╝");

    let seed = std::env::args().nth(1).and_then(|s| s.parse().ok()).unwrap_or(42);
    let config = NavigationConfig::load_or_default(CONFIG_PATH);
    let mut rng = StdRng::seed_from_u64(seed);
    let layout = CityLayout::generate(&mut rng, &config, 6, 6);
    info!("[NAV] City seed {}: {:.0} x {:.0} world units", seed, layout.extent.x, layout.extent.z);

    App::new()
        .add_plugins(MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(Duration::from_millis(16))))
        .insert_resource(config)
        .insert_resource(layout)
        .insert_resource(DemoState { rng, dispatched_at: None, expected: 0 })
        .add_plugins(NavigationPlugin)
        .add_systems(Startup, request_build)
        .add_systems(Update, (dispatch_queries, report_results))
        .run();
}
