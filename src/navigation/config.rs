use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use super::types::{AgentClass, DEFAULT_CLUSTER_SIZE};

/// Distance estimate used to order the single-level open set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Heuristic {
    #[default]
    Manhattan,
    Octile,
    Chebyshev,
    Euclidean,
}

/// Which single-level finder to run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchAlgorithm {
    /// Jump point search. Only prunes when diagonal movement is enabled;
    /// 4-connected searches use plain A*.
    #[default]
    JumpPoint,
    AStar,
}

/// Navigation options, read once when the service is constructed.
///
/// All distances are in world units unless the name says otherwise. The whole
/// struct can be loaded from a RON file; missing fields take their defaults.
#[derive(Resource, Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct NavigationConfig {
    // Grid
    pub grid_scale: f32,
    pub cluster_size: usize,
    /// Upper bound on cells per agent grid. A layout whose bounds need more
    /// gets an empty grid instead of an oversized allocation.
    pub max_grid_cells: usize,

    // Street geometry
    pub sidewalk_width: f32,
    pub road_width: f32,
    pub crosswalk_stripe_count: u32,
    pub crosswalk_stripe_width: f32,
    pub crosswalk_stripe_gap: f32,

    // Heights of returned path points
    pub pedestrian_height: f32,
    pub vehicle_height: f32,

    // Search
    pub allow_diagonal: bool,
    pub heuristic: Heuristic,
    pub search_algorithm: SearchAlgorithm,
    pub materialize_hops: bool,

    // Path cache
    pub cache_max_entries: usize,
    pub cache_expiration_secs: f32,
    pub simplify_tolerance: f32,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            grid_scale: 1.0,
            cluster_size: DEFAULT_CLUSTER_SIZE,
            max_grid_cells: 64_000_000,
            sidewalk_width: 2.0,
            road_width: 6.0,
            crosswalk_stripe_count: 6,
            crosswalk_stripe_width: 0.5,
            crosswalk_stripe_gap: 0.5,
            pedestrian_height: 0.1,
            vehicle_height: 0.05,
            allow_diagonal: true,
            heuristic: Heuristic::Manhattan,
            search_algorithm: SearchAlgorithm::JumpPoint,
            materialize_hops: true,
            cache_max_entries: 1000,
            cache_expiration_secs: 300.0,
            simplify_tolerance: 0.5,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(String),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "failed to read navigation config: {}", e),
            ConfigError::Parse(msg) => write!(f, "failed to parse navigation config: {}", msg),
            ConfigError::Invalid(msg) => write!(f, "invalid navigation config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl NavigationConfig {
    /// Parse a RON document and validate it.
    pub fn from_ron_str(contents: &str) -> Result<Self, ConfigError> {
        let config: NavigationConfig = ron::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_ron_str(&contents)
    }

    /// Load from `path`, logging and falling back to defaults on any failure.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(config) => {
                info!("[NAV] Loaded navigation config from {}", path.display());
                config
            }
            Err(e) => {
                error!("[NAV] {} ({})", e, path.display());
                error!("[NAV] Using default NavigationConfig");
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.grid_scale.is_finite() && self.grid_scale > 0.0) {
            return Err(ConfigError::Invalid(format!("grid_scale must be positive, got {}", self.grid_scale)));
        }
        if self.cluster_size == 0 {
            return Err(ConfigError::Invalid("cluster_size must be at least 1".into()));
        }
        if self.max_grid_cells == 0 {
            return Err(ConfigError::Invalid("max_grid_cells must be at least 1".into()));
        }
        if self.cache_max_entries == 0 {
            return Err(ConfigError::Invalid("cache_max_entries must be at least 1".into()));
        }
        let non_negative = [
            ("sidewalk_width", self.sidewalk_width),
            ("road_width", self.road_width),
            ("crosswalk_stripe_width", self.crosswalk_stripe_width),
            ("crosswalk_stripe_gap", self.crosswalk_stripe_gap),
            ("cache_expiration_secs", self.cache_expiration_secs),
            ("simplify_tolerance", self.simplify_tolerance),
        ];
        for (name, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::Invalid(format!("{} must be a non-negative number, got {}", name, value)));
            }
        }
        Ok(())
    }

    /// World-space edge length of one grid cell.
    #[inline]
    pub fn cell_size(&self) -> f32 {
        1.0 / self.grid_scale
    }

    pub fn cache_expiration(&self) -> Duration {
        Duration::from_secs_f32(self.cache_expiration_secs)
    }

    /// Total width of a crosswalk's painted area, across the walking direction.
    pub fn crosswalk_width(&self) -> f32 {
        let count = self.crosswalk_stripe_count.max(1) as f32;
        count * self.crosswalk_stripe_width + (count - 1.0) * self.crosswalk_stripe_gap
    }

    pub fn domain_height(&self, agent: AgentClass) -> f32 {
        match agent {
            AgentClass::Pedestrian => self.pedestrian_height,
            AgentClass::Vehicle => self.vehicle_height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_ron_uses_defaults() {
        let config = NavigationConfig::from_ron_str("(cluster_size: 16, heuristic: Octile)").unwrap();
        assert_eq!(config.cluster_size, 16);
        assert_eq!(config.heuristic, Heuristic::Octile);
        assert_eq!(config.road_width, NavigationConfig::default().road_width);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = NavigationConfig::from_ron_str("(grid_scale: 0.0)").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)), "got {:?}", err);

        let err = NavigationConfig::from_ron_str("(cluster_size: 0)").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = NavigationConfig::from_ron_str("(max_grid_cells: 0)").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = NavigationConfig::from_ron_str("(sidewalk_width: -1.0)").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_malformed_ron_is_parse_error() {
        let err = NavigationConfig::from_ron_str("(cluster_size: \"big\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file_falls_back_to_default() {
        let config = NavigationConfig::load_or_default("does/not/exist/navigation.ron");
        assert_eq!(config, NavigationConfig::default());
    }

    #[test]
    fn test_crosswalk_width() {
        let config = NavigationConfig::default();
        // 6 stripes of 0.5 plus 5 gaps of 0.5
        assert!((config.crosswalk_width() - 5.5).abs() < 1e-6);
    }

    #[test]
    fn test_json_round_trip() {
        let config = NavigationConfig { allow_diagonal: false, ..Default::default() };
        let json = serde_json::to_string(&config).unwrap();
        let back: NavigationConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }
}
