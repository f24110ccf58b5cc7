//! Environment and simulator configuration

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use crate::sim::{IlandBridge, WorkspaceManager};
use crate::state::SpeciesCatalog;

/// Grids larger than this are rejected; observations are dense buffers.
pub const MAX_GRID_SIZE: usize = 4096;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("species catalog is empty")]
    EmptySpeciesCatalog,
    #[error("{count} species do not fit the observation alphabet (max {max})")]
    TooManySpecies { count: usize, max: usize },
    #[error("invalid species name {0:?}")]
    InvalidSpeciesName(String),
    #[error("grid size must be in 1..={max}, got {size}")]
    GridSize { size: usize, max: usize },
    #[error("seedling target must be at least 1")]
    ZeroSeedlingTarget,
    #[error("spacing threshold must be a finite non-negative number, got {0}")]
    InvalidSpacing(f64),
    #[error("environment variable {key}={value:?} could not be parsed")]
    InvalidEnvVar { key: String, value: String },
}

/// What the agent sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObservationMode {
    /// One channel: 0 plantable, 1 keepout, `2 + species` planted
    #[default]
    GridSpecies,
    /// Two channels: nearest-seedling distance (0-255) and the grid-species code
    SpacingAware,
    /// Three RGB channels, 0-255
    ColorCoded,
}

/// How the agent acts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActionMode {
    /// `[-1, 1]^3`: x, y, species
    #[default]
    Continuous,
    /// Move a cursor one cell or plant a species at the cursor
    DiscreteWalker,
}

/// What happens to the episode when the simulator cannot evaluate a planting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SimulationFailurePolicy {
    #[default]
    Terminate,
    /// Apply the penalty and keep going; counts against the failure budget
    PenalizeAndContinue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    Console,
    RgbArray,
}

impl FromStr for ObservationMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "grid" | "grid-species" => Ok(ObservationMode::GridSpecies),
            "spacing" | "spacing-aware" => Ok(ObservationMode::SpacingAware),
            "color" | "color-coded" | "rgb" => Ok(ObservationMode::ColorCoded),
            _ => Err(()),
        }
    }
}

impl FromStr for ActionMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "continuous" | "box" => Ok(ActionMode::Continuous),
            "walker" | "discrete" | "discrete-walker" => Ok(ActionMode::DiscreteWalker),
            _ => Err(()),
        }
    }
}

impl FromStr for SimulationFailurePolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "terminate" => Ok(SimulationFailurePolicy::Terminate),
            "continue" | "penalize" | "penalize-and-continue" => {
                Ok(SimulationFailurePolicy::PenalizeAndContinue)
            }
            _ => Err(()),
        }
    }
}

impl FromStr for RenderMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "console" => Ok(RenderMode::Console),
            "rgb" | "rgb-array" => Ok(RenderMode::RgbArray),
            _ => Err(()),
        }
    }
}

/// Environment configuration
#[derive(Debug, Clone)]
pub struct EnvConfig {
    /// Side length of the square site, in cells
    pub grid_size: usize,
    /// Plantable species
    pub species: SpeciesCatalog,
    /// Episode ends once this many seedlings are planted
    pub total_seedlings: usize,
    /// Years the simulator grows the stand per evaluation
    pub simulated_years: u32,
    pub observation_mode: ObservationMode,
    pub action_mode: ActionMode,
    /// Minimum distance between any two seedlings, in cells
    pub spacing_threshold: f64,
    /// Truncate once failed plantings exceed this
    pub failure_budget: usize,
    /// Reward for a rejected planting
    pub invalid_planting_penalty: f32,
    /// Reward when the simulator crashes or cannot be launched
    pub simulation_failure_penalty: f32,
    /// Reward when the simulator runs but produces no usable output
    pub no_output_penalty: f32,
    pub simulation_failure_policy: SimulationFailurePolicy,
    /// Truncate after this many steps
    pub max_steps: Option<usize>,
    pub render_mode: Option<RenderMode>,
    /// Seed for the environment RNG; drawn from the thread RNG when unset
    pub seed: Option<u64>,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            grid_size: 100,
            species: SpeciesCatalog::default(),
            total_seedlings: 100,
            simulated_years: 10,
            observation_mode: ObservationMode::default(),
            action_mode: ActionMode::default(),
            spacing_threshold: 0.5,
            failure_budget: 10,
            invalid_planting_penalty: -10.0,
            simulation_failure_penalty: -10.0,
            no_output_penalty: -5.0,
            simulation_failure_policy: SimulationFailurePolicy::default(),
            max_steps: None,
            render_mode: None,
            seed: None,
        }
    }
}

impl EnvConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grid_size == 0 || self.grid_size > MAX_GRID_SIZE {
            return Err(ConfigError::GridSize {
                size: self.grid_size,
                max: MAX_GRID_SIZE,
            });
        }
        if self.total_seedlings == 0 {
            return Err(ConfigError::ZeroSeedlingTarget);
        }
        if !self.spacing_threshold.is_finite() || self.spacing_threshold < 0.0 {
            return Err(ConfigError::InvalidSpacing(self.spacing_threshold));
        }
        if self.species.is_empty() {
            return Err(ConfigError::EmptySpeciesCatalog);
        }
        Ok(())
    }

    /// Load from `FOREST_*` environment variables (and `.env`), defaults for unset ones.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = parse_var(&lookup, "FOREST_GRID_SIZE")? {
            config.grid_size = v;
        }
        if let Some(names) = lookup("FOREST_SPECIES") {
            config.species = SpeciesCatalog::new(names.split(',').filter(|n| !n.trim().is_empty()))?;
        }
        if let Some(v) = parse_var(&lookup, "FOREST_SEEDLINGS")? {
            config.total_seedlings = v;
        }
        if let Some(v) = parse_var(&lookup, "FOREST_YEARS")? {
            config.simulated_years = v;
        }
        if let Some(v) = parse_var(&lookup, "FOREST_OBSERVATION")? {
            config.observation_mode = v;
        }
        if let Some(v) = parse_var(&lookup, "FOREST_ACTION")? {
            config.action_mode = v;
        }
        if let Some(v) = parse_var(&lookup, "FOREST_SPACING")? {
            config.spacing_threshold = v;
        }
        if let Some(v) = parse_var(&lookup, "FOREST_FAILURE_BUDGET")? {
            config.failure_budget = v;
        }
        if let Some(v) = parse_var(&lookup, "FOREST_FAILURE_POLICY")? {
            config.simulation_failure_policy = v;
        }
        config.max_steps = parse_var(&lookup, "FOREST_MAX_STEPS")?;
        config.render_mode = parse_var(&lookup, "FOREST_RENDER")?;
        config.seed = parse_var(&lookup, "FOREST_SEED")?;

        config.validate()?;
        Ok(config)
    }
}

/// Where the simulator lives and how its per-instance workspaces are laid out.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub executable: PathBuf,
    pub launch_args: Vec<String>,
    pub extra_args: Vec<String>,
    /// Project file copied into every workspace
    pub template_config: PathBuf,
    /// Parent of the `proc_<index>` workspace directories
    pub workspace_root: PathBuf,
    /// Slash-separated path of the output database element in the project file
    pub output_db_element: String,
    /// Slash-separated path of the initialisation file element, if it should be redirected
    pub init_file_element: Option<String>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("build/python_interface"),
            launch_args: Vec::new(),
            extra_args: Vec::new(),
            template_config: PathBuf::from("data/project.xml"),
            workspace_root: PathBuf::from("workspaces"),
            output_db_element: "project/system/database/out".to_string(),
            init_file_element: Some("project/model/initialization/file".to_string()),
        }
    }
}

impl SimulatorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(v) = lookup("FOREST_SIM_EXECUTABLE") {
            config.executable = PathBuf::from(v);
        }
        if let Some(v) = lookup("FOREST_SIM_ARGS") {
            config.extra_args = v.split_whitespace().map(str::to_string).collect();
        }
        if let Some(v) = lookup("FOREST_SIM_TEMPLATE") {
            config.template_config = PathBuf::from(v);
        }
        if let Some(v) = lookup("FOREST_WORKSPACE_ROOT") {
            config.workspace_root = PathBuf::from(v);
        }
        if let Some(v) = lookup("FOREST_OUTPUT_ELEMENT") {
            config.output_db_element = v;
        }
        if let Some(v) = lookup("FOREST_INIT_ELEMENT") {
            config.init_file_element = (!v.trim().is_empty()).then_some(v);
        }
        Ok(config)
    }

    pub fn workspace_manager(&self) -> WorkspaceManager {
        WorkspaceManager::new(
            &self.workspace_root,
            &self.template_config,
            self.output_db_element.clone(),
            self.init_file_element.clone(),
        )
    }

    pub fn bridge(&self) -> IlandBridge {
        IlandBridge::new(&self.executable)
            .with_launch_args(self.launch_args.iter().cloned())
            .with_args(self.extra_args.iter().cloned())
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnvVar {
                key: key.to_string(),
                value,
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_env_config_default() {
        let config = EnvConfig::default();
        assert_eq!(config.grid_size, 100);
        assert_eq!(config.failure_budget, 10);
        assert!((config.invalid_planting_penalty + 10.0).abs() < 1e-6);
        assert!((config.spacing_threshold - 0.5).abs() < 1e-12);
        assert_eq!(config.simulation_failure_policy, SimulationFailurePolicy::Terminate);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = EnvConfig::from_lookup(lookup(&[
            ("FOREST_GRID_SIZE", "50"),
            ("FOREST_SPECIES", "piab, fasy"),
            ("FOREST_OBSERVATION", "color-coded"),
            ("FOREST_ACTION", "walker"),
            ("FOREST_SEED", "42"),
            ("FOREST_FAILURE_POLICY", "continue"),
        ]))
        .unwrap();

        assert_eq!(config.grid_size, 50);
        assert_eq!(config.species.len(), 2);
        assert_eq!(config.species.name(1), Some("fasy"));
        assert_eq!(config.observation_mode, ObservationMode::ColorCoded);
        assert_eq!(config.action_mode, ActionMode::DiscreteWalker);
        assert_eq!(config.seed, Some(42));
        assert_eq!(
            config.simulation_failure_policy,
            SimulationFailurePolicy::PenalizeAndContinue
        );
        assert_eq!(config.total_seedlings, 100);
    }

    #[test]
    fn test_unparsable_var_is_error() {
        let err = EnvConfig::from_lookup(lookup(&[("FOREST_YEARS", "ten")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar { ref key, .. } if key == "FOREST_YEARS"));
    }

    #[test]
    fn test_validate_rejects_zero_grid() {
        let config = EnvConfig {
            grid_size: 0,
            ..EnvConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::GridSize { .. })));
    }

    #[test]
    fn test_simulator_config_lookup() {
        let config = SimulatorConfig::from_lookup(lookup(&[
            ("FOREST_SIM_EXECUTABLE", "/opt/iland/ilandc"),
            ("FOREST_INIT_ELEMENT", ""),
        ]))
        .unwrap();
        assert_eq!(config.executable, PathBuf::from("/opt/iland/ilandc"));
        assert_eq!(config.init_file_element, None);
        assert_eq!(config.output_db_element, "project/system/database/out");
    }
}
