//! RL Environment - gym-like planting environment backed by a growth simulator

use std::time::Instant;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::infra::{Point, Position};
use crate::sim::carbon::final_carbon;
use crate::sim::{
    GrowthSimulator, IlandBridge, ProcessWorkspace, SimulationError, WorkspaceError,
    WorkspaceManager,
};
use crate::state::{KeepoutGenerator, KeepoutMask, Seedling, SeedlingRegistry};

use super::action_space::{Action, ActionCodec, ActionModeMismatch, ActionSpace, Decision};
use super::config::{
    ActionMode, ConfigError, EnvConfig, RenderMode, SimulationFailurePolicy, SimulatorConfig,
};
use super::encoder::{Observation, ObservationEncoder, ObservationSpace};
use super::metrics::{EpisodeEnd, EpisodeSummary};
use super::render::{Frame, console_frame, rgb_frame};

#[derive(Debug, Error)]
pub enum EnvError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
    #[error("environment has not been reset")]
    NotReady,
    #[error("episode is over ({0:?}); reset before stepping again")]
    EpisodeOver(EnvState),
    #[error(transparent)]
    Action(#[from] ActionModeMismatch),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvState {
    Uninitialized,
    Ready,
    Terminated,
    Truncated,
}

/// Why a planting was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Keepout,
    Occupied,
    TooClose,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Simulator could not be launched or exited with an error
    Simulator,
    /// Simulator ran but left no usable tree table
    NoOutput,
}

/// A planting the simulator could not evaluate
#[derive(Debug, Clone, PartialEq)]
pub struct StepFailure {
    pub kind: FailureKind,
    pub message: String,
}

/// Step result from the environment
#[derive(Debug, Clone)]
pub struct StepResult {
    pub observation: Observation,
    pub reward: f32,
    /// Seedling target reached, or a simulation failure ended the episode
    pub terminated: bool,
    /// Failure budget or step limit exhausted
    pub truncated: bool,
    pub info: StepInfo,
}

/// Additional information from a step
#[derive(Debug, Clone, Default)]
pub struct StepInfo {
    /// Seedlings planted so far this episode
    pub planted_seedlings: usize,
    pub valid_planting: bool,
    pub rejection: Option<Rejection>,
    /// Requested planting location
    pub location: Option<Point>,
    pub species: Option<String>,
    pub species_index: Option<usize>,
    /// Carbon (kg) at the final simulated year, after a successful evaluation
    pub total_carbon: Option<f64>,
    pub carbon_improvement: Option<f64>,
    pub failure: Option<StepFailure>,
    /// Cursor cell after the step, walker mode only
    pub cursor: Option<Position>,
    pub failed_plantings: usize,
    pub steps: usize,
    pub simulation_seconds: f64,
    /// Set on the step that ends the episode
    pub episode: Option<EpisodeSummary>,
}

/// The environment contract: explicit state, no lifecycle hooks.
pub trait Environment {
    fn reset(&mut self, seed: Option<u64>) -> Result<Observation, EnvError>;
    fn step(&mut self, action: &Action) -> Result<StepResult, EnvError>;
    /// Presentation only; must not touch simulation state.
    fn render(&self) -> Option<Frame>;
    fn close(&mut self) -> Result<(), EnvError>;
}

/// Mutable per-episode bookkeeping, replaced on reset
#[derive(Debug, Clone, Default)]
struct EpisodeState {
    previous_carbon: f64,
    failed_plantings: usize,
    step_count: usize,
    cursor: Position,
    total_reward: f64,
    simulator_runs: usize,
    simulation_seconds: f64,
}

/// What the planting part of a step produced
struct PlantOutcome {
    reward: f32,
    terminated: bool,
    end: Option<EpisodeEnd>,
}

/// Planting environment for one simulator workspace
pub struct ForestEnv<S: GrowthSimulator = IlandBridge> {
    config: EnvConfig,
    codec: ActionCodec,
    encoder: ObservationEncoder,
    keepout_generator: KeepoutGenerator,
    simulator: S,
    workspaces: WorkspaceManager,
    process_index: usize,
    workspace: Option<ProcessWorkspace>,
    rng: ChaCha8Rng,
    mask: KeepoutMask,
    registry: SeedlingRegistry,
    episode: EpisodeState,
    state: EnvState,
}

impl ForestEnv<IlandBridge> {
    /// Environment driving the iLand executable described by `simulator`.
    pub fn from_config(
        config: EnvConfig,
        simulator: &SimulatorConfig,
        process_index: usize,
    ) -> Result<Self, EnvError> {
        Self::new(
            config,
            simulator.bridge(),
            simulator.workspace_manager(),
            process_index,
        )
    }
}

impl<S: GrowthSimulator> ForestEnv<S> {
    /// Validate the configuration and acquire the workspace for `process_index`.
    /// Both failures abort construction.
    pub fn new(
        config: EnvConfig,
        simulator: S,
        workspaces: WorkspaceManager,
        process_index: usize,
    ) -> Result<Self, EnvError> {
        config.validate()?;
        let workspace = workspaces.acquire(process_index)?;

        let rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_rng(&mut rand::rng()),
        };
        let species_count = config.species.len();

        Ok(Self {
            codec: ActionCodec::new(config.action_mode, config.grid_size, species_count),
            encoder: ObservationEncoder::new(config.observation_mode, config.grid_size, species_count),
            keepout_generator: KeepoutGenerator::default(),
            mask: KeepoutMask::all_plantable(config.grid_size),
            registry: SeedlingRegistry::with_limit(config.total_seedlings),
            simulator,
            workspaces,
            process_index,
            workspace: Some(workspace),
            rng,
            episode: EpisodeState::default(),
            state: EnvState::Uninitialized,
            config,
        })
    }

    pub fn with_keepout_generator(mut self, generator: KeepoutGenerator) -> Self {
        self.keepout_generator = generator;
        self
    }

    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    pub fn state(&self) -> EnvState {
        self.state
    }

    pub fn keepout(&self) -> &KeepoutMask {
        &self.mask
    }

    pub fn seedlings(&self) -> &SeedlingRegistry {
        &self.registry
    }

    pub fn previous_carbon(&self) -> f64 {
        self.episode.previous_carbon
    }

    pub fn failed_plantings(&self) -> usize {
        self.episode.failed_plantings
    }

    pub fn step_count(&self) -> usize {
        self.episode.step_count
    }

    pub fn cursor(&self) -> Option<Position> {
        (self.config.action_mode == ActionMode::DiscreteWalker).then_some(self.episode.cursor)
    }

    pub fn process_index(&self) -> usize {
        self.process_index
    }

    pub fn workspace(&self) -> Option<&ProcessWorkspace> {
        self.workspace.as_ref()
    }

    pub fn simulator(&self) -> &S {
        &self.simulator
    }

    pub fn action_space(&self) -> ActionSpace {
        self.codec.space()
    }

    pub fn observation_space(&self) -> ObservationSpace {
        self.encoder.space()
    }

    pub fn observation(&self) -> Observation {
        self.encoder.encode(&self.mask, &self.registry, self.cursor())
    }

    fn plant(&mut self, point: Point, cell: Position, species: usize, info: &mut StepInfo) -> PlantOutcome {
        info.location = Some(point);
        info.species_index = Some(species);
        info.species = self.config.species.name(species).map(str::to_string);

        let rejection = if !self.mask.is_plantable(cell) {
            Some(Rejection::Keepout)
        } else if self.registry.is_occupied(cell, self.config.grid_size) {
            Some(Rejection::Occupied)
        } else if self
            .registry
            .min_pairwise_distance()
            .min(self.registry.nearest_distance(&point))
            <= self.config.spacing_threshold
        {
            Some(Rejection::TooClose)
        } else {
            None
        };

        if let Some(rejection) = rejection {
            info.rejection = Some(rejection);
            if rejection == Rejection::Occupied && self.config.action_mode == ActionMode::DiscreteWalker {
                debug!(?cell, "Cursor cell already planted");
                return PlantOutcome {
                    reward: 0.0,
                    terminated: false,
                    end: None,
                };
            }
            self.episode.failed_plantings += 1;
            debug!(?cell, ?rejection, failed = self.episode.failed_plantings, "Planting rejected");
            return PlantOutcome {
                reward: self.config.invalid_planting_penalty,
                terminated: false,
                end: None,
            };
        }

        if let Err(full) = self.registry.add(Seedling::new(point, species)) {
            warn!(limit = full.limit, "Seedling target already reached");
            return PlantOutcome {
                reward: 0.0,
                terminated: true,
                end: Some(EpisodeEnd::Completed),
            };
        }
        info.valid_planting = true;
        info.planted_seedlings = self.registry.count();

        let completed = self.registry.count() >= self.config.total_seedlings;
        match self.evaluate(info) {
            Ok(carbon) => {
                let improvement = carbon - self.episode.previous_carbon;
                self.episode.previous_carbon = carbon;
                info.total_carbon = Some(carbon);
                info.carbon_improvement = Some(improvement);
                debug!(carbon, improvement, seedlings = self.registry.count(), "Planting evaluated");
                PlantOutcome {
                    reward: improvement as f32,
                    terminated: completed,
                    end: completed.then_some(EpisodeEnd::Completed),
                }
            }
            Err(failure) => {
                let reward = match failure.kind {
                    FailureKind::Simulator => self.config.simulation_failure_penalty,
                    FailureKind::NoOutput => self.config.no_output_penalty,
                };
                warn!(kind = ?failure.kind, "Simulation failed: {}", failure.message);
                info.failure = Some(failure);
                match self.config.simulation_failure_policy {
                    SimulationFailurePolicy::Terminate => PlantOutcome {
                        reward,
                        terminated: true,
                        end: Some(EpisodeEnd::SimulationFailed),
                    },
                    SimulationFailurePolicy::PenalizeAndContinue => {
                        self.episode.failed_plantings += 1;
                        PlantOutcome {
                            reward,
                            terminated: completed,
                            end: completed.then_some(EpisodeEnd::Completed),
                        }
                    }
                }
            }
        }
    }

    /// Run the simulator over the current registry and return final-year carbon.
    fn evaluate(&mut self, info: &mut StepInfo) -> Result<f64, StepFailure> {
        let Some(workspace) = self.workspace.as_ref() else {
            return Err(StepFailure {
                kind: FailureKind::Simulator,
                message: "no workspace".to_string(),
            });
        };

        let started = Instant::now();
        let result = self.simulator.simulate(
            self.registry.snapshot(),
            &self.config.species,
            workspace,
            self.config.simulated_years,
        );
        let elapsed = started.elapsed().as_secs_f64();
        info.simulation_seconds = elapsed;
        self.episode.simulator_runs += 1;
        self.episode.simulation_seconds += elapsed;

        match result {
            Ok(Some(rows)) => Ok(final_carbon(&rows)),
            Ok(None) => Err(StepFailure {
                kind: FailureKind::NoOutput,
                message: "simulator produced no tree data".to_string(),
            }),
            Err(e) => Err(StepFailure {
                kind: failure_kind(&e),
                message: e.to_string(),
            }),
        }
    }

    fn summary(&self, end: EpisodeEnd) -> EpisodeSummary {
        EpisodeSummary {
            total_reward: self.episode.total_reward,
            steps: self.episode.step_count,
            seedlings: self.registry.count(),
            failed_plantings: self.episode.failed_plantings,
            final_carbon: self.episode.previous_carbon,
            simulator_runs: self.episode.simulator_runs,
            simulation_seconds: self.episode.simulation_seconds,
            end,
        }
    }
}

fn failure_kind(error: &SimulationError) -> FailureKind {
    if error.is_output_problem() {
        FailureKind::NoOutput
    } else {
        FailureKind::Simulator
    }
}

impl<S: GrowthSimulator> Environment for ForestEnv<S> {
    /// Start a new episode: fresh workspace, fresh mask, empty registry.
    #[tracing::instrument(level = "debug", skip(self), fields(process = self.process_index))]
    fn reset(&mut self, seed: Option<u64>) -> Result<Observation, EnvError> {
        if let Some(seed) = seed {
            self.rng = ChaCha8Rng::seed_from_u64(seed);
        }
        self.workspace = Some(self.workspaces.acquire(self.process_index)?);

        self.mask = self.keepout_generator.generate(self.config.grid_size, &mut self.rng);
        self.registry.clear();
        let size = self.config.grid_size as i32;
        let cursor = match self.config.action_mode {
            ActionMode::DiscreteWalker => {
                Position::new(self.rng.random_range(0..size), self.rng.random_range(0..size))
            }
            ActionMode::Continuous => Position::default(),
        };
        self.episode = EpisodeState {
            cursor,
            ..EpisodeState::default()
        };
        self.state = EnvState::Ready;

        debug!(
            mode = ?self.mask.mode(),
            plantable = self.mask.plantable_count(),
            "Episode reset"
        );
        Ok(self.observation())
    }

    fn step(&mut self, action: &Action) -> Result<StepResult, EnvError> {
        match self.state {
            EnvState::Ready => {}
            EnvState::Uninitialized => return Err(EnvError::NotReady),
            state => return Err(EnvError::EpisodeOver(state)),
        }

        let decision = self.codec.decode(action, self.episode.cursor)?;
        self.episode.step_count += 1;

        let mut info = StepInfo::default();
        let outcome = match decision {
            Decision::Move(cursor) => {
                self.episode.cursor = cursor;
                PlantOutcome {
                    reward: 0.0,
                    terminated: false,
                    end: None,
                }
            }
            Decision::Plant {
                point,
                cell,
                species,
            } => self.plant(point, cell, species, &mut info),
        };

        let mut end = outcome.end;
        let terminated = outcome.terminated;
        let mut truncated = false;
        if !terminated {
            if self.episode.failed_plantings > self.config.failure_budget {
                truncated = true;
                end = Some(EpisodeEnd::FailureBudget);
            } else if let Some(max_steps) = self.config.max_steps
                && self.episode.step_count >= max_steps
            {
                truncated = true;
                end = Some(EpisodeEnd::StepLimit);
            }
        }

        self.episode.total_reward += outcome.reward as f64;
        if terminated {
            self.state = EnvState::Terminated;
        } else if truncated {
            self.state = EnvState::Truncated;
        }

        info.planted_seedlings = self.registry.count();
        info.cursor = self.cursor();
        info.failed_plantings = self.episode.failed_plantings;
        info.steps = self.episode.step_count;
        if let Some(end) = end.filter(|_| terminated || truncated) {
            let summary = self.summary(end);
            info!(
                process = self.process_index,
                ?end,
                reward = summary.total_reward,
                carbon = summary.final_carbon,
                seedlings = summary.seedlings,
                steps = summary.steps,
                "Episode finished"
            );
            info.episode = Some(summary);
        }

        Ok(StepResult {
            observation: self.observation(),
            reward: outcome.reward,
            terminated,
            truncated,
            info,
        })
    }

    fn render(&self) -> Option<Frame> {
        match self.config.render_mode? {
            RenderMode::Console => Some(Frame::Text(console_frame(
                &self.mask,
                &self.registry,
                &self.config.species,
                self.episode.previous_carbon,
            ))),
            RenderMode::RgbArray => Some(Frame::Rgb(rgb_frame(
                &self.mask,
                &self.registry,
                self.config.species.len(),
                self.cursor(),
            ))),
        }
    }

    /// Remove the workspace directory. A later `reset` acquires it again.
    fn close(&mut self) -> Result<(), EnvError> {
        if let Some(workspace) = self.workspace.take() {
            workspace.release()?;
            debug!(process = self.process_index, "Workspace released");
        }
        self.state = EnvState::Uninitialized;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::fs;
    use std::path::Path;

    use super::*;
    use crate::sim::TreeRecord;
    use crate::sim::fixtures::tree;
    use crate::state::SpeciesCatalog;

    pub const TEMPLATE: &str = r#"<project>
  <system><database><out>output.sqlite</out></database></system>
</project>"#;

    #[derive(Debug, Clone, Copy)]
    pub enum Scripted {
        /// Final-year rows summing to this many kg of sequestering mass
        Mass(f64),
        NoOutput,
        Crash,
        Panic,
    }

    /// Simulator double answering every run the same way.
    #[derive(Debug)]
    pub struct MockSimulator {
        pub script: Scripted,
        pub calls: usize,
        pub last_seedlings: usize,
    }

    impl MockSimulator {
        pub fn new(script: Scripted) -> Self {
            Self {
                script,
                calls: 0,
                last_seedlings: 0,
            }
        }
    }

    impl GrowthSimulator for MockSimulator {
        fn simulate(
            &mut self,
            seedlings: &[Seedling],
            _species: &SpeciesCatalog,
            _workspace: &ProcessWorkspace,
            years: u32,
        ) -> Result<Option<Vec<TreeRecord>>, SimulationError> {
            self.calls += 1;
            self.last_seedlings = seedlings.len();
            match self.script {
                Scripted::Mass(mass) => Ok(Some(vec![
                    tree(0, 1, [1.0, 1.0, 1.0, 1.0]),
                    tree(years as i64, 1, [mass * 0.4, mass * 0.3, mass * 0.2, mass * 0.1]),
                ])),
                Scripted::NoOutput => Ok(None),
                Scripted::Crash => Err(SimulationError::ExitStatus {
                    code: Some(1),
                    stderr: "boom".to_string(),
                }),
                Scripted::Panic => panic!("simulator aborted"),
            }
        }
    }

    pub fn workspace_manager(dir: &Path) -> WorkspaceManager {
        let template = dir.join("template.xml");
        fs::write(&template, TEMPLATE).unwrap();
        WorkspaceManager::new(dir.join("work"), template, "project/system/database/out", None)
    }

    pub fn scenario_config() -> EnvConfig {
        EnvConfig {
            grid_size: 100,
            species: SpeciesCatalog::new(["piab", "fasy"]).unwrap(),
            seed: Some(7),
            ..EnvConfig::default()
        }
    }

    pub fn env(dir: &Path, config: EnvConfig, script: Scripted, index: usize) -> ForestEnv<MockSimulator> {
        ForestEnv::new(config, MockSimulator::new(script), workspace_manager(dir), index).unwrap()
    }

    /// Continuous action hitting the centre of `cell`.
    pub fn action_for(cell: Position, grid_size: usize, species: f32) -> Action {
        let to_action = |c: i32| ((c as f64 + 0.5) / grid_size as f64 * 2.0 - 1.0) as f32;
        Action::Continuous([to_action(cell.x), to_action(cell.y), species])
    }

    pub fn cells(mask: &KeepoutMask, plantable: bool) -> Vec<Position> {
        let size = mask.size() as i32;
        (0..size)
            .flat_map(|y| (0..size).map(move |x| Position::new(x, y)))
            .filter(|&p| mask.is_plantable(p) == plantable)
            .collect()
    }
}
