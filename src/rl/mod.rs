//! Reinforcement learning environment for seedling planting
//!
//! The environment decodes an action into a planting, validates it against the
//! keepout mask and the spacing rule, asks the growth simulator for the stand's
//! carbon, and rewards the change in carbon since the previous planting.

mod action_space;
mod batch;
mod config;
mod encoder;
mod env;
mod metrics;
mod render;

pub use action_space::{Action, ActionCodec, ActionModeMismatch, ActionSpace, Decision, MOVE_ACTIONS};
pub use batch::{BatchEnv, BatchError};
pub use config::{
    ActionMode, ConfigError, EnvConfig, MAX_GRID_SIZE, ObservationMode, RenderMode,
    SimulationFailurePolicy, SimulatorConfig,
};
pub use encoder::{
    CURSOR_COLOR, EMPTY_CODE, KEEPOUT_CODE, KEEPOUT_COLOR, NO_SEEDLING_DISTANCE, Observation,
    ObservationEncoder, ObservationSpace, PLANTABLE_COLOR, SPECIES_CODE_OFFSET, species_color,
};
pub use env::{
    EnvError, EnvState, Environment, FailureKind, ForestEnv, Rejection, StepFailure, StepInfo,
    StepResult,
};
pub use metrics::{EpisodeEnd, EpisodeMetrics, EpisodeSummary, MovingAverage};
pub use render::{CONSOLE_VIEW_SIZE, Frame, console_frame, rgb_frame, species_letter};
