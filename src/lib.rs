pub mod infra;
pub mod rl;
pub mod sim;
pub mod state;

// Re-export commonly used types for convenience
pub use infra::{Point, Position, init_logging};
pub use rl::{Action, EnvConfig, Environment, ForestEnv, SimulatorConfig, StepResult};
pub use state::{KeepoutMask, SeedlingRegistry, SpeciesCatalog};
