//! Everything that touches the external growth simulator: workspaces, input
//! files, process invocation, output parsing and carbon accounting.

pub mod carbon;
mod bridge;
mod error;
mod output;
mod project;
mod workspace;

pub use bridge::{
    GrowthSimulator, IlandBridge, SEEDLING_DBH_CM, SEEDLING_HEADER, SEEDLING_HEIGHT_M,
    write_seedling_file,
};
pub use error::{SimulationError, WorkspaceError};
pub use output::{TREE_TABLE, TreeRecord, read_tree_table};
pub use project::{ElementRewrite, RewriteOutcome, rewrite_elements};
pub use workspace::{
    OUTPUT_DB_FILE, PROJECT_FILE, ProcessWorkspace, SEEDLING_FILE, SIMULATOR_LOG_FILE,
    WorkspaceManager,
};

#[cfg(test)]
pub(crate) use output::fixtures;
