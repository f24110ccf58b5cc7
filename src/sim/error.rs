use std::path::PathBuf;

use thiserror::Error;

/// Setup-time failures while preparing a per-instance workspace. These abort
/// environment construction.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("simulator template config not found: {0}")]
    TemplateMissing(PathBuf),
    #[error("workspace I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not parse project file {path}: {source}")]
    Xml {
        path: PathBuf,
        #[source]
        source: quick_xml::Error,
    },
    #[error("project file {path} has no <{element}> element")]
    ElementMissing { path: PathBuf, element: String },
}

impl WorkspaceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        WorkspaceError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Why a simulator run produced no usable result. Reported through step info,
/// never raised out of `step`.
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("could not write seedling file {path}: {source}")]
    InputWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not launch simulator {executable}: {source}")]
    Launch {
        executable: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("simulator exited with {}: {stderr}", exit_label(.code))]
    ExitStatus { code: Option<i32>, stderr: String },
    #[error("simulator output {path} is unreadable: {source}")]
    OutputUnreadable {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {code}"),
        None => "a signal".to_string(),
    }
}

impl SimulationError {
    /// The process ran to completion but its output could not be used.
    pub fn is_output_problem(&self) -> bool {
        matches!(self, SimulationError::OutputUnreadable { .. })
    }
}
