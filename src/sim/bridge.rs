//! Bridge to the external iLand growth simulator
//!
//! The simulator is a black box driven through files: a seedling list and an
//! XML project go in, a SQLite database comes out. Everything format-specific
//! lives here so the environment only sees [`TreeRecord`]s.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::time::Instant;

use time::{OffsetDateTime, format_description};
use tracing::{debug, warn};

use super::error::SimulationError;
use super::output::{TreeRecord, read_tree_table};
use super::workspace::ProcessWorkspace;
use crate::state::{Seedling, SpeciesCatalog};

pub const SEEDLING_HEADER: &str = "x;y;species;dbh;height;age";

/// Diameter at breast height of a fresh seedling, cm
pub const SEEDLING_DBH_CM: f64 = 2.0;
/// Height of a fresh seedling, m
pub const SEEDLING_HEIGHT_M: f64 = 1.0;

/// Keep this much of stderr in error reports.
const STDERR_TAIL: usize = 2000;

/// Anything that can grow a set of seedlings for a number of years.
///
/// `Ok(None)` means the model ran but produced no growth data, which callers
/// treat differently from a crashed run.
pub trait GrowthSimulator {
    fn simulate(
        &mut self,
        seedlings: &[Seedling],
        species: &SpeciesCatalog,
        workspace: &ProcessWorkspace,
        years: u32,
    ) -> Result<Option<Vec<TreeRecord>>, SimulationError>;
}

/// Runs the iLand executable as a blocking subprocess:
/// `<executable> [launch args...] <project.xml> <years> [extra args...]`
#[derive(Debug, Clone)]
pub struct IlandBridge {
    executable: PathBuf,
    launch_args: Vec<String>,
    extra_args: Vec<String>,
}

impl IlandBridge {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            launch_args: Vec::new(),
            extra_args: Vec::new(),
        }
    }

    /// Arguments placed before the project path, for wrappers such as
    /// `xvfb-run` or an interpreter running a script.
    pub fn with_launch_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.launch_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Arguments appended after the year count.
    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.extra_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    fn remove_stale_output(workspace: &ProcessWorkspace) -> Result<(), SimulationError> {
        match fs::remove_file(&workspace.output_db_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(SimulationError::InputWrite {
                path: workspace.output_db_path.clone(),
                source,
            }),
        }
    }
}

impl GrowthSimulator for IlandBridge {
    #[tracing::instrument(level = "debug", skip_all, fields(workspace = workspace.index, seedlings = seedlings.len(), years = years))]
    fn simulate(
        &mut self,
        seedlings: &[Seedling],
        species: &SpeciesCatalog,
        workspace: &ProcessWorkspace,
        years: u32,
    ) -> Result<Option<Vec<TreeRecord>>, SimulationError> {
        write_seedling_file(&workspace.seedling_file_path, seedlings, species).map_err(
            |source| SimulationError::InputWrite {
                path: workspace.seedling_file_path.clone(),
                source,
            },
        )?;
        Self::remove_stale_output(workspace)?;

        let started = Instant::now();
        let output = Command::new(&self.executable)
            .args(&self.launch_args)
            .arg(&workspace.config_path)
            .arg(years.to_string())
            .args(&self.extra_args)
            .current_dir(&workspace.directory)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| SimulationError::Launch {
                executable: self.executable.clone(),
                source,
            })?;
        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            status = ?output.status,
            "Simulator finished"
        );

        if let Err(e) = SimulatorLog::write(&workspace.log_path, &self.executable, years, &output) {
            warn!("Could not write simulator log {}: {}", workspace.log_path.display(), e);
        }

        if !output.status.success() {
            return Err(SimulationError::ExitStatus {
                code: output.status.code(),
                stderr: tail(&String::from_utf8_lossy(&output.stderr), STDERR_TAIL),
            });
        }

        read_tree_table(&workspace.output_db_path).map_err(|source| {
            SimulationError::OutputUnreadable {
                path: workspace.output_db_path.clone(),
                source,
            }
        })
    }
}

/// Write the simulator's initial stand: one line per seedling, overwriting any
/// previous file.
pub fn write_seedling_file(
    path: &Path,
    seedlings: &[Seedling],
    species: &SpeciesCatalog,
) -> io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.exists()
    {
        fs::create_dir_all(parent)?;
    }

    let mut out = BufWriter::new(File::create(path)?);
    writeln!(out, "{SEEDLING_HEADER}")?;
    for seedling in seedlings {
        let code = species.name(seedling.species).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("species index {} not in catalog", seedling.species),
            )
        })?;
        writeln!(
            out,
            "{:.2};{:.2};{};{:.1};{:.1};{}",
            seedling.position.x, seedling.position.y, code, SEEDLING_DBH_CM, SEEDLING_HEIGHT_M, 0
        )?;
    }
    out.flush()
}

/// Captured output of the most recent simulator run.
struct SimulatorLog;

impl SimulatorLog {
    fn write(path: &Path, executable: &Path, years: u32, output: &Output) -> io::Result<()> {
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        let stamp = format_description::parse("[year]-[month]-[day] [hour]:[minute]:[second]")
            .ok()
            .and_then(|fmt| now.format(&fmt).ok())
            .unwrap_or_else(|| now.unix_timestamp().to_string());

        let mut file = BufWriter::new(File::create(path)?);
        writeln!(file, "# {} {} years, {}", executable.display(), years, stamp)?;
        writeln!(file, "# status: {}", output.status)?;
        writeln!(file, "## stdout")?;
        file.write_all(&output.stdout)?;
        writeln!(file, "\n## stderr")?;
        file.write_all(&output.stderr)?;
        file.flush()
    }
}

fn tail(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    text.chars()
        .skip(count.saturating_sub(max_chars))
        .collect::<String>()
        .trim()
        .to_string()
}
