//! Per-instance filesystem sandboxes so parallel environments never share simulator files

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::error::WorkspaceError;
use super::project::{ElementRewrite, rewrite_elements};

pub const PROJECT_FILE: &str = "project.xml";
pub const SEEDLING_FILE: &str = "seedling_init.txt";
pub const OUTPUT_DB_FILE: &str = "output.sqlite";
pub const SIMULATOR_LOG_FILE: &str = "simulator.log";

/// Files owned by one environment instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessWorkspace {
    pub index: usize,
    pub directory: PathBuf,
    pub config_path: PathBuf,
    pub output_db_path: PathBuf,
    pub seedling_file_path: PathBuf,
    pub log_path: PathBuf,
}

impl ProcessWorkspace {
    fn in_directory(index: usize, directory: PathBuf) -> Self {
        Self {
            index,
            config_path: directory.join(PROJECT_FILE),
            output_db_path: directory.join(OUTPUT_DB_FILE),
            seedling_file_path: directory.join(SEEDLING_FILE),
            log_path: directory.join(SIMULATOR_LOG_FILE),
            directory,
        }
    }

    /// Delete the workspace directory and everything in it.
    pub fn release(&self) -> Result<(), WorkspaceError> {
        match fs::remove_dir_all(&self.directory) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(WorkspaceError::io(&self.directory, e)),
        }
    }
}

/// Allocates `root/proc_<index>` workspaces from a template project file.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
    template: PathBuf,
    output_db_element: String,
    init_file_element: Option<String>,
}

impl WorkspaceManager {
    pub fn new(
        root: impl Into<PathBuf>,
        template: impl Into<PathBuf>,
        output_db_element: impl Into<String>,
        init_file_element: Option<String>,
    ) -> Self {
        Self {
            root: root.into(),
            template: template.into(),
            output_db_element: output_db_element.into(),
            init_file_element,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn directory_for(&self, index: usize) -> PathBuf {
        self.root.join(format!("proc_{index}"))
    }

    /// Create or wipe the workspace for `index`, then install a project file
    /// whose output database (and initialisation file, when configured) point
    /// inside it. Calling this again for the same index starts from a clean
    /// directory.
    pub fn acquire(&self, index: usize) -> Result<ProcessWorkspace, WorkspaceError> {
        if !self.template.is_file() {
            return Err(WorkspaceError::TemplateMissing(self.template.clone()));
        }
        let template_xml = fs::read_to_string(&self.template)
            .map_err(|e| WorkspaceError::io(&self.template, e))?;

        let directory = self.directory_for(index);
        if directory.exists() {
            debug!(index, "Clearing stale workspace {}", directory.display());
            fs::remove_dir_all(&directory).map_err(|e| WorkspaceError::io(&directory, e))?;
        }
        fs::create_dir_all(&directory).map_err(|e| WorkspaceError::io(&directory, e))?;
        // The simulator runs with the workspace as its working directory, so
        // every path written into the project file must be absolute.
        let directory =
            fs::canonicalize(&directory).map_err(|e| WorkspaceError::io(&directory, e))?;

        let workspace = ProcessWorkspace::in_directory(index, directory);
        let output_db = workspace.output_db_path.display().to_string();
        let seedling_file = workspace.seedling_file_path.display().to_string();

        let mut rewrites = vec![ElementRewrite {
            path: &self.output_db_element,
            value: &output_db,
        }];
        if let Some(element) = &self.init_file_element {
            rewrites.push(ElementRewrite {
                path: element,
                value: &seedling_file,
            });
        }

        let outcome =
            rewrite_elements(&template_xml, &rewrites).map_err(|source| WorkspaceError::Xml {
                path: self.template.clone(),
                source,
            })?;
        if let Some(missing) = rewrites
            .iter()
            .zip(&outcome.found)
            .find_map(|(r, &found)| (!found).then_some(r.path))
        {
            return Err(WorkspaceError::ElementMissing {
                path: self.template.clone(),
                element: missing.to_string(),
            });
        }

        fs::write(&workspace.config_path, outcome.xml)
            .map_err(|e| WorkspaceError::io(&workspace.config_path, e))?;

        info!(index, "Workspace ready at {}", workspace.directory.display());
        Ok(workspace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::Point;
    use crate::sim::write_seedling_file;
    use crate::state::{Seedling, SpeciesCatalog};
    use tempfile::tempdir;

    const TEMPLATE: &str = r#"<project>
  <system>
    <database><out>output.sqlite</out></database>
  </system>
  <model><initialization><file>init.txt</file></initialization></model>
</project>"#;

    fn manager(dir: &Path) -> WorkspaceManager {
        let template = dir.join("template.xml");
        fs::write(&template, TEMPLATE).unwrap();
        WorkspaceManager::new(
            dir.join("work"),
            template,
            "project/system/database/out",
            Some("project/model/initialization/file".to_string()),
        )
    }

    #[test]
    fn test_acquire_rewrites_paths_into_workspace() {
        let temp = tempdir().unwrap();
        let workspace = manager(temp.path()).acquire(0).unwrap();

        let xml = fs::read_to_string(&workspace.config_path).unwrap();
        assert!(xml.contains(&format!("<out>{}</out>", workspace.output_db_path.display())));
        assert!(xml.contains(&format!("<file>{}</file>", workspace.seedling_file_path.display())));
        assert!(workspace.output_db_path.starts_with(&workspace.directory));
        assert!(workspace.directory.is_absolute());
    }

    #[test]
    fn test_acquire_is_idempotent_and_clears_stale_files() {
        let temp = tempdir().unwrap();
        let manager = manager(temp.path());
        let first = manager.acquire(2).unwrap();
        fs::write(first.directory.join("stale.txt"), "old").unwrap();
        fs::write(&first.output_db_path, "old db").unwrap();

        let second = manager.acquire(2).unwrap();
        assert_eq!(first, second);
        assert!(!second.directory.join("stale.txt").exists());
        assert!(!second.output_db_path.exists());
        assert!(second.config_path.is_file());
    }

    #[test]
    fn test_distinct_indices_never_share_paths() {
        let temp = tempdir().unwrap();
        let manager = manager(temp.path());
        let a = manager.acquire(0).unwrap();
        let b = manager.acquire(1).unwrap();

        let paths_a = [&a.directory, &a.config_path, &a.output_db_path, &a.seedling_file_path, &a.log_path];
        let paths_b = [&b.directory, &b.config_path, &b.output_db_path, &b.seedling_file_path, &b.log_path];
        for pa in paths_a {
            for pb in paths_b {
                assert_ne!(pa, pb);
            }
        }

        let species = SpeciesCatalog::new(["piab", "fasy"]).unwrap();
        write_seedling_file(&a.seedling_file_path, &[Seedling::new(Point::new(1.0, 1.0), 0)], &species).unwrap();
        write_seedling_file(
            &b.seedling_file_path,
            &[Seedling::new(Point::new(7.5, 3.25), 1), Seedling::new(Point::new(2.0, 9.0), 0)],
            &species,
        )
        .unwrap();

        let content_a = fs::read_to_string(&a.seedling_file_path).unwrap();
        let content_b = fs::read_to_string(&b.seedling_file_path).unwrap();
        assert_eq!(content_a.lines().skip(1).collect::<Vec<_>>(), ["1.00;1.00;piab;2.0;1.0;0"]);
        assert_eq!(
            content_b.lines().skip(1).collect::<Vec<_>>(),
            ["7.50;3.25;fasy;2.0;1.0;0", "2.00;9.00;piab;2.0;1.0;0"]
        );

        // Rewriting one workspace leaves the other untouched.
        write_seedling_file(&a.seedling_file_path, &[], &species).unwrap();
        assert_eq!(fs::read_to_string(&b.seedling_file_path).unwrap(), content_b);

        let config_b = fs::read_to_string(&b.config_path).unwrap();
        assert!(!config_b.contains(&a.directory.display().to_string()));
    }

    #[test]
    fn test_missing_template_is_fatal() {
        let temp = tempdir().unwrap();
        let manager = WorkspaceManager::new(
            temp.path().join("work"),
            temp.path().join("nope.xml"),
            "project/system/database/out",
            None,
        );
        assert!(matches!(manager.acquire(0), Err(WorkspaceError::TemplateMissing(_))));
    }

    #[test]
    fn test_missing_output_element_is_fatal() {
        let temp = tempdir().unwrap();
        let template = temp.path().join("template.xml");
        fs::write(&template, "<project><system/></project>").unwrap();
        let manager = WorkspaceManager::new(
            temp.path().join("work"),
            template,
            "project/system/database/out",
            None,
        );
        assert!(matches!(manager.acquire(0), Err(WorkspaceError::ElementMissing { .. })));
    }

    #[test]
    fn test_release_removes_directory() {
        let temp = tempdir().unwrap();
        let workspace = manager(temp.path()).acquire(5).unwrap();
        workspace.release().unwrap();
        assert!(!workspace.directory.exists());
        workspace.release().unwrap();
    }
}
