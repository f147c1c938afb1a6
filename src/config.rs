//! Run configuration and workbook loading.

use crate::table::Workbook;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Settings shared by every sequence of a run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Base URL used when the first step of a sequence has none.
    pub base_url: Option<String>,
    /// Directory holding files referenced by `attachment_name`.
    pub attachment_dir: PathBuf,
    /// Per-request timeout in seconds.
    pub timeout: u64,
    /// Number of sequences executed concurrently.
    pub jobs: usize,
    /// Headers sent with every request unless the step overrides them.
    pub default_headers: HashMap<String, String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            attachment_dir: PathBuf::from("test_data/attachments"),
            timeout: 30,
            jobs: 1,
            default_headers: HashMap::new(),
        }
    }
}

/// Loads workbooks from files and directories.
#[derive(Debug)]
pub struct TestDataManager {
    pub data_paths: Vec<PathBuf>,
}

impl TestDataManager {
    pub fn new() -> Self {
        Self {
            data_paths: vec![PathBuf::from("test_data")],
        }
    }

    pub fn add_path<P: AsRef<Path>>(&mut self, path: P) -> &mut Self {
        self.data_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Load a single workbook. `.json` files are parsed as JSON, anything
    /// else as YAML.
    pub fn load_workbook<P: AsRef<Path>>(&self, path: P) -> Result<Workbook> {
        let path = path.as_ref();
        info!("Loading test data from {}", path.display());

        let content = fs::read_to_string(path).context(format!(
            "Failed to read test data file: {}",
            path.display()
        ))?;

        let workbook = if is_json(path) {
            serde_json::from_str::<Workbook>(&content).context(format!(
                "Failed to parse JSON workbook from {}",
                path.display()
            ))?
        } else {
            serde_yaml::from_str::<Workbook>(&content).context(format!(
                "Failed to parse YAML workbook from {}",
                path.display()
            ))?
        };

        debug!(
            "Loaded {} test case rows and {} config rows from {}",
            workbook.testcases.len(),
            workbook.config.len(),
            path.display()
        );
        Ok(workbook)
    }

    /// Load every workbook file of a directory, in file-name order.
    /// Unreadable files abort the load.
    pub fn load_workbooks_from_dir<P: AsRef<Path>>(
        &self,
        dir: P,
    ) -> Result<Vec<(PathBuf, Workbook)>> {
        let dir = dir.as_ref();
        info!("Loading test data from directory: {}", dir.display());

        let mut paths = Vec::new();
        for entry in fs::read_dir(dir).context(format!(
            "Failed to read directory: {}",
            dir.display()
        ))? {
            let path = entry?.path();
            if path.is_file() && is_workbook_file(&path) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut workbooks = Vec::with_capacity(paths.len());
        for path in paths {
            let workbook = self.load_workbook(&path)?;
            workbooks.push((path, workbook));
        }

        info!(
            "Loaded {} workbooks from {}",
            workbooks.len(),
            dir.display()
        );
        Ok(workbooks)
    }

    /// Load workbooks from a file or directory path.
    pub fn load_path<P: AsRef<Path>>(
        &self,
        path: P,
    ) -> Result<Vec<(PathBuf, Workbook)>> {
        let path = path.as_ref();
        if path.is_dir() {
            self.load_workbooks_from_dir(path)
        } else {
            Ok(vec![(path.to_path_buf(), self.load_workbook(path)?)])
        }
    }

    /// Load workbooks from every configured directory that exists.
    pub fn load_all(&self) -> Result<Vec<(PathBuf, Workbook)>> {
        let mut all = Vec::new();
        for path in &self.data_paths {
            if path.is_dir() {
                all.extend(self.load_workbooks_from_dir(path)?);
            }
        }
        info!("Loaded {} workbooks in total", all.len());
        Ok(all)
    }
}

impl Default for TestDataManager {
    fn default() -> Self {
        Self::new()
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "json")
}

/// Return `true` for `.yaml`, `.yml` and `.json` files.
fn is_workbook_file(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext == "yaml" || ext == "yml" || ext == "json")
}
