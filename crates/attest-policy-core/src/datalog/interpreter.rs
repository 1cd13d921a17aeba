//! Scoped wrapper around the external Datalog interpreter
//!
//! Each [`DatalogInterpreter`] owns a private temporary workspace. Output,
//! include and fact directories live under it unless the configuration
//! supplies overrides. The workspace is removed recursively when the wrapper
//! is dropped, whichever way the caller's scope exits.
//!
//! The interpreter does not always report Datalog errors through its exit
//! status, so a run also fails when any stderr line contains `Error`.
//! No timeout is enforced on the child process.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;
use tracing::{debug, error, info};

use crate::config::InterpreterConfig;
use crate::error::{PolicyError, Result};

/// Output directory sentinel telling the interpreter to discard relations
pub const DISCARD_OUTPUT: &str = "-";

/// Relation name to rows, every cell kept as a string
pub type RelationOutput = BTreeMap<String, Vec<Vec<String>>>;

/// A running interpreter workspace
#[derive(Debug)]
pub struct DatalogInterpreter {
    workspace: TempDir,
    binary: PathBuf,
    /// `None` when output is discarded
    output_dir: Option<PathBuf>,
    include_dir: PathBuf,
    fact_dir: PathBuf,
    library_dir: PathBuf,
}

impl DatalogInterpreter {
    /// Allocate a fresh workspace laid out according to `config`
    pub fn new(config: &InterpreterConfig) -> Result<Self> {
        let workspace = tempfile::Builder::new()
            .prefix("attest-policy-")
            .tempdir()?;
        let root = workspace.path().to_path_buf();

        let output_dir = if config.discards_output() {
            None
        } else {
            Some(resolve_dir(config.output_dir.as_deref(), &root, "output")?)
        };
        let include_dir = resolve_dir(config.include_dir.as_deref(), &root, "include")?;
        let fact_dir = resolve_dir(config.fact_dir.as_deref(), &root, "facts")?;
        let library_dir = match config.library_dir.as_deref() {
            Some(dir) => absolute(dir)?,
            None => root.clone(),
        };

        debug!(workspace = %root.display(), "Created interpreter workspace");

        Ok(Self {
            workspace,
            binary: config.binary.clone(),
            output_dir,
            include_dir,
            fact_dir,
            library_dir,
        })
    }

    /// Root of the temporary workspace
    pub fn root(&self) -> &Path {
        self.workspace.path()
    }

    pub fn output_dir(&self) -> Option<&Path> {
        self.output_dir.as_deref()
    }

    pub fn include_dir(&self) -> &Path {
        &self.include_dir
    }

    pub fn fact_dir(&self) -> &Path {
        &self.fact_dir
    }

    pub fn library_dir(&self) -> &Path {
        &self.library_dir
    }

    /// Write a file into the include directory for `#include` references
    pub fn stage_include(&self, filename: &str, text: &str) -> Result<PathBuf> {
        let path = self.include_dir.join(filename);
        fs::write(&path, text)?;
        debug!(path = %path.display(), "Staged include file");
        Ok(path)
    }

    /// Write tab-separated rows to `<fact-dir>/<relation>.facts`
    pub fn stage_facts(&self, relation: &str, rows: &[String]) -> Result<PathBuf> {
        let path = self.fact_dir.join(format!("{}.facts", relation));
        let mut content = rows.join("\n");
        if !content.is_empty() {
            content.push('\n');
        }
        fs::write(&path, content)?;
        debug!(path = %path.display(), rows = rows.len(), "Staged fact file");
        Ok(path)
    }

    /// Arguments passed to the interpreter binary for `source`
    pub fn arguments(&self, source: &Path, extra_args: &[&str]) -> Vec<OsString> {
        let output = match &self.output_dir {
            Some(dir) => dir.display().to_string(),
            None => DISCARD_OUTPUT.to_string(),
        };

        let mut args: Vec<OsString> = vec![
            source.as_os_str().to_os_string(),
            format!("--include-dir={}", self.include_dir.display()).into(),
            format!("--output-dir={}", output).into(),
            format!("--fact-dir={}", self.fact_dir.display()).into(),
            format!("--library-dir={}", self.library_dir.display()).into(),
        ];
        args.extend(extra_args.iter().map(OsString::from));
        args
    }

    /// Full command line as a single display string
    pub fn command_line(&self, source: &Path, extra_args: &[&str]) -> String {
        std::iter::once(self.binary.as_os_str().to_os_string())
            .chain(self.arguments(source, extra_args))
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run the interpreter on `source` and wait for it to finish
    pub fn invoke(&self, source: &Path, extra_args: &[&str]) -> Result<()> {
        let command = self.command_line(source, extra_args);
        info!("Executing interpreter: {}", command);

        let output = Command::new(&self.binary)
            .args(self.arguments(source, extra_args))
            .current_dir(self.root())
            .output()
            .map_err(|e| PolicyError::Interpreter {
                command: command.clone(),
                stderr: e.to_string(),
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !output.status.success() || stderr.lines().any(|line| line.contains("Error")) {
            error!(status = %output.status, "Interpreter run failed");
            return Err(PolicyError::Interpreter { command, stderr });
        }

        Ok(())
    }

    /// Interpret program text and collect every output relation
    pub fn interpret_text(&self, text: &str) -> Result<RelationOutput> {
        let mut source = tempfile::Builder::new()
            .prefix("source-")
            .suffix(".dl")
            .tempfile_in(self.root())?;
        source.write_all(text.as_bytes())?;
        source.flush()?;

        self.invoke(source.path(), &[])?;
        self.load_csv_output()
    }

    /// Interpret a file with `with_prelude` appended to its text
    pub fn interpret_file(&self, path: impl AsRef<Path>, with_prelude: &str) -> Result<RelationOutput> {
        let text = fs::read_to_string(path)?;
        self.interpret_text(&format!("{}{}", text, with_prelude))
    }

    /// Parse every `*.csv` in the output directory as tab-delimited rows
    pub fn load_csv_output(&self) -> Result<RelationOutput> {
        let mut relations = RelationOutput::new();
        let Some(dir) = &self.output_dir else {
            return Ok(relations);
        };

        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().map_or(true, |ext| ext != "csv") {
                continue;
            }
            let Some(relation) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
                continue;
            };

            let content = fs::read_to_string(&path)?;
            let rows = content
                .lines()
                .map(|line| line.split('\t').map(str::to_string).collect())
                .collect();
            relations.insert(relation, rows);
        }

        Ok(relations)
    }

    /// Remove the workspace, reporting any cleanup error
    pub fn close(self) -> Result<()> {
        self.workspace.close()?;
        Ok(())
    }
}

pub(crate) fn absolute(dir: &Path) -> Result<PathBuf> {
    if dir.is_absolute() {
        Ok(dir.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(dir))
    }
}

fn resolve_dir(configured: Option<&Path>, root: &Path, default_name: &str) -> Result<PathBuf> {
    match configured {
        Some(dir) => absolute(dir),
        None => {
            let dir = root.join(default_name);
            fs::create_dir(&dir)?;
            Ok(dir)
        }
    }
}
