//! Compilation-database loading.
//!
//! A compilation database is a `compile_commands.json` file inside the build
//! directory: a JSON array of entries, each naming the `directory` the
//! compiler ran in, the `file` compiled, and the compiler invocation as
//! either an `arguments` array or a single `command` string.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// One entry of the compilation database.
#[derive(Debug, Clone, Deserialize)]
pub struct CompileCommand {
    pub directory: PathBuf,
    pub file: PathBuf,
    #[serde(default)]
    pub arguments: Vec<String>,
    #[serde(default)]
    pub command: Option<String>,
}

impl CompileCommand {
    /// The compiler invocation as an argument vector. Prefers the
    /// `arguments` form; `command` strings are split on whitespace, which
    /// does not honor shell quoting (use `arguments` for embedded spaces).
    pub fn argv(&self) -> Vec<String> {
        if !self.arguments.is_empty() {
            return self.arguments.clone();
        }
        self.command
            .as_deref()
            .unwrap_or("")
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }

    /// The compiled file, resolved against the entry's directory when
    /// relative.
    pub fn full_path(&self) -> PathBuf {
        if self.file.is_absolute() {
            self.file.clone()
        } else {
            self.directory.join(&self.file)
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("no compilation database found at {0}")]
    NotFound(PathBuf),
    #[error("cannot read compilation database {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed compilation database {path}: {source}")]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// All compile commands of one build.
#[derive(Debug, Clone, Default)]
pub struct CompilationDatabase {
    pub commands: Vec<CompileCommand>,
}

impl CompilationDatabase {
    /// Loads `compile_commands.json` from the given build directory.
    pub fn from_directory(dir: &Path) -> Result<CompilationDatabase, DatabaseError> {
        let path = dir.join("compile_commands.json");
        if !path.is_file() {
            return Err(DatabaseError::NotFound(path));
        }
        let raw = fs::read_to_string(&path).map_err(|source| DatabaseError::Io {
            path: path.clone(),
            source,
        })?;
        let commands =
            serde_json::from_str(&raw).map_err(|source| DatabaseError::Malformed { path, source })?;
        Ok(CompilationDatabase { commands })
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
