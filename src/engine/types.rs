use crate::job::JobOptions;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy)]
pub struct ConvertRequest<'a> {
    pub input: &'a Path,
    pub work_dir: &'a Path,
    pub target_format: &'a str,
    pub options: &'a JobOptions,
}

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} failed ({status}), output: {output}")]
    Failed {
        program: String,
        status: String,
        output: String,
    },

    #[error("{what} timed out after {}s", .after.as_secs())]
    TimedOut { what: String, after: Duration },

    #[error(
        "conversion reported success but no output artifact located in {} for format {format}",
        .dir.display()
    )]
    MissingOutput { dir: PathBuf, format: String },

    #[error("output {} is outside the job's work dir", .0.display())]
    OutsideWorkDir(PathBuf),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
