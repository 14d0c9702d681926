use thiserror::Error;

use crate::types::ModuleId;

/// Errors produced by the offline log parser and the runtime-side DXT buffer
/// manager. Kept as one typed enum (rather than `anyhow::Error` throughout)
/// because callers branch on which variant occurred: `PartialModuleData` is
/// only fatal without `--show-incomplete`, `DecodeError` aborts one module's
/// aggregation but not the whole run, and the CLI maps each variant to its
/// own exit code (see `src/cli.rs`).
#[derive(Debug, Error)]
pub enum DarshanError {
    #[error("failed to open log: {0}")]
    OpenError(#[from] std::io::Error),

    #[error("invalid log format: {0}")]
    FormatError(String),

    #[error("unsupported log version: {0}")]
    UnsupportedVersion(String),

    #[error("failed to decode module {module:?} (schema version {version}): {reason}")]
    DecodeError {
        module: ModuleId,
        version: u16,
        reason: String,
    },

    #[error("module {0:?} has partial data (truncated by the runtime)")]
    PartialModuleData(ModuleId),

    #[error("usage error: {0}")]
    UsageError(String),

    #[error("out of memory")]
    OutOfMemory,

    #[error("malformed rank {rank} (nprocs = {nprocs})")]
    MalformedRank { rank: i32, nprocs: u32 },
}

pub type Result<T> = std::result::Result<T, DarshanError>;
