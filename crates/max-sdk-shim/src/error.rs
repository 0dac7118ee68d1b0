use std::path::PathBuf;

use thiserror::Error;

use crate::config::{Subsystem, SubsystemSet};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown platform `{0}` (expected apple, windows or other)")]
    UnknownPlatform(String),
    #[error("unknown subsystem `{0}` (expected host, audio or graphics)")]
    UnknownSubsystem(String),
    #[error("no subsystems requested")]
    EmptySelection,
    #[error("subsystems [{requested}] require the host subsystem")]
    MissingHost { requested: SubsystemSet },
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("environment variable {0} is not set")]
    MissingEnv(&'static str),
}

#[derive(Debug, Error)]
pub enum ShimError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("header set for {0} is empty")]
    EmptyHeaderSet(Subsystem),
    #[error("invalid header name `{name}` in {subsystem} set")]
    InvalidHeader { subsystem: Subsystem, name: String },
    #[error("header `{name}` listed by both {first} and {second}")]
    DuplicateHeader {
        name: String,
        first: Subsystem,
        second: Subsystem,
    },
    #[error("stand-in `{0}` is declared more than once")]
    DuplicateStandIn(String),
    #[error("scope symbol `{0}` is registered more than once")]
    DuplicateScopeSymbol(String),
    #[error("no header set registered for {0}")]
    MissingHeaderSet(Subsystem),
    #[error("SDK directory {0} does not exist")]
    MissingSdkDir(PathBuf),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
#[error("composition unit has {} scope violation(s)", .violations.len())]
pub struct LintError {
    pub violations: Vec<crate::lint::Violation>,
}
