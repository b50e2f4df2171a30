//! Run errors and their classification

use converge::ExitRequest;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::attributes::{self, AttributeError};
use crate::exit::RunOutcome;
use crate::lookup::LookupError;
use crate::selector::SelectError;

/// File written into the cache directory for unclassified failures
pub const STACKTRACE_FILE: &str = "deploy-app-stacktrace.out";

/// Everything that can end a run early
#[derive(Debug, Error)]
pub enum RunError {
    #[error("You must provide the name of an application to deploy.")]
    UserInput,

    #[error(transparent)]
    AttributeSource(#[from] AttributeError),

    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error("Engine error: {0:#}")]
    Engine(anyhow::Error),

    #[error("{0:#}")]
    Unclassified(anyhow::Error),

    #[error(transparent)]
    Exit(ExitRequest),
}

impl RunError {
    /// Wrap an engine failure, passing exit requests through
    pub fn engine(err: anyhow::Error) -> Self {
        match err.downcast::<ExitRequest>() {
            Ok(request) => Self::Exit(request),
            Err(err) => Self::Engine(err),
        }
    }

    /// Wrap any other failure, passing exit requests through
    pub fn unclassified(err: impl Into<anyhow::Error>) -> Self {
        match err.into().downcast::<ExitRequest>() {
            Ok(request) => Self::Exit(request),
            Err(err) => Self::Unclassified(err),
        }
    }

    /// Whether a full diagnostic trace should be kept
    pub fn wants_stacktrace(&self) -> bool {
        matches!(self, Self::Engine(_) | Self::Unclassified(_))
    }

    /// The outcome this error maps to
    pub fn outcome(&self) -> RunOutcome {
        match self {
            Self::UserInput => RunOutcome::UserError {
                message: self.to_string(),
                code: 1,
            },
            Self::AttributeSource(_) => RunOutcome::FatalError {
                message: self.to_string(),
                code: attributes::EXIT_CODE,
            },
            Self::Lookup(_) | Self::Engine(_) | Self::Unclassified(_) => RunOutcome::FatalError {
                message: self.to_string(),
                code: 1,
            },
            Self::Exit(request) => RunOutcome::Exit {
                message: request.message.clone(),
                code: request.code,
            },
        }
    }
}

impl From<SelectError> for RunError {
    fn from(err: SelectError) -> Self {
        match err {
            SelectError::Engine(inner) => Self::engine(inner),
            other => Self::unclassified(other),
        }
    }
}

/// Write the full error chain to the cache directory
///
/// Returns the path written, or `None` if it could not be written.
pub fn dump_stacktrace(err: &RunError, cache_path: &Path) -> Option<PathBuf> {
    let trace = match err {
        RunError::Engine(inner) | RunError::Unclassified(inner) => format!("{inner:?}"),
        other => format!("{other:?}"),
    };
    log::debug!("{trace}");

    let path = cache_path.join(STACKTRACE_FILE);
    let written = fs::create_dir_all(cache_path).and_then(|()| fs::write(&path, &trace));
    match written {
        Ok(()) => {
            log::error!("Stacktrace dumped to {}", path.display());
            Some(path)
        }
        Err(e) => {
            log::warn!("Could not write stacktrace to {}: {e}", path.display());
            None
        }
    }
}
