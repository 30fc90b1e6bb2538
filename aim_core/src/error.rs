use std::path::PathBuf;

use thiserror::Error;

use crate::deviation::Diagnostics;
use crate::session::SessionState;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PatternError {
    #[error("invalid pattern parameter `{name}`: {message}")]
    InvalidParameter {
        name: &'static str,
        message: String,
    },
}

impl PatternError {
    pub(crate) fn invalid(name: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            message: message.into(),
        }
    }
}

/// Why a captured trial produced no usable offsets. Nothing is persisted.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Rejection {
    #[error("too many misses: {misses} of {total} notes")]
    TooManyMisses { misses: usize, total: usize },

    #[error("no samples matched the configured geometry ({} raw offsets)", .diagnostics.raw.len())]
    NoMatchingSamples { diagnostics: Box<Diagnostics> },
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FitError {
    #[error("need at least {needed} points, got {got}")]
    Underdetermined { needed: usize, got: usize },

    #[error("points cannot be split into two non-empty groups")]
    DegenerateSplit,

    #[error("linear system is singular")]
    Singular,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid measurement table: {0}")]
    Json(#[from] serde_json::Error),

    #[error("record has non-finite statistics (x={stddev_x}, y={stddev_y}, t={stddev_t:?})")]
    NonFinite {
        stddev_x: f64,
        stddev_y: f64,
        stddev_t: Option<f64>,
    },

    #[error("unsupported schema version {found} (newest known: {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
}

#[derive(Debug, Error)]
pub enum TrialError {
    #[error("cannot {action} while {state:?}")]
    InvalidTransition {
        state: SessionState,
        action: &'static str,
    },

    #[error(transparent)]
    Pattern(#[from] PatternError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("signal channel closed")]
    Disconnected,
}
