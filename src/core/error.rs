use std::path::PathBuf;

use thiserror::Error;

use crate::core::capability::Capability;
use crate::core::models::Signature;

/// Failure of a single external primitive (mount, cp, rsync, diff, ...).
#[derive(Error, Debug)]
pub enum PrimitiveError {
    #[error("command not found: {0}")]
    CommandNotFound(String),

    #[error("{program} failed (exit={code:?}): {stderr}")]
    CommandFailed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not parse {program} output: {detail}")]
    Parse { program: String, detail: String },
}

#[derive(Error, Debug)]
#[error("missing required tools: {}", format_capabilities(.names))]
pub struct MissingCapabilities {
    pub names: Vec<Capability>,
}

fn format_capabilities(names: &[Capability]) -> String {
    names
        .iter()
        .map(|c| format!("{} ({})", c.program(), c))
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Error, Debug)]
pub enum MountError {
    #[error("failed to prepare mount point {}: {}", .path.display(), .cause)]
    Prepare {
        path: PathBuf,
        #[source]
        cause: PrimitiveError,
    },

    #[error("failed to mount {}: {}", .device.display(), .cause)]
    Failed {
        device: PathBuf,
        #[source]
        cause: PrimitiveError,
    },

    #[error(
        "{} is already bound to {}, refusing to treat it as {}",
        .mount_point.display(),
        .bound.display(),
        .device.display()
    )]
    WrongDevice {
        device: PathBuf,
        mount_point: PathBuf,
        bound: PathBuf,
    },
}

#[derive(Error, Debug)]
#[error("failed to unmount {}: {}", .device.display(), .cause)]
pub struct UnmountError {
    pub device: PathBuf,
    #[source]
    pub cause: PrimitiveError,
}

#[derive(Error, Debug)]
pub enum TransferError {
    #[error("failed to transfer {}: {}", .source_path.display(), .cause)]
    CopyFailed {
        source_path: PathBuf,
        #[source]
        cause: PrimitiveError,
    },

    #[error(
        "verification failed: {} does not match {}: {}",
        .destination.display(),
        .source_path.display(),
        .detail
    )]
    VerificationFailed {
        source_path: PathBuf,
        destination: PathBuf,
        detail: String,
    },
}

#[derive(Error, Debug)]
pub enum FormatError {
    #[error(transparent)]
    UnmountFailed(#[from] UnmountError),

    #[error("failed to probe {}: {}", .device.display(), .cause)]
    ProbeFailed {
        device: PathBuf,
        #[source]
        cause: PrimitiveError,
    },

    #[error("format of {} declined (existing {})", .device.display(), .signature)]
    Declined { device: PathBuf, signature: Signature },

    #[error("failed to format {}: {}", .device.display(), .cause)]
    FormatFailed {
        device: PathBuf,
        #[source]
        cause: PrimitiveError,
    },
}

/// Any error that ends a workflow invocation.
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error(transparent)]
    MissingCapabilities(#[from] MissingCapabilities),

    #[error(transparent)]
    Mount(#[from] MountError),

    #[error(transparent)]
    Unmount(#[from] UnmountError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("failed to list devices: {0}")]
    Inventory(#[source] PrimitiveError),
}

impl WorkflowError {
    /// An operator declining a format is an expected outcome, not a fault.
    pub fn is_declined(&self) -> bool {
        matches!(self, Self::Format(FormatError::Declined { .. }))
    }
}
