//! Preflight check that every external tool a command needs is installed.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use tracing::{debug, info};

use crate::core::error::MissingCapabilities;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Capability {
    Mount,
    Unmount,
    Copy,
    MirrorSync,
    TreeCompare,
    ByteSize,
    SignatureProbe,
    Format,
    Inventory,
}

impl Capability {
    /// Program that provides this capability on Linux.
    pub fn program(&self) -> &'static str {
        match self {
            Self::Mount => "mount",
            Self::Unmount => "umount",
            Self::Copy => "cp",
            Self::MirrorSync => "rsync",
            Self::TreeCompare => "diff",
            Self::ByteSize => "du",
            Self::SignatureProbe => "blkid",
            Self::Format => "mkfs.exfat",
            Self::Inventory => "lsblk",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mount => "mount",
            Self::Unmount => "unmount",
            Self::Copy => "copy",
            Self::MirrorSync => "mirror-sync",
            Self::TreeCompare => "tree-compare",
            Self::ByteSize => "byte-size",
            Self::SignatureProbe => "signature-probe",
            Self::Format => "format",
            Self::Inventory => "inventory",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn copy_requirements() -> BTreeSet<Capability> {
    use Capability::*;
    BTreeSet::from([Mount, Unmount, Copy, ByteSize, TreeCompare])
}

pub fn mirror_requirements() -> BTreeSet<Capability> {
    use Capability::*;
    BTreeSet::from([Mount, Unmount, MirrorSync, ByteSize, TreeCompare])
}

pub fn format_requirements() -> BTreeSet<Capability> {
    use Capability::*;
    BTreeSet::from([Unmount, SignatureProbe, Format])
}

pub fn inventory_requirements() -> BTreeSet<Capability> {
    BTreeSet::from([Capability::Inventory])
}

/// Resolves a program name to an executable.
pub trait ToolLocator: Send + Sync {
    fn locate(&self, program: &str) -> Option<PathBuf>;
}

/// Searches `PATH` the way a shell would.
#[derive(Debug, Default, Clone, Copy)]
pub struct PathLocator;

impl ToolLocator for PathLocator {
    fn locate(&self, program: &str) -> Option<PathBuf> {
        which::which(program).ok()
    }
}

/// Treats every tool as present. Used with the simulated adapter.
#[derive(Debug, Default, Clone, Copy)]
pub struct AssumeAll;

impl ToolLocator for AssumeAll {
    fn locate(&self, program: &str) -> Option<PathBuf> {
        Some(PathBuf::from(program))
    }
}

pub struct CapabilityGate<'a> {
    locator: &'a dyn ToolLocator,
}

impl<'a> CapabilityGate<'a> {
    pub fn new(locator: &'a dyn ToolLocator) -> Self {
        Self { locator }
    }

    /// Fails with every missing capability, not just the first.
    pub fn verify(&self, required: &BTreeSet<Capability>) -> Result<(), MissingCapabilities> {
        let mut missing = Vec::new();

        for capability in required {
            match self.locator.locate(capability.program()) {
                Some(path) => {
                    debug!(capability = %capability, path = %path.display(), "Capability available")
                }
                None => missing.push(*capability),
            }
        }

        if !missing.is_empty() {
            info!(missing = missing.len(), "Capability check failed");
            return Err(MissingCapabilities { names: missing });
        }

        Ok(())
    }
}
