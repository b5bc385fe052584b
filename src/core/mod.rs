pub mod capability;
pub mod error;
pub mod format;
pub mod hardware;
pub mod models;
pub mod mount;
pub mod orchestrator;
pub mod transfer_engine;
pub mod verifier;

pub use capability::{Capability, CapabilityGate, ToolLocator};
pub use error::{
    FormatError, MissingCapabilities, MountError, PrimitiveError, TransferError, UnmountError,
    WorkflowError,
};
pub use format::FormatGuard;
pub use hardware::{BlockDevice, HardwareAdapter};
pub use models::{Device, FormatRequest, MountPoint, Signature, TransferStrategy, VerifiedTransfer};
pub use mount::{BindingPolicy, MountManager};
pub use orchestrator::Orchestrator;
pub use transfer_engine::TransferEngine;
pub use verifier::{VerifyResult, verify_transfer};
