use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::core::capability::{AssumeAll, PathLocator, ToolLocator};
use crate::core::hardware::HardwareAdapter;

#[cfg(target_os = "linux")]
pub mod linux;
pub mod simulated;

#[cfg(target_os = "linux")]
pub use linux::LinuxAdapter;
pub use simulated::SimulatedAdapter;

pub fn get_adapter(simulation: bool) -> Result<Arc<dyn HardwareAdapter>> {
    if simulation {
        info!("Simulation mode: no device will be touched");
        return Ok(Arc::new(SimulatedAdapter::with_demo_devices()));
    }

    #[cfg(target_os = "linux")]
    {
        Ok(Arc::new(LinuxAdapter::new()))
    }

    #[cfg(not(target_os = "linux"))]
    {
        anyhow::bail!("device access is only supported on Linux; use --simulation")
    }
}

pub fn get_locator(simulation: bool) -> Arc<dyn ToolLocator> {
    if simulation {
        Arc::new(AssumeAll)
    } else {
        Arc::new(PathLocator)
    }
}
