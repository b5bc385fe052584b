use std::sync::Arc;

use anyhow::Result;

use crate::adapters;
use crate::config::AppConfig;
use crate::core::capability::ToolLocator;
use crate::core::hardware::HardwareAdapter;

/// Everything one invocation needs: configuration plus the primitive seams.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub adapter: Arc<dyn HardwareAdapter>,
    pub locator: Arc<dyn ToolLocator>,
}

impl AppContext {
    pub fn new(config: AppConfig) -> Result<Self> {
        let adapter = adapters::get_adapter(config.simulation)?;
        let locator = adapters::get_locator(config.simulation);
        Ok(Self::with_adapter(config, adapter, locator))
    }

    pub fn with_adapter(
        config: AppConfig,
        adapter: Arc<dyn HardwareAdapter>,
        locator: Arc<dyn ToolLocator>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            adapter,
            locator,
        }
    }
}
