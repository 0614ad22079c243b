mod events;
mod manager;

pub use events::{EventBus, PluginEvent};
pub use manager::{InitReport, PluginFactory, PluginManager};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::PluginError;

/// What capability a module provides to the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PluginType {
    DataProvider,
    Analysis,
    TradingStrategy,
    Execution,
    RiskManagement,
}

/// Lifecycle state of a registered module.
///
/// uninitialized → initializing → active on success, error on failure;
/// active → disabled on cleanup. There is no automatic error→active
/// recovery: a failed module must be re-created and re-initialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginStatus {
    Uninitialized,
    Initializing,
    Active,
    Error,
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginConfig {
    pub enabled: bool,
    pub settings: HashMap<String, serde_json::Value>,
    pub priority: i32,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            settings: HashMap::new(),
            priority: 0,
        }
    }
}

/// Contract every capability module must implement.
///
/// `name` and `dependencies` are static metadata read at registration time;
/// `initialize`/`cleanup` are the guarded lifecycle calls the manager drives
/// in dependency order.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    fn plugin_type(&self) -> PluginType;

    /// Names of plugins that must be active before this one initializes.
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    async fn initialize(&mut self) -> Result<(), PluginError>;

    async fn cleanup(&mut self) -> Result<(), PluginError>;

    /// Liveness probe. The default considers a module healthy whenever it
    /// was asked, since the manager only probes active modules.
    async fn health_check(&self) -> bool {
        true
    }
}
