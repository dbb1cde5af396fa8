//! WorkerManager - picks a driver implementation by name.
//!
//! Drivers are created through factories so that applications can plug in
//! their own backends next to the built-in `"file"` driver.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::config::FileWorkerConfig;
use crate::driver::FileDriver;
use crate::error::SpoolError;
use crate::ports::WorkerDriver;
use crate::typed::JobContext;

#[async_trait]
pub trait DriverFactory: Send + Sync {
    fn name(&self) -> &str;

    /// Build a driver from its settings table.
    async fn create(&self, settings: toml::Value) -> Result<Arc<dyn WorkerDriver>, SpoolError>;
}

/// Builds [`FileDriver`]s from a [`FileWorkerConfig`] table.
#[derive(Default)]
pub struct FileDriverFactory {
    context: JobContext,
}

impl FileDriverFactory {
    pub fn new(context: JobContext) -> Self {
        Self { context }
    }
}

#[async_trait]
impl DriverFactory for FileDriverFactory {
    fn name(&self) -> &str {
        FileDriver::NAME
    }

    async fn create(&self, settings: toml::Value) -> Result<Arc<dyn WorkerDriver>, SpoolError> {
        let config = FileWorkerConfig::from_toml_value(settings)?;
        let driver = FileDriver::builder(config)
            .context(self.context.clone())
            .build()
            .await?;
        Ok(Arc::new(driver))
    }
}

pub struct WorkerManager {
    factories: BTreeMap<String, Arc<dyn DriverFactory>>,
}

impl Default for WorkerManager {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerManager {
    /// Manager with the `"file"` driver registered.
    pub fn new() -> Self {
        Self::with_context(JobContext::new())
    }

    /// Like [`WorkerManager::new`], handing `context` to every file driver.
    pub fn with_context(context: JobContext) -> Self {
        let mut manager = Self {
            factories: BTreeMap::new(),
        };
        manager.register_factory(Arc::new(FileDriverFactory::new(context)));
        manager
    }

    /// A factory with the same name replaces the earlier one.
    pub fn register_factory(&mut self, factory: Arc<dyn DriverFactory>) {
        let name = factory.name().to_string();
        if self.factories.insert(name.clone(), factory).is_some() {
            debug!(driver = %name, "driver factory replaced");
        }
    }

    pub fn driver_names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    pub async fn create(
        &self,
        name: &str,
        settings: toml::Value,
    ) -> Result<Arc<dyn WorkerDriver>, SpoolError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| SpoolError::UnknownDriver(name.to_string()))?;
        let driver = factory.create(settings).await?;
        debug!(driver = %name, "worker driver created");
        Ok(driver)
    }
}
