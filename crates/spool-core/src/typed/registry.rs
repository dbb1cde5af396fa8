//! HandlerRegistry - task type name to job.
//!
//! Registration can happen after the driver is built (`run` registers the jobs
//! it is given), so the map sits behind a lock. Lookups clone the `Arc` out and
//! never hold the lock across a handler call.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::warn;

use super::handler::{Handler, Job, TypedJob};
use super::task::Task;
use crate::domain::TaskType;
use crate::error::SpoolError;

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn Job>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job under its type name.
    ///
    /// A second job for the same type name is rejected and the first one stays.
    pub fn register(&self, job: Arc<dyn Job>) -> Result<(), SpoolError> {
        let type_name = job.type_name().to_string();
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        if handlers.contains_key(&type_name) {
            return Err(SpoolError::DuplicateHandler(TaskType::new(type_name)));
        }
        handlers.insert(type_name, job);
        Ok(())
    }

    /// Register a typed handler.
    pub fn register_typed<T: Task, H: Handler<T> + 'static>(
        &self,
        handler: H,
    ) -> Result<(), SpoolError> {
        self.register(Arc::new(TypedJob::<T, H>::new(handler)))
    }

    /// Register many jobs; duplicates are skipped with a warning.
    pub fn register_all(&self, jobs: impl IntoIterator<Item = Arc<dyn Job>>) {
        for job in jobs {
            if let Err(err) = self.register(job) {
                warn!(%err, "job handler is already registered and will not be added again");
            }
        }
    }

    pub fn lookup(&self, type_name: &str) -> Option<Arc<dyn Job>> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(type_name)
            .cloned()
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(type_name)
    }

    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedJob;

    #[test]
    fn test_register_and_lookup() {
        let registry = HandlerRegistry::new();
        registry.register(ScriptedJob::succeeding("a")).unwrap();

        assert!(registry.lookup("a").is_some());
        assert!(registry.lookup("b").is_none());
        assert!(registry.contains("a"));
    }

    #[test]
    fn test_double_registration_keeps_first() {
        let registry = HandlerRegistry::new();
        let first = ScriptedJob::succeeding("a");
        registry.register(first.clone()).unwrap();

        let result = registry.register(ScriptedJob::failing("a", 1));
        assert!(matches!(result, Err(SpoolError::DuplicateHandler(t)) if t.as_str() == "a"));

        let kept = registry.lookup("a").unwrap();
        let first: Arc<dyn Job> = first;
        assert!(Arc::ptr_eq(&kept, &first));
    }

    #[test]
    fn test_register_all_skips_duplicates() {
        let registry = HandlerRegistry::new();
        let jobs: Vec<Arc<dyn Job>> = vec![
            ScriptedJob::succeeding("b"),
            ScriptedJob::succeeding("a"),
            ScriptedJob::succeeding("b"),
        ];
        registry.register_all(jobs);

        assert_eq!(registry.registered_types(), vec!["a", "b"]);
        assert_eq!(registry.len(), 2);
    }
}
