use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use workcore::{HandlerMetadata, RegistryError, WorkItemHandler};

/// Registry of handlers keyed by work item type.
///
/// Lookups take a shared lock and run in parallel; registrations take the
/// write lock and are serialized. Duplicate registrations are rejected.
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn WorkItemHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Register a handler under its own work item type
    pub fn register(&self, handler: Arc<dyn WorkItemHandler>) -> Result<(), RegistryError> {
        let work_item_type = handler.work_item_type().to_string();
        self.register_as(work_item_type, handler)
    }

    /// Register a handler under an explicit type name
    pub fn register_as(
        &self,
        work_item_type: impl Into<String>,
        handler: Arc<dyn WorkItemHandler>,
    ) -> Result<(), RegistryError> {
        let work_item_type = work_item_type.into();
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);

        if handlers.contains_key(&work_item_type) {
            tracing::error!("Duplicate handler for work item type: {}", work_item_type);
            return Err(RegistryError::DuplicateHandler(work_item_type));
        }

        tracing::info!("Registering handler for work item type: {}", work_item_type);
        handlers.insert(work_item_type, handler);
        Ok(())
    }

    /// Resolve the handler bound to `work_item_type`
    pub fn lookup(&self, work_item_type: &str) -> Result<Arc<dyn WorkItemHandler>, RegistryError> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(work_item_type)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownHandler(work_item_type.to_string()))
    }

    pub fn contains(&self, work_item_type: &str) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(work_item_type)
    }

    /// All registered work item types, sorted
    pub fn list_types(&self) -> Vec<String> {
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

    pub fn metadata(&self, work_item_type: &str) -> Option<HandlerMetadata> {
        self.lookup(work_item_type).ok().map(|h| h.metadata())
    }

    pub fn len(&self) -> usize {
        self.handlers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
