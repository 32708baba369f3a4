//! Resource identifiers and the registry that hands them out.
//!
//! The scheduler never looks inside a resource. It only compares the ids a system
//! declared as read or written. The registry additionally keeps one shared value per
//! resource so systems can reach engine state through their [`FrameContext`]
//! instead of process-wide globals.
//!
//! [`FrameContext`]: crate::FrameContext

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

/// Opaque key identifying one piece of shared state for dependency analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId(u32);

impl ResourceId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "r{}", self.0)
    }
}

#[derive(Default)]
struct RegistryInner {
    by_type: HashMap<TypeId, ResourceId>,
    by_name: HashMap<String, ResourceId>,
    names: Vec<String>,
    values: HashMap<ResourceId, Arc<dyn Any + Send + Sync>>,
}

impl RegistryInner {
    fn allocate(&mut self, name: String) -> ResourceId {
        let id = ResourceId(self.names.len() as u32);
        self.by_name.insert(name.clone(), id);
        self.names.push(name);
        id
    }
}

/// Thread-safe registry of resource ids and their shared values.
///
/// Ids are assigned consecutively on first request and never change afterwards.
#[derive(Default)]
pub struct ResourceRegistry {
    inner: RwLock<RegistryInner>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id for the resource type `T`, allocating one on first use.
    pub fn id_of<T: Any>(&self) -> ResourceId {
        let key = TypeId::of::<T>();
        if let Some(id) = self.read().by_type.get(&key) {
            return *id;
        }

        let mut inner = self.write();
        if let Some(id) = inner.by_type.get(&key) {
            return *id;
        }
        let id = inner.allocate(std::any::type_name::<T>().to_string());
        inner.by_type.insert(key, id);
        id
    }

    /// Id for an explicitly named resource, allocating one on first use.
    pub fn named(&self, name: &str) -> ResourceId {
        if let Some(id) = self.read().by_name.get(name) {
            return *id;
        }

        let mut inner = self.write();
        if let Some(id) = inner.by_name.get(name) {
            return *id;
        }
        inner.allocate(name.to_string())
    }

    /// Store the shared value for resource type `T`, replacing any previous one.
    pub fn insert<T: Any + Send + Sync>(&self, value: T) -> ResourceId {
        let id = self.id_of::<T>();
        self.write().values.insert(id, Arc::new(value));
        id
    }

    /// Shared value previously stored for `T`.
    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let id = *self.read().by_type.get(&TypeId::of::<T>())?;
        let value = self.read().values.get(&id).cloned()?;
        value.downcast::<T>().ok()
    }

    /// Display name of a resource id (type name or explicit name).
    pub fn name(&self, id: ResourceId) -> Option<String> {
        self.read().names.get(id.0 as usize).cloned()
    }

    /// Number of ids handed out so far.
    pub fn len(&self) -> usize {
        self.read().names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, RegistryInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, RegistryInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.read();
        f.debug_struct("ResourceRegistry")
            .field("names", &inner.names)
            .field("values", &inner.values.len())
            .finish()
    }
}
