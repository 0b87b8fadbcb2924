//! Resource registry.
//!
//! Maps resource names to handles. The host populates and depopulates the
//! registry; the bridge only reads it. The registry is the single source of
//! truth for what is locally exposed — the sync engine keeps no shadow copy.

use crate::content::Content;
use crate::error::BridgeResult;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// A readable/writable property exposed to the remote side.
#[async_trait]
pub trait PropertyHandle: Send + Sync {
    /// Reads the current value.
    async fn read(&self) -> BridgeResult<Content>;

    /// Writes a new value, returning the committed content.
    async fn write(&self, content: Content) -> BridgeResult<Content>;
}

/// An invokable action exposed to the remote side.
///
/// No result value is propagated back to the remote side; invocation is
/// fire-and-forget by construction.
#[async_trait]
pub trait ActionHandle: Send + Sync {
    /// Invokes the action with the given parameters.
    async fn invoke(&self, params: Content) -> BridgeResult<()>;
}

/// A registered resource: either a property or an action.
#[derive(Clone)]
pub enum ResourceHandle {
    /// A readable/writable property.
    Property(Arc<dyn PropertyHandle>),
    /// An invokable action.
    Action(Arc<dyn ActionHandle>),
}

impl ResourceHandle {
    /// Returns the handle kind as a static label (for logging).
    pub fn kind(&self) -> &'static str {
        match self {
            ResourceHandle::Property(_) => "property",
            ResourceHandle::Action(_) => "action",
        }
    }
}

impl std::fmt::Debug for ResourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.kind())
    }
}

/// Registry of locally exposed resources, keyed by name.
#[derive(Default)]
pub struct ResourceRegistry {
    resources: RwLock<HashMap<String, ResourceHandle>>,
}

impl ResourceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a resource. Returns `false` if the name is already taken —
    /// existing entries are never overwritten, regardless of handle kind.
    pub async fn add(&self, name: impl Into<String>, handle: ResourceHandle) -> bool {
        let name = name.into();
        let mut resources = self.resources.write().await;
        if resources.contains_key(&name) {
            warn!("registry already has resource '{name}' - skipping");
            return false;
        }
        debug!("registry adding {} '{name}'", handle.kind());
        resources.insert(name, handle);
        true
    }

    /// Removes a resource. Returns `false` if the name was not present.
    pub async fn remove(&self, name: &str) -> bool {
        debug!("registry removing resource '{name}'");
        self.resources.write().await.remove(name).is_some()
    }

    /// Looks up a property handle by name.
    pub async fn property(&self, name: &str) -> Option<Arc<dyn PropertyHandle>> {
        match self.resources.read().await.get(name) {
            Some(ResourceHandle::Property(handle)) => Some(Arc::clone(handle)),
            _ => None,
        }
    }

    /// Looks up an action handle by name.
    pub async fn action(&self, name: &str) -> Option<Arc<dyn ActionHandle>> {
        match self.resources.read().await.get(name) {
            Some(ResourceHandle::Action(handle)) => Some(Arc::clone(handle)),
            _ => None,
        }
    }

    /// Snapshots all property handles. The read lock is released before the
    /// caller performs any handle I/O.
    pub async fn properties(&self) -> Vec<(String, Arc<dyn PropertyHandle>)> {
        self.resources
            .read()
            .await
            .iter()
            .filter_map(|(name, handle)| match handle {
                ResourceHandle::Property(p) => Some((name.clone(), Arc::clone(p))),
                ResourceHandle::Action(_) => None,
            })
            .collect()
    }

    /// Returns whether a resource with the given name exists.
    pub async fn contains(&self, name: &str) -> bool {
        self.resources.read().await.contains_key(name)
    }

    /// Returns the number of registered resources.
    pub async fn len(&self) -> usize {
        self.resources.read().await.len()
    }

    /// Returns whether the registry is empty.
    pub async fn is_empty(&self) -> bool {
        self.resources.read().await.is_empty()
    }

    /// Returns all registered resource names.
    pub async fn names(&self) -> Vec<String> {
        self.resources.read().await.keys().cloned().collect()
    }
}

/// In-memory handles for testing.
pub mod mock {
    use super::*;
    use crate::error::BridgeError;
    use serde_json::Value;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// A property backed by an in-memory JSON value.
    pub struct MockProperty {
        value: Mutex<Value>,
        fail_reads: AtomicBool,
        fail_writes: AtomicBool,
    }

    impl MockProperty {
        /// Creates a property with an initial value.
        pub fn new(value: Value) -> Self {
            Self {
                value: Mutex::new(value),
                fail_reads: AtomicBool::new(false),
                fail_writes: AtomicBool::new(false),
            }
        }

        /// Makes subsequent reads fail.
        pub fn fail_reads(&self, fail: bool) {
            self.fail_reads.store(fail, Ordering::SeqCst);
        }

        /// Makes subsequent writes fail.
        pub fn fail_writes(&self, fail: bool) {
            self.fail_writes.store(fail, Ordering::SeqCst);
        }

        /// Returns the current value.
        pub fn value(&self) -> Value {
            self.value.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PropertyHandle for MockProperty {
        async fn read(&self) -> BridgeResult<Content> {
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(BridgeError::SyncIo("read failed".to_string()));
            }
            Ok(Content::json(&self.value.lock().unwrap()))
        }

        async fn write(&self, content: Content) -> BridgeResult<Content> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(BridgeError::SyncIo("write failed".to_string()));
            }
            let new_value: Value = serde_json::from_slice(&content.body)?;
            *self.value.lock().unwrap() = new_value.clone();
            Ok(Content::json(&new_value))
        }
    }

    /// An action that records its invocations.
    #[derive(Default)]
    pub struct MockAction {
        invocations: Mutex<Vec<Value>>,
        fail: AtomicBool,
    }

    impl MockAction {
        /// Creates an action.
        pub fn new() -> Self {
            Self::default()
        }

        /// Makes subsequent invocations fail.
        pub fn fail(&self, fail: bool) {
            self.fail.store(fail, Ordering::SeqCst);
        }

        /// Returns the recorded invocation parameters.
        pub fn invocations(&self) -> Vec<Value> {
            self.invocations.lock().unwrap().clone()
        }

        /// Returns how many times the action was invoked.
        pub fn invocation_count(&self) -> usize {
            self.invocations.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ActionHandle for MockAction {
        async fn invoke(&self, params: Content) -> BridgeResult<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(BridgeError::SyncIo("invoke failed".to_string()));
            }
            let params: Value = serde_json::from_slice(&params.body)?;
            self.invocations.lock().unwrap().push(params);
            Ok(())
        }
    }
}
