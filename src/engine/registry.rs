//! Opaque handles for live engine instances
//!
//! A binding layer keeps only an [`EngineHandle`]; the engine itself stays
//! inside the registry that issued the handle.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use super::LinkEngine;
use crate::error::{CrsfLinkError, Result};

/// Token identifying one registered engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EngineHandle(u64);

impl EngineHandle {
    /// Rebuild a handle received from a binding layer
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "engine#{}", self.0)
    }
}

/// Issues handles and resolves them back to engines
#[derive(Debug)]
pub struct EngineRegistry {
    next: AtomicU64,
    engines: RwLock<HashMap<EngineHandle, Arc<LinkEngine>>>,
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self {
            // 0 is never issued
            next: AtomicU64::new(1),
            engines: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, engine: Arc<LinkEngine>) -> EngineHandle {
        let handle = EngineHandle(self.next.fetch_add(1, Ordering::Relaxed));
        self.engines
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle, engine);
        handle
    }

    /// # Errors
    ///
    /// Returns `InvalidHandle` if the handle was never issued or was removed
    pub fn resolve(&self, handle: EngineHandle) -> Result<Arc<LinkEngine>> {
        self.engines
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&handle)
            .cloned()
            .ok_or(CrsfLinkError::InvalidHandle(handle.0))
    }

    pub fn remove(&self, handle: EngineHandle) -> Option<Arc<LinkEngine>> {
        self.engines
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle)
    }

    pub fn len(&self) -> usize {
        self.engines.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
