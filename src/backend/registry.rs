//! Process-wide backend registry and selection policy.
//!
//! The registry is shared across all concurrent pipelines. Iteration order
//! is insertion order; re-registering a name replaces the prior entry in
//! place. Selection is advisory: it never reserves resources or coordinates
//! with other concurrent selections.

use super::Backend;
use crate::core::Task;
use crate::errors::EngineError;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

static REGISTRY: RwLock<Vec<(String, Arc<dyn Backend>)>> = RwLock::new(Vec::new());

/// Registers a backend under its own name, replacing any prior entry.
pub fn register_backend(backend: Arc<dyn Backend>) {
    let name = backend.name().to_string();
    let mut entries = REGISTRY.write();
    if let Some(slot) = entries.iter_mut().find(|(n, _)| *n == name) {
        slot.1 = backend;
    } else {
        entries.push((name, backend));
    }
}

/// Removes a backend by name. Returns true if an entry was removed.
pub fn unregister_backend(name: &str) -> bool {
    let mut entries = REGISTRY.write();
    let before = entries.len();
    entries.retain(|(n, _)| n != name);
    entries.len() != before
}

/// Looks up a backend by name.
#[must_use]
pub fn get_backend(name: &str) -> Option<Arc<dyn Backend>> {
    REGISTRY
        .read()
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, b)| b.clone())
}

/// Returns all registered backends in insertion order.
#[must_use]
pub fn all_backends() -> Vec<Arc<dyn Backend>> {
    REGISTRY.read().iter().map(|(_, b)| b.clone()).collect()
}

/// Removes every registered backend (primarily for tests).
pub fn clear_backends() {
    REGISTRY.write().clear();
}

/// Selects a backend for a task.
///
/// A named hint must resolve to a registered, healthy backend. With `"auto"`
/// (or no hint), the first healthy backend in insertion order wins, except
/// that GPU-requiring tasks prefer the first healthy backend reporting an
/// available GPU. A health probe that fails counts as unhealthy.
pub async fn select_backend(task: &Task) -> Result<Arc<dyn Backend>, EngineError> {
    if !task.wants_auto_backend() {
        let name = task.backend.as_deref().unwrap_or_default();
        let backend = get_backend(name).ok_or_else(|| EngineError::not_registered(name))?;
        if backend.is_healthy().await.unwrap_or(false) {
            debug!(backend = name, task = %task.task_type, "selected named backend");
            return Ok(backend);
        }
        return Err(EngineError::unhealthy(name));
    }

    let mut healthy = Vec::new();
    for backend in all_backends() {
        if backend.is_healthy().await.unwrap_or(false) {
            healthy.push(backend);
        }
    }
    if healthy.is_empty() {
        return Err(EngineError::NoHealthyBackend);
    }

    if task.needs_gpu() {
        if let Some(backend) = healthy
            .iter()
            .find(|b| b.get_resources().is_some_and(|pool| pool.has_available_gpu()))
        {
            debug!(
                backend = backend.name(),
                task = %task.task_type,
                "selected GPU-capable backend"
            );
            return Ok(backend.clone());
        }
    }

    let backend = healthy[0].clone();
    debug!(backend = backend.name(), task = %task.task_type, "selected backend");
    Ok(backend)
}
