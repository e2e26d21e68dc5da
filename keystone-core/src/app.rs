//! Application-wide handle passed to controller `init` hooks.

use crate::{DispatchSettings, Registry};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// Typed shared state, one value per type.
#[derive(Clone, Default)]
pub struct SharedState {
    map: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, replacing any previous value of the same type.
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) {
        self.map.insert(TypeId::of::<T>(), Arc::new(value));
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|value| value.clone().downcast::<T>().ok())
    }

    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.map.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl std::fmt::Debug for SharedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedState")
            .field("count", &self.map.len())
            .finish()
    }
}

/// Read-only view of the running application.
#[derive(Clone)]
pub struct AppHandle {
    state: Arc<SharedState>,
    registry: Arc<Registry>,
    settings: Arc<DispatchSettings>,
}

impl AppHandle {
    pub fn new(state: SharedState, registry: Arc<Registry>, settings: DispatchSettings) -> Self {
        Self {
            state: Arc::new(state),
            registry,
            settings: Arc::new(settings),
        }
    }

    /// Shared state registered at build time.
    pub fn state<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.state.get::<T>()
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }
}

impl std::fmt::Debug for AppHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppHandle")
            .field("state", &self.state)
            .field("routes", &self.registry.len())
            .field("settings", &self.settings)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Greeting(&'static str);

    #[test]
    fn test_shared_state() {
        let mut state = SharedState::new();
        assert!(state.is_empty());

        state.insert(Greeting("hello"));
        state.insert(3u32);
        state.insert(4u32);

        assert_eq!(state.len(), 2);
        assert!(state.contains::<Greeting>());
        assert_eq!(state.get::<Greeting>().map(|g| g.0), Some("hello"));
        assert_eq!(state.get::<u32>().as_deref(), Some(&4));
        assert!(state.get::<String>().is_none());
    }

    #[test]
    fn test_app_handle() {
        let mut state = SharedState::new();
        state.insert(Greeting("hi"));
        let app = AppHandle::new(
            state,
            Arc::new(Registry::new()),
            DispatchSettings::development(),
        );

        let cloned = app.clone();
        assert_eq!(cloned.state::<Greeting>().map(|g| g.0), Some("hi"));
        assert!(cloned.settings().expose_internal_errors);
        assert!(cloned.registry().is_empty());
    }
}
