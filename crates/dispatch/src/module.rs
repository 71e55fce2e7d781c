use std::sync::Arc;

use crate::event::EventHandler;
use crate::hooks::HookRegistry;
use crate::interceptor::Interceptor;

/// A unit of composition: installs hooks, contributes interceptors, and
/// subscribes to events, all in one call so a feature's wiring lives in one
/// place instead of being scattered across the composition root.
///
/// Modules are installed in registration order and torn down in reverse —
/// the same convention the gateway's own default-handler registration uses
/// for the services it wires in front of the generic ones.
pub trait Module: Send + Sync {
    fn name(&self) -> &'static str;

    fn install_hooks(&self, _registry: &HookRegistry) {}

    fn interceptors(&self) -> Vec<Arc<dyn Interceptor>> {
        Vec::new()
    }

    fn event_subscriptions(&self) -> Vec<(&'static str, EventHandler)> {
        Vec::new()
    }

    /// Runs in reverse registration order during dispatcher teardown.
    fn dispose(&self) {}
}
