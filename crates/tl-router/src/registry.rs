use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::handler::EventHandler;

/// Event type → handler. Lookups ignore case.
#[derive(Default)]
pub struct EventHandlerRegistry {
    handlers: HashMap<String, Arc<dyn EventHandler>>,
}

impl EventHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under its own event type, replacing any earlier one.
    pub fn register(&mut self, handler: Arc<dyn EventHandler>) {
        let key = handler.event_type().to_uppercase();
        info!(event_type = %key, "Registered event handler");
        self.handlers.insert(key, handler);
    }

    pub fn with_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.register(handler);
        self
    }

    pub fn get(&self, event_type: &str) -> Option<Arc<dyn EventHandler>> {
        self.handlers.get(&event_type.to_uppercase()).cloned()
    }

    pub fn event_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EventContext;
    use async_trait::async_trait;

    struct Named(&'static str);

    #[async_trait]
    impl EventHandler for Named {
        fn event_type(&self) -> &str {
            self.0
        }

        async fn handle(&self, _ctx: EventContext) {}
    }

    #[test]
    fn test_lookup_ignores_case() {
        let registry = EventHandlerRegistry::new().with_handler(Arc::new(Named("CheckIn")));

        assert!(registry.get("CHECKIN").is_some());
        assert!(registry.get("checkin").is_some());
        assert!(registry.get("checkout").is_none());
        assert_eq!(registry.event_types(), vec!["CHECKIN".to_string()]);
    }

    #[test]
    fn test_later_registration_wins() {
        let mut registry = EventHandlerRegistry::new();
        registry.register(Arc::new(Named("CHECKIN")));
        registry.register(Arc::new(Named("checkin")));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("CHECKIN").map(|h| h.event_type().to_string()), Some("checkin".into()));
    }
}
