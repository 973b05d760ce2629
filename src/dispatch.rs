//! Action dispatch.
//!
//! Maps (service, action) pairs to handlers and drives one request through
//! parse, handle and serialize.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, error};

use crate::config::Whitelist;
use crate::envelope::Envelope;
use crate::error::{fault_codes, Result};
use crate::handlers;
use crate::store::ShopStore;
use crate::ticket::TicketEncoder;

/// Shared, read-only collaborators handed to every handler.
#[derive(Clone)]
pub struct ShopContext {
    pub encoder: Arc<TicketEncoder>,
    pub store: Arc<dyn ShopStore>,
    pub whitelist: Option<Arc<Whitelist>>,
    /// Host suffix used to build service URLs.
    pub base_url: String,
}

/// A handler reads the request through the envelope and writes its
/// response fields or a fault back into it.
pub type Handler = fn(&mut Envelope, &ShopContext);

pub struct Dispatcher {
    handlers: HashMap<(String, String), Handler>,
    context: ShopContext,
}

impl Dispatcher {
    /// A dispatcher with no actions registered.
    pub fn new(context: ShopContext) -> Self {
        Self {
            handlers: HashMap::new(),
            context,
        }
    }

    /// A dispatcher serving every ECS, CAS and IAS action.
    pub fn with_shop_actions(context: ShopContext) -> Self {
        let mut dispatcher = Self::new(context);
        handlers::register_all(&mut dispatcher);
        dispatcher
    }

    /// Serve `action` on `service` only.
    pub fn register(
        &mut self,
        service: impl Into<String>,
        action: impl Into<String>,
        handler: Handler,
    ) {
        self.handlers.insert((service.into(), action.into()), handler);
    }

    pub fn supports(&self, service: &str, action: &str) -> bool {
        self.handlers.contains_key(&(service.to_string(), action.to_string()))
    }

    pub fn context(&self) -> &ShopContext {
        &self.context
    }

    /// Run the handler for the envelope's service and action.
    ///
    /// Unknown actions, including actions of another service, and handler
    /// panics all end up as faults.
    pub fn dispatch(&self, envelope: &mut Envelope) {
        let service = envelope.service().to_string();
        let action = envelope.action().to_string();
        let Some(handler) = self.handlers.get(&(service.clone(), action.clone())) else {
            envelope.error(
                fault_codes::UNSUPPORTED_ACTION,
                format!("unsupported action {} for {}", action, service),
                None,
            );
            return;
        };

        debug!(
            service = %service,
            action = %action,
            device_id = envelope.device_id(),
            "Dispatching request"
        );

        let outcome = catch_unwind(AssertUnwindSafe(|| handler(envelope, &self.context)));
        if outcome.is_err() {
            error!(action = %action, "Handler panicked");
            envelope.error(fault_codes::ECS_FAILURE, "internal handler failure", None);
        }
    }

    /// Parse, dispatch and serialize one request body.
    ///
    /// Only unparseable requests return an error; everything else yields a
    /// well-formed response, faulted or not.
    pub fn handle(&self, service: &str, action: &str, body: &[u8]) -> Result<String> {
        let mut envelope = Envelope::parse(service, action, body)?;
        self.dispatch(&mut envelope);
        envelope.serialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::tests::ECS_REQUEST;
    use crate::store::MemoryStore;
    use crate::ticket::tests::encoder;

    fn context() -> ShopContext {
        ShopContext {
            encoder: Arc::new(encoder()),
            store: Arc::new(MemoryStore::new()),
            whitelist: None,
            base_url: "shop.example.com".to_string(),
        }
    }

    fn echo(e: &mut Envelope, _: &ShopContext) {
        let token = e.get_key("DeviceToken").unwrap_or_default().to_string();
        e.add_kv("Echo", token);
    }

    fn faulting(e: &mut Envelope, _: &ShopContext) {
        e.error(2, "first", None);
        e.add_kv("Ignored", "x");
        e.error(5, "second", None);
    }

    fn panicking(_: &mut Envelope, _: &ShopContext) {
        panic!("boom");
    }

    #[test]
    fn test_registered_handler_runs() {
        let mut dispatcher = Dispatcher::new(context());
        dispatcher.register("ecs", "ListETickets", echo);
        let xml = dispatcher.handle("ecs", "ListETickets", ECS_REQUEST.as_bytes()).unwrap();
        assert!(xml.contains("<Echo>abcdef</Echo>"));
        assert!(xml.contains("<ErrorCode>0</ErrorCode>"));
    }

    #[test]
    fn test_unknown_action_faults() {
        let dispatcher = Dispatcher::new(context());
        assert!(!dispatcher.supports("ecs", "ListETickets"));
        let xml = dispatcher.handle("ecs", "ListETickets", ECS_REQUEST.as_bytes()).unwrap();
        assert!(xml.contains("<ErrorCode>1</ErrorCode>"));
        assert!(xml.contains("<ListETicketsResponse"));
    }

    #[test]
    fn test_action_bound_to_its_service() {
        let dispatcher = Dispatcher::with_shop_actions(context());
        assert!(dispatcher.supports("ias", "Register"));
        assert!(!dispatcher.supports("ecs", "Register"));
        assert!(!dispatcher.supports("ias", "ListETickets"));

        let body = ECS_REQUEST.replace("ListETickets", "Register");
        let xml = dispatcher.handle("ecs", "Register", body.as_bytes()).unwrap();
        assert!(xml.contains("<ErrorCode>1</ErrorCode>"));
        assert!(xml.contains("<RegisterResponse xmlns=\"urn:ecs.wsapi.broadon.com\">"));
        assert!(!xml.contains("<DeviceToken>"));
    }

    #[test]
    fn test_repeated_errors_keep_first() {
        let mut dispatcher = Dispatcher::new(context());
        dispatcher.register("ecs", "ListETickets", faulting);
        let xml = dispatcher.handle("ecs", "ListETickets", ECS_REQUEST.as_bytes()).unwrap();
        assert!(xml.contains("<ErrorCode>2</ErrorCode>"));
        assert!(!xml.contains("Ignored"));
    }

    #[test]
    fn test_panic_becomes_fault() {
        let mut dispatcher = Dispatcher::new(context());
        dispatcher.register("ecs", "ListETickets", panicking);
        let xml = dispatcher.handle("ecs", "ListETickets", ECS_REQUEST.as_bytes()).unwrap();
        assert!(xml.contains("<ErrorCode>2</ErrorCode>"));
    }

    #[test]
    fn test_unparseable_body_is_error() {
        let dispatcher = Dispatcher::with_shop_actions(context());
        assert!(dispatcher.handle("ecs", "ListETickets", b"<oops").is_err());
    }
}
