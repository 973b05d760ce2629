//! Action handlers for the three shop services.
//!
//! - `ecs`: e-commerce (tickets, purchases, history, service URLs)
//! - `cas`: catalog listing
//! - `ias`: identity and registration

use crate::dispatch::Dispatcher;
use crate::envelope::Envelope;

pub mod cas;
pub mod ecs;
pub mod ias;

pub fn register_all(dispatcher: &mut Dispatcher) {
    dispatcher.register("ecs", "CheckDeviceStatus", ecs::check_device_status);
    dispatcher.register("ecs", "NotifyETicketsSynced", ecs::notify_etickets_synced);
    dispatcher.register("ecs", "ListETickets", ecs::list_etickets);
    dispatcher.register("ecs", "GetETickets", ecs::get_etickets);
    dispatcher.register("ecs", "PurchaseTitle", ecs::purchase_title);
    dispatcher.register("ecs", "ListPurchaseHistory", ecs::list_purchase_history);
    dispatcher.register("ecs", "GetECConfig", ecs::get_ec_config);

    dispatcher.register("cas", "ListItems", cas::list_items);

    dispatcher.register("ias", "CheckRegistration", ias::check_registration);
    dispatcher.register("ias", "GetChallenge", ias::get_challenge);
    dispatcher.register("ias", "GetRegistrationInfo", ias::get_registration_info);
    dispatcher.register("ias", "SyncRegistration", ias::sync_registration);
    dispatcher.register("ias", "Register", ias::register);
    dispatcher.register("ias", "Unregister", ias::unregister);
}

/// The three sync markers every ticket listing ends with.
fn add_sync_times(e: &mut Envelope) {
    let now = e.timestamp();
    e.add_kv("ForceSyncTime", "0");
    e.add_kv("ExtTicketTime", now.clone());
    e.add_kv("SyncTime", now);
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use crate::dispatch::{Dispatcher, ShopContext};
    use crate::store::MemoryStore;
    use crate::ticket::tests::encoder;

    pub(crate) fn dispatcher_with(store: Arc<MemoryStore>) -> Dispatcher {
        Dispatcher::with_shop_actions(ShopContext {
            encoder: Arc::new(encoder()),
            store,
            whitelist: None,
            base_url: "shop.example.com".to_string(),
        })
    }

    /// Wrap operation children in a request envelope.
    pub(crate) fn request(service: &str, action: &str, inner: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<SOAP-ENV:Envelope xmlns:SOAP-ENV="http://schemas.xmlsoap.org/soap/envelope/">
  <SOAP-ENV:Body>
    <{service}:{action} xmlns:{service}="urn:{service}.wsapi.broadon.com">
      <{service}:Version>2.0</{service}:Version>
      <{service}:MessageId>{action}-1</{service}:MessageId>
      <{service}:DeviceId>4362227770</{service}:DeviceId>
      {inner}
    </{service}:{action}>
  </SOAP-ENV:Body>
</SOAP-ENV:Envelope>"#
        )
    }
}
