//! E-commerce service handlers.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{Duration, Utc};
use tracing::info;

use crate::dispatch::ShopContext;
use crate::envelope::Envelope;
use crate::error::fault_codes::ECS_FAILURE;
use crate::error::SoapError;
use crate::licence::LicenceKind;
use crate::payload::{Balance, TicketInfo, Transaction};
use crate::store::NewPurchase;
use crate::ticket::{
    format_title_id, is_subscription_title, parse_reference_id, parse_title_id,
    SubscriptionRecord, SERVICE_APPLICATION_ID, SERVICE_TITLE_ID,
};

use super::add_sync_times;

/// Date sent for titles without a purchase record.
const PLACEHOLDER_PURCHASE_DATE: &str = "1666202566218";

pub fn check_device_status(e: &mut Envelope, _ctx: &ShopContext) {
    e.add_typed(Balance::shared());
    add_sync_times(e);
}

/// Sync acknowledgement; nothing is tracked.
pub fn notify_etickets_synced(_e: &mut Envelope, _ctx: &ShopContext) {}

pub fn list_etickets(e: &mut Envelope, ctx: &ShopContext) {
    let account_id = match e.account_id() {
        Ok(id) => id,
        Err(err) => return e.error(ECS_FAILURE, "missing account ID", Some(&err)),
    };

    let owned = match ctx.store.owned_titles(account_id) {
        Ok(owned) => owned,
        Err(err) => return e.error(ECS_FAILURE, "database error", Some(&err)),
    };

    for title in owned {
        e.add_typed(TicketInfo::owned(title.title_id, title.version));
    }
    add_sync_times(e);
}

pub fn get_etickets(e: &mut Envelope, _ctx: &ShopContext) {
    add_sync_times(e);
}

/// Issue a ticket for `TitleId` and record the purchase.
pub fn purchase_title(e: &mut Envelope, ctx: &ShopContext) {
    let account_id = match e.account_id() {
        Ok(id) => id,
        Err(err) => return e.error(ECS_FAILURE, "missing account ID", Some(&err)),
    };

    let item_id = match e.get_key("ItemId") {
        Ok(raw) => raw.trim().parse::<i32>().unwrap_or(0),
        Err(err) => return e.error(ECS_FAILURE, "missing item ID", Some(&err)),
    };

    let title_id = match e.get_key("TitleId").and_then(parse_title_id) {
        Ok(id) => id,
        Err(err) => return e.error(ECS_FAILURE, "invalid title id", Some(&err)),
    };
    let title_hex = format_title_id(title_id);

    let catalog = match ctx.store.catalog_entry(&title_hex) {
        Ok(entry) => entry,
        Err(err) => return e.error(ECS_FAILURE, "database error", Some(&err)),
    };
    let (version, price) = catalog.map_or((0, 0), |entry| (entry.version, entry.price));

    let mut reference_id = None;
    let ticket = ctx.encoder.standard_ticket(title_id);

    let ticket_bytes = if is_subscription_title(title_id) {
        let raw_reference = match e.get_key("ReferenceId") {
            Ok(raw) => raw.trim().to_string(),
            Err(err) => return e.error(ECS_FAILURE, "missing reference ID", Some(&err)),
        };
        let records = match subscription_records(ctx, &raw_reference, &title_hex, account_id) {
            Ok(records) => records,
            Err(err) => return e.error(ECS_FAILURE, "error purchasing", Some(&err)),
        };
        reference_id = Some(raw_reference);
        ctx.encoder.build_subscription_ticket(&ticket, &records)
    } else {
        ticket.to_bytes()
    };

    let ticket_bytes = match ticket_bytes {
        Ok(bytes) => bytes,
        Err(err) => return e.error(ECS_FAILURE, "failed to create ticket", Some(&err)),
    };

    let purchase = NewPurchase {
        account_id,
        title_id: title_hex.clone(),
        version,
        item_id,
        reference_id,
        purchased_at: Utc::now(),
    };
    if let Err(err) = ctx.store.associate_ticket(purchase) {
        // Falls through: the fault is already recorded and suppresses the
        // fields below.
        e.error(ECS_FAILURE, "error purchasing", Some(&err));
    }

    info!(
        account_id,
        title_id = %title_hex,
        item_id,
        "Issued ticket"
    );

    let certs = STANDARD.encode(ctx.encoder.certificate_chain().as_bytes());
    let etickets = STANDARD.encode(ctx.encoder.append_certificate_chain(&ticket_bytes));

    let now = e.timestamp();
    let mut transaction = Transaction::game_purchase(now.clone(), item_id, LicenceKind::Permanent);
    transaction.total_paid = price;
    transaction.item_pricing.price.amount = price;

    e.add_typed(Balance::shared());
    e.add_typed(transaction);
    e.add_kv("SyncTime", now);
    e.add_kv("ETickets", etickets);
    // The client expects the chain twice more on its own.
    e.add_kv("Certs", certs.clone());
    e.add_kv("Certs", certs);
    e.add_kv("TitleId", title_hex);
}

/// The new record first, then every earlier purchase in store order.
fn subscription_records(
    ctx: &ShopContext,
    reference_id: &str,
    title_hex: &str,
    account_id: i64,
) -> Result<Vec<SubscriptionRecord>, SoapError> {
    let mut records = vec![SubscriptionRecord::fresh(parse_reference_id(reference_id)?, Utc::now())?];
    for row in ctx.store.owned_service_titles(title_hex, account_id)? {
        records.push(SubscriptionRecord::from_purchase(
            parse_reference_id(&row.reference_id)?,
            row.purchased_at,
        )?);
    }
    Ok(records)
}

pub fn list_purchase_history(e: &mut Envelope, ctx: &ShopContext) {
    let account_id = match e.account_id() {
        Ok(id) => id,
        Err(err) => return e.error(ECS_FAILURE, "missing account ID", Some(&err)),
    };

    let application_id = match e.get_key("ApplicationId") {
        Ok(raw) => raw.trim().to_lowercase(),
        Err(err) => return e.error(ECS_FAILURE, "missing application ID", Some(&err)),
    };

    let mut transactions = Vec::new();
    if application_id == format_title_id(SERVICE_APPLICATION_ID) {
        let service_title = format_title_id(SERVICE_TITLE_ID);
        let rows = match ctx.store.owned_service_titles(&service_title, account_id) {
            Ok(rows) => rows,
            Err(err) => return e.error(ECS_FAILURE, "error listing purchases", Some(&err)),
        };

        for row in rows {
            // Reported one day before the actual purchase.
            let date = (row.purchased_at - Duration::days(1)).timestamp_millis();
            let mut tx = Transaction::game_purchase(date.to_string(), row.item_id, LicenceKind::Service);
            tx.title_id = service_title.clone();
            tx.item_code = row.item_id;
            tx.reference_id = row.reference_id;
            transactions.push(tx);
        }
    } else {
        let mut tx = Transaction::game_purchase(PLACEHOLDER_PURCHASE_DATE, 0, LicenceKind::Permanent);
        tx.title_id = format_title_id(SERVICE_TITLE_ID).to_uppercase();
        transactions.push(tx);
    }

    let total = transactions.len();
    e.add_typed(transactions);
    e.add_kv("ListResultTotalSize", total.to_string());
}

fn service_url(base_url: &str, service: &str, path: &str) -> String {
    format!("http://{}.{}/{}/services/{}", service, base_url, service, path)
}

pub fn get_ec_config(e: &mut Envelope, ctx: &ShopContext) {
    let content_url = format!("http://ccs.{}/ccs/download", ctx.base_url);
    e.add_kv("ContentPrefixURL", content_url.clone());
    e.add_kv("UncachedContentPrefixURL", content_url.clone());
    e.add_kv("SystemContentPrefixURL", content_url.clone());
    e.add_kv("SystemUncachedContentPrefixURL", content_url);

    e.add_kv("EcsURL", service_url(&ctx.base_url, "ecs", "ECommerceSOAP"));
    e.add_kv("IasURL", service_url(&ctx.base_url, "ias", "IdentityAuthenticationSOAP"));
    e.add_kv("CasURL", service_url(&ctx.base_url, "cas", "CatalogingSOAP"));
    e.add_kv("NusURL", service_url(&ctx.base_url, "nus", "NetUpdateSOAP"));
}
