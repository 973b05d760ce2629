//! Catalog service handlers.

use tracing::debug;

use crate::dispatch::ShopContext;
use crate::envelope::Envelope;
use crate::error::fault_codes::{CAS_INVALID_FILTER, CAS_MISSING_TITLE, ECS_FAILURE};
use crate::licence::{LicenceKind, LimitKind, Limits};
use crate::payload::{Attribute, Item, Price, Prices, Ratings};

/// Filter naming the licence kind the client is browsing.
const TITLE_KIND_FILTER: &str = "TitleKind";

pub fn list_items(e: &mut Envelope, ctx: &ShopContext) {
    // Both lookups may fault; the first fault is the one reported.
    let title_id = match e.get_key("TitleId") {
        Ok(raw) => raw.trim().to_string(),
        Err(err) => {
            e.error(CAS_MISSING_TITLE, "unable to obtain title", Some(&err));
            String::new()
        }
    };

    let kind_text = match e.filters("AttributeFilters") {
        Ok(filters) => filters.get(TITLE_KIND_FILTER).map(|v| v.to_string()).unwrap_or_default(),
        Err(err) => {
            e.error(CAS_INVALID_FILTER, "AttributeFilters key did not exist", Some(&err));
            String::new()
        }
    };

    let licence_kind = match kind_text.parse::<LicenceKind>() {
        Ok(kind) => kind,
        Err(err) => return e.error(CAS_INVALID_FILTER, "invalid TitleKind", Some(&err)),
    };

    let entry = match ctx.store.catalog_entry(&title_id) {
        Ok(entry) => entry,
        Err(err) => return e.error(ECS_FAILURE, "database error", Some(&err)),
    };

    let Some(entry) = entry else {
        debug!(title_id = %title_id, "Title not in catalog");
        e.add_kv("ListResultTotalSize", "0");
        return;
    };

    e.add_kv("ListResultTotalSize", "1");
    e.add_typed(Item {
        title_id,
        title_included: false,
        content_index: 0,
        attributes: vec![
            Attribute::new("TitleVersion", entry.version.to_string()),
            Attribute::new("Prices", "1"),
        ],
        ratings: Ratings {
            name: "E".to_string(),
            rating: 1,
            age: 9,
        },
        prices: Prices {
            item_id: entry.item_id,
            // Must match the price later charged by PurchaseTitle.
            price: Price::points(entry.price),
            limits: Limits::new(LimitKind::Pr),
            licence_kind,
        },
    });
}
