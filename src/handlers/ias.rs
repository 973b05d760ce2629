//! Identity and registration handlers.

use md5::{Digest, Md5};
use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::info;

use crate::dispatch::ShopContext;
use crate::envelope::Envelope;
use crate::error::fault_codes::*;
use crate::error::{SoapError, StoreError};
use crate::nwc24;
use crate::payload::POINTS;
use crate::store::Account;

const DEVICE_STATUS_REGISTERED: &str = "R";
const DEVICE_STATUS_UNREGISTERED: &str = "U";

/// The client discards whatever challenge it receives.
const SHARED_CHALLENGE: &str = "NintyWhyPls";

const DEVICE_TOKEN_LEN: usize = 21;
const MAX_ACCOUNT_ID: i64 = 999_999_999;

fn whitelisted(ctx: &ShopContext, serial: &str) -> bool {
    ctx.whitelist.as_ref().map_or(true, |w| w.contains(serial))
}

pub fn check_registration(e: &mut Envelope, ctx: &ShopContext) {
    let serial = match e.get_key("SerialNumber") {
        Ok(serial) => serial.trim().to_string(),
        Err(err) => return e.error(IAS_CHECK_FAILED, "missing serial number", Some(&err)),
    };

    let registered = ctx.store.is_registered(e.device_id(), &serial, e.region());
    e.add_kv("OriginalSerialNumber", serial);
    match registered {
        Ok(true) => e.add_kv("DeviceStatus", DEVICE_STATUS_REGISTERED),
        Ok(false) => e.add_kv("DeviceStatus", DEVICE_STATUS_UNREGISTERED),
        Err(err) => e.error(IAS_CHECK_FAILED, "server-side error", Some(&err)),
    }
}

pub fn get_challenge(e: &mut Envelope, _ctx: &ShopContext) {
    e.add_kv("Challenge", SHARED_CHALLENGE);
}

/// [`sync_registration`] plus the account currency.
pub fn get_registration_info(e: &mut Envelope, ctx: &ShopContext) {
    sync_registration(e, ctx);
    e.add_kv("Currency", POINTS);
}

pub fn sync_registration(e: &mut Envelope, ctx: &ShopContext) {
    let account = match ctx.store.find_account(e.region(), e.device_id()) {
        Ok(Some(account)) => account,
        Ok(None) => {
            let err = SoapError::Store(StoreError::Backend(format!(
                "no account for device {}",
                e.device_id()
            )));
            return e.error(IAS_SYNC_FAILED, "error querying the database", Some(&err));
        }
        Err(err) => return e.error(IAS_SYNC_FAILED, "error querying the database", Some(&err)),
    };

    if !whitelisted(ctx, &account.serial_number) {
        return e.error(IAS_NOT_WHITELISTED, "serial number not whitelisted", None);
    }

    let country = e.country().to_string();
    e.add_kv("AccountId", account.account_id.to_string());
    e.add_kv("DeviceToken", account.device_token);
    e.add_kv("DeviceTokenExpired", "false");
    e.add_kv("Country", country);
    e.add_kv("ExtAccountId", "");
    e.add_kv("DeviceStatus", DEVICE_STATUS_REGISTERED);
}

/// Create an account for the device.
pub fn register(e: &mut Envelope, ctx: &ShopContext) {
    let device_code = match e.get_key("DeviceCode") {
        Ok(code) => code.trim().to_string(),
        Err(err) => return e.error(IAS_MISSING_DEVICE_CODE, "missing device code", Some(&err)),
    };

    let register_region = match e.get_key("RegisterRegion") {
        Ok(region) => region.trim().to_string(),
        Err(err) => return e.error(IAS_MISSING_REGION, "missing registration region", Some(&err)),
    };
    if register_region != e.region() {
        let err = SoapError::invalid("RegisterRegion", register_region);
        return e.error(IAS_REGION_MISMATCH, "mismatched region", Some(&err));
    }

    let serial = match e.get_key("SerialNumber") {
        Ok(serial) => serial.trim().to_string(),
        Err(err) => return e.error(IAS_MISSING_SERIAL, "missing serial number", Some(&err)),
    };

    if !whitelisted(ctx, &serial) {
        return e.error(IAS_NOT_WHITELISTED, "serial number not whitelisted", None);
    }

    match device_code.parse::<u64>() {
        Ok(code) if nwc24::check_user_id(code) => {}
        Ok(_) => {
            let err = SoapError::invalid("DeviceCode", device_code);
            return e.error(IAS_FRIEND_CODE_REJECTED, "invalid friend code", Some(&err));
        }
        Err(_) => {
            let err = SoapError::invalid("DeviceCode", device_code);
            return e.error(IAS_INVALID_FRIEND_CODE, "invalid friend code", Some(&err));
        }
    }

    let mut rng = rand::thread_rng();
    let account_id = rng.gen_range(0..MAX_ACCOUNT_ID);
    let device_token: String = (&mut rng)
        .sample_iter(&Alphanumeric)
        .take(DEVICE_TOKEN_LEN)
        .map(char::from)
        .collect();
    // The console sends the hashed form on most later requests.
    let device_token_hashed = hex::encode(Md5::digest(device_token.as_bytes()));

    let account = Account {
        account_id,
        device_id: e.device_id(),
        device_token: device_token.clone(),
        device_token_hashed,
        region: e.region().to_string(),
        serial_number: serial,
    };

    match ctx.store.register(account) {
        Ok(()) => {}
        Err(err @ StoreError::Conflict(_)) => {
            return e.error(IAS_ALREADY_REGISTERED, "user already exists", Some(&err))
        }
        Err(err) => return e.error(IAS_STORE_FAILURE, "database error", Some(&err)),
    }

    info!(
        account_id,
        device_id = e.device_id(),
        region = %e.region(),
        "Registered device"
    );

    let country = e.country().to_string();
    e.add_kv("AccountId", account_id.to_string());
    e.add_kv("DeviceToken", device_token);
    e.add_kv("DeviceTokenExpired", "false");
    e.add_kv("Country", country);
    e.add_kv("ExtAccountId", "");
    e.add_kv("DeviceCode", device_code);
}

pub fn unregister(_e: &mut Envelope, _ctx: &ShopContext) {}
