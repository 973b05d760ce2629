//! Persistence collaborator.
//!
//! The service only sees plain rows; schema and query text belong to the
//! backend. [`MemoryStore`] backs tests and the standalone binary.

use std::collections::HashSet;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::error::StoreError;

/// `(title id, version)` of a title an account owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedTitle {
    pub title_id: String,
    pub version: i32,
}

/// Catalog row for a purchasable title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    /// Lower-case hex.
    pub title_id: String,
    pub item_id: i32,
    pub version: i32,
    /// Price in points.
    pub price: i32,
}

/// A purchase of a service-family item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServicePurchase {
    pub reference_id: String,
    pub purchased_at: DateTime<Utc>,
    pub item_id: i32,
}

/// Row recorded when a ticket is issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPurchase {
    pub account_id: i64,
    pub title_id: String,
    pub version: i32,
    pub item_id: i32,
    pub reference_id: Option<String>,
    pub purchased_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub account_id: i64,
    pub device_id: u64,
    pub device_token: String,
    pub device_token_hashed: String,
    pub region: String,
    pub serial_number: String,
}

/// Rows the handlers read and write. Calls may block.
pub trait ShopStore: Send + Sync {
    fn catalog_entry(&self, title_id: &str) -> Result<Option<CatalogEntry>, StoreError>;

    fn owned_titles(&self, account_id: i64) -> Result<Vec<OwnedTitle>, StoreError>;

    /// Earlier purchases of `title_id` (lower-case hex) by the account, oldest first.
    fn owned_service_titles(
        &self,
        title_id: &str,
        account_id: i64,
    ) -> Result<Vec<ServicePurchase>, StoreError>;

    fn associate_ticket(&self, purchase: NewPurchase) -> Result<(), StoreError>;

    fn is_registered(&self, device_id: u64, serial_number: &str, region: &str) -> Result<bool, StoreError>;

    fn find_account(&self, region: &str, device_id: u64) -> Result<Option<Account>, StoreError>;

    /// Fails with [`StoreError::Conflict`] when the device is already registered.
    fn register(&self, account: Account) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
struct Tables {
    accounts: Vec<Account>,
    purchases: Vec<NewPurchase>,
    catalog: Vec<CatalogEntry>,
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a catalog row.
    pub fn publish(&self, mut entry: CatalogEntry) -> Result<(), StoreError> {
        entry.title_id = entry.title_id.to_lowercase();
        let mut tables = self.lock()?;
        tables.catalog.retain(|e| e.title_id != entry.title_id);
        tables.catalog.push(entry);
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Backend("store lock poisoned".to_string()))
    }
}

impl ShopStore for MemoryStore {
    fn catalog_entry(&self, title_id: &str) -> Result<Option<CatalogEntry>, StoreError> {
        let title_id = title_id.to_lowercase();
        Ok(self
            .lock()?
            .catalog
            .iter()
            .find(|e| e.title_id == title_id)
            .cloned())
    }

    fn owned_titles(&self, account_id: i64) -> Result<Vec<OwnedTitle>, StoreError> {
        let tables = self.lock()?;
        let mut seen = HashSet::new();
        Ok(tables
            .purchases
            .iter()
            .filter(|p| p.account_id == account_id)
            .filter(|p| seen.insert(p.title_id.clone()))
            .filter_map(|p| {
                tables
                    .catalog
                    .iter()
                    .find(|e| e.title_id == p.title_id)
                    .map(|e| OwnedTitle {
                        title_id: e.title_id.clone(),
                        version: e.version,
                    })
            })
            .collect())
    }

    fn owned_service_titles(
        &self,
        title_id: &str,
        account_id: i64,
    ) -> Result<Vec<ServicePurchase>, StoreError> {
        let tables = self.lock()?;
        Ok(tables
            .purchases
            .iter()
            .filter(|p| p.account_id == account_id && p.title_id == title_id)
            .filter_map(|p| {
                p.reference_id.as_ref().map(|reference_id| ServicePurchase {
                    reference_id: reference_id.clone(),
                    purchased_at: p.purchased_at,
                    item_id: p.item_id,
                })
            })
            .collect())
    }

    fn associate_ticket(&self, purchase: NewPurchase) -> Result<(), StoreError> {
        self.lock()?.purchases.push(purchase);
        Ok(())
    }

    fn is_registered(&self, device_id: u64, serial_number: &str, region: &str) -> Result<bool, StoreError> {
        Ok(self.lock()?.accounts.iter().any(|a| {
            a.device_id == device_id && a.serial_number == serial_number && a.region == region
        }))
    }

    fn find_account(&self, region: &str, device_id: u64) -> Result<Option<Account>, StoreError> {
        Ok(self
            .lock()?
            .accounts
            .iter()
            .find(|a| a.region == region && a.device_id == device_id)
            .cloned())
    }

    fn register(&self, account: Account) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        if tables.accounts.iter().any(|a| a.device_id == account.device_id) {
            return Err(StoreError::Conflict(format!(
                "device {} already registered",
                account.device_id
            )));
        }
        tables.accounts.push(account);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn purchase(account_id: i64, title_id: &str, reference_id: Option<&str>) -> NewPurchase {
        NewPurchase {
            account_id,
            title_id: title_id.to_string(),
            version: 0,
            item_id: 4,
            reference_id: reference_id.map(String::from),
            purchased_at: Utc::now(),
        }
    }

    #[test]
    fn test_owned_titles_joins_versions() {
        let store = MemoryStore::new();
        store
            .publish(CatalogEntry {
                title_id: "0001000148414445".into(),
                item_id: 9,
                version: 2,
                price: 500,
            })
            .unwrap();
        assert_eq!(store.catalog_entry("0001000148414445").unwrap().unwrap().item_id, 9);
        assert!(store.catalog_entry("00010001ffffffff").unwrap().is_none());
        store.associate_ticket(purchase(1, "0001000148414445", None)).unwrap();
        store.associate_ticket(purchase(1, "0001000148414445", None)).unwrap();
        store.associate_ticket(purchase(1, "00010001ffffffff", None)).unwrap();
        store.associate_ticket(purchase(2, "0001000148414445", None)).unwrap();

        let owned = store.owned_titles(1).unwrap();
        assert_eq!(owned, vec![OwnedTitle { title_id: "0001000148414445".into(), version: 2 }]);
    }

    #[test]
    fn test_service_titles_need_reference() {
        let store = MemoryStore::new();
        store.associate_ticket(purchase(1, "000101006843494a", Some("aa"))).unwrap();
        store.associate_ticket(purchase(1, "000101006843494a", None)).unwrap();
        let rows = store.owned_service_titles("000101006843494a", 1).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].reference_id, "aa");
    }

    #[test]
    fn test_register_conflict() {
        let store = MemoryStore::new();
        let account = Account {
            account_id: 5,
            device_id: 42,
            device_token: "t".into(),
            device_token_hashed: "h".into(),
            region: "USA".into(),
            serial_number: "LU1".into(),
        };
        store.register(account.clone()).unwrap();
        assert!(matches!(store.register(account), Err(StoreError::Conflict(_))));
        assert!(store.is_registered(42, "LU1", "USA").unwrap());
        assert!(!store.is_registered(42, "LU1", "JPN").unwrap());
        assert_eq!(store.find_account("USA", 42).unwrap().unwrap().account_id, 5);
    }
}
