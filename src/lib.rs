//! SOAP server for a legacy console shop protocol.
//!
//! Answers the console's e-commerce, catalog and identity requests and
//! issues the binary tickets the console trusts.
//!
//! # Features
//!
//! - Tolerant request parsing with depth-agnostic key lookup
//! - Response assembly with first-wins fault handling
//! - Typed response payloads with fixed field layouts
//! - Ticket encoding with per-title key derivation and subscription records
//! - ECS, CAS and IAS action handlers over a pluggable store
//!
//! # Example
//!
//! ```ignore
//! use shop_soap::{Dispatcher, MemoryStore, ShopConfig, ShopContext};
//!
//! let config = ShopConfig::from_yaml(&text)?;
//! let dispatcher = Dispatcher::with_shop_actions(ShopContext {
//!     encoder: Arc::new(config.load_encoder()?),
//!     store: Arc::new(MemoryStore::new()),
//!     whitelist: config.load_whitelist()?.map(Arc::new),
//!     base_url: config.server.base_url.clone(),
//! });
//! let xml = dispatcher.handle("ecs", "ListETickets", body)?;
//! ```

pub mod config;
pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod handlers;
pub mod licence;
pub mod nwc24;
pub mod payload;
pub mod server;
pub mod store;
pub mod ticket;

pub use config::{ShopConfig, Whitelist};
pub use dispatch::{Dispatcher, Handler, ShopContext};
pub use envelope::{Envelope, Fault};
pub use error::{fault_codes, SoapError, StoreError};
pub use licence::{LicenceKind, LimitKind};
pub use payload::Payload;
pub use store::{MemoryStore, ShopStore};
pub use ticket::{CertificateChain, KeyMaterial, TicketEncoder};
