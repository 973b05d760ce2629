//! Typed response payloads.
//!
//! Every payload kind owns a fixed field-to-tag table expressed by its
//! [`Render`] implementation. Fields marked optional in the legacy schema are
//! omitted when empty; everything else is always emitted, even when blank.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::error::{Result, SoapError};
use crate::licence::{LicenceKind, LimitKind, Limits};

/// Currency every price and balance is expressed in.
pub const POINTS: &str = "POINTS";

/// Compact XML output buffer shared by the serializer and payloads.
pub struct XmlOut {
    writer: Writer<Vec<u8>>,
}

fn write_err<E: std::fmt::Display>(e: E) -> SoapError {
    SoapError::Serialize(e.to_string())
}

impl XmlOut {
    pub fn new() -> Self {
        Self {
            writer: Writer::new(Vec::new()),
        }
    }

    pub fn declaration(&mut self) -> Result<()> {
        self.writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(write_err)
    }

    pub fn open(&mut self, tag: &str, attrs: &[(&str, &str)]) -> Result<()> {
        let start = BytesStart::new(tag).with_attributes(attrs.iter().copied());
        self.writer.write_event(Event::Start(start)).map_err(write_err)
    }

    pub fn close(&mut self, tag: &str) -> Result<()> {
        self.writer
            .write_event(Event::End(BytesEnd::new(tag)))
            .map_err(write_err)
    }

    /// `<tag>value</tag>`, escaping the value.
    pub fn field(&mut self, tag: &str, value: &str) -> Result<()> {
        self.open(tag, &[])?;
        if !value.is_empty() {
            self.writer
                .write_event(Event::Text(BytesText::new(value)))
                .map_err(write_err)?;
        }
        self.close(tag)
    }

    pub fn field_display(&mut self, tag: &str, value: impl std::fmt::Display) -> Result<()> {
        self.field(tag, &value.to_string())
    }

    pub fn into_string(self) -> Result<String> {
        String::from_utf8(self.writer.into_inner()).map_err(write_err)
    }
}

impl Default for XmlOut {
    fn default() -> Self {
        Self::new()
    }
}

/// Static field table of a payload shape.
pub trait Render {
    fn render(&self, out: &mut XmlOut) -> Result<()>;
}

/// Closed set of payload shapes a handler may append to a response.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Balance(Balance),
    Tickets(TicketInfo),
    /// Rendered as one `<Transactions>` element per entry, in order.
    Transactions(Vec<Transaction>),
    Items(Item),
}

impl Render for Payload {
    fn render(&self, out: &mut XmlOut) -> Result<()> {
        match self {
            Self::Balance(balance) => balance.render(out),
            Self::Tickets(ticket) => ticket.render(out),
            Self::Transactions(list) => list.iter().try_for_each(|t| t.render(out)),
            Self::Items(item) => item.render(out),
        }
    }
}

impl From<Balance> for Payload {
    fn from(value: Balance) -> Self {
        Self::Balance(value)
    }
}

impl From<TicketInfo> for Payload {
    fn from(value: TicketInfo) -> Self {
        Self::Tickets(value)
    }
}

impl From<Transaction> for Payload {
    fn from(value: Transaction) -> Self {
        Self::Transactions(vec![value])
    }
}

impl From<Vec<Transaction>> for Payload {
    fn from(value: Vec<Transaction>) -> Self {
        Self::Transactions(value)
    }
}

impl From<Item> for Payload {
    fn from(value: Item) -> Self {
        Self::Items(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Balance {
    pub amount: i32,
    pub currency: String,
}

impl Balance {
    /// The shared points balance. Not a tracked value; large enough that no
    /// purchase is ever refused client-side.
    pub fn shared() -> Self {
        Self {
            amount: i32::MAX,
            currency: POINTS.to_string(),
        }
    }
}

impl Render for Balance {
    fn render(&self, out: &mut XmlOut) -> Result<()> {
        out.open("Balance", &[])?;
        out.field_display("Amount", self.amount)?;
        out.field("Currency", &self.currency)?;
        out.close("Balance")
    }
}

/// A title the console is entitled to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TicketInfo {
    pub ticket_id: String,
    pub title_id: String,
    pub revoke_date: i64,
    pub version: i32,
    pub migrate_count: i32,
    pub migrate_limit: i32,
}

impl TicketInfo {
    /// Migration, ticket ids and revocation are not supported.
    pub fn owned(title_id: impl Into<String>, version: i32) -> Self {
        Self {
            ticket_id: "0".to_string(),
            title_id: title_id.into(),
            version,
            ..Default::default()
        }
    }
}

impl Render for TicketInfo {
    fn render(&self, out: &mut XmlOut) -> Result<()> {
        out.open("Tickets", &[])?;
        out.field("TicketId", &self.ticket_id)?;
        out.field("TitleId", &self.title_id)?;
        out.field_display("RevokeDate", self.revoke_date)?;
        out.field_display("Version", self.version)?;
        out.field_display("MigrateCount", self.migrate_count)?;
        out.field_display("MigrateLimit", self.migrate_limit)?;
        out.close("Tickets")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Price {
    pub amount: i32,
    pub currency: String,
}

impl Price {
    pub fn points(amount: i32) -> Self {
        Self {
            amount,
            currency: POINTS.to_string(),
        }
    }
}

/// Pricing block, rendered under a caller-chosen tag
/// (`Prices` in catalog items, `ItemPricing` in transactions).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prices {
    pub item_id: i32,
    pub price: Price,
    pub limits: Limits,
    pub licence_kind: LicenceKind,
}

impl Prices {
    pub fn free(item_id: i32, limit: LimitKind, licence_kind: LicenceKind) -> Self {
        Self {
            item_id,
            price: Price::points(0),
            limits: Limits::new(limit),
            licence_kind,
        }
    }

    fn render_as(&self, tag: &str, out: &mut XmlOut) -> Result<()> {
        out.open(tag, &[])?;
        out.field_display("ItemId", self.item_id)?;
        out.open("Price", &[])?;
        out.field_display("Amount", self.price.amount)?;
        out.field("Currency", &self.price.currency)?;
        out.close("Price")?;
        out.open("Limits", &[])?;
        out.field_display("Limits", self.limits.kind.value())?;
        out.field("LimitKind", self.limits.kind.display_code())?;
        out.close("Limits")?;
        out.field("LicenseKind", self.licence_kind.as_str())?;
        out.close(tag)
    }
}

/// One purchase history or purchase result entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub transaction_id: String,
    pub date: String,
    pub kind: String,
    pub total_paid: i32,
    pub currency: String,
    pub item_id: i32,
    pub item_pricing: Prices,
    pub title_id: String,
    /// Omitted when zero.
    pub item_code: i32,
    /// Omitted when empty.
    pub reference_id: String,
    /// Omitted when zero.
    pub reference_value: i32,
}

impl Transaction {
    /// A zero-cost game purchase; the only transaction type the shop issues.
    pub fn game_purchase(date: impl Into<String>, item_id: i32, licence_kind: LicenceKind) -> Self {
        Self {
            transaction_id: "00000000".to_string(),
            date: date.into(),
            kind: "PURCHGAME".to_string(),
            total_paid: 0,
            currency: POINTS.to_string(),
            item_id,
            item_pricing: Prices::free(item_id, LimitKind::Pr, licence_kind),
            title_id: String::new(),
            item_code: 0,
            reference_id: String::new(),
            reference_value: 0,
        }
    }
}

impl Render for Transaction {
    fn render(&self, out: &mut XmlOut) -> Result<()> {
        out.open("Transactions", &[])?;
        out.field("TransactionId", &self.transaction_id)?;
        out.field("Date", &self.date)?;
        out.field("Type", &self.kind)?;
        out.field_display("TotalPaid", self.total_paid)?;
        out.field("Currency", &self.currency)?;
        out.field_display("ItemId", self.item_id)?;
        self.item_pricing.render_as("ItemPricing", out)?;
        out.field("TitleId", &self.title_id)?;
        if self.item_code != 0 {
            out.field_display("ItemCode", self.item_code)?;
        }
        if !self.reference_id.is_empty() {
            out.field("ReferenceId", &self.reference_id)?;
        }
        if self.reference_value != 0 {
            out.field_display("ReferenceValue", self.reference_value)?;
        }
        out.close("Transactions")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ratings {
    pub name: String,
    pub rating: i32,
    pub age: i32,
}

/// Catalog listing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub title_id: String,
    pub title_included: bool,
    pub content_index: i32,
    /// Omitted entirely when empty.
    pub attributes: Vec<Attribute>,
    pub ratings: Ratings,
    pub prices: Prices,
}

impl Render for Item {
    fn render(&self, out: &mut XmlOut) -> Result<()> {
        out.open("Items", &[])?;
        out.field("TitleId", &self.title_id)?;
        out.open("Contents", &[])?;
        out.field_display("TitleIncluded", self.title_included)?;
        out.field_display("ContentIndex", self.content_index)?;
        out.close("Contents")?;
        for attr in &self.attributes {
            out.open("Attributes", &[])?;
            out.field("Name", &attr.name)?;
            out.field("Value", &attr.value)?;
            out.close("Attributes")?;
        }
        out.open("Ratings", &[])?;
        out.field("Name", &self.ratings.name)?;
        out.field_display("Rating", self.ratings.rating)?;
        out.field_display("Age", self.ratings.age)?;
        out.close("Ratings")?;
        self.prices.render_as("Prices", out)?;
        out.close("Items")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(payload: impl Into<Payload>) -> String {
        let mut out = XmlOut::new();
        payload.into().render(&mut out).unwrap();
        out.into_string().unwrap()
    }

    #[test]
    fn test_balance_shape() {
        assert_eq!(
            render(Balance::shared()),
            "<Balance><Amount>2147483647</Amount><Currency>POINTS</Currency></Balance>"
        );
    }

    #[test]
    fn test_ticket_info_shape() {
        let xml = render(TicketInfo::owned("0001000148414445", 3));
        assert_eq!(
            xml,
            "<Tickets><TicketId>0</TicketId><TitleId>0001000148414445</TitleId>\
             <RevokeDate>0</RevokeDate><Version>3</Version>\
             <MigrateCount>0</MigrateCount><MigrateLimit>0</MigrateLimit></Tickets>"
        );
    }

    #[test]
    fn test_transaction_omits_optional_fields() {
        let xml = render(Transaction::game_purchase("1666202566218", 7, LicenceKind::Permanent));
        assert!(xml.contains("<ItemPricing><ItemId>7</ItemId>"));
        assert!(xml.contains("<Limits><Limits>0</Limits><LimitKind>PR</LimitKind></Limits>"));
        assert!(xml.contains("<LicenseKind>PERMANENT</LicenseKind>"));
        assert!(xml.contains("<TitleId></TitleId>"));
        assert!(!xml.contains("ItemCode"));
        assert!(!xml.contains("ReferenceId"));
        assert!(!xml.contains("ReferenceValue"));
    }

    #[test]
    fn test_transaction_with_reference() {
        let mut tx = Transaction::game_purchase("1", 12, LicenceKind::Service);
        tx.item_code = 12;
        tx.reference_id = "00112233445566778899aabbccddeeff".to_string();
        let xml = render(tx);
        assert!(xml.contains("<ItemCode>12</ItemCode>"));
        assert!(xml.contains("<ReferenceId>00112233445566778899aabbccddeeff</ReferenceId>"));
    }

    #[test]
    fn test_transaction_list_renders_each_entry() {
        let list = vec![
            Transaction::game_purchase("1", 1, LicenceKind::Service),
            Transaction::game_purchase("2", 2, LicenceKind::Service),
        ];
        let xml = render(list);
        assert_eq!(xml.matches("<Transactions>").count(), 2);
        assert!(xml.find("<Date>1</Date>").unwrap() < xml.find("<Date>2</Date>").unwrap());
    }

    #[test]
    fn test_item_without_attributes() {
        let item = Item {
            title_id: "0001000148414445".to_string(),
            title_included: false,
            content_index: 0,
            attributes: Vec::new(),
            ratings: Ratings {
                name: "E".to_string(),
                rating: 1,
                age: 9,
            },
            prices: Prices::free(0, LimitKind::Pr, LicenceKind::Demo),
        };
        let xml = render(item);
        assert!(!xml.contains("<Attributes>"));
        assert!(xml.contains("<Contents><TitleIncluded>false</TitleIncluded><ContentIndex>0</ContentIndex></Contents>"));
        assert!(xml.contains("<Prices><ItemId>0</ItemId>"));
    }

    #[test]
    fn test_field_escapes_text() {
        let mut out = XmlOut::new();
        out.field("Name", "a<b&c").unwrap();
        assert_eq!(out.into_string().unwrap(), "<Name>a&lt;b&amp;c</Name>");
    }
}
