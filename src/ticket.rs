//! Ticket encoder.
//!
//! Tickets are fixed-layout, big-endian records the console parses
//! bit-for-bit. Each ticket is built from a template loaded at startup,
//! carries the shared content key encrypted for its title, and is shipped
//! followed by the static certificate chain.
//!
//! # Layout (0x2A4 bytes)
//!
//! | Offset | Size | Field                    |
//! |--------|------|--------------------------|
//! | 0x000  | 4    | signature type           |
//! | 0x004  | 256  | signature                |
//! | 0x104  | 60   | signature padding        |
//! | 0x140  | 64   | issuer                   |
//! | 0x180  | 60   | ECDH data                |
//! | 0x1BC  | 1    | file version             |
//! | 0x1BD  | 1    | CA CRL version           |
//! | 0x1BE  | 1    | signer CRL version       |
//! | 0x1BF  | 16   | encrypted title key      |
//! | 0x1CF  | 1    | padding                  |
//! | 0x1D0  | 8    | ticket id                |
//! | 0x1D8  | 4    | console id               |
//! | 0x1DC  | 8    | title id                 |
//! | 0x1E4  | 2    | system access mask       |
//! | 0x1E6  | 2    | title version            |
//! | 0x1E8  | 4    | access title id          |
//! | 0x1EC  | 4    | access title mask        |
//! | 0x1F0  | 1    | licence type             |
//! | 0x1F1  | 1    | common key index         |
//! | 0x1F2  | 48   | reserved                 |
//! | 0x222  | 64   | content access mask      |
//! | 0x262  | 2    | padding                  |
//! | 0x264  | 64   | 8 time limits (u32, u32) |
//!
//! The subscription variant appends a version 1 section: a 20-byte header,
//! one 20-byte section header and the subscription records.

use std::io::{Read, Write};

use aes::cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit};
use aes::Aes128;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use chrono::{DateTime, Datelike, Days, Duration, NaiveDate, TimeZone, Utc};

use crate::error::{Result, SoapError};

pub const TICKET_SIZE: usize = 0x2A4;
pub const TITLE_ID_OFFSET: usize = 0x1DC;
pub const TITLE_KEY_OFFSET: usize = 0x1BF;

/// Title id of the recurring-service title family, ticketed with the
/// subscription variant.
pub const SERVICE_TITLE_ID: u64 = 0x0001_0100_6843_494A;
/// Application that lists the service title's purchase history.
pub const SERVICE_APPLICATION_ID: u64 = 0x0001_0001_4843_494A;

pub const SUBSCRIPTION_FILE_VERSION: u8 = 1;
pub const SUBSCRIPTION_LICENSE_TYPE: u8 = 5;

const V1_HEADER_SIZE: u16 = 20;
const V1_SECTION_HEADER_SIZE: u16 = 20;
const V1_SECTION_SUBSCRIPTION: u16 = 2;
pub const SUBSCRIPTION_RECORD_SIZE: usize = 20;

/// Validity of a previously purchased subscription, from its purchase time.
pub const RENEWAL_VALIDITY_DAYS: i64 = 30;

/// Parse a hexadecimal title id (e.g. `000100014843494A`).
pub fn parse_title_id(text: &str) -> Result<u64> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed.len() > 16 || !trimmed.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(SoapError::invalid("TitleId", text));
    }
    u64::from_str_radix(trimmed, 16).map_err(|_| SoapError::invalid("TitleId", text))
}

/// Canonical lower-case rendering of a title id.
pub fn format_title_id(title_id: u64) -> String {
    format!("{:016x}", title_id)
}

pub fn is_subscription_title(title_id: u64) -> bool {
    title_id == SERVICE_TITLE_ID
}

/// Process-wide AES key material. Immutable after startup.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    /// Key the console uses to decrypt title keys.
    pub common_key: [u8; 16],
    /// Key every title's contents are encrypted with.
    pub content_key: [u8; 16],
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial").finish_non_exhaustive()
    }
}

impl KeyMaterial {
    /// Decode both keys from hex. Bad material is fatal.
    pub fn from_hex(common_key: &str, content_key: &str) -> Result<Self> {
        Ok(Self {
            common_key: decode_key("common_key", common_key)?,
            content_key: decode_key("content_key", content_key)?,
        })
    }
}

fn decode_key(name: &str, text: &str) -> Result<[u8; 16]> {
    let bytes = hex::decode(text.trim())
        .map_err(|e| SoapError::ConfigurationFatal(format!("{} is not hex: {}", name, e)))?;
    bytes.try_into().map_err(|b: Vec<u8>| {
        SoapError::ConfigurationFatal(format!("{} must be 16 bytes, got {}", name, b.len()))
    })
}

/// Encrypt the content key for `title_id`: AES-128-CBC under the common key
/// with the big-endian title id, zero padded, as IV. One block.
pub fn derive_title_key(keys: &KeyMaterial, title_id: u64) -> [u8; 16] {
    let mut iv = [0u8; 16];
    iv[..8].copy_from_slice(&title_id.to_be_bytes());

    let mut block = [0u8; 16];
    for i in 0..16 {
        block[i] = keys.content_key[i] ^ iv[i];
    }

    let cipher = Aes128::new(GenericArray::from_slice(&keys.common_key));
    let mut block = GenericArray::from(block);
    cipher.encrypt_block(&mut block);
    block.into()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeLimit {
    pub code: u32,
    pub limit: u32,
}

/// In-memory form of a ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub signature_type: u32,
    pub signature: [u8; 256],
    pub signature_padding: [u8; 60],
    pub issuer: [u8; 64],
    pub ecdh_data: [u8; 60],
    pub file_version: u8,
    pub ca_crl_version: u8,
    pub signer_crl_version: u8,
    pub title_key: [u8; 16],
    pub padding: u8,
    pub ticket_id: u64,
    pub console_id: u32,
    pub title_id: u64,
    pub system_access_mask: u16,
    pub title_version: u16,
    pub access_title_id: u32,
    pub access_title_mask: u32,
    pub license_type: u8,
    pub common_key_index: u8,
    pub reserved: [u8; 48],
    pub content_access_mask: [u8; 64],
    pub padding2: u16,
    pub time_limits: [TimeLimit; 8],
}

impl Ticket {
    /// Decode exactly [`TICKET_SIZE`] bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() != TICKET_SIZE {
            return Err(SoapError::ConfigurationFatal(format!(
                "ticket template must be {} bytes, got {}",
                TICKET_SIZE,
                data.len()
            )));
        }
        Self::read(&mut &data[..]).map_err(|e| {
            SoapError::ConfigurationFatal(format!("unreadable ticket template: {}", e))
        })
    }

    fn read<R: Read>(r: &mut R) -> std::io::Result<Self> {
        let signature_type = r.read_u32::<BigEndian>()?;
        let signature = read_array(r)?;
        let signature_padding = read_array(r)?;
        let issuer = read_array(r)?;
        let ecdh_data = read_array(r)?;
        let file_version = r.read_u8()?;
        let ca_crl_version = r.read_u8()?;
        let signer_crl_version = r.read_u8()?;
        let title_key = read_array(r)?;
        let padding = r.read_u8()?;
        let ticket_id = r.read_u64::<BigEndian>()?;
        let console_id = r.read_u32::<BigEndian>()?;
        let title_id = r.read_u64::<BigEndian>()?;
        let system_access_mask = r.read_u16::<BigEndian>()?;
        let title_version = r.read_u16::<BigEndian>()?;
        let access_title_id = r.read_u32::<BigEndian>()?;
        let access_title_mask = r.read_u32::<BigEndian>()?;
        let license_type = r.read_u8()?;
        let common_key_index = r.read_u8()?;
        let reserved = read_array(r)?;
        let content_access_mask = read_array(r)?;
        let padding2 = r.read_u16::<BigEndian>()?;
        let mut time_limits = [TimeLimit::default(); 8];
        for limit in &mut time_limits {
            limit.code = r.read_u32::<BigEndian>()?;
            limit.limit = r.read_u32::<BigEndian>()?;
        }

        Ok(Self {
            signature_type,
            signature,
            signature_padding,
            issuer,
            ecdh_data,
            file_version,
            ca_crl_version,
            signer_crl_version,
            title_key,
            padding,
            ticket_id,
            console_id,
            title_id,
            system_access_mask,
            title_version,
            access_title_id,
            access_title_mask,
            license_type,
            common_key_index,
            reserved,
            content_access_mask,
            padding2,
            time_limits,
        })
    }

    pub fn write<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        w.write_u32::<BigEndian>(self.signature_type)?;
        w.write_all(&self.signature)?;
        w.write_all(&self.signature_padding)?;
        w.write_all(&self.issuer)?;
        w.write_all(&self.ecdh_data)?;
        w.write_u8(self.file_version)?;
        w.write_u8(self.ca_crl_version)?;
        w.write_u8(self.signer_crl_version)?;
        w.write_all(&self.title_key)?;
        w.write_u8(self.padding)?;
        w.write_u64::<BigEndian>(self.ticket_id)?;
        w.write_u32::<BigEndian>(self.console_id)?;
        w.write_u64::<BigEndian>(self.title_id)?;
        w.write_u16::<BigEndian>(self.system_access_mask)?;
        w.write_u16::<BigEndian>(self.title_version)?;
        w.write_u32::<BigEndian>(self.access_title_id)?;
        w.write_u32::<BigEndian>(self.access_title_mask)?;
        w.write_u8(self.license_type)?;
        w.write_u8(self.common_key_index)?;
        w.write_all(&self.reserved)?;
        w.write_all(&self.content_access_mask)?;
        w.write_u16::<BigEndian>(self.padding2)?;
        for limit in &self.time_limits {
            w.write_u32::<BigEndian>(limit.code)?;
            w.write_u32::<BigEndian>(limit.limit)?;
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(TICKET_SIZE);
        self.write(&mut out)?;
        Ok(out)
    }
}

fn read_array<R: Read, const N: usize>(r: &mut R) -> std::io::Result<[u8; N]> {
    let mut buf = [0u8; N];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

/// Same day next month. A day past the end of the target month rolls into
/// the month after, so Jan 31 becomes Mar 2 (or Mar 3 in a common year).
fn add_one_month(now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let (year, month) = match now.month() {
        12 => (now.year().checked_add(1)?, 1),
        m => (now.year(), m + 1),
    };
    let date = NaiveDate::from_ymd_opt(year, month, 1)?
        .checked_add_days(Days::new(u64::from(now.day() - 1)))?;
    Some(Utc.from_utc_datetime(&date.and_time(now.time())))
}

/// One access window embedded in a subscription ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionRecord {
    /// Unix seconds.
    pub expiration: u32,
    pub reference_id: [u8; 16],
}

impl SubscriptionRecord {
    /// The record being purchased now: valid for one calendar month.
    pub fn fresh(reference_id: [u8; 16], now: DateTime<Utc>) -> Result<Self> {
        let expires = add_one_month(now)
            .ok_or_else(|| SoapError::invalid("ExpirationTime", now.to_rfc3339()))?;
        Self::expiring(reference_id, expires)
    }

    /// An earlier purchase: valid for [`RENEWAL_VALIDITY_DAYS`] from when it
    /// was bought.
    pub fn from_purchase(reference_id: [u8; 16], purchased_at: DateTime<Utc>) -> Result<Self> {
        let expires = purchased_at
            .checked_add_signed(Duration::days(RENEWAL_VALIDITY_DAYS))
            .ok_or_else(|| SoapError::invalid("ExpirationTime", purchased_at.to_rfc3339()))?;
        Self::expiring(reference_id, expires)
    }

    fn expiring(reference_id: [u8; 16], expires: DateTime<Utc>) -> Result<Self> {
        let expiration = u32::try_from(expires.timestamp())
            .map_err(|_| SoapError::invalid("ExpirationTime", expires.to_rfc3339()))?;
        Ok(Self {
            expiration,
            reference_id,
        })
    }
}

/// Decode a hex reference id into its 16-byte field. Shorter input is zero
/// padded, longer input truncated.
pub fn parse_reference_id(text: &str) -> Result<[u8; 16]> {
    let bytes = hex::decode(text.trim()).map_err(|_| SoapError::invalid("ReferenceId", text))?;
    let mut out = [0u8; 16];
    let len = bytes.len().min(16);
    out[..len].copy_from_slice(&bytes[..len]);
    Ok(out)
}

/// Static certificate chain shipped alongside every ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateChain(Vec<u8>);

impl CertificateChain {
    pub fn new(bytes: Vec<u8>) -> Result<Self> {
        if bytes.is_empty() {
            return Err(SoapError::ConfigurationFatal(
                "certificate chain is empty".to_string(),
            ));
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Builds tickets from the startup template and key material.
#[derive(Debug, Clone)]
pub struct TicketEncoder {
    template: Ticket,
    keys: KeyMaterial,
    certs: CertificateChain,
}

impl TicketEncoder {
    pub fn new(template: &[u8], keys: KeyMaterial, certs: CertificateChain) -> Result<Self> {
        Ok(Self {
            template: Ticket::from_bytes(template)?,
            keys,
            certs,
        })
    }

    pub fn certificate_chain(&self) -> &CertificateChain {
        &self.certs
    }

    /// A fresh ticket for `title_id`, with its title key derived.
    pub fn standard_ticket(&self, title_id: u64) -> Ticket {
        let mut ticket = self.template.clone();
        ticket.title_id = title_id;
        ticket.title_key = derive_title_key(&self.keys, title_id);
        ticket
    }

    /// Encode the standard ticket for a hex title id.
    pub fn build_standard_ticket(&self, title_id: &str) -> Result<Vec<u8>> {
        self.standard_ticket(parse_title_id(title_id)?).to_bytes()
    }

    /// Encode the subscription variant of `base` carrying `records` in order.
    pub fn build_subscription_ticket(
        &self,
        base: &Ticket,
        records: &[SubscriptionRecord],
    ) -> Result<Vec<u8>> {
        let mut ticket = base.clone();
        ticket.file_version = SUBSCRIPTION_FILE_VERSION;
        ticket.access_title_mask = u32::MAX;
        ticket.license_type = SUBSCRIPTION_LICENSE_TYPE;

        let section_size = records.len() * SUBSCRIPTION_RECORD_SIZE;
        let v1_size = usize::from(V1_HEADER_SIZE) + usize::from(V1_SECTION_HEADER_SIZE) + section_size;
        let too_many = || SoapError::invalid("SubscriptionRecords", records.len().to_string());
        let record_count = u32::try_from(records.len()).map_err(|_| too_many())?;
        let section_size = u32::try_from(section_size).map_err(|_| too_many())?;
        let v1_size = u32::try_from(v1_size).map_err(|_| too_many())?;

        let mut out = Vec::with_capacity(TICKET_SIZE + v1_size as usize);
        ticket.write(&mut out)?;

        out.write_u16::<BigEndian>(1)?;
        out.write_u16::<BigEndian>(V1_HEADER_SIZE)?;
        out.write_u32::<BigEndian>(v1_size)?;
        out.write_u32::<BigEndian>(u32::from(V1_HEADER_SIZE))?;
        out.write_u16::<BigEndian>(1)?;
        out.write_u16::<BigEndian>(V1_SECTION_HEADER_SIZE)?;
        out.write_u32::<BigEndian>(0)?;

        out.write_u32::<BigEndian>(u32::from(V1_HEADER_SIZE + V1_SECTION_HEADER_SIZE))?;
        out.write_u32::<BigEndian>(record_count)?;
        out.write_u32::<BigEndian>(SUBSCRIPTION_RECORD_SIZE as u32)?;
        out.write_u32::<BigEndian>(section_size)?;
        out.write_u16::<BigEndian>(V1_SECTION_SUBSCRIPTION)?;
        out.write_u16::<BigEndian>(0)?;

        for record in records {
            out.write_u32::<BigEndian>(record.expiration)?;
            out.write_all(&record.reference_id)?;
        }

        Ok(out)
    }

    /// Ticket bytes followed by the certificate chain, as shipped in
    /// `ETickets`.
    pub fn append_certificate_chain(&self, ticket: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(ticket.len() + self.certs.0.len());
        out.extend_from_slice(ticket);
        out.extend_from_slice(&self.certs.0);
        out
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const TEST_COMMON_KEY: &str = "000102030405060708090a0b0c0d0e0f";
    pub(crate) const TEST_CONTENT_KEY: &str = "7295dbc0473c900bb594199cb5bcd3dc";

    pub(crate) fn template_bytes() -> Vec<u8> {
        let mut data = vec![0u8; TICKET_SIZE];
        data[..4].copy_from_slice(&0x0001_0001u32.to_be_bytes());
        let issuer = b"Root-CA00000001-XS00000003";
        data[0x140..0x140 + issuer.len()].copy_from_slice(issuer);
        data[0x1E6..0x1E8].copy_from_slice(&0xFFFFu16.to_be_bytes());
        data
    }

    pub(crate) fn encoder() -> TicketEncoder {
        TicketEncoder::new(
            &template_bytes(),
            KeyMaterial::from_hex(TEST_COMMON_KEY, TEST_CONTENT_KEY).unwrap(),
            CertificateChain::new(b"CERTIFICATE-CHAIN".to_vec()).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_template_round_trips_unchanged() {
        let data = template_bytes();
        let ticket = Ticket::from_bytes(&data).unwrap();
        assert_eq!(ticket.to_bytes().unwrap(), data);
        assert_eq!(ticket.title_version, 0xFFFF);
    }

    #[test]
    fn test_template_wrong_size_is_fatal() {
        let err = Ticket::from_bytes(&[0u8; 100]).unwrap_err();
        assert!(matches!(err, SoapError::ConfigurationFatal(_)));
    }

    #[test]
    fn test_standard_ticket_title_id_field() {
        let bytes = encoder().build_standard_ticket("000100014843494A").unwrap();
        assert_eq!(bytes.len(), TICKET_SIZE);
        assert_eq!(
            &bytes[TITLE_ID_OFFSET..TITLE_ID_OFFSET + 8],
            &[0x00, 0x01, 0x00, 0x01, 0x48, 0x43, 0x49, 0x4A]
        );
        assert_eq!(&bytes[0x140..0x15A], b"Root-CA00000001-XS00000003");
    }

    #[test]
    fn test_standard_ticket_is_deterministic() {
        let enc = encoder();
        let a = enc.build_standard_ticket("000100014843494A").unwrap();
        let b = enc.build_standard_ticket("000100014843494a").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_title_key_depends_on_title() {
        let keys = KeyMaterial::from_hex(TEST_COMMON_KEY, TEST_CONTENT_KEY).unwrap();
        let a = derive_title_key(&keys, 0x0001_0001_4843_494A);
        let b = derive_title_key(&keys, 0x0001_0001_4843_494B);
        assert_ne!(a, b);
        assert_ne!(a, keys.content_key);

        let bytes = encoder().build_standard_ticket("000100014843494A").unwrap();
        assert_eq!(&bytes[TITLE_KEY_OFFSET..TITLE_KEY_OFFSET + 16], &a);
    }

    #[test]
    fn test_title_key_known_answer() {
        // FIPS-197 C.1: AES-128 key 000102..0f, plaintext 00112233..ff.
        let keys = KeyMaterial::from_hex(
            "000102030405060708090a0b0c0d0e0f",
            "00112233445566778899aabbccddeeff",
        )
        .unwrap();
        assert_eq!(
            hex::encode(derive_title_key(&keys, 0)),
            "69c4e0d86a7b0430d8cdb78070b4c55a"
        );
    }

    #[test]
    fn test_invalid_title_ids() {
        for bad in ["", "xyz", "00010001484349ZZ", "00010001484349410", "+1"] {
            assert!(
                matches!(parse_title_id(bad), Err(SoapError::InvalidValue { field: "TitleId", .. })),
                "{:?} should be rejected",
                bad
            );
        }
        assert_eq!(parse_title_id("000101006843494a").unwrap(), SERVICE_TITLE_ID);
    }

    #[test]
    fn test_bad_key_material_is_fatal() {
        assert!(matches!(
            KeyMaterial::from_hex("00", TEST_CONTENT_KEY),
            Err(SoapError::ConfigurationFatal(_))
        ));
        assert!(matches!(
            KeyMaterial::from_hex(TEST_COMMON_KEY, "not hex"),
            Err(SoapError::ConfigurationFatal(_))
        ));
    }

    #[test]
    fn test_subscription_ticket_layout() {
        let enc = encoder();
        let now = DateTime::parse_from_rfc3339("2024-01-15T12:00:00Z").unwrap().with_timezone(&Utc);
        let first = DateTime::parse_from_rfc3339("2023-11-01T00:00:00Z").unwrap().with_timezone(&Utc);
        let second = DateTime::parse_from_rfc3339("2023-12-20T08:30:00Z").unwrap().with_timezone(&Utc);

        let records = vec![
            SubscriptionRecord::fresh([0xAA; 16], now).unwrap(),
            SubscriptionRecord::from_purchase([0x01; 16], first).unwrap(),
            SubscriptionRecord::from_purchase([0x02; 16], second).unwrap(),
        ];
        assert_eq!(
            records[0].expiration as i64,
            DateTime::parse_from_rfc3339("2024-02-15T12:00:00Z").unwrap().timestamp()
        );
        assert_eq!(records[1].expiration as i64, first.timestamp() + 30 * 86_400);
        assert_eq!(records[2].expiration as i64, second.timestamp() + 30 * 86_400);

        let base = enc.standard_ticket(SERVICE_TITLE_ID);
        let bytes = enc.build_subscription_ticket(&base, &records).unwrap();
        assert_eq!(bytes.len(), TICKET_SIZE + 20 + 20 + 3 * SUBSCRIPTION_RECORD_SIZE);

        let v0 = Ticket::from_bytes(&bytes[..TICKET_SIZE]).unwrap();
        assert_eq!(v0.file_version, SUBSCRIPTION_FILE_VERSION);
        assert_eq!(v0.access_title_mask, u32::MAX);
        assert_eq!(v0.license_type, SUBSCRIPTION_LICENSE_TYPE);
        assert_eq!(v0.title_id, SERVICE_TITLE_ID);

        let v1 = &bytes[TICKET_SIZE..];
        assert_eq!(&v1[0..2], &1u16.to_be_bytes());
        assert_eq!(&v1[4..8], &100u32.to_be_bytes());
        assert_eq!(&v1[24..28], &3u32.to_be_bytes());
        assert_eq!(&v1[36..38], &V1_SECTION_SUBSCRIPTION.to_be_bytes());

        let entries: Vec<_> = v1[40..].chunks_exact(SUBSCRIPTION_RECORD_SIZE).collect();
        assert_eq!(entries.len(), 3);
        for (entry, record) in entries.iter().zip(&records) {
            assert_eq!(&entry[..4], &record.expiration.to_be_bytes());
            assert_eq!(&entry[4..], &record.reference_id);
        }
    }

    #[test]
    fn test_fresh_record_month_overflow() {
        let cases = [
            ("2024-01-31T12:00:00Z", "2024-03-02T12:00:00Z"),
            ("2023-01-31T12:00:00Z", "2023-03-03T12:00:00Z"),
            ("2024-03-31T23:59:59Z", "2024-05-01T23:59:59Z"),
            ("2024-12-15T06:00:00Z", "2025-01-15T06:00:00Z"),
            ("2024-02-29T00:00:00Z", "2024-03-29T00:00:00Z"),
        ];
        for (now, expected) in cases {
            let now = DateTime::parse_from_rfc3339(now).unwrap().with_timezone(&Utc);
            let record = SubscriptionRecord::fresh([0; 16], now).unwrap();
            assert_eq!(
                record.expiration as i64,
                DateTime::parse_from_rfc3339(expected).unwrap().timestamp(),
                "fresh record from {}",
                now
            );
        }
    }

    #[test]
    fn test_reference_id_padding() {
        let id = parse_reference_id("0011").unwrap();
        assert_eq!(&id[..2], &[0x00, 0x11]);
        assert!(id[2..].iter().all(|b| *b == 0));
        assert!(parse_reference_id("zz").is_err());
    }

    #[test]
    fn test_append_certificate_chain() {
        let enc = encoder();
        let combined = enc.append_certificate_chain(b"TICKET");
        assert_eq!(combined, b"TICKETCERTIFICATE-CHAIN");
    }

    #[test]
    fn test_empty_certificate_chain_is_fatal() {
        assert!(matches!(
            CertificateChain::new(Vec::new()),
            Err(SoapError::ConfigurationFatal(_))
        ));
    }
}
