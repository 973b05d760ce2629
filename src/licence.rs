//! Licence and limit enumerations used by pricing payloads.

use std::fmt;
use std::str::FromStr;

use crate::error::SoapError;

/// Category of rights granted by a purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LicenceKind {
    Permanent,
    Demo,
    Trial,
    Rental,
    Subscript,
    Service,
}

impl LicenceKind {
    pub const ALL: [LicenceKind; 6] = [
        Self::Permanent,
        Self::Demo,
        Self::Trial,
        Self::Rental,
        Self::Subscript,
        Self::Service,
    ];

    /// Canonical wire spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Permanent => "PERMANENT",
            Self::Demo => "DEMO",
            Self::Trial => "TRIAL",
            Self::Rental => "RENTAL",
            Self::Subscript => "SUBSCRIPT",
            Self::Service => "SERVICE",
        }
    }
}

impl FromStr for LicenceKind {
    type Err = SoapError;

    /// Exact, case-sensitive match. Anything else is a validation failure.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| SoapError::invalid("LicenceKind", s))
    }
}

impl fmt::Display for LicenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Restriction attached to a priced item. Discriminants are sent verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum LimitKind {
    /// Purchased.
    Pr = 0,
    Tr = 1,
    Dr = 2,
    Sr = 3,
    Lr = 4,
    At = 10000,
}

impl LimitKind {
    pub const ALL: [LimitKind; 6] = [Self::Pr, Self::Tr, Self::Dr, Self::Sr, Self::Lr, Self::At];

    pub fn value(&self) -> u16 {
        *self as u16
    }

    /// Short code rendered in `<LimitKind>`.
    pub fn display_code(&self) -> &'static str {
        match self {
            Self::Pr => "PR",
            Self::Tr => "TR",
            Self::Dr => "DR",
            Self::Sr => "SR",
            Self::Lr => "LR",
            Self::At => "AT",
        }
    }
}

impl TryFrom<u16> for LimitKind {
    type Error = SoapError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.value() == value)
            .ok_or_else(|| SoapError::invalid("LimitKind", value.to_string()))
    }
}

/// `<Limits>` block: numeric kind plus its display code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub kind: LimitKind,
}

impl Limits {
    pub fn new(kind: LimitKind) -> Self {
        Self { kind }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_licence_kind_round_trip() {
        for kind in LicenceKind::ALL {
            let parsed: LicenceKind = kind.as_str().parse().unwrap();
            assert_eq!(parsed, kind);
            assert_eq!(parsed.to_string(), kind.as_str());
        }
    }

    #[test]
    fn test_licence_kind_rejects_unknown() {
        for input in ["", "permanent", "PERMANENT ", "SUBSCRIPTION", "LEASE"] {
            let err = input.parse::<LicenceKind>().unwrap_err();
            assert!(matches!(err, SoapError::InvalidValue { field: "LicenceKind", .. }));
        }
    }

    #[test]
    fn test_limit_codes_are_distinct() {
        let codes: HashSet<_> = LimitKind::ALL.iter().map(|k| k.display_code()).collect();
        assert_eq!(codes.len(), LimitKind::ALL.len());
    }

    #[test]
    fn test_limit_values() {
        assert_eq!(LimitKind::Pr.value(), 0);
        assert_eq!(LimitKind::Lr.value(), 4);
        assert_eq!(LimitKind::At.value(), 10000);
        assert_eq!(LimitKind::try_from(10000).unwrap(), LimitKind::At);
        assert!(LimitKind::try_from(5).is_err());
    }
}
