use crate::error::DomainError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A 20-byte EVM account address, stored lowercase with its `0x` prefix.
///
/// Validation happens once, when the value is parsed; an `Address` that
/// exists is always well-formed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Parses and normalises an address.
    ///
    /// # Errors
    /// Returns [`DomainError::InvalidAddress`] unless the input is `0x`
    /// followed by exactly 40 hex digits.
    pub fn parse(input: &str) -> Result<Self, DomainError> {
        let trimmed = input.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(|| DomainError::InvalidAddress(input.to_string()))?;

        if digits.len() != 40 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(DomainError::InvalidAddress(input.to_string()));
        }

        Ok(Self(format!("0x{}", digits.to_ascii_lowercase())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Address {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_normalises_case() {
        let addr = Address::parse("0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913").unwrap();
        assert_eq!(addr.as_str(), "0x833589fcd6edb6e08f4c7c32d4f71b54bda02913");
    }

    #[test]
    fn test_parse_rejects_truncated_address() {
        // 34 hex digits
        let err = Address::parse("0x4200000000000000000000000000000006").unwrap_err();
        assert!(matches!(err, DomainError::InvalidAddress(_)));
    }

    #[test]
    fn test_parse_rejects_missing_prefix_and_bad_digits() {
        assert!(Address::parse("4200000000000000000000000000000000000006").is_err());
        assert!(Address::parse("0xZZ00000000000000000000000000000000000006").is_err());
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: Result<Address, _> =
            serde_json::from_str("\"0x4200000000000000000000000000000000000006\"");
        assert!(ok.is_ok());

        let bad: Result<Address, _> = serde_json::from_str("\"0x1234\"");
        assert!(bad.is_err());
    }
}
