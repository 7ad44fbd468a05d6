//! # Domain Value Objects
//!
//! Immutable identifiers and amounts used across the admission pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unix timestamp in seconds.
pub type Timestamp = u64;

/// Token amount in base units (wei, fri, ...).
pub type Amount = u128;

/// Solution value accepted without hashing on test deployments.
pub const BYPASS_SOLUTION: i64 = -1;

/// Network-layer identity under which limits are tracked (e.g. source IP).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallerId(String);

impl CallerId {
    /// Create a caller identity.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identity.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Network identifier ("ethereum", "starknet", ...). Always lowercase.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct NetworkId(String);

impl NetworkId {
    /// Create a network id, normalising case and whitespace.
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(id.as_ref().trim().to_lowercase())
    }

    /// Borrow the id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for NetworkId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for NetworkId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<NetworkId> for String {
    fn from(value: NetworkId) -> Self {
        value.0
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Disbursable resource symbol ("ETH", "STRK", ...). Always uppercase.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ResourceSymbol(String);

impl ResourceSymbol {
    /// Create a symbol, normalising case and whitespace.
    pub fn new(symbol: impl AsRef<str>) -> Self {
        Self(symbol.as_ref().trim().to_uppercase())
    }

    /// Borrow the symbol.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ResourceSymbol {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for ResourceSymbol {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<ResourceSymbol> for String {
    fn from(value: ResourceSymbol) -> Self {
        value.0
    }
}

impl fmt::Display for ResourceSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which resources a request asks for.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceSelection {
    /// One named resource.
    Single(ResourceSymbol),
    /// Every resource the network supports ("both").
    All,
}

impl ResourceSelection {
    /// Parse the caller-facing form: a symbol, or "both"/"all".
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("both") || trimmed.eq_ignore_ascii_case("all") {
            Self::All
        } else {
            Self::Single(ResourceSymbol::new(trimmed))
        }
    }

    /// Expand against a network's ordered resource list.
    pub fn expand(&self, supported: &[ResourceSymbol]) -> Vec<ResourceSymbol> {
        match self {
            Self::Single(symbol) => vec![symbol.clone()],
            Self::All => supported.to_vec(),
        }
    }
}

impl fmt::Display for ResourceSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(symbol) => write!(f, "{}", symbol),
            Self::All => f.write_str("BOTH"),
        }
    }
}

/// On-chain transaction reference (hash).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxReference(String);

impl TxReference {
    /// Wrap a transaction hash.
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    /// Borrow the hash.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Deployment flavour, fixed at startup.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentMode {
    /// Real deployment. The PoW bypass is inert.
    #[default]
    Production,
    /// Non-production instance. [`BYPASS_SOLUTION`] is accepted.
    Test,
}

impl DeploymentMode {
    /// Whether the PoW bypass may be honoured.
    pub fn allows_pow_bypass(&self) -> bool {
        matches!(self, Self::Test)
    }
}

/// Global distribution window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistributionWindow {
    /// Current UTC hour.
    Hour,
    /// Current UTC day.
    Day,
}

impl DistributionWindow {
    /// Key label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Hour => "hour",
            Self::Day => "day",
        }
    }
}

impl fmt::Display for DistributionWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Parse a decimal string ("0.01") into base units with `decimals` places.
///
/// Returns `None` for malformed input, too many fractional digits, or overflow.
pub fn parse_units(raw: &str, decimals: u8) -> Option<Amount> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let (whole, frac) = match raw.split_once('.') {
        Some((w, f)) => (w, f),
        None => (raw, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return None;
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if frac.len() > decimals as usize {
        return None;
    }

    let scale = 10u128.checked_pow(decimals as u32)?;
    let whole_units = if whole.is_empty() {
        0
    } else {
        whole.parse::<u128>().ok()?.checked_mul(scale)?
    };
    let frac_units = if frac.is_empty() {
        0
    } else {
        let padding = 10u128.checked_pow((decimals as usize - frac.len()) as u32)?;
        frac.parse::<u128>().ok()?.checked_mul(padding)?
    };
    whole_units.checked_add(frac_units)
}

/// Render base units as a decimal string with `precision` fractional digits (truncating).
pub fn format_units(amount: Amount, decimals: u8, precision: u8) -> String {
    let scale = 10u128.pow(decimals as u32);
    let whole = amount / scale;
    let precision = precision.min(decimals);
    if precision == 0 {
        return whole.to_string();
    }
    let frac = amount % scale;
    let frac_digits = format!("{:0width$}", frac, width = decimals as usize);
    format!("{}.{}", whole, &frac_digits[..precision as usize])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_id_is_lowercased() {
        assert_eq!(NetworkId::new(" Ethereum ").as_str(), "ethereum");
    }

    #[test]
    fn test_resource_symbol_is_uppercased() {
        assert_eq!(ResourceSymbol::new("strk").as_str(), "STRK");
    }

    #[test]
    fn test_selection_parses_both() {
        assert_eq!(ResourceSelection::parse("both"), ResourceSelection::All);
        assert_eq!(ResourceSelection::parse("ALL"), ResourceSelection::All);
        assert_eq!(
            ResourceSelection::parse("eth"),
            ResourceSelection::Single(ResourceSymbol::new("ETH"))
        );
    }

    #[test]
    fn test_selection_expand_keeps_order() {
        let supported = vec![ResourceSymbol::new("STRK"), ResourceSymbol::new("ETH")];
        assert_eq!(ResourceSelection::All.expand(&supported), supported);
        assert_eq!(
            ResourceSelection::Single(ResourceSymbol::new("ETH")).expand(&supported),
            vec![ResourceSymbol::new("ETH")]
        );
    }

    #[test]
    fn test_parse_units() {
        assert_eq!(parse_units("0.01", 18), Some(10_000_000_000_000_000));
        assert_eq!(parse_units("10", 18), Some(10_000_000_000_000_000_000));
        assert_eq!(parse_units(".5", 1), Some(5));
        assert_eq!(parse_units("1.234", 2), None);
        assert_eq!(parse_units("abc", 18), None);
        assert_eq!(parse_units("", 18), None);
        assert_eq!(parse_units(".", 18), None);
    }

    #[test]
    fn test_format_units() {
        assert_eq!(format_units(10_000_000_000_000_000, 18, 4), "0.0100");
        assert_eq!(format_units(1_234_500_000_000_000_000, 18, 2), "1.23");
        assert_eq!(format_units(7, 0, 2), "7");
    }

    #[test]
    fn test_bypass_only_in_test_mode() {
        assert!(!DeploymentMode::Production.allows_pow_bypass());
        assert!(DeploymentMode::Test.allows_pow_bypass());
    }
}
