//! # Address Formats
//!
//! Per-network recipient address rules. Chain clients delegate to these so the
//! admission core never hard-codes a network.

use serde::{Deserialize, Serialize};

/// Address syntax family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFormat {
    /// `0x` + exactly 40 hex characters (20 bytes).
    Evm,
    /// `0x` + 1..=64 hex characters (a felt).
    Starknet,
}

impl AddressFormat {
    /// Validate an address, returning a human-readable reason on failure.
    pub fn validate(&self, address: &str) -> Result<(), String> {
        if address.is_empty() {
            return Err("address cannot be empty".to_string());
        }
        let body = address
            .strip_prefix("0x")
            .or_else(|| address.strip_prefix("0X"))
            .ok_or_else(|| "address must start with 0x".to_string())?;

        if !body.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err("address must contain only hex characters after 0x".to_string());
        }

        match self {
            Self::Evm if body.len() != 40 => Err(
                "invalid Ethereum address format: must be 0x followed by 40 hex characters"
                    .to_string(),
            ),
            Self::Starknet if body.is_empty() || body.len() > 64 => Err(
                "invalid Starknet address format: must be 0x followed by 1 to 64 hex characters"
                    .to_string(),
            ),
            _ => Ok(()),
        }
    }

    /// Canonical form used as transfer recipient and in logs.
    ///
    /// Assumes `validate` passed.
    pub fn normalize(&self, address: &str) -> String {
        let body = address
            .get(2..)
            .unwrap_or_default()
            .to_ascii_lowercase();
        match self {
            Self::Evm => format!("0x{}", body),
            Self::Starknet => format!("0x{:0>64}", body),
        }
    }
}
