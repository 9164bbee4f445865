use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// EVM address of a deployed contract, as submitted to the verification server.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContractAddress(String);

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AddressError {
    #[error("[E010] {0} is not a valid contract address\n\nSuggestions:\n  • Use the 0x-prefixed EVM address of the contract\n  • The address must contain exactly 40 hexadecimal digits")]
    Match(String),
    #[error("Contract address regex error")]
    Regex(#[from] regex::Error),
}

impl AddressError {
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Match(_) => "E010",
            Self::Regex(_) => "E999",
        }
    }
}

impl ContractAddress {
    const PATTERN: &str = r"^0x[a-fA-F0-9]{40}$";

    /// # Errors
    ///
    /// Will fail if `raw` is not "0x" followed by 40 hexadecimal digits.
    pub fn new(raw: &str) -> Result<Self, AddressError> {
        let re = Regex::new(Self::PATTERN)?;

        if re.is_match(raw) {
            Ok(Self(raw.to_lowercase()))
        } else {
            Err(AddressError::Match(raw.to_string()))
        }
    }
}

impl fmt::Display for ContractAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ContractAddress {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}
