//! Storage networks an account can be registered on.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A storage network.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Production network.
    #[default]
    Myrtle,
    /// Public test network.
    Banksia,
    /// Local development network.
    Devnet,
}

impl Network {
    /// Network name as used in configuration and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Myrtle => "myrtle",
            Network::Banksia => "banksia",
            Network::Devnet => "devnet",
        }
    }

    /// Segment used in identities on this network.
    pub fn did_segment(&self) -> &'static str {
        match self {
            Network::Myrtle => "mainnet",
            Network::Banksia => "testnet",
            Network::Devnet => "devnet",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "myrtle" | "mainnet" => Ok(Network::Myrtle),
            "banksia" | "testnet" => Ok(Network::Banksia),
            "devnet" | "local" => Ok(Network::Devnet),
            other => Err(Error::Config(format!("unknown network: {other}"))),
        }
    }
}
