//! Accounts and the identities derived from them.
//!
//! An identity has the shape `did:vda:<segment>:0x<40 hex>`. The address part
//! is the last 20 bytes of a SHA-256 digest over the network segment and the
//! private key bytes, so the same key always yields the same identity on a
//! given network and different identities across networks.

use std::fmt;

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::network::Network;

const DID_PREFIX: &str = "did:vda:";
const KEY_HEX_LEN: usize = 64;
const ADDRESS_LEN: usize = 20;

/// An account derived from a private key.
///
/// The key itself is not retained, and `Debug` only shows the identity.
#[derive(Clone, PartialEq, Eq)]
pub struct Account {
    network: Network,
    address: String,
    did: String,
}

impl Account {
    /// Build an account from a hex private key (`0x` prefix optional).
    pub fn from_private_key(private_key: &str, network: Network) -> Result<Self> {
        let key = private_key.trim();
        let key = key
            .strip_prefix("0x")
            .or_else(|| key.strip_prefix("0X"))
            .unwrap_or(key);

        if key.len() != KEY_HEX_LEN {
            return Err(Error::InvalidKey(format!(
                "expected {KEY_HEX_LEN} hex characters, got {}",
                key.len()
            )));
        }
        let bytes = hex::decode(key).map_err(|e| Error::InvalidKey(e.to_string()))?;

        let digest = Sha256::new()
            .chain_update(network.did_segment().as_bytes())
            .chain_update(b":")
            .chain_update(&bytes)
            .finalize();
        let address = format!("0x{}", hex::encode(&digest[digest.len() - ADDRESS_LEN..]));
        let did = format!("{DID_PREFIX}{}:{address}", network.did_segment());

        Ok(Self {
            network,
            address,
            did,
        })
    }

    /// Network this account belongs to.
    pub fn network(&self) -> Network {
        self.network
    }

    /// Account address (`0x` + 40 hex).
    pub fn address(&self) -> &str {
        &self.address
    }

    /// The account's identity.
    pub fn did(&self) -> &str {
        &self.did
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("network", &self.network)
            .field("did", &self.did)
            .finish()
    }
}

/// Check that `did` is a well-formed identity on a known network.
pub fn is_valid_did(did: &str) -> bool {
    let Some(rest) = did.strip_prefix(DID_PREFIX) else {
        return false;
    };
    let Some((segment, address)) = rest.split_once(':') else {
        return false;
    };
    if !matches!(segment, "mainnet" | "testnet" | "devnet") {
        return false;
    }
    match address.strip_prefix("0x") {
        Some(hex) => hex.len() == ADDRESS_LEN * 2 && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}
