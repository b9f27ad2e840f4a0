//! Identity and hashing primitives.
//!
//! Accounts and assets are referenced by opaque 32-byte identifiers. The core
//! never authenticates them; that is the host contract layer's job.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::{Error, Result};

/// Length of identifiers and hashes in bytes
pub const ID_LENGTH: usize = 32;

fn decode_fixed(s: &str) -> std::result::Result<[u8; ID_LENGTH], String> {
    let bytes = hex::decode(s).map_err(|e| e.to_string())?;
    if bytes.len() != ID_LENGTH {
        return Err(format!("expected {} bytes, got {}", ID_LENGTH, bytes.len()));
    }
    let mut arr = [0u8; ID_LENGTH];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}

macro_rules! hex_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name([u8; ID_LENGTH]);

        impl $name {
            /// Wrap raw bytes
            pub const fn new(bytes: [u8; ID_LENGTH]) -> Self {
                Self(bytes)
            }

            /// Parse from a 64-character hex string
            pub fn from_hex(s: &str) -> Result<Self> {
                decode_fixed(s).map(Self).map_err(Error::Deserialization)
            }

            /// Raw bytes
            pub fn as_bytes(&self) -> &[u8; ID_LENGTH] {
                &self.0
            }

            /// Full hex encoding
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            /// First eight hex characters, for logs
            pub fn short(&self) -> String {
                hex::encode(&self.0[..4])
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.short())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.to_hex())
            }
        }

        impl Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                serializer.serialize_str(&hex::encode(self.0))
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                decode_fixed(&s).map(Self).map_err(serde::de::Error::custom)
            }
        }
    };
}

hex_id!(
    /// A 32-byte SHA-256 digest
    Hash
);

hex_id!(
    /// Identity of an account holding shares or pending deposits
    AccountId
);

hex_id!(
    /// Identity of a deposited asset (e.g. an LP token)
    TokenId
);

impl Hash {
    /// All-zero hash
    pub const fn zero() -> Self {
        Self([0u8; ID_LENGTH])
    }

    /// Compute SHA-256 of data
    pub fn sha256(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        let result = hasher.finalize();
        let mut bytes = [0u8; ID_LENGTH];
        bytes.copy_from_slice(&result);
        Self(bytes)
    }

    /// Binary Merkle root; an odd node is paired with itself
    pub fn merkle_root(hashes: &[Hash]) -> Hash {
        if hashes.is_empty() {
            return Hash::zero();
        }

        let mut level: Vec<Hash> = hashes.to_vec();
        while level.len() > 1 {
            level = level
                .chunks(2)
                .map(|pair| {
                    let right = pair.get(1).unwrap_or(&pair[0]);
                    let mut combined = Vec::with_capacity(2 * ID_LENGTH);
                    combined.extend_from_slice(pair[0].as_bytes());
                    combined.extend_from_slice(right.as_bytes());
                    Hash::sha256(&combined)
                })
                .collect();
        }
        level[0]
    }
}

impl AccountId {
    /// Deterministic id derived from a human label (fixtures, treasuries)
    pub fn from_label(label: &str) -> Self {
        Self(*Hash::sha256(label.as_bytes()).as_bytes())
    }
}

impl TokenId {
    /// Deterministic id derived from a token symbol
    pub fn from_symbol(symbol: &str) -> Self {
        Self(*Hash::sha256(symbol.as_bytes()).as_bytes())
    }
}
