//! Opaque 64-bit identifiers for objects and blocks.

use serde::{Deserialize, Serialize};
use std::{fmt, num::ParseIntError, str::FromStr};
use uuid::Uuid;

/// Stable handle of an object, minted once when the object is first created.
///
/// The zero value means "unassigned".
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ObjectId(u64);

/// Handle of a single stored block. A fresh one is drawn for every block
/// written, retries included.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct BlockId(u64);

/// Draw 64 random bits from a v4 UUID, skipping the reserved zero value.
fn random_nonzero() -> u64 {
    loop {
        let (high, _) = Uuid::new_v4().as_u64_pair();
        if high != 0 {
            return high;
        }
    }
}

macro_rules! id_impls {
    ($ty:ident) => {
        impl $ty {
            /// Generate a new random, valid identifier.
            pub fn generate() -> Self {
                Self(random_nonzero())
            }

            pub const fn from_raw(raw: u64) -> Self {
                Self(raw)
            }

            pub const fn as_u64(self) -> u64 {
                self.0
            }

            pub const fn is_valid(self) -> bool {
                self.0 != 0
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $ty {
            type Err = ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse::<u64>().map(Self)
            }
        }
    };
}

id_impls!(ObjectId);
id_impls!(BlockId);
