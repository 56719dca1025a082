//! Protocol identifiers and scalar newtypes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub};

macro_rules! scalar_newtype {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
            Serialize, Deserialize,
        )]
        pub struct $name(pub u64);

        impl $name {
            /// Successor value.
            pub fn next(self) -> Self {
                $name(self.0 + 1)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

scalar_newtype!(
    /// Integer time index; blocks are baked for slots.
    Slot
);

scalar_newtype!(
    /// Height of a block above its era's genesis.
    BlockHeight
);

scalar_newtype!(
    /// Identifier of a baking participant.
    BakerId
);

scalar_newtype!(
    /// Epoch ordinal within an era.
    Epoch
);

scalar_newtype!(
    /// Account transaction nonce. The first valid nonce is 1.
    Nonce
);

scalar_newtype!(
    /// Sequence number of a chain update. The first valid number is 1.
    UpdateSequenceNumber
);

scalar_newtype!(
    /// Index into the finalization list, gap-free from 0.
    FinalizationIndex
);

scalar_newtype!(
    /// Execution cost unit.
    Energy
);

impl Nonce {
    /// The nonce of a fresh account's first transaction.
    pub const FIRST: Nonce = Nonce(1);
}

impl UpdateSequenceNumber {
    /// The sequence number of the first update of each type.
    pub const FIRST: UpdateSequenceNumber = UpdateSequenceNumber(1);
}

impl Add<u64> for BlockHeight {
    type Output = BlockHeight;
    fn add(self, rhs: u64) -> BlockHeight {
        BlockHeight(self.0 + rhs)
    }
}

impl Sub for BlockHeight {
    type Output = u64;
    fn sub(self, rhs: BlockHeight) -> u64 {
        self.0 - rhs.0
    }
}

impl Add<u64> for Energy {
    type Output = Energy;
    fn add(self, rhs: u64) -> Energy {
        Energy(self.0 + rhs)
    }
}

impl AddAssign for Energy {
    fn add_assign(&mut self, rhs: Energy) {
        self.0 += rhs.0;
    }
}

/// Era ordinal. Index 0 is the initial genesis; each regenesis increments it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct GenesisIndex(pub u32);

impl GenesisIndex {
    /// The next era.
    pub fn next(self) -> Self {
        GenesisIndex(self.0 + 1)
    }
}

impl fmt::Display for GenesisIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Milliseconds since the Unix epoch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Add a whole number of milliseconds.
    pub fn plus_millis(self, millis: u64) -> Timestamp {
        Timestamp(self.0 + millis)
    }

    /// Milliseconds from `earlier` to `self`, saturating at zero.
    pub fn millis_since(self, earlier: Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Amount of GTU in the smallest denomination.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct Amount(pub u64);

impl Amount {
    /// Zero amount.
    pub const ZERO: Amount = Amount(0);

    /// Checked subtraction; `None` on underflow.
    pub fn checked_sub(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_sub(rhs.0).map(Amount)
    }

    /// Saturating addition.
    pub fn saturating_add(self, rhs: Amount) -> Amount {
        Amount(self.0.saturating_add(rhs.0))
    }
}

impl Add for Amount {
    type Output = Amount;
    fn add(self, rhs: Amount) -> Amount {
        Amount(self.0 + rhs.0)
    }
}

impl AddAssign for Amount {
    fn add_assign(&mut self, rhs: Amount) {
        self.0 += rhs.0;
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An account address: 32 bytes derived from the account's first credential.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountAddress(pub [u8; 32]);

impl fmt::Debug for AccountAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0[..8] {
            write!(f, "{:02x}", b)?;
        }
        write!(f, "…")
    }
}

impl fmt::Display for AccountAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

/// Address of a smart-contract instance.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ContractAddress {
    /// Instance ordinal, assigned at init.
    pub index: u64,
    /// Reserved for future sub-instances; currently always 0.
    pub subindex: u64,
}

impl ContractAddress {
    /// Construct from an index with subindex 0.
    pub fn new(index: u64) -> Self {
        ContractAddress { index, subindex: 0 }
    }
}

impl fmt::Display for ContractAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{},{}>", self.index, self.subindex)
    }
}

/// Credential registration id: 48 bytes, unique across the whole history.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CredentialRegistrationId(pub [u8; 48]);

// 48 bytes is past serde's derived array sizes.
impl Serialize for CredentialRegistrationId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.as_slice().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CredentialRegistrationId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = Vec::<u8>::deserialize(deserializer)?;
        let array: [u8; 48] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("expected 48 bytes"))?;
        Ok(CredentialRegistrationId(array))
    }
}

impl fmt::Debug for CredentialRegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0[..8] {
            write!(f, "{:02x}", b)?;
        }
        write!(f, "…")
    }
}
