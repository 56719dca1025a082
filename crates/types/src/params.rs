//! Chain parameters, protocol versions and update payloads.

use crate::codec::{CodecError, Deserial, ReadCursor, Serial};
use crate::hash::Hash;
use crate::identifiers::{Amount, Energy, Epoch, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Protocol version tag.
///
/// Versioned dispatch happens at era boundaries only: every block of an era
/// is interpreted under the era's version.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum ProtocolVersion {
    /// Initial protocol.
    P1 = 1,
    /// Adds stake delegation fields to baker records.
    P2 = 2,
    /// Transaction outcomes become a Merkle tree, enabling short membership
    /// proofs.
    P3 = 3,
}

impl ProtocolVersion {
    /// Whether transaction outcomes hash as a Merkle tree (vs. a flat fold).
    pub fn merkle_outcomes(self) -> bool {
        self >= ProtocolVersion::P3
    }

    /// Decode from the wire tag.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(ProtocolVersion::P1),
            2 => Some(ProtocolVersion::P2),
            3 => Some(ProtocolVersion::P3),
            _ => None,
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", *self as u8)
    }
}

impl Serial for ProtocolVersion {
    fn serial(&self, out: &mut Vec<u8>) {
        out.push(*self as u8);
    }
}

impl Deserial for ProtocolVersion {
    fn deserial(r: &mut ReadCursor<'_>) -> Result<Self, CodecError> {
        let tag = r.u8()?;
        ProtocolVersion::from_tag(tag).ok_or(CodecError::InvalidTag {
            what: "ProtocolVersion",
            tag,
        })
    }
}

/// Election difficulty in parts per 100 000.
///
/// A baker with the whole stake wins a slot with this probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionDifficulty(pub u32);

impl ElectionDifficulty {
    /// Denominator of the difficulty fraction.
    pub const SCALE: u32 = 100_000;

    /// The lottery threshold for a baker holding `stake` out of
    /// `total_stake`, as a fraction of `u64::MAX`.
    pub fn threshold(self, stake: Amount, total_stake: Amount) -> u64 {
        if total_stake.0 == 0 {
            return 0;
        }
        // u128 keeps the product exact for all realistic stakes.
        let scaled = (u64::MAX as u128) * (self.0 as u128) / (Self::SCALE as u128);
        ((scaled * stake.0 as u128) / (total_stake.0 as u128)) as u64
    }
}

impl Serial for ElectionDifficulty {
    fn serial(&self, out: &mut Vec<u8>) {
        self.0.serial(out);
    }
}

impl Deserial for ElectionDifficulty {
    fn deserial(r: &mut ReadCursor<'_>) -> Result<Self, CodecError> {
        Ok(ElectionDifficulty(r.u32()?))
    }
}

/// A rational exchange rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub numerator: u64,
    pub denominator: u64,
}

impl Serial for ExchangeRate {
    fn serial(&self, out: &mut Vec<u8>) {
        self.numerator.serial(out);
        self.denominator.serial(out);
    }
}

impl Deserial for ExchangeRate {
    fn deserial(r: &mut ReadCursor<'_>) -> Result<Self, CodecError> {
        Ok(ExchangeRate {
            numerator: r.u64()?,
            denominator: r.u64()?,
        })
    }
}

/// Reward distribution fractions, in parts per 100 000.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardParameters {
    /// Fraction of minted rewards going to bakers.
    pub baking_reward_fraction: u32,
    /// Fraction going to the finalization committee.
    pub finalization_reward_fraction: u32,
    /// Fraction of execution fees retained in the GAS account.
    pub gas_account_fraction: u32,
}

impl Serial for RewardParameters {
    fn serial(&self, out: &mut Vec<u8>) {
        self.baking_reward_fraction.serial(out);
        self.finalization_reward_fraction.serial(out);
        self.gas_account_fraction.serial(out);
    }
}

impl Deserial for RewardParameters {
    fn deserial(r: &mut ReadCursor<'_>) -> Result<Self, CodecError> {
        Ok(RewardParameters {
            baking_reward_fraction: r.u32()?,
            finalization_reward_fraction: r.u32()?,
            gas_account_fraction: r.u32()?,
        })
    }
}

/// Current chain parameters of a block state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainParameters {
    pub election_difficulty: ElectionDifficulty,
    /// Euro per unit of energy.
    pub euro_per_energy: ExchangeRate,
    /// Micro-GTU per euro.
    pub micro_gtu_per_euro: ExchangeRate,
    /// Epochs a baker's stake stays locked after deregistration.
    pub baker_cooldown_epochs: Epoch,
    /// Minimum stake to register as a baker.
    pub minimum_baker_stake: Amount,
    pub reward_parameters: RewardParameters,
}

impl Serial for ChainParameters {
    fn serial(&self, out: &mut Vec<u8>) {
        self.election_difficulty.serial(out);
        self.euro_per_energy.serial(out);
        self.micro_gtu_per_euro.serial(out);
        self.baker_cooldown_epochs.serial(out);
        self.minimum_baker_stake.serial(out);
        self.reward_parameters.serial(out);
    }
}

impl Deserial for ChainParameters {
    fn deserial(r: &mut ReadCursor<'_>) -> Result<Self, CodecError> {
        Ok(ChainParameters {
            election_difficulty: ElectionDifficulty::deserial(r)?,
            euro_per_energy: ExchangeRate::deserial(r)?,
            micro_gtu_per_euro: ExchangeRate::deserial(r)?,
            baker_cooldown_epochs: Epoch::deserial(r)?,
            minimum_baker_stake: Amount::deserial(r)?,
            reward_parameters: RewardParameters::deserial(r)?,
        })
    }
}

/// Finalization committee parameters carried across regenesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizationParameters {
    /// Minimum stake fraction (parts per 100 000) to sit on the committee.
    pub committee_stake_fraction: u32,
    /// Maximum committee size.
    pub committee_max_size: u32,
}

impl Serial for FinalizationParameters {
    fn serial(&self, out: &mut Vec<u8>) {
        self.committee_stake_fraction.serial(out);
        self.committee_max_size.serial(out);
    }
}

impl Deserial for FinalizationParameters {
    fn deserial(r: &mut ReadCursor<'_>) -> Result<Self, CodecError> {
        Ok(FinalizationParameters {
            committee_stake_fraction: r.u32()?,
            committee_max_size: r.u32()?,
        })
    }
}

/// The kind of a chain update, keying the per-type sequence numbers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum UpdateType {
    Protocol = 0,
    ElectionDifficulty = 1,
    EuroPerEnergy = 2,
    MicroGtuPerEuro = 3,
    RewardParameters = 4,
    MinimumBakerStake = 5,
}

impl UpdateType {
    /// All update types, in tag order.
    pub const ALL: [UpdateType; 6] = [
        UpdateType::Protocol,
        UpdateType::ElectionDifficulty,
        UpdateType::EuroPerEnergy,
        UpdateType::MicroGtuPerEuro,
        UpdateType::RewardParameters,
        UpdateType::MinimumBakerStake,
    ];

    /// Decode from the wire tag.
    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.get(tag as usize).copied()
    }
}

impl Serial for UpdateType {
    fn serial(&self, out: &mut Vec<u8>) {
        out.push(*self as u8);
    }
}

impl Deserial for UpdateType {
    fn deserial(r: &mut ReadCursor<'_>) -> Result<Self, CodecError> {
        let tag = r.u8()?;
        UpdateType::from_tag(tag).ok_or(CodecError::InvalidTag {
            what: "UpdateType",
            tag,
        })
    }
}

/// Payload of a protocol update: the next era's version and its
/// specification artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolUpdate {
    pub next_version: ProtocolVersion,
    /// Hash of the off-chain specification document.
    pub specification_hash: Hash,
    /// Auxiliary migration data, interpreted by the target version.
    pub auxiliary_data: Vec<u8>,
}

impl Serial for ProtocolUpdate {
    fn serial(&self, out: &mut Vec<u8>) {
        self.next_version.serial(out);
        self.specification_hash.serial(out);
        self.auxiliary_data.as_slice().serial(out);
    }
}

impl Deserial for ProtocolUpdate {
    fn deserial(r: &mut ReadCursor<'_>) -> Result<Self, CodecError> {
        let next_version = ProtocolVersion::deserial(r)?;
        let specification_hash = Hash::deserial(r)?;
        let len = r.length()?;
        let auxiliary_data = r.take(len)?.to_vec();
        Ok(ProtocolUpdate {
            next_version,
            specification_hash,
            auxiliary_data,
        })
    }
}

/// The effect of a chain update once it crosses its effective time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdatePayload {
    Protocol(ProtocolUpdate),
    ElectionDifficulty(ElectionDifficulty),
    EuroPerEnergy(ExchangeRate),
    MicroGtuPerEuro(ExchangeRate),
    RewardParameters(RewardParameters),
    MinimumBakerStake(Amount),
}

impl UpdatePayload {
    /// The update type this payload belongs to.
    pub fn update_type(&self) -> UpdateType {
        match self {
            UpdatePayload::Protocol(_) => UpdateType::Protocol,
            UpdatePayload::ElectionDifficulty(_) => UpdateType::ElectionDifficulty,
            UpdatePayload::EuroPerEnergy(_) => UpdateType::EuroPerEnergy,
            UpdatePayload::MicroGtuPerEuro(_) => UpdateType::MicroGtuPerEuro,
            UpdatePayload::RewardParameters(_) => UpdateType::RewardParameters,
            UpdatePayload::MinimumBakerStake(_) => UpdateType::MinimumBakerStake,
        }
    }
}

impl Serial for UpdatePayload {
    fn serial(&self, out: &mut Vec<u8>) {
        self.update_type().serial(out);
        match self {
            UpdatePayload::Protocol(p) => p.serial(out),
            UpdatePayload::ElectionDifficulty(d) => d.serial(out),
            UpdatePayload::EuroPerEnergy(r) => r.serial(out),
            UpdatePayload::MicroGtuPerEuro(r) => r.serial(out),
            UpdatePayload::RewardParameters(p) => p.serial(out),
            UpdatePayload::MinimumBakerStake(a) => a.serial(out),
        }
    }
}

impl Deserial for UpdatePayload {
    fn deserial(r: &mut ReadCursor<'_>) -> Result<Self, CodecError> {
        Ok(match UpdateType::deserial(r)? {
            UpdateType::Protocol => UpdatePayload::Protocol(ProtocolUpdate::deserial(r)?),
            UpdateType::ElectionDifficulty => {
                UpdatePayload::ElectionDifficulty(ElectionDifficulty::deserial(r)?)
            }
            UpdateType::EuroPerEnergy => UpdatePayload::EuroPerEnergy(ExchangeRate::deserial(r)?),
            UpdateType::MicroGtuPerEuro => {
                UpdatePayload::MicroGtuPerEuro(ExchangeRate::deserial(r)?)
            }
            UpdateType::RewardParameters => {
                UpdatePayload::RewardParameters(RewardParameters::deserial(r)?)
            }
            UpdateType::MinimumBakerStake => UpdatePayload::MinimumBakerStake(Amount::deserial(r)?),
        })
    }
}

/// A scheduled parameter change awaiting its effective time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedUpdate {
    pub effective_time: Timestamp,
    pub payload: UpdatePayload,
}

/// Core parameters fixed at (re)genesis and carried across eras.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreGenesisParameters {
    /// Nominal time of slot 0 of the era.
    pub genesis_time: Timestamp,
    /// Wall-clock duration of one slot, in milliseconds.
    pub slot_duration_millis: u64,
    /// Slots per epoch.
    pub epoch_length: u64,
    /// Energy budget of a single block.
    pub max_block_energy: Energy,
    pub finalization_parameters: FinalizationParameters,
}

impl CoreGenesisParameters {
    /// Nominal wall-clock time of a slot in this era.
    pub fn slot_time(&self, slot: crate::identifiers::Slot) -> Timestamp {
        self.genesis_time.plus_millis(slot.0 * self.slot_duration_millis)
    }
}

impl Serial for CoreGenesisParameters {
    fn serial(&self, out: &mut Vec<u8>) {
        self.genesis_time.serial(out);
        self.slot_duration_millis.serial(out);
        self.epoch_length.serial(out);
        self.max_block_energy.serial(out);
        self.finalization_parameters.serial(out);
    }
}

impl Deserial for CoreGenesisParameters {
    fn deserial(r: &mut ReadCursor<'_>) -> Result<Self, CodecError> {
        Ok(CoreGenesisParameters {
            genesis_time: Timestamp::deserial(r)?,
            slot_duration_millis: r.u64()?,
            epoch_length: r.u64()?,
            max_block_energy: Energy::deserial(r)?,
            finalization_parameters: FinalizationParameters::deserial(r)?,
        })
    }
}
