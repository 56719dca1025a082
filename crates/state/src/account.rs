//! Accounts, bakers and delegators.

use serde::{Deserialize, Serialize};
use tessera_types::{
    AccountAddress, Amount, BakerId, CredentialRegistrationId, Epoch, Hash, Nonce, PublicKey,
    Serial, Timestamp, VrfPublicKey,
};

/// A delegator's stake, pointing at a baker pool or delegated passively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegation {
    /// `None` delegates passively across all pools.
    pub target: Option<BakerId>,
    pub stake: Amount,
}

/// An amount locked until a release time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledRelease {
    pub release_time: Timestamp,
    pub amount: Amount,
}

/// An account in a block state.
///
/// Shared between states by `Arc`; a thawed state clones the `Arc` map and
/// copies an account only when it is actually written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub address: AccountAddress,
    /// Stable ordinal, assigned at creation and never reused.
    pub index: u64,
    /// Spendable balance, including any not-yet-released schedule amounts.
    pub balance: Amount,
    /// Next nonce this account can use (all below are finalized or spent).
    pub next_nonce: Nonce,
    pub verify_key: PublicKey,
    /// Credentials registered to this account; the first created it.
    pub credentials: Vec<CredentialRegistrationId>,
    /// Locked amounts; part of `balance` but not spendable until released.
    pub release_schedule: Vec<ScheduledRelease>,
    /// Shielded balance total (opaque to the scheduler).
    pub encrypted_balance: Amount,
    /// Set when this account has a registered baker.
    pub baker: Option<BakerId>,
    /// Set when this account delegates stake.
    pub delegation: Option<Delegation>,
}

impl Account {
    /// Balance not locked by the release schedule at `now`.
    pub fn spendable_balance(&self, now: Timestamp) -> Amount {
        let locked: u64 = self
            .release_schedule
            .iter()
            .filter(|r| r.release_time > now)
            .map(|r| r.amount.0)
            .sum();
        Amount(self.balance.0.saturating_sub(locked))
    }

    /// Content hash, a leaf of the accounts table root.
    pub fn hash(&self) -> Hash {
        let mut out = Vec::new();
        self.address.serial(&mut out);
        self.index.serial(&mut out);
        self.balance.serial(&mut out);
        self.next_nonce.serial(&mut out);
        self.verify_key.serial(&mut out);
        (self.credentials.len() as u32).serial(&mut out);
        for c in &self.credentials {
            c.serial(&mut out);
        }
        (self.release_schedule.len() as u32).serial(&mut out);
        for r in &self.release_schedule {
            r.release_time.serial(&mut out);
            r.amount.serial(&mut out);
        }
        self.encrypted_balance.serial(&mut out);
        self.baker.serial(&mut out);
        match &self.delegation {
            None => out.push(0),
            Some(d) => {
                out.push(1);
                d.target.serial(&mut out);
                d.stake.serial(&mut out);
            }
        }
        Hash::digest(&out)
    }
}

/// A registered baker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Baker {
    pub id: BakerId,
    /// The account the baker's stake and rewards belong to.
    pub owner: AccountAddress,
    pub stake: Amount,
    /// VRF key for leadership election and the block nonce.
    pub election_key: VrfPublicKey,
    /// Key blocks are signed with.
    pub signature_key: PublicKey,
    /// Key used by the finalization committee aggregation.
    pub aggregation_key: PublicKey,
    /// Set when deregistered: the epoch at which the stake unlocks. The
    /// baker stops baking immediately but stays in this table until the
    /// cooldown passes.
    pub cooldown_until: Option<Epoch>,
    /// Rewards moved out of the pools for this baker since the last
    /// payday; paid into the owner account at the next epoch boundary.
    pub pending_reward: Amount,
}

impl Baker {
    /// Whether the baker may bake (not in cooldown).
    pub fn is_active(&self) -> bool {
        self.cooldown_until.is_none()
    }

    /// Content hash, a leaf of the bakers table root.
    pub fn hash(&self) -> Hash {
        let mut out = Vec::new();
        self.id.serial(&mut out);
        self.owner.serial(&mut out);
        self.stake.serial(&mut out);
        self.election_key.serial(&mut out);
        self.signature_key.serial(&mut out);
        self.aggregation_key.serial(&mut out);
        self.cooldown_until.serial(&mut out);
        self.pending_reward.serial(&mut out);
        Hash::digest(&out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_types::test_utils::{test_address, test_keypair};

    fn account() -> Account {
        Account {
            address: test_address(1),
            index: 0,
            balance: Amount(1_000),
            next_nonce: Nonce::FIRST,
            verify_key: test_keypair(1).public(),
            credentials: vec![CredentialRegistrationId([1u8; 48])],
            release_schedule: vec![],
            encrypted_balance: Amount::ZERO,
            baker: None,
            delegation: None,
        }
    }

    #[test]
    fn spendable_excludes_unreleased_schedule() {
        let mut a = account();
        a.release_schedule.push(ScheduledRelease {
            release_time: Timestamp(100),
            amount: Amount(300),
        });
        assert_eq!(a.spendable_balance(Timestamp(50)), Amount(700));
        assert_eq!(a.spendable_balance(Timestamp(100)), Amount(1_000));
    }

    #[test]
    fn hash_tracks_balance_changes() {
        let a = account();
        let mut b = a.clone();
        b.balance = Amount(999);
        assert_ne!(a.hash(), b.hash());
    }
}
