//! Block items: account transactions, credential deployments, chain updates.

use crate::codec::{self, CodecError, Deserial, ReadCursor, Serial};
use crate::crypto::{KeyPair, PublicKey, Signature};
use crate::hash::{Hash, TransactionHash};
use crate::identifiers::{
    AccountAddress, Amount, ContractAddress, CredentialRegistrationId, Energy, Nonce, Timestamp,
    UpdateSequenceNumber,
};
use crate::params::UpdatePayload;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Domain tag under which account transactions are signed.
const TX_SIGN_DOMAIN: &[u8] = b"TESSERA.TX.v1";

/// Domain tag under which chain updates are signed.
const UPDATE_SIGN_DOMAIN: &[u8] = b"TESSERA.UPDATE.v1";

/// Payload of a normal account transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    /// Move GTU between accounts.
    Transfer { to: AccountAddress, amount: Amount },
    /// Deploy a smart-contract module.
    DeployModule { source: Vec<u8> },
    /// Initialize a contract instance from a deployed module.
    InitContract {
        amount: Amount,
        module_ref: Hash,
        init_name: String,
        param: Vec<u8>,
    },
    /// Invoke an entrypoint of an existing instance.
    UpdateContract {
        amount: Amount,
        address: ContractAddress,
        entrypoint: String,
        param: Vec<u8>,
    },
    /// Register or update the sender as a baker.
    ConfigureBaker {
        stake: Amount,
        election_key: PublicKey,
        signature_key: PublicKey,
        aggregation_key: PublicKey,
    },
    /// Deregister the sender as a baker (stake enters cooldown).
    RemoveBaker,
}

impl Payload {
    fn tag(&self) -> u8 {
        match self {
            Payload::Transfer { .. } => 0,
            Payload::DeployModule { .. } => 1,
            Payload::InitContract { .. } => 2,
            Payload::UpdateContract { .. } => 3,
            Payload::ConfigureBaker { .. } => 4,
            Payload::RemoveBaker => 5,
        }
    }
}

impl Serial for Payload {
    fn serial(&self, out: &mut Vec<u8>) {
        out.push(self.tag());
        match self {
            Payload::Transfer { to, amount } => {
                to.serial(out);
                amount.serial(out);
            }
            Payload::DeployModule { source } => source.as_slice().serial(out),
            Payload::InitContract {
                amount,
                module_ref,
                init_name,
                param,
            } => {
                amount.serial(out);
                module_ref.serial(out);
                init_name.serial(out);
                param.as_slice().serial(out);
            }
            Payload::UpdateContract {
                amount,
                address,
                entrypoint,
                param,
            } => {
                amount.serial(out);
                address.serial(out);
                entrypoint.serial(out);
                param.as_slice().serial(out);
            }
            Payload::ConfigureBaker {
                stake,
                election_key,
                signature_key,
                aggregation_key,
            } => {
                stake.serial(out);
                election_key.serial(out);
                signature_key.serial(out);
                aggregation_key.serial(out);
            }
            Payload::RemoveBaker => {}
        }
    }
}

impl Deserial for Payload {
    fn deserial(r: &mut ReadCursor<'_>) -> Result<Self, CodecError> {
        Ok(match r.u8()? {
            0 => Payload::Transfer {
                to: AccountAddress::deserial(r)?,
                amount: Amount::deserial(r)?,
            },
            1 => {
                let len = r.length()?;
                Payload::DeployModule {
                    source: r.take(len)?.to_vec(),
                }
            }
            2 => Payload::InitContract {
                amount: Amount::deserial(r)?,
                module_ref: Hash::deserial(r)?,
                init_name: String::deserial(r)?,
                param: {
                    let len = r.length()?;
                    r.take(len)?.to_vec()
                },
            },
            3 => Payload::UpdateContract {
                amount: Amount::deserial(r)?,
                address: ContractAddress::deserial(r)?,
                entrypoint: String::deserial(r)?,
                param: {
                    let len = r.length()?;
                    r.take(len)?.to_vec()
                },
            },
            4 => Payload::ConfigureBaker {
                stake: Amount::deserial(r)?,
                election_key: PublicKey::deserial(r)?,
                signature_key: PublicKey::deserial(r)?,
                aggregation_key: PublicKey::deserial(r)?,
            },
            5 => Payload::RemoveBaker,
            tag => return Err(CodecError::InvalidTag { what: "Payload", tag }),
        })
    }
}

/// An account transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalTransaction {
    pub sender: AccountAddress,
    pub nonce: Nonce,
    /// Declared energy budget; charged even on reject.
    pub energy_limit: Energy,
    /// Latest slot-time at which this transaction may be included.
    pub expiry: Timestamp,
    pub payload: Payload,
    pub signature: Signature,
}

impl NormalTransaction {
    /// The bytes the sender signs.
    pub fn signing_message(
        sender: &AccountAddress,
        nonce: Nonce,
        energy_limit: Energy,
        expiry: Timestamp,
        payload: &Payload,
    ) -> Vec<u8> {
        let mut message = Vec::new();
        message.extend_from_slice(TX_SIGN_DOMAIN);
        sender.serial(&mut message);
        nonce.serial(&mut message);
        energy_limit.serial(&mut message);
        expiry.serial(&mut message);
        payload.serial(&mut message);
        message
    }

    /// Verify the sender signature under `key`.
    pub fn verify_signature(&self, key: &PublicKey) -> bool {
        let message = Self::signing_message(
            &self.sender,
            self.nonce,
            self.energy_limit,
            self.expiry,
            &self.payload,
        );
        key.verify(&message, &self.signature)
    }
}

impl Serial for NormalTransaction {
    fn serial(&self, out: &mut Vec<u8>) {
        self.sender.serial(out);
        self.nonce.serial(out);
        self.energy_limit.serial(out);
        self.expiry.serial(out);
        self.payload.serial(out);
        self.signature.serial(out);
    }
}

impl Deserial for NormalTransaction {
    fn deserial(r: &mut ReadCursor<'_>) -> Result<Self, CodecError> {
        Ok(NormalTransaction {
            sender: AccountAddress::deserial(r)?,
            nonce: Nonce::deserial(r)?,
            energy_limit: Energy::deserial(r)?,
            expiry: Timestamp::deserial(r)?,
            payload: Payload::deserial(r)?,
            signature: Signature::deserial(r)?,
        })
    }
}

/// An account-creation witness.
///
/// The created account's address is derived from the registration id, which
/// must be globally fresh. The holder signature proves possession of the
/// account key; issuer attestations are opaque to the core and carried by
/// the identity layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialDeployment {
    pub reg_id: CredentialRegistrationId,
    /// The account's initial verification key.
    pub verify_key: PublicKey,
    /// Issuing identity provider.
    pub ip_identity: u32,
    /// Anonymity revoker chosen by the issuer.
    pub ar_identity: u32,
    /// Latest slot-time at which the deployment may be included.
    pub expiry: Timestamp,
    /// Holder's proof of possession of `verify_key`.
    pub signature: Signature,
}

/// Domain tag for credential proof-of-possession signatures.
const CREDENTIAL_SIGN_DOMAIN: &[u8] = b"TESSERA.CRED.v1";

impl CredentialDeployment {
    /// The address of the account this credential creates.
    pub fn account_address(&self) -> AccountAddress {
        let mut h = crate::hash::Hasher::new();
        h.update(b"ACCOUNT");
        h.update(&self.reg_id.0);
        AccountAddress(*h.finalize().as_bytes())
    }

    /// The bytes the holder signs.
    pub fn signing_message(
        reg_id: &CredentialRegistrationId,
        verify_key: &PublicKey,
        ip_identity: u32,
        ar_identity: u32,
        expiry: Timestamp,
    ) -> Vec<u8> {
        let mut message = Vec::new();
        message.extend_from_slice(CREDENTIAL_SIGN_DOMAIN);
        reg_id.serial(&mut message);
        verify_key.serial(&mut message);
        ip_identity.serial(&mut message);
        ar_identity.serial(&mut message);
        expiry.serial(&mut message);
        message
    }

    /// Verify the proof of possession.
    pub fn verify_signature(&self) -> bool {
        let message = Self::signing_message(
            &self.reg_id,
            &self.verify_key,
            self.ip_identity,
            self.ar_identity,
            self.expiry,
        );
        self.verify_key.verify(&message, &self.signature)
    }

    /// Build a signed deployment for `keys`.
    pub fn sign(
        keys: &KeyPair,
        reg_id: CredentialRegistrationId,
        ip_identity: u32,
        ar_identity: u32,
        expiry: Timestamp,
    ) -> Self {
        let verify_key = keys.public();
        let message =
            Self::signing_message(&reg_id, &verify_key, ip_identity, ar_identity, expiry);
        CredentialDeployment {
            reg_id,
            verify_key,
            ip_identity,
            ar_identity,
            expiry,
            signature: keys.sign(&message),
        }
    }
}

impl Serial for CredentialDeployment {
    fn serial(&self, out: &mut Vec<u8>) {
        self.reg_id.serial(out);
        self.verify_key.serial(out);
        self.ip_identity.serial(out);
        self.ar_identity.serial(out);
        self.expiry.serial(out);
        self.signature.serial(out);
    }
}

impl Deserial for CredentialDeployment {
    fn deserial(r: &mut ReadCursor<'_>) -> Result<Self, CodecError> {
        Ok(CredentialDeployment {
            reg_id: CredentialRegistrationId::deserial(r)?,
            verify_key: PublicKey::deserial(r)?,
            ip_identity: r.u32()?,
            ar_identity: r.u32()?,
            expiry: Timestamp::deserial(r)?,
            signature: Signature::deserial(r)?,
        })
    }
}

/// A governance update instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainUpdate {
    pub sequence_number: UpdateSequenceNumber,
    /// When the update takes effect.
    pub effective_time: Timestamp,
    /// Latest slot-time at which the instruction may be included.
    pub timeout: Timestamp,
    pub payload: UpdatePayload,
    /// Signatures by governance key index.
    pub signatures: Vec<(u32, Signature)>,
}

impl ChainUpdate {
    /// The bytes governance keys sign.
    pub fn signing_message(
        sequence_number: UpdateSequenceNumber,
        effective_time: Timestamp,
        timeout: Timestamp,
        payload: &UpdatePayload,
    ) -> Vec<u8> {
        let mut message = Vec::new();
        message.extend_from_slice(UPDATE_SIGN_DOMAIN);
        sequence_number.serial(&mut message);
        effective_time.serial(&mut message);
        timeout.serial(&mut message);
        payload.serial(&mut message);
        message
    }

    /// Count how many of `keys` have a valid signature here.
    ///
    /// Duplicate key indices count once.
    pub fn count_valid_signatures(&self, keys: &[PublicKey]) -> usize {
        let message = Self::signing_message(
            self.sequence_number,
            self.effective_time,
            self.timeout,
            &self.payload,
        );
        let mut seen = std::collections::HashSet::new();
        self.signatures
            .iter()
            .filter(|(idx, sig)| {
                let Some(key) = keys.get(*idx as usize) else {
                    return false;
                };
                key.verify(&message, sig) && seen.insert(*idx)
            })
            .count()
    }
}

impl Serial for ChainUpdate {
    fn serial(&self, out: &mut Vec<u8>) {
        self.sequence_number.serial(out);
        self.effective_time.serial(out);
        self.timeout.serial(out);
        self.payload.serial(out);
        (self.signatures.len() as u32).serial(out);
        for (idx, sig) in &self.signatures {
            idx.serial(out);
            sig.serial(out);
        }
    }
}

impl Deserial for ChainUpdate {
    fn deserial(r: &mut ReadCursor<'_>) -> Result<Self, CodecError> {
        let sequence_number = UpdateSequenceNumber::deserial(r)?;
        let effective_time = Timestamp::deserial(r)?;
        let timeout = Timestamp::deserial(r)?;
        let payload = UpdatePayload::deserial(r)?;
        let len = r.length()?;
        let mut signatures = Vec::with_capacity(len.min(64));
        for _ in 0..len {
            signatures.push((r.u32()?, Signature::deserial(r)?));
        }
        Ok(ChainUpdate {
            sequence_number,
            effective_time,
            timeout,
            payload,
            signatures,
        })
    }
}

/// The three kinds of items a block carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockItemKind {
    Normal(NormalTransaction),
    CredentialDeployment(CredentialDeployment),
    ChainUpdate(ChainUpdate),
}

/// A block item with its content hash cached at construction.
///
/// Shared as `Arc<BlockItem>` between the transaction table and every block
/// that includes it; equality is hash equality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockItem {
    kind: BlockItemKind,
    hash: TransactionHash,
}

impl PartialEq for BlockItem {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl Eq for BlockItem {}

impl BlockItem {
    /// Wrap a kind, computing the canonical content hash.
    pub fn new(kind: BlockItemKind) -> Self {
        let mut bytes = Vec::new();
        serial_kind(&kind, &mut bytes);
        let hash = Hash::digest(&bytes);
        BlockItem { kind, hash }
    }

    /// The content hash.
    pub fn hash(&self) -> TransactionHash {
        self.hash
    }

    /// The wrapped item.
    pub fn kind(&self) -> &BlockItemKind {
        &self.kind
    }

    /// The item's inclusion deadline (slot-time).
    pub fn expiry(&self) -> Timestamp {
        match &self.kind {
            BlockItemKind::Normal(tx) => tx.expiry,
            BlockItemKind::CredentialDeployment(cd) => cd.expiry,
            BlockItemKind::ChainUpdate(up) => up.timeout,
        }
    }

    /// Declared energy budget. Credentials and updates execute at a fixed
    /// administrative cost.
    pub fn energy_limit(&self) -> Energy {
        match &self.kind {
            BlockItemKind::Normal(tx) => tx.energy_limit,
            BlockItemKind::CredentialDeployment(_) => Energy(ADMINISTRATIVE_ENERGY),
            BlockItemKind::ChainUpdate(_) => Energy(ADMINISTRATIVE_ENERGY),
        }
    }
}

/// Flat energy charge for credential deployments and chain updates.
pub const ADMINISTRATIVE_ENERGY: u64 = 500;

fn serial_kind(kind: &BlockItemKind, out: &mut Vec<u8>) {
    match kind {
        BlockItemKind::Normal(tx) => {
            out.push(0);
            tx.serial(out);
        }
        BlockItemKind::CredentialDeployment(cd) => {
            out.push(1);
            cd.serial(out);
        }
        BlockItemKind::ChainUpdate(up) => {
            out.push(2);
            up.serial(out);
        }
    }
}

impl Serial for BlockItem {
    fn serial(&self, out: &mut Vec<u8>) {
        serial_kind(&self.kind, out);
    }
}

impl Deserial for BlockItem {
    fn deserial(r: &mut ReadCursor<'_>) -> Result<Self, CodecError> {
        let kind = match r.u8()? {
            0 => BlockItemKind::Normal(NormalTransaction::deserial(r)?),
            1 => BlockItemKind::CredentialDeployment(CredentialDeployment::deserial(r)?),
            2 => BlockItemKind::ChainUpdate(ChainUpdate::deserial(r)?),
            tag => return Err(CodecError::InvalidTag { what: "BlockItem", tag }),
        };
        Ok(BlockItem::new(kind))
    }
}

impl Serial for Arc<BlockItem> {
    fn serial(&self, out: &mut Vec<u8>) {
        self.as_ref().serial(out);
    }
}

impl Deserial for Arc<BlockItem> {
    fn deserial(r: &mut ReadCursor<'_>) -> Result<Self, CodecError> {
        Ok(Arc::new(BlockItem::deserial(r)?))
    }
}

/// Build a signed account transaction.
pub fn sign_transaction(
    keys: &KeyPair,
    sender: AccountAddress,
    nonce: Nonce,
    energy_limit: Energy,
    expiry: Timestamp,
    payload: Payload,
) -> BlockItem {
    let message =
        NormalTransaction::signing_message(&sender, nonce, energy_limit, expiry, &payload);
    let signature = keys.sign(&message);
    BlockItem::new(BlockItemKind::Normal(NormalTransaction {
        sender,
        nonce,
        energy_limit,
        expiry,
        payload,
        signature,
    }))
}

/// Parse a block item from its canonical bytes.
pub fn parse_block_item(bytes: &[u8]) -> Result<BlockItem, CodecError> {
    codec::deserialize(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{deserialize, serialize};

    fn sample_tx() -> BlockItem {
        let keys = KeyPair::from_seed(&[9u8; 32]);
        sign_transaction(
            &keys,
            AccountAddress([1u8; 32]),
            Nonce(3),
            Energy(1_000),
            Timestamp(50_000),
            Payload::Transfer {
                to: AccountAddress([2u8; 32]),
                amount: Amount(11),
            },
        )
    }

    #[test]
    fn block_item_round_trip_is_byte_identical() {
        let item = sample_tx();
        let bytes = serialize(&item);
        let parsed: BlockItem = deserialize(&bytes).unwrap();
        assert_eq!(parsed, item);
        assert_eq!(serialize(&parsed), bytes);
    }

    #[test]
    fn hash_is_stable_across_parse() {
        let item = sample_tx();
        let parsed: BlockItem = deserialize(&serialize(&item)).unwrap();
        assert_eq!(parsed.hash(), item.hash());
    }

    #[test]
    fn signature_verifies_under_signer_key() {
        let keys = KeyPair::from_seed(&[9u8; 32]);
        let item = sample_tx();
        let BlockItemKind::Normal(tx) = item.kind() else {
            panic!("expected normal transaction");
        };
        assert!(tx.verify_signature(&keys.public()));
        assert!(!tx.verify_signature(&KeyPair::from_seed(&[8u8; 32]).public()));
    }

    #[test]
    fn credential_account_address_is_derived_from_reg_id() {
        let keys = KeyPair::from_seed(&[1u8; 32]);
        let cd = CredentialDeployment::sign(
            &keys,
            CredentialRegistrationId([7u8; 48]),
            0,
            0,
            Timestamp(1_000),
        );
        let other = CredentialDeployment::sign(
            &keys,
            CredentialRegistrationId([8u8; 48]),
            0,
            0,
            Timestamp(1_000),
        );
        assert_ne!(cd.account_address(), other.account_address());
        assert!(cd.verify_signature());
        let mut tampered = cd.clone();
        tampered.ip_identity = 9;
        assert!(!tampered.verify_signature());
    }

    #[test]
    fn chain_update_counts_distinct_valid_signatures() {
        let k0 = KeyPair::from_seed(&[1u8; 32]);
        let k1 = KeyPair::from_seed(&[2u8; 32]);
        let payload = UpdatePayload::MinimumBakerStake(Amount(100));
        let message = ChainUpdate::signing_message(
            UpdateSequenceNumber(1),
            Timestamp(10),
            Timestamp(20),
            &payload,
        );
        let update = ChainUpdate {
            sequence_number: UpdateSequenceNumber(1),
            effective_time: Timestamp(10),
            timeout: Timestamp(20),
            payload,
            signatures: vec![
                (0, k0.sign(&message)),
                (0, k0.sign(&message)), // duplicate index
                (1, k1.sign(&message)),
            ],
        };
        assert_eq!(
            update.count_valid_signatures(&[k0.public(), k1.public()]),
            2
        );
    }
}
