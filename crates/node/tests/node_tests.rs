//! Node-level integration: persistence, restart recovery, bundle
//! import/export, wire dispatch.

use std::sync::Arc;
use tempfile::tempdir;
use tessera_consensus::{BakerIdentity, NullEngine, TrustingOracle};
use tessera_node::{wall_now, Coordinator, NodeConfig};
use tessera_tree::BlockStatus;
use tessera_types::{
    encode_message, serialize, sign_transaction, Amount, BakerId, BlockHash, BlockHeight,
    CatchUpStatus, ChainParameters, ConsensusMessage, CoreGenesisParameters, ElectionDifficulty,
    Energy, Epoch, ExchangeRate, FinalizationIndex, FinalizationParameters, FinalizationProof,
    FinalizationRecord, GenesisAccount, GenesisBaker, GenesisData, GenesisIndex, Hash, KeyPair,
    Nonce, Payload, ProtocolVersion, RewardParameters, Signature, Slot, Timestamp, UpdateResult,
    VrfKeyPair,
};

const BAKER_SEED: u8 = 10;
const ACCOUNT_SEED: u8 = 1;

fn keys(seed: u8) -> KeyPair {
    KeyPair::from_seed(&[seed; 32])
}

fn vrf(seed: u8) -> VrfKeyPair {
    VrfKeyPair::from_seed(&[seed; 32])
}

fn addr(seed: u8) -> tessera_types::AccountAddress {
    tessera_types::AccountAddress([seed; 32])
}

fn genesis() -> GenesisData {
    GenesisData::Initial {
        core: CoreGenesisParameters {
            genesis_time: Timestamp(0),
            slot_duration_millis: 1_000,
            epoch_length: 1_000_000,
            max_block_energy: Energy(3_000_000),
            finalization_parameters: FinalizationParameters {
                committee_stake_fraction: 100,
                committee_max_size: 1_000,
            },
        },
        protocol_version: ProtocolVersion::P1,
        leadership_election_nonce: Hash::digest(b"node test nonce"),
        accounts: vec![
            GenesisAccount {
                address: addr(ACCOUNT_SEED),
                balance: Amount(1_000_000_000),
                verify_key: keys(ACCOUNT_SEED).public(),
                baker: None,
            },
            GenesisAccount {
                address: addr(BAKER_SEED),
                balance: Amount(1_000_000_000),
                verify_key: keys(BAKER_SEED).public(),
                baker: Some(GenesisBaker {
                    baker_id: BakerId(0),
                    stake: Amount(500_000_000),
                    election_key: vrf(BAKER_SEED).public(),
                    signature_key: keys(BAKER_SEED).public(),
                    aggregation_key: keys(BAKER_SEED + 1).public(),
                }),
            },
        ],
        governance_keys: vec![keys(42).public()],
        governance_threshold: 1,
        identity_providers: vec![0],
        anonymity_revokers: vec![0],
        chain_parameters: ChainParameters {
            election_difficulty: ElectionDifficulty(100_000),
            euro_per_energy: ExchangeRate {
                numerator: 1,
                denominator: 1_000,
            },
            micro_gtu_per_euro: ExchangeRate {
                numerator: 1_000,
                denominator: 1,
            },
            baker_cooldown_epochs: Epoch(2),
            minimum_baker_stake: Amount(1_000),
            reward_parameters: RewardParameters {
                baking_reward_fraction: 60_000,
                finalization_reward_fraction: 30_000,
                gas_account_fraction: 25_000,
            },
        },
    }
}

fn baker0() -> BakerIdentity {
    BakerIdentity {
        baker_id: BakerId(0),
        sign_keys: keys(BAKER_SEED),
        vrf_keys: vrf(BAKER_SEED),
    }
}

fn open(dir: &std::path::Path) -> Arc<Coordinator> {
    let config = NodeConfig {
        data_dir: dir.to_path_buf(),
        ..NodeConfig::default()
    };
    Coordinator::open(
        config,
        genesis(),
        Arc::new(NullEngine),
        Box::new(TrustingOracle::default()),
    )
    .expect("coordinator opens")
}

/// Slots of wall-clock "now", so baking passes the skew clamp.
fn current_slot(extra: u64) -> u64 {
    wall_now().0 / 1_000 + extra
}

fn record(index: u64, block: BlockHash) -> FinalizationRecord {
    FinalizationRecord {
        index: FinalizationIndex(index),
        block,
        delay: 0,
        proof: FinalizationProof {
            signers: vec![0],
            signature: Signature([1u8; 64]),
        },
    }
}

fn bake_chain(coordinator: &Coordinator, count: u64) -> Vec<BlockHash> {
    let base = current_slot(0).saturating_sub(count + 1);
    let mut hashes = Vec::new();
    for i in 0..count {
        let block = coordinator
            .bake(&baker0(), Slot(base + i + 1))
            .expect("baker wins every slot at full difficulty");
        hashes.push(block.hash());
    }
    hashes
}

#[test]
fn restart_recovers_the_finalized_chain() {
    let dir = tempdir().unwrap();
    let (lfb_before, height_before);
    {
        let coordinator = open(dir.path());
        // A transaction in the chain exercises state replay.
        let tx = sign_transaction(
            &keys(ACCOUNT_SEED),
            addr(ACCOUNT_SEED),
            Nonce(1),
            Energy(1_000),
            Timestamp(wall_now().0 + 60_000),
            Payload::Transfer {
                to: addr(BAKER_SEED),
                amount: Amount(500),
            },
        );
        assert_eq!(
            coordinator.receive_transaction(&serialize(&tx)),
            UpdateResult::Success
        );

        let hashes = bake_chain(&coordinator, 3);
        assert_eq!(
            coordinator.receive_finalization_record(GenesisIndex(0), record(1, hashes[2])),
            UpdateResult::Success
        );
        (lfb_before, height_before) = coordinator.last_finalized();
        assert_eq!(height_before, BlockHeight(3));
        coordinator.shutdown();
    }

    let coordinator = open(dir.path());
    let (lfb_after, height_after) = coordinator.last_finalized();
    assert_eq!(lfb_after, lfb_before);
    assert_eq!(height_after, height_before);
    assert_eq!(
        coordinator.block_status(&lfb_before),
        Some(BlockStatus::Finalized)
    );
    // The replayed state carries the transfer.
    assert_eq!(
        coordinator
            .finalized_account(&addr(BAKER_SEED))
            .unwrap()
            .balance
            .0,
        1_000_000_500
    );
    // The node keeps baking after recovery.
    let next = coordinator.bake(&baker0(), Slot(current_slot(1)));
    assert!(next.is_some());
}

#[test]
fn export_then_import_reaches_the_same_tip() {
    let source_dir = tempdir().unwrap();
    let source = open(source_dir.path());
    let hashes = bake_chain(&source, 5);
    assert_eq!(
        source.receive_finalization_record(GenesisIndex(0), record(1, hashes[4])),
        UpdateResult::Success
    );

    let bundle = source_dir.path().join("chain.bundle");
    source.export_bundle(&bundle, 2).unwrap();

    let target_dir = tempdir().unwrap();
    let target = open(target_dir.path());
    assert_eq!(target.import_bundle(&bundle), UpdateResult::Success);
    assert_eq!(target.last_finalized(), source.last_finalized());

    // Importing again is a no-op thanks to the chunk index.
    assert_eq!(target.import_bundle(&bundle), UpdateResult::Success);

    assert_eq!(
        target.import_bundle(&target_dir.path().join("missing.bundle")),
        UpdateResult::MissingImportFile
    );
}

#[test]
fn wire_dispatch_maps_envelope_types() {
    let dir = tempdir().unwrap();
    let coordinator = open(dir.path());

    assert_eq!(
        coordinator.receive_message(b"garbage"),
        UpdateResult::SerializationFail
    );

    // A peer status for the wrong era.
    let status = CatchUpStatus {
        is_request: true,
        last_finalized_block: Hash::ZERO,
        last_finalized_index: FinalizationIndex(0),
        best_block: Hash::ZERO,
    };
    let bytes = encode_message(GenesisIndex(9), &ConsensusMessage::CatchUpStatus(status.clone()));
    assert_eq!(
        coordinator.receive_message(&bytes),
        UpdateResult::InvalidGenesisIndex
    );

    // Right era: their unknown best block asks us to continue catch-up.
    let bytes = encode_message(GenesisIndex(0), &ConsensusMessage::CatchUpStatus(status));
    assert_eq!(
        coordinator.receive_message(&bytes),
        UpdateResult::ContinueCatchUp
    );
}

#[test]
fn purge_task_runs_and_stops() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    runtime.block_on(async {
        let dir = tempdir().unwrap();
        let coordinator = open(dir.path());
        let handle = tokio::spawn(coordinator.clone().run_purge_loop());
        // Give the loop a tick, then stop it.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        coordinator.shutdown();
        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .expect("purge loop stops on shutdown")
            .unwrap();
    });
}
