//! Mirror service behaviour under concurrent updates and generation.

use std::collections::BTreeSet;
use txgen::mirror::{MirrorSet, ShardMirror};
use txgen::Settings;
use txgen_test_helpers::utxo_block;
use txgen_types::{OutPoint, ShardId, Transaction, TxInput, TxOutput, UtxoTransaction};

fn outpoints(mirror: &ShardMirror) -> BTreeSet<OutPoint> {
    mirror.utxos().keys().copied().collect()
}

/// Spend every output of `mirror` into fresh outputs for the same owners.
fn respend_all(mirror: &ShardMirror) -> UtxoTransaction {
    let shard = mirror.shard();
    let (inputs, outputs) = mirror
        .utxos()
        .iter()
        .map(|(outpoint, utxo)| {
            (
                TxInput {
                    outpoint: *outpoint,
                    shard,
                },
                TxOutput {
                    owner: utxo.owner,
                    shard,
                    value: utxo.value,
                },
            )
        })
        .unzip();
    UtxoTransaction::new(inputs, outputs)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_mid_round_update_is_isolated() {
    for seed in 0..20 {
        let settings = Settings::default()
            .with_cross_shard(true)
            .with_cross_shard_ratio(100);
        let mirrors = MirrorSet::from_mirrors(
            [
                ShardMirror::with_testing_addresses(ShardId(0), 10, 1_000),
                ShardMirror::with_testing_addresses(ShardId(1), 10, 1_000),
            ],
            settings,
            seed,
        );
        let a = mirrors.get(ShardId(0)).unwrap().clone();
        let b = mirrors.get(ShardId(1)).unwrap().clone();

        let before = a.snapshot();
        let pre = outpoints(&before);
        let block = utxo_block(ShardId(0), 1, vec![respend_all(&before)]);

        let (applied, round) = tokio::join!(a.apply(block, None), b.generate_utxo(0, 1));
        applied.unwrap();
        let round = round.unwrap();

        let after = a.snapshot();
        let post = outpoints(&after);
        assert!(pre.is_disjoint(&post));

        // Shard 1's round saw shard 0 either entirely before or entirely
        // after the block, never a mix.
        let used: BTreeSet<OutPoint> = round
            .cross
            .iter()
            .flat_map(|tx| tx.inputs.iter())
            .filter(|input| input.shard == ShardId(0))
            .map(|input| input.outpoint)
            .collect();
        assert!(!used.is_empty());
        assert!(used.is_subset(&pre) || used.is_subset(&post));

        // Shard 0's next round observes the whole update.
        let next = a.generate_utxo(0, 1).await.unwrap();
        let own: BTreeSet<OutPoint> = next
            .intra
            .iter()
            .chain(next.cross.iter())
            .map(|tx| tx.inputs[0].outpoint)
            .collect();
        assert_eq!(own, post);
    }
}

#[tokio::test]
async fn test_zero_ratio_over_many_rounds() {
    let settings = Settings::default()
        .with_cross_shard(true)
        .with_cross_shard_ratio(0)
        .with_max_num_txs_per_batch(10);
    let mirrors = MirrorSet::from_mirrors(
        (0..2).map(|shard| ShardMirror::with_testing_addresses(ShardId(shard), 30, 1_000)),
        settings,
        9,
    );

    for round in 0..1000 {
        for handle in mirrors.iter() {
            let utxo = handle.generate_utxo(round, 3).await.unwrap();
            assert!(utxo.cross.is_empty());
            let account = handle.generate_account().await.unwrap();
            assert!(account.iter().all(|tx| !tx.is_cross_shard()));
        }
    }
}

#[tokio::test]
async fn test_unmirrored_shard_has_no_handle() {
    let mirrors = MirrorSet::from_mirrors(
        [ShardMirror::with_testing_addresses(ShardId(0), 1, 1)],
        Settings::default(),
        0,
    );
    assert!(mirrors.get(ShardId(4)).is_none());
    assert!(!mirrors.contains(ShardId(4)));
}
