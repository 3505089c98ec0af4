//! Reorganization depth, idempotence, and UTXO/aggregate consistency
//! across chain switches.

use ember_chain::ChainEvent;
use ember_core::params::NetworkParams;
use ember_tests::helpers::*;

/// Reorganizing away from a branch and back to it restores the UTXO set
/// and the aggregates exactly.
#[tokio::test]
async fn reorg_away_and_back_is_idempotent() {
    let params = NetworkParams {
        coinbase_maturity: 1,
        ..NetworkParams::regtest()
    };
    let chain = chain_with(params);
    let genesis = chain.tip().unwrap();

    // Branch A spends a coin so the reorg moves real UTXO state.
    let a1 = mine(&chain, &genesis, 1).await;
    let a1_out = coinbase_outpoint(&chain, &a1);
    let spend = make_spend(vec![(a1_out, 0xffff_ffff)], vec![10, 20], 1);
    let a2 = chain
        .add(build_block(&chain, &a1, 2, 1, vec![spend]))
        .await
        .unwrap();
    let state_a = chain.state().unwrap();
    let coin_a = chain.db().get_coin(&a1_out).unwrap();
    assert!(coin_a.is_none());

    // Branch B overtakes, disconnecting A.
    let b1 = mine(&chain, &genesis, 11).await;
    let b2 = mine(&chain, &b1, 12).await;
    let b3 = mine(&chain, &b2, 13).await;
    assert_eq!(chain.tip().unwrap(), b3);
    assert!(!chain.db().is_main_chain(&a2).unwrap());
    // A's spend is rolled back on the main view.
    assert!(chain.db().get_coin(&a1_out).unwrap().is_none());
    assert_aggregates_consistent(&chain);

    // Extend A past B: the original branch reconnects block for block.
    let a3 = mine(&chain, &a2, 3).await;
    let a4 = mine(&chain, &a3, 4).await;
    assert_eq!(chain.tip().unwrap(), a4);
    assert!(chain.db().is_main_chain(&a2).unwrap());
    assert_aggregates_consistent(&chain);

    // State at a2 equals what it was the first time a2 was the tip.
    let replayed = chain.db().get_entry_by_height(2).unwrap().unwrap();
    assert_eq!(replayed, a2);
    let state_now = chain.state().unwrap();
    // Two extra coinbase-only blocks on top of the a2 state.
    let subsidy = chain.db().params().block_subsidy(3) + chain.db().params().block_subsidy(4);
    assert_eq!(state_now.value, state_a.value + subsidy);
    assert_eq!(state_now.coin, state_a.coin + 2);
}

/// Every disconnect is paired with the undo of exactly its own effects:
/// walking a three-deep reorg emits disconnects tip-down and connects
/// bottom-up.
#[tokio::test]
async fn deep_reorg_event_order() {
    let chain = regtest_chain();
    let genesis = chain.tip().unwrap();
    let a1 = mine(&chain, &genesis, 1).await;
    let a2 = mine(&chain, &a1, 2).await;
    let a3 = mine(&chain, &a2, 3).await;

    let mut events = chain.subscribe();
    let b1 = mine(&chain, &genesis, 11).await;
    let b2 = mine(&chain, &b1, 12).await;
    let b3 = mine(&chain, &b2, 13).await;
    let b4 = mine(&chain, &b3, 14).await;
    assert_eq!(chain.tip().unwrap(), b4);

    let seen = drain_events(&mut events);
    let mut order = Vec::new();
    for event in &seen {
        match event {
            ChainEvent::Disconnected { entry, .. } => order.push(("d", entry.height)),
            ChainEvent::Connected { entry, .. } => order.push(("c", entry.height)),
            ChainEvent::Reorganized { .. } => order.push(("r", 0)),
        }
    }
    assert_eq!(
        order,
        vec![
            ("d", 3),
            ("d", 2),
            ("d", 1),
            ("c", 1),
            ("c", 2),
            ("c", 3),
            ("c", 4),
            ("r", 0),
        ]
    );
    assert!(!chain.db().is_main_chain(&a3).unwrap());
    assert_aggregates_consistent(&chain);
}

/// The aggregates match a recomputation after every single mutation of a
/// busy session: extends, side branches, an overtake, and pruning.
#[tokio::test]
async fn aggregates_match_recomputation_throughout() {
    let params = NetworkParams {
        coinbase_maturity: 0,
        ..NetworkParams::regtest()
    };
    let chain = chain_with(params);
    let genesis = chain.tip().unwrap();

    let mut tip = genesis.clone();
    for i in 0..5u64 {
        tip = mine(&chain, &tip, i).await;
        assert_aggregates_consistent(&chain);
    }

    // A block spending two coins into three.
    let c1 = coinbase_outpoint(&chain, &chain.db().get_entry_by_height(1).unwrap().unwrap());
    let c2 = coinbase_outpoint(&chain, &chain.db().get_entry_by_height(2).unwrap().unwrap());
    let spend = make_spend(
        vec![(c1, 0xffff_ffff), (c2, 0xffff_ffff)],
        vec![5, 6, 7],
        1,
    );
    tip = chain
        .add(build_block(&chain, &tip, 50, 1, vec![spend]))
        .await
        .unwrap();
    assert_aggregates_consistent(&chain);
    let state = chain.state().unwrap();
    // Two coins became three plus the block's coinbase.
    assert_eq!(state.coin, 7 + 1);

    let mut side = genesis;
    for i in 10..18u64 {
        side = mine(&chain, &side, i).await;
        assert_aggregates_consistent(&chain);
    }
    assert_eq!(chain.tip().unwrap(), side);
    assert!(!chain.db().is_main_chain(&tip).unwrap());

    chain.db().remove_chains().unwrap();
    assert_aggregates_consistent(&chain);
}
