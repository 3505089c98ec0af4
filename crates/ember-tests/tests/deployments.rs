//! Soft-fork deployment lifecycle over real chains: signaling windows,
//! lock-in, activation, required version bits, timeout failure, and the
//! state cache.

use ember_chain::ThresholdState;
use ember_core::params::{Deployment, NetworkParams, DEPLOYMENT_CSV};
use ember_tests::helpers::*;

const SIGNAL: u32 = 1 | (1 << 5);

/// Regtest with a four-block window and a threshold of three.
fn deployment_params(start_time: u64, timeout: u64) -> NetworkParams {
    let base = NetworkParams::regtest();
    NetworkParams {
        deployments: vec![Deployment {
            name: DEPLOYMENT_CSV,
            bit: 5,
            start_time,
            timeout,
            window: 4,
            threshold: 3,
        }],
        ..base
    }
}

fn state_at(chain: &ember_chain::Chain, parent: &ember_chain::ChainEntry) -> ThresholdState {
    let dep = chain.db().params().deployment(DEPLOYMENT_CSV).unwrap();
    chain.db().get_state(parent, dep).unwrap()
}

#[tokio::test]
async fn full_activation_lifecycle() {
    let genesis_time = NetworkParams::regtest().genesis_time;
    let chain = chain_with(deployment_params(genesis_time, u64::MAX));
    let genesis = chain.tip().unwrap();
    assert_eq!(state_at(&chain, &genesis), ThresholdState::Defined);

    // First window (heights 1-3): no signaling needed to start.
    let mut tip = genesis;
    for i in 1..=3u64 {
        tip = mine(&chain, &tip, i).await;
    }
    assert_eq!(state_at(&chain, &tip), ThresholdState::Started);

    // Second window (heights 4-7): all four blocks signal, above the
    // threshold of three.
    for i in 4..=7u64 {
        tip = mine_versioned(&chain, &tip, i, SIGNAL).await;
    }
    assert_eq!(state_at(&chain, &tip), ThresholdState::LockedIn);

    // Locked in: the signaling bit becomes mandatory.
    let err = chain
        .add(build_block(&chain, &tip, 99, 1, vec![]))
        .await
        .unwrap_err();
    assert_eq!(reason(&err), "bad-version");

    // Third window (heights 8-11) passes; activation at its boundary.
    for i in 8..=11u64 {
        tip = mine_versioned(&chain, &tip, i, SIGNAL).await;
    }
    assert_eq!(state_at(&chain, &tip), ThresholdState::Active);

    // Active is terminal and the bit stays required.
    let err = chain
        .add(build_block(&chain, &tip, 98, 1, vec![]))
        .await
        .unwrap_err();
    assert_eq!(reason(&err), "bad-version");
    for i in 12..=20u64 {
        tip = mine_versioned(&chain, &tip, i, SIGNAL).await;
        assert_eq!(state_at(&chain, &tip), ThresholdState::Active);
    }
}

#[tokio::test]
async fn below_threshold_keeps_started() {
    let genesis_time = NetworkParams::regtest().genesis_time;
    let chain = chain_with(deployment_params(genesis_time, u64::MAX));
    let mut tip = chain.tip().unwrap();
    for i in 1..=3u64 {
        tip = mine(&chain, &tip, i).await;
    }
    // Only two of four blocks signal: under the threshold.
    tip = mine_versioned(&chain, &tip, 4, SIGNAL).await;
    tip = mine_versioned(&chain, &tip, 5, SIGNAL).await;
    tip = mine(&chain, &tip, 6).await;
    tip = mine(&chain, &tip, 7).await;
    assert_eq!(state_at(&chain, &tip), ThresholdState::Started);
}

#[tokio::test]
async fn timeout_without_threshold_fails_permanently() {
    let genesis_time = NetworkParams::regtest().genesis_time;
    // The second boundary's median time passes the timeout.
    let chain = chain_with(deployment_params(genesis_time, genesis_time + 200));
    let mut tip = chain.tip().unwrap();
    for i in 1..=3u64 {
        tip = mine(&chain, &tip, i).await;
    }
    assert_eq!(state_at(&chain, &tip), ThresholdState::Started);
    for i in 4..=7u64 {
        tip = mine(&chain, &tip, i).await;
    }
    assert_eq!(state_at(&chain, &tip), ThresholdState::Failed);

    // Failed never regresses and never requires the bit.
    for i in 8..=16u64 {
        tip = mine(&chain, &tip, i).await;
        assert_eq!(state_at(&chain, &tip), ThresholdState::Failed);
    }
}

#[tokio::test]
async fn state_cache_matches_recomputation() {
    let genesis_time = NetworkParams::regtest().genesis_time;
    let chain = chain_with(deployment_params(genesis_time, u64::MAX));
    let mut tip = chain.tip().unwrap();
    for i in 1..=3u64 {
        tip = mine(&chain, &tip, i).await;
    }
    for i in 4..=12u64 {
        tip = mine_versioned(&chain, &tip, i, SIGNAL).await;
    }
    assert_eq!(state_at(&chain, &tip), ThresholdState::Active);

    let cache = chain.db().state_cache().unwrap();
    assert!(!cache.is_empty());
    assert!(cache.iter().all(|(name, _, _)| name == DEPLOYMENT_CSV));
    // Finalized windows only: every cached state recomputes identically.
    let verified = chain.db().verify_deployments().unwrap();
    assert_eq!(verified, cache.len());
}
