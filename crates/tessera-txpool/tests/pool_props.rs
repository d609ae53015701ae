use std::collections::HashSet;
use std::sync::Arc;

use proptest::prelude::*;
use tessera_crypto::Signature;
use tessera_primitives::{Address, Nonce};
use tessera_txpool::{InMemoryAccountContext, InsertionOutcome, PoolConfig, TxPool};
use tessera_types::{SignedTransaction, Transaction};

const ACCOUNTS: u64 = 4;

#[derive(Debug, Clone)]
enum Op {
    Enqueue { sender: u64, nonce: Nonce },
    Drain { limit: usize },
    Discard { sender: u64 },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        6 => (1..=ACCOUNTS, 0u64..12).prop_map(|(sender, nonce)| Op::Enqueue { sender, nonce }),
        1 => (0usize..6).prop_map(|limit| Op::Drain { limit }),
        1 => (1..=ACCOUNTS).prop_map(|sender| Op::Discard { sender }),
    ]
}

fn tx(sender: u64, nonce: Nonce) -> SignedTransaction {
    SignedTransaction::new(
        Transaction::new(
            Address::from_low_u64(sender),
            nonce,
            Address::from_low_u64(100),
            "transfer",
        ),
        Signature::default(),
    )
}

fn unsigned_from(sender: Address, nonce: Nonce) -> SignedTransaction {
    SignedTransaction::new(
        Transaction::new(sender, nonce, Address::from_low_u64(100), ""),
        Signature::default(),
    )
}

fn pool() -> TxPool {
    TxPool::new(
        PoolConfig {
            verify_signatures: false,
            ..PoolConfig::default()
        },
        Arc::new(InMemoryAccountContext::new()),
    )
}

fn assert_account_invariants(pool: &TxPool) {
    let mut total = 0;
    for sender in 1..=ACCOUNTS {
        let account = Address::from_low_u64(sender);
        let executable = pool.executable_of(&account);
        let waiting = pool.waiting_of(&account);
        total += executable.len() + waiting.len();

        if let Some(base) = pool.account_nonce(&account) {
            for (i, t) in executable.iter().enumerate() {
                assert_eq!(t.nonce(), base + i as u64, "executable run has a gap");
            }
            let next = base + executable.len() as u64;
            for t in &waiting {
                assert!(t.nonce() > next, "waiting entry {} could be executable", t.nonce());
            }
        } else {
            assert!(executable.is_empty() && waiting.is_empty());
        }
    }
    assert_eq!(total, pool.len());
    assert_eq!(pool.executable_len() + pool.waiting_len(), pool.len());
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 128, failure_persistence: None, .. ProptestConfig::default() })]

    #[test]
    fn prop_executable_runs_stay_contiguous(ops in proptest::collection::vec(op(), 1..80)) {
        let pool = pool();
        for op in ops {
            match op {
                Op::Enqueue { sender, nonce } => {
                    let _ = pool.enqueue(tx(sender, nonce));
                }
                Op::Drain { limit } => {
                    let ready = pool.ready_transactions(limit);
                    prop_assert!(ready.len() <= limit);
                }
                Op::Discard { sender } => {
                    let account = Address::from_low_u64(sender);
                    if let Some(head) = pool.executable_of(&account).first() {
                        prop_assert!(pool.discard(head));
                    }
                }
            }
            assert_account_invariants(&pool);
        }
    }

    #[test]
    fn prop_stale_nonce_always_rejected(
        ops in proptest::collection::vec(op(), 1..60),
        sender in 1..=ACCOUNTS,
        probe in 0u64..12,
    ) {
        let pool = pool();
        for op in ops {
            match op {
                Op::Enqueue { sender, nonce } => {
                    let _ = pool.enqueue(tx(sender, nonce));
                }
                Op::Drain { limit } => {
                    pool.ready_transactions(limit);
                }
                Op::Discard { .. } => {}
            }
        }
        let account = Address::from_low_u64(sender);
        if let Some(current) = pool.account_nonce(&account) {
            if probe < current {
                let len = pool.len();
                let executable = pool.executable_of(&account);
                let err = pool.enqueue(tx(sender, probe)).unwrap_err();
                prop_assert_eq!(err.outcome(), InsertionOutcome::AlreadyExecuted);
                prop_assert_eq!(pool.account_nonce(&account), Some(current));
                prop_assert_eq!(pool.len(), len);
                prop_assert_eq!(pool.executable_of(&account), executable);
            }
        }

        let fresh = Address::from_low_u64(ACCOUNTS + sender);
        let len = pool.len();
        let err = pool.enqueue(unsigned_from(fresh, probe)).unwrap_err();
        prop_assert_eq!(err.outcome(), InsertionOutcome::Invalid);
        prop_assert_eq!(pool.account_nonce(&fresh), None);
        prop_assert_eq!(pool.len(), len);
    }

    #[test]
    fn prop_drained_nonces_never_repeat(ops in proptest::collection::vec(op(), 1..80)) {
        let pool = pool();
        let mut drained = HashSet::new();
        for op in ops {
            match op {
                Op::Enqueue { sender, nonce } => {
                    let _ = pool.enqueue(tx(sender, nonce));
                }
                Op::Drain { limit } => {
                    for t in pool.ready_transactions(limit) {
                        prop_assert!(drained.insert((t.sender(), t.nonce())));
                    }
                }
                Op::Discard { .. } => {}
            }
        }
    }
}
