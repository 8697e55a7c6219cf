//! End-to-end ledger closing: genesis, sequential closes, contract
//! execution, fee votes, and peer catch-up, all through the public
//! crate surface.

use std::sync::Arc;

use parking_lot::RwLock;
use tessera_common::Hash256;
use tessera_contract::{ExecutionRegistry, ScriptedSandbox};
use tessera_ledger::{
    AcceptAll, ApplyMode, GenesisConfig, LedgerCloser, SharedState, SharedTrie,
};
use tessera_store::{AccountTrie, KeyValueStore, MemoryStore, MemoryTrie};
use tessera_tx::{
    Address, ConsensusValue, ContractInfo, Operation, OperationBody, Privilege, Signature,
    StateReader, Transaction, TransactionEnvelope,
};

const CHAIN_ID: u64 = 1;

fn addr(tag: &str) -> Address {
    let mut s = format!("tsrQ{tag}");
    while s.len() < 36 {
        s.push('x');
    }
    Address::new(s)
}

struct Node {
    closer: LedgerCloser,
    ledger_store: Arc<dyn KeyValueStore>,
}

fn node() -> Node {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    let ledger_store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let account_store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let trie: SharedTrie =
        Arc::new(RwLock::new(Box::new(MemoryTrie::new()) as Box<dyn AccountTrie>));
    let closer = LedgerCloser::new(
        ledger_store.clone(),
        account_store,
        trie,
        Arc::new(ScriptedSandbox::new()),
        Arc::new(ExecutionRegistry::new()),
        Box::new(AcceptAll),
        CHAIN_ID,
    );
    Node {
        closer,
        ledger_store,
    }
}

fn genesis_config() -> GenesisConfig {
    GenesisConfig {
        account: addr("genesis"),
        balance: 10_000_000_000,
        validators: vec![addr("val1")],
        chain_id: CHAIN_ID,
    }
}

fn signed(tx: Transaction) -> TransactionEnvelope {
    let signer = tx.source.clone();
    let mut envelope = TransactionEnvelope::new(tx);
    envelope.signatures.push(Signature {
        signer,
        signature: vec![1],
    });
    envelope
}

fn tx(source: &Address, nonce: u64, operations: Vec<Operation>) -> Transaction {
    Transaction {
        source: source.clone(),
        nonce,
        fee_limit: 10_000,
        gas_price: 1,
        operations,
        metadata: None,
        chain_id: CHAIN_ID,
    }
}

fn create_account(dest: &Address, init_balance: i64) -> Operation {
    Operation::new(OperationBody::CreateAccount {
        dest: dest.clone(),
        init_balance,
        privilege: Privilege::default(),
        contract: None,
        init_input: None,
    })
}

fn create_contract(dest: &Address, init_balance: i64, payload: &str) -> Operation {
    let mut privilege = Privilege::default();
    privilege.master_weight = 0;
    Operation::new(OperationBody::CreateAccount {
        dest: dest.clone(),
        init_balance,
        privilege,
        contract: Some(ContractInfo {
            payload: payload.to_string(),
            kind: 0,
        }),
        init_input: None,
    })
}

fn pay_coin(dest: &Address, amount: i64) -> Operation {
    Operation::new(OperationBody::PayCoin {
        dest: dest.clone(),
        amount,
        input: None,
    })
}

fn next_value(closer: &LedgerCloser, txset: Vec<TransactionEnvelope>) -> ConsensusValue {
    let lcl = closer.last_closed();
    ConsensusValue {
        ledger_seq: lcl.seq + 1,
        close_time: lcl.close_time + 10,
        previous_ledger_hash: lcl.hash,
        previous_proof: Vec::new(),
        txset,
        upgrade: None,
    }
}

fn balance(closer: &LedgerCloser, address: &Address) -> i64 {
    SharedState::new(closer.trie())
        .read_account(address.as_str())
        .unwrap()
        .map(|a| a.balance)
        .unwrap_or(0)
}

fn records_at(store: &Arc<dyn KeyValueStore>, seq: u64) -> Vec<tessera_tx::TransactionRecord> {
    let bytes = store.get(&format!("txs-{seq}")).unwrap().unwrap();
    bincode::deserialize(&bytes).unwrap()
}

#[test]
fn test_payments_across_two_ledgers() {
    let mut node = node();
    node.closer.initialize(genesis_config()).unwrap();
    let genesis = addr("genesis");
    let bob = addr("bob");

    let value = next_value(
        &node.closer,
        vec![signed(tx(&genesis, 1, vec![create_account(&bob, 5_000)]))],
    );
    let header2 = node
        .closer
        .close_ledger(value, Vec::new(), ApplyMode::Follow)
        .unwrap();
    assert_eq!(header2.seq, 2);
    assert_eq!(header2.tx_count, 1);
    assert!(header2.verify_hash());
    assert_eq!(balance(&node.closer, &bob), 5_000);

    let value = next_value(
        &node.closer,
        vec![signed(tx(&genesis, 2, vec![pay_coin(&bob, 700)]))],
    );
    let header3 = node
        .closer
        .close_ledger(value, Vec::new(), ApplyMode::Follow)
        .unwrap();
    assert_eq!(header3.seq, 3);
    assert_eq!(header3.previous_hash, header2.hash);
    assert_eq!(header3.tx_count, 2);
    assert_eq!(balance(&node.closer, &bob), 5_700);

    // Records were persisted per sequence, and each successful
    // transaction paid the gas it used, not its declared limit.
    let fee2 = records_at(&node.ledger_store, 2)[0].actual_fee;
    let fee3 = records_at(&node.ledger_store, 3)[0].actual_fee;
    assert_eq!(
        fee2,
        tessera_tx::fee::required_fee(&records_at(&node.ledger_store, 2)[0].envelope).unwrap()
    );
    assert!(fee3 < 10_000);
    assert_eq!(
        balance(&node.closer, &genesis),
        10_000_000_000 - 5_000 - 700 - fee2 - fee3
    );
}

#[test]
fn test_independent_nodes_close_identically() {
    let mut a = node();
    let mut b = node();
    a.closer.initialize(genesis_config()).unwrap();
    b.closer.initialize(genesis_config()).unwrap();
    assert_eq!(a.closer.last_closed().hash, b.closer.last_closed().hash);

    let genesis = addr("genesis");
    let bob = addr("bob");
    let value = next_value(
        &a.closer,
        vec![signed(tx(&genesis, 1, vec![create_account(&bob, 5_000)]))],
    );

    let header_a = a
        .closer
        .close_ledger(value.clone(), Vec::new(), ApplyMode::Follow)
        .unwrap();
    let header_b = b
        .closer
        .close_ledger(value, Vec::new(), ApplyMode::Follow)
        .unwrap();
    assert_eq!(header_a, header_b);
    assert_eq!(header_a.account_tree_hash, header_b.account_tree_hash);
}

#[test]
fn test_contract_forwards_payment_through_close() {
    let mut node = node();
    node.closer.initialize(genesis_config()).unwrap();
    let genesis = addr("genesis");
    let carol = addr("carol");
    let widget = addr("widget");

    let payload = format!(
        r#"{{"main": [{{"pay_coin": {{"dest": "{}", "amount": 50}}}}]}}"#,
        carol.as_str()
    );
    let value = next_value(
        &node.closer,
        vec![signed(tx(
            &genesis,
            1,
            vec![
                create_account(&carol, 200),
                create_contract(&widget, 10_000, &payload),
            ],
        ))],
    );
    node.closer
        .close_ledger(value, Vec::new(), ApplyMode::Follow)
        .unwrap();

    let value = next_value(
        &node.closer,
        vec![signed(tx(&genesis, 2, vec![pay_coin(&widget, 500)]))],
    );
    let header = node
        .closer
        .close_ledger(value, Vec::new(), ApplyMode::Follow)
        .unwrap();
    // Only the client-submitted transaction counts.
    assert_eq!(header.tx_count, 2);

    assert_eq!(balance(&node.closer, &widget), 10_000 + 500 - 50);
    assert_eq!(balance(&node.closer, &carol), 200 + 50);

    // The persisted record set carries the synthesized transaction too.
    let bytes = node.ledger_store.get("txs-3").unwrap().unwrap();
    let records: Vec<tessera_tx::TransactionRecord> = bincode::deserialize(&bytes).unwrap();
    assert_eq!(records.len(), 2);
    assert!(records[0].envelope.is_synthesized());
    assert!(!records[1].envelope.is_synthesized());
}

#[test]
fn test_fee_vote_takes_effect_at_close() {
    let mut node = node();
    node.closer.initialize(genesis_config()).unwrap();
    let genesis = addr("genesis");
    let poll = addr("feepoll");

    let payload = r#"{"main": [{"vote_fee": {"gas_price": 2, "base_reserve": 150}}]}"#;
    let value = next_value(
        &node.closer,
        vec![signed(tx(
            &genesis,
            1,
            vec![create_contract(&poll, 1_000, payload)],
        ))],
    );
    let header2 = node
        .closer
        .close_ledger(value, Vec::new(), ApplyMode::Follow)
        .unwrap();
    assert_eq!(node.closer.fee_config().gas_price, 1);

    let value = next_value(
        &node.closer,
        vec![signed(tx(&genesis, 2, vec![pay_coin(&poll, 500)]))],
    );
    let header3 = node
        .closer
        .close_ledger(value, Vec::new(), ApplyMode::Follow)
        .unwrap();
    assert_eq!(node.closer.fee_config().gas_price, 2);
    assert_eq!(node.closer.fee_config().base_reserve, 150);
    assert_ne!(header3.fees_hash, header2.fees_hash);
}

#[test]
fn test_catch_up_replays_to_identical_state() {
    let mut a = node();
    a.closer.initialize(genesis_config()).unwrap();
    let genesis = addr("genesis");
    let bob = addr("bob");
    let carol = addr("carol");

    let value = next_value(
        &a.closer,
        vec![signed(tx(&genesis, 1, vec![create_account(&bob, 5_000)]))],
    );
    a.closer
        .close_ledger(value, b"proof-2".to_vec(), ApplyMode::Follow)
        .unwrap();
    let value = next_value(
        &a.closer,
        vec![signed(tx(
            &genesis,
            2,
            vec![create_account(&carol, 300), pay_coin(&bob, 40)],
        ))],
    );
    a.closer
        .close_ledger(value, b"proof-3".to_vec(), ApplyMode::Follow)
        .unwrap();

    let mut b = node();
    b.closer.initialize(genesis_config()).unwrap();

    let bundle = a.closer.on_request_ledgers(2, 10).unwrap();
    assert_eq!(bundle.ledgers.len(), 2);
    assert_eq!(bundle.tip_proof, b"proof-3".to_vec());

    let tip = b.closer.on_receive_ledgers(bundle).unwrap();
    assert_eq!(tip, 3);
    assert_eq!(b.closer.last_closed().hash, a.closer.last_closed().hash);
    assert_eq!(balance(&b.closer, &bob), 5_040);
    assert_eq!(balance(&b.closer, &carol), 300);
}

#[test]
fn test_propose_then_follow_agree() {
    let mut proposer = node();
    let mut follower = node();
    proposer.closer.initialize(genesis_config()).unwrap();
    follower.closer.initialize(genesis_config()).unwrap();
    let genesis = addr("genesis");
    let bob = addr("bob");

    // The proposer sees one good and one stale transaction.
    let good = signed(tx(&genesis, 1, vec![create_account(&bob, 5_000)]));
    let stale = signed(tx(&genesis, 7, vec![create_account(&bob, 5_000)]));
    let value = next_value(&proposer.closer, vec![good.clone(), stale]);

    let header_p = proposer
        .closer
        .close_ledger(value, Vec::new(), ApplyMode::Propose)
        .unwrap();
    assert_eq!(header_p.tx_count, 1);

    // A follower applying the pruned set reaches the same state root.
    let value = next_value(&follower.closer, vec![good]);
    let header_f = follower
        .closer
        .close_ledger(value, Vec::new(), ApplyMode::Follow)
        .unwrap();
    assert_eq!(header_f.account_tree_hash, header_p.account_tree_hash);
}

#[test]
fn test_catch_up_from_propose_closed_ledger() {
    let mut proposer = node();
    proposer.closer.initialize(genesis_config()).unwrap();
    let genesis = addr("genesis");
    let bob = addr("bob");

    let good = signed(tx(&genesis, 1, vec![create_account(&bob, 5_000)]));
    let stale = signed(tx(&genesis, 7, vec![pay_coin(&bob, 1)]));
    let value = next_value(&proposer.closer, vec![good, stale]);
    let header = proposer
        .closer
        .close_ledger(value, b"p2".to_vec(), ApplyMode::Propose)
        .unwrap();

    // The persisted consensus value is the pruned set the block
    // actually applied, and the header commits to it.
    let bundle = proposer.closer.on_request_ledgers(2, 5).unwrap();
    assert_eq!(bundle.ledgers.len(), 1);
    assert_eq!(bundle.ledgers[0].value.txset.len(), 1);
    assert_eq!(bundle.ledgers[0].value.hash(), header.consensus_value_hash);

    // A peer replaying that value must land on the identical header.
    let mut peer = node();
    peer.closer.initialize(genesis_config()).unwrap();
    let tip = peer.closer.on_receive_ledgers(bundle).unwrap();
    assert_eq!(tip, 2);
    assert_eq!(peer.closer.last_closed().hash, proposer.closer.last_closed().hash);
    assert_eq!(balance(&peer.closer, &bob), 5_000);
}

#[test]
fn test_signatures_excluded_from_identity_hash() {
    // Two envelopes differing only in signatures name the same
    // transaction, so a re-signed submission cannot double-apply.
    let genesis = addr("genesis");
    let bob = addr("bob");
    let one = signed(tx(&genesis, 1, vec![pay_coin(&bob, 1)]));
    let mut two = one.clone();
    two.signatures.push(Signature {
        signer: bob.clone(),
        signature: vec![9, 9],
    });
    assert_eq!(one.hash(), two.hash());
    assert_ne!(one.hash(), Hash256::zero());
}
