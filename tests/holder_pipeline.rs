use alloy_primitives::{Address, U256};
use anyhow::Result;
use buyin_indexer::etherscan::parse_rows;
use buyin_indexer::events::{RawTransfer, TransferEvent};
use buyin_indexer::ledger::{
    LedgerMode, ReplayOptions, buy_in_holders, distribution, sort_by_balance, summarize,
};
use buyin_indexer::query::commands::load_ledger;
use buyin_indexer::repository::{Database, TransferRepository};
use buyin_indexer::snapshot::TreasurySnapshot;
use buyin_indexer::source::{TransferBatch, TransferEventSource};
use buyin_indexer::sync::sync_transfers;
use buyin_indexer::valuation::BuyInTerms;
use serde_json::json;

const ZERO: &str = "0x0000000000000000000000000000000000000000";
const ALICE: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
const BOB: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
const CAROL: &str = "0xcccccccccccccccccccccccccccccccccccccccc";

fn address(s: &str) -> Address {
    s.parse().unwrap()
}

fn token() -> Address {
    Address::repeat_byte(0x99)
}

/// Rows shaped like an Etherscan `tokentx` page.
fn etherscan_rows() -> Vec<RawTransfer> {
    let rows = json!([
        {
            "blockNumber": "100", "timeStamp": "1623400000",
            "hash": format!("0x{}", "01".repeat(32)), "logIndex": "0",
            "from": ZERO, "to": ALICE, "value": "1000", "tokenDecimal": "0"
        },
        {
            "blockNumber": "200", "timeStamp": "1623484800",
            "hash": format!("0x{}", "02".repeat(32)), "logIndex": "3",
            "from": ALICE, "to": BOB, "value": "400", "tokenDecimal": "0"
        },
        {
            "blockNumber": "300", "timeStamp": "1623600000000",
            "hash": format!("0x{}", "03".repeat(32)),
            "from": BOB, "to": CAROL, "value": "100", "tokenDecimal": "0"
        }
    ]);
    serde_json::from_value(rows).unwrap()
}

fn events() -> Vec<TransferEvent> {
    etherscan_rows()
        .iter()
        .map(|row| row.parse(0).unwrap())
        .collect()
}

struct StaticSource(Vec<TransferEvent>);

impl TransferEventSource for StaticSource {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn fetch_transfers(&self, _token: Address, from_block: u64) -> Result<TransferBatch> {
        let events: Vec<TransferEvent> = self
            .0
            .iter()
            .filter(|e| e.block_number >= from_block)
            .cloned()
            .collect();
        Ok(TransferBatch {
            end_block: events.last().map_or(from_block, |e| e.block_number),
            start_block: from_block,
            events,
            decimals: Some(0),
        })
    }
}

#[test]
fn test_etherscan_rows_parse_into_ordered_events() {
    let events = events();

    assert_eq!(events.len(), 3);
    assert!(events[0].is_mint());
    assert_eq!(events[1].log_index, 3);
    assert_eq!(events[2].log_index, 0);
    // Millisecond timestamps are normalized to seconds
    assert_eq!(events[2].timestamp, 1_623_600_000);
}

#[tokio::test]
async fn test_sync_then_replay_reconstructs_holders() {
    let db = Database::in_memory().unwrap();
    let report = sync_transfers(&StaticSource(events()), &db, token())
        .await
        .unwrap();
    assert_eq!(report.inserted, 3);

    let repo = TransferRepository::new(&db.conn);
    let ledger = load_ledger(&repo, &token(), &ReplayOptions::default()).unwrap();

    let mut holders = ledger.holders();
    sort_by_balance(&mut holders);
    let balances: Vec<(Address, U256)> = holders.iter().map(|h| (h.address, h.balance)).collect();
    assert_eq!(
        balances,
        vec![
            (address(ALICE), U256::from(600u64)),
            (address(BOB), U256::from(300u64)),
            (address(CAROL), U256::from(100u64)),
        ]
    );

    let buyers: Vec<Address> = buy_in_holders(&holders).iter().map(|h| h.address).collect();
    assert_eq!(buyers, vec![address(BOB), address(CAROL)]);

    let rows = distribution(&holders).unwrap();
    let dates: Vec<String> = rows.iter().map(|r| r.date.to_string()).collect();
    assert_eq!(dates, vec!["2021-06-12", "2021-06-13"]);

    let summary = summarize(&holders, &rows);
    assert_eq!(summary.buy_in_holders, 2);
    assert_eq!(summary.mint_only_holders, 1);
}

#[tokio::test]
async fn test_snapshot_from_stored_log() {
    let db = Database::in_memory().unwrap();
    sync_transfers(&StaticSource(events()), &db, token())
        .await
        .unwrap();

    let repo = TransferRepository::new(&db.conn);
    let ledger = load_ledger(&repo, &token(), &ReplayOptions::default()).unwrap();
    let terms = BuyInTerms {
        rate: 100.0,
        eth_price: 2000.0,
    };
    let snapshot = TreasurySnapshot::build(&ledger, token(), 0, &terms, None).unwrap();

    assert_eq!(snapshot.holder_count, 3);
    assert_eq!(snapshot.negative_balances, 0);
    assert_eq!(snapshot.holders[1].acquisition_amount.as_deref(), Some("400"));
    assert_eq!(snapshot.holders[1].buy_in_eth, Some(4.0));
    assert_eq!(snapshot.holders[1].buy_in_usd, Some(8000.0));
    assert_eq!(snapshot.distribution.len(), 2);

    let path = std::env::temp_dir().join(format!("buyin-snapshot-{}.json", std::process::id()));
    snapshot.write_to(&path).unwrap();
    let written = std::fs::read_to_string(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert_eq!(TreasurySnapshot::from_json(&written).unwrap().holder_count, 3);
}

#[test]
fn test_truncated_log_in_both_modes() {
    // The mint of the sender's tokens is missing from the log
    let partial = &events()[1..];

    let lenient = buyin_indexer::ledger::replay(partial, &ReplayOptions::default()).unwrap();
    assert_eq!(lenient.negative_balances().len(), 1);
    assert_eq!(lenient.holders().len(), 2);

    let strict = ReplayOptions {
        mode: LedgerMode::Strict,
        check_order: true,
    };
    assert!(buyin_indexer::ledger::replay(partial, &strict).is_err());
}

#[test]
fn test_same_block_transactions_keep_page_order_after_reload() {
    // Two transactions in one block, no logIndex, in Etherscan's page order
    let tx_a = format!("0x{}", "aa".repeat(32));
    let tx_b = format!("0x{}", "bb".repeat(32));
    let rows: Vec<RawTransfer> = serde_json::from_value(json!([
        {
            "blockNumber": "100", "timeStamp": "1623484800", "hash": tx_a,
            "from": ZERO, "to": ALICE, "value": "100"
        },
        {
            "blockNumber": "100", "timeStamp": "1623484800", "hash": tx_a,
            "from": ALICE, "to": BOB, "value": "10"
        },
        {
            "blockNumber": "100", "timeStamp": "1623484800", "hash": tx_b,
            "from": ALICE, "to": BOB, "value": "50"
        }
    ]))
    .unwrap();
    let events = parse_rows(&rows, false).unwrap();

    let db = Database::in_memory().unwrap();
    let repo = TransferRepository::new(&db.conn);
    repo.insert_batch(&token(), &events).unwrap();
    let reloaded = repo.load_ordered(&token()).unwrap();
    assert_eq!(reloaded, events);

    let ledger = load_ledger(&repo, &token(), &ReplayOptions::default()).unwrap();
    let positions: Vec<(u64, u64)> = reloaded.iter().map(|e| e.position()).collect();
    assert_eq!(positions, vec![(100, 0), (100, 1), (100, 2)]);

    let bob = ledger.acquisitions.get(&address(BOB)).unwrap();
    assert_eq!(bob.amount, U256::from(10u64));
    let mut holders = ledger.holders();
    sort_by_balance(&mut holders);
    let balances: Vec<(Address, U256)> = holders.iter().map(|h| (h.address, h.balance)).collect();
    assert_eq!(
        balances,
        vec![
            (address(BOB), U256::from(60u64)),
            (address(ALICE), U256::from(40u64)),
        ]
    );
}
