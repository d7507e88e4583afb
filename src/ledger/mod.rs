//! Holder-balance reconstruction from an ordered transfer log.
//!
//! [`replay`] walks the log once and feeds each event to both the
//! [`BalanceLedger`] and the [`FirstAcquisitionIndex`], so both see exactly
//! the same ordering. The result is frozen; a new snapshot always replays
//! from an empty ledger.
//!
//! Correctness depends on receiving the complete log. A truncated log cannot
//! be detected here and typically shows up as negative final balances.

pub mod acquisitions;
pub mod balances;
pub mod projection;

pub use acquisitions::{AcquisitionRecord, FirstAcquisitionIndex};
pub use balances::BalanceLedger;
pub use projection::{
    BuyInSummary, DistributionRow, Holder, buy_in_holders, distribution, project,
    sort_by_acquisition, sort_by_balance, summarize, top_holders,
};

use crate::error::LedgerError;
use crate::events::TransferEvent;
use alloy_primitives::{Address, I256};
use std::str::FromStr;
use tracing::debug;

/// How to treat a balance that drops below zero during replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LedgerMode {
    /// Fail on the first event that drives a balance negative.
    Strict,
    /// Keep going and report negative balances afterwards.
    #[default]
    Lenient,
}

impl FromStr for LedgerMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "strict" => Ok(LedgerMode::Strict),
            "lenient" => Ok(LedgerMode::Lenient),
            other => Err(anyhow::anyhow!(
                "Unknown ledger mode '{}', expected 'strict' or 'lenient'",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayOptions {
    pub mode: LedgerMode,
    /// Reject events whose timestamp or chain position goes backwards.
    pub check_order: bool,
}

/// Balances and acquisition records built from one pass over a log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    pub balances: BalanceLedger,
    pub acquisitions: FirstAcquisitionIndex,
    pub event_count: usize,
}

impl Ledger {
    /// Every address with a positive balance, in no particular order.
    pub fn holders(&self) -> Vec<Holder> {
        project(&self.balances, &self.acquisitions)
    }

    pub fn negative_balances(&self) -> Vec<(Address, I256)> {
        self.balances.negative_balances()
    }
}

pub fn replay(events: &[TransferEvent], options: &ReplayOptions) -> Result<Ledger, LedgerError> {
    let mut ledger = Ledger::default();
    let mut previous: Option<&TransferEvent> = None;

    for (index, event) in events.iter().enumerate() {
        if options.check_order {
            if let Some(prev) = previous {
                check_order(index, prev, event)?;
            }
            previous = Some(event);
        }

        ledger.balances.apply(index, event)?;
        ledger.acquisitions.observe(event);

        if options.mode == LedgerMode::Strict && !event.is_mint() {
            let balance = ledger.balances.balance_of(&event.from);
            if balance.is_negative() {
                return Err(LedgerError::NegativeBalance {
                    address: event.from,
                    balance,
                    index,
                });
            }
        }
    }

    ledger.event_count = events.len();
    debug!(
        "Replayed {} events: {} addresses, {} acquisition records",
        ledger.event_count,
        ledger.balances.len(),
        ledger.acquisitions.len()
    );

    Ok(ledger)
}

fn check_order(index: usize, prev: &TransferEvent, event: &TransferEvent) -> Result<(), LedgerError> {
    if event.timestamp < prev.timestamp {
        return Err(LedgerError::OutOfOrder {
            index,
            previous: format!("timestamp {}", prev.timestamp),
            current: format!("timestamp {}", event.timestamp),
        });
    }
    if event.position() < prev.position() {
        return Err(LedgerError::OutOfOrder {
            index,
            previous: format!("block {} log {}", prev.block_number, prev.log_index),
            current: format!("block {} log {}", event.block_number, event.log_index),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;

    fn addr(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    fn signed(value: i64) -> I256 {
        I256::try_from(value).unwrap()
    }

    fn transfer(from: Address, to: Address, value: u64, timestamp: u64) -> TransferEvent {
        TransferEvent::new(from, to, U256::from(value), timestamp)
    }

    fn lenient() -> ReplayOptions {
        ReplayOptions::default()
    }

    fn scenario_a() -> Vec<TransferEvent> {
        vec![
            transfer(Address::ZERO, addr(0xa), 1000, 1),
            transfer(addr(0xa), addr(0xb), 400, 2),
            transfer(addr(0xb), addr(0xc), 100, 3),
        ]
    }

    #[test]
    fn test_scenario_a() {
        let ledger = replay(&scenario_a(), &lenient()).unwrap();

        assert_eq!(ledger.balances.balance_of(&addr(0xa)), signed(600));
        assert_eq!(ledger.balances.balance_of(&addr(0xb)), signed(300));
        assert_eq!(ledger.balances.balance_of(&addr(0xc)), signed(100));

        let b = ledger.acquisitions.get(&addr(0xb)).unwrap();
        assert_eq!((b.amount, b.timestamp), (U256::from(400u64), 2));
        let c = ledger.acquisitions.get(&addr(0xc)).unwrap();
        assert_eq!((c.amount, c.timestamp), (U256::from(100u64), 3));
        assert!(ledger.acquisitions.get(&addr(0xa)).is_none());

        let mut holders = ledger.holders();
        sort_by_balance(&mut holders);
        let summary: Vec<(Address, U256, Option<u64>)> = holders
            .iter()
            .map(|h| (h.address, h.balance, h.acquisition_timestamp()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (addr(0xa), U256::from(600u64), None),
                (addr(0xb), U256::from(300u64), Some(2)),
                (addr(0xc), U256::from(100u64), Some(3)),
            ]
        );

        let buy_in: Vec<Address> = buy_in_holders(&holders).iter().map(|h| h.address).collect();
        assert_eq!(buy_in, vec![addr(0xb), addr(0xc)]);
    }

    #[test]
    fn test_scenario_b() {
        let events = vec![
            transfer(Address::ZERO, addr(0xa), 500, 1),
            transfer(addr(0xa), addr(0xb), 500, 2),
            transfer(addr(0xb), Address::ZERO, 500, 3),
        ];
        let ledger = replay(&events, &lenient()).unwrap();

        assert_eq!(ledger.balances.balance_of(&addr(0xa)), I256::ZERO);
        assert_eq!(ledger.balances.balance_of(&addr(0xb)), I256::ZERO);
        assert!(ledger.holders().is_empty());
        // B still has its record, it just no longer holds anything
        assert!(ledger.acquisitions.contains(&addr(0xb)));
    }

    #[test]
    fn test_scenario_c_same_day_grouping() {
        let events = vec![
            transfer(Address::ZERO, addr(0xa), 1000, 1_623_400_000),
            transfer(addr(0xa), addr(0xb), 100, 1_623_484_800),
            transfer(addr(0xa), addr(0xc), 250, 1_623_533_400),
        ];
        let ledger = replay(&events, &lenient()).unwrap();
        let rows = distribution(&ledger.holders()).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].date.to_string(), "2021-06-12");
        assert_eq!(rows[0].holder_count, 2);
        assert_eq!(rows[0].total, U256::from(350u64));
    }

    #[test]
    fn test_conservation() {
        let events = vec![
            transfer(Address::ZERO, addr(1), 1000, 1),
            transfer(Address::ZERO, addr(2), 300, 2),
            transfer(addr(1), addr(2), 250, 3),
            transfer(addr(2), addr(3), 400, 4),
            transfer(addr(3), Address::ZERO, 150, 5),
            transfer(addr(1), Address::ZERO, 50, 6),
            transfer(addr(4), addr(5), 70, 7),
        ];
        let ledger = replay(&events, &lenient()).unwrap();

        assert_eq!(ledger.balances.total_minted(), U256::from(1300u64));
        assert_eq!(ledger.balances.total_burned(), U256::from(200u64));
        assert_eq!(ledger.balances.total(), ledger.balances.net_supply());
        assert_eq!(ledger.balances.total(), Some(signed(1100)));
    }

    #[test]
    fn test_replay_is_idempotent() {
        let events = scenario_a();
        let first = replay(&events, &lenient()).unwrap();
        let second = replay(&events, &lenient()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_projection_excludes_non_positive_even_with_record() {
        let events = vec![
            transfer(Address::ZERO, addr(1), 100, 1),
            transfer(addr(1), addr(2), 100, 2),
            transfer(addr(2), addr(3), 100, 3),
            transfer(addr(4), addr(5), 20, 4),
        ];
        let ledger = replay(&events, &lenient()).unwrap();
        let holders: Vec<Address> = ledger.holders().iter().map(|h| h.address).collect();

        assert!(ledger.acquisitions.contains(&addr(2)));
        assert!(!holders.contains(&addr(2)));
        assert!(!holders.contains(&addr(4)));
        assert!(holders.contains(&addr(3)));
        assert_eq!(ledger.negative_balances(), vec![(addr(4), signed(-20))]);
    }

    #[test]
    fn test_empty_input() {
        let ledger = replay(&[], &lenient()).unwrap();
        assert!(ledger.balances.is_empty());
        assert!(ledger.acquisitions.is_empty());
        assert!(ledger.holders().is_empty());
        assert_eq!(ledger.event_count, 0);
    }

    #[test]
    fn test_strict_mode_rejects_negative_running_balance() {
        let events = vec![
            transfer(Address::ZERO, addr(1), 10, 1),
            transfer(addr(1), addr(2), 15, 2),
        ];
        let options = ReplayOptions {
            mode: LedgerMode::Strict,
            check_order: false,
        };

        assert_eq!(
            replay(&events, &options),
            Err(LedgerError::NegativeBalance {
                address: addr(1),
                balance: signed(-5),
                index: 1,
            })
        );
        assert!(replay(&events, &lenient()).is_ok());
    }

    #[test]
    fn test_order_check() {
        let events = vec![
            transfer(Address::ZERO, addr(1), 10, 5).at(100, 0),
            transfer(addr(1), addr(2), 5, 4).at(101, 0),
        ];
        let options = ReplayOptions {
            mode: LedgerMode::Lenient,
            check_order: true,
        };
        assert!(matches!(
            replay(&events, &options),
            Err(LedgerError::OutOfOrder { index: 1, .. })
        ));

        let events = vec![
            transfer(Address::ZERO, addr(1), 10, 5).at(100, 3),
            transfer(addr(1), addr(2), 5, 5).at(100, 1),
        ];
        assert!(matches!(
            replay(&events, &options),
            Err(LedgerError::OutOfOrder { index: 1, .. })
        ));

        // Unchecked replay does not look at ordering at all
        assert!(replay(&events, &lenient()).is_ok());
    }

    #[test]
    fn test_ledger_mode_from_str() {
        assert_eq!("STRICT".parse::<LedgerMode>().unwrap(), LedgerMode::Strict);
        assert_eq!("lenient".parse::<LedgerMode>().unwrap(), LedgerMode::Lenient);
        assert!("loose".parse::<LedgerMode>().is_err());
    }
}
