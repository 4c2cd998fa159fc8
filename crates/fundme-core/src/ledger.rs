use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::units::Wei;

pub type TxHash = [u8; 32];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error(
        "insufficient balance in account {account}: required {required}, available {available}"
    )]
    InsufficientBalance {
        account: Address,
        required: Wei,
        available: Wei,
    },
    #[error("balance of account {account} overflows")]
    Overflow { account: Address },
    #[error("transaction {} already applied", hex::encode(.0))]
    DuplicateTransaction(TxHash),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct BlockMeta {
    pub height: u64,
    pub previous_tx: Option<TxHash>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    Transfer {
        from: Address,
        to: Address,
        amount: Wei,
    },
    Fee { payer: Address, amount: Wei },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerMutation {
    Transfer {
        from: Address,
        to: Address,
        amount: Wei,
    },
    /// Gas payment, credited to the coinbase.
    Fee { payer: Address, amount: Wei },
}

/// Account balances of the development network.
///
/// Value is only ever moved, never created after genesis, so the sum of all
/// balances stays equal to [`Ledger::total_supply`].
#[derive(Clone, Debug, Default)]
pub struct Ledger {
    pub meta: BlockMeta,
    coinbase: Address,
    balances: BTreeMap<Address, Wei>,
    events: Vec<LedgerEvent>,
    applied: BTreeSet<TxHash>,
}

impl Ledger {
    pub fn new(coinbase: Address) -> Self {
        Ledger {
            coinbase,
            ..Default::default()
        }
    }

    /// Genesis allocation.
    pub fn allocate(&mut self, account: Address, amount: Wei) -> Result<(), LedgerError> {
        credit(&mut self.balances, &account, amount)
    }

    pub fn balance(&self, account: &Address) -> Wei {
        self.balances.get(account).copied().unwrap_or(0)
    }

    pub fn coinbase(&self) -> Address {
        self.coinbase
    }

    pub fn total_supply(&self) -> Wei {
        self.balances.values().sum()
    }

    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    /// Applies all mutations of one transaction, or none of them.
    pub fn apply(&mut self, mutations: &[LedgerMutation], tx: TxHash) -> Result<(), LedgerError> {
        if self.applied.contains(&tx) {
            return Err(LedgerError::DuplicateTransaction(tx));
        }

        let mut staged = self.balances.clone();
        let mut events = Vec::with_capacity(mutations.len());
        for mutation in mutations {
            match *mutation {
                LedgerMutation::Transfer { from, to, amount } => {
                    debit(&mut staged, &from, amount)?;
                    credit(&mut staged, &to, amount)?;
                    events.push(LedgerEvent::Transfer { from, to, amount });
                }
                LedgerMutation::Fee { payer, amount } => {
                    debit(&mut staged, &payer, amount)?;
                    credit(&mut staged, &self.coinbase, amount)?;
                    events.push(LedgerEvent::Fee { payer, amount });
                }
            }
        }

        self.balances = staged;
        self.events.extend(events);
        self.meta.height += 1;
        self.meta.previous_tx = Some(tx);
        self.applied.insert(tx);
        Ok(())
    }
}

fn credit(
    balances: &mut BTreeMap<Address, Wei>,
    account: &Address,
    amount: Wei,
) -> Result<(), LedgerError> {
    let balance = balances.entry(*account).or_insert(0);
    *balance = balance
        .checked_add(amount)
        .ok_or(LedgerError::Overflow { account: *account })?;
    Ok(())
}

fn debit(
    balances: &mut BTreeMap<Address, Wei>,
    account: &Address,
    amount: Wei,
) -> Result<(), LedgerError> {
    let available = balances.get(account).copied().unwrap_or(0);
    if available < amount {
        return Err(LedgerError::InsufficientBalance {
            account: *account,
            required: amount,
            available,
        });
    }
    balances.insert(*account, available - amount);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::from_bytes([byte; 20])
    }

    #[test]
    fn applying_mutations_moves_value_and_records_events() {
        let mut ledger = Ledger::new(addr(0xcb));
        ledger.allocate(addr(1), 10_000).unwrap();
        ledger
            .apply(
                &[
                    LedgerMutation::Fee {
                        payer: addr(1),
                        amount: 100,
                    },
                    LedgerMutation::Transfer {
                        from: addr(1),
                        to: addr(2),
                        amount: 1_000,
                    },
                ],
                [1u8; 32],
            )
            .unwrap();
        assert_eq!(ledger.balance(&addr(1)), 8_900);
        assert_eq!(ledger.balance(&addr(2)), 1_000);
        assert_eq!(ledger.balance(&addr(0xcb)), 100);
        assert_eq!(ledger.total_supply(), 10_000);
        assert_eq!(ledger.events().len(), 2);
        assert_eq!(ledger.meta.height, 1);
    }

    #[test]
    fn failed_transaction_leaves_balances_untouched() {
        let mut ledger = Ledger::new(addr(0xcb));
        ledger.allocate(addr(1), 500).unwrap();
        let err = ledger
            .apply(
                &[
                    LedgerMutation::Fee {
                        payer: addr(1),
                        amount: 100,
                    },
                    LedgerMutation::Transfer {
                        from: addr(1),
                        to: addr(2),
                        amount: 1_000,
                    },
                ],
                [2u8; 32],
            )
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientBalance {
                account: addr(1),
                required: 1_000,
                available: 400,
            }
        );
        assert_eq!(ledger.balance(&addr(1)), 500);
        assert_eq!(ledger.balance(&addr(0xcb)), 0);
        assert!(ledger.events().is_empty());
        assert_eq!(ledger.meta.height, 0);
    }

    #[test]
    fn duplicate_transaction_is_rejected() {
        let mut ledger = Ledger::new(addr(0xcb));
        ledger.allocate(addr(1), 500).unwrap();
        let transfer = [LedgerMutation::Transfer {
            from: addr(1),
            to: addr(2),
            amount: 1,
        }];
        ledger.apply(&transfer, [3u8; 32]).unwrap();
        assert_eq!(
            ledger.apply(&transfer, [3u8; 32]),
            Err(LedgerError::DuplicateTransaction([3u8; 32]))
        );
        assert_eq!(ledger.balance(&addr(2)), 1);
    }
}
