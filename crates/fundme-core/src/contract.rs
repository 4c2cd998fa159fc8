//! Simulated FundMe contract and mock price feed hosted by the development network.
//!
//! The contract state here holds no value itself: the funded value lives in the ledger at the
//! contract's address, exactly as an account balance would on a real chain.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::target::Revert;
use crate::units::{Wei, WEI_PER_ETHER};

/// Gas schedule of the simulated calls.
pub mod gas {
    pub const TX_BASE: u64 = 21_000;
    pub const SLOAD: u64 = 2_100;
    pub const SSTORE_SET: u64 = 20_000;
    pub const SSTORE_RESET: u64 = 2_900;
    pub const SSTORE_NOOP: u64 = 100;
    pub const MLOAD: u64 = 3;
    pub const STATICCALL: u64 = 2_600;
    pub const VALUE_CALL: u64 = 9_000;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasMeter {
    used: u64,
}

impl GasMeter {
    pub fn new() -> Self {
        GasMeter { used: gas::TX_BASE }
    }

    pub fn used(&self) -> u64 {
        self.used
    }

    fn charge(&mut self, amount: u64) {
        self.used = self.used.saturating_add(amount);
    }

    fn sload(&mut self) {
        self.charge(gas::SLOAD);
    }

    fn sstore(&mut self, old: u128, new: u128) {
        let cost = if old == new {
            gas::SSTORE_NOOP
        } else if old == 0 {
            gas::SSTORE_SET
        } else {
            gas::SSTORE_RESET
        };
        self.charge(cost);
    }

    fn mload(&mut self) {
        self.charge(gas::MLOAD);
    }

    fn staticcall(&mut self) {
        self.charge(gas::STATICCALL);
    }

    fn value_call(&mut self) {
        self.charge(gas::VALUE_CALL);
    }
}

impl Default for GasMeter {
    fn default() -> Self {
        GasMeter::new()
    }
}

/// Price feed returning a settable answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MockV3Aggregator {
    pub decimals: u8,
    answer: i128,
    round_id: u64,
}

impl MockV3Aggregator {
    pub fn new(decimals: u8, initial_answer: i128) -> Self {
        MockV3Aggregator {
            decimals,
            answer: initial_answer,
            round_id: 1,
        }
    }

    pub fn update_answer(&mut self, answer: i128) {
        self.answer = answer;
        self.round_id += 1;
    }

    /// `(round_id, answer)` of the latest round.
    pub fn latest_round_data(&self) -> (u64, i128) {
        (self.round_id, self.answer)
    }

    /// `10^decimals`, or `None` when it does not fit in a `u128`.
    pub fn scale(&self) -> Option<Wei> {
        10u128.checked_pow(u32::from(self.decimals))
    }

    /// USD value (18 decimals) of `eth_amount` wei at the latest answer.
    ///
    /// A non-positive answer, or a scale too large to represent, values everything at zero.
    pub fn conversion_rate(&self, eth_amount: Wei) -> Wei {
        let (_, answer) = self.latest_round_data();
        if answer <= 0 {
            return 0;
        }
        let Some(scale) = self.scale() else {
            return 0;
        };
        let price = answer as u128;
        match eth_amount.checked_mul(price) {
            Some(product) => product / scale,
            // eth_amount * price exceeds 2^128 while scale is at most 10^38
            None => Wei::MAX,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundMe {
    owner: Address,
    price_feed: Address,
    address_to_amount_funded: BTreeMap<Address, Wei>,
    funders: Vec<Address>,
}

impl FundMe {
    pub const MINIMUM_USD: Wei = 50 * WEI_PER_ETHER;

    pub fn new(owner: Address, price_feed: Address) -> Self {
        FundMe {
            owner,
            price_feed,
            address_to_amount_funded: BTreeMap::new(),
            funders: Vec::new(),
        }
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn price_feed(&self) -> Address {
        self.price_feed
    }

    pub fn funder(&self, index: usize) -> Result<Address, Revert> {
        self.funders.get(index).copied().ok_or(Revert::OutOfRange {
            index,
            len: self.funders.len(),
        })
    }

    pub fn funders(&self) -> &[Address] {
        &self.funders
    }

    pub fn amount_funded(&self, funder: &Address) -> Wei {
        self.address_to_amount_funded
            .get(funder)
            .copied()
            .unwrap_or(0)
    }

    /// Smallest value in wei accepted by [`FundMe::fund`] at the feed's current answer.
    ///
    /// `None` when the feed cannot price anything, or the bound does not fit in a `u128`.
    pub fn minimum_wei(&self, feed: &MockV3Aggregator) -> Option<Wei> {
        let (_, answer) = feed.latest_round_data();
        if answer <= 0 {
            return None;
        }
        let price = answer as u128;
        let numerator = Self::MINIMUM_USD.checked_mul(feed.scale()?)?;
        Some(numerator.checked_add(price - 1)? / price)
    }

    pub fn fund(
        &mut self,
        sender: Address,
        value: Wei,
        feed: &MockV3Aggregator,
        meter: &mut GasMeter,
    ) -> Result<(), Revert> {
        meter.sload();
        meter.staticcall();
        if feed.conversion_rate(value) < Self::MINIMUM_USD {
            return Err(Revert::InsufficientFunds);
        }

        let funded = self.address_to_amount_funded.entry(sender).or_insert(0);
        let updated = funded.saturating_add(value);
        meter.sstore(*funded, updated);
        *funded = updated;

        let len = self.funders.len() as u128;
        meter.sload();
        meter.sstore(len, len + 1);
        meter.sstore(0, 1);
        self.funders.push(sender);
        Ok(())
    }

    fn only_owner(&self, sender: &Address, meter: &mut GasMeter) -> Result<(), Revert> {
        meter.sload();
        if *sender != self.owner {
            return Err(Revert::NotOwner);
        }
        Ok(())
    }

    fn reset_funder(&mut self, funder: Address, meter: &mut GasMeter) {
        let funded = self.address_to_amount_funded.entry(funder).or_insert(0);
        meter.sstore(*funded, 0);
        *funded = 0;
    }

    fn clear_funders(&mut self, meter: &mut GasMeter) {
        meter.sstore(self.funders.len() as u128, 0);
        self.funders.clear();
    }

    /// Clears funder bookkeeping. The caller moves the contract balance to the owner.
    ///
    /// Re-reads the funder count from storage on every iteration.
    pub fn withdraw(&mut self, sender: &Address, meter: &mut GasMeter) -> Result<(), Revert> {
        self.only_owner(sender, meter)?;
        let mut index = 0;
        loop {
            meter.sload();
            if index >= self.funders.len() {
                break;
            }
            meter.sload();
            let funder = self.funders[index];
            self.reset_funder(funder, meter);
            index += 1;
        }
        self.clear_funders(meter);
        meter.value_call();
        Ok(())
    }

    /// [`FundMe::withdraw`] with the funder list copied to memory once.
    pub fn cheaper_withdraw(
        &mut self,
        sender: &Address,
        meter: &mut GasMeter,
    ) -> Result<(), Revert> {
        self.only_owner(sender, meter)?;
        meter.sload();
        let funders = self.funders.clone();
        for funder in funders {
            meter.sload();
            meter.mload();
            self.reset_funder(funder, meter);
        }
        self.clear_funders(meter);
        meter.value_call();
        Ok(())
    }
}
