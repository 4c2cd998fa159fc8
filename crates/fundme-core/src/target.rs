//! The interface of the contract under test.
//!
//! Everything the harness knows about FundMe goes through [`FundMeTarget`]; balances are read
//! through [`BalanceSource`]. Calls that change state take the calling account explicitly, which
//! is the harness's version of connecting a contract handle to a signer.

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::ledger::{LedgerError, TxHash};
use crate::units::Wei;

/// Revert reason of a funding call below the minimum.
pub const INSUFFICIENT_FUNDS_REASON: &str = "Didn't send enough!";

/// Name of the custom error raised by the owner-only guard.
pub const NOT_OWNER_ERROR: &str = "FundMe__NotOwner";

/// A contract-level rejection. State is unchanged after any of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Revert {
    #[error("reverted with reason string '{}'", INSUFFICIENT_FUNDS_REASON)]
    InsufficientFunds,
    #[error("reverted with custom error '{}()'", NOT_OWNER_ERROR)]
    NotOwner,
    #[error("reverted with panic: funder index {index} out of bounds (length {len})")]
    OutOfRange { index: usize, len: usize },
}

impl Revert {
    /// The `require` message, if the revert carries one.
    pub fn reason(&self) -> Option<&'static str> {
        match self {
            Revert::InsufficientFunds => Some(INSUFFICIENT_FUNDS_REASON),
            Revert::NotOwner | Revert::OutOfRange { .. } => None,
        }
    }

    /// The custom error name, if the revert is a custom error.
    pub fn custom_error(&self) -> Option<&'static str> {
        match self {
            Revert::NotOwner => Some(NOT_OWNER_ERROR),
            Revert::InsufficientFunds | Revert::OutOfRange { .. } => None,
        }
    }
}

/// Why a call produced no confirmed result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TxError {
    #[error("transaction {0}")]
    Reverted(#[from] Revert),
    #[error("sender {account} cannot pay {required} wei (has {available})")]
    InsufficientBalance {
        account: Address,
        required: Wei,
        available: Wei,
    },
    #[error("unknown account {0}")]
    UnknownAccount(Address),
    #[error("no account at index {0}")]
    AccountIndex(usize),
    #[error("invalid signature from {0}")]
    InvalidSignature(Address),
    #[error("FundMe is not deployed")]
    NotDeployed,
    #[error("no contract deployed at {0}")]
    NoContract(Address),
    #[error("ledger rejected the transaction: {0}")]
    Ledger(LedgerError),
}

impl From<LedgerError> for TxError {
    fn from(value: LedgerError) -> Self {
        match value {
            LedgerError::InsufficientBalance {
                account,
                required,
                available,
            } => TxError::InsufficientBalance {
                account,
                required,
                available,
            },
            other => TxError::Ledger(other),
        }
    }
}

/// Confirmation of an included transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    #[serde(with = "crate::serde_hex")]
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub from: Address,
    pub to: Address,
    pub gas_used: u64,
    pub gas_price: Wei,
}

/// Reads authoritative balances. Implementations must not cache.
pub trait BalanceSource {
    fn balance_of(&self, account: &Address) -> Wei;
}

pub trait FundMeTarget: BalanceSource {
    /// Address holding the funded value.
    fn address(&self) -> Result<Address, TxError>;
    fn get_owner(&self) -> Result<Address, TxError>;
    fn get_price_feed(&self) -> Result<Address, TxError>;
    fn get_funder(&self, index: usize) -> Result<Address, TxError>;
    fn get_address_to_amount_funded(&self, funder: &Address) -> Result<Wei, TxError>;

    fn fund(&mut self, from: &Address, value: Wei) -> Result<Receipt, TxError>;
    fn withdraw(&mut self, from: &Address) -> Result<Receipt, TxError>;
    /// Same observable effects as [`FundMeTarget::withdraw`], cheaper in gas.
    fn cheaper_withdraw(&mut self, from: &Address) -> Result<Receipt, TxError>;
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawMethod {
    Standard,
    Cheaper,
}

impl WithdrawMethod {
    pub fn invoke<T: FundMeTarget + ?Sized>(
        self,
        target: &mut T,
        from: &Address,
    ) -> Result<Receipt, TxError> {
        match self {
            WithdrawMethod::Standard => target.withdraw(from),
            WithdrawMethod::Cheaper => target.cheaper_withdraw(from),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            WithdrawMethod::Standard => "withdraw",
            WithdrawMethod::Cheaper => "cheaperWithdraw",
        }
    }
}
