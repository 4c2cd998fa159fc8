//! Multi-actor withdrawal scenario.
//!
//! ```text
//! Idle -> Funding(k) -> Withdrawn -> Verified
//! ```
//!
//! Funding calls are submitted one after another, each confirmed before the next. A rejected call
//! aborts the scenario with [`ScenarioError`]; once the withdrawal is confirmed every
//! post-condition is checked and reported, failing or not.

use core::fmt;

use serde::Serialize;

use crate::address::Address;
use crate::target::{FundMeTarget, Receipt, TxError, WithdrawMethod};
use crate::units::Wei;
use crate::verify::{
    self, Check, ConservationInput, ConservationReport, Failure, InvalidRecord, Snapshot,
    TransactionRecord,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Funding { funded: usize },
    Withdrawn,
    Verified,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Idle => f.write_str("idle"),
            Phase::Funding { funded } => write!(f, "funding ({} funded)", funded),
            Phase::Withdrawn => f.write_str("withdrawn"),
            Phase::Verified => f.write_str("verified"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("scenario aborted while {phase}: call from {actor} failed: {source}")]
    Rejected {
        phase: Phase,
        actor: Address,
        #[source]
        source: TxError,
    },
    #[error("scenario aborted while {phase}: {source}")]
    Read {
        phase: Phase,
        #[source]
        source: TxError,
    },
    #[error(transparent)]
    InvalidRecord(#[from] InvalidRecord),
}

/// `N` actors each fund `amount`, then `owner` withdraws with `method`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalScenario {
    pub owner: Address,
    pub funders: Vec<Address>,
    pub amount: Wei,
    pub method: WithdrawMethod,
}

/// Result of measuring one withdrawal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Measurement {
    pub before: Snapshot,
    pub after: Snapshot,
    pub receipt: Receipt,
    pub conservation: ConservationReport,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioReport {
    pub phase: Phase,
    pub method: WithdrawMethod,
    pub measurement: Measurement,
    pub post_conditions: Vec<Check>,
}

impl ScenarioReport {
    pub fn passed(&self) -> bool {
        self.measurement.conservation.passed()
            && !self.post_conditions.iter().any(Check::is_failure)
    }

    pub fn checks(&self) -> impl Iterator<Item = &Check> + '_ {
        self.measurement
            .conservation
            .checks
            .iter()
            .chain(self.post_conditions.iter())
    }

    pub fn failures(&self) -> impl Iterator<Item = &Check> + '_ {
        self.checks().filter(|check| check.is_failure())
    }
}

/// Snapshots owner and target around a withdrawal and applies the conservation check.
pub fn measure_withdrawal<T: FundMeTarget + ?Sized>(
    target: &mut T,
    owner: &Address,
    method: WithdrawMethod,
) -> Result<Measurement, ScenarioError> {
    let contract = target.address().map_err(|source| ScenarioError::Read {
        phase: Phase::Idle,
        source,
    })?;
    let before = Snapshot::take(target, &contract, owner);
    let receipt = method
        .invoke(target, owner)
        .map_err(|source| ScenarioError::Rejected {
            phase: Phase::Withdrawn,
            actor: *owner,
            source,
        })?;
    let after = Snapshot::take(target, &contract, owner);

    let cost = verify::cost(&TransactionRecord::try_from(&receipt)?)?;
    let conservation = verify::verify(&ConservationInput::between(before, after, Some(cost)));
    log::debug!(
        "{} by {}: target {} -> {}, owner {} -> {}, cost {}",
        method.name(),
        owner,
        before.target,
        after.target,
        before.actor,
        after.actor,
        cost
    );
    Ok(Measurement {
        before,
        after,
        receipt,
        conservation,
    })
}

/// Checks that withdrawal cleared every funder's bookkeeping.
pub fn reset_checks<T: FundMeTarget + ?Sized>(
    target: &T,
    funders: &[Address],
) -> Result<Vec<Check>, ScenarioError> {
    let read_error = |source| ScenarioError::Read {
        phase: Phase::Withdrawn,
        source,
    };
    let mut checks = Vec::with_capacity(funders.len() + 1);
    let mut seen = Vec::with_capacity(funders.len());
    for funder in funders {
        if seen.contains(funder) {
            continue;
        }
        seen.push(*funder);
        let remaining = target
            .get_address_to_amount_funded(funder)
            .map_err(read_error)?;
        let result = if remaining == 0 {
            Ok(())
        } else {
            Err(Failure::NotReset {
                actor: *funder,
                remaining,
            })
        };
        checks.push(Check::from_result(
            format!("amount_funded_reset[{}]", funder),
            result,
        ));
    }

    let emptied = match target.get_funder(0) {
        Err(TxError::Reverted(_)) => Ok(()),
        Ok(first) => Err(Failure::FundersNotEmpty { first }),
        Err(other) => return Err(read_error(other)),
    };
    checks.push(Check::from_result("funders_reset", emptied));
    Ok(checks)
}

impl WithdrawalScenario {
    pub fn run<T: FundMeTarget + ?Sized>(
        &self,
        target: &mut T,
    ) -> Result<ScenarioReport, ScenarioError> {
        let mut phase = Phase::Idle;
        for funder in &self.funders {
            target
                .fund(funder, self.amount)
                .map_err(|source| ScenarioError::Rejected {
                    phase,
                    actor: *funder,
                    source,
                })?;
            phase = Phase::Funding {
                funded: match phase {
                    Phase::Funding { funded } => funded + 1,
                    _ => 1,
                },
            };
        }
        log::debug!(
            "{} actors funded {} wei each",
            self.funders.len(),
            self.amount
        );

        let measurement = measure_withdrawal(target, &self.owner, self.method)?;
        let post_conditions = reset_checks(target, &self.funders)?;
        let report = ScenarioReport {
            phase: Phase::Verified,
            method: self.method,
            measurement,
            post_conditions,
        };
        if !report.passed() {
            for failure in report.failures() {
                log::warn!("{}", failure);
            }
        }
        Ok(report)
    }
}
