//! Balance snapshots, transaction cost and the conservation check.
//!
//! Around a withdrawal by the owner the harness requires
//!
//! ```text
//! target_before + actor_before == actor_after + cost
//! target_after == 0
//! ```
//!
//! where `cost` is what the actor paid to have the transaction processed. Every check produces a
//! [`Check`] entry instead of stopping at the first failure, so one run reports everything that
//! went wrong.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::target::{BalanceSource, Receipt};
use crate::units::Wei;

/// Current balance of `entity`, read at the moment of the call.
pub fn snapshot<S: BalanceSource + ?Sized>(source: &S, entity: &Address) -> Wei {
    source.balance_of(entity)
}

/// Balances of the target and the acting account at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub target: Wei,
    pub actor: Wei,
}

impl Snapshot {
    pub fn take<S: BalanceSource + ?Sized>(source: &S, target: &Address, actor: &Address) -> Self {
        Snapshot {
            target: snapshot(source, target),
            actor: snapshot(source, actor),
        }
    }
}

/// Resources consumed by a transaction, as reported by whoever ran it.
///
/// Fields are signed and optional because records may come from outside (e.g. a JSON file);
/// [`cost`] rejects anything that is not a well-formed, non-negative pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub gas_used: Option<i128>,
    pub gas_price: Option<i128>,
}

impl TryFrom<&Receipt> for TransactionRecord {
    type Error = InvalidRecord;

    fn try_from(receipt: &Receipt) -> Result<Self, Self::Error> {
        let gas_price = i128::try_from(receipt.gas_price).map_err(|_| InvalidRecord {
            field: "gasPrice",
            problem: RecordProblem::Overflow,
        })?;
        Ok(TransactionRecord {
            gas_used: Some(i128::from(receipt.gas_used)),
            gas_price: Some(gas_price),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordProblem {
    Missing,
    Negative,
    Overflow,
}

impl fmt::Display for RecordProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RecordProblem::Missing => "missing",
            RecordProblem::Negative => "negative",
            RecordProblem::Overflow => "too large",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid transaction record: {field} is {problem}")]
pub struct InvalidRecord {
    pub field: &'static str,
    pub problem: RecordProblem,
}

fn non_negative(field: &'static str, value: Option<i128>) -> Result<u128, InvalidRecord> {
    let value = value.ok_or(InvalidRecord {
        field,
        problem: RecordProblem::Missing,
    })?;
    u128::try_from(value).map_err(|_| InvalidRecord {
        field,
        problem: RecordProblem::Negative,
    })
}

/// `gas_used * gas_price`.
pub fn cost(record: &TransactionRecord) -> Result<Wei, InvalidRecord> {
    let units = non_negative("gasUsed", record.gas_used)?;
    let price = non_negative("gasPrice", record.gas_price)?;
    units.checked_mul(price).ok_or(InvalidRecord {
        field: "gasUsed * gasPrice",
        problem: RecordProblem::Overflow,
    })
}

/// Which side of the conservation equation is larger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// `target_before + actor_before`: value went missing.
    Before,
    /// `actor_after + cost`: value appeared from nowhere.
    After,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Failure {
    TargetNotDrained {
        remaining: Wei,
    },
    Imbalance {
        before_total: Wei,
        after_total: Wei,
        larger: Side,
        delta: Wei,
    },
    Overflow {
        side: Side,
    },
    NotReset {
        actor: Address,
        remaining: Wei,
    },
    FundersNotEmpty {
        first: Address,
    },
    BalanceChanged {
        entity: Address,
        before: Wei,
        after: Wei,
    },
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::TargetNotDrained { remaining } => {
                write!(f, "target still holds {} wei", remaining)
            }
            Failure::Imbalance {
                before_total,
                after_total,
                larger,
                delta,
            } => {
                let lost = match larger {
                    Side::Before => "lost",
                    Side::After => "created",
                };
                write!(
                    f,
                    "target_before + actor_before = {}, actor_after + cost = {}: {} wei {}",
                    before_total, after_total, delta, lost
                )
            }
            Failure::Overflow { side } => write!(f, "sum of the {:?} side overflows", side),
            Failure::NotReset { actor, remaining } => {
                write!(f, "{} still recorded as funding {} wei", actor, remaining)
            }
            Failure::FundersNotEmpty { first } => {
                write!(f, "funder list not empty, index 0 is {}", first)
            }
            Failure::BalanceChanged {
                entity,
                before,
                after,
            } => write!(f, "balance of {} changed from {} to {}", entity, before, after),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Passed,
    Failed { failure: Failure },
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Check {
    pub name: String,
    pub outcome: Outcome,
}

impl Check {
    pub fn passed(name: impl Into<String>) -> Self {
        Check {
            name: name.into(),
            outcome: Outcome::Passed,
        }
    }

    pub fn failed(name: impl Into<String>, failure: Failure) -> Self {
        Check {
            name: name.into(),
            outcome: Outcome::Failed { failure },
        }
    }

    pub fn skipped(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Check {
            name: name.into(),
            outcome: Outcome::Skipped {
                reason: reason.into(),
            },
        }
    }

    pub fn from_result(name: impl Into<String>, result: Result<(), Failure>) -> Self {
        match result {
            Ok(()) => Check::passed(name),
            Err(failure) => Check::failed(name, failure),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, Outcome::Failed { .. })
    }

    pub fn failure(&self) -> Option<&Failure> {
        match &self.outcome {
            Outcome::Failed { failure } => Some(failure),
            _ => None,
        }
    }
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            Outcome::Passed => write!(f, "ok      {}", self.name),
            Outcome::Failed { failure } => write!(f, "FAILED  {}: {}", self.name, failure),
            Outcome::Skipped { reason } => write!(f, "skipped {} ({})", self.name, reason),
        }
    }
}

/// Inputs of the conservation check. `cost` is `None` when the actor did not pay for the
/// operation being checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConservationInput {
    pub target_before: Wei,
    pub actor_before: Wei,
    pub target_after: Wei,
    pub actor_after: Wei,
    pub cost: Option<Wei>,
}

impl ConservationInput {
    pub fn between(before: Snapshot, after: Snapshot, cost: Option<Wei>) -> Self {
        ConservationInput {
            target_before: before.target,
            actor_before: before.actor,
            target_after: after.target,
            actor_after: after.actor,
            cost,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConservationReport {
    pub input: ConservationInput,
    pub checks: Vec<Check>,
}

impl ConservationReport {
    pub fn passed(&self) -> bool {
        !self.checks.iter().any(Check::is_failure)
    }

    pub fn failures(&self) -> impl Iterator<Item = &Check> + '_ {
        self.checks.iter().filter(|check| check.is_failure())
    }
}

/// Balances plus the raw record of the transaction that moved them, as read by `fundme check`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRequest {
    pub target_before: Wei,
    pub actor_before: Wei,
    pub target_after: Wei,
    pub actor_after: Wei,
    #[serde(default)]
    pub record: Option<TransactionRecord>,
}

impl CheckRequest {
    pub fn evaluate(&self) -> Result<ConservationReport, InvalidRecord> {
        let cost = self.record.as_ref().map(cost).transpose()?;
        Ok(verify(&ConservationInput {
            target_before: self.target_before,
            actor_before: self.actor_before,
            target_after: self.target_after,
            actor_after: self.actor_after,
            cost,
        }))
    }
}

pub const TARGET_DRAINED: &str = "target_drained";
pub const VALUE_CONSERVED: &str = "value_conserved";
pub const BALANCES_NON_NEGATIVE: &str = "balances_non_negative";

fn conserved(input: &ConservationInput, cost: Wei) -> Result<(), Failure> {
    let before_total = input
        .target_before
        .checked_add(input.actor_before)
        .ok_or(Failure::Overflow { side: Side::Before })?;
    let after_total = input
        .actor_after
        .checked_add(cost)
        .ok_or(Failure::Overflow { side: Side::After })?;
    if before_total == after_total {
        return Ok(());
    }
    let (larger, delta) = if before_total > after_total {
        (Side::Before, before_total - after_total)
    } else {
        (Side::After, after_total - before_total)
    };
    Err(Failure::Imbalance {
        before_total,
        after_total,
        larger,
        delta,
    })
}

/// Applies the conservation law to `input`.
pub fn verify(input: &ConservationInput) -> ConservationReport {
    let mut checks = Vec::with_capacity(3);
    match input.cost {
        Some(cost) => {
            let drained = if input.target_after == 0 {
                Ok(())
            } else {
                Err(Failure::TargetNotDrained {
                    remaining: input.target_after,
                })
            };
            checks.push(Check::from_result(TARGET_DRAINED, drained));
            checks.push(Check::from_result(VALUE_CONSERVED, conserved(input, cost)));
        }
        None => {
            checks.push(Check::skipped(TARGET_DRAINED, "no withdrawal cost recorded"));
            checks.push(Check::skipped(VALUE_CONSERVED, "no withdrawal cost recorded"));
        }
    }
    // Balances are unsigned, a negative one cannot be represented.
    checks.push(Check::passed(BALANCES_NON_NEGATIVE));
    ConservationReport {
        input: *input,
        checks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(
        target_before: Wei,
        actor_before: Wei,
        target_after: Wei,
        actor_after: Wei,
        cost: Option<Wei>,
    ) -> ConservationInput {
        ConservationInput {
            target_before,
            actor_before,
            target_after,
            actor_after,
            cost,
        }
    }

    fn record(gas_used: Option<i128>, gas_price: Option<i128>) -> TransactionRecord {
        TransactionRecord {
            gas_used,
            gas_price,
        }
    }

    #[test]
    fn cost_multiplies_units_by_price() {
        let record = record(Some(52_000), Some(1_000_000_000));
        assert_eq!(cost(&record), Ok(52_000_000_000_000));
    }

    #[test]
    fn cost_rejects_malformed_records() {
        assert_eq!(
            cost(&record(None, Some(1))),
            Err(InvalidRecord {
                field: "gasUsed",
                problem: RecordProblem::Missing,
            })
        );
        assert_eq!(
            cost(&record(Some(1), Some(-1))),
            Err(InvalidRecord {
                field: "gasPrice",
                problem: RecordProblem::Negative,
            })
        );
        let huge = record(Some(i128::MAX), Some(4));
        assert_eq!(cost(&huge).unwrap_err().problem, RecordProblem::Overflow);
    }

    #[test]
    fn receipt_with_unrepresentable_price_is_an_overflow() {
        let mut receipt = Receipt {
            tx_hash: [0u8; 32],
            block_number: 1,
            from: Address::ZERO,
            to: Address::ZERO,
            gas_used: 21_000,
            gas_price: Wei::MAX,
        };
        assert_eq!(
            TransactionRecord::try_from(&receipt),
            Err(InvalidRecord {
                field: "gasPrice",
                problem: RecordProblem::Overflow,
            })
        );
        receipt.gas_price = 1_000_000_000;
        let record = TransactionRecord::try_from(&receipt).unwrap();
        assert_eq!(cost(&record), Ok(21_000_000_000_000));
    }

    #[test]
    fn withdrawal_that_conserves_value_passes() {
        let report = verify(&input(1_000, 5_000, 0, 5_900, Some(100)));
        assert!(report.passed());
        assert_eq!(report.checks.len(), 3);
    }

    #[test]
    fn leftover_target_balance_is_reported() {
        let report = verify(&input(1_010, 5_000, 10, 5_910, Some(100)));
        let failures: Vec<_> = report.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].name, TARGET_DRAINED);
        assert_eq!(
            failures[0].failure(),
            Some(&Failure::TargetNotDrained { remaining: 10 })
        );
    }

    #[test]
    fn imbalance_names_the_larger_side_and_delta() {
        let report = verify(&input(1_000, 5_000, 0, 5_800, Some(100)));
        let failure = report.failures().next().and_then(Check::failure).cloned();
        assert_eq!(
            failure,
            Some(Failure::Imbalance {
                before_total: 6_000,
                after_total: 5_900,
                larger: Side::Before,
                delta: 100,
            })
        );

        let report = verify(&input(1_000, 5_000, 0, 6_000, Some(100)));
        let failure = report.failures().next().and_then(Check::failure).cloned();
        assert!(matches!(
            failure,
            Some(Failure::Imbalance {
                larger: Side::After,
                delta: 100,
                ..
            })
        ));
    }

    #[test]
    fn both_failures_are_reported_together() {
        let report = verify(&input(1_000, 5_000, 7, 1, Some(100)));
        assert_eq!(report.failures().count(), 2);
    }

    #[test]
    fn missing_cost_skips_equality() {
        let report = verify(&input(0, 5_000, 1_000, 3_000, None));
        assert!(report.passed());
        assert!(matches!(report.checks[1].outcome, Outcome::Skipped { .. }));
    }

    #[test]
    fn overflow_is_a_failure() {
        let report = verify(&input(Wei::MAX, 1, 0, 0, Some(0)));
        assert_eq!(
            report.failures().next().and_then(Check::failure),
            Some(&Failure::Overflow { side: Side::Before })
        );
    }

    #[test]
    fn report_serializes_failures_with_details() {
        let report = verify(&input(1_000, 5_000, 0, 5_800, Some(100)));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["checks"][1]["outcome"]["status"], "failed");
        assert_eq!(json["checks"][1]["outcome"]["failure"]["kind"], "imbalance");
        assert_eq!(json["checks"][1]["outcome"]["failure"]["delta"], 100);
    }

    #[test]
    fn check_request_derives_cost_from_record() {
        let json = r#"{
            "targetBefore": 1000000000000000000,
            "actorBefore": 9999000000000000000000,
            "targetAfter": 0,
            "actorAfter": 9999999947000000000000,
            "record": { "gasUsed": 53000, "gasPrice": 1000000000 }
        }"#;
        let request: CheckRequest = serde_json::from_str(json).unwrap();
        let report = request.evaluate().unwrap();
        assert_eq!(report.input.cost, Some(53_000_000_000_000));
        assert!(report.passed());

        let bad: CheckRequest = serde_json::from_str(
            r#"{
                "targetBefore": 1,
                "actorBefore": 1,
                "targetAfter": 0,
                "actorAfter": 2,
                "record": { "gasPrice": 1 }
            }"#,
        )
        .unwrap();
        assert_eq!(bad.evaluate().unwrap_err().field, "gasUsed");
    }

    quickcheck::quickcheck! {
        fn any_honest_withdrawal_conserves(
            target: u64,
            actor: u64,
            gas_used: u32,
            gas_price: u32
        ) -> bool {
            let fee = u128::from(gas_used) * u128::from(gas_price);
            let actor = u128::from(actor) + fee;
            let target = u128::from(target);
            verify(&input(target, actor, 0, actor + target - fee, Some(fee))).passed()
        }

        fn any_skimmed_withdrawal_fails(target: u64, actor: u64, skim: u64) -> bool {
            let skim = u128::from(skim) + 1;
            let target = u128::from(target) + skim;
            let actor = u128::from(actor);
            !verify(&input(target, actor, 0, actor + target - skim, Some(0))).passed()
        }
    }
}
