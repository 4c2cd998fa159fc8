//! Core of the FundMe harness.
//!
//! The harness checks that a value-holding contract pays out exactly what it holds when its owner
//! withdraws, that its bookkeeping is reset afterwards, and that nobody else can withdraw. It is
//! built from a few small pieces:
//!
//! * [`verify`]: balance snapshots, transaction cost and the conservation check.
//! * [`scenario`] and [`probe`]: the multi-actor withdrawal scenario and the access-control probe.
//! * [`target`]: the interface the checks run against.
//! * [`devnet`] and [`contract`]: an in-process development network with FundMe and a mock price
//!   feed deployed on it.
//! * [`config`]: per-network price feeds and the development-network switch.
//! * [`suite`] and [`assert`]: the unit and staging suites, gated by network.

pub mod address;
pub mod assert;
pub mod config;
pub mod contract;
pub mod devnet;
pub mod ledger;
pub mod probe;
pub mod scenario;
pub mod suite;
pub mod target;
pub mod units;
pub mod verify;

mod error;
pub(crate) mod serde_hex;

pub use error::HarnessError;
