//! Pure computation engine(s) for deterministic settlement logic.

pub mod fees;
pub mod ledger;
pub mod status;

pub use fees::{split_coproducers, CoproducerShare, FeeCalculator, FeeError, FeeRate, FeeResult, FeeSchedule};
pub use ledger::{compute_balance, compute_balance_with_entries, BalanceSnapshot};
pub use status::{can_transition, map_status, priority, GatewaySignal};
