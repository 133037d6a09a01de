//! Client view of the ledger-owned economy.

use serde::{Deserialize, Serialize};

use hashflow_ledger::{EconomySnapshot, ResourceConsumption};

/// Last known balances. `None` until the first fetch or charge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EconomyState {
    pub credits: Option<i64>,
    pub moves: Option<i64>,
}

impl EconomyState {
    /// Take the balances a charge reported, whether or not it succeeded.
    pub fn apply_consumption(&mut self, consumption: &ResourceConsumption) {
        self.credits = Some(consumption.remaining_credits);
        self.moves = Some(consumption.remaining_moves);
    }

    /// Replace with freshly fetched balances.
    pub fn apply_snapshot(&mut self, snapshot: &EconomySnapshot) {
        self.credits = Some(snapshot.credit_balance);
        self.moves = Some(snapshot.daily_moves_left);
    }

    pub fn is_known(&self) -> bool {
        self.credits.is_some() && self.moves.is_some()
    }
}
