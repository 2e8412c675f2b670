use serde::{Deserialize, Serialize};

/// Ledger slot. The only ordering key for balance observations.
pub type Slot = u64;

/// A balance observation tagged with the slot at which it was true.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceUpdate<V> {
    /// Observed balance.
    pub value: V,
    /// Slot at which the balance was observed.
    pub slot: Slot,
}

impl<V> BalanceUpdate<V> {
    /// Creates a new update.
    pub fn new(value: V, slot: Slot) -> Self {
        Self { value, slot }
    }

    /// Applies `f` to the value, keeping the slot.
    pub fn map<U>(self, f: impl FnOnce(V) -> U) -> BalanceUpdate<U> {
        BalanceUpdate {
            value: f(self.value),
            slot: self.slot,
        }
    }

    /// Whether this observation is strictly newer than `last`.
    ///
    /// `None` means nothing has been published yet and sorts below every slot.
    pub fn is_newer_than(&self, last: Option<Slot>) -> bool {
        last.is_none_or(|last| self.slot > last)
    }
}
