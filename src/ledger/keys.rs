/// Storage keys used by the ledger, all sharing one prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerKeys {
    pub daily_steps: String,
    pub last_update: String,
    pub weekly_steps: String,
}

impl LedgerKeys {
    pub fn new(prefix: &str) -> Self {
        Self {
            daily_steps: format!("{prefix}daily_steps"),
            last_update: format!("{prefix}last_update"),
            weekly_steps: format!("{prefix}weekly_steps"),
        }
    }

    /// Day-of-week counter key, Sunday = 0.
    pub fn day_slot(&self, weekday: u32) -> String {
        format!("{}_{weekday}", self.daily_steps)
    }
}
