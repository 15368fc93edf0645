pub mod health;
pub mod logs;
pub mod schedulers;

use serde::Deserialize;

pub const DEFAULT_LOG_LIMIT: usize = 100;

#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

impl LimitQuery {
    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LOG_LIMIT)
    }
}
