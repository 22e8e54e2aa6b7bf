pub mod file;
pub mod kalshi;
pub mod the_odds_api;
pub mod types;

use anyhow::Result;
use async_trait::async_trait;
use types::FeedBatch;

/// A remote source of signals for one sport.
#[async_trait]
pub trait SignalFeed: Send + Sync {
    fn name(&self) -> &'static str;
    async fn fetch(&mut self, sport: &str) -> Result<FeedBatch>;
}
