use super::types::SourceSignal;
use anyhow::{Context, Result};
use std::path::Path;

/// Load scraper output: a JSON array of signals.
///
/// `game_id` should be "Away @ Home". Labels that differ from the odds feed's
/// full team names are mapped onto feed games by `pipeline::align_games`;
/// anything else is rated on its own, without a Market line, price or start time.
pub async fn load_signals(path: &Path) -> Result<Vec<SourceSignal>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read signals from {}", path.display()))?;
    let signals: Vec<SourceSignal> = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse signals in {}", path.display()))?;
    tracing::info!(path = %path.display(), count = signals.len(), "signals loaded");
    Ok(signals)
}
