//! Consensus confidence scoring.
//!
//! Turns the signals collected for one game+market into a 1-5 star rating:
//!
//! 1. Signals are bucketed by side; lines within the market's tolerance band
//!    fold into one bucket whose line is the median of its members.
//! 2. Each bucket scores one point per distinct non-Market provider, plus one
//!    for a strong Kalshi signal.
//! 3. The best bucket wins (tie-break: strong Kalshi, then CBSSports, then
//!    first seen) and its score maps to stars: 0 -> 1, 1 -> 3, 2 -> 4, 3+ -> 5.
//! 4. One extra star when the chosen line sits far enough from the Market line.

use super::normalize::{normalize_game, normalize_side, side_line};
use super::pick::Confidence;
use crate::config::ConsensusConfig;
use crate::error::ConsensusError;
use crate::feed::types::{MarketKind, Provider, SignalStrength, SourceSignal};

const LINE_EPSILON: f64 = 1e-9;

/// Sub-rating at which a lone OddsTrader pick seeds 3 stars.
const ODDSTRADER_SEED_STARS: u8 = 4;

/// Line-value boost applied to a rating.
#[derive(Debug, Clone, PartialEq)]
pub struct LineBoost {
    pub market_line: f64,
    pub difference: f64,
}

/// Engine output for one game+market.
#[derive(Debug, Clone, PartialEq)]
pub struct Rating {
    pub confidence: Confidence,
    pub market: MarketKind,
    pub side: String,
    pub line: Option<f64>,
    pub odds_american: Option<f64>,
    /// Distinct non-Market providers backing the side, first-seen order.
    pub providers: Vec<Provider>,
    pub agreement_count: u8,
    pub kalshi_strong: bool,
    pub line_boost: Option<LineBoost>,
    pub rationale: String,
}

struct SideBucket<'a> {
    key: String,
    anchor: Option<f64>,
    members: Vec<&'a SourceSignal>,
}

impl<'a> SideBucket<'a> {
    fn new(key: String, signal: &'a SourceSignal) -> Self {
        Self {
            key,
            anchor: signal.line,
            members: vec![signal],
        }
    }

    fn accepts(&self, key: &str, line: Option<f64>, tolerance: Option<f64>) -> bool {
        if self.key != key {
            return false;
        }
        match (tolerance, self.anchor, line) {
            (Some(tol), Some(anchor), Some(line)) => (anchor - line).abs() <= tol + LINE_EPSILON,
            _ => true,
        }
    }

    fn push(&mut self, signal: &'a SourceSignal) {
        if self.anchor.is_none() {
            self.anchor = signal.line;
        }
        self.members.push(signal);
    }

    fn opinions(&self) -> impl Iterator<Item = &&'a SourceSignal> {
        self.members.iter().filter(|s| s.provider != Provider::Market)
    }

    fn providers(&self) -> Vec<Provider> {
        let mut out = Vec::new();
        for s in self.opinions() {
            if !out.contains(&s.provider) {
                out.push(s.provider);
            }
        }
        out
    }

    fn has_provider(&self, provider: Provider) -> bool {
        self.members.iter().any(|s| s.provider == provider)
    }

    /// Median of the opinion lines; Market lines only when no opinion has one.
    fn line(&self) -> Option<f64> {
        let mut lines: Vec<f64> = self.opinions().filter_map(|s| s.line).collect();
        if lines.is_empty() {
            lines = self.members.iter().filter_map(|s| s.line).collect();
        }
        median(&mut lines)
    }

    fn display_side(&self) -> String {
        self.opinions()
            .next()
            .or_else(|| self.members.first())
            .map(|s| s.side.trim().to_string())
            .unwrap_or_default()
    }
}

pub struct ConsensusEngine {
    config: ConsensusConfig,
}

impl Default for ConsensusEngine {
    fn default() -> Self {
        Self::new(ConsensusConfig::default())
    }
}

impl ConsensusEngine {
    pub fn new(config: ConsensusConfig) -> Self {
        Self { config }
    }

    /// Rate the signals collected for a single game+market.
    ///
    /// Pure and deterministic for a given input order.
    pub fn rate(&self, signals: &[SourceSignal]) -> Result<Rating, ConsensusError> {
        let first = signals.first().ok_or(ConsensusError::InsufficientData)?;
        let market = first.market;
        let game = normalize_game(&first.game_id);
        for s in &signals[1..] {
            if s.market != market {
                return Err(ConsensusError::AmbiguousMarket {
                    first: market,
                    other: s.market,
                });
            }
            if normalize_game(&s.game_id) != game {
                return Err(ConsensusError::MixedGames {
                    first: first.game_id.clone(),
                    other: s.game_id.clone(),
                });
            }
        }

        // A line written only into the side text still separates sides.
        let filled: Vec<SourceSignal>;
        let signals = if market != MarketKind::Moneyline
            && signals.iter().any(|s| s.line.is_none() && side_line(&s.side).is_some())
        {
            filled = signals
                .iter()
                .cloned()
                .map(|mut s| {
                    if s.line.is_none() {
                        s.line = side_line(&s.side);
                    }
                    s
                })
                .collect();
            &filled[..]
        } else {
            signals
        };

        let buckets = self.partition(signals, market);

        let mut best: Option<(usize, (u8, bool, bool))> = None;
        for (idx, bucket) in buckets.iter().enumerate() {
            let rank = (
                self.agreement_count(bucket),
                self.has_strong_kalshi(bucket),
                bucket.has_provider(Provider::CbsSports),
            );
            // Strictly greater only: equal ranks keep the first-seen bucket.
            if best.as_ref().map_or(true, |(_, r)| rank > *r) {
                best = Some((idx, rank));
            }
        }
        let Some((winner_idx, (agreement_count, kalshi_strong, _))) = best else {
            return Err(ConsensusError::InsufficientData);
        };
        let winner = &buckets[winner_idx];

        let mut stars = base_confidence(agreement_count).get();
        let oddstrader_seed = winner.opinions().any(|s| {
            s.provider == Provider::OddsTrader
                && matches!(s.strength, Some(SignalStrength::Stars(n)) if n >= ODDSTRADER_SEED_STARS)
        });
        if oddstrader_seed {
            stars = stars.max(3);
        }

        let line = winner.line();
        let line_boost = self.line_boost(market, &winner.key, line, signals);
        if line_boost.is_some() {
            stars = (stars + 1).min(Confidence::MAX.get());
        }
        let confidence = Confidence::saturating(stars);

        let providers = winner.providers();
        let side = winner.display_side();
        let odds_american = bucket_price(winner, signals);

        let rationale = build_rationale(RationaleParts {
            market,
            side: &side,
            line,
            providers: &providers,
            agreement_count,
            strong_kalshi: if kalshi_strong { self.strong_kalshi_signal(winner) } else { None },
            oddstrader_seed,
            line_boost: line_boost.as_ref(),
            confidence,
        });

        Ok(Rating {
            confidence,
            market,
            side,
            line,
            odds_american,
            providers,
            agreement_count,
            kalshi_strong,
            line_boost,
            rationale,
        })
    }

    /// Prediction-market signal with a decisive price and real liquidity.
    pub fn is_strong_kalshi(&self, signal: &SourceSignal) -> bool {
        if signal.provider != Provider::Kalshi {
            return false;
        }
        match signal.strength {
            Some(SignalStrength::Prediction {
                implied_prob,
                volume_24h,
                open_interest,
            }) => {
                let decisive = implied_prob >= self.config.kalshi_strong_high - LINE_EPSILON
                    || implied_prob <= self.config.kalshi_strong_low + LINE_EPSILON;
                decisive
                    && volume_24h > self.config.kalshi_min_volume_24h
                    && open_interest > self.config.kalshi_min_open_interest
            }
            _ => false,
        }
    }

    fn partition<'a>(&self, signals: &'a [SourceSignal], market: MarketKind) -> Vec<SideBucket<'a>> {
        let tolerance = self.tolerance(market);
        let mut buckets: Vec<SideBucket<'a>> = Vec::new();
        for signal in signals {
            let key = normalize_side(&signal.side);
            match buckets
                .iter_mut()
                .find(|b| b.accepts(&key, signal.line, tolerance))
            {
                Some(bucket) => bucket.push(signal),
                None => buckets.push(SideBucket::new(key, signal)),
            }
        }
        buckets
    }

    fn tolerance(&self, market: MarketKind) -> Option<f64> {
        match market {
            MarketKind::Moneyline => None,
            MarketKind::Spread => Some(self.config.spread_tolerance),
            MarketKind::Total => Some(self.config.total_tolerance),
        }
    }

    fn boost_threshold(&self, market: MarketKind) -> Option<f64> {
        match market {
            MarketKind::Moneyline => None,
            MarketKind::Spread => Some(self.config.spread_boost_points),
            MarketKind::Total => Some(self.config.total_boost_points),
        }
    }

    fn agreement_count(&self, bucket: &SideBucket<'_>) -> u8 {
        let providers = bucket.providers().len() as u8;
        providers + u8::from(self.has_strong_kalshi(bucket))
    }

    fn has_strong_kalshi(&self, bucket: &SideBucket<'_>) -> bool {
        self.strong_kalshi_signal(bucket).is_some()
    }

    fn strong_kalshi_signal<'a>(&self, bucket: &SideBucket<'a>) -> Option<&'a SourceSignal> {
        bucket
            .members
            .iter()
            .copied()
            .find(|s| self.is_strong_kalshi(s))
    }

    /// +1 star when the chosen line differs enough from the Market line on the same side.
    fn line_boost(
        &self,
        market: MarketKind,
        side_key: &str,
        line: Option<f64>,
        signals: &[SourceSignal],
    ) -> Option<LineBoost> {
        let threshold = self.boost_threshold(market)?;
        let line = line?;
        let mut market_lines: Vec<f64> = signals
            .iter()
            .filter(|s| s.provider == Provider::Market && normalize_side(&s.side) == side_key)
            .filter_map(|s| s.line)
            .collect();
        let market_line = median(&mut market_lines)?;
        let difference = (line - market_line).abs();
        (difference >= threshold - LINE_EPSILON).then_some(LineBoost {
            market_line,
            difference,
        })
    }
}

/// Stars for an agreement count, before boosts.
pub fn base_confidence(agreement_count: u8) -> Confidence {
    match agreement_count {
        0 => Confidence::MIN,
        1 => Confidence::saturating(3),
        2 => Confidence::saturating(4),
        _ => Confidence::MAX,
    }
}

/// Median of the values; sorts the slice in place.
pub fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

/// Price for the chosen bucket: its own quotes first, else Market quotes for the side.
fn bucket_price(bucket: &SideBucket<'_>, signals: &[SourceSignal]) -> Option<f64> {
    let mut prices: Vec<f64> = bucket.members.iter().filter_map(|s| s.price).collect();
    if prices.is_empty() {
        prices = signals
            .iter()
            .filter(|s| s.provider == Provider::Market && normalize_side(&s.side) == bucket.key)
            .filter_map(|s| s.price)
            .collect();
    }
    median(&mut prices)
}

struct RationaleParts<'a> {
    market: MarketKind,
    side: &'a str,
    line: Option<f64>,
    providers: &'a [Provider],
    agreement_count: u8,
    strong_kalshi: Option<&'a SourceSignal>,
    oddstrader_seed: bool,
    line_boost: Option<&'a LineBoost>,
    confidence: Confidence,
}

fn format_line(market: MarketKind, line: f64) -> String {
    match market {
        MarketKind::Spread => format!("{:+}", line),
        _ => format!("{}", line),
    }
}

fn build_rationale(parts: RationaleParts<'_>) -> String {
    let selection = match parts.line {
        Some(line) => format!("{} {}", parts.side, format_line(parts.market, line)),
        None => parts.side.to_string(),
    };

    let mut out = if parts.providers.is_empty() {
        format!(
            "Market line only on {} ({}); no independent source agreement",
            selection, parts.market
        )
    } else {
        let names: Vec<String> = parts.providers.iter().map(|p| p.to_string()).collect();
        format!(
            "{} on {} ({}); agreement {}",
            names.join(", "),
            selection,
            parts.market,
            parts.agreement_count
        )
    };

    if let Some(signal) = parts.strong_kalshi {
        if let Some(SignalStrength::Prediction {
            implied_prob,
            volume_24h,
            open_interest,
        }) = signal.strength
        {
            out.push_str(&format!(
                "; strong Kalshi sentiment ({:.0}% implied, {} vol/24h, {} OI)",
                implied_prob * 100.0,
                volume_24h,
                open_interest
            ));
        }
    }
    if parts.oddstrader_seed {
        out.push_str("; OddsTrader 4★ rating");
    }
    if let Some(boost) = parts.line_boost {
        out.push_str(&format!(
            "; line value +1★ vs market {} ({} pts)",
            format_line(parts.market, boost.market_line),
            boost.difference
        ));
    }
    out.push_str(&format!(" → {}", parts.confidence));
    out
}
