//! Pluggable per-match rating
//!
//! The rating attached to a persisted match is supplied by an injected
//! `RatingModel`, not a fixed formula; components take `Arc<dyn
//! RatingModel>` so deployments can swap the scoring without touching the
//! pipelines.

use std::sync::Arc;

/// Inputs to a match rating
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchFacts {
    pub kills: i64,
    pub deaths: i64,
    pub assists: i64,
    pub mvps: i64,
    pub score: i64,
    /// Rounds played, when known (wins + losses); 0 if unknown
    pub rounds: i64,
}

/// Scoring strategy for finalized matches
pub trait RatingModel: Send + Sync {
    fn rate(&self, facts: &MatchFacts) -> f64;
}

/// Default rating: per-round impact with a kill/assist/death balance
///
/// Weights are this model's own; nothing else in the system depends on
/// them.
#[derive(Debug, Default)]
pub struct DefaultRating;

impl RatingModel for DefaultRating {
    fn rate(&self, facts: &MatchFacts) -> f64 {
        let rounds = facts.rounds.max(1) as f64;
        let kills = facts.kills as f64;
        let deaths = facts.deaths as f64;
        let assists = facts.assists as f64;
        let mvps = facts.mvps as f64;

        let impact = kills + 0.4 * assists + 0.3 * mvps - 0.6 * deaths;
        (impact / rounds).max(0.0)
    }
}

/// Shared handle for injection
pub fn default_model() -> Arc<dyn RatingModel> {
    Arc::new(DefaultRating)
}
