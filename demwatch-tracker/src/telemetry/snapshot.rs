//! Telemetry snapshot schema
//!
//! Strict tagged schema for the per-player state snapshots the game client
//! posts. Phases are closed enums: a payload carrying an unrecognized
//! phase fails deserialization instead of silently defaulting, and
//! counters are cumulative values, never deltas.

use serde::{Deserialize, Serialize};

/// One state snapshot for one player
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Snapshot {
    pub provider: Option<Provider>,
    pub player: PlayerState,
    pub map: Option<MapState>,
    pub round: Option<RoundState>,
}

/// Sending client identification
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Provider {
    #[serde(rename = "steamid")]
    pub steam_id: Option<String>,
    pub timestamp: Option<i64>,
}

/// Per-player section
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlayerState {
    /// Stable player identity
    #[serde(rename = "steamid")]
    pub steam_id: String,
    pub name: Option<String>,
    pub team: Option<Team>,
    /// Cumulative counters for the current match
    pub match_stats: Option<MatchStats>,
}

/// Cumulative per-player counters
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
pub struct MatchStats {
    #[serde(default)]
    pub kills: i64,
    #[serde(default)]
    pub deaths: i64,
    #[serde(default)]
    pub assists: i64,
    #[serde(default)]
    pub mvps: i64,
    #[serde(default)]
    pub score: i64,
}

impl MatchStats {
    /// True if any counter is nonzero
    pub fn any_nonzero(&self) -> bool {
        self.kills != 0
            || self.deaths != 0
            || self.assists != 0
            || self.mvps != 0
            || self.score != 0
    }
}

/// Map section with match phase and team scores
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MapState {
    pub name: Option<String>,
    pub phase: Option<MatchPhase>,
    pub team_ct: Option<TeamScore>,
    pub team_t: Option<TeamScore>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct TeamScore {
    pub score: i64,
}

/// Round section (optional, carries its own phase)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RoundState {
    pub phase: Option<RoundPhase>,
}

/// Match-level phase tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchPhase {
    Warmup,
    Live,
    Intermission,
    Gameover,
    Over,
}

/// Round-level phase tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundPhase {
    Freezetime,
    Live,
    Over,
}

/// Team assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum Team {
    CT,
    T,
}

impl Team {
    pub fn as_str(&self) -> &'static str {
        match self {
            Team::CT => "CT",
            Team::T => "T",
        }
    }
}

impl Snapshot {
    /// Match phase, `None` meaning unspecified
    pub fn match_phase(&self) -> Option<MatchPhase> {
        self.map.as_ref().and_then(|m| m.phase)
    }

    /// Terminal test: match phase over/gameover, or an embedded round
    /// phase of `over` when the match phase is absent entirely.
    pub fn is_terminal(&self) -> bool {
        match self.match_phase() {
            Some(MatchPhase::Gameover) | Some(MatchPhase::Over) => true,
            Some(_) => false,
            None => matches!(
                self.round.as_ref().and_then(|r| r.phase),
                Some(RoundPhase::Over)
            ),
        }
    }

    /// "New match starting" test: warmup or halftime intermission
    pub fn is_match_start(&self) -> bool {
        matches!(
            self.match_phase(),
            Some(MatchPhase::Warmup) | Some(MatchPhase::Intermission)
        )
    }

    /// (own score, opponent score) for the player's team, when known
    pub fn team_scores(&self) -> Option<(i64, i64)> {
        let map = self.map.as_ref()?;
        let ct = map.team_ct?.score;
        let t = map.team_t?.score;
        match self.player.team? {
            Team::CT => Some((ct, t)),
            Team::T => Some((t, ct)),
        }
    }
}
