//! Shared helpers for integration tests
#![allow(dead_code)]

use serde_json::{json, Value};

use demwatch_tracker::demo::parser::{
    FORMAT_VERSION, MAGIC, REC_ASSIST, REC_DAMAGE, REC_END, REC_KILL, REC_MVP, REC_ROUND_END,
    REC_ROUND_START,
};
use demwatch_tracker::telemetry::Snapshot;

/// Builder for the framed demo event stream the parser consumes
pub struct DemoBytes {
    buf: Vec<u8>,
}

impl DemoBytes {
    pub fn new(map: &str, tick_rate: f32, duration_secs: f32) -> Self {
        let mut buf = Vec::new();
        buf.extend_from_slice(MAGIC);
        buf.push(FORMAT_VERSION);
        buf.extend_from_slice(&(map.len() as u16).to_le_bytes());
        buf.extend_from_slice(map.as_bytes());
        buf.extend_from_slice(&tick_rate.to_le_bytes());
        buf.extend_from_slice(&duration_secs.to_le_bytes());
        Self { buf }
    }

    pub fn round_start(mut self, round: u16) -> Self {
        self.buf.push(REC_ROUND_START);
        self.buf.extend_from_slice(&round.to_le_bytes());
        self
    }

    pub fn round_end(mut self, round: u16, winner: u8) -> Self {
        self.buf.push(REC_ROUND_END);
        self.buf.extend_from_slice(&round.to_le_bytes());
        self.buf.push(winner);
        self
    }

    pub fn kill(mut self, attacker: u64, victim: u64, headshot: bool) -> Self {
        self.buf.push(REC_KILL);
        self.buf.extend_from_slice(&attacker.to_le_bytes());
        self.buf.extend_from_slice(&victim.to_le_bytes());
        self.buf.push(headshot as u8);
        self
    }

    pub fn assist(mut self, assister: u64, victim: u64) -> Self {
        self.buf.push(REC_ASSIST);
        self.buf.extend_from_slice(&assister.to_le_bytes());
        self.buf.extend_from_slice(&victim.to_le_bytes());
        self
    }

    pub fn damage(mut self, attacker: u64, victim: u64, amount: u16) -> Self {
        self.buf.push(REC_DAMAGE);
        self.buf.extend_from_slice(&attacker.to_le_bytes());
        self.buf.extend_from_slice(&victim.to_le_bytes());
        self.buf.extend_from_slice(&amount.to_le_bytes());
        self
    }

    pub fn mvp(mut self, player: u64) -> Self {
        self.buf.push(REC_MVP);
        self.buf.extend_from_slice(&player.to_le_bytes());
        self
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.buf.push(REC_END);
        self.buf
    }
}

/// Game-state snapshot payload in the shape the client posts
pub fn snapshot_payload(
    steam_id: &str,
    map_phase: Option<&str>,
    round_phase: Option<&str>,
    kills: i64,
    deaths: i64,
    ct_score: i64,
    t_score: i64,
) -> Value {
    // Derived stats follow kills so an all-zero snapshot really is all-zero
    let mvps = if kills > 0 { 1 } else { 0 };
    let mut payload = json!({
        "provider": { "steamid": steam_id, "timestamp": 1_700_000_000 },
        "player": {
            "steamid": steam_id,
            "name": "tester",
            "team": "CT",
            "match_stats": {
                "kills": kills,
                "deaths": deaths,
                "assists": 0,
                "mvps": mvps,
                "score": kills * 2
            }
        }
    });

    if let Some(phase) = map_phase {
        payload["map"] = json!({
            "name": "de_dust2",
            "phase": phase,
            "team_ct": { "score": ct_score },
            "team_t": { "score": t_score }
        });
    }
    if let Some(phase) = round_phase {
        payload["round"] = json!({ "phase": phase });
    }

    payload
}

pub fn snapshot(
    steam_id: &str,
    map_phase: Option<&str>,
    round_phase: Option<&str>,
    kills: i64,
    deaths: i64,
    ct_score: i64,
    t_score: i64,
) -> Snapshot {
    serde_json::from_value(snapshot_payload(
        steam_id, map_phase, round_phase, kills, deaths, ct_score, t_score,
    ))
    .expect("snapshot payload should deserialize")
}
