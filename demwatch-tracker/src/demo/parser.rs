//! Incremental demo event-stream parser
//!
//! The artifact is a sequential event stream: a small header followed by
//! typed little-endian records. The parser tracks round boundaries and,
//! within each round, accumulates per-player kill/death/assist/headshot/
//! damage/MVP events keyed by player identity. At every round boundary the
//! per-player kill counter accumulated since the previous boundary is
//! evaluated to classify 3/4/5-kill rounds, then reset.
//!
//! Layout (all integers little-endian):
//!
//! ```text
//! magic "DWEV" | version u8 | map_len u16 | map bytes | tick_rate f32 | duration f32
//! then records, tag u8:
//!   0x01 round start: round u16
//!   0x02 round end:   round u16, winner u8 (0 = CT, 1 = T)
//!   0x03 kill:        attacker u64, victim u64, headshot u8
//!   0x04 assist:      assister u64, victim u64
//!   0x05 damage:      attacker u64, victim u64, amount u16
//!   0x06 mvp:         player u64
//!   0xff end of stream
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::ParseError;

pub const MAGIC: &[u8; 4] = b"DWEV";
pub const FORMAT_VERSION: u8 = 1;

pub const REC_ROUND_START: u8 = 0x01;
pub const REC_ROUND_END: u8 = 0x02;
pub const REC_KILL: u8 = 0x03;
pub const REC_ASSIST: u8 = 0x04;
pub const REC_DAMAGE: u8 = 0x05;
pub const REC_MVP: u8 = 0x06;
pub const REC_END: u8 = 0xff;

/// Structured result of a parsed demo
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemoSummary {
    pub map: String,
    pub tick_rate: f32,
    pub duration_secs: f32,
    /// Per-round event lists, in demo order
    pub rounds: Vec<RoundSummary>,
    /// Per-player aggregates keyed by player identity
    pub players: HashMap<String, PlayerDemoStats>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundSummary {
    pub round: u16,
    /// "CT" or "T"; None when the round never saw an end record
    pub winner: Option<String>,
    pub kills: Vec<KillEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KillEvent {
    pub attacker: String,
    pub victim: String,
    pub headshot: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PlayerDemoStats {
    pub kills: i64,
    pub deaths: i64,
    pub assists: i64,
    pub headshots: i64,
    pub damage: i64,
    pub mvps: i64,
    pub triple_kills: i64,
    pub quad_kills: i64,
    pub aces: i64,
}

/// Cursor over the raw artifact bytes
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ParseError> {
        if self.remaining() < n {
            return Err(ParseError::Truncated(self.pos));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, ParseError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, ParseError> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().expect("2 bytes")))
    }

    fn u64(&mut self) -> Result<u64, ParseError> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().expect("8 bytes")))
    }

    fn f32(&mut self) -> Result<f32, ParseError> {
        Ok(f32::from_le_bytes(self.take(4)?.try_into().expect("4 bytes")))
    }
}

/// Per-round kill accumulation, evaluated at round boundaries
#[derive(Default)]
struct RoundTracker {
    kills_this_round: HashMap<String, i64>,
    open_round: Option<RoundSummary>,
}

impl RoundTracker {
    /// Evaluate and reset the per-player kill counters
    fn flush_kill_counters(&mut self, players: &mut HashMap<String, PlayerDemoStats>) {
        for (player, kills) in self.kills_this_round.drain() {
            let stats = players.entry(player).or_default();
            match kills {
                3 => stats.triple_kills += 1,
                4 => stats.quad_kills += 1,
                k if k >= 5 => stats.aces += 1,
                _ => {}
            }
        }
    }
}

/// Parse a complete artifact into its structured summary
pub fn parse(data: &[u8]) -> Result<DemoSummary, ParseError> {
    let mut reader = Reader::new(data);

    if reader.take(4)? != MAGIC {
        return Err(ParseError::BadMagic);
    }
    let version = reader.u8()?;
    if version != FORMAT_VERSION {
        return Err(ParseError::UnsupportedVersion(version));
    }

    let map_len = reader.u16()? as usize;
    let map = std::str::from_utf8(reader.take(map_len)?)
        .map_err(|_| ParseError::Malformed("map name is not UTF-8".to_string()))?
        .to_string();
    let tick_rate = reader.f32()?;
    let duration_secs = reader.f32()?;

    let mut players: HashMap<String, PlayerDemoStats> = HashMap::new();
    let mut rounds: Vec<RoundSummary> = Vec::new();
    let mut tracker = RoundTracker::default();

    loop {
        if reader.remaining() == 0 {
            break;
        }
        let record_pos = reader.pos;
        let tag = reader.u8()?;

        match tag {
            REC_ROUND_START => {
                let round = reader.u16()?;
                // A start is a boundary too: evaluate counters in case the
                // previous round never saw an end record.
                tracker.flush_kill_counters(&mut players);
                if let Some(open) = tracker.open_round.take() {
                    rounds.push(open);
                }
                tracker.open_round = Some(RoundSummary {
                    round,
                    winner: None,
                    kills: Vec::new(),
                });
            }
            REC_ROUND_END => {
                let round = reader.u16()?;
                let winner = match reader.u8()? {
                    0 => "CT",
                    1 => "T",
                    other => {
                        return Err(ParseError::Malformed(format!(
                            "Unknown winning team {other} in round {round}"
                        )))
                    }
                };
                tracker.flush_kill_counters(&mut players);
                let mut finished = tracker.open_round.take().unwrap_or(RoundSummary {
                    round,
                    winner: None,
                    kills: Vec::new(),
                });
                finished.winner = Some(winner.to_string());
                rounds.push(finished);
            }
            REC_KILL => {
                let attacker = reader.u64()?.to_string();
                let victim = reader.u64()?.to_string();
                let headshot = reader.u8()? != 0;

                let stats = players.entry(attacker.clone()).or_default();
                stats.kills += 1;
                if headshot {
                    stats.headshots += 1;
                }
                players.entry(victim.clone()).or_default().deaths += 1;
                *tracker.kills_this_round.entry(attacker.clone()).or_default() += 1;

                if let Some(open) = tracker.open_round.as_mut() {
                    open.kills.push(KillEvent {
                        attacker,
                        victim,
                        headshot,
                    });
                }
            }
            REC_ASSIST => {
                let assister = reader.u64()?.to_string();
                let _victim = reader.u64()?;
                players.entry(assister).or_default().assists += 1;
            }
            REC_DAMAGE => {
                let attacker = reader.u64()?.to_string();
                let _victim = reader.u64()?;
                let amount = reader.u16()? as i64;
                players.entry(attacker).or_default().damage += amount;
            }
            REC_MVP => {
                let player = reader.u64()?.to_string();
                players.entry(player).or_default().mvps += 1;
            }
            REC_END => break,
            other => return Err(ParseError::UnknownRecord(other, record_pos)),
        }
    }

    // Trailing boundary: a demo cut off mid-round still evaluates the
    // final accumulation.
    tracker.flush_kill_counters(&mut players);
    if let Some(open) = tracker.open_round.take() {
        rounds.push(open);
    }

    Ok(DemoSummary {
        map,
        tick_rate,
        duration_secs,
        rounds,
        players,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(map: &str) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        out.push(FORMAT_VERSION);
        out.extend_from_slice(&(map.len() as u16).to_le_bytes());
        out.extend_from_slice(map.as_bytes());
        out.extend_from_slice(&64.0f32.to_le_bytes());
        out.extend_from_slice(&1800.0f32.to_le_bytes());
        out
    }

    #[test]
    fn test_bad_magic_rejected() {
        assert!(matches!(parse(b"XXXX\x01"), Err(ParseError::BadMagic)));
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let mut data = Vec::from(*MAGIC);
        data.push(9);
        assert!(matches!(
            parse(&data),
            Err(ParseError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn test_truncated_header_rejected() {
        let mut data = header("de_dust2");
        data.truncate(7);
        assert!(matches!(parse(&data), Err(ParseError::Truncated(_))));
    }

    #[test]
    fn test_unknown_record_rejected_with_offset() {
        let mut data = header("de_nuke");
        let offset = data.len();
        data.push(0x77);
        assert!(matches!(
            parse(&data),
            Err(ParseError::UnknownRecord(0x77, off)) if off == offset
        ));
    }

    #[test]
    fn test_empty_stream_parses_header_only() {
        let summary = parse(&header("de_mirage")).unwrap();
        assert_eq!(summary.map, "de_mirage");
        assert_eq!(summary.tick_rate, 64.0);
        assert!(summary.rounds.is_empty());
        assert!(summary.players.is_empty());
    }
}
