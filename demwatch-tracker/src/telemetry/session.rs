//! Ephemeral per-player sessions
//!
//! `SessionStore` is the single concurrently-mutated in-memory structure
//! in the service. It is an injected, process-scoped concurrent map owned
//! jointly by the ingestor (create/update/finalize) and the sweeper
//! (expiry); at most one live session exists per player identity.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::snapshot::Team;

/// One player's in-progress match
#[derive(Debug, Clone)]
pub struct Session {
    pub player_id: String,
    pub player_name: Option<String>,
    pub map: Option<String>,
    pub team: Option<Team>,
    /// Cumulative counters, overwritten (never added) on every update
    pub kills: i64,
    pub deaths: i64,
    pub assists: i64,
    pub mvps: i64,
    pub score: i64,
    pub rounds_won: i64,
    pub rounds_lost: i64,
    pub started_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    /// Set once the sweeper has durably saved this session
    pub persisted: bool,
}

impl Session {
    pub fn new(player_id: String, now: DateTime<Utc>) -> Self {
        Self {
            player_id,
            player_name: None,
            map: None,
            team: None,
            kills: 0,
            deaths: 0,
            assists: 0,
            mvps: 0,
            score: 0,
            rounds_won: 0,
            rounds_lost: 0,
            started_at: now,
            last_update: now,
            persisted: false,
        }
    }

    /// True if the session accumulated any real combat statistics
    pub fn has_combat_stats(&self) -> bool {
        self.kills != 0
            || self.deaths != 0
            || self.assists != 0
            || self.mvps != 0
            || self.score != 0
    }
}

/// Process-scoped concurrent session map keyed by player identity
#[derive(Debug, Default)]
pub struct SessionStore {
    inner: RwLock<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clone of the session for a player, if any
    pub async fn get(&self, player_id: &str) -> Option<Session> {
        self.inner.read().await.get(player_id).cloned()
    }

    /// Insert or replace the session for its player
    pub async fn insert(&self, session: Session) {
        self.inner
            .write()
            .await
            .insert(session.player_id.clone(), session);
    }

    /// Mutate the session for a player in place; `false` if absent
    pub async fn update<F>(&self, player_id: &str, mutate: F) -> bool
    where
        F: FnOnce(&mut Session),
    {
        let mut map = self.inner.write().await;
        match map.get_mut(player_id) {
            Some(session) => {
                mutate(session);
                true
            }
            None => false,
        }
    }

    /// Remove and return the session for a player
    pub async fn remove(&self, player_id: &str) -> Option<Session> {
        self.inner.write().await.remove(player_id)
    }

    /// Clones of all tracked sessions (sweeper input)
    pub async fn all(&self) -> Vec<Session> {
        self.inner.read().await.values().cloned().collect()
    }

    /// Number of tracked sessions
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}
