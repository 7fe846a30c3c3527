//! Hottest-zone arbitration
//!
//! Every non-zero temperature observation scores its zone by how close it is
//! to the next trip. The zone with the strictly highest score seen so far is
//! the hottest zone and reports a raising trend. Scores never decay.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use crate::constants::thermal::{SCORE_MAX, SCORE_SHIFT, TRIP_HOT};

use super::trips::TripTable;

/// Zone identity; never reused within one arbiter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ZoneId(u64);

impl ZoneId {
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ZoneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "zone#{}", self.0)
    }
}

#[derive(Debug, Default)]
struct ArbiterState {
    highest_score: u32,
    highest_zone: Option<ZoneId>,
}

#[derive(Debug, Default)]
pub struct ZoneScoreArbiter {
    state: Mutex<ArbiterState>,
    next_id: AtomicU64,
}

/// Score a temperature against a trip table
pub fn zone_score(temp_mc: i32, trips: &TripTable) -> u32 {
    if temp_mc >= trips[TRIP_HOT].temp_mc {
        return SCORE_MAX;
    }

    let temp = i64::from(temp_mc).max(0);
    let mut shift: u64 = 1;
    for trip in trips.iter() {
        let trip_temp = i64::from(trip.temp_mc);
        if i64::from(temp_mc) < trip_temp {
            let delta = trip_temp - i64::from(temp_mc);
            let quotient = (temp + delta / 2) / delta;
            let score = (quotient as u64).saturating_mul(shift);
            return u32::try_from(score).unwrap_or(SCORE_MAX);
        }
        shift = shift.saturating_mul(u64::from(SCORE_SHIFT));
    }
    SCORE_MAX
}

impl ZoneScoreArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an identity for a new zone
    pub fn register_zone(&self) -> ZoneId {
        ZoneId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Score an observation and take the hottest slot if strictly higher
    pub fn observe(&self, zone: ZoneId, temp_mc: i32, trips: &TripTable) -> u32 {
        let score = zone_score(temp_mc, trips);
        let mut state = self.state.lock();
        if score > state.highest_score {
            debug!(%zone, score, previous = state.highest_score, "new hottest zone");
            state.highest_score = score;
            state.highest_zone = Some(zone);
        }
        score
    }

    pub fn is_hottest(&self, zone: ZoneId) -> bool {
        self.state.lock().highest_zone == Some(zone)
    }

    pub fn highest(&self) -> (u32, Option<ZoneId>) {
        let state = self.state.lock();
        (state.highest_score, state.highest_zone)
    }
}
