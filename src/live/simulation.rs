//! Local match simulator used whenever live data is unavailable.
//!
//! `step` is a pure function of the current state: the RNG is seeded from
//! the match id and clock, so replaying a state always yields the same next
//! state.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::db::models::{DataSource, LiveMatchState, LivePlayer, Player};

/// Players on one side of a simulated match
pub const SIMULATED_ROSTER_SIZE: usize = 5;

const MAX_LEVEL: u32 = 18;
const SECONDS_PER_LEVEL: u32 = 120;
const STARTING_GOLD: u32 = 500;

/// Fresh active state for a simulated match, seeded with the first few
/// rostered players (placeholders when the roster is empty).
pub fn initial_state(id: &str, opponent: &str, roster: &[Player]) -> LiveMatchState {
    let players = (0..SIMULATED_ROSTER_SIZE)
        .map(|i| {
            let (id, nickname) = match roster.get(i) {
                Some(p) => (p.id.clone(), p.nickname.clone()),
                None => (format!("sim-{}", i + 1), format!("Player {}", i + 1)),
            };
            LivePlayer {
                id,
                nickname,
                kills: 0,
                deaths: 0,
                assists: 0,
                gold: STARTING_GOLD,
                level: 1,
            }
        })
        .collect();

    LiveMatchState {
        id: id.to_string(),
        opponent: opponent.to_string(),
        is_active: true,
        game_time: 0,
        players,
        data_source: DataSource::Simulated,
    }
}

/// Advance the match by one second of game time.
pub fn step(state: &LiveMatchState) -> LiveMatchState {
    let mut rng = StdRng::seed_from_u64(seed(&state.id, state.game_time));
    let mut next = state.clone();
    next.game_time = state.game_time.saturating_add(1);

    let level_floor = (1 + next.game_time / SECONDS_PER_LEVEL).min(MAX_LEVEL);
    for p in &mut next.players {
        if rng.gen_bool(0.03) {
            p.kills += 1;
            p.gold += 300;
        }
        if rng.gen_bool(0.025) {
            p.deaths += 1;
        }
        if rng.gen_bool(0.04) {
            p.assists += 1;
            p.gold += 150;
        }
        p.gold += rng.gen_range(5..=12);
        p.level = p.level.max(level_floor);
    }
    next
}

// FNV-1a over the id, mixed with the clock.
fn seed(id: &str, game_time: u32) -> u64 {
    let h = id
        .bytes()
        .fold(0xcbf2_9ce4_8422_2325u64, |h, b| {
            (h ^ b as u64).wrapping_mul(0x0100_0000_01b3)
        });
    h ^ (game_time as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15)
}
