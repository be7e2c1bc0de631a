use std::collections::HashMap;

use crate::db::models::{Match, MatchResult, Player, PlayerStats};

/// Attach aggregate stats to every player, derived from the match lines
/// that mention them. Players without any line get zeroed stats.
pub fn enrich_players(players: Vec<Player>, matches: &[Match]) -> Vec<Player> {
    let mut totals: HashMap<&str, PlayerStats> = HashMap::new();

    for m in matches {
        let won = m.result == Some(MatchResult::Win);
        for line in &m.player_lines {
            let entry = totals.entry(line.player_id.as_str()).or_default();
            entry.matches_played += 1;
            if won {
                entry.wins += 1;
            }
            entry.kills += line.kills;
            entry.deaths += line.deaths;
            entry.assists += line.assists;
        }
    }

    players
        .into_iter()
        .map(|mut p| {
            let mut stats = totals.get(p.id.as_str()).cloned().unwrap_or_default();
            stats.win_rate = if stats.matches_played > 0 {
                stats.wins as f64 / stats.matches_played as f64
            } else {
                0.0
            };
            stats.kda = (stats.kills + stats.assists) as f64 / stats.deaths.max(1) as f64;
            p.stats = Some(stats);
            p
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::PlayerLine;
    use crate::gateway::mock::{player, sample_roster};
    use approx::assert_relative_eq;

    fn line(player_id: &str, k: u32, d: u32, a: u32) -> PlayerLine {
        PlayerLine {
            player_id: player_id.into(),
            kills: k,
            deaths: d,
            assists: a,
        }
    }

    #[test]
    fn test_aggregates_across_matches() {
        let mut m1 = sample_roster().matches.remove(0);
        m1.player_lines = vec![line("p1", 10, 2, 4)];
        m1.result = Some(MatchResult::Win);
        let mut m2 = m1.clone();
        m2.id = "m2".into();
        m2.player_lines = vec![line("p1", 2, 6, 3)];
        m2.result = Some(MatchResult::Loss);

        let players = enrich_players(vec![player("p1", "vex")], &[m1, m2]);
        let stats = players[0].stats.as_ref().unwrap();
        assert_eq!(stats.matches_played, 2);
        assert_eq!(stats.wins, 1);
        assert_eq!((stats.kills, stats.deaths, stats.assists), (12, 8, 7));
        assert_relative_eq!(stats.win_rate, 0.5);
        assert_relative_eq!(stats.kda, 19.0 / 8.0);
    }

    #[test]
    fn test_deathless_kda_divides_by_one() {
        let mut m = sample_roster().matches.remove(0);
        m.player_lines = vec![line("p1", 5, 0, 5)];
        let players = enrich_players(vec![player("p1", "vex")], &[m]);
        assert_relative_eq!(players[0].stats.as_ref().unwrap().kda, 10.0);
    }

    #[test]
    fn test_player_without_lines_gets_zero_stats() {
        let players = enrich_players(vec![player("p9", "ghost")], &sample_roster().matches);
        let stats = players[0].stats.as_ref().unwrap();
        assert_eq!(stats.matches_played, 0);
        assert_relative_eq!(stats.win_rate, 0.0);
        assert_relative_eq!(stats.kda, 0.0);
    }
}
