use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::code::constant_time_eq;
use crate::player::{Player, UserId};
use crate::team::{Team, TeamId};
use crate::time::{Timestamp, add_millis};

/// Coarse lifecycle stage of a quiz room.
///
/// `Lobby` is initial. `Ready -> Started` happens automatically after the
/// host's delay. No transition is forbidden; a host may leave `Finished`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Lobby,
    Ready,
    Started,
    Finished,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lobby => "lobby",
            Self::Ready => "ready",
            Self::Started => "started",
            Self::Finished => "finished",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lobby" => Ok(Self::Lobby),
            "ready" => Ok(Self::Ready),
            "started" => Ok(Self::Started),
            "finished" => Ok(Self::Finished),
            other => Err(format!("unknown phase: {other}")),
        }
    }
}

/// Result of registering one buzzer click.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClickOutcome {
    pub false_start: bool,
    /// This click claimed the first-answerer slot of the active question.
    pub first_answer: bool,
}

/// One quiz session.
///
/// The admin secret and the timer epochs are never serialized; everything
/// else is the snapshot broadcast to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: String,
    pub code: String,
    pub phase: Phase,
    pub players: HashMap<UserId, Player>,
    pub teams: HashMap<TeamId, Team>,
    pub enable_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub last_activity: Timestamp,
    pub question_active: bool,
    pub first_answerer: Option<UserId>,
    pub correct_answer: Option<String>,
    pub question_start_time: Option<Timestamp>,
    #[serde(skip)]
    admin_secret: String,
    #[serde(skip)]
    phase_epoch: u64,
    #[serde(skip)]
    question_epoch: u64,
}

impl Room {
    pub fn new(code: String, admin_secret: String, now: Timestamp) -> Self {
        Self {
            id: format!("room_{}", Uuid::new_v4().simple()),
            code,
            phase: Phase::Lobby,
            players: HashMap::new(),
            teams: HashMap::new(),
            enable_at: None,
            created_at: now,
            last_activity: now,
            question_active: false,
            first_answerer: None,
            correct_answer: None,
            question_start_time: None,
            admin_secret,
            phase_epoch: 0,
            question_epoch: 0,
        }
    }

    pub fn admin_secret(&self) -> &str {
        &self.admin_secret
    }

    /// An empty secret never matches.
    pub fn check_admin_secret(&self, candidate: &str) -> bool {
        !self.admin_secret.is_empty()
            && constant_time_eq(self.admin_secret.as_bytes(), candidate.as_bytes())
    }

    pub fn touch(&mut self, now: Timestamp) {
        self.last_activity = now;
    }

    pub fn is_idle(&self, now: Timestamp, max_idle_ms: i64) -> bool {
        now.saturating_sub(self.last_activity) >= max_idle_ms
    }

    /// Insert a player or refresh an existing one. Counters survive a rejoin.
    pub fn upsert_player(&mut self, user_id: &str, button_id: &str, name: &str) -> &Player {
        let player = self
            .players
            .entry(user_id.to_string())
            .or_insert_with(|| Player::new(user_id, button_id, name));
        player.button_id = button_id.to_string();
        player.name = name.to_string();
        player.connected = true;
        player
    }

    /// Rename (or create) `user_id` and move them onto `team_id`.
    ///
    /// The player is upserted even when the team does not exist; in that
    /// case rosters are left untouched and `None` is returned. Otherwise the
    /// player is removed from every roster and appended to the target's,
    /// and the target's name is returned.
    pub fn join_team(&mut self, user_id: &str, nickname: &str, team_id: &str) -> Option<String> {
        match self.players.get_mut(user_id) {
            Some(player) => {
                player.name = nickname.to_string();
                player.connected = true;
            },
            None => {
                self.players
                    .insert(user_id.to_string(), Player::new(user_id, "", nickname));
            },
        }

        if !self.teams.contains_key(team_id) {
            return None;
        }
        for team in self.teams.values_mut() {
            team.remove_member(user_id);
        }
        let team = self.teams.get_mut(team_id)?;
        team.players.push(user_id.to_string());
        Some(team.name.clone())
    }

    pub fn create_team(&mut self, name: &str, color: &str, now: Timestamp) -> &Team {
        let team = Team::new(name, color, now);
        let id = team.id.clone();
        self.teams.entry(id).or_insert(team)
    }

    /// Count a click from `user_id` at `now`, creating the player if needed.
    ///
    /// A click is a false start unless the phase is `Started` and `now` is
    /// not before `enable_at`.
    pub fn register_click(&mut self, user_id: &str, button_id: &str, now: Timestamp) -> ClickOutcome {
        let false_start =
            self.phase != Phase::Started || self.enable_at.is_some_and(|at| now < at);

        let player = self.players.entry(user_id.to_string()).or_insert_with(|| {
            Player::new(user_id, button_id, &Player::placeholder_name(user_id))
        });
        player.click_count += 1;
        player.last_click = Some(now);
        if false_start {
            player.false_starts += 1;
        }

        let first_answer = self.question_active && self.first_answerer.is_none();
        if first_answer {
            self.first_answerer = Some(user_id.to_string());
        }

        ClickOutcome {
            false_start,
            first_answer,
        }
    }

    /// Set the phase directly. Any pending ready->started timer goes stale.
    pub fn set_phase(&mut self, phase: Phase) -> u64 {
        self.phase_epoch += 1;
        self.phase = phase;
        self.phase_epoch
    }

    /// Enter `Ready`, gating clicks until `now + delay_ms`. Returns the epoch
    /// the deferred start must present to [`Room::complete_ready`].
    pub fn arm_ready(&mut self, now: Timestamp, delay_ms: u64) -> u64 {
        self.enable_at = Some(add_millis(now, delay_ms));
        self.set_phase(Phase::Ready)
    }

    /// Deferred half of [`Room::arm_ready`]. Applies only if no phase change
    /// happened since `epoch` was issued.
    pub fn complete_ready(&mut self, epoch: u64) -> bool {
        if self.phase_epoch != epoch {
            return false;
        }
        self.phase = Phase::Started;
        true
    }

    /// Open the question window. Returns the epoch an auto-close timer must
    /// present to [`Room::expire_question`].
    pub fn activate_question(&mut self, now: Timestamp) -> u64 {
        self.question_epoch += 1;
        self.question_active = true;
        self.first_answerer = None;
        self.question_start_time = Some(now);
        self.question_epoch
    }

    pub fn deactivate_question(&mut self) {
        self.question_epoch += 1;
        self.question_active = false;
    }

    /// Timer-driven close. No-op if the question was re-opened or closed
    /// since `epoch` was issued.
    pub fn expire_question(&mut self, epoch: u64) -> bool {
        if self.question_epoch != epoch || !self.question_active {
            return false;
        }
        self.deactivate_question();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_room() -> Room {
        Room::new("ABCD".into(), "SECRET".into(), 1_000)
    }

    #[test]
    fn new_room_is_in_lobby() {
        let room = make_room();
        assert_eq!(room.phase, Phase::Lobby);
        assert!(room.players.is_empty());
        assert!(room.teams.is_empty());
        assert!(!room.question_active);
        assert!(room.id.starts_with("room_"));
    }

    #[test]
    fn admin_secret_not_serialized() {
        let room = make_room();
        let json = serde_json::to_string(&room).unwrap();
        assert!(!json.contains("SECRET"));
        assert!(!json.contains("adminSecret"));
        assert!(json.contains("\"phase\":\"lobby\""));
        assert!(json.contains("\"questionActive\":false"));
    }

    #[test]
    fn admin_secret_check() {
        let room = make_room();
        assert!(room.check_admin_secret("SECRET"));
        assert!(!room.check_admin_secret("wrong"));
        assert!(!room.check_admin_secret("SECREX"));
        assert!(!room.check_admin_secret(""));
    }

    #[test]
    fn phase_parse_and_display() {
        for phase in [Phase::Lobby, Phase::Ready, Phase::Started, Phase::Finished] {
            assert_eq!(phase.as_str().parse::<Phase>().unwrap(), phase);
            assert_eq!(phase.to_string(), phase.as_str());
        }
        assert!("paused".parse::<Phase>().is_err());
    }

    #[test]
    fn upsert_keeps_counters() {
        let mut room = make_room();
        room.upsert_player("u1", "b1", "Alice");
        room.set_phase(Phase::Started);
        room.register_click("u1", "b1", 2_000);
        let p = room.upsert_player("u1", "b2", "Alicia");
        assert_eq!(p.name, "Alicia");
        assert_eq!(p.button_id, "b2");
        assert_eq!(p.click_count, 1);
    }

    #[test]
    fn join_team_moves_between_rosters() {
        let mut room = make_room();
        let a = room.create_team("A", "#f00", 1).id.clone();
        let b = room.create_team("B", "#00f", 1).id.clone();
        room.join_team("u0", "Zed", &b);

        assert_eq!(room.join_team("u1", "Alice", &a).as_deref(), Some("A"));
        assert!(room.teams[&a].has_member("u1"));

        assert_eq!(room.join_team("u1", "Alice", &b).as_deref(), Some("B"));
        assert!(!room.teams[&a].has_member("u1"));
        assert_eq!(room.teams[&b].players, vec!["u0".to_string(), "u1".to_string()]);
        assert_eq!(room.teams.values().filter(|t| t.has_member("u1")).count(), 1);
    }

    #[test]
    fn join_same_team_twice_keeps_single_entry() {
        let mut room = make_room();
        let a = room.create_team("A", "#f00", 1).id.clone();
        room.join_team("u1", "Alice", &a);
        room.join_team("u1", "Alice", &a);
        assert_eq!(room.teams[&a].players, vec!["u1".to_string()]);
    }

    #[test]
    fn join_missing_team_still_renames() {
        let mut room = make_room();
        room.upsert_player("u1", "b1", "Alice");
        assert!(room.join_team("u1", "Alicia", "team_missing").is_none());
        assert_eq!(room.players["u1"].name, "Alicia");
        assert_eq!(room.players["u1"].button_id, "b1");
    }

    #[test]
    fn click_auto_creates_player() {
        let mut room = make_room();
        let outcome = room.register_click("u9", "b9", 5_000);
        assert!(outcome.false_start);
        let p = &room.players["u9"];
        assert_eq!(p.name, "Player u9");
        assert_eq!(p.click_count, 1);
        assert_eq!(p.false_starts, 1);
        assert_eq!(p.last_click, Some(5_000));
    }

    #[test]
    fn click_before_enable_at_is_false_start() {
        let mut room = make_room();
        let epoch = room.arm_ready(10_000, 3_000);
        assert!(room.complete_ready(epoch));
        assert_eq!(room.phase, Phase::Started);
        assert!(room.register_click("u1", "b", 12_999).false_start);
        assert!(!room.register_click("u1", "b", 13_000).false_start);
        assert_eq!(room.players["u1"].false_starts, 1);
        assert_eq!(room.players["u1"].click_count, 2);
    }

    #[test]
    fn stale_ready_timer_is_ignored() {
        let mut room = make_room();
        let epoch = room.arm_ready(0, 5_000);
        room.set_phase(Phase::Lobby);
        assert!(!room.complete_ready(epoch));
        assert_eq!(room.phase, Phase::Lobby);

        let first = room.arm_ready(0, 5_000);
        let second = room.arm_ready(100, 5_000);
        assert!(!room.complete_ready(first));
        assert_eq!(room.phase, Phase::Ready);
        assert!(room.complete_ready(second));
        assert_eq!(room.phase, Phase::Started);
    }

    #[test]
    fn first_answerer_set_once_per_question() {
        let mut room = make_room();
        room.set_phase(Phase::Started);
        assert!(!room.register_click("u1", "b", 10).first_answer);
        assert!(room.first_answerer.is_none());

        room.activate_question(20);
        assert!(room.register_click("u2", "b", 30).first_answer);
        assert!(!room.register_click("u1", "b", 31).first_answer);
        assert_eq!(room.first_answerer.as_deref(), Some("u2"));

        room.activate_question(40);
        assert!(room.first_answerer.is_none());
        assert_eq!(room.question_start_time, Some(40));
    }

    #[test]
    fn question_timer_respects_epoch() {
        let mut room = make_room();
        let first = room.activate_question(0);
        let second = room.activate_question(10);
        assert!(!room.expire_question(first));
        assert!(room.question_active);
        assert!(room.expire_question(second));
        assert!(!room.question_active);
        assert!(!room.expire_question(second));

        let epoch = room.activate_question(20);
        room.deactivate_question();
        assert!(!room.expire_question(epoch));
    }

    #[test]
    fn idle_detection() {
        let mut room = make_room();
        room.touch(10_000);
        assert!(!room.is_idle(10_500, 1_000));
        assert!(room.is_idle(11_000, 1_000));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn phase_strategy() -> impl Strategy<Value = Phase> {
            prop_oneof![Just(Phase::Lobby), Just(Phase::Ready)]
        }

        proptest! {
            #[test]
            fn clicks_outside_started_are_all_false_starts(
                phase in phase_strategy(),
                times in proptest::collection::vec(0i64..1_000_000, 1..40),
            ) {
                let mut room = make_room();
                room.set_phase(phase);
                for &t in &times {
                    prop_assert!(room.register_click("u1", "b", t).false_start);
                }
                let p = &room.players["u1"];
                prop_assert_eq!(p.click_count as usize, times.len());
                prop_assert_eq!(p.false_starts as usize, times.len());
            }

            #[test]
            fn clicks_after_enable_at_are_clean(
                start in 0i64..1_000_000,
                delay in 0u64..10_000,
                offsets in proptest::collection::vec(0i64..100_000, 1..40),
            ) {
                let mut room = make_room();
                let epoch = room.arm_ready(start, delay);
                prop_assert!(room.complete_ready(epoch));
                let enable_at = room.enable_at.unwrap();
                for &o in &offsets {
                    prop_assert!(!room.register_click("u1", "b", enable_at + o).false_start);
                }
                let p = &room.players["u1"];
                prop_assert_eq!(p.click_count as usize, offsets.len());
                prop_assert_eq!(p.false_starts, 0);
            }

            #[test]
            fn player_on_at_most_one_team(
                moves in proptest::collection::vec((0usize..4, 0usize..3), 1..60),
            ) {
                let mut room = make_room();
                let teams: Vec<String> = (0..3)
                    .map(|i| room.create_team(&format!("T{i}"), "#fff", 0).id.clone())
                    .collect();
                for (user, team) in &moves {
                    room.join_team(&format!("u{user}"), "n", &teams[*team]);
                }
                for user in 0..4 {
                    let id = format!("u{user}");
                    let memberships: usize = room
                        .teams
                        .values()
                        .map(|t| t.players.iter().filter(|p| **p == id).count())
                        .sum();
                    prop_assert!(memberships <= 1);
                }
                let (last_user, last_team) = moves[moves.len() - 1];
                let expected = format!("u{last_user}");
                let roster = &room.teams[&teams[last_team]].players;
                prop_assert!(roster.last() == Some(&expected));
            }
        }
    }
}
