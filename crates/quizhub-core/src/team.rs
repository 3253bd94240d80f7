use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::player::UserId;
use crate::time::Timestamp;

pub type TeamId = String;

/// A team inside a room. `players` is the ordered roster of member user ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    pub color: String,
    pub players: Vec<UserId>,
    pub score: i64,
    pub created_at: Timestamp,
}

impl Team {
    pub fn new(name: &str, color: &str, created_at: Timestamp) -> Self {
        Self {
            id: format!("team_{}", Uuid::new_v4().simple()),
            name: name.to_string(),
            color: color.to_string(),
            players: Vec::new(),
            score: 0,
            created_at,
        }
    }

    pub fn has_member(&self, user_id: &str) -> bool {
        self.players.iter().any(|p| p == user_id)
    }

    /// Drop `user_id` from the roster. Returns true if it was present.
    pub fn remove_member(&mut self, user_id: &str) -> bool {
        let before = self.players.len();
        self.players.retain(|p| p != user_id);
        self.players.len() != before
    }
}
