use serde::{Deserialize, Serialize};

use crate::time::Timestamp;

/// Stable player identity as supplied by the client (`userId` on the wire).
pub type UserId = String;

/// A quiz participant. Keyed by `user_id` inside its room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: UserId,
    pub user_id: UserId,
    pub button_id: String,
    pub name: String,
    pub click_count: u32,
    pub false_starts: u32,
    pub last_click: Option<Timestamp>,
    pub connected: bool,
}

impl Player {
    pub fn new(user_id: &str, button_id: &str, name: &str) -> Self {
        Self {
            id: user_id.to_string(),
            user_id: user_id.to_string(),
            button_id: button_id.to_string(),
            name: name.to_string(),
            click_count: 0,
            false_starts: 0,
            last_click: None,
            connected: true,
        }
    }

    /// Name given to a player created implicitly by their first click.
    pub fn placeholder_name(user_id: &str) -> String {
        format!("Player {user_id}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_player_starts_clean() {
        let p = Player::new("u1", "b1", "Alice");
        assert_eq!(p.id, "u1");
        assert_eq!(p.user_id, "u1");
        assert_eq!(p.click_count, 0);
        assert_eq!(p.false_starts, 0);
        assert!(p.last_click.is_none());
        assert!(p.connected);
    }

    #[test]
    fn serializes_camel_case() {
        let p = Player::new("u1", "b1", "Alice");
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["userId"], "u1");
        assert_eq!(json["buttonId"], "b1");
        assert_eq!(json["clickCount"], 0);
        assert_eq!(json["falseStarts"], 0);
        assert!(json["lastClick"].is_null());
    }

    #[test]
    fn placeholder_name_includes_id() {
        assert_eq!(Player::placeholder_name("42"), "Player 42");
    }
}
