use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::reactions;

/// The closed set of emoji reaction kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionType {
    Like,
    Love,
    Laugh,
    Wow,
    Sad,
    Angry,
    Fire,
    Rocket,
    Eyes,
    Clap,
    Pray,
    Muscle,
    Brain,
    HeartEyes,
    Sunglasses,
    Party,
    Star,
    ThumbsUp,
    ThumbsDown,
    Check,
}

impl ReactionType {
    pub const ALL: [ReactionType; 20] = [
        ReactionType::Like,
        ReactionType::Love,
        ReactionType::Laugh,
        ReactionType::Wow,
        ReactionType::Sad,
        ReactionType::Angry,
        ReactionType::Fire,
        ReactionType::Rocket,
        ReactionType::Eyes,
        ReactionType::Clap,
        ReactionType::Pray,
        ReactionType::Muscle,
        ReactionType::Brain,
        ReactionType::HeartEyes,
        ReactionType::Sunglasses,
        ReactionType::Party,
        ReactionType::Star,
        ReactionType::ThumbsUp,
        ReactionType::ThumbsDown,
        ReactionType::Check,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReactionType::Like => "like",
            ReactionType::Love => "love",
            ReactionType::Laugh => "laugh",
            ReactionType::Wow => "wow",
            ReactionType::Sad => "sad",
            ReactionType::Angry => "angry",
            ReactionType::Fire => "fire",
            ReactionType::Rocket => "rocket",
            ReactionType::Eyes => "eyes",
            ReactionType::Clap => "clap",
            ReactionType::Pray => "pray",
            ReactionType::Muscle => "muscle",
            ReactionType::Brain => "brain",
            ReactionType::HeartEyes => "heart_eyes",
            ReactionType::Sunglasses => "sunglasses",
            ReactionType::Party => "party",
            ReactionType::Star => "star",
            ReactionType::ThumbsUp => "thumbs_up",
            ReactionType::ThumbsDown => "thumbs_down",
            ReactionType::Check => "check",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.as_str() == value)
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            ReactionType::Like => "👍",
            ReactionType::Love => "❤️",
            ReactionType::Laugh => "😂",
            ReactionType::Wow => "😮",
            ReactionType::Sad => "😢",
            ReactionType::Angry => "😠",
            ReactionType::Fire => "🔥",
            ReactionType::Rocket => "🚀",
            ReactionType::Eyes => "👀",
            ReactionType::Clap => "👏",
            ReactionType::Pray => "🙏",
            ReactionType::Muscle => "💪",
            ReactionType::Brain => "🧠",
            ReactionType::HeartEyes => "😍",
            ReactionType::Sunglasses => "😎",
            ReactionType::Party => "🎉",
            ReactionType::Star => "⭐",
            ReactionType::ThumbsUp => "👍",
            ReactionType::ThumbsDown => "👎",
            ReactionType::Check => "✅",
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = reactions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Reaction {
    pub id: Uuid,
    pub post_id: Uuid,
    pub user_id: Uuid,
    pub reaction_type: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = reactions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewReaction {
    pub id: Uuid,
    pub post_id: Uuid,
    pub user_id: Uuid,
    pub reaction_type: String,
    pub created_at: DateTime<Utc>,
}

impl NewReaction {
    pub fn new(post_id: Uuid, user_id: Uuid, kind: ReactionType, now: DateTime<Utc>) -> Self {
        NewReaction {
            id: Uuid::new_v4(),
            post_id,
            user_id,
            reaction_type: kind.as_str().to_string(),
            created_at: now,
        }
    }
}

/// Per-kind aggregate for a post
#[derive(Debug, Serialize)]
pub struct ReactionCount {
    pub reaction_type: String,
    pub emoji: &'static str,
    pub count: i64,
    pub user_reacted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips_every_kind() {
        for kind in ReactionType::ALL {
            assert_eq!(ReactionType::parse(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn unknown_kind_is_rejected() {
        assert_eq!(ReactionType::parse("shrug"), None);
        assert_eq!(ReactionType::parse(""), None);
    }

    #[test]
    fn snake_case_names_survive_serde() {
        let json = serde_json::to_string(&ReactionType::HeartEyes).unwrap();
        assert_eq!(json, "\"heart_eyes\"");
        let back: ReactionType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ReactionType::HeartEyes);
    }
}
