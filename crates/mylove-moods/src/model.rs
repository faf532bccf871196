//! Mood entry types

use chrono::{DateTime, Local, NaiveDate};
use mylove_store::RecordId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Longest note a mood entry may carry, in characters
pub const MAX_NOTE_LENGTH: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoodType {
    Loved,
    Happy,
    Content,
    Excited,
    Thoughtful,
    Grateful,
    Sad,
    Anxious,
    Frustrated,
    Angry,
    Lonely,
    Tired,
}

impl MoodType {
    pub const ALL: [MoodType; 12] = [
        MoodType::Loved,
        MoodType::Happy,
        MoodType::Content,
        MoodType::Excited,
        MoodType::Thoughtful,
        MoodType::Grateful,
        MoodType::Sad,
        MoodType::Anxious,
        MoodType::Frustrated,
        MoodType::Angry,
        MoodType::Lonely,
        MoodType::Tired,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MoodType::Loved => "loved",
            MoodType::Happy => "happy",
            MoodType::Content => "content",
            MoodType::Excited => "excited",
            MoodType::Thoughtful => "thoughtful",
            MoodType::Grateful => "grateful",
            MoodType::Sad => "sad",
            MoodType::Anxious => "anxious",
            MoodType::Frustrated => "frustrated",
            MoodType::Angry => "angry",
            MoodType::Lonely => "lonely",
            MoodType::Tired => "tired",
        }
    }
}

impl fmt::Display for MoodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MoodType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        MoodType::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown mood '{}'", s))
    }
}

/// One day's mood
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoodEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    pub user_id: String,
    /// Primary mood, always the first of `moods`
    pub mood: MoodType,
    #[serde(default)]
    pub moods: Vec<MoodType>,
    #[serde(default)]
    pub note: String,
    /// Local calendar day, stored as `YYYY-MM-DD`
    pub date: NaiveDate,
    pub timestamp: DateTime<Local>,
    pub synced: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supabase_id: Option<String>,
}
