use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

pub type Timestamp = DateTime<Utc>;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }

    /// Higher rank sorts first in the priority view.
    pub fn rank(self) -> u8 {
        match self {
            Priority::High => 3,
            Priority::Medium => 2,
            Priority::Low => 1,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            other => Err(format!("unknown priority `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    #[default]
    Personal,
    Work,
    Shopping,
    Health,
    Other,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Personal => "personal",
            Category::Work => "work",
            Category::Shopping => "shopping",
            Category::Health => "health",
            Category::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "personal" => Ok(Category::Personal),
            "work" => Ok(Category::Work),
            "shopping" => Ok(Category::Shopping),
            "health" => Ok(Category::Health),
            "other" => Ok(Category::Other),
            other => Err(format!("unknown category `{other}`")),
        }
    }
}

/// A single to-do entry as persisted and exported.
///
/// `completed_at` is `Some` exactly when `completed` is true; the store maintains this.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub name: String,
    pub priority: Priority,
    pub category: Category,
    #[serde(default, with = "iso::date_opt")]
    pub due_date: Option<NaiveDate>,
    #[serde(default, with = "iso::time_opt")]
    pub due_time: Option<NaiveTime>,
    #[serde(default)]
    pub completed: bool,
    #[serde(with = "iso::timestamp")]
    pub created_at: Timestamp,
    #[serde(default, with = "iso::timestamp_opt")]
    pub completed_at: Option<Timestamp>,
}

/// User input for a new task. Identity and completion fields are assigned by the store.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDraft {
    pub name: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub category: Category,
    #[serde(default, with = "iso::date_opt")]
    pub due_date: Option<NaiveDate>,
    #[serde(default, with = "iso::time_opt")]
    pub due_time: Option<NaiveTime>,
}

impl TaskDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    pub fn due(mut self, date: NaiveDate, time: Option<NaiveTime>) -> Self {
        self.due_date = Some(date);
        self.due_time = time;
        self
    }
}

/// Editable fields of an existing task. `None` leaves a field untouched; for the due
/// fields `Some(None)` clears the value.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub name: Option<String>,
    pub priority: Option<Priority>,
    pub category: Option<Category>,
    pub due_date: Option<Option<NaiveDate>>,
    pub due_time: Option<Option<NaiveTime>>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.priority.is_none()
            && self.category.is_none()
            && self.due_date.is_none()
            && self.due_time.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default = "default_avatar")]
    pub avatar: String,
    #[serde(default = "default_theme")]
    pub theme: String,
    #[serde(default = "default_true")]
    pub show_welcome: bool,
    #[serde(default)]
    pub sound_notifications: bool,
    #[serde(default = "default_true")]
    pub auto_save: bool,
    #[serde(default, with = "iso::timestamp_opt")]
    pub last_updated: Option<Timestamp>,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            name: String::new(),
            email: String::new(),
            avatar: default_avatar(),
            theme: default_theme(),
            show_welcome: true,
            sound_notifications: false,
            auto_save: true,
            last_updated: None,
        }
    }
}

impl Profile {
    pub fn welcome_message(&self) -> Option<String> {
        let name = self.name.trim();
        if self.show_welcome && !name.is_empty() {
            Some(format!("Welcome back, {name}!"))
        } else {
            None
        }
    }
}

fn default_avatar() -> String {
    "👤".to_string()
}

fn default_theme() -> String {
    "default".to_string()
}

fn default_true() -> bool {
    true
}

/// ISO-8601 wire formats shared by the persisted collection, exports and imports.
///
/// Dates are `YYYY-MM-DD`, times `HH:MM`, timestamps RFC 3339 in UTC with millisecond
/// precision. Empty strings for the optional date/time fields read as absent, which is
/// how browser form values arrive.
pub mod iso {
    use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, Utc};

    use super::Timestamp;

    pub const DATE_FORMAT: &str = "%Y-%m-%d";
    pub const TIME_FORMAT: &str = "%H:%M";

    pub fn parse_date(raw: &str) -> Result<NaiveDate, chrono::ParseError> {
        NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
    }

    pub fn parse_time(raw: &str) -> Result<NaiveTime, chrono::ParseError> {
        let raw = raw.trim();
        NaiveTime::parse_from_str(raw, TIME_FORMAT)
            .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
    }

    pub fn parse_timestamp(raw: &str) -> Result<Timestamp, chrono::ParseError> {
        DateTime::parse_from_rfc3339(raw.trim()).map(|dt| dt.with_timezone(&Utc))
    }

    pub fn format_timestamp(ts: &Timestamp) -> String {
        ts.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub mod timestamp {
        use serde::{Deserialize, Deserializer, Serializer};

        use super::super::Timestamp;

        pub fn serialize<S>(ts: &Timestamp, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            serializer.serialize_str(&super::format_timestamp(ts))
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Timestamp, D::Error>
        where
            D: Deserializer<'de>,
        {
            let raw = String::deserialize(deserializer)?;
            super::parse_timestamp(&raw).map_err(serde::de::Error::custom)
        }
    }

    pub mod timestamp_opt {
        use serde::{Deserialize, Deserializer, Serializer};

        use super::super::Timestamp;

        pub fn serialize<S>(ts: &Option<Timestamp>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match ts {
                Some(ts) => serializer.serialize_str(&super::format_timestamp(ts)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Timestamp>, D::Error>
        where
            D: Deserializer<'de>,
        {
            match Option::<String>::deserialize(deserializer)? {
                Some(raw) if !raw.trim().is_empty() => super::parse_timestamp(&raw)
                    .map(Some)
                    .map_err(serde::de::Error::custom),
                _ => Ok(None),
            }
        }
    }

    pub mod date_opt {
        use chrono::NaiveDate;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S>(date: &Option<NaiveDate>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match date {
                Some(date) => serializer.serialize_str(&date.format(super::DATE_FORMAT).to_string()),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
        where
            D: Deserializer<'de>,
        {
            match Option::<String>::deserialize(deserializer)? {
                Some(raw) if !raw.trim().is_empty() => super::parse_date(&raw)
                    .map(Some)
                    .map_err(serde::de::Error::custom),
                _ => Ok(None),
            }
        }
    }

    pub mod time_opt {
        use chrono::NaiveTime;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S>(time: &Option<NaiveTime>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match time {
                Some(time) => serializer.serialize_str(&time.format(super::TIME_FORMAT).to_string()),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveTime>, D::Error>
        where
            D: Deserializer<'de>,
        {
            match Option::<String>::deserialize(deserializer)? {
                Some(raw) if !raw.trim().is_empty() => super::parse_time(&raw)
                    .map(Some)
                    .map_err(serde::de::Error::custom),
                _ => Ok(None),
            }
        }
    }
}
