use serde::{Deserialize, Serialize};

/// Task priority level.
///
/// Persisted and sorted by its numeric value: HIGH (3) > MEDIUM (2) > LOW (1).
/// Declaration order matches so the derived `Ord` agrees with the stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    /// Numeric sort/storage value
    pub fn value(&self) -> i32 {
        match self {
            Self::High => 3,
            Self::Medium => 2,
            Self::Low => 1,
        }
    }

    /// Parse priority from a tag like "HIGH" (case-insensitive)
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.to_uppercase().as_str() {
            "HIGH" => Some(Self::High),
            "MEDIUM" => Some(Self::Medium),
            "LOW" => Some(Self::Low),
            _ => None,
        }
    }

    /// Convert priority to a display tag
    pub fn to_tag(&self) -> &'static str {
        match self {
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        }
    }

    /// Get all priorities, highest first
    pub fn all() -> &'static [Priority] {
        &[Priority::High, Priority::Medium, Priority::Low]
    }
}

impl Default for Priority {
    // Creation default per the task lifecycle
    fn default() -> Self {
        Priority::Low
    }
}

impl From<Priority> for i32 {
    fn from(priority: Priority) -> Self {
        priority.value()
    }
}

impl From<i32> for Priority {
    // Unknown values fall back to LOW, matching the creation default
    fn from(value: i32) -> Self {
        match value {
            3 => Self::High,
            2 => Self::Medium,
            _ => Self::Low,
        }
    }
}
