use chrono::{DateTime, Utc};
use mongodb::bson::{self, oid::ObjectId};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{AppError, Result};

/// Grouping category shared by folders and notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Category {
    #[default]
    Personal,
    Academic,
    Work,
    Others,
}

impl std::str::FromStr for Category {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "personal" => Ok(Category::Personal),
            "academic" => Ok(Category::Academic),
            "work" => Ok(Category::Work),
            "others" | "other" => Ok(Category::Others),
            _ => Err(AppError::ValidationError(format!("Invalid category: {}", s))),
        }
    }
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Personal => "Personal",
            Category::Academic => "Academic",
            Category::Work => "Work",
            Category::Others => "Others",
        }
    }
}

/// Publishing target of a draft or an enhancement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Linkedin,
    Twitter,
    Instagram,
    Portfolio,
    Resume,
    Biodata,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Linkedin => "linkedin",
            Platform::Twitter => "twitter",
            Platform::Instagram => "instagram",
            Platform::Portfolio => "portfolio",
            Platform::Resume => "resume",
            Platform::Biodata => "biodata",
        }
    }

    pub fn is_social(&self) -> bool {
        matches!(
            self,
            Platform::Linkedin | Platform::Twitter | Platform::Instagram
        )
    }
}

impl std::str::FromStr for Platform {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "linkedin" => Ok(Platform::Linkedin),
            "twitter" | "x" => Ok(Platform::Twitter),
            "instagram" => Ok(Platform::Instagram),
            "portfolio" => Ok(Platform::Portfolio),
            "resume" => Ok(Platform::Resume),
            "biodata" => Ok(Platform::Biodata),
            _ => Err(AppError::ValidationError(format!("Unsupported platform: {}", s))),
        }
    }
}

pub const DEFAULT_COLOR: &str = "#8B5CF6";

/// Note size in the unit the folder counters use: UTF-16 code units / 1000.
pub fn content_size(content: &str) -> f64 {
    content.encode_utf16().count() as f64 / 1000.0
}

pub fn parse_object_id(raw: &str, what: &str) -> Result<ObjectId> {
    ObjectId::parse_str(raw.trim())
        .map_err(|_| AppError::ValidationError(format!("Invalid {} id", what)))
}

pub fn parse_optional_object_id(raw: Option<&str>, what: &str) -> Result<Option<ObjectId>> {
    match raw.map(str::trim) {
        None | Some("") | Some("null") => Ok(None),
        Some(id) => parse_object_id(id, what).map(Some),
    }
}

pub fn to_utc(dt: bson::DateTime) -> DateTime<Utc> {
    dt.to_chrono()
}

/// Non-blank string with surrounding whitespace removed.
pub fn required_field(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Distinguishes an explicit `null` (`Some(None)`) from an absent field
/// (`None`, via `#[serde(default)]`).
pub fn double_option<'de, T, D>(de: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_counts_utf16_units() {
        assert_eq!(content_size(""), 0.0);
        assert_eq!(content_size("XY"), 0.002);
        // one astral-plane character is two UTF-16 units
        assert_eq!(content_size("💼"), 0.002);
    }

    #[test]
    fn parses_categories_case_insensitively() {
        assert_eq!("work".parse::<Category>().unwrap(), Category::Work);
        assert_eq!("Others".parse::<Category>().unwrap(), Category::Others);
        assert!("misc".parse::<Category>().is_err());
    }

    #[test]
    fn optional_ids_accept_empty_and_null() {
        assert_eq!(parse_optional_object_id(Some(""), "folder").unwrap(), None);
        assert_eq!(parse_optional_object_id(Some("null"), "folder").unwrap(), None);
        assert!(parse_optional_object_id(Some("nope"), "folder").is_err());

        let id = ObjectId::new();
        assert_eq!(
            parse_optional_object_id(Some(&id.to_hex()), "folder").unwrap(),
            Some(id)
        );
    }

    #[test]
    fn serializes_platforms_lowercase() {
        assert_eq!(
            serde_json::to_value(Platform::Linkedin).unwrap(),
            serde_json::json!("linkedin")
        );
        assert!(Platform::Twitter.is_social());
        assert!(!Platform::Resume.is_social());
    }
}
