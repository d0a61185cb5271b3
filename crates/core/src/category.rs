use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The closed set of spending categories a transaction can end up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Groceries,
    Transport,
    Utilities,
    Entertainment,
    Dining,
    Housing,
    Health,
    Income,
    Uncategorized,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Category::Groceries,
        Category::Transport,
        Category::Utilities,
        Category::Entertainment,
        Category::Dining,
        Category::Housing,
        Category::Health,
        Category::Income,
        Category::Uncategorized,
    ];

    /// Terminal fallback; always a valid target.
    pub const DEFAULT: Category = Category::Uncategorized;

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Groceries => "Groceries",
            Category::Transport => "Transport",
            Category::Utilities => "Utilities",
            Category::Entertainment => "Entertainment",
            Category::Dining => "Dining",
            Category::Housing => "Housing",
            Category::Health => "Health",
            Category::Income => "Income",
            Category::Uncategorized => "Uncategorized",
        }
    }

    /// Label set handed to the external classifier.
    pub fn labels() -> Vec<&'static str> {
        Self::ALL.iter().map(|c| c.as_str()).collect()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown category: '{0}'")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    /// Case-insensitive; surrounding whitespace is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

/// Provenance of a transaction's category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategorySource {
    Rule,
    Ai,
    Default,
    Manual,
}

impl CategorySource {
    pub fn as_str(self) -> &'static str {
        match self {
            CategorySource::Rule => "rule",
            CategorySource::Ai => "ai",
            CategorySource::Default => "default",
            CategorySource::Manual => "manual",
        }
    }
}

impl fmt::Display for CategorySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CategorySource {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rule" => Ok(CategorySource::Rule),
            "ai" => Ok(CategorySource::Ai),
            "default" => Ok(CategorySource::Default),
            "manual" => Ok(CategorySource::Manual),
            other => Err(format!("Unknown category source: '{other}'")),
        }
    }
}
