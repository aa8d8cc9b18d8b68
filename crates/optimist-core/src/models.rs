//! Data models
//!
//! `Widget` is the demo record the CLI works with. Any serde-compatible
//! record works with the sync engine; widgets just come with ready-made
//! field accessors and SQL templates.

use serde::{Deserialize, Deserializer, Serialize};

use crate::field::Field;

/// A widget row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Widget {
    /// Server-assigned primary key; `None` until a creation is confirmed
    #[serde(default)]
    pub id: Option<i64>,
    pub description: String,
    #[serde(deserialize_with = "bool_from_sql")]
    pub active: bool,
}

impl Widget {
    /// A widget that has not been stored yet
    pub fn new(description: impl Into<String>, active: bool) -> Self {
        Self {
            id: None,
            description: description.into(),
            active,
        }
    }

    /// A widget as loaded from storage
    pub fn with_id(id: i64, description: impl Into<String>, active: bool) -> Self {
        Self {
            id: Some(id),
            description: description.into(),
            active,
        }
    }

    /// Primary key accessor
    pub fn id_field() -> Field<Widget, Option<i64>> {
        Field::new("id", |w| w.id, |w, v| w.id = v)
    }

    pub fn active_field() -> Field<Widget, bool> {
        Field::new("active", |w| w.active, |w, v| w.active = v)
    }
}

/// SQLite has no boolean type; accept `true`/`false` as well as `1`/`0`
fn bool_from_sql<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum SqlBool {
        Bool(bool),
        Int(i64),
    }

    Ok(match SqlBool::deserialize(deserializer)? {
        SqlBool::Bool(b) => b,
        SqlBool::Int(i) => i != 0,
    })
}
