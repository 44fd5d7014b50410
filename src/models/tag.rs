use serde::{Deserialize, Serialize};

/// Represents the 'tags' table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TagName {
    pub name: String,
}

/// A 'post_tags' junction row with its tag embedded.
#[derive(Debug, Clone, Deserialize)]
pub struct TagLink {
    #[serde(default)]
    pub tag: Option<TagName>,
}
