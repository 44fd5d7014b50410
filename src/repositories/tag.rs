use crate::{
    error::AppError,
    models::tag::Tag,
    query::{Filter, QueryAdapter, QueryDescriptor, escape_like},
    repositories::TAGS,
};

pub const MAX_TAGS: usize = 10;
pub const MAX_TAG_LEN: usize = 30;
const LIST_LIMIT: u64 = 50;

/// Trims, drops a leading `#`, lower-cases and de-duplicates, keeping the
/// first occurrence order. Empty tags vanish.
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let name = tag.trim().trim_start_matches('#').trim().to_lowercase();
        if !name.is_empty() && !out.contains(&name) {
            out.push(name);
        }
    }
    out.truncate(MAX_TAGS);
    out
}

#[derive(Clone)]
pub struct TagRepository {
    db: QueryAdapter,
}

impl TagRepository {
    pub fn new(db: QueryAdapter) -> Self {
        Self { db }
    }

    /// Tags in name order, optionally narrowed to a literal prefix.
    pub async fn list(&self, prefix: Option<&str>) -> Result<Vec<Tag>, AppError> {
        let mut q = QueryDescriptor::from(TAGS)
            .order_by("name", false)
            .limit(LIST_LIMIT);
        if let Some(prefix) = prefix.map(str::trim).filter(|p| !p.is_empty()) {
            let prefix = prefix.trim_start_matches('#').to_lowercase();
            q = q.filter(Filter::ilike("name", format!("{}%", escape_like(&prefix))));
        }
        Ok(self.db.many(&q).await.require()?)
    }

    pub async fn find(&self, name: &str) -> Result<Tag, AppError> {
        let name = normalize_tags(&[name.to_string()]).pop().unwrap_or_default();
        let tag: Option<Tag> = self
            .db
            .maybe_single(&QueryDescriptor::from(TAGS).filter(Filter::eq("name", name)))
            .await
            .into_result()?;
        tag.ok_or_else(|| AppError::NotFound("Tag not found".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_and_dedupes() {
        let tags = vec![
            " Rust ".to_string(),
            "#rust".to_string(),
            "#".to_string(),
            "Async".to_string(),
        ];
        assert_eq!(normalize_tags(&tags), vec!["rust", "async"]);
    }

    #[test]
    fn caps_the_tag_count() {
        let tags: Vec<String> = (0..20).map(|i| format!("t{}", i)).collect();
        assert_eq!(normalize_tags(&tags).len(), MAX_TAGS);
    }
}
