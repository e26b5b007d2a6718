use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A saved link owned by exactly one user.
///
/// `id` and `created_at` are always assigned by the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Bookmark {
    pub id: String,
    pub title: String,
    pub url: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

/// Insert record for a bookmark that does not exist yet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewBookmark {
    pub title: String,
    pub url: String,
    pub user_id: String,
}

/// Prefixes `https://` when the input carries no http(s) scheme.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

/// Returns the bookmarks whose title or URL contains `query`, ignoring case.
///
/// An empty query returns every bookmark. Input order is preserved.
pub fn filter_bookmarks(items: &[Bookmark], query: &str) -> Vec<Bookmark> {
    if query.is_empty() {
        return items.to_vec();
    }
    let needle = query.to_lowercase();
    items
        .iter()
        .filter(|b| {
            b.title.to_lowercase().contains(&needle) || b.url.to_lowercase().contains(&needle)
        })
        .cloned()
        .collect()
}

/// Sorts newest first. Ties keep their incoming order.
pub fn sort_newest_first(items: &mut [Bookmark]) {
    items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}
