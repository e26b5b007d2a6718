//! Add-bookmark form state.

use serde::Serialize;

use crate::managers::sync_controller::SyncController;
use crate::types::bookmark::Bookmark;
use crate::types::errors::SyncError;

/// The fields of the add form.
///
/// Cleared only after a successful insert so a failed attempt can be
/// retried without retyping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BookmarkDraft {
    pub title: String,
    pub url: String,
}

impl BookmarkDraft {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
        }
    }

    pub async fn submit(&mut self, controller: &SyncController) -> Result<Bookmark, SyncError> {
        let saved = controller.add(&self.title, &self.url).await?;
        self.title.clear();
        self.url.clear();
        Ok(saved)
    }
}
