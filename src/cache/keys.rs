//! Cache key definitions.

use std::fmt;

use crate::domain::types::{ContentTypeId, UserId};

/// Namespace shared by every bookmark cache key.
pub const KEY_PREFIX: &str = "bookmarks:user:";

/// Key of one cached bookmark set: `bookmarks:user:{user_id}:ct:{content_type_id}`.
///
/// Derived only from immutable identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BookmarkKey {
    pub user_id: UserId,
    pub content_type_id: ContentTypeId,
}

impl BookmarkKey {
    pub fn new(user_id: UserId, content_type_id: ContentTypeId) -> Self {
        Self {
            user_id,
            content_type_id,
        }
    }
}

impl fmt::Display for BookmarkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{KEY_PREFIX}{}:ct:{}",
            self.user_id, self.content_type_id
        )
    }
}
