use std::fmt;

/// Thumbnail lifecycle notification, sent once per transition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ThumbnailEvent {
    Added(String),
    Removed(String),
}

impl ThumbnailEvent {
    pub fn title(&self) -> &str {
        match self {
            ThumbnailEvent::Added(title) | ThumbnailEvent::Removed(title) => title,
        }
    }
}

impl fmt::Display for ThumbnailEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThumbnailEvent::Added(title) => write!(f, "added '{}'", title),
            ThumbnailEvent::Removed(title) => write!(f, "removed '{}'", title),
        }
    }
}
