//! The item types shared by every feed source.
//!
//! A [`CandidateItem`] is one entry from one poll of one source.  It lives
//! only for the duration of a cycle; the only thing the engine remembers about
//! it afterwards is its permalink, recorded once it has been delivered.
//!
//! ## For contributors
//!
//! If you are adding a new feed source you do **not** need to modify this
//! file.  Convert your native entries into `CandidateItem` values and wrap
//! them in a [`Feed`].

/// A single feed entry, normalised from any feed format.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CandidateItem {
    /// Headline.  Empty when the feed entry has none.
    pub title: String,

    /// Description or summary text.  Empty when the feed entry has none.
    pub summary: String,

    /// URL of the full article.
    ///
    /// This is the dedup identity: an item with an empty permalink can never
    /// be delivered.
    pub permalink: String,
}

impl CandidateItem {
    pub fn new(
        title: impl Into<String>,
        summary: impl Into<String>,
        permalink: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            summary: summary.into(),
            permalink: permalink.into(),
        }
    }
}

/// The result of polling one source.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Feed {
    /// The feed's own title, if the format carries one.
    pub title: Option<String>,

    /// Entries in feed order.  Feeds conventionally list the newest entry
    /// first, and the engine's window policy relies on that.
    pub items: Vec<CandidateItem>,
}

impl Feed {
    pub fn new(title: Option<String>, items: Vec<CandidateItem>) -> Self {
        Self { title, items }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
