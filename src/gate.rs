//! Dedup & quota gate.
//!
//! Decides which candidate items a subscriber may receive this cycle.  The
//! gate only reads the [`Subscriber`]; state changes happen in
//! [`Subscriber::record_delivery`] after a delivery has been confirmed, so a
//! failed delivery leaves the item eligible for the next cycle.

use crate::source::CandidateItem;
use crate::subscriber::Subscriber;

/// Outcome of [`admit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    /// Already delivered, or has no permalink to dedup on.
    AlreadySeen,
    /// The subscriber has used up its quota; nothing more is delivered.
    QuotaExhausted,
}

/// Decide whether `item` may be delivered to `subscriber`.
///
/// The quota is checked before the item is considered at all.
pub fn admit(subscriber: &Subscriber, item: &CandidateItem, quota_limit: u32) -> Admission {
    if subscriber.is_exhausted(quota_limit) {
        return Admission::QuotaExhausted;
    }
    if item.permalink.is_empty() || subscriber.has_seen(&item.permalink) {
        return Admission::AlreadySeen;
    }
    Admission::Admitted
}

/// Select the items considered this cycle from one source's list.
///
/// Feeds list newest first, so the newest `size` items are the first `size`
/// in feed order.  They are returned oldest-first so that a batch is
/// delivered in publication order.  Anything past the window is never
/// delivered.
pub fn window(items: &[CandidateItem], size: usize) -> impl Iterator<Item = &CandidateItem> {
    items.iter().take(size).rev()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
