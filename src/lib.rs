//! feed-relay: polls subscribers' feeds and delivers new items as posts.
//!
//! ## Architecture overview
//!
//! ```text
//!                     ┌─────────────┐
//!   front end ──────► │ registry.rs │  subscriber table, add_source/finalize
//!                     └──────┬──────┘
//!                            │ snapshot()
//! ┌───────────┐  fetch  ┌────▼───────┐  render  ┌────────────┐
//! │ source/   │ ◄────── │ monitor.rs │ ───────► │ transform/ │
//! └───────────┘         └────┬───────┘          └────────────┘
//!                            │ admit()   deliver()
//!                     ┌──────▼──┐      ┌───────────┐
//!                     │ gate.rs │      │ delivery/ │
//!                     └─────────┘      └───────────┘
//! ```
//!
//! * **`source/`**: the `FeedSource` trait and the HTTP RSS/Atom source.
//! * **`subscriber`**: the per-subscriber record.
//! * **`registry`**: owns all subscribers; the API a chat front end uses.
//! * **`gate`**: dedup and quota decisions plus the per-source window.
//! * **`transform/`**: the rewrite step and its plain-text fallback.
//! * **`delivery/`**: the `DeliveryChannel` trait and the Telegram channel.
//! * **`monitor`**: the scheduled cycle tying everything together.
//!
//! All state is in memory; a restart forgets every subscriber's history.

pub mod config;
pub mod delivery;
pub mod error;
pub mod gate;
pub mod logging;
pub mod monitor;
pub mod registry;
pub mod source;
pub mod subscriber;
pub mod transform;

#[cfg(test)]
mod testing;
