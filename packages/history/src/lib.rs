#![doc = include_str!("../README.md")]
#![deny(missing_docs)]

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

mod memory;
pub use memory::*;

#[cfg(feature = "web")]
mod web;
#[cfg(feature = "web")]
pub use web::*;

/// A single committed navigation record, as stored by a [`HistoryProvider`].
///
/// This is what survives a navigation: the full path (including query and
/// hash) plus the serializable state bag that travels with it. The browser
/// backend round-trips this through `history.state`, the memory backend keeps
/// it on its stack.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Full path of the record, e.g. `/users/123?tab=posts#bio`.
    pub full_path: String,
    /// Arbitrary state attached to the record. Deep-copied on clone.
    #[serde(default)]
    pub state: Value,
    /// Whether scroll restoration should be skipped when this record becomes
    /// current again.
    #[serde(default)]
    pub keep_scroll_position: bool,
}

impl HistoryEntry {
    /// Create an entry for `full_path` with an empty state bag.
    pub fn new(full_path: impl Into<String>) -> Self {
        Self {
            full_path: full_path.into(),
            state: Value::Null,
            keep_scroll_position: false,
        }
    }

    /// The entry every fresh history starts out on.
    pub fn root() -> Self {
        Self::new("/")
    }
}

/// A saved scroll offset, keyed by full path in the provider's restore map.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScrollPosition {
    /// Horizontal offset in pixels.
    pub x: f64,
    /// Vertical offset in pixels.
    pub y: f64,
}

/// Callback invoked when the backing store changes underneath the router
/// (e.g. a browser back/forward button press).
pub type HistoryCallback = Arc<dyn Fn() + Send + Sync>;

/// An integration with some kind of navigation history.
///
/// A [`HistoryProvider`] is the *backing store* of committed navigations. It
/// never runs guards and never resolves routes; the router drives the full
/// transition and only calls into the provider at the instant a navigation
/// commits, so the store and the router's current route cannot diverge.
///
/// Two implementations ship with this crate: [`MemoryHistory`], an in-process
/// stack for server-side rendering and tests, and `WebHistory` (behind the
/// `web` feature), which delegates to the browser's History API.
pub trait HistoryProvider {
    /// Called once when the router takes ownership of the provider.
    fn init(&mut self) {}

    /// Called when the router shuts down. Providers that registered platform
    /// listeners drop them here.
    fn destroy(&mut self) {}

    /// The record the store currently points at, if any.
    #[must_use]
    fn current(&self) -> Option<HistoryEntry>;

    /// Whether there is an earlier record to go back to.
    ///
    /// Providers that cannot know should return `true`.
    #[must_use]
    fn can_go_back(&self) -> bool {
        true
    }

    /// Whether there is a later record to go forward to.
    ///
    /// Providers that cannot know should return `true`.
    #[must_use]
    fn can_go_forward(&self) -> bool {
        true
    }

    /// The record `delta` steps away from the current one, without moving.
    ///
    /// Returns `None` when the target is out of range, or when the provider
    /// cannot address its records by index (the browser backend); in the
    /// latter case the actual move is event-driven and reported through the
    /// [`updater`](HistoryProvider::updater) callback.
    #[must_use]
    fn peek(&self, delta: isize) -> Option<HistoryEntry>;

    /// Commit a new record after the current one, dropping any forward
    /// records.
    fn push(&mut self, entry: HistoryEntry);

    /// Overwrite the current record in place.
    fn replace(&mut self, entry: HistoryEntry);

    /// Move the store `delta` steps. Out-of-range deltas are clamped by
    /// providers that own their stack and delegated natively otherwise.
    fn travel(&mut self, delta: isize);

    /// Scroll the viewport to `position`. Providers without a viewport
    /// ignore this.
    #[allow(unused_variables)]
    fn scroll_to(&mut self, position: ScrollPosition) {}

    /// Replace the whole page location with an external URL.
    ///
    /// Returns `false` if the provider cannot leave the application, in which
    /// case the router falls back to its external-navigation handler.
    #[allow(unused_variables)]
    fn external(&mut self, url: String) -> bool {
        false
    }

    /// Open an external URL in a new platform window.
    ///
    /// Returns `false` if the provider has no concept of windows.
    #[allow(unused_variables)]
    fn open_window(&mut self, url: String) -> bool {
        false
    }

    /// Provide the [`HistoryProvider`] with an update callback.
    ///
    /// Providers that receive navigation events from outside the router (the
    /// browser's back/forward buttons) call `callback` when such an event
    /// arrives, which causes the router to re-derive the current location and
    /// run a transition for it.
    #[allow(unused_variables)]
    fn updater(&mut self, callback: HistoryCallback) {}

    /// Register a callback invoked when a back navigation is requested at the
    /// oldest record of the session.
    ///
    /// Only meaningful for providers whose store outlives the application
    /// (the browser backend). Providers that own their stack simply clamp.
    #[allow(unused_variables)]
    fn on_history_exhausted(&mut self, callback: HistoryCallback) {}
}
