//! Types relating to navigation requests and their outcomes.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::route::Route;

/// How a navigation was issued.
///
/// The type is fixed at issuance and never changes; everything derived from
/// it (most importantly [`is_push`](NavigationType::is_push)) is a pure
/// function of this value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NavigationType {
    /// A new record is appended to the history.
    Push,
    /// The current record is overwritten.
    Replace,
    /// A relative move within the history.
    Go,
    /// A single step forward.
    Forward,
    /// A single step back.
    Back,
    /// The target opens in a new platform window.
    PushWindow,
    /// The whole page location is replaced.
    ReplaceWindow,
    /// The current route is re-committed and its application remounted.
    RestartApp,
    /// The target opens as an overlay layer.
    PushLayer,
    /// No navigation semantics (initial resolution, [`Router::resolve`]).
    ///
    /// [`Router::resolve`]: crate::Router::resolve
    None,
    /// A platform-originated move (browser back/forward button) whose
    /// direction is not known.
    Unknown,
}

impl NavigationType {
    /// Whether this type appends to the history rather than moving within or
    /// rewriting it.
    #[must_use]
    pub fn is_push(self) -> bool {
        matches!(self, Self::Push | Self::PushWindow | Self::PushLayer)
    }
}

/// A value extracted for a single path parameter.
///
/// Repeatable parameters (`:x+`, `:x*`) always produce [`Multi`], even when
/// they captured a single repetition. Plain and optional parameters produce
/// [`Single`]. Values are always strings; numeric-looking segments are not
/// coerced.
///
/// [`Multi`]: ParamValue::Multi
/// [`Single`]: ParamValue::Single
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParamValue {
    /// One captured segment.
    Single(String),
    /// One or more captured segments of a repeatable parameter.
    Multi(Vec<String>),
}

impl ParamValue {
    /// The first (or only) captured value.
    #[must_use]
    pub fn first(&self) -> &str {
        match self {
            Self::Single(v) => v,
            Self::Multi(v) => v.first().map(String::as_str).unwrap_or_default(),
        }
    }

    /// All captured values, in order.
    #[must_use]
    pub fn values(&self) -> Vec<&str> {
        match self {
            Self::Single(v) => vec![v.as_str()],
            Self::Multi(v) => v.iter().map(String::as_str).collect(),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Single(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Single(value)
    }
}

impl From<Vec<String>> for ParamValue {
    fn from(values: Vec<String>) -> Self {
        Self::Multi(values)
    }
}

/// Parameters extracted from (or supplied for) a path.
pub type Params = BTreeMap<String, ParamValue>;

/// The single-use result-handling hook a navigation can carry.
///
/// Invoked through [`Route::invoke_handle`]; a second invocation fails with
/// [`NavigationError::HandleAlreadyInvoked`](crate::NavigationError::HandleAlreadyInvoked).
pub type HandleFn = Arc<dyn Fn(&Route) -> Value + Send + Sync>;

/// Configuration of an overlay layer opened by a [`PushLayer`] navigation.
///
/// Layers are nested router instances; their internals are owned by the host
/// and opaque to this engine, which only carries the configuration along on
/// the resolved [`Route`].
///
/// [`PushLayer`]: NavigationType::PushLayer
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Layer {
    /// Host-defined layer options.
    pub options: Value,
}

/// A structured navigation request.
///
/// Every field is optional; a default [`Location`] resolves to the current
/// URL. Strings convert into a [`Location`] via its path.
#[derive(Clone, Default)]
pub struct Location {
    /// Target path, absolute URL, or relative reference.
    pub path: Option<String>,
    /// Query overrides. `None` values delete the key.
    pub query: BTreeMap<String, Option<String>>,
    /// Multi-value query overrides; all values for a key are set at once.
    pub query_array: BTreeMap<String, Vec<String>>,
    /// Explicit parameter values; the matched path is re-compiled with them.
    pub params: Params,
    /// Fragment override, without the leading `#`.
    pub hash: Option<String>,
    /// State bag committed with the record. Deep-copied into the route.
    pub state: Option<Value>,
    /// Skip scroll restoration when this record becomes current.
    pub keep_scroll_position: bool,
    /// Status code attached to the resolved route (useful for SSR).
    pub status_code: Option<u16>,
    /// Single-use result-handling hook.
    pub handle: Option<HandleFn>,
    /// Layer configuration; only meaningful for layer-opening navigations.
    pub layer: Option<Layer>,
}

impl Location {
    /// A location targeting `path`.
    pub fn path(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Default::default()
        }
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Location")
            .field("path", &self.path)
            .field("query", &self.query)
            .field("query_array", &self.query_array)
            .field("params", &self.params)
            .field("hash", &self.hash)
            .field("state", &self.state)
            .field("keep_scroll_position", &self.keep_scroll_position)
            .field("status_code", &self.status_code)
            .field("layer", &self.layer)
            .finish_non_exhaustive()
    }
}

/// A target for the router to navigate to.
#[derive(Clone, Debug)]
pub enum NavigationTarget {
    /// A location resolved against the router's base.
    Internal(Location),
    /// A URL outside the router's base. Bypasses matching and guards
    /// entirely; handled by the platform window/location primitives or the
    /// host's external handler.
    External(String),
}

impl From<Location> for NavigationTarget {
    fn from(location: Location) -> Self {
        Self::Internal(location)
    }
}

impl From<&str> for NavigationTarget {
    fn from(path: &str) -> Self {
        Self::Internal(Location::path(path))
    }
}

impl From<String> for NavigationTarget {
    fn from(path: String) -> Self {
        Self::Internal(Location::path(path))
    }
}

/// How a finished navigation resolved.
///
/// Callers branch on this status instead of catching exceptions; only genuine
/// failures surface as [`NavigationError`](crate::NavigationError).
#[derive(Clone, Debug)]
pub enum NavigationOutcome {
    /// The navigation ran the full pipeline and is now the current route.
    Committed(Arc<Route>),
    /// A guard denied the navigation, or a newer navigation superseded it.
    /// The current route was left untouched.
    Aborted,
    /// Nothing to do: the target was the current route already, `go(0)`, or
    /// a history move outside the stack bounds.
    None,
    /// The target was external and was delegated to the platform; matching,
    /// guards and the route model were bypassed.
    External,
}

impl NavigationOutcome {
    /// The committed route, if the navigation committed.
    #[must_use]
    pub fn committed(&self) -> Option<&Arc<Route>> {
        match self {
            Self::Committed(route) => Some(route),
            _ => None,
        }
    }

    /// Whether the navigation committed.
    #[must_use]
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed(_))
    }

    /// Whether the navigation was denied or superseded.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}

/// The result every navigation entry point resolves to.
pub type NavigationResult = Result<NavigationOutcome, crate::NavigationError>;
