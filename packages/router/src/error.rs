use thiserror::Error;

/// Boxed error type carried by guard and loader failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failures a navigation can surface.
///
/// Expected control-flow outcomes (a denied guard, a superseded navigation, a
/// history boundary) are *not* errors; they are reported through
/// [`NavigationOutcome`](crate::NavigationOutcome). This enum is reserved for
/// genuine failures: a guard or component loader that threw, a mounted
/// application that failed, or malformed input.
#[derive(Debug, Error)]
pub enum NavigationError {
    /// A route's `handle` hook was invoked a second time.
    #[error("route handle invoked more than once")]
    HandleAlreadyInvoked,

    /// A path pattern in the route configuration could not be compiled.
    #[error("invalid route pattern `{pattern}`: {reason}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Why compilation failed.
        reason: String,
    },

    /// A navigation target could not be resolved into a URL.
    #[error("invalid navigation target `{target}`: {reason}")]
    InvalidTarget {
        /// The raw target.
        target: String,
        /// Why resolution failed.
        reason: String,
    },

    /// A parameter required to compile a path was not supplied.
    #[error("cannot compile path: missing parameter `{0}`")]
    MissingParameter(String),

    /// A guard returned an error (distinct from a guard *denying* the
    /// navigation).
    #[error("navigation guard failed")]
    Guard(#[source] BoxError),

    /// An async component loader rejected.
    #[error("failed to load component for `{path}`")]
    ComponentLoad {
        /// Absolute path of the route configuration whose loader failed.
        path: String,
        /// The loader's error.
        #[source]
        source: BoxError,
    },

    /// A mounted application's `mount`/`unmount`/`update` failed.
    #[error("mounted application `{app}` failed")]
    Application {
        /// The application-binding identifier.
        app: String,
        /// The application's error.
        #[source]
        source: BoxError,
    },

    /// The operation is not supported by this collaborator (e.g. a mounted
    /// application without server-side rendering).
    #[error("operation not supported")]
    Unsupported,
}
