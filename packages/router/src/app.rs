//! The contract between the router and mounted applications.

use std::sync::Arc;

use futures_util::future::LocalBoxFuture;

use crate::error::NavigationError;
use crate::route::Route;

/// A mountable (micro-frontend style) application the router drives.
///
/// Routes bind to an application by name via
/// [`RouteConfig::app`](crate::RouteConfig::app). After a navigation commits,
/// the router unmounts the previously active application (if it changed),
/// mounts the new one, and calls [`update`](MountedApp::update) when the
/// active application stays the same. [`Router::restart_app`] forces an
/// unmount/mount cycle even without an application change.
///
/// Mount and unmount failures surface as
/// [`NavigationError::Application`]; the navigation itself stays committed.
///
/// [`Router::restart_app`]: crate::Router::restart_app
pub trait MountedApp: Send + Sync {
    /// Mount the application for `route`.
    fn mount(&self, route: Arc<Route>) -> LocalBoxFuture<'_, Result<(), NavigationError>>;

    /// Unmount the application. `route` is the route being navigated to.
    fn unmount(&self, route: Arc<Route>) -> LocalBoxFuture<'_, Result<(), NavigationError>>;

    /// The active application stays mounted but the route changed beneath
    /// it. Defaults to doing nothing.
    fn update(&self, route: Arc<Route>) -> LocalBoxFuture<'_, Result<(), NavigationError>> {
        let _ = route;
        Box::pin(async { Ok(()) })
    }

    /// Render the application for `route` to a string, for server-side
    /// rendering. Defaults to [`NavigationError::Unsupported`].
    fn render_to_string(
        &self,
        route: Arc<Route>,
    ) -> LocalBoxFuture<'_, Result<String, NavigationError>> {
        let _ = route;
        Box::pin(async { Err(NavigationError::Unsupported) })
    }
}
