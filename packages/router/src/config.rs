//! Author-supplied route configuration and its compiled form.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, RwLock};

use futures_util::future::LocalBoxFuture;
use serde_json::{Map, Value};
use tracing::error;

use crate::error::{BoxError, NavigationError};
use crate::matcher::{join_pathname, PathPattern};
use crate::navigation::{HandleFn, NavigationTarget, Params};
use crate::route::Route;

/// An opaque, host-defined component reference.
///
/// The engine never renders; it only stores and hands these out through the
/// matched chain.
pub type Component = Arc<dyn Any + Send + Sync>;

/// An async component loader. Resolved at most once per configuration; the
/// result is assigned back onto the configuration's component slot.
pub type ComponentLoader =
    Arc<dyn Fn() -> LocalBoxFuture<'static, Result<Component, BoxError>> + Send + Sync>;

/// What a guard resolved to.
#[derive(Clone, Debug)]
pub enum GuardResolution {
    /// Continue with the next step.
    Allow,
    /// Deny the navigation. The pipeline stops and the navigation resolves
    /// as aborted.
    Deny,
    /// Stop the pipeline and start a new navigation toward the target,
    /// carrying a `redirected_from` back-reference.
    Redirect(NavigationTarget),
}

/// Result type guards resolve to. An `Err` is a failed navigation, distinct
/// from a denial.
pub type GuardResult = Result<GuardResolution, NavigationError>;

/// An asynchronous navigation guard.
///
/// Receives the route being navigated to and the route being left (if any).
/// Guards run strictly in order; no two guards of one navigation overlap.
pub type Guard =
    Arc<dyn Fn(Arc<Route>, Option<Arc<Route>>) -> LocalBoxFuture<'static, GuardResult> + Send + Sync>;

/// A hook run after a navigation has committed. Cannot influence the
/// navigation anymore.
pub type AfterEach = Arc<dyn Fn(Arc<Route>, Option<Arc<Route>>) + Send + Sync>;

/// How a navigation's result should be handled.
///
/// Resolved once per navigation from a configuration's
/// [`override_handling`](RouteConfig::override_handling) hook; a sum type
/// rather than runtime patching.
pub enum Handling {
    /// The route's own handling applies.
    Default,
    /// Substitute this handler for the navigation.
    Custom(HandleFn),
}

/// Hook that may substitute a non-standard handling function for a route.
pub type OverrideHook = Arc<dyn Fn(&Route) -> Handling + Send + Sync>;

/// A redirect declared on a route configuration.
#[derive(Clone)]
pub enum Redirect {
    /// Always redirect to this target.
    Target(NavigationTarget),
    /// Compute the target from the resolved route.
    Compute(Arc<dyn Fn(&Route) -> NavigationTarget + Send + Sync>),
}

impl Redirect {
    pub(crate) fn resolve(&self, route: &Route) -> NavigationTarget {
        match self {
            Self::Target(target) => target.clone(),
            Self::Compute(compute) => compute(route),
        }
    }
}

impl From<&str> for Redirect {
    fn from(path: &str) -> Self {
        Self::Target(path.into())
    }
}

impl From<NavigationTarget> for Redirect {
    fn from(target: NavigationTarget) -> Self {
        Self::Target(target)
    }
}

impl fmt::Debug for Redirect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Target(target) => f.debug_tuple("Target").field(target).finish(),
            Self::Compute(_) => f.write_str("Compute(..)"),
        }
    }
}

/// A static, author-declared path-to-behavior mapping, possibly nested.
///
/// Constructed once at router creation and compiled into a
/// [`ParsedRouteConfig`]; immutable thereafter. Follows the builder pattern:
///
/// ```rust
/// # use wayfarer_router::RouteConfig;
/// let config = RouteConfig::new("/user/:id")
///     .meta("requires_auth", true.into())
///     .child(RouteConfig::new("posts"));
/// ```
pub struct RouteConfig {
    pub(crate) paths: Vec<String>,
    pub(crate) component: Option<Component>,
    pub(crate) loader: Option<ComponentLoader>,
    pub(crate) redirect: Option<Redirect>,
    pub(crate) meta: Map<String, Value>,
    pub(crate) children: Vec<RouteConfig>,
    pub(crate) before_enter: Option<Guard>,
    pub(crate) before_update: Option<Guard>,
    pub(crate) before_leave: Option<Guard>,
    pub(crate) override_handling: Option<OverrideHook>,
    pub(crate) app: Option<String>,
}

impl RouteConfig {
    /// Create a configuration for `path`. Child paths are joined onto their
    /// parent's path when the tree is compiled.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            paths: vec![path.into()],
            component: None,
            loader: None,
            redirect: None,
            meta: Map::new(),
            children: Vec::new(),
            before_enter: None,
            before_update: None,
            before_leave: None,
            override_handling: None,
            app: None,
        }
    }

    /// Add an alias path. Requests matching an alias redirect to the
    /// canonical (first) path, compiled with the extracted parameters.
    pub fn alias(mut self, path: impl Into<String>) -> Self {
        self.paths.push(path.into());
        self
    }

    /// Attach a component reference.
    pub fn component(mut self, component: Component) -> Self {
        if self.component.is_some() {
            error!("component already set, later prevails");
            #[cfg(debug_assertions)]
            panic!("component already set");
        }
        self.component = Some(component);
        self
    }

    /// Attach an async component loader, invoked during the resource-loading
    /// phase of the first navigation that enters this route.
    pub fn loader(mut self, loader: ComponentLoader) -> Self {
        if self.loader.is_some() {
            error!("component loader already set, later prevails");
            #[cfg(debug_assertions)]
            panic!("component loader already set");
        }
        self.loader = Some(loader);
        self
    }

    /// Declare a redirect. The guard pipeline never runs for this route;
    /// resolution restarts toward the target.
    pub fn redirect(mut self, redirect: impl Into<Redirect>) -> Self {
        self.redirect = Some(redirect.into());
        self
    }

    /// Add a metadata entry. Metadata of the deepest matched configuration
    /// wins on the resolved route.
    pub fn meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.meta.insert(key.into(), value);
        self
    }

    /// Nest a child configuration. Its paths are prefixed with this one's.
    pub fn child(mut self, child: RouteConfig) -> Self {
        self.children.push(child);
        self
    }

    /// Guard run when a navigation enters this route.
    pub fn before_enter(mut self, guard: Guard) -> Self {
        self.before_enter = Some(guard);
        self
    }

    /// Guard run when a navigation stays on this route but changes
    /// parameters or query.
    pub fn before_update(mut self, guard: Guard) -> Self {
        self.before_update = Some(guard);
        self
    }

    /// Guard run when a navigation leaves this route.
    pub fn before_leave(mut self, guard: Guard) -> Self {
        self.before_leave = Some(guard);
        self
    }

    /// Hook that may substitute a non-standard handling function, resolved
    /// once per navigation.
    pub fn override_handling(mut self, hook: OverrideHook) -> Self {
        self.override_handling = Some(hook);
        self
    }

    /// Bind this route to a mounted application identifier.
    pub fn app(mut self, name: impl Into<String>) -> Self {
        self.app = Some(name.into());
        self
    }
}

/// A [`RouteConfig`] enriched with its compiled absolute path, matchable
/// patterns and recursively parsed children. Built once; read-only afterward
/// except for the component slot a loader resolves into.
pub struct ParsedRouteConfig {
    pub(crate) full_path: String,
    pub(crate) patterns: Vec<PathPattern>,
    pub(crate) component: RwLock<Option<Component>>,
    pub(crate) loader: Option<ComponentLoader>,
    pub(crate) redirect: Option<Redirect>,
    pub(crate) meta: Map<String, Value>,
    pub(crate) children: Vec<Arc<ParsedRouteConfig>>,
    pub(crate) before_enter: Option<Guard>,
    pub(crate) before_update: Option<Guard>,
    pub(crate) before_leave: Option<Guard>,
    pub(crate) override_handling: Option<OverrideHook>,
    pub(crate) app: Option<String>,
}

impl ParsedRouteConfig {
    pub(crate) fn parse(
        config: RouteConfig,
        parent_path: &str,
    ) -> Result<Arc<Self>, NavigationError> {
        let full_path = join_pathname(parent_path, &config.paths[0]);

        let patterns = config
            .paths
            .iter()
            .map(|path| PathPattern::compile(&join_pathname(parent_path, path)))
            .collect::<Result<Vec<_>, _>>()?;

        let children = config
            .children
            .into_iter()
            .map(|child| Self::parse(child, &full_path))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Arc::new(Self {
            full_path,
            patterns,
            component: RwLock::new(config.component),
            loader: config.loader,
            redirect: config.redirect,
            meta: config.meta,
            children,
            before_enter: config.before_enter,
            before_update: config.before_update,
            before_leave: config.before_leave,
            override_handling: config.override_handling,
            app: config.app,
        }))
    }

    /// The compiled absolute path of the canonical pattern.
    #[must_use]
    pub fn full_path(&self) -> &str {
        &self.full_path
    }

    /// This configuration's metadata.
    #[must_use]
    pub fn meta(&self) -> &Map<String, Value> {
        &self.meta
    }

    /// The application identifier this route is bound to.
    #[must_use]
    pub fn app(&self) -> Option<&str> {
        self.app.as_deref()
    }

    /// The component reference, if present or already loaded.
    #[must_use]
    pub fn component(&self) -> Option<Component> {
        self.component.read().ok().and_then(|slot| slot.clone())
    }

    /// Whether the resource-loading phase still has work to do here.
    pub(crate) fn needs_loading(&self) -> bool {
        self.loader.is_some() && self.component().is_none()
    }

    pub(crate) fn assign_component(&self, component: Component) {
        if let Ok(mut slot) = self.component.write() {
            *slot = Some(component);
        }
    }

    /// Try every pattern (canonical first, then aliases) against `path`.
    /// Returns the extracted parameters and the index of the matching
    /// pattern.
    pub(crate) fn match_path(&self, path: &str) -> Option<(Params, usize)> {
        self.patterns
            .iter()
            .enumerate()
            .find_map(|(i, pattern)| pattern.matches(path).map(|params| (params, i)))
    }

    /// Compile the canonical pattern with `params`.
    pub(crate) fn compile(&self, params: &Params) -> Result<String, NavigationError> {
        self.patterns[0].compile_path(params)
    }
}

impl fmt::Debug for ParsedRouteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParsedRouteConfig")
            .field("full_path", &self.full_path)
            .field("meta", &self.meta)
            .field("app", &self.app)
            .field("children", &self.children)
            .finish_non_exhaustive()
    }
}
