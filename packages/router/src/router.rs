//! The router service: orchestrates the full transition pipeline.
//!
//! Every navigation, no matter which backend stores it, flows through
//! [`Router::navigate`]: resolve the target into a [`Route`], follow
//! redirects, run the guard pipeline, load async components, commit to the
//! history store, drive mounted applications and fire after-hooks. History
//! providers are dumb stores; keeping the whole transition here means the
//! memory and browser backends cannot drift apart semantically.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};

use futures_channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use futures_util::future::LocalBoxFuture;
use futures_util::{FutureExt, StreamExt};
use tracing::{debug, error, info, warn};
use url::Url;
use wayfarer_history::{
    HistoryCallback, HistoryEntry, HistoryProvider, MemoryHistory, ScrollPosition,
};

use crate::app::MountedApp;
use crate::config::{AfterEach, Guard, GuardResolution, Handling, RouteConfig};
use crate::error::NavigationError;
use crate::matcher::{join_pathname, Matcher};
use crate::navigation::{
    Layer, Location, NavigationOutcome, NavigationResult, NavigationTarget, NavigationType,
};
use crate::route::{Route, RouteOptions};
use crate::tasks::{TaskControl, TaskFlow, TaskStatus, Tasks};

/// Hook rewriting a candidate URL before it is matched. Receives the URL
/// being navigated to and the current URL, if any.
pub type UrlNormalizer = Arc<dyn Fn(Url, Option<&Url>) -> Url + Send + Sync>;

/// Handler invoked when a committed navigation matched no configuration.
pub type FallbackHandler = Arc<dyn Fn(Arc<Route>) + Send + Sync>;

/// Handler invoked for external targets the history provider could not
/// take over (e.g. on a server there is no window to redirect).
pub type ExternalHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Supplies the current scroll offset; sampled when a route is left.
pub type ScrollSource = Arc<dyn Fn() -> ScrollPosition + Send + Sync>;

/// Decides where to scroll after a commit. Receives the new route, the route
/// it replaced, and the offset saved when the new route was last left, if it
/// ever was. The returned position is applied through the history backend;
/// `None` skips scrolling.
pub type ScrollBehavior = Arc<
    dyn Fn(
            Arc<Route>,
            Option<Arc<Route>>,
            Option<ScrollPosition>,
        ) -> LocalBoxFuture<'static, Option<ScrollPosition>>
        + Send
        + Sync,
>;

/// How a successful pipeline writes to the history store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CommitKind {
    /// Append a new record.
    Push,
    /// Overwrite the current record.
    Replace,
    /// Move the store by a delta; the record already exists.
    Travel(isize),
    /// Adopt the route without touching the store (initial resolution,
    /// platform-originated moves, application restarts).
    Adopt,
}

/// Everything a [`Router`] is built from.
///
/// ```rust
/// # use wayfarer_router::{Router, RouterConfig, RouteConfig};
/// let router = Router::new(
///     RouterConfig::new()
///         .route(RouteConfig::new("/"))
///         .route(RouteConfig::new("/user/:id")),
/// )
/// .unwrap();
/// ```
pub struct RouterConfig {
    routes: Vec<RouteConfig>,
    base: String,
    history: Option<Box<dyn HistoryProvider>>,
    before_each: Vec<Guard>,
    after_each: Vec<AfterEach>,
    normalize_url: Option<UrlNormalizer>,
    on_unmatched: Option<FallbackHandler>,
    on_external: Option<ExternalHandler>,
    scroll_position_source: Option<ScrollSource>,
    scroll_behavior: Option<ScrollBehavior>,
    on_history_exhausted: Option<HistoryCallback>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterConfig {
    /// An empty configuration with the default base and an in-memory
    /// history.
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            base: String::from("http://localhost/"),
            history: None,
            before_each: Vec::new(),
            after_each: Vec::new(),
            normalize_url: None,
            on_unmatched: None,
            on_external: None,
            scroll_position_source: None,
            scroll_behavior: None,
            on_history_exhausted: None,
        }
    }

    /// Add a top-level route configuration.
    pub fn route(mut self, route: RouteConfig) -> Self {
        self.routes.push(route);
        self
    }

    /// The absolute base URL the router serves under. Its path becomes the
    /// prefix stripped from every request.
    pub fn base(mut self, base: impl Into<String>) -> Self {
        self.base = base.into();
        self
    }

    /// The history backend. Defaults to [`MemoryHistory`].
    pub fn history(mut self, history: impl HistoryProvider + 'static) -> Self {
        self.history = Some(Box::new(history));
        self
    }

    /// Register a global guard, run for every navigation.
    pub fn before_each(mut self, guard: Guard) -> Self {
        self.before_each.push(guard);
        self
    }

    /// Register a global after-hook, run once a navigation has committed.
    pub fn after_each(mut self, hook: AfterEach) -> Self {
        self.after_each.push(hook);
        self
    }

    /// Hook rewriting candidate URLs before matching.
    pub fn normalize_url(mut self, normalize: UrlNormalizer) -> Self {
        self.normalize_url = Some(normalize);
        self
    }

    /// Handler for committed navigations that matched nothing.
    pub fn on_unmatched(mut self, handler: FallbackHandler) -> Self {
        self.on_unmatched = Some(handler);
        self
    }

    /// Handler for external targets the backend could not take over.
    pub fn on_external(mut self, handler: ExternalHandler) -> Self {
        self.on_external = Some(handler);
        self
    }

    /// Supplies scroll offsets to save when a route is left.
    pub fn scroll_position_source(mut self, source: ScrollSource) -> Self {
        self.scroll_position_source = Some(source);
        self
    }

    /// Decides where to scroll after a commit.
    pub fn scroll_behavior(mut self, behavior: ScrollBehavior) -> Self {
        self.scroll_behavior = Some(behavior);
        self
    }

    /// Invoked when a back navigation is requested at the oldest record the
    /// backend can reach.
    pub fn on_history_exhausted(mut self, callback: HistoryCallback) -> Self {
        self.on_history_exhausted = Some(callback);
        self
    }
}

struct RouterInner {
    matcher: Matcher,
    base: Url,
    history: Mutex<Box<dyn HistoryProvider>>,
    current: RwLock<Option<Arc<Route>>>,
    before_each: RwLock<Vec<Guard>>,
    after_each: RwLock<Vec<AfterEach>>,
    apps: RwLock<BTreeMap<String, Arc<dyn MountedApp>>>,
    pending: Mutex<Option<TaskControl>>,
    saved_positions: Mutex<BTreeMap<String, ScrollPosition>>,
    normalize_url: Option<UrlNormalizer>,
    on_unmatched: Option<FallbackHandler>,
    on_external: Option<ExternalHandler>,
    scroll_position_source: Option<ScrollSource>,
    scroll_behavior: Option<ScrollBehavior>,
    events: Mutex<Option<UnboundedReceiver<()>>>,
    // keeps the event channel open even when the backend drops its callback
    #[allow(dead_code)]
    event_sender: UnboundedSender<()>,
}

/// The navigation engine.
///
/// Cheap to clone; all clones share one state. Construct with
/// [`Router::new`], call [`init`](Router::init) once the host is ready, and
/// drive platform-originated history events by polling
/// [`run`](Router::run).
#[derive(Clone)]
pub struct Router {
    inner: Arc<RouterInner>,
}

impl Router {
    /// Build a router from `config`. Fails when the base URL or a route
    /// pattern cannot be compiled.
    pub fn new(config: RouterConfig) -> Result<Self, NavigationError> {
        let matcher = Matcher::new(config.routes)?;

        let mut base = Url::parse(&config.base).map_err(|err| NavigationError::InvalidTarget {
            target: config.base.clone(),
            reason: err.to_string(),
        })?;
        // a trailing slash makes the base a valid join context
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let mut history = config
            .history
            .unwrap_or_else(|| Box::new(MemoryHistory::default()));

        let (event_sender, events) = mpsc::unbounded();
        let sender = event_sender.clone();
        history.updater(Arc::new(move || {
            let _ = sender.unbounded_send(());
        }));
        if let Some(callback) = config.on_history_exhausted {
            history.on_history_exhausted(callback);
        }

        Ok(Self {
            inner: Arc::new(RouterInner {
                matcher,
                base,
                history: Mutex::new(history),
                current: RwLock::new(None),
                before_each: RwLock::new(config.before_each),
                after_each: RwLock::new(config.after_each),
                apps: RwLock::new(BTreeMap::new()),
                pending: Mutex::new(None),
                saved_positions: Mutex::new(BTreeMap::new()),
                normalize_url: config.normalize_url,
                on_unmatched: config.on_unmatched,
                on_external: config.on_external,
                scroll_position_source: config.scroll_position_source,
                scroll_behavior: config.scroll_behavior,
                events: Mutex::new(Some(events)),
                event_sender,
            }),
        })
    }

    /// The router's base URL.
    #[must_use]
    pub fn base(&self) -> &Url {
        &self.inner.base
    }

    /// The committed current route, if a navigation has committed yet.
    #[must_use]
    pub fn current(&self) -> Option<Arc<Route>> {
        self.inner.current.read().expect("poisoned lock").clone()
    }

    /// Whether the history store has an earlier record.
    #[must_use]
    pub fn can_go_back(&self) -> bool {
        self.inner.history.lock().expect("poisoned lock").can_go_back()
    }

    /// Whether the history store has a later record.
    #[must_use]
    pub fn can_go_forward(&self) -> bool {
        self.inner.history.lock().expect("poisoned lock").can_go_forward()
    }

    /// Whether `path` is the current route (`exact`) or an ancestor of it.
    /// The root is only ever active for itself.
    #[must_use]
    pub fn is_active(&self, path: &str, exact: bool) -> bool {
        let Some(current) = self.current() else {
            return false;
        };
        let normalized = join_pathname("", path);
        if exact || normalized == "/" {
            current.path() == normalized
        } else {
            current.path() == normalized
                || current.path().starts_with(&format!("{normalized}/"))
        }
    }

    /// Register a global guard at runtime.
    pub fn before_each(&self, guard: Guard) {
        self.inner
            .before_each
            .write()
            .expect("poisoned lock")
            .push(guard);
    }

    /// Register a global after-hook at runtime.
    pub fn after_each(&self, hook: AfterEach) {
        self.inner
            .after_each
            .write()
            .expect("poisoned lock")
            .push(hook);
    }

    /// Register a mounted application under `name`. Routes bind to it via
    /// [`RouteConfig::app`].
    pub fn register_app(&self, name: impl Into<String>, app: Arc<dyn MountedApp>) {
        self.inner
            .apps
            .write()
            .expect("poisoned lock")
            .insert(name.into(), app);
    }

    /// Run the initial resolution: adopt whatever record the history store
    /// is on, through the full pipeline, without writing to the store.
    pub async fn init(&self) -> NavigationResult {
        let entry = {
            let mut history = self.inner.history.lock().expect("poisoned lock");
            history.init();
            history.current().unwrap_or_else(HistoryEntry::root)
        };
        info!(full_path = %entry.full_path, "initial route resolution");
        self.navigate(
            NavigationType::None,
            entry_location(entry).into(),
            CommitKind::Adopt,
            None,
        )
        .await
    }

    /// Process platform-originated history events (browser back/forward)
    /// until the router is dropped. Call at most once.
    pub async fn run(&self) {
        let Some(mut events) = self.inner.events.lock().expect("poisoned lock").take() else {
            warn!("router event loop started twice");
            return;
        };

        while events.next().await.is_some() {
            let Some(entry) = self
                .inner
                .history
                .lock()
                .expect("poisoned lock")
                .current()
            else {
                continue;
            };
            debug!(full_path = %entry.full_path, "history changed underneath the router");
            if let Err(err) = self
                .navigate(
                    NavigationType::Unknown,
                    entry_location(entry).into(),
                    CommitKind::Adopt,
                    None,
                )
                .await
            {
                error!(%err, "platform-originated navigation failed");
            }
        }
    }

    /// Navigate to `target`, appending a history record.
    pub async fn push(&self, target: impl Into<NavigationTarget>) -> NavigationResult {
        self.navigate(NavigationType::Push, target.into(), CommitKind::Push, None)
            .await
    }

    /// Navigate to `target`, replacing the current history record.
    pub async fn replace(&self, target: impl Into<NavigationTarget>) -> NavigationResult {
        self.navigate(
            NavigationType::Replace,
            target.into(),
            CommitKind::Replace,
            None,
        )
        .await
    }

    /// Open `location` as an overlay layer. Commits like a push; the layer
    /// configuration travels on the resolved route for the host to act on.
    pub async fn push_layer(&self, mut location: Location) -> NavigationResult {
        if location.layer.is_none() {
            location.layer = Some(Layer::default());
        }
        self.navigate(
            NavigationType::PushLayer,
            location.into(),
            CommitKind::Push,
            None,
        )
        .await
    }

    /// Move `delta` records within the history. `go(0)` resolves to
    /// [`NavigationOutcome::None`] without running anything.
    pub async fn go(&self, delta: isize) -> NavigationResult {
        self.travel_by(delta, NavigationType::Go).await
    }

    /// Move one record forward.
    pub async fn forward(&self) -> NavigationResult {
        self.travel_by(1, NavigationType::Forward).await
    }

    /// Move one record back.
    pub async fn back(&self) -> NavigationResult {
        self.travel_by(-1, NavigationType::Back).await
    }

    /// Open `target` in a new platform window. The calling router instance
    /// is not affected; guards do not run.
    pub async fn push_window(&self, target: impl Into<NavigationTarget>) -> NavigationResult {
        self.window_navigation(target.into(), NavigationType::PushWindow)
    }

    /// Replace the whole page location with `target`, leaving the
    /// application. Guards do not run.
    pub async fn replace_window(&self, target: impl Into<NavigationTarget>) -> NavigationResult {
        self.window_navigation(target.into(), NavigationType::ReplaceWindow)
    }

    /// Re-commit the current route and force the bound application through
    /// a full unmount/mount cycle.
    pub async fn restart_app(&self) -> NavigationResult {
        let Some(current) = self.current() else {
            return Ok(NavigationOutcome::None);
        };
        let mut location = Location::path(current.full_path());
        location.state = Some(current.state());
        location.keep_scroll_position = true;
        self.navigate(
            NavigationType::RestartApp,
            location.into(),
            CommitKind::Adopt,
            None,
        )
        .await
    }

    /// Resolve `target` into a [`Route`] without navigating: no guards, no
    /// loaders, no history writes. Redirects (aliases and configured
    /// redirects) are followed.
    pub fn resolve(
        &self,
        target: impl Into<NavigationTarget>,
    ) -> Result<Arc<Route>, NavigationError> {
        let mut target = target.into();
        let mut redirected_from = None;

        loop {
            let location = match target {
                NavigationTarget::Internal(location) => location,
                NavigationTarget::External(url) => {
                    return Err(NavigationError::InvalidTarget {
                        target: url,
                        reason: String::from("external targets cannot be resolved"),
                    });
                }
            };
            if let Some(url) = self.external_url(&location) {
                return Err(NavigationError::InvalidTarget {
                    target: url,
                    reason: String::from("external targets cannot be resolved"),
                });
            }
            let route = self.build_route(NavigationType::None, location, redirected_from)?;

            if let Some(canonical) = route.canonical_redirect.clone() {
                target = self.canonical_location(&route, &canonical).into();
                redirected_from = Some(route);
                continue;
            }
            if let Some(next) = self.config_redirect(&route) {
                target = next;
                redirected_from = Some(route);
                continue;
            }
            return Ok(route);
        }
    }

    /// The full transition pipeline. Redirects recurse; the boxed future
    /// breaks the cycle.
    fn navigate(
        &self,
        navigation_type: NavigationType,
        target: NavigationTarget,
        commit: CommitKind,
        redirected_from: Option<Arc<Route>>,
    ) -> LocalBoxFuture<'_, NavigationResult> {
        async move {
            let location = match target {
                NavigationTarget::External(url) => {
                    return self.leave_application(&url, navigation_type);
                }
                NavigationTarget::Internal(location) => {
                    if let Some(url) = self.external_url(&location) {
                        return self.leave_application(&url, navigation_type);
                    }
                    location
                }
            };

            let from = self.current();
            let route = self.build_route(navigation_type, location, redirected_from)?;

            // Alias matches and configured redirects restart resolution
            // toward their target, carrying the original route along.
            if let Some(canonical) = route.canonical_redirect.clone() {
                debug!(from = route.full_path(), to = %canonical, "alias redirect");
                let location = self.canonical_location(&route, &canonical);
                return self
                    .navigate(navigation_type, location.into(), commit, Some(route))
                    .await;
            }
            if let Some(next) = self.config_redirect(&route) {
                debug!(from = route.full_path(), ?next, "configured redirect");
                return self
                    .navigate(navigation_type, next, commit, Some(route))
                    .await;
            }

            // Navigating to the exact current route is a no-op, except for
            // history moves (the store index still has to change) and
            // application restarts.
            if matches!(commit, CommitKind::Push | CommitKind::Replace) {
                if let Some(current) = &from {
                    if same_route(current, &route) {
                        debug!(path = route.full_path(), "target equals current route");
                        return Ok(NavigationOutcome::None);
                    }
                }
            }

            // Last write wins: supersede whatever navigation is in flight.
            let control = self.begin_pending();

            match self.run_guards(&route, &from, &control).await? {
                GuardVerdict::Proceed => {}
                GuardVerdict::Aborted => return Ok(NavigationOutcome::Aborted),
                GuardVerdict::Denied => {
                    debug!(path = route.full_path(), "navigation denied by guard");
                    self.clear_pending(&control);
                    return Ok(NavigationOutcome::Aborted);
                }
                GuardVerdict::Redirected(mut next) => {
                    debug!(from = route.full_path(), ?next, "guard redirect");
                    carry_handle(&route, &mut next);
                    return self
                        .navigate(navigation_type, next, commit, Some(route))
                        .await;
                }
            }

            if let Some(err) = self.load_components(&route, &control).await {
                self.clear_pending(&control);
                return Err(err);
            }
            if control.is_aborted() {
                return Ok(NavigationOutcome::Aborted);
            }

            self.resolve_handling(&route);
            self.commit(&route, &from, commit);
            self.clear_pending(&control);

            if route.matched().is_empty() {
                match &self.inner.on_unmatched {
                    Some(handler) => handler(route.clone()),
                    None => warn!(path = route.path(), "no route matched"),
                }
            }

            let app_result = self.drive_apps(&route, &from, navigation_type).await;

            let hooks: Vec<AfterEach> =
                self.inner.after_each.read().expect("poisoned lock").clone();
            for hook in hooks {
                hook(route.clone(), from.clone());
            }

            self.restore_scroll(&route, &from).await;

            // Application failures surface as errors, but the commit stands.
            app_result?;
            Ok(NavigationOutcome::Committed(route))
        }
        .boxed_local()
    }

    async fn travel_by(&self, delta: isize, navigation_type: NavigationType) -> NavigationResult {
        if delta == 0 {
            return Ok(NavigationOutcome::None);
        }

        let peeked = self
            .inner
            .history
            .lock()
            .expect("poisoned lock")
            .peek(delta);
        match peeked {
            Some(entry) => {
                self.navigate(
                    navigation_type,
                    entry_location(entry).into(),
                    CommitKind::Travel(delta),
                    None,
                )
                .await
            }
            None => {
                // Index-addressable stores are simply out of range here and
                // ignore the travel. Event-driven stores perform the native
                // move and report back through the updater callback, which
                // makes the event loop run the transition.
                self.inner
                    .history
                    .lock()
                    .expect("poisoned lock")
                    .travel(delta);
                Ok(NavigationOutcome::None)
            }
        }
    }

    fn window_navigation(
        &self,
        target: NavigationTarget,
        navigation_type: NavigationType,
    ) -> NavigationResult {
        let url = match target {
            NavigationTarget::External(url) => url,
            NavigationTarget::Internal(location) => {
                if let Some(url) = self.external_url(&location) {
                    url
                } else {
                    let route = self.build_route(navigation_type, location, None)?;
                    route.url().to_string()
                }
            }
        };

        let handled = {
            let mut history = self.inner.history.lock().expect("poisoned lock");
            if navigation_type == NavigationType::PushWindow {
                history.open_window(url.clone())
            } else {
                history.external(url.clone())
            }
        };
        if !handled {
            self.handle_unsupported_external(&url);
        }
        Ok(NavigationOutcome::External)
    }

    fn leave_application(&self, url: &str, navigation_type: NavigationType) -> NavigationResult {
        info!(url, "leaving the application");
        let handled = {
            let mut history = self.inner.history.lock().expect("poisoned lock");
            if navigation_type == NavigationType::PushWindow {
                history.open_window(url.to_string())
            } else {
                history.external(url.to_string())
            }
        };
        if !handled {
            self.handle_unsupported_external(url);
        }
        Ok(NavigationOutcome::External)
    }

    fn handle_unsupported_external(&self, url: &str) {
        match &self.inner.on_external {
            Some(handler) => handler(url),
            None => warn!(url, "external navigation is not supported by the history backend"),
        }
    }

    /// A target is external when it is a full URL on a different origin than
    /// the router's base, or on the same origin but outside the base path.
    fn external_url(&self, location: &Location) -> Option<String> {
        let path = location.path.as_deref()?;
        if path.starts_with('/') {
            return None;
        }
        let url = Url::parse(path).ok()?;
        if url.origin() != self.inner.base.origin() {
            return Some(url.to_string());
        }
        // base.path() carries a trailing slash, so the prefix check is
        // segment-aligned; a bare "/app" against base "/app/" is the base
        // itself.
        let base_path = self.inner.base.path();
        let within =
            url.path().starts_with(base_path) || format!("{}/", url.path()) == base_path;
        (!within).then(|| url.to_string())
    }

    fn build_route(
        &self,
        navigation_type: NavigationType,
        location: Location,
        redirected_from: Option<Arc<Route>>,
    ) -> Result<Arc<Route>, NavigationError> {
        Ok(Arc::new(Route::new(RouteOptions {
            matcher: &self.inner.matcher,
            base: &self.inner.base,
            normalize_url: self.inner.normalize_url.as_ref(),
            navigation_type,
            location,
            from: self.current(),
            redirected_from,
        })?))
    }

    /// The location an alias match redirects to: the canonical path with the
    /// original query, fragment, state and handle carried over.
    fn canonical_location(&self, route: &Route, canonical: &str) -> Location {
        let mut location = Location::path(format!(
            "{canonical}{}{}",
            route
                .url()
                .query()
                .map(|q| format!("?{q}"))
                .unwrap_or_default(),
            route
                .url()
                .fragment()
                .map(|f| format!("#{f}"))
                .unwrap_or_default(),
        ));
        location.state = Some(route.state());
        location.keep_scroll_position = route.keep_scroll_position();
        location.handle = route.handle_hook();
        location.layer = route.layer().cloned();
        location
    }

    fn config_redirect(&self, route: &Arc<Route>) -> Option<NavigationTarget> {
        let redirect = route.config()?.redirect.as_ref()?;
        let mut target = redirect.resolve(route);
        carry_handle(route, &mut target);
        Some(target)
    }

    fn begin_pending(&self) -> TaskControl {
        let control = TaskControl::default();
        let mut pending = self.inner.pending.lock().expect("poisoned lock");
        if let Some(previous) = pending.replace(control.clone()) {
            debug!("superseding in-flight navigation");
            previous.abort();
        }
        control
    }

    fn clear_pending(&self, control: &TaskControl) {
        let mut pending = self.inner.pending.lock().expect("poisoned lock");
        if pending.as_ref().is_some_and(|p| p.same(control)) {
            *pending = None;
        }
    }

    /// Collect and run the guard chain for this transition.
    ///
    /// Order: leave guards of the configurations being left (deepest first),
    /// then global guards, then update guards of configurations staying
    /// matched (parents first), then enter guards of configurations newly
    /// matched (parents first).
    async fn run_guards(
        &self,
        route: &Arc<Route>,
        from: &Option<Arc<Route>>,
        control: &TaskControl,
    ) -> Result<GuardVerdict, NavigationError> {
        let shared = shared_prefix_len(from, route);
        let mut guards: Vec<Guard> = Vec::new();

        if let Some(from) = from {
            for config in from.matched().iter().skip(shared).rev() {
                if let Some(guard) = &config.before_leave {
                    guards.push(guard.clone());
                }
            }
        }
        guards.extend(
            self.inner
                .before_each
                .read()
                .expect("poisoned lock")
                .iter()
                .cloned(),
        );
        for config in route.matched().iter().take(shared) {
            if let Some(guard) = &config.before_update {
                guards.push(guard.clone());
            }
        }
        for config in route.matched().iter().skip(shared) {
            if let Some(guard) = &config.before_enter {
                guards.push(guard.clone());
            }
        }

        let mut tasks = Tasks::new(control.clone());
        for guard in guards {
            let to = route.clone();
            let from = from.clone();
            tasks.push(move || guard(to, from));
        }

        let mut stop = None;
        let status = tasks
            .run(|result| match result {
                Ok(GuardResolution::Allow) => TaskFlow::Continue,
                Ok(GuardResolution::Deny) => {
                    stop = Some(GuardStop::Deny);
                    TaskFlow::Stop
                }
                Ok(GuardResolution::Redirect(target)) => {
                    stop = Some(GuardStop::Redirect(target));
                    TaskFlow::Stop
                }
                Err(err) => {
                    stop = Some(GuardStop::Failed(err));
                    TaskFlow::Stop
                }
            })
            .await;

        if status == TaskStatus::Aborted {
            return Ok(GuardVerdict::Aborted);
        }
        Ok(match stop {
            None => GuardVerdict::Proceed,
            Some(GuardStop::Deny) => GuardVerdict::Denied,
            Some(GuardStop::Redirect(target)) => GuardVerdict::Redirected(target),
            Some(GuardStop::Failed(err)) => {
                self.clear_pending(control);
                return Err(err);
            }
        })
    }

    /// Run the async component loaders of matched configurations that still
    /// need one, under the same abort control as the guards.
    async fn load_components(
        &self,
        route: &Arc<Route>,
        control: &TaskControl,
    ) -> Option<NavigationError> {
        let mut tasks = Tasks::new(control.clone());
        for config in route.matched() {
            if !config.needs_loading() {
                continue;
            }
            let config = config.clone();
            tasks.push(move || {
                async move {
                    let Some(loader) = config.loader.clone() else {
                        return Ok(());
                    };
                    match loader().await {
                        Ok(component) => {
                            config.assign_component(component);
                            Ok(())
                        }
                        Err(source) => Err(NavigationError::ComponentLoad {
                            path: config.full_path().to_string(),
                            source,
                        }),
                    }
                }
                .boxed_local()
            });
        }
        if tasks.is_empty() {
            return None;
        }

        let mut failure = None;
        tasks
            .run(|result| match result {
                Ok(()) => TaskFlow::Continue,
                Err(err) => {
                    failure = Some(err);
                    TaskFlow::Stop
                }
            })
            .await;
        failure
    }

    /// Resolve override handling once: the deepest matched configuration
    /// with a hook decides; author-supplied handles win.
    fn resolve_handling(&self, route: &Arc<Route>) {
        for config in route.matched().iter().rev() {
            let Some(hook) = &config.override_handling else {
                continue;
            };
            match hook(route) {
                Handling::Default => {}
                Handling::Custom(handle) => {
                    route.install_handle(handle);
                    return;
                }
            }
        }
    }

    fn commit(&self, route: &Arc<Route>, from: &Option<Arc<Route>>, commit: CommitKind) {
        if let (Some(from), Some(source)) = (from, &self.inner.scroll_position_source) {
            self.inner
                .saved_positions
                .lock()
                .expect("poisoned lock")
                .insert(from.full_path().to_string(), source());
        }

        let entry = HistoryEntry {
            full_path: route.full_path().to_string(),
            state: route.state(),
            keep_scroll_position: route.keep_scroll_position(),
        };
        {
            let mut history = self.inner.history.lock().expect("poisoned lock");
            match commit {
                CommitKind::Push => history.push(entry),
                CommitKind::Replace => history.replace(entry),
                CommitKind::Travel(delta) => history.travel(delta),
                CommitKind::Adopt => {}
            }
        }

        *self.inner.current.write().expect("poisoned lock") = Some(route.clone());
        info!(path = route.full_path(), ?commit, "navigation committed");
    }

    async fn drive_apps(
        &self,
        route: &Arc<Route>,
        from: &Option<Arc<Route>>,
        navigation_type: NavigationType,
    ) -> Result<(), NavigationError> {
        let new_app = bound_app(Some(route));
        let old_app = bound_app(from.as_ref());
        let apps = self.inner.apps.read().expect("poisoned lock").clone();

        let same_app = new_app.is_some() && new_app == old_app;
        if same_app && navigation_type != NavigationType::RestartApp {
            if let Some(name) = &new_app {
                if let Some(app) = apps.get(name) {
                    app.update(route.clone()).await.map_err(|source| {
                        NavigationError::Application {
                            app: name.clone(),
                            source: Box::new(source),
                        }
                    })?;
                }
            }
            return Ok(());
        }

        if let Some(name) = &old_app {
            if let Some(app) = apps.get(name) {
                debug!(app = %name, "unmounting application");
                app.unmount(route.clone()).await.map_err(|source| {
                    NavigationError::Application {
                        app: name.clone(),
                        source: Box::new(source),
                    }
                })?;
            }
        }
        if let Some(name) = &new_app {
            if let Some(app) = apps.get(name) {
                debug!(app = %name, "mounting application");
                app.mount(route.clone()).await.map_err(|source| {
                    NavigationError::Application {
                        app: name.clone(),
                        source: Box::new(source),
                    }
                })?;
            }
        }
        Ok(())
    }

    async fn restore_scroll(&self, route: &Arc<Route>, from: &Option<Arc<Route>>) {
        if route.keep_scroll_position() {
            return;
        }
        let Some(behavior) = self.inner.scroll_behavior.clone() else {
            return;
        };
        let saved = self
            .inner
            .saved_positions
            .lock()
            .expect("poisoned lock")
            .get(route.full_path())
            .copied();
        if let Some(position) = behavior(route.clone(), from.clone(), saved).await {
            self.inner
                .history
                .lock()
                .expect("poisoned lock")
                .scroll_to(position);
        }
    }
}

impl Drop for RouterInner {
    fn drop(&mut self) {
        if let Ok(mut history) = self.history.lock() {
            history.destroy();
        }
    }
}

enum GuardVerdict {
    Proceed,
    Aborted,
    Denied,
    Redirected(NavigationTarget),
}

enum GuardStop {
    Deny,
    Redirect(NavigationTarget),
    Failed(NavigationError),
}

fn entry_location(entry: HistoryEntry) -> Location {
    let mut location = Location::path(entry.full_path);
    location.state = Some(entry.state);
    location.keep_scroll_position = entry.keep_scroll_position;
    location
}

/// Redirects inherit the original navigation's handle hook unless the
/// redirect target brings its own.
fn carry_handle(route: &Route, target: &mut NavigationTarget) {
    if let NavigationTarget::Internal(location) = target {
        if location.handle.is_none() {
            location.handle = route.handle_hook();
        }
    }
}

fn same_route(current: &Arc<Route>, next: &Arc<Route>) -> bool {
    let same_config = match (current.config(), next.config()) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    };
    same_config && current.full_path() == next.full_path()
}

/// How many leading configurations `from` and `to` share (by identity).
/// Those stay matched across the transition and get update guards instead of
/// leave/enter guards.
fn shared_prefix_len(from: &Option<Arc<Route>>, to: &Arc<Route>) -> usize {
    let Some(from) = from else {
        return 0;
    };
    from.matched()
        .iter()
        .zip(to.matched())
        .take_while(|(a, b)| Arc::ptr_eq(a, b))
        .count()
}

fn bound_app(route: Option<&Arc<Route>>) -> Option<String> {
    route?
        .matched()
        .iter()
        .rev()
        .find_map(|config| config.app().map(str::to_string))
}
