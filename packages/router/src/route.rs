//! The resolved, immutable-once-built result of one navigation attempt.

use std::fmt;
use std::sync::{Arc, Mutex};

use serde_json::{Map, Value};
use url::Url;

use crate::config::ParsedRouteConfig;
use crate::error::NavigationError;
use crate::matcher::Matcher;
use crate::navigation::{HandleFn, Layer, Location, NavigationType, Params};
use crate::router::UrlNormalizer;

/// The single-use handle slot of a [`Route`].
struct HandleSlot {
    hook: Option<HandleFn>,
    used: bool,
    result: Option<Value>,
}

impl HandleSlot {
    fn clone_slot(&self) -> Self {
        Self {
            hook: self.hook.clone(),
            used: self.used,
            result: self.result.clone(),
        }
    }
}

/// Everything needed to construct a [`Route`].
pub(crate) struct RouteOptions<'a> {
    pub matcher: &'a Matcher,
    pub base: &'a Url,
    pub normalize_url: Option<&'a UrlNormalizer>,
    pub navigation_type: NavigationType,
    pub location: Location,
    pub from: Option<Arc<Route>>,
    pub redirected_from: Option<Arc<Route>>,
}

/// A resolved navigation target: URL parts, parameters, query, matched
/// configuration chain, metadata, and a single-use result-handling slot.
///
/// Created fresh for every navigation attempt, including attempts that are
/// later aborted or redirected. Everything except the `state` bag, the status
/// code and the handle slot is fixed at construction.
pub struct Route {
    navigation_type: NavigationType,
    url: Url,
    path: String,
    full_path: String,
    params: Params,
    query: std::collections::BTreeMap<String, String>,
    query_array: std::collections::BTreeMap<String, Vec<String>>,
    hash: String,
    state: Mutex<Value>,
    meta: Map<String, Value>,
    matched: Vec<Arc<ParsedRouteConfig>>,
    status_code: Mutex<Option<u16>>,
    layer: Option<Layer>,
    keep_scroll_position: bool,
    redirected_from: Option<Arc<Route>>,
    handle: Mutex<HandleSlot>,
    /// Set when the deepest match came through an alias pattern; the router
    /// redirects to this canonical path.
    pub(crate) canonical_redirect: Option<String>,
}

impl Route {
    pub(crate) fn new(options: RouteOptions<'_>) -> Result<Self, NavigationError> {
        let RouteOptions {
            matcher,
            base,
            normalize_url,
            navigation_type,
            location,
            from,
            redirected_from,
        } = options;

        // 1. Normalize the input into a candidate URL. Leading-slash paths
        //    are router-relative and join under the base; other relative
        //    references resolve against the current URL with standard
        //    URL-resolution rules; full URLs pass through unchanged.
        let context = from
            .as_ref()
            .map(|f| f.url.clone())
            .unwrap_or_else(|| base.clone());
        let mut url = match &location.path {
            Some(path) => {
                let resolved = if let Some(rooted) = path.strip_prefix('/') {
                    base.join(rooted)
                } else if let Ok(absolute) = Url::parse(path) {
                    Ok(absolute)
                } else {
                    context.join(path)
                };
                resolved.map_err(|err| NavigationError::InvalidTarget {
                    target: path.clone(),
                    reason: err.to_string(),
                })?
            }
            None => context,
        };

        // Apply structured query edits on top of whatever the path carried.
        if !location.query.is_empty() || !location.query_array.is_empty() {
            let mut pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
            for (key, value) in &location.query {
                pairs.retain(|(k, _)| k != key);
                if let Some(value) = value {
                    pairs.push((key.clone(), value.clone()));
                }
            }
            for (key, values) in &location.query_array {
                pairs.retain(|(k, _)| k != key);
                for value in values {
                    pairs.push((key.clone(), value.clone()));
                }
            }
            set_query_pairs(&mut url, &pairs);
        }

        if let Some(hash) = &location.hash {
            let fragment = hash.trim_start_matches('#');
            url.set_fragment((!fragment.is_empty()).then_some(fragment));
        }

        // 2. Host-supplied URL rewriting before matching.
        if let Some(normalize) = normalize_url {
            url = normalize(url, from.as_ref().map(|f| &f.url));
        }

        // 3. Match against the configured tree.
        let outcome = matcher.resolve(&url, base);
        let mut params = outcome.params;

        // 4. Explicit params recompile the matched path in place, even when
        //    the override value differs in length from the original segment.
        if !location.params.is_empty() {
            if let Some(config) = outcome.matches.last() {
                for (key, value) in &location.params {
                    params.insert(key.clone(), value.clone());
                }
                let compiled = config.compile(&params)?;
                let base_path = base.path().trim_end_matches('/');
                url.set_path(&format!("{base_path}{compiled}"));
            }
        }

        let path = Matcher::request_path(&url, base);
        let full_path = format!(
            "{path}{}{}",
            url.query().map(|q| format!("?{q}")).unwrap_or_default(),
            url.fragment().map(|f| format!("#{f}")).unwrap_or_default(),
        );

        let mut query = std::collections::BTreeMap::new();
        let mut query_array: std::collections::BTreeMap<String, Vec<String>> = Default::default();
        for (key, value) in url.query_pairs() {
            // first value wins in the flat map, all values in the array map
            query.entry(key.to_string()).or_insert_with(|| value.to_string());
            query_array
                .entry(key.to_string())
                .or_default()
                .push(value.to_string());
        }

        // 5. Meta and config derive from the deepest matched configuration.
        let meta = outcome
            .matches
            .last()
            .map(|config| config.meta().clone())
            .unwrap_or_default();

        // 6. State is deep-copied so mutation never crosses route instances.
        let state = location.state.clone().unwrap_or(Value::Null);

        // the structured override was already folded into the URL above
        let hash = url.fragment().unwrap_or_default().to_string();

        Ok(Self {
            navigation_type,
            url,
            path,
            full_path,
            params,
            query,
            query_array,
            hash,
            state: Mutex::new(state),
            meta,
            matched: outcome.matches,
            status_code: Mutex::new(location.status_code),
            layer: location.layer.clone(),
            keep_scroll_position: location.keep_scroll_position,
            redirected_from,
            handle: Mutex::new(HandleSlot {
                hook: location.handle.clone(),
                used: false,
                result: None,
            }),
            canonical_redirect: outcome.canonical_redirect,
        })
    }

    /// How this navigation was issued.
    #[must_use]
    pub fn navigation_type(&self) -> NavigationType {
        self.navigation_type
    }

    /// Derived purely from the navigation type; not independently settable.
    #[must_use]
    pub fn is_push(&self) -> bool {
        self.navigation_type.is_push()
    }

    /// The full resolved URL.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Router-relative path (base stripped).
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Router-relative path including query and fragment.
    #[must_use]
    pub fn full_path(&self) -> &str {
        &self.full_path
    }

    /// Parameters extracted from the path.
    #[must_use]
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Query parameters; the first value wins for repeated keys.
    #[must_use]
    pub fn query(&self) -> &std::collections::BTreeMap<String, String> {
        &self.query
    }

    /// All query values per key.
    #[must_use]
    pub fn query_array(&self) -> &std::collections::BTreeMap<String, Vec<String>> {
        &self.query_array
    }

    /// The fragment this navigation requested, without the leading `#`.
    #[must_use]
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// A deep copy of the route's state bag.
    #[must_use]
    pub fn state(&self) -> Value {
        self.state.lock().map(|s| s.clone()).unwrap_or(Value::Null)
    }

    /// Replace the route's state bag.
    pub fn set_state(&self, state: Value) {
        if let Ok(mut slot) = self.state.lock() {
            *slot = state;
        }
    }

    /// Metadata merged from the deepest matched configuration.
    #[must_use]
    pub fn meta(&self) -> &Map<String, Value> {
        &self.meta
    }

    /// The matched configuration chain, parent-first. Frozen.
    #[must_use]
    pub fn matched(&self) -> &[Arc<ParsedRouteConfig>] {
        &self.matched
    }

    /// The deepest matched configuration, or `None` if nothing matched.
    #[must_use]
    pub fn config(&self) -> Option<&Arc<ParsedRouteConfig>> {
        self.matched.last()
    }

    /// The status code attached to this route, if any.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        self.status_code.lock().ok().and_then(|s| *s)
    }

    /// Attach a status code (e.g. a 404 for an unmatched route in SSR).
    pub fn set_status_code(&self, code: u16) {
        if let Ok(mut slot) = self.status_code.lock() {
            *slot = Some(code);
        }
    }

    /// Layer configuration; only meaningful for layer-opening navigations.
    #[must_use]
    pub fn layer(&self) -> Option<&Layer> {
        self.layer.as_ref()
    }

    /// Whether scroll restoration should be skipped for this route.
    #[must_use]
    pub fn keep_scroll_position(&self) -> bool {
        self.keep_scroll_position
    }

    /// The route whose guard redirected to this one, if any.
    #[must_use]
    pub fn redirected_from(&self) -> Option<&Arc<Route>> {
        self.redirected_from.as_ref()
    }

    /// Whether a handle hook is present and unused.
    #[must_use]
    pub fn has_handle(&self) -> bool {
        self.handle
            .lock()
            .map(|slot| slot.hook.is_some() && !slot.used)
            .unwrap_or(false)
    }

    /// Invoke the route's single-use handle hook.
    ///
    /// The first invocation runs the hook (if one was supplied) and records
    /// its result; every later invocation fails with
    /// [`NavigationError::HandleAlreadyInvoked`], regardless of what the
    /// first returned.
    pub fn invoke_handle(&self) -> Result<Option<Value>, NavigationError> {
        // flip the flag before running the hook so re-entrant calls fail too
        let hook = {
            let mut slot = self
                .handle
                .lock()
                .map_err(|_| NavigationError::HandleAlreadyInvoked)?;
            if slot.used {
                return Err(NavigationError::HandleAlreadyInvoked);
            }
            slot.used = true;
            slot.hook.clone()
        };

        let result = hook.map(|hook| hook(self));
        if let (Some(result), Ok(mut slot)) = (result.clone(), self.handle.lock()) {
            slot.result = Some(result);
        }
        Ok(result)
    }

    /// The value the handle hook returned, if it ran.
    #[must_use]
    pub fn handle_result(&self) -> Option<Value> {
        self.handle.lock().ok().and_then(|slot| slot.result.clone())
    }

    /// The handle hook, if one is installed and unused. Lets redirects carry
    /// the original navigation's hook along.
    pub(crate) fn handle_hook(&self) -> Option<HandleFn> {
        self.handle
            .lock()
            .ok()
            .and_then(|slot| (!slot.used).then(|| slot.hook.clone()).flatten())
    }

    /// Install a handle hook if the slot is still empty. Used by the
    /// override-handling resolution; author-supplied hooks win.
    pub(crate) fn install_handle(&self, hook: HandleFn) {
        if let Ok(mut slot) = self.handle.lock() {
            if slot.hook.is_none() && !slot.used {
                slot.hook = Some(hook);
            }
        }
    }

    /// Produce an independent deep copy: equal by value, but with
    /// independently-owned `state`/`params`/`query` objects.
    #[must_use]
    pub fn clone_route(&self) -> Route {
        Route {
            navigation_type: self.navigation_type,
            url: self.url.clone(),
            path: self.path.clone(),
            full_path: self.full_path.clone(),
            params: self.params.clone(),
            query: self.query.clone(),
            query_array: self.query_array.clone(),
            hash: self.hash.clone(),
            state: Mutex::new(self.state()),
            meta: self.meta.clone(),
            matched: self.matched.clone(),
            status_code: Mutex::new(self.status_code()),
            layer: self.layer.clone(),
            keep_scroll_position: self.keep_scroll_position,
            redirected_from: self.redirected_from.clone(),
            handle: Mutex::new(
                self.handle
                    .lock()
                    .map(|slot| slot.clone_slot())
                    .unwrap_or(HandleSlot {
                        hook: None,
                        used: false,
                        result: None,
                    }),
            ),
            canonical_redirect: self.canonical_redirect.clone(),
        }
    }

    /// Copy this route's dynamic fields onto `target` in place.
    ///
    /// The engine always swaps in a fresh route on commit; hosts that hand
    /// out a long-lived `Route` instance refresh it with this, typically
    /// from an after-hook.
    pub fn sync_to(&self, target: &mut Route) {
        target.url = self.url.clone();
        target.path = self.path.clone();
        target.full_path = self.full_path.clone();
        target.params = self.params.clone();
        target.query = self.query.clone();
        target.query_array = self.query_array.clone();
        target.hash = self.hash.clone();
        target.state = Mutex::new(self.state());
        target.status_code = Mutex::new(self.status_code());
        target.layer = self.layer.clone();
        target.handle = Mutex::new(
            self.handle
                .lock()
                .map(|slot| slot.clone_slot())
                .unwrap_or(HandleSlot {
                    hook: None,
                    used: false,
                    result: None,
                }),
        );
    }
}

fn set_query_pairs(url: &mut Url, pairs: &[(String, String)]) {
    if pairs.is_empty() {
        url.set_query(None);
        return;
    }
    match serde_urlencoded::to_string(pairs) {
        Ok(query) => url.set_query(Some(&query)),
        Err(err) => tracing::warn!(%err, "cannot serialize query pairs"),
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("navigation_type", &self.navigation_type)
            .field("path", &self.path)
            .field("full_path", &self.full_path)
            .field("params", &self.params)
            .field("query", &self.query)
            .field("hash", &self.hash)
            .field("matched", &self.matched.len())
            .field("status_code", &self.status_code())
            .finish_non_exhaustive()
    }
}
