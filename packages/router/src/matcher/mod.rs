//! Route matching.
//!
//! The [`Matcher`] compiles the configured route tree once and answers
//! requests with the ordered chain of configurations that matched, ancestors
//! first, plus the parameters they extracted. Matching only ever looks at the
//! pathname; query string and fragment are irrelevant here.

use std::sync::Arc;

use tracing::{debug, warn};
use url::Url;

use crate::config::{ParsedRouteConfig, RouteConfig};
use crate::error::NavigationError;
use crate::navigation::Params;

mod pattern;
pub use pattern::PathPattern;

/// Join `path` onto `base`, purely textually.
///
/// Adjacent slashes collapse, per-segment leading/trailing slashes are
/// stripped, and the result always carries a single leading slash. The root
/// stays `/`. Idempotent when re-joined with an already-normalized result.
#[must_use]
pub fn join_pathname(base: &str, path: &str) -> String {
    let joined = format!("{base}/{path}");
    let mut result = String::new();
    for segment in joined.split('/').filter(|s| !s.is_empty()) {
        result.push('/');
        result.push_str(segment);
    }
    if result.is_empty() {
        result.push('/');
    }
    result
}

/// What a match request resolved to. Never an error: an unmatched path
/// yields empty `matches` and `params`.
#[derive(Debug, Default)]
pub struct MatchOutcome {
    /// The matched configuration chain, parent-first.
    pub matches: Vec<Arc<ParsedRouteConfig>>,
    /// Parameters extracted along the chain.
    pub params: Params,
    /// When the deepest configuration matched through an alias, the
    /// canonical path the navigation should redirect to.
    pub canonical_redirect: Option<String>,
}

/// The compiled route tree.
pub struct Matcher {
    routes: Vec<Arc<ParsedRouteConfig>>,
}

impl Matcher {
    /// Compile `configs` into a matchable tree. Fails on invalid path
    /// patterns.
    pub fn new(configs: Vec<RouteConfig>) -> Result<Self, NavigationError> {
        let routes = configs
            .into_iter()
            .map(|config| ParsedRouteConfig::parse(config, "/"))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { routes })
    }

    /// The compiled top-level configurations.
    #[must_use]
    pub fn routes(&self) -> &[Arc<ParsedRouteConfig>] {
        &self.routes
    }

    /// Strip the base path's prefix length from `url`'s pathname and
    /// normalize the remainder.
    #[must_use]
    pub fn request_path(url: &Url, base: &Url) -> String {
        let path = url.path();
        let base_path = base.path().trim_end_matches('/');
        let stripped = if base_path.is_empty() || path.len() < base_path.len() {
            path
        } else {
            &path[base_path.len()..]
        };
        join_pathname("", stripped)
    }

    /// Match `url` against the tree, depth-first, first successful branch
    /// wins.
    #[must_use]
    pub fn resolve(&self, url: &Url, base: &Url) -> MatchOutcome {
        let path = Self::request_path(url, base);
        debug!(%path, "matching request path");

        match match_configs(&self.routes, &path) {
            Some((matches, params, alias)) => {
                let canonical_redirect = alias.and_then(|config: Arc<ParsedRouteConfig>| {
                    match config.compile(&params) {
                        Ok(canonical) => Some(canonical),
                        Err(err) => {
                            warn!(
                                %err,
                                alias_of = config.full_path(),
                                "cannot compile canonical path for alias match"
                            );
                            None
                        }
                    }
                });
                MatchOutcome {
                    matches,
                    params,
                    canonical_redirect,
                }
            }
            None => MatchOutcome::default(),
        }
    }
}

type Matched = (Vec<Arc<ParsedRouteConfig>>, Params, Option<Arc<ParsedRouteConfig>>);

/// Depth-first search over sibling configurations: try the node's own
/// patterns, then its children; on either success, record the node (prepended
/// so ancestors precede descendants), merge extracted parameters, and stop
/// scanning further siblings.
fn match_configs(configs: &[Arc<ParsedRouteConfig>], path: &str) -> Option<Matched> {
    for config in configs {
        if let Some((params, pattern_index)) = config.match_path(path) {
            let alias = (pattern_index > 0).then(|| config.clone());
            return Some((vec![config.clone()], params, alias));
        }

        if let Some((mut chain, params, alias)) = match_configs(&config.children, path) {
            chain.insert(0, config.clone());
            return Some((chain, params, alias));
        }
    }
    None
}
