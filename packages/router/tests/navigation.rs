//! End-to-end navigation tests against the in-memory history backend.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures::executor::block_on;
use futures::FutureExt;
use serde_json::json;
use wayfarer_router::history::{HistoryEntry, HistoryProvider, MemoryHistory, ScrollPosition};
use wayfarer_router::{
    Guard, GuardResolution, Location, MountedApp, NavigationError, NavigationOutcome,
    NavigationType, Route, RouteConfig, Router, RouterConfig,
};

type Log = Arc<Mutex<Vec<String>>>;

fn log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

fn logging_guard(log: Log, name: &'static str) -> Guard {
    Arc::new(move |_to, _from| {
        let log = log.clone();
        async move {
            log.lock().unwrap().push(name.to_string());
            Ok(GuardResolution::Allow)
        }
        .boxed_local()
    })
}

/// Resolves on its second poll; gives a competing navigation a chance to
/// start in between.
struct YieldOnce(bool);

impl Future for YieldOnce {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.0 {
            Poll::Ready(())
        } else {
            self.0 = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}

fn router(config: RouterConfig) -> Router {
    let router = Router::new(config).unwrap();
    block_on(router.init()).unwrap();
    router
}

fn committed_path(outcome: &NavigationOutcome) -> String {
    outcome.committed().expect("navigation committed").path().to_string()
}

#[test]
fn push_commits_and_appends_history() {
    let router = router(
        RouterConfig::new()
            .route(RouteConfig::new("/"))
            .route(RouteConfig::new("/user/:id")),
    );

    let outcome = block_on(router.push("/user/1")).unwrap();

    assert_eq!(committed_path(&outcome), "/user/1");
    assert_eq!(router.current().unwrap().path(), "/user/1");
    assert_eq!(router.current().unwrap().params()["id"].first(), "1");
    assert!(router.can_go_back());
}

#[test]
fn replace_does_not_append() {
    let router = router(
        RouterConfig::new()
            .route(RouteConfig::new("/"))
            .route(RouteConfig::new("/a"))
            .route(RouteConfig::new("/b")),
    );

    block_on(router.push("/a")).unwrap();
    block_on(router.replace("/b")).unwrap();

    assert_eq!(router.current().unwrap().path(), "/b");
    let back = block_on(router.back()).unwrap();
    assert_eq!(committed_path(&back), "/");
}

#[test]
fn pushing_the_current_route_is_a_noop() {
    let router = router(
        RouterConfig::new()
            .route(RouteConfig::new("/"))
            .route(RouteConfig::new("/a")),
    );

    block_on(router.push("/a")).unwrap();
    let again = block_on(router.push("/a")).unwrap();

    assert!(matches!(again, NavigationOutcome::None));
    // no extra record was appended
    block_on(router.back()).unwrap();
    assert_eq!(router.current().unwrap().path(), "/");
}

#[test]
fn guard_denial_leaves_current_route_untouched() {
    let router = router(
        RouterConfig::new()
            .route(RouteConfig::new("/"))
            .route(RouteConfig::new("/blocked"))
            .before_each(Arc::new(|to, _from| {
                async move {
                    if to.path() == "/blocked" {
                        Ok(GuardResolution::Deny)
                    } else {
                        Ok(GuardResolution::Allow)
                    }
                }
                .boxed_local()
            })),
    );

    let outcome = block_on(router.push("/blocked")).unwrap();

    assert!(outcome.is_aborted());
    assert_eq!(router.current().unwrap().path(), "/");
    assert!(!router.can_go_back());
}

#[test]
fn guard_redirect_carries_redirected_from() {
    let router = router(
        RouterConfig::new()
            .route(RouteConfig::new("/"))
            .route(RouteConfig::new("/login"))
            .route(RouteConfig::new("/account").before_enter(Arc::new(|_to, _from| {
                async move { Ok(GuardResolution::Redirect("/login".into())) }.boxed_local()
            }))),
    );

    let outcome = block_on(router.push("/account")).unwrap();

    let route = outcome.committed().unwrap();
    assert_eq!(route.path(), "/login");
    assert_eq!(route.redirected_from().unwrap().path(), "/account");
    assert_eq!(router.current().unwrap().path(), "/login");
}

#[test]
fn configured_redirect_is_followed() {
    let router = router(
        RouterConfig::new()
            .route(RouteConfig::new("/"))
            .route(RouteConfig::new("/legacy").redirect("/modern"))
            .route(RouteConfig::new("/modern")),
    );

    let outcome = block_on(router.push("/legacy")).unwrap();

    let route = outcome.committed().unwrap();
    assert_eq!(route.path(), "/modern");
    assert_eq!(route.redirected_from().unwrap().path(), "/legacy");
}

#[test]
fn alias_redirects_to_canonical_path() {
    let router = router(
        RouterConfig::new()
            .route(RouteConfig::new("/"))
            .route(RouteConfig::new("/user/:id").alias("/u/:id")),
    );

    let outcome = block_on(router.push("/u/9?tab=posts")).unwrap();

    let route = outcome.committed().unwrap();
    assert_eq!(route.path(), "/user/9");
    assert_eq!(route.full_path(), "/user/9?tab=posts");
    assert_eq!(route.params()["id"].first(), "9");
    assert_eq!(route.redirected_from().unwrap().path(), "/u/9");
}

#[test]
fn go_zero_and_out_of_range_are_noops() {
    let router = router(RouterConfig::new().route(RouteConfig::new("/")));

    assert!(matches!(
        block_on(router.go(0)).unwrap(),
        NavigationOutcome::None
    ));
    assert!(matches!(
        block_on(router.back()).unwrap(),
        NavigationOutcome::None
    ));
    assert!(matches!(
        block_on(router.go(5)).unwrap(),
        NavigationOutcome::None
    ));
    assert_eq!(router.current().unwrap().path(), "/");
}

#[test]
fn travel_runs_the_pipeline_for_the_target_record() {
    let log = log();
    let router = router(
        RouterConfig::new()
            .route(RouteConfig::new("/"))
            .route(RouteConfig::new("/a"))
            .route(RouteConfig::new("/b"))
            .before_each(logging_guard(log.clone(), "guard")),
    );

    block_on(router.push("/a")).unwrap();
    block_on(router.push("/b")).unwrap();
    log.lock().unwrap().clear();

    let back = block_on(router.back()).unwrap();
    assert_eq!(committed_path(&back), "/a");
    assert_eq!(entries(&log), vec!["guard"]);

    let forward = block_on(router.forward()).unwrap();
    assert_eq!(committed_path(&forward), "/b");
}

#[test]
fn state_travels_with_history_records() {
    let router = router(
        RouterConfig::new()
            .route(RouteConfig::new("/"))
            .route(RouteConfig::new("/a"))
            .route(RouteConfig::new("/b")),
    );

    let mut location = Location::path("/a");
    location.state = Some(json!({"draft": "hello"}));
    block_on(router.push(location)).unwrap();
    block_on(router.push("/b")).unwrap();

    let back = block_on(router.back()).unwrap();
    assert_eq!(back.committed().unwrap().state(), json!({"draft": "hello"}));
}

#[test]
fn newer_navigation_supersedes_the_one_in_flight() {
    let yielding: Guard = Arc::new(|_to, _from| {
        async move {
            YieldOnce(false).await;
            Ok(GuardResolution::Allow)
        }
        .boxed_local()
    });
    let router = router(
        RouterConfig::new()
            .route(RouteConfig::new("/"))
            .route(RouteConfig::new("/a"))
            .route(RouteConfig::new("/b"))
            .route(RouteConfig::new("/c"))
            .before_each(yielding),
    );

    let (first, second, third) = block_on(async {
        futures::join!(router.push("/a"), router.push("/b"), router.push("/c"))
    });

    assert!(first.unwrap().is_aborted());
    assert!(second.unwrap().is_aborted());
    assert_eq!(committed_path(&third.unwrap()), "/c");
    assert_eq!(router.current().unwrap().path(), "/c");
}

#[test]
fn guard_order_is_leave_global_update_enter() {
    let log = log();
    let router = router(
        RouterConfig::new()
            .route(RouteConfig::new("/"))
            .route(
                RouteConfig::new("/user/:id")
                    .before_enter(logging_guard(log.clone(), "enter user"))
                    .before_update(logging_guard(log.clone(), "update user"))
                    .before_leave(logging_guard(log.clone(), "leave user")),
            )
            .route(RouteConfig::new("/about"))
            .before_each(logging_guard(log.clone(), "global")),
    );
    log.lock().unwrap().clear();

    block_on(router.push("/user/1")).unwrap();
    assert_eq!(entries(&log), vec!["global", "enter user"]);
    log.lock().unwrap().clear();

    block_on(router.push("/user/2")).unwrap();
    assert_eq!(entries(&log), vec!["global", "update user"]);
    log.lock().unwrap().clear();

    block_on(router.push("/about")).unwrap();
    assert_eq!(entries(&log), vec!["leave user", "global"]);
}

#[test]
fn async_loader_runs_once_and_assigns_the_component() {
    let calls = Arc::new(Mutex::new(0));
    let counter = calls.clone();
    let router = router(
        RouterConfig::new()
            .route(RouteConfig::new("/"))
            .route(RouteConfig::new("/lazy").loader(Arc::new(move || {
                let counter = counter.clone();
                async move {
                    *counter.lock().unwrap() += 1;
                    Ok(Arc::new(42usize) as wayfarer_router::Component)
                }
                .boxed_local()
            }))),
    );

    let outcome = block_on(router.push("/lazy")).unwrap();
    let route = outcome.committed().unwrap();
    let component = route.config().unwrap().component().unwrap();
    assert_eq!(component.downcast_ref::<usize>(), Some(&42));

    block_on(router.push("/")).unwrap();
    block_on(router.push("/lazy")).unwrap();
    assert_eq!(*calls.lock().unwrap(), 1);
}

#[test]
fn loader_failure_fails_the_navigation() {
    let router = router(
        RouterConfig::new()
            .route(RouteConfig::new("/"))
            .route(RouteConfig::new("/broken").loader(Arc::new(|| {
                async move { Err("backend unreachable".into()) }.boxed_local()
            }))),
    );

    let result = block_on(router.push("/broken"));

    assert!(matches!(
        result,
        Err(NavigationError::ComponentLoad { path, .. }) if path == "/broken"
    ));
    assert_eq!(router.current().unwrap().path(), "/");
}

struct TestApp {
    name: &'static str,
    log: Log,
}

impl MountedApp for TestApp {
    fn mount(
        &self,
        _route: Arc<Route>,
    ) -> futures::future::LocalBoxFuture<'_, Result<(), NavigationError>> {
        self.log.lock().unwrap().push(format!("mount {}", self.name));
        async { Ok(()) }.boxed_local()
    }

    fn unmount(
        &self,
        _route: Arc<Route>,
    ) -> futures::future::LocalBoxFuture<'_, Result<(), NavigationError>> {
        self.log.lock().unwrap().push(format!("unmount {}", self.name));
        async { Ok(()) }.boxed_local()
    }

    fn update(
        &self,
        _route: Arc<Route>,
    ) -> futures::future::LocalBoxFuture<'_, Result<(), NavigationError>> {
        self.log.lock().unwrap().push(format!("update {}", self.name));
        async { Ok(()) }.boxed_local()
    }
}

#[test]
fn applications_are_mounted_updated_and_unmounted() {
    let log = log();
    let router = router(
        RouterConfig::new()
            .route(RouteConfig::new("/"))
            .route(RouteConfig::new("/orders").app("shop"))
            .route(RouteConfig::new("/cart").app("shop"))
            .route(RouteConfig::new("/blog").app("blog")),
    );
    router.register_app(
        "shop",
        Arc::new(TestApp {
            name: "shop",
            log: log.clone(),
        }),
    );
    router.register_app(
        "blog",
        Arc::new(TestApp {
            name: "blog",
            log: log.clone(),
        }),
    );

    block_on(router.push("/orders")).unwrap();
    block_on(router.push("/cart")).unwrap();
    block_on(router.push("/blog")).unwrap();

    assert_eq!(
        entries(&log),
        vec!["mount shop", "update shop", "unmount shop", "mount blog"]
    );
}

#[test]
fn restart_app_forces_a_full_remount() {
    let log = log();
    let router = router(
        RouterConfig::new()
            .route(RouteConfig::new("/"))
            .route(RouteConfig::new("/orders").app("shop")),
    );
    router.register_app(
        "shop",
        Arc::new(TestApp {
            name: "shop",
            log: log.clone(),
        }),
    );

    block_on(router.push("/orders")).unwrap();
    log.lock().unwrap().clear();

    let outcome = block_on(router.restart_app()).unwrap();

    assert_eq!(committed_path(&outcome), "/orders");
    assert_eq!(entries(&log), vec!["unmount shop", "mount shop"]);
    // restarting does not grow the history
    block_on(router.back()).unwrap();
    assert_eq!(router.current().unwrap().path(), "/");
}

#[test]
fn resolve_is_pure() {
    let router = router(
        RouterConfig::new()
            .route(RouteConfig::new("/"))
            .route(RouteConfig::new("/user/:id"))
            .route(RouteConfig::new("/legacy").redirect("/user/0")),
    );

    let route = router.resolve("/user/5").unwrap();
    assert_eq!(route.path(), "/user/5");
    assert_eq!(route.params()["id"].first(), "5");
    assert_eq!(route.navigation_type(), NavigationType::None);

    let redirected = router.resolve("/legacy").unwrap();
    assert_eq!(redirected.path(), "/user/0");

    // nothing moved
    assert_eq!(router.current().unwrap().path(), "/");
    assert!(!router.can_go_back());
}

#[test]
fn external_targets_bypass_matching_and_guards() {
    let log = log();
    let seen = Arc::new(Mutex::new(None));
    let captured = seen.clone();
    let router = router(
        RouterConfig::new()
            .route(RouteConfig::new("/"))
            .before_each(logging_guard(log.clone(), "guard"))
            .on_external(Arc::new(move |url| {
                *captured.lock().unwrap() = Some(url.to_string());
            })),
    );
    log.lock().unwrap().clear();

    let outcome = block_on(router.push("https://elsewhere.example/docs")).unwrap();

    assert!(matches!(outcome, NavigationOutcome::External));
    assert_eq!(
        seen.lock().unwrap().as_deref(),
        Some("https://elsewhere.example/docs")
    );
    assert!(entries(&log).is_empty());
    assert_eq!(router.current().unwrap().path(), "/");
}

#[test]
fn push_window_resolves_internal_targets_to_full_urls() {
    let seen = Arc::new(Mutex::new(None));
    let captured = seen.clone();
    let router = router(
        RouterConfig::new()
            .route(RouteConfig::new("/"))
            .route(RouteConfig::new("/user/:id"))
            .on_external(Arc::new(move |url| {
                *captured.lock().unwrap() = Some(url.to_string());
            })),
    );

    let outcome = block_on(router.push_window("/user/3")).unwrap();

    assert!(matches!(outcome, NavigationOutcome::External));
    assert_eq!(
        seen.lock().unwrap().as_deref(),
        Some("http://localhost/user/3")
    );
    // the issuing router did not move
    assert_eq!(router.current().unwrap().path(), "/");
}

#[test]
fn unmatched_routes_commit_and_invoke_the_fallback() {
    let seen = Arc::new(Mutex::new(None));
    let captured = seen.clone();
    let router = router(
        RouterConfig::new()
            .route(RouteConfig::new("/"))
            .on_unmatched(Arc::new(move |route| {
                *captured.lock().unwrap() = Some(route.path().to_string());
            })),
    );

    let outcome = block_on(router.push("/nothing/here")).unwrap();

    let route = outcome.committed().unwrap();
    assert!(route.matched().is_empty());
    assert_eq!(seen.lock().unwrap().as_deref(), Some("/nothing/here"));
}

#[test]
fn base_prefix_shapes_urls_and_paths() {
    let router = Router::new(
        RouterConfig::new()
            .base("http://localhost:3000/app")
            .route(RouteConfig::new("/"))
            .route(RouteConfig::new("/user/:id")),
    )
    .unwrap();
    block_on(router.init()).unwrap();

    let outcome = block_on(router.push("/user/9")).unwrap();

    let route = outcome.committed().unwrap();
    assert_eq!(route.path(), "/user/9");
    assert_eq!(route.url().path(), "/app/user/9");
}

#[test]
fn after_each_sees_the_committed_route_and_its_origin() {
    let log = log();
    let hooked = log.clone();
    let router = router(
        RouterConfig::new()
            .route(RouteConfig::new("/"))
            .route(RouteConfig::new("/a"))
            .after_each(Arc::new(move |to, from| {
                hooked.lock().unwrap().push(format!(
                    "{} <- {}",
                    to.path(),
                    from.as_ref().map(|f| f.path()).unwrap_or("-")
                ));
            })),
    );
    log.lock().unwrap().clear();

    block_on(router.push("/a")).unwrap();

    assert_eq!(entries(&log), vec!["/a <- /"]);
}

#[test]
fn handle_is_single_use_across_a_navigation() {
    let router = router(
        RouterConfig::new()
            .route(RouteConfig::new("/"))
            .route(RouteConfig::new("/form")),
    );

    let mut location = Location::path("/form");
    location.handle = Some(Arc::new(|route| json!({"submitted_from": route.path()})));

    let outcome = block_on(router.push(location)).unwrap();
    let route = outcome.committed().unwrap();

    assert_eq!(
        route.invoke_handle().unwrap(),
        Some(json!({"submitted_from": "/form"}))
    );
    assert!(matches!(
        route.invoke_handle(),
        Err(NavigationError::HandleAlreadyInvoked)
    ));
}

#[test]
fn same_origin_urls_outside_the_base_are_external() {
    let log = log();
    let seen = Arc::new(Mutex::new(None));
    let captured = seen.clone();
    let router = Router::new(
        RouterConfig::new()
            .base("http://localhost/app")
            .route(RouteConfig::new("/"))
            .route(RouteConfig::new("/user/:id"))
            .before_each(logging_guard(log.clone(), "guard"))
            .on_external(Arc::new(move |url| {
                *captured.lock().unwrap() = Some(url.to_string());
            })),
    )
    .unwrap();
    block_on(router.init()).unwrap();
    log.lock().unwrap().clear();

    let outcome = block_on(router.push("http://localhost/elsewhere/x")).unwrap();

    assert!(matches!(outcome, NavigationOutcome::External));
    assert_eq!(
        seen.lock().unwrap().as_deref(),
        Some("http://localhost/elsewhere/x")
    );
    assert!(entries(&log).is_empty());
    assert_eq!(router.current().unwrap().path(), "/");

    // a full URL under the base is still internal
    let internal = block_on(router.push("http://localhost/app/user/5")).unwrap();
    assert_eq!(committed_path(&internal), "/user/5");

    // and resolving an out-of-base URL fails instead of producing a route
    assert!(matches!(
        router.resolve("http://localhost/elsewhere/x"),
        Err(NavigationError::InvalidTarget { .. })
    ));
}

#[test]
fn guard_redirect_carries_the_handle_hook() {
    let router = router(
        RouterConfig::new()
            .route(RouteConfig::new("/"))
            .route(RouteConfig::new("/login"))
            .route(RouteConfig::new("/account").before_enter(Arc::new(|_to, _from| {
                async move { Ok(GuardResolution::Redirect("/login".into())) }.boxed_local()
            }))),
    );

    let mut location = Location::path("/account");
    location.handle = Some(Arc::new(|route| json!({ "landed_on": route.path() })));

    let outcome = block_on(router.push(location)).unwrap();
    let route = outcome.committed().unwrap();

    assert_eq!(route.path(), "/login");
    assert_eq!(
        route.invoke_handle().unwrap(),
        Some(json!({ "landed_on": "/login" }))
    );
}

/// A memory store that records the scroll offsets the router applies.
struct ScrollRecordingHistory {
    inner: MemoryHistory,
    scrolled: Arc<Mutex<Vec<(f64, f64)>>>,
}

impl HistoryProvider for ScrollRecordingHistory {
    fn current(&self) -> Option<HistoryEntry> {
        self.inner.current()
    }

    fn can_go_back(&self) -> bool {
        self.inner.can_go_back()
    }

    fn can_go_forward(&self) -> bool {
        self.inner.can_go_forward()
    }

    fn peek(&self, delta: isize) -> Option<HistoryEntry> {
        self.inner.peek(delta)
    }

    fn push(&mut self, entry: HistoryEntry) {
        self.inner.push(entry)
    }

    fn replace(&mut self, entry: HistoryEntry) {
        self.inner.replace(entry)
    }

    fn travel(&mut self, delta: isize) {
        self.inner.travel(delta)
    }

    fn scroll_to(&mut self, position: ScrollPosition) {
        self.scrolled.lock().unwrap().push((position.x, position.y));
    }
}

#[test]
fn scroll_behavior_computes_the_position_the_router_applies() {
    let scrolled = Arc::new(Mutex::new(Vec::new()));
    let behavior_calls = log();
    let recorded = behavior_calls.clone();
    let offset = Arc::new(Mutex::new(ScrollPosition::default()));
    let source = offset.clone();
    let router = router(
        RouterConfig::new()
            .route(RouteConfig::new("/"))
            .route(RouteConfig::new("/a"))
            .history(ScrollRecordingHistory {
                inner: MemoryHistory::default(),
                scrolled: scrolled.clone(),
            })
            .scroll_position_source(Arc::new(move || *source.lock().unwrap()))
            .scroll_behavior(Arc::new(move |to, from, saved| {
                let recorded = recorded.clone();
                async move {
                    recorded.lock().unwrap().push(format!(
                        "{} <- {} saved {}",
                        to.path(),
                        from.as_ref().map(|f| f.path()).unwrap_or("-"),
                        saved.is_some(),
                    ));
                    // restore the saved offset, scroll to the top otherwise
                    Some(saved.unwrap_or_default())
                }
                .boxed_local()
            })),
    );

    *offset.lock().unwrap() = ScrollPosition { x: 0.0, y: 250.0 };
    block_on(router.push("/a")).unwrap();
    let back = block_on(router.back()).unwrap();
    assert_eq!(committed_path(&back), "/");

    let calls = entries(&behavior_calls);
    assert_eq!(calls.last().unwrap(), "/ <- /a saved true");
    assert_eq!(scrolled.lock().unwrap().last(), Some(&(0.0, 250.0)));
}

#[test]
fn is_active_matches_exact_and_ancestor_paths() {
    let router = router(
        RouterConfig::new()
            .route(RouteConfig::new("/"))
            .route(RouteConfig::new("/user/:id").child(RouteConfig::new("posts"))),
    );

    block_on(router.push("/user/1/posts")).unwrap();

    assert!(router.is_active("/user/1/posts", true));
    assert!(router.is_active("/user/1", false));
    assert!(!router.is_active("/user/1", true));
    assert!(!router.is_active("/user/2", false));
    assert!(!router.is_active("/", false));
}
