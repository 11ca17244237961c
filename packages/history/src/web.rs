use std::sync::{Arc, Mutex, RwLock};

use gloo_events::EventListener;
use gloo_render::{request_animation_frame, AnimationFrame};
use gloo_timers::callback::Timeout;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};
use wasm_bindgen::JsValue;
use web_sys::{window, History, ScrollRestoration, Window};

use crate::{HistoryCallback, HistoryEntry, HistoryProvider, ScrollPosition};

/// Milliseconds to wait after a native `back()` before deciding that the
/// session had no older entry. Inherently racy; kept small enough to be
/// imperceptible and large enough for the popstate round-trip.
const BOUNDARY_GRACE_MS: u32 = 80;

/// The payload this backend keeps in `history.state`.
///
/// The browser store is treated as opaque key/value storage augmented with our
/// own bookkeeping: the scroll offset of the record and the marker flagging
/// the oldest entry of this session.
#[derive(Serialize, Deserialize)]
struct WebHistoryState {
    entry: HistoryEntry,
    #[serde(default)]
    scroll: ScrollPosition,
    #[serde(default)]
    ancient_route: bool,
}

fn serialize_state(state: &WebHistoryState) -> Option<JsValue> {
    match serde_json::to_string(state) {
        Ok(raw) => Some(JsValue::from_str(&raw)),
        Err(err) => {
            error!(%err, "failed to serialize history state");
            None
        }
    }
}

fn get_current(history: &History) -> Option<WebHistoryState> {
    let raw = history.state().ok()?;
    let raw = raw.as_string()?;
    match serde_json::from_str(&raw) {
        Ok(state) => Some(state),
        Err(err) => {
            warn!(%err, "unrecognized history state payload");
            None
        }
    }
}

fn scroll_of_window(window: &Window) -> ScrollPosition {
    ScrollPosition {
        x: window.scroll_x().unwrap_or_default(),
        y: window.scroll_y().unwrap_or_default(),
    }
}

/// A [`HistoryProvider`] that integrates with a browser via the
/// [History API](https://developer.mozilla.org/en-US/docs/Web/API/History_API).
///
/// This backend does not own a stack of its own; it delegates entirely to the
/// platform store and reconstructs the current record from the state payload
/// on every navigation event.
///
/// # Prefix
/// Supports a path prefix for applications not located at the root of their
/// domain. The prefix is added back in when writing URLs and stripped when
/// reading them.
///
/// # Scroll restoration
/// On construction the browser's automatic scroll restoration is disabled in
/// favor of positions saved into the state payload and re-applied on
/// `popstate`.
pub struct WebHistory {
    window: Window,
    history: History,
    prefix: Option<String>,
    do_scroll_restoration: bool,
    listener_navigation: Option<EventListener>,
    #[allow(dead_code)]
    listener_scroll: Option<EventListener>,
    listener_animation_frame: Arc<Mutex<Option<AnimationFrame>>>,
    exhausted_callback: Arc<RwLock<Option<HistoryCallback>>>,
}

impl Default for WebHistory {
    fn default() -> Self {
        Self::new(None, true)
    }
}

impl WebHistory {
    /// Create a new [`WebHistory`].
    ///
    /// If `do_scroll_restoration` is `true`, this provider takes control of
    /// the history state and sets the browser's scroll restoration to
    /// `manual`.
    pub fn new(prefix: Option<String>, do_scroll_restoration: bool) -> Self {
        let window = window().expect("access to `window`");
        let history = window.history().expect("`window` has access to `history`");

        let listener_scroll = match do_scroll_restoration {
            true => {
                history
                    .set_scroll_restoration(ScrollRestoration::Manual)
                    .expect("`history` can set scroll restoration");
                let w = window.clone();
                let h = history.clone();
                let document = w.document().expect("`window` has access to `document`");

                Some(EventListener::new(&document, "scroll", move |_| {
                    update_scroll(&w, &h);
                }))
            }
            false => None,
        };

        Self {
            window,
            history,
            prefix,
            do_scroll_restoration,
            listener_navigation: None,
            listener_scroll,
            listener_animation_frame: Default::default(),
            exhausted_callback: Default::default(),
        }
    }

    fn full_path_from_location(&self) -> String {
        let location = self.window.location();
        let mut path = location.pathname().unwrap_or_else(|_| String::from("/"));
        if let Some(prefix) = &self.prefix {
            if let Some(stripped) = path.strip_prefix(prefix.as_str()) {
                path = if stripped.starts_with('/') {
                    stripped.to_string()
                } else {
                    format!("/{stripped}")
                };
            }
        }
        let search = location.search().unwrap_or_default();
        let hash = location.hash().unwrap_or_default();
        format!("{path}{search}{hash}")
    }

    fn prefixed(&self, full_path: &str) -> String {
        match &self.prefix {
            None => full_path.to_string(),
            Some(prefix) => format!("{prefix}{full_path}"),
        }
    }

    fn create_state(&self, entry: HistoryEntry, ancient_route: bool) -> WebHistoryState {
        let scroll = self
            .do_scroll_restoration
            .then(|| scroll_of_window(&self.window))
            .unwrap_or_default();
        WebHistoryState {
            entry,
            scroll,
            ancient_route,
        }
    }

    fn write_state(&self, state: &WebHistoryState, url: &str, push: bool) -> Result<(), JsValue> {
        let Some(raw) = serialize_state(state) else {
            return Ok(());
        };
        if push {
            self.history.push_state_with_url(&raw, "", Some(url))
        } else {
            self.history.replace_state_with_url(&raw, "", Some(url))
        }
    }

    fn raw_state(&self) -> Option<String> {
        self.history.state().ok().and_then(|s| s.as_string())
    }
}

fn update_scroll(window: &Window, history: &History) {
    if let Some(mut state) = get_current(history) {
        state.scroll = scroll_of_window(window);
        if let Some(raw) = serialize_state(&state) {
            if let Err(err) = history.replace_state(&raw, "") {
                error!(?err, "failed to save scroll position");
            }
        }
    }
}

impl HistoryProvider for WebHistory {
    fn init(&mut self) {
        // The first entry of a session carries no payload of ours yet. Stamp
        // it so later back() calls can recognize the session boundary.
        let ancient = get_current(&self.history).is_none();
        let entry = HistoryEntry::new(self.full_path_from_location());
        let url = self.prefixed(&entry.full_path);
        let state = self.create_state(entry, ancient);
        if let Err(err) = self.write_state(&state, &url, false) {
            error!(?err, "failed to initialize history state");
        }
    }

    fn destroy(&mut self) {
        self.listener_navigation = None;
        self.listener_scroll = None;
    }

    fn current(&self) -> Option<HistoryEntry> {
        match get_current(&self.history) {
            Some(state) => Some(state.entry),
            None => Some(HistoryEntry::new(self.full_path_from_location())),
        }
    }

    fn can_go_back(&self) -> bool {
        // The platform store cannot be asked; the boundary marker is the best
        // available answer.
        get_current(&self.history).map_or(true, |state| !state.ancient_route)
    }

    fn can_go_forward(&self) -> bool {
        true
    }

    fn peek(&self, _delta: isize) -> Option<HistoryEntry> {
        // Records are not index-addressable here. The move happens natively
        // and is reported through the popstate listener.
        None
    }

    fn push(&mut self, entry: HistoryEntry) {
        let url = self.prefixed(&entry.full_path);
        let state = self.create_state(entry, false);

        match self.write_state(&state, &url, true) {
            Ok(()) => {
                if self.do_scroll_restoration && !state.entry.keep_scroll_position {
                    self.window.scroll_to_with_x_and_y(0.0, 0.0);
                }
            }
            Err(err) => error!(?err, "failed to push history state"),
        }
    }

    fn replace(&mut self, entry: HistoryEntry) {
        let ancient = get_current(&self.history).is_some_and(|state| state.ancient_route);
        let url = self.prefixed(&entry.full_path);
        let state = self.create_state(entry, ancient);

        if let Err(err) = self.write_state(&state, &url, false) {
            error!(?err, "failed to replace history state");
        }
    }

    fn travel(&mut self, delta: isize) {
        let at_boundary = delta < 0
            && get_current(&self.history).is_some_and(|state| state.ancient_route);

        if at_boundary {
            // Issue the native back anyway; whether an older entry exists
            // outside this session is only observable after the fact. If the
            // state payload is unchanged once the grace window elapses, the
            // session is assumed to be at its oldest entry.
            let before = self.raw_state();
            let history = self.history.clone();
            let exhausted = self.exhausted_callback.clone();
            if let Err(err) = self.history.back() {
                error!(?err, "failed to go back");
                return;
            }
            Timeout::new(BOUNDARY_GRACE_MS, move || {
                let after = history.state().ok().and_then(|s| s.as_string());
                if before == after {
                    if let Some(callback) = exhausted.read().ok().and_then(|g| g.clone()) {
                        callback();
                    }
                }
            })
            .forget();
            return;
        }

        if let Err(err) = self.history.go_with_delta(delta as i32) {
            error!(?err, delta, "failed to travel");
        }
    }

    fn scroll_to(&mut self, position: ScrollPosition) {
        self.window
            .scroll_to_with_x_and_y(position.x, position.y);
    }

    fn external(&mut self, url: String) -> bool {
        match self.window.location().set_href(&url) {
            Ok(()) => true,
            Err(err) => {
                error!(?err, url, "failed to navigate to external url");
                false
            }
        }
    }

    fn open_window(&mut self, url: String) -> bool {
        match self.window.open_with_url_and_target(&url, "_blank") {
            Ok(Some(_)) => true,
            Ok(None) => {
                warn!(url, "window open was blocked");
                false
            }
            Err(err) => {
                error!(?err, url, "failed to open window");
                false
            }
        }
    }

    fn updater(&mut self, callback: HistoryCallback) {
        let w = self.window.clone();
        let h = self.history.clone();
        let s = self.listener_animation_frame.clone();
        let d = self.do_scroll_restoration;

        self.listener_navigation = Some(EventListener::new(&self.window, "popstate", move |_| {
            (*callback)();
            if d {
                if let Some(state) = get_current(&h) {
                    if state.entry.keep_scroll_position {
                        return;
                    }
                    let mut s = s.lock().expect("unpoisoned scroll mutex");
                    let ScrollPosition { x, y } = state.scroll;
                    let w = w.clone();
                    *s = Some(request_animation_frame(move |_| {
                        w.scroll_to_with_x_and_y(x, y)
                    }));
                }
            }
        }));
    }

    fn on_history_exhausted(&mut self, callback: HistoryCallback) {
        if let Ok(mut guard) = self.exhausted_callback.write() {
            *guard = Some(callback);
        }
    }
}
