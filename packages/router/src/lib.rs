#![doc = include_str!("../README.md")]
#![deny(missing_docs)]

mod app;
mod config;
mod error;
mod matcher;
mod navigation;
mod route;
mod router;
mod tasks;

pub use app::MountedApp;
pub use config::{
    AfterEach, Component, ComponentLoader, Guard, GuardResolution, GuardResult, Handling,
    OverrideHook, ParsedRouteConfig, Redirect, RouteConfig,
};
pub use error::{BoxError, NavigationError};
pub use matcher::{join_pathname, MatchOutcome, Matcher, PathPattern};
pub use navigation::{
    HandleFn, Layer, Location, NavigationOutcome, NavigationResult, NavigationTarget,
    NavigationType, ParamValue, Params,
};
pub use route::Route;
pub use router::{
    ExternalHandler, FallbackHandler, Router, RouterConfig, ScrollBehavior, ScrollSource,
    UrlNormalizer,
};

pub use wayfarer_history as history;
