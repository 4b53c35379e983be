//! Mapbind is a declarative binding layer between component trees and interactive
//! mapping SDKs. It keeps a tree of map entities (markers, polylines, routes, info
//! windows) in sync with an underlying map, batching property changes and resolving
//! addresses along the way.
//!
//! # Quick start
//!
//! A map with one marker carrying an info window:
//!
//! ```no_run
//! use mapbind::provider::stub::StubProvider;
//! use mapbind::{InfoWindow, MapContext, Marker};
//!
//! # fn run() -> Result<(), mapbind::MapBindError> {
//! let provider = StubProvider::new();
//! let map = MapContext::new(provider);
//! map.set_lat(52.52);
//! map.set_lng(13.405);
//! map.set_zoom(11.0);
//!
//! let marker = Marker::new(&map);
//! marker.set_address("Brandenburger Tor, Berlin");
//!
//! let window = InfoWindow::on_marker(&marker);
//! window.set_open_on("mouseover");
//! window.set_close_on("mouseout");
//!
//! map.mount("map-canvas")?;
//! map.run_cycle();
//! # Ok(())
//! # }
//! ```
//!
//! The [`StubProvider`](provider::stub::StubProvider) above records calls instead
//! of drawing anything; a real application passes its own [`MapProvider`]
//! implementation wrapping the mapping SDK of its platform.
//!
//! # How it fits together
//!
//! * [`MapContext`] is the root of an entity tree. It owns the registries of its
//!   children and the update scheduler, and it is the only entity talking to the
//!   provider about the map itself (center, zoom, options, viewport fitting).
//! * Child entities ([`Marker`], [`Polyline`], [`Route`], [`InfoWindow`]) register
//!   themselves with their parent on construction and are removed with their
//!   `destroy` method. Parents own their children; children keep weak
//!   back-references, so dropping a subtree never leaks.
//! * Property setters never call the provider directly. Each change is scheduled
//!   and coalesced per entity and operation, then flushed by
//!   [`MapContext::run_cycle`] once per render cycle of the host framework.
//! * Everything imperative goes through the [`MapProvider`] trait, so the whole
//!   tree can run against any SDK, or fully scripted in tests.
//!
//! Asynchronous work (address lookup through [`Geocoder`], route computation
//! through [`Route`]) resumes through one-shot callbacks on the same thread; a
//! failure is logged and leaves the dependent state unchanged.

#![warn(clippy::unwrap_used)]
#![warn(missing_docs)]

pub mod error;
pub mod geo;
pub mod geocode;
pub mod infowindow;
pub mod map;
pub mod marker;
pub mod polyline;
pub mod provider;
pub mod route;
mod scheduler;

pub use error::MapBindError;
pub use geo::{GeoBounds, GeoPoint};
pub use geocode::Geocoder;
pub use infowindow::InfoWindow;
pub use map::{FitMode, MapContext};
pub use marker::Marker;
pub use polyline::{Coordinate, Polyline};
pub use provider::MapProvider;
pub use route::{Location, Route, Waypoint};
