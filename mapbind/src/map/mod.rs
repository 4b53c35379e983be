//! The map root entity owning the child registries.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::MapBindError;
use crate::geo::{GeoBounds, GeoPoint};
use crate::geocode::Geocoder;
use crate::infowindow::InfoWindow;
use crate::marker::Marker;
use crate::polyline::Polyline;
use crate::provider::{
    EventData, EventKind, EventTarget, ListenerHandle, MapHandle, MapOptions, MapProvider,
};
use crate::route::Route;
use crate::scheduler::{next_entity_id, EntityId, OpKind, Scheduler};

pub(crate) mod registry;

use registry::{Entity, Registry};

/// Option keys the map root manages itself. They are stripped from the
/// option bag before it is forwarded to the provider.
const BANNED_OPTIONS: [&str; 2] = ["center", "zoom"];

/// When the map viewport is adjusted to cover its markers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FitMode {
    /// Never fit automatically.
    #[default]
    None,
    /// Fit once, when the map is mounted.
    Init,
    /// Fit at mount and again every time a marker position changes.
    Live,
}

/// The root entity of a component tree.
///
/// A map context owns the underlying provider map and the registries of its
/// child entities (markers, polylines, routes and map-owned info windows).
/// Children register themselves on construction and deregister on
/// [`destroy`](Marker::destroy); the context propagates map readiness down
/// to them and aggregates their coordinate changes back up into viewport
/// fitting.
///
/// Cloning a `MapContext` is cheap and yields a second handle to the same
/// shared state.
#[derive(Clone)]
pub struct MapContext {
    inner: Rc<RefCell<MapState>>,
}

pub(crate) struct MapState {
    pub(crate) id: EntityId,
    pub(crate) provider: Rc<dyn MapProvider>,
    pub(crate) scheduler: Rc<Scheduler>,
    pub(crate) handle: Option<MapHandle>,
    lat: Option<f64>,
    lng: Option<f64>,
    zoom: Option<f64>,
    options: MapOptions,
    fit_mode: FitMode,
    markers: Registry<Marker>,
    polylines: Registry<Polyline>,
    routes: Registry<Route>,
    infowindows: Registry<InfoWindow>,
    listeners: Vec<ListenerHandle>,
    callbacks: Vec<(EventKind, Rc<dyn Fn(&EventData)>)>,
}

impl MapContext {
    /// Creates a new map root using the given provider.
    ///
    /// The underlying map is not constructed until [`MapContext::mount`] is
    /// called, so child entities can be created and configured first.
    pub fn new(provider: Rc<dyn MapProvider>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(MapState {
                id: next_entity_id(),
                provider,
                scheduler: Rc::new(Scheduler::new()),
                handle: None,
                lat: None,
                lng: None,
                zoom: None,
                options: MapOptions::new(),
                fit_mode: FitMode::None,
                markers: Registry::default(),
                polylines: Registry::default(),
                routes: Registry::default(),
                infowindows: Registry::default(),
                listeners: Vec::new(),
                callbacks: Vec::new(),
            })),
        }
    }

    pub(crate) fn from_state(inner: Rc<RefCell<MapState>>) -> Self {
        Self { inner }
    }

    pub(crate) fn state(&self) -> &Rc<RefCell<MapState>> {
        &self.inner
    }

    /// Runs all updates scheduled since the previous cycle.
    ///
    /// The host framework must call this once per render cycle, after it is
    /// done changing component properties. Changes made within one cycle
    /// that map to the same downstream operation are collapsed into a
    /// single provider call.
    pub fn run_cycle(&self) {
        let scheduler = self.inner.borrow().scheduler.clone();
        scheduler.flush();
    }

    /// Mounts the map into the named canvas.
    ///
    /// The underlying map is constructed at most once per context lifetime;
    /// mounting an already mounted context only re-applies zoom and center.
    /// On first mount the filtered option bag is passed to the provider,
    /// the viewport is fitted to the markers if a fit mode is configured,
    /// the configured SDK event listeners are attached, and registered
    /// children are notified that the map is ready.
    ///
    /// A missing canvas is a fatal configuration error.
    pub fn mount(&self, canvas: &str) -> Result<(), MapBindError> {
        let created = {
            let mut state = self.inner.borrow_mut();
            if state.handle.is_none() {
                let options = state.options.without(&BANNED_OPTIONS);
                let handle = state.provider.create_map(canvas, &options)?;
                state.handle = Some(handle);
                true
            } else {
                false
            }
        };

        self.apply_zoom();
        self.apply_center();

        if created {
            log::debug!("map mounted into canvas '{canvas}'");
            if matches!(self.fit_mode(), FitMode::Init | FitMode::Live) {
                self.fit_to_markers();
            }
            self.attach_listeners();
            self.notify_map_ready();
        }

        Ok(())
    }

    /// Unmounts the map, detaching every SDK event listener it attached.
    pub fn unmount(&self) {
        let (provider, listeners) = {
            let mut state = self.inner.borrow_mut();
            (state.provider.clone(), std::mem::take(&mut state.listeners))
        };

        for listener in listeners {
            provider.remove_listener(listener);
        }
    }

    /// Sets the latitude of the map center.
    ///
    /// The center is forwarded on the next cycle, and only once both
    /// coordinates are present.
    pub fn set_lat(&self, lat: impl Into<Option<f64>>) {
        self.inner.borrow_mut().lat = lat.into();
        self.schedule(OpKind::SetCenter, |map| map.apply_center());
    }

    /// Sets the longitude of the map center.
    pub fn set_lng(&self, lng: impl Into<Option<f64>>) {
        self.inner.borrow_mut().lng = lng.into();
        self.schedule(OpKind::SetCenter, |map| map.apply_center());
    }

    /// Sets the zoom level, forwarded on the next cycle.
    pub fn set_zoom(&self, zoom: impl Into<Option<f64>>) {
        self.inner.borrow_mut().zoom = zoom.into();
        self.schedule(OpKind::SetZoom, |map| map.apply_zoom());
    }

    /// Replaces the option bag.
    ///
    /// The `center` and `zoom` keys are managed through their own setters
    /// and are stripped before the bag is forwarded. Forwarding the same
    /// bag twice is idempotent on the provider side.
    pub fn set_options(&self, options: MapOptions) {
        self.inner.borrow_mut().options = options;
        self.schedule(OpKind::SetOptions, |map| map.apply_options());
    }

    /// Sets when the viewport is automatically fitted to the markers.
    pub fn set_fit_mode(&self, mode: FitMode) {
        self.inner.borrow_mut().fit_mode = mode;
    }

    /// Current fit mode.
    pub fn fit_mode(&self) -> FitMode {
        self.inner.borrow().fit_mode
    }

    /// Handle of the underlying map, if mounted.
    pub fn handle(&self) -> Option<MapHandle> {
        self.inner.borrow().handle
    }

    /// Markers currently registered, in registration order.
    pub fn markers(&self) -> Vec<Marker> {
        self.inner.borrow().markers.iter().cloned().collect()
    }

    /// Polylines currently registered, in registration order.
    pub fn polylines(&self) -> Vec<Polyline> {
        self.inner.borrow().polylines.iter().cloned().collect()
    }

    /// Creates a geocoder sharing the map's provider.
    pub fn geocoder(&self) -> Geocoder {
        Geocoder::new(self.inner.borrow().provider.clone())
    }

    /// Registers a callback for an SDK-level map event.
    ///
    /// Callbacks registered before mounting are attached when the map is
    /// constructed; later registrations attach immediately.
    pub fn on(&self, event: EventKind, callback: impl Fn(&EventData) + 'static) {
        let callback: Rc<dyn Fn(&EventData)> = Rc::new(callback);
        let mounted = {
            let mut state = self.inner.borrow_mut();
            state.callbacks.push((event, callback.clone()));
            state.handle.is_some()
        };

        if mounted {
            self.attach_listener(event, callback);
        }
    }

    /// Fits the viewport to the current markers.
    ///
    /// Markers missing either coordinate are excluded. When a marker
    /// carries a viewport, the viewport is united into the bounds instead
    /// of the marker point. Does nothing when no eligible marker exists or
    /// the map is not mounted.
    pub fn fit_to_markers(&self) {
        let (provider, handle, markers) = {
            let state = self.inner.borrow();
            (
                state.provider.clone(),
                state.handle,
                state.markers.iter().cloned().collect::<Vec<_>>(),
            )
        };
        let Some(handle) = handle else {
            return;
        };

        let mut bounds = GeoBounds::default();
        for marker in &markers {
            if marker.position().is_none() {
                continue;
            }
            match marker.viewport() {
                Some(viewport) => bounds.union(&viewport),
                None => {
                    if let Some(position) = marker.position() {
                        bounds.extend(position);
                    }
                }
            }
        }

        if bounds.is_empty() {
            return;
        }
        provider.fit_bounds(handle, &bounds);
    }

    pub(crate) fn register_marker(&self, marker: Marker) {
        self.inner.borrow_mut().markers.add(marker);
        self.notify_markers_changed();
    }

    pub(crate) fn unregister_marker(&self, id: EntityId) {
        self.inner.borrow_mut().markers.remove(id);
        self.notify_markers_changed();
    }

    pub(crate) fn register_polyline(&self, polyline: Polyline) {
        self.inner.borrow_mut().polylines.add(polyline);
    }

    pub(crate) fn unregister_polyline(&self, id: EntityId) {
        self.inner.borrow_mut().polylines.remove(id);
    }

    pub(crate) fn register_route(&self, route: Route) {
        self.inner.borrow_mut().routes.add(route);
    }

    pub(crate) fn unregister_route(&self, id: EntityId) {
        self.inner.borrow_mut().routes.remove(id);
    }

    pub(crate) fn register_infowindow(&self, window: InfoWindow) {
        self.inner.borrow_mut().infowindows.add(window);
    }

    pub(crate) fn unregister_infowindow(&self, id: EntityId) {
        self.inner.borrow_mut().infowindows.remove(id);
    }

    /// Called by markers whenever their coordinates (or the membership of
    /// the marker registry) change. Refits are coalesced at the map level.
    pub(crate) fn notify_markers_changed(&self) {
        if self.inner.borrow().fit_mode != FitMode::Live {
            return;
        }
        self.schedule(OpKind::FitBounds, |map| map.fit_to_markers());
    }

    /// Closes the info window of every *other* marker sharing the group.
    pub(crate) fn group_marker_clicked(&self, source: EntityId, group: &str) {
        let markers = self.markers();
        for marker in markers {
            if marker.entity_id() == source {
                continue;
            }
            if marker.group().as_deref() == Some(group) {
                marker.close_infowindow();
            }
        }
    }

    /// Closes the info window of every *other* polyline sharing the group.
    pub(crate) fn group_polyline_clicked(&self, source: EntityId, group: &str) {
        let polylines = self.polylines();
        for polyline in polylines {
            if polyline.entity_id() == source {
                continue;
            }
            if polyline.group().as_deref() == Some(group) {
                polyline.close_infowindow();
            }
        }
    }

    fn schedule(&self, op: OpKind, run: fn(&MapContext)) {
        let (id, scheduler) = {
            let state = self.inner.borrow();
            (state.id, state.scheduler.clone())
        };
        let weak = Rc::downgrade(&self.inner);
        scheduler.schedule_once(id, op, move || {
            if let Some(inner) = weak.upgrade() {
                run(&MapContext::from_state(inner));
            }
        });
    }

    fn apply_zoom(&self) {
        let (provider, handle, zoom) = {
            let state = self.inner.borrow();
            (state.provider.clone(), state.handle, state.zoom)
        };
        if let (Some(handle), Some(zoom)) = (handle, zoom) {
            provider.set_map_zoom(handle, zoom);
        }
    }

    fn apply_center(&self) {
        let (provider, handle, lat, lng) = {
            let state = self.inner.borrow();
            (state.provider.clone(), state.handle, state.lat, state.lng)
        };
        if let (Some(handle), Some(lat), Some(lng)) = (handle, lat, lng) {
            provider.set_map_center(handle, GeoPoint::new(lat, lng));
        }
    }

    fn apply_options(&self) {
        let (provider, handle, options) = {
            let state = self.inner.borrow();
            (
                state.provider.clone(),
                state.handle,
                state.options.without(&BANNED_OPTIONS),
            )
        };
        if let Some(handle) = handle {
            provider.set_map_options(handle, &options);
        }
    }

    fn attach_listeners(&self) {
        let callbacks = self.inner.borrow().callbacks.clone();
        for (event, callback) in callbacks {
            self.attach_listener(event, callback);
        }
    }

    fn attach_listener(&self, event: EventKind, callback: Rc<dyn Fn(&EventData)>) {
        let (provider, handle) = {
            let state = self.inner.borrow();
            (state.provider.clone(), state.handle)
        };
        let Some(handle) = handle else {
            return;
        };

        let listener = provider.add_listener(
            EventTarget::Map(handle),
            event,
            Box::new(move |data| callback(data)),
        );
        self.inner.borrow_mut().listeners.push(listener);
    }

    /// Pushes map readiness down to every registered child.
    fn notify_map_ready(&self) {
        let (handle, markers, polylines, routes, infowindows) = {
            let state = self.inner.borrow();
            (
                state.handle,
                state.markers.iter().cloned().collect::<Vec<_>>(),
                state.polylines.iter().cloned().collect::<Vec<_>>(),
                state.routes.iter().cloned().collect::<Vec<_>>(),
                state.infowindows.iter().cloned().collect::<Vec<_>>(),
            )
        };
        let Some(handle) = handle else {
            return;
        };

        for marker in markers {
            marker.map_ready(handle);
        }
        for polyline in polylines {
            polyline.map_ready(handle);
        }
        for route in routes {
            route.map_ready(handle);
        }
        for window in infowindows {
            window.map_ready(handle);
        }
    }
}
