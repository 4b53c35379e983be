//! Polyline entity and its coordinate children.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::geo::GeoPoint;
use crate::infowindow::{InfoWindow, InfoWindowState};
use crate::map::registry::{Entity, Registry};
use crate::map::{MapContext, MapState};
use crate::marker::{trigger_listeners, AttachedWindow};
use crate::provider::{
    EventKind, EventTarget, ListenerHandle, MapHandle, MapProvider, PolylineHandle, PolylineStyle,
};
use crate::scheduler::{next_entity_id, EntityId, OpKind, Scheduler};

/// A line drawn over the map.
///
/// The path of a polyline comes from one of two sources. Child
/// [`Coordinate`] entities compose the path in registration order, each
/// contributing one point once both of its coordinates are set. Alternatively
/// a whole path can be assigned at once with [`Polyline::set_path`]; such a
/// static path takes precedence, and coordinate children stop contributing
/// until it is cleared.
#[derive(Clone)]
pub struct Polyline {
    inner: Rc<RefCell<PolylineState>>,
}

pub(crate) struct PolylineState {
    id: EntityId,
    provider: Rc<dyn MapProvider>,
    scheduler: Rc<Scheduler>,
    map: Weak<RefCell<MapState>>,
    handle: Option<PolylineHandle>,
    static_path: Option<Vec<GeoPoint>>,
    coordinates: Registry<Coordinate>,
    style: PolylineStyle,
    group: Option<String>,
    listeners: Vec<ListenerHandle>,
    window: Option<AttachedWindow>,
    on_click: Option<Rc<dyn Fn()>>,
}

impl Polyline {
    /// Creates a polyline and registers it with the map.
    pub fn new(map: &MapContext) -> Self {
        let (provider, scheduler, map_handle) = {
            let state = map.state().borrow();
            (state.provider.clone(), state.scheduler.clone(), state.handle)
        };

        let polyline = Self {
            inner: Rc::new(RefCell::new(PolylineState {
                id: next_entity_id(),
                provider,
                scheduler,
                map: Rc::downgrade(map.state()),
                handle: None,
                static_path: None,
                coordinates: Registry::default(),
                style: PolylineStyle::default(),
                group: None,
                listeners: Vec::new(),
                window: None,
                on_click: None,
            })),
        };

        map.register_polyline(polyline.clone());
        if let Some(handle) = map_handle {
            polyline.map_ready(handle);
        }
        polyline
    }

    pub(crate) fn from_state(inner: Rc<RefCell<PolylineState>>) -> Self {
        Self { inner }
    }

    pub(crate) fn state(&self) -> &Rc<RefCell<PolylineState>> {
        &self.inner
    }

    pub(crate) fn shared(&self) -> (Rc<dyn MapProvider>, Rc<Scheduler>) {
        let state = self.inner.borrow();
        (state.provider.clone(), state.scheduler.clone())
    }

    /// Handle of the map the polyline belongs to, if it is mounted.
    pub(crate) fn map_handle(&self) -> Option<MapHandle> {
        let map = self.inner.borrow().map.clone();
        map.upgrade().and_then(|map| map.borrow().handle)
    }

    /// Assigns a static path, overriding the coordinate children.
    ///
    /// Passing `None` clears the static path and hands the path back to the
    /// coordinate children.
    pub fn set_path(&self, path: impl Into<Option<Vec<GeoPoint>>>) {
        self.inner.borrow_mut().static_path = path.into();
        self.schedule(OpKind::SetPath, |polyline| polyline.apply_path());
    }

    /// Applies styling options to the line.
    pub fn set_style(&self, style: PolylineStyle) {
        self.inner.borrow_mut().style = style;
        self.schedule(OpKind::SetStyle, |polyline| polyline.apply_style());
    }

    /// Assigns the polyline to a click group.
    ///
    /// Clicking a grouped polyline closes the info windows of all other
    /// entities sharing the group.
    pub fn set_group(&self, group: impl Into<Option<String>>) {
        self.inner.borrow_mut().group = group.into();
    }

    /// Registers a callback invoked when the polyline is clicked.
    pub fn on_click(&self, callback: impl Fn() + 'static) {
        self.inner.borrow_mut().on_click = Some(Rc::new(callback));
    }

    /// The path as currently composed, static or from the children.
    pub fn path(&self) -> Vec<GeoPoint> {
        self.current_path()
    }

    /// Click group of the polyline.
    pub fn group(&self) -> Option<String> {
        self.inner.borrow().group.clone()
    }

    /// Handle of the underlying polyline, if constructed.
    pub fn handle(&self) -> Option<PolylineHandle> {
        self.inner.borrow().handle
    }

    /// Detaches the polyline from the map and removes it from the registry.
    pub fn destroy(&self) {
        let (provider, handle, listeners, window, map, id) = {
            let mut state = self.inner.borrow_mut();
            state.coordinates.clear();
            (
                state.provider.clone(),
                state.handle.take(),
                std::mem::take(&mut state.listeners),
                state.window.take(),
                state.map.clone(),
                state.id,
            )
        };

        for listener in listeners {
            provider.remove_listener(listener);
        }
        if let Some(window) = window {
            for listener in window.listeners {
                provider.remove_listener(listener);
            }
        }
        if let Some(handle) = handle {
            provider.attach_polyline(handle, None);
        }
        if let Some(map) = map.upgrade() {
            MapContext::from_state(map).unregister_polyline(id);
        }
    }

    /// Constructs and attaches the underlying polyline once the map exists.
    pub(crate) fn map_ready(&self, map_handle: MapHandle) {
        let created = {
            let mut state = self.inner.borrow_mut();
            if state.handle.is_none() {
                state.handle = Some(state.provider.create_polyline());
                true
            } else {
                false
            }
        };

        if created {
            self.apply_path();
            self.apply_style();
        }

        let (provider, handle) = {
            let state = self.inner.borrow();
            (state.provider.clone(), state.handle)
        };
        if let Some(handle) = handle {
            provider.attach_polyline(handle, Some(map_handle));
        }

        if created {
            self.attach_interaction_listeners();
            self.attach_trigger_listeners();
        }
    }

    pub(crate) fn register_coordinate(&self, coordinate: Coordinate) {
        self.inner.borrow_mut().coordinates.add(coordinate);
        self.schedule_path_update();
    }

    pub(crate) fn unregister_coordinate(&self, id: EntityId) {
        self.inner.borrow_mut().coordinates.remove(id);
        self.schedule_path_update();
    }

    /// Schedules a path recomputation from the coordinate children.
    ///
    /// A static path suppresses child contributions, so nothing is
    /// scheduled while one is assigned.
    pub(crate) fn schedule_path_update(&self) {
        if self.inner.borrow().static_path.is_some() {
            return;
        }
        self.schedule(OpKind::SetPath, |polyline| polyline.apply_path());
    }

    pub(crate) fn register_infowindow(
        &self,
        window: Weak<RefCell<InfoWindowState>>,
        open_on: EventKind,
        close_on: Option<EventKind>,
    ) {
        self.inner.borrow_mut().window = Some(AttachedWindow::new(window, open_on, close_on));
        self.attach_trigger_listeners();
    }

    pub(crate) fn unregister_infowindow(&self, id: EntityId) {
        let removed = {
            let mut state = self.inner.borrow_mut();
            if state.window.as_ref().is_some_and(|w| w.is_window(id)) {
                state.window.take()
            } else {
                None
            }
        };

        if let Some(window) = removed {
            let provider = self.inner.borrow().provider.clone();
            for listener in window.listeners {
                provider.remove_listener(listener);
            }
        }
    }

    pub(crate) fn close_infowindow(&self) {
        let window = {
            let state = self.inner.borrow();
            state.window.as_ref().and_then(|w| w.window.upgrade())
        };
        if let Some(state) = window {
            InfoWindow::from_state(state).close();
        }
    }

    fn current_path(&self) -> Vec<GeoPoint> {
        let state = self.inner.borrow();
        match &state.static_path {
            Some(path) => path.clone(),
            None => state
                .coordinates
                .iter()
                .filter_map(Coordinate::point)
                .collect(),
        }
    }

    fn schedule(&self, op: OpKind, run: fn(&Polyline)) {
        let (id, scheduler) = {
            let state = self.inner.borrow();
            (state.id, state.scheduler.clone())
        };
        let weak = Rc::downgrade(&self.inner);
        scheduler.schedule_once(id, op, move || {
            if let Some(inner) = weak.upgrade() {
                run(&Polyline { inner });
            }
        });
    }

    fn apply_path(&self) {
        let (provider, handle) = {
            let state = self.inner.borrow();
            (state.provider.clone(), state.handle)
        };
        let Some(handle) = handle else {
            return;
        };
        provider.set_polyline_path(handle, &self.current_path());
    }

    fn apply_style(&self) {
        let (provider, handle, style) = {
            let state = self.inner.borrow();
            (state.provider.clone(), state.handle, state.style.clone())
        };
        if let Some(handle) = handle {
            provider.set_polyline_style(handle, &style);
        }
    }

    fn clicked(&self) {
        let (on_click, group, id, map) = {
            let state = self.inner.borrow();
            (
                state.on_click.clone(),
                state.group.clone(),
                state.id,
                state.map.clone(),
            )
        };

        if let Some(callback) = on_click {
            callback();
        }
        if let (Some(group), Some(map)) = (group, map.upgrade()) {
            MapContext::from_state(map).group_polyline_clicked(id, &group);
        }
    }

    fn attach_interaction_listeners(&self) {
        let (provider, handle) = {
            let state = self.inner.borrow();
            (state.provider.clone(), state.handle)
        };
        let Some(handle) = handle else {
            return;
        };

        let weak = Rc::downgrade(&self.inner);
        let click = provider.add_listener(
            EventTarget::Polyline(handle),
            EventKind::Click,
            Box::new(move |_| {
                if let Some(inner) = weak.upgrade() {
                    Polyline { inner }.clicked();
                }
            }),
        );
        self.inner.borrow_mut().listeners.push(click);
    }

    fn attach_trigger_listeners(&self) {
        let (provider, handle, window, open_on, close_on) = {
            let state = self.inner.borrow();
            let Some(attached) = &state.window else {
                return;
            };
            if !attached.listeners.is_empty() {
                return;
            }
            (
                state.provider.clone(),
                state.handle,
                attached.window.clone(),
                attached.open_on,
                attached.close_on,
            )
        };
        let Some(handle) = handle else {
            return;
        };

        let attached = trigger_listeners(
            provider.as_ref(),
            EventTarget::Polyline(handle),
            window,
            open_on,
            close_on,
        );
        if let Some(slot) = &mut self.inner.borrow_mut().window {
            slot.listeners = attached;
        }
    }
}

impl Entity for Polyline {
    fn entity_id(&self) -> EntityId {
        self.inner.borrow().id
    }
}

/// One point of a polyline path.
///
/// Coordinates contribute to the parent path in registration order. A
/// coordinate missing either value contributes nothing until completed.
#[derive(Clone)]
pub struct Coordinate {
    inner: Rc<RefCell<CoordinateState>>,
}

struct CoordinateState {
    id: EntityId,
    polyline: Weak<RefCell<PolylineState>>,
    lat: Option<f64>,
    lng: Option<f64>,
}

impl Coordinate {
    /// Creates a coordinate and registers it with the polyline.
    pub fn new(polyline: &Polyline) -> Self {
        let coordinate = Self {
            inner: Rc::new(RefCell::new(CoordinateState {
                id: next_entity_id(),
                polyline: Rc::downgrade(polyline.state()),
                lat: None,
                lng: None,
            })),
        };

        polyline.register_coordinate(coordinate.clone());
        coordinate
    }

    /// Sets the latitude, triggering a path recomputation.
    pub fn set_lat(&self, lat: impl Into<Option<f64>>) {
        self.inner.borrow_mut().lat = lat.into();
        self.notify_polyline();
    }

    /// Sets the longitude, triggering a path recomputation.
    pub fn set_lng(&self, lng: impl Into<Option<f64>>) {
        self.inner.borrow_mut().lng = lng.into();
        self.notify_polyline();
    }

    /// The point contributed to the path, if both coordinates are known.
    pub fn point(&self) -> Option<GeoPoint> {
        let state = self.inner.borrow();
        match (state.lat, state.lng) {
            (Some(lat), Some(lng)) => Some(GeoPoint::new(lat, lng)),
            _ => None,
        }
    }

    /// Removes the coordinate from its polyline's path.
    pub fn destroy(&self) {
        let (polyline, id) = {
            let state = self.inner.borrow();
            (state.polyline.clone(), state.id)
        };
        if let Some(polyline) = polyline.upgrade() {
            Polyline::from_state(polyline).unregister_coordinate(id);
        }
    }

    fn notify_polyline(&self) {
        let polyline = self.inner.borrow().polyline.clone();
        if let Some(polyline) = polyline.upgrade() {
            Polyline::from_state(polyline).schedule_path_update();
        }
    }
}

impl Entity for Coordinate {
    fn entity_id(&self) -> EntityId {
        self.inner.borrow().id
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::latlng;
    use crate::provider::stub::{StubCall, StubProvider};
    use crate::provider::EventData;

    fn mounted_map(provider: &Rc<StubProvider>) -> MapContext {
        let map = MapContext::new(provider.clone());
        map.mount("canvas").expect("canvas must exist");
        map
    }

    fn coordinate_at(polyline: &Polyline, lat: f64, lng: f64) -> Coordinate {
        let coordinate = Coordinate::new(polyline);
        coordinate.set_lat(lat);
        coordinate.set_lng(lng);
        coordinate
    }

    #[test]
    fn coordinates_compose_the_path_in_order() {
        let provider = StubProvider::new();
        let map = mounted_map(&provider);
        let polyline = Polyline::new(&map);

        coordinate_at(&polyline, 1.0, 1.0);
        coordinate_at(&polyline, 2.0, 2.0);
        coordinate_at(&polyline, 3.0, 3.0);
        map.run_cycle();

        let call = provider.last_call(|c| matches!(c, StubCall::SetPolylinePath { .. }));
        let Some(StubCall::SetPolylinePath { path, .. }) = call else {
            panic!("expected a SetPolylinePath call");
        };
        assert_eq!(
            path,
            vec![latlng!(1.0, 1.0), latlng!(2.0, 2.0), latlng!(3.0, 3.0)]
        );
    }

    #[test]
    fn incomplete_coordinates_contribute_nothing() {
        let provider = StubProvider::new();
        let map = mounted_map(&provider);
        let polyline = Polyline::new(&map);

        coordinate_at(&polyline, 1.0, 1.0);
        let incomplete = Coordinate::new(&polyline);
        incomplete.set_lat(9.0);
        map.run_cycle();

        assert_eq!(polyline.path(), vec![latlng!(1.0, 1.0)]);
    }

    #[test]
    fn removing_a_middle_coordinate_keeps_the_outer_points() {
        let provider = StubProvider::new();
        let map = mounted_map(&provider);
        let polyline = Polyline::new(&map);

        coordinate_at(&polyline, 1.0, 1.0);
        let middle = coordinate_at(&polyline, 2.0, 2.0);
        coordinate_at(&polyline, 3.0, 3.0);
        map.run_cycle();

        middle.destroy();
        map.run_cycle();

        let call = provider.last_call(|c| matches!(c, StubCall::SetPolylinePath { .. }));
        let Some(StubCall::SetPolylinePath { path, .. }) = call else {
            panic!("expected a SetPolylinePath call");
        };
        assert_eq!(path, vec![latlng!(1.0, 1.0), latlng!(3.0, 3.0)]);
    }

    #[test]
    fn path_updates_are_coalesced_within_a_cycle() {
        let provider = StubProvider::new();
        let map = mounted_map(&provider);
        let polyline = Polyline::new(&map);
        provider.clear_calls();

        coordinate_at(&polyline, 1.0, 1.0);
        coordinate_at(&polyline, 2.0, 2.0);
        map.run_cycle();

        assert_eq!(
            provider.count_calls(|c| matches!(c, StubCall::SetPolylinePath { .. })),
            1
        );
    }

    #[test]
    fn static_path_wins_over_coordinates() {
        let provider = StubProvider::new();
        let map = mounted_map(&provider);
        let polyline = Polyline::new(&map);

        let coordinate = coordinate_at(&polyline, 1.0, 1.0);
        polyline.set_path(vec![latlng!(10.0, 10.0), latlng!(20.0, 20.0)]);
        map.run_cycle();
        provider.clear_calls();

        // coordinate churn must not override the static path
        coordinate.set_lat(99.0);
        map.run_cycle();
        assert_eq!(
            provider.count_calls(|c| matches!(c, StubCall::SetPolylinePath { .. })),
            0
        );
        assert_eq!(polyline.path(), vec![latlng!(10.0, 10.0), latlng!(20.0, 20.0)]);

        // clearing the static path hands control back to the children
        polyline.set_path(None);
        map.run_cycle();
        assert_eq!(polyline.path(), vec![latlng!(99.0, 1.0)]);
    }

    #[test]
    fn style_is_forwarded() {
        let provider = StubProvider::new();
        let map = mounted_map(&provider);
        let polyline = Polyline::new(&map);

        polyline.set_style(PolylineStyle {
            stroke_color: Some("#ff0000".to_string()),
            stroke_weight: Some(2.0),
            stroke_opacity: None,
            z_index: Some(1),
        });
        map.run_cycle();

        let call = provider.last_call(|c| matches!(c, StubCall::SetPolylineStyle { .. }));
        assert!(matches!(
            call,
            Some(StubCall::SetPolylineStyle { style, .. })
                if style.stroke_color.as_deref() == Some("#ff0000")
        ));
    }

    #[test]
    fn polyline_waits_for_the_map_to_mount() {
        let provider = StubProvider::new();
        let map = MapContext::new(provider.clone());
        let polyline = Polyline::new(&map);
        coordinate_at(&polyline, 1.0, 1.0);
        map.run_cycle();
        assert!(provider.calls().is_empty());

        map.mount("canvas").expect("canvas must exist");
        assert!(polyline.handle().is_some());
        assert_eq!(
            provider.count_calls(|c| matches!(c, StubCall::SetPolylinePath { .. })),
            1
        );
        assert_eq!(
            provider.count_calls(|c| matches!(c, StubCall::AttachPolyline { map: Some(_), .. })),
            1
        );
    }

    #[test]
    fn click_bubbles_to_the_callback() {
        let provider = StubProvider::new();
        let map = mounted_map(&provider);
        let polyline = Polyline::new(&map);

        let clicks = Rc::new(Cell::new(0));
        let clicks_clone = clicks.clone();
        polyline.on_click(move || clicks_clone.set(clicks_clone.get() + 1));

        let handle = polyline.handle().expect("polyline must be constructed");
        provider.fire(
            EventTarget::Polyline(handle),
            EventKind::Click,
            &EventData::default(),
        );
        assert_eq!(clicks.get(), 1);
    }

    #[test]
    fn destroy_detaches_and_unregisters() {
        let provider = StubProvider::new();
        let map = mounted_map(&provider);
        let polyline = Polyline::new(&map);
        let handle = polyline.handle().expect("polyline must be constructed");

        polyline.destroy();

        assert!(matches!(
            provider.last_call(|c| matches!(c, StubCall::AttachPolyline { map: None, .. })),
            Some(StubCall::AttachPolyline { polyline, map: None }) if polyline == handle
        ));
        assert_eq!(provider.total_listeners(), 0);
        assert!(map.polylines().is_empty());
    }
}
