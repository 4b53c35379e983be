//! Marker entity.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::geo::{GeoBounds, GeoPoint};
use crate::geocode::Geocoder;
use crate::infowindow::{InfoWindow, InfoWindowState};
use crate::map::registry::Entity;
use crate::map::{MapContext, MapState};
use crate::provider::{
    EventData, EventKind, EventTarget, ListenerHandle, MapHandle, MapProvider, MarkerHandle,
};
use crate::scheduler::{next_entity_id, EntityId, OpKind, Scheduler};

/// Info window registered on a marker or polyline, together with the SDK
/// listeners driving its open/close triggers.
pub(crate) struct AttachedWindow {
    pub(crate) window: Weak<RefCell<InfoWindowState>>,
    pub(crate) open_on: EventKind,
    pub(crate) close_on: Option<EventKind>,
    pub(crate) listeners: Vec<ListenerHandle>,
}

impl AttachedWindow {
    pub(crate) fn new(
        window: Weak<RefCell<InfoWindowState>>,
        open_on: EventKind,
        close_on: Option<EventKind>,
    ) -> Self {
        Self {
            window,
            open_on,
            close_on,
            listeners: Vec::new(),
        }
    }

    pub(crate) fn is_window(&self, id: EntityId) -> bool {
        self.window
            .upgrade()
            .is_some_and(|state| state.borrow().id == id)
    }
}

/// A point of interest shown on the map.
///
/// A marker belongs to the [`MapContext`] it is created on and lives in the
/// map's marker registry until [`Marker::destroy`] is called. Its position
/// can be given directly through [`Marker::set_lat`] / [`Marker::set_lng`]
/// or resolved from an address with [`Marker::set_address`].
///
/// Cloning a `Marker` yields a second handle to the same entity.
#[derive(Clone)]
pub struct Marker {
    inner: Rc<RefCell<MarkerState>>,
}

pub(crate) struct MarkerState {
    id: EntityId,
    provider: Rc<dyn MapProvider>,
    scheduler: Rc<Scheduler>,
    map: Weak<RefCell<MapState>>,
    handle: Option<MarkerHandle>,
    lat: Option<f64>,
    lng: Option<f64>,
    viewport: Option<GeoBounds>,
    icon: Option<String>,
    label: Option<String>,
    title: Option<String>,
    z_index: Option<i32>,
    draggable: Option<bool>,
    group: Option<String>,
    listeners: Vec<ListenerHandle>,
    window: Option<AttachedWindow>,
    on_click: Option<Rc<dyn Fn()>>,
    on_drag: Option<Rc<dyn Fn(GeoPoint)>>,
    on_location_change: Option<Rc<dyn Fn(GeoPoint)>>,
}

impl Marker {
    /// Creates a marker and registers it with the map.
    ///
    /// If the map is already mounted, the underlying marker is constructed
    /// and attached immediately; otherwise that happens when the map mounts.
    pub fn new(map: &MapContext) -> Self {
        let (provider, scheduler, map_handle) = {
            let state = map.state().borrow();
            (state.provider.clone(), state.scheduler.clone(), state.handle)
        };

        let marker = Self {
            inner: Rc::new(RefCell::new(MarkerState {
                id: next_entity_id(),
                provider,
                scheduler,
                map: Rc::downgrade(map.state()),
                handle: None,
                lat: None,
                lng: None,
                viewport: None,
                icon: None,
                label: None,
                title: None,
                z_index: None,
                draggable: None,
                group: None,
                listeners: Vec::new(),
                window: None,
                on_click: None,
                on_drag: None,
                on_location_change: None,
            })),
        };

        map.register_marker(marker.clone());
        if let Some(handle) = map_handle {
            marker.map_ready(handle);
        }
        marker
    }

    pub(crate) fn from_state(inner: Rc<RefCell<MarkerState>>) -> Self {
        Self { inner }
    }

    pub(crate) fn state(&self) -> &Rc<RefCell<MarkerState>> {
        &self.inner
    }

    pub(crate) fn shared(&self) -> (Rc<dyn MapProvider>, Rc<Scheduler>) {
        let state = self.inner.borrow();
        (state.provider.clone(), state.scheduler.clone())
    }

    /// Handle of the map the marker belongs to, if it is mounted.
    pub(crate) fn map_handle(&self) -> Option<MapHandle> {
        let map = self.inner.borrow().map.clone();
        map.upgrade().and_then(|map| map.borrow().handle)
    }

    /// Sets the latitude. Position changes within one cycle are forwarded
    /// as a single provider call, and only once both coordinates are set.
    pub fn set_lat(&self, lat: impl Into<Option<f64>>) {
        self.inner.borrow_mut().lat = lat.into();
        self.schedule(OpKind::SetPosition, |marker| marker.apply_position());
        self.notify_map();
    }

    /// Sets the longitude.
    pub fn set_lng(&self, lng: impl Into<Option<f64>>) {
        self.inner.borrow_mut().lng = lng.into();
        self.schedule(OpKind::SetPosition, |marker| marker.apply_position());
        self.notify_map();
    }

    /// Sets the viewport preferred when fitting the map to its markers.
    ///
    /// When present, the viewport is united into the fitted bounds instead
    /// of the marker's point.
    pub fn set_viewport(&self, viewport: impl Into<Option<GeoBounds>>) {
        self.inner.borrow_mut().viewport = viewport.into();
        self.notify_map();
    }

    /// Resolves the marker position from an address.
    ///
    /// The lookup is asynchronous; once it resolves, the marker moves to
    /// the found location, adopts the reported viewport and notifies
    /// [`Marker::on_location_change`]. A failed lookup leaves the marker
    /// where it was.
    pub fn set_address(&self, address: &str) {
        let provider = self.inner.borrow().provider.clone();
        let weak = Rc::downgrade(&self.inner);
        Geocoder::new(provider).search(address, move |result| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let marker = Marker { inner };
            match result {
                Ok(found) => marker.location_resolved(found.location, found.viewport),
                Err(err) => log::warn!("marker address lookup failed: {err}"),
            }
        });
    }

    /// Sets the icon image.
    pub fn set_icon(&self, icon: impl Into<Option<String>>) {
        self.inner.borrow_mut().icon = icon.into();
        self.schedule(OpKind::SetIcon, |marker| marker.apply_icon());
    }

    /// Sets the label shown on the marker.
    pub fn set_label(&self, label: impl Into<Option<String>>) {
        self.inner.borrow_mut().label = label.into();
        self.schedule(OpKind::SetLabel, |marker| marker.apply_label());
    }

    /// Sets the hover title.
    pub fn set_title(&self, title: impl Into<Option<String>>) {
        self.inner.borrow_mut().title = title.into();
        self.schedule(OpKind::SetTitle, |marker| marker.apply_title());
    }

    /// Sets the drawing order relative to other markers.
    pub fn set_z_index(&self, z_index: impl Into<Option<i32>>) {
        self.inner.borrow_mut().z_index = z_index.into();
        self.schedule(OpKind::SetZIndex, |marker| marker.apply_z_index());
    }

    /// Makes the marker draggable or fixed.
    pub fn set_draggable(&self, draggable: bool) {
        self.inner.borrow_mut().draggable = Some(draggable);
        self.schedule(OpKind::SetDraggable, |marker| marker.apply_draggable());
    }

    /// Assigns the marker to a click group.
    ///
    /// Clicking any marker of a group closes the info windows of all other
    /// entities sharing that group.
    pub fn set_group(&self, group: impl Into<Option<String>>) {
        self.inner.borrow_mut().group = group.into();
    }

    /// Registers a callback invoked when the marker is clicked.
    pub fn on_click(&self, callback: impl Fn() + 'static) {
        self.inner.borrow_mut().on_click = Some(Rc::new(callback));
    }

    /// Registers a callback invoked with the new position when a drag of
    /// the marker ends.
    pub fn on_drag(&self, callback: impl Fn(GeoPoint) + 'static) {
        self.inner.borrow_mut().on_drag = Some(Rc::new(callback));
    }

    /// Registers a callback invoked when an address lookup moves the marker.
    pub fn on_location_change(&self, callback: impl Fn(GeoPoint) + 'static) {
        self.inner.borrow_mut().on_location_change = Some(Rc::new(callback));
    }

    /// Position of the marker, if both coordinates are known.
    pub fn position(&self) -> Option<GeoPoint> {
        let state = self.inner.borrow();
        match (state.lat, state.lng) {
            (Some(lat), Some(lng)) => Some(GeoPoint::new(lat, lng)),
            _ => None,
        }
    }

    /// Viewport of the marker, if one was set or resolved.
    pub fn viewport(&self) -> Option<GeoBounds> {
        self.inner.borrow().viewport
    }

    /// Click group of the marker.
    pub fn group(&self) -> Option<String> {
        self.inner.borrow().group.clone()
    }

    /// Handle of the underlying marker, if constructed.
    pub fn handle(&self) -> Option<MarkerHandle> {
        self.inner.borrow().handle
    }

    /// Detaches the marker from the map and removes it from the registry.
    ///
    /// All SDK listeners attached on behalf of the marker (including info
    /// window triggers) are removed synchronously.
    pub fn destroy(&self) {
        let (provider, handle, listeners, window, map, id) = {
            let mut state = self.inner.borrow_mut();
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
            provider.attach_marker(handle, None);
        }
        if let Some(map) = map.upgrade() {
            MapContext::from_state(map).unregister_marker(id);
        }
    }

    /// Constructs and attaches the underlying marker once the map exists.
    pub(crate) fn map_ready(&self, map_handle: MapHandle) {
        let created = {
            let mut state = self.inner.borrow_mut();
            if state.handle.is_none() {
                state.handle = Some(state.provider.create_marker());
                true
            } else {
                false
            }
        };

        if created {
            self.apply_position();
            self.apply_icon();
            self.apply_label();
            self.apply_title();
            self.apply_z_index();
            self.apply_draggable();
        }

        let (provider, handle) = {
            let state = self.inner.borrow();
            (state.provider.clone(), state.handle)
        };
        if let Some(handle) = handle {
            provider.attach_marker(handle, Some(map_handle));
        }

        if created {
            self.attach_interaction_listeners();
            self.attach_trigger_listeners();
        }
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

    /// Closes the registered info window, if any is open.
    pub(crate) fn close_infowindow(&self) {
        let window = {
            let state = self.inner.borrow();
            state.window.as_ref().and_then(|w| w.window.upgrade())
        };
        if let Some(state) = window {
            InfoWindow::from_state(state).close();
        }
    }

    fn schedule(&self, op: OpKind, run: fn(&Marker)) {
        let (id, scheduler) = {
            let state = self.inner.borrow();
            (state.id, state.scheduler.clone())
        };
        let weak = Rc::downgrade(&self.inner);
        scheduler.schedule_once(id, op, move || {
            if let Some(inner) = weak.upgrade() {
                run(&Marker { inner });
            }
        });
    }

    fn notify_map(&self) {
        let map = self.inner.borrow().map.clone();
        if let Some(map) = map.upgrade() {
            MapContext::from_state(map).notify_markers_changed();
        }
    }

    fn apply_position(&self) {
        let (provider, handle, lat, lng) = {
            let state = self.inner.borrow();
            (state.provider.clone(), state.handle, state.lat, state.lng)
        };
        if let (Some(handle), Some(lat), Some(lng)) = (handle, lat, lng) {
            provider.set_marker_position(handle, GeoPoint::new(lat, lng));
        }
    }

    fn apply_icon(&self) {
        let (provider, handle, icon) = {
            let state = self.inner.borrow();
            (state.provider.clone(), state.handle, state.icon.clone())
        };
        if let (Some(handle), Some(icon)) = (handle, icon) {
            provider.set_marker_icon(handle, &icon);
        }
    }

    fn apply_label(&self) {
        let (provider, handle, label) = {
            let state = self.inner.borrow();
            (state.provider.clone(), state.handle, state.label.clone())
        };
        if let (Some(handle), Some(label)) = (handle, label) {
            provider.set_marker_label(handle, &label);
        }
    }

    fn apply_title(&self) {
        let (provider, handle, title) = {
            let state = self.inner.borrow();
            (state.provider.clone(), state.handle, state.title.clone())
        };
        if let (Some(handle), Some(title)) = (handle, title) {
            provider.set_marker_title(handle, &title);
        }
    }

    fn apply_z_index(&self) {
        let (provider, handle, z_index) = {
            let state = self.inner.borrow();
            (state.provider.clone(), state.handle, state.z_index)
        };
        if let (Some(handle), Some(z_index)) = (handle, z_index) {
            provider.set_marker_z_index(handle, z_index);
        }
    }

    fn apply_draggable(&self) {
        let (provider, handle, draggable) = {
            let state = self.inner.borrow();
            (state.provider.clone(), state.handle, state.draggable)
        };
        if let (Some(handle), Some(draggable)) = (handle, draggable) {
            provider.set_marker_draggable(handle, draggable);
        }
    }

    fn location_resolved(&self, location: GeoPoint, viewport: Option<GeoBounds>) {
        let on_location_change = {
            let mut state = self.inner.borrow_mut();
            state.lat = Some(location.lat());
            state.lng = Some(location.lng());
            state.viewport = viewport;
            state.on_location_change.clone()
        };

        self.schedule(OpKind::SetPosition, |marker| marker.apply_position());
        self.notify_map();
        if let Some(callback) = on_location_change {
            callback(location);
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
            MapContext::from_state(map).group_marker_clicked(id, &group);
        }
    }

    fn drag_ended(&self, data: &EventData) {
        let Some(position) = data.position else {
            return;
        };

        // the provider already moved the marker; only the declarative
        // state needs to catch up
        let on_drag = {
            let mut state = self.inner.borrow_mut();
            state.lat = Some(position.lat());
            state.lng = Some(position.lng());
            state.on_drag.clone()
        };

        self.notify_map();
        if let Some(callback) = on_drag {
            callback(position);
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
            EventTarget::Marker(handle),
            EventKind::Click,
            Box::new(move |_| {
                if let Some(inner) = weak.upgrade() {
                    Marker { inner }.clicked();
                }
            }),
        );
        let weak = Rc::downgrade(&self.inner);
        let drag = provider.add_listener(
            EventTarget::Marker(handle),
            EventKind::DragEnd,
            Box::new(move |data| {
                if let Some(inner) = weak.upgrade() {
                    Marker { inner }.drag_ended(data);
                }
            }),
        );

        let mut state = self.inner.borrow_mut();
        state.listeners.push(click);
        state.listeners.push(drag);
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
            EventTarget::Marker(handle),
            window,
            open_on,
            close_on,
        );
        if let Some(slot) = &mut self.inner.borrow_mut().window {
            slot.listeners = attached;
        }
    }
}

/// Attaches the open/close trigger listeners of an info window to its owner.
///
/// Equal open and close triggers collapse into a single toggling listener.
pub(crate) fn trigger_listeners(
    provider: &dyn MapProvider,
    target: EventTarget,
    window: Weak<RefCell<InfoWindowState>>,
    open_on: EventKind,
    close_on: Option<EventKind>,
) -> Vec<ListenerHandle> {
    let mut attached = Vec::new();

    if close_on == Some(open_on) {
        attached.push(provider.add_listener(
            target,
            open_on,
            Box::new(move |_| {
                if let Some(state) = window.upgrade() {
                    InfoWindow::from_state(state).toggle();
                }
            }),
        ));
        return attached;
    }

    let open_window = window.clone();
    attached.push(provider.add_listener(
        target,
        open_on,
        Box::new(move |_| {
            if let Some(state) = open_window.upgrade() {
                InfoWindow::from_state(state).open();
            }
        }),
    ));
    if let Some(close_on) = close_on {
        attached.push(provider.add_listener(
            target,
            close_on,
            Box::new(move |_| {
                if let Some(state) = window.upgrade() {
                    InfoWindow::from_state(state).close();
                }
            }),
        ));
    }
    attached
}

impl Entity for Marker {
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
    use crate::provider::GeocodeResult;

    fn mounted_map(provider: &Rc<StubProvider>) -> MapContext {
        let map = MapContext::new(provider.clone());
        map.mount("canvas").expect("canvas must exist");
        map
    }

    #[test]
    fn marker_on_mounted_map_is_created_and_attached() {
        let provider = StubProvider::new();
        let map = mounted_map(&provider);

        let marker = Marker::new(&map);
        let handle = marker.handle().expect("marker must be constructed");

        let attached = provider.last_call(|c| matches!(c, StubCall::AttachMarker { .. }));
        assert!(matches!(
            attached,
            Some(StubCall::AttachMarker { marker, map: Some(_) }) if marker == handle
        ));
    }

    #[test]
    fn marker_waits_for_the_map_to_mount() {
        let provider = StubProvider::new();
        let map = MapContext::new(provider.clone());

        let marker = Marker::new(&map);
        marker.set_lat(7.0);
        marker.set_lng(8.0);
        marker.set_icon("flag.png".to_string());
        map.run_cycle();
        assert!(marker.handle().is_none());
        assert!(provider.calls().is_empty());

        // mounting constructs the marker and applies the stored state
        map.mount("canvas").expect("canvas must exist");
        assert!(marker.handle().is_some());
        assert_eq!(
            provider.count_calls(|c| matches!(c, StubCall::SetMarkerPosition { .. })),
            1
        );
        assert_eq!(
            provider.count_calls(|c| matches!(c, StubCall::SetMarkerIcon { .. })),
            1
        );
    }

    #[test]
    fn position_change_is_coalesced_within_a_cycle() {
        let provider = StubProvider::new();
        let map = mounted_map(&provider);
        let marker = Marker::new(&map);
        provider.clear_calls();

        marker.set_lat(1.0);
        marker.set_lng(2.0);
        map.run_cycle();

        assert_eq!(
            provider.count_calls(|c| matches!(c, StubCall::SetMarkerPosition { .. })),
            1
        );
        let call = provider.last_call(|c| matches!(c, StubCall::SetMarkerPosition { .. }));
        assert!(matches!(
            call,
            Some(StubCall::SetMarkerPosition { position, .. }) if position == latlng!(1.0, 2.0)
        ));
    }

    #[test]
    fn partial_position_is_not_forwarded() {
        let provider = StubProvider::new();
        let map = mounted_map(&provider);
        let marker = Marker::new(&map);

        marker.set_lat(1.0);
        map.run_cycle();

        assert_eq!(
            provider.count_calls(|c| matches!(c, StubCall::SetMarkerPosition { .. })),
            0
        );
        assert!(marker.position().is_none());
    }

    #[test]
    fn granular_setters_are_forwarded() {
        let provider = StubProvider::new();
        let map = mounted_map(&provider);
        let marker = Marker::new(&map);

        marker.set_label("A".to_string());
        marker.set_title("First stop".to_string());
        marker.set_z_index(3);
        marker.set_draggable(true);
        map.run_cycle();

        assert!(matches!(
            provider.last_call(|c| matches!(c, StubCall::SetMarkerLabel { .. })),
            Some(StubCall::SetMarkerLabel { label, .. }) if label == "A"
        ));
        assert!(matches!(
            provider.last_call(|c| matches!(c, StubCall::SetMarkerTitle { .. })),
            Some(StubCall::SetMarkerTitle { title, .. }) if title == "First stop"
        ));
        assert!(matches!(
            provider.last_call(|c| matches!(c, StubCall::SetMarkerZIndex { .. })),
            Some(StubCall::SetMarkerZIndex { z_index: 3, .. })
        ));
        assert!(matches!(
            provider.last_call(|c| matches!(c, StubCall::SetMarkerDraggable { .. })),
            Some(StubCall::SetMarkerDraggable { draggable: true, .. })
        ));
    }

    #[test]
    fn absent_attributes_are_not_forwarded() {
        let provider = StubProvider::new();
        let map = mounted_map(&provider);
        let marker = Marker::new(&map);

        marker.set_icon(None);
        marker.set_title(None);
        map.run_cycle();
        assert_eq!(
            provider.count_calls(|c| matches!(c, StubCall::SetMarkerIcon { .. })),
            0
        );
        assert_eq!(
            provider.count_calls(|c| matches!(c, StubCall::SetMarkerTitle { .. })),
            0
        );

        marker.set_icon("flag.png".to_string());
        map.run_cycle();
        assert!(matches!(
            provider.last_call(|c| matches!(c, StubCall::SetMarkerIcon { .. })),
            Some(StubCall::SetMarkerIcon { icon, .. }) if icon == "flag.png"
        ));
        assert_eq!(
            provider.count_calls(|c| matches!(c, StubCall::SetMarkerIcon { .. })),
            1
        );
    }

    #[test]
    fn click_bubbles_to_the_callback() {
        let provider = StubProvider::new();
        let map = mounted_map(&provider);
        let marker = Marker::new(&map);

        let clicks = Rc::new(Cell::new(0));
        let clicks_clone = clicks.clone();
        marker.on_click(move || clicks_clone.set(clicks_clone.get() + 1));

        let handle = marker.handle().expect("marker must be constructed");
        provider.fire(
            EventTarget::Marker(handle),
            EventKind::Click,
            &EventData::default(),
        );
        assert_eq!(clicks.get(), 1);
    }

    #[test]
    fn drag_end_updates_position_and_bubbles() {
        let provider = StubProvider::new();
        let map = mounted_map(&provider);
        let marker = Marker::new(&map);

        let dragged = Rc::new(Cell::new(None));
        let dragged_clone = dragged.clone();
        marker.on_drag(move |position| dragged_clone.set(Some(position)));

        let handle = marker.handle().expect("marker must be constructed");
        provider.fire(
            EventTarget::Marker(handle),
            EventKind::DragEnd,
            &EventData {
                position: Some(latlng!(3.0, 4.0)),
            },
        );

        assert_eq!(marker.position(), Some(latlng!(3.0, 4.0)));
        assert_eq!(dragged.get(), Some(latlng!(3.0, 4.0)));
    }

    #[test]
    fn address_resolution_moves_the_marker() {
        let provider = StubProvider::new();
        let map = mounted_map(&provider);
        let marker = Marker::new(&map);

        let moved = Rc::new(Cell::new(None));
        let moved_clone = moved.clone();
        marker.on_location_change(move |position| moved_clone.set(Some(position)));

        marker.set_address("Alexanderplatz, Berlin");
        provider.resolve_geocode(Ok(GeocodeResult {
            location: latlng!(52.521, 13.413),
            viewport: Some(GeoBounds::new(latlng!(52.5, 13.4), latlng!(52.55, 13.45))),
            formatted_address: None,
        }));
        map.run_cycle();

        assert_eq!(marker.position(), Some(latlng!(52.521, 13.413)));
        assert!(marker.viewport().is_some());
        assert_eq!(moved.get(), Some(latlng!(52.521, 13.413)));
        assert_eq!(
            provider.count_calls(|c| matches!(c, StubCall::SetMarkerPosition { .. })),
            1
        );
    }

    #[test]
    fn failed_address_lookup_leaves_the_marker_in_place() {
        let provider = StubProvider::new();
        let map = mounted_map(&provider);
        let marker = Marker::new(&map);
        marker.set_lat(1.0);
        marker.set_lng(2.0);

        marker.set_address("nowhere at all");
        provider.resolve_geocode(Err(crate::error::MapBindError::NoResults));
        map.run_cycle();

        assert_eq!(marker.position(), Some(latlng!(1.0, 2.0)));
    }

    #[test]
    fn destroy_detaches_and_unregisters() {
        let provider = StubProvider::new();
        let map = mounted_map(&provider);
        let marker = Marker::new(&map);
        let handle = marker.handle().expect("marker must be constructed");

        marker.destroy();

        assert!(matches!(
            provider.last_call(|c| matches!(c, StubCall::AttachMarker { map: None, .. })),
            Some(StubCall::AttachMarker { marker, map: None }) if marker == handle
        ));
        assert_eq!(provider.total_listeners(), 0);
        assert!(map.markers().is_empty());
    }

    #[test]
    fn updates_after_destroy_are_dropped() {
        let provider = StubProvider::new();
        let map = mounted_map(&provider);
        let marker = Marker::new(&map);

        marker.set_lat(1.0);
        marker.set_lng(2.0);
        marker.destroy();
        provider.clear_calls();
        map.run_cycle();

        assert_eq!(
            provider.count_calls(|c| matches!(c, StubCall::SetMarkerPosition { .. })),
            0
        );
    }
}
