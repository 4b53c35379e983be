//! Info window entity.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::geo::GeoPoint;
use crate::map::registry::Entity;
use crate::map::{MapContext, MapState};
use crate::marker::{Marker, MarkerState};
use crate::polyline::{Polyline, PolylineState};
use crate::provider::{
    EventKind, EventTarget, InfoWindowAnchor, InfoWindowHandle, InfoWindowOptions, ListenerHandle,
    MapHandle, MapProvider,
};
use crate::scheduler::{next_entity_id, EntityId, OpKind, Scheduler};

/// Entity the info window is attached to.
#[derive(Clone)]
enum Owner {
    Map(Weak<RefCell<MapState>>),
    Marker(Weak<RefCell<MarkerState>>),
    Polyline(Weak<RefCell<PolylineState>>),
}

/// A popup window shown over the map.
///
/// A window attached directly to the map ([`InfoWindow::on_map`]) opens as
/// soon as the map is mounted and stays at its configured position. A window
/// attached to a marker or polyline opens and closes on the configured
/// trigger events of its owner ([`InfoWindow::set_open_on`] /
/// [`InfoWindow::set_close_on`]) and is anchored to the owner when shown.
#[derive(Clone)]
pub struct InfoWindow {
    inner: Rc<RefCell<InfoWindowState>>,
}

pub(crate) struct InfoWindowState {
    pub(crate) id: EntityId,
    provider: Rc<dyn MapProvider>,
    scheduler: Rc<Scheduler>,
    owner: Owner,
    handle: InfoWindowHandle,
    lat: Option<f64>,
    lng: Option<f64>,
    options: InfoWindowOptions,
    open_on: EventKind,
    close_on: Option<EventKind>,
    is_open: bool,
    listeners: Vec<ListenerHandle>,
    on_open: Option<Rc<dyn Fn()>>,
    on_close: Option<Rc<dyn Fn()>>,
}

impl InfoWindow {
    /// Creates a window attached directly to the map.
    ///
    /// The window opens once the map is mounted (or immediately, if it
    /// already is) and stays open until closed or destroyed.
    pub fn on_map(map: &MapContext) -> Self {
        let (provider, scheduler, map_handle) = {
            let state = map.state().borrow();
            (state.provider.clone(), state.scheduler.clone(), state.handle)
        };

        let window = Self::create(provider, scheduler, Owner::Map(Rc::downgrade(map.state())));
        map.register_infowindow(window.clone());
        if map_handle.is_some() {
            window.open();
        }
        window
    }

    /// Creates a window attached to a marker.
    ///
    /// By default the window opens on `click` and never closes on a
    /// trigger (only through its close button or programmatically).
    pub fn on_marker(marker: &Marker) -> Self {
        let (provider, scheduler) = marker.shared();
        let window = Self::create(
            provider,
            scheduler,
            Owner::Marker(Rc::downgrade(marker.state())),
        );
        marker.register_infowindow(Rc::downgrade(&window.inner), EventKind::Click, None);
        window
    }

    /// Creates a window attached to a polyline.
    pub fn on_polyline(polyline: &Polyline) -> Self {
        let (provider, scheduler) = polyline.shared();
        let window = Self::create(
            provider,
            scheduler,
            Owner::Polyline(Rc::downgrade(polyline.state())),
        );
        polyline.register_infowindow(Rc::downgrade(&window.inner), EventKind::Click, None);
        window
    }

    pub(crate) fn from_state(inner: Rc<RefCell<InfoWindowState>>) -> Self {
        Self { inner }
    }

    /// Sets the event opening the window, by trigger name.
    ///
    /// Unrecognized names fall back to `click`.
    pub fn set_open_on(&self, name: &str) {
        let open_on = EventKind::from_trigger_name(name).unwrap_or(EventKind::Click);
        self.inner.borrow_mut().open_on = open_on;
        self.re_register();
    }

    /// Sets the event closing the window, by trigger name.
    ///
    /// Unrecognized names leave the window without a close trigger. Setting
    /// the close trigger equal to the open trigger makes the event toggle
    /// the window instead.
    pub fn set_close_on(&self, name: &str) {
        self.inner.borrow_mut().close_on = EventKind::from_trigger_name(name);
        self.re_register();
    }

    /// Sets the latitude of the window. Map-attached windows are placed at
    /// their configured position; owner-attached windows are anchored to
    /// the owner instead.
    pub fn set_lat(&self, lat: impl Into<Option<f64>>) {
        self.inner.borrow_mut().lat = lat.into();
        self.schedule(OpKind::SetPosition, |window| window.apply_position());
    }

    /// Sets the longitude of the window.
    pub fn set_lng(&self, lng: impl Into<Option<f64>>) {
        self.inner.borrow_mut().lng = lng.into();
        self.schedule(OpKind::SetPosition, |window| window.apply_position());
    }

    /// Applies display options to the window.
    pub fn set_options(&self, options: InfoWindowOptions) {
        self.inner.borrow_mut().options = options;
        self.schedule(OpKind::SetOptions, |window| window.apply_options());
    }

    /// Registers a callback invoked when the window finishes opening.
    pub fn on_open(&self, callback: impl Fn() + 'static) {
        self.inner.borrow_mut().on_open = Some(Rc::new(callback));
    }

    /// Registers a callback invoked when the window is closed through its
    /// close button.
    pub fn on_close(&self, callback: impl Fn() + 'static) {
        self.inner.borrow_mut().on_close = Some(Rc::new(callback));
    }

    /// Opens the window, anchored to its owner if it has one.
    ///
    /// Does nothing while the map is not mounted.
    pub fn open(&self) {
        let (provider, handle, owner) = {
            let state = self.inner.borrow();
            (state.provider.clone(), state.handle, state.owner.clone())
        };

        let (map_handle, anchor) = match owner {
            Owner::Map(map) => (map.upgrade().and_then(|m| m.borrow().handle), None),
            Owner::Marker(marker) => {
                let Some(marker) = marker.upgrade() else {
                    return;
                };
                let marker = Marker::from_state(marker);
                (
                    marker.map_handle(),
                    marker.handle().map(InfoWindowAnchor::Marker),
                )
            }
            Owner::Polyline(polyline) => {
                let Some(polyline) = polyline.upgrade() else {
                    return;
                };
                let polyline = Polyline::from_state(polyline);
                (
                    polyline.map_handle(),
                    polyline.handle().map(InfoWindowAnchor::Polyline),
                )
            }
        };
        let Some(map_handle) = map_handle else {
            return;
        };

        provider.open_info_window(handle, map_handle, anchor);
        self.inner.borrow_mut().is_open = true;
    }

    /// Closes the window.
    pub fn close(&self) {
        let (provider, handle, was_open) = {
            let mut state = self.inner.borrow_mut();
            let was_open = state.is_open;
            state.is_open = false;
            (state.provider.clone(), state.handle, was_open)
        };
        if was_open {
            provider.close_info_window(handle);
        }
    }

    /// Returns true if the window is currently shown.
    pub fn is_open(&self) -> bool {
        self.inner.borrow().is_open
    }

    /// Closes the window, detaches its listeners and removes it from its
    /// owner.
    pub fn destroy(&self) {
        self.close();

        let (provider, listeners, owner, id) = {
            let mut state = self.inner.borrow_mut();
            (
                state.provider.clone(),
                std::mem::take(&mut state.listeners),
                state.owner.clone(),
                state.id,
            )
        };
        for listener in listeners {
            provider.remove_listener(listener);
        }

        match owner {
            Owner::Map(map) => {
                if let Some(map) = map.upgrade() {
                    MapContext::from_state(map).unregister_infowindow(id);
                }
            }
            Owner::Marker(marker) => {
                if let Some(marker) = marker.upgrade() {
                    Marker::from_state(marker).unregister_infowindow(id);
                }
            }
            Owner::Polyline(polyline) => {
                if let Some(polyline) = polyline.upgrade() {
                    Polyline::from_state(polyline).unregister_infowindow(id);
                }
            }
        }
    }

    /// Flips the window between open and closed. Used by owners whose open
    /// and close triggers are the same event.
    pub(crate) fn toggle(&self) {
        if self.is_open() {
            self.close();
        } else {
            self.open();
        }
    }

    /// Opens a map-attached window once the map is mounted.
    pub(crate) fn map_ready(&self, _map_handle: MapHandle) {
        if matches!(self.inner.borrow().owner, Owner::Map(_)) {
            self.open();
        }
    }

    fn create(provider: Rc<dyn MapProvider>, scheduler: Rc<Scheduler>, owner: Owner) -> Self {
        let handle = provider.create_info_window(&InfoWindowOptions::default());
        let window = Self {
            inner: Rc::new(RefCell::new(InfoWindowState {
                id: next_entity_id(),
                provider,
                scheduler,
                owner,
                handle,
                lat: None,
                lng: None,
                options: InfoWindowOptions::default(),
                open_on: EventKind::Click,
                close_on: None,
                is_open: false,
                listeners: Vec::new(),
                on_open: None,
                on_close: None,
            })),
        };
        window.attach_lifecycle_listeners();
        window
    }

    fn attach_lifecycle_listeners(&self) {
        let (provider, handle) = {
            let state = self.inner.borrow();
            (state.provider.clone(), state.handle)
        };

        let weak = Rc::downgrade(&self.inner);
        let close_click = provider.add_listener(
            EventTarget::InfoWindow(handle),
            EventKind::CloseClick,
            Box::new(move |_| {
                if let Some(inner) = weak.upgrade() {
                    InfoWindow { inner }.close_clicked();
                }
            }),
        );
        let weak = Rc::downgrade(&self.inner);
        let dom_ready = provider.add_listener(
            EventTarget::InfoWindow(handle),
            EventKind::DomReady,
            Box::new(move |_| {
                if let Some(inner) = weak.upgrade() {
                    InfoWindow { inner }.dom_ready();
                }
            }),
        );

        let mut state = self.inner.borrow_mut();
        state.listeners.push(close_click);
        state.listeners.push(dom_ready);
    }

    fn close_clicked(&self) {
        let on_close = {
            let mut state = self.inner.borrow_mut();
            state.is_open = false;
            state.on_close.clone()
        };
        if let Some(callback) = on_close {
            callback();
        }
    }

    fn dom_ready(&self) {
        let on_open = self.inner.borrow().on_open.clone();
        if let Some(callback) = on_open {
            callback();
        }
    }

    /// Re-registers the window with its owner so changed triggers take
    /// effect.
    fn re_register(&self) {
        let (owner, id, open_on, close_on) = {
            let state = self.inner.borrow();
            (
                state.owner.clone(),
                state.id,
                state.open_on,
                state.close_on,
            )
        };
        let weak = Rc::downgrade(&self.inner);

        match owner {
            Owner::Map(_) => {}
            Owner::Marker(marker) => {
                if let Some(marker) = marker.upgrade() {
                    let marker = Marker::from_state(marker);
                    marker.unregister_infowindow(id);
                    marker.register_infowindow(weak, open_on, close_on);
                }
            }
            Owner::Polyline(polyline) => {
                if let Some(polyline) = polyline.upgrade() {
                    let polyline = Polyline::from_state(polyline);
                    polyline.unregister_infowindow(id);
                    polyline.register_infowindow(weak, open_on, close_on);
                }
            }
        }
    }

    fn schedule(&self, op: OpKind, run: fn(&InfoWindow)) {
        let (id, scheduler) = {
            let state = self.inner.borrow();
            (state.id, state.scheduler.clone())
        };
        let weak = Rc::downgrade(&self.inner);
        scheduler.schedule_once(id, op, move || {
            if let Some(inner) = weak.upgrade() {
                run(&InfoWindow { inner });
            }
        });
    }

    fn apply_position(&self) {
        let (provider, handle, lat, lng) = {
            let state = self.inner.borrow();
            (state.provider.clone(), state.handle, state.lat, state.lng)
        };
        if let (Some(lat), Some(lng)) = (lat, lng) {
            provider.set_info_window_position(handle, GeoPoint::new(lat, lng));
        }
    }

    fn apply_options(&self) {
        let (provider, handle, options) = {
            let state = self.inner.borrow();
            (state.provider.clone(), state.handle, state.options)
        };
        provider.set_info_window_options(handle, &options);
    }
}

impl Entity for InfoWindow {
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

    fn click(provider: &StubProvider, marker: &Marker) {
        let handle = marker.handle().expect("marker must be constructed");
        provider.fire(
            EventTarget::Marker(handle),
            EventKind::Click,
            &EventData::default(),
        );
    }

    #[test]
    fn map_window_opens_once_the_map_mounts() {
        let provider = StubProvider::new();
        let map = MapContext::new(provider.clone());
        let window = InfoWindow::on_map(&map);
        window.set_lat(1.0);
        window.set_lng(2.0);
        assert!(!window.is_open());

        map.mount("canvas").expect("canvas must exist");
        assert!(window.is_open());

        map.run_cycle();
        assert!(matches!(
            provider.last_call(|c| matches!(c, StubCall::SetInfoWindowPosition { .. })),
            Some(StubCall::SetInfoWindowPosition { position, .. }) if position == latlng!(1.0, 2.0)
        ));
    }

    #[test]
    fn map_window_on_mounted_map_opens_immediately() {
        let provider = StubProvider::new();
        let map = mounted_map(&provider);
        let window = InfoWindow::on_map(&map);
        assert!(window.is_open());
    }

    #[test]
    fn marker_window_opens_on_click_by_default() {
        let provider = StubProvider::new();
        let map = mounted_map(&provider);
        let marker = Marker::new(&map);
        let window = InfoWindow::on_marker(&marker);
        assert!(!window.is_open());

        click(&provider, &marker);
        assert!(window.is_open());

        let opened = provider.last_call(|c| matches!(c, StubCall::OpenInfoWindow { .. }));
        assert!(matches!(
            opened,
            Some(StubCall::OpenInfoWindow {
                anchor: Some(InfoWindowAnchor::Marker(anchor)),
                ..
            }) if Some(anchor) == marker.handle()
        ));
    }

    #[test]
    fn unknown_open_trigger_falls_back_to_click() {
        let provider = StubProvider::new();
        let map = mounted_map(&provider);
        let marker = Marker::new(&map);
        let window = InfoWindow::on_marker(&marker);
        window.set_open_on("levitate");

        click(&provider, &marker);
        assert!(window.is_open());
    }

    #[test]
    fn unknown_close_trigger_means_no_close_trigger() {
        let provider = StubProvider::new();
        let map = mounted_map(&provider);
        let marker = Marker::new(&map);
        let window = InfoWindow::on_marker(&marker);
        window.set_close_on("dragend");

        click(&provider, &marker);
        assert!(window.is_open());

        let handle = marker.handle().expect("marker must be constructed");
        provider.fire(
            EventTarget::Marker(handle),
            EventKind::DragEnd,
            &EventData::default(),
        );
        assert!(window.is_open());
    }

    #[test]
    fn separate_open_and_close_triggers() {
        let provider = StubProvider::new();
        let map = mounted_map(&provider);
        let marker = Marker::new(&map);
        let window = InfoWindow::on_marker(&marker);
        window.set_open_on("mouseover");
        window.set_close_on("mouseout");

        let handle = marker.handle().expect("marker must be constructed");
        provider.fire(
            EventTarget::Marker(handle),
            EventKind::MouseOver,
            &EventData::default(),
        );
        assert!(window.is_open());

        provider.fire(
            EventTarget::Marker(handle),
            EventKind::MouseOut,
            &EventData::default(),
        );
        assert!(!window.is_open());
    }

    #[test]
    fn equal_triggers_toggle_the_window() {
        let provider = StubProvider::new();
        let map = mounted_map(&provider);
        let marker = Marker::new(&map);
        let window = InfoWindow::on_marker(&marker);
        window.set_open_on("click");
        window.set_close_on("click");

        click(&provider, &marker);
        assert!(window.is_open());
        click(&provider, &marker);
        assert!(!window.is_open());
        click(&provider, &marker);
        assert!(window.is_open());
    }

    #[test]
    fn group_click_closes_the_other_windows_of_the_group() {
        let provider = StubProvider::new();
        let map = mounted_map(&provider);

        let grouped: Vec<_> = (0..3)
            .map(|_| {
                let marker = Marker::new(&map);
                marker.set_group("offices".to_string());
                let window = InfoWindow::on_marker(&marker);
                (marker, window)
            })
            .collect();
        let lone_marker = Marker::new(&map);
        lone_marker.set_group("warehouses".to_string());
        let lone_window = InfoWindow::on_marker(&lone_marker);

        click(&provider, &lone_marker);
        click(&provider, &grouped[1].0);
        assert!(grouped[1].1.is_open());
        assert!(lone_window.is_open());

        // clicking another member closes the first, not the other group
        click(&provider, &grouped[0].0);
        assert!(grouped[0].1.is_open());
        assert!(!grouped[1].1.is_open());
        assert!(!grouped[2].1.is_open());
        assert!(lone_window.is_open());
    }

    #[test]
    fn polyline_window_opens_anchored_to_the_polyline() {
        let provider = StubProvider::new();
        let map = mounted_map(&provider);
        let polyline = Polyline::new(&map);
        let window = InfoWindow::on_polyline(&polyline);

        let handle = polyline.handle().expect("polyline must be constructed");
        provider.fire(
            EventTarget::Polyline(handle),
            EventKind::Click,
            &EventData::default(),
        );

        assert!(window.is_open());
        assert!(matches!(
            provider.last_call(|c| matches!(c, StubCall::OpenInfoWindow { .. })),
            Some(StubCall::OpenInfoWindow {
                anchor: Some(InfoWindowAnchor::Polyline(anchor)),
                ..
            }) if anchor == handle
        ));
    }

    #[test]
    fn close_button_closes_and_bubbles() {
        let provider = StubProvider::new();
        let map = mounted_map(&provider);
        let window = InfoWindow::on_map(&map);
        assert!(window.is_open());

        let closed = Rc::new(Cell::new(false));
        let closed_clone = closed.clone();
        window.on_close(move || closed_clone.set(true));

        let handle = window.inner.borrow().handle;
        provider.fire(
            EventTarget::InfoWindow(handle),
            EventKind::CloseClick,
            &EventData::default(),
        );
        assert!(!window.is_open());
        assert!(closed.get());
    }

    #[test]
    fn options_are_forwarded() {
        let provider = StubProvider::new();
        let map = mounted_map(&provider);
        let window = InfoWindow::on_map(&map);

        window.set_options(InfoWindowOptions {
            disable_auto_pan: Some(true),
            max_width: Some(240),
            pixel_offset: Some((0, -30)),
        });
        map.run_cycle();

        assert!(matches!(
            provider.last_call(|c| matches!(c, StubCall::SetInfoWindowOptions { .. })),
            Some(StubCall::SetInfoWindowOptions { options, .. })
                if options.max_width == Some(240)
        ));
    }

    #[test]
    fn destroy_removes_the_trigger_listeners() {
        let provider = StubProvider::new();
        let map = mounted_map(&provider);
        let marker = Marker::new(&map);
        let window = InfoWindow::on_marker(&marker);
        window.destroy();

        click(&provider, &marker);
        assert!(!window.is_open());
        assert_eq!(
            provider.count_calls(|c| matches!(c, StubCall::OpenInfoWindow { .. })),
            0
        );
    }

    #[test]
    fn destroying_the_marker_detaches_the_window_triggers() {
        let provider = StubProvider::new();
        let map = mounted_map(&provider);
        let marker = Marker::new(&map);
        let _window = InfoWindow::on_marker(&marker);

        let before = provider.total_listeners();
        marker.destroy();
        // marker interaction listeners plus the window trigger are gone
        assert_eq!(provider.total_listeners(), before - 3);
    }
}
