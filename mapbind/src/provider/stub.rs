//! Recording provider used by tests and examples.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use super::{
    DirectionsHandle, DirectionsOptions, EventData, EventKind, EventListener, EventTarget,
    GeocodeCallback, GeocodeResult, InfoWindowAnchor, InfoWindowHandle, InfoWindowOptions,
    ListenerHandle, MapHandle, MapOptions, MapProvider, MarkerHandle, PolylineHandle,
    PolylineStyle, RouteCallback, RouteRequest, RouteResponse,
};
use crate::error::MapBindError;
use crate::geo::{GeoBounds, GeoPoint};

/// A single recorded provider call.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum StubCall {
    CreateMap { canvas: String, options: MapOptions },
    SetMapOptions { map: MapHandle, options: MapOptions },
    SetMapCenter { map: MapHandle, center: GeoPoint },
    SetMapZoom { map: MapHandle, zoom: f64 },
    FitBounds { map: MapHandle, bounds: GeoBounds },
    CreateMarker { marker: MarkerHandle },
    SetMarkerPosition { marker: MarkerHandle, position: GeoPoint },
    SetMarkerIcon { marker: MarkerHandle, icon: String },
    SetMarkerLabel { marker: MarkerHandle, label: String },
    SetMarkerTitle { marker: MarkerHandle, title: String },
    SetMarkerZIndex { marker: MarkerHandle, z_index: i32 },
    SetMarkerDraggable { marker: MarkerHandle, draggable: bool },
    AttachMarker { marker: MarkerHandle, map: Option<MapHandle> },
    CreatePolyline { polyline: PolylineHandle },
    SetPolylinePath { polyline: PolylineHandle, path: Vec<GeoPoint> },
    SetPolylineStyle { polyline: PolylineHandle, style: PolylineStyle },
    AttachPolyline { polyline: PolylineHandle, map: Option<MapHandle> },
    CreateInfoWindow { window: InfoWindowHandle, options: InfoWindowOptions },
    SetInfoWindowPosition { window: InfoWindowHandle, position: GeoPoint },
    SetInfoWindowOptions { window: InfoWindowHandle, options: InfoWindowOptions },
    OpenInfoWindow { window: InfoWindowHandle, map: MapHandle, anchor: Option<InfoWindowAnchor> },
    CloseInfoWindow { window: InfoWindowHandle },
    CreateDirections { directions: DirectionsHandle, map: MapHandle, options: DirectionsOptions },
    RequestRoute { directions: DirectionsHandle, request: RouteRequest },
    RenderRoute { directions: DirectionsHandle, response: RouteResponse },
    SetDirectionsStyle { directions: DirectionsHandle, style: PolylineStyle },
    DetachDirections { directions: DirectionsHandle },
    Geocode { address: String },
    AddListener { target: EventTarget, event: EventKind },
    RemoveListener { listener: ListenerHandle },
}

/// In-memory [`MapProvider`] recording every call it receives.
///
/// Asynchronous operations (geocoding, route requests) are held as pending
/// until resolved manually with [`StubProvider::resolve_geocode`] /
/// [`StubProvider::resolve_route`], and SDK events are simulated with
/// [`StubProvider::fire`]. This makes the whole component lifecycle fully
/// scriptable from a test.
#[derive(Default)]
pub struct StubProvider {
    state: RefCell<StubState>,
}

#[derive(Default)]
struct StubState {
    next_id: u64,
    calls: Vec<StubCall>,
    listeners: Vec<ListenerEntry>,
    pending_geocodes: Vec<(String, GeocodeCallback)>,
    pending_routes: Vec<RouteCallback>,
    failing_canvases: HashSet<String>,
}

struct ListenerEntry {
    handle: ListenerHandle,
    target: EventTarget,
    event: EventKind,
    listener: Rc<dyn Fn(&EventData)>,
}

impl StubProvider {
    /// Creates a stub provider ready to be shared with a component tree.
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// All recorded calls, in the order they were made.
    pub fn calls(&self) -> Vec<StubCall> {
        self.state.borrow().calls.clone()
    }

    /// Number of recorded calls matching the predicate.
    pub fn count_calls(&self, matching: impl Fn(&StubCall) -> bool) -> usize {
        self.state.borrow().calls.iter().filter(|c| matching(c)).count()
    }

    /// The most recent call matching the predicate.
    pub fn last_call(&self, matching: impl Fn(&StubCall) -> bool) -> Option<StubCall> {
        self.state
            .borrow()
            .calls
            .iter()
            .rev()
            .find(|c| matching(c))
            .cloned()
    }

    /// Forgets all recorded calls.
    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    /// Makes [`MapProvider::create_map`] fail for the given canvas name.
    pub fn fail_canvas(&self, canvas: &str) {
        self.state
            .borrow_mut()
            .failing_canvases
            .insert(canvas.to_string());
    }

    /// Simulates the SDK firing an event.
    pub fn fire(&self, target: EventTarget, event: EventKind, data: &EventData) {
        let listeners: Vec<_> = self
            .state
            .borrow()
            .listeners
            .iter()
            .filter(|entry| entry.target == target && entry.event == event)
            .map(|entry| entry.listener.clone())
            .collect();

        for listener in listeners {
            listener(data);
        }
    }

    /// Number of listeners currently subscribed to the target's event.
    pub fn listener_count(&self, target: EventTarget, event: EventKind) -> usize {
        self.state
            .borrow()
            .listeners
            .iter()
            .filter(|entry| entry.target == target && entry.event == event)
            .count()
    }

    /// Total number of listeners currently subscribed.
    pub fn total_listeners(&self) -> usize {
        self.state.borrow().listeners.len()
    }

    /// Addresses of geocoding requests not yet resolved, oldest first.
    pub fn pending_geocodes(&self) -> Vec<String> {
        self.state
            .borrow()
            .pending_geocodes
            .iter()
            .map(|(address, _)| address.clone())
            .collect()
    }

    /// Resolves the oldest pending geocoding request.
    ///
    /// Returns false if no request was pending.
    pub fn resolve_geocode(&self, result: Result<GeocodeResult, MapBindError>) -> bool {
        let pending = {
            let mut state = self.state.borrow_mut();
            if state.pending_geocodes.is_empty() {
                None
            } else {
                Some(state.pending_geocodes.remove(0))
            }
        };

        match pending {
            Some((_, callback)) => {
                callback(result);
                true
            }
            None => false,
        }
    }

    /// Number of route requests not yet resolved.
    pub fn pending_route_count(&self) -> usize {
        self.state.borrow().pending_routes.len()
    }

    /// Resolves the oldest pending route request.
    ///
    /// Returns false if no request was pending.
    pub fn resolve_route(&self, result: Result<RouteResponse, MapBindError>) -> bool {
        let pending = {
            let mut state = self.state.borrow_mut();
            if state.pending_routes.is_empty() {
                None
            } else {
                Some(state.pending_routes.remove(0))
            }
        };

        match pending {
            Some(callback) => {
                callback(result);
                true
            }
            None => false,
        }
    }

    fn next_id(&self) -> u64 {
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        state.next_id
    }

    fn record(&self, call: StubCall) {
        self.state.borrow_mut().calls.push(call);
    }
}

impl MapProvider for StubProvider {
    fn create_map(&self, canvas: &str, options: &MapOptions) -> Result<MapHandle, MapBindError> {
        if self.state.borrow().failing_canvases.contains(canvas) {
            return Err(MapBindError::CanvasNotFound(canvas.to_string()));
        }

        let handle = MapHandle::new(self.next_id());
        self.record(StubCall::CreateMap {
            canvas: canvas.to_string(),
            options: options.clone(),
        });
        Ok(handle)
    }

    fn set_map_options(&self, map: MapHandle, options: &MapOptions) {
        self.record(StubCall::SetMapOptions {
            map,
            options: options.clone(),
        });
    }

    fn set_map_center(&self, map: MapHandle, center: GeoPoint) {
        self.record(StubCall::SetMapCenter { map, center });
    }

    fn set_map_zoom(&self, map: MapHandle, zoom: f64) {
        self.record(StubCall::SetMapZoom { map, zoom });
    }

    fn fit_bounds(&self, map: MapHandle, bounds: &GeoBounds) {
        self.record(StubCall::FitBounds {
            map,
            bounds: *bounds,
        });
    }

    fn create_marker(&self) -> MarkerHandle {
        let marker = MarkerHandle::new(self.next_id());
        self.record(StubCall::CreateMarker { marker });
        marker
    }

    fn set_marker_position(&self, marker: MarkerHandle, position: GeoPoint) {
        self.record(StubCall::SetMarkerPosition { marker, position });
    }

    fn set_marker_icon(&self, marker: MarkerHandle, icon: &str) {
        self.record(StubCall::SetMarkerIcon {
            marker,
            icon: icon.to_string(),
        });
    }

    fn set_marker_label(&self, marker: MarkerHandle, label: &str) {
        self.record(StubCall::SetMarkerLabel {
            marker,
            label: label.to_string(),
        });
    }

    fn set_marker_title(&self, marker: MarkerHandle, title: &str) {
        self.record(StubCall::SetMarkerTitle {
            marker,
            title: title.to_string(),
        });
    }

    fn set_marker_z_index(&self, marker: MarkerHandle, z_index: i32) {
        self.record(StubCall::SetMarkerZIndex { marker, z_index });
    }

    fn set_marker_draggable(&self, marker: MarkerHandle, draggable: bool) {
        self.record(StubCall::SetMarkerDraggable { marker, draggable });
    }

    fn attach_marker(&self, marker: MarkerHandle, map: Option<MapHandle>) {
        self.record(StubCall::AttachMarker { marker, map });
    }

    fn create_polyline(&self) -> PolylineHandle {
        let polyline = PolylineHandle::new(self.next_id());
        self.record(StubCall::CreatePolyline { polyline });
        polyline
    }

    fn set_polyline_path(&self, polyline: PolylineHandle, path: &[GeoPoint]) {
        self.record(StubCall::SetPolylinePath {
            polyline,
            path: path.to_vec(),
        });
    }

    fn set_polyline_style(&self, polyline: PolylineHandle, style: &PolylineStyle) {
        self.record(StubCall::SetPolylineStyle {
            polyline,
            style: style.clone(),
        });
    }

    fn attach_polyline(&self, polyline: PolylineHandle, map: Option<MapHandle>) {
        self.record(StubCall::AttachPolyline { polyline, map });
    }

    fn create_info_window(&self, options: &InfoWindowOptions) -> InfoWindowHandle {
        let window = InfoWindowHandle::new(self.next_id());
        self.record(StubCall::CreateInfoWindow {
            window,
            options: *options,
        });
        window
    }

    fn set_info_window_position(&self, window: InfoWindowHandle, position: GeoPoint) {
        self.record(StubCall::SetInfoWindowPosition { window, position });
    }

    fn set_info_window_options(&self, window: InfoWindowHandle, options: &InfoWindowOptions) {
        self.record(StubCall::SetInfoWindowOptions {
            window,
            options: *options,
        });
    }

    fn open_info_window(
        &self,
        window: InfoWindowHandle,
        map: MapHandle,
        anchor: Option<InfoWindowAnchor>,
    ) {
        self.record(StubCall::OpenInfoWindow {
            window,
            map,
            anchor,
        });
    }

    fn close_info_window(&self, window: InfoWindowHandle) {
        self.record(StubCall::CloseInfoWindow { window });
    }

    fn create_directions(&self, map: MapHandle, options: &DirectionsOptions) -> DirectionsHandle {
        let directions = DirectionsHandle::new(self.next_id());
        self.record(StubCall::CreateDirections {
            directions,
            map,
            options: *options,
        });
        directions
    }

    fn request_route(
        &self,
        directions: DirectionsHandle,
        request: &RouteRequest,
        callback: RouteCallback,
    ) {
        self.record(StubCall::RequestRoute {
            directions,
            request: request.clone(),
        });
        self.state.borrow_mut().pending_routes.push(callback);
    }

    fn render_route(&self, directions: DirectionsHandle, response: &RouteResponse) {
        self.record(StubCall::RenderRoute {
            directions,
            response: response.clone(),
        });
    }

    fn set_directions_style(&self, directions: DirectionsHandle, style: &PolylineStyle) {
        self.record(StubCall::SetDirectionsStyle {
            directions,
            style: style.clone(),
        });
    }

    fn detach_directions(&self, directions: DirectionsHandle) {
        self.record(StubCall::DetachDirections { directions });
    }

    fn geocode(&self, address: &str, callback: GeocodeCallback) {
        self.record(StubCall::Geocode {
            address: address.to_string(),
        });
        self.state
            .borrow_mut()
            .pending_geocodes
            .push((address.to_string(), callback));
    }

    fn add_listener(
        &self,
        target: EventTarget,
        event: EventKind,
        listener: EventListener,
    ) -> ListenerHandle {
        let handle = ListenerHandle::new(self.next_id());
        self.record(StubCall::AddListener { target, event });
        self.state.borrow_mut().listeners.push(ListenerEntry {
            handle,
            target,
            event,
            listener: Rc::from(listener),
        });
        handle
    }

    fn remove_listener(&self, listener: ListenerHandle) {
        self.record(StubCall::RemoveListener { listener });
        self.state
            .borrow_mut()
            .listeners
            .retain(|entry| entry.handle != listener);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use assert_matches::assert_matches;

    use super::*;
    use crate::latlng;

    #[test]
    fn records_calls_in_order() {
        let provider = StubProvider::new();
        let map = provider
            .create_map("canvas", &MapOptions::new())
            .expect("canvas must exist");
        provider.set_map_zoom(map, 5.0);

        let calls = provider.calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(calls[0], StubCall::CreateMap { .. }));
        assert!(matches!(calls[1], StubCall::SetMapZoom { zoom, .. } if zoom == 5.0));
    }

    #[test]
    fn failing_canvas_returns_error() {
        let provider = StubProvider::new();
        provider.fail_canvas("ghost");
        let result = provider.create_map("ghost", &MapOptions::new());
        assert_matches!(result, Err(MapBindError::CanvasNotFound(canvas)) if canvas == "ghost");
    }

    #[test]
    fn fire_reaches_matching_listeners_only() {
        let provider = StubProvider::new();
        let marker = provider.create_marker();
        let other = provider.create_marker();

        let hits = Rc::new(Cell::new(0));
        let hits_clone = hits.clone();
        provider.add_listener(
            EventTarget::Marker(marker),
            EventKind::Click,
            Box::new(move |_| hits_clone.set(hits_clone.get() + 1)),
        );

        provider.fire(EventTarget::Marker(other), EventKind::Click, &EventData::default());
        assert_eq!(hits.get(), 0);

        provider.fire(
            EventTarget::Marker(marker),
            EventKind::Click,
            &EventData { position: Some(latlng!(1.0, 2.0)) },
        );
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn removed_listener_no_longer_fires() {
        let provider = StubProvider::new();
        let marker = provider.create_marker();

        let hits = Rc::new(Cell::new(0));
        let hits_clone = hits.clone();
        let handle = provider.add_listener(
            EventTarget::Marker(marker),
            EventKind::Click,
            Box::new(move |_| hits_clone.set(hits_clone.get() + 1)),
        );
        provider.remove_listener(handle);

        provider.fire(EventTarget::Marker(marker), EventKind::Click, &EventData::default());
        assert_eq!(hits.get(), 0);
        assert_eq!(provider.total_listeners(), 0);
    }

    #[test]
    fn geocodes_resolve_oldest_first() {
        let provider = StubProvider::new();
        let resolved = Rc::new(RefCell::new(Vec::new()));

        for address in ["first", "second"] {
            let resolved = resolved.clone();
            provider.geocode(
                address,
                Box::new(move |result| {
                    if let Ok(found) = result {
                        resolved.borrow_mut().push(found.location);
                    }
                }),
            );
        }

        assert_eq!(provider.pending_geocodes(), vec!["first", "second"]);
        assert!(provider.resolve_geocode(Ok(GeocodeResult {
            location: latlng!(1.0, 1.0),
            viewport: None,
            formatted_address: None,
        })));
        assert_eq!(provider.pending_geocodes(), vec!["second"]);
        assert_eq!(resolved.borrow().len(), 1);

        assert!(provider.resolve_geocode(Err(MapBindError::NoResults)));
        assert!(!provider.resolve_geocode(Err(MapBindError::NoResults)));
        assert_eq!(resolved.borrow().len(), 1);
    }
}
