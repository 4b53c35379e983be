//! Abstraction over the external mapping SDK.
//!
//! The component layer never talks to a concrete mapping SDK directly.
//! Instead, every imperative call goes through the [`MapProvider`] trait,
//! which is injected into the [`MapContext`](crate::MapContext) and shared
//! by all of its child entities. Components hold only opaque handles to the
//! provider-side objects, so any SDK (or a test double such as
//! [`stub::StubProvider`]) can back the same component tree.
//!
//! The provider contract mirrors the component contract:
//!
//! * constructors are called at most once per entity and return a handle;
//! * setters are granular - one downstream call per logical operation;
//! * [`MapProvider::geocode`] and [`MapProvider::request_route`] are
//!   fire-once asynchronous operations resuming through `FnOnce` callbacks;
//! * event listeners registered with [`MapProvider::add_listener`] must stay
//!   alive until removed with [`MapProvider::remove_listener`].

use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::MapBindError;
use crate::geo::{GeoBounds, GeoPoint};

#[cfg(feature = "_tests")]
pub mod stub;

macro_rules! handle_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(u64);

        impl $name {
            /// Creates a handle with the given provider-assigned id.
            pub fn new(id: u64) -> Self {
                Self(id)
            }

            /// Provider-assigned id of the underlying object.
            pub fn id(&self) -> u64 {
                self.0
            }
        }
    };
}

handle_type!(
    /// Opaque handle of a map instance.
    MapHandle
);
handle_type!(
    /// Opaque handle of a marker.
    MarkerHandle
);
handle_type!(
    /// Opaque handle of a polyline.
    PolylineHandle
);
handle_type!(
    /// Opaque handle of an info window.
    InfoWindowHandle
);
handle_type!(
    /// Opaque handle of a directions service/renderer pair.
    DirectionsHandle
);
handle_type!(
    /// Opaque handle of a registered event listener.
    ListenerHandle
);

/// SDK-level events the components can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Primary button click.
    Click,
    /// Primary button double click.
    DoubleClick,
    /// Secondary button click.
    RightClick,
    /// Pointer entered the object.
    MouseOver,
    /// Pointer left the object.
    MouseOut,
    /// A drag interaction finished.
    DragEnd,
    /// The map became idle after panning or zooming.
    Idle,
    /// The visible region of the map changed.
    BoundsChanged,
    /// The close button of an info window was clicked.
    CloseClick,
    /// An info window finished attaching its content.
    DomReady,
}

impl EventKind {
    /// Parses an info window trigger event name.
    ///
    /// Only events that make sense as open/close triggers are recognized:
    /// `click`, `dblclick`, `rightclick`, `mouseover` and `mouseout`.
    /// Anything else returns `None`.
    pub fn from_trigger_name(name: &str) -> Option<Self> {
        match name {
            "click" => Some(EventKind::Click),
            "dblclick" => Some(EventKind::DoubleClick),
            "rightclick" => Some(EventKind::RightClick),
            "mouseover" => Some(EventKind::MouseOver),
            "mouseout" => Some(EventKind::MouseOut),
            _ => None,
        }
    }
}

/// Object an event listener is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventTarget {
    /// A map instance.
    Map(MapHandle),
    /// A marker.
    Marker(MarkerHandle),
    /// A polyline.
    Polyline(PolylineHandle),
    /// An info window.
    InfoWindow(InfoWindowHandle),
}

/// Payload of an SDK event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventData {
    /// Geographic position associated with the event, e.g. the position of
    /// a marker when its drag ended.
    pub position: Option<GeoPoint>,
}

/// Event callback registered with a provider.
pub type EventListener = Box<dyn Fn(&EventData)>;

/// One-shot callback resuming a geocoding request.
pub type GeocodeCallback = Box<dyn FnOnce(Result<GeocodeResult, MapBindError>)>;

/// One-shot callback resuming a route request.
pub type RouteCallback = Box<dyn FnOnce(Result<RouteResponse, MapBindError>)>;

/// Arbitrary key-value bag forwarded to the provider's map constructor and
/// option setter.
///
/// The map root strips the keys it manages itself (`center`, `zoom`) before
/// forwarding, so providers always receive the permitted subset.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MapOptions(BTreeMap<String, serde_json::Value>);

impl MapOptions {
    /// Creates an empty option bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an option value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Sets an option value, consuming and returning the bag.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Returns the value of an option.
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    /// Returns true if the bag contains no options.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of options in the bag.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns a copy of the bag without the listed keys.
    pub fn without(&self, keys: &[&str]) -> Self {
        Self(
            self.0
                .iter()
                .filter(|(key, _)| !keys.contains(&key.as_str()))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        )
    }

    /// Iterates over the options in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &serde_json::Value)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value))
    }
}

/// Styling options of a polyline or of a rendered route.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PolylineStyle {
    /// Stroke color, e.g. `#ff0000`.
    pub stroke_color: Option<String>,
    /// Stroke width in pixels.
    pub stroke_weight: Option<f64>,
    /// Stroke opacity, `0.0` to `1.0`.
    pub stroke_opacity: Option<f64>,
    /// Drawing order relative to other overlays.
    pub z_index: Option<i32>,
}

/// Options of an info window.
///
/// Only this recognized subset is ever forwarded to a provider; anything
/// else a caller might want to configure has no representation here.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct InfoWindowOptions {
    /// Disables panning the map to fully show the opened window.
    pub disable_auto_pan: Option<bool>,
    /// Maximum width of the window content in pixels.
    pub max_width: Option<u32>,
    /// Offset of the window from the anchor point, `(x, y)` in pixels.
    pub pixel_offset: Option<(i32, i32)>,
}

/// Travel mode of a route request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TravelMode {
    /// Travel by car.
    #[default]
    Driving,
    /// Travel by foot.
    Walking,
    /// Travel by bicycle.
    Bicycling,
    /// Travel by public transit.
    Transit,
}

impl TravelMode {
    /// Resolves a travel mode by name.
    ///
    /// Unrecognized names resolve to [`TravelMode::Driving`].
    pub fn from_name(name: &str) -> Self {
        match name {
            "walking" => TravelMode::Walking,
            "bicycling" => TravelMode::Bicycling,
            "transit" => TravelMode::Transit,
            _ => TravelMode::Driving,
        }
    }

    /// Name of the mode as used by providers.
    pub fn name(&self) -> &'static str {
        match self {
            TravelMode::Driving => "driving",
            TravelMode::Walking => "walking",
            TravelMode::Bicycling => "bicycling",
            TravelMode::Transit => "transit",
        }
    }
}

/// A single waypoint of a route request.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RouteWaypoint {
    /// Resolved location of the waypoint.
    pub location: GeoPoint,
    /// Whether the route must actually stop at the waypoint instead of just
    /// passing through it.
    pub stopover: bool,
}

/// Route request issued to a provider's directions service.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RouteRequest {
    /// Start of the route.
    pub origin: GeoPoint,
    /// End of the route.
    pub destination: GeoPoint,
    /// How the route is travelled.
    pub travel_mode: TravelMode,
    /// Intermediate waypoints in visiting order.
    pub waypoints: Vec<RouteWaypoint>,
}

/// One leg of a computed route (the part between two consecutive stopovers).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RouteLeg {
    /// Start of the leg.
    pub start: GeoPoint,
    /// End of the leg.
    pub end: GeoPoint,
    /// Length of the leg in meters.
    pub distance_meters: f64,
    /// Estimated travel time in seconds.
    pub duration_seconds: f64,
}

/// Route computed by a provider.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RouteResponse {
    /// Legs of the best route, in travel order.
    pub legs: Vec<RouteLeg>,
}

/// Result of a successful geocoding lookup.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GeocodeResult {
    /// Location of the best match.
    pub location: GeoPoint,
    /// Recommended viewport of the best match, if the provider reports one.
    pub viewport: Option<GeoBounds>,
    /// Human-readable address of the best match.
    pub formatted_address: Option<String>,
}

/// Configuration of a directions renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectionsOptions {
    /// Do not draw the default origin/destination markers.
    pub suppress_markers: bool,
    /// Keep the current viewport instead of zooming to the route.
    pub preserve_viewport: bool,
}

impl Default for DirectionsOptions {
    fn default() -> Self {
        Self {
            suppress_markers: true,
            preserve_viewport: true,
        }
    }
}

/// Anchor an info window is opened against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InfoWindowAnchor {
    /// Window is anchored to a marker.
    Marker(MarkerHandle),
    /// Window is anchored to a polyline.
    Polyline(PolylineHandle),
}

/// Capability interface of an interactive mapping SDK.
///
/// Implementations are expected to be cheap to call: the component layer
/// already guards and coalesces its calls, so a provider can forward each
/// method to the SDK directly without its own deduplication.
pub trait MapProvider {
    /// Constructs a map inside the canvas element with the given name.
    ///
    /// A missing canvas is a fatal configuration error.
    fn create_map(&self, canvas: &str, options: &MapOptions) -> Result<MapHandle, MapBindError>;

    /// Applies an option bag to an existing map.
    fn set_map_options(&self, map: MapHandle, options: &MapOptions);

    /// Moves the center of the map.
    fn set_map_center(&self, map: MapHandle, center: GeoPoint);

    /// Changes the zoom level of the map.
    fn set_map_zoom(&self, map: MapHandle, zoom: f64);

    /// Adjusts the viewport to cover the given bounds.
    fn fit_bounds(&self, map: MapHandle, bounds: &GeoBounds);

    /// Constructs a marker. The marker is not shown until attached to a map.
    fn create_marker(&self) -> MarkerHandle;

    /// Moves a marker.
    fn set_marker_position(&self, marker: MarkerHandle, position: GeoPoint);

    /// Changes the icon of a marker.
    fn set_marker_icon(&self, marker: MarkerHandle, icon: &str);

    /// Changes the label of a marker.
    fn set_marker_label(&self, marker: MarkerHandle, label: &str);

    /// Changes the hover title of a marker.
    fn set_marker_title(&self, marker: MarkerHandle, title: &str);

    /// Changes the drawing order of a marker.
    fn set_marker_z_index(&self, marker: MarkerHandle, z_index: i32);

    /// Makes a marker draggable or fixed.
    fn set_marker_draggable(&self, marker: MarkerHandle, draggable: bool);

    /// Attaches a marker to a map, or detaches it when `map` is `None`.
    fn attach_marker(&self, marker: MarkerHandle, map: Option<MapHandle>);

    /// Constructs a polyline. It is not shown until attached to a map.
    fn create_polyline(&self) -> PolylineHandle;

    /// Replaces the path of a polyline.
    fn set_polyline_path(&self, polyline: PolylineHandle, path: &[GeoPoint]);

    /// Applies styling options to a polyline.
    fn set_polyline_style(&self, polyline: PolylineHandle, style: &PolylineStyle);

    /// Attaches a polyline to a map, or detaches it when `map` is `None`.
    fn attach_polyline(&self, polyline: PolylineHandle, map: Option<MapHandle>);

    /// Constructs an info window.
    fn create_info_window(&self, options: &InfoWindowOptions) -> InfoWindowHandle;

    /// Moves an info window.
    fn set_info_window_position(&self, window: InfoWindowHandle, position: GeoPoint);

    /// Applies options to an existing info window.
    fn set_info_window_options(&self, window: InfoWindowHandle, options: &InfoWindowOptions);

    /// Opens an info window on the map, optionally anchored to an entity.
    fn open_info_window(
        &self,
        window: InfoWindowHandle,
        map: MapHandle,
        anchor: Option<InfoWindowAnchor>,
    );

    /// Closes an info window.
    fn close_info_window(&self, window: InfoWindowHandle);

    /// Constructs a directions service/renderer pair drawing onto the map.
    fn create_directions(&self, map: MapHandle, options: &DirectionsOptions) -> DirectionsHandle;

    /// Requests a route. The callback is invoked exactly once, later, on the
    /// same thread.
    fn request_route(
        &self,
        directions: DirectionsHandle,
        request: &RouteRequest,
        callback: RouteCallback,
    );

    /// Draws a computed route through the renderer. Re-applying the same
    /// response forces a restyle.
    fn render_route(&self, directions: DirectionsHandle, response: &RouteResponse);

    /// Applies styling options to the rendered route.
    fn set_directions_style(&self, directions: DirectionsHandle, style: &PolylineStyle);

    /// Removes the rendered route from its map.
    fn detach_directions(&self, directions: DirectionsHandle);

    /// Resolves an address to a location. The callback is invoked exactly
    /// once, later, on the same thread.
    fn geocode(&self, address: &str, callback: GeocodeCallback);

    /// Subscribes a listener to an SDK event.
    fn add_listener(
        &self,
        target: EventTarget,
        event: EventKind,
        listener: EventListener,
    ) -> ListenerHandle;

    /// Removes a previously added listener.
    fn remove_listener(&self, listener: ListenerHandle);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_without_strips_keys() {
        let options = MapOptions::new()
            .with("center", "nope")
            .with("zoom", 3)
            .with("mapTypeId", "terrain");

        let permitted = options.without(&["center", "zoom"]);
        assert_eq!(permitted.len(), 1);
        assert!(permitted.get("mapTypeId").is_some());
        assert!(permitted.get("zoom").is_none());
        // the original bag is untouched
        assert_eq!(options.len(), 3);
    }

    #[test]
    fn travel_mode_lookup_defaults_to_driving() {
        assert_eq!(TravelMode::from_name("walking"), TravelMode::Walking);
        assert_eq!(TravelMode::from_name("transit"), TravelMode::Transit);
        assert_eq!(TravelMode::from_name("driving"), TravelMode::Driving);
        assert_eq!(TravelMode::from_name("hovercraft"), TravelMode::Driving);
        assert_eq!(TravelMode::from_name(""), TravelMode::Driving);
    }

    #[test]
    fn trigger_names_are_whitelisted() {
        assert_eq!(
            EventKind::from_trigger_name("click"),
            Some(EventKind::Click)
        );
        assert_eq!(
            EventKind::from_trigger_name("mouseover"),
            Some(EventKind::MouseOver)
        );
        assert_eq!(EventKind::from_trigger_name("dragend"), None);
        assert_eq!(EventKind::from_trigger_name("idle"), None);
        assert_eq!(EventKind::from_trigger_name(""), None);
    }
}
