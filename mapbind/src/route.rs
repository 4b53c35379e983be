//! Route entity and its waypoint children.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::geo::GeoPoint;
use crate::geocode::Geocoder;
use crate::map::registry::{Entity, Registry};
use crate::map::{MapContext, MapState};
use crate::provider::{
    DirectionsHandle, DirectionsOptions, MapHandle, MapProvider, PolylineStyle, RouteRequest,
    RouteResponse, RouteWaypoint, TravelMode,
};
use crate::scheduler::{next_entity_id, EntityId, OpKind, Scheduler};

/// A route endpoint or waypoint location.
///
/// Addresses are resolved asynchronously through the provider's geocoder;
/// the route is not requested until every location taking part in it has
/// resolved to a point.
#[derive(Debug, Clone, PartialEq)]
pub enum Location {
    /// A concrete geographic point.
    Point(GeoPoint),
    /// An address to resolve.
    Address(String),
}

/// A route drawn between two locations.
///
/// The route is requested from the provider's directions service once the
/// origin, the destination and every [`Waypoint`] child have resolved
/// locations, and re-requested whenever any of them changes. Requests made
/// within one cycle are collapsed into a single one. A failed request
/// leaves the previously rendered route in place.
#[derive(Clone)]
pub struct Route {
    inner: Rc<RefCell<RouteState>>,
}

pub(crate) struct RouteState {
    id: EntityId,
    provider: Rc<dyn MapProvider>,
    scheduler: Rc<Scheduler>,
    map: Weak<RefCell<MapState>>,
    directions: Option<DirectionsHandle>,
    origin: Option<GeoPoint>,
    destination: Option<GeoPoint>,
    travel_mode: TravelMode,
    waypoints: Registry<Waypoint>,
    style: PolylineStyle,
    last_response: Option<RouteResponse>,
    on_route_change: Option<Rc<dyn Fn(&RouteResponse)>>,
}

impl Route {
    /// Creates a route and registers it with the map.
    pub fn new(map: &MapContext) -> Self {
        let (provider, scheduler, map_handle) = {
            let state = map.state().borrow();
            (state.provider.clone(), state.scheduler.clone(), state.handle)
        };

        let route = Self {
            inner: Rc::new(RefCell::new(RouteState {
                id: next_entity_id(),
                provider,
                scheduler,
                map: Rc::downgrade(map.state()),
                directions: None,
                origin: None,
                destination: None,
                travel_mode: TravelMode::default(),
                waypoints: Registry::default(),
                style: PolylineStyle::default(),
                last_response: None,
                on_route_change: None,
            })),
        };

        map.register_route(route.clone());
        if let Some(handle) = map_handle {
            route.map_ready(handle);
        }
        route
    }

    pub(crate) fn from_state(inner: Rc<RefCell<RouteState>>) -> Self {
        Self { inner }
    }

    pub(crate) fn state(&self) -> &Rc<RefCell<RouteState>> {
        &self.inner
    }

    /// Sets the start of the route.
    pub fn set_origin(&self, location: Location) {
        match location {
            Location::Point(point) => {
                self.inner.borrow_mut().origin = Some(point);
                self.schedule_update();
            }
            Location::Address(address) => {
                self.resolve(&address, |state, point| state.origin = Some(point));
            }
        }
    }

    /// Sets the end of the route.
    pub fn set_destination(&self, location: Location) {
        match location {
            Location::Point(point) => {
                self.inner.borrow_mut().destination = Some(point);
                self.schedule_update();
            }
            Location::Address(address) => {
                self.resolve(&address, |state, point| state.destination = Some(point));
            }
        }
    }

    /// Sets how the route is travelled.
    pub fn set_travel_mode(&self, mode: TravelMode) {
        self.inner.borrow_mut().travel_mode = mode;
        self.schedule_update();
    }

    /// Applies styling options to the rendered route.
    pub fn set_style(&self, style: PolylineStyle) {
        self.inner.borrow_mut().style = style;
        self.schedule(OpKind::SetStyle, |route| route.apply_style());
    }

    /// Registers a callback invoked whenever a new route is computed.
    pub fn on_route_change(&self, callback: impl Fn(&RouteResponse) + 'static) {
        self.inner.borrow_mut().on_route_change = Some(Rc::new(callback));
    }

    /// The most recently computed route, if any.
    pub fn route(&self) -> Option<RouteResponse> {
        self.inner.borrow().last_response.clone()
    }

    /// Removes the rendered route from the map and the route from the
    /// registry.
    pub fn destroy(&self) {
        let (provider, directions, map, id) = {
            let mut state = self.inner.borrow_mut();
            state.waypoints.clear();
            (
                state.provider.clone(),
                state.directions.take(),
                state.map.clone(),
                state.id,
            )
        };

        if let Some(directions) = directions {
            provider.detach_directions(directions);
        }
        if let Some(map) = map.upgrade() {
            MapContext::from_state(map).unregister_route(id);
        }
    }

    /// Constructs the directions service once the map exists.
    pub(crate) fn map_ready(&self, map_handle: MapHandle) {
        {
            let mut state = self.inner.borrow_mut();
            if state.directions.is_some() {
                return;
            }
            let directions = state
                .provider
                .create_directions(map_handle, &DirectionsOptions::default());
            state.directions = Some(directions);
        }
        self.apply_style();
        self.schedule_update();
    }

    pub(crate) fn register_waypoint(&self, waypoint: Waypoint) {
        self.inner.borrow_mut().waypoints.add(waypoint);
        self.schedule_update();
    }

    pub(crate) fn unregister_waypoint(&self, id: EntityId) {
        self.inner.borrow_mut().waypoints.remove(id);
        self.schedule_update();
    }

    /// Schedules a route re-request for the next cycle.
    pub(crate) fn schedule_update(&self) {
        self.schedule(OpKind::UpdateRoute, |route| route.update_route());
    }

    /// Requests the route if every location taking part in it is resolved.
    fn update_route(&self) {
        let (provider, directions, request) = {
            let state = self.inner.borrow();
            let Some(directions) = state.directions else {
                return;
            };
            let (Some(origin), Some(destination)) = (state.origin, state.destination) else {
                return;
            };
            let waypoints: Option<Vec<RouteWaypoint>> =
                state.waypoints.iter().map(Waypoint::resolved).collect();
            let Some(waypoints) = waypoints else {
                return;
            };
            (
                state.provider.clone(),
                directions,
                RouteRequest {
                    origin,
                    destination,
                    travel_mode: state.travel_mode,
                    waypoints,
                },
            )
        };

        let weak = Rc::downgrade(&self.inner);
        provider.request_route(
            directions,
            &request,
            Box::new(move |result| {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let route = Route { inner };
                match result {
                    Ok(response) => route.route_resolved(response),
                    Err(err) => log::warn!("route request failed: {err}"),
                }
            }),
        );
    }

    fn route_resolved(&self, response: RouteResponse) {
        let (provider, directions, on_route_change) = {
            let mut state = self.inner.borrow_mut();
            state.last_response = Some(response.clone());
            (
                state.provider.clone(),
                state.directions,
                state.on_route_change.clone(),
            )
        };

        if let Some(directions) = directions {
            provider.render_route(directions, &response);
        }
        if let Some(callback) = on_route_change {
            callback(&response);
        }
    }

    /// Restyles the renderer and redraws the last route so the new style
    /// takes effect.
    fn apply_style(&self) {
        let (provider, directions, style, last_response) = {
            let state = self.inner.borrow();
            (
                state.provider.clone(),
                state.directions,
                state.style.clone(),
                state.last_response.clone(),
            )
        };
        let Some(directions) = directions else {
            return;
        };

        provider.set_directions_style(directions, &style);
        if let Some(response) = last_response {
            provider.render_route(directions, &response);
        }
    }

    fn resolve(&self, address: &str, assign: fn(&mut RouteState, GeoPoint)) {
        let provider = self.inner.borrow().provider.clone();
        let weak = Rc::downgrade(&self.inner);
        Geocoder::new(provider).search(address, move |result| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            match result {
                Ok(found) => {
                    assign(&mut inner.borrow_mut(), found.location);
                    Route { inner }.schedule_update();
                }
                Err(err) => log::warn!("route endpoint lookup failed: {err}"),
            }
        });
    }

    fn schedule(&self, op: OpKind, run: fn(&Route)) {
        let (id, scheduler) = {
            let state = self.inner.borrow();
            (state.id, state.scheduler.clone())
        };
        let weak = Rc::downgrade(&self.inner);
        scheduler.schedule_once(id, op, move || {
            if let Some(inner) = weak.upgrade() {
                run(&Route { inner });
            }
        });
    }
}

impl Entity for Route {
    fn entity_id(&self) -> EntityId {
        self.inner.borrow().id
    }
}

/// An intermediate stop of a route.
///
/// Waypoints take part in the route in registration order. A waypoint
/// without a resolved location holds the whole route request back until it
/// resolves or is destroyed.
#[derive(Clone)]
pub struct Waypoint {
    inner: Rc<RefCell<WaypointState>>,
}

struct WaypointState {
    id: EntityId,
    provider: Rc<dyn MapProvider>,
    route: Weak<RefCell<RouteState>>,
    location: Option<GeoPoint>,
    stopover: bool,
}

impl Waypoint {
    /// Creates a waypoint and registers it with the route.
    pub fn new(route: &Route) -> Self {
        let provider = route.inner.borrow().provider.clone();
        let waypoint = Self {
            inner: Rc::new(RefCell::new(WaypointState {
                id: next_entity_id(),
                provider,
                route: Rc::downgrade(route.state()),
                location: None,
                stopover: true,
            })),
        };

        route.register_waypoint(waypoint.clone());
        waypoint
    }

    /// Sets the location of the waypoint.
    pub fn set_location(&self, location: Location) {
        match location {
            Location::Point(point) => {
                self.inner.borrow_mut().location = Some(point);
                self.notify_route();
            }
            Location::Address(address) => {
                let provider = self.inner.borrow().provider.clone();
                let weak = Rc::downgrade(&self.inner);
                Geocoder::new(provider).search(&address, move |result| {
                    let Some(inner) = weak.upgrade() else {
                        return;
                    };
                    match result {
                        Ok(found) => {
                            inner.borrow_mut().location = Some(found.location);
                            Waypoint { inner }.notify_route();
                        }
                        Err(err) => log::warn!("waypoint lookup failed: {err}"),
                    }
                });
            }
        }
    }

    /// Sets whether the route must actually stop at the waypoint.
    pub fn set_stopover(&self, stopover: bool) {
        self.inner.borrow_mut().stopover = stopover;
        self.notify_route();
    }

    /// The waypoint as it would appear in a route request, if resolved.
    pub fn resolved(&self) -> Option<RouteWaypoint> {
        let state = self.inner.borrow();
        state.location.map(|location| RouteWaypoint {
            location,
            stopover: state.stopover,
        })
    }

    /// Removes the waypoint from its route.
    pub fn destroy(&self) {
        let (route, id) = {
            let state = self.inner.borrow();
            (state.route.clone(), state.id)
        };
        if let Some(route) = route.upgrade() {
            Route::from_state(route).unregister_waypoint(id);
        }
    }

    fn notify_route(&self) {
        let route = self.inner.borrow().route.clone();
        if let Some(route) = route.upgrade() {
            Route::from_state(route).schedule_update();
        }
    }
}

impl Entity for Waypoint {
    fn entity_id(&self) -> EntityId {
        self.inner.borrow().id
    }
}
