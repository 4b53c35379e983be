//! Address lookup service.

use std::rc::Rc;

use crate::error::MapBindError;
use crate::provider::{GeocodeResult, MapProvider};

/// Wraps the provider's address search.
///
/// Lookups are fire-once: there is no retry policy, and a failed lookup
/// simply leaves the dependent state unset. Address-bound markers, route
/// endpoints and waypoints all resolve through this service.
pub struct Geocoder {
    provider: Rc<dyn MapProvider>,
}

impl Geocoder {
    /// Creates a geocoder on top of the given provider.
    pub fn new(provider: Rc<dyn MapProvider>) -> Self {
        Self { provider }
    }

    /// Looks up an address, resuming through the callback exactly once.
    ///
    /// An empty address is a guarded no-op: the callback is never invoked.
    pub fn search(
        &self,
        address: &str,
        callback: impl FnOnce(Result<GeocodeResult, MapBindError>) + 'static,
    ) {
        if address.is_empty() {
            log::debug!("skipping geocode of an empty address");
            return;
        }

        self.provider.geocode(address, Box::new(callback));
    }
}
