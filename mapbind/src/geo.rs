//! Geographic primitives used by the component layer.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 2d point given as latitude and longitude in degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GeoPoint {
    lat: f64,
    lng: f64,
}

impl GeoPoint {
    /// Creates a new point.
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Latitude in degrees.
    pub fn lat(&self) -> f64 {
        self.lat
    }

    /// Longitude in degrees.
    pub fn lng(&self) -> f64 {
        self.lng
    }
}

/// Creates a new [`GeoPoint`] from latitude and longitude values (in degrees).
///
/// ```
/// use mapbind::latlng;
///
/// let point = latlng!(52.52, 13.405);
/// assert_eq!(point.lat(), 52.52);
/// ```
#[macro_export]
macro_rules! latlng {
    ($lat:expr, $lng:expr) => {
        $crate::geo::GeoPoint::new($lat, $lng)
    };
}

/// Geographic rectangle aligned with the parallels and meridians.
///
/// A freshly created bounds is empty. Extending it with points or uniting it
/// with other bounds grows it to the minimal rectangle covering everything
/// added so far. Bounds are used for viewport fitting ([`crate::MapContext::fit_to_markers`])
/// and as marker viewports reported by geocoding lookups.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GeoBounds {
    extent: Option<Extent>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
struct Extent {
    south: f64,
    west: f64,
    north: f64,
    east: f64,
}

impl GeoBounds {
    /// Creates bounds covering the rectangle between the two corners.
    pub fn new(south_west: GeoPoint, north_east: GeoPoint) -> Self {
        Self {
            extent: Some(Extent {
                south: south_west.lat(),
                west: south_west.lng(),
                north: north_east.lat(),
                east: north_east.lng(),
            }),
        }
    }

    /// Returns true if nothing was added to the bounds yet.
    pub fn is_empty(&self) -> bool {
        self.extent.is_none()
    }

    /// Grows the bounds to include the given point.
    pub fn extend(&mut self, point: GeoPoint) {
        match &mut self.extent {
            Some(extent) => {
                extent.south = extent.south.min(point.lat());
                extent.west = extent.west.min(point.lng());
                extent.north = extent.north.max(point.lat());
                extent.east = extent.east.max(point.lng());
            }
            None => {
                self.extent = Some(Extent {
                    south: point.lat(),
                    west: point.lng(),
                    north: point.lat(),
                    east: point.lng(),
                });
            }
        }
    }

    /// Grows the bounds to include everything covered by the other bounds.
    pub fn union(&mut self, other: &GeoBounds) {
        if let Some(sw) = other.south_west() {
            self.extend(sw);
        }
        if let Some(ne) = other.north_east() {
            self.extend(ne);
        }
    }

    /// South-west corner, or `None` if the bounds is empty.
    pub fn south_west(&self) -> Option<GeoPoint> {
        self.extent
            .map(|extent| GeoPoint::new(extent.south, extent.west))
    }

    /// North-east corner, or `None` if the bounds is empty.
    pub fn north_east(&self) -> Option<GeoPoint> {
        self.extent
            .map(|extent| GeoPoint::new(extent.north, extent.east))
    }

    /// Returns true if the point lies within the bounds (borders included).
    pub fn contains(&self, point: GeoPoint) -> bool {
        let Some(extent) = self.extent else {
            return false;
        };

        point.lat() >= extent.south
            && point.lat() <= extent.north
            && point.lng() >= extent.west
            && point.lng() <= extent.east
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn new_bounds_is_empty() {
        let bounds = GeoBounds::default();
        assert!(bounds.is_empty());
        assert!(bounds.south_west().is_none());
        assert!(!bounds.contains(latlng!(0.0, 0.0)));
    }

    #[test]
    fn extend_grows_to_cover_points() {
        let mut bounds = GeoBounds::default();
        bounds.extend(latlng!(10.0, 20.0));
        bounds.extend(latlng!(-5.0, 25.0));

        let sw = bounds.south_west().expect("bounds must not be empty");
        let ne = bounds.north_east().expect("bounds must not be empty");
        assert_relative_eq!(sw.lat(), -5.0);
        assert_relative_eq!(sw.lng(), 20.0);
        assert_relative_eq!(ne.lat(), 10.0);
        assert_relative_eq!(ne.lng(), 25.0);

        assert!(bounds.contains(latlng!(0.0, 22.0)));
        assert!(!bounds.contains(latlng!(0.0, 30.0)));
    }

    #[test]
    fn union_covers_both_rectangles() {
        let mut bounds = GeoBounds::new(latlng!(0.0, 0.0), latlng!(1.0, 1.0));
        bounds.union(&GeoBounds::new(latlng!(5.0, -3.0), latlng!(6.0, -2.0)));

        assert!(bounds.contains(latlng!(0.5, 0.5)));
        assert!(bounds.contains(latlng!(5.5, -2.5)));
        assert!(bounds.contains(latlng!(3.0, -1.0)));
    }

    #[test]
    fn union_with_empty_changes_nothing() {
        let mut bounds = GeoBounds::new(latlng!(0.0, 0.0), latlng!(1.0, 1.0));
        let before = bounds;
        bounds.union(&GeoBounds::default());
        assert_eq!(bounds, before);
    }
}
