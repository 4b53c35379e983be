//! Drives a small component tree against the recording stub provider and
//! prints every provider call it produces.
//!
//! Run with `cargo run --example stub_tour`.

use mapbind::provider::stub::StubProvider;
use mapbind::provider::{GeocodeResult, PolylineStyle};
use mapbind::{latlng, Coordinate, FitMode, InfoWindow, MapBindError, MapContext, Marker, Polyline};

fn main() -> Result<(), MapBindError> {
    env_logger::init();

    let provider = StubProvider::new();
    let map = MapContext::new(provider.clone());
    map.set_lat(52.52);
    map.set_lng(13.405);
    map.set_zoom(11.0);
    map.set_fit_mode(FitMode::Live);

    let station = Marker::new(&map);
    station.set_lat(52.525);
    station.set_lng(13.369);
    station.set_label("H".to_string());

    let gate = Marker::new(&map);
    gate.set_address("Brandenburger Tor, Berlin");

    let window = InfoWindow::on_marker(&gate);
    window.set_open_on("mouseover");
    window.set_close_on("mouseout");

    let walk = Polyline::new(&map);
    walk.set_style(PolylineStyle {
        stroke_color: Some("#3366cc".to_string()),
        stroke_weight: Some(3.0),
        ..PolylineStyle::default()
    });
    for (lat, lng) in [(52.525, 13.369), (52.520, 13.385), (52.516, 13.378)] {
        let point = Coordinate::new(&walk);
        point.set_lat(lat);
        point.set_lng(lng);
    }

    map.mount("map-canvas")?;
    map.run_cycle();

    // resolve the address lookup the way a real SDK eventually would
    provider.resolve_geocode(Ok(GeocodeResult {
        location: latlng!(52.5163, 13.3777),
        viewport: None,
        formatted_address: Some("Pariser Platz, 10117 Berlin".to_string()),
    }));
    map.run_cycle();

    for call in provider.calls() {
        println!("{call:?}");
    }
    Ok(())
}
