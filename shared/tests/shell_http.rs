use std::io::Cursor;

use serde_json::json;
use tripbook_shared::{AppConfig, ErrorKind, Event, ImagePayload, Shell, ToastKind, TripField, TripId};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn trips_body() -> serde_json::Value {
    json!([
        { "id": 1, "title": "Rome Weekend", "location": "Rome", "isfavorite": false, "ripeti": false },
        { "id": 2, "title": "Alps Hike", "location": "Innsbruck", "isfavorite": false, "ripeti": true }
    ])
}

async fn shell_for(server: &MockServer) -> Shell {
    Mock::given(method("GET"))
        .and(path("/api/trips"))
        .respond_with(ResponseTemplate::new(200).set_body_json(trips_body()))
        .mount(server)
        .await;

    let config = AppConfig::default()
        .with_api_base_url(server.uri())
        .with_geocoder_url(format!("{}/search", server.uri()));
    let mut shell = Shell::with_config(config).unwrap();
    shell.dispatch(Event::RefreshRequested);
    shell.run_until_idle().await;
    shell
}

fn png(width: u32, height: u32) -> ImagePayload {
    let mut bytes = Vec::new();
    image::DynamicImage::new_rgb8(width, height)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    ImagePayload::from_bytes(&bytes)
}

#[tokio::test]
async fn test_refresh_loads_trips() {
    let server = MockServer::start().await;
    let shell = shell_for(&server).await;

    let view = shell.view();
    assert!(view.is_loaded);
    assert_eq!(view.trips.len(), 2);
    assert!(view.trips[1].repeat);
    assert_eq!(view.stats.to_repeat, 1);
}

#[tokio::test]
async fn test_rejected_toggle_rolls_back() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/api/trips/2/favorite"))
        .and(body_json(json!({ "isfavorite": true })))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "error": "db down" })))
        .expect(1)
        .mount(&server)
        .await;
    let mut shell = shell_for(&server).await;

    shell.dispatch(Event::ToggleRequested {
        id: TripId(2),
        field: TripField::Favorite,
    });
    assert!(shell.view().trips[1].is_favorite);
    shell.run_until_idle().await;

    let view = shell.view();
    assert!(!view.trips[1].is_favorite);
    assert_eq!(view.toast.unwrap().kind, ToastKind::Warning);
}

#[tokio::test]
async fn test_accepted_toggle_sticks() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/api/trips/2/repeat"))
        .and(body_json(json!({ "ripeti": false })))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            json!({ "id": 2, "title": "Alps Hike", "ripeti": false }),
        ))
        .expect(1)
        .mount(&server)
        .await;
    let mut shell = shell_for(&server).await;

    shell.dispatch(Event::ToggleRequested {
        id: TripId(2),
        field: TripField::Repeat,
    });
    shell.run_until_idle().await;

    let view = shell.view();
    assert!(!view.trips[1].repeat);
    assert_eq!(view.pending_mutations, 0);
    assert!(view.toast.is_none());
}

#[tokio::test]
async fn test_delete_of_missing_trip_keeps_entry() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/trips/1"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "error": "Trip not found" })))
        .mount(&server)
        .await;
    let mut shell = shell_for(&server).await;

    shell.dispatch(Event::DeleteTripRequested { id: TripId(1) });
    shell.run_until_idle().await;

    let view = shell.view();
    assert_eq!(view.trips.len(), 2);
    assert_eq!(view.toast.unwrap().kind, ToastKind::Warning);
}

#[tokio::test]
async fn test_trip_detail_probes_image_ratios() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/trips/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 1,
            "title": "Rome Weekend",
            "location": "Rome",
            "images": [png(40, 20).as_str(), "not an image", png(30, 60).as_str()]
        })))
        .expect(1)
        .mount(&server)
        .await;
    let mut shell = shell_for(&server).await;

    shell.dispatch(Event::TripRequested { id: TripId(1) });
    shell.run_until_idle().await;

    let detail = shell.view().selected.unwrap();
    assert_eq!(detail.images.len(), 3);
    assert_eq!(
        detail.image_ratios,
        vec![2.0, tripbook_shared::geometry::FALLBACK_ASPECT_RATIO, 0.5]
    );
}

#[tokio::test]
async fn test_location_lookup_sends_geocoder_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "Firenze"))
        .and(query_param("format", "json"))
        .and(header("accept-language", "it"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "display_name": "Firenze, Toscana, Italia" },
            { "display_name": "Firenze, Piazza" }
        ])))
        .expect(1)
        .mount(&server)
        .await;
    let mut shell = shell_for(&server).await;

    shell.dispatch(Event::LocationQueryChanged {
        text: "Firenze".into(),
    });
    shell.run_until_idle().await;

    assert_eq!(
        shell.view().draft.suggestions,
        vec!["Firenze, Toscana, Italia", "Firenze, Piazza"]
    );
}

#[tokio::test]
async fn test_duplicate_category_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/tipology"))
        .and(body_json(json!({ "nome": "Mountain" })))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({ "error": "exists" })))
        .expect(1)
        .mount(&server)
        .await;
    let mut shell = shell_for(&server).await;

    shell.dispatch(Event::AddCategoryRequested {
        name: " Mountain ".into(),
    });
    shell.run_until_idle().await;

    let view = shell.view();
    assert!(view.categories.is_empty());
    assert_eq!(view.error.unwrap().error_code, ErrorKind::Conflict.code());
}

#[tokio::test]
async fn test_unreachable_server_is_a_network_error() {
    let server = MockServer::start().await;
    let mut shell = shell_for(&server).await;

    // Nothing listens on the discard port.
    let config = AppConfig::default().with_api_base_url("http://127.0.0.1:9");
    shell.dispatch(Event::Configure(config));
    shell.dispatch(Event::TripRequested { id: TripId(2) });
    shell.run_until_idle().await;

    let error = shell.view().error.unwrap();
    assert!(error.is_retryable);
}

#[tokio::test]
async fn test_map_geocodes_each_location_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "Rome"))
        .and(query_param("limit", "1"))
        .and(header("accept-language", "it"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{ "lat": "41.8933", "lon": "12.4829" }])),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "Innsbruck"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;
    let mut shell = shell_for(&server).await;

    shell.dispatch(Event::MapOpened);
    shell.run_until_idle().await;
    shell.dispatch(Event::MapOpened);
    assert_eq!(shell.in_flight(), 0);

    let map = shell.view().map;
    assert_eq!(map.pins.len(), 1);
    assert_eq!(map.pins[0].trip_id, TripId(1));
    assert!((map.center.latitude - 41.8933).abs() < 1e-9);
}
