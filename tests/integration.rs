use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use fleet_broker::api::rest::router;
use fleet_broker::config::Config;
use fleet_broker::state::AppState;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

struct TestActor {
    user_id: Uuid,
    role: &'static str,
    tenant_id: Uuid,
}

impl TestActor {
    fn new(role: &'static str, tenant_id: Uuid) -> Self {
        Self {
            user_id: Uuid::new_v4(),
            role,
            tenant_id,
        }
    }
}

fn setup() -> (axum::Router, Arc<AppState>) {
    let state = Arc::new(AppState::new(Config::default()));
    (router(state.clone()), state)
}

fn json_request(method: &str, uri: &str, actor: &TestActor, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-user-id", actor.user_id.to_string())
        .header("x-user-role", actor.role)
        .header("x-tenant-id", actor.tenant_id.to_string())
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn get_request(uri: &str, actor: &TestActor) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header("x-user-id", actor.user_id.to_string())
        .header("x-user-role", actor.role)
        .header("x-tenant-id", actor.tenant_id.to_string())
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn p2p_spec() -> Value {
    json!({
        "service_type": "point_to_point",
        "pickup": {
            "address": "30 Rockefeller Plaza, New York",
            "coordinates": { "lat": 40.7587, "lng": -73.9787 }
        },
        "dropoff": {
            "address": "JFK Terminal 4, New York",
            "coordinates": { "lat": 40.6413, "lng": -73.7781 }
        },
        "scheduled_at": "2026-09-01T14:30:00Z",
        "vehicle_category": "sedan",
        "passenger_count": 2,
        "luggage_count": 3
    })
}

#[tokio::test]
async fn health_returns_ok() {
    let (app, _state) = setup();
    let actor = TestActor::new("admin", Uuid::new_v4());
    let response = app.oneshot(get_request("/health", &actor)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["bookings"], 0);
    assert_eq!(body["quotes"], 0);
    assert_eq!(body["trips"], 0);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let (app, _state) = setup();
    let actor = TestActor::new("admin", Uuid::new_v4());
    let response = app.oneshot(get_request("/metrics", &actor)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_string(response).await;
    assert!(body.contains("active_trips"));
    assert!(body.contains("quotes_submitted_total"));
}

#[tokio::test]
async fn create_booking_returns_sourcing_with_estimate() {
    let (app, _state) = setup();
    let concierge = TestActor::new("concierge", Uuid::new_v4());

    let response = app
        .oneshot(json_request("POST", "/bookings", &concierge, p2p_spec()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "SOURCING");
    assert!(body["estimated_price"].as_f64().unwrap() > 0.0);
    assert!(body["final_price"].is_null());
    assert!(body["id"].as_str().unwrap().len() > 0);
}

#[tokio::test]
async fn create_booking_without_identity_headers_is_rejected() {
    let (app, _state) = setup();

    let request = Request::builder()
        .method("POST")
        .uri("/bookings")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&p2p_spec()).unwrap()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn create_booking_with_blank_pickup_is_rejected() {
    let (app, _state) = setup();
    let concierge = TestActor::new("concierge", Uuid::new_v4());

    let mut spec = p2p_spec();
    spec["pickup"]["address"] = json!("  ");

    let response = app
        .oneshot(json_request("POST", "/bookings", &concierge, spec))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["kind"], "validation_error");
}

#[tokio::test]
async fn unknown_booking_returns_404() {
    let (app, _state) = setup();
    let concierge = TestActor::new("concierge", Uuid::new_v4());
    let fake_id = "00000000-0000-0000-0000-000000000000";

    let response = app
        .oneshot(get_request(&format!("/bookings/{fake_id}"), &concierge))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cancel_without_reason_is_rejected() {
    let (app, _state) = setup();
    let concierge = TestActor::new("concierge", Uuid::new_v4());

    let res = app
        .clone()
        .oneshot(json_request("POST", "/bookings", &concierge, p2p_spec()))
        .await
        .unwrap();
    let booking = body_json(res).await;
    let id = booking["id"].as_str().unwrap();

    let res = app
        .oneshot(json_request(
            "POST",
            &format!("/bookings/{id}/cancel"),
            &concierge,
            json!({ "reason": "" }),
        ))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn marketplace_flow_orders_quotes_and_settles_once() {
    let (app, _state) = setup();
    let tenant = Uuid::new_v4();
    let concierge = TestActor::new("concierge", tenant);

    let res = app
        .clone()
        .oneshot(json_request("POST", "/bookings", &concierge, p2p_spec()))
        .await
        .unwrap();
    let booking = body_json(res).await;
    let booking_id = booking["id"].as_str().unwrap().to_string();

    let mut quote_ids = Vec::new();
    for price in [180.0, 150.0, 200.0] {
        let operator = TestActor::new("operator", tenant);
        let res = app
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("/bookings/{booking_id}/quotes"),
                &operator,
                json!({
                    "vehicle_id": Uuid::new_v4(),
                    "price": price,
                    "eta_minutes": 12,
                    "operator_rating": 4.7
                }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let quote = body_json(res).await;
        assert_eq!(quote["status"], "pending");
        quote_ids.push(quote["id"].as_str().unwrap().to_string());
    }

    let res = app
        .clone()
        .oneshot(get_request(
            &format!("/bookings/{booking_id}/quotes"),
            &concierge,
        ))
        .await
        .unwrap();
    let listed = body_json(res).await;
    let listed = listed.as_array().unwrap();
    let prices: Vec<f64> = listed
        .iter()
        .map(|quote| quote["price"].as_f64().unwrap())
        .collect();
    assert_eq!(prices, vec![150.0, 180.0, 200.0]);
    assert_eq!(listed[0]["best_value"], true);
    assert_eq!(listed[1]["best_value"], false);

    // Accept the $180 quote; best_value does not constrain the choice.
    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/quotes/{}/accept", quote_ids[0]),
            &concierge,
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let settled = body_json(res).await;
    assert_eq!(settled["status"], "OPERATOR_ASSIGNED");
    assert_eq!(settled["final_price"], 180.0);

    let res = app
        .clone()
        .oneshot(get_request(
            &format!("/bookings/{booking_id}/quotes"),
            &concierge,
        ))
        .await
        .unwrap();
    let after = body_json(res).await;
    let accepted = after
        .as_array()
        .unwrap()
        .iter()
        .filter(|quote| quote["status"] == "accepted")
        .count();
    let declined = after
        .as_array()
        .unwrap()
        .iter()
        .filter(|quote| quote["status"] == "declined")
        .count();
    assert_eq!(accepted, 1);
    assert_eq!(declined, 2);

    // Quoting is closed once an operator holds the booking.
    let late_operator = TestActor::new("operator", tenant);
    let res = app
        .oneshot(json_request(
            "POST",
            &format!("/bookings/{booking_id}/quotes"),
            &late_operator,
            json!({
                "vehicle_id": Uuid::new_v4(),
                "price": 99.0,
                "eta_minutes": 5
            }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn full_trip_flow_reaches_completion() {
    let (app, state) = setup();
    let tenant = Uuid::new_v4();
    let concierge = TestActor::new("concierge", tenant);
    let operator = TestActor::new("operator", tenant);
    let driver = TestActor::new("driver", tenant);

    let res = app
        .clone()
        .oneshot(json_request("POST", "/bookings", &concierge, p2p_spec()))
        .await
        .unwrap();
    let booking = body_json(res).await;
    let booking_id = booking["id"].as_str().unwrap().to_string();

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/bookings/{booking_id}/quotes"),
            &operator,
            json!({
                "vehicle_id": Uuid::new_v4(),
                "price": 165.0,
                "eta_minutes": 10
            }),
        ))
        .await
        .unwrap();
    let quote = body_json(res).await;
    let quote_id = quote["id"].as_str().unwrap();

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/quotes/{quote_id}/accept"),
            &concierge,
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/bookings/{booking_id}/driver"),
            &operator,
            json!({
                "driver_id": driver.user_id,
                "vehicle_id": Uuid::new_v4()
            }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let trip = body_json(res).await;
    let trip_id = trip["id"].as_str().unwrap().to_string();
    assert_eq!(trip["status"], "DRIVER_ASSIGNED");
    assert_eq!(trip["progress"], 0.0);

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/trips/{trip_id}/start"),
            &driver,
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let started = body_json(res).await;
    assert_eq!(started["status"], "DRIVER_EN_ROUTE");

    for action in ["ARRIVE", "PICKUP", "COMPLETE"] {
        let res = app
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("/trips/{trip_id}/status"),
                &driver,
                json!({ "action": action }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    let res = app
        .clone()
        .oneshot(get_request(&format!("/bookings/{booking_id}"), &concierge))
        .await
        .unwrap();
    let finished = body_json(res).await;
    assert_eq!(finished["status"], "COMPLETED");

    let res = app
        .oneshot(get_request(&format!("/trips/{trip_id}"), &concierge))
        .await
        .unwrap();
    let trip = body_json(res).await;
    assert_eq!(trip["status"], "COMPLETED");
    assert_eq!(trip["progress"], 100.0);

    assert!(state.tick_tasks.is_empty());
}

#[tokio::test]
async fn driver_cannot_skip_straight_to_completion() {
    let (app, _state) = setup();
    let tenant = Uuid::new_v4();
    let concierge = TestActor::new("concierge", tenant);

    let res = app
        .clone()
        .oneshot(json_request("POST", "/bookings", &concierge, p2p_spec()))
        .await
        .unwrap();
    let booking = body_json(res).await;
    let booking_id = booking["id"].as_str().unwrap();

    let res = app
        .oneshot(json_request(
            "POST",
            &format!("/bookings/{booking_id}/status"),
            &concierge,
            json!({ "status": "COMPLETED" }),
        ))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body = body_json(res).await;
    assert_eq!(body["kind"], "illegal_transition");
}

#[tokio::test]
async fn pricing_updates_are_visible_to_the_next_estimate() {
    let (app, _state) = setup();
    let tenant = Uuid::new_v4();
    let operator = TestActor::new("operator", tenant);
    let concierge = TestActor::new("concierge", tenant);

    let res = app
        .clone()
        .oneshot(json_request(
            "PUT",
            "/pricing/sedan",
            &operator,
            json!({
                "hourly_rate": 100.0,
                "base_fare_p2p": 50.0,
                "per_distance_unit_rate": 2.0,
                "minimum_billable_hours": 3.0,
                "driver_commission_fraction": 0.8
            }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // Hourly charter in New York with the updated card:
    // 1 day x 5h x 100 = 500, tax 8.875%, platform 5% -> 569.375.
    let res = app
        .oneshot(json_request(
            "POST",
            "/bookings",
            &concierge,
            json!({
                "service_type": "hourly_charter",
                "pickup": {
                    "address": "30 Rockefeller Plaza, New York",
                    "coordinates": { "lat": 40.7587, "lng": -73.9787 }
                },
                "scheduled_at": "2026-09-01T09:00:00Z",
                "duration_hours": 5.0,
                "duration_days": 1,
                "vehicle_category": "sedan",
                "passenger_count": 3,
                "luggage_count": 0
            }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let booking = body_json(res).await;
    assert_eq!(booking["estimated_price"], 569.375);
}

#[tokio::test]
async fn concierge_cannot_submit_quotes() {
    let (app, _state) = setup();
    let tenant = Uuid::new_v4();
    let concierge = TestActor::new("concierge", tenant);

    let res = app
        .clone()
        .oneshot(json_request("POST", "/bookings", &concierge, p2p_spec()))
        .await
        .unwrap();
    let booking = body_json(res).await;
    let booking_id = booking["id"].as_str().unwrap();

    let res = app
        .oneshot(json_request(
            "POST",
            &format!("/bookings/{booking_id}/quotes"),
            &concierge,
            json!({
                "vehicle_id": Uuid::new_v4(),
                "price": 120.0,
                "eta_minutes": 8
            }),
        ))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::CONFLICT);
}
