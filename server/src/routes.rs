//! HTTP routes of the waypoint server

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use fleetnav_shared::{FleetSetup, IndexedWaypointResponse, SetupResponse, WaypointResponse};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::book::{Issued, WaypointBook};

pub type SharedBook = Arc<RwLock<WaypointBook>>;

/// Build the waypoint server router
pub fn router(book: SharedBook) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/waypoints", get(next_from_pool).post(setup_devices))
        .route("/waypoints/:device_id", get(next_for_device))
        .route("/devices/:device_id/:index", get(waypoint_at_index))
        .with_state(book)
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "waypoint-server",
    }))
}

async fn setup_devices(
    State(book): State<SharedBook>,
    Json(setup): Json<FleetSetup>,
) -> Json<SetupResponse> {
    let mut book = book.write().await;
    book.setup(setup);
    info!(
        "Waypoints set for {} devices ({} waypoints)",
        book.devices().len(),
        book.total_waypoints()
    );

    Json(SetupResponse {
        message: "Waypoints and delays set successfully.".into(),
    })
}

async fn next_for_device(
    State(book): State<SharedBook>,
    Path(device_id): Path<String>,
) -> Json<WaypointResponse> {
    // Lock is released before the delay so other devices are not held up
    let issued = book.write().await.next_for_device(&device_id);
    respond(&device_id, issued).await
}

async fn next_from_pool(State(book): State<SharedBook>) -> Json<WaypointResponse> {
    let issued = book.write().await.next_from_pool();
    respond("pool", issued).await
}

async fn waypoint_at_index(
    State(book): State<SharedBook>,
    Path((device_id, index)): Path<(String, usize)>,
) -> Result<Json<IndexedWaypointResponse>, StatusCode> {
    let found = book.read().await.at_index(&device_id, index);

    match found {
        Some((waypoint, delay)) => {
            tokio::time::sleep(delay).await;
            info!("Sending waypoint {} for {}", index, device_id);
            Ok(Json(IndexedWaypointResponse {
                device_id,
                waypoint: Some(waypoint),
            }))
        }
        None => {
            warn!("No waypoint {} for {}", index, device_id);
            Err(StatusCode::NOT_FOUND)
        }
    }
}

async fn respond(requester: &str, issued: Option<Issued>) -> Json<WaypointResponse> {
    match issued {
        Some(issued) => {
            tokio::time::sleep(issued.delay).await;
            info!(
                "Sending waypoint no {} for {}: {:?}",
                issued.waypoint_no, requester, issued.waypoint
            );
            Json(WaypointResponse {
                waypoint: Some(issued.waypoint),
                waypoint_no: Some(issued.waypoint_no),
            })
        }
        None => {
            debug!("No waypoint left for {}", requester);
            Json(WaypointResponse::exhausted())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use fleetnav_shared::Waypoint;
    use std::collections::HashMap;
    use tower::ServiceExt;

    fn setup_body() -> String {
        let setup = FleetSetup {
            devices: vec!["d1".into(), "d2".into()],
            waypoints: HashMap::from([
                (
                    "d1".to_string(),
                    vec![Waypoint {
                        latitude: 18.5674,
                        longitude: 73.7716,
                        height: 30.0,
                    }],
                ),
                (
                    "d2".to_string(),
                    vec![Waypoint {
                        latitude: 18.5671,
                        longitude: 73.7724,
                        height: 35.0,
                    }],
                ),
            ]),
            delays: HashMap::new(),
        };
        serde_json::to_string(&setup).unwrap()
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body.to_vec())
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn app_with_setup() -> Router {
        let app = router(Arc::new(RwLock::new(WaypointBook::new())));
        let request = Request::builder()
            .method("POST")
            .uri("/waypoints")
            .header("content-type", "application/json")
            .body(Body::from(setup_body()))
            .unwrap();

        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        let reply: SetupResponse = serde_json::from_slice(&body).unwrap();
        assert!(reply.message.contains("successfully"));
        app
    }

    #[tokio::test]
    async fn test_device_endpoint_serves_then_exhausts() {
        let app = app_with_setup().await;

        let (status, body) = send(&app, get("/waypoints/d1")).await;
        assert_eq!(status, StatusCode::OK);
        let first: WaypointResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(first.waypoint.map(|w| w.height), Some(30.0));
        assert!(first.waypoint_no.is_some());

        let (_, body) = send(&app, get("/waypoints/d1")).await;
        let second: WaypointResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(second, WaypointResponse::exhausted());
    }

    #[tokio::test]
    async fn test_indexed_endpoint() {
        let app = app_with_setup().await;

        let (status, body) = send(&app, get("/devices/d2/0")).await;
        assert_eq!(status, StatusCode::OK);
        let reply: IndexedWaypointResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(reply.device_id, "d2");
        assert_eq!(reply.waypoint.map(|w| w.height), Some(35.0));

        let (status, _) = send(&app, get("/devices/d2/1")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_pool_endpoint_hands_out_unique_numbers() {
        let app = app_with_setup().await;

        let (_, a) = send(&app, get("/waypoints")).await;
        let (_, b) = send(&app, get("/waypoints")).await;
        let a: WaypointResponse = serde_json::from_slice(&a).unwrap();
        let b: WaypointResponse = serde_json::from_slice(&b).unwrap();

        assert!(a.waypoint_no.is_some());
        assert_ne!(a.waypoint_no, b.waypoint_no);
    }
}
