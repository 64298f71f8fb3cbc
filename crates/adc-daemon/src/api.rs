//! REST API handlers

use adc_core::{
    dispatch, Command, DispatchError, FailureKind, Payload, RegHex, Verb, ALL_DEVICES,
};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::state::AppState;

/// API error response
#[derive(Serialize)]
struct ApiError {
    error: String,
}

impl ApiError {
    fn new(msg: impl Into<String>) -> Self {
        Self { error: msg.into() }
    }
}

fn error_response(status: StatusCode, msg: impl Into<String>) -> Response {
    (status, Json(ApiError::new(msg))).into_response()
}

fn failure(e: &DispatchError) -> Response {
    let status = match e.kind() {
        FailureKind::BadRequest => StatusCode::BAD_REQUEST,
        FailureKind::NotFound => StatusCode::NOT_FOUND,
        FailureKind::DeviceFailure => StatusCode::BAD_GATEWAY,
    };
    error_response(status, e.to_string())
}

/// Run a command on the blocking pool; device I/O is synchronous
async fn execute(state: Arc<AppState>, command: Command) -> Result<Payload, Response> {
    let joined = tokio::task::spawn_blocking(move || dispatch(&state.registry, &command)).await;
    match joined {
        Ok(Ok(payload)) => Ok(payload),
        Ok(Err(e)) => Err(failure(&e)),
        Err(e) => Err(error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Command task failed: {e}"),
        )),
    }
}

async fn execute_request(
    state: Arc<AppState>,
    verb: Verb,
    target: &str,
    addr: Option<&str>,
    value: Option<&str>,
) -> Result<Payload, Response> {
    let command = Command::from_request(verb, target, addr, value).map_err(|e| failure(&e))?;
    execute(state, command).await
}

/// List registered device names
pub async fn list_devices(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.registry.names())
}

/// Read one register
pub async fn reg_read(
    State(state): State<Arc<AppState>>,
    Path((device, addr)): Path<(String, String)>,
) -> Response {
    debug!(device = %device, addr = %addr, "Handling reg read request");

    match execute_request(state, Verb::Read, &device, Some(addr.as_str()), None).await {
        Ok(Payload::Register(op)) => Json(RegHex::from(op)).into_response(),
        Ok(other) => Json(other.to_hex()).into_response(),
        Err(resp) => resp,
    }
}

/// Read the device's whole register map
pub async fn reg_read_all(
    State(state): State<Arc<AppState>>,
    Path(device): Path<String>,
) -> Response {
    debug!(device = %device, "Handling reg read all request");

    match execute_request(state, Verb::ReadAll, &device, None, None).await {
        Ok(payload) => Json(payload.to_hex()).into_response(),
        Err(resp) => resp,
    }
}

/// Write one register
pub async fn reg_write(
    State(state): State<Arc<AppState>>,
    Path(device): Path<String>,
    body: Result<Json<RegHex>, JsonRejection>,
) -> Response {
    let Json(reg) = match body {
        Ok(body) => body,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.body_text()),
    };

    debug!(
        device = %device,
        addr = %reg.addr,
        value = %reg.value,
        "Handling reg write request"
    );

    let (addr, value) = (reg.addr.as_str(), reg.value.as_str());
    match execute_request(state, Verb::Write, &device, Some(addr), Some(value)).await {
        Ok(_) => StatusCode::OK.into_response(),
        Err(resp) => resp,
    }
}

/// Start or stop MStream on one device
pub async fn mstream_action(
    State(state): State<Arc<AppState>>,
    Path((action, device)): Path<(String, String)>,
) -> Response {
    debug!(device = %device, action = %action, "Handling MStream action request");
    mstream(state, &action, &device).await
}

/// Start or stop MStream on every device, stopping at the first failure
pub async fn mstream_action_all(
    State(state): State<Arc<AppState>>,
    Path(action): Path<String>,
) -> Response {
    debug!(action = %action, "Handling MStream action request for all devices");
    mstream(state, &action, ALL_DEVICES).await
}

async fn mstream(state: Arc<AppState>, action: &str, target: &str) -> Response {
    let verb = match Verb::from_stream_action(action) {
        Ok(verb) => verb,
        Err(e) => return failure(&e),
    };
    match execute_request(state, verb, target, None, None).await {
        Ok(_) => StatusCode::OK.into_response(),
        Err(resp) => resp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::router;
    use adc_core::{DeviceRegistry, MemoryDevice};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn app(devices: Vec<Arc<MemoryDevice>>) -> axum::Router {
        let mut registry = DeviceRegistry::new();
        for dev in devices {
            registry.insert(dev).unwrap();
        }
        router(Arc::new(AppState { registry }))
    }

    async fn call(app: axum::Router, method: &str, uri: &str, body: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_list_devices() {
        let app = app(vec![
            Arc::new(MemoryDevice::new("adc0")),
            Arc::new(MemoryDevice::new("adc1")),
        ]);
        let (status, body) = call(app, "GET", "/api/devices", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, r#"["adc0","adc1"]"#);
    }

    #[tokio::test]
    async fn test_read_register() {
        let app = app(vec![Arc::new(
            MemoryDevice::new("adc0").with_registers([(0x0010, 0xbeef)]),
        )]);
        let (status, body) = call(app, "GET", "/api/reg/r/adc0/0x0010", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, r#"{"Addr":"0x0010","Value":"0xbeef"}"#);
    }

    #[tokio::test]
    async fn test_read_address_above_15_bits() {
        let app = app(vec![Arc::new(
            MemoryDevice::new("adc0").with_registers([(0x0010, 0xbeef)]),
        )]);
        let (status, body) = call(app, "GET", "/api/reg/r/adc0/0x8010", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, r#"{"Addr":"0x0010","Value":"0xbeef"}"#);
    }

    #[tokio::test]
    async fn test_read_bad_address() {
        let app = app(vec![Arc::new(MemoryDevice::new("adc0"))]);
        let (status, _) = call(app.clone(), "GET", "/api/reg/r/adc0/0x1ffff", "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = call(app, "GET", "/api/reg/r/adc0/0x+1f", "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_read_unknown_device() {
        let app = app(vec![Arc::new(MemoryDevice::new("adc0"))]);
        let (status, body) = call(app, "GET", "/api/reg/r/adc1/0x0001", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.contains("adc1"));
    }

    #[tokio::test]
    async fn test_read_all_keeps_order() {
        let app = app(vec![Arc::new(
            MemoryDevice::new("adc0").with_registers([(0, 5), (1, 9)]),
        )]);
        let (status, body) = call(app, "GET", "/api/reg/r/adc0", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            r#"[{"Addr":"0x0000","Value":"0x0005"},{"Addr":"0x0001","Value":"0x0009"}]"#
        );
    }

    #[tokio::test]
    async fn test_write_register() {
        let dev = Arc::new(MemoryDevice::new("adc0"));
        let app = app(vec![dev.clone()]);
        let (status, _) = call(
            app,
            "POST",
            "/api/reg/w/adc0",
            r#"{"Addr":"0x0002","Value":"0x00ff"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(dev.register(2), Some(0x00ff));
    }

    #[tokio::test]
    async fn test_write_rejects_bad_body() {
        let dev = Arc::new(MemoryDevice::new("adc0"));
        let app = app(vec![dev.clone()]);

        let (status, _) = call(app.clone(), "POST", "/api/reg/w/adc0", "not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            app,
            "POST",
            "/api/reg/w/adc0",
            r#"{"Addr":"0xzz","Value":"0x1"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(dev.calls().is_empty());
    }

    #[tokio::test]
    async fn test_device_failure_is_bad_gateway() {
        let app = app(vec![Arc::new(
            MemoryDevice::new("adc0").fail_on(Verb::Write),
        )]);
        let (status, _) = call(
            app,
            "POST",
            "/api/reg/w/adc0",
            r#"{"Addr":"0x0002","Value":"0x0001"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_mstream_single_device() {
        let dev = Arc::new(MemoryDevice::new("adc0"));
        let app = app(vec![dev.clone()]);
        let (status, _) = call(app.clone(), "GET", "/api/mstream/start/adc0", "").await;
        assert_eq!(status, StatusCode::OK);
        assert!(dev.is_streaming());

        let (status, _) = call(app, "GET", "/api/mstream/stop/adc0", "").await;
        assert_eq!(status, StatusCode::OK);
        assert!(!dev.is_streaming());
    }

    #[tokio::test]
    async fn test_mstream_unknown_action() {
        let dev = Arc::new(MemoryDevice::new("adc0"));
        let app = app(vec![dev.clone()]);
        let (status, body) = call(app, "GET", "/api/mstream/pause", "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("start/stop"));
        assert!(dev.calls().is_empty());
    }

    #[tokio::test]
    async fn test_mstream_all_fails_fast() {
        let d1 = Arc::new(MemoryDevice::new("adc0"));
        let d2 = Arc::new(MemoryDevice::new("adc1").fail_on(Verb::StreamStart));
        let d3 = Arc::new(MemoryDevice::new("adc2"));
        let app = app(vec![d1.clone(), d2.clone(), d3.clone()]);

        let (status, body) = call(app, "GET", "/api/mstream/start", "").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body.contains("adc1"));
        assert!(d1.is_streaming());
        assert!(d3.calls().is_empty());
    }
}
