//! REST API for the packing service.
//!
//! Provides HTTP endpoints for communication with the frontend.
//! Uses Axum as the web framework and supports CORS.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{
    Router,
    http::{StatusCode, Uri, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use rust_embed::RustEmbed;
use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
use serde_json::{Value, json};
use std::sync::OnceLock;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};
use utoipa::{OpenApi, ToSchema};

use crate::collections::{BoxList, PackedBoxList};
use crate::config::{ApiConfig, OptimizerConfig};
use crate::error::PackingError;
use crate::model::{BoxType, PackedBox, ValidationError};
use crate::packer::{ItemEntry, ItemInput, Packer};
use crate::types::{Dimensional, Weighted};

#[derive(Clone)]
struct ApiState {
    optimizer_config: OptimizerConfig,
}

static OPENAPI_DOC: OnceLock<utoipa::openapi::OpenApi> = OnceLock::new();

// SRI hashes verified against https://unpkg.com/swagger-ui-dist@5.17.14/ on 2025-10-29.
const SWAGGER_UI_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
    <head>
        <meta charset="utf-8" />
        <title>box_packer API Docs</title>
        <link
            rel="stylesheet"
            href="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui.css"
            integrity="sha384-wxLW6kwyHktdDGr6Pv1zgm/VGJh99lfUbzSn6HNHBENZlCN7W602k9VkGdxuFvPn"
            crossorigin="anonymous"
        />
    </head>
    <body>
        <div id="swagger-ui"></div>
        <script
            src="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui-bundle.js"
            integrity="sha384-wmyclcVGX/WhUkdkATwhaK1X1JtiNrr2EoYJ+diV3vj4v6OC5yCeSu+yW13SYJep"
            crossorigin="anonymous"
        ></script>
        <script
            src="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui-standalone-preset.js"
            integrity="sha384-2YH8WDRaj7V2OqU/trsmzSagmk/E2SutiCsGkdgoQwC9pNUJV1u/141DHB6jgs8t"
            crossorigin="anonymous"
        ></script>
        <script>
            window.onload = function () {
                const ui = SwaggerUIBundle({
                    url: "/docs/openapi.json",
                    dom_id: "#swagger-ui",
                    presets: [SwaggerUIBundle.presets.apis, SwaggerUIStandalonePreset],
                    layout: "StandaloneLayout",
                });
                window.ui = ui;
            };
        </script>
    </body>
    </html>"##;

fn openapi_doc() -> &'static utoipa::openapi::OpenApi {
    OPENAPI_DOC.get_or_init(ApiDoc::openapi)
}

/// Embedded Web Assets (HTML, CSS, JS)
#[derive(RustEmbed)]
#[folder = "web/"]
struct WebAssets;

/// One box type of the catalog.
#[derive(Deserialize, Clone, ToSchema)]
pub struct BoxRequest {
    pub reference: String,
    #[schema(value_type = [f64; 3], example = json!([30.0, 30.0, 20.0]))]
    pub inner_dims: (f64, f64, f64),
    pub max_weight: f64,
    #[serde(default)]
    pub empty_weight: f64,
}

impl BoxRequest {
    fn into_box_type(self) -> Result<BoxType, ValidationError> {
        BoxType::new(
            self.reference,
            self.inner_dims,
            self.max_weight,
            self.empty_weight,
        )
    }
}

/// Request structure for the packing endpoints.
///
/// `items` is either an array of item lines or an object with an `items` array.
#[derive(Deserialize, ToSchema)]
#[schema(
    example = json!({
        "boxes": [
            {
                "reference": "Small",
                "inner_dims": [30.0, 30.0, 20.0],
                "max_weight": 20.0,
                "empty_weight": 0.5
            },
            {
                "reference": "Large",
                "inner_dims": [60.0, 40.0, 40.0],
                "max_weight": 30.0,
                "empty_weight": 1.2
            }
        ],
        "items": [
            { "description": "Mug", "dims": [10.0, 10.0, 12.0], "weight": 0.4, "quantity": 6 },
            { "description": "Kettle", "dims": [20.0, 18.0, 25.0], "weight": 1.5 }
        ],
        "redistribute_weight": true
    })
)]
pub struct PackRequest {
    pub boxes: Vec<BoxRequest>,
    #[schema(value_type = Object)]
    pub items: Value,
    #[serde(default)]
    #[schema(nullable = true)]
    pub redistribute_weight: Option<bool>,
}

#[derive(Debug)]
struct ValidatedPackRequest {
    boxes: BoxList,
    items: ItemInput,
    redistribute_weight: Option<bool>,
}

impl ValidatedPackRequest {
    fn box_type_count(&self) -> usize {
        self.boxes.len()
    }

    fn item_count(&self) -> usize {
        match &self.items {
            ItemInput::List(items) => items.len(),
            ItemInput::Sequence(items) => items.len(),
        }
    }

    fn into_packer(self, optimizer_config: &OptimizerConfig) -> Packer {
        let mut packing_config = optimizer_config.packing_config();
        if let Some(redistribute) = self.redistribute_weight {
            packing_config.redistribute_weight = redistribute;
        }

        let mut packer = Packer::with_config(packing_config);
        packer.set_boxes(self.boxes);
        packer.set_items(self.items);
        packer
    }
}

#[derive(Debug)]
enum PackRequestValidationError {
    MissingBoxes,
    InvalidBox(ValidationError),
    InvalidItems(PackingError),
}

impl PackRequest {
    fn into_validated(self) -> Result<ValidatedPackRequest, PackRequestValidationError> {
        if self.boxes.is_empty() {
            return Err(PackRequestValidationError::MissingBoxes);
        }

        let boxes = self
            .boxes
            .into_iter()
            .map(BoxRequest::into_box_type)
            .collect::<Result<BoxList, ValidationError>>()
            .map_err(PackRequestValidationError::InvalidBox)?;

        let items =
            ItemInput::try_from(self.items).map_err(PackRequestValidationError::InvalidItems)?;

        Ok(ValidatedPackRequest {
            boxes,
            items,
            redistribute_weight: self.redistribute_weight,
        })
    }
}

/// Response structure with all packed boxes.
#[derive(Serialize, ToSchema)]
pub struct PackResponse {
    pub boxes: Vec<PackedBoxResponse>,
    pub box_count: usize,
    pub item_count: usize,
    pub mean_weight: f64,
    pub weight_variance: f64,
}

/// A single packed box.
///
/// # Fields
/// * `id` - Box number (1-based)
/// * `total_weight` - Tare plus the weight of all items
/// * `volume_utilisation` - Percentage of the interior occupied by items
#[derive(Serialize, ToSchema)]
pub struct PackedBoxResponse {
    pub id: usize,
    pub reference: String,
    #[schema(value_type = [f64; 3], example = json!([30.0, 30.0, 20.0]))]
    pub inner_dims: (f64, f64, f64),
    pub max_weight: f64,
    pub empty_weight: f64,
    pub total_weight: f64,
    pub items_weight: f64,
    pub volume_utilisation: f64,
    pub items: Vec<PackedItemResponse>,
}

#[derive(Serialize, ToSchema)]
pub struct PackedItemResponse {
    pub description: String,
    #[schema(value_type = [f64; 3], example = json!([10.0, 10.0, 12.0]))]
    pub dims: (f64, f64, f64),
    pub weight: f64,
}

#[derive(Serialize, ToSchema)]
struct ErrorResponse {
    error: String,
    details: String,
}

impl ErrorResponse {
    fn new(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: details.into(),
        }
    }
}

fn error_response(
    status: StatusCode,
    error: impl Into<String>,
    details: impl Into<String>,
) -> Response {
    (status, Json(ErrorResponse::new(error, details))).into_response()
}

fn json_deserialize_error(err: JsonRejection) -> Response {
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        "Invalid JSON data",
        err.to_string(),
    )
}

fn validation_error(details: impl Into<String>) -> Response {
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        "Invalid input data",
        details,
    )
}

fn box_config_error(details: impl Into<String>) -> Response {
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        "Invalid box configuration",
        details,
    )
}

fn packing_error(err: &PackingError) -> Response {
    error_response(StatusCode::UNPROCESSABLE_ENTITY, err.code(), err.to_string())
}

fn parse_pack_request(
    payload: Result<Json<PackRequest>, JsonRejection>,
) -> Result<ValidatedPackRequest, Response> {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(err) => return Err(json_deserialize_error(err)),
    };

    match payload.into_validated() {
        Ok(validated) => Ok(validated),
        Err(PackRequestValidationError::MissingBoxes) => Err(validation_error(
            "At least one box type must be specified",
        )),
        Err(PackRequestValidationError::InvalidBox(err)) => {
            Err(box_config_error(err.to_string()))
        }
        Err(PackRequestValidationError::InvalidItems(err)) => {
            Err(validation_error(err.to_string()))
        }
    }
}

impl PackedBoxResponse {
    fn from_packed_box(id: usize, packed: PackedBox) -> Self {
        let total_weight = packed.weight();
        let items_weight = packed.items_weight();
        let volume_utilisation = packed.volume_utilisation();
        let (box_type, items) = packed.into_parts();

        Self {
            id,
            reference: box_type.reference().to_string(),
            inner_dims: box_type.inner_dims().as_tuple(),
            max_weight: box_type.max_weight(),
            empty_weight: box_type.empty_weight(),
            total_weight,
            items_weight,
            volume_utilisation,
            items: items
                .iter()
                .map(|item| PackedItemResponse {
                    description: item.description().to_string(),
                    dims: item.dimensions().as_tuple(),
                    weight: item.weight(),
                })
                .collect(),
        }
    }
}

impl PackResponse {
    /// Creates a PackResponse from a finished solution.
    pub fn from_solution(solution: PackedBoxList) -> Self {
        let box_count = solution.len();
        let item_count = solution.item_count();
        let mean_weight = solution.mean_weight();
        let weight_variance = solution.weight_variance();

        Self {
            boxes: solution
                .into_iter()
                .enumerate()
                .map(|(i, packed)| PackedBoxResponse::from_packed_box(i + 1, packed))
                .collect(),
            box_count,
            item_count,
            mean_weight,
            weight_variance,
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(handle_pack, handle_pack_stream),
    components(
        schemas(
            PackRequest,
            BoxRequest,
            ItemEntry,
            PackResponse,
            PackedBoxResponse,
            PackedItemResponse,
            ErrorResponse
        )
    ),
    tags((name = "packing", description = "Endpoints for box packing"))
)]
struct ApiDoc;

fn router(optimizer_config: OptimizerConfig) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let state = ApiState { optimizer_config };

    Router::new()
        // API endpoints
        .route("/pack", post(handle_pack))
        .route("/pack_stream", post(handle_pack_stream))
        // API documentation
        .route("/docs/openapi.json", get(serve_openapi_json))
        .route("/docs", get(serve_openapi_ui))
        // Web-UI (embedded)
        .route("/", get(serve_index))
        .route("/{*path}", get(serve_static))
        .layer(cors)
        .with_state(state)
}

/// Starts the API server on the configured address.
///
/// Configures CORS for cross-origin requests from the frontend.
/// Blocks until the server is terminated.
pub async fn start_api_server(config: ApiConfig, optimizer_config: OptimizerConfig) {
    let app = router(optimizer_config);

    let addr = config.socket_addr();
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!("❌ Could not bind API server to {}: {}", addr, err);
            return;
        }
    };

    let display_host = config.display_host().to_string();
    info!(
        "🚀 Server running on http://{}:{}",
        display_host,
        config.port()
    );
    if config.binds_to_all_interfaces() && config.uses_default_host() {
        info!("💡 Local access: http://localhost:{}", config.port());
    }
    info!("📦 API Endpoints: POST /pack, POST /pack_stream");
    info!("📑 Documentation: GET /docs, GET /docs/openapi.json");
    info!("🌐 Web-UI: http://{}:{}", display_host, config.port());

    if let Err(err) = axum::serve(listener, app).await {
        error!("❌ API server terminated with an error: {err}");
    }
}

/// Handler for POST /pack endpoint.
///
/// Packs the items into boxes from the catalog and rebalances their weights.
///
/// # Returns
/// JSON response with all boxes used and the items in each
#[utoipa::path(
    post,
    path = "/pack",
    request_body = PackRequest,
    responses(
        (status = 200, description = "Successfully packed items", body = PackResponse),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Invalid request, box configuration, or an item that fits no box",
            body = ErrorResponse
        )
    ),
    tag = "packing"
)]
async fn handle_pack(
    State(state): State<ApiState>,
    payload: Result<Json<PackRequest>, JsonRejection>,
) -> impl IntoResponse {
    let request = match parse_pack_request(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };

    info!(
        "📥 New pack request: {} items, {} box types",
        request.item_count(),
        request.box_type_count()
    );
    let packer = request.into_packer(&state.optimizer_config);

    match packer.pack() {
        Ok(solution) => {
            info!(
                "📦 Result: {} boxes, {} items",
                solution.len(),
                solution.item_count()
            );
            let response = PackResponse::from_solution(solution);
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(err) => {
            warn!("❌ Packing failed: {}", err);
            packing_error(&err)
        }
    }
}

/// Handler for POST /pack_stream endpoint (SSE).
///
/// Streams pack events in real-time as Server-Sent Events (text/event-stream).
/// The last event is `Finished` or `Failed`.
#[utoipa::path(
    post,
    path = "/pack_stream",
    request_body = PackRequest,
    responses(
        (
            status = 200,
            description = "Streams pack events in real-time",
            content_type = "text/event-stream",
            body = String
        ),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Invalid request or box configuration",
            body = ErrorResponse
        )
    ),
    tag = "packing"
)]
async fn handle_pack_stream(
    State(state): State<ApiState>,
    payload: Result<Json<PackRequest>, JsonRejection>,
) -> impl IntoResponse {
    let request = match parse_pack_request(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };

    let packer = request.into_packer(&state.optimizer_config);
    let (tx, rx) = mpsc::channel::<String>(32);

    tokio::task::spawn_blocking(move || {
        let mut receiver_open = true;
        let _ = packer.pack_with_progress(|evt| {
            if !receiver_open {
                return;
            }
            if let Ok(json) = serde_json::to_string(evt) {
                // Receiver has closed the stream; remaining events are discarded.
                receiver_open = tx.blocking_send(json).is_ok();
            }
        });
    });

    let stream = ReceiverStream::new(rx)
        .map(|msg| Ok::<_, std::convert::Infallible>(Event::default().data(msg)));
    Sse::new(stream)
        .keep_alive(
            KeepAlive::new()
                .interval(std::time::Duration::from_secs(10))
                .text("keep-alive"),
        )
        .into_response()
}

/// Serves the index.html main page
async fn serve_index() -> Response {
    match WebAssets::get("index.html") {
        Some(content) => Html(content.data).into_response(),
        None => (StatusCode::NOT_FOUND, "404 Not Found").into_response(),
    }
}

/// Serves static assets (JS, CSS, etc.)
async fn serve_static(uri: Uri) -> Response {
    let path = uri.path().trim_start_matches('/');

    match WebAssets::get(path) {
        Some(content) => {
            let mime = mime_guess::from_path(path).first_or_octet_stream();
            ([(header::CONTENT_TYPE, mime.as_ref())], content.data).into_response()
        }
        None => (StatusCode::NOT_FOUND, "404 Not Found").into_response(),
    }
}

async fn serve_openapi_json(State(_state): State<ApiState>) -> impl IntoResponse {
    Json(openapi_doc())
}

async fn serve_openapi_ui(State(_state): State<ApiState>) -> impl IntoResponse {
    Html(SWAGGER_UI_HTML)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::PackingConfig;

    fn state() -> ApiState {
        ApiState {
            optimizer_config: OptimizerConfig::from(PackingConfig::default()),
        }
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should be readable");
        serde_json::from_slice(&bytes).expect("body should be JSON")
    }

    #[test]
    fn openapi_doc_lists_expected_paths() {
        let doc = openapi_doc();
        let paths = &doc.paths.paths;
        assert!(
            paths.contains_key("/pack"),
            "OpenAPI documentation is missing the /pack path"
        );
        assert!(
            paths.contains_key("/pack_stream"),
            "OpenAPI documentation is missing the /pack_stream path"
        );
    }

    #[test]
    fn openapi_doc_contains_key_schemas() {
        let doc = openapi_doc();
        let components = doc
            .components
            .as_ref()
            .expect("OpenAPI documentation contains no components");
        let schemas = &components.schemas;
        for name in ["PackRequest", "BoxRequest", "ItemEntry", "PackResponse", "ErrorResponse"] {
            assert!(
                schemas.contains_key(name),
                "Expected schema '{}' is missing from the OpenAPI document",
                name
            );
        }
    }

    #[test]
    fn pack_request_parses_redistribute_weight_when_present() {
        let json = r#"{
            "boxes": [{"reference": "A", "inner_dims": [10.0, 10.0, 10.0], "max_weight": 100.0}],
            "items": [{"description": "cube", "dims": [5.0, 5.0, 5.0], "weight": 10.0}],
            "redistribute_weight": false
        }"#;
        let request: PackRequest = serde_json::from_str(json).expect("Should parse valid JSON");
        assert_eq!(request.redistribute_weight, Some(false));
        assert_eq!(request.boxes[0].empty_weight, 0.0);
    }

    #[test]
    fn pack_request_parses_redistribute_weight_when_absent_or_null() {
        for json in [
            r#"{"boxes": [], "items": []}"#,
            r#"{"boxes": [], "items": [], "redistribute_weight": null}"#,
        ] {
            let request: PackRequest = serde_json::from_str(json).expect("Should parse valid JSON");
            assert_eq!(request.redistribute_weight, None);
        }
    }

    #[test]
    fn validation_rejects_missing_boxes_and_bad_items() {
        let request = PackRequest {
            boxes: vec![],
            items: json!([]),
            redistribute_weight: None,
        };
        assert!(matches!(
            request.into_validated(),
            Err(PackRequestValidationError::MissingBoxes)
        ));

        let request = PackRequest {
            boxes: vec![BoxRequest {
                reference: "A".to_string(),
                inner_dims: (10.0, 10.0, 10.0),
                max_weight: 100.0,
                empty_weight: 0.0,
            }],
            items: json!("three mugs"),
            redistribute_weight: None,
        };
        assert!(matches!(
            request.into_validated(),
            Err(PackRequestValidationError::InvalidItems(PackingError::InvalidItemInput(_)))
        ));

        let request = PackRequest {
            boxes: vec![BoxRequest {
                reference: "A".to_string(),
                inner_dims: (10.0, 10.0, 10.0),
                max_weight: 1.0,
                empty_weight: 2.0,
            }],
            items: json!([]),
            redistribute_weight: None,
        };
        assert!(matches!(
            request.into_validated(),
            Err(PackRequestValidationError::InvalidBox(_))
        ));
    }

    #[test]
    fn request_level_redistribute_weight_overrides_config() {
        let request = PackRequest {
            boxes: vec![BoxRequest {
                reference: "A".to_string(),
                inner_dims: (10.0, 10.0, 10.0),
                max_weight: 100.0,
                empty_weight: 0.0,
            }],
            items: json!({"items": [{"description": "cube", "dims": [5.0, 5.0, 5.0], "weight": 1.0, "quantity": 3}]}),
            redistribute_weight: Some(false),
        };
        let validated = request.into_validated().expect("Should validate successfully");
        assert_eq!(validated.item_count(), 3);

        let packer = validated.into_packer(&state().optimizer_config);
        assert!(!packer.config().redistribute_weight);
        assert_eq!(packer.items().len(), 3);
    }

    #[tokio::test]
    async fn pack_handler_returns_boxes() {
        let request = PackRequest {
            boxes: vec![BoxRequest {
                reference: "Cube box".to_string(),
                inner_dims: (10.0, 10.0, 10.0),
                max_weight: 100.0,
                empty_weight: 1.0,
            }],
            items: json!([{"description": "die", "dims": [5.0, 5.0, 5.0], "weight": 2.0, "quantity": 4}]),
            redistribute_weight: None,
        };

        let response = handle_pack(State(state()), Ok(Json(request)))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["box_count"], 1);
        assert_eq!(body["item_count"], 4);
        assert_eq!(body["boxes"][0]["id"], 1);
        assert_eq!(body["boxes"][0]["reference"], "Cube box");
        assert_eq!(body["boxes"][0]["total_weight"], 9.0);
    }

    #[tokio::test]
    async fn pack_handler_reports_oversized_items() {
        let request = PackRequest {
            boxes: vec![BoxRequest {
                reference: "Small".to_string(),
                inner_dims: (10.0, 10.0, 10.0),
                max_weight: 100.0,
                empty_weight: 0.0,
            }],
            items: json!([{"description": "ladder", "dims": [40.0, 200.0, 10.0], "weight": 8.0}]),
            redistribute_weight: None,
        };

        let response = handle_pack(State(state()), Ok(Json(request)))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = body_json(response).await;
        assert_eq!(body["error"], "item_too_large");
        assert!(body["details"].as_str().unwrap_or_default().contains("ladder"));
    }
}
