//! HTTP transport: `/{type}` and `/{type}/{id}` in, JSON:API documents out.

use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::{HeaderMap, HeaderValue, Method as HttpMethod, Uri},
    response::Json,
    routing::{any, get},
    Router,
};
use serde_json::{json, Value};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::api::document::Response;
use crate::api::request::RequestContext;
use crate::config::AppConfig;
use crate::error::JsonApiError;
use crate::handler::JsonApi;
use crate::types::Method;

/// Header carrying the acting user's id, set by whatever authenticates in front of us
pub const USER_HEADER: &str = "x-user-id";

pub fn router(api: JsonApi) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/:resource", any(collection))
        .route("/:resource/:id", any(member))
        .with_state(api)
        .layer(TraceLayer::new_for_http())
}

/// Router plus the CORS and body-size layers configured for this deployment
pub fn app(api: JsonApi, config: &AppConfig) -> Router {
    let mut app = router(api).layer(DefaultBodyLimit::max(config.api.max_request_size_bytes));
    if config.server.enable_cors {
        app = app.layer(cors_layer(&config.server.cors_origins));
    }
    app
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = origins.iter().filter_map(|origin| origin.parse().ok()).collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

async fn root(State(api): State<JsonApi>) -> Json<Value> {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "resources": api.services().registry.types(),
    }))
}

async fn collection(
    State(api): State<JsonApi>,
    Path(resource): Path<String>,
    method: HttpMethod,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> Result<Response, JsonApiError> {
    dispatch(api, resource, None, method, uri, headers, body).await
}

async fn member(
    State(api): State<JsonApi>,
    Path((resource, id)): Path<(String, String)>,
    method: HttpMethod,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> Result<Response, JsonApiError> {
    dispatch(api, resource, Some(id), method, uri, headers, body).await
}

async fn dispatch(
    api: JsonApi,
    resource: String,
    id: Option<String>,
    method: HttpMethod,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> Result<Response, JsonApiError> {
    let method = Method::try_from(&method).map_err(|_| JsonApiError::method_not_allowed(0))?;
    let user = headers
        .get(USER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let url = format!("{}{}", api.services().settings.base_url, uri.path());
    let body = Some(body).filter(|body| !body.is_empty());

    let ctx = RequestContext::from_query(method, url, id, uri.query(), body, user);
    api.fulfill(&resource, ctx).await
}
