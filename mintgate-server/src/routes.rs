//! Unpaid routes and the assembled application router.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, Method};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::{Attribute, CollectionConfig};

const X_PAYMENT: HeaderName = HeaderName::from_static("x-payment");
const X_PAYMENT_RESPONSE: HeaderName = HeaderName::from_static("x-payment-response");

/// ERC-721 metadata of one token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenMetadata {
    /// `"{collection} #{id}"`.
    pub name: String,
    /// Token description.
    pub description: String,
    /// Image URL.
    pub image: String,
    /// Shared attributes.
    pub attributes: Vec<Attribute>,
    /// Collection website.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_url: Option<String>,
}

impl CollectionConfig {
    /// Metadata of token `token_id`.
    #[must_use]
    pub fn metadata(&self, token_id: u64) -> TokenMetadata {
        TokenMetadata {
            name: format!("{} #{token_id}", self.name),
            description: self.description.clone(),
            image: format!("{}/{token_id}.png", self.image_base.trim_end_matches('/')),
            attributes: self.attributes.clone(),
            external_url: self.external_url.clone(),
        }
    }
}

/// Health check endpoint.
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn metadata(
    State(collection): State<Arc<CollectionConfig>>,
    Path(token_id): Path<u64>,
) -> Json<TokenMetadata> {
    Json(collection.metadata(token_id))
}

/// Merges the paid routes in `paid` with health and metadata, under CORS
/// and request tracing.
///
/// Browsers may send `X-PAYMENT` and read `X-PAYMENT-RESPONSE`.
pub fn app(paid: Router, collection: CollectionConfig) -> Router {
    let unpaid = Router::new()
        .route("/health", get(health))
        .route("/metadata/{token_id}", get(metadata))
        .with_state(Arc::new(collection));
    Router::new()
        .merge(paid)
        .merge(unpaid)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([CONTENT_TYPE, X_PAYMENT])
                .expose_headers([X_PAYMENT_RESPONSE]),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn collection() -> CollectionConfig {
        CollectionConfig {
            name: "JustApes".into(),
            description: "An ape.".into(),
            image_base: "https://ipfs.io/ipfs/bafy/".into(),
            external_url: Some("https://justapes.vercel.app".into()),
            attributes: vec![Attribute {
                trait_type: "Tier".into(),
                value: "Citizen".into(),
            }],
        }
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or_default())
    }

    #[tokio::test]
    async fn metadata_is_built_from_the_collection() {
        let (status, body) = get_json(app(Router::new(), collection()), "/metadata/42").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "JustApes #42");
        assert_eq!(body["image"], "https://ipfs.io/ipfs/bafy/42.png");
        assert_eq!(body["attributes"][0]["trait_type"], "Tier");
        assert_eq!(body["external_url"], "https://justapes.vercel.app");
    }

    #[tokio::test]
    async fn non_numeric_token_id_is_rejected() {
        let (status, _) = get_json(app(Router::new(), collection()), "/metadata/ape").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn health_reports_version() {
        let (status, body) = get_json(app(Router::new(), collection()), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn cors_exposes_the_receipt_header() {
        let response = app(Router::new(), collection())
            .oneshot(
                Request::get("/health")
                    .header("origin", "https://justapes.vercel.app")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let exposed = response
            .headers()
            .get("access-control-expose-headers")
            .unwrap()
            .to_str()
            .unwrap();
        assert!(exposed.contains("x-payment-response"));
    }
}
