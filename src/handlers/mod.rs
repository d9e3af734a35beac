// HTTP handlers, one module per resource

pub mod auth;
pub mod comments;
pub mod friendships;
pub mod likes;
pub mod newsfeed;
pub mod posts;
pub mod privacy;
pub mod users;

use axum::{
    body::Bytes,
    extract::{FromRequestParts, Path},
    http::{header, request::Parts, HeaderName, HeaderValue, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;

use crate::error::{AppError, AppResult};

pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

/// Whether a payload came out of the response cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    fn header_value(self) -> HeaderValue {
        match self {
            CacheStatus::Hit => HeaderValue::from_static("HIT"),
            CacheStatus::Miss => HeaderValue::from_static("MISS"),
        }
    }
}

/// Integer id from a `/{id}` route segment. A segment that is not an integer
/// matches no resource, so it is a 404 in the usual error envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdPath(pub i64);

impl<S> FromRequestParts<S> for IdPath
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<i64>::from_request_parts(parts, state).await {
            Ok(Path(id)) => Ok(IdPath(id)),
            Err(rejection) => {
                tracing::debug!("Unmatched id segment in {}: {}", parts.uri.path(), rejection);
                Err(AppError::NotFound("Not found.".to_string()))
            }
        }
    }
}

/// Serialized JSON bytes returned as-is, so a cache hit is byte-identical to the
/// payload that was stored.
pub fn raw_json(status: StatusCode, body: Vec<u8>, cache: CacheStatus) -> Response {
    (
        status,
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            ),
            (X_CACHE, cache.header_value()),
        ],
        body,
    )
        .into_response()
}

pub fn to_json_bytes<T: Serialize>(value: &T) -> AppResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| AppError::SerializationError(e.to_string()))
}

/// Decode a request body after the gates have run. An empty body is `{}`.
pub fn parse_body<T: DeserializeOwned>(body: &Bytes) -> AppResult<T> {
    let body: &[u8] = if body.iter().all(u8::is_ascii_whitespace) {
        b"{}"
    } else {
        &body[..]
    };
    serde_json::from_slice(body)
        .map_err(|e| AppError::BadRequest(format!("JSON parse error - {}", e)))
}

pub fn path_and_query(uri: &Uri) -> &str {
    uri.path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path())
}

pub fn message(text: impl Into<String>) -> Json<serde_json::Value> {
    Json(json!({ "message": text.into() }))
}

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": env!("CARGO_PKG_NAME") }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_decodes_as_empty_object() {
        let draft: serde_json::Map<String, serde_json::Value> =
            parse_body(&Bytes::from_static(b"  ")).unwrap();
        assert!(draft.is_empty());
    }

    #[test]
    fn malformed_body_is_a_bad_request() {
        let err = parse_body::<serde_json::Value>(&Bytes::from_static(b"{oops")).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    async fn status_of(uri: &str) -> StatusCode {
        use axum::{body::Body, http::Request, routing::get, Router};
        use tower::ServiceExt;

        async fn show(IdPath(id): IdPath) -> String {
            id.to_string()
        }
        let app = Router::new().route("/posts/{id}", get(show));
        let request = Request::get(uri).body(Body::empty()).unwrap();
        app.oneshot(request).await.unwrap().status()
    }

    #[tokio::test]
    async fn non_integer_id_segment_is_not_found() {
        assert_eq!(status_of("/posts/7").await, StatusCode::OK);
        assert_eq!(status_of("/posts/abc").await, StatusCode::NOT_FOUND);
    }

    #[test]
    fn cache_key_source_keeps_the_query() {
        let uri: Uri = "/posts?author=3&page=2".parse().unwrap();
        assert_eq!(path_and_query(&uri), "/posts?author=3&page=2");
    }
}
