//! Defines routes for all object operations.
//!
//! ## Structure
//! - **Health**
//!   - `GET    /healthz`: liveness
//!   - `GET    /readyz`: readiness of both storage tiers
//!
//! - **Objects**, scoped by `{group}/{partition}` and the `path` query param
//!   - `POST   /v1/{group}/{partition}/objects?path=&name=`: upload (new object or new version)
//!   - `GET    /v1/{group}/{partition}/objects?path=`: list objects on a path
//!   - `PUT    /v1/{group}/{partition}/objects/{object_id}?path=`: upload a new version by id
//!   - `GET    /v1/{group}/{partition}/objects/{object_id}?path=[&version=]`: download
//!   - `DELETE /v1/{group}/{partition}/objects/{object_id}?path=[&version=]`: delete object or version
//!   - `GET    /v1/{group}/{partition}/objects/{object_id}/metadata?path=`: metadata

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        object_handlers::{
            delete_object, get_metadata, get_object, list_objects, upload_object, upload_version,
        },
    },
    services::ObjectService,
};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Build the router. Handlers share the `ObjectService` state.
pub fn routes() -> Router<ObjectService> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route(
            "/v1/{group}/{partition}/objects",
            post(upload_object).get(list_objects),
        )
        .route(
            "/v1/{group}/{partition}/objects/{object_id}",
            put(upload_version).get(get_object).delete(delete_object),
        )
        .route(
            "/v1/{group}/{partition}/objects/{object_id}/metadata",
            get(get_metadata),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::object_handlers::ObjectSummary;
    use crate::models::ObjectMetadata;
    use crate::storage::{InMemoryBlockStorage, InMemoryMetadataRegistry};
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use axum::response::Response;
    use std::sync::Arc;
    use tower::util::ServiceExt;

    fn app() -> Router {
        let service = ObjectService::new(
            Arc::new(InMemoryBlockStorage::new()),
            Arc::new(InMemoryMetadataRegistry::new()),
            4,
        );
        routes().with_state(service)
    }

    async fn send(app: &Router, req: Request<Body>) -> Response {
        app.clone().oneshot(req).await.unwrap()
    }

    fn upload(uri: &str, method: &str, content: &'static [u8]) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_LENGTH, content.len())
            .body(Body::from(content))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body(resp: Response) -> Vec<u8> {
        to_bytes(resp.into_body(), usize::MAX).await.unwrap().to_vec()
    }

    async fn json<T: serde::de::DeserializeOwned>(resp: Response) -> T {
        serde_json::from_slice(&body(resp).await).unwrap()
    }

    #[tokio::test]
    async fn health_endpoints() {
        let app = app();
        assert_eq!(send(&app, get("/healthz")).await.status(), StatusCode::OK);
        assert_eq!(send(&app, get("/readyz")).await.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn upload_version_and_download_over_http() {
        let app = app();
        let resp = send(
            &app,
            upload("/v1/g1/p1/objects?path=/docs&name=a.txt", "POST", b"hello world"),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let first: ObjectMetadata = json(resp).await;
        let id = first.id;

        let resp = send(
            &app,
            upload(&format!("/v1/g1/p1/objects/{id}?path=/docs"), "PUT", b"HELLO WORLD!!"),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let second: ObjectMetadata = json(resp).await;
        assert_eq!(second.versions.len(), 2);

        let resp = send(&app, get(&format!("/v1/g1/p1/objects/{id}?path=/docs"))).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["x-object-version"], "1");
        assert_eq!(body(resp).await, b"HELLO WORLD!!");

        let resp = send(
            &app,
            get(&format!("/v1/g1/p1/objects/{id}?path=/docs&version=0")),
        )
        .await;
        assert_eq!(body(resp).await, b"hello world");

        let resp = send(&app, get("/v1/g1/p1/objects?path=/docs")).await;
        let list: Vec<ObjectSummary> = json(resp).await;
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].latest_version, Some(1));
        assert_eq!(list[0].size, 13);
    }

    #[tokio::test]
    async fn missing_objects_and_bad_requests() {
        let app = app();
        let resp = send(&app, get("/v1/g1/p1/objects/42?path=/docs")).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = send(&app, get("/v1/g1/p1/objects/0?path=/docs")).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = send(
            &app,
            upload("/v1/g1/p1/objects?path=/docs&name=a.txt", "POST", b""),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = send(
            &app,
            Request::builder()
                .method("POST")
                .uri("/v1/g1/p1/objects?path=/docs&name=a.txt")
                .body(Body::from("no length"))
                .unwrap(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::LENGTH_REQUIRED);
    }

    #[tokio::test]
    async fn delete_version_then_object() {
        let app = app();
        let resp = send(
            &app,
            upload("/v1/g1/p1/objects?path=/docs&name=a.txt", "POST", b"one"),
        )
        .await;
        let meta: ObjectMetadata = json(resp).await;
        let id = meta.id;
        send(
            &app,
            upload("/v1/g1/p1/objects?path=/docs&name=a.txt", "POST", b"two"),
        )
        .await;

        let delete = |uri: String| {
            Request::builder()
                .method("DELETE")
                .uri(uri)
                .body(Body::empty())
                .unwrap()
        };

        let resp = send(&app, delete(format!("/v1/g1/p1/objects/{id}?path=/docs&version=0"))).await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        let resp = send(&app, get(&format!("/v1/g1/p1/objects/{id}/metadata?path=/docs"))).await;
        let meta: ObjectMetadata = json(resp).await;
        assert_eq!(meta.versions.len(), 1);
        assert_eq!(meta.versions[0].number, 1);

        let resp = send(&app, delete(format!("/v1/g1/p1/objects/{id}?path=/docs"))).await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        let resp = send(&app, get(&format!("/v1/g1/p1/objects/{id}/metadata?path=/docs"))).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
