//! HTTP handlers for object operations.
//! Streams payloads in both directions and delegates everything else to
//! `ObjectService`.

use crate::{
    errors::AppError,
    models::{NamespaceKey, ObjectId, ObjectMetadata},
    services::{ObjectLocator, ObjectService, UploadRequest},
};
use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt, channel::mpsc};
use serde::{Deserialize, Serialize};
use std::io;
use tokio_util::io::StreamReader;

const OBJECT_ID_HEADER: HeaderName = HeaderName::from_static("x-object-id");
const OBJECT_VERSION_HEADER: HeaderName = HeaderName::from_static("x-object-version");

/// Query params for `POST /v1/{group}/{partition}/objects`.
#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub path: String,
    pub name: String,
}

/// Query params for requests addressing an object by id.
#[derive(Debug, Deserialize)]
pub struct ObjectQuery {
    pub path: String,
    pub version: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub path: String,
}

/// One entry of a path listing.
#[derive(Debug, Serialize, Deserialize)]
pub struct ObjectSummary {
    pub id: ObjectId,
    pub name: String,
    pub path: String,
    pub latest_version: Option<u64>,
    pub versions: usize,
    pub size: u64,
    pub modified_at: DateTime<Utc>,
}

impl From<&ObjectMetadata> for ObjectSummary {
    fn from(meta: &ObjectMetadata) -> Self {
        Self {
            id: meta.id,
            name: meta.name.clone(),
            path: meta.path.clone(),
            latest_version: meta.last_version().map(|v| v.number),
            versions: meta.versions.len(),
            size: meta.size(),
            modified_at: meta.modified_at,
        }
    }
}

fn locator(group: String, partition: String, path: String, object_id: ObjectId) -> ObjectLocator {
    ObjectLocator {
        group,
        partition,
        path,
        object_id,
    }
}

fn content_length(headers: &HeaderMap) -> Result<u64, AppError> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .ok_or_else(|| AppError::new(StatusCode::LENGTH_REQUIRED, "Content-Length is required"))
}

fn body_reader(body: Body) -> StreamReader<impl futures::Stream<Item = io::Result<Bytes>>, Bytes> {
    let stream = body.into_data_stream().map(|chunk| chunk.map_err(io::Error::other));
    StreamReader::new(stream)
}

/// POST `/v1/{group}/{partition}/objects?path=&name=`: upload a new object,
/// or a new version of the object already stored under that name.
pub async fn upload_object(
    State(service): State<ObjectService>,
    Path((group, partition)): Path<(String, String)>,
    Query(q): Query<UploadQuery>,
    headers: HeaderMap,
    body: Body,
) -> Result<impl IntoResponse, AppError> {
    let size = content_length(&headers)?;
    let req = UploadRequest {
        key: NamespaceKey::new(group, partition, q.path, q.name),
        size,
    };
    let metadata = service.upload(req, body_reader(body)).await?;
    Ok((StatusCode::CREATED, Json(metadata)))
}

/// PUT `/v1/{group}/{partition}/objects/{object_id}?path=`: upload a new
/// version of an existing object.
pub async fn upload_version(
    State(service): State<ObjectService>,
    Path((group, partition, object_id)): Path<(String, String, ObjectId)>,
    Query(q): Query<ObjectQuery>,
    headers: HeaderMap,
    body: Body,
) -> Result<impl IntoResponse, AppError> {
    let size = content_length(&headers)?;
    let loc = locator(group, partition, q.path, object_id);
    let metadata = service.upload_version(&loc, size, body_reader(body)).await?;
    Ok((StatusCode::CREATED, Json(metadata)))
}

/// GET `/v1/{group}/{partition}/objects/{object_id}?path=[&version=]`:
/// stream the latest or a specific version.
///
/// The version is resolved before the response starts, so a missing object
/// or version is a plain 404. A failure after that point aborts the body.
pub async fn get_object(
    State(service): State<ObjectService>,
    Path((group, partition, object_id)): Path<(String, String, ObjectId)>,
    Query(q): Query<ObjectQuery>,
) -> Result<Response, AppError> {
    let loc = locator(group, partition, q.path, object_id);
    let (metadata, version) = service.resolve_version(&loc, q.version).await?;

    let (mut tx, rx) = mpsc::channel::<io::Result<Bytes>>(1);
    let size = version.size;
    let number = version.number;
    // pinned to the resolved number so a concurrent upload cannot change it
    tokio::spawn(async move {
        if let Err(err) = service.download(&loc, Some(number), &mut tx).await {
            let _ = tx.send(Err(io::Error::other(err))).await;
        }
    });

    let mut response = Response::new(Body::from_stream(rx));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(size));
    headers.insert(OBJECT_ID_HEADER, HeaderValue::from(metadata.id.as_u64()));
    headers.insert(OBJECT_VERSION_HEADER, HeaderValue::from(number));
    Ok(response)
}

/// GET `/v1/{group}/{partition}/objects/{object_id}/metadata?path=`
pub async fn get_metadata(
    State(service): State<ObjectService>,
    Path((group, partition, object_id)): Path<(String, String, ObjectId)>,
    Query(q): Query<ObjectQuery>,
) -> Result<Json<ObjectMetadata>, AppError> {
    let loc = locator(group, partition, q.path, object_id);
    Ok(Json(service.find(&loc).await?))
}

/// GET `/v1/{group}/{partition}/objects?path=`
pub async fn list_objects(
    State(service): State<ObjectService>,
    Path((group, partition)): Path<(String, String)>,
    Query(q): Query<ListQuery>,
) -> Result<Json<Vec<ObjectSummary>>, AppError> {
    let list = service.list(&group, &partition, &q.path).await?;
    Ok(Json(list.iter().map(ObjectSummary::from).collect()))
}

/// DELETE `/v1/{group}/{partition}/objects/{object_id}?path=[&version=]`:
/// delete one version, or the whole object when no version is given.
pub async fn delete_object(
    State(service): State<ObjectService>,
    Path((group, partition, object_id)): Path<(String, String, ObjectId)>,
    Query(q): Query<ObjectQuery>,
) -> Result<StatusCode, AppError> {
    let loc = locator(group, partition, q.path, object_id);
    service.delete(&loc, q.version).await?;
    Ok(StatusCode::NO_CONTENT)
}
