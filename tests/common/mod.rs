//! In-process mock of the archive backend for integration tests.
//!
//! Serves `/search`, `/video/{id}` and `/video/decrypted/{id}` on an
//! ephemeral port with the same auth and response conventions as the real
//! server. A few magic filter values trigger the awkward paths:
//!
//! | Query | Response |
//! |-------|----------|
//! | `date=bad` | 400 `{"error": "Invalid format. ..."}` |
//! | `plate=LEGACY` | 200 bare array (legacy shape) |
//! | `plate=BOOM` | 500 with a non-JSON body |
//! | `camera_id=slow` | sleeps 400ms, then one result `slow` |
//! | `camera_id=fast` | one result `fast` |

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, RawQuery, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

pub const TOKEN: &str = "test-token";
pub const CLIP_LEN: usize = 4096;
pub const INVALID_FORMAT: &str = "Invalid format. Use Date: YYYY-MM-DD, Time: HH:MM:SS";

#[derive(Clone, Default)]
struct Recorder {
    queries: Arc<Mutex<Vec<String>>>,
    ranges: Arc<Mutex<Vec<Option<String>>>>,
}

pub struct MockBackend {
    pub base_url: String,
    recorder: Recorder,
}

impl MockBackend {
    /// Raw query strings received by `/search`, in arrival order.
    pub fn queries(&self) -> Vec<String> {
        self.recorder.queries.lock().unwrap().clone()
    }

    /// `Range` headers received by the video routes.
    pub fn ranges(&self) -> Vec<Option<String>> {
        self.recorder.ranges.lock().unwrap().clone()
    }
}

/// Deterministic clip bytes served for every known video.
pub fn clip_bytes() -> Vec<u8> {
    (0..CLIP_LEN).map(|i| (i % 251) as u8).collect()
}

fn catalog() -> Vec<Value> {
    vec![
        json!({
            "video_id": "v1",
            "filename": "cam_01_20240301_0900.enc",
            "upload_date_ist": "2024-03-01 09:00:00",
            "camera_id": "cam_01",
            "plates_found": ["KA01AB1234"],
            "file_size": CLIP_LEN,
        }),
        json!({
            "video_id": "v2",
            "filename": "cam_01_20240301_1430.enc",
            "upload_date_ist": "2024-03-01 14:30:00",
            "camera_id": "cam_01",
            "plates_found": [],
            "file_size": CLIP_LEN,
        }),
        json!({
            "video_id": "v3",
            "filename": "cam_02_20240302_0815.enc",
            "upload_date_ist": "2024-03-02 08:15:00",
            "camera_id": "cam_02",
            "plates_found": ["MH12XY999"],
            "file_size": CLIP_LEN,
        }),
    ]
}

fn authorized(headers: &HeaderMap) -> bool {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bearer {}", TOKEN))
        .unwrap_or(false);
    let cookie = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').any(|c| c.trim() == format!("token={}", TOKEN)))
        .unwrap_or(false);
    bearer || cookie
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"message": "Token is missing!"})),
    )
        .into_response()
}

fn single(id: &str) -> Value {
    json!({
        "video_id": id,
        "filename": format!("{}.enc", id),
        "upload_date_ist": "2024-03-01 10:00:00",
        "camera_id": id,
    })
}

async fn search(
    State(recorder): State<Recorder>,
    headers: HeaderMap,
    RawQuery(raw): RawQuery,
) -> Response {
    let raw = raw.unwrap_or_default();
    recorder.queries.lock().unwrap().push(raw.clone());

    if !authorized(&headers) {
        return unauthorized();
    }

    let params: HashMap<String, String> = url::form_urlencoded::parse(raw.as_bytes())
        .into_owned()
        .collect();
    let param = |key: &str| params.get(key).map(String::as_str);

    if param("date") == Some("bad") {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": INVALID_FORMAT})),
        )
            .into_response();
    }
    if param("plate") == Some("LEGACY") {
        return Json(json!([single("legacy")])).into_response();
    }
    if param("plate") == Some("BOOM") {
        return (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response();
    }
    match param("camera_id") {
        Some("slow") => {
            tokio::time::sleep(Duration::from_millis(400)).await;
            return Json(json!({"results": [single("slow")], "total": 3, "filtered": 1}))
                .into_response();
        }
        Some("fast") => {
            return Json(json!({"results": [single("fast")], "total": 3, "filtered": 1}))
                .into_response();
        }
        _ => {}
    }

    let all = catalog();
    let total = all.len();
    let results: Vec<Value> = all
        .into_iter()
        .filter(|v| {
            param("date")
                .map(|d| v["upload_date_ist"].as_str().unwrap_or("").starts_with(d))
                .unwrap_or(true)
        })
        .filter(|v| {
            param("camera_id")
                .map(|c| v["camera_id"] == c)
                .unwrap_or(true)
        })
        .filter(|v| {
            param("plate")
                .map(|p| {
                    v["plates_found"]
                        .as_array()
                        .map(|plates| {
                            plates.iter().any(|pl| {
                                pl.as_str()
                                    .unwrap_or("")
                                    .to_uppercase()
                                    .contains(&p.to_uppercase())
                            })
                        })
                        .unwrap_or(false)
                })
                .unwrap_or(true)
        })
        .collect();

    Json(json!({
        "total": total,
        "filtered": results.len(),
        "results": results,
    }))
    .into_response()
}

fn parse_range(value: &str, len: usize) -> Option<(usize, usize)> {
    let bounds = value.strip_prefix("bytes=")?;
    let (start, end) = bounds.split_once('-')?;
    let start: usize = start.parse().ok()?;
    let end: usize = if end.is_empty() {
        len - 1
    } else {
        end.parse::<usize>().ok()?.min(len - 1)
    };
    if start > end {
        return None;
    }
    Some((start, end))
}

async fn video(State(recorder): State<Recorder>, headers: HeaderMap, id: String) -> Response {
    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    recorder.ranges.lock().unwrap().push(range.clone());

    if !authorized(&headers) {
        return unauthorized();
    }
    if !catalog().iter().any(|v| v["video_id"] == id.as_str()) {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "Video not found"})),
        )
            .into_response();
    }

    let bytes = clip_bytes();
    match range {
        Some(value) => match parse_range(&value, bytes.len()) {
            Some((start, end)) => (
                StatusCode::PARTIAL_CONTENT,
                [
                    (header::CONTENT_TYPE, "video/mp4".to_string()),
                    (header::ACCEPT_RANGES, "bytes".to_string()),
                    (
                        header::CONTENT_RANGE,
                        format!("bytes {}-{}/{}", start, end, bytes.len()),
                    ),
                ],
                bytes[start..=end].to_vec(),
            )
                .into_response(),
            None => (
                StatusCode::RANGE_NOT_SATISFIABLE,
                [(header::CONTENT_RANGE, format!("bytes */{}", bytes.len()))],
            )
                .into_response(),
        },
        None => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "video/mp4".to_string()),
                (header::ACCEPT_RANGES, "bytes".to_string()),
            ],
            bytes,
        )
            .into_response(),
    }
}

async fn raw_video(
    state: State<Recorder>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    video(state, headers, id).await
}

async fn decrypted_video(
    state: State<Recorder>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    video(state, headers, id).await
}

/// Start the mock backend on an ephemeral port.
pub async fn spawn_backend() -> MockBackend {
    let recorder = Recorder::default();
    let app = Router::new()
        .route("/search", get(search))
        .route("/video/decrypted/{id}", get(decrypted_video))
        .route("/video/{id}", get(raw_video))
        .with_state(recorder.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockBackend {
        base_url: format!("http://{}", addr),
        recorder,
    }
}
