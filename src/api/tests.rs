use super::*;
use crate::error::AnimaError;
use crate::events::{AnimaEvent, EventBus, EventFilter};
use crate::models::{CapturedImage, ImageEncoding, ImageSource, Track};
use crate::test_support::{api_config, spawn_stub};
use axum::extract::Query;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

fn test_image() -> CapturedImage {
    CapturedImage::new(vec![0xFF, 0xD8, 0xFF, 0xD9], ImageEncoding::Jpeg, ImageSource::Camera)
}

async fn backend_for(router: Router) -> BackendClient {
    let url = spawn_stub(router).await;
    BackendClient::new(&api_config(&url)).unwrap()
}

#[tokio::test]
async fn test_classify_success_sends_image_and_tokens() {
    let seen: Arc<Mutex<Option<(HeaderMap, Value)>>> = Arc::new(Mutex::new(None));
    let seen_clone = seen.clone();

    let router = Router::new().route(
        "/emociones/analizar",
        post(move |headers: HeaderMap, Json(body): Json<Value>| {
            let seen = seen_clone.clone();
            async move {
                *seen.lock() = Some((headers, body));
                Json(json!({
                    "emotion": {"name": "Felicidad", "icon": "😊", "confidence": 92.4},
                    "playlist": [
                        {"uri": "spotify:track:1", "name": "Happy", "artist": "A", "album": "X",
                         "albumImage": "https://img/1", "externalUrl": "https://open/1"},
                        {"uri": "spotify:track:2", "name": "Sunny", "artist": "B", "album": "Y"}
                    ]
                }))
            }
        }),
    );
    let classifier = EmotionClassifierClient::new(backend_for(router).await);

    let result = classifier
        .classify(&test_image(), "jwt-1", Some("provider-1"))
        .await
        .unwrap();

    assert_eq!(result.emotion.name, "Felicidad");
    assert_eq!(result.tracks.len(), 2);
    assert!(result.has_playlist());
    assert_eq!(result.tracks[0].album_image.as_deref(), Some("https://img/1"));

    let (headers, body) = seen.lock().take().unwrap();
    assert_eq!(headers.get("authorization").unwrap(), "Bearer jwt-1");
    assert_eq!(headers.get("x-spotify-token").unwrap(), "provider-1");
    assert_eq!(body["image"], "data:image/jpeg;base64,/9j/2Q==");
}

#[tokio::test]
async fn test_classify_server_error_carries_message() {
    let router = Router::new().route(
        "/emociones/analizar",
        post(|| async {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"message": "No se detectó ningún rostro"})),
            )
        }),
    );
    let classifier = EmotionClassifierClient::new(backend_for(router).await);

    let err = classifier.classify(&test_image(), "jwt", None).await.unwrap_err();
    match err {
        AnimaError::ClassificationFailed { reason } => {
            assert_eq!(reason, "No se detectó ningún rostro");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_classify_error_without_message_uses_default() {
    let router = Router::new().route(
        "/emociones/analizar",
        post(|| async { (StatusCode::BAD_GATEWAY, "upstream down") }),
    );
    let classifier = EmotionClassifierClient::new(backend_for(router).await);

    let err = classifier.classify(&test_image(), "jwt", None).await.unwrap_err();
    assert_eq!(err.user_message(), "No se pudo analizar la emoción");
}

#[tokio::test]
async fn test_classify_without_linked_provider_returns_empty_playlist() {
    let router = Router::new().route(
        "/emociones/analizar",
        post(|headers: HeaderMap| async move {
            assert_eq!(headers.get("x-spotify-token").unwrap(), "");
            Json(json!({
                "emotion": {"name": "Calma", "icon": "😌", "confidence": 70.0},
                "playlist": null
            }))
        }),
    );
    let classifier = EmotionClassifierClient::new(backend_for(router).await);

    let result = classifier.classify(&test_image(), "jwt", None).await.unwrap();
    assert_eq!(result.emotion.name, "Calma");
    assert!(!result.has_playlist());
}

#[tokio::test]
async fn test_classify_unreachable_backend_is_network_error() {
    // Bind then drop to get a port with nothing listening
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let backend = BackendClient::new(&api_config(&format!("http://{}", addr))).unwrap();
    let classifier = EmotionClassifierClient::new(backend);

    let err = classifier.classify(&test_image(), "jwt", None).await.unwrap_err();
    assert!(matches!(err, AnimaError::Network { .. }), "got {err:?}");
    assert_eq!(err.user_message(), "Error al conectar con el servidor");
}

fn recorder(backend: BackendClient, tokens: TokenStore, bus: Arc<EventBus>) -> HistoryRecorder {
    HistoryRecorder::new(backend, tokens, bus, 5)
}

#[tokio::test]
async fn test_record_posts_track_and_refreshes_recent() {
    let posted: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
    let posted_clone = posted.clone();

    let router = Router::new()
        .route(
            "/api/playback/add",
            post(move |Json(body): Json<Value>| {
                let posted = posted_clone.clone();
                async move {
                    posted.lock().push(body);
                    Json(json!({"success": true}))
                }
            }),
        )
        .route(
            "/api/playback/recent",
            get(|| async {
                Json(json!({
                    "success": true,
                    "tracks": [
                        {"trackUri": "spotify:track:9", "trackName": "Old", "artist": "Z",
                         "album": "Q", "playedAt": "2024-05-01T10:00:00Z"}
                    ]
                }))
            }),
        );
    let tokens = TokenStore::new();
    tokens.set_backend("jwt");
    let bus = Arc::new(EventBus::new(16));
    let mut events = bus.subscribe_filtered(
        EventFilter::EventTypes(vec!["history_recorded"]),
        "test",
    );
    let history = recorder(backend_for(router).await, tokens, bus);

    let mut track = Track::new("spotify:track:1", "Happy");
    track.artist = "A".to_string();
    assert!(history.record(&track).await);

    let body = posted.lock()[0].clone();
    assert_eq!(body["trackUri"], "spotify:track:1");
    assert_eq!(body["trackName"], "Happy");
    assert_eq!(body["artist"], "A");

    match events.recv().await.unwrap() {
        AnimaEvent::HistoryRecorded { track_uri } => assert_eq!(track_uri, "spotify:track:1"),
        other => panic!("Unexpected event: {:?}", other),
    }
    let cached = history.cached_recent();
    assert_eq!(cached.len(), 1);
    assert_eq!(cached[0].track.name, "Old");
}

#[tokio::test]
async fn test_record_failure_is_swallowed() {
    let router = Router::new().route(
        "/api/playback/add",
        post(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
    );
    let tokens = TokenStore::new();
    tokens.set_backend("jwt");
    let history = recorder(backend_for(router).await, tokens, Arc::new(EventBus::new(16)));

    assert!(!history.record(&Track::new("spotify:track:1", "Happy")).await);
}

#[tokio::test]
async fn test_record_without_token_skips_request() {
    let hits = Arc::new(Mutex::new(0usize));
    let hits_clone = hits.clone();
    let router = Router::new().route(
        "/api/playback/add",
        post(move || {
            let hits = hits_clone.clone();
            async move {
                *hits.lock() += 1;
                StatusCode::OK
            }
        }),
    );
    let history = recorder(
        backend_for(router).await,
        TokenStore::new(),
        Arc::new(EventBus::new(16)),
    );

    assert!(!history.record(&Track::new("spotify:track:1", "Happy")).await);
    assert_eq!(*hits.lock(), 0);
}

#[tokio::test]
async fn test_recent_sorts_newest_first_and_limits() {
    let router = Router::new().route(
        "/api/playback/recent",
        get(|Query(params): Query<HashMap<String, String>>| async move {
            assert_eq!(params.get("limit").map(String::as_str), Some("2"));
            Json(json!({
                "success": true,
                "tracks": [
                    {"trackUri": "spotify:track:1", "trackName": "A", "playedAt": "2024-05-01T10:00:00Z"},
                    {"trackUri": "spotify:track:2", "trackName": "B", "playedAt": "2024-05-03T10:00:00Z"},
                    {"trackUri": "spotify:track:3", "trackName": "C", "playedAt": "2024-05-02T10:00:00Z"}
                ]
            }))
        }),
    );
    let tokens = TokenStore::new();
    tokens.set_backend("jwt");
    let history = recorder(backend_for(router).await, tokens, Arc::new(EventBus::new(16)));

    let recent = history.recent(2).await.unwrap();
    let names: Vec<_> = recent.iter().map(|r| r.track.name.as_str()).collect();
    assert_eq!(names, vec!["B", "C"]);
}

#[tokio::test]
async fn test_recent_absent_list_is_empty() {
    let router = Router::new()
        .route(
            "/api/playback/recent",
            get(|| async { Json(json!({"success": false})) }),
        );
    let tokens = TokenStore::new();
    tokens.set_backend("jwt");
    let history = recorder(backend_for(router).await, tokens, Arc::new(EventBus::new(16)));

    assert!(history.recent(5).await.unwrap().is_empty());
    assert!(history.refresh().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_recent_requires_backend_token() {
    let history = recorder(
        backend_for(Router::new()).await,
        TokenStore::new(),
        Arc::new(EventBus::new(16)),
    );
    assert!(matches!(
        history.recent(5).await,
        Err(AnimaError::MissingToken { .. })
    ));
}

#[tokio::test]
async fn test_emotion_history_sends_period_and_parses_records() {
    let router = Router::new()
        .route(
            "/emociones/historial",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                assert_eq!(params.get("periodo").map(String::as_str), Some("semana"));
                Json(json!({
                    "historial": [
                        {"id": 1, "emocion_detectada": "Felicidad", "confianza": "90.00",
                         "fecha_analisis": "2024-05-02T10:00:00Z"},
                        {"id": 2, "emocion_detectada": "Tristeza", "confianza": 60,
                         "fecha_analisis": "2024-05-01T10:00:00Z"}
                    ]
                }))
            }),
        )
        .route(
            "/emociones/stats",
            get(|| async { Json(json!({"estadisticas": {"total": 2}})) }),
        );
    let client = EmotionHistoryClient::new(backend_for(router).await);

    let records = client
        .history(&HistoryQuery::period("semana"), "jwt")
        .await
        .unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].confidence, 90.0);
    assert_eq!(records[1].emotion, "Tristeza");

    let stats = client.stats("jwt").await.unwrap();
    assert_eq!(stats["total"], 2);
}

#[tokio::test]
async fn test_emotion_history_pagination_params() {
    let router = Router::new().route(
        "/emociones/historial",
        get(|Query(params): Query<HashMap<String, String>>| async move {
            assert_eq!(params.get("limit").map(String::as_str), Some("9"));
            assert_eq!(params.get("offset").map(String::as_str), Some("18"));
            assert!(!params.contains_key("periodo"));
            Json(json!({}))
        }),
    );
    let client = EmotionHistoryClient::new(backend_for(router).await);

    let records = client
        .history(&HistoryQuery::page(9, 18), "jwt")
        .await
        .unwrap();
    assert!(records.is_empty());
}
