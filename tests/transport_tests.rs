//! End-to-end tests against a local HTTP server.

use futures::StreamExt;
use integrations_genai::config::{Environment, HttpOptions};
use integrations_genai::error::{GenAiError, NetworkError};
use integrations_genai::transport::{
    HttpMethod, HttpRequest, HttpTransport, RequestBody, ReqwestTransport, TransportSettings,
};
use integrations_genai::ApiClient;
use secrecy::SecretString;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn setup_mock_server() -> MockServer {
    MockServer::start().await
}

fn client_for(server: &MockServer) -> ApiClient {
    ApiClient::builder()
        .environment(Environment::default())
        .api_key(SecretString::new("test-api-key".into()))
        .http_options(HttpOptions::default().with_base_url(server.uri()))
        .transport(Arc::new(ReqwestTransport::new(&TransportSettings::default()).unwrap()))
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_unstreamed_request_round_trip() {
    let server = setup_mock_server().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini:generateContent"))
        .and(header("x-goog-api-key", "test-api-key"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({"contents": [{"parts": [{"text": "hi"}]}]})))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-request-id", "abc")
                .set_body_json(json!({"candidates": [{"index": 0}]})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut body = Map::new();
    body.insert("contents".into(), json!([{"parts": [{"text": "hi"}]}]));
    let response = client_for(&server)
        .async_request(HttpMethod::Post, "models/gemini:generateContent", body, None)
        .await
        .unwrap();

    assert_eq!(response.header("x-request-id"), Some("abc"));
    assert_eq!(response.json::<Value>().unwrap(), json!({"candidates": [{"index": 0}]}));
}

#[tokio::test]
async fn test_streamed_request_decodes_sse_lines() {
    let server = setup_mock_server().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini:streamGenerateContent"))
        .and(query_param("alt", "sse"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string("data: {\"n\":1}\r\n\r\ndata: {\"n\":2}\r\n\r\n"),
        )
        .mount(&server)
        .await;

    let stream = client_for(&server)
        .async_request_streamed(
            HttpMethod::Post,
            "models/gemini:streamGenerateContent?alt=sse",
            Map::new(),
            None,
        )
        .await
        .unwrap();
    let records: Vec<Value> = stream.map(|r| r.unwrap().json::<Value>().unwrap()).collect().await;

    assert_eq!(records, vec![json!({"n": 1}), json!({"n": 2})]);
}

#[tokio::test]
async fn test_error_body_becomes_api_error() {
    let server = setup_mock_server().await;
    Mock::given(method("GET"))
        .and(path("/v1beta/models/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {"code": 404, "message": "Model not found", "status": "NOT_FOUND"}
        })))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .async_request(HttpMethod::Get, "models/missing", Map::new(), None)
        .await
        .unwrap_err();

    match err {
        GenAiError::Api(api) => {
            assert_eq!(api.code, 404);
            assert_eq!(api.status, "NOT_FOUND");
            assert_eq!(api.message, "Model not found");
        }
        other => panic!("Expected API error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_per_call_timeout_is_enforced() {
    let server = setup_mock_server().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let overrides = HttpOptions::default().with_timeout_ms(100);
    let err = client_for(&server)
        .async_request(HttpMethod::Get, "models/slow", Map::new(), Some(&overrides))
        .await
        .unwrap_err();

    assert!(matches!(err, GenAiError::Network(NetworkError::Timeout { .. })));
}

#[tokio::test]
async fn test_transport_returns_non_success_without_raising() {
    let server = setup_mock_server().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&server)
        .await;

    let transport = ReqwestTransport::new(&TransportSettings::default()).unwrap();
    let response = transport
        .send(
            HttpRequest {
                method: HttpMethod::Put,
                url: format!("{}/anything", server.uri()),
                headers: Default::default(),
                body: RequestBody::Raw(bytes::Bytes::from_static(b"payload")),
                timeout: None,
            },
            false,
        )
        .await
        .unwrap();

    assert_eq!(response.status, 503);
    assert_eq!(&response.into_bytes().await.unwrap()[..], b"unavailable");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_blocking_request_and_download() {
    let server = setup_mock_server().await;
    Mock::given(method("GET"))
        .and(path("/v1beta/files/abc:download"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8, 1, 2, 255]))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1beta/models/gemini"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "models/gemini"})))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let (bytes, model) = tokio::task::spawn_blocking(move || {
        let bytes = client.download_file("files/abc:download", None)?;
        let model = client.request(HttpMethod::Get, "models/gemini", Map::new(), None)?;
        Ok::<_, GenAiError>((bytes, model))
    })
    .await
    .unwrap()
    .unwrap();

    assert_eq!(&bytes[..], &[0u8, 1, 2, 255]);
    assert_eq!(model.json::<Value>().unwrap(), json!({"name": "models/gemini"}));
}

#[cfg(feature = "hyper-transport")]
mod hyper_backend {
    use super::*;
    use integrations_genai::transport::{BodySource, HyperTransport, TransportError};

    fn get(server: &MockServer, route: &str, timeout: Option<Duration>) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Get,
            url: format!("{}{route}", server.uri()),
            headers: Default::default(),
            body: RequestBody::default(),
            timeout,
        }
    }

    fn transport() -> HyperTransport {
        HyperTransport::new(&TransportSettings::default()).unwrap()
    }

    #[tokio::test]
    async fn test_buffered_body_round_trip() {
        let server = setup_mock_server().await;
        Mock::given(method("POST"))
            .and(path("/echo"))
            .and(header("x-custom", "1"))
            .and(body_json(json!({"a": 1})))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-request-id", "h1")
                    .set_body_json(json!({"ok": true})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut body = Map::new();
        body.insert("a".into(), json!(1));
        let response = transport()
            .send(
                HttpRequest {
                    method: HttpMethod::Post,
                    url: format!("{}/echo", server.uri()),
                    headers: [("x-custom", "1"), ("content-type", "application/json")]
                        .into_iter()
                        .collect(),
                    body: RequestBody::from(body),
                    timeout: None,
                },
                false,
            )
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.headers.get("x-request-id"), Some("h1"));
        assert!(matches!(response.body, BodySource::Buffered(_)));
        let value: Value = serde_json::from_slice(&response.into_bytes().await.unwrap()).unwrap();
        assert_eq!(value, json!({"ok": true}));
    }

    #[tokio::test]
    async fn test_live_body_streams_bytes() {
        let server = setup_mock_server().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("data: {\"n\":1}\n\ndata: {\"n\":2}\n"))
            .mount(&server)
            .await;

        let response = transport().send(get(&server, "/stream", None), true).await.unwrap();
        let BodySource::Live(mut stream) = response.body else {
            panic!("Expected a live body");
        };
        let mut collected = Vec::new();
        while let Some(chunk) = stream.next().await {
            collected.extend_from_slice(&chunk.unwrap());
        }

        assert_eq!(collected, b"data: {\"n\":1}\n\ndata: {\"n\":2}\n");
    }

    #[tokio::test]
    async fn test_non_success_is_passed_through() {
        let server = setup_mock_server().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let response = transport().send(get(&server, "/limited", None), false).await.unwrap();

        assert_eq!(response.status, 429);
        assert_eq!(&response.into_bytes().await.unwrap()[..], b"slow down");
    }

    #[tokio::test]
    async fn test_timeout_is_enforced() {
        let server = setup_mock_server().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let result = transport()
            .send(get(&server, "/slow", Some(Duration::from_millis(100))), false)
            .await;

        assert!(matches!(result, Err(TransportError::Timeout(Some(_)))));
    }
}
