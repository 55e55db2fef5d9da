#![allow(dead_code)]

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, Response};
use prescription_service::config::{GeminiSettings, PrescriptionConfig, DEFAULT_GEMINI_MODEL};
use prescription_service::services::providers::mock::{MockModel, MockModelFactory};
use prescription_service::services::providers::ModelClientFactory;
use prescription_service::startup::{build_router, AppState};
use service_core::config::{Config as CoreConfig, Environment};
use std::sync::Arc;
use std::time::Duration;

pub const BOUNDARY: &str = "prescription-test-boundary";

pub const PNG_SIGNATURE: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

pub const VALID_OUTPUT: &str = r#"{"medicine":[{"name":"Amoxicillin","dosage":"500mg"},{"name":"Paracetamol","dosage":null}],"causes":["bacterial infection","fever"],"fatality":3}"#;

pub fn test_config(port: u16) -> PrescriptionConfig {
    PrescriptionConfig {
        common: CoreConfig {
            port,
            environment: Environment::Dev,
        },
        service_name: "prescription-service".to_string(),
        log_level: "debug".to_string(),
        gemini: GeminiSettings {
            api_key: "test-api-key".to_string(),
            model: DEFAULT_GEMINI_MODEL.to_string(),
        },
    }
}

pub fn state_with_factory(factory: Arc<dyn ModelClientFactory>) -> AppState {
    AppState {
        config: Arc::new(test_config(0)),
        model_factory: factory,
    }
}

pub fn router_with(model: Arc<MockModel>) -> axum::Router {
    build_router(state_with_factory(Arc::new(MockModelFactory::new(model))))
}

pub fn png_bytes() -> Vec<u8> {
    let mut bytes = PNG_SIGNATURE.to_vec();
    bytes.extend_from_slice(b"\x00\x00\x00\rIHDR\x00\x00\x00\x10\x00\x00\x00\x10\x08\x06\x00\x00\x00");
    bytes.extend(std::iter::repeat(0x42).take(1024));
    bytes
}

pub fn jpeg_bytes() -> Vec<u8> {
    let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];
    bytes.extend_from_slice(b"JFIF\x00");
    bytes.extend(std::iter::repeat(0x11).take(512));
    bytes
}

/// One multipart part: field name, optional file name, content.
pub struct Part<'a> {
    pub name: &'a str,
    pub file_name: Option<&'a str>,
    pub content: &'a [u8],
}

pub fn file_part<'a>(content: &'a [u8], file_name: &'a str) -> Part<'a> {
    Part {
        name: "file",
        file_name: Some(file_name),
        content,
    }
}

pub fn text_part<'a>(name: &'a str, value: &'a str) -> Part<'a> {
    Part {
        name,
        file_name: None,
        content: value.as_bytes(),
    }
}

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part.file_name {
            Some(file_name) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                        part.name, file_name
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(b"Content-Type: image/png\r\n\r\n");
            }
            None => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", part.name)
                        .as_bytes(),
                );
            }
        }
        body.extend_from_slice(part.content);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn multipart_request(parts: &[Part<'_>]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/v1/drugs")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

pub fn json_request(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/v1/drugs")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Deletion runs on a detached task; give it a moment to land.
pub async fn wait_for_deletions(model: &MockModel, expected: usize) -> Vec<String> {
    for _ in 0..100 {
        let deleted = model.deleted_assets();
        if deleted.len() >= expected {
            return deleted;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    model.deleted_assets()
}
