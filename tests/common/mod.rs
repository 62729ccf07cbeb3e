//! Common test utilities for webhook delivery tests.
//!
//! Provides wiremock responders, fixture ids, and signature helpers for
//! verifying delivery behavior.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use uuid::Uuid;
use wiremock::{Request, Respond, ResponseTemplate};

use assettrack_webhooks::crypto;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub const TENANT_A: Uuid = Uuid::from_bytes([
    0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11,
]);

pub const TENANT_B: Uuid = Uuid::from_bytes([
    0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22,
]);

pub const SECRET_1: &str = "whsec_test_secret_key_12345";

/// 32-byte AES key for secrets at rest in tests.
pub fn test_encryption_key() -> Vec<u8> {
    vec![0x42u8; 32]
}

/// HTTP client mirroring production delivery settings.
pub fn test_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .user_agent("AssetTrack-Webhooks/1.0")
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("client builds")
}

/// The expected signature header for a body under a secret.
pub fn expected_signature(secret: &str, body: &[u8]) -> String {
    crypto::sign_payload(Some(secret), body)
}

// ---------------------------------------------------------------------------
// CapturedRequest - for inspecting webhook requests
// ---------------------------------------------------------------------------

/// A captured HTTP request with body and headers.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub body: Vec<u8>,
    pub headers: HashMap<String, String>,
}

impl CapturedRequest {
    /// Parse the body as JSON.
    pub fn body_json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Get a header value by name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        let name_lower = name.to_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| k.to_lowercase() == name_lower)
            .map(|(_, v)| v.as_str())
    }
}

// ---------------------------------------------------------------------------
// CaptureResponder - captures requests and returns a fixed status
// ---------------------------------------------------------------------------

/// A wiremock responder that captures incoming requests.
#[derive(Clone)]
pub struct CaptureResponder {
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
    response_code: u16,
    response_body: String,
}

impl CaptureResponder {
    /// Capture responder returning 200 OK.
    pub fn new() -> Self {
        Self::with_status(200)
    }

    /// Capture responder returning a custom status code.
    pub fn with_status(status: u16) -> Self {
        Self {
            requests: Arc::new(Mutex::new(Vec::new())),
            response_code: status,
            response_body: String::new(),
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.response_body = body.into();
        self
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl Default for CaptureResponder {
    fn default() -> Self {
        Self::new()
    }
}

impl Respond for CaptureResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let captured = CapturedRequest {
            body: request.body.clone(),
            headers: request
                .headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
                .collect(),
        };
        self.requests.lock().unwrap().push(captured);
        ResponseTemplate::new(self.response_code).set_body_string(self.response_body.clone())
    }
}

// ---------------------------------------------------------------------------
// FlakyResponder - fails N times, then succeeds
// ---------------------------------------------------------------------------

/// Responder that returns `fail_status` for the first N requests, then 200.
#[derive(Clone)]
pub struct FlakyResponder {
    counter: Arc<AtomicU32>,
    failures: u32,
    fail_status: u16,
}

impl FlakyResponder {
    pub fn new(failures: u32, fail_status: u16) -> Self {
        Self {
            counter: Arc::new(AtomicU32::new(0)),
            failures,
            fail_status,
        }
    }

    pub fn request_count(&self) -> u32 {
        self.counter.load(Ordering::SeqCst)
    }
}

impl Respond for FlakyResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            ResponseTemplate::new(self.fail_status)
        } else {
            ResponseTemplate::new(200)
        }
    }
}
