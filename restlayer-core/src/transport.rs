//! Transport abstraction for the remote store.
//!
//! The record layer never performs HTTP itself. It prepares requests against
//! a [`Transport`] collaborator and interprets the [`Response`] envelope.
//! Implementations are required to be thread-safe (`Send + Sync`) and may be
//! anything from a real HTTP client with retry middleware to the in-memory
//! server used in tests.

use async_trait::async_trait;
use serde_json::Value;
use std::fmt::Debug;

use crate::error::RecordLayerResult;

/// Request methods understood by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

/// The response envelope every transport call resolves to.
///
/// Application-level failures (a 404, a validation rejection) surface as
/// `success: false` with an error message, not as an `Err` — `Err` is
/// reserved for the transport itself breaking down.
#[derive(Debug, Clone)]
pub struct Response {
    /// Whether the request succeeded at the application level.
    pub success: bool,
    /// HTTP status code reported by the store.
    pub http_status: u16,
    /// Error message for failed requests.
    pub error: Option<String>,
    /// The response body; a field-value map for record operations.
    pub result: Value,
}

impl Response {
    /// A successful response carrying the given body.
    pub fn ok(result: Value) -> Self {
        Self {
            success: true,
            http_status: 200,
            error: None,
            result,
        }
    }

    /// A failed response with the given status and message.
    pub fn failure(http_status: u16, error: impl Into<String>) -> Self {
        Self {
            success: false,
            http_status,
            error: Some(error.into()),
            result: Value::Null,
        }
    }

    /// The result body as an object map, when it is one.
    pub fn result_object(&self) -> Option<&serde_json::Map<String, Value>> {
        self.result.as_object()
    }
}

/// Abstract interface to the remote store.
///
/// Paths follow the store's conventions: `classes/{ClassName}` for creation
/// and queries, `classes/{ClassName}/{objectId}` for per-record operations.
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    /// Issues one request and resolves to its response envelope.
    ///
    /// # Arguments
    ///
    /// * `method` - The request method
    /// * `path` - The store-relative path
    /// * `body` - JSON request body, when the method carries one
    /// * `query` - Query parameters as a JSON object
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        query: Option<Value>,
    ) -> RecordLayerResult<Response>;
}

#[async_trait]
impl<T> Transport for &T
where
    T: Transport,
{
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        query: Option<Value>,
    ) -> RecordLayerResult<Response> {
        (*self)
            .send(method, path, body, query)
            .await
    }
}

/// The path for class-level operations (create, query).
pub fn class_path(class_name: &str) -> String {
    format!("classes/{class_name}")
}

/// The path for record-level operations (fetch, update, delete).
pub fn record_path(class_name: &str, object_id: &str) -> String {
    format!("classes/{class_name}/{object_id}")
}
