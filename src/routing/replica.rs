//! Replica identity and the buffered request/response exchanged with it.

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};

pub use crate::config::ReplicaDescriptor;
use crate::registry::ServiceRecord;

impl ReplicaDescriptor {
    /// Stable breaker key: `host:port`.
    pub fn id(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Absolute URI for `path_and_query` on this replica.
    pub fn uri_for(&self, path_and_query: &str) -> Result<Uri, axum::http::uri::InvalidUri> {
        format!("http://{}:{}{}", self.host, self.port, path_and_query).parse()
    }
}

impl From<ServiceRecord> for ReplicaDescriptor {
    fn from(record: ServiceRecord) -> Self {
        Self::new(record.address, record.port)
    }
}

/// A request ready to be replayed against any replica.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: Method,
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// A fully buffered replica response.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Id of the replica that produced the response.
    pub replica: String,
}

impl IntoResponse for UpstreamResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}
