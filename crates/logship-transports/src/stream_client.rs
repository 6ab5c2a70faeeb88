// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP client for the partitioned stream service.
//!
//! Streams are looked up, created on demand and fed sub-batches of encoded
//! transfer batches. A freshly created stream is not writable until the
//! service reports it ACTIVE, so callers poll [`StreamClient::wait_until_active`]
//! before the first put.

use logship::TransportError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub const DESCRIBE_STREAM_PATH: &str = "/streams/describe";
pub const CREATE_STREAM_PATH: &str = "/streams/create";
pub const PUT_RECORDS_PATH: &str = "/streams/put_records";

pub const STREAM_STATUS_ACTIVE: &str = "ACTIVE";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const ACTIVE_POLL_INTERVAL: Duration = Duration::from_secs(1);
const ACTIVE_POLL_ATTEMPTS: usize = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamDescription {
    pub name: String,
    pub status: String,
    pub shard_count: i32,
}

/// One record in a put call: the encoded batch plus the key that picks its
/// partition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutRecordsEntry {
    pub data: String,
    pub partition_key: String,
}

#[derive(Debug, Serialize)]
struct DescribeStreamRequest<'a> {
    name: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateStreamRequest<'a> {
    name: &'a str,
    shard_count: i32,
}

#[derive(Debug, Serialize)]
struct PutRecordsRequest<'a> {
    name: &'a str,
    records: &'a [PutRecordsEntry],
}

pub struct StreamClient {
    http: reqwest::Client,
    base_url: String,
}

impl StreamClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, TransportError> {
        let base_url = base_url.into();
        if base_url.is_empty() {
            return Err(TransportError::InvalidConfig(
                "logging config invalid - missing stream endpoint".to_string(),
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| TransportError::Init(format!("failed to build http client: {}", err)))?;
        Ok(StreamClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Looks a stream up by name; `None` when the service has no such stream.
    pub async fn describe_stream(
        &self,
        name: &str,
    ) -> Result<Option<StreamDescription>, TransportError> {
        let url = format!("{}{}", self.base_url, DESCRIBE_STREAM_PATH);
        let response = self
            .http
            .post(&url)
            .json(&DescribeStreamRequest { name })
            .send()
            .await
            .map_err(|err| TransportError::Request(err.to_string()))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(TransportError::Request(format!(
                "stream service returned {}",
                response.status()
            )));
        }
        let description = response
            .json::<StreamDescription>()
            .await
            .map_err(|err| TransportError::Request(format!("bad stream response: {}", err)))?;
        Ok(Some(description))
    }

    pub async fn create_stream(&self, name: &str, shard_count: i32) -> Result<(), TransportError> {
        let url = format!("{}{}", self.base_url, CREATE_STREAM_PATH);
        let response = self
            .http
            .post(&url)
            .json(&CreateStreamRequest { name, shard_count })
            .send()
            .await
            .map_err(|err| TransportError::Request(err.to_string()))?;
        if !response.status().is_success() {
            return Err(TransportError::Request(format!(
                "stream create returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    pub async fn put_records(
        &self,
        name: &str,
        records: &[PutRecordsEntry],
    ) -> Result<(), TransportError> {
        let url = format!("{}{}", self.base_url, PUT_RECORDS_PATH);
        let response = self
            .http
            .post(&url)
            .json(&PutRecordsRequest { name, records })
            .send()
            .await
            .map_err(|err| TransportError::Request(err.to_string()))?;
        if !response.status().is_success() {
            return Err(TransportError::Request(format!(
                "stream put returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    /// Polls until the stream reports ACTIVE, with a bounded number of
    /// attempts.
    pub async fn wait_until_active(&self, name: &str) -> Result<(), TransportError> {
        for attempt in 0..ACTIVE_POLL_ATTEMPTS {
            if let Some(description) = self.describe_stream(name).await? {
                if description.status == STREAM_STATUS_ACTIVE {
                    return Ok(());
                }
                debug!(
                    "Stream {} not active yet ({}), attempt {}",
                    name, description.status, attempt
                );
            }
            tokio::time::sleep(ACTIVE_POLL_INTERVAL).await;
        }
        Err(TransportError::Init(format!(
            "stream {} never became active",
            name
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_endpoint_rejected() {
        assert!(matches!(
            StreamClient::new(""),
            Err(TransportError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_describe_missing_stream_is_none() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", DESCRIBE_STREAM_PATH)
            .with_status(404)
            .create_async()
            .await;

        let client = StreamClient::new(server.url()).expect("client failed");
        let description = client.describe_stream("svc.log").await.expect("describe failed");
        assert!(description.is_none());
    }

    #[tokio::test]
    async fn test_describe_active_stream() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", DESCRIBE_STREAM_PATH)
            .with_status(200)
            .with_body(r#"{"name":"svc.log","status":"ACTIVE","shard_count":2}"#)
            .create_async()
            .await;

        let client = StreamClient::new(server.url()).expect("client failed");
        let description = client
            .describe_stream("svc.log")
            .await
            .expect("describe failed")
            .expect("missing description");
        assert_eq!(description.status, STREAM_STATUS_ACTIVE);
        assert_eq!(description.shard_count, 2);
    }

    #[tokio::test]
    async fn test_put_records_failure_is_request_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", PUT_RECORDS_PATH)
            .with_status(503)
            .create_async()
            .await;

        let client = StreamClient::new(server.url()).expect("client failed");
        let entries = vec![PutRecordsEntry {
            data: "{}".to_string(),
            partition_key: "k".to_string(),
        }];
        let result = client.put_records("svc.log", &entries).await;
        assert!(matches!(result, Err(TransportError::Request(_))));
    }
}
