// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! End-to-end test of counter aggregation flowing to a mock collector.

use logship::{EventCode, LogEvent};
use logship_transports::collector_client::COUNTERS_PATH;
use logship_transports::registry::TransportContext;
use logship_transports::init_logger;
use uuid::Uuid;

#[tokio::test]
async fn test_counters_reach_collector_on_close() {
    let mut server = mockito::Server::new_async().await;
    let counters = server
        .mock("POST", COUNTERS_PATH)
        .match_query(mockito::Matcher::Any)
        .with_status(200)
        .with_body(r#"{"update":false}"#)
        .expect_at_least(1)
        .create_async()
        .await;

    let source = format!(
        r#"
- type: collector
  transportconfig:
    required: true
    max_log_level: 3
  tenant_id: {}
  collector_url: {}
"#,
        Uuid::new_v4(),
        server.url()
    );
    let context = TransportContext {
        service: "idp".to_string(),
        host: "host-1".to_string(),
        region: "aws-us-east-1".to_string(),
        auth_token: Some("token".to_string()),
    };
    let logger = init_logger(&[&source], &context).await.expect("init failed");

    for _ in 0..25 {
        logger.write(&LogEvent::counter("authn.login", EventCode(12), 1));
    }
    // Close drains the queue and pushes the aggregated period out.
    logger.close().await;

    counters.assert_async().await;
}
