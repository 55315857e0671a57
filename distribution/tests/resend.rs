use digest_core::{DeliveryError, DistributionConfig};
use distribution::{EmailTransport, OutboundEmail, ResendTransport};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn transport(server: &MockServer) -> ResendTransport {
    let config = DistributionConfig {
        resend_base_url: server.uri(),
        api_key: Some("re_test_key".to_string()),
        ..Default::default()
    };
    ResendTransport::new(&config).unwrap()
}

fn email() -> OutboundEmail {
    OutboundEmail {
        from: "Digest <digest@example.org>".to_string(),
        to: "reader@example.org".to_string(),
        reply_to: None,
        subject: "Polkadot Community Digest".to_string(),
        html: "<p>hello</p>".to_string(),
        idempotency_key: "2026-10-18/s1".to_string(),
    }
}

#[tokio::test]
async fn test_send_returns_message_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/emails"))
        .and(header("authorization", "Bearer re_test_key"))
        .and(header("idempotency-key", "2026-10-18/s1"))
        .and(body_partial_json(json!({
            "to": ["reader@example.org"],
            "subject": "Polkadot Community Digest"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "49a3999c"})))
        .expect(1)
        .mount(&server)
        .await;

    let id = transport(&server).send(&email()).await.unwrap();
    assert_eq!(id, "49a3999c");
}

#[tokio::test]
async fn test_rate_limit_honours_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/emails"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
        .mount(&server)
        .await;

    let err = transport(&server).send(&email()).await.unwrap_err();
    assert_eq!(err, DeliveryError::RateLimited { retry_after: 7 });
}

#[tokio::test]
async fn test_validation_error_is_permanent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/emails"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "name": "validation_error",
            "message": "Invalid `to` field."
        })))
        .mount(&server)
        .await;

    let err = transport(&server).send(&email()).await.unwrap_err();
    assert!(err.is_permanent());
    assert!(matches!(err, DeliveryError::InvalidRecipient { .. }));
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/emails"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = transport(&server).send(&email()).await.unwrap_err();
    assert!(matches!(err, DeliveryError::Transient { .. }));
}
