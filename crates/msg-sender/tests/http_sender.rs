//! HTTP sender and resolver tests against a mock gateway

use msg_common::{EmailRequest, EmailSender, Party, SmsRequest};
use msg_sender::{
    ChannelSender, ContactMethod, Email, FeedbackChannelResolver, HttpChannelSender,
    HttpFeedbackChannelResolver, HttpSenderConfig, SenderError, Sms,
};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer, path: &str) -> HttpSenderConfig {
    HttpSenderConfig {
        base_url: server.uri(),
        path: path.to_string(),
        ..Default::default()
    }
}

fn sms_request() -> SmsRequest {
    SmsRequest {
        party: Party::with_id("party-1"),
        sender: "Kommunen".to_string(),
        mobile_number: "+46701234567".to_string(),
        message: "Hej".to_string(),
        priority: None,
    }
}

#[tokio::test]
async fn test_sms_sender_reads_sent_flag() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2281/sms"))
        .and(body_partial_json(serde_json::json!({"mobileNumber": "+46701234567"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"sent": true})))
        .expect(1)
        .mount(&server)
        .await;

    let sender = HttpChannelSender::<Sms>::new(config(&server, "sms")).unwrap();
    let receipt = sender.send("2281", &sms_request()).await.unwrap();

    assert_eq!(receipt.status, 200);
    assert_eq!(receipt.sent, Some(true));
    assert!(receipt.is_confirmed_sent());
}

#[tokio::test]
async fn test_server_error_is_a_receipt_not_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2281/sms"))
        .respond_with(ResponseTemplate::new(503).set_body_string("down"))
        .mount(&server)
        .await;

    let sender = HttpChannelSender::<Sms>::new(config(&server, "sms")).unwrap();
    let receipt = sender.send("2281", &sms_request()).await.unwrap();

    assert_eq!(receipt.status, 503);
    assert!(!receipt.is_success_status());
}

#[tokio::test]
async fn test_email_sender_with_token_and_empty_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2281/email"))
        .and(header("Authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let sender = HttpChannelSender::<Email>::new(HttpSenderConfig {
        api_token: Some("secret".to_string()),
        ..config(&server, "email")
    })
    .unwrap();

    let request = EmailRequest {
        party: Party::default(),
        email_address: "someone@example.se".to_string(),
        subject: "Hej".to_string(),
        message: Some("body".to_string()),
        html_message: None,
        sender: EmailSender {
            name: "Kommunen".to_string(),
            address: "noreply@example.se".to_string(),
            reply_to: None,
        },
        attachments: vec![],
        headers: Default::default(),
    };

    let receipt = sender.send("2281", &request).await.unwrap();
    assert_eq!(receipt.status, 204);
    assert_eq!(receipt.sent, None);
}

#[tokio::test]
async fn test_unreachable_gateway_is_an_error() {
    let sender = HttpChannelSender::<Sms>::new(HttpSenderConfig {
        base_url: "http://127.0.0.1:1".to_string(),
        path: "sms".to_string(),
        ..Default::default()
    })
    .unwrap();

    let err = sender.send("2281", &sms_request()).await.unwrap_err();
    assert!(matches!(err, SenderError::Http(_)));
}

#[tokio::test]
async fn test_resolver_parses_channels() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2281/settings/party-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"contactMethod": "SMS", "feedbackWanted": false, "destination": "+46701234567"},
            {"contactMethod": "EMAIL", "feedbackWanted": true, "destination": "someone@example.se"}
        ])))
        .mount(&server)
        .await;

    let resolver = HttpFeedbackChannelResolver::new(config(&server, "settings")).unwrap();
    let channels = resolver.resolve("2281", "party-1").await.unwrap();

    assert_eq!(channels.len(), 2);
    assert_eq!(channels[0].contact_method, Some(ContactMethod::Sms));
    assert!(!channels[0].feedback_wanted);
    assert_eq!(channels[1].destination, "someone@example.se");
}

#[tokio::test]
async fn test_resolver_not_found_means_no_settings() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let resolver = HttpFeedbackChannelResolver::new(config(&server, "settings")).unwrap();
    assert!(resolver.resolve("2281", "party-1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_resolver_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let resolver = HttpFeedbackChannelResolver::new(config(&server, "settings")).unwrap();
    let err = resolver.resolve("2281", "party-1").await.unwrap_err();
    assert!(matches!(err, SenderError::Status { status: 500, .. }));
}
