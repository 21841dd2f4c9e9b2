// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! End-to-end tests for the RPC middleware
//!
//! Clients and handlers talk through the in-memory transport, so every call
//! goes through encoding, routing, the handler adapters and the wire status.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use transit_rpc::{
    BoxError, ClientConfig, Code, CodecRegistry, Context, Detail, JSON_ENCODING, MessageStream,
    OnewayClient, OnewayHandler, ProcedureRouter, Request, RequestMeta, ReReader, RpcError,
    StreamClient, StreamHandler, UnaryClient, UnaryHandler, UnaryOutbound, get_error_details,
    oneway_procedure, stream_procedure, unary_procedure,
};
use transit_testing::{
    EchoRequest, EchoResponse, FieldViolation, MemoryOutbound, RecordingOutbound, RetryInfo,
};

// ============================================================================
// Test Helpers
// ============================================================================

const SERVICE: &str = "echo";

struct EchoHandler;

#[async_trait]
impl UnaryHandler for EchoHandler {
    type Request = EchoRequest;
    type Response = EchoResponse;

    async fn handle(&self, _ctx: &Context, request: EchoRequest) -> Result<EchoResponse, BoxError> {
        if request.value.is_empty() {
            let err = RpcError::invalid_argument("bad field")
                .with_detail(Detail::new(FieldViolation::new("value", "must not be empty")));
            return Err(Box::new(err));
        }
        if request.value == "busy" {
            let err = RpcError::unavailable("try later")
                .with_detail(Detail::new(RetryInfo { retry_after_ms: 250 }));
            return Err(Box::new(err));
        }
        if request.value == "slow" {
            tokio::time::sleep(Duration::from_secs(10)).await;
        }
        Ok(EchoResponse {
            value: request.value,
            served_by: "echo".to_string(),
        })
    }
}

struct Notifications {
    tx: tokio::sync::mpsc::UnboundedSender<String>,
}

#[async_trait]
impl OnewayHandler for Notifications {
    type Request = EchoRequest;

    async fn handle_oneway(&self, _ctx: &Context, request: EchoRequest) -> Result<(), BoxError> {
        self.tx.send(request.value)?;
        Ok(())
    }
}

struct Chat;

#[async_trait]
impl StreamHandler for Chat {
    async fn handle_stream(&self, ctx: &Context, stream: MessageStream) -> Result<(), BoxError> {
        while let Some(request) = stream.receive::<EchoRequest>(ctx).await? {
            if request.value == "stop" {
                return Err(Box::new(RpcError::not_found("no such topic")));
            }
            stream
                .send(
                    ctx,
                    &EchoResponse {
                        value: request.value.to_uppercase(),
                        served_by: "chat".to_string(),
                    },
                )
                .await?;
        }
        Ok(())
    }
}

/// Router, codecs and in-memory transport wired together
struct TestEnv {
    registry: Arc<CodecRegistry>,
    outbound: Arc<MemoryOutbound>,
    notifications: tokio::sync::mpsc::UnboundedReceiver<String>,
}

impl TestEnv {
    fn new() -> Self {
        let mut registry = CodecRegistry::with_defaults();
        registry.register_detail::<FieldViolation>();
        registry.register_detail::<RetryInfo>();
        let registry = Arc::new(registry);

        let (tx, notifications) = tokio::sync::mpsc::unbounded_channel();
        let router = ProcedureRouter::new();
        router.register([
            unary_procedure(registry.clone(), SERVICE, "Echo", EchoHandler),
            oneway_procedure(registry.clone(), SERVICE, "Notify", Notifications { tx }),
            stream_procedure(registry.clone(), SERVICE, "Chat", Chat),
        ]);

        TestEnv {
            registry,
            outbound: Arc::new(MemoryOutbound::new(Arc::new(router))),
            notifications,
        }
    }

    fn config(&self) -> ClientConfig {
        ClientConfig::new(self.registry.clone(), "tester", SERVICE)
    }

    fn unary(&self, encoding: &str) -> UnaryClient {
        UnaryClient::new(self.config().with_encoding(encoding), self.outbound.clone())
    }
}

// ============================================================================
// Unary
// ============================================================================

#[tokio::test]
#[tracing_test::traced_test]
async fn test_unary_proto() {
    let env = TestEnv::new();
    let client = env.unary("proto");

    let response: EchoResponse = client
        .call(&Context::new(), "echo::Echo", &EchoRequest::new("hello"))
        .await
        .unwrap();
    assert_eq!(response.value, "hello");
    assert_eq!(response.served_by, "echo");
}

#[tokio::test]
#[tracing_test::traced_test]
async fn test_unary_json_body() {
    let env = TestEnv::new();

    // a hand written JSON body reaches the handler as a typed message
    let meta = RequestMeta::new("tester", SERVICE, "echo::Echo", JSON_ENCODING);
    let response = env
        .outbound
        .call(
            &Context::new(),
            Request::new(meta, &b"{\"value\":\"sample\"}"[..]),
        )
        .await
        .unwrap();
    assert!(!response.application_error);

    let body = response.body.read_all(&Context::new()).await.unwrap();
    let decoded: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(decoded["value"], "sample");
    assert_eq!(decoded["served_by"], "echo");

    let client = env.unary(JSON_ENCODING);
    let response: EchoResponse = client
        .call(&Context::new(), "echo::Echo", &EchoRequest::new("sample"))
        .await
        .unwrap();
    assert_eq!(response.value, "sample");
}

#[tokio::test]
#[tracing_test::traced_test]
async fn test_error_details_round_trip() {
    let env = TestEnv::new();

    for encoding in ["proto", "json"] {
        let client = env.unary(encoding);
        let err = client
            .call::<_, EchoResponse>(&Context::new(), "echo::Echo", &EchoRequest::new(""))
            .await
            .unwrap_err();

        assert_eq!(err.code(), Code::InvalidArgument);
        assert_eq!(err.message(), "bad field");

        let details = get_error_details(&err);
        assert_eq!(details.len(), 1);
        assert_eq!(
            details[0].downcast_ref::<FieldViolation>(),
            Some(&FieldViolation::new("value", "must not be empty"))
        );
    }
}

#[tokio::test]
#[tracing_test::traced_test]
async fn test_handler_failure_status() {
    let env = TestEnv::new();
    let meta = RequestMeta::new("tester", SERVICE, "echo::Echo", "proto");

    // an empty proto body decodes to an empty value
    let status = env
        .outbound
        .call(&Context::new(), Request::new(meta, Vec::<u8>::new()))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);
    assert!(status.details().is_some());
    assert!(status.is_application_error());
}

#[tokio::test]
#[tracing_test::traced_test]
async fn test_unknown_detail_type() {
    let env = TestEnv::new();

    // a caller without the detail type registered still gets code and message
    let registry = Arc::new(CodecRegistry::with_defaults());
    let client = UnaryClient::new(
        ClientConfig::new(registry, "tester", SERVICE),
        env.outbound.clone(),
    );
    let err = client
        .call::<_, EchoResponse>(&Context::new(), "echo::Echo", &EchoRequest::new("busy"))
        .await
        .unwrap_err();

    assert_eq!(err.code(), Code::Unavailable);
    assert_eq!(err.message(), "try later");
    assert_eq!(err.details().len(), 1);
    assert!(err.details()[0].is_undecodable());
    assert!(err.details()[0].type_url().ends_with("transit.testing.RetryInfo"));
}

#[tokio::test]
#[tracing_test::traced_test]
async fn test_unrecognized_procedure() {
    let env = TestEnv::new();
    let client = env.unary("proto");

    let err = client
        .call::<_, EchoResponse>(&Context::new(), "echo::Missing", &EchoRequest::new("x"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::Unimplemented);
    assert!(err.message().contains("echo::Missing"));
}

#[tokio::test]
#[tracing_test::traced_test]
async fn test_unexpected_encoding() {
    let env = TestEnv::new();
    let client = env.unary("raw");

    let err = client
        .call::<_, EchoResponse>(&Context::new(), "echo::Echo", &EchoRequest::new("x"))
        .await
        .unwrap_err();
    // raw only accepts raw messages, the request never leaves the client
    assert_eq!(err.code(), Code::Internal);
}

#[tokio::test(start_paused = true)]
#[tracing_test::traced_test]
async fn test_deadline_exceeded() {
    let env = TestEnv::new();
    let client = env.unary("proto");

    let ctx = Context::with_timeout(Duration::from_millis(100));
    let err = client
        .call::<_, EchoResponse>(&ctx, "echo::Echo", &EchoRequest::new("slow"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::DeadlineExceeded);
}

// ============================================================================
// Oneway
// ============================================================================

#[tokio::test]
#[tracing_test::traced_test]
async fn test_oneway() {
    let mut env = TestEnv::new();
    let client = OnewayClient::new(env.config(), env.outbound.clone());

    client
        .call_oneway(&Context::new(), "echo::Notify", &EchoRequest::new("ping"))
        .await
        .unwrap();
    assert_eq!(env.notifications.recv().await.as_deref(), Some("ping"));

    // a unary procedure cannot serve a oneway call
    let err = client
        .call_oneway(&Context::new(), "echo::Echo", &EchoRequest::new("ping"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::Unimplemented);
}

// ============================================================================
// Streams
// ============================================================================

#[tokio::test]
#[tracing_test::traced_test]
async fn test_stream_echo() {
    let env = TestEnv::new();
    let client = StreamClient::new(env.config(), env.outbound.clone());
    let ctx = Context::new();

    let stream = client.call_stream(&ctx, "echo::Chat").await.unwrap();
    for value in ["a", "b", "c"] {
        stream.send(&ctx, &EchoRequest::new(value)).await.unwrap();
    }
    stream.close_send(&ctx).await.unwrap();

    let mut received = Vec::new();
    while let Some(response) = stream.receive::<EchoResponse>(&ctx).await.unwrap() {
        assert_eq!(response.served_by, "chat");
        received.push(response.value);
    }
    assert_eq!(received, vec!["A", "B", "C"]);
}

#[tokio::test]
#[tracing_test::traced_test]
async fn test_stream_handler_error() {
    let env = TestEnv::new();
    let client = StreamClient::new(env.config(), env.outbound.clone());
    let ctx = Context::new();

    let stream = client.call_stream(&ctx, "echo::Chat").await.unwrap();
    stream.send(&ctx, &EchoRequest::new("x")).await.unwrap();
    stream.send(&ctx, &EchoRequest::new("stop")).await.unwrap();

    let first = stream.receive::<EchoResponse>(&ctx).await.unwrap();
    assert_eq!(first.map(|r| r.value).as_deref(), Some("X"));

    let err = stream.receive::<EchoResponse>(&ctx).await.unwrap_err();
    assert_eq!(err.code(), Code::NotFound);
    assert_eq!(err.message(), "no such topic");
}

// ============================================================================
// Fan-out
// ============================================================================

#[tokio::test]
#[tracing_test::traced_test]
async fn test_fan_out_with_re_reader() {
    let ctx = Context::new();
    let first = Arc::new(RecordingOutbound::responding(&b"one"[..]));
    let second = Arc::new(RecordingOutbound::responding(&b"two"[..]));

    let payload = b"{\"value\":\"sample\"}".to_vec();
    let reader = ReReader::new(&ctx, payload.clone().into()).await.unwrap();
    let meta = RequestMeta::new("tester", SERVICE, "echo::Echo", JSON_ENCODING);

    let (a, b) = tokio::join!(
        first.call(&ctx, Request::new(meta.clone(), reader.body())),
        second.call(&ctx, Request::new(meta.clone(), reader.body())),
    );
    assert!(a.is_ok());
    assert!(b.is_ok());

    let first_calls = first.calls();
    let second_calls = second.calls();
    assert_eq!(first_calls.len(), 1);
    assert_eq!(second_calls.len(), 1);
    assert_eq!(first_calls[0].body, second_calls[0].body);
    assert_eq!(first_calls[0].body.as_ref(), payload.as_slice());
    assert_eq!(reader.len(), payload.len());
}
