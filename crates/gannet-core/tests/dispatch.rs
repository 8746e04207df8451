//! End-to-end dispatch tests over the testkit doubles: inbound calls
//! flow through stream assembly, lookup, negotiation, invocation, and
//! settlement against a recording connection.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use gannet_core::{
    CallOptions, Connection, DispatchError, ErrorCode, Event, Fault, HandlerRegistry, JsonScheme,
    NullSink, RequestDispatcher, ResponseCode, Rule, ServiceError, Tracing, MAX_ENDPOINT_SIZE,
};
use gannet_testkit::{CollectingSink, RecordingConnection, RequestBuilder, StaticChannel};

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn dispatcher(registry: HandlerRegistry) -> RequestDispatcher {
    init_logging();
    RequestDispatcher::new(
        registry,
        Arc::new(StaticChannel::new("127.0.0.1:0")),
        Arc::new(NullSink),
    )
}

#[tokio::test]
async fn echo_round_trip() {
    let mut registry = HandlerRegistry::default();
    registry.register("echo", |request, response, _proxy| async move {
        while let Some(chunk) = request.arg(2).expect("arg3 stream").read().await {
            response.write(chunk);
        }
        Ok(())
    });

    let connection = Arc::new(RecordingConnection::default());
    let request = RequestBuilder::new("echo", "svc").id(42).payload("hi").build();

    let response = dispatcher(registry)
        .handle_call(request, connection.clone())
        .await
        .expect("dispatch succeeds");

    assert!(response.is_flushed());
    let frames = connection.responses();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].id, 42);
    assert_eq!(frames[0].code, ResponseCode::Ok);
    assert_eq!(&frames[0].body[..], b"hi");
    assert_eq!(frames[0].headers.get("as").map(String::as_str), Some("raw"));
    assert_eq!(connection.reserved(), vec![42]);
    assert!(connection.errors().is_empty());
}

#[tokio::test]
async fn unknown_endpoint_reports_not_found() {
    let connection = Arc::new(RecordingConnection::default());
    let request = RequestBuilder::new("missing", "svcX").build();

    let response = dispatcher(HandlerRegistry::default())
        .handle_call(request, connection.clone())
        .await
        .expect("dispatch completes");

    assert!(!response.is_flushed());
    assert!(connection.responses().is_empty());
    let errors = connection.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, ErrorCode::BadRequest);
    assert_eq!(
        errors[0].message,
        "Endpoint 'missing' for service 'svcX' is not defined"
    );
}

#[tokio::test]
async fn fallback_catches_unmatched_endpoint() {
    let mut registry = HandlerRegistry::default();
    registry.register(Rule::Fallback, |_request, response, _proxy| async move {
        response.write("fallback");
        Ok(())
    });

    let connection = Arc::new(RecordingConnection::default());
    let request = RequestBuilder::new("anything", "svc").build();

    dispatcher(registry)
        .handle_call(request, connection.clone())
        .await
        .expect("dispatch succeeds");

    assert!(connection.errors().is_empty());
    assert_eq!(&connection.responses()[0].body[..], b"fallback");
}

#[tokio::test]
async fn scheme_mismatch_rejects_before_invoke() {
    let invoked = Arc::new(AtomicUsize::new(0));
    let mut registry = HandlerRegistry::default();
    let count = invoked.clone();
    registry.register("echo", move |_request, _response, _proxy| {
        count.fetch_add(1, Ordering::SeqCst);
        async { Ok(()) }
    });

    let connection = Arc::new(RecordingConnection::default());
    let request = RequestBuilder::new("echo", "svc").arg_scheme("json").build();

    let err = dispatcher(registry)
        .handle_call(request, connection.clone())
        .await
        .expect_err("mismatch aborts dispatch");

    assert_eq!(
        err,
        DispatchError::SchemeMismatch {
            expected: "raw".to_string(),
            actual: Some("json".to_string()),
        }
    );
    assert_eq!(invoked.load(Ordering::SeqCst), 0);
    // Rejected before the reservation phase.
    assert!(connection.reserved().is_empty());
    let errors = connection.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, ErrorCode::BadRequest);
    assert_eq!(
        errors[0].message,
        "invalid arg scheme in request header: expected 'raw', got 'json'"
    );
}

#[tokio::test]
async fn missing_as_header_rejects() {
    let mut registry = HandlerRegistry::default();
    registry.register("echo", |_request, _response, _proxy| async { Ok(()) });

    let connection = Arc::new(RecordingConnection::default());
    let request = RequestBuilder::new("echo", "svc").no_arg_scheme().build();

    let err = dispatcher(registry)
        .handle_call(request, connection.clone())
        .await
        .expect_err("missing header aborts dispatch");

    assert_eq!(
        err,
        DispatchError::SchemeMismatch {
            expected: "raw".to_string(),
            actual: None,
        }
    );
    assert!(connection.errors()[0].message.contains("got '<none>'"));
}

#[tokio::test]
async fn handler_fault_settles_as_unexpected_error() {
    let mut registry = HandlerRegistry::default();
    registry.register("broken", |_request, _response, _proxy| async {
        Err(ServiceError::Fault(Fault::new("boom")))
    });

    init_logging();
    let connection = Arc::new(RecordingConnection::default());
    let events = Arc::new(CollectingSink::default());
    let dispatcher = RequestDispatcher::new(
        registry,
        Arc::new(StaticChannel::new("127.0.0.1:0")),
        events.clone(),
    );
    let request = RequestBuilder::new("broken", "svc").id(7).build();

    let response = dispatcher
        .handle_call(request, connection.clone())
        .await
        .expect("dispatch completes");

    assert!(!response.is_flushed());
    assert_eq!(response.fault().map(|f| f.message().to_string()), Some("boom".into()));
    assert!(connection.responses().is_empty());
    // The buffer reserved before invoke is released on fault.
    assert_eq!(connection.reserved(), vec![7]);
    assert_eq!(connection.released(), vec![7]);
    assert!(connection.outstanding().is_empty());
    let errors = connection.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, ErrorCode::Unexpected);
    assert_eq!(
        errors[0].message,
        "An unexpected error has occurred from the handler"
    );
    let app_errors: Vec<_> = events
        .events()
        .into_iter()
        .filter(|e| matches!(e, Event::ApplicationError { .. }))
        .collect();
    assert_eq!(app_errors.len(), 1);
}

#[tokio::test]
async fn release_after_fault_settlement_is_harmless() {
    let mut registry = HandlerRegistry::default();
    registry.register("broken", |_request, _response, _proxy| async {
        Err(ServiceError::Fault(Fault::new("boom")))
    });

    let connection = Arc::new(RecordingConnection::default());
    let request = RequestBuilder::new("broken", "svc").id(11).build();

    dispatcher(registry)
        .handle_call(request, connection.clone())
        .await
        .expect("dispatch completes");

    // The dispatcher released on fault; a transport teardown releasing
    // the same id again is a no-op.
    connection.release(11);
    assert!(connection.outstanding().is_empty());
    assert_eq!(connection.released(), vec![11, 11]);
    assert_eq!(connection.errors().len(), 1);
}

#[tokio::test]
async fn only_the_matching_handler_runs() {
    let echo_hits = Arc::new(AtomicUsize::new(0));
    let ping_hits = Arc::new(AtomicUsize::new(0));

    let mut registry = HandlerRegistry::default();
    let count = echo_hits.clone();
    registry.register("echo", move |_request, _response, _proxy| {
        count.fetch_add(1, Ordering::SeqCst);
        async { Ok(()) }
    });
    let count = ping_hits.clone();
    registry.register("ping", move |_request, _response, _proxy| {
        count.fetch_add(1, Ordering::SeqCst);
        async { Ok(()) }
    });

    let connection = Arc::new(RecordingConnection::default());
    let request = RequestBuilder::new("ping", "svc").build();

    dispatcher(registry)
        .handle_call(request, connection.clone())
        .await
        .expect("dispatch succeeds");

    assert_eq!(ping_hits.load(Ordering::SeqCst), 1);
    assert_eq!(echo_hits.load(Ordering::SeqCst), 0);
    assert!(connection.errors().is_empty());
}

#[tokio::test]
async fn handler_panic_settles_as_fault() {
    let mut registry = HandlerRegistry::default();
    registry.register("panicky", |_request, _response, _proxy| async {
        panic!("handler blew up");
    });

    let connection = Arc::new(RecordingConnection::default());
    let request = RequestBuilder::new("panicky", "svc").id(9).build();

    let response = dispatcher(registry)
        .handle_call(request, connection.clone())
        .await
        .expect("dispatch completes");

    let fault = response.fault().expect("panic recorded as fault");
    assert!(fault.message().contains("handler blew up"));
    assert_eq!(connection.released(), vec![9]);
    assert_eq!(connection.errors()[0].code, ErrorCode::Unexpected);
}

#[tokio::test]
async fn reservation_is_visible_during_invoke() {
    let connection = Arc::new(RecordingConnection::default());
    let observed = Arc::new(AtomicBool::new(false));

    let mut registry = HandlerRegistry::default();
    let conn = connection.clone();
    let seen = observed.clone();
    registry.register("probe", move |request, _response, _proxy| {
        let conn = conn.clone();
        let seen = seen.clone();
        async move {
            seen.store(conn.outstanding().contains(&request.id), Ordering::SeqCst);
            Ok(())
        }
    });

    let request = RequestBuilder::new("probe", "svc").id(3).build();
    dispatcher(registry)
        .handle_call(request, connection.clone())
        .await
        .expect("dispatch succeeds");

    assert!(observed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn endpoint_assembles_from_chunks_and_stream_is_spent() {
    let invoked = Arc::new(AtomicUsize::new(0));
    let mut registry = HandlerRegistry::default();
    let count = invoked.clone();
    registry.register("echo", move |request, _response, _proxy| {
        let count = count.clone();
        async move {
            count.fetch_add(1, Ordering::SeqCst);
            assert_eq!(request.endpoint(), "echo");
            // arg1 was drained during assembly.
            assert_eq!(request.arg(0).expect("arg1 stream").read().await, None);
            Ok(())
        }
    });

    let connection = Arc::new(RecordingConnection::default());
    let request = RequestBuilder::new("", "svc")
        .endpoint_chunks(["ec", "ho"])
        .build();

    dispatcher(registry)
        .handle_call(request, connection.clone())
        .await
        .expect("dispatch succeeds");

    assert_eq!(invoked.load(Ordering::SeqCst), 1);
    assert!(connection.errors().is_empty());
}

#[tokio::test]
async fn before_receive_observes_final_endpoint_name() {
    init_logging();
    let events = Arc::new(CollectingSink::default());
    let dispatcher = RequestDispatcher::new(
        HandlerRegistry::default(),
        Arc::new(StaticChannel::new("127.0.0.1:0")),
        events.clone(),
    );

    let connection = Arc::new(RecordingConnection::default());
    let request = RequestBuilder::new("", "svc")
        .endpoint_chunks(["mis", "sing"])
        .build();

    dispatcher
        .handle_call(request, connection)
        .await
        .expect("dispatch completes");

    // Fired even when lookup then fails, and always with the assembled name.
    match &events.events()[0] {
        Event::BeforeReceiveRequest { request } => assert_eq!(request.endpoint(), "missing"),
        other => panic!("unexpected first event: {other:?}"),
    }
}

#[tokio::test]
async fn oversized_endpoint_is_rejected() {
    let connection = Arc::new(RecordingConnection::default());
    let request = RequestBuilder::new("x".repeat(MAX_ENDPOINT_SIZE + 1), "svc").build();

    let err = dispatcher(HandlerRegistry::default())
        .handle_call(request, connection.clone())
        .await
        .expect_err("oversized name aborts dispatch");

    assert!(matches!(err, DispatchError::EndpointOverflow { max, .. } if max == MAX_ENDPOINT_SIZE));
    assert_eq!(connection.errors()[0].code, ErrorCode::BadRequest);
    assert!(connection.reserved().is_empty());
}

#[tokio::test]
async fn proxy_calls_inherit_inbound_tracing() {
    init_logging();
    let channel = Arc::new(StaticChannel::new("127.0.0.1:4040"));
    let inbound = Tracing::new(71, 72, 0, 1);

    let mut registry = HandlerRegistry::default();
    registry.register("relay", |_request, _response, proxy| async move {
        assert_eq!(proxy.hostport(), "127.0.0.1:4040");
        // Caller-supplied parent tracing is always overridden.
        let mut options = CallOptions::default();
        options.parent_tracing = Some(Tracing::new(99, 99, 99, 0));
        proxy.request(options);
        Ok(())
    });

    let dispatcher = RequestDispatcher::new(registry, channel.clone(), Arc::new(NullSink));
    let connection = Arc::new(RecordingConnection::default());
    let request = RequestBuilder::new("relay", "svc")
        .tracing(inbound.clone())
        .build();

    dispatcher
        .handle_call(request, connection)
        .await
        .expect("dispatch succeeds");

    let issued = channel.issued();
    assert_eq!(issued.len(), 1);
    let parent = issued[0].parent_tracing.clone().expect("parent set");
    assert_eq!(parent.trace_id, inbound.trace_id);
    assert_eq!(parent.span_id, inbound.span_id);
    // Span name was set to the endpoint during dispatch.
    assert_eq!(parent.name, "relay");
}

#[tokio::test]
async fn negotiated_scheme_echoes_on_response() {
    let mut registry = HandlerRegistry::default();
    registry.register_with_schemes(
        "config",
        |_request, response, _proxy| async move {
            response.write("{}");
            Ok(())
        },
        Arc::new(JsonScheme),
        Arc::new(JsonScheme),
    );

    let connection = Arc::new(RecordingConnection::default());
    let request = RequestBuilder::new("config", "svc").arg_scheme("json").build();

    dispatcher(registry)
        .handle_call(request, connection.clone())
        .await
        .expect("dispatch succeeds");

    let frames = connection.responses();
    assert_eq!(frames[0].headers.get("as").map(String::as_str), Some("json"));
}

#[tokio::test]
async fn handler_flush_wins_over_dispatcher_flush() {
    let mut registry = HandlerRegistry::default();
    registry.register("eager", |_request, response, _proxy| async move {
        response.write("early");
        response.flush().map_err(|_| ServiceError::Fault(Fault::new("double flush")))?;
        Ok(())
    });

    let connection = Arc::new(RecordingConnection::default());
    let request = RequestBuilder::new("eager", "svc").build();

    dispatcher(registry)
        .handle_call(request, connection.clone())
        .await
        .expect("dispatch completes");

    // Exactly one frame despite the dispatcher's own settle attempt.
    let frames = connection.responses();
    assert_eq!(frames.len(), 1);
    assert_eq!(&frames[0].body[..], b"early");
    assert!(connection.errors().is_empty());
}
