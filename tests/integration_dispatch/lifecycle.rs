use std::time::Duration;

use polysolve_host::config::errors::{ERR_BOOTSTRAP, ERR_TERMINATED};
use polysolve_host::{
    DispatchError, FormatSlot, PolynomialBackend, Request, RequestKind, RuntimeState, Slot,
};

use super::support::{dispatcher, within, Recorder, ScriptedBackend};

const FIRST: Slot = Slot::Format(FormatSlot::First);
const SECOND: Slot = Slot::Format(FormatSlot::Second);

#[tokio::test]
async fn bootstrap_failure_is_terminal_and_never_retried() {
    let sink = Recorder::new();
    let dispatcher = dispatcher(sink.clone());
    let (backend, calls) = ScriptedBackend::new();
    dispatcher
        .start(backend.failing_boot("solver package unavailable"))
        .expect("start runtime");

    let settled = within(dispatcher.runtime().settled()).await;
    assert_eq!(
        settled,
        RuntimeState::Error("runtime bootstrap failed: solver package unavailable".into())
    );

    for _ in 0..3 {
        let err = dispatcher
            .dispatch(Request::Derivative { coeffs: "1,2".into() }, None)
            .unwrap_err();
        assert!(matches!(err, DispatchError::Bootstrap(_)));
        assert!(err.to_string().starts_with(ERR_BOOTSTRAP));
    }
    assert!(matches!(
        dispatcher.dispatch(Request::Format { coeffs: "1".into() }, Some(1)),
        Err(DispatchError::Bootstrap(_))
    ));

    assert_eq!(calls.bootstraps(), 1);
    assert_eq!(calls.executes(), 0);
    assert_eq!(dispatcher.router().outstanding(), 0);
    let display = within(
        sink.display
            .wait_until(|s| matches!(s.runtime, RuntimeState::Error(_))),
    )
    .await;
    assert!(!display.controls_enabled());
    dispatcher.shutdown();
}

#[tokio::test]
async fn requests_queued_during_a_failed_bootstrap_fail_with_it() {
    let sink = Recorder::new();
    let dispatcher = dispatcher(sink.clone());
    let (backend, calls) = ScriptedBackend::new();
    dispatcher
        .start(
            backend
                .slow_boot(Duration::from_millis(100))
                .failing_boot("wasm fetch failed"),
        )
        .expect("start runtime");

    assert_eq!(dispatcher.runtime().state(), RuntimeState::Loading);
    dispatcher
        .dispatch(Request::Format { coeffs: "2, -3, -5".into() }, Some(1))
        .expect("queued while loading");
    dispatcher
        .dispatch(Request::Evaluate { coeffs: "1,1".into(), x_val: 2.0 }, None)
        .expect("queued while loading");

    within(dispatcher.drain()).await;

    for slot in [FIRST, Slot::Calculation] {
        let errors = sink.errors(slot);
        assert_eq!(errors.len(), 1, "{slot}: {errors:?}");
        assert!(errors[0].starts_with(ERR_BOOTSTRAP), "{}", errors[0]);
        assert!(sink.results(slot).is_empty());
    }
    assert!(sink.touching(SECOND).is_empty());
    assert_eq!(calls.executes(), 0);
}

#[tokio::test]
async fn requests_before_ready_are_queued_and_flushed_in_order() {
    let sink = Recorder::new();
    let dispatcher = dispatcher(sink.clone());
    let (backend, calls) = ScriptedBackend::new();
    dispatcher
        .start(backend.slow_boot(Duration::from_millis(100)))
        .expect("start runtime");

    assert!(!dispatcher.runtime().is_ready());
    dispatcher
        .dispatch(Request::Format { coeffs: "2, -3, -5".into() }, Some(1))
        .unwrap();
    dispatcher
        .dispatch(Request::Format { coeffs: "1, 1".into() }, Some(2))
        .unwrap();
    dispatcher
        .dispatch(Request::Derivative { coeffs: "2,-3,-5".into() }, None)
        .unwrap();
    assert_eq!(dispatcher.router().outstanding(), 3);
    assert_eq!(calls.executes(), 0);

    within(dispatcher.drain()).await;

    assert_eq!(dispatcher.runtime().state(), RuntimeState::Ready);
    assert_eq!(
        calls.kinds(),
        vec![RequestKind::Format, RequestKind::Format, RequestKind::Derivative]
    );
    assert_eq!(sink.results(FIRST), vec!["2x^2 - 3x - 5".to_string()]);
    assert_eq!(sink.results(SECOND), vec!["1x + 1".to_string()]);
    assert_eq!(sink.results(Slot::Calculation), vec!["4x - 3".to_string()]);

    let snapshot = within(sink.display.wait_until(|s| s.controls_enabled())).await;
    assert_eq!(snapshot.output, "Derivative: 4x - 3");
    dispatcher.shutdown();
}

#[tokio::test]
async fn dispatch_before_start_fails_explicitly() {
    let sink = Recorder::new();
    let dispatcher = dispatcher(sink.clone());
    assert!(matches!(
        dispatcher.dispatch(Request::Format { coeffs: "1".into() }, Some(1)),
        Err(DispatchError::NotStarted)
    ));
    assert!(sink.log().is_empty());
}

#[tokio::test]
async fn runtime_starts_once() {
    let sink = Recorder::new();
    let dispatcher = dispatcher(sink);
    dispatcher.start(PolynomialBackend::default()).unwrap();
    assert!(matches!(
        dispatcher.start(PolynomialBackend::default()),
        Err(DispatchError::AlreadyStarted)
    ));
    assert_eq!(within(dispatcher.runtime().settled()).await, RuntimeState::Ready);
    dispatcher.shutdown();
}

#[tokio::test]
async fn shutdown_while_loading_answers_queued_requests() {
    let sink = Recorder::new();
    let dispatcher = dispatcher(sink.clone());
    let (backend, calls) = ScriptedBackend::new();
    dispatcher
        .start(backend.slow_boot(Duration::from_millis(200)))
        .unwrap();
    dispatcher
        .dispatch(Request::Format { coeffs: "3, 0".into() }, Some(2))
        .unwrap();

    dispatcher.shutdown();
    dispatcher.shutdown();
    within(dispatcher.drain()).await;

    assert_eq!(dispatcher.runtime().state(), RuntimeState::Terminated);
    let errors = sink.errors(SECOND);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with(ERR_TERMINATED));
    assert!(matches!(
        dispatcher.dispatch(Request::Format { coeffs: "1".into() }, Some(2)),
        Err(DispatchError::Terminated)
    ));

    // The late ready from the abandoned bootstrap flushes nothing.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(calls.executes(), 0);
    assert_eq!(dispatcher.runtime().state(), RuntimeState::Terminated);
}

#[tokio::test]
async fn runtime_state_changes_reach_the_sink() {
    let sink = Recorder::new();
    let dispatcher = dispatcher(sink.clone());
    dispatcher.start(PolynomialBackend::default()).unwrap();
    within(sink.display.wait_until(|s| s.runtime.is_ready())).await;

    dispatcher.shutdown();
    within(sink.display.wait_until(|s| s.runtime == RuntimeState::Terminated)).await;

    let states = sink.states();
    assert_eq!(states.last(), Some(&RuntimeState::Terminated));
    assert!(states.contains(&RuntimeState::Ready));
}
