use std::time::Duration;

use polysolve_host::config::errors::DETAIL_COEFFS_EMPTY;
use polysolve_host::{
    DispatchError, FormatSlot, HostConfig, PlaygroundHost, Request, RequestKind, Slot,
};

use super::support::{dispatcher, within, Recorder, Routed, ScriptedBackend};

const FIRST: Slot = Slot::Format(FormatSlot::First);
const SECOND: Slot = Slot::Format(FormatSlot::Second);

fn format(coeffs: &str) -> Request {
    Request::Format {
        coeffs: coeffs.to_string(),
    }
}

#[tokio::test]
async fn only_the_latest_sent_format_updates_its_preview() {
    let sink = Recorder::new();
    let dispatcher = dispatcher(sink.clone());
    let (backend, _calls) = ScriptedBackend::new();
    dispatcher
        .start(backend.slow_boot(Duration::from_millis(100)))
        .unwrap();

    // Both are sent back-to-back before either resolves.
    dispatcher.dispatch(format("1,1"), Some(1)).unwrap();
    dispatcher.dispatch(format("2,2"), Some(1)).unwrap();
    within(dispatcher.drain()).await;

    assert_eq!(
        sink.touching(FIRST),
        vec![
            Routed::Pending(FIRST, RequestKind::Format),
            Routed::Pending(FIRST, RequestKind::Format),
            Routed::Result(FIRST, "2x + 2".into()),
        ]
    );
    assert_eq!(sink.display.snapshot().formatted[0], "2x + 2");
    dispatcher.shutdown();
}

#[tokio::test]
async fn superseded_request_already_running_is_discarded() {
    let sink = Recorder::new();
    let dispatcher = dispatcher(sink.clone());
    let (backend, calls) = ScriptedBackend::new();
    let (backend, gate) = backend.stall_on(RequestKind::Format);
    dispatcher.start(backend).unwrap();
    within(dispatcher.runtime().settled()).await;

    dispatcher.dispatch(format("1,1"), Some(1)).unwrap();
    dispatcher.dispatch(format("5"), Some(1)).unwrap();
    gate.send(()).unwrap();
    gate.send(()).unwrap();
    within(dispatcher.drain()).await;

    assert_eq!(calls.executes(), 2);
    assert_eq!(sink.results(FIRST), vec!["5".to_string()]);
    dispatcher.shutdown();
}

#[tokio::test]
async fn interleaved_slots_never_touch_each_other() {
    let sink = Recorder::new();
    let dispatcher = dispatcher(sink.clone());
    let (backend, _calls) = ScriptedBackend::new();
    dispatcher
        .start(backend.slow_boot(Duration::from_millis(50)))
        .unwrap();

    dispatcher.dispatch(format("1,1"), Some(1)).unwrap();
    dispatcher.dispatch(format("3"), Some(2)).unwrap();
    dispatcher.dispatch(format("2,2"), Some(1)).unwrap();
    dispatcher.dispatch(format("4, 0"), Some(2)).unwrap();
    within(dispatcher.drain()).await;

    assert_eq!(sink.results(FIRST), vec!["2x + 2".to_string()]);
    assert_eq!(sink.results(SECOND), vec!["4x".to_string()]);
    assert_eq!(sink.pending_count(FIRST), 2);
    assert_eq!(sink.pending_count(SECOND), 2);

    let snapshot = sink.display.snapshot();
    assert_eq!(snapshot.formatted, ["2x + 2".to_string(), "4x".to_string()]);
    assert_eq!(snapshot.format_errors, [None, None]);
    dispatcher.shutdown();
}

#[tokio::test]
async fn invalid_edit_outranks_an_older_in_flight_format() {
    let sink = Recorder::new();
    let dispatcher = dispatcher(sink.clone());
    let (backend, _calls) = ScriptedBackend::new();
    let (backend, gate) = backend.stall_on(RequestKind::Format);
    dispatcher.start(backend).unwrap();
    within(dispatcher.runtime().settled()).await;

    dispatcher.dispatch(format("1,1"), Some(1)).unwrap();
    let err = dispatcher.dispatch(format(""), Some(1)).unwrap_err();
    assert!(matches!(err, DispatchError::Input(ref e) if e.code == DETAIL_COEFFS_EMPTY));

    drop(gate);
    within(dispatcher.drain()).await;

    assert!(sink.results(FIRST).is_empty());
    let snapshot = sink.display.snapshot();
    assert_eq!(snapshot.formatted[0], "");
    assert_eq!(snapshot.format_errors[0], Some(err.to_string()));
    dispatcher.shutdown();
}

#[tokio::test]
async fn edit_burst_formats_only_the_last_value() {
    let sink = Recorder::new();
    let config = HostConfig {
        debounce: Duration::from_millis(50),
        ..HostConfig::default()
    };
    let (backend, _calls) = ScriptedBackend::new();
    let host = PlaygroundHost::mount(backend, sink.clone(), config).unwrap();

    let mounted = within(sink.display.wait_until(|s| {
        s.formatted == ["2x^2 - 3x - 5".to_string(), "1x + 1".to_string()]
    }))
    .await;
    assert!(mounted.format_errors.iter().all(Option::is_none));

    for value in ["1", "1, 2", "1, 2, 3"] {
        host.edit_coefficients(FormatSlot::First, value);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    within(sink.display.wait_until(|s| s.formatted[0] == "1x^2 + 2x + 3")).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    host.drain().await;

    // One for the mount default, one for the burst.
    assert_eq!(sink.pending_count(FIRST), 2);
    assert_eq!(sink.pending_count(SECOND), 1);
    assert!(sink.errors(FIRST).is_empty());
    host.unmount();
}
