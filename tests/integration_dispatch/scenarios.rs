use std::time::Duration;

use polysolve_host::config::errors::{DETAIL_COEFFS_EMPTY, ERR_ENGINE, ERR_TIMEOUT};
use polysolve_host::display::CALCULATING;
use polysolve_host::{
    DispatchError, Envelope, FormatSlot, GaOptions, HostConfig, PlaygroundHost, Polynomial,
    PolynomialBackend, Request, RequestKind, Response, RuntimeManager, Slot, Timeouts,
};
use tokio::sync::mpsc;

use super::support::{dispatcher, dispatcher_with, within, Recorder, ScriptedBackend};

fn small_search(min: f64, max: f64) -> GaOptions {
    GaOptions {
        min_range: min,
        max_range: max,
        num_of_generations: 20,
        data_size: 2_000,
        sample_size: 200,
        ..GaOptions::default()
    }
}

#[tokio::test]
async fn format_round_trips_over_the_wire() {
    let runtime = RuntimeManager::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    runtime.start(PolynomialBackend::default(), tx).unwrap();
    within(runtime.settled()).await;

    let request = Envelope::new(Request::Format { coeffs: "2, -3, -5".into() }, Some(1));
    assert_eq!(
        request.encode().unwrap(),
        r#"{"type":"format","payload":"2, -3, -5","id":1}"#
    );
    runtime.submit(request).unwrap();

    let response = within(rx.recv()).await.expect("runtime answered");
    assert_eq!(
        response,
        Response::Result {
            request_kind: RequestKind::Format,
            id: Some(1),
            value: "2x^2 - 3x - 5".into(),
        }
    );
    assert_eq!(
        response.encode().unwrap(),
        r#"{"type":"result","requestType":"format","id":1,"payload":"2x^2 - 3x - 5"}"#
    );
    runtime.shutdown();
}

#[tokio::test]
async fn derivative_matches_format_of_derived_coefficients() {
    let sink = Recorder::new();
    let dispatcher = dispatcher(sink.clone());
    dispatcher.start(PolynomialBackend::default()).unwrap();

    dispatcher
        .dispatch(Request::Derivative { coeffs: "2,-3,-5".into() }, None)
        .unwrap();
    within(dispatcher.drain()).await;
    dispatcher
        .dispatch(Request::Format { coeffs: "4,-3".into() }, Some(1))
        .unwrap();
    within(dispatcher.drain()).await;

    let derived = sink.results(Slot::Calculation);
    let formatted = sink.results(Slot::Format(FormatSlot::First));
    assert_eq!(derived, formatted);
    assert_eq!(derived, vec!["4x - 3".to_string()]);

    // The derived polynomial evaluates like any other.
    dispatcher
        .dispatch(Request::Evaluate { coeffs: "4,-3".into(), x_val: 2.0 }, None)
        .unwrap();
    within(dispatcher.drain()).await;
    assert_eq!(sink.results(Slot::Calculation).last().map(String::as_str), Some("5"));
    dispatcher.shutdown();
}

#[tokio::test]
async fn add_produces_the_summed_polynomial() {
    let sink = Recorder::new();
    let dispatcher = dispatcher(sink.clone());
    dispatcher.start(PolynomialBackend::default()).unwrap();

    dispatcher
        .dispatch(
            Request::Add {
                coeffs1: "1,2,1".into(),
                coeffs2: "3,-4".into(),
            },
            None,
        )
        .unwrap();
    within(dispatcher.drain()).await;

    let expected = Polynomial::new(vec![1.0, 5.0, -3.0]).to_string();
    assert_eq!(sink.results(Slot::Calculation), vec![expected]);
    assert_eq!(
        sink.display.snapshot().output,
        "Summed Function: 1x^2 + 5x - 3"
    );
    dispatcher.shutdown();
}

#[tokio::test]
async fn solve_yields_a_list_of_numbers() {
    let sink = Recorder::new();
    let dispatcher = dispatcher(sink.clone());
    dispatcher
        .start(PolynomialBackend::with_seed(Duration::ZERO, 42))
        .unwrap();

    dispatcher
        .dispatch(
            Request::Solve {
                coeffs: "1, 0, -4".into(),
                options: small_search(-5.0, 5.0),
            },
            None,
        )
        .unwrap();
    within(dispatcher.drain()).await;

    let results = sink.results(Slot::Calculation);
    assert_eq!(results.len(), 1, "{:?}", sink.log());
    let body = results[0]
        .strip_prefix('[')
        .and_then(|r| r.strip_suffix(']'))
        .expect("bracketed root list");
    let roots: Vec<f64> = body
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| t.parse().expect("root parses as a number"))
        .collect();
    for root in &roots {
        assert!((root.abs() - 2.0).abs() < 0.05, "unexpected root {root}");
    }
    assert!(sink
        .display
        .snapshot()
        .output
        .starts_with("Approximate Roots: ["));
    dispatcher.shutdown();
}

#[tokio::test]
async fn empty_solve_replaces_the_previous_result_with_an_error() {
    let sink = Recorder::new();
    let config = HostConfig::default();
    let (backend, calls) = ScriptedBackend::new();
    let host = PlaygroundHost::mount(backend, sink.clone(), config).unwrap();

    host.run_calculation(Request::Evaluate { coeffs: "2,-3,-5".into(), x_val: 5.0 })
        .unwrap();
    assert_eq!(sink.display.snapshot().output, CALCULATING);
    host.drain().await;
    assert_eq!(sink.display.snapshot().output, "Result (y-value): 30");
    let executed = calls.executes();

    let err = host
        .run_calculation(Request::Solve {
            coeffs: String::new(),
            options: GaOptions::default(),
        })
        .unwrap_err();
    assert!(matches!(err, DispatchError::Input(ref e) if e.code == DETAIL_COEFFS_EMPTY));

    let snapshot = sink.display.snapshot();
    assert_eq!(snapshot.output, format!("Error: {err}"));
    assert!(!snapshot.is_calculating);
    assert_eq!(calls.executes(), executed);
    host.unmount();
}

#[tokio::test]
async fn runtime_errors_clear_only_their_slot() {
    let sink = Recorder::new();
    let dispatcher = dispatcher(sink.clone());
    dispatcher.start(PolynomialBackend::default()).unwrap();

    dispatcher
        .dispatch(Request::Format { coeffs: "1, 1".into() }, Some(2))
        .unwrap();
    dispatcher
        .dispatch(
            Request::Solve {
                coeffs: "0, 0".into(),
                options: small_search(-1.0, 1.0),
            },
            None,
        )
        .unwrap();
    within(dispatcher.drain()).await;

    let errors = sink.errors(Slot::Calculation);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with(ERR_ENGINE), "{}", errors[0]);

    let snapshot = within(sink.display.wait_until(|s| s.controls_enabled())).await;
    assert_eq!(snapshot.formatted[1], "1x + 1");
    assert!(snapshot.output.starts_with("Error: "));
    dispatcher.shutdown();
}

#[tokio::test]
async fn stalled_calculation_times_out_and_frees_the_panel() {
    let sink = Recorder::new();
    let timeouts = Timeouts {
        calculation: Duration::from_millis(50),
        ..Timeouts::default()
    };
    let dispatcher = dispatcher_with(sink.clone(), timeouts);
    let (backend, calls) = ScriptedBackend::new();
    let (backend, gate) = backend.stall_on(RequestKind::Evaluate);
    dispatcher.start(backend).unwrap();

    dispatcher
        .dispatch(Request::Evaluate { coeffs: "1,1".into(), x_val: 1.0 }, None)
        .unwrap();
    within(dispatcher.drain()).await;

    let snapshot = sink.display.snapshot();
    assert_eq!(
        snapshot.output,
        format!("Error: {ERR_TIMEOUT}: evaluate request timed out after 50 ms")
    );
    assert!(!dispatcher.router().is_busy());

    drop(gate);
    dispatcher
        .dispatch(Request::Multiply { coeffs1: "1,1".into(), coeffs2: "1,-1".into() }, None)
        .unwrap();
    within(dispatcher.drain()).await;

    assert_eq!(calls.executes(), 2);
    assert_eq!(sink.results(Slot::Calculation), vec!["1x^2 - 1".to_string()]);
    assert_eq!(sink.display.snapshot().output, "Product Function: 1x^2 - 1");
    dispatcher.shutdown();
}
