mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::frame;
use common::frame_of;
use common::CountingDisplay;
use common::DisplayProbe;
use common::ManualClock;
use common::OfflineRegistry;
use common::ScriptedRecognizer;
use common::ScriptedSource;
use opencv::core::CV_8UC2;
use opencv::core::CV_8UC3;
use plate_gate::plate_detection::PlateIdentifier;
use plate_gate::shared_recognizer;
use plate_gate::status_channel;
use plate_gate::CancellationToken;
use plate_gate::CycleOutcome;
use plate_gate::LoopState;
use plate_gate::MemoryRegistry;
use plate_gate::Outcome;
use plate_gate::PlateEntry;
use plate_gate::PlateError;
use plate_gate::PlateRegistry;
use plate_gate::ScanContext;
use plate_gate::ScanLoop;
use plate_gate::SessionDevices;
use plate_gate::SessionExit;
use plate_gate::Severity;
use plate_gate::StatusReader;

fn registry_with(plates: &[&str]) -> Arc<MemoryRegistry> {
    let registry = MemoryRegistry::new();
    for plate in plates {
        registry.insert(PlateEntry::new(*plate)).unwrap();
    }
    Arc::new(registry)
}

fn scan_loop(
    recognizer: ScriptedRecognizer,
    registry: Arc<dyn PlateRegistry>,
    source: ScriptedSource,
    display: CountingDisplay,
    clock: Arc<ManualClock>,
) -> (ScanLoop, ScanContext, StatusReader) {
    let (publisher, reader) = status_channel();
    let ctx = ScanContext::new(shared_recognizer(recognizer), registry, publisher)
        .with_clock(clock);
    let devices = SessionDevices {
        source: Box::new(source),
        display: Box::new(display),
    };
    (ScanLoop::new(ctx.clone(), devices), ctx, reader)
}

fn single_step_loop(
    text: &str,
    registry: Arc<dyn PlateRegistry>,
) -> (ScanLoop, ScanContext, StatusReader) {
    let (recognizer, _calls) = ScriptedRecognizer::always(text);
    scan_loop(
        recognizer,
        registry,
        ScriptedSource::frames(0),
        CountingDisplay::new(DisplayProbe::default()),
        ManualClock::new(),
    )
}

#[test]
fn registered_plate_is_granted() {
    let (mut scan, ctx, mut status) = single_step_loop("XYZ9999", registry_with(&["XYZ9999"]));
    let events = ctx.events();

    let outcome = scan.step(&frame()).unwrap();

    let CycleOutcome::Decided(event) = outcome else {
        panic!("expected a decision, got {outcome:?}");
    };
    assert_eq!(event.outcome, Outcome::Granted);
    assert_eq!(event.identifier, PlateIdentifier::new("XYZ9999"));
    assert_eq!(events.try_recv().unwrap(), event);

    let current = status.latest();
    assert_eq!(current.severity, Severity::Granted);
    assert_eq!(current.state, LoopState::Granted);
    assert!(current.text.contains("XYZ9999"));
}

#[test]
fn noisy_text_is_normalized_before_lookup() {
    let (mut scan, _ctx, _status) = single_step_loop(" xyz-9999.\n", registry_with(&["XYZ9999"]));
    match scan.step(&frame()).unwrap() {
        CycleOutcome::Decided(event) => {
            assert_eq!(event.outcome, Outcome::Granted);
            assert_eq!(event.identifier.as_str(), "XYZ9999");
        }
        other => panic!("expected a decision, got {other:?}"),
    }
}

#[test]
fn unknown_plate_is_denied() {
    let (mut scan, _ctx, mut status) = single_step_loop("AAA0000", registry_with(&["XYZ9999"]));

    match scan.step(&frame()).unwrap() {
        CycleOutcome::Decided(event) => {
            assert_eq!(event.outcome, Outcome::Denied);
            assert_eq!(event.identifier.as_str(), "AAA0000");
        }
        other => panic!("expected a decision, got {other:?}"),
    }
    let current = status.latest();
    assert_eq!(current.severity, Severity::Denied);
    assert!(current.text.contains("AAA0000"));
}

#[test]
fn decision_is_momentary() {
    let (recognizer, _calls) = ScriptedRecognizer::always("XYZ9999");
    let clock = ManualClock::new();
    let (mut scan, ctx, _status) = scan_loop(
        recognizer,
        registry_with(&["XYZ9999"]),
        ScriptedSource::frames(0),
        CountingDisplay::new(DisplayProbe::default()),
        clock.clone(),
    );

    scan.step(&frame()).unwrap();
    assert_eq!(ctx.state(), LoopState::Granted);

    clock.advance(Duration::from_millis(100));
    assert_eq!(scan.step(&frame()).unwrap(), CycleOutcome::Debounced);
    assert_eq!(ctx.state(), LoopState::Scanning);
}

#[test]
fn empty_recognition_changes_nothing() {
    let (mut scan, ctx, mut status) = single_step_loop("  ", registry_with(&["XYZ9999"]));
    let events = ctx.events();

    assert_eq!(scan.step(&frame()).unwrap(), CycleOutcome::NoPlate);
    assert!(status.poll().is_none());
    assert!(events.try_recv().is_err());
    assert_eq!(ctx.state(), LoopState::Scanning);
}

#[test]
fn registry_outage_fails_closed() {
    let (mut scan, ctx, mut status) = single_step_loop("XYZ9999", Arc::new(OfflineRegistry));

    match scan.step(&frame()).unwrap() {
        CycleOutcome::Decided(event) => assert_eq!(event.outcome, Outcome::Denied),
        other => panic!("expected a decision, got {other:?}"),
    }
    let current = status.latest().clone();
    assert_eq!(current.severity, Severity::Error);
    assert_eq!(current.state, LoopState::Error);
    assert!(current.text.contains("XYZ9999"));
    assert_ne!(current.severity, Severity::Granted);
    assert_eq!(ctx.state(), LoopState::Error);
}

#[test]
fn scanning_continues_through_a_registry_outage() {
    let (recognizer, calls) = ScriptedRecognizer::always("XYZ9999");
    let clock = ManualClock::new();
    let (mut scan, ctx, mut status) = scan_loop(
        recognizer,
        Arc::new(OfflineRegistry),
        ScriptedSource::frames(20).on_clock(clock.clone(), Duration::from_millis(300)),
        CountingDisplay::quitting_after(DisplayProbe::default(), 12),
        clock,
    );
    let events = ctx.events();

    let exit = scan.run(&CancellationToken::default()).unwrap();

    assert!(matches!(exit, SessionExit::Quit));
    // Frames at 300ms..3600ms: attempts at 300, 900, 1500, 2100, 2700 and 3300.
    assert_eq!(calls.load(Ordering::SeqCst), 6);
    let outcomes: Vec<Outcome> = events.try_iter().map(|event| event.outcome).collect();
    assert_eq!(outcomes, vec![Outcome::Denied; 6]);
    assert_eq!(status.latest().severity, Severity::Error);
}

#[test]
fn recognition_is_debounced_while_display_keeps_up() {
    let (recognizer, calls) = ScriptedRecognizer::always("AAA0000");
    let clock = ManualClock::new();
    let probe = DisplayProbe::default();
    let (mut scan, _ctx, _status) = scan_loop(
        recognizer,
        registry_with(&[]),
        ScriptedSource::frames(30).on_clock(clock.clone(), Duration::from_millis(100)),
        CountingDisplay::quitting_after(probe.clone(), 30),
        clock,
    );

    let exit = scan.run(&CancellationToken::default()).unwrap();

    assert!(matches!(exit, SessionExit::Quit));
    assert_eq!(probe.shown(), 30);
    // Frames at 100ms..3000ms: attempts at 100, 700, 1300, 1900 and 2500.
    assert_eq!(calls.load(Ordering::SeqCst), 5);
}

#[test]
fn malformed_frame_is_skipped() {
    let (recognizer, calls) = ScriptedRecognizer::always("XYZ9999");
    let probe = DisplayProbe::default();
    let (mut scan, _ctx, mut status) = scan_loop(
        recognizer,
        registry_with(&["XYZ9999"]),
        ScriptedSource::frames(0),
        CountingDisplay::new(probe.clone()),
        ManualClock::new(),
    );

    assert_eq!(scan.step(&frame_of(1, 1, CV_8UC3)).unwrap(), CycleOutcome::NoPlate);
    assert_eq!(probe.shown(), 1);
    assert_eq!(probe.annotated(), 0);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(status.poll().is_none());
}

#[test]
fn unsupported_pixel_layout_is_skipped() {
    let (recognizer, calls) = ScriptedRecognizer::always("XYZ9999");
    let (mut scan, _ctx, _status) = scan_loop(
        recognizer,
        registry_with(&["XYZ9999"]),
        ScriptedSource::frames(0),
        CountingDisplay::new(DisplayProbe::default()),
        ManualClock::new(),
    );

    assert_eq!(scan.step(&frame_of(120, 160, CV_8UC2)).unwrap(), CycleOutcome::NoPlate);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn scanning_continues_after_a_skipped_cycle() {
    let (recognizer, calls) = ScriptedRecognizer::always("XYZ9999");
    let clock = ManualClock::new();
    let (mut scan, _ctx, _status) = scan_loop(
        recognizer,
        registry_with(&["XYZ9999"]),
        ScriptedSource::frames(0),
        CountingDisplay::new(DisplayProbe::default()),
        clock.clone(),
    );

    assert_eq!(scan.step(&frame_of(1, 1, CV_8UC3)).unwrap(), CycleOutcome::NoPlate);
    clock.advance(Duration::from_millis(600));
    assert!(matches!(
        scan.step(&frame()).unwrap(),
        CycleOutcome::Decided(_)
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn recognizer_failure_stops_the_loop() {
    let (recognizer, _calls) = ScriptedRecognizer::script(
        "XYZ9999",
        vec![Err(PlateError::recognition("tesseract crashed"))],
    );
    let clock = ManualClock::new();
    let (mut scan, ctx, mut status) = scan_loop(
        recognizer,
        registry_with(&["XYZ9999"]),
        ScriptedSource::frames(10).on_clock(clock.clone(), Duration::from_millis(100)),
        CountingDisplay::new(DisplayProbe::default()),
        clock,
    );

    let err = scan.run(&CancellationToken::default()).unwrap_err();

    assert!(matches!(err, PlateError::RecognitionUnavailable { .. }));
    assert_eq!(status.latest().severity, Severity::Error);
    assert_eq!(ctx.state(), LoopState::Error);
}

#[test]
fn capture_failure_stops_the_loop() {
    let (recognizer, _calls) = ScriptedRecognizer::always("");
    let (mut scan, ctx, mut status) = scan_loop(
        recognizer,
        registry_with(&[]),
        ScriptedSource::frames(3),
        CountingDisplay::new(DisplayProbe::default()),
        ManualClock::new(),
    );

    let err = scan.run(&CancellationToken::default()).unwrap_err();

    assert!(matches!(err, PlateError::CaptureFailure { .. }));
    let current = status.latest();
    assert_eq!(current.state, LoopState::Error);
    assert!(current.text.contains("camera unplugged"));
    assert_eq!(ctx.state(), LoopState::Error);
}

#[test]
fn cancelled_token_stops_before_reading() {
    let (recognizer, calls) = ScriptedRecognizer::always("XYZ9999");
    let probe = DisplayProbe::default();
    let (mut scan, _ctx, _status) = scan_loop(
        recognizer,
        registry_with(&["XYZ9999"]),
        ScriptedSource::frames(10),
        CountingDisplay::new(probe.clone()),
        ManualClock::new(),
    );
    let token = CancellationToken::default();
    token.cancel();

    assert!(matches!(scan.run(&token).unwrap(), SessionExit::Stopped));
    assert_eq!(probe.shown(), 0);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}
