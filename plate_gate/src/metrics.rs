use lazy_static::lazy_static;
use prometheus::register_histogram;
use prometheus::register_int_counter;
use prometheus::register_int_counter_vec;
use prometheus::Encoder;
use prometheus::Histogram;
use prometheus::IntCounter;
use prometheus::IntCounterVec;
use prometheus::TextEncoder;

lazy_static! {
    pub static ref FRAMES_DISPLAYED: IntCounter = register_int_counter!(
        "plate_gate_frames_displayed_total",
        "Frames forwarded to the preview"
    )
    .expect("frames metric registers once");
    pub static ref RECOGNITION_ATTEMPTS: IntCounter = register_int_counter!(
        "plate_gate_recognition_attempts_total",
        "Frames that passed the debounce gate"
    )
    .expect("attempts metric registers once");
    pub static ref DECISIONS: IntCounterVec = register_int_counter_vec!(
        "plate_gate_decisions_total",
        "Access decisions by outcome",
        &["outcome"]
    )
    .expect("decisions metric registers once");
    pub static ref CYCLE_ERRORS: IntCounterVec = register_int_counter_vec!(
        "plate_gate_cycle_errors_total",
        "Errors raised while processing a cycle",
        &["kind"]
    )
    .expect("errors metric registers once");
    pub static ref RECOGNITION_SECONDS: Histogram = register_histogram!(
        "plate_gate_recognition_seconds",
        "Time spent in the text recognizer"
    )
    .expect("latency metric registers once");
}

/// Text exposition of every registered metric.
pub fn render() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if encoder.encode(&prometheus::gather(), &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
