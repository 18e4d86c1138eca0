//! Request lifecycle through the worker host: results, errors and the
//! cancellation guarantee.

#![allow(clippy::unwrap_used, clippy::panic)]

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracery_export::TraceResult;
use tracery_pipeline::{Bitmap, ProgressSink, RgbaImage, Stage, TraceError, TraceOptions};
use tracery_worker::{BitmapWire, Request, Response, TraceEngine, WorkerHost};

const TIMEOUT: Duration = Duration::from_secs(10);

fn square_bitmap() -> Bitmap {
    let img = RgbaImage::from_fn(40, 40, |x, y| {
        let inside = (10..30).contains(&x) && (10..30).contains(&y);
        let v = if inside { 0 } else { 255 };
        image::Rgba([v, v, v, 255])
    });
    Bitmap::from_image(img).unwrap()
}

fn trace_request(id: &str, bitmap: &Bitmap) -> Request {
    Request::Trace {
        id: id.into(),
        bitmap: BitmapWire::from_bitmap(bitmap),
        options: TraceOptions::default(),
    }
}

fn canned_result() -> TraceResult {
    TraceResult {
        svg: "<svg/>".into(),
        width_px: 40,
        height_px: 40,
        path_count: 1,
        node_count: 4,
        warnings: Vec::new(),
    }
}

/// Reports once, blocks until released, then keeps reporting and
/// returns a result without ever checking for cancellation.
struct GatedEngine {
    gate: Mutex<Receiver<()>>,
}

impl GatedEngine {
    fn new() -> (Arc<Self>, Sender<()>) {
        let (tx, rx) = mpsc::channel();
        (
            Arc::new(Self {
                gate: Mutex::new(rx),
            }),
            tx,
        )
    }
}

impl TraceEngine for GatedEngine {
    fn run(
        &self,
        _bitmap: &Bitmap,
        _options: &TraceOptions,
        progress: &mut dyn ProgressSink,
    ) -> Result<TraceResult, TraceError> {
        progress.report(Stage::Trace, 0.1, None);
        match self.gate.lock().unwrap().recv_timeout(TIMEOUT) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {}
            Err(RecvTimeoutError::Timeout) => panic!("gate never opened"),
        }
        for i in 1..=5 {
            progress.report(Stage::Simplify, f64::from(i) / 5.0, None);
        }
        progress.report(Stage::Finalize, 1.0, Some("1 paths"));
        Ok(canned_result())
    }
}

struct PanickingEngine;

impl TraceEngine for PanickingEngine {
    fn run(
        &self,
        _bitmap: &Bitmap,
        _options: &TraceOptions,
        _progress: &mut dyn ProgressSink,
    ) -> Result<TraceResult, TraceError> {
        panic!("contour table corrupted");
    }
}

fn wait_for(rx: &Receiver<Response>, pred: impl Fn(&Response) -> bool) -> Response {
    loop {
        let response = rx.recv_timeout(TIMEOUT).unwrap();
        if pred(&response) {
            return response;
        }
    }
}

fn for_id<'a>(responses: &'a [Response], id: &str) -> Vec<&'a Response> {
    responses.iter().filter(|r| r.id() == id).collect()
}

#[test]
fn pipeline_request_streams_progress_then_result() {
    let (host, rx) = WorkerHost::new();
    host.handle(trace_request("sq", &square_bitmap()));
    host.join();

    let responses: Vec<Response> = rx.iter().collect();
    let (last, progress) = responses.split_last().unwrap();
    assert!(!progress.is_empty());
    assert!(progress.iter().all(|r| matches!(r, Response::Progress { .. })));

    let Response::Result { id, result } = last else {
        panic!("expected a result, got {last:?}");
    };
    assert_eq!(id, "sq");
    assert_eq!(result.width_px, 40);
    assert_eq!(result.path_count, 1);
    assert!(result.svg.contains("<path"));
    assert!(result.svg.contains("tracery:options"));
}

#[test]
fn cancel_after_tracing_started_suppresses_everything_else() {
    let (engine, gate) = GatedEngine::new();
    let (host, rx) = WorkerHost::with_engine(engine);

    host.handle(trace_request("a", &square_bitmap()));
    wait_for(&rx, |r| matches!(r, Response::Progress { .. }));
    host.handle(Request::Cancel { id: "a".into() });
    gate.send(()).unwrap();
    host.join();

    let rest: Vec<Response> = rx.iter().collect();
    assert_eq!(rest, vec![Response::Cancelled { id: "a".into() }]);
}

#[test]
fn cancel_race_yields_exactly_one_terminal_response() {
    for round in 0..20 {
        let (host, rx) = WorkerHost::new();
        let id = format!("race-{round}");
        host.handle(trace_request(&id, &square_bitmap()));
        host.handle(Request::Cancel { id: id.clone() });
        host.join();

        let responses: Vec<Response> = rx.iter().collect();
        let terminals: Vec<usize> = responses
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_terminal())
            .map(|(i, _)| i)
            .collect();
        assert_eq!(terminals.len(), 1, "{responses:?}");
        assert_eq!(terminals[0], responses.len() - 1, "{responses:?}");
        assert!(matches!(
            responses[terminals[0]],
            Response::Cancelled { .. } | Response::Result { .. }
        ));
    }
}

#[test]
fn reused_in_flight_id_gets_exactly_one_terminal_response() {
    let (engine, gate) = GatedEngine::new();
    let (host, rx) = WorkerHost::with_engine(engine);

    host.handle(trace_request("dup", &square_bitmap()));
    let first = wait_for(&rx, |r| matches!(r, Response::Progress { .. }));

    // A valid duplicate, an invalid one and an unparseable line, all
    // naming the running id.
    host.handle(trace_request("dup", &square_bitmap()));
    host.handle(Request::Trace {
        id: "dup".into(),
        bitmap: BitmapWire {
            width: 8,
            height: 8,
            data: String::new(),
        },
        options: TraceOptions::default(),
    });
    host.handle_line(r#"{"type":"trace","id":"dup"}"#);
    assert_eq!(host.in_flight(), 1);

    gate.send(()).unwrap();
    host.join();

    let mut responses = vec![first];
    responses.extend(rx.iter());
    assert!(responses.iter().all(|r| r.id() == "dup"));
    let terminals: Vec<&Response> = responses.iter().filter(|r| r.is_terminal()).collect();
    assert_eq!(
        terminals,
        vec![&Response::Result {
            id: "dup".into(),
            result: canned_result(),
        }],
        "{responses:?}"
    );
    assert_eq!(responses.last(), terminals.last().copied());
}

#[test]
fn id_is_reusable_once_finished() {
    let (host, rx) = WorkerHost::with_engine(Arc::new(PanickingEngine));
    host.handle(trace_request("again", &square_bitmap()));
    wait_for(&rx, Response::is_terminal);
    assert_eq!(host.in_flight(), 0);
    host.handle(trace_request("again", &square_bitmap()));
    host.join();
    let rest: Vec<Response> = rx.iter().collect();
    assert_eq!(rest.iter().filter(|r| r.is_terminal()).count(), 1, "{rest:?}");
}

#[test]
fn engine_panic_becomes_internal_failure() {
    let (host, rx) = WorkerHost::with_engine(Arc::new(PanickingEngine));
    host.handle(trace_request("boom", &square_bitmap()));
    host.join();

    let responses: Vec<Response> = rx.iter().collect();
    assert_eq!(responses.len(), 1);
    let Response::Error { id, error } = &responses[0] else {
        panic!("expected an error, got {responses:?}");
    };
    assert_eq!(id, "boom");
    assert!(error.contains("internal failure"));
    assert!(error.contains("contour table corrupted"));
}

#[test]
fn blank_bitmap_is_reported_as_error() {
    let white = Bitmap::from_image(RgbaImage::from_pixel(16, 16, image::Rgba([255; 4]))).unwrap();
    let (host, rx) = WorkerHost::new();
    host.handle(trace_request("blank", &white));
    host.join();

    let responses: Vec<Response> = rx.iter().collect();
    assert!(matches!(responses.last(), Some(Response::Error { .. })));
    assert!(!responses.iter().any(|r| matches!(r, Response::Result { .. })));
}

#[test]
fn malformed_requests_fail_before_any_work() {
    let (host, rx) = WorkerHost::with_engine(Arc::new(PanickingEngine));

    // Wrong byte count for the declared size.
    host.handle(Request::Trace {
        id: "short".into(),
        bitmap: BitmapWire {
            width: 8,
            height: 8,
            data: String::new(),
        },
        options: TraceOptions::default(),
    });
    // Invalid options.
    host.handle(Request::Trace {
        id: "opts".into(),
        bitmap: BitmapWire::from_bitmap(&square_bitmap()),
        options: TraceOptions {
            thresholds: Some(Vec::new()),
            ..TraceOptions::default()
        },
    });
    // Unparseable line that still names its id.
    host.handle_line(r#"{"type":"trace","id":"nobitmap"}"#);
    // Nothing to answer.
    host.handle_line("not json");
    host.join();

    let responses: Vec<Response> = rx.iter().collect();
    assert_eq!(responses.len(), 3, "{responses:?}");
    for id in ["short", "opts", "nobitmap"] {
        let got = for_id(&responses, id);
        assert_eq!(got.len(), 1);
        let Response::Error { error, .. } = got[0] else {
            panic!("expected an error for {id}");
        };
        assert!(error.starts_with("malformed request"), "{error}");
    }
}

#[test]
fn cancel_for_unknown_id_is_ignored() {
    let (host, rx) = WorkerHost::new();
    host.handle(Request::Cancel { id: "ghost".into() });
    host.join();
    assert_eq!(rx.iter().count(), 0);
}

#[test]
fn concurrent_requests_each_get_one_result() {
    let (host, rx) = WorkerHost::new();
    let bitmap = square_bitmap();
    for id in ["p", "q", "r"] {
        host.handle(trace_request(id, &bitmap));
    }
    host.join();

    let responses: Vec<Response> = rx.iter().collect();
    for id in ["p", "q", "r"] {
        let got = for_id(&responses, id);
        assert_eq!(got.iter().filter(|r| r.is_terminal()).count(), 1);
        assert!(matches!(got.last(), Some(Response::Result { .. })));
    }
}
