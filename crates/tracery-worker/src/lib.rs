//! tracery-worker: the trace pipeline behind a message protocol.
//!
//! A caller sends [`Request`]s (`trace`, `cancel`) and receives a stream
//! of [`Response`]s (`progress`, then exactly one of `result`, `error`
//! or `cancelled` per request). [`WorkerHost`] runs each trace on its own
//! thread so concurrent requests never share mutable state, and catches
//! engine panics so a fault in one request cannot take down the host.
//!
//! The `tracery-worker` binary speaks the same protocol as JSON lines
//! over stdin/stdout.

pub mod host;
pub mod protocol;

pub use host::{PipelineEngine, RequestPhase, TraceEngine, WorkerHost};
pub use protocol::{BitmapWire, ParseError, Request, Response};
