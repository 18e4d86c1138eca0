//! Wire messages exchanged between a caller and the worker host.
//!
//! Every message is a JSON object tagged by `type`. Bitmap pixels travel
//! as base64 so a request fits on one line.
//!
//! ```text
//! -> { "type": "trace", "id": "a", "bitmap": { "width": 2, "height": 1, "data": "..." }, "options": { ... } }
//! -> { "type": "cancel", "id": "a" }
//! <- { "type": "progress", "id": "a", "stage": "trace", "progress": 0.5 }
//! <- { "type": "result", "id": "a", "result": { "svg": "...", "widthPx": 2, ... } }
//! <- { "type": "error", "id": "a", "error": "..." }
//! <- { "type": "cancelled", "id": "a" }
//! ```

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};

use tracery_export::TraceResult;
use tracery_pipeline::{Bitmap, Stage, TraceError, TraceOptions};

/// RGBA pixels as they appear on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitmapWire {
    pub width: u32,
    pub height: u32,
    /// Base64 of `width * height * 4` interleaved RGBA bytes.
    pub data: String,
}

impl BitmapWire {
    /// Encode a bitmap for sending.
    #[must_use]
    pub fn from_bitmap(bitmap: &Bitmap) -> Self {
        Self {
            width: bitmap.width(),
            height: bitmap.height(),
            data: BASE64.encode(bitmap.as_raw()),
        }
    }

    /// Decode and validate the pixel buffer.
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::MalformedRequest`] if `data` is not valid
    /// base64 or does not match the declared dimensions.
    pub fn decode(&self) -> Result<Bitmap, TraceError> {
        let bytes = BASE64
            .decode(&self.data)
            .map_err(|e| TraceError::MalformedRequest(format!("bitmap data is not base64: {e}")))?;
        Bitmap::from_rgba(self.width, self.height, bytes)
    }
}

/// Caller to worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum Request {
    /// Start a trace identified by `id`.
    Trace {
        id: String,
        bitmap: BitmapWire,
        #[serde(default)]
        options: TraceOptions,
    },
    /// Cancel the in-flight trace `id`.
    Cancel { id: String },
}

impl Request {
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Trace { id, .. } | Self::Cancel { id } => id,
        }
    }

    /// Parse one JSON line.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] carrying the request id when the line is
    /// a JSON object with a string `id`, so the caller can still be
    /// answered.
    pub fn from_json(line: &str) -> Result<Self, ParseError> {
        serde_json::from_str(line).map_err(|source| ParseError {
            id: recover_id(line),
            source,
        })
    }
}

/// Best-effort extraction of `id` from a line that failed to parse.
fn recover_id(line: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(line).ok()?;
    value.get("id")?.as_str().map(str::to_owned)
}

/// A request line that could not be understood.
#[derive(Debug, thiserror::Error)]
#[error("malformed request: {source}")]
pub struct ParseError {
    /// Id recovered from the raw JSON, if any.
    pub id: Option<String>,
    #[source]
    pub source: serde_json::Error,
}

/// Worker to caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum Response {
    Progress {
        id: String,
        stage: Stage,
        /// Fraction of `stage` completed, 0.0 to 1.0.
        progress: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Result {
        id: String,
        result: TraceResult,
    },
    Error {
        id: String,
        error: String,
    },
    Cancelled {
        id: String,
    },
}

impl Response {
    /// Error response for a failed request.
    #[must_use]
    pub fn error(id: impl Into<String>, error: &TraceError) -> Self {
        Self::Error {
            id: id.into(),
            error: error.to_string(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Progress { id, .. }
            | Self::Result { id, .. }
            | Self::Error { id, .. }
            | Self::Cancelled { id } => id,
        }
    }

    /// `result`, `error` and `cancelled` end a request.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress { .. })
    }
}
