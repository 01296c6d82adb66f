//! Protocol detection module
//!
//! This module decides, from the first line of a connection, whether the
//! client speaks STOMP or an HTTP dialect, and rewires the connection
//! pipeline accordingly without losing any of the bytes it looked at.
//!
//! - [`scanner`]: buffered line scanner with mark/rewind
//! - [`classifier`]: pure first-line classification
//! - [`detector`]: the one-shot pipeline stage tying them together

pub mod classifier;
pub mod detector;
pub mod scanner;

pub use classifier::{classify, Classifier, ProtocolTag, StompCommandClassifier};
pub use detector::{DetectorState, ProtocolDetector, DEFAULT_MAX_LINE_LENGTH, DETECTOR_STAGE};
pub use scanner::{Line, LineScanner, ScanMark};
