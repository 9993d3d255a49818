//! Face pipeline for the attendance service.
//!
//! Decodes browser captures, finds faces with SCRFD, embeds them with ArcFace
//! (both via ONNX Runtime on the CPU) and matches embeddings by distance.

pub mod alignment;
pub mod capture;
pub mod codec;
pub mod detector;
pub mod encoder;
pub mod recognizer;
pub mod types;

use std::path::PathBuf;

pub use capture::CaptureError;
pub use codec::CodecError;
pub use detector::FaceDetector;
pub use encoder::{EncoderError, FaceCapture, FaceEncoder, OnnxFaceEncoder};
pub use recognizer::FaceRecognizer;
pub use types::{BoundingBox, DistanceMatcher, Embedding, FaceTemplate, MatchResult, Matcher};

/// SCRFD detection model file name.
pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
/// ArcFace recognition model file name.
pub const RECOGNIZER_MODEL_FILE: &str = "w600k_r50.onnx";

/// Default model directory: `$XDG_DATA_HOME/rollcall/models`, falling back to
/// `~/.local/share/rollcall/models`.
pub fn default_model_dir() -> PathBuf {
    data_home().join("rollcall").join("models")
}

/// `$XDG_DATA_HOME`, or `~/.local/share`.
pub fn data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
}
