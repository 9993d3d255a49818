//! Face encoding: image in, embeddings out.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError, ARCFACE_MODEL_VERSION};
use crate::types::{BoundingBox, Embedding};
use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// One face found in an image.
#[derive(Debug, Clone)]
pub struct FaceCapture {
    pub face: BoundingBox,
    pub embedding: Embedding,
}

/// Turns images into face embeddings.
pub trait FaceEncoder: Send {
    /// Every face in the image, best first.
    fn encode_all(&mut self, image: &RgbImage) -> Result<Vec<FaceCapture>, EncoderError>;

    /// The best face only; `None` if there is no face.
    fn encode(&mut self, image: &RgbImage) -> Result<Option<FaceCapture>, EncoderError> {
        Ok(self.encode_all(image)?.into_iter().next())
    }

    fn model_version(&self) -> &str;
}

/// SCRFD detection followed by ArcFace recognition.
pub struct OnnxFaceEncoder {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxFaceEncoder {
    pub fn load(detector_path: &str, recognizer_path: &str) -> Result<Self, EncoderError> {
        let detector = FaceDetector::load(detector_path)?;
        let recognizer = FaceRecognizer::load(recognizer_path)?;
        Ok(Self { detector, recognizer })
    }
}

impl FaceEncoder for OnnxFaceEncoder {
    fn encode_all(&mut self, image: &RgbImage) -> Result<Vec<FaceCapture>, EncoderError> {
        let faces = self.detector.detect(image)?;
        tracing::debug!(faces = faces.len(), "detected faces");

        faces
            .into_iter()
            .map(|face| -> Result<FaceCapture, EncoderError> {
                let embedding = self.recognizer.extract(image, &face)?;
                Ok(FaceCapture { face, embedding })
            })
            .collect()
    }

    // Single-face path skips recognition of the other faces.
    fn encode(&mut self, image: &RgbImage) -> Result<Option<FaceCapture>, EncoderError> {
        let Some(face) = self.detector.detect(image)?.into_iter().next() else {
            return Ok(None);
        };
        tracing::debug!(confidence = face.confidence, "best face selected");
        let embedding = self.recognizer.extract(image, &face)?;
        Ok(Some(FaceCapture { face, embedding }))
    }

    fn model_version(&self) -> &str {
        ARCFACE_MODEL_VERSION
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    /// One "face" per distinct non-black column colour.
    struct ColumnEncoder;

    impl FaceEncoder for ColumnEncoder {
        fn encode_all(&mut self, image: &RgbImage) -> Result<Vec<FaceCapture>, EncoderError> {
            Ok((0..image.width())
                .map(|x| image.get_pixel(x, 0).0)
                .filter(|p| *p != [0, 0, 0])
                .map(|p| FaceCapture {
                    face: BoundingBox {
                        x: 0.0,
                        y: 0.0,
                        width: 1.0,
                        height: 1.0,
                        confidence: 1.0,
                        landmarks: None,
                    },
                    embedding: Embedding::new(p.iter().map(|&c| c as f32).collect()),
                })
                .collect())
        }

        fn model_version(&self) -> &str {
            "column"
        }
    }

    #[test]
    fn test_encode_defaults_to_first_face() {
        let mut image = RgbImage::new(3, 1);
        image.put_pixel(1, 0, Rgb([9, 8, 7]));
        image.put_pixel(2, 0, Rgb([1, 2, 3]));

        let best = ColumnEncoder.encode(&image).unwrap().unwrap();
        assert_eq!(best.embedding.values, vec![9.0, 8.0, 7.0]);
    }

    #[test]
    fn test_encode_no_face() {
        let image = RgbImage::new(3, 1);
        assert!(ColumnEncoder.encode(&image).unwrap().is_none());
    }

    #[test]
    fn test_onnx_encoder_requires_models() {
        let err = OnnxFaceEncoder::load("/nonexistent/det.onnx", "/nonexistent/rec.onnx")
            .err()
            .unwrap();
        assert!(matches!(err, EncoderError::Detector(DetectorError::ModelNotFound(_))));
    }
}
