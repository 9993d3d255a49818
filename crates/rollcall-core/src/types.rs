use serde::{Deserialize, Serialize};

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Cosine similarity in [-1, 1]. Higher = more similar.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 { dot / denom } else { 0.0 }
    }

    /// Euclidean distance, or `None` when the dimensions differ.
    pub fn euclidean_distance(&self, other: &Embedding) -> Option<f32> {
        if self.values.len() != other.values.len() {
            return None;
        }
        let sum = self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>();
        Some(sum.sqrt())
    }
}

/// A stored face encoding together with the owner fields shown on a match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceTemplate {
    pub reg_id: String,
    pub name: String,
    pub role: String,
    pub embedding: Embedding,
}

/// Result of matching a probe embedding against a gallery.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub matched: bool,
    /// Smallest distance seen, `None` when nothing was comparable.
    pub distance: Option<f32>,
    /// reg_id of the matched template (if any).
    pub reg_id: Option<String>,
    /// Index into the gallery of the matched template (if any).
    #[serde(skip)]
    pub index: Option<usize>,
}

impl MatchResult {
    pub fn no_match(distance: Option<f32>) -> Self {
        Self {
            matched: false,
            distance,
            reg_id: None,
            index: None,
        }
    }
}

/// Strategy for comparing probe embeddings against enrolled faces.
pub trait Matcher {
    /// 1:1 check of a probe against one stored embedding.
    fn verify(&self, probe: &Embedding, stored: &Embedding, tolerance: f32) -> bool;

    /// 1:N search of a probe over a gallery.
    fn compare(&self, probe: &Embedding, gallery: &[FaceTemplate], threshold: f32) -> MatchResult;
}

/// Euclidean-distance matcher over L2-normalized embeddings (distances in [0, 2]).
///
/// Gallery traversal always visits every entry, so timing does not reveal
/// where (or whether) a match sits in the gallery.
pub struct DistanceMatcher;

impl Matcher for DistanceMatcher {
    fn verify(&self, probe: &Embedding, stored: &Embedding, tolerance: f32) -> bool {
        match probe.euclidean_distance(stored) {
            Some(distance) => distance <= tolerance,
            None => false,
        }
    }

    fn compare(&self, probe: &Embedding, gallery: &[FaceTemplate], threshold: f32) -> MatchResult {
        let mut best_dist = f32::INFINITY;
        let mut best_idx: Option<usize> = None;

        for (i, template) in gallery.iter().enumerate() {
            let Some(dist) = probe.euclidean_distance(&template.embedding) else {
                continue;
            };
            if dist < best_dist {
                best_dist = dist;
                best_idx = Some(i);
            }
        }

        match best_idx {
            Some(idx) if best_dist < threshold => MatchResult {
                matched: true,
                distance: Some(best_dist),
                reg_id: Some(gallery[idx].reg_id.clone()),
                index: Some(idx),
            },
            Some(_) => MatchResult::no_match(Some(best_dist)),
            None => MatchResult::no_match(None),
        }
    }
}
