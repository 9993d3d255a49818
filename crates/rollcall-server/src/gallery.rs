//! In-memory identification gallery.

use rollcall_core::{DistanceMatcher, Embedding, FaceTemplate, Matcher};
use serde::Serialize;
use tokio::sync::RwLock;

/// Outcome of a 1:N search for one probe face.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Identification {
    pub matched: bool,
    pub reg_id: Option<String>,
    pub name: Option<String>,
    pub role: Option<String>,
    /// Smallest distance seen, even when nothing matched.
    pub distance: Option<f32>,
}

/// Every stored template, kept in memory for identification.
#[derive(Default)]
pub struct Gallery {
    templates: RwLock<Vec<FaceTemplate>>,
}

impl Gallery {
    pub fn new(templates: Vec<FaceTemplate>) -> Self {
        Self {
            templates: RwLock::new(templates),
        }
    }

    pub async fn len(&self) -> usize {
        self.templates.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.templates.read().await.is_empty()
    }

    /// Add a template, replacing any existing one for the same reg_id.
    pub async fn upsert(&self, template: FaceTemplate) {
        let mut templates = self.templates.write().await;
        match templates.iter_mut().find(|t| t.reg_id == template.reg_id) {
            Some(existing) => *existing = template,
            None => templates.push(template),
        }
    }

    /// Drop the whole gallery and load a fresh copy.
    pub async fn replace(&self, fresh: Vec<FaceTemplate>) {
        *self.templates.write().await = fresh;
    }

    pub async fn identify(&self, probe: &Embedding, threshold: f32) -> Identification {
        let templates = self.templates.read().await;
        let result = DistanceMatcher.compare(probe, &templates, threshold);
        let owner = result.index.and_then(|i| templates.get(i)).filter(|_| result.matched);

        Identification {
            matched: result.matched,
            reg_id: owner.map(|t| t.reg_id.clone()),
            name: owner.map(|t| t.name.clone()),
            role: owner.map(|t| t.role.clone()),
            distance: result.distance,
        }
    }
}
