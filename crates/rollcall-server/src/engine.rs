use image::RgbImage;
use rollcall_core::{EncoderError, FaceCapture, FaceEncoder};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("encoder error: {0}")]
    Encoder(#[from] EncoderError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Messages sent from request handlers to the engine thread.
enum EngineRequest {
    Encode {
        image: RgbImage,
        reply: oneshot::Sender<Result<Option<FaceCapture>, EngineError>>,
    },
    EncodeAll {
        image: RgbImage,
        reply: oneshot::Sender<Result<Vec<FaceCapture>, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    model_version: Arc<str>,
}

impl EngineHandle {
    /// The best face in the image, or `None` if there is none.
    pub async fn encode(&self, image: RgbImage) -> Result<Option<FaceCapture>, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::Encode { image, reply }).await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Every face in the image, best first.
    pub async fn encode_all(&self, image: RgbImage) -> Result<Vec<FaceCapture>, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::EncodeAll { image, reply }).await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    pub fn model_version(&self) -> &str {
        &self.model_version
    }

    async fn send(&self, req: EngineRequest) -> Result<(), EngineError> {
        self.tx.send(req).await.map_err(|_| EngineError::ChannelClosed)
    }
}

/// Spawn the encoder on a dedicated OS thread.
///
/// Inference needs `&mut` access to the ONNX sessions and is CPU-bound, so it
/// runs off the async runtime. Requests queue on a bounded channel and are
/// served one at a time.
pub fn spawn_engine(mut encoder: Box<dyn FaceEncoder>) -> Result<EngineHandle, EngineError> {
    let model_version: Arc<str> = Arc::from(encoder.model_version());
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(8);

    std::thread::Builder::new()
        .name("rollcall-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Encode { image, reply } => {
                        let result = encoder.encode(&image).map_err(EngineError::from);
                        let _ = reply.send(result);
                    }
                    EngineRequest::EncodeAll { image, reply } => {
                        let result = encoder.encode_all(&image).map_err(EngineError::from);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx, model_version })
}
