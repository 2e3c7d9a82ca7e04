use crate::engine::{EngineError, EngineHandle, ProgressEvent};
use facematch_core::ProgressReport;
use tokio::sync::mpsc;
use zbus::interface;
use zbus::object_server::SignalEmitter;

pub const BUS_NAME: &str = "org.freedesktop.Facematch1";
pub const OBJECT_PATH: &str = "/org/freedesktop/Facematch1";

/// D-Bus interface for the Facematch session daemon.
///
/// Bus name: org.freedesktop.Facematch1
/// Object path: /org/freedesktop/Facematch1
pub struct FacematchService {
    engine: EngineHandle,
    model: String,
    max_image_bytes: usize,
}

impl FacematchService {
    pub fn new(engine: EngineHandle, model: String, max_image_bytes: usize) -> Self {
        Self {
            engine,
            model,
            max_image_bytes,
        }
    }

    fn check_size(&self, image: &[u8]) -> zbus::fdo::Result<()> {
        if image.len() > self.max_image_bytes {
            return Err(zbus::fdo::Error::InvalidArgs(format!(
                "image is {} bytes; limit is {}",
                image.len(),
                self.max_image_bytes
            )));
        }
        Ok(())
    }
}

impl From<EngineError> for zbus::fdo::Error {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Codec(_) | EngineError::Validation(_) | EngineError::UnknownFace(_) => {
                zbus::fdo::Error::InvalidArgs(err.to_string())
            }
            EngineError::ChannelClosed => zbus::fdo::Error::Failed(err.to_string()),
        }
    }
}

#[interface(name = "org.freedesktop.Facematch1")]
impl FacematchService {
    /// Register a named face. Returns the new face id.
    async fn register(
        &self,
        name: &str,
        image: Vec<u8>,
        media_type: &str,
    ) -> zbus::fdo::Result<String> {
        tracing::info!(name, media_type, len = image.len(), "register requested");
        self.check_size(&image)?;
        let face = self
            .engine
            .register(name.to_string(), image, media_type.to_string())
            .await?;
        Ok(face.id)
    }

    /// Delete a face by id. Unknown ids are not an error.
    async fn delete(&self, id: &str) -> zbus::fdo::Result<bool> {
        tracing::info!(id, "delete requested");
        Ok(self.engine.delete(id.to_string()).await?)
    }

    /// Registered faces in registration order, as a JSON array.
    async fn list_faces(&self) -> zbus::fdo::Result<String> {
        let faces = self.engine.list().await?;
        serde_json::to_string(&faces).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    /// Raw image bytes and media type of a registered face.
    async fn get_image(&self, id: &str) -> zbus::fdo::Result<(Vec<u8>, String)> {
        let image = self.engine.get_image(id.to_string()).await?;
        let bytes = image
            .decode()
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;
        Ok((bytes, image.mime_type().to_string()))
    }

    /// Start a recognition attempt. Progress arrives as `RecognitionProgress`
    /// signals carrying the returned attempt id.
    async fn recognize(&self, image: Vec<u8>, media_type: &str) -> zbus::fdo::Result<String> {
        tracing::info!(media_type, len = image.len(), "recognize requested");
        self.check_size(&image)?;
        Ok(self
            .engine
            .recognize(image, media_type.to_string())
            .await?)
    }

    /// Stop an attempt before its next comparison.
    async fn cancel(&self, attempt_id: &str) -> zbus::fdo::Result<bool> {
        Ok(self.engine.cancel(attempt_id.to_string()).await?)
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let status = self.engine.status().await?;
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "model": self.model,
            "registered": status.registered,
            "active_attempts": status.active_attempts,
        })
        .to_string())
    }

    /// One recognition state transition; `report` is a JSON `ProgressReport`.
    #[zbus(signal)]
    async fn recognition_progress(
        emitter: &SignalEmitter<'_>,
        attempt_id: &str,
        report: &str,
    ) -> zbus::Result<()>;
}

/// Relay engine progress events as D-Bus signals until the engine goes away.
pub async fn forward_progress(
    connection: zbus::Connection,
    mut events: mpsc::UnboundedReceiver<ProgressEvent>,
) -> zbus::Result<()> {
    let emitter = SignalEmitter::new(&connection, OBJECT_PATH)?;
    while let Some(event) = events.recv().await {
        let report = match serde_json::to_string(&ProgressReport::from(&event.state)) {
            Ok(json) => json,
            Err(err) => {
                tracing::warn!(error = %err, "cannot serialize progress report");
                continue;
            }
        };
        if let Err(err) =
            FacematchService::recognition_progress(&emitter, &event.attempt_id, &report).await
        {
            tracing::warn!(attempt = %event.attempt_id, error = %err, "failed to emit progress signal");
        }
    }
    Ok(())
}
