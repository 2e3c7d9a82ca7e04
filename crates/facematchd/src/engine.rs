use facematch_core::{
    codec, AttemptState, CancelFlag, CodecError, Comparator, EncodedImage, FaceRegistry,
    FaceSummary, Recognizer, ValidationError,
};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("no registered face with id {0}")]
    UnknownFace(String),
    #[error("engine task exited")]
    ChannelClosed,
}

/// A state transition of one recognition attempt.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub attempt_id: String,
    pub state: AttemptState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStatus {
    pub registered: usize,
    pub active_attempts: usize,
}

/// Messages sent from D-Bus handlers to the engine task.
enum EngineRequest {
    Register {
        name: String,
        image: Vec<u8>,
        media_type: String,
        reply: oneshot::Sender<Result<FaceSummary, EngineError>>,
    },
    Delete {
        id: String,
        reply: oneshot::Sender<bool>,
    },
    List {
        reply: oneshot::Sender<Vec<FaceSummary>>,
    },
    GetImage {
        id: String,
        reply: oneshot::Sender<Result<EncodedImage, EngineError>>,
    },
    Recognize {
        image: Vec<u8>,
        media_type: String,
        reply: oneshot::Sender<String>,
    },
    Cancel {
        attempt_id: String,
        reply: oneshot::Sender<bool>,
    },
    Status {
        reply: oneshot::Sender<EngineStatus>,
    },
    /// Sent by an attempt task once it reached a terminal state.
    Finished { attempt_id: String },
}

/// Clone-safe handle to the engine task.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Encode and register a face.
    pub async fn register(
        &self,
        name: String,
        image: Vec<u8>,
        media_type: String,
    ) -> Result<FaceSummary, EngineError> {
        self.request(|reply| EngineRequest::Register {
            name,
            image,
            media_type,
            reply,
        })
        .await?
    }

    /// Remove a face; `false` if the id was unknown.
    pub async fn delete(&self, id: String) -> Result<bool, EngineError> {
        self.request(|reply| EngineRequest::Delete { id, reply }).await
    }

    pub async fn list(&self) -> Result<Vec<FaceSummary>, EngineError> {
        self.request(|reply| EngineRequest::List { reply }).await
    }

    pub async fn get_image(&self, id: String) -> Result<EncodedImage, EngineError> {
        self.request(|reply| EngineRequest::GetImage { id, reply })
            .await?
    }

    /// Start a recognition attempt against the current registry and return its id.
    ///
    /// Progress, including the terminal state, arrives on the progress channel.
    pub async fn recognize(&self, image: Vec<u8>, media_type: String) -> Result<String, EngineError> {
        self.request(|reply| EngineRequest::Recognize {
            image,
            media_type,
            reply,
        })
        .await
    }

    /// Stop an attempt before its next comparison; `false` if it is not running.
    pub async fn cancel(&self, attempt_id: String) -> Result<bool, EngineError> {
        self.request(|reply| EngineRequest::Cancel { attempt_id, reply })
            .await
    }

    pub async fn status(&self) -> Result<EngineStatus, EngineError> {
        self.request(|reply| EngineRequest::Status { reply }).await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> EngineRequest,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }
}

/// Spawn the engine task.
///
/// The task exclusively owns the registry, so registration and deletion are
/// serialized. Each recognition attempt runs on its own task over a snapshot
/// taken when the request arrived, and publishes its transitions on `progress`.
pub fn spawn_engine<C>(comparator: C, progress: mpsc::UnboundedSender<ProgressEvent>) -> EngineHandle
where
    C: Comparator + Send + Sync + 'static,
{
    let comparator = Arc::new(comparator);
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(16);
    let finished_tx = tx.downgrade();

    tokio::spawn(async move {
        tracing::info!("engine task started");
        let mut registry = FaceRegistry::new();
        let mut attempts: HashMap<String, CancelFlag> = HashMap::new();

        while let Some(req) = rx.recv().await {
            match req {
                EngineRequest::Register {
                    name,
                    image,
                    media_type,
                    reply,
                } => {
                    let result = codec::encode(&image, &media_type)
                        .map_err(EngineError::from)
                        .and_then(|encoded| Ok(registry.register(&name, encoded)?.summary()));
                    if let Err(err) = &result {
                        tracing::info!(error = %err, "registration rejected");
                    }
                    let _ = reply.send(result);
                }
                EngineRequest::Delete { id, reply } => {
                    let _ = reply.send(registry.delete(&id));
                }
                EngineRequest::List { reply } => {
                    let _ = reply.send(registry.list().iter().map(|r| r.summary()).collect());
                }
                EngineRequest::GetImage { id, reply } => {
                    let result = registry
                        .get(&id)
                        .map(|r| r.image.clone())
                        .ok_or(EngineError::UnknownFace(id));
                    let _ = reply.send(result);
                }
                EngineRequest::Recognize {
                    image,
                    media_type,
                    reply,
                } => {
                    let attempt_id = uuid::Uuid::new_v4().to_string();
                    let cancel = CancelFlag::new();
                    attempts.insert(attempt_id.clone(), cancel.clone());
                    tracing::info!(attempt = %attempt_id, faces = registry.len(), "recognition started");

                    spawn_attempt(
                        Arc::clone(&comparator),
                        attempt_id.clone(),
                        image,
                        media_type,
                        registry.snapshot(),
                        cancel,
                        progress.clone(),
                        finished_tx.clone(),
                    );
                    let _ = reply.send(attempt_id);
                }
                EngineRequest::Cancel { attempt_id, reply } => {
                    let found = match attempts.get(&attempt_id) {
                        Some(flag) => {
                            flag.cancel();
                            tracing::info!(attempt = %attempt_id, "cancellation requested");
                            true
                        }
                        None => false,
                    };
                    let _ = reply.send(found);
                }
                EngineRequest::Status { reply } => {
                    let _ = reply.send(EngineStatus {
                        registered: registry.len(),
                        active_attempts: attempts.len(),
                    });
                }
                EngineRequest::Finished { attempt_id } => {
                    attempts.remove(&attempt_id);
                }
            }
        }
        tracing::info!("engine task exiting");
    });

    EngineHandle { tx }
}

#[allow(clippy::too_many_arguments)]
fn spawn_attempt<C>(
    comparator: Arc<C>,
    attempt_id: String,
    image: Vec<u8>,
    media_type: String,
    snapshot: Vec<facematch_core::FaceRecord>,
    cancel: CancelFlag,
    progress: mpsc::UnboundedSender<ProgressEvent>,
    finished: mpsc::WeakSender<EngineRequest>,
) where
    C: Comparator + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let recognizer = Recognizer::new(comparator.as_ref()).with_cancel(cancel);
        recognizer
            .run(&image, &media_type, &snapshot, |state| {
                let _ = progress.send(ProgressEvent {
                    attempt_id: attempt_id.clone(),
                    state: state.clone(),
                });
            })
            .await;

        // The engine may already be gone during shutdown.
        if let Some(tx) = finished.upgrade() {
            let _ = tx.send(EngineRequest::Finished { attempt_id }).await;
        }
    });
}
