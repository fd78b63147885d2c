use facegate_core::{Detection, EmbeddingProvider, Frame, ProviderError};
use facegate_hw::{CameraError, FrameSource};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error("embedding provider unavailable: {0}")]
    ProviderUnavailable(String),
    #[error("camera unavailable: {0}")]
    CameraUnavailable(String),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Lifecycle of one engine-owned resource (provider or camera).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ComponentState {
    Loading,
    Ready { name: String },
    Disabled,
    Failed { error: String },
    Released,
}

impl ComponentState {
    pub fn is_ready(&self) -> bool {
        matches!(self, ComponentState::Ready { .. })
    }

    fn unavailable_reason(&self) -> String {
        match self {
            ComponentState::Loading => "still loading".into(),
            ComponentState::Ready { name } => format!("{name} ready"),
            ComponentState::Disabled => "disabled".into(),
            ComponentState::Failed { error } => error.clone(),
            ComponentState::Released => "released".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineStatus {
    pub provider: ComponentState,
    pub camera: ComponentState,
}

/// Outcome of one live-frame detection.
#[derive(Debug)]
pub enum LiveDetection {
    /// Camera is streaming but the frame is not usable yet.
    NotReady,
    NoFace,
    Face(Detection),
}

/// Builds the embedding provider on the engine thread.
pub type ProviderLoader =
    Box<dyn FnOnce() -> Result<Box<dyn EmbeddingProvider>, ProviderError> + Send>;

/// Opens the frame source on the engine thread. `Ok(None)` means disabled.
pub type CameraOpener =
    Box<dyn FnOnce() -> Result<Option<Box<dyn FrameSource>>, CameraError> + Send>;

/// Messages sent to the engine thread.
enum EngineRequest {
    DetectImage {
        frame: Frame,
        reply: oneshot::Sender<Result<Option<Detection>, EngineError>>,
    },
    DetectLive {
        reply: oneshot::Sender<Result<LiveDetection, EngineError>>,
    },
    ReleaseCamera {
        reply: oneshot::Sender<()>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    status: watch::Receiver<EngineStatus>,
}

impl EngineHandle {
    /// Detect a face in an uploaded image.
    pub async fn detect_image(&self, frame: Frame) -> Result<Option<Detection>, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.request(EngineRequest::DetectImage { frame, reply }).await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Grab the current camera frame and detect a face in it.
    pub async fn detect_live(&self) -> Result<LiveDetection, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.request(EngineRequest::DetectLive { reply }).await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Stop the camera stream. Idempotent.
    pub async fn release_camera(&self) -> Result<(), EngineError> {
        let (reply, rx) = oneshot::channel();
        self.request(EngineRequest::ReleaseCamera { reply }).await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    pub fn status(&self) -> EngineStatus {
        self.status.borrow().clone()
    }

    /// True once models are loaded and the camera is streaming.
    pub fn live_ready(&self) -> bool {
        let status = self.status.borrow();
        status.provider.is_ready() && status.camera.is_ready()
    }

    async fn request(&self, req: EngineRequest) -> Result<(), EngineError> {
        self.tx.send(req).await.map_err(|_| EngineError::ChannelClosed)
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The provider and camera are built on that thread, so inference sessions
/// and the device handle never cross threads. Requests queued while the
/// models load are served once loading finishes. Load failures are
/// reported through [`EngineStatus`] and every later request touching the
/// failed resource gets an error; the engine keeps serving.
pub fn spawn_engine(
    load_provider: ProviderLoader,
    open_camera: CameraOpener,
) -> Result<EngineHandle, EngineError> {
    let (status_tx, status_rx) = watch::channel(EngineStatus {
        provider: ComponentState::Loading,
        camera: ComponentState::Loading,
    });
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("facegate-engine".into())
        .spawn(move || {
            let mut provider = match load_provider() {
                Ok(p) => {
                    tracing::info!(provider = p.name(), "embedding provider loaded");
                    status_tx.send_modify(|s| s.provider = ComponentState::Ready { name: p.name().to_string() });
                    Some(p)
                }
                Err(e) => {
                    tracing::error!(error = %e, "embedding provider failed to load");
                    status_tx.send_modify(|s| s.provider = ComponentState::Failed { error: e.to_string() });
                    None
                }
            };

            let mut camera = match open_camera() {
                Ok(Some(c)) => {
                    tracing::info!(camera = %c.describe(), "camera ready");
                    status_tx.send_modify(|s| s.camera = ComponentState::Ready { name: c.describe() });
                    Some(c)
                }
                Ok(None) => {
                    tracing::info!("camera disabled; live comparison off");
                    status_tx.send_modify(|s| s.camera = ComponentState::Disabled);
                    None
                }
                Err(e) => {
                    tracing::error!(error = %e, "camera unavailable; live comparison off");
                    status_tx.send_modify(|s| s.camera = ComponentState::Failed { error: e.to_string() });
                    None
                }
            };

            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::DetectImage { frame, reply } => {
                        let result = match provider.as_mut() {
                            Some(p) => p.detect(&frame).map_err(EngineError::from),
                            None => Err(provider_unavailable(&status_tx)),
                        };
                        let _ = reply.send(result);
                    }
                    EngineRequest::DetectLive { reply } => {
                        let result = run_live(provider.as_mut(), camera.as_mut(), &status_tx);
                        let _ = reply.send(result);
                    }
                    EngineRequest::ReleaseCamera { reply } => {
                        release(&mut camera, &status_tx);
                        let _ = reply.send(());
                    }
                }
            }

            release(&mut camera, &status_tx);
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle {
        tx,
        status: status_rx,
    })
}

fn run_live(
    provider: Option<&mut Box<dyn EmbeddingProvider>>,
    camera: Option<&mut Box<dyn FrameSource>>,
    status: &watch::Sender<EngineStatus>,
) -> Result<LiveDetection, EngineError> {
    let provider = provider.ok_or_else(|| provider_unavailable(status))?;
    let camera = camera.ok_or_else(|| {
        EngineError::CameraUnavailable(status.borrow().camera.unavailable_reason())
    })?;

    let Some(frame) = camera.capture()? else {
        return Ok(LiveDetection::NotReady);
    };
    Ok(match provider.detect(&frame)? {
        Some(detection) => LiveDetection::Face(detection),
        None => LiveDetection::NoFace,
    })
}

fn provider_unavailable(status: &watch::Sender<EngineStatus>) -> EngineError {
    EngineError::ProviderUnavailable(status.borrow().provider.unavailable_reason())
}

fn release(camera: &mut Option<Box<dyn FrameSource>>, status: &watch::Sender<EngineStatus>) {
    if let Some(mut c) = camera.take() {
        c.release();
        status.send_modify(|s| s.camera = ComponentState::Released);
    }
}
