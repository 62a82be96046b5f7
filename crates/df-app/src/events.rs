use std::path::PathBuf;
use log::warn;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use df_core::JobEvent;
use crate::loader::LoadedModel;

#[derive(Debug, Clone)]
pub enum DfEvent {
    Ui(UiEvent),
    Gen(GenEvent),
    Asset(AssetEvent),
}

/// User intents coming from the surface hosting the viewport.
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    SelectFile(PathBuf),
    Convert,
    Download,
    ResetCamera,
    Resize { width: u32, height: u32 },
    Orbit { dx: f32, dy: f32 },
    Zoom(f32),
    Shutdown,
}

/// Results of upload and poll requests, in the order they completed.
#[derive(Debug, Clone)]
pub enum GenEvent {
    Job(JobEvent),
}

#[derive(Debug, Clone)]
pub enum AssetEvent {
    Loaded { url: String, model: LoadedModel },
    Failed { url: String, error: String },
    Downloaded(PathBuf),
    DownloadFailed(String),
}

/// Cloneable sender handed to background tasks; the app loop owns the receiver.
#[derive(Debug, Clone)]
pub struct EventProxy {
    tx: UnboundedSender<DfEvent>,
}

impl EventProxy {
    pub fn channel() -> (Self, UnboundedReceiver<DfEvent>) {
        let (tx, rx) = unbounded_channel();
        (Self { tx }, rx)
    }

    /// Returns false once the app loop has gone away.
    pub fn send_event(&self, event: DfEvent) -> bool {
        match self.tx.send(event) {
            Ok(()) => true,
            Err(e) => {
                warn!("Dropping event, app loop closed: {:?}", e.0);
                false
            }
        }
    }

    pub fn send_ui(&self, event: UiEvent) -> bool {
        self.send_event(DfEvent::Ui(event))
    }

    pub fn send_job(&self, event: JobEvent) -> bool {
        self.send_event(DfEvent::Gen(GenEvent::Job(event)))
    }

    pub fn send_asset(&self, event: AssetEvent) -> bool {
        self.send_event(DfEvent::Asset(event))
    }
}
