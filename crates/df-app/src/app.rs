use std::sync::Arc;
use std::time::Duration;
use log::{debug, info, warn};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::{MissedTickBehavior, interval};
use crate::backend::JobApi;
use crate::config::Config;
use crate::events::{DfEvent, EventProxy, UiEvent};
use crate::state::{AppState, RendererFactory};

/// Roughly one display refresh.
pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Single owner of [`AppState`]. Background tasks talk to it only through
/// the event channel; rendering happens on frame ticks between events.
pub struct App {
    event_loop_proxy: EventProxy,
    events: UnboundedReceiver<DfEvent>,
    pub state: AppState,
    running: bool,
}

impl App {
    pub fn new(config: Config, api: Arc<dyn JobApi>, renderer_factory: RendererFactory) -> Self {
        let (event_loop_proxy, events) = EventProxy::channel();
        let state = AppState::new(config, api, event_loop_proxy.clone(), renderer_factory);

        Self {
            event_loop_proxy,
            events,
            state,
            running: true,
        }
    }

    pub fn proxy(&self) -> EventProxy {
        self.event_loop_proxy.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn user_event(&mut self, event: DfEvent) {
        match event {
            DfEvent::Ui(UiEvent::Shutdown) => {
                info!("Shutting down");
                self.state.shutdown();
                self.running = false;
            }
            DfEvent::Ui(e) => {
                if let Err(e) = self.state.on_ui_event(e) {
                    warn!("{}", e);
                }
            }
            DfEvent::Gen(e) => self.state.on_gen_event(e),
            DfEvent::Asset(e) => self.state.on_asset_event(e),
        }
    }

    /// Handles every event already queued without waiting for more. The
    /// window front end calls this once per turn of its own event loop.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while self.running {
            match self.events.try_recv() {
                Ok(event) => {
                    self.user_event(event);
                    handled += 1;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    debug!("Event channel closed");
                    self.running = false;
                }
            }
        }
        handled
    }

    /// Runs until shutdown or until `done` holds after an event.
    pub async fn run_until<F>(&mut self, mut done: F)
    where
        F: FnMut(&AppState) -> bool,
    {
        let mut frames = interval(FRAME_INTERVAL);
        frames.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while self.running {
            if done(&self.state) {
                return;
            }

            tokio::select! {
                event = self.events.recv() => match event {
                    Some(event) => self.user_event(event),
                    None => {
                        debug!("Event channel closed");
                        self.running = false;
                    }
                },
                _ = frames.tick() => self.state.frame(),
            }
        }
    }

    pub async fn run(&mut self) {
        self.run_until(|_| false).await
    }
}
