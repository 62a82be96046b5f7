use std::path::PathBuf;
use std::sync::Arc;
use chrono::Utc;
use log::{debug, error, info, warn};
use tokio::task::JoinHandle;
use df_core::{Job, JobEvent, JobStatus, StepState, transition};
use crate::backend::JobApi;
use crate::config::Config;
use crate::download::spawn_download;
use crate::error::AppError;
use crate::events::{AssetEvent, EventProxy, GenEvent, UiEvent};
use crate::loader::{AssetLoader, LOAD_FAILED, LoadedModel};
use crate::poller::{PollSettings, PollerHandle};
use crate::upload::{ImageFile, spawn_submit};
use crate::viewport::ViewportHandle;
use crate::viewport::renderer::RenderBackend;
use crate::viewport::surface::{SurfaceSize, SurfaceHost};

/// Builds a render surface for a new viewport.
pub type RendererFactory = Box<dyn Fn(SurfaceSize) -> Box<dyn RenderBackend> + Send>;

#[derive(Debug, Clone, PartialEq)]
pub enum DownloadState {
    Idle,
    InProgress,
    Saved(PathBuf),
    Failed(String),
}

pub struct AppState {
    config: Config,
    api: Arc<dyn JobApi>,
    proxy: EventProxy,
    renderer_factory: RendererFactory,

    pub host: SurfaceHost,
    pub job: Job,
    pub selected: Option<ImageFile>,
    pub validation_error: Option<String>,
    pub asset_error: Option<String>,
    pub download: DownloadState,

    poller: Option<PollerHandle>,
    loader: AssetLoader,
    viewport: Option<ViewportHandle>,
    tasks: Vec<JoinHandle<()>>,
}

impl AppState {
    pub fn new(
        config: Config,
        api: Arc<dyn JobApi>,
        proxy: EventProxy,
        renderer_factory: RendererFactory,
    ) -> Self {
        let host = SurfaceHost::new(SurfaceSize::new(config.viewport_width, config.viewport_height));
        let loader = AssetLoader::new(api.clone(), proxy.clone());

        Self {
            config,
            api,
            proxy,
            renderer_factory,
            host,
            job: Job::default(),
            selected: None,
            validation_error: None,
            asset_error: None,
            download: DownloadState::Idle,
            poller: None,
            loader,
            viewport: None,
            tasks: Vec::new(),
        }
    }

    pub fn viewport(&self) -> Option<&ViewportHandle> {
        self.viewport.as_ref()
    }

    pub fn is_polling(&self) -> bool {
        self.poller.as_ref().is_some_and(|p| !p.is_finished())
    }

    /// Job id the live poller is following, if any.
    pub fn polling_job(&self) -> Option<&str> {
        self.poller.as_ref().filter(|p| !p.is_finished()).map(|p| p.job_id())
    }

    /// A job is settled once nothing more will happen without user input:
    /// it failed, or it completed and its model load resolved either way.
    pub fn is_settled(&self) -> bool {
        match self.job.status {
            JobStatus::Error => true,
            JobStatus::Complete => {
                self.asset_error.is_some()
                    || self.viewport.as_ref().is_some_and(|v| v.resident_model().is_some())
            }
            _ => false,
        }
    }

    pub fn on_ui_event(&mut self, event: UiEvent) -> Result<(), AppError> {
        match event {
            UiEvent::SelectFile(path) => self.select_file(path),
            UiEvent::Convert => self.convert(),
            UiEvent::Download => self.start_download(),
            UiEvent::ResetCamera => {
                if let Some(viewport) = self.viewport.as_mut() {
                    viewport.reset_camera();
                    info!("Camera reset");
                }
                Ok(())
            }
            UiEvent::Resize { width, height } => {
                self.host.resize(SurfaceSize::new(width, height));
                Ok(())
            }
            UiEvent::Orbit { dx, dy } => {
                if let Some(viewport) = self.viewport.as_mut() {
                    viewport.orbit(dx, dy);
                }
                Ok(())
            }
            UiEvent::Zoom(steps) => {
                if let Some(viewport) = self.viewport.as_mut() {
                    viewport.zoom(steps);
                }
                Ok(())
            }
            UiEvent::Shutdown => {
                self.shutdown();
                Ok(())
            }
        }
    }

    fn select_file(&mut self, path: PathBuf) -> Result<(), AppError> {
        // validation only touches the message, never the job
        self.validation_error = None;

        match ImageFile::open(&path) {
            Ok(file) => {
                info!("Selected {} ({} bytes)", file.name, file.bytes.len());
                self.selected = Some(file);
                Ok(())
            }
            Err(e) if e.is_validation() => {
                warn!("Rejected {}: {}", path.display(), e);
                self.selected = None;
                self.validation_error = Some(e.to_string());
                Err(e)
            }
            Err(e) => {
                warn!("Could not read {}: {}", path.display(), e);
                self.selected = None;
                self.validation_error = Some(format!("Could not read {}: {}", path.display(), e));
                Err(e)
            }
        }
    }

    fn convert(&mut self) -> Result<(), AppError> {
        let Some(file) = self.selected.clone() else {
            let e = AppError::NoFileSelected;
            self.validation_error = Some(e.to_string());
            return Err(e);
        };
        self.validation_error = None;

        if !self.apply(JobEvent::UploadStarted) {
            warn!("Upload already in progress, ignoring convert");
            return Ok(());
        }

        info!("Uploading {} to {}", file.name, self.config.backend_url);
        let task = spawn_submit(self.api.clone(), file, self.proxy.clone());
        self.track(task);
        Ok(())
    }

    fn start_download(&mut self) -> Result<(), AppError> {
        let (JobStatus::Complete, Some(url)) = (self.job.status, self.job.result_url.clone()) else {
            warn!("Nothing to download: job is {:?}", self.job.status);
            return Ok(());
        };

        self.download = DownloadState::InProgress;
        let task = spawn_download(self.api.clone(), url, self.config.output_dir.clone(), self.proxy.clone());
        self.track(task);
        Ok(())
    }

    pub fn on_gen_event(&mut self, event: GenEvent) {
        match event {
            GenEvent::Job(event) => {
                self.apply(event);
            }
        }
    }

    pub fn on_asset_event(&mut self, event: AssetEvent) {
        match event {
            AssetEvent::Loaded { url, model } => self.on_model_loaded(url, model),
            AssetEvent::Failed { url, error } => {
                if !self.loader.is_current(&url) {
                    debug!("Ignoring failure for superseded load {}", url);
                    return;
                }
                error!("Model load failed: {}", error);
                self.asset_error = Some(LOAD_FAILED.to_string());
            }
            AssetEvent::Downloaded(path) => {
                info!("Model saved to {}", path.display());
                self.download = DownloadState::Saved(path);
            }
            AssetEvent::DownloadFailed(e) => {
                error!("Download failed: {}", e);
                self.download = DownloadState::Failed(e);
            }
        }
    }

    fn on_model_loaded(&mut self, url: String, model: LoadedModel) {
        if !self.loader.is_current(&url) {
            debug!("Ignoring superseded load {}", url);
            return;
        }
        let Some(viewport) = self.viewport.as_mut() else {
            debug!("Model {} arrived without a viewport", url);
            return;
        };

        info!("Displaying {} ({} vertices)", model.name, model.vertex_count());
        viewport.replace_model(model);
        self.asset_error = None;
    }

    /// Render loop tick.
    pub fn frame(&mut self) {
        if let Some(viewport) = self.viewport.as_mut() {
            if let Err(e) = viewport.frame() {
                error!("Frame failed: {}", e);
            }
        }
    }

    /// Feeds `event` through the state machine. Returns whether it applied.
    fn apply(&mut self, event: JobEvent) -> bool {
        let Some(next) = transition(&self.job, &event, Utc::now()) else {
            debug!("Ignoring {:?} while {:?}", event, self.job.status);
            return false;
        };

        let previous = self.job.status;
        self.job = next;

        if self.job.status == JobStatus::Processing {
            self.log_progress();
        }
        if previous != self.job.status {
            self.on_status_changed(previous);
        }
        true
    }

    fn on_status_changed(&mut self, previous: JobStatus) {
        info!("Job status {:?} -> {:?}", previous, self.job.status);

        if previous == JobStatus::Complete {
            self.teardown_viewport();
            self.loader.clear();
        }

        match self.job.status {
            JobStatus::Uploading => {
                self.stop_polling();
                self.asset_error = None;
                self.download = DownloadState::Idle;
            }
            JobStatus::Processing => {
                if let Some(job_id) = self.job.id.clone() {
                    self.start_polling(job_id);
                }
            }
            JobStatus::Complete => {
                self.stop_polling();
                if let Some(secs) = self.job.elapsed_secs() {
                    info!("Completed in {}s", secs);
                }
                self.activate_viewport();
                if let Some(url) = self.job.result_url.clone() {
                    self.loader.load(&url);
                }
            }
            JobStatus::Error => {
                self.stop_polling();
                warn!("Job failed: {}", self.job.error.as_deref().unwrap_or_default());
            }
            JobStatus::Idle => {}
        }
    }

    fn log_progress(&self) {
        let steps: Vec<String> = self
            .job
            .progress
            .step_states()
            .iter()
            .map(|(step, state)| {
                let mark = match state {
                    StepState::Complete => "x",
                    StepState::Active => ">",
                    StepState::Pending => " ",
                };
                format!("[{}] {}", mark, step.label())
            })
            .collect();
        info!(
            "{} {} {}",
            self.job.status.icon(),
            steps.join(" "),
            self.job.progress.message
        );
    }

    fn start_polling(&mut self, job_id: String) {
        // at most one poller, and never for a job other than the current one
        self.stop_polling();
        let settings = PollSettings::from(&self.config);
        self.poller = Some(PollerHandle::spawn(self.api.clone(), job_id, settings, self.proxy.clone()));
    }

    fn stop_polling(&mut self) {
        if let Some(poller) = self.poller.take() {
            debug!("Stopping poller for job {}", poller.job_id());
            poller.cancel();
        }
    }

    fn activate_viewport(&mut self) {
        if self.viewport.is_some() {
            return;
        }
        let renderer = (self.renderer_factory)(self.host.size());
        self.viewport = Some(ViewportHandle::activate(&self.host, renderer));
    }

    pub fn teardown_viewport(&mut self) {
        if let Some(mut viewport) = self.viewport.take() {
            viewport.teardown();
        }
    }

    fn track(&mut self, task: JoinHandle<()>) {
        self.tasks.retain(|t| !t.is_finished());
        self.tasks.push(task);
    }

    pub fn snapshot(&self, path: &std::path::Path) -> Result<(), AppError> {
        match self.viewport.as_ref() {
            Some(viewport) => viewport.snapshot(path),
            None => Err(AppError::Render("no viewport is active".into())),
        }
    }

    pub fn shutdown(&mut self) {
        self.stop_polling();
        self.teardown_viewport();
        self.loader.clear();
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for AppState {
    fn drop(&mut self) {
        self.shutdown();
    }
}
