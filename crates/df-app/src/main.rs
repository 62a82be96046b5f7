use std::path::PathBuf;
use std::sync::Arc;
use anyhow::{Context, bail};
use log::info;
use winit::event_loop::{ControlFlow, EventLoop};
use df_app::app::App;
use df_app::backend::{GenBackend, JobApi};
use df_app::config::Config;
use df_app::events::UiEvent;
use df_app::state::DownloadState;
use df_app::viewer::ViewerApp;
use df_app::viewport::renderer::HeadlessRenderer;
use df_core::JobStatus;

const USAGE: &str = "usage: depthforge [image.png|image.jpg]\n       depthforge --headless <image.png|image.jpg>";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::load()?;
    let api: Arc<dyn JobApi> = Arc::new(GenBackend::new(config.backend_url.clone()));

    let mut args = std::env::args_os().skip(1).peekable();
    if args.peek().is_some_and(|a| a == "--headless") {
        args.next();
        let image = args.next().map(PathBuf::from).context(USAGE)?;
        return convert_headless(config, api, image).await;
    }

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut viewer = ViewerApp::new(config, api, args.next().map(PathBuf::from));
    event_loop.run_app(&mut viewer)?;

    Ok(())
}

/// Converts one image without a window: download `model.glb` and write a
/// software-rendered preview next to it.
async fn convert_headless(config: Config, api: Arc<dyn JobApi>, image: PathBuf) -> anyhow::Result<()> {
    let mut app = App::new(config.clone(), api, Box::new(HeadlessRenderer::boxed));
    let proxy = app.proxy();

    proxy.send_ui(UiEvent::SelectFile(image));
    proxy.send_ui(UiEvent::Convert);
    app.run_until(|s| s.is_settled() || s.validation_error.is_some()).await;

    if let Some(e) = &app.state.validation_error {
        bail!("{}", e);
    }
    if app.state.job.status == JobStatus::Error {
        bail!("{}", app.state.job.error.clone().unwrap_or_default());
    }
    if let Some(e) = &app.state.asset_error {
        bail!("{}", e);
    }

    proxy.send_ui(UiEvent::Download);
    app.run_until(|s| matches!(s.download, DownloadState::Saved(_) | DownloadState::Failed(_))).await;
    if let DownloadState::Failed(e) = &app.state.download {
        bail!("Download failed: {}", e);
    }

    app.state.frame();
    let preview = config.output_dir.join("preview.png");
    app.state.snapshot(&preview)?;
    info!("Preview written to {}", preview.display());

    proxy.send_ui(UiEvent::Shutdown);
    app.run().await;

    Ok(())
}
