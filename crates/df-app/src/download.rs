use std::path::{Path, PathBuf};
use std::sync::Arc;
use log::{info, warn};
use tokio::task::JoinHandle;
use crate::backend::JobApi;
use crate::error::AppError;
use crate::events::{AssetEvent, EventProxy};

/// Name the finished asset is always saved under.
pub const MODEL_FILENAME: &str = "model.glb";

pub async fn download(api: &dyn JobApi, url: &str, dir: &Path) -> Result<PathBuf, AppError> {
    let bytes = api.fetch(url).await?;

    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(MODEL_FILENAME);
    tokio::fs::write(&path, &bytes).await?;

    info!("Saved {} bytes to {}", bytes.len(), path.display());
    Ok(path)
}

pub fn spawn_download(api: Arc<dyn JobApi>, url: String, dir: PathBuf, proxy: EventProxy) -> JoinHandle<()> {
    tokio::spawn(async move {
        let event = match download(api.as_ref(), &url, &dir).await {
            Ok(path) => AssetEvent::Downloaded(path),
            Err(e) => {
                warn!("Download of {} failed: {}", url, e);
                AssetEvent::DownloadFailed(e.to_string())
            }
        };
        proxy.send_asset(event);
    })
}
