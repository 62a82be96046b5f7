use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use log::debug;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl SurfaceSize {
    /// Largest edge a render surface may have.
    pub const MAX_DIMENSION: u32 = 8192;

    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn clamped(self) -> Self {
        Self {
            width: self.width.min(Self::MAX_DIMENSION),
            height: self.height.min(Self::MAX_DIMENSION),
        }
    }

    pub fn pixel_count(&self) -> Option<usize> {
        (self.width as usize).checked_mul(self.height as usize)
    }

    pub fn aspect(&self) -> f32 {
        if self.height == 0 {
            return 1.0;
        }
        self.width as f32 / self.height as f32
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

struct HostInner {
    size: Mutex<SurfaceSize>,
    resize_tx: broadcast::Sender<SurfaceSize>,
    mounted: AtomicUsize,
}

/// The area a viewport mounts into. The window front end sizes it to the
/// central panel. Resize notifications are broadcast to whichever listeners
/// are currently subscribed.
#[derive(Clone)]
pub struct SurfaceHost {
    inner: Arc<HostInner>,
}

impl SurfaceHost {
    pub fn new(size: SurfaceSize) -> Self {
        let (resize_tx, _) = broadcast::channel(16);
        Self {
            inner: Arc::new(HostInner {
                size: Mutex::new(size),
                resize_tx,
                mounted: AtomicUsize::new(0),
            }),
        }
    }

    pub fn size(&self) -> SurfaceSize {
        *self.inner.size.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn resize(&self, size: SurfaceSize) {
        let size = size.clamped();
        *self.inner.size.lock().unwrap_or_else(|e| e.into_inner()) = size;
        // no listeners is fine: nothing is mounted
        let _ = self.inner.resize_tx.send(size);
    }

    pub fn add_resize_listener(&self) -> ResizeListener {
        ResizeListener {
            rx: self.inner.resize_tx.subscribe(),
        }
    }

    pub fn resize_listener_count(&self) -> usize {
        self.inner.resize_tx.receiver_count()
    }

    /// Attaches a render surface to the host until the returned guard is dropped.
    pub fn mount(&self) -> SurfaceMount {
        self.inner.mounted.fetch_add(1, Ordering::SeqCst);
        SurfaceMount { host: self.clone() }
    }

    pub fn mounted_count(&self) -> usize {
        self.inner.mounted.load(Ordering::SeqCst)
    }
}

pub struct ResizeListener {
    rx: broadcast::Receiver<SurfaceSize>,
}

impl ResizeListener {
    /// Latest pending size, if the host was resized since the last call.
    pub fn latest(&mut self) -> Option<SurfaceSize> {
        let mut latest = None;
        loop {
            match self.rx.try_recv() {
                Ok(size) => latest = Some(size),
                Err(TryRecvError::Lagged(skipped)) => debug!("Skipped {} stale resize events", skipped),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return latest,
            }
        }
    }
}

pub struct SurfaceMount {
    host: SurfaceHost,
}

impl Drop for SurfaceMount {
    fn drop(&mut self) {
        self.host.inner.mounted.fetch_sub(1, Ordering::SeqCst);
    }
}
