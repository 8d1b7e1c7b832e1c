//! Frame sources fed by a background capture thread.
//!
//! The thread publishes frames into a shared slot; the studio reads the
//! latest one on demand. Restarting never joins on the caller: the old
//! thread is handed to its replacement, which waits for it to release the
//! device before capturing again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use photobooth_core::{DeviceError, DeviceStatus, Frame, FrameSource};
use tracing::{debug, error, info, warn};

/// Body of a capture thread. Returns when `is_running` turns false.
pub type CaptureLoop = dyn Fn(&CaptureContext) -> Result<(), DeviceError> + Send + Sync;

struct FrameSlot {
    status: Mutex<DeviceStatus>,
    latest: Mutex<Option<Frame>>,
}

impl FrameSlot {
    fn set_status(&self, status: DeviceStatus) {
        if let Ok(mut guard) = self.status.lock() {
            *guard = status;
        }
    }

    fn clear(&self) {
        if let Ok(mut latest) = self.latest.lock() {
            *latest = None;
        }
    }
}

/// Handle given to a capture loop.
pub struct CaptureContext {
    slot: Arc<FrameSlot>,
    running: Arc<AtomicBool>,
}

impl CaptureContext {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Store `frame` as the latest one. Ignored once this loop was stopped.
    pub fn publish(&self, frame: Frame) {
        if !self.is_running() {
            return;
        }
        if let Ok(mut latest) = self.slot.latest.lock() {
            *latest = Some(frame);
        }
        if let Ok(mut status) = self.slot.status.lock() {
            if *status != DeviceStatus::Ready {
                *status = DeviceStatus::Ready;
            }
        }
    }
}

pub struct ThreadedSource {
    name: String,
    slot: Arc<FrameSlot>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    capture: Arc<CaptureLoop>,
}

impl ThreadedSource {
    /// Start `capture` on a thread called `name`. The source reports
    /// `Initializing` until the first frame is published.
    pub fn spawn(name: impl Into<String>, capture: Arc<CaptureLoop>) -> Self {
        let mut source = Self {
            name: name.into(),
            slot: Arc::new(FrameSlot {
                status: Mutex::new(DeviceStatus::Initializing),
                latest: Mutex::new(None),
            }),
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
            capture,
        };
        source.start(None);
        source
    }

    fn start(&mut self, previous: Option<JoinHandle<()>>) {
        let running = Arc::new(AtomicBool::new(true));
        let ctx = CaptureContext {
            slot: self.slot.clone(),
            running: running.clone(),
        };
        let capture = self.capture.clone();
        let name = self.name.clone();

        self.slot.set_status(DeviceStatus::Initializing);
        let spawned = thread::Builder::new().name(self.name.clone()).spawn(move || {
            if let Some(previous) = previous {
                if previous.join().is_err() {
                    warn!("Previous {name} thread panicked");
                }
                ctx.slot.clear();
            }
            if !ctx.is_running() {
                debug!("{name} stopped before it started");
                return;
            }
            if let Err(e) = capture(&ctx) {
                error!("{name} failed: {e}");
                if ctx.is_running() {
                    ctx.slot.set_status(DeviceStatus::Failed(e));
                }
            }
        });

        match spawned {
            Ok(handle) => {
                self.running = running;
                self.thread = Some(handle);
                info!("{} started", self.name);
            }
            Err(e) => self.slot.set_status(DeviceStatus::Failed(DeviceError::Other(format!(
                "Failed to spawn {}: {e}",
                self.name
            )))),
        }
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

impl FrameSource for ThreadedSource {
    fn status(&self) -> DeviceStatus {
        self.slot
            .status
            .lock()
            .map(|s| s.clone())
            .unwrap_or_else(|_| DeviceStatus::Failed(DeviceError::Other("capture state poisoned".into())))
    }

    fn current_frame(&mut self) -> Option<Frame> {
        if !self.is_ready() {
            return None;
        }
        self.slot.latest.lock().ok().and_then(|f| f.clone())
    }

    fn restart(&mut self) -> Result<(), DeviceError> {
        info!("Restarting {}", self.name);
        self.stop();
        let previous = self.thread.take();
        self.start(previous);
        Ok(())
    }
}

impl Drop for ThreadedSource {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    fn streaming(starts: Arc<AtomicUsize>, overlap: Arc<AtomicBool>) -> Arc<CaptureLoop> {
        let active = Arc::new(AtomicUsize::new(0));
        Arc::new(move |ctx: &CaptureContext| {
            starts.fetch_add(1, Ordering::SeqCst);
            if active.fetch_add(1, Ordering::SeqCst) > 0 {
                overlap.store(true, Ordering::SeqCst);
            }
            while ctx.is_running() {
                ctx.publish(Frame::solid(4, 4, [1, 2, 3]));
                thread::sleep(Duration::from_millis(2));
            }
            active.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn test_ready_after_first_frame() {
        let starts = Arc::new(AtomicUsize::new(0));
        let mut source = ThreadedSource::spawn("test-capture", streaming(starts, Arc::new(AtomicBool::new(false))));

        assert!(wait_until(|| source.is_ready()));
        assert_eq!(source.current_frame().map(|f| f.width), Some(4));
    }

    #[test]
    fn test_restart_does_not_wait_for_stalled_capture() {
        // ignores the stop flag for a while, like a blocked device read
        let stalled: Arc<CaptureLoop> = Arc::new(|_ctx: &CaptureContext| {
            thread::sleep(Duration::from_millis(600));
            Ok(())
        });
        let mut source = ThreadedSource::spawn("stalled-capture", stalled);

        let started = Instant::now();
        source.restart().unwrap();
        source.restart().unwrap();
        assert!(started.elapsed() < Duration::from_millis(200), "restart blocked for {:?}", started.elapsed());
        assert_eq!(source.status(), DeviceStatus::Initializing);
    }

    #[test]
    fn test_restart_waits_for_previous_loop_off_thread() {
        let starts = Arc::new(AtomicUsize::new(0));
        let overlap = Arc::new(AtomicBool::new(false));
        let mut source = ThreadedSource::spawn("test-capture", streaming(starts.clone(), overlap.clone()));
        assert!(wait_until(|| source.is_ready()));

        source.restart().unwrap();
        assert!(wait_until(|| starts.load(Ordering::SeqCst) == 2 && source.is_ready()));
        assert!(source.current_frame().is_some());
        assert!(!overlap.load(Ordering::SeqCst));
    }

    #[test]
    fn test_capture_error_reported() {
        let denied: Arc<CaptureLoop> = Arc::new(|_ctx: &CaptureContext| Err(DeviceError::PermissionDenied));
        let mut source = ThreadedSource::spawn("denied-capture", denied);

        assert!(wait_until(|| source.status() == DeviceStatus::Failed(DeviceError::PermissionDenied)));
        assert!(source.current_frame().is_none());
    }
}
