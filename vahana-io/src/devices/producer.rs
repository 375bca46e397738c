//! Background frame producer thread shared by the camera backends
//!
//! A producer owns one named thread and a stop flag. The thread body gets
//! the flag and is expected to return soon after it flips.

use crate::error::Result;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub struct Producer {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Producer {
    /// Spawn `body` on a thread called `name`
    pub fn spawn<F>(name: &str, body: F) -> Result<Self>
    where
        F: FnOnce(Arc<AtomicBool>) + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || body(flag))?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Raise the stop flag without waiting
    pub fn signal_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Raise the stop flag and join the thread
    pub fn stop(&mut self) {
        self.signal_stop();
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            log::error!("Frame producer thread panicked");
        }
    }
}

impl Drop for Producer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Sleep out the rest of one frame period, in short slices so a stop
/// request is seen quickly. Returns `false` once `stop` is raised.
pub fn pace(started: Instant, period: Duration, stop: &AtomicBool) -> bool {
    const SLICE: Duration = Duration::from_millis(10);

    loop {
        if stop.load(Ordering::Acquire) {
            return false;
        }
        let elapsed = started.elapsed();
        if elapsed >= period {
            return true;
        }
        thread::sleep((period - elapsed).min(SLICE));
    }
}

/// Frame period for a target rate. Zero fps is treated as 1.
pub fn frame_period(fps: u32) -> Duration {
    Duration::from_secs(1) / fps.max(1)
}
