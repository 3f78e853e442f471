//! Progress reporting for streamed uploads.

use std::io::{self, Read};
use std::sync::Arc;

/// Receives `(total_size, bytes_so_far)` as an upload streams out.
///
/// Called on the thread doing the upload, between reads, so it must
/// return promptly.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, total: u64, so_far: u64);
}

impl<F> ProgressObserver for F
where
    F: Fn(u64, u64) + Send + Sync,
{
    fn on_progress(&self, total: u64, so_far: u64) {
        self(total, so_far)
    }
}

/// Reader that reports the running byte count after every read.
pub struct ProgressReader<R> {
    inner: R,
    total: u64,
    so_far: u64,
    observer: Arc<dyn ProgressObserver>,
}

impl<R: Read> ProgressReader<R> {
    pub fn new(inner: R, total: u64, observer: Arc<dyn ProgressObserver>) -> Self {
        ProgressReader {
            inner,
            total,
            so_far: 0,
            observer,
        }
    }

    /// Bytes read so far.
    pub fn position(&self) -> u64 {
        self.so_far
    }
}

impl<R: Read> Read for ProgressReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            self.so_far += n as u64;
            self.observer.on_progress(self.total, self.so_far);
        }
        Ok(n)
    }
}
