use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::error::AcquisitionError;

/// External collaborator: chunked HTTP fetch, with optional byte-range
/// resumption support the retry policy takes advantage of.
#[async_trait::async_trait]
pub trait HttpFetcher: Send + Sync {
    /// Fetch `url`, optionally resuming from `resume_from` bytes if
    /// `supports_resume()` is true. Returns one chunk per call; an empty
    /// chunk signals end of content.
    async fn fetch_chunk(
        &self,
        url: &str,
        resume_from: u64,
    ) -> Result<Vec<u8>, AcquisitionError>;

    fn content_length(&self, url: &str) -> Option<u64>;

    fn supports_resume(&self) -> bool {
        false
    }
}

/// External collaborator: the driver never touches the filesystem directly,
/// it writes through this sink so cancellation cleanup — leaving no
/// partial file at the target path — is the host's responsibility.
pub trait PartialFileSink: Send {
    fn write(&mut self, chunk: &[u8]) -> std::io::Result<()>;
    fn abort(self: Box<Self>) -> std::io::Result<()>;
    fn finish(self: Box<Self>) -> std::io::Result<()>;
}

/// Acquisition progress/state callbacks, delivered best-effort and
/// possibly from a worker thread — the host must assume so.
pub trait AcquisitionCallback: Send + Sync {
    fn on_started(&self) {}
    fn on_progressed(&self, fraction: f64) {
        let _ = fraction;
    }
    fn on_canceled(&self) {}
    fn on_ended(&self, status: lcp_core::StatusCode) {
        let _ = status;
    }
}

const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);
const PROGRESS_FRACTION_STEP: f64 = 0.01;
const RETRY_BACKOFFS: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(4),
];

/**
    Drives a publication download through a host [`HttpFetcher`].
    States: `idle -> started -> progressing* -> (canceled | ended)`.
    Cancellation is cooperative via an [`AtomicBool`] checked between
    chunks; a canceled acquisition calls [`PartialFileSink::abort`] rather
    than `finish`, so no partial file survives at the host's target path.
*/
pub struct AcquisitionDriver<F: HttpFetcher> {
    fetcher: F,
    cancel: Arc<AtomicBool>,
}

/// A cooperative cancellation handle, cloneable so a caller can cancel an
/// in-flight `run` from another thread.
#[derive(Clone)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl<F: HttpFetcher> AcquisitionDriver<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(Arc::clone(&self.cancel))
    }

    /// Download `url` into `sink`, retrying transient network errors up to
    /// three times with 1s/2s/4s backoff, resuming from the already-written
    /// byte count when the fetcher supports it. Progress callbacks are
    /// coalesced to at most every 100ms or 1% of `content_length`,
    /// whichever is sparser.
    pub async fn run(
        &self,
        url: &str,
        mut sink: Box<dyn PartialFileSink>,
        callback: &dyn AcquisitionCallback,
    ) -> Result<(), AcquisitionError> {
        callback.on_started();
        tracing::debug!(url, "acquisition started");

        let total = self.fetcher.content_length(url);
        let mut written: u64 = 0;
        let mut last_progress_at = tokio::time::Instant::now();
        let mut last_progress_fraction = -1.0f64;

        loop {
            if self.cancel.load(Ordering::SeqCst) {
                sink.abort().map_err(|e| AcquisitionError::Network(e.to_string()))?;
                callback.on_canceled();
                tracing::info!(url, "acquisition canceled");
                return Err(AcquisitionError::Canceled);
            }

            let chunk = match self.fetch_with_retry(url, written).await {
                Ok(chunk) => chunk,
                Err(e) => {
                    sink.abort().map_err(|e| AcquisitionError::Network(e.to_string()))?;
                    callback.on_ended(lcp_core::StatusCode::LicenseNetworkError);
                    return Err(e);
                }
            };

            if chunk.is_empty() {
                break;
            }

            sink.write(&chunk)
                .map_err(|e| AcquisitionError::Network(e.to_string()))?;
            written += chunk.len() as u64;

            if let Some(total) = total {
                let fraction = (written as f64 / total as f64).min(1.0);
                let elapsed = last_progress_at.elapsed();
                if elapsed >= PROGRESS_INTERVAL
                    || fraction - last_progress_fraction >= PROGRESS_FRACTION_STEP
                {
                    callback.on_progressed(fraction);
                    last_progress_at = tokio::time::Instant::now();
                    last_progress_fraction = fraction;
                }
            }
        }

        sink.finish().map_err(|e| AcquisitionError::Network(e.to_string()))?;
        callback.on_ended(lcp_core::StatusCode::Ok);
        tracing::debug!(url, written, "acquisition ended");
        Ok(())
    }

    async fn fetch_with_retry(&self, url: &str, written: u64) -> Result<Vec<u8>, AcquisitionError> {
        let resume_from = if self.fetcher.supports_resume() { written } else { 0 };
        let mut last_err = None;

        for backoff in [Duration::ZERO; 1].into_iter().chain(RETRY_BACKOFFS) {
            if backoff > Duration::ZERO {
                tokio::time::sleep(backoff).await;
            }
            match self.fetcher.fetch_chunk(url, resume_from).await {
                Ok(chunk) => return Ok(chunk),
                Err(e) => {
                    tracing::warn!(url, error = %e, "acquisition fetch attempt failed");
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or(AcquisitionError::Network("no attempts made".into())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct VecSink {
        data: Arc<Mutex<Vec<u8>>>,
        aborted: Arc<Mutex<bool>>,
    }

    impl PartialFileSink for VecSink {
        fn write(&mut self, chunk: &[u8]) -> std::io::Result<()> {
            self.data.lock().unwrap().extend_from_slice(chunk);
            Ok(())
        }
        fn abort(self: Box<Self>) -> std::io::Result<()> {
            *self.aborted.lock().unwrap() = true;
            self.data.lock().unwrap().clear();
            Ok(())
        }
        fn finish(self: Box<Self>) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct ChunkedFetcher {
        chunks: Mutex<Vec<Vec<u8>>>,
        total: u64,
    }

    #[async_trait::async_trait]
    impl HttpFetcher for ChunkedFetcher {
        async fn fetch_chunk(&self, _url: &str, _resume_from: u64) -> Result<Vec<u8>, AcquisitionError> {
            Ok(self.chunks.lock().unwrap().pop().unwrap_or_default())
        }
        fn content_length(&self, _url: &str) -> Option<u64> {
            Some(self.total)
        }
    }

    struct NoopCallback;
    impl AcquisitionCallback for NoopCallback {}

    #[tokio::test]
    async fn successful_download_writes_all_chunks() {
        let chunks = vec![b"world".to_vec(), b"hello ".to_vec()]; // popped in reverse
        let total = chunks.iter().map(|c| c.len()).sum::<usize>() as u64;
        let fetcher = ChunkedFetcher {
            chunks: Mutex::new(chunks),
            total,
        };
        let driver = AcquisitionDriver::new(fetcher);
        let data = Arc::new(Mutex::new(Vec::new()));
        let aborted = Arc::new(Mutex::new(false));
        let sink = Box::new(VecSink {
            data: Arc::clone(&data),
            aborted: Arc::clone(&aborted),
        });

        driver.run("https://example.com/pub.epub", sink, &NoopCallback).await.unwrap();
        assert_eq!(&*data.lock().unwrap(), b"hello world");
        assert!(!*aborted.lock().unwrap());
    }

    #[tokio::test]
    async fn cancel_before_first_chunk_aborts_and_leaves_no_data() {
        struct ForeverFetcher;
        #[async_trait::async_trait]
        impl HttpFetcher for ForeverFetcher {
            async fn fetch_chunk(&self, _url: &str, _resume_from: u64) -> Result<Vec<u8>, AcquisitionError> {
                Ok(b"x".repeat(10))
            }
            fn content_length(&self, _url: &str) -> Option<u64> {
                None
            }
        }

        let driver = AcquisitionDriver::new(ForeverFetcher);
        let handle = driver.cancel_handle();
        handle.cancel();

        let data = Arc::new(Mutex::new(Vec::new()));
        let aborted = Arc::new(Mutex::new(false));
        let sink = Box::new(VecSink {
            data: Arc::clone(&data),
            aborted: Arc::clone(&aborted),
        });

        let err = driver.run("https://example.com/pub.epub", sink, &NoopCallback).await.unwrap_err();
        assert!(matches!(err, AcquisitionError::Canceled));
        assert!(data.lock().unwrap().is_empty());
        assert!(*aborted.lock().unwrap());
    }
}
