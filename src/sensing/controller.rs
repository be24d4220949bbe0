use std::sync::Arc;

use anyhow::{bail, Context, Result};
use log::{info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use super::loop_worker::{sensing_loop, SensingUpdate};
use super::source::FocusSignalSource;

const UPDATE_BUFFER: usize = 16;

/// Owns the focus source for the lifetime of one session.
pub struct SensingController {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
    source: Option<Arc<dyn FocusSignalSource>>,
}

impl SensingController {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
            source: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.handle.is_some()
    }

    /// Acquire the source and spawn the sampling loop. A source that fails to
    /// start is not fatal; the failure is delivered as the first update and
    /// the loop keeps reporting whatever `sample` returns.
    pub async fn start_sensing(
        &mut self,
        session_id: String,
        source: Arc<dyn FocusSignalSource>,
        interval: Duration,
    ) -> Result<mpsc::Receiver<SensingUpdate>> {
        if self.handle.is_some() {
            bail!("sensing already active");
        }

        let (tx, rx) = mpsc::channel(UPDATE_BUFFER);

        match source.start().await {
            Ok(()) => info!("{} focus source started for session {}", source.name(), session_id),
            Err(err) => {
                warn!("{} focus source failed to start: {err:#}", source.name());
                let _ = tx.try_send(SensingUpdate::Failed(err.to_string()));
            }
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(sensing_loop(
            session_id,
            source.clone(),
            tx,
            interval,
            cancel_token.clone(),
        ));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        self.source = Some(source);
        Ok(rx)
    }

    /// Cancel the loop and release the source. The source is released even if
    /// the loop task failed.
    pub async fn stop_sensing(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        let joined = match self.handle.take() {
            Some(handle) => handle
                .await
                .context("sensing loop task failed to join")
                .map(|_| ()),
            None => Ok(()),
        };

        if let Some(source) = self.source.take() {
            source.stop().await;
            info!("{} focus source released", source.name());
        }

        joined
    }
}

impl Default for SensingController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use anyhow::anyhow;
    use async_trait::async_trait;

    use super::*;
    use crate::sensing::source::FocusReading;

    #[derive(Default)]
    struct CountingSource {
        fail_start: bool,
        running: AtomicBool,
        samples: AtomicUsize,
        stops: AtomicUsize,
    }

    #[async_trait]
    impl FocusSignalSource for CountingSource {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn start(&self) -> Result<()> {
            if self.fail_start {
                return Err(anyhow!("camera permission denied"));
            }
            self.running.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn sample(&self) -> Result<FocusReading> {
            self.samples.fetch_add(1, Ordering::SeqCst);
            if !self.running.load(Ordering::SeqCst) {
                return Err(anyhow!("camera is not running"));
            }
            Ok(FocusReading {
                score: 90,
                present: true,
            })
        }

        async fn stop(&self) {
            self.running.store(false, Ordering::SeqCst);
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn delivers_readings_every_interval() {
        let source = Arc::new(CountingSource::default());
        let mut sensing = SensingController::new();
        let mut rx = sensing
            .start_sensing("s1".into(), source.clone(), Duration::from_secs(2))
            .await
            .unwrap();

        for _ in 0..3 {
            assert_eq!(
                rx.recv().await,
                Some(SensingUpdate::Reading(FocusReading {
                    score: 90,
                    present: true
                }))
            );
        }

        sensing.stop_sensing().await.unwrap();
        assert_eq!(source.stops.load(Ordering::SeqCst), 1);
        assert!(!sensing.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn rejects_second_start() {
        let source = Arc::new(CountingSource::default());
        let mut sensing = SensingController::new();
        let _rx = sensing
            .start_sensing("s1".into(), source.clone(), Duration::from_secs(2))
            .await
            .unwrap();

        assert!(sensing
            .start_sensing("s2".into(), source, Duration::from_secs(2))
            .await
            .is_err());
        sensing.stop_sensing().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn failed_start_is_reported_not_fatal() {
        let source = Arc::new(CountingSource {
            fail_start: true,
            ..Default::default()
        });
        let mut sensing = SensingController::new();
        let mut rx = sensing
            .start_sensing("s1".into(), source.clone(), Duration::from_secs(2))
            .await
            .unwrap();

        assert!(matches!(rx.recv().await, Some(SensingUpdate::Failed(_))));
        assert!(matches!(rx.recv().await, Some(SensingUpdate::Failed(_))));

        sensing.stop_sensing().await.unwrap();
        assert_eq!(source.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stop_without_start_is_noop() {
        let mut sensing = SensingController::new();
        sensing.stop_sensing().await.unwrap();
    }
}
