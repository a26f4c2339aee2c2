use crate::physical::PhysicalDevice;
use crate::worker::{sleep, LoopState, Worker};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Periodically asks a physical device to refresh its reading.
///
/// The first sample is taken after a warm-up delay, then one per interval. Intervals are whole
/// seconds (at least one). A failing sample is logged and the device keeps its previous reading.
pub struct SamplerLoop<P> {
    device: Arc<P>,
    interval: Duration,
    warm_up: Duration,
    worker: Worker,
}

impl<P: PhysicalDevice> SamplerLoop<P> {
    pub const DEFAULT_WARM_UP: Duration = Duration::from_secs(10);

    pub fn new(device: Arc<P>, interval: Duration) -> Self {
        Self {
            device,
            interval: Duration::from_secs(interval.as_secs().max(1)),
            warm_up: Self::DEFAULT_WARM_UP,
            worker: Worker::new("sampler"),
        }
    }

    pub fn with_warm_up(mut self, warm_up: Duration) -> Self {
        self.warm_up = warm_up;
        self
    }

    pub fn start(&mut self) {
        let device = self.device.clone();
        let interval = self.interval;
        let warm_up = self.warm_up;
        self.worker
            .spawn(move |token| run(device, interval, warm_up, token));
    }

    pub fn request_stop(&self) {
        self.worker.request_stop();
    }

    /// Wait for the loop to exit after [`Self::request_stop`].
    pub async fn await_stop(&mut self) {
        self.worker.join().await;
    }

    pub async fn stop(&mut self) {
        self.worker.stop().await;
    }

    pub fn state(&self) -> LoopState {
        self.worker.state()
    }
}

async fn run<P: PhysicalDevice>(
    device: Arc<P>,
    interval: Duration,
    warm_up: Duration,
    token: CancellationToken,
) {
    if !sleep(&token, warm_up).await {
        return;
    }

    loop {
        if let Err(err) = device.sample().await {
            log::warn!("Failed to sample device, keeping the previous reading: {err}");
        }
        if !sleep(&token, interval).await {
            break;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::Reading;
    use crate::testing::{at, FakeDevice};
    use tokio::time::timeout;

    #[tokio::test(start_paused = true)]
    async fn stop_mid_sleep() {
        let device = Arc::new(FakeDevice::default());
        let mut sampler =
            SamplerLoop::new(device.clone(), Duration::from_secs(1)).with_warm_up(Duration::ZERO);
        assert_eq!(sampler.state(), LoopState::Idle);

        sampler.start();
        assert_eq!(sampler.state(), LoopState::Running);
        tokio::time::sleep(Duration::from_millis(1500)).await;

        sampler.request_stop();
        timeout(Duration::from_secs(2), sampler.await_stop())
            .await
            .expect("sampler must stop within two seconds");
        assert_eq!(sampler.state(), LoopState::Stopped);
        assert_eq!(device.samples(), 2);

        sampler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn warm_up_and_interval() {
        let device = Arc::new(FakeDevice::default());
        let mut sampler = SamplerLoop::new(device.clone(), Duration::from_secs(3))
            .with_warm_up(Duration::from_secs(10));
        sampler.start();

        tokio::time::sleep(Duration::from_millis(9500)).await;
        assert_eq!(device.samples(), 0);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(device.samples(), 1);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(device.samples(), 3);

        sampler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_swallowed() {
        let device = Arc::new(FakeDevice::default());
        device.push(Ok(Reading::new(at(1)).with("v", 1)));
        device.push(Err("bus error"));
        device.push(Ok(Reading::new(at(3)).with("v", 3)));

        let mut sampler =
            SamplerLoop::new(device.clone(), Duration::from_secs(1)).with_warm_up(Duration::ZERO);
        sampler.start();

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(device.samples(), 2);
        assert_eq!(device.data().last_update, at(1));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(device.samples(), 3);
        assert_eq!(device.data().last_update, at(3));

        sampler.stop().await;
        assert_eq!(sampler.state(), LoopState::Stopped);
    }

    #[tokio::test]
    async fn stop_before_start() {
        let mut sampler = SamplerLoop::new(Arc::new(FakeDevice::default()), Duration::ZERO);
        sampler.request_stop();
        sampler.await_stop().await;
        assert_eq!(sampler.state(), LoopState::Stopped);

        sampler.start();
        assert_eq!(sampler.state(), LoopState::Stopped);
    }
}
