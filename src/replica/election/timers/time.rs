use tokio::time::Instant;

/// Clock lets timer tasks run against a manually driven clock in tests.
#[async_trait::async_trait]
pub(crate) trait Clock: Clone + Send + Sync + 'static {
    fn now(&self) -> Instant;

    /// Must be cancel safe, timer tasks race it against other wake-ups.
    async fn sleep_until(&mut self, deadline: Instant);
}

#[derive(Copy, Clone)]
pub(crate) struct RealClock;

#[async_trait::async_trait]
impl Clock for RealClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep_until(&mut self, deadline: Instant) {
        tokio::time::sleep_until(deadline).await;
    }
}

#[cfg(test)]
pub(crate) use manual::{manual_clock, ManualClock};

#[cfg(test)]
mod manual {
    use super::*;
    use tokio::sync::watch;
    use tokio::time::Duration;

    /// Time only moves when the driver says so.
    pub(crate) fn manual_clock() -> (ManualClock, ManualClockDriver) {
        let start = Instant::now();
        let (tx, rx) = watch::channel(start);

        (ManualClock { now: rx }, ManualClockDriver { now: tx, start })
    }

    #[derive(Clone)]
    pub(crate) struct ManualClock {
        now: watch::Receiver<Instant>,
    }

    #[async_trait::async_trait]
    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            *self.now.borrow()
        }

        async fn sleep_until(&mut self, deadline: Instant) {
            while *self.now.borrow() < deadline {
                if self.now.changed().await.is_err() {
                    // Driver is gone, time is frozen forever.
                    std::future::pending::<()>().await;
                }
            }
        }
    }

    pub(crate) struct ManualClockDriver {
        now: watch::Sender<Instant>,
        start: Instant,
    }

    impl ManualClockDriver {
        pub(crate) fn elapsed(&self) -> Duration {
            *self.now.borrow() - self.start
        }

        /// Move forward in steps smaller than what the test wants to observe. A sleeper only
        /// promises to wake at or after its deadline, not exactly on it.
        pub(crate) fn advance(&mut self, by: Duration) {
            let next = *self.now.borrow() + by;
            let _ = self.now.send(next);
        }
    }

    #[tokio::test]
    async fn sleepers_wake_once_deadline_is_reached() {
        let (mut clock, mut driver) = manual_clock();
        let deadline = clock.now() + Duration::from_secs(3);

        let sleeper = tokio::spawn(async move { clock.sleep_until(deadline).await });

        driver.advance(Duration::from_secs(2));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!sleeper.is_finished());

        driver.advance(Duration::from_secs(2));
        tokio::time::timeout(Duration::from_secs(5), sleeper)
            .await
            .expect("sleeper should wake")
            .unwrap();
        assert_eq!(driver.elapsed(), Duration::from_secs(4));
    }
}
