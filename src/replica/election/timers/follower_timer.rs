use crate::actor::WeakActorClient;
use crate::replica::election::timers::deadline::Deadline;
use crate::replica::election::timers::time::{Clock, RealClock};
use rand::Rng;
use std::ops::RangeInclusive;
use std::sync::{Arc, Weak};
use tokio::time::{Duration, Instant};

/// FollowerTimerHandle is owned by a follower or candidate. While it lives, the timer task fires
/// `FollowerTimeout` whenever the randomized election timeout passes without a reset.
pub(crate) struct FollowerTimerHandle<C: Clock = RealClock> {
    deadline: Arc<Deadline>,
    timeout_range: RangeInclusive<Duration>,
    clock: C,
}

struct FollowerTimerTask<C: Clock> {
    deadline: Weak<Deadline>,
    actor_client: WeakActorClient,
    clock: C,
    // Pause between repeated timeouts when the actor doesn't reset the timer, e.g. while
    // uninitialized.
    retry_interval: Duration,
}

impl FollowerTimerHandle {
    pub(crate) fn spawn_timer_task(
        min_timeout: Duration,
        max_timeout: Duration,
        actor_client: WeakActorClient,
    ) -> Self {
        let (task, handle) = FollowerTimerTask::new(min_timeout, max_timeout, actor_client, RealClock);
        tokio::task::spawn(task.run());

        handle
    }
}

impl<C: Clock> FollowerTimerHandle<C> {
    pub(crate) fn reset_timeout(&self) {
        self.deadline.set(self.random_wake_time());
    }

    /// Fires the timeout right away instead of waiting out the current one.
    pub(crate) fn expire_now(&self) {
        self.deadline.expire(self.clock.now());
    }

    fn random_wake_time(&self) -> Instant {
        self.clock.now() + rand::thread_rng().gen_range(self.timeout_range.clone())
    }
}

impl<C: Clock> FollowerTimerTask<C> {
    fn new(
        min_timeout: Duration,
        max_timeout: Duration,
        actor_client: WeakActorClient,
        clock: C,
    ) -> (Self, FollowerTimerHandle<C>) {
        let handle = FollowerTimerHandle {
            deadline: Arc::new(Deadline::new(None)),
            timeout_range: RangeInclusive::new(min_timeout, max_timeout),
            clock: clock.clone(),
        };
        // A fresh follower must not time out before a full election timeout has passed.
        handle.reset_timeout();

        let task = FollowerTimerTask {
            deadline: Arc::downgrade(&handle.deadline),
            actor_client,
            clock,
            retry_interval: min_timeout,
        };

        (task, handle)
    }

    async fn run(mut self) {
        loop {
            let deadline = match self.deadline.upgrade() {
                Some(deadline) => deadline,
                // No longer follower or candidate for the term this timer was created in.
                None => return,
            };

            match deadline.wake_time() {
                Some(wake_time) if wake_time > self.clock.now() => {
                    tokio::select! {
                        _ = self.clock.sleep_until(wake_time) => {}
                        _ = deadline.moved_earlier() => {}
                    }
                }
                _ => {
                    if self.actor_client.follower_timeout().await.is_err() {
                        return;
                    }
                    deadline.postpone_to(self.clock.now() + self.retry_interval);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::ActorClient;
    use crate::replica::election::timers::test_utils::TestUtilActor;
    use crate::replica::election::timers::time;

    const TIMEOUT: Duration = Duration::from_millis(100);

    // Jitter isn't under test, so min and max are the same.
    fn spawn_fixed_timer(
        actor_client: WeakActorClient,
        clock: time::ManualClock,
    ) -> (tokio::task::JoinHandle<()>, FollowerTimerHandle<time::ManualClock>) {
        let (task, handle) = FollowerTimerTask::new(TIMEOUT, TIMEOUT, actor_client, clock);
        (tokio::task::spawn(task.run()), handle)
    }

    #[tokio::test]
    async fn resets_postpone_timeout() {
        let (strong_client, rx) = ActorClient::new(10);
        let mut actor = TestUtilActor::new(rx);
        let (clock, mut driver) = time::manual_clock();

        let (_task, timer) = spawn_fixed_timer(strong_client.weak(), clock);
        actor.assert_no_event().await;

        for _ in 0..5 {
            driver.advance(TIMEOUT / 2);
            timer.reset_timeout();
        }
        actor.assert_no_event().await;
        assert_eq!(driver.elapsed(), TIMEOUT * 5 / 2);

        // Last reset was at T=2.5, so nothing before T=3.5.
        let one_ns = Duration::from_nanos(1);
        driver.advance(TIMEOUT - one_ns);
        actor.assert_no_event().await;

        driver.advance(one_ns);
        actor.assert_follower_timeout_event().await;
    }

    #[tokio::test]
    async fn keeps_firing_until_reset() {
        let (strong_client, rx) = ActorClient::new(10);
        let mut actor = TestUtilActor::new(rx);
        let (clock, mut driver) = time::manual_clock();

        let (_task, timer) = spawn_fixed_timer(strong_client.weak(), clock);

        driver.advance(TIMEOUT);
        actor.assert_follower_timeout_event().await;
        actor.assert_no_event().await;

        // Nobody reset the timer, so it fires again after the retry interval.
        driver.advance(TIMEOUT);
        actor.assert_follower_timeout_event().await;

        // A reset racing with a fired timeout is harmless; the task keeps going.
        timer.reset_timeout();
        for _ in 0..5 {
            driver.advance(TIMEOUT / 2);
            timer.reset_timeout();
        }
        actor.assert_no_event().await;
    }

    #[tokio::test]
    async fn expire_now_fires_without_time_passing() {
        let (strong_client, rx) = ActorClient::new(10);
        let mut actor = TestUtilActor::new(rx);
        let (clock, _driver) = time::manual_clock();

        let (_task, timer) = spawn_fixed_timer(strong_client.weak(), clock);
        actor.assert_no_event().await;

        timer.expire_now();
        actor.assert_follower_timeout_event().await;
        actor.assert_no_event().await;
    }

    #[tokio::test]
    async fn dropping_handle_stops_task() {
        let (strong_client, rx) = ActorClient::new(10);
        let mut actor = TestUtilActor::new(rx);
        let (clock, mut driver) = time::manual_clock();

        let (task, timer) = spawn_fixed_timer(strong_client.weak(), clock);
        drop(timer);

        // Past the point where the task would've fired.
        driver.advance(TIMEOUT * 2);
        task.await.unwrap();
        actor.assert_no_event().await;
    }

    #[tokio::test]
    async fn task_exits_with_actor() {
        let (strong_client, rx) = ActorClient::new(10);
        let (clock, mut driver) = time::manual_clock();

        let (task, _timer) = spawn_fixed_timer(strong_client.weak(), clock);
        drop(rx);
        drop(strong_client);

        driver.advance(TIMEOUT);
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("timer task should exit")
            .unwrap();
    }
}
