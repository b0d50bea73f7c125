use crate::actor::WeakActorClient;
use crate::replica::election::timers::deadline::Deadline;
use crate::replica::election::timers::time::{Clock, RealClock};
use crate::replica::{LeaderTimerTick, ReplicaId, Term};
use std::sync::{Arc, Weak};
use tokio::time::Duration;

/// LeaderTimerHandle drives replication to one peer. The task sends `LeaderTimer` once right
/// away, then whenever a heartbeat interval passes without the leader contacting the peer.
pub(crate) struct LeaderTimerHandle<C: Clock = RealClock> {
    deadline: Arc<Deadline>,
    heartbeat_interval: Duration,
    clock: C,
}

struct LeaderTimerTask<C: Clock> {
    deadline: Weak<Deadline>,
    actor_client: WeakActorClient,
    tick: LeaderTimerTick,
    heartbeat_interval: Duration,
    clock: C,
}

impl LeaderTimerHandle {
    pub(crate) fn spawn_timer_task(
        heartbeat_interval: Duration,
        actor_client: WeakActorClient,
        peer_id: ReplicaId,
        term: Term,
    ) -> Self {
        let (task, handle) = LeaderTimerTask::new(heartbeat_interval, actor_client, peer_id, term, RealClock);
        tokio::task::spawn(task.run());

        handle
    }
}

impl<C: Clock> LeaderTimerHandle<C> {
    /// Called after contacting the peer, so the next periodic heartbeat is a full interval away.
    pub(crate) fn reset_heartbeat_timer(&self) {
        self.deadline.set(self.clock.now() + self.heartbeat_interval);
    }

    /// Asks for a tick right away, e.g. when there are more records for the peer.
    pub(crate) fn trigger_now(&self) {
        self.deadline.expire(self.clock.now());
    }
}

impl<C: Clock> LeaderTimerTask<C> {
    fn new(
        heartbeat_interval: Duration,
        actor_client: WeakActorClient,
        peer_id: ReplicaId,
        term: Term,
        clock: C,
    ) -> (Self, LeaderTimerHandle<C>) {
        // No initial wake time: the first tick goes out immediately, so a new leader (or a new
        // member) is contacted without waiting a heartbeat interval.
        let handle = LeaderTimerHandle {
            deadline: Arc::new(Deadline::new(None)),
            heartbeat_interval,
            clock: clock.clone(),
        };
        let task = LeaderTimerTask {
            deadline: Arc::downgrade(&handle.deadline),
            actor_client,
            tick: LeaderTimerTick { peer_id, term },
            heartbeat_interval,
            clock,
        };

        (task, handle)
    }

    async fn run(mut self) {
        loop {
            let deadline = match self.deadline.upgrade() {
                Some(deadline) => deadline,
                // No longer leader of this term, or the peer was removed.
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
                    if self.actor_client.leader_timer(self.tick.clone()).await.is_err() {
                        return;
                    }
                    deadline.postpone_to(self.clock.now() + self.heartbeat_interval);
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

    const HEARTBEAT: Duration = Duration::from_millis(100);

    fn expected_tick() -> LeaderTimerTick {
        LeaderTimerTick {
            peer_id: ReplicaId::new("peer-b"),
            term: Term::new(10),
        }
    }

    fn spawn_timer(
        actor_client: WeakActorClient,
        clock: time::ManualClock,
    ) -> (tokio::task::JoinHandle<()>, LeaderTimerHandle<time::ManualClock>) {
        let tick = expected_tick();
        let (task, handle) = LeaderTimerTask::new(HEARTBEAT, actor_client, tick.peer_id, tick.term, clock);
        (tokio::task::spawn(task.run()), handle)
    }

    #[tokio::test]
    async fn ticks_immediately_then_every_interval() {
        let (strong_client, rx) = ActorClient::new(10);
        let mut actor = TestUtilActor::new(rx);
        let (clock, mut driver) = time::manual_clock();

        let (task, timer) = spawn_timer(strong_client.weak(), clock);
        actor.assert_leader_heartbeat_event(expected_tick()).await;
        actor.assert_no_event().await;

        for _ in 0..3 {
            driver.advance(HEARTBEAT);
            actor.assert_leader_heartbeat_event(expected_tick()).await;
            actor.assert_no_event().await;
        }

        // A big leap still produces a single tick.
        driver.advance(HEARTBEAT * 5);
        actor.assert_leader_heartbeat_event(expected_tick()).await;
        actor.assert_no_event().await;

        drop(timer);
        driver.advance(HEARTBEAT);
        task.await.unwrap();
        actor.assert_no_event().await;
    }

    #[tokio::test]
    async fn reset_postpones_tick() {
        let (strong_client, rx) = ActorClient::new(10);
        let mut actor = TestUtilActor::new(rx);
        let (clock, mut driver) = time::manual_clock();

        let (_task, timer) = spawn_timer(strong_client.weak(), clock);
        actor.assert_leader_heartbeat_event(expected_tick()).await;

        for _ in 0..5 {
            driver.advance(HEARTBEAT / 2);
            timer.reset_heartbeat_timer();
        }
        actor.assert_no_event().await;

        // Last reset at T=2.5, next tick due at T=3.5.
        driver.advance(HEARTBEAT / 2);
        actor.assert_no_event().await;
        driver.advance(HEARTBEAT / 2);
        actor.assert_leader_heartbeat_event(expected_tick()).await;
        assert_eq!(driver.elapsed(), HEARTBEAT * 7 / 2);
    }

    #[tokio::test]
    async fn trigger_now_ticks_without_time_passing() {
        let (strong_client, rx) = ActorClient::new(10);
        let mut actor = TestUtilActor::new(rx);
        let (clock, _driver) = time::manual_clock();

        let (_task, timer) = spawn_timer(strong_client.weak(), clock);
        actor.assert_leader_heartbeat_event(expected_tick()).await;
        timer.reset_heartbeat_timer();
        actor.assert_no_event().await;

        timer.trigger_now();
        actor.assert_leader_heartbeat_event(expected_tick()).await;
        actor.assert_no_event().await;
    }
}
