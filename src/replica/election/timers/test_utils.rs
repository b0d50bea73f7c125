use crate::actor::Event;
use crate::replica::LeaderTimerTick;
use std::time::Duration;
use tokio::sync::mpsc;

/// TestUtilActor stands in for the replica actor, asserting on what timer tasks send it.
pub(super) struct TestUtilActor {
    rx: mpsc::Receiver<Event>,
    quiet_period: Duration,
}

impl TestUtilActor {
    pub(super) fn new(rx: mpsc::Receiver<Event>) -> Self {
        TestUtilActor {
            rx,
            quiet_period: Duration::from_millis(10),
        }
    }

    async fn next_event(&mut self) -> Event {
        tokio::time::timeout(Duration::from_secs(5), self.rx.recv())
            .await
            .expect("Timed out waiting for an event")
            .expect("Actor queue closed")
    }

    pub(super) async fn assert_leader_heartbeat_event(&mut self, expected: LeaderTimerTick) {
        match self.next_event().await {
            Event::LeaderTimer(tick) => assert_eq!(tick, expected),
            other => panic!("Unexpected event {:?}", other),
        }
    }

    pub(super) async fn assert_follower_timeout_event(&mut self) {
        match self.next_event().await {
            Event::FollowerTimeout => {}
            other => panic!("Unexpected event {:?}", other),
        }
    }

    pub(super) async fn assert_no_event(&mut self) {
        if let Ok(event) = tokio::time::timeout(self.quiet_period, self.rx.recv()).await {
            panic!("Expected no event, got {:?}", event);
        }
    }
}
