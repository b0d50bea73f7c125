use crate::replica::LeaderRedirectInfo;
use tokio::sync::watch;

/// Role as seen from outside the replica actor.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum ElectionStateSnapshot {
    Leader,
    Candidate,
    Follower(LeaderRedirectInfo),
    FollowerNoLeader,
}

pub(super) fn new(initial_state: ElectionStateSnapshot) -> (ElectionStateChangeNotifier, ElectionStateChangeListener) {
    let (tx, rx) = watch::channel(initial_state);

    (ElectionStateChangeNotifier { tx }, ElectionStateChangeListener { rx })
}

pub(super) struct ElectionStateChangeNotifier {
    tx: watch::Sender<ElectionStateSnapshot>,
}

impl ElectionStateChangeNotifier {
    pub(super) fn notify_new_state(&self, new_state: ElectionStateSnapshot) {
        // Nobody listening is fine.
        let _ = self.tx.send(new_state);
    }
}

/// Intermediate states may be skipped if the listener falls behind; only the latest is kept.
#[derive(Clone)]
pub(crate) struct ElectionStateChangeListener {
    rx: watch::Receiver<ElectionStateSnapshot>,
}

impl ElectionStateChangeListener {
    pub(crate) fn current(&self) -> ElectionStateSnapshot {
        self.rx.borrow().clone()
    }

    /// Waits for the next change. `None` once the replica has shut down.
    pub(crate) async fn next(&mut self) -> Option<ElectionStateSnapshot> {
        match self.rx.changed().await {
            Ok(()) => Some(self.rx.borrow().clone()),
            Err(_) => None,
        }
    }
}
