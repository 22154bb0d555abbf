use crate::challenge::ChallengeStore;
use crate::session::SessionStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Background sweep removing sessions idle for longer than `ttl`.
/// Runs every `interval` until the returned handle is aborted.
pub fn spawn_sweeper(
    sessions: Arc<dyn SessionStore>,
    challenges: Arc<ChallengeStore>,
    interval: Duration,
    ttl: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let removed = sessions.sweep(ttl).await;
            for id in &removed {
                challenges.discard(id);
            }
            if removed.is_empty() {
                debug!("Session sweep found nothing to remove");
            } else {
                info!(count = removed.len(), "Session sweep removed idle sessions");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::InMemorySessionStore;
    use crate::task::TaskType;
    use crate::testkit::FakeDriver;
    use portalflow_browser::LaunchOptions;

    #[tokio::test(start_paused = true)]
    async fn idle_session_is_gone_after_next_sweep() {
        let driver = FakeDriver::new();
        let store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new(
            Arc::new(driver.clone()),
            LaunchOptions::default(),
        ));
        let challenges = Arc::new(ChallengeStore::new());
        let handle = spawn_sweeper(
            store.clone(),
            challenges,
            Duration::from_secs(5 * 60),
            Duration::from_secs(10 * 60),
        );

        let session = store.create(TaskType::Search).await.unwrap();

        // Sweeps at 5 and 10 minutes see a session that is not yet old enough.
        tokio::time::sleep(Duration::from_secs(9 * 60)).await;
        assert!(store.get(&session.id).await.is_ok());

        // The 15 minute sweep finds it idle for longer than the TTL.
        tokio::time::sleep(Duration::from_secs(7 * 60)).await;
        let err = store.get(&session.id).await.err().unwrap();
        assert!(err.to_string().contains("expired"));
        assert_eq!(driver.closes(), 1);

        handle.abort();
    }
}
