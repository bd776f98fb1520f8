use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::auth::Authenticator;
use crate::dates::now_ms;
use crate::engine::Engine;

const COMPACT_CHECK_INTERVAL: Duration = Duration::from_secs(30);
const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// Compact the WAL once enough appends have piled up since the last rewrite.
pub async fn compact_if_needed(engine: &Engine, threshold: u64) -> bool {
    let appends = engine.wal_appends_since_compact().await;
    if appends < threshold {
        return false;
    }
    match engine.compact_wal().await {
        Ok(()) => {
            info!("compacted WAL after {appends} appends");
            true
        }
        Err(e) => {
            tracing::error!("WAL compaction failed: {e}");
            false
        }
    }
}

/// Background task that periodically checks whether the WAL needs compacting.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(COMPACT_CHECK_INTERVAL);
    loop {
        interval.tick().await;
        compact_if_needed(&engine, threshold).await;
    }
}

/// Background task that periodically drops expired admin sessions.
pub async fn run_session_reaper(auth: Arc<Authenticator>) {
    let mut interval = tokio::time::interval(SESSION_PURGE_INTERVAL);
    loop {
        interval.tick().await;
        let removed = auth.purge_expired(now_ms());
        if removed > 0 {
            info!("reaped {removed} expired sessions");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use crate::notify::NotifyHub;
    use std::path::PathBuf;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("carrent_test_reaper");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn compaction_waits_for_threshold() {
        let path = test_wal_path("threshold.wal");
        let engine = Engine::new(path, Arc::new(NotifyHub::new())).unwrap();

        let car = engine
            .create_car(NewCar {
                name: "Golf".into(),
                model: "2022".into(),
                daily_price: 40.0,
                available: None,
                image_url: None,
                description: "Hatchback".into(),
            })
            .await
            .unwrap();
        for price in 1..=4 {
            engine
                .update_car(
                    car.id,
                    CarPatch {
                        daily_price: Some(f64::from(price)),
                        ..CarPatch::default()
                    },
                )
                .await
                .unwrap();
        }

        assert!(!compact_if_needed(&engine, 10).await);
        assert_eq!(engine.wal_appends_since_compact().await, 5);

        assert!(compact_if_needed(&engine, 5).await);
        assert_eq!(engine.wal_appends_since_compact().await, 0);
        assert_eq!(engine.get_car(car.id).await.unwrap().daily_price, 4.0);
    }

    #[tokio::test]
    async fn session_reaper_purges_expired() {
        let auth = Arc::new(Authenticator::new(Duration::from_millis(1)));
        let admin = Admin {
            id: ulid::Ulid::new(),
            name: "Root".into(),
            email: "root@example.com".into(),
            password_hash: String::new(),
            created_at: 0,
        };
        auth.issue(&admin);
        tokio::time::sleep(Duration::from_millis(5)).await;

        // The first tick fires immediately.
        let task = tokio::spawn(run_session_reaper(auth.clone()));
        for _ in 0..100 {
            if auth.session_count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(auth.session_count(), 0);
        task.abort();
    }
}
