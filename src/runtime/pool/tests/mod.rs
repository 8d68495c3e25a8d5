//! WorkerPool 单元测试
//!
//! 测试线程池的按需启动、并发上限、空闲回收和关闭行为

use crate::runtime::pool::{PoolError, PoolSettings, WorkerPool};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn settings(max_workers: usize) -> PoolSettings {
    PoolSettings {
        max_workers,
        idle_timeout: Duration::from_secs(5),
        thread_name: "pool-test".to_string(),
    }
}

/// Poll `cond` until it holds or two seconds pass.
fn eventually(cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

#[cfg(test)]
mod settings_tests {
    use super::*;

    #[test]
    fn test_pool_settings_default() {
        let settings = PoolSettings::default();
        assert_eq!(settings.max_workers, 4);
        assert_eq!(settings.idle_timeout, Duration::from_secs(120));
        assert_eq!(settings.thread_name, "taskpool-worker");
    }
}

#[cfg(test)]
mod execute_tests {
    use super::*;

    #[test]
    fn test_pool_starts_without_threads() {
        let pool = WorkerPool::new(settings(4));
        let stats = pool.stats();
        assert_eq!(stats.live_workers, 0);
        assert_eq!(stats.queued_jobs, 0);
    }

    #[test]
    fn test_pool_runs_every_job() {
        let pool = WorkerPool::new(settings(4));
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..50 {
            let counter = counter.clone();
            pool.execute(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        }

        pool.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 50);
        assert_eq!(pool.stats().completed_jobs, 50);
    }

    #[test]
    fn test_pool_respects_max_workers() {
        let pool = WorkerPool::new(settings(2));
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for _ in 0..12 {
            let current = current.clone();
            let peak = peak.clone();
            pool.execute(Box::new(move || {
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(10));
                current.fetch_sub(1, Ordering::SeqCst);
            }))
            .unwrap();
            assert!(pool.stats().live_workers <= 2);
        }

        pool.shutdown();
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn test_pool_queues_excess_jobs() {
        let pool = WorkerPool::new(settings(1));
        let (release_tx, release_rx) = crossbeam::channel::bounded::<()>(0);

        pool.execute(Box::new(move || {
            let _ = release_rx.recv();
        }))
        .unwrap();
        for _ in 0..3 {
            pool.execute(Box::new(|| {})).unwrap();
        }

        assert!(eventually(|| pool.stats().queued_jobs == 3));
        assert_eq!(pool.stats().live_workers, 1);

        release_tx.send(()).unwrap();
        assert!(eventually(|| pool.stats().completed_jobs == 4));
    }

    #[test]
    fn test_panicking_job_keeps_worker_alive() {
        let pool = WorkerPool::new(settings(1));
        let counter = Arc::new(AtomicUsize::new(0));

        pool.execute(Box::new(|| panic!("boom"))).unwrap();
        let after = counter.clone();
        pool.execute(Box::new(move || {
            after.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();

        assert!(eventually(|| counter.load(Ordering::SeqCst) == 1));
        assert_eq!(pool.stats().live_workers, 1);
    }
}

#[cfg(test)]
mod lifecycle_tests {
    use super::*;

    #[test]
    fn test_idle_workers_retire() {
        let pool = WorkerPool::new(PoolSettings {
            idle_timeout: Duration::from_millis(30),
            ..settings(2)
        });
        pool.execute(Box::new(|| {})).unwrap();
        assert!(eventually(|| pool.stats().completed_jobs == 1));
        assert!(eventually(|| pool.stats().live_workers == 0));

        // A retired pool starts a fresh worker on demand.
        let counter = Arc::new(AtomicUsize::new(0));
        let inner = counter.clone();
        pool.execute(Box::new(move || {
            inner.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();
        assert!(eventually(|| counter.load(Ordering::SeqCst) == 1));
    }

    #[test]
    fn test_shutdown_drains_queue() {
        let pool = WorkerPool::new(settings(1));
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..10 {
            let counter = counter.clone();
            pool.execute(Box::new(move || {
                thread::sleep(Duration::from_millis(2));
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        }

        pool.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 10);
        assert_eq!(pool.stats().live_workers, 0);
    }

    #[test]
    fn test_execute_after_shutdown() {
        let pool = WorkerPool::new(settings(2));
        pool.shutdown();
        assert!(pool.is_shut_down());
        assert_eq!(pool.execute(Box::new(|| {})), Err(PoolError::ShutDown));
    }

    #[test]
    fn test_shutdown_twice() {
        let pool = WorkerPool::new(settings(2));
        pool.execute(Box::new(|| {})).unwrap();
        pool.shutdown();
        pool.shutdown();
        assert!(pool.is_shut_down());
    }
}
