//! Registry behaviour through the public API.

use std::time::Duration;
use taskpool::{RegistryConfig, RegistryError, TaskId, TaskOutcome, TaskRegistry, TaskState};

const WAIT: Duration = Duration::from_secs(5);

fn registry_with(max_finished: usize) -> TaskRegistry<String> {
    let mut config = RegistryConfig::default();
    config.tasks.max_finished = max_finished;
    TaskRegistry::with_config(config).unwrap()
}

#[test]
fn test_every_task_finishes_exactly_once() {
    let registry = registry_with(50);
    let tasks: Vec<_> = (0..30)
        .map(|i| {
            registry
                .submit(
                    move || -> anyhow::Result<()> {
                        if i % 3 == 0 {
                            anyhow::bail!("job {} rejected", i);
                        }
                        Ok(())
                    },
                    format!("job-{}", i),
                    "dataset".to_string(),
                    Some(i),
                )
                .unwrap()
        })
        .collect();

    for task in &tasks {
        assert!(task.wait(WAIT));
        assert_eq!(task.state(), TaskState::Finished);
    }

    let mut order = registry.finished_order();
    assert_eq!(order.len(), 30);
    order.sort();
    order.dedup();
    assert_eq!(order.len(), 30);

    let failures = tasks
        .iter()
        .filter(|task| task.outcome().success() == Some(false))
        .count();
    assert_eq!(failures, 10);
}

#[test]
fn test_default_keeps_twenty_finished() {
    let registry: TaskRegistry<String> = TaskRegistry::new();
    for i in 0..25 {
        let task = registry
            .submit(|| anyhow::Ok(()), format!("job-{}", i), String::new(), None)
            .unwrap();
        assert!(task.wait(WAIT));
    }
    assert_eq!(registry.finished_count(), 20);
    assert_eq!(registry.finished_order().first(), Some(&TaskId(6)));
    assert!(registry.get(TaskId(5)).is_none());
    assert!(registry.get(TaskId(6)).is_some());
}

#[test]
fn test_panicking_work_is_failed() {
    let registry = registry_with(20);
    let task = registry
        .submit(
            || -> anyhow::Result<()> { panic!("worker blew up") },
            "explode",
            "ctx".to_string(),
            None,
        )
        .unwrap();
    assert!(task.wait(WAIT));
    assert_eq!(
        task.outcome(),
        TaskOutcome::Failed("panicked: worker blew up".to_string())
    );
    assert_eq!(registry.running_count(), 0);
}

#[test]
fn test_handle_outlives_eviction() {
    let registry = registry_with(1);
    let first = registry
        .submit(|| anyhow::Ok(()), "first", "a".to_string(), None)
        .unwrap();
    assert!(first.wait(WAIT));
    let second = registry
        .submit(|| anyhow::Ok(()), "second", "b".to_string(), None)
        .unwrap();
    assert!(second.wait(WAIT));

    assert!(registry.get(first.id()).is_none());
    assert_eq!(first.outcome(), TaskOutcome::Succeeded);
    assert_eq!(first.context(), "a");
}

#[test]
fn test_summaries_serialize() {
    let registry = registry_with(20);
    let task = registry
        .submit(|| anyhow::Ok(()), "export", "graph-1".to_string(), Some(12))
        .unwrap();
    assert!(task.wait(WAIT));

    let json = serde_json::to_value(registry.summaries()).unwrap();
    let entry = &json[0];
    assert_eq!(entry["taskId"], 1);
    assert_eq!(entry["task"], "export");
    assert_eq!(entry["context"], "graph-1");
    assert_eq!(entry["requestId"], 12);
    assert_eq!(entry["state"], "finished");
    assert_eq!(entry["success"], true);
}

#[test]
fn test_rejects_after_shutdown() {
    let registry = registry_with(20);
    registry.shutdown();
    let result = registry.submit(|| anyhow::Ok(()), "late", String::new(), None);
    assert_eq!(result.unwrap_err(), RegistryError::ShutDown);
}
