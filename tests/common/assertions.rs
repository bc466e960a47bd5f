//! Event-driven waits and assertions

use browser_dl::{BrowserDownloader, ChangeKind, Status, TaskEvent, TaskId};
use std::time::Duration;
use tokio::sync::broadcast::Receiver;

/// Result of waiting for a task to finish
#[derive(Debug, PartialEq)]
pub enum WaitResult {
    /// Task completed
    Completed,
    /// Task failed with this message
    Failed(String),
    /// Timeout waiting for a terminal state
    Timeout,
    /// Channel closed unexpectedly
    ChannelClosed,
}

/// Wait until `id` reaches `Completed` or `Failed`
///
/// Subscribe before starting the task so no event is missed.
pub async fn wait_for_terminal(
    events: &mut Receiver<TaskEvent>,
    id: TaskId,
    timeout: Duration,
) -> WaitResult {
    let result = tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(event) if event.task_id == id => match event.status {
                    Status::Completed => return WaitResult::Completed,
                    Status::Failed => {
                        return WaitResult::Failed(event.error_message.unwrap_or_default());
                    }
                    _ => continue,
                },
                Ok(_) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(_) => return WaitResult::ChannelClosed,
            }
        }
    })
    .await;

    result.unwrap_or(WaitResult::Timeout)
}

/// Collect every event for `id` until `done` matches one
pub async fn collect_events_until<F>(
    events: &mut Receiver<TaskEvent>,
    id: TaskId,
    timeout: Duration,
    done: F,
) -> Vec<TaskEvent>
where
    F: Fn(&TaskEvent) -> bool,
{
    let mut collected = Vec::new();
    let _ = tokio::time::timeout(timeout, async {
        while let Ok(event) = events.recv().await {
            if event.task_id != id {
                continue;
            }
            let finished = done(&event);
            collected.push(event);
            if finished {
                break;
            }
        }
    })
    .await;
    collected
}

/// Assert the task's current status
pub async fn assert_status(downloader: &BrowserDownloader, id: TaskId, expected: Status) {
    let task = downloader.get(id).await.unwrap();
    assert_eq!(
        task.status, expected,
        "task {id}: expected {expected}, got {} ({:?})",
        task.status, task.error_message
    );
}

/// Poll until the task has `status`
pub async fn wait_for_status(downloader: &BrowserDownloader, id: TaskId, status: Status) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while downloader.get(id).await.unwrap().status != status {
        assert!(
            tokio::time::Instant::now() < deadline,
            "task {id} never reached {status}"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Assert a sequence of events never moves progress backwards while downloading
pub fn assert_progress_monotonic(events: &[TaskEvent]) {
    let mut last = 0.0;
    for event in events {
        if event.status == Status::Downloading
            && let Some(progress) = event.progress
        {
            assert!(progress >= last, "progress went from {last} to {progress}");
            last = progress;
        }
        if let (Some(done), Some(total)) = (event.downloaded_bytes, event.total_bytes)
            && total > 0
        {
            assert!(done <= total, "downloaded {done} exceeds total {total}");
        }
    }
}

/// Whether the events include the task's creation
pub fn saw_created(events: &[TaskEvent]) -> bool {
    events.iter().any(|event| event.change == ChangeKind::Created)
}
