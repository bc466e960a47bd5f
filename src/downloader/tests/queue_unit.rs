use super::*;
use crate::types::TaskId;
use std::sync::Arc;

fn queue() -> Arc<AdmissionQueue> {
    Arc::new(AdmissionQueue::new(2))
}

// --- enqueue() / pop() tests ---

#[test]
fn test_pop_is_fifo() {
    let queue = queue();
    for id in 1..=3 {
        queue.enqueue(TaskId(id)).unwrap();
    }

    let first = queue.pop().unwrap();
    let second = queue.pop().unwrap();
    assert_eq!(first.id(), TaskId(1));
    assert_eq!(second.id(), TaskId(2));
    assert_eq!(queue.counts(), (1, 2));
}

#[test]
fn test_duplicate_enqueue_is_rejected() {
    let queue = queue();
    queue.enqueue(TaskId(7)).unwrap();
    assert!(matches!(
        queue.enqueue(TaskId(7)),
        Err(Error::AlreadyActive(TaskId(7)))
    ));

    let guard = queue.pop().unwrap();
    assert!(
        matches!(queue.enqueue(TaskId(7)), Err(Error::AlreadyActive(_))),
        "an active id cannot be queued again"
    );

    drop(guard);
    assert!(!queue.is_active(TaskId(7)));
    queue.enqueue(TaskId(7)).unwrap();
    assert!(queue.is_queued(TaskId(7)));
}

#[test]
fn test_remove_drops_only_queued_ids() {
    let queue = queue();
    queue.enqueue(TaskId(1)).unwrap();
    queue.enqueue(TaskId(2)).unwrap();
    let _active = queue.pop().unwrap();

    assert!(!queue.remove(TaskId(1)), "active id is not in the queue");
    assert!(queue.remove(TaskId(2)));
    assert!(!queue.remove(TaskId(2)));
    assert_eq!(queue.counts(), (0, 1));
}

#[test]
fn test_stop_accepting_rejects_enqueue() {
    let queue = queue();
    queue.stop_accepting();
    assert!(!queue.is_accepting());
    assert!(matches!(queue.enqueue(TaskId(1)), Err(Error::ShuttingDown)));
}

// --- async waiting tests ---

#[tokio::test]
async fn test_next_wakes_on_enqueue() {
    let queue = queue();
    let waiter = {
        let queue = Arc::clone(&queue);
        tokio::spawn(async move { queue.next().await.id() })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    queue.enqueue(TaskId(42)).unwrap();

    let id = tokio::time::timeout(Duration::from_secs(2), waiter)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(id, TaskId(42));
}

#[tokio::test]
async fn test_wait_released_returns_after_guard_drop() {
    let queue = queue();
    queue.enqueue(TaskId(5)).unwrap();
    let guard = queue.pop().unwrap();

    let waiter = {
        let queue = Arc::clone(&queue);
        tokio::spawn(async move { queue.wait_released(TaskId(5)).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!waiter.is_finished());

    drop(guard);
    tokio::time::timeout(Duration::from_secs(2), waiter)
        .await
        .unwrap()
        .unwrap();
}
