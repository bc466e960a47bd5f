use super::*;

#[tokio::test]
async fn test_shutdown_terminates_live_workers() {
    let t = create_test_downloader(test_config(3), "").await;
    let pids = t.scratch("pids");
    t.set_worker(&format!("echo $$ >> '{}'\nexec sleep 30\n", pids.display()));

    let a = t.downloader.start(chrome()).await.unwrap();
    let b = t.downloader.start(chrome()).await.unwrap();
    wait_for_status(&t.downloader, a, Status::Downloading).await;
    wait_for_status(&t.downloader, b, Status::Downloading).await;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    let worker_pids: Vec<i32> = loop {
        let pids: Vec<i32> = std::fs::read_to_string(&pids)
            .unwrap_or_default()
            .lines()
            .filter_map(|line| line.trim().parse().ok())
            .collect();
        if pids.len() == 2 {
            break pids;
        }
        assert!(tokio::time::Instant::now() < deadline, "workers did not start");
        tokio::time::sleep(Duration::from_millis(20)).await;
    };

    let started = std::time::Instant::now();
    t.downloader.shutdown().await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));

    for pid in worker_pids {
        assert!(!process_alive(pid), "worker {pid} survived shutdown");
    }
    assert!(t.downloader.is_shutting_down());
}

#[tokio::test]
async fn test_operations_after_shutdown_are_rejected() {
    let t = create_test_downloader(
        test_config(3),
        "echo 'ERROR:Invalid version'\nexit 1\n",
    )
    .await;

    let id = t.downloader.start(chrome()).await.unwrap();
    wait_for_status(&t.downloader, id, Status::Failed).await;

    t.downloader.shutdown().await.unwrap();

    assert!(matches!(
        t.downloader.start(chrome()).await,
        Err(Error::ShuttingDown)
    ));
    assert!(matches!(t.downloader.retry(id).await, Err(Error::ShuttingDown)));
    // Registry stays readable
    assert_eq!(t.downloader.get(id).await.unwrap().status, Status::Failed);
    // Second shutdown is harmless
    t.downloader.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_queued_tasks_are_not_started_after_shutdown() {
    let t = create_test_downloader(test_config(1), HANGING_WORKER).await;

    let running = t.downloader.start(chrome()).await.unwrap();
    let queued = t.downloader.start(chrome()).await.unwrap();
    wait_for_status(&t.downloader, running, Status::Downloading).await;

    t.downloader.shutdown().await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(t.downloader.get(queued).await.unwrap().status, Status::Pending);
}
