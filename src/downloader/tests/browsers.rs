use super::*;
use crate::install::InstallationStore;
use crate::types::{BrowserKind, BrowserRecord};
use std::path::PathBuf;

/// Firefox gets no default flags, so `/bin/sh -c <script>` stands in for it
fn shell_browser(version: &str) -> BrowserRecord {
    BrowserRecord {
        id: uuid::Uuid::new_v4().to_string(),
        kind: BrowserKind::Firefox,
        version: version.to_string(),
        platform: "linux64".to_string(),
        install_path: PathBuf::from("/bin"),
        executable_path: PathBuf::from("/bin/sh"),
        download_date: chrono::Utc::now(),
        file_size: 0,
        is_running: false,
    }
}

async fn is_running(t: &TestDownloader, id: &str) -> bool {
    t.store
        .list()
        .await
        .unwrap()
        .into_iter()
        .find(|record| record.id == id)
        .unwrap()
        .is_running
}

async fn wait_until_stopped(t: &TestDownloader, id: &str) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while is_running(t, id).await {
        assert!(tokio::time::Instant::now() < deadline, "record {id} still running");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn test_launch_tracks_running_flag_until_exit() {
    let t = create_test_downloader(test_config(1), COMPLETING_WORKER).await;
    let record = shell_browser("121.0");
    let id = record.id.clone();
    t.store.save(record).await.unwrap();
    let pid_file = t.scratch("browser.pid");

    let pid = t
        .downloader
        .launch(
            &id,
            vec![
                "-c".into(),
                format!("echo $$ > '{}'; sleep 0.3", pid_file.display()),
            ],
        )
        .await
        .unwrap();

    assert!(is_running(&t, &id).await);
    assert_eq!(read_pid(&pid_file).await, pid as i32);
    wait_until_stopped(&t, &id).await;
}

#[tokio::test]
async fn test_second_launch_while_running_is_rejected() {
    let t = create_test_downloader(test_config(1), COMPLETING_WORKER).await;
    let record = shell_browser("121.0");
    let id = record.id.clone();
    t.store.save(record).await.unwrap();

    t.downloader
        .launch(&id, vec!["-c".into(), "sleep 0.5".into()])
        .await
        .unwrap();
    let second = t.downloader.launch(&id, vec!["-c".into(), "true".into()]).await;
    assert!(matches!(second, Err(Error::AlreadyRunning(ref rid)) if *rid == id));

    wait_until_stopped(&t, &id).await;
    t.downloader
        .launch(&id, vec!["-c".into(), "true".into()])
        .await
        .unwrap();
}

#[tokio::test]
async fn test_launch_rejects_unknown_and_broken_records() {
    let t = create_test_downloader(test_config(1), COMPLETING_WORKER).await;

    let unknown = t.downloader.launch("no-such-record", Vec::new()).await;
    assert!(matches!(unknown, Err(Error::InstallationNotFound(_))));

    let mut missing = shell_browser("120.0");
    missing.executable_path = t.scratch("deleted/firefox");
    let missing_id = missing.id.clone();
    t.store.save(missing).await.unwrap();
    let result = t.downloader.launch(&missing_id, Vec::new()).await;
    assert!(matches!(result, Err(Error::ExecutableMissing(_))));
    assert!(!is_running(&t, &missing_id).await, "failed launch must clear the flag");

    let mut driver = shell_browser("120.0");
    driver.kind = BrowserKind::ChromeDriver;
    let driver_id = driver.id.clone();
    t.store.save(driver).await.unwrap();
    let result = t.downloader.launch(&driver_id, Vec::new()).await;
    assert!(matches!(result, Err(Error::InvalidTarget(_))));
}

#[tokio::test]
async fn test_shutdown_releases_running_flag_without_killing_browser() {
    let t = create_test_downloader(test_config(1), COMPLETING_WORKER).await;
    let record = shell_browser("121.0");
    let id = record.id.clone();
    t.store.save(record).await.unwrap();
    let pid_file = t.scratch("browser.pid");

    t.downloader
        .launch(
            &id,
            vec![
                "-c".into(),
                format!("echo $$ > '{}'; exec sleep 2", pid_file.display()),
            ],
        )
        .await
        .unwrap();
    let pid = read_pid(&pid_file).await;

    t.downloader.shutdown().await.unwrap();
    wait_until_stopped(&t, &id).await;
    assert!(process_alive(pid), "browser must outlive shutdown");

    let after = t.downloader.launch(&id, Vec::new()).await;
    assert!(matches!(after, Err(Error::ShuttingDown)));
}

#[tokio::test]
async fn test_clear_installations_uninstalls_each_record() {
    let t = create_test_downloader(test_config(1), COMPLETING_WORKER).await;
    let calls = t.scratch("uninstalls");
    write_script(
        t.scripts.path(),
        "uninstall-browser.js",
        &format!(
            "echo \"$*\" >> '{calls}'\ncase \"$*\" in *120.0*) echo 'ERROR:Permission denied'; exit 1;; esac\necho 'SUCCESS:removed'\n",
            calls = calls.display()
        ),
    );
    for version in ["119.0", "120.0", "121.0"] {
        t.store.save(shell_browser(version)).await.unwrap();
    }

    let removed = t.downloader.clear_installations().await.unwrap();

    assert_eq!(removed, 2);
    assert_eq!(spawn_count(&calls), 3);
    let left = t.downloader.installations().await.unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].version, "120.0");
}
