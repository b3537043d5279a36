use std::sync::Arc;
use std::time::Duration;

use ward::child_record::ChildState;
use ward::clock::SystemClock;
use ward::directory_monitor::{ConfigMonitor, MessageMonitor, MessageSink};
use ward::event_receiver::EventReceiver;
use ward::message::{self, Message};
use ward::process_monitor::{ProcessMonitor, ProcessMonitorConfig, ProcessMonitorHandle};
use ward::spawner::RealSpawner;

async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

/// Mirrors the supervisor's own message-dispatch loop: parse each drained
/// message and apply it to the process monitor handle.
struct DispatchingSink {
    handle: ProcessMonitorHandle,
}

impl MessageSink for DispatchingSink {
    fn message(&mut self, raw: &[u8]) {
        match Message::parse(raw) {
            Ok(Message::Restart { name }) => self.handle.restart(&name),
            Ok(Message::RestartAll) => self.handle.restart_all(),
            Ok(Message::RestartGroup { group }) => {
                self.handle.restart_group(vec![group]);
            }
            Err(err) => panic!("malformed message in test fixture: {err}"),
        }
    }
}

#[tokio::test]
async fn add_config_spawns_process_and_remove_stops_it() {
    let config_dir = tempfile::tempdir().unwrap();
    let pid_dir = tempfile::tempdir().unwrap();

    let mut monitor = ProcessMonitor::new(
        Arc::new(RealSpawner),
        Arc::new(SystemClock),
        ProcessMonitorConfig::default(),
        pid_dir.path(),
    );
    let handle = monitor.handle();
    tokio::spawn(async move { monitor.run().await });

    let mut event_receiver = EventReceiver::new(handle.clone());
    let mut config_monitor = ConfigMonitor::new(config_dir.path());

    tokio::fs::write(
        config_dir.path().join("sleeper"),
        br#"{"args": ["sleep", "30"]}"#,
    )
    .await
    .unwrap();

    config_monitor.poll(&mut event_receiver).await.unwrap();
    settle().await;

    let pid_path = pid_dir.path().join("sleeper");
    assert!(pid_path.exists(), "pid file should appear once spawned");

    tokio::fs::remove_file(config_dir.path().join("sleeper"))
        .await
        .unwrap();
    config_monitor.poll(&mut event_receiver).await.unwrap();
    settle().await;

    assert!(
        !pid_path.exists(),
        "pid file should be cleaned up once the child is stopped"
    );
}

#[tokio::test]
async fn restart_all_message_is_drained_and_applied() {
    let config_dir = tempfile::tempdir().unwrap();
    let messages_dir = tempfile::tempdir().unwrap();
    let pid_dir = tempfile::tempdir().unwrap();

    let mut monitor = ProcessMonitor::new(
        Arc::new(RealSpawner),
        Arc::new(SystemClock),
        ProcessMonitorConfig::default(),
        pid_dir.path(),
    );
    let handle = monitor.handle();
    tokio::spawn(async move { monitor.run().await });

    let mut event_receiver = EventReceiver::new(handle.clone());
    let mut config_monitor = ConfigMonitor::new(config_dir.path());

    tokio::fs::write(config_dir.path().join("svc"), br#"{"args": ["sleep", "30"]}"#)
        .await
        .unwrap();
    config_monitor.poll(&mut event_receiver).await.unwrap();
    settle().await;

    let pid_path = pid_dir.path().join("svc");
    let pid_before = tokio::fs::read_to_string(&pid_path).await.unwrap();

    message::write_message(messages_dir.path(), &Message::RestartAll)
        .await
        .unwrap();

    let mut entries = tokio::fs::read_dir(messages_dir.path()).await.unwrap();
    assert!(entries.next_entry().await.unwrap().is_some());

    let names: Vec<String> = event_receiver.names().map(str::to_string).collect();
    assert_eq!(names, vec!["svc".to_string()]);

    let mut message_monitor = MessageMonitor::new(messages_dir.path());
    let mut sink = DispatchingSink { handle: handle.clone() };
    message_monitor.poll(&mut sink).await.unwrap();

    let mut entries = tokio::fs::read_dir(messages_dir.path()).await.unwrap();
    assert!(
        entries.next_entry().await.unwrap().is_none(),
        "drained message file should have been deleted"
    );

    settle().await;
    let pid_after = tokio::fs::read_to_string(&pid_path).await.unwrap();
    assert_ne!(
        pid_before, pid_after,
        "restart-all should have respawned 'svc' with a new pid"
    );
}

#[test]
fn child_state_display_matches_expected_names() {
    assert_eq!(ChildState::Running.to_string(), "Running");
    assert_eq!(ChildState::None.to_string(), "None");
}
