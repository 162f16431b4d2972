//! 监控状态机的测试
//!
//! 轮询结果直接喂给 apply_poll / apply_ready_probe，不经过网络；
//! 生命周期场景用 tempdir 里的假 tilt 脚本驱动真实子进程。

use std::collections::HashMap;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tilt_monitor::{
    Cadence, Health, LifecycleState, MonitorConfig, MonitorState, ResourceLabel, ResourceStatus,
    RuntimeStatus, StatusError, TiltMonitor, UpdateStatus,
};

fn ok_resource(name: &str) -> ResourceStatus {
    ResourceStatus {
        label: ResourceLabel::Named("svc".to_string()),
        name: name.to_string(),
        update_status: UpdateStatus::Ok,
        runtime_status: RuntimeStatus::Ok,
        disabled: false,
        warning_count: 0,
        warnings: Vec::new(),
    }
}

fn pending_resource(name: &str) -> ResourceStatus {
    ResourceStatus {
        update_status: UpdateStatus::InProgress,
        ..ok_resource(name)
    }
}

fn unreachable() -> StatusError {
    StatusError::Unreachable("connection refused".to_string())
}

fn protocol_error() -> StatusError {
    StatusError::Protocol("status api returned 500".to_string())
}

/// 记录每次观察者通知的状态
fn recording_observer(monitor: &mut TiltMonitor) -> Arc<Mutex<Vec<MonitorState>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    monitor.subscribe(move |state| sink.lock().unwrap().push(state.clone()));
    seen
}

fn monitor_without_process() -> TiltMonitor {
    TiltMonitor::new(MonitorConfig::default(), HashMap::new()).unwrap()
}

/// 写一个假 tilt：`up` 时挂住，其余子命令立即成功
fn write_stub(dir: &Path) -> PathBuf {
    let path = dir.join("tilt");
    fs::write(
        &path,
        "#!/bin/sh\nif [ \"$1\" = \"up\" ]; then exec sleep 30; fi\nexit 0\n",
    )
    .unwrap();
    let mut perms = fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).unwrap();
    path
}

fn monitor_with_stub(dir: &Path) -> TiltMonitor {
    fs::write(dir.join("Tiltfile"), "").unwrap();
    let stub = write_stub(dir);
    let config = MonitorConfig {
        tilt_file_path: dir.to_string_lossy().into_owned(),
        tilt_bin: stub.to_string_lossy().into_owned(),
        tilt_context: String::new(),
        ..Default::default()
    };
    let env = HashMap::from([("PATH".to_string(), "/usr/bin:/bin".to_string())]);
    TiltMonitor::new(config, env).unwrap()
}

#[test]
fn test_initial_state_is_down_on_slow_cadence() {
    let monitor = monitor_without_process();
    assert!(monitor.state().is_down());
    assert_eq!(monitor.cadence(), Cadence::Slow);
}

#[test]
fn test_scenario_unreachable_drops_up_to_down() {
    // Given: 一次成功轮询把状态带到 Up、快档
    let mut monitor = monitor_without_process();
    let seen = recording_observer(&mut monitor);
    monitor.apply_poll(Ok(vec![ok_resource("svc-a")]));
    assert!(monitor.state().is_up());
    assert_eq!(monitor.cadence(), Cadence::Fast);

    // When: 目标变得不可达
    monitor.apply_poll(Err(unreachable()));

    // Then: Up -> Down，调度器退回慢档
    assert!(monitor.state().is_down());
    assert_eq!(monitor.cadence(), Cadence::Slow);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert!(seen[0].is_up());
    assert!(seen[1].is_down());
}

#[test]
fn test_unreachable_while_down_stays_down_silently() {
    let mut monitor = monitor_without_process();
    let seen = recording_observer(&mut monitor);
    monitor.apply_poll(Err(unreachable()));
    monitor.apply_poll(Err(unreachable()));
    assert!(monitor.state().is_down());
    assert!(seen.lock().unwrap().is_empty());
}

#[test]
fn test_protocol_error_means_running_but_unhealthy() {
    let mut monitor = monitor_without_process();
    monitor.apply_poll(Ok(vec![ok_resource("svc-a")]));
    assert_eq!(monitor.state().health(), Some(Health::Healthy));

    // 可达但应答异常：不是 Down，是 Up(Unhealthy)
    monitor.apply_poll(Err(protocol_error()));
    assert_eq!(monitor.state().health(), Some(Health::Unhealthy));
    assert_eq!(monitor.cadence(), Cadence::Fast);

    // Down 状态下的协议错误同样说明目标在运行
    let mut monitor = monitor_without_process();
    monitor.apply_poll(Err(protocol_error()));
    assert_eq!(monitor.state().health(), Some(Health::Unhealthy));
}

#[test]
fn test_up_to_up_notifies_only_on_health_change() {
    let mut monitor = monitor_without_process();
    let seen = recording_observer(&mut monitor);

    monitor.apply_poll(Ok(vec![ok_resource("svc-a")]));
    // 健康不变（资源数变了也一样）：不重复通知
    monitor.apply_poll(Ok(vec![ok_resource("svc-a"), ok_resource("svc-b")]));
    assert_eq!(seen.lock().unwrap().len(), 1);

    // 健康变化：通知
    monitor.apply_poll(Ok(vec![pending_resource("svc-a")]));
    assert_eq!(seen.lock().unwrap().len(), 2);
    assert_eq!(monitor.state().health(), Some(Health::Pending));
}

#[test]
fn test_ready_probe_ignored_outside_starting() {
    // Down 状态下就绪探测的迟到结果不得改变状态
    let mut monitor = monitor_without_process();
    monitor.apply_ready_probe(Ok(vec![ok_resource("svc-a")]));
    assert!(monitor.state().is_down());
}

#[test]
fn test_panicking_observer_does_not_poison_the_rest() {
    let mut monitor = monitor_without_process();
    monitor.subscribe(|_| panic!("broken observer"));
    let seen = recording_observer(&mut monitor);

    monitor.apply_poll(Ok(vec![ok_resource("svc-a")]));

    // 第一个观察者 panic 被吞掉，后注册的仍收到通知
    assert_eq!(seen.lock().unwrap().len(), 1);
    assert!(monitor.state().is_up());
}

#[tokio::test]
async fn test_scenario_become_ready_after_retries() {
    // Given: start 成功进入 Starting
    let dir = tempfile::tempdir().unwrap();
    let mut monitor = monitor_with_stub(dir.path());
    let seen = recording_observer(&mut monitor);

    monitor.start_target().unwrap();
    assert!(monitor.state().is_starting());
    assert_eq!(monitor.lifecycle_state(), LifecycleState::Launching);

    // When: 就绪轮询失败三次后第四次成功
    for _ in 0..3 {
        monitor.apply_ready_probe(Err(unreachable()));
        assert!(monitor.state().is_starting());
    }
    monitor.apply_ready_probe(Ok(vec![ok_resource("svc-a")]));

    // Then: Down -> Starting -> Up 恰好各发生一次
    assert_eq!(monitor.state().health(), Some(Health::Healthy));
    assert_eq!(monitor.lifecycle_state(), LifecycleState::Ready);
    assert_eq!(monitor.cadence(), Cadence::Fast);
    {
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].is_starting());
        assert!(seen[1].is_up());
        assert_eq!(seen.iter().filter(|s| s.is_up()).count(), 1);
    }

    monitor.stop_target().await;
}

#[tokio::test]
async fn test_scenario_stop_while_starting_never_reaches_up() {
    // Given: Starting 中
    let dir = tempfile::tempdir().unwrap();
    let mut monitor = monitor_with_stub(dir.path());
    let seen = recording_observer(&mut monitor);
    monitor.start_target().unwrap();

    // When: 显式 stop
    monitor.stop_target().await;

    // Then: 终态 Down，从未进入 Up，就绪轮询结果被丢弃
    assert!(monitor.state().is_down());
    assert_eq!(monitor.lifecycle_state(), LifecycleState::Idle);
    assert_eq!(monitor.cadence(), Cadence::Slow);

    monitor.apply_ready_probe(Ok(vec![ok_resource("svc-a")]));
    assert!(monitor.state().is_down());

    let seen = seen.lock().unwrap();
    assert!(seen.iter().all(|s| !s.is_up()));
    assert!(seen.last().unwrap().is_down());
}

#[tokio::test]
async fn test_start_is_a_noop_unless_down() {
    let mut monitor = monitor_without_process();
    monitor.apply_poll(Ok(vec![ok_resource("svc-a")]));
    assert!(monitor.state().is_up());

    // Up 状态下 start 是 no-op，不会再 spawn 进程
    monitor.start_target().unwrap();
    assert!(monitor.state().is_up());
    assert_eq!(monitor.lifecycle_state(), LifecycleState::Idle);
}

#[tokio::test]
async fn test_crashed_launch_aborts_to_down() {
    // Given: up 立即退出的假 tilt
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("Tiltfile"), "").unwrap();
    let stub = dir.path().join("tilt");
    fs::write(&stub, "#!/bin/sh\nexit 1\n").unwrap();
    let mut perms = fs::metadata(&stub).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&stub, perms).unwrap();

    let config = MonitorConfig {
        tilt_file_path: dir.path().to_string_lossy().into_owned(),
        tilt_bin: stub.to_string_lossy().into_owned(),
        tilt_context: String::new(),
        ..Default::default()
    };
    let env = HashMap::from([("PATH".to_string(), "/usr/bin:/bin".to_string())]);
    let mut monitor = TiltMonitor::new(config, env).unwrap();

    monitor.start_target().unwrap();
    assert!(monitor.state().is_starting());

    // When: 子进程已死，下一次就绪探测仍然失败
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    monitor.apply_ready_probe(Err(unreachable()));

    // Then: Starting -> Down，所有权被回收
    assert!(monitor.state().is_down());
    assert_eq!(monitor.lifecycle_state(), LifecycleState::Idle);
}
