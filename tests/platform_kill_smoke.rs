use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use taskpulse::monitor::{Monitor, SamplerSettings};
use taskpulse::system::kill::{TerminateError, TerminateSignal, Terminated, terminate_process};
use taskpulse::system::SysinfoSource;

fn spawn_long_lived_child() -> Child {
    #[cfg(windows)]
    let mut cmd = {
        let mut c = Command::new("powershell");
        c.args([
            "-NoProfile",
            "-NonInteractive",
            "-Command",
            "Start-Sleep -Seconds 30",
        ]);
        c
    };

    #[cfg(not(windows))]
    let mut cmd = {
        let mut c = Command::new("sh");
        c.args(["-c", "sleep 30"]);
        c
    };

    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn child process")
}

fn wait_for_pid(pid: u32, timeout: Duration) -> bool {
    let sys_pid = Pid::from_u32(pid);
    let mut sys = System::new();
    let deadline = Instant::now() + timeout;
    loop {
        let pids = [sys_pid];
        sys.refresh_processes_specifics(
            ProcessesToUpdate::Some(&pids),
            true,
            ProcessRefreshKind::nothing(),
        );
        if sys.process(sys_pid).is_some() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(50));
    }
}

fn wait_for_exit(child: &mut Child, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(_)) => return,
            Ok(None) if Instant::now() < deadline => thread::sleep(Duration::from_millis(50)),
            Ok(None) => {
                let _ = child.kill();
                panic!("child process did not exit before timeout");
            }
            Err(err) => {
                let _ = child.kill();
                panic!("failed waiting for child exit: {err}");
            }
        }
    }
}

#[test]
fn terminate_nonexistent_pid_returns_not_found() {
    let result = terminate_process(u32::MAX, TerminateSignal::Term);
    assert_eq!(result, Err(TerminateError::NotFound(u32::MAX)));
}

#[test]
fn terminate_spawned_child() {
    let mut child = spawn_long_lived_child();
    let pid = child.id();

    if !wait_for_pid(pid, Duration::from_secs(3)) {
        let _ = child.kill();
        panic!("child process PID {pid} was not observed by sysinfo before terminate attempt");
    }

    let signal = if cfg!(windows) {
        TerminateSignal::Kill
    } else {
        TerminateSignal::Term
    };
    let result = match terminate_process(pid, signal) {
        Err(TerminateError::Failed { .. }) => {
            thread::sleep(Duration::from_millis(100));
            terminate_process(pid, TerminateSignal::Kill)
        }
        other => other,
    };

    match result {
        Ok(done) => {
            assert_eq!(done.pid, pid);
            wait_for_exit(&mut child, Duration::from_secs(5));
        }
        Err(err) => {
            let _ = child.kill();
            panic!("terminate_process reported failure: {err}");
        }
    }
}

#[test]
fn terminate_pinned_without_pin_is_rejected() {
    let settings = SamplerSettings {
        gpu: None,
        ..SamplerSettings::default()
    };
    let monitor = Monitor::with_source(SysinfoSource::new(None), &settings);
    assert_eq!(
        monitor.terminate_pinned(),
        Err(TerminateError::NoPinnedProcess)
    );
}

#[tokio::test]
async fn terminate_pinned_acts_once_the_pin_is_applied() {
    let mut child = spawn_long_lived_child();
    let pid = child.id();
    if !wait_for_pid(pid, Duration::from_secs(3)) {
        let _ = child.kill();
        panic!("child process PID {pid} was not observed by sysinfo");
    }

    let settings = SamplerSettings {
        gpu: None,
        ..SamplerSettings::default()
    }
    .with_interval(Duration::from_millis(50));
    let mut monitor = Monitor::with_source(SysinfoSource::new(None), &settings);
    let mut pin_watch = monitor.watch_pin();

    // Queued but not yet reconciled.
    monitor.pin(pid);
    assert_eq!(
        monitor.terminate_pinned(),
        Err(TerminateError::NoPinnedProcess)
    );

    monitor.start().unwrap();
    // The borrow returned by `wait_for` must not outlive this statement.
    let applied = tokio::time::timeout(
        Duration::from_secs(5),
        pin_watch.wait_for(|pinned| *pinned == Some(pid)),
    )
    .await
    .is_ok_and(|seen| seen.is_ok());
    if !applied {
        let _ = child.kill();
        panic!("pin on {pid} was never applied");
    }

    let signal = if cfg!(windows) { "SIGKILL" } else { "SIGTERM" };
    let result = if cfg!(windows) {
        monitor.force_terminate(pid)
    } else {
        monitor.terminate_pinned()
    };
    match result {
        Ok(done) => assert_eq!(done, Terminated { pid, signal }),
        Err(err) => {
            let _ = child.kill();
            panic!("terminate_pinned failed: {err}");
        }
    }
    wait_for_exit(&mut child, Duration::from_secs(5));

    let cleared = tokio::time::timeout(
        Duration::from_secs(5),
        pin_watch.wait_for(|pinned| pinned.is_none()),
    )
    .await
    .is_ok_and(|seen| seen.is_ok());
    assert!(cleared, "pin not cleared after terminate");
    monitor.shutdown().await;
}
