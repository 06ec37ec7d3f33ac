use std::collections::HashMap;
use std::os::unix::process::CommandExt as _;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

const GRACEFUL_WAIT: Duration = Duration::from_secs(5);
const MONITOR_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum ProcessStartError {
    #[error("session {0} already has a running process")]
    AlreadyRunning(String),

    #[error("failed to spawn process: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Owns one child process for the duration of a single transcode session.
pub struct Supervisor {
    session_id: String,
    pid: Pid,
    stop_tx: Mutex<Option<oneshot::Sender<()>>>,
    exited: Arc<std::sync::atomic::AtomicBool>,
    monitor: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Supervisor {
    /// Spawns `program args` in a new process group with a parent-death
    /// signal installed, and launches the monitor task that reaps it.
    pub fn start(
        session_id: String,
        program: &str,
        args: &[String],
    ) -> Result<Self, ProcessStartError> {
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0);

        // SAFETY: prctl(PR_SET_PDEATHSIG) only touches the child's own
        // signal disposition before exec; it runs after fork, before exec,
        // with no access to parent memory.
        unsafe {
            command.pre_exec(|| {
                let ret = nix::libc::prctl(nix::libc::PR_SET_PDEATHSIG, nix::libc::SIGKILL);
                if ret != 0 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }

        let mut child = command.spawn()?;
        let pid = Pid::from_raw(child.id().ok_or_else(|| {
            std::io::Error::other("spawned child has no pid")
        })? as i32);

        info!(session_id = %session_id, pid = %pid, program, "encoder process started");

        let (stop_tx, stop_rx) = oneshot::channel();
        let exited = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let monitor = tokio::spawn(Self::monitor_loop(
            session_id.clone(),
            pid,
            child,
            stop_rx,
            Arc::clone(&exited),
        ));

        Ok(Self {
            session_id,
            pid,
            stop_tx: Mutex::new(Some(stop_tx)),
            exited,
            monitor: Mutex::new(Some(monitor)),
        })
    }

    #[must_use]
    pub fn pid(&self) -> u32 {
        self.pid.as_raw() as u32
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.exited.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Requests graceful termination of the whole process group, escalating
    /// to SIGKILL, then waits for the monitor task to finish reaping. Safe
    /// to call more than once.
    pub async fn stop(&self) {
        if let Some(tx) = self.stop_tx.lock().take() {
            let _ = tx.send(());
        }

        let handle = self.monitor.lock().take();
        if let Some(handle) = handle {
            if timeout(MONITOR_DRAIN_TIMEOUT, handle).await.is_err() {
                warn!(session_id = %self.session_id, "monitor task did not drain within timeout");
            }
        }
    }

    async fn monitor_loop(
        session_id: String,
        pid: Pid,
        mut child: Child,
        mut stop_rx: oneshot::Receiver<()>,
        exited: Arc<std::sync::atomic::AtomicBool>,
    ) {
        tokio::select! {
            result = child.wait() => {
                match result {
                    Ok(status) => debug!(session_id = %session_id, ?status, "encoder process exited"),
                    Err(err) => error!(session_id = %session_id, %err, "failed waiting on encoder process"),
                }
            }
            _ = &mut stop_rx => {
                terminate_process_group(&session_id, pid);
                match timeout(GRACEFUL_WAIT, child.wait()).await {
                    Ok(Ok(status)) => debug!(session_id = %session_id, ?status, "encoder process terminated"),
                    Ok(Err(err)) => error!(session_id = %session_id, %err, "error waiting after stop"),
                    Err(_) => {
                        warn!(session_id = %session_id, "process did not exit after SIGTERM, sending SIGKILL");
                        let _ = signal::killpg(pid, Signal::SIGKILL);
                        let _ = child.wait().await;
                    }
                }
            }
        }
        exited.store(true, std::sync::atomic::Ordering::SeqCst);
    }
}

fn terminate_process_group(session_id: &str, pid: Pid) {
    if let Err(err) = signal::killpg(pid, Signal::SIGTERM) {
        // ESRCH means the group is already gone; anything else is worth logging.
        if err != nix::errno::Errno::ESRCH {
            warn!(session_id, pid = %pid, %err, "failed to signal process group");
        }
    }
}

/// Aggregates supervisors by session id; enforces one live process per
/// session and exposes a bulk shutdown for server stop.
#[derive(Default)]
pub struct ProcessManager {
    supervisors: Mutex<HashMap<String, Arc<Supervisor>>>,
}

impl ProcessManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(
        &self,
        session_id: String,
        program: &str,
        args: &[String],
    ) -> Result<Arc<Supervisor>, ProcessStartError> {
        {
            let mut supervisors = self.supervisors.lock();
            if let Some(existing) = supervisors.get(&session_id) {
                if existing.is_running() {
                    return Err(ProcessStartError::AlreadyRunning(session_id));
                }
                supervisors.remove(&session_id);
            }
        }

        let supervisor = Arc::new(Supervisor::start(session_id.clone(), program, args)?);
        self.supervisors.lock().insert(session_id, Arc::clone(&supervisor));
        Ok(supervisor)
    }

    #[must_use]
    pub fn get(&self, session_id: &str) -> Option<Arc<Supervisor>> {
        let mut supervisors = self.supervisors.lock();
        match supervisors.get(session_id) {
            Some(s) if s.is_running() => Some(Arc::clone(s)),
            Some(_) => {
                supervisors.remove(session_id);
                None
            }
            None => None,
        }
    }

    pub async fn stop(&self, session_id: &str) {
        let supervisor = self.supervisors.lock().remove(session_id);
        if let Some(supervisor) = supervisor {
            supervisor.stop().await;
        }
    }

    /// Stops every tracked supervisor concurrently; used at server shutdown.
    pub async fn stop_all(&self) {
        let supervisors: Vec<Arc<Supervisor>> = {
            let mut map = self.supervisors.lock();
            map.drain().map(|(_, s)| s).collect()
        };
        let stops = supervisors.iter().map(|s| s.stop());
        futures::future::join_all(stops).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spawns_and_stops_a_process() {
        let supervisor = Supervisor::start(
            "session-1".to_string(),
            "sleep",
            &["5".to_string()],
        )
        .unwrap();
        assert!(supervisor.is_running());
        supervisor.stop().await;
        assert!(!supervisor.is_running());
    }

    #[tokio::test]
    async fn manager_rejects_duplicate_start_while_running() {
        let manager = ProcessManager::new();
        manager
            .start("session-2".to_string(), "sleep", &["5".to_string()])
            .unwrap();
        let err = manager
            .start("session-2".to_string(), "sleep", &["5".to_string()])
            .unwrap_err();
        assert!(matches!(err, ProcessStartError::AlreadyRunning(_)));
        manager.stop_all().await;
    }

    #[tokio::test]
    async fn manager_allows_restart_after_exit() {
        let manager = ProcessManager::new();
        manager
            .start("session-3".to_string(), "true", &[])
            .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(manager.get("session-3").is_none());
        manager
            .start("session-3".to_string(), "true", &[])
            .unwrap();
        manager.stop_all().await;
    }
}
