//! Port reclaimer: probe a local TCP port and force-terminate whatever owns it.
//!
//! Owner lookup is platform specific and hidden behind [`PortOwnerLocator`]:
//! [`Lsof`] on Unix-likes, [`Netstat`] (socket table + `taskkill`) on Windows.
//! Reclaiming is best effort; failures are logged and never abort the caller.

use std::net::{TcpStream, ToSocketAddrs};
use std::process::{Command, Stdio};
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

use crate::error::{DevbootError, Result};

const PROBE_TIMEOUT: Duration = Duration::from_millis(500);
const DEFAULT_SETTLE: Duration = Duration::from_millis(300);

/// True iff something accepts a TCP connection on `localhost:port`.
pub fn is_occupied(port: u16) -> bool {
    let addrs = match ("localhost", port).to_socket_addrs() {
        Ok(addrs) => addrs,
        Err(_) => return false,
    };
    addrs
        .into_iter()
        .any(|addr| TcpStream::connect_timeout(&addr, PROBE_TIMEOUT).is_ok())
}

// ---------------------------------------------------------------------------
// PortOwnerLocator
// ---------------------------------------------------------------------------

pub trait PortOwnerLocator {
    fn name(&self) -> &'static str;

    /// PIDs of processes listening on `port`. Empty when nothing matches.
    fn find_owners(&self, port: u16) -> Result<Vec<u32>>;

    /// Force-terminate `pid`.
    fn terminate(&self, pid: u32) -> Result<()>;
}

/// Pick the locator for the platform we are running on.
pub fn platform_locator() -> Box<dyn PortOwnerLocator> {
    if cfg!(windows) {
        Box::new(Netstat)
    } else {
        Box::new(Lsof)
    }
}

/// `lsof -ti tcp:<port> -sTCP:LISTEN` + `kill -9`.
pub struct Lsof;

impl PortOwnerLocator for Lsof {
    fn name(&self) -> &'static str {
        "lsof"
    }

    fn find_owners(&self, port: u16) -> Result<Vec<u32>> {
        let lsof = which::which("lsof")?;
        let output = Command::new(lsof)
            .args(["-t", "-i", &format!("tcp:{port}"), "-sTCP:LISTEN"])
            .stderr(Stdio::null())
            .output()?;
        // lsof exits 1 when nothing matches.
        Ok(parse_lsof(&String::from_utf8_lossy(&output.stdout)))
    }

    fn terminate(&self, pid: u32) -> Result<()> {
        let status = Command::new("kill")
            .args(["-9", &pid.to_string()])
            .stderr(Stdio::null())
            .status()?;
        if !status.success() {
            return Err(DevbootError::ExternalCommandFailure {
                command: format!("kill -9 {pid}"),
                code: status.code(),
            });
        }
        Ok(())
    }
}

/// `netstat -ano -p tcp` socket table + `taskkill /F`.
pub struct Netstat;

impl PortOwnerLocator for Netstat {
    fn name(&self) -> &'static str {
        "netstat"
    }

    fn find_owners(&self, port: u16) -> Result<Vec<u32>> {
        let netstat = which::which("netstat")?;
        let output = Command::new(netstat)
            .args(["-ano", "-p", "tcp"])
            .stderr(Stdio::null())
            .output()?;
        if !output.status.success() {
            return Err(DevbootError::ExternalCommandFailure {
                command: "netstat -ano -p tcp".to_string(),
                code: output.status.code(),
            });
        }
        Ok(parse_netstat(&String::from_utf8_lossy(&output.stdout), port))
    }

    fn terminate(&self, pid: u32) -> Result<()> {
        let status = Command::new("taskkill")
            .args(["/F", "/PID", &pid.to_string()])
            .stdout(Stdio::null())
            .status()?;
        if !status.success() {
            return Err(DevbootError::ExternalCommandFailure {
                command: format!("taskkill /F /PID {pid}"),
                code: status.code(),
            });
        }
        Ok(())
    }
}

/// One PID per line; junk and duplicates are dropped.
pub fn parse_lsof(stdout: &str) -> Vec<u32> {
    let mut pids = Vec::new();
    for pid in stdout.split_whitespace().filter_map(|s| s.parse::<u32>().ok()) {
        if !pids.contains(&pid) {
            pids.push(pid);
        }
    }
    pids
}

static NETSTAT_RE: OnceLock<Regex> = OnceLock::new();

fn netstat_re() -> &'static Regex {
    NETSTAT_RE.get_or_init(|| {
        Regex::new(r"^\s*TCP\s+\S+:(\d+)\s+\S+\s+LISTENING\s+(\d+)\s*$")
            .expect("static netstat pattern")
    })
}

/// PIDs from `netstat -ano` rows whose local address listens on `port`.
pub fn parse_netstat(stdout: &str, port: u16) -> Vec<u32> {
    let mut pids = Vec::new();
    for caps in stdout.lines().filter_map(|l| netstat_re().captures(l)) {
        let local_port = caps[1].parse::<u16>().ok();
        let pid = caps[2].parse::<u32>().ok();
        if let (Some(p), Some(pid)) = (local_port, pid) {
            if p == port && pid != 0 && !pids.contains(&pid) {
                pids.push(pid);
            }
        }
    }
    pids
}

// ---------------------------------------------------------------------------
// PortReclaimer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortOccupancy {
    pub port: u16,
    pub pid: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReclaimOutcome {
    AlreadyFree,
    Freed { terminated: Vec<u32> },
    StillOccupied { terminated: Vec<u32> },
}

pub struct PortReclaimer {
    locator: Box<dyn PortOwnerLocator>,
    settle: Duration,
}

impl PortReclaimer {
    pub fn for_platform() -> Self {
        Self::with_locator(platform_locator())
    }

    pub fn with_locator(locator: Box<dyn PortOwnerLocator>) -> Self {
        Self {
            locator,
            settle: DEFAULT_SETTLE,
        }
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Snapshot of who holds `port` right now.
    pub fn occupancy(&self, port: u16) -> PortOccupancy {
        let pid = if is_occupied(port) {
            self.locator
                .find_owners(port)
                .ok()
                .and_then(|pids| pids.first().copied())
        } else {
            None
        };
        PortOccupancy { port, pid }
    }

    /// Free `port` if something holds it. Never fails: every problem is
    /// logged and reflected in the outcome.
    pub fn reclaim(&self, port: u16) -> ReclaimOutcome {
        if !is_occupied(port) {
            tracing::debug!(port, "port is free");
            return ReclaimOutcome::AlreadyFree;
        }
        tracing::info!(port, locator = self.locator.name(), "port in use, reclaiming");

        let owners = match self.locator.find_owners(port) {
            Ok(pids) => pids,
            Err(e) => {
                let failure = DevbootError::PortReclaimFailure {
                    port,
                    reason: e.to_string(),
                };
                tracing::warn!(error = %failure, "could not list port owners");
                Vec::new()
            }
        };

        let me = std::process::id();
        let mut terminated = Vec::new();
        for pid in owners {
            if pid == me {
                tracing::warn!(port, pid, "refusing to terminate our own process");
                continue;
            }
            tracing::info!(port, pid, "terminating port owner");
            match self.locator.terminate(pid) {
                Ok(()) => terminated.push(pid),
                Err(e) => {
                    let failure = DevbootError::PortReclaimFailure {
                        port,
                        reason: format!("pid {pid}: {e}"),
                    };
                    tracing::warn!(error = %failure, "termination failed");
                }
            }
        }

        std::thread::sleep(self.settle);
        if is_occupied(port) {
            tracing::warn!(
                port,
                "port still occupied after reclaim attempt; the server will likely fail to bind"
            );
            ReclaimOutcome::StillOccupied { terminated }
        } else {
            tracing::info!(port, "port freed");
            ReclaimOutcome::Freed { terminated }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::sync::Mutex;

    fn free_port() -> u16 {
        TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    /// Pretends `pid` owns the port; terminating it drops the listener.
    struct FakeOwner {
        pid: u32,
        listener: Mutex<Option<TcpListener>>,
    }

    impl PortOwnerLocator for FakeOwner {
        fn name(&self) -> &'static str {
            "fake"
        }

        fn find_owners(&self, _port: u16) -> Result<Vec<u32>> {
            let held = self.listener.lock().unwrap().is_some();
            Ok(if held { vec![self.pid] } else { vec![] })
        }

        fn terminate(&self, pid: u32) -> Result<()> {
            assert_eq!(pid, self.pid);
            self.listener.lock().unwrap().take();
            Ok(())
        }
    }

    struct Stubborn;

    impl PortOwnerLocator for Stubborn {
        fn name(&self) -> &'static str {
            "stubborn"
        }

        fn find_owners(&self, _port: u16) -> Result<Vec<u32>> {
            Ok(vec![4242])
        }

        fn terminate(&self, pid: u32) -> Result<()> {
            Err(DevbootError::ExternalCommandFailure {
                command: format!("kill -9 {pid}"),
                code: Some(1),
            })
        }
    }

    #[test]
    fn probe_sees_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(is_occupied(port));
        drop(listener);
        assert!(!is_occupied(port));
    }

    #[test]
    fn reclaim_frees_occupied_port() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let reclaimer = PortReclaimer::with_locator(Box::new(FakeOwner {
            pid: 4242,
            listener: Mutex::new(Some(listener)),
        }))
        .with_settle(Duration::from_millis(10));

        let outcome = reclaimer.reclaim(port);
        assert_eq!(
            outcome,
            ReclaimOutcome::Freed {
                terminated: vec![4242]
            }
        );
        assert!(!is_occupied(port));
    }

    #[test]
    fn reclaim_is_idempotent_on_free_port() {
        let port = free_port();
        let reclaimer = PortReclaimer::with_locator(Box::new(Stubborn));
        assert_eq!(reclaimer.reclaim(port), ReclaimOutcome::AlreadyFree);
        assert_eq!(reclaimer.reclaim(port), ReclaimOutcome::AlreadyFree);
    }

    #[test]
    fn failed_termination_is_not_fatal() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let reclaimer =
            PortReclaimer::with_locator(Box::new(Stubborn)).with_settle(Duration::from_millis(10));
        assert_eq!(
            reclaimer.reclaim(port),
            ReclaimOutcome::StillOccupied { terminated: vec![] }
        );
        drop(listener);
    }

    #[test]
    fn occupancy_reports_owner() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let reclaimer = PortReclaimer::with_locator(Box::new(FakeOwner {
            pid: 77,
            listener: Mutex::new(Some(listener)),
        }));
        assert_eq!(
            reclaimer.occupancy(port),
            PortOccupancy {
                port,
                pid: Some(77)
            }
        );
    }

    #[test]
    fn parses_lsof_output() {
        assert_eq!(parse_lsof("123\n456\n123\n"), vec![123, 456]);
        assert!(parse_lsof("").is_empty());
        assert_eq!(parse_lsof("lsof: warning\n99\n"), vec![99]);
    }

    #[test]
    fn parses_netstat_listeners_only() {
        let table = "\
Active Connections

  Proto  Local Address          Foreign Address        State           PID
  TCP    0.0.0.0:8000           0.0.0.0:0              LISTENING       4120
  TCP    [::]:8000              [::]:0                 LISTENING       4120
  TCP    127.0.0.1:8000         127.0.0.1:51234        ESTABLISHED     4120
  TCP    127.0.0.1:51234        127.0.0.1:8000         ESTABLISHED     9001
  TCP    0.0.0.0:18000          0.0.0.0:0              LISTENING       5555
  TCP    0.0.0.0:8000           0.0.0.0:0              LISTENING       6000
";
        assert_eq!(parse_netstat(table, 8000), vec![4120, 6000]);
        assert!(parse_netstat(table, 9999).is_empty());
    }
}
