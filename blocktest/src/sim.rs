//! In-memory stand-in for a gluster cluster with `gluster-block` installed.
//!
//! [SimCluster] implements [Executor] by interpreting the commands the suite issues
//! (`gluster`, `gluster-block`, `systemctl` and a handful of shell tools) against a shared model
//! of hosts, volumes and blocks. It lets the whole suite run without real servers, both in the
//! test suite and through `--simulate`.
//!
//! Failure knobs ([SimCluster::disconnect_peer()], [SimCluster::fail_service_restart()], ...)
//! reproduce broken environments. [SimCluster::inject()] makes the tools themselves misbehave
//! (see [Fault]), so checks can be shown to catch wrong results.

mod block;
mod gluster;

use crate::cluster::{CmdOutput, Executor, RemoteCommand};
use anyhow::{Result, bail};
use shared::{Gbid, Host};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Services every simulated host runs
const SERVICES: [&str; 4] = [
    "glusterd",
    "gluster-blockd",
    "gluster-block-target",
    "tcmu-runner",
];

/// Exit code of `gluster-block` on any failure
const CLI_FAILURE: i32 = 255;

#[derive(Debug)]
struct SimHost {
    uuid: Uuid,
    /// Peer state as seen by glusterd on the management node
    connected: bool,
    /// ssh to the host fails
    unreachable: bool,
    services: BTreeMap<String, ServiceState>,
    restart_fails: bool,
    /// Number of `is-active` queries answered with "activating" after a restart
    activation_polls: u32,
    dirs: BTreeSet<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ServiceState {
    Active,
    Inactive,
    Activating(u32),
}

impl SimHost {
    fn new() -> Self {
        Self {
            uuid: Uuid::new_v4(),
            connected: true,
            unreachable: false,
            services: SERVICES
                .iter()
                .map(|s| (s.to_string(), ServiceState::Active))
                .collect(),
            restart_fails: false,
            activation_polls: 0,
            dirs: BTreeSet::new(),
        }
    }

    fn is_active(&self, unit: &str) -> bool {
        self.services.get(unit) == Some(&ServiceState::Active)
    }
}

/// A backing file in a volumes block store. Multiple GBIDs may refer to it as hard links.
#[derive(Debug)]
struct BackingFile {
    size: u64,
    /// Includes the link gluster keeps below `.glusterfs` on every brick
    links: u64,
}

#[derive(Debug)]
struct SimBlock {
    gbid: Gbid,
    size: u64,
    ha: u32,
    servers: Vec<Host>,
    password: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum VolumeStatus {
    Created,
    Started,
    Stopped,
}

#[derive(Debug)]
struct SimVolume {
    id: Uuid,
    replica: Option<u32>,
    bricks: Vec<(Host, String)>,
    status: VolumeStatus,
    options: BTreeMap<String, String>,
    files: Vec<BackingFile>,
    /// Block store directory entries, pointing into `files`
    store: BTreeMap<Gbid, usize>,
    blocks: BTreeMap<String, SimBlock>,
}

impl SimVolume {
    fn store_entry(&self, gbid: &str) -> Option<&BackingFile> {
        self.store.get(&Gbid::from(gbid)).map(|i| &self.files[*i])
    }
}

/// A way the simulated tools misbehave while still reporting success (unless noted otherwise)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Fault {
    /// `gluster-block delete ... unlink-storage no` removes the backing file anyway
    UnlinkIgnored,
    /// `gluster-block modify ... auth disable` keeps the password
    AuthDisableIgnored,
    /// `gluster-block create ... storage <gbid>` doesn't add a hard link to the backing file
    ReuseWithoutLink,
    /// `gluster-block delete` fails
    BlockDeleteFails,
    /// `gluster volume delete` fails
    VolumeDeleteFails,
}

#[derive(Debug)]
struct SimState {
    hosts: BTreeMap<Host, SimHost>,
    volumes: BTreeMap<String, SimVolume>,
    faults: BTreeSet<Fault>,
    history: Vec<(Host, RemoteCommand)>,
}

fn output(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> CmdOutput {
    CmdOutput {
        exit_code,
        stdout: stdout.into(),
        stderr: stderr.into(),
    }
}

fn ok(stdout: impl Into<String>) -> CmdOutput {
    output(0, stdout, "")
}

fn fail(exit_code: i32, stderr: impl Into<String>) -> CmdOutput {
    output(exit_code, "", format!("{}\n", stderr.into()))
}

impl SimState {
    fn has_fault(&self, fault: Fault) -> bool {
        self.faults.contains(&fault)
    }

    fn execute(&mut self, host: &Host, cmd: &RemoteCommand) -> Result<CmdOutput> {
        let Some(h) = self.hosts.get(host) else {
            bail!("ssh: Could not resolve hostname {host}: Name or service not known");
        };

        if h.unreachable {
            bail!("ssh: connect to host {host} port 22: No route to host");
        }

        self.history.push((host.clone(), cmd.clone()));

        let args: Vec<&str> = cmd.get_args().iter().map(String::as_str).collect();

        Ok(match cmd.program() {
            "gluster" => self.gluster(host, &args),
            "gluster-block" => self.gluster_block(host, &args),
            "systemctl" => self.systemctl(host, &args),
            "stat" => self.stat(host, &args),
            "test" => self.test(host, &args),
            "mkdir" => self.mkdir(host, &args),
            "rm" => self.rm(host, &args),
            program => fail(127, format!("sh: {program}: command not found")),
        })
    }

    fn host_mut(&mut self, host: &Host) -> &mut SimHost {
        self.hosts
            .get_mut(host)
            .expect("Commands are only dispatched for known hosts")
    }

    fn systemctl(&mut self, host: &Host, args: &[&str]) -> CmdOutput {
        let [action, unit] = args else {
            return fail(1, "Too few arguments.");
        };
        let unit = unit.trim_end_matches(".service");
        let h = self.host_mut(host);

        let Some(state) = h.services.get(unit).copied() else {
            return match *action {
                "is-active" => output(4, "inactive\n", ""),
                _ => fail(5, format!("Failed to {action} {unit}.service: Unit {unit}.service not found.")),
            };
        };

        match *action {
            "restart" | "start" if h.restart_fails => {
                h.services.insert(unit.to_string(), ServiceState::Inactive);
                fail(
                    1,
                    format!(
                        "Job for {unit}.service failed because the control process exited with error code."
                    ),
                )
            }
            "restart" | "start" => {
                let state = match h.activation_polls {
                    0 => ServiceState::Active,
                    n => ServiceState::Activating(n),
                };
                h.services.insert(unit.to_string(), state);
                ok("")
            }
            "stop" => {
                h.services.insert(unit.to_string(), ServiceState::Inactive);
                ok("")
            }
            "is-active" => match state {
                ServiceState::Active => ok("active\n"),
                ServiceState::Inactive => output(3, "inactive\n", ""),
                ServiceState::Activating(n) => {
                    let next = match n {
                        1 => ServiceState::Active,
                        n => ServiceState::Activating(n - 1),
                    };
                    h.services.insert(unit.to_string(), next);
                    output(3, "activating\n", "")
                }
            },
            _ => fail(1, format!("Unknown command verb {action}.")),
        }
    }

    /// Resolves a block store path on `host` to the volume and GBID it names.
    fn resolve_store_path(&self, host: &Host, path: &str) -> Option<(&SimVolume, String)> {
        self.volumes.values().find_map(|vol| {
            vol.bricks
                .iter()
                .filter(|(h, _)| h == host)
                .find_map(|(_, brick)| {
                    let rest = path.strip_prefix(brick.as_str())?;
                    let file = rest.strip_prefix("/block-store/")?;
                    (!file.is_empty() && !file.contains('/')).then(|| (vol, file.to_string()))
                })
        })
    }

    fn stat(&self, host: &Host, args: &[&str]) -> CmdOutput {
        let ["-c", "%h", path] = args else {
            return fail(1, "stat: unsupported arguments");
        };

        match self.resolve_store_path(host, path) {
            Some((vol, gbid)) => match vol.store_entry(&gbid) {
                Some(file) => ok(format!("{}\n", file.links)),
                None => fail(
                    1,
                    format!("stat: cannot stat '{path}': No such file or directory"),
                ),
            },
            None if self.hosts[host].dirs.contains(*path) => ok("2\n"),
            None => fail(
                1,
                format!("stat: cannot stat '{path}': No such file or directory"),
            ),
        }
    }

    fn test(&self, host: &Host, args: &[&str]) -> CmdOutput {
        let ["-e", path] = args else {
            return output(2, "", "test: unsupported arguments\n");
        };

        let exists = match self.resolve_store_path(host, path) {
            Some((vol, gbid)) => vol.store_entry(&gbid).is_some(),
            None => self.hosts[host].dirs.contains(*path),
        };

        output(if exists { 0 } else { 1 }, "", "")
    }

    fn mkdir(&mut self, host: &Host, args: &[&str]) -> CmdOutput {
        let ["-p", path] = args else {
            return fail(1, "mkdir: unsupported arguments");
        };

        let dirs = &mut self.host_mut(host).dirs;
        let mut prefix = String::new();
        for component in path.split('/').filter(|c| !c.is_empty()) {
            prefix.push('/');
            prefix.push_str(component);
            dirs.insert(prefix.clone());
        }

        ok("")
    }

    fn rm(&mut self, host: &Host, args: &[&str]) -> CmdOutput {
        let ["-rf", path] = args else {
            return fail(1, "rm: unsupported arguments");
        };

        let path = path.trim_end_matches('/');
        let nested = format!("{path}/");
        self.host_mut(host)
            .dirs
            .retain(|d| d.as_str() != path && !d.starts_with(&nested));

        ok("")
    }
}

/// A simulated cluster. Clones share the same state.
#[derive(Clone, Debug)]
pub struct SimCluster {
    state: Arc<Mutex<SimState>>,
}

impl SimCluster {
    /// Creates a healthy cluster of `servers` (plus `mnode`, if not among them), all peers
    /// connected and all services running.
    pub fn new(mnode: Host, servers: &[Host]) -> Self {
        let hosts = std::iter::once(&mnode)
            .chain(servers)
            .map(|h| (h.clone(), SimHost::new()))
            .collect();

        Self {
            state: Arc::new(Mutex::new(SimState {
                hosts,
                volumes: BTreeMap::new(),
                faults: BTreeSet::new(),
                history: vec![],
            })),
        }
    }

    async fn with_host(&self, host: &Host, f: impl FnOnce(&mut SimHost)) {
        if let Some(h) = self.state.lock().await.hosts.get_mut(host) {
            f(h);
        } else {
            log::warn!("Simulated cluster has no host {host}");
        }
    }

    /// Marks the peer as disconnected in the trusted pool.
    pub async fn disconnect_peer(&self, host: &Host) {
        self.with_host(host, |h| h.connected = false).await;
    }

    /// Makes every command on `host` fail to run, like an ssh connection failure.
    pub async fn set_unreachable(&self, host: &Host, unreachable: bool) {
        self.with_host(host, |h| h.unreachable = unreachable).await;
    }

    /// Makes `systemctl restart` fail on `host`, leaving the service inactive.
    pub async fn fail_service_restart(&self, host: &Host) {
        self.with_host(host, |h| h.restart_fails = true).await;
    }

    /// After a restart, services on `host` report "activating" for `polls` queries.
    pub async fn set_activation_polls(&self, host: &Host, polls: u32) {
        self.with_host(host, |h| h.activation_polls = polls).await;
    }

    pub async fn stop_service(&self, host: &Host, unit: &str) {
        self.with_host(host, |h| {
            h.services.insert(unit.to_string(), ServiceState::Inactive);
        })
        .await;
    }

    /// Enables a [Fault] for all following commands.
    pub async fn inject(&self, fault: Fault) {
        self.state.lock().await.faults.insert(fault);
    }

    /// All commands run so far, in order.
    pub async fn history(&self) -> Vec<(Host, RemoteCommand)> {
        self.state.lock().await.history.clone()
    }

    /// Commands of `program` run so far, rendered as shell command lines.
    pub async fn commands_of(&self, program: &str) -> Vec<String> {
        self.state
            .lock()
            .await
            .history
            .iter()
            .filter(|(_, c)| c.program() == program)
            .map(|(_, c)| c.to_shell())
            .collect()
    }

    pub async fn volume_exists(&self, volume: &str) -> bool {
        self.state.lock().await.volumes.contains_key(volume)
    }

    pub async fn volume_option(&self, volume: &str, key: &str) -> Option<String> {
        self.state
            .lock()
            .await
            .volumes
            .get(volume)?
            .options
            .get(key)
            .cloned()
    }

    /// Names of the blocks currently existing in the volume
    pub async fn block_names(&self, volume: &str) -> Vec<String> {
        self.state
            .lock()
            .await
            .volumes
            .get(volume)
            .map(|v| v.blocks.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Hard link count of a block store entry, `None` if there is no such entry
    pub async fn link_count(&self, volume: &str, gbid: &Gbid) -> Option<u64> {
        let state = self.state.lock().await;
        state.volumes.get(volume)?.store_entry(gbid.as_str()).map(|f| f.links)
    }

    /// Size in bytes of the backing file behind a block store entry
    pub async fn file_size(&self, volume: &str, gbid: &Gbid) -> Option<u64> {
        let state = self.state.lock().await;
        state.volumes.get(volume)?.store_entry(gbid.as_str()).map(|f| f.size)
    }
}

impl Executor for SimCluster {
    async fn run(&self, host: &Host, cmd: &RemoteCommand) -> Result<CmdOutput> {
        log::trace!("[sim {host}] {cmd}");
        self.state.lock().await.execute(host, cmd)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn host(s: &str) -> Host {
        s.parse().unwrap()
    }

    async fn run(sim: &SimCluster, h: &str, program: &str, args: &[&str]) -> CmdOutput {
        sim.run(&host(h), &RemoteCommand::new(program).args(args.iter().copied()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn service_lifecycle() {
        let sim = SimCluster::new(host("s1"), &[host("s2")]);

        let out = run(&sim, "s2", "systemctl", &["is-active", "gluster-blockd"]).await;
        assert_eq!(out.stdout, "active\n");

        sim.set_activation_polls(&host("s2"), 2).await;
        assert!(run(&sim, "s2", "systemctl", &["restart", "gluster-blockd"]).await.success());
        for expected in ["activating\n", "activating\n", "active\n"] {
            let out = run(&sim, "s2", "systemctl", &["is-active", "gluster-blockd"]).await;
            assert_eq!(out.stdout, expected);
        }

        sim.fail_service_restart(&host("s2")).await;
        let out = run(&sim, "s2", "systemctl", &["restart", "gluster-blockd"]).await;
        assert_eq!(out.exit_code, 1);
        let out = run(&sim, "s2", "systemctl", &["is-active", "gluster-blockd"]).await;
        assert_eq!(out.stdout, "inactive\n");

        let out = run(&sim, "s2", "systemctl", &["restart", "nonexistent"]).await;
        assert_eq!(out.exit_code, 5);
    }

    #[tokio::test]
    async fn shell_tools() {
        let sim = SimCluster::new(host("s1"), &[]);

        assert!(run(&sim, "s1", "mkdir", &["-p", "/bricks/vol_brick0"]).await.success());
        assert!(run(&sim, "s1", "test", &["-e", "/bricks"]).await.success());
        assert!(run(&sim, "s1", "test", &["-e", "/bricks/vol_brick0"]).await.success());

        assert!(run(&sim, "s1", "rm", &["-rf", "/bricks/vol_brick0"]).await.success());
        assert!(!run(&sim, "s1", "test", &["-e", "/bricks/vol_brick0"]).await.success());
        assert!(run(&sim, "s1", "test", &["-e", "/bricks"]).await.success());

        let out = run(&sim, "s1", "stat", &["-c", "%h", "/nothing"]).await;
        assert!(out.stderr.contains("No such file or directory"));

        let out = run(&sim, "s1", "lsblk", &[]).await;
        assert_eq!(out.exit_code, 127);
    }

    #[tokio::test]
    async fn unknown_and_unreachable_hosts() {
        let sim = SimCluster::new(host("s1"), &[host("s2")]);

        assert!(
            sim.run(&host("s9"), &RemoteCommand::new("true"))
                .await
                .is_err()
        );

        sim.set_unreachable(&host("s2"), true).await;
        assert!(
            sim.run(&host("s2"), &RemoteCommand::new("true"))
                .await
                .is_err()
        );
        assert!(sim.history().await.is_empty());
    }
}
