//! Gluster administration on top of an [Executor]: peers, volumes, bricks, services and direct
//! inspection of the bricks file systems.

use super::{CmdOutput, Executor, RemoteCommand};
use anyhow::{Context, Result, anyhow, bail};
use regex::Regex;
use shared::Host;
use std::fmt::Display;
use std::sync::LazyLock;

/// Directory on each brick holding the backing files of all blocks, named by GBID
pub const BLOCK_STORE_DIR: &str = "block-store";

static BRICK_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Brick\d+:\s*(\S+)").expect("Regex must be valid"));
static FIELD_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z ]+):\s*(.*)$").expect("Regex must be valid"));

/// A server local directory contributing storage to a volume.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Brick {
    pub host: Host,
    pub path: String,
}

impl Brick {
    /// Parses the `host:/path` notation used by the gluster CLI.
    pub fn parse(s: &str) -> Result<Self> {
        let (host, path) = s
            .split_once(':')
            .ok_or_else(|| anyhow!("Brick {s:?} is not in the form host:/path"))?;

        if !path.starts_with('/') {
            bail!("Brick path of {s:?} is not absolute");
        }

        Ok(Self {
            host: host.parse()?,
            path: path.to_string(),
        })
    }

    /// Path of a file in this bricks block store
    pub fn block_store_path(&self, file: impl Display) -> String {
        format!("{}/{BLOCK_STORE_DIR}/{file}", self.path)
    }
}

impl Display for Brick {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.path)
    }
}

/// Describes a volume to be provisioned by [ClusterDriver::setup_volume()].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VolumeSpec {
    pub name: String,
    pub servers: Vec<Host>,
    /// Replica count. A plain distributed volume is created if not set.
    pub replica: Option<u32>,
    /// Directory on each server below which the brick directories are created
    pub brick_root: String,
}

impl VolumeSpec {
    /// One brick per server, in server order
    pub fn bricks(&self) -> Vec<Brick> {
        self.servers
            .iter()
            .enumerate()
            .map(|(i, host)| Brick {
                host: host.clone(),
                path: format!(
                    "{}/{}_brick{i}",
                    self.brick_root.trim_end_matches('/'),
                    self.name
                ),
            })
            .collect()
    }
}

/// Parsed output of `gluster volume info <name>`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VolumeInfo {
    pub name: String,
    pub volume_type: String,
    pub status: String,
    pub bricks: Vec<Brick>,
}

impl VolumeInfo {
    pub fn is_started(&self) -> bool {
        self.status == "Started"
    }

    fn parse(output: &str) -> Result<Self> {
        let mut name = None;
        let mut volume_type = None;
        let mut status = None;
        let mut bricks = vec![];

        for line in output.lines().map(str::trim) {
            if let Some(c) = BRICK_LINE.captures(line) {
                bricks.push(Brick::parse(&c[1])?);
            } else if let Some(c) = FIELD_LINE.captures(line) {
                let value = c[2].trim().to_string();
                match &c[1] {
                    "Volume Name" => name = Some(value),
                    "Type" => volume_type = Some(value),
                    "Status" => status = Some(value),
                    _ => {}
                }
            }
        }

        Ok(Self {
            name: name.ok_or_else(|| anyhow!("Volume info is missing the volume name"))?,
            volume_type: volume_type.unwrap_or_default(),
            status: status.unwrap_or_default(),
            bricks,
        })
    }
}

/// A row of `gluster pool list`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolPeer {
    pub uuid: String,
    pub hostname: String,
    pub state: String,
}

fn parse_pool_list(output: &str) -> Vec<PoolPeer> {
    output
        .lines()
        .skip_while(|l| !l.trim_start().starts_with("UUID"))
        .skip(1)
        .filter_map(|l| {
            let mut cols = l.split_whitespace();
            Some(PoolPeer {
                uuid: cols.next()?.to_string(),
                hostname: cols.next()?.to_string(),
                state: cols.collect::<Vec<_>>().join(" "),
            })
        })
        .collect()
}

fn gluster() -> RemoteCommand {
    RemoteCommand::new("gluster").arg("--mode=script")
}

fn systemctl() -> RemoteCommand {
    RemoteCommand::new("systemctl")
}

/// Cluster administration through the gluster CLI and basic shell tools.
///
/// Volume and peer commands are issued on the management node `mnode`.
#[derive(Clone, Debug)]
pub struct ClusterDriver<E> {
    executor: E,
    mnode: Host,
}

impl<E: Executor> ClusterDriver<E> {
    pub fn new(executor: E, mnode: Host) -> Self {
        Self { executor, mnode }
    }

    /// Runs an arbitrary command on `host`.
    pub async fn run(&self, host: &Host, cmd: &RemoteCommand) -> Result<CmdOutput> {
        self.executor.run(host, cmd).await
    }

    async fn run_checked(&self, host: &Host, cmd: RemoteCommand) -> Result<CmdOutput> {
        let out = self.run(host, &cmd).await?;
        out.into_result(format_args!("[{host}] {cmd}"))
    }

    /// Checks that every server except the management node itself is a connected peer.
    pub async fn validate_peers_are_connected(&self, servers: &[Host]) -> Result<bool> {
        let out = self
            .run_checked(&self.mnode, gluster().args(["pool", "list"]))
            .await?;
        let peers = parse_pool_list(&out.stdout);

        let mut connected = true;
        for server in servers.iter().filter(|s| **s != self.mnode) {
            match peers.iter().find(|p| p.hostname == server.as_str()) {
                Some(p) if p.state == "Connected" => {}
                Some(p) => {
                    log::error!("Peer {server} is in state {:?}", p.state);
                    connected = false;
                }
                None => {
                    log::error!("Server {server} is not part of the trusted pool");
                    connected = false;
                }
            }
        }

        Ok(connected)
    }

    pub async fn volume_list(&self) -> Result<Vec<String>> {
        let out = self
            .run_checked(&self.mnode, gluster().args(["volume", "list"]))
            .await?;

        Ok(out
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && *l != "No volumes present in cluster")
            .map(String::from)
            .collect())
    }

    /// Fetches the volume info of `name`, or `None` if the volume doesn't exist.
    pub async fn volume_info(&self, name: &str) -> Result<Option<VolumeInfo>> {
        let cmd = gluster().args(["volume", "info", name]);
        let out = self.run(&self.mnode, &cmd).await?;

        if !out.success() {
            if out.stderr.contains("does not exist") || out.stdout.contains("does not exist") {
                return Ok(None);
            }

            bail!(
                "[{}] {cmd} failed with exit code {}: {}",
                self.mnode,
                out.exit_code,
                out.stderr.trim()
            );
        }

        VolumeInfo::parse(&out.stdout)
            .map(Some)
            .with_context(|| format!("Parsing volume info of {name} failed"))
    }

    /// Provisions the volume, reusing (and starting) it if it already exists.
    pub async fn setup_volume(&self, spec: &VolumeSpec) -> Result<()> {
        if let Some(info) = self.volume_info(&spec.name).await? {
            log::info!("Volume {} already exists, reusing it", spec.name);

            if !info.is_started() {
                self.run_checked(&self.mnode, gluster().args(["volume", "start", &spec.name]))
                    .await?;
            }

            return Ok(());
        }

        let bricks = spec.bricks();
        for brick in &bricks {
            self.run_checked(
                &brick.host,
                RemoteCommand::new("mkdir").args(["-p", &brick.path]),
            )
            .await?;
        }

        let mut create = gluster().args(["volume", "create", &spec.name]);
        if let Some(replica) = spec.replica {
            create = create.arg("replica").arg(replica.to_string());
        }
        create = create
            .args(bricks.iter().map(ToString::to_string))
            .arg("force");

        self.run_checked(&self.mnode, create).await?;
        self.run_checked(&self.mnode, gluster().args(["volume", "start", &spec.name]))
            .await?;

        log::info!("Volume {} has been set up on {} bricks", spec.name, bricks.len());

        Ok(())
    }

    /// Stops and deletes the volume and removes its brick directories. A missing volume is not an
    /// error.
    pub async fn cleanup_volume(&self, name: &str) -> Result<()> {
        let Some(info) = self.volume_info(name).await? else {
            log::info!("Volume {name} does not exist, nothing to clean up");
            return Ok(());
        };

        if info.is_started() {
            self.run_checked(
                &self.mnode,
                gluster().args(["volume", "stop", name, "force"]),
            )
            .await?;
        }

        self.run_checked(&self.mnode, gluster().args(["volume", "delete", name]))
            .await?;

        for brick in &info.bricks {
            self.run_checked(
                &brick.host,
                RemoteCommand::new("rm").args(["-rf", &brick.path]),
            )
            .await?;
        }

        log::info!("Volume {name} deleted");

        Ok(())
    }

    /// All bricks of the volume in volume order.
    pub async fn get_all_bricks(&self, volume: &str) -> Result<Vec<Brick>> {
        let info = self
            .volume_info(volume)
            .await?
            .ok_or_else(|| anyhow!("Volume {volume} does not exist"))?;

        Ok(info.bricks)
    }

    /// Applies an option group (like `gluster-block`) to the volume.
    pub async fn set_volume_group(&self, volume: &str, group: &str) -> Result<()> {
        self.run_checked(
            &self.mnode,
            gluster().args(["volume", "set", volume, "group", group]),
        )
        .await?;

        Ok(())
    }

    pub async fn restart_service(&self, host: &Host, unit: &str) -> Result<()> {
        self.run_checked(host, systemctl().args(["restart", unit]))
            .await?;

        Ok(())
    }

    pub async fn is_service_active(&self, host: &Host, unit: &str) -> Result<bool> {
        let out = self
            .run(host, &systemctl().args(["is-active", unit]))
            .await?;

        Ok(out.success() && out.stdout.trim() == "active")
    }

    /// Hard link count of a file in the bricks block store, `None` if the file doesn't exist.
    pub async fn hard_link_count(&self, brick: &Brick, file: impl Display) -> Result<Option<u64>> {
        let path = brick.block_store_path(file);

        let out = self
            .run(
                &brick.host,
                &RemoteCommand::new("stat").args(["-c", "%h", &path]),
            )
            .await?;

        if !out.success() {
            if out.stderr.contains("No such file") {
                return Ok(None);
            }

            bail!(
                "Reading link count of {path} on {} failed: {}",
                brick.host,
                out.stderr.trim()
            );
        }

        let count = out
            .stdout
            .trim()
            .parse()
            .with_context(|| format!("Unexpected stat output {:?}", out.stdout))?;

        Ok(Some(count))
    }

    /// Whether a file exists in the bricks block store.
    pub async fn block_store_contains(&self, brick: &Brick, file: impl Display) -> Result<bool> {
        let path = brick.block_store_path(file);
        let out = self
            .run(&brick.host, &RemoteCommand::new("test").args(["-e", &path]))
            .await?;

        Ok(out.success())
    }
}
