use super::reply::{self, BlockInfo, ListReply};
use super::{AuthMode, BlockOptions, CreateOutcome, DeleteOptions, Rejection};
use crate::cluster::{CmdOutput, Executor, RemoteCommand};
use anyhow::{Context, Result};
use itertools::Itertools;
use shared::parser::block_size;
use shared::{Gbid, Host};

fn gluster_block(subcommand: &str) -> RemoteCommand {
    RemoteCommand::new("gluster-block").arg(subcommand)
}

fn json(cmd: RemoteCommand) -> RemoteCommand {
    cmd.arg("--json-plain")
}

fn target(volume: &str, name: &str) -> String {
    format!("{volume}/{name}")
}

/// Runs `gluster-block` commands on the management node and interprets their results.
#[derive(Clone, Debug)]
pub struct BlockClient<E> {
    executor: E,
    mnode: Host,
}

impl<E: Executor> BlockClient<E> {
    pub fn new(executor: E, mnode: Host) -> Self {
        Self { executor, mnode }
    }

    async fn run(&self, cmd: RemoteCommand) -> Result<CmdOutput> {
        self.executor
            .run(&self.mnode, &cmd)
            .await
            .with_context(|| format!("Running {cmd} on {} failed", self.mnode))
    }

    /// Creates a block exported by `servers`.
    ///
    /// An empty `size` is only accepted when existing storage is reused. If an HA count is
    /// requested, exactly that many servers must be given. Both conditions are checked before
    /// the CLI is invoked. All refusals (local or by `gluster-block`) are returned as
    /// [CreateOutcome::Rejected], `Err` means the command could not be run.
    pub async fn setup_block(
        &self,
        volume: &str,
        name: &str,
        servers: &[Host],
        size: &str,
        options: &BlockOptions,
    ) -> Result<CreateOutcome> {
        let size = size.trim();

        if size.is_empty() && options.storage.is_none() {
            log::warn!("Refusing to create {volume}/{name} without a size");
            return Ok(CreateOutcome::Rejected(Rejection::EmptySize));
        }

        if let Some(ha) = options.ha {
            if !ha.matches(servers.len()) {
                log::warn!(
                    "Refusing to create {volume}/{name}: HA {ha} with {} servers",
                    servers.len()
                );
                return Ok(CreateOutcome::Rejected(Rejection::HaMismatch {
                    ha,
                    servers: servers.len(),
                }));
            }
        }

        let mut cmd = gluster_block("create").arg(target(volume, name));
        if let Some(ha) = options.ha {
            cmd = cmd.arg("ha").arg(ha.to_string());
        }
        if let Some(ref auth) = options.auth {
            cmd = cmd.arg("auth").arg(auth.as_str());
        }
        if let Some(prealloc) = options.prealloc {
            cmd = cmd.arg("prealloc").arg(prealloc.as_str());
        }
        if let Some(ref gbid) = options.storage {
            cmd = cmd.arg("storage").arg(gbid.as_str());
        }
        if let Some(rb) = options.ring_buffer {
            cmd = cmd.arg("ring-buffer").arg(rb.to_string());
        }
        cmd = cmd.arg(servers.iter().join(","));
        if !size.is_empty() {
            cmd = cmd.arg(size);
        }

        let out = self.run(json(cmd)).await?;

        match reply::check(&out) {
            Ok(()) => {
                log::info!("Created block {volume}/{name} on {}", servers.iter().join(","));
                Ok(CreateOutcome::Created)
            }
            Err(failure) => {
                log::warn!("Creating block {volume}/{name} was rejected: {failure}");
                Ok(CreateOutcome::Rejected(failure.into()))
            }
        }
    }

    /// Names of all blocks in the volume, `None` if there are none.
    pub async fn get_block_list(&self, volume: &str) -> Result<Option<Vec<String>>> {
        let out = self.run(json(gluster_block("list").arg(volume))).await?;
        let list: ListReply =
            reply::parse(&out).with_context(|| format!("Listing blocks of {volume} failed"))?;

        Ok((!list.blocks.is_empty()).then_some(list.blocks))
    }

    pub async fn if_block_exists(&self, volume: &str, name: &str) -> Result<bool> {
        Ok(self
            .get_block_list(volume)
            .await?
            .is_some_and(|blocks| blocks.iter().any(|b| b == name)))
    }

    pub async fn get_block_info(&self, volume: &str, name: &str) -> Result<BlockInfo> {
        let out = self
            .run(json(gluster_block("info").arg(target(volume, name))))
            .await?;

        reply::parse(&out).with_context(|| format!("Fetching info of block {volume}/{name} failed"))
    }

    pub async fn get_block_gbid(&self, volume: &str, name: &str) -> Result<Gbid> {
        Ok(self.get_block_info(volume, name).await?.gbid)
    }

    /// Checks that server set, size and HA count of the block are exactly as expected.
    ///
    /// `expected_size` may be given in the reported form (`"1.0 GiB"`) or in any notation
    /// accepted on create (`"1GiB"`, `"1073741824"`). Every mismatch is logged.
    pub async fn validate_block_info(
        &self,
        volume: &str,
        name: &str,
        servers: &[Host],
        expected_size: &str,
        ha: u32,
    ) -> Result<bool> {
        let info = self.get_block_info(volume, name).await?;

        let expected_size =
            block_size::normalize(expected_size).unwrap_or_else(|_| expected_size.to_string());

        let mut valid = true;

        if info.size != expected_size {
            log::error!(
                "Block {volume}/{name} has size {:?}, expected {expected_size:?}",
                info.size
            );
            valid = false;
        }

        if info.ha.get() != ha {
            log::error!("Block {volume}/{name} has HA {}, expected {ha}", info.ha);
            valid = false;
        }

        let exported: Vec<_> = info.exported_on.iter().sorted().collect();
        let expected: Vec<_> = servers.iter().sorted().collect();
        if exported != expected {
            log::error!(
                "Block {volume}/{name} is exported on [{}], expected [{}]",
                exported.iter().join(","),
                expected.iter().join(",")
            );
            valid = false;
        }

        Ok(valid)
    }

    /// Enables or disables authentication, which regenerates or clears the password.
    pub async fn block_modify(&self, volume: &str, name: &str, auth: &AuthMode) -> Result<CmdOutput> {
        self.run(json(
            gluster_block("modify")
                .arg(target(volume, name))
                .args(["auth", auth.as_str()]),
        ))
        .await
    }

    pub async fn block_delete(
        &self,
        volume: &str,
        name: &str,
        options: &DeleteOptions,
    ) -> Result<CmdOutput> {
        let mut cmd = gluster_block("delete").arg(target(volume, name));
        if let Some(unlink) = options.unlink_storage {
            cmd = cmd.args(["unlink-storage", unlink.as_str()]);
        }
        if options.force {
            cmd = cmd.arg("force");
        }

        let out = self.run(json(cmd)).await?;
        match reply::check(&out) {
            Ok(()) => log::info!("Deleted block {volume}/{name}"),
            Err(failure) => log::warn!("Deleting block {volume}/{name} failed: {failure}"),
        }

        Ok(out)
    }
}
