use super::{Scenario, Suite};
use crate::block::BlockClient;
use crate::cluster::{ClusterDriver, Executor, VolumeSpec};
use crate::error::SetupError;
use anyhow::{Result, bail};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use shared::Host;
use std::time::Duration;
use tokio::time::Instant;

/// How to determine that the restarted block daemon accepts requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadyCheck {
    /// Just wait
    FixedDelay(Duration),
    /// Query `systemctl is-active` on every server until all report active
    Poll { timeout: Duration, interval: Duration },
}

impl Default for ReadyCheck {
    fn default() -> Self {
        Self::FixedDelay(Duration::from_secs(4))
    }
}

impl ReadyCheck {
    pub(super) async fn wait<E: Executor>(
        &self,
        cluster: &ClusterDriver<E>,
        servers: &[Host],
        service: &str,
    ) -> Result<(), SetupError> {
        match *self {
            Self::FixedDelay(delay) => {
                log::debug!("Waiting {delay:?} for {service} to come up");
                tokio::time::sleep(delay).await;
            }
            Self::Poll { timeout, interval } => {
                let start = Instant::now();

                for server in servers {
                    while !cluster.is_service_active(server, service).await? {
                        if start.elapsed() >= timeout {
                            return Err(SetupError::NotReady {
                                host: server.clone(),
                                service: service.to_string(),
                                timeout,
                            });
                        }

                        tokio::time::sleep(interval).await;
                    }
                    log::debug!("{service} is active on {server}");
                }
            }
        }

        Ok(())
    }
}

/// Everything a suite run needs to know, independent of the executor.
#[derive(Clone, Debug)]
pub struct RunSettings {
    /// Host on which `gluster` and `gluster-block` commands are issued
    pub mnode: Host,
    /// The servers hosting the volume and exporting blocks
    pub servers: Vec<Host>,
    pub volume: String,
    pub replica: Option<u32>,
    pub brick_root: String,
    pub ready_check: ReadyCheck,
    /// Seed for sampling servers. Random if not set.
    pub seed: Option<u64>,
    pub suites: Vec<Suite>,
    /// Only run these scenarios. Runs all scenarios of the selected suites if empty.
    pub scenarios: Vec<Scenario>,
}

impl RunSettings {
    pub fn selects(&self, scenario: Scenario) -> bool {
        self.suites.contains(&scenario.suite())
            && (self.scenarios.is_empty() || self.scenarios.contains(&scenario))
    }

    pub fn volume_spec(&self) -> VolumeSpec {
        VolumeSpec {
            name: self.volume.clone(),
            servers: self.servers.clone(),
            replica: self.replica,
            brick_root: self.brick_root.clone(),
        }
    }
}

/// The state a scenario works with. Passed explicitly to every scenario of a suite.
#[derive(Debug)]
pub struct SuiteContext<E> {
    pub cluster: ClusterDriver<E>,
    pub blocks: BlockClient<E>,
    pub volume: VolumeSpec,
    pub servers: Vec<Host>,
    pub ready_check: ReadyCheck,
    pub rng: StdRng,
}

impl<E: Executor + Clone> SuiteContext<E> {
    pub fn new(executor: E, settings: &RunSettings, suite: Suite) -> Self {
        let seed = settings.seed.unwrap_or_else(rand::random);
        log::info!("Sampling servers for suite {suite} with seed {seed}");

        Self {
            cluster: ClusterDriver::new(executor.clone(), settings.mnode.clone()),
            blocks: BlockClient::new(executor, settings.mnode.clone()),
            volume: settings.volume_spec(),
            servers: settings.servers.clone(),
            ready_check: settings.ready_check,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl<E> SuiteContext<E> {
    /// Picks `count` distinct servers at random.
    pub fn sample_servers(&mut self, count: usize) -> Result<Vec<Host>> {
        if count > self.servers.len() {
            bail!(
                "Cannot sample {count} servers out of {}",
                self.servers.len()
            );
        }

        Ok(self
            .servers
            .choose_multiple(&mut self.rng, count)
            .cloned()
            .collect())
    }

    pub fn volume_name(&self) -> &str {
        &self.volume.name
    }
}
