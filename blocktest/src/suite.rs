//! The test scenario runner.
//!
//! A suite provisions a volume, prepares it for `gluster-block`, runs its scenarios one after
//! another and removes the volume again:
//!
//! ```text
//! check peers -> setup volume -> apply block group options -> restart gluster-blockd
//!     -> wait until ready -> [scenario -> teardown blocks]... -> cleanup volume
//! ```
//!
//! Failures before the first scenario are fatal for the suite and reported as [SetupError].
//! A failing scenario is recorded in the [SuiteReport] and the next scenario runs.

mod context;
mod create;
mod delete;
mod modify;

pub use context::*;

use crate::block::{DeleteOptions, UnlinkStorage};
use crate::cluster::Executor;
use crate::error::SetupError;
use anyhow::{Context as _, Result};
use clap::ValueEnum;
use serde::Deserialize;
use shared::log_error_chain;
use std::fmt::Display;
use std::time::{Duration, Instant};

/// The service restarted on every server before scenarios run
pub const BLOCK_DAEMON: &str = "gluster-blockd";
/// The volume option group preparing a volume for hosting blocks
pub const BLOCK_GROUP: &str = "gluster-block";

/// Name of the block most scenarios work with
const BLOCK_NAME: &str = "block_testing_1";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Suite {
    Create,
    Modify,
    Delete,
}

impl Suite {
    pub const ALL: [Suite; 3] = [Suite::Create, Suite::Modify, Suite::Delete];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Modify => "modify",
            Self::Delete => "delete",
        }
    }

    /// The scenarios of this suite in execution order
    pub fn scenarios(self) -> impl Iterator<Item = Scenario> {
        Scenario::ALL.into_iter().filter(move |s| s.suite() == self)
    }
}

impl Display for Suite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single test case, run against a prepared volume.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Scenario {
    Ha1,
    Ha2,
    Ha3,
    AuthEnable,
    Size1024,
    Size1K,
    MissingSize,
    Ha3TwoHosts,
    Ha2OneHost,
    InvalidAuthValue,
    UnlinkStorageReuse,
    AuthToggle,
    DeleteLoop,
    UnlinkStorageNo,
}

impl Scenario {
    pub const ALL: [Scenario; 14] = [
        Scenario::Ha1,
        Scenario::Ha2,
        Scenario::Ha3,
        Scenario::AuthEnable,
        Scenario::Size1024,
        Scenario::Size1K,
        Scenario::MissingSize,
        Scenario::Ha3TwoHosts,
        Scenario::Ha2OneHost,
        Scenario::InvalidAuthValue,
        Scenario::UnlinkStorageReuse,
        Scenario::AuthToggle,
        Scenario::DeleteLoop,
        Scenario::UnlinkStorageNo,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Ha1 => "ha_1",
            Self::Ha2 => "ha_2",
            Self::Ha3 => "ha_3",
            Self::AuthEnable => "auth_enable",
            Self::Size1024 => "size_1024",
            Self::Size1K => "size_1k",
            Self::MissingSize => "missing_size",
            Self::Ha3TwoHosts => "ha3_two_hosts",
            Self::Ha2OneHost => "ha2_one_host",
            Self::InvalidAuthValue => "invalid_auth_value",
            Self::UnlinkStorageReuse => "unlink_storage_reuse",
            Self::AuthToggle => "auth_toggle",
            Self::DeleteLoop => "delete_loop",
            Self::UnlinkStorageNo => "unlink_storage_no",
        }
    }

    pub fn suite(self) -> Suite {
        match self {
            Self::AuthToggle => Suite::Modify,
            Self::DeleteLoop | Self::UnlinkStorageNo => Suite::Delete,
            _ => Suite::Create,
        }
    }

    /// The number of distinct servers the scenario samples at most
    pub fn servers_needed(self) -> usize {
        match self {
            Self::Ha1 | Self::Ha2OneHost => 1,
            Self::Ha2 | Self::Ha3TwoHosts | Self::InvalidAuthValue => 2,
            _ => 3,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.name() == name)
    }

    async fn run<E: Executor>(self, ctx: &mut SuiteContext<E>) -> Result<()> {
        match self {
            Self::Ha1 => create::ha(ctx, 1).await,
            Self::Ha2 => create::ha(ctx, 2).await,
            Self::Ha3 => create::ha(ctx, 3).await,
            Self::AuthEnable => create::auth_enable(ctx).await,
            Self::Size1024 => create::size(ctx, "1024").await,
            Self::Size1K => create::size(ctx, "1K").await,
            Self::MissingSize => create::missing_size(ctx).await,
            Self::Ha3TwoHosts => create::ha_mismatch(ctx, 3, 2).await,
            Self::Ha2OneHost => create::ha_mismatch(ctx, 2, 1).await,
            Self::InvalidAuthValue => create::invalid_auth_value(ctx).await,
            Self::UnlinkStorageReuse => create::unlink_storage_reuse(ctx).await,
            Self::AuthToggle => modify::auth_toggle(ctx).await,
            Self::DeleteLoop => delete::delete_loop(ctx).await,
            Self::UnlinkStorageNo => delete::unlink_storage_no(ctx).await,
        }
    }
}

impl Display for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.name())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScenarioResult {
    Passed,
    Failed(String),
}

#[derive(Clone, Debug)]
pub struct ScenarioReport {
    pub scenario: Scenario,
    pub result: ScenarioResult,
    pub duration: Duration,
}

impl ScenarioReport {
    pub fn passed(&self) -> bool {
        self.result == ScenarioResult::Passed
    }
}

/// Outcome of a suite that got past its setup.
#[derive(Clone, Debug)]
pub struct SuiteReport {
    pub suite: Suite,
    pub scenarios: Vec<ScenarioReport>,
    /// Set if the volume could not be removed after the scenarios ran
    pub cleanup_failure: Option<String>,
}

impl SuiteReport {
    pub fn is_success(&self) -> bool {
        self.cleanup_failure.is_none() && self.scenarios.iter().all(ScenarioReport::passed)
    }

    pub fn failed(&self) -> impl Iterator<Item = &ScenarioReport> {
        self.scenarios.iter().filter(|s| !s.passed())
    }
}

/// Outcome of all suites of a run, in execution order.
#[derive(Debug, Default)]
pub struct RunReport {
    pub suites: Vec<(Suite, Result<SuiteReport, SetupError>)>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.suites
            .iter()
            .all(|(_, r)| r.as_ref().is_ok_and(SuiteReport::is_success))
    }

    /// Human readable summary, one line per scenario.
    pub fn summary(&self) -> String {
        let mut lines = vec![];

        for (suite, result) in &self.suites {
            match result {
                Ok(report) => {
                    for s in &report.scenarios {
                        let result = match &s.result {
                            ScenarioResult::Passed => "PASSED".to_string(),
                            ScenarioResult::Failed(msg) => format!("FAILED: {msg}"),
                        };
                        lines.push(format!(
                            "{suite}::{} ... {result} ({:.1?})",
                            s.scenario, s.duration
                        ));
                    }
                    if let Some(ref msg) = report.cleanup_failure {
                        lines.push(format!("{suite} cleanup ... FAILED: {msg}"));
                    }
                }
                Err(err) => lines.push(shared::error_chain!(err, "{suite} ... ABORTED")),
            }
        }

        let scenarios: Vec<_> = self
            .suites
            .iter()
            .filter_map(|(_, r)| r.as_ref().ok())
            .flat_map(|r| &r.scenarios)
            .collect();
        let passed = scenarios.iter().filter(|s| s.passed()).count();
        let aborted = self.suites.iter().filter(|(_, r)| r.is_err()).count();

        lines.push(format!(
            "\n{passed} passed, {} failed, {aborted} suites aborted",
            scenarios.len() - passed
        ));

        lines.join("\n")
    }
}

/// Brings the volume into the state every scenario expects.
async fn setup<E: Executor>(ctx: &SuiteContext<E>, needed: usize) -> Result<(), SetupError> {
    if ctx.servers.len() < needed {
        return Err(SetupError::NotEnoughServers {
            needed,
            available: ctx.servers.len(),
        });
    }

    if !ctx.cluster.validate_peers_are_connected(&ctx.servers).await? {
        return Err(SetupError::PeersDisconnected);
    }

    let volume = &ctx.volume.name;

    ctx.cluster
        .setup_volume(&ctx.volume)
        .await
        .map_err(|err| SetupError::volume(volume, err))?;

    ctx.cluster
        .set_volume_group(volume, BLOCK_GROUP)
        .await
        .map_err(|source| SetupError::GroupOption {
            volume: volume.clone(),
            group: BLOCK_GROUP.to_string(),
            source,
        })?;

    for server in &ctx.servers {
        ctx.cluster
            .restart_service(server, BLOCK_DAEMON)
            .await
            .map_err(|source| SetupError::ServiceRestart {
                host: server.clone(),
                service: BLOCK_DAEMON.to_string(),
                source,
            })?;
        log::info!("{BLOCK_DAEMON} restarted on {server}");
    }

    ctx.ready_check
        .wait(&ctx.cluster, &ctx.servers, BLOCK_DAEMON)
        .await
}

/// Deletes all blocks left in the volume.
async fn teardown_blocks<E: Executor>(ctx: &SuiteContext<E>) -> Result<()> {
    let volume = &ctx.volume.name;
    let Some(blocks) = ctx.blocks.get_block_list(volume).await? else {
        return Ok(());
    };

    let mut failed = vec![];
    for block in blocks {
        let out = ctx
            .blocks
            .block_delete(volume, &block, &DeleteOptions::unlink(UnlinkStorage::Yes))
            .await?;
        if !out.success() {
            failed.push(block);
        }
    }

    if !failed.is_empty() {
        anyhow::bail!("Blocks {} could not be deleted", failed.join(", "));
    }

    Ok(())
}

async fn run_scenario<E: Executor>(ctx: &mut SuiteContext<E>, scenario: Scenario) -> ScenarioReport {
    log::info!("Running scenario {}::{scenario}", scenario.suite());
    let start = Instant::now();

    let body = scenario.run(ctx).await;
    let teardown = teardown_blocks(ctx)
        .await
        .context("Teardown failed");

    let result = match (body, teardown) {
        (Ok(()), Ok(())) => {
            log::info!("Scenario {scenario} passed");
            ScenarioResult::Passed
        }
        (Err(body), Err(teardown)) => {
            log::error!("Scenario {scenario} failed: {body:#}");
            ScenarioResult::Failed(format!("{body:#}; {teardown:#}"))
        }
        (Err(err), Ok(())) | (Ok(()), Err(err)) => {
            log::error!("Scenario {scenario} failed: {err:#}");
            ScenarioResult::Failed(format!("{err:#}"))
        }
    };

    ScenarioReport {
        scenario,
        result,
        duration: start.elapsed(),
    }
}

/// Runs the given scenarios of one suite on a freshly set up volume.
///
/// `scenarios` must all belong to `suite`. If setup fails, the volume is removed on a best
/// effort basis and the error is returned.
pub async fn run_suite<E: Executor>(
    ctx: &mut SuiteContext<E>,
    suite: Suite,
    scenarios: &[Scenario],
) -> Result<SuiteReport, SetupError> {
    log::info!("Setting up suite {suite} on volume {}", ctx.volume.name);

    let needed = scenarios
        .iter()
        .map(|s| s.servers_needed())
        .max()
        .unwrap_or_default();

    if let Err(err) = setup(ctx, needed).await {
        log_error_chain!(err, "Setting up suite {suite} failed");

        if !matches!(
            err,
            SetupError::PeersDisconnected | SetupError::NotEnoughServers { .. }
        ) {
            if let Err(cleanup_err) = ctx.cluster.cleanup_volume(&ctx.volume.name).await {
                log_error_chain!(cleanup_err, "Cleaning up after failed setup failed");
            }
        }

        return Err(err);
    }

    let mut report = SuiteReport {
        suite,
        scenarios: vec![],
        cleanup_failure: None,
    };

    for scenario in scenarios {
        report.scenarios.push(run_scenario(ctx, *scenario).await);
    }

    if let Err(err) = ctx.cluster.cleanup_volume(&ctx.volume.name).await {
        let err = SetupError::cleanup(&ctx.volume.name, err);
        let msg = shared::error_chain!(err, "Suite {suite}");
        log::error!("{msg}");
        report.cleanup_failure = Some(msg);
    }

    log::info!(
        "Suite {suite} finished, {} of {} scenarios passed",
        report.scenarios.iter().filter(|s| s.passed()).count(),
        report.scenarios.len()
    );

    Ok(report)
}

/// Runs the selected suites one after another. A suite whose setup fails doesn't keep the
/// following suites from running.
pub async fn run<E: Executor + Clone>(executor: E, settings: &RunSettings) -> RunReport {
    let mut report = RunReport::default();

    for suite in &settings.suites {
        let scenarios: Vec<_> = suite
            .scenarios()
            .filter(|s| settings.selects(*s))
            .collect();

        if scenarios.is_empty() {
            log::debug!("No scenarios of suite {suite} selected, skipping");
            continue;
        }

        let mut ctx = SuiteContext::new(executor.clone(), settings, *suite);
        let result = run_suite(&mut ctx, *suite, &scenarios).await;
        report.suites.push((*suite, result));
    }

    report
}
