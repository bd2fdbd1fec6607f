//! Lifecycle verification of gluster-block
//!
//! Drives a gluster cluster through the `gluster` and `gluster-block` command line tools: provisions
//! a volume prepared for block hosting, runs the create, modify and delete scenarios against it
//! and tears everything down again. Commands are executed remotely through an [Executor], which is
//! either [cluster::SshExecutor] for real servers or the in-memory [sim::SimCluster].

pub mod block;
pub mod cluster;
pub mod config;
pub mod error;
pub mod sim;
pub mod suite;

use crate::cluster::{Executor, SshExecutor};
use crate::config::Config;
use crate::sim::SimCluster;
use crate::suite::{ReadyCheck, RunReport};
use std::time::Duration;

/// Runs the configured suites against the configured cluster.
pub async fn run(config: &Config) -> RunReport {
    if config.simulate {
        log::warn!("Running against a simulated cluster, no real servers are touched");

        let mut settings = config.run.clone();
        // simulated services are up as soon as they are started
        if let ReadyCheck::FixedDelay(_) = settings.ready_check {
            settings.ready_check = ReadyCheck::FixedDelay(Duration::ZERO);
        }

        let sim = SimCluster::new(settings.mnode.clone(), &settings.servers);
        run_with(sim, &settings).await
    } else {
        run_with(SshExecutor::new(config.ssh.clone()), &config.run).await
    }
}

async fn run_with<E: Executor + Clone>(executor: E, settings: &suite::RunSettings) -> RunReport {
    log::info!(
        "Running suites [{}] on {} servers, issuing commands on {}",
        itertools::join(&settings.suites, ", "),
        settings.servers.len(),
        settings.mnode
    );

    suite::run(executor, settings).await
}
