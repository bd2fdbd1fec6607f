use blocktest::sim::SimCluster;
use blocktest::suite::{ReadyCheck, RunSettings, Suite};
use shared::Host;
use std::future::Future;
use std::time::Duration;

pub const VOLUME: &str = "blocktest_vol";

#[allow(unused)]
pub fn host(name: &str) -> Host {
    name.parse().unwrap()
}

#[allow(unused)]
pub fn servers(count: usize) -> Vec<Host> {
    (1..=count).map(|i| host(&format!("server{i}"))).collect()
}

/// Settings for running `suites` on `count` servers with a fixed seed, issuing commands on the
/// first server
#[allow(unused)]
pub fn settings(count: usize, suites: &[Suite]) -> RunSettings {
    let servers = servers(count);

    RunSettings {
        mnode: servers[0].clone(),
        replica: Some(count as u32),
        servers,
        volume: VOLUME.to_string(),
        brick_root: "/bricks".to_string(),
        ready_check: ReadyCheck::FixedDelay(Duration::ZERO),
        seed: Some(1234),
        suites: suites.to_vec(),
        scenarios: vec![],
    }
}

#[allow(unused)]
pub fn sim(settings: &RunSettings) -> SimCluster {
    SimCluster::new(settings.mnode.clone(), &settings.servers)
}

/// Runs the test future on a current thread runtime, like the binary does.
#[allow(unused)]
pub fn run_test<F: Future>(test_future: F) -> F::Output {
    let _ = env_logger::builder()
        .is_test(true)
        .format_timestamp(None)
        .try_init();

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(test_future)
}
