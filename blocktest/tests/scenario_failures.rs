mod common;

use blocktest::sim::Fault;
use blocktest::suite::{Scenario, ScenarioReport, ScenarioResult, Suite, SuiteReport, run};
use common::*;

fn failure(report: &ScenarioReport) -> &str {
    match &report.result {
        ScenarioResult::Failed(msg) => msg,
        ScenarioResult::Passed => panic!("scenario {} passed unexpectedly", report.scenario),
    }
}

fn block_deletes(commands: Vec<String>) -> usize {
    commands
        .iter()
        .filter(|c| {
            c.starts_with("gluster-block delete blocktest_vol/block_testing_1 unlink-storage yes")
        })
        .count()
}

#[test]
fn reuse_without_new_link_fails() {
    run_test(async {
        let mut s = settings(3, &[Suite::Create]);
        s.scenarios = vec![Scenario::Ha1, Scenario::UnlinkStorageReuse];
        let sim = sim(&s);
        sim.inject(Fault::ReuseWithoutLink).await;

        let report = run(sim.clone(), &s).await;
        assert!(!report.is_success());

        let suite: &SuiteReport = report.suites[0].1.as_ref().unwrap();
        assert!(suite.scenarios[0].passed());
        assert!(failure(&suite.scenarios[1]).contains("Hard link count"));
        assert!(suite.cleanup_failure.is_none());

        // teardown ran after both scenarios
        assert_eq!(block_deletes(sim.commands_of("gluster-block").await), 2);
        assert!(report.summary().contains("create::unlink_storage_reuse ... FAILED"));
    });
}

#[test]
fn next_scenario_runs_after_failure() {
    run_test(async {
        let mut s = settings(3, &[Suite::Delete]);
        s.scenarios = vec![Scenario::UnlinkStorageNo, Scenario::DeleteLoop];
        let sim = sim(&s);
        sim.inject(Fault::UnlinkIgnored).await;

        let report = run(sim.clone(), &s).await;
        let suite = report.suites[0].1.as_ref().unwrap();

        assert_eq!(suite.scenarios.len(), 2);
        assert_eq!(suite.scenarios[0].scenario, Scenario::UnlinkStorageNo);
        assert!(failure(&suite.scenarios[0]).contains("unlink-storage was no"));
        assert!(suite.scenarios[1].passed());
        assert_eq!(suite.failed().count(), 1);
        assert!(!report.is_success());
    });
}

#[test]
fn kept_password_fails_auth_toggle() {
    run_test(async {
        let mut s = settings(3, &[Suite::Create, Suite::Modify]);
        s.scenarios = vec![Scenario::AuthToggle, Scenario::Ha3];
        let sim = sim(&s);
        sim.inject(Fault::AuthDisableIgnored).await;

        let report = run(sim.clone(), &s).await;
        assert!(!report.is_success());

        let (suite, create) = &report.suites[0];
        assert_eq!(*suite, Suite::Create);
        assert!(create.as_ref().unwrap().is_success());

        let (suite, modify) = &report.suites[1];
        assert_eq!(*suite, Suite::Modify);
        let modify = modify.as_ref().unwrap();
        assert!(failure(&modify.scenarios[0]).contains("after setting auth disable"));

        // the block was torn down despite the failure
        assert_eq!(block_deletes(sim.commands_of("gluster-block").await), 2);
        assert!(!sim.volume_exists(VOLUME).await);
    });
}

#[test]
fn failing_teardown_is_reported_with_body_failure() {
    run_test(async {
        let mut s = settings(3, &[Suite::Delete]);
        s.scenarios = vec![Scenario::DeleteLoop];
        let sim = sim(&s);
        sim.inject(Fault::BlockDeleteFails).await;

        let report = run(sim.clone(), &s).await;
        let suite = report.suites[0].1.as_ref().unwrap();

        let msg = failure(&suite.scenarios[0]);
        assert!(msg.contains("could not be deleted"));
        assert!(msg.contains("; Teardown failed: Blocks"));

        // the volume goes away with the blocks left in it
        assert!(suite.cleanup_failure.is_none());
        assert!(!sim.volume_exists(VOLUME).await);
    });
}

#[test]
fn failing_volume_cleanup_is_recorded() {
    run_test(async {
        let s = settings(3, &[Suite::Modify]);
        let sim = sim(&s);
        sim.inject(Fault::VolumeDeleteFails).await;

        let report = run(sim.clone(), &s).await;
        assert!(!report.is_success());

        let suite = report.suites[0].1.as_ref().unwrap();
        assert!(suite.scenarios.iter().all(|s| s.passed()));
        assert!(!suite.is_success());

        let msg = suite.cleanup_failure.as_deref().unwrap();
        assert!(msg.contains("Failed to cleanup volume blocktest_vol"));
        assert!(report.summary().contains("modify cleanup ... FAILED"));
        assert!(sim.volume_exists(VOLUME).await);
    });
}
