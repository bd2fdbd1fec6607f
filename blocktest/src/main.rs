use blocktest::suite::{Scenario, Suite};
use std::backtrace::Backtrace;
use std::panic;

fn main() -> Result<(), i32> {
    match inner_main() {
        Ok(true) => Ok(()),
        Ok(false) => Err(1),
        Err(err) => {
            eprintln!("{err:#}");
            Err(1)
        }
    }
}

/// Returns whether all selected scenarios passed
fn inner_main() -> anyhow::Result<bool> {
    let (config, info_log) = blocktest::config::load_and_parse()?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.log_level.as_str()),
    )
    .try_init()?;

    // log info from load_and_parse
    for l in info_log {
        log::info!(target: "blocktest::config", "{l}");
    }

    if config.list {
        for suite in Suite::ALL {
            println!("{suite}");
            for scenario in suite.scenarios() {
                println!(
                    "  {scenario:<24} needs {} servers",
                    scenario.servers_needed()
                );
            }
        }

        return Ok(true);
    }

    if !config.run.scenarios.is_empty() {
        let skipped: Vec<Scenario> = config
            .run
            .scenarios
            .iter()
            .filter(|s| !config.run.suites.contains(&s.suite()))
            .copied()
            .collect();

        for s in skipped {
            log::warn!("Scenario {s} belongs to suite {}, which is not selected", s.suite());
        }
    }

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    panic::set_hook(Box::new(|info| {
        let backtrace = Backtrace::capture();
        eprintln!("PANIC occured: {info}\n\nBACKTRACE:\n{backtrace}");
        std::process::exit(1);
    }));

    let report = rt.block_on(blocktest::run(&config));

    println!("{}", report.summary());

    Ok(report.is_success())
}
