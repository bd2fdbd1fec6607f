use crate::cluster::SshConfig;
use crate::suite::{ReadyCheck, RunSettings, Scenario, Suite};
use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, ValueEnum};
use log::LevelFilter;
use serde::Deserialize;
use shared::Host;
use shared::parser::duration;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CONFIG_FILE: &str = "/etc/gluster-blocktest.toml";

#[derive(Debug)]
pub struct Config {
    pub run: RunSettings,
    pub ssh: SshConfig,
    pub simulate: bool,
    pub list: bool,
    pub log_level: LevelFilter,
}

/// gluster-block lifecycle verification suite
///
/// Provisions a volume on the given servers, then creates, modifies and deletes blocks through
/// the gluster-block CLI and checks the results. Commands are run on the servers through ssh.
///
/// All options except --list and --config-file can also be set in the config file, using the
/// long option name in snake_case as key. Command line options take precedence.
#[derive(Debug, Default, Parser, Deserialize)]
#[command(
    author,
    version,
    rename_all = "kebab-case",
    hide_possible_values = false
)]
#[serde(deny_unknown_fields)]
struct ConfigArgs {
    //
    // CLI and config file args - can be filled in later from another ConfigArgs if they are
    // still none
    /// Host on which gluster and gluster-block commands are issued [default: first server]
    #[arg(long)]
    mnode: Option<Host>,
    /// A server to provision the volume on and export blocks from
    ///
    /// Can be specified multiple times. At least three servers are required to run all
    /// scenarios.
    #[arg(long = "server", short = 's')]
    servers: Option<Vec<Host>>,
    /// Name of the volume to provision [default: blocktest]
    #[arg(long)]
    volume: Option<String>,
    /// Replica count of the volume [default: number of servers]
    #[arg(long)]
    replica: Option<u32>,
    /// Directory on each server below which the brick directories are created [default: /bricks]
    #[arg(long)]
    brick_root: Option<String>,
    /// Remote user for ssh [default: ssh client default]
    #[arg(long)]
    ssh_user: Option<String>,
    /// Remote port for ssh [default: ssh client default]
    #[arg(long)]
    ssh_port: Option<u16>,
    /// Additional ssh option, as passed to `ssh -o`
    ///
    /// Can be specified multiple times.
    #[arg(long = "ssh-option")]
    ssh_options: Option<Vec<String>>,
    /// Run commands for localhost directly instead of through ssh [default: false]
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    local_exec: Option<bool>,
    /// Abort a remote command that didn't finish within this time [default: none]
    #[arg(long, value_parser = duration::parse)]
    #[serde(default, deserialize_with = "duration::optional::deserialize")]
    command_timeout: Option<Duration>,
    /// Seed for sampling servers [default: random]
    ///
    /// The seed of each suite is logged, pass it to repeat a run with the same server selection.
    #[arg(long)]
    seed: Option<u64>,
    /// How to wait for gluster-blockd after restarting it [default: fixed]
    #[arg(long)]
    ready_check: Option<ReadyCheckKind>,
    /// Time to wait after restarting gluster-blockd when using the fixed ready check
    /// [default: 4s]
    #[arg(long, value_parser = duration::parse)]
    #[serde(default, deserialize_with = "duration::optional::deserialize")]
    restart_delay: Option<Duration>,
    /// Give up waiting for gluster-blockd after this time when using the poll ready check
    /// [default: 30s]
    #[arg(long, value_parser = duration::parse)]
    #[serde(default, deserialize_with = "duration::optional::deserialize")]
    ready_timeout: Option<Duration>,
    /// Time between two checks when using the poll ready check [default: 1s]
    #[arg(long, value_parser = duration::parse)]
    #[serde(default, deserialize_with = "duration::optional::deserialize")]
    ready_interval: Option<Duration>,
    /// Suite to run
    ///
    /// Can be specified multiple times. Runs all suites if not given.
    #[arg(long = "suite")]
    suites: Option<Vec<Suite>>,
    /// Only run the scenario with this name (see --list)
    ///
    /// Can be specified multiple times.
    #[arg(long = "scenario")]
    scenarios: Option<Vec<String>>,
    /// Run against an in-memory simulated cluster instead of real servers [default: false]
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    simulate: Option<bool>,
    /// Log level [default: info]
    ///
    /// Sets the maximum level to log.
    ///
    /// The logging behavior can be fine controlled by setting the RUST_LOG environment
    /// variable. This overwrites this setting. See the env_logger documentation for more
    /// details:
    ///
    /// https://docs.rs/env_logger/latest/env_logger/#enabling-logging
    #[arg(long)]
    log_level: Option<LogLevel>,

    //
    // CLI only args - we do not parse them from file and also do not update them
    /// Print the available suites and scenarios, then quit
    #[arg(long)]
    #[serde(skip)]
    list: bool,
    /// Config file location [default: /etc/gluster-blocktest.toml]
    #[arg(long, default_value = DEFAULT_CONFIG_FILE, hide_default_value = true)]
    #[serde(skip)]
    config_file: Option<PathBuf>,
}

impl ConfigArgs {
    /// Fill None fields from another source - ignore Some(_) fields
    /// This means, what is put in first has higher priority
    fn fill_from(&mut self, other: Self) {
        macro_rules! fill {
            ($($field:ident),* $(,)?) => {
                $(
                    if self.$field.is_none() {
                        self.$field = other.$field;
                    }
                )*
            };
        }

        fill!(
            mnode,
            servers,
            volume,
            replica,
            brick_root,
            ssh_user,
            ssh_port,
            ssh_options,
            local_exec,
            command_timeout,
            seed,
            ready_check,
            restart_delay,
            ready_timeout,
            ready_interval,
            suites,
            scenarios,
            simulate,
            log_level,
        );
    }

    fn into_config(self) -> Result<Config> {
        let servers = self.servers.unwrap_or_default();

        if servers.is_empty() && !self.list {
            bail!("No servers given, use --server or the servers config file key");
        }

        let mnode = match self.mnode {
            Some(mnode) => mnode,
            None if self.list => "localhost".parse()?,
            None => servers[0].clone(),
        };

        let replica = match self.replica {
            Some(0) => bail!("Replica count must be at least 1"),
            Some(r) => Some(r),
            None if servers.len() > 1 => Some(servers.len() as u32),
            None => None,
        };

        let ready_check = match self.ready_check.unwrap_or_default() {
            ReadyCheckKind::Fixed => ReadyCheck::FixedDelay(
                self.restart_delay.unwrap_or(Duration::from_secs(4)),
            ),
            ReadyCheckKind::Poll => ReadyCheck::Poll {
                timeout: self.ready_timeout.unwrap_or(Duration::from_secs(30)),
                interval: self.ready_interval.unwrap_or(Duration::from_secs(1)),
            },
        };

        let mut suites = self.suites.unwrap_or_else(|| Suite::ALL.to_vec());
        suites.sort();
        suites.dedup();

        let scenarios = self
            .scenarios
            .unwrap_or_default()
            .iter()
            .map(|name| {
                Scenario::from_name(name)
                    .ok_or_else(|| anyhow!("Unknown scenario {name:?}, see --list"))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Config {
            run: RunSettings {
                mnode,
                servers,
                volume: self.volume.unwrap_or_else(|| "blocktest".to_string()),
                replica,
                brick_root: self.brick_root.unwrap_or_else(|| "/bricks".to_string()),
                ready_check,
                seed: self.seed,
                suites,
                scenarios,
            },
            ssh: SshConfig {
                user: self.ssh_user,
                port: self.ssh_port,
                options: self.ssh_options.unwrap_or_default(),
                local_exec: self.local_exec.unwrap_or(false),
                timeout: self.command_timeout,
            },
            simulate: self.simulate.unwrap_or(false),
            list: self.list,
            log_level: self.log_level.map_or(LevelFilter::Info, Into::into),
        })
    }
}

/// Parses the command line and the config file into the final [Config].
///
/// Returns informational messages to be logged once logging is set up.
pub fn load_and_parse() -> Result<(Config, Vec<String>)> {
    load_and_parse_from(std::env::args_os())
}

fn load_and_parse_from<I, T>(args: I) -> Result<(Config, Vec<String>)>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let mut args = ConfigArgs::parse_from(args);
    let mut info_log = vec![];

    if let Some(ref file) = args.config_file {
        match std::fs::read_to_string(file) {
            Ok(ref toml_config) => {
                let file_args: ConfigArgs = toml::from_str(toml_config)
                    .with_context(|| format!("Couldn't parse config file {file:?}"))?;

                info_log.push(format!("Loaded configuration from {file:?}"));

                args.fill_from(file_args);
            }
            Err(err) => {
                if file != Path::new(DEFAULT_CONFIG_FILE) {
                    return Err(err)
                        .with_context(|| format!("Could not open config file at {file:?}"));
                }

                info_log.push("No config file found at default location, ignoring".to_string());
            }
        }
    }

    Ok((args.into_config()?, info_log))
}

#[derive(Clone, Copy, Debug, Default, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ReadyCheckKind {
    /// Sleep for --restart-delay
    #[default]
    Fixed,
    /// Poll `systemctl is-active` until gluster-blockd is active on all servers
    Poll,
}

// To be able to parse the log level, we need to make our own enum and convert
// it
#[derive(Clone, Debug, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(value: LogLevel) -> Self {
        match value {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}
