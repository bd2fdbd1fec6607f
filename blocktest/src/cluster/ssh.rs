//! [Executor] running commands through the `ssh` client binary.

use super::{CmdOutput, Executor, RemoteCommand};
use anyhow::{Context, Result};
use shared::Host;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Connection settings for [SshExecutor].
#[derive(Clone, Debug, Default)]
pub struct SshConfig {
    /// Remote login user. Uses the ssh client default if not set.
    pub user: Option<String>,
    pub port: Option<u16>,
    /// Additional `-o` options passed to ssh
    pub options: Vec<String>,
    /// Run commands for `localhost` directly instead of connecting through ssh
    pub local_exec: bool,
    /// Kill a command that didn't finish within this time
    pub timeout: Option<Duration>,
}

#[derive(Clone, Debug)]
pub struct SshExecutor {
    config: SshConfig,
}

impl SshExecutor {
    pub fn new(config: SshConfig) -> Self {
        Self { config }
    }

    fn build(&self, host: &Host, cmd: &RemoteCommand) -> Command {
        if self.config.local_exec && host.is_local() {
            let mut command = Command::new("sh");
            command.arg("-c").arg(cmd.to_shell());
            return command;
        }

        let mut command = Command::new("ssh");
        // never block on password or host key prompts
        command.args(["-o", "BatchMode=yes"]);

        if let Some(port) = self.config.port {
            command.arg("-p").arg(port.to_string());
        }

        if let Some(ref user) = self.config.user {
            command.arg("-l").arg(user);
        }

        for o in &self.config.options {
            command.arg("-o").arg(o);
        }

        command.arg(host.as_str()).arg("--").arg(cmd.to_shell());
        command
    }
}

impl Executor for SshExecutor {
    async fn run(&self, host: &Host, cmd: &RemoteCommand) -> Result<CmdOutput> {
        let mut command = self.build(host, cmd);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        log::debug!("[{host}] {cmd}");

        let output = match self.config.timeout {
            Some(timeout) => tokio::time::timeout(timeout, command.output())
                .await
                .with_context(|| format!("Command on {host} timed out after {timeout:?}: {cmd}"))?,
            None => command.output().await,
        }
        .with_context(|| format!("Could not run command on {host}: {cmd}"))?;

        let output = CmdOutput {
            // killed by a signal
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        log::trace!("[{host}] exit code {}: {:?}", output.exit_code, output.stdout);

        Ok(output)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn args_of(command: &Command) -> Vec<String> {
        command
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn ssh_command_line() {
        let ex = SshExecutor::new(SshConfig {
            user: Some("root".into()),
            port: Some(2222),
            options: vec!["StrictHostKeyChecking=no".into()],
            ..Default::default()
        });

        let cmd = RemoteCommand::new("gluster").args(["volume", "info", "my vol"]);
        let command = ex.build(&"server1".parse().unwrap(), &cmd);

        assert_eq!(command.as_std().get_program(), "ssh");
        assert_eq!(
            args_of(&command),
            [
                "-o",
                "BatchMode=yes",
                "-p",
                "2222",
                "-l",
                "root",
                "-o",
                "StrictHostKeyChecking=no",
                "server1",
                "--",
                "gluster volume info 'my vol'",
            ]
        );
    }

    #[test]
    fn local_command_line() {
        let ex = SshExecutor::new(SshConfig {
            local_exec: true,
            ..Default::default()
        });

        let cmd = RemoteCommand::new("true");
        let command = ex.build(&"localhost".parse().unwrap(), &cmd);
        assert_eq!(command.as_std().get_program(), "sh");
        assert_eq!(args_of(&command), ["-c", "true"]);

        let command = ex.build(&"server2".parse().unwrap(), &cmd);
        assert_eq!(command.as_std().get_program(), "ssh");
    }

    #[tokio::test]
    async fn runs_locally() {
        let ex = SshExecutor::new(SshConfig {
            local_exec: true,
            ..Default::default()
        });
        let host: Host = "localhost".parse().unwrap();

        let out = ex
            .run(&host, &RemoteCommand::new("echo").arg("hello world"))
            .await
            .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout, "hello world\n");

        let out = ex
            .run(&host, &RemoteCommand::new("sh").args(["-c", "echo oops >&2; exit 3"]))
            .await
            .unwrap();
        assert_eq!(out.exit_code, 3);
        assert_eq!(out.stderr, "oops\n");
    }
}
