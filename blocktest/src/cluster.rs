//! Access to the cluster under test.
//!
//! Everything the suite does to the cluster goes through an [Executor], which runs a
//! [RemoteCommand] on a named host and hands back its exit code and output. The [ClusterDriver]
//! builds the gluster administration commands on top of that.

mod driver;
mod ssh;

pub use driver::*;
pub use ssh::*;

use anyhow::{Result, bail};
use shared::Host;
use std::borrow::Cow;
use std::fmt::Display;

/// A command line to be executed on a remote host, kept as separate arguments.
///
/// Rendered into a single shell command line (see [RemoteCommand::to_shell()]) when it has to be
/// passed through ssh.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteCommand {
    program: String,
    args: Vec<String>,
}

impl RemoteCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: vec![],
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Renders the command into a POSIX shell command line with every word quoted as needed.
    pub fn to_shell(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|w| shell_quote(w))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Display for RemoteCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_shell())
    }
}

fn shell_quote(word: &str) -> Cow<'_, str> {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./:=,@%+".contains(c));

    if safe {
        Cow::Borrowed(word)
    } else {
        Cow::Owned(format!("'{}'", word.replace('\'', r"'\''")))
    }
}

/// Exit code and captured output of a finished command.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CmdOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CmdOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Turns a non-zero exit into an error describing the failed action.
    pub fn into_result(self, action: impl Display) -> Result<Self> {
        if !self.success() {
            bail!(
                "{action} failed with exit code {}: {}",
                self.exit_code,
                self.stderr.trim()
            );
        }

        Ok(self)
    }
}

/// Runs commands on cluster hosts.
///
/// Implementations only return `Err` if the command could not be run at all (e.g. the
/// connection to the host failed). A command that ran and failed is reported through
/// [CmdOutput::exit_code].
pub trait Executor {
    fn run(
        &self,
        host: &Host,
        cmd: &RemoteCommand,
    ) -> impl Future<Output = Result<CmdOutput>> + Send;
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn shell_rendering() {
        let cmd = RemoteCommand::new("gluster-block")
            .arg("create")
            .arg("vol/block_1")
            .args(["ha", "3"])
            .arg("10.0.0.1,10.0.0.2");
        assert_eq!(
            cmd.to_shell(),
            "gluster-block create vol/block_1 ha 3 10.0.0.1,10.0.0.2"
        );

        let cmd = RemoteCommand::new("echo")
            .arg("two words")
            .arg("it's")
            .arg("");
        assert_eq!(cmd.to_shell(), r"echo 'two words' 'it'\''s' ''");
    }

    #[test]
    fn output_into_result() {
        let ok = CmdOutput {
            exit_code: 0,
            stdout: "fine".into(),
            stderr: String::new(),
        };
        assert_eq!(ok.clone().into_result("Listing").unwrap(), ok);

        let err = CmdOutput {
            exit_code: 2,
            stdout: String::new(),
            stderr: "no such volume\n".into(),
        }
        .into_result("Listing")
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Listing failed with exit code 2: no such volume"
        );
    }
}
