//! `pg_autoctl` command lines
//!
//! Every `pg_autoctl` invocation needs `--pgdata`, and it must come before a
//! `--` separator, after which arguments are handed through untouched.

use std::path::Path;

use crate::error::{HarnessError, HarnessResult};
use crate::network::CommandLine;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AutoCtlCommand {
    positional: Vec<String>,
    passthrough: Vec<String>,
    verbatim: bool,
}

impl AutoCtlCommand {
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            positional: args.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Arguments used exactly as given, without `--pgdata` injection
    pub fn verbatim<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            verbatim: true,
            ..Self::new(args)
        }
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.positional.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.positional.extend(args.into_iter().map(Into::into));
        self
    }

    /// Arguments placed after `--`
    pub fn passthrough<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.passthrough.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn build(&self, program: &Path, datadir: &Path, env: Vec<(String, String)>) -> HarnessResult<CommandLine> {
        let command = CommandLine::from_path(program).envs(env);

        if self.verbatim {
            return Ok(command.args(self.positional.iter().cloned()));
        }

        if let Some(bad) = self
            .positional
            .iter()
            .find(|arg| *arg == "--" || *arg == "--pgdata")
        {
            return Err(HarnessError::unexpected("pg_autoctl argument", bad.clone()));
        }

        let mut command = command
            .args(self.positional.iter().cloned())
            .arg("--pgdata")
            .arg(datadir.display().to_string());

        if !self.passthrough.is_empty() {
            command = command.arg("--").args(self.passthrough.iter().cloned());
        }
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(command: &AutoCtlCommand) -> HarnessResult<String> {
        command
            .build(Path::new("pg_autoctl"), Path::new("/tmp/node1"), Vec::new())
            .map(|c| c.to_string())
    }

    #[test]
    fn test_pgdata_follows_positional_args() {
        let command = AutoCtlCommand::new(["config", "get"]).arg("pg_autoctl.role");
        assert_eq!(
            render(&command).unwrap(),
            "pg_autoctl config get pg_autoctl.role --pgdata /tmp/node1"
        );
    }

    #[test]
    fn test_pgdata_precedes_separator() {
        let command = AutoCtlCommand::new(["set", "node", "candidate-priority"]).passthrough(["-1"]);
        assert_eq!(
            render(&command).unwrap(),
            "pg_autoctl set node candidate-priority --pgdata /tmp/node1 -- -1"
        );
    }

    #[test]
    fn test_verbatim_is_untouched() {
        let command = AutoCtlCommand::verbatim(["create", "postgres", "--pgdata", "/elsewhere"]);
        assert_eq!(
            render(&command).unwrap(),
            "pg_autoctl create postgres --pgdata /elsewhere"
        );
    }

    #[test]
    fn test_rejects_manual_separator() {
        let command = AutoCtlCommand::new(["show", "--", "uri"]);
        assert!(matches!(render(&command), Err(HarnessError::UnexpectedValue { .. })));

        let command = AutoCtlCommand::new(["show", "--pgdata"]);
        assert!(render(&command).is_err());
    }
}
