//! Test support: a scripted [`CommandRunner`]
//!
//! Used by unit tests across the crate and by the integration suite to
//! stand in for tmux, pgrep, ps, and ssh. Rules are prefix matches on
//! `"<program> <args...>"`; the first rule that matches wins, so register
//! specific rules before general ones. Every call is recorded for
//! assertions on delivery sequences.

use std::sync::Mutex;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::tmux::CommandRunner;

enum Response {
    Stdout(String),
    Fail(String),
    Timeout,
}

struct Rule {
    prefix: String,
    response: Response,
}

/// A recorded invocation: program plus arguments, space-joined.
pub type RecordedCall = String;

#[derive(Default)]
pub struct ScriptedRunner {
    rules: Vec<Rule>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Succeed with the given stdout for commands matching `prefix`.
    pub fn on(mut self, prefix: &str, stdout: impl Into<String>) -> Self {
        self.rules.push(Rule {
            prefix: prefix.to_string(),
            response: Response::Stdout(stdout.into()),
        });
        self
    }

    /// Fail (non-zero exit) with the given stderr for matching commands.
    pub fn fail(mut self, prefix: &str, stderr: impl Into<String>) -> Self {
        self.rules.push(Rule {
            prefix: prefix.to_string(),
            response: Response::Fail(stderr.into()),
        });
        self
    }

    /// Exceed the deadline for matching commands.
    pub fn time_out(mut self, prefix: &str) -> Self {
        self.rules.push(Rule {
            prefix: prefix.to_string(),
            response: Response::Timeout,
        });
        self
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls whose joined form starts with `prefix`.
    pub fn calls_matching(&self, prefix: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[&str], deadline: Duration) -> Result<String> {
        let joined = if args.is_empty() {
            program.to_string()
        } else {
            format!("{} {}", program, args.join(" "))
        };
        self.calls.lock().unwrap().push(joined.clone());

        for rule in &self.rules {
            if joined.starts_with(&rule.prefix) {
                return match &rule.response {
                    Response::Stdout(out) => Ok(out.clone()),
                    Response::Fail(err) => Err(Error::CommandFailed {
                        program: program.to_string(),
                        detail: err.clone(),
                    }),
                    Response::Timeout => Err(Error::Timeout {
                        what: program.to_string(),
                        after: deadline,
                    }),
                };
            }
        }

        Err(Error::CommandFailed {
            program: program.to_string(),
            detail: format!("unscripted command: {joined}"),
        })
    }
}
