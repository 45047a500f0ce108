use super::{InferenceMode, Oracle, OracleError, OracleMode, Verdict};
use crate::tools::runner::{ToolCommand, ToolError};

const PARSE_ONLY_FLAG: &str = "-parse-only";
const INFER_RHS_FLAG: &str = "-infer-rhs";

/// Verifier backed by an external process.
///
/// The verifier is called as `<program> <args> <mode-flag> <pattern-file>`.
/// Exit status 0 means the pattern was accepted. In replacement mode the
/// canonical replacement is stdout with `;` comment lines removed.
#[derive(Clone, Debug)]
pub struct CommandOracle {
    tool: ToolCommand,
}

impl CommandOracle {
    pub fn new(tool: ToolCommand) -> Self {
        Self { tool }
    }

    fn run(&self, pattern: &str, flag: &str) -> Result<(bool, String), OracleError> {
        match self.tool.run(pattern, &[flag]) {
            Ok(out) => Ok((out.success, strip_comments(&out.stdout))),
            Err(ToolError::TimedOut { timeout, .. }) => Err(OracleError::TimedOut(timeout)),
            Err(e) => Err(OracleError::Unavailable(e.to_string())),
        }
    }
}

impl Oracle for CommandOracle {
    fn verify(&self, pattern: &str, mode: OracleMode) -> Result<Verdict, OracleError> {
        match mode {
            OracleMode::ParseOnly => {
                let (ok, _) = self.run(pattern, PARSE_ONLY_FLAG)?;
                Ok(if ok {
                    Verdict::accept("")
                } else {
                    Verdict::reject()
                })
            }
            OracleMode::InferReplacement => {
                let (ok, replacement) = self.run(pattern, INFER_RHS_FLAG)?;
                Ok(if ok && !replacement.trim().is_empty() {
                    Verdict::accept(replacement)
                } else {
                    Verdict::reject()
                })
            }
        }
    }

    fn infer(&self, pattern: &str, mode: InferenceMode) -> Result<String, OracleError> {
        let (ok, text) = self.run(pattern, mode.flag())?;
        Ok(if ok {
            text.trim().to_string()
        } else {
            String::new()
        })
    }
}

fn strip_comments(stdout: &str) -> String {
    let mut out = String::new();
    for line in stdout.lines() {
        if line.trim_start().starts_with(';') || line.trim().is_empty() {
            continue;
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}
