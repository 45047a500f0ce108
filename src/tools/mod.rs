//! External batch tools: the size reducer and the triage pipeline.

pub mod runner;

use crate::rule::Rule;
pub use runner::{ToolCommand, ToolError, ToolOutput};

/// Shrinks a pattern to a smaller equivalent one.
pub trait Reducer: Sync {
    /// An empty result counts as a failure.
    fn reduce(&self, pattern: &str) -> Result<String, ToolError>;
}

/// Instruction counts from lowering a rule both ways.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TriageCounts {
    /// The pattern lowered and then run through the standard optimizer.
    pub optimized_pattern: usize,
    /// The rule's replacement lowered as is.
    pub replacement: usize,
}

impl TriageCounts {
    /// The existing optimizer already does at least as well as the rule.
    pub fn is_redundant(&self) -> bool {
        self.optimized_pattern <= self.replacement
    }
}

/// Lowers rules to low-level code and counts instructions.
pub trait Triage: Sync {
    fn counts(&self, rule: &Rule) -> Result<TriageCounts, ToolError>;
}

/// Reducer backed by an external process: `<program> <args> <pattern-file>`
/// prints the reduced pattern on stdout.
#[derive(Clone, Debug)]
pub struct CommandReducer {
    tool: ToolCommand,
}

impl CommandReducer {
    pub fn new(tool: ToolCommand) -> Self {
        Self { tool }
    }
}

impl Reducer for CommandReducer {
    fn reduce(&self, pattern: &str) -> Result<String, ToolError> {
        let out = self.tool.run(pattern, &[])?.require_success(&self.tool.program)?;
        if out.stdout.trim().is_empty() {
            return Err(ToolError::Failed {
                program: self.tool.program.clone(),
                status: "status 0".to_string(),
                stderr: "empty output".to_string(),
            });
        }
        Ok(out.stdout)
    }
}

const OPTIMIZED_PATTERN_FLAG: &str = "-optimized-lhs";
const REPLACEMENT_FLAG: &str = "-rhs";

/// Triage backed by an external lowering pipeline. The tool receives the
/// rule key and a mode flag and prints one instruction count.
#[derive(Clone, Debug)]
pub struct CommandTriage {
    tool: ToolCommand,
}

impl CommandTriage {
    pub fn new(tool: ToolCommand) -> Self {
        Self { tool }
    }

    fn count(&self, text: &str, flag: &str) -> Result<usize, ToolError> {
        let out = self.tool.run(text, &[flag])?.require_success(&self.tool.program)?;
        parse_count(&out.stdout).ok_or_else(|| ToolError::Failed {
            program: self.tool.program.clone(),
            status: "status 0".to_string(),
            stderr: format!("no instruction count in output {:?}", out.stdout.trim()),
        })
    }
}

impl Triage for CommandTriage {
    fn counts(&self, rule: &Rule) -> Result<TriageCounts, ToolError> {
        let key = rule.key();
        Ok(TriageCounts {
            optimized_pattern: self.count(&key, OPTIMIZED_PATTERN_FLAG)?,
            replacement: self.count(&key, REPLACEMENT_FLAG)?,
        })
    }
}

/// Last integer-only line of the tool's output.
fn parse_count(stdout: &str) -> Option<usize> {
    stdout
        .lines()
        .rev()
        .find_map(|line| line.trim().parse::<usize>().ok())
}
