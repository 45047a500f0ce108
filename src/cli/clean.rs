use std::path::PathBuf;

use clap::{ArgAction, Args};
use tracing::info;

use rulesift::config::{Config, ToolConfig};
use rulesift::oracle::{CommandOracle, InferenceMode};
use rulesift::rank::RankBy;
use rulesift::tools::{CommandReducer, CommandTriage, Reducer, Triage};
use rulesift::{CacheSnapshot, Collaborators, PipelineError};

use super::fail;

#[derive(Args)]
pub struct CleanArgs {
    /// Exported cache snapshot (JSON)
    pub cache: PathBuf,
    /// Config file (default: nearest rulesift.toml above the cache)
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Generalize patterns by removing bits and qualifiers the verifier
    /// does not need
    #[arg(long)]
    pub weaken: bool,
    /// Fold rules that differ only in widths and constants
    #[arg(long)]
    pub merge: bool,
    /// Shrink patterns with the external reducer
    #[arg(long)]
    pub reduce: bool,
    /// Drop rules the standard optimizer already handles
    #[arg(long)]
    pub triage: bool,
    /// Re-derive every cached replacement before anything else
    #[arg(long)]
    pub verify: bool,
    /// Report ordering
    #[arg(long, value_enum)]
    pub sort: Option<RankBy>,
    /// Report non-optimizations instead of optimizations
    #[arg(long)]
    pub dump_non_optimizations: bool,
    /// Abort when a pattern does not parse
    #[arg(long)]
    pub ensure_all_parse: bool,
    /// Annotate rules with an inferred fact (repeatable)
    #[arg(long, value_enum, action = ArgAction::Append)]
    pub infer: Vec<InferenceMode>,
    /// Verifier program
    #[arg(long)]
    pub oracle: Option<String>,
    /// Reducer program
    #[arg(long)]
    pub reducer: Option<String>,
    /// Triage program
    #[arg(long)]
    pub triage_tool: Option<String>,
    /// Per-invocation timeout for every external tool, in seconds
    #[arg(long)]
    pub timeout: Option<u64>,
    /// Worker threads (0 = one per core)
    #[arg(short, long)]
    pub jobs: Option<usize>,
}

impl CleanArgs {
    /// Layer the flags over the file config. Flags only ever switch stages
    /// on; they never turn off what the file enables.
    pub fn apply(&self, config: &mut Config) {
        let stages = &mut config.stages;
        stages.weaken |= self.weaken;
        stages.merge |= self.merge;
        stages.reduce |= self.reduce;
        stages.triage |= self.triage;
        stages.verify |= self.verify;
        stages.dump_non_optimizations |= self.dump_non_optimizations;
        stages.ensure_all_parse |= self.ensure_all_parse;

        if let Some(sort) = self.sort {
            config.sort = sort;
        }
        if let Some(jobs) = self.jobs {
            config.jobs = jobs;
        }
        for mode in &self.infer {
            if !config.infer.contains(mode) {
                config.infer.push(*mode);
            }
        }
        if let Some(program) = &self.oracle {
            config.oracle.command = program.clone();
        }
        if let Some(program) = &self.reducer {
            override_tool(&mut config.reducer, program);
        }
        if let Some(program) = &self.triage_tool {
            override_tool(&mut config.triage, program);
        }
        if let Some(secs) = self.timeout {
            config.set_timeout(secs);
        }
    }
}

fn override_tool(slot: &mut Option<ToolConfig>, program: &str) {
    match slot {
        Some(tool) => tool.command = program.to_string(),
        None => *slot = Some(ToolConfig::named(program)),
    }
}

pub fn cmd_clean(args: CleanArgs) {
    let mut config = match Config::discover(args.config.as_deref(), &args.cache) {
        Ok(c) => c,
        Err(e) => fail(&PipelineError::from(e)),
    };
    args.apply(&mut config);
    if let Err(e) = config.validate() {
        fail(&PipelineError::from(e));
    }

    let snapshot = match CacheSnapshot::load(&args.cache) {
        Ok(s) => s,
        Err(e) => fail(&PipelineError::from(e)),
    };
    info!(
        cache = %args.cache.display(),
        records = snapshot.len(),
        "starting run"
    );

    let oracle = CommandOracle::new(config.oracle.command());
    let reducer = config.reducer.as_ref().map(|t| CommandReducer::new(t.command()));
    let triage = config.triage.as_ref().map(|t| CommandTriage::new(t.command()));
    let with = Collaborators {
        oracle: &oracle,
        reducer: reducer.as_ref().map(|r| r as &dyn Reducer),
        triage: triage.as_ref().map(|t| t as &dyn Triage),
    };

    match rulesift::run(&snapshot, &config.options(), with) {
        Ok(outcome) => print!("{}", outcome.format_report()),
        Err(e) => fail(&e),
    }
}
