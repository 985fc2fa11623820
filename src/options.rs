use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// dipsat: SAT-based key recovery for logic-locked circuits
#[derive(Parser, Debug, Clone)]
#[command(version, about)]
pub struct Options {
    #[command(subcommand)]
    pub command: Command,

    /// verbose level
    #[arg(short, global = true, default_value_t = 1)]
    pub verbose: usize,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// recover the key of a locked circuit
    Attack(AttackOptions),
    /// insert random xor/xnor key gates into a netlist
    Lock(LockOptions),
}

#[derive(Args, Debug, Clone, Serialize, Deserialize)]
pub struct AttackOptions {
    /// unlocked netlist (.bench or .v)
    pub oracle: PathBuf,

    /// locked netlist, key inputs named `keyinput*`
    pub locked: PathBuf,

    /// how the oracle answers queries
    #[arg(long = "oracle-engine", value_enum, default_value_t = OracleEngine::Sat)]
    pub oracle_engine: OracleEngine,

    #[command(flatten)]
    pub unroll: UnrollOptions,

    /// power-up state of the locked circuit's registers
    #[arg(long, value_enum, default_value_t = Reset::Zero)]
    pub reset: Reset,

    /// wall-clock limit in seconds
    #[arg(long, default_value_t = 7200)]
    pub timeout: u64,

    /// append confirmed dips to this file
    #[arg(long)]
    pub dips: Option<PathBuf>,

    /// replay the dips file before searching
    #[arg(long, default_value_t = false, requires = "dips")]
    pub resume: bool,

    /// run in this process instead of a killable worker
    #[arg(long = "no-isolate", default_value_t = false)]
    pub no_isolate: bool,
}

#[derive(Args, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UnrollOptions {
    /// unroll depth at which combinational equivalence is first checked
    #[arg(long = "depth", default_value_t = 20, value_parser = clap::value_parser!(u32).range(1..))]
    pub boundary: u32,

    /// boundary increment after a failed equivalence check
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u32).range(1..))]
    pub step: u32,

    /// give up deepening at this depth
    #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(u32).range(1..))]
    pub stop: u32,
}

impl Default for UnrollOptions {
    fn default() -> Self {
        Self {
            boundary: 20,
            step: 5,
            stop: 100,
        }
    }
}

#[derive(Copy, Clone, ValueEnum, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OracleEngine {
    /// query an incremental solver loaded with the oracle frames
    #[default]
    Sat,
    /// simulate the oracle netlist
    Sim,
}

#[derive(Copy, Clone, ValueEnum, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reset {
    /// registers start at 0
    #[default]
    Zero,
    /// registers start anywhere
    Free,
}

#[derive(Args, Debug, Clone)]
pub struct LockOptions {
    /// netlist to lock (.bench or .v)
    pub netlist: PathBuf,

    /// number of key bits
    #[arg(short, long, default_value_t = 8)]
    pub keys: usize,

    /// output bench file
    #[arg(short, long)]
    pub output: PathBuf,

    /// random seed
    #[arg(long, default_value_t = 0)]
    pub seed: u64,
}
