pub mod attack;
pub mod circuit;
pub mod compile;
pub mod error;
pub mod formula;
pub mod frames;
pub mod frontend;
pub mod lock;
pub mod options;
pub mod oracle;
pub mod sim;
pub mod solver;
pub mod statistic;
pub mod supervise;

pub use attack::{Attack, AttackConfig, AttackReport, Key, Outcome};
pub use circuit::Circuit;
pub use error::{Error, Result};
pub use options::Options;

pub fn init_logging(verbose: usize) {
    let log_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_writer(std::io::stderr)
        .try_init();
}
