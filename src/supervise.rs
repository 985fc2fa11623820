use crate::{
    attack::{Attack, AttackConfig, AttackReport, Outcome},
    error::{Error, Result},
    frontend::load_circuit,
    init_logging,
    options::AttackOptions,
};
use std::time::Duration;
use tracing::warn;

/// Time the worker gets past its own deadline before it is killed.
const GRACE: Duration = Duration::from_secs(10);

pub fn attack_files(options: &AttackOptions) -> Result<AttackReport> {
    let oracle = load_circuit(&options.oracle)?;
    let locked = load_circuit(&options.locked)?;
    let mut attack = Attack::new(oracle, locked, AttackConfig::from(options))?;
    attack.run()
}

fn worker((options, verbose): (AttackOptions, usize)) -> std::result::Result<AttackReport, String> {
    init_logging(verbose);
    attack_files(&options).map_err(|e| e.to_string())
}

/// Runs the attack in a child process. The child stops itself at the
/// deadline; if it does not, it is killed and all of its progress is lost.
pub fn attack_isolated(options: AttackOptions, verbose: usize) -> Result<AttackReport> {
    let limit = Duration::from_secs(options.timeout) + GRACE;
    let mut join = procspawn::spawn((options, verbose), worker);
    match join.join_timeout(limit) {
        Ok(res) => res.map_err(Error::Supervisor),
        Err(e) if e.is_timeout() => {
            warn!("attack worker did not stop at its deadline, killing it");
            let _ = join.kill();
            Ok(AttackReport {
                outcome: Outcome::Timeout,
                key: None,
                iterations: 0,
                banned_keys: 0,
                depth: 0,
                highest_depth: 0,
            })
        }
        Err(e) => Err(Error::Supervisor(e.to_string())),
    }
}
