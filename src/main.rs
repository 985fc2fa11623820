use anyhow::Context;
use clap::Parser;
use dipsat::{
    frontend::{read_netlist, write_bench},
    init_logging,
    lock::lock,
    options::{Command, Options},
    supervise::{attack_files, attack_isolated},
    Outcome,
};
use rand::{rngs::StdRng, SeedableRng};
use std::process::exit;
use tracing::warn;

fn main() -> anyhow::Result<()> {
    procspawn::init();
    let options = Options::parse();
    init_logging(options.verbose);
    ctrlc::set_handler(|| {
        warn!("interrupted");
        exit(130);
    })
    .context("failed to install the interrupt handler")?;
    match options.command {
        Command::Attack(attack) => {
            let report = if attack.no_isolate {
                attack_files(&attack)?
            } else {
                attack_isolated(attack, options.verbose)?
            };
            println!("result: {}", report.outcome);
            if let Some(key) = report.key.as_ref() {
                println!("key={key}");
            }
            println!(
                "iterations={}, banned keys={}, highest depth={}",
                report.iterations, report.banned_keys, report.highest_depth
            );
            if report.outcome == Outcome::Timeout {
                exit(124);
            }
        }
        Command::Lock(o) => {
            let netlist = read_netlist(&o.netlist)?;
            let mut rng = StdRng::seed_from_u64(o.seed);
            let (locked, key) = lock(&netlist, o.keys, &mut rng)?;
            write_bench(&o.output, &locked)?;
            println!("key={key}");
        }
    }
    Ok(())
}
