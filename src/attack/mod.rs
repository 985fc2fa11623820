mod check;
mod dips;

pub use check::Umc;
pub use dips::{format_dip, Dip, DipLog};

use crate::{
    circuit::Circuit,
    error::{Error, Result},
    formula::KeyCopy,
    frames::{FrameBinding, FrameManager},
    options::{AttackOptions, OracleEngine, Reset, UnrollOptions},
    oracle::{Oracle, SatOracle, SimOracle},
    solver::Solver,
    statistic::Statistic,
};
use serde::{Deserialize, Serialize};
use std::{
    fmt::Display,
    path::PathBuf,
    str::FromStr,
    time::{Duration, Instant},
};
use tracing::{debug, info, warn};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AttackConfig {
    pub unroll: UnrollOptions,
    pub reset: Reset,
    pub oracle_engine: OracleEngine,
    pub timeout: Option<Duration>,
    pub dips: Option<PathBuf>,
    pub resume: bool,
}

impl From<&AttackOptions> for AttackConfig {
    fn from(o: &AttackOptions) -> Self {
        Self {
            unroll: o.unroll,
            reset: o.reset,
            oracle_engine: o.oracle_engine,
            timeout: Some(Duration::from_secs(o.timeout)),
            dips: o.dips.clone(),
            resume: o.resume,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    UniqueCompletion,
    CombinationalEquivalence,
    UniqueMinimalCompletion,
    /// stop depth reached while distinct keys remained; the key is a best
    /// effort and may not be unique
    Exhausted,
    Timeout,
}

impl Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Outcome::UniqueCompletion => "unique completion",
            Outcome::CombinationalEquivalence => "combinational equivalence",
            Outcome::UniqueMinimalCompletion => "unique minimal completion",
            Outcome::Exhausted => "exhausted (key may not be unique)",
            Outcome::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

/// Key bits in key-input declaration order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Key(pub Vec<bool>);

impl Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for b in self.0.iter() {
            f.write_str(if *b { "1" } else { "0" })?;
        }
        Ok(())
    }
}

impl FromStr for Key {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.chars()
            .map(|c| match c {
                '0' => Ok(false),
                '1' => Ok(true),
                c => Err(format!("invalid key bit `{c}`")),
            })
            .collect::<std::result::Result<Vec<_>, _>>()
            .map(Key)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AttackReport {
    pub outcome: Outcome,
    pub key: Option<Key>,
    pub iterations: usize,
    pub banned_keys: usize,
    pub depth: usize,
    pub highest_depth: usize,
}

#[derive(Debug)]
enum State {
    Unrolling,
    HaveDip(Dip),
    Confirming(Dip, Vec<Vec<bool>>),
    Deepen,
    CheckCe,
    CheckUmc,
    Done(Outcome),
}

pub struct Attack {
    locked: FrameManager,
    oracle: Box<dyn Oracle>,
    /// two key copies over the unrolled frames plus every dip constraint
    dip_solver: Solver,
    /// dip constraints and key bans only
    key_solver: Solver,
    config: AttackConfig,
    depth: usize,
    highest_depth: usize,
    boundary: usize,
    iterations: usize,
    banned: usize,
    dips: DipLog,
    deadline: Option<Instant>,
    statistic: Statistic,
}

impl Attack {
    pub fn new(oracle: Circuit, locked: Circuit, config: AttackConfig) -> Result<Self> {
        Circuit::check_compatible(&oracle, &locked)?;
        let oracle: Box<dyn Oracle> = match config.oracle_engine {
            OracleEngine::Sat => Box::new(SatOracle::new(oracle)),
            OracleEngine::Sim => Box::new(SimOracle::new(oracle)),
        };
        Ok(Self::with_oracle(locked, oracle, config))
    }

    pub fn with_oracle(locked: Circuit, oracle: Box<dyn Oracle>, config: AttackConfig) -> Self {
        let statistic = Statistic::new(&locked.name);
        Self {
            locked: FrameManager::locked(locked, config.reset),
            oracle,
            dip_solver: Solver::new(),
            key_solver: Solver::new(),
            depth: 1,
            highest_depth: 0,
            boundary: config.unroll.boundary as usize,
            iterations: 0,
            banned: 0,
            dips: DipLog::new(config.dips.clone()),
            deadline: None,
            statistic,
            config,
        }
    }

    #[inline]
    pub fn statistic(&self) -> &Statistic {
        &self.statistic
    }

    fn load_frames(&mut self, from: usize, to: usize) {
        for t in from..=to {
            let f = self.locked.obf_frame(t);
            self.dip_solver.assert_all(&self.locked.tm, &f);
        }
    }

    fn timed_out(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    pub fn run(&mut self) -> Result<AttackReport> {
        self.deadline = self.config.timeout.map(|t| Instant::now() + t);
        if self.locked.circuit.keys.is_empty() {
            warn!("`{}` has no key inputs", self.locked.circuit.name);
            return Ok(self.report(Outcome::UniqueCompletion, Some(Key::default())));
        }
        info!(
            "boundary={}, step={}, stop={}",
            self.boundary, self.config.unroll.step, self.config.unroll.stop
        );
        let neq = self.locked.key_inequality();
        self.dip_solver.assert(&self.locked.tm, neq);
        self.load_frames(0, self.depth);
        if self.config.resume {
            self.resume()?;
        }
        let mut state = State::Unrolling;
        loop {
            if self.timed_out() && !matches!(state, State::Done(_)) {
                warn!("timeout at iteration {} depth {}", self.iterations, self.depth);
                state = State::Done(Outcome::Timeout);
            }
            state = match state {
                State::Unrolling => self.find_dip(),
                State::HaveDip(dip) => {
                    let start = Instant::now();
                    let answer = self.oracle.query(&dip)?;
                    self.statistic.num_oracle_query += 1;
                    self.statistic.oracle_time += start.elapsed();
                    debug!("oracle: {}", format_dip(&answer));
                    State::Confirming(dip, answer)
                }
                State::Confirming(dip, answer) => self.confirm(dip, answer)?,
                State::Deepen => {
                    self.depth += 1;
                    self.load_frames(self.depth, self.depth);
                    info!("increasing unroll depth to {}", self.depth);
                    State::Unrolling
                }
                State::CheckCe => {
                    if self.combinational_equivalence() {
                        State::Done(Outcome::CombinationalEquivalence)
                    } else {
                        State::CheckUmc
                    }
                }
                State::CheckUmc => match self.unique_minimal_completion() {
                    Umc::Unique => State::Done(Outcome::UniqueMinimalCompletion),
                    Umc::Unknown => {
                        self.boundary += self.config.unroll.step as usize;
                        info!("increase boundary to {}", self.boundary);
                        State::Unrolling
                    }
                },
                State::Done(outcome) => return self.finish(outcome),
            };
        }
    }

    fn find_dip(&mut self) -> State {
        let start = Instant::now();
        let differ = self.locked.outputs_differ(self.depth);
        let sat = self.dip_solver.is_sat(&self.locked.tm, &[differ]);
        self.statistic.dip_time += start.elapsed();
        if sat {
            let dip: Dip = (1..=self.depth)
                .map(|t| {
                    (0..self.locked.circuit.inputs.len())
                        .map(|i| {
                            let s = self.locked.input_sym(t, i);
                            self.dip_solver.value(&s).unwrap_or(false)
                        })
                        .collect()
                })
                .collect();
            debug!("dip: {}", format_dip(&dip));
            return State::HaveDip(dip);
        }
        self.highest_depth = self.depth;
        if self.unique_completion() {
            return State::Done(Outcome::UniqueCompletion);
        }
        if self.depth >= self.config.unroll.stop as usize {
            warn!("stopped at {}", self.config.unroll.stop);
            State::Done(Outcome::Exhausted)
        } else if self.depth >= self.boundary {
            warn!("uc failed at depth {}", self.depth);
            State::CheckCe
        } else {
            State::Deepen
        }
    }

    fn confirm(&mut self, dip: Dip, answer: Vec<Vec<bool>>) -> Result<State> {
        if self.dips.contains(&dip) {
            self.ban_spurious(&dip, &answer)?;
            return Ok(State::Unrolling);
        }
        self.dips.record(dip.clone())?;
        self.add_dip_checker(&dip, &answer);
        self.iterations += 1;
        self.highest_depth = self.depth;
        info!("iteration={}, depth={}", self.iterations, self.depth);
        Ok(State::Unrolling)
    }

    /// A repeated dip only shows diverging register values. Bans the key of
    /// the copy that disagrees with the oracle.
    fn ban_spurious(&mut self, dip: &Dip, answer: &[Vec<bool>]) -> Result<()> {
        let mut culprit = None;
        'frames: for t in 1..=dip.len() {
            for i in 0..self.locked.circuit.outputs.len() {
                let v: Vec<Option<bool>> = KeyCopy::BOTH
                    .iter()
                    .map(|c| {
                        let s = self.locked.output_symbol(Some(*c), t, i);
                        self.dip_solver.value(&s)
                    })
                    .collect();
                if v[0] == v[1] {
                    continue;
                }
                let expect = Some(answer[t - 1][i]);
                culprit = KeyCopy::BOTH
                    .into_iter()
                    .zip(v)
                    .find(|(_, v)| *v != expect)
                    .map(|(c, _)| c);
                break 'frames;
            }
        }
        let Some(copy) = culprit else {
            return Err(Error::UnresolvedSpuriousDip);
        };
        let key: Vec<bool> = (0..self.locked.circuit.keys.len())
            .map(|i| {
                let s = self.locked.key_sym(copy, i);
                self.dip_solver.value(&s).unwrap_or(false)
            })
            .collect();
        info!("stateful dip repeated, banning key {}", Key(key.clone()));
        let ban = self.locked.ban_key(&key);
        self.dip_solver.assert(&self.locked.tm, ban);
        self.key_solver.assert(&self.locked.tm, ban);
        self.banned += 1;
        self.statistic.num_banned += 1;
        Ok(())
    }

    /// Constrains both copies to reproduce the oracle's answer on `dip`.
    fn add_dip_checker(&mut self, dip: &Dip, answer: &[Vec<bool>]) {
        let id = self.dips.len();
        for t in 0..=dip.len() {
            for copy in KeyCopy::BOTH {
                let binding = FrameBinding {
                    dip: id,
                    inputs: t.checked_sub(1).map(|t| dip[t].as_slice()),
                    outputs: t.checked_sub(1).map(|t| answer[t].as_slice()),
                };
                let f = self.locked.instance(t, Some(copy), binding);
                self.dip_solver.assert_all(&self.locked.tm, &f);
                self.key_solver.assert_all(&self.locked.tm, &f);
            }
        }
    }

    fn resume(&mut self) -> Result<()> {
        let Some(path) = self.config.dips.clone() else {
            return Ok(());
        };
        let dips = DipLog::load(&path, self.locked.circuit.inputs.len())?;
        let len = dips.iter().map(Vec::len).max().unwrap_or(0);
        if len > self.depth {
            let from = self.depth + 1;
            self.depth = len;
            self.load_frames(from, len);
        }
        for dip in dips {
            let answer = self.oracle.query(&dip)?;
            self.statistic.num_oracle_query += 1;
            if self.dips.restore(dip.clone()) {
                self.add_dip_checker(&dip, &answer);
                self.iterations += 1;
            }
        }
        info!(
            "resumed {} dips from {}, depth={}",
            self.iterations,
            path.display(),
            self.depth
        );
        Ok(())
    }

    fn extract_key(&mut self) -> Result<Key> {
        if !self.key_solver.is_sat(&self.locked.tm, &[]) {
            return Err(Error::KeySolverUnsat);
        }
        let key = (0..self.locked.circuit.keys.len())
            .map(|i| {
                let s = self.locked.key_sym(KeyCopy::K0, i);
                self.key_solver.value(&s).unwrap_or(false)
            })
            .collect();
        Ok(Key(key))
    }

    fn report(&self, outcome: Outcome, key: Option<Key>) -> AttackReport {
        AttackReport {
            outcome,
            key,
            iterations: self.iterations,
            banned_keys: self.banned,
            depth: self.depth,
            highest_depth: self.highest_depth,
        }
    }

    fn finish(&mut self, outcome: Outcome) -> Result<AttackReport> {
        self.statistic.dip_solver = self.dip_solver.statistic;
        self.statistic.key_solver = self.key_solver.statistic;
        debug!("{:#?}", self.statistic);
        let key = match outcome {
            Outcome::Timeout => None,
            _ => Some(self.extract_key()?),
        };
        info!(
            "{outcome}: iterations={}, highest depth={}",
            self.iterations, self.highest_depth
        );
        Ok(self.report(outcome, key))
    }
}
