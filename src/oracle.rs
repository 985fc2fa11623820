use crate::{
    circuit::Circuit,
    error::{Error, Result},
    frames::FrameManager,
    sim::Simulator,
    solver::Solver,
};

/// Black-box access to the unlocked design. A query runs an input sequence
/// from reset and returns the outputs of every cycle.
pub trait Oracle {
    fn query(&mut self, seq: &[Vec<bool>]) -> Result<Vec<Vec<bool>>>;
}

/// Oracle frames live in one incremental solver; a query only passes the
/// input values as assumptions.
pub struct SatOracle {
    fm: FrameManager,
    solver: Solver,
    /// frames asserted so far, the reset frame included
    num_loaded: usize,
}

impl SatOracle {
    pub fn new(circuit: Circuit) -> Self {
        Self {
            fm: FrameManager::oracle(circuit),
            solver: Solver::new(),
            num_loaded: 0,
        }
    }

    fn load_to(&mut self, depth: usize) -> Result<()> {
        while self.num_loaded <= depth {
            let t = self.num_loaded;
            let frame = self
                .fm
                .oracle_frame(t)
                .ok_or(Error::OracleInconsistency { frame: t })?;
            self.solver.assert_all(&self.fm.tm, &frame);
            self.num_loaded += 1;
        }
        Ok(())
    }
}

impl Oracle for SatOracle {
    fn query(&mut self, seq: &[Vec<bool>]) -> Result<Vec<Vec<bool>>> {
        self.load_to(seq.len())?;
        let mut assump = Vec::new();
        for (t, inputs) in seq.iter().enumerate() {
            for (i, v) in inputs.iter().enumerate() {
                let s = self.fm.input_sym(t + 1, i);
                let s = self.fm.tm.sym(s);
                assump.push(if *v { s } else { self.fm.tm.not(s) });
            }
        }
        if !self.solver.is_sat(&self.fm.tm, &assump) {
            return Err(Error::OracleInconsistency { frame: seq.len() });
        }
        let mut res = Vec::with_capacity(seq.len());
        for t in 1..=seq.len() {
            let mut outs = Vec::with_capacity(self.fm.circuit.outputs.len());
            for i in 0..self.fm.circuit.outputs.len() {
                let s = self.fm.output_symbol(None, t, i);
                let v = self
                    .solver
                    .value(&s)
                    .ok_or(Error::OracleInconsistency { frame: t })?;
                outs.push(v);
            }
            res.push(outs);
        }
        Ok(res)
    }
}

pub struct SimOracle {
    circuit: Circuit,
}

impl SimOracle {
    pub fn new(circuit: Circuit) -> Self {
        Self { circuit }
    }
}

impl Oracle for SimOracle {
    fn query(&mut self, seq: &[Vec<bool>]) -> Result<Vec<Vec<bool>>> {
        Ok(Simulator::new(&self.circuit, &[]).run(seq))
    }
}
