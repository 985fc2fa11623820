use crate::circuit::{Circuit, GateKind};

/// Cycle-accurate gate-level simulation with a fixed key.
pub struct Simulator<'a> {
    circuit: &'a Circuit,
    key: Vec<bool>,
    state: Vec<bool>,
    values: Vec<bool>,
}

impl<'a> Simulator<'a> {
    pub fn new(circuit: &'a Circuit, key: &[bool]) -> Self {
        let state = vec![false; circuit.states.len()];
        Self::with_state(circuit, key, state)
    }

    pub fn with_state(circuit: &'a Circuit, key: &[bool], state: Vec<bool>) -> Self {
        assert_eq!(key.len(), circuit.keys.len());
        assert_eq!(state.len(), circuit.states.len());
        Self {
            circuit,
            key: key.to_vec(),
            state,
            values: vec![false; circuit.num_wires()],
        }
    }

    #[inline]
    pub fn state(&self) -> &[bool] {
        &self.state
    }

    pub fn step(&mut self, inputs: &[bool]) -> Vec<bool> {
        let c = self.circuit;
        for (w, v) in c.inputs.iter().zip(inputs) {
            self.values[w.index()] = *v;
        }
        for (w, v) in c.keys.iter().zip(self.key.iter()) {
            self.values[w.index()] = *v;
        }
        for (w, v) in c.states.iter().zip(self.state.iter()) {
            self.values[w.index()] = *v;
        }
        let mut ins = Vec::new();
        for &w in c.order.iter() {
            let wire = c.wire(w);
            if wire.kind.is_source() && !matches!(wire.kind, GateKind::Const(_)) {
                continue;
            }
            ins.clear();
            ins.extend(wire.operands.iter().map(|o| self.values[o.index()]));
            self.values[w.index()] = wire.kind.eval(&ins);
        }
        for (s, n) in self.state.iter_mut().zip(c.next_states.iter()) {
            *s = self.values[n.index()];
        }
        c.outputs.iter().map(|o| self.values[o.index()]).collect()
    }

    pub fn run(&mut self, seq: &[Vec<bool>]) -> Vec<Vec<bool>> {
        seq.iter().map(|i| self.step(i)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::{Gate, Netlist};

    #[test]
    fn toggle_register() {
        let c = Circuit::load(Netlist {
            name: "t".to_string(),
            inputs: vec!["en".to_string()],
            outputs: vec!["q".to_string()],
            gates: vec![
                Gate::new("q", "dff", &["d"]),
                Gate::new("d", "xor", &["q", "en"]),
            ],
        })
        .unwrap();
        let mut sim = Simulator::new(&c, &[]);
        let out = sim.run(&[vec![true], vec![false], vec![true], vec![true]]);
        assert_eq!(out, [[false], [true], [true], [false]]);
        assert_eq!(sim.state(), [true]);
    }
}
