mod cycle;

use crate::{
    error::{Error, Result},
    frontend::Netlist,
};
use giputils::hash::GHashMap;
use rand::Rng;
use std::{collections::VecDeque, fmt::Display};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct WireId(u32);

impl WireId {
    #[inline]
    pub fn new(id: usize) -> Self {
        Self(id as u32)
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl Display for WireId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "w{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GateKind {
    Input,
    Key,
    Const(bool),
    Not,
    Buf,
    And,
    Nand,
    Or,
    Nor,
    Xor,
    Xnor,
    /// operands are (select, a, b): `s ? b : a`
    Mux,
    Dff,
    Latch,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    Input,
    Key,
    State,
    Gate,
}

impl GateKind {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name.to_ascii_lowercase().as_str() {
            "not" | "inv" => Self::Not,
            "buf" | "buff" => Self::Buf,
            "and" => Self::And,
            "nand" => Self::Nand,
            "or" => Self::Or,
            "nor" => Self::Nor,
            "xor" => Self::Xor,
            "xnor" => Self::Xnor,
            "mux" => Self::Mux,
            "dff" => Self::Dff,
            "lat" | "latch" => Self::Latch,
            "const0" | "gnd" => Self::Const(false),
            "const1" | "vdd" => Self::Const(true),
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Input | Self::Key => "input",
            Self::Const(false) => "const0",
            Self::Const(true) => "const1",
            Self::Not => "not",
            Self::Buf => "buf",
            Self::And => "and",
            Self::Nand => "nand",
            Self::Or => "or",
            Self::Nor => "nor",
            Self::Xor => "xor",
            Self::Xnor => "xnor",
            Self::Mux => "mux",
            Self::Dff => "dff",
            Self::Latch => "latch",
        }
    }

    #[inline]
    pub fn is_register(&self) -> bool {
        matches!(self, Self::Dff | Self::Latch)
    }

    /// Level-0 sources of the combinational graph.
    #[inline]
    pub fn is_source(&self) -> bool {
        matches!(
            self,
            Self::Input | Self::Key | Self::Const(_) | Self::Dff | Self::Latch
        )
    }

    pub fn role(&self) -> Role {
        match self {
            Self::Input => Role::Input,
            Self::Key => Role::Key,
            Self::Dff | Self::Latch => Role::State,
            _ => Role::Gate,
        }
    }

    fn arity_ok(&self, n: usize) -> bool {
        match self {
            Self::Input | Self::Key | Self::Const(_) => n == 0,
            Self::Not | Self::Buf | Self::Dff => n == 1,
            Self::Xor | Self::Xnor => n == 2,
            Self::Mux => n == 3,
            Self::And | Self::Nand | Self::Or | Self::Nor | Self::Latch => n >= 1,
        }
    }

    /// Combinational value of the gate. Registers pass their data operand
    /// through, which is the value they latch at the clock edge.
    pub fn eval(&self, ins: &[bool]) -> bool {
        match self {
            Self::Input | Self::Key => ins[0],
            Self::Const(c) => *c,
            Self::Not => !ins[0],
            Self::Buf | Self::Dff | Self::Latch => ins[0],
            Self::And => ins.iter().all(|x| *x),
            Self::Nand => !ins.iter().all(|x| *x),
            Self::Or => ins.iter().any(|x| *x),
            Self::Nor => !ins.iter().any(|x| *x),
            Self::Xor => ins[0] ^ ins[1],
            Self::Xnor => !(ins[0] ^ ins[1]),
            Self::Mux => {
                if ins[0] {
                    ins[2]
                } else {
                    ins[1]
                }
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct Wire {
    pub name: String,
    pub kind: GateKind,
    pub operands: Vec<WireId>,
    pub level: Option<u32>,
}

#[derive(Clone, Debug)]
pub struct Circuit {
    pub name: String,
    pub wires: Vec<Wire>,
    index: GHashMap<String, WireId>,
    fanouts: Vec<Vec<WireId>>,
    pub inputs: Vec<WireId>,
    pub keys: Vec<WireId>,
    pub outputs: Vec<WireId>,
    /// register outputs (`Q`)
    pub states: Vec<WireId>,
    /// register data operands (`D`), parallel to `states`
    pub next_states: Vec<WireId>,
    pub order: Vec<WireId>,
}

impl Circuit {
    pub fn load(netlist: Netlist) -> Result<Self> {
        let Netlist {
            name,
            inputs,
            outputs,
            gates,
        } = netlist;
        let mut circuit = Circuit {
            name,
            wires: Vec::new(),
            index: GHashMap::new(),
            fanouts: Vec::new(),
            inputs: Vec::new(),
            keys: Vec::new(),
            outputs: Vec::new(),
            states: Vec::new(),
            next_states: Vec::new(),
            order: Vec::new(),
        };
        for i in inputs {
            let kind = if i.contains("keyinput") {
                GateKind::Key
            } else {
                GateKind::Input
            };
            let id = circuit.add_wire(i, kind)?;
            match kind {
                GateKind::Key => circuit.keys.push(id),
                _ => circuit.inputs.push(id),
            }
        }
        let mut pending = Vec::with_capacity(gates.len());
        for g in gates {
            let Some(kind) = GateKind::from_name(&g.kind) else {
                return Err(Error::malformed(
                    &circuit.name,
                    format!("unknown gate type `{}` driving `{}`", g.kind, g.output),
                ));
            };
            if !kind.arity_ok(g.operands.len()) {
                return Err(Error::malformed(
                    &circuit.name,
                    format!(
                        "{} gate `{}` has {} operands",
                        kind.name(),
                        g.output,
                        g.operands.len()
                    ),
                ));
            }
            let id = circuit.add_wire(g.output, kind)?;
            pending.push((id, g.operands));
        }
        for (id, operands) in pending {
            let mut ops = Vec::with_capacity(operands.len());
            for o in operands.iter() {
                let Some(op) = circuit.get(o) else {
                    return Err(Error::malformed(
                        &circuit.name,
                        format!(
                            "`{}` reads undefined wire `{o}`",
                            circuit.wires[id.index()].name
                        ),
                    ));
                };
                ops.push(op);
                circuit.fanouts[op.index()].push(id);
            }
            circuit.wires[id.index()].operands = ops;
        }
        for o in outputs {
            let Some(id) = circuit.get(&o) else {
                return Err(Error::malformed(
                    &circuit.name,
                    format!("output `{o}` is never driven"),
                ));
            };
            circuit.outputs.push(id);
        }
        for (i, w) in circuit.wires.iter().enumerate() {
            if w.kind.is_register() {
                circuit.states.push(WireId::new(i));
                circuit.next_states.push(w.operands[0]);
            }
        }
        circuit.order = circuit.topological_sort()?;
        Ok(circuit)
    }

    fn add_wire(&mut self, name: String, kind: GateKind) -> Result<WireId> {
        let id = WireId::new(self.wires.len());
        if self.index.insert(name.clone(), id).is_some() {
            return Err(Error::malformed(
                &self.name,
                format!("wire `{name}` is driven twice"),
            ));
        }
        self.wires.push(Wire {
            name,
            kind,
            operands: Vec::new(),
            level: None,
        });
        self.fanouts.push(Vec::new());
        Ok(id)
    }

    /// Orders the wires so that every combinational wire follows its
    /// operands, and assigns logic levels on the way.
    pub fn topological_sort(&mut self) -> Result<Vec<WireId>> {
        let mut waiting: Vec<usize> = self.wires.iter().map(|w| w.operands.len()).collect();
        let mut queue = VecDeque::new();
        for (i, w) in self.wires.iter_mut().enumerate() {
            if w.kind.is_source() {
                w.level = Some(0);
                queue.push_back(WireId::new(i));
            } else {
                w.level = None;
            }
        }
        let mut order = Vec::with_capacity(self.wires.len());
        while let Some(w) = queue.pop_front() {
            order.push(w);
            let level = self.wires[w.index()].level.unwrap_or_default();
            for &c in self.fanouts[w.index()].iter() {
                let consumer = &mut self.wires[c.index()];
                if consumer.kind.is_source() {
                    continue;
                }
                consumer.level = Some(consumer.level.map_or(level + 1, |l| l.max(level + 1)));
                waiting[c.index()] -= 1;
                if waiting[c.index()] == 0 {
                    queue.push_back(c);
                }
            }
        }
        if order.len() < self.wires.len() {
            let stuck: Vec<WireId> = (0..self.wires.len())
                .filter(|i| waiting[*i] > 0 && !self.wires[*i].kind.is_source())
                .map(WireId::new)
                .collect();
            let wires = cycle::find(self, &stuck)
                .into_iter()
                .map(|w| self.name(w).to_string())
                .collect();
            for w in self.wires.iter_mut().filter(|w| !w.kind.is_source()) {
                w.level = None;
            }
            return Err(Error::CombinationalCycle {
                circuit: self.name.clone(),
                wires,
            });
        }
        Ok(order)
    }

    #[inline]
    pub fn wire(&self, w: WireId) -> &Wire {
        &self.wires[w.index()]
    }

    #[inline]
    pub fn name(&self, w: WireId) -> &str {
        &self.wires[w.index()].name
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<WireId> {
        self.index.get(name).copied()
    }

    #[inline]
    pub fn fanout(&self, w: WireId) -> &[WireId] {
        &self.fanouts[w.index()]
    }

    #[inline]
    pub fn has_state(&self) -> bool {
        !self.states.is_empty()
    }

    #[inline]
    pub fn num_wires(&self) -> usize {
        self.wires.len()
    }

    /// A random gate (never an input, key or constant).
    pub fn random_wire(&self, rng: &mut impl Rng) -> Option<WireId> {
        let gates: Vec<WireId> = (0..self.wires.len())
            .map(WireId::new)
            .filter(|w| {
                !matches!(
                    self.wire(*w).kind,
                    GateKind::Input | GateKind::Key | GateKind::Const(_)
                )
            })
            .collect();
        if gates.is_empty() {
            return None;
        }
        Some(gates[rng.random_range(0..gates.len())])
    }

    pub fn random_input(&self, rng: &mut impl Rng) -> Option<WireId> {
        if self.inputs.is_empty() {
            return None;
        }
        Some(self.inputs[rng.random_range(0..self.inputs.len())])
    }

    pub fn check_compatible(oracle: &Circuit, locked: &Circuit) -> Result<()> {
        if !oracle.keys.is_empty() {
            return Err(Error::CircuitMismatch(format!(
                "oracle `{}` has {} key inputs",
                oracle.name,
                oracle.keys.len()
            )));
        }
        let names = |c: &Circuit, ws: &[WireId]| -> Vec<String> {
            ws.iter().map(|w| c.name(*w).to_string()).collect()
        };
        let (oi, li) = (names(oracle, &oracle.inputs), names(locked, &locked.inputs));
        if oi != li {
            return Err(Error::CircuitMismatch(format!(
                "inputs differ: oracle {oi:?}, locked {li:?}"
            )));
        }
        let (oo, lo) = (names(oracle, &oracle.outputs), names(locked, &locked.outputs));
        if oo != lo {
            return Err(Error::CircuitMismatch(format!(
                "outputs differ: oracle {oo:?}, locked {lo:?}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::Gate;
    use rand::SeedableRng;

    fn netlist(inputs: &[&str], outputs: &[&str], gates: Vec<Gate>) -> Netlist {
        Netlist {
            name: "t".to_string(),
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
            gates,
        }
    }

    #[test]
    fn operands_precede_consumers() {
        let c = Circuit::load(netlist(
            &["a", "b", "keyinput0"],
            &["y"],
            vec![
                Gate::new("y", "or", &["n2", "q"]),
                Gate::new("n2", "xor", &["n1", "keyinput0"]),
                Gate::new("n1", "nand", &["a", "b"]),
                Gate::new("q", "dff", &["y"]),
            ],
        ))
        .unwrap();
        assert_eq!(c.keys.len(), 1);
        assert_eq!(c.inputs.len(), 2);
        let mut pos = GHashMap::new();
        pos.extend(c.order.iter().enumerate().map(|(i, w)| (*w, i)));
        for &w in c.order.iter() {
            let wire = c.wire(w);
            if wire.kind.is_source() {
                assert_eq!(wire.level, Some(0));
                continue;
            }
            let max = wire.operands.iter().map(|o| c.wire(*o).level.unwrap()).max();
            assert_eq!(wire.level, Some(max.unwrap() + 1));
            for o in wire.operands.iter() {
                assert!(pos.get(o) < pos.get(&w));
            }
        }
        assert_eq!(c.wire(c.get("y").unwrap()).level, Some(3));
        assert_eq!(c.next_states, [c.get("y").unwrap()]);
    }

    #[test]
    fn combinational_cycle_is_reported() {
        let err = Circuit::load(netlist(
            &["a"],
            &["x"],
            vec![
                Gate::new("x", "and", &["a", "z"]),
                Gate::new("y", "not", &["x"]),
                Gate::new("z", "buf", &["y"]),
                Gate::new("w", "buf", &["z"]),
            ],
        ))
        .unwrap_err();
        let Error::CombinationalCycle { wires, .. } = err else {
            panic!("unexpected {err}");
        };
        let mut sorted = wires.clone();
        sorted.sort();
        assert_eq!(sorted, ["x", "y", "z"]);
    }

    #[test]
    fn register_breaks_feedback() {
        let c = Circuit::load(netlist(
            &["a"],
            &["q"],
            vec![
                Gate::new("q", "dff", &["n"]),
                Gate::new("n", "xor", &["q", "a"]),
            ],
        ));
        assert!(c.is_ok());
    }

    #[test]
    fn malformed_netlists() {
        let cases = [
            vec![Gate::new("y", "frob", &["a"])],
            vec![Gate::new("y", "xor", &["a"])],
            vec![Gate::new("y", "and", &["a", "nowhere"])],
            vec![Gate::new("y", "buf", &["a"]), Gate::new("y", "not", &["a"])],
            vec![Gate::new("z", "buf", &["a"])],
        ];
        for gates in cases {
            let err = Circuit::load(netlist(&["a"], &["y"], gates)).unwrap_err();
            assert!(matches!(err, Error::MalformedNetlist { .. }), "{err}");
        }
    }

    #[test]
    fn mismatched_interfaces() {
        let a = Circuit::load(netlist(&["a"], &["y"], vec![Gate::new("y", "buf", &["a"])]));
        let b = Circuit::load(netlist(&["b"], &["y"], vec![Gate::new("y", "buf", &["b"])]));
        let err = Circuit::check_compatible(&a.unwrap(), &b.unwrap()).unwrap_err();
        assert!(matches!(err, Error::CircuitMismatch(_)));
    }

    #[test]
    fn random_picks_stay_in_their_role() {
        let c = Circuit::load(netlist(
            &["a", "b", "keyinput0"],
            &["y"],
            vec![
                Gate::new("one", "const1", &[]),
                Gate::new("n", "and", &["a", "one"]),
                Gate::new("y", "xor", &["n", "keyinput0"]),
            ],
        ))
        .unwrap();
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        for _ in 0..32 {
            let w = c.random_wire(&mut rng).unwrap();
            assert!(matches!(c.wire(w).kind, GateKind::And | GateKind::Xor));
            let i = c.random_input(&mut rng).unwrap();
            assert!(c.inputs.contains(&i));
        }
        let empty = Circuit::load(netlist(&[], &[], Vec::new())).unwrap();
        assert_eq!(empty.random_wire(&mut rng), None);
        assert_eq!(empty.random_input(&mut rng), None);
    }
}
