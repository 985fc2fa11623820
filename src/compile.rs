use crate::{
    circuit::{Circuit, GateKind, Role, WireId},
    formula::{KeyCopy, Symbol, Term, TermManager},
};

/// Where an instantiated wire lives: which key copy, which time frame and
/// which confirmed dip it belongs to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Namespace {
    pub copy: Option<KeyCopy>,
    pub frame: Option<u32>,
    pub dip: Option<u32>,
}

impl Namespace {
    pub fn new(copy: Option<KeyCopy>, frame: usize) -> Self {
        Self {
            copy,
            frame: Some(frame as u32),
            dip: None,
        }
    }

    pub fn with_dip(self, dip: usize) -> Self {
        Self {
            dip: Some(dip as u32),
            ..self
        }
    }

    /// Keys are shared across frames and primary inputs across copies.
    pub fn bind(&self, circuit: &Circuit, wire: WireId) -> Symbol {
        let (copy, frame, dip) = match circuit.wire(wire).kind.role() {
            Role::Key => (self.copy, None, None),
            Role::Input => (None, self.frame, self.dip),
            Role::State | Role::Gate => (self.copy, self.frame, self.dip),
        };
        Symbol {
            wire,
            copy,
            frame,
            dip,
        }
    }

    pub fn sym(&self, tm: &mut TermManager, circuit: &Circuit, wire: WireId) -> Term {
        tm.sym(self.bind(circuit, wire))
    }
}

/// Per-wire formulas over base symbols of the inputs, keys and registers.
#[derive(Clone, Debug)]
pub struct Compiled {
    formulas: Vec<Term>,
}

pub fn compile(circuit: &Circuit, tm: &mut TermManager) -> Compiled {
    let mut formulas = vec![tm.constant(false); circuit.num_wires()];
    for &w in circuit.order.iter() {
        let wire = circuit.wire(w);
        let ops: Vec<Term> = wire.operands.iter().map(|o| formulas[o.index()]).collect();
        let f = match wire.kind {
            GateKind::Input | GateKind::Key | GateKind::Dff | GateKind::Latch => {
                tm.sym(Symbol::base(w))
            }
            GateKind::Const(c) => tm.constant(c),
            GateKind::Not => tm.not(ops[0]),
            GateKind::Buf => ops[0],
            GateKind::And => tm.and(ops),
            GateKind::Nand => {
                let a = tm.and(ops);
                tm.not(a)
            }
            GateKind::Or => tm.or(ops),
            GateKind::Nor => {
                let o = tm.or(ops);
                tm.not(o)
            }
            GateKind::Xor => tm.xor(ops[0], ops[1]),
            GateKind::Xnor => {
                let x = tm.xor(ops[0], ops[1]);
                tm.not(x)
            }
            GateKind::Mux => {
                let ns = tm.not(ops[0]);
                let a = tm.and([ns, ops[1]]);
                let b = tm.and([ops[0], ops[2]]);
                tm.or([a, b])
            }
        };
        formulas[w.index()] = f;
    }
    Compiled { formulas }
}

/// Compiles and instantiates every wire under `ns`.
pub fn compile_in(circuit: &Circuit, tm: &mut TermManager, ns: Namespace) -> Vec<Term> {
    let compiled = compile(circuit, tm);
    let all: Vec<WireId> = (0..circuit.num_wires()).map(WireId::new).collect();
    compiled.instantiate(circuit, tm, ns, &all)
}

impl Compiled {
    #[inline]
    pub fn formula(&self, w: WireId) -> Term {
        self.formulas[w.index()]
    }

    pub fn instantiate(
        &self,
        circuit: &Circuit,
        tm: &mut TermManager,
        ns: Namespace,
        roots: &[WireId],
    ) -> Vec<Term> {
        self.instantiate_with(circuit, tm, ns, roots, |_, _| None)
    }

    /// Like [`Compiled::instantiate`], but `bind` may pin a leaf wire to a
    /// term of its own (a constant input, say).
    pub fn instantiate_with(
        &self,
        circuit: &Circuit,
        tm: &mut TermManager,
        ns: Namespace,
        roots: &[WireId],
        mut bind: impl FnMut(&mut TermManager, WireId) -> Option<Term>,
    ) -> Vec<Term> {
        let base: Vec<Term> = roots.iter().map(|w| self.formula(*w)).collect();
        tm.substitute(&base, |tm, s| match bind(tm, s.wire) {
            Some(t) => Some(t),
            None => Some(ns.sym(tm, circuit, s.wire)),
        })
    }
}
