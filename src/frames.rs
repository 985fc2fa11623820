use crate::{
    circuit::{Circuit, WireId},
    compile::{compile, Compiled, Namespace},
    formula::{KeyCopy, Symbol, Term, TermManager},
    options::Reset,
};
use giputils::hash::GHashMap;

/// Pins of a frame instance built for one confirmed dip.
#[derive(Clone, Copy, Debug)]
pub struct FrameBinding<'a> {
    pub dip: usize,
    pub inputs: Option<&'a [bool]>,
    pub outputs: Option<&'a [bool]>,
}

/// Time-frame expansion of one circuit. Frame 0 is the reset frame and
/// frame `t > 0` is one clock cycle whose registers hold the next state
/// computed in frame `t - 1`.
pub struct FrameManager {
    pub circuit: Circuit,
    pub tm: TermManager,
    compiled: Compiled,
    copies: Vec<Option<KeyCopy>>,
    reset: Reset,
    input_index: GHashMap<WireId, usize>,
    frames: Vec<Vec<Vec<Term>>>,
}

impl FrameManager {
    pub fn new(circuit: Circuit, copies: &[Option<KeyCopy>], reset: Reset) -> Self {
        let mut tm = TermManager::new();
        let compiled = compile(&circuit, &mut tm);
        let mut input_index = GHashMap::new();
        input_index.extend(circuit.inputs.iter().enumerate().map(|(i, w)| (*w, i)));
        Self {
            circuit,
            tm,
            compiled,
            copies: copies.to_vec(),
            reset,
            input_index,
            frames: Vec::new(),
        }
    }

    pub fn oracle(circuit: Circuit) -> Self {
        Self::new(circuit, &[None], Reset::Zero)
    }

    pub fn locked(circuit: Circuit, reset: Reset) -> Self {
        Self::new(circuit, &[Some(KeyCopy::K0), Some(KeyCopy::K1)], reset)
    }

    #[inline]
    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    /// Output and next-state values get a symbol of their own per frame,
    /// even when the wire is a primary input or a key.
    fn port(&mut self, ns: Namespace, wire: WireId) -> Term {
        self.tm.sym(Symbol {
            wire,
            copy: ns.copy,
            frame: ns.frame,
            dip: ns.dip,
        })
    }

    pub fn output_symbol(&self, copy: Option<KeyCopy>, t: usize, i: usize) -> Symbol {
        let ns = Namespace::new(copy, t);
        Symbol {
            wire: self.circuit.outputs[i],
            copy: ns.copy,
            frame: ns.frame,
            dip: None,
        }
    }

    pub fn output_sym(&mut self, copy: Option<KeyCopy>, t: usize, i: usize) -> Term {
        let s = self.output_symbol(copy, t, i);
        self.tm.sym(s)
    }

    pub fn next_sym(&mut self, copy: Option<KeyCopy>, t: usize, i: usize) -> Term {
        let n = self.circuit.next_states[i];
        self.port(Namespace::new(copy, t), n)
    }

    pub fn input_sym(&self, t: usize, i: usize) -> Symbol {
        Namespace::new(None, t).bind(&self.circuit, self.circuit.inputs[i])
    }

    pub fn key_sym(&self, copy: KeyCopy, i: usize) -> Symbol {
        Namespace::new(Some(copy), 0).bind(&self.circuit, self.circuit.keys[i])
    }

    fn build(&mut self, ns: Namespace, binding: Option<FrameBinding>) -> Vec<Term> {
        let Some(t) = ns.frame.map(|t| t as usize) else {
            return Vec::new();
        };
        let mut res = Vec::new();
        if t == 0 {
            if self.reset == Reset::Zero {
                for i in 0..self.circuit.next_states.len() {
                    let n = self.port(ns, self.circuit.next_states[i]);
                    res.push(self.tm.not(n));
                }
            }
            return res;
        }
        let outputs = self.circuit.outputs.clone();
        let next_states = self.circuit.next_states.clone();
        let mut roots = outputs.clone();
        roots.extend(next_states.iter().copied());
        let inputs = binding.and_then(|b| b.inputs);
        let input_index = &self.input_index;
        let f = self.compiled.instantiate_with(
            &self.circuit,
            &mut self.tm,
            ns,
            &roots,
            |tm, w| {
                let v = inputs?;
                input_index.get(&w).map(|i| tm.constant(v[*i]))
            },
        );
        let (f_out, f_next) = f.split_at(outputs.len());
        let pinned = binding.and_then(|b| b.outputs);
        for (i, (&o, &fo)) in outputs.iter().zip(f_out).enumerate() {
            let lhs = match pinned {
                Some(v) => self.tm.constant(v[i]),
                None => self.port(ns, o),
            };
            res.push(self.tm.iff(lhs, fo));
        }
        let prev = Namespace {
            frame: Some(t as u32 - 1),
            ..ns
        };
        for (i, (&n, &fnext)) in next_states.iter().zip(f_next).enumerate() {
            let next = self.port(ns, n);
            res.push(self.tm.iff(next, fnext));
            let state = ns.sym(&mut self.tm, &self.circuit, self.circuit.states[i]);
            let prev_next = self.port(prev, n);
            res.push(self.tm.iff(state, prev_next));
        }
        let tt = self.tm.constant(true);
        res.retain(|x| *x != tt);
        res
    }

    fn materialize(&mut self, t: usize) {
        while self.frames.len() <= t {
            let k = self.frames.len();
            let frame: Vec<Vec<Term>> = self
                .copies
                .clone()
                .into_iter()
                .map(|c| self.build(Namespace::new(c, k), None))
                .collect();
            self.frames.push(frame);
        }
    }

    /// Constraints of frame `t` for one copy, `None` if this manager does not
    /// unroll that copy. Materialized frames never change.
    pub fn frame(&mut self, t: usize, copy: Option<KeyCopy>) -> Option<&[Term]> {
        let c = self.copies.iter().position(|x| *x == copy)?;
        self.materialize(t);
        Some(&self.frames[t][c])
    }

    /// Both key copies of the locked circuit at frame `t`.
    pub fn obf_frame(&mut self, t: usize) -> Vec<Term> {
        self.materialize(t);
        self.frames[t].concat()
    }

    /// The unkeyed copy at frame `t`; `None` for a locked-circuit manager.
    pub fn oracle_frame(&mut self, t: usize) -> Option<Vec<Term>> {
        self.frame(t, None).map(<[Term]>::to_vec)
    }

    /// Frame `t` of one copy rebuilt under a fresh dip namespace, with inputs
    /// and outputs optionally pinned to constants. Never cached.
    pub fn instance(&mut self, t: usize, copy: Option<KeyCopy>, binding: FrameBinding) -> Vec<Term> {
        let ns = Namespace::new(copy, t).with_dip(binding.dip);
        self.build(ns, Some(binding))
    }

    /// Some output of the two copies differs at frame `t`.
    pub fn outputs_differ(&mut self, t: usize) -> Term {
        let diffs: Vec<Term> = (0..self.circuit.outputs.len())
            .map(|i| {
                let a = self.output_sym(Some(KeyCopy::K0), t, i);
                let b = self.output_sym(Some(KeyCopy::K1), t, i);
                self.tm.xor(a, b)
            })
            .collect();
        self.tm.or(diffs)
    }

    /// Some next-state bit of the two copies differs at frame `t`.
    pub fn next_states_differ(&mut self, t: usize) -> Term {
        let diffs: Vec<Term> = (0..self.circuit.next_states.len())
            .map(|i| {
                let a = self.next_sym(Some(KeyCopy::K0), t, i);
                let b = self.next_sym(Some(KeyCopy::K1), t, i);
                self.tm.xor(a, b)
            })
            .collect();
        self.tm.or(diffs)
    }

    /// `k0 != k1`
    pub fn key_inequality(&mut self) -> Term {
        let diffs: Vec<Term> = (0..self.circuit.keys.len())
            .map(|i| {
                let a = self.key_sym(KeyCopy::K0, i);
                let b = self.key_sym(KeyCopy::K1, i);
                let (a, b) = (self.tm.sym(a), self.tm.sym(b));
                self.tm.xor(a, b)
            })
            .collect();
        self.tm.or(diffs)
    }

    /// Excludes `key` for both copies.
    pub fn ban_key(&mut self, key: &[bool]) -> Term {
        let mut bans = Vec::new();
        for copy in KeyCopy::BOTH {
            let lits: Vec<Term> = key
                .iter()
                .enumerate()
                .map(|(i, v)| {
                    let k = self.key_sym(copy, i);
                    let k = self.tm.sym(k);
                    if *v {
                        k
                    } else {
                        self.tm.not(k)
                    }
                })
                .collect();
            let is_key = self.tm.and(lits);
            bans.push(self.tm.not(is_key));
        }
        self.tm.and(bans)
    }
}
