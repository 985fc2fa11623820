use crate::formula::{Node, Symbol, Term, TermManager};
use giputils::hash::{GHashMap, GHashSet};
use logic_form::{cnf_lits_and, cnf_lits_or, DagCnf, Lit, Var};
use satif::Satif;
use std::{
    ops::Add,
    time::{Duration, Instant},
};

#[derive(Debug, Default, Clone, Copy)]
pub struct SolverStatistic {
    pub num_solve: usize,
    pub num_sat: usize,
    pub num_assert: usize,
    pub num_clause: usize,
    pub solve_time: Duration,
}

impl Add for SolverStatistic {
    type Output = SolverStatistic;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            num_solve: self.num_solve + rhs.num_solve,
            num_sat: self.num_sat + rhs.num_sat,
            num_assert: self.num_assert + rhs.num_assert,
            num_clause: self.num_clause + rhs.num_clause,
            solve_time: self.solve_time + rhs.solve_time,
        }
    }
}

/// Incremental assertion store over a CaDiCaL instance. Terms are lowered
/// once into a [`DagCnf`] whose new clauses are streamed into the solver;
/// scopes are activation literals that are permanently disabled on pop.
pub struct Solver {
    solver: cadical::Solver,
    /// gate relations of every encoded term; var 0 is the constant
    dag: DagCnf,
    num_loaded: usize,
    lits: GHashMap<Term, Lit>,
    vars: GHashMap<Symbol, Var>,
    asserted: GHashSet<Term>,
    scopes: Vec<Lit>,
    pub statistic: SolverStatistic,
}

impl Default for Solver {
    fn default() -> Self {
        Self::new()
    }
}

impl Solver {
    pub fn new() -> Self {
        let mut solver = cadical::Solver::new();
        // the dag numbers its variables from 1, leaving 0 for the constant
        solver.new_var();
        let mut res = Self {
            solver,
            dag: DagCnf::new(),
            num_loaded: 0,
            lits: GHashMap::new(),
            vars: GHashMap::new(),
            asserted: GHashSet::new(),
            scopes: Vec::new(),
            statistic: SolverStatistic::default(),
        };
        res.load_dag();
        res
    }

    fn new_var(&mut self) -> Var {
        self.solver.new_var();
        self.dag.new_var()
    }

    fn add_clause(&mut self, clause: &[Lit]) {
        self.statistic.num_clause += 1;
        self.solver.add_clause(clause);
    }

    /// Passes the relations added to the dag since the last call to the solver.
    fn load_dag(&mut self) {
        let cls = self.dag.cnf.clauses();
        self.statistic.num_clause += cls.len() - self.num_loaded;
        for c in cls[self.num_loaded..].iter() {
            self.solver.add_clause(c);
        }
        self.num_loaded = cls.len();
    }

    fn symbol_lit(&mut self, s: &Symbol) -> Lit {
        match self.vars.get(s) {
            Some(v) => v.lit(),
            None => {
                let v = self.new_var();
                self.vars.insert(*s, v);
                v.lit()
            }
        }
    }

    fn define(&mut self, tm: &TermManager, t: Term) -> Lit {
        let lit = |s: &Self, x: &Term| s.lits[x];
        match tm.node(t) {
            Node::Const(c) => Lit::constant(*c),
            Node::Sym(s) => self.symbol_lit(s),
            Node::Not(a) => !lit(self, a),
            Node::And(xs) | Node::Or(xs) => {
                let xs: Vec<Lit> = xs.iter().map(|x| lit(self, x)).collect();
                let n = self.new_var();
                let rel = if matches!(tm.node(t), Node::And(_)) {
                    cnf_lits_and(n.lit(), &xs)
                } else {
                    cnf_lits_or(n.lit(), &xs)
                };
                self.dag.cnf.add_clauses(rel.into_iter());
                self.dag.dep[n].extend(xs.iter().map(|x| x.var()));
                n.lit()
            }
            Node::Xor(a, b) => {
                let (a, b) = (lit(self, a), lit(self, b));
                let n = self.new_var().lit();
                self.dag.add_xor_rel(n, a, b);
                n
            }
            Node::Iff(a, b) => {
                let (a, b) = (lit(self, a), lit(self, b));
                let n = self.new_var().lit();
                self.dag.add_xnor_rel(n, a, b);
                n
            }
            Node::Ite(c, th, el) => {
                let (c, th, el) = (lit(self, c), lit(self, th), lit(self, el));
                let n = self.new_var().lit();
                self.dag.add_ite_rel(n, c, th, el);
                n
            }
        }
    }

    pub fn encode(&mut self, tm: &TermManager, t: Term) -> Lit {
        if let Some(l) = self.lits.get(&t) {
            return *l;
        }
        for n in tm.postorder(&[t]) {
            if !self.lits.contains_key(&n) {
                let l = self.define(tm, n);
                self.lits.insert(n, l);
            }
        }
        self.load_dag();
        self.lits[&t]
    }

    /// Adds `t` to the store, under the innermost scope if one is open.
    /// Top-level conjunctions are split and already asserted conjuncts
    /// skipped.
    pub fn assert(&mut self, tm: &TermManager, t: Term) {
        let mut todo = vec![t];
        while let Some(t) = todo.pop() {
            if let Node::And(xs) = tm.node(t) {
                todo.extend(xs.iter().copied());
                continue;
            }
            match self.scopes.last().copied() {
                Some(act) => {
                    let l = self.encode(tm, t);
                    self.statistic.num_assert += 1;
                    self.add_clause(&[!act, l]);
                }
                None => {
                    if !self.asserted.insert(t) {
                        continue;
                    }
                    let l = self.encode(tm, t);
                    self.statistic.num_assert += 1;
                    self.add_clause(&[l]);
                }
            }
        }
    }

    pub fn assert_all(&mut self, tm: &TermManager, ts: &[Term]) {
        for t in ts {
            self.assert(tm, *t);
        }
    }

    pub fn push(&mut self) {
        let act = self.new_var().lit();
        self.scopes.push(act);
    }

    pub fn pop(&mut self) {
        if let Some(act) = self.scopes.pop() {
            self.add_clause(&[!act]);
        }
    }

    pub fn is_sat(&mut self, tm: &TermManager, assumptions: &[Term]) -> bool {
        let mut assump: Vec<Lit> = self.scopes.clone();
        for a in assumptions {
            let l = self.encode(tm, *a);
            assump.push(l);
        }
        let start = Instant::now();
        let res = self.solver.solve(&assump);
        self.statistic.solve_time += start.elapsed();
        self.statistic.num_solve += 1;
        if res {
            self.statistic.num_sat += 1;
        }
        res
    }

    /// Model value of `s` after a satisfiable [`Solver::is_sat`]. Symbols the
    /// store never saw have no value.
    pub fn value(&mut self, s: &Symbol) -> Option<bool> {
        let v = *self.vars.get(s)?;
        self.solver.sat_value(v.lit())
    }

    #[inline]
    pub fn num_assertions(&self) -> usize {
        self.statistic.num_assert
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::WireId;

    fn sym(tm: &mut TermManager, i: usize) -> Term {
        tm.sym(Symbol::base(WireId::new(i)))
    }

    fn models_agree(tm: &mut TermManager, f: Term, vars: &[Term]) {
        for row in 0..1usize << vars.len() {
            let mut solver = Solver::new();
            let mut assump: Vec<Term> = vars
                .iter()
                .enumerate()
                .map(|(i, v)| if row >> i & 1 == 1 { *v } else { tm.not(*v) })
                .collect();
            let expect = tm.eval(f, |s| row >> s.wire.index() & 1 == 1);
            assump.push(f);
            assert_eq!(solver.is_sat(tm, &assump), expect, "row {row}");
            assump.pop();
            assump.push(tm.not(f));
            assert_eq!(solver.is_sat(tm, &assump), !expect, "row {row}");
        }
    }

    #[test]
    fn tseitin_matches_eval() {
        let mut tm = TermManager::new();
        let v: Vec<Term> = (0..3).map(|i| sym(&mut tm, i)).collect();
        let x = tm.xor(v[0], v[1]);
        let i = tm.iff(v[1], v[2]);
        let m = tm.ite(v[0], x, i);
        let a = tm.and([x, v[2]]);
        let o = tm.or([a, m]);
        for f in [x, i, m, a, o] {
            models_agree(&mut tm, f, &v);
        }
    }

    #[test]
    fn scopes_are_retracted() {
        let mut tm = TermManager::new();
        let a = sym(&mut tm, 0);
        let na = tm.not(a);
        let mut solver = Solver::new();
        solver.assert(&tm, a);
        solver.push();
        solver.assert(&tm, na);
        assert!(!solver.is_sat(&tm, &[]));
        solver.pop();
        assert!(solver.is_sat(&tm, &[]));
        assert_eq!(solver.value(&Symbol::base(WireId::new(0))), Some(true));
        assert_eq!(solver.value(&Symbol::base(WireId::new(9))), None);
    }

    #[test]
    fn constants_share_the_reserved_var() {
        let mut tm = TermManager::new();
        let (t, f) = (tm.constant(true), tm.constant(false));
        let mut solver = Solver::new();
        assert!(solver.is_sat(&tm, &[t]));
        assert!(!solver.is_sat(&tm, &[f]));
        let a = sym(&mut tm, 0);
        let x = tm.xor(a, a);
        assert_eq!(x, f);
        let b = sym(&mut tm, 1);
        let m = tm.ite(b, a, t);
        solver.assert(&tm, m);
        let nb = tm.not(b);
        assert!(solver.is_sat(&tm, &[nb]));
        let na = tm.not(a);
        assert!(!solver.is_sat(&tm, &[b, na]));
    }

    #[test]
    fn shared_terms_are_encoded_once() {
        let mut tm = TermManager::new();
        let v: Vec<Term> = (0..3).map(|i| sym(&mut tm, i)).collect();
        let x = tm.xor(v[0], v[1]);
        let a = tm.and([x, v[2]]);
        let o = tm.or([x, v[2]]);
        let mut solver = Solver::new();
        solver.encode(&tm, a);
        let n = solver.statistic.num_clause;
        solver.encode(&tm, a);
        assert_eq!(solver.statistic.num_clause, n);
        solver.encode(&tm, o);
        // only the or relation is new: two binary clauses and the long one
        assert_eq!(solver.statistic.num_clause, n + 3);
    }

    #[test]
    fn repeated_assertions_are_skipped() {
        let mut tm = TermManager::new();
        let a = sym(&mut tm, 0);
        let b = sym(&mut tm, 1);
        let ab = tm.or([a, b]);
        let both = tm.and([ab, a]);
        let mut solver = Solver::new();
        solver.assert(&tm, both);
        let n = solver.num_assertions();
        assert_eq!(n, 2);
        solver.assert(&tm, ab);
        solver.assert(&tm, both);
        assert_eq!(solver.num_assertions(), n);
    }
}
