use crate::circuit::WireId;
use giputils::hash::{GHashMap, GHashSet};
use std::fmt::Display;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Term(u32);

impl Term {
    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyCopy {
    K0,
    K1,
}

impl KeyCopy {
    pub const BOTH: [KeyCopy; 2] = [KeyCopy::K0, KeyCopy::K1];

    #[inline]
    pub fn index(self) -> usize {
        match self {
            KeyCopy::K0 => 0,
            KeyCopy::K1 => 1,
        }
    }
}

/// Solver-visible name of one wire instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol {
    pub wire: WireId,
    pub copy: Option<KeyCopy>,
    pub frame: Option<u32>,
    pub dip: Option<u32>,
}

impl Symbol {
    #[inline]
    pub fn base(wire: WireId) -> Self {
        Self {
            wire,
            copy: None,
            frame: None,
            dip: None,
        }
    }
}

impl Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.wire)?;
        if let Some(c) = self.copy {
            write!(f, "_{}", c.index())?;
        }
        if let Some(t) = self.frame {
            write!(f, "@{t}")?;
        }
        if let Some(d) = self.dip {
            write!(f, "#{d}")?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Node {
    Const(bool),
    Sym(Symbol),
    Not(Term),
    And(Vec<Term>),
    Or(Vec<Term>),
    Xor(Term, Term),
    Iff(Term, Term),
    Ite(Term, Term, Term),
}

impl Node {
    pub fn operands(&self) -> Vec<Term> {
        match self {
            Node::Const(_) | Node::Sym(_) => Vec::new(),
            Node::Not(a) => vec![*a],
            Node::And(xs) | Node::Or(xs) => xs.clone(),
            Node::Xor(a, b) | Node::Iff(a, b) => vec![*a, *b],
            Node::Ite(c, t, e) => vec![*c, *t, *e],
        }
    }
}

/// Hash-consed arena of formulas. Structurally equal terms share one id.
#[derive(Clone, Debug)]
pub struct TermManager {
    nodes: Vec<Node>,
    unique: GHashMap<Node, Term>,
}

impl Default for TermManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TermManager {
    pub fn new() -> Self {
        let mut tm = Self {
            nodes: Vec::new(),
            unique: GHashMap::new(),
        };
        tm.intern(Node::Const(false));
        tm.intern(Node::Const(true));
        tm
    }

    fn intern(&mut self, node: Node) -> Term {
        if let Some(t) = self.unique.get(&node) {
            return *t;
        }
        let t = Term(self.nodes.len() as u32);
        self.nodes.push(node.clone());
        self.unique.insert(node, t);
        t
    }

    #[inline]
    pub fn node(&self, t: Term) -> &Node {
        &self.nodes[t.index()]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[inline]
    pub fn constant(&self, c: bool) -> Term {
        Term(c as u32)
    }

    #[inline]
    pub fn as_const(&self, t: Term) -> Option<bool> {
        match self.node(t) {
            Node::Const(c) => Some(*c),
            _ => None,
        }
    }

    #[inline]
    pub fn sym(&mut self, s: Symbol) -> Term {
        self.intern(Node::Sym(s))
    }

    pub fn not(&mut self, a: Term) -> Term {
        match self.node(a) {
            Node::Const(c) => self.constant(!c),
            Node::Not(x) => *x,
            _ => self.intern(Node::Not(a)),
        }
    }

    fn nary(&mut self, xs: impl IntoIterator<Item = Term>, absorb: bool) -> Term {
        let mut ops = Vec::new();
        for x in xs {
            match self.as_const(x) {
                Some(c) if c == absorb => return self.constant(absorb),
                Some(_) => (),
                None => ops.push(x),
            }
        }
        ops.sort();
        ops.dedup();
        let mut ops_set = GHashSet::new();
        ops_set.extend(ops.iter().copied());
        if ops
            .iter()
            .any(|x| matches!(self.node(*x), Node::Not(y) if ops_set.contains(y)))
        {
            return self.constant(absorb);
        }
        match ops.len() {
            0 => self.constant(!absorb),
            1 => ops[0],
            _ if absorb => self.intern(Node::Or(ops)),
            _ => self.intern(Node::And(ops)),
        }
    }

    pub fn and(&mut self, xs: impl IntoIterator<Item = Term>) -> Term {
        self.nary(xs, false)
    }

    pub fn or(&mut self, xs: impl IntoIterator<Item = Term>) -> Term {
        self.nary(xs, true)
    }

    pub fn xor(&mut self, a: Term, b: Term) -> Term {
        match (self.as_const(a), self.as_const(b)) {
            (Some(x), Some(y)) => return self.constant(x ^ y),
            (Some(false), None) => return b,
            (None, Some(false)) => return a,
            (Some(true), None) => return self.not(b),
            (None, Some(true)) => return self.not(a),
            _ => (),
        }
        if a == b {
            return self.constant(false);
        }
        self.intern(Node::Xor(a.min(b), a.max(b)))
    }

    pub fn iff(&mut self, a: Term, b: Term) -> Term {
        match (self.as_const(a), self.as_const(b)) {
            (Some(x), Some(y)) => return self.constant(x == y),
            (Some(true), None) => return b,
            (None, Some(true)) => return a,
            (Some(false), None) => return self.not(b),
            (None, Some(false)) => return self.not(a),
            _ => (),
        }
        if a == b {
            return self.constant(true);
        }
        self.intern(Node::Iff(a.min(b), a.max(b)))
    }

    pub fn ite(&mut self, c: Term, t: Term, e: Term) -> Term {
        if let Some(c) = self.as_const(c) {
            return if c { t } else { e };
        }
        if t == e {
            return t;
        }
        match (self.as_const(t), self.as_const(e)) {
            (Some(true), Some(false)) => c,
            (Some(false), Some(true)) => self.not(c),
            _ => self.intern(Node::Ite(c, t, e)),
        }
    }

    /// Every term reachable from `roots`, operands before the terms using
    /// them.
    pub fn postorder(&self, roots: &[Term]) -> Vec<Term> {
        let mut visited = GHashSet::new();
        let mut res = Vec::new();
        let mut stack: Vec<(Term, bool)> = roots.iter().rev().map(|r| (*r, false)).collect();
        while let Some((t, expanded)) = stack.pop() {
            if expanded {
                res.push(t);
                continue;
            }
            if !visited.insert(t) {
                continue;
            }
            stack.push((t, true));
            for c in self.node(t).operands().into_iter().rev() {
                if !visited.contains(&c) {
                    stack.push((c, false));
                }
            }
        }
        res
    }

    /// Rebuilds `roots` with every symbol `s` replaced by `f(s)` where it
    /// returns a term.
    pub fn substitute(
        &mut self,
        roots: &[Term],
        mut f: impl FnMut(&mut Self, &Symbol) -> Option<Term>,
    ) -> Vec<Term> {
        let mut map: GHashMap<Term, Term> = GHashMap::new();
        for t in self.postorder(roots) {
            let m = |x: &Term| map[x];
            let new = match self.node(t).clone() {
                Node::Const(_) => t,
                Node::Sym(s) => f(self, &s).unwrap_or(t),
                Node::Not(a) => {
                    let a = m(&a);
                    self.not(a)
                }
                Node::And(xs) => {
                    let xs: Vec<Term> = xs.iter().map(m).collect();
                    self.and(xs)
                }
                Node::Or(xs) => {
                    let xs: Vec<Term> = xs.iter().map(m).collect();
                    self.or(xs)
                }
                Node::Xor(a, b) => {
                    let (a, b) = (m(&a), m(&b));
                    self.xor(a, b)
                }
                Node::Iff(a, b) => {
                    let (a, b) = (m(&a), m(&b));
                    self.iff(a, b)
                }
                Node::Ite(c, x, y) => {
                    let (c, x, y) = (m(&c), m(&x), m(&y));
                    self.ite(c, x, y)
                }
            };
            map.insert(t, new);
        }
        roots.iter().map(|r| map[r]).collect()
    }

    pub fn eval(&self, t: Term, mut value: impl FnMut(&Symbol) -> bool) -> bool {
        let mut vals: GHashMap<Term, bool> = GHashMap::new();
        for n in self.postorder(&[t]) {
            let v = |x: &Term| vals[x];
            let r = match self.node(n) {
                Node::Const(c) => *c,
                Node::Sym(s) => value(s),
                Node::Not(a) => !v(a),
                Node::And(xs) => xs.iter().all(v),
                Node::Or(xs) => xs.iter().any(v),
                Node::Xor(a, b) => v(a) ^ v(b),
                Node::Iff(a, b) => v(a) == v(b),
                Node::Ite(c, x, y) => {
                    if v(c) {
                        v(x)
                    } else {
                        v(y)
                    }
                }
            };
            vals.insert(n, r);
        }
        vals[&t]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn syms(tm: &mut TermManager, n: usize) -> Vec<Term> {
        (0..n).map(|i| tm.sym(Symbol::base(WireId::new(i)))).collect()
    }

    #[test]
    fn hash_consing_and_folding() {
        let mut tm = TermManager::new();
        let v = syms(&mut tm, 2);
        let (a, b) = (v[0], v[1]);
        assert_eq!(tm.and([a, b]), tm.and([b, a, b]));
        let na = tm.not(a);
        assert_eq!(tm.not(na), a);
        assert_eq!(tm.and([a, na]), tm.constant(false));
        assert_eq!(tm.or([a, na]), tm.constant(true));
        assert_eq!(tm.xor(a, a), tm.constant(false));
        let t = tm.constant(true);
        assert_eq!(tm.xor(a, t), na);
        assert_eq!(tm.iff(b, t), b);
        let f = tm.constant(false);
        assert_eq!(tm.ite(a, t, f), a);
        assert_eq!(tm.and([]), t);
        assert_eq!(tm.or([]), f);
    }

    #[test]
    fn substitute_renames_and_folds() {
        let mut tm = TermManager::new();
        let v = syms(&mut tm, 3);
        let x = tm.xor(v[0], v[1]);
        let root = tm.and([x, v[2]]);
        let renamed = tm.substitute(&[root], |tm, s| {
            let mut s = *s;
            s.frame = Some(3);
            Some(tm.sym(s))
        })[0];
        assert_ne!(renamed, root);
        let again = tm.substitute(&[root], |tm, s| {
            let mut s = *s;
            s.frame = Some(3);
            Some(tm.sym(s))
        })[0];
        assert_eq!(renamed, again);
        let folded = tm.substitute(&[root], |tm, s| {
            (s.wire == WireId::new(2)).then(|| tm.constant(false))
        })[0];
        assert_eq!(folded, tm.constant(false));
    }

    #[test]
    fn eval_deep_chain() {
        let mut tm = TermManager::new();
        let v = syms(&mut tm, 2);
        let mut t = v[0];
        // (v0, v1) = (1, 0) and (0, 1)
        let mut expect = [true, false];
        for _ in 0..100_000 {
            t = tm.xor(t, v[1]);
            t = tm.not(t);
            for (e, b) in expect.iter_mut().zip([false, true]) {
                *e = !(*e ^ b);
            }
        }
        assert_eq!(tm.eval(t, |s| s.wire == WireId::new(0)), expect[0]);
        assert_eq!(tm.eval(t, |s| s.wire == WireId::new(1)), expect[1]);
    }
}
