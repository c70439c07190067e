//! Symbolic index expressions.
//!
//! A self-owned expression tree over loop, thread and workgroup symbols.
//! The emission backend walks these trees; nothing here depends on any
//! external algebra representation. `Rational` keeps exact fractions
//! undivided until a `Floor`/`Ceil` forces concretization, so tile
//! arithmetic like `t / 64` never loses precision early.
//!
//! `Add`, `Mul` and `And` are n-ary and flatten on construction, mirroring
//! how the upstream solver canonicalizes sums and products.

use std::fmt;
use std::ops;

use smallvec::SmallVec;

use crate::sym::Sym;

#[derive(Debug, Clone, PartialEq)]
pub enum SymExpr {
    Sym(Sym),
    Int(i64),
    /// Exact fraction `p / q`, kept undivided.
    Rational(i64, i64),
    Add(Vec<SymExpr>),
    Mul(Vec<SymExpr>),
    Mod(Box<SymExpr>, Box<SymExpr>),
    Floor(Box<SymExpr>),
    Ceil(Box<SymExpr>),
    /// Strict less-than; lowers to a 1-bit predicate.
    Lt(Box<SymExpr>, Box<SymExpr>),
    And(Vec<SymExpr>),
    Bool(bool),
    /// Per-lane vector constant `[0, 1, .., n-1]`.
    Iota(usize),
    /// Clamped bounds produced by the solver. The emitter refuses this kind.
    Max(Box<SymExpr>, Box<SymExpr>),
}

impl SymExpr {
    pub fn sym(name: &str) -> Self {
        Self::Sym(Sym::intern(name))
    }

    pub fn rational(p: i64, q: i64) -> Self {
        debug_assert!(q != 0, "rational with zero denominator");
        Self::Rational(p, q)
    }

    pub fn floor(self) -> Self {
        Self::Floor(Box::new(self))
    }

    pub fn ceil(self) -> Self {
        Self::Ceil(Box::new(self))
    }

    pub fn modulo(self, rhs: Self) -> Self {
        Self::Mod(Box::new(self), Box::new(rhs))
    }

    pub fn lt(self, rhs: Self) -> Self {
        Self::Lt(Box::new(self), Box::new(rhs))
    }

    pub fn max(self, rhs: Self) -> Self {
        Self::Max(Box::new(self), Box::new(rhs))
    }

    /// Conjunction of `preds`. Zero predicates fold to `true`, a single
    /// predicate is returned unchanged.
    pub fn and_all(preds: impl IntoIterator<Item = SymExpr>) -> Self {
        let mut terms: Vec<SymExpr> = Vec::new();
        for p in preds {
            match p {
                Self::And(inner) => terms.extend(inner),
                other => terms.push(other),
            }
        }
        match terms.len() {
            0 => Self::Bool(true),
            1 => terms.pop().unwrap(),
            _ => Self::And(terms),
        }
    }

    /// Direct children, left to right.
    pub fn children(&self) -> SmallVec<[&SymExpr; 4]> {
        match self {
            Self::Sym(_) | Self::Int(_) | Self::Rational(..) | Self::Bool(_) | Self::Iota(_) => SmallVec::new(),
            Self::Add(args) | Self::Mul(args) | Self::And(args) => args.iter().collect(),
            Self::Mod(a, b) | Self::Lt(a, b) | Self::Max(a, b) => SmallVec::from_slice(&[a.as_ref(), b.as_ref()]),
            Self::Floor(a) | Self::Ceil(a) => SmallVec::from_slice(&[a.as_ref()]),
        }
    }

    /// Iterative post-order traversal: children before parents, left to
    /// right. The emitter's operand stack relies on exactly this order.
    pub fn post_order(&self) -> Vec<&SymExpr> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(term) = stack.pop() {
            out.push(term);
            stack.extend(term.children());
        }
        out.reverse();
        out
    }

    pub fn contains(&self, sym: Sym) -> bool {
        self.post_order().iter().any(|t| matches!(t, Self::Sym(s) if *s == sym))
    }

    /// How many of `syms` occur in this expression. Used as a grouping hint
    /// when ordering operands around live induction variables.
    pub fn refs_within(&self, syms: &[Sym]) -> usize {
        syms.iter().filter(|s| self.contains(**s)).count()
    }

    /// Substitute symbols by expressions. Unlisted symbols pass through.
    pub fn subs(&self, map: &[(Sym, SymExpr)]) -> SymExpr {
        match self {
            Self::Sym(s) => map
                .iter()
                .find(|(sym, _)| sym == s)
                .map(|(_, e)| e.clone())
                .unwrap_or_else(|| self.clone()),
            Self::Int(_) | Self::Rational(..) | Self::Bool(_) | Self::Iota(_) => self.clone(),
            Self::Add(args) => Self::Add(args.iter().map(|a| a.subs(map)).collect()),
            Self::Mul(args) => Self::Mul(args.iter().map(|a| a.subs(map)).collect()),
            Self::And(args) => Self::And(args.iter().map(|a| a.subs(map)).collect()),
            Self::Mod(a, b) => Self::Mod(Box::new(a.subs(map)), Box::new(b.subs(map))),
            Self::Lt(a, b) => Self::Lt(Box::new(a.subs(map)), Box::new(b.subs(map))),
            Self::Max(a, b) => Self::Max(Box::new(a.subs(map)), Box::new(b.subs(map))),
            Self::Floor(a) => Self::Floor(Box::new(a.subs(map))),
            Self::Ceil(a) => Self::Ceil(Box::new(a.subs(map))),
        }
    }

    /// Fold to an exact rational, resolving symbols through `resolve`.
    /// `None` when any term is unresolved or inherently non-scalar (`Iota`).
    fn eval_rational(&self, resolve: &dyn Fn(Sym) -> Option<i64>) -> Option<Rat> {
        match self {
            Self::Sym(s) => resolve(*s).map(Rat::int),
            Self::Int(v) => Some(Rat::int(*v)),
            Self::Rational(p, q) => Some(Rat::new(*p as i128, *q as i128)),
            Self::Bool(b) => Some(Rat::int(*b as i64)),
            Self::Add(args) => {
                let mut acc = Rat::int(0);
                for a in args {
                    acc = acc.add(a.eval_rational(resolve)?);
                }
                Some(acc)
            }
            Self::Mul(args) => {
                let mut acc = Rat::int(1);
                for a in args {
                    acc = acc.mul(a.eval_rational(resolve)?);
                }
                Some(acc)
            }
            Self::Mod(a, b) => {
                let (a, b) = (a.eval_rational(resolve)?.as_int()?, b.eval_rational(resolve)?.as_int()?);
                if b == 0 {
                    return None;
                }
                Some(Rat::int128(a % b))
            }
            Self::Floor(a) => Some(Rat::int128(a.eval_rational(resolve)?.div_trunc())),
            Self::Ceil(a) => Some(Rat::int128(a.eval_rational(resolve)?.div_ceil())),
            Self::Lt(a, b) => {
                let (a, b) = (a.eval_rational(resolve)?.as_int()?, b.eval_rational(resolve)?.as_int()?);
                Some(Rat::int((a < b) as i64))
            }
            Self::And(args) => {
                let mut acc = 1i128;
                for a in args {
                    acc &= a.eval_rational(resolve)?.as_int()?;
                }
                Some(Rat::int128(acc))
            }
            Self::Iota(_) | Self::Max(..) => None,
        }
    }

    /// Fold to a compile-time integer if every symbol resolves and the
    /// result is integral.
    pub fn as_const(&self, resolve: &dyn Fn(Sym) -> Option<i64>) -> Option<i64> {
        let v = self.eval_rational(resolve)?.as_int()?;
        i64::try_from(v).ok()
    }
}

/// Exact fraction over i128, used only for constant folding.
#[derive(Clone, Copy)]
struct Rat {
    p: i128,
    q: i128,
}

impl Rat {
    fn int(v: i64) -> Self {
        Self { p: v as i128, q: 1 }
    }

    fn int128(v: i128) -> Self {
        Self { p: v, q: 1 }
    }

    fn new(p: i128, q: i128) -> Self {
        Self { p, q }.reduce()
    }

    fn reduce(self) -> Self {
        fn gcd(a: i128, b: i128) -> i128 {
            if b == 0 { a.abs().max(1) } else { gcd(b, a % b) }
        }
        let g = gcd(self.p, self.q);
        let sign = if self.q < 0 { -1 } else { 1 };
        Self { p: sign * self.p / g, q: sign * self.q / g }
    }

    fn add(self, rhs: Self) -> Self {
        Self::new(self.p * rhs.q + rhs.p * self.q, self.q * rhs.q)
    }

    fn mul(self, rhs: Self) -> Self {
        Self::new(self.p * rhs.p, self.q * rhs.q)
    }

    fn as_int(self) -> Option<i128> {
        (self.q == 1).then_some(self.p)
    }

    /// Truncating division, matching the signed-division instruction the
    /// emitter concretizes `Floor` with.
    fn div_trunc(self) -> i128 {
        self.p / self.q
    }

    fn div_ceil(self) -> i128 {
        let d = self.p / self.q;
        if self.p % self.q != 0 && (self.p < 0) == (self.q < 0) { d + 1 } else { d }
    }
}

impl ops::Add for SymExpr {
    type Output = SymExpr;

    fn add(self, rhs: SymExpr) -> SymExpr {
        let mut args = match self {
            Self::Add(args) => args,
            other => vec![other],
        };
        match rhs {
            Self::Add(rest) => args.extend(rest),
            other => args.push(other),
        }
        Self::Add(args)
    }
}

impl ops::Mul for SymExpr {
    type Output = SymExpr;

    fn mul(self, rhs: SymExpr) -> SymExpr {
        let mut args = match self {
            Self::Mul(args) => args,
            other => vec![other],
        };
        match rhs {
            Self::Mul(rest) => args.extend(rest),
            other => args.push(other),
        }
        Self::Mul(args)
    }
}

impl ops::Sub for SymExpr {
    type Output = SymExpr;

    fn sub(self, rhs: SymExpr) -> SymExpr {
        self + Self::Mul(vec![Self::Int(-1), rhs])
    }
}

impl From<i64> for SymExpr {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<Sym> for SymExpr {
    fn from(s: Sym) -> Self {
        Self::Sym(s)
    }
}

impl fmt::Display for SymExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(f: &mut fmt::Formatter<'_>, args: &[SymExpr], sep: &str) -> fmt::Result {
            for (i, a) in args.iter().enumerate() {
                if i > 0 {
                    f.write_str(sep)?;
                }
                write!(f, "{a}")?;
            }
            Ok(())
        }
        match self {
            Self::Sym(s) => write!(f, "{s}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Rational(p, q) => write!(f, "{p}/{q}"),
            Self::Add(args) => {
                f.write_str("(")?;
                join(f, args, " + ")?;
                f.write_str(")")
            }
            Self::Mul(args) => join(f, args, "*"),
            Self::Mod(a, b) => write!(f, "({a} mod {b})"),
            Self::Floor(a) => write!(f, "floor({a})"),
            Self::Ceil(a) => write!(f, "ceil({a})"),
            Self::Lt(a, b) => write!(f, "({a} < {b})"),
            Self::And(args) => {
                f.write_str("(")?;
                join(f, args, " & ")?;
                f.write_str(")")
            }
            Self::Bool(b) => write!(f, "{b}"),
            Self::Iota(n) => write!(f, "iota({n})"),
            Self::Max(a, b) => write!(f, "max({a}, {b})"),
        }
    }
}
