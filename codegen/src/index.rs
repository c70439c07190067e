//! The symbolic index compiler.
//!
//! Lowers a [`SymExpr`] to index instructions by stack-based post-order
//! evaluation. Exact fractions travel as deferred rationals, a
//! (numerator, denominator) pair of values, and are only divided when a
//! `Floor`/`Ceil` forces it, so `(t/4)*4` never rounds early.
//!
//! Rational identities used when folding operands:
//! `a + p/q = (a*q + p)/q`, `a*(p/q) = (a*p)/q`,
//! `p/q + r/s = (p*s + r*q)/(q*s)`, `(p/q)*(r/s) = (p*r)/(q*s)`.

use std::collections::HashMap;

use swale_dtype::{ConstValue, DType};
use swale_ir::{Sym, SymExpr, SymbolContext};

use crate::error::*;
use crate::tir::{BlockId, Func, Inst, Type, Value, const_index, const_scalar};

/// Everything expression lowering needs from the emission context.
pub(crate) struct IndexScope<'a> {
    pub func: &'a mut Func,
    pub block: BlockId,
    pub symbols: &'a SymbolContext,
    /// Runtime symbol bindings: hardware ids, induction variables, dynamic
    /// dimension sizes.
    pub bindings: &'a HashMap<Sym, Value>,
    /// Induction variables currently live; used to group operands that
    /// depend on them.
    pub induction_syms: &'a [Sym],
}

/// A value on the operand stack: concrete, or an undivided fraction.
#[derive(Debug, Clone, Copy)]
enum IndexValue {
    Concrete(Value),
    Rational { num: Value, den: Value },
}

impl IndexValue {
    fn is_rational(&self) -> bool {
        matches!(self, Self::Rational { .. })
    }
}

impl IndexScope<'_> {
    fn iconst(&mut self, value: i64) -> Value {
        const_index(self.func, self.block, value)
    }

    fn iota(&mut self, lanes: usize) -> Value {
        self.func.push1(
            self.block,
            Inst::ConstIndexVec { values: (0..lanes as i64).collect() },
            Type::Data(DType::index().vec(lanes)),
        )
    }

    fn splat(&mut self, value: Value, lanes: usize) -> Value {
        crate::tir::splat(self.func, self.block, value, lanes)
    }

    /// Make two operands shape-compatible: equal types pass through, a
    /// scalar next to a vector is replicated to the vector's width, two
    /// vectors of different widths cannot be combined.
    pub(crate) fn broadcast(&mut self, a: Value, b: Value) -> Result<(Value, Value)> {
        let at = self.func.dtype(a).expect("broadcast of a non-data value").clone();
        let bt = self.func.dtype(b).expect("broadcast of a non-data value").clone();
        if at == bt {
            return Ok((a, b));
        }
        if at.is_vector() && !bt.is_vector() && at.base() == bt.base() {
            let b = self.splat(b, at.vcount());
            return Ok((a, b));
        }
        if bt.is_vector() && !at.is_vector() && bt.base() == at.base() {
            let a = self.splat(a, bt.vcount());
            return Ok((a, b));
        }
        BroadcastMismatchSnafu { lhs: at, rhs: bt }.fail()
    }

    fn binop(&mut self, a: Value, b: Value, make: impl FnOnce(Value, Value) -> Inst) -> Result<Value> {
        let (a, b) = self.broadcast(a, b)?;
        let ty = Type::Data(self.func.dtype(a).expect("index operand").clone());
        Ok(self.func.push1(self.block, make(a, b), ty))
    }

    fn add(&mut self, a: Value, b: Value) -> Result<Value> {
        self.binop(a, b, |lhs, rhs| Inst::Add { lhs, rhs })
    }

    /// Multiply, eliding the instruction entirely when one side is the
    /// constant 1.
    fn mul_fold(&mut self, a: Value, b: Value) -> Result<Value> {
        if self.func.as_const_index(a) == Some(1) {
            return Ok(b);
        }
        if self.func.as_const_index(b) == Some(1) {
            return Ok(a);
        }
        self.binop(a, b, |lhs, rhs| Inst::Mul { lhs, rhs })
    }

    fn div_trunc(&mut self, a: Value, b: Value) -> Result<Value> {
        self.binop(a, b, |lhs, rhs| Inst::DivS { lhs, rhs })
    }

    fn div_ceil(&mut self, a: Value, b: Value) -> Result<Value> {
        self.binop(a, b, |lhs, rhs| Inst::CeilDivS { lhs, rhs })
    }

    fn rem(&mut self, a: Value, b: Value) -> Result<Value> {
        self.binop(a, b, |lhs, rhs| Inst::RemS { lhs, rhs })
    }

    fn bit_and(&mut self, a: Value, b: Value) -> Result<Value> {
        self.binop(a, b, |lhs, rhs| Inst::BitAnd { lhs, rhs })
    }

    fn less_than(&mut self, a: Value, b: Value) -> Result<Value> {
        let (a, b) = self.broadcast(a, b)?;
        let lanes = self.func.dtype(a).expect("index operand").vcount();
        let ty = Type::Data(DType::bool_().vec(lanes));
        Ok(self.func.push1(self.block, Inst::LtS { lhs: a, rhs: b }, ty))
    }
}

fn add_values(scope: &mut IndexScope, lhs: IndexValue, rhs: IndexValue) -> Result<IndexValue> {
    use IndexValue::*;
    match (lhs, rhs) {
        (Rational { num, den }, Concrete(c)) | (Concrete(c), Rational { num, den }) => {
            let scaled = scope.mul_fold(den, c)?;
            let num = scope.add(scaled, num)?;
            Ok(Rational { num, den })
        }
        (Rational { num: p, den: q }, Rational { num: r, den: s }) => {
            let lhs_num = scope.mul_fold(p, s)?;
            let rhs_num = scope.mul_fold(r, q)?;
            let num = scope.add(lhs_num, rhs_num)?;
            let den = scope.mul_fold(q, s)?;
            Ok(Rational { num, den })
        }
        (Concrete(a), Concrete(b)) => Ok(Concrete(scope.add(a, b)?)),
    }
}

fn mul_values(scope: &mut IndexScope, lhs: IndexValue, rhs: IndexValue) -> Result<IndexValue> {
    use IndexValue::*;
    match (lhs, rhs) {
        (Rational { num, den }, Concrete(c)) | (Concrete(c), Rational { num, den }) => {
            let num = scope.mul_fold(num, c)?;
            Ok(Rational { num, den })
        }
        (Rational { num: p, den: q }, Rational { num: r, den: s }) => {
            let num = scope.mul_fold(p, r)?;
            let den = scope.mul_fold(q, s)?;
            Ok(Rational { num, den })
        }
        (Concrete(a), Concrete(b)) => Ok(Concrete(scope.mul_fold(a, b)?)),
    }
}

/// Pop one lowered operand per entry of `args` and order them for folding:
/// when induction variables are live, more-dependent operands come first
/// (grouping them helps invariant hoisting later); rationals always fold
/// last so the non-rational prefix combines with fewer instructions.
fn pop_group(scope: &IndexScope, stack: &mut Vec<IndexValue>, args: &[SymExpr]) -> Result<Vec<IndexValue>> {
    if stack.len() < args.len() {
        return MalformedExpressionSnafu { depth: stack.len() }.fail();
    }
    let values = stack.split_off(stack.len() - args.len());

    let mut terms: Vec<(usize, IndexValue)> =
        args.iter().map(|a| a.refs_within(scope.induction_syms)).zip(values).collect();
    if !scope.induction_syms.is_empty() {
        terms.sort_by(|a, b| b.0.cmp(&a.0));
    }

    let (rationals, concretes): (Vec<_>, Vec<_>) = terms.into_iter().map(|(_, v)| v).partition(|v| v.is_rational());
    Ok(concretes.into_iter().chain(rationals).collect())
}

fn fold(
    scope: &mut IndexScope,
    values: Vec<IndexValue>,
    combine: impl Fn(&mut IndexScope, IndexValue, IndexValue) -> Result<IndexValue>,
) -> Result<IndexValue> {
    let mut iter = values.into_iter();
    let mut acc = match iter.next() {
        Some(v) => v,
        None => return MalformedExpressionSnafu { depth: 0usize }.fail(),
    };
    for v in iter {
        acc = combine(scope, acc, v)?;
    }
    Ok(acc)
}

fn pop1(stack: &mut Vec<IndexValue>) -> Result<IndexValue> {
    stack.pop().ok_or(Error::MalformedExpression { depth: 0 })
}

fn enforce_concrete(value: IndexValue, context: &'static str) -> Result<Value> {
    match value {
        IndexValue::Concrete(v) => Ok(v),
        IndexValue::Rational { .. } => RationalNotSupportedSnafu { context }.fail(),
    }
}

/// Lower `expr` to exactly one concrete value at the scope's insertion
/// point.
pub(crate) fn lower_index(scope: &mut IndexScope, expr: &SymExpr) -> Result<Value> {
    let mut stack: Vec<IndexValue> = Vec::new();

    for term in expr.post_order() {
        match term {
            SymExpr::Sym(sym) => {
                let value = if let Some(resolved) = scope.symbols.resolve(*sym) {
                    scope.iconst(resolved)
                } else if let Some(&bound) = scope.bindings.get(sym) {
                    bound
                } else {
                    return UnknownSymbolSnafu { symbol: *sym }.fail();
                };
                stack.push(IndexValue::Concrete(value));
            }
            SymExpr::Int(v) => {
                let c = scope.iconst(*v);
                stack.push(IndexValue::Concrete(c));
            }
            SymExpr::Rational(p, q) => {
                let num = scope.iconst(*p);
                let den = scope.iconst(*q);
                stack.push(IndexValue::Rational { num, den });
            }
            SymExpr::Add(args) => {
                let group = pop_group(scope, &mut stack, args)?;
                let v = fold(scope, group, add_values)?;
                stack.push(v);
            }
            SymExpr::Mul(args) => {
                let group = pop_group(scope, &mut stack, args)?;
                let v = fold(scope, group, mul_values)?;
                stack.push(v);
            }
            SymExpr::Floor(_) => {
                let v = match pop1(&mut stack)? {
                    IndexValue::Rational { num, den } => scope.div_trunc(num, den)?,
                    IndexValue::Concrete(v) => v,
                };
                stack.push(IndexValue::Concrete(v));
            }
            SymExpr::Ceil(_) => {
                let v = match pop1(&mut stack)? {
                    IndexValue::Rational { num, den } => scope.div_ceil(num, den)?,
                    IndexValue::Concrete(v) => v,
                };
                stack.push(IndexValue::Concrete(v));
            }
            SymExpr::Mod(..) => {
                let rhs = enforce_concrete(pop1(&mut stack)?, "mod")?;
                let lhs = enforce_concrete(pop1(&mut stack)?, "mod")?;
                let v = scope.rem(lhs, rhs)?;
                stack.push(IndexValue::Concrete(v));
            }
            SymExpr::Lt(..) => {
                let rhs = enforce_concrete(pop1(&mut stack)?, "less-than")?;
                let lhs = enforce_concrete(pop1(&mut stack)?, "less-than")?;
                let v = scope.less_than(lhs, rhs)?;
                stack.push(IndexValue::Concrete(v));
            }
            SymExpr::And(args) => {
                if stack.len() < args.len() {
                    return MalformedExpressionSnafu { depth: stack.len() }.fail();
                }
                let popped = stack.split_off(stack.len() - args.len());
                let mut concretes = Vec::with_capacity(popped.len());
                for v in popped {
                    concretes.push(enforce_concrete(v, "and")?);
                }
                let mut iter = concretes.into_iter();
                let mut acc = iter.next().ok_or(Error::MalformedExpression { depth: 0 })?;
                for v in iter {
                    acc = scope.bit_and(acc, v)?;
                }
                stack.push(IndexValue::Concrete(acc));
            }
            SymExpr::Bool(b) => {
                let c = const_scalar(scope.func, scope.block, ConstValue::Bool(*b), DType::bool_());
                stack.push(IndexValue::Concrete(c));
            }
            SymExpr::Iota(lanes) => {
                let v = scope.iota(*lanes);
                stack.push(IndexValue::Concrete(v));
            }
            SymExpr::Max(..) => {
                return UnsupportedExpressionSnafu { expr: term.to_string() }.fail();
            }
        }
    }

    match (stack.len(), stack.pop()) {
        (1, Some(IndexValue::Concrete(v))) => Ok(v),
        (depth, _) => MalformedExpressionSnafu { depth }.fail(),
    }
}
