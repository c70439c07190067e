//! Interned symbols and the resolved symbol-substitution context.
//!
//! Symbols name the quantities index expressions range over: hardware ids,
//! induction variables, tensor dimensions, dynamic sizes and mapping
//! iterators. Interning makes them `Copy` and cheap to hash, which matters
//! because they key every table in the emission context.

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

#[derive(Default)]
struct Interner {
    names: Vec<&'static str>,
    ids: HashMap<&'static str, u32>,
}

static INTERNER: Lazy<Mutex<Interner>> = Lazy::new(|| Mutex::new(Interner::default()));

/// An interned symbol. Equality and hashing are by identity.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Sym(u32);

impl Sym {
    /// Intern `name`, returning the canonical symbol for it.
    pub fn intern(name: &str) -> Self {
        let mut interner = INTERNER.lock();
        if let Some(&id) = interner.ids.get(name) {
            return Self(id);
        }
        let leaked: &'static str = Box::leak(name.to_owned().into_boxed_str());
        let id = interner.names.len() as u32;
        interner.names.push(leaked);
        interner.ids.insert(leaked, id);
        Self(id)
    }

    pub fn name(self) -> &'static str {
        INTERNER.lock().names[self.0 as usize]
    }

    /// Thread-id symbol for a hardware axis (0..3).
    pub fn thread(axis: usize) -> Self {
        debug_assert!(axis < 3);
        Self::intern(["$t0", "$t1", "$t2"][axis])
    }

    /// Workgroup-id symbol for a hardware axis (0..3).
    pub fn workgroup(axis: usize) -> Self {
        debug_assert!(axis < 3);
        Self::intern(["$wg0", "$wg1", "$wg2"][axis])
    }
}

impl fmt::Debug for Sym {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sym({})", self.name())
    }
}

impl fmt::Display for Sym {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Compile-time resolved symbol values, produced upstream by the constraint
/// solver. Symbols found here lower to integer constants; everything else
/// must have a runtime binding in the emission context.
#[derive(Debug, Clone, Default)]
pub struct SymbolContext {
    values: HashMap<Sym, i64>,
}

impl SymbolContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, sym: Sym, value: i64) -> &mut Self {
        self.values.insert(sym, value);
        self
    }

    pub fn resolve(&self, sym: Sym) -> Option<i64> {
        self.values.get(&sym).copied()
    }

    /// Resolver closure for [`crate::expr::SymExpr::eval_const`].
    pub fn resolver(&self) -> impl Fn(Sym) -> Option<i64> + '_ {
        move |sym| self.resolve(sym)
    }
}
