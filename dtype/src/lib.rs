//! Element and vector types shared across the swale compiler.
//!
//! The emission backend dispatches instructions on the element type of its
//! operands (float vs. signed vs. unsigned families), so the queries here
//! (`is_float`, `is_signed`, `bits`, ...) are the load-bearing part of this
//! crate.

use std::fmt;

/// Address space a memory value lives in.
///
/// `Shared` address spaces are exactly sized: out-of-bounds access cannot
/// occur there, which lets the access synthesizer drop bounds masks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AddrSpace {
    /// Global/device memory.
    Global,
    /// Workgroup-shared (scratch) memory.
    Shared,
    /// Register memory.
    Reg,
}

/// Scalar data types (base numeric types).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, strum::AsRefStr)]
pub enum ScalarDType {
    Bool,

    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,

    Float16,
    BFloat16,
    Float32,
    Float64,

    /// Address/index computations. Lowered as a 64-bit signed integer.
    Index,
}

impl ScalarDType {
    pub const fn bytes(&self) -> usize {
        match self {
            Self::Bool => 1,
            Self::Int8 | Self::UInt8 => 1,
            Self::Int16 | Self::UInt16 => 2,
            Self::Int32 | Self::UInt32 => 4,
            Self::Int64 | Self::UInt64 => 8,
            Self::Float16 | Self::BFloat16 => 2,
            Self::Float32 => 4,
            Self::Float64 => 8,
            Self::Index => 8,
        }
    }

    pub const fn bits(&self) -> usize {
        match self {
            Self::Bool => 1,
            other => other.bytes() * 8,
        }
    }

    pub const fn is_bool(&self) -> bool {
        matches!(self, Self::Bool)
    }

    pub const fn is_signed(&self) -> bool {
        matches!(self, Self::Int8 | Self::Int16 | Self::Int32 | Self::Int64)
    }

    pub const fn is_unsigned(&self) -> bool {
        matches!(self, Self::UInt8 | Self::UInt16 | Self::UInt32 | Self::UInt64)
    }

    pub const fn is_int(&self) -> bool {
        self.is_signed() || self.is_unsigned() || matches!(self, Self::Index)
    }

    pub const fn is_float(&self) -> bool {
        matches!(self, Self::Float16 | Self::BFloat16 | Self::Float32 | Self::Float64)
    }
}

/// Data type of an SSA value: a scalar or a fixed-width vector of scalars.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DType {
    /// Scalar type (single value).
    Scalar(ScalarDType),

    /// Vector type (one lane per element).
    Vector { scalar: ScalarDType, count: usize },
}

impl From<ScalarDType> for DType {
    fn from(scalar: ScalarDType) -> Self {
        Self::Scalar(scalar)
    }
}

impl DType {
    /// Create a vector type of `count` lanes from this dtype's base scalar.
    /// A count of 1 stays scalar.
    pub fn vec(&self, count: usize) -> Self {
        if count == 1 {
            return Self::Scalar(self.base());
        }
        Self::Vector { scalar: self.base(), count }
    }

    /// Get the base scalar type (works for both scalars and vectors).
    pub fn base(&self) -> ScalarDType {
        match self {
            Self::Scalar(s) => *s,
            Self::Vector { scalar, .. } => *scalar,
        }
    }

    /// Scalar dtype with the same base element.
    pub fn scalar_dtype(&self) -> DType {
        Self::Scalar(self.base())
    }

    /// Get the lane count (1 for scalars).
    pub fn vcount(&self) -> usize {
        match self {
            Self::Vector { count, .. } => *count,
            Self::Scalar(_) => 1,
        }
    }

    pub fn is_vector(&self) -> bool {
        matches!(self, Self::Vector { .. })
    }

    pub fn bytes(&self) -> usize {
        match self {
            Self::Scalar(s) => s.bytes(),
            Self::Vector { scalar, count } => scalar.bytes() * count,
        }
    }

    pub fn is_bool(&self) -> bool {
        self.base().is_bool()
    }

    pub fn is_signed(&self) -> bool {
        self.base().is_signed()
    }

    pub fn is_unsigned(&self) -> bool {
        self.base().is_unsigned()
    }

    pub fn is_int(&self) -> bool {
        self.base().is_int()
    }

    pub fn is_float(&self) -> bool {
        self.base().is_float()
    }
}

// Convenient constructors for common scalar types
impl DType {
    pub const fn bool_() -> Self {
        Self::Scalar(ScalarDType::Bool)
    }
    pub const fn int32() -> Self {
        Self::Scalar(ScalarDType::Int32)
    }
    pub const fn int64() -> Self {
        Self::Scalar(ScalarDType::Int64)
    }
    pub const fn uint32() -> Self {
        Self::Scalar(ScalarDType::UInt32)
    }
    pub const fn float16() -> Self {
        Self::Scalar(ScalarDType::Float16)
    }
    pub const fn bfloat16() -> Self {
        Self::Scalar(ScalarDType::BFloat16)
    }
    pub const fn float32() -> Self {
        Self::Scalar(ScalarDType::Float32)
    }
    pub const fn float64() -> Self {
        Self::Scalar(ScalarDType::Float64)
    }
    pub const fn index() -> Self {
        Self::Scalar(ScalarDType::Index)
    }

    /// Vector of `count` index elements.
    pub const fn index_vec(count: usize) -> Self {
        Self::Vector { scalar: ScalarDType::Index, count }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(s) => write!(f, "{}", s.as_ref()),
            Self::Vector { scalar, count } => write!(f, "{}x{}", count, scalar.as_ref()),
        }
    }
}

/// Constant value carried by register initializers and constant instructions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstValue {
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
}

impl ConstValue {
    pub const fn zero(dtype: ScalarDType) -> Self {
        use ScalarDType::*;
        match dtype {
            Bool => Self::Bool(false),
            Int8 | Int16 | Int32 | Int64 | Index => Self::Int(0),
            UInt8 | UInt16 | UInt32 | UInt64 => Self::UInt(0),
            Float16 | BFloat16 | Float32 | Float64 => Self::Float(0.0),
        }
    }
}
