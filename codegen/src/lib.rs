//! Instruction emission backend for the swale kernel compiler.
//!
//! Lowers an annotated dataflow graph (operation-tagged nodes carrying
//! per-dimension symbolic index assignments) into a sequence of vector and
//! memory instructions appended to a caller-owned function body.
//!
//! # Architecture
//!
//! - [`emitter`] - Op dispatch engine: graph walk, value cache, emission context
//! - `index` - Symbolic index compiler with deferred-rational arithmetic
//! - `memory` - Memory-access synthesizer: vector vs. gather/scatter, bounds masks
//! - `ops` - Vector/scalar op lowering with element-type dispatch
//! - `control` - Reduction loop lowering with carried state
//! - [`tir`] - The target instruction representation emission appends into
//!
//! # Usage
//!
//! ```ignore
//! use swale_codegen::{Emitter, ParamBindings};
//!
//! let mut func = Func::new(&entry_params);
//! let emitter = Emitter::new(&graph, &constraints, &symbols, &dynamic, &mut func, &mut bindings);
//! let outputs = emitter.emit()?;
//! ```

mod control;
pub mod emitter;
pub mod error;
mod index;
mod memory;
mod ops;
pub mod tir;


pub use emitter::{Emitter, ParamBindings, ResolveRef};
pub use error::{Error, Result};
