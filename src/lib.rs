//! Hash-consed, continuation-passing-style intermediate representation with
//! a construction-time peephole simplifier.
//!
//! Every node and type is interned: structurally identical values share one
//! address, so equality and hashing on a node or type reference are O(1)
//! pointer comparisons. Every typed constructor on [`module::Module`] runs a
//! small algebraic simplification pass before interning, so the graph never
//! carries a node whose value is already determined by its operands —
//! callers never need a separate "simplify" pass over their own code, only
//! over the output of rewrite passes that substitute operands in bulk (see
//! [`opt`]).

pub mod arena;
pub mod diagnostics;
pub mod htable;
pub mod lexer;
pub mod module;
pub mod node;
pub mod opt;
pub mod sched;
pub mod scope;
pub mod serialize;
pub mod types;
