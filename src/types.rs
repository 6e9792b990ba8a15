//! Interned types.
//!
//! Types are hash-consed the same way nodes are: two types are equal iff
//! they are the same address. There is no peephole engine on the type
//! side — construction is a plain intern-or-insert, plus the one special
//! case carried over from the original implementation: a one-element tuple
//! collapses to its sole member (`tuple([T]) = T`), so that `tuple` never
//! needs to special-case arity-1 call sites downstream.

use std::cell::Cell;
use std::hash::{Hash, Hasher};
use bitflags::bitflags;
use crate::htable::{Entry, HTable};

bitflags! {
  /// Floating-point relaxation flags attached to `f32`/`f64` types,
  /// gating which algebraic identities the peephole engine is allowed to
  /// apply to operations on values of that type (see `identities.rs`).
  #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
  pub struct FpFlags: u8 {
    /// Assume floating point addition/multiplication are associative.
    const ASSOCIATIVE_MATH = 0x01;
    /// Allow replacing `x / c` with `x * (1/c)`.
    const RECIPROCAL_MATH  = 0x02;
    /// Assume no operand is ever infinite.
    const FINITE_MATH      = 0x04;
    /// Assume no operand is ever NaN.
    const NO_NAN_MATH      = 0x08;
  }
}

impl FpFlags {
  pub const STRICT: FpFlags = FpFlags::empty();
  pub const RELAXED: FpFlags = FpFlags::ASSOCIATIVE_MATH
    .union(FpFlags::RECIPROCAL_MATH)
    .union(FpFlags::FINITE_MATH)
    .union(FpFlags::NO_NAN_MATH);
}

/// Primitive scalar kinds, shared between `Type` and the lexer's keyword
/// set (`i8`..`u64`, `f32`/`f64`, `bool`).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Prim {
  Bool,
  I8, I16, I32, I64,
  U8, U16, U32, U64,
  F32, F64,
}

impl Prim {
  pub fn bitwidth(self) -> u32 {
    match self {
      Prim::Bool => 1,
      Prim::I8 | Prim::U8 => 8,
      Prim::I16 | Prim::U16 => 16,
      Prim::I32 | Prim::U32 | Prim::F32 => 32,
      Prim::I64 | Prim::U64 | Prim::F64 => 64,
    }
  }
  pub fn is_signed_int(self) -> bool { matches!(self, Prim::I8 | Prim::I16 | Prim::I32 | Prim::I64) }
  pub fn is_unsigned_int(self) -> bool { matches!(self, Prim::U8 | Prim::U16 | Prim::U32 | Prim::U64) }
  pub fn is_int(self) -> bool { self.is_signed_int() || self.is_unsigned_int() }
  pub fn is_float(self) -> bool { matches!(self, Prim::F32 | Prim::F64) }
}

/// The shape of an interned type. Mirrors `TYPE_LIST` from the original
/// type system plus the `top`/`bottom` sentinels used by the peephole
/// engine for unreachable/contradictory code.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum TypeKind<'m> {
  /// The type of values that carry no information (also the result type
  /// of side-effect-only operations).
  Top,
  /// The type of unreachable code (`type_order` treats this specially,
  /// reconciling the original source's `TYPE_NORET` bookkeeping).
  Bottom,
  /// The abstract "memory" token threaded through `alloc`/`load`/`store`/
  /// `dealloc`.
  Mem,
  Prim(Prim, FpFlags),
  Ptr(&'m Type<'m>),
  /// Tuple of at least two members; `tuple([t])` collapses to `t` at
  /// construction time and never reaches this variant.
  Tuple(&'m [&'m Type<'m>]),
  Array(&'m Type<'m>),
  Struct(u32, &'m [&'m Type<'m>]),
  Fn(&'m Type<'m>, &'m Type<'m>),
  Var(u32),
}

/// An interned type. Equality and hashing for the purposes of the
/// interning table (see [`Entry`] below) only ever look at `kind`.
pub struct Type<'m> {
  pub kind: TypeKind<'m>,
  cached_hash: Cell<u32>,
}

impl<'m> Type<'m> {
  fn compute_hash(kind: &TypeKind<'m>) -> u32 {
    let mut h = std::collections::hash_map::DefaultHasher::new();
    kind.hash(&mut h);
    h.finish() as u32
  }

  pub fn is_unit(&self) -> bool { matches!(self.kind, TypeKind::Top) }

  pub fn is_prim(&self) -> bool { matches!(self.kind, TypeKind::Prim(..)) }

  pub fn is_int(&self) -> bool { matches!(self.kind, TypeKind::Prim(p, _) if p.is_int()) }

  pub fn is_float(&self) -> bool { matches!(self.kind, TypeKind::Prim(p, _) if p.is_float()) }

  pub fn is_bool(&self) -> bool { matches!(self.kind, TypeKind::Prim(Prim::Bool, _)) }

  /// Bit width of a primitive type. Panics — a programming error, not a
  /// user-facing one — on a non-primitive type.
  pub fn bitwidth(&self) -> u32 {
    match self.kind {
      TypeKind::Prim(p, _) => p.bitwidth(),
      _ => panic!("bitwidth of non-primitive type"),
    }
  }

  pub fn fp_flags(&self) -> FpFlags {
    match self.kind {
      TypeKind::Prim(p, flags) if p.is_float() => flags,
      _ => FpFlags::empty(),
    }
  }

  /// Does `self` contain `needle` anywhere in its operand tree (including
  /// itself)?
  pub fn contains(&self, needle: &Type<'m>) -> bool {
    if std::ptr::eq(self, needle) { return true; }
    self.operands().iter().any(|op| op.contains(needle))
  }

  /// Number of addressable members of a tuple/struct type; panics on any
  /// other type (a programming error — callers check the type tag first).
  pub fn member_count(&self) -> usize {
    match self.kind {
      TypeKind::Tuple(ops) | TypeKind::Struct(_, ops) => ops.len(),
      _ => panic!("member_count of non-aggregate type"),
    }
  }

  /// `i`-th member type of a tuple/struct type.
  pub fn member(&self, i: usize) -> &'m Type<'m> {
    match self.kind {
      TypeKind::Tuple(ops) | TypeKind::Struct(_, ops) => ops[i],
      _ => panic!("member of non-aggregate type"),
    }
  }

  /// Direct operand types, in source order.
  pub fn operands(&self) -> &'m [&'m Type<'m>] {
    match self.kind {
      TypeKind::Ptr(t) | TypeKind::Array(t) => std::slice::from_ref(t),
      // SAFETY note N/A: these two arms return owned-elsewhere slices;
      // Fn packs its two operands through a helper since it has no
      // natural slice representation.
      TypeKind::Tuple(ops) | TypeKind::Struct(_, ops) => ops,
      TypeKind::Fn(..) | TypeKind::Top | TypeKind::Bottom | TypeKind::Mem
      | TypeKind::Prim(..) | TypeKind::Var(_) => &[],
    }
  }

  /// "Order" of a type in the sense of `type_order` from the original
  /// type system: the nesting depth of function arrows, used to bound
  /// higher-order specialization. Function types bump the order of their
  /// domain against the codomain; `Bottom` (no-return code) is defined as
  /// having unbounded order, represented here as `u32::MAX`.
  pub fn order(&self) -> u32 {
    match self.kind {
      TypeKind::Bottom => u32::MAX,
      TypeKind::Fn(dom, codom) => {
        let dom = dom.order();
        let codom = codom.order();
        1 + if dom > codom + 1 { dom } else { codom + 1 }
      }
      _ => self.operands().iter().map(|op| op.order()).max().unwrap_or(0),
    }
  }
}

impl<'m> PartialEq for Type<'m> {
  fn eq(&self, other: &Self) -> bool { self.kind == other.kind }
}
impl<'m> Eq for Type<'m> {}

impl<'m> Entry for &'m Type<'m> {
  fn hash(&self) -> u32 { self.cached_hash.get() }
  fn matches(&self, other: &Self) -> bool { self.kind == other.kind }
}

/// Owns the interning table for a module's types.
///
/// `order` records the sequence in which types were first interned — since
/// a type's operands are always interned before the type itself, this is a
/// topological order, which the serializer relies on to write a type block
/// that loads back without any forward references.
#[derive(Default)]
pub struct TypeTable<'m> {
  table: HTable<&'m Type<'m>>,
  order: Vec<&'m Type<'m>>,
}

impl<'m> TypeTable<'m> {
  pub fn new() -> Self { Self { table: HTable::new(), order: Vec::new() } }

  /// Intern `kind`, allocating a fresh `Type` out of `arena` only on a
  /// miss.
  pub fn intern(&mut self, arena: &'m crate::arena::Arena, kind: TypeKind<'m>) -> &'m Type<'m> {
    if let TypeKind::Tuple(ops) = kind {
      if ops.len() == 1 { return ops[0]; }
    }
    let hash = Type::compute_hash(&kind);
    let probe = Type { kind, cached_hash: Cell::new(hash) };
    if let Some(existing) = self.table.find(&arena.alloc(probe)) {
      // The probe above is reused only to compute a hash/eq key; real
      // insertion below allocates the canonical copy. This double alloc
      // on a hit is the price of keeping the arena append-only and the
      // table free of raw bytes/unsafe reinterpretation.
      return existing;
    }
    let kind2 = kind;
    let ty = arena.alloc(Type { kind: kind2, cached_hash: Cell::new(hash) });
    self.table.insert(ty);
    self.order.push(ty);
    ty
  }

  pub fn len(&self) -> usize { self.table.len() }
  pub fn is_empty(&self) -> bool { self.table.is_empty() }
  pub fn iter(&self) -> impl Iterator<Item = &'m Type<'m>> + '_ { self.table.iter() }

  /// Types in first-interned (topological) order — used by the serializer.
  pub fn in_order(&self) -> &[&'m Type<'m>] { &self.order }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::arena::Arena;

  #[test]
  fn interning_returns_identical_addresses() {
    let arena = Arena::new();
    let mut types = TypeTable::new();
    let a = types.intern(&arena, TypeKind::Prim(Prim::I32, FpFlags::empty()));
    let b = types.intern(&arena, TypeKind::Prim(Prim::I32, FpFlags::empty()));
    assert!(std::ptr::eq(a, b));
    let c = types.intern(&arena, TypeKind::Prim(Prim::I64, FpFlags::empty()));
    assert!(!std::ptr::eq(a, c));
  }

  #[test]
  fn one_tuple_collapses() {
    let arena = Arena::new();
    let mut types = TypeTable::new();
    let i32_ty = types.intern(&arena, TypeKind::Prim(Prim::I32, FpFlags::empty()));
    let collapsed = types.intern(&arena, TypeKind::Tuple(arena.alloc_slice(&[i32_ty])));
    assert!(std::ptr::eq(collapsed, i32_ty));
  }

  #[test]
  fn order_of_function_types() {
    let arena = Arena::new();
    let mut types = TypeTable::new();
    let i32_ty = types.intern(&arena, TypeKind::Prim(Prim::I32, FpFlags::empty()));
    let top = types.intern(&arena, TypeKind::Top);
    let first_order = types.intern(&arena, TypeKind::Fn(i32_ty, top));
    assert_eq!(first_order.order(), 1);
    let second_order = types.intern(&arena, TypeKind::Fn(first_order, top));
    assert_eq!(second_order.order(), 2);
  }
}
