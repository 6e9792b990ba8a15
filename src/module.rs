//! The module: owns the arena, the type/node interning tables, the
//! function list, and every typed constructor — which is where the
//! peephole simplification engine lives.
//!
//! Every constructor below follows the same shape: fold constants, apply
//! algebraic identities, canonicalize operand order, and only then hand the
//! (possibly-simplified) shape to `make_node` for interning. This mirrors
//! the construction-time simplification strategy of the original node
//! builder — there is no separate simplification pass; every node is as
//! simple as it can be the moment it is built.

use std::cell::RefCell;

use crate::arena::Arena;
use crate::htable::HTable;
use crate::node::{BinOp, CmpOp, Dbg, FnFlags, Literal, Node, NodeKind};
use crate::types::{FpFlags, Prim, Type, TypeKind, TypeTable};

/// Owns the interning table for a module's nodes, plus first-interned
/// order (mirroring [`TypeTable`]) so the serializer can write nodes in an
/// order that never forward-references.
#[derive(Default)]
pub struct NodeTable<'m> {
  table: HTable<&'m Node<'m>>,
  order: Vec<&'m Node<'m>>,
}

impl<'m> NodeTable<'m> {
  pub fn new() -> Self { Self { table: HTable::new(), order: Vec::new() } }
  pub fn len(&self) -> usize { self.table.len() }
  pub fn is_empty(&self) -> bool { self.table.is_empty() }
  pub fn iter(&self) -> impl Iterator<Item = &'m Node<'m>> + '_ { self.table.iter() }
  pub fn in_order(&self) -> &[&'m Node<'m>] { &self.order }
}

/// A single compilation unit: the arena it allocates out of, and the three
/// tables (types, non-function nodes, function nodes) that index into it.
///
/// `Module` borrows its arena rather than owning it, mirroring
/// `TypeTable::intern`'s existing `&'m Arena` pattern — callers own the
/// arena and construct the module on top of it. This makes `Module`
/// effectively single-threaded (nothing here is `Sync`), which matches the
/// single-threaded, one-arena-per-compilation-unit shape of the original.
pub struct Module<'m> {
  pub arena: &'m Arena,
  types: RefCell<TypeTable<'m>>,
  nodes: RefCell<NodeTable<'m>>,
  fns: RefCell<Vec<&'m Node<'m>>>,
}

impl<'m> Module<'m> {
  pub fn new(arena: &'m Arena) -> Self {
    Self { arena, types: RefCell::new(TypeTable::new()), nodes: RefCell::new(NodeTable::new()), fns: RefCell::new(Vec::new()) }
  }

  pub fn types(&self) -> std::cell::Ref<'_, TypeTable<'m>> { self.types.borrow() }
  pub fn nodes(&self) -> std::cell::Ref<'_, NodeTable<'m>> { self.nodes.borrow() }
  pub fn fns(&self) -> std::cell::Ref<'_, Vec<&'m Node<'m>>> { self.fns.borrow() }

  // ---- types -----------------------------------------------------------

  pub fn ty(&self, kind: TypeKind<'m>) -> &'m Type<'m> { self.types.borrow_mut().intern(self.arena, kind) }
  pub fn top_ty(&self) -> &'m Type<'m> { self.ty(TypeKind::Top) }
  pub fn bottom_ty(&self) -> &'m Type<'m> { self.ty(TypeKind::Bottom) }
  pub fn mem_ty(&self) -> &'m Type<'m> { self.ty(TypeKind::Mem) }
  pub fn bool_ty(&self) -> &'m Type<'m> { self.ty(TypeKind::Prim(Prim::Bool, FpFlags::empty())) }
  pub fn prim_ty(&self, p: Prim, flags: FpFlags) -> &'m Type<'m> { self.ty(TypeKind::Prim(p, flags)) }
  pub fn ptr_ty(&self, pointee: &'m Type<'m>) -> &'m Type<'m> { self.ty(TypeKind::Ptr(pointee)) }
  pub fn array_ty(&self, elem: &'m Type<'m>) -> &'m Type<'m> { self.ty(TypeKind::Array(elem)) }
  pub fn fn_ty(&self, dom: &'m Type<'m>, codom: &'m Type<'m>) -> &'m Type<'m> { self.ty(TypeKind::Fn(dom, codom)) }
  pub fn tuple_ty(&self, members: &[&'m Type<'m>]) -> &'m Type<'m> {
    if members.is_empty() { return self.top_ty(); }
    self.ty(TypeKind::Tuple(self.arena.alloc_slice(members)))
  }
  pub fn struct_ty(&self, id: u32, members: &[&'m Type<'m>]) -> &'m Type<'m> {
    self.ty(TypeKind::Struct(id, self.arena.alloc_slice(members)))
  }

  // ---- use-list management ---------------------------------------------

  /// `register_use`: record that `user`'s operand slot `index` holds `op`.
  fn register_use(&self, op: &'m Node<'m>, user: &'m Node<'m>, index: usize) {
    op.push_use(self.arena, user, index);
  }

  /// `unregister_use`: the inverse of [`Self::register_use`].
  fn unregister_use(&self, op: &'m Node<'m>, user: &'m Node<'m>, index: usize) {
    op.remove_use(user, index);
  }

  /// `node_bind`: rebind a function's mutable body/run-condition slot,
  /// updating use-lists for the old and new operand.
  pub fn rebind_body(&self, f: &'m Node<'m>, new_body: &'m Node<'m>) {
    let ops = f.fn_ops.as_ref().expect("rebind_body on non-fn node");
    let old = ops.body.get();
    self.unregister_use(old, f, 0);
    ops.body.set(new_body);
    self.register_use(new_body, f, 0);
  }

  pub fn rebind_cond(&self, f: &'m Node<'m>, new_cond: &'m Node<'m>) {
    let ops = f.fn_ops.as_ref().expect("rebind_cond on non-fn node");
    let old = ops.cond.get();
    self.unregister_use(old, f, 1);
    ops.cond.set(new_cond);
    self.register_use(new_cond, f, 1);
  }

  /// The interning entry point shared by every non-function constructor:
  /// look the shape up, and on a hit merge in `dbg` (only if the existing
  /// node had none) rather than discard it; on a miss, copy into the arena
  /// and register a use edge for every operand.
  fn make_node(&self, kind: NodeKind<'m>, ty: &'m Type<'m>, dbg: Option<&'m Dbg<'m>>) -> &'m Node<'m> {
    let hash = Node::compute_hash(&kind, ty);
    let probe = self.arena.alloc(Node::new(kind, ty, dbg, hash));
    let mut nodes = self.nodes.borrow_mut();
    if let Some(existing) = nodes.table.find(&probe) {
      existing.set_dbg(dbg);
      return existing;
    }
    nodes.table.insert(probe);
    nodes.order.push(probe);
    drop(nodes);
    probe.for_each_operand(|i, op| self.register_use(op, probe, i));
    probe
  }

  /// Function nodes are never looked up or deduplicated — each call
  /// allocates a fresh mutable node and appends it to the insertion-ordered
  /// function list.
  #[allow(clippy::too_many_arguments)]
  pub fn mk_fn(&self, dom: &'m Type<'m>, codom: &'m Type<'m>, flags: FnFlags, dbg: Option<&'m Dbg<'m>>) -> &'m Node<'m> {
    let ty = self.fn_ty(dom, codom);
    let bottom = self.bottom_of(codom);
    let f = self.arena.alloc(Node::new_fn(flags, ty, dbg, bottom, self.lit_bool(false)));
    self.fns.borrow_mut().push(f);
    let ops = f.fn_ops.as_ref().unwrap();
    self.register_use(ops.body.get(), f, 0);
    self.register_use(ops.cond.get(), f, 1);
    f
  }

  pub fn mk_param(&self, f: &'m Node<'m>) -> &'m Node<'m> {
    let dom = match f.ty.kind { TypeKind::Fn(dom, _) => dom, _ => panic!("param of non-fn node") };
    self.make_node(NodeKind::Param(f), dom, None)
  }

  // ---- literals & sentinels ---------------------------------------------

  pub fn lit_bool(&self, v: bool) -> &'m Node<'m> { self.make_node(NodeKind::Literal(Literal::Bool(v)), self.bool_ty(), None) }

  pub fn lit_int(&self, p: Prim, value: i64) -> &'m Node<'m> {
    let lit = match p {
      Prim::I8 => Literal::I8(value as i8), Prim::I16 => Literal::I16(value as i16),
      Prim::I32 => Literal::I32(value as i32), Prim::I64 => Literal::I64(value),
      Prim::U8 => Literal::U8(value as u8), Prim::U16 => Literal::U16(value as u16),
      Prim::U32 => Literal::U32(value as u32), Prim::U64 => Literal::U64(value as u64),
      Prim::Bool => return self.lit_bool(value != 0),
      Prim::F32 | Prim::F64 => panic!("lit_int on a float prim"),
    };
    self.make_node(NodeKind::Literal(lit), self.prim_ty(p, FpFlags::empty()), None)
  }

  pub fn lit_f32(&self, v: f32, flags: FpFlags) -> &'m Node<'m> {
    self.make_node(NodeKind::Literal(Literal::f32(v)), self.prim_ty(Prim::F32, flags), None)
  }
  pub fn lit_f64(&self, v: f64, flags: FpFlags) -> &'m Node<'m> {
    self.make_node(NodeKind::Literal(Literal::f64(v)), self.prim_ty(Prim::F64, flags), None)
  }

  pub fn unit(&self) -> &'m Node<'m> { self.make_node(NodeKind::Top, self.top_ty(), None) }

  /// `node_bottom`: the canonical contradiction value of type `ty`. For
  /// aggregate types this recurses into each member, matching the original
  /// so that a bottom tuple prints/compares the same way a bottom scalar
  /// does — there is exactly one bottom node per type.
  pub fn bottom_of(&self, ty: &'m Type<'m>) -> &'m Node<'m> {
    match ty.kind {
      TypeKind::Tuple(members) => {
        let ops: Vec<_> = members.iter().map(|m| self.bottom_of(m)).collect();
        self.make_node(NodeKind::Tuple(self.arena.alloc_slice(&ops)), ty, None)
      }
      _ => self.make_node(NodeKind::Bottom, ty, None),
    }
  }

  pub fn zero(&self, p: Prim) -> &'m Node<'m> {
    match p {
      Prim::Bool => self.lit_bool(false),
      Prim::F32 => self.lit_f32(0.0, FpFlags::empty()),
      Prim::F64 => self.lit_f64(0.0, FpFlags::empty()),
      _ => self.lit_int(p, 0),
    }
  }
  pub fn one(&self, p: Prim) -> &'m Node<'m> {
    match p {
      Prim::Bool => self.lit_bool(true),
      Prim::F32 => self.lit_f32(1.0, FpFlags::empty()),
      Prim::F64 => self.lit_f64(1.0, FpFlags::empty()),
      _ => self.lit_int(p, 1),
    }
  }
  pub fn all_ones(&self, p: Prim) -> &'m Node<'m> {
    match p {
      Prim::Bool => self.lit_bool(true),
      Prim::I8 => self.lit_int(p, -1), Prim::I16 => self.lit_int(p, -1),
      Prim::I32 => self.lit_int(p, -1), Prim::I64 => self.lit_int(p, -1),
      Prim::U8 => self.lit_int(p, u8::MAX as i64), Prim::U16 => self.lit_int(p, u16::MAX as i64),
      Prim::U32 => self.lit_int(p, u32::MAX as i64), Prim::U64 => self.lit_int(p, -1i64),
      Prim::F32 | Prim::F64 => panic!("all_ones of a float prim"),
    }
  }

  // ---- aggregates --------------------------------------------------------

  /// `try_fold_tuple` + `node_tuple`: a tuple of `n` extracts of the same
  /// base value at indices `0..n` collapses back to that base value. A
  /// one-element tuple collapses to its element; a zero-element tuple is
  /// the canonical unit.
  pub fn tuple(&self, elems: &[&'m Node<'m>]) -> &'m Node<'m> {
    if elems.is_empty() { return self.unit(); }
    if elems.len() == 1 { return elems[0]; }
    if let NodeKind::Extract(base, idx0) = elems[0].kind {
      if idx0.is_literal() && idx0.literal().as_u64() == 0 {
        let matches = elems.iter().enumerate().all(|(i, e)| {
          matches!(e.kind, NodeKind::Extract(b, idx) if std::ptr::eq(b, base) && idx.is_literal() && idx.literal().as_u64() == i as u64)
        });
        if matches && base.ty.member_count() == elems.len() { return base; }
      }
    }
    let tys: Vec<_> = elems.iter().map(|e| e.ty).collect();
    let ty = self.tuple_ty(&tys);
    self.make_node(NodeKind::Tuple(self.arena.alloc_slice(elems)), ty, None)
  }

  pub fn array(&self, elems: &[&'m Node<'m>], elem_ty: &'m Type<'m>) -> &'m Node<'m> {
    let ty = self.array_ty(elem_ty);
    self.make_node(NodeKind::Array(self.arena.alloc_slice(elems)), ty, None)
  }

  pub fn strukt(&self, value: &'m Node<'m>, ty: &'m Type<'m>) -> &'m Node<'m> {
    self.make_node(NodeKind::Struct(value), ty, None)
  }

  /// `node_extract`: index into a tuple/struct/array value, folding through
  /// a matching literal index and through an immediately preceding
  /// `insert` at a different (literal) index.
  pub fn extract(&self, value: &'m Node<'m>, index: &'m Node<'m>) -> &'m Node<'m> {
    if value.ty.is_unit() { return self.unit(); }
    if value.ty.kind == TypeKind::Bottom { return self.bottom_of(self.extract_ty(value.ty, index)); }

    if let (NodeKind::Insert(base, idx2, elem), true) = (value.kind, index.is_literal()) {
      if idx2.is_literal() {
        if idx2.literal().as_u64() == index.literal().as_u64() { return elem; }
        return self.extract(base, index);
      }
    }

    let ty = self.extract_ty(value.ty, index);

    match value.kind {
      NodeKind::Tuple(ops) if index.is_literal() => return ops[index.literal().as_u64() as usize],
      NodeKind::Array(ops) if index.is_literal() => {
        let i = index.literal().as_u64() as usize;
        if i < ops.len() { return ops[i]; }
      }
      NodeKind::Struct(base) if index.is_literal() => return self.extract(base, index),
      _ => {}
    }

    self.make_node(NodeKind::Extract(value, index), ty, None)
  }

  fn extract_ty(&self, value_ty: &'m Type<'m>, index: &'m Node<'m>) -> &'m Type<'m> {
    match value_ty.kind {
      TypeKind::Array(elem) => elem,
      TypeKind::Tuple(..) | TypeKind::Struct(..) => {
        if index.is_literal() {
          let i = index.literal().as_u64() as usize;
          if i < value_ty.member_count() { return value_ty.member(i); }
        }
        value_ty
      }
      _ => value_ty,
    }
  }

  /// `node_insert`: replace the member at `index` with `elem`, rebuilding
  /// the containing tuple/struct when both the base and the index are
  /// known, or propagating bottom.
  pub fn insert(&self, value: &'m Node<'m>, index: &'m Node<'m>, elem: &'m Node<'m>) -> &'m Node<'m> {
    if value.ty.kind == TypeKind::Bottom { return self.bottom_of(value.ty); }

    if index.is_literal() {
      let i = index.literal().as_u64() as usize;
      match value.kind {
        NodeKind::Tuple(ops) => {
          let mut new_ops: Vec<_> = ops.to_vec();
          if i < new_ops.len() { new_ops[i] = elem; return self.tuple(&new_ops); }
        }
        NodeKind::Array(ops) => {
          let mut new_ops: Vec<_> = ops.to_vec();
          if i < new_ops.len() { new_ops[i] = elem; return self.array(&new_ops, value.ty.operands()[0]); }
        }
        _ => {}
      }
    }

    self.make_node(NodeKind::Insert(value, index, elem), value.ty, None)
  }

  // ---- conversions --------------------------------------------------------

  pub fn bitcast(&self, value: &'m Node<'m>, ty: &'m Type<'m>) -> &'m Node<'m> {
    if std::ptr::eq(value.ty, ty) { return value; }
    if let NodeKind::Bitcast(inner) = value.kind { return self.bitcast(inner, ty); }
    if value.ty.kind == TypeKind::Bottom { return self.bottom_of(ty); }
    self.make_node(NodeKind::Bitcast(value), ty, None)
  }

  /// `node_extend`: widen an integer, preserving sign for signed sources.
  pub fn extend(&self, value: &'m Node<'m>, to: Prim) -> &'m Node<'m> {
    if value.ty.kind == TypeKind::Bottom { return self.bottom_of(self.prim_ty(to, FpFlags::empty())); }
    if value.is_literal() {
      let signed = match value.ty.kind { TypeKind::Prim(p, _) => p.is_signed_int(), _ => false };
      let v = if signed { value.literal().as_i64() } else { value.literal().as_u64() as i64 };
      return self.lit_int(to, v);
    }
    self.make_node(NodeKind::Extend(value), self.prim_ty(to, FpFlags::empty()), None)
  }

  /// `node_trunc`: narrow an integer; `trunc(extend(x, w), orig_w) == x`.
  pub fn trunc(&self, value: &'m Node<'m>, to: Prim) -> &'m Node<'m> {
    if value.ty.kind == TypeKind::Bottom { return self.bottom_of(self.prim_ty(to, FpFlags::empty())); }
    if let NodeKind::Extend(inner) = value.kind {
      if std::ptr::eq(inner.ty, self.prim_ty(to, FpFlags::empty())) { return inner; }
    }
    if value.is_literal() {
      let v = value.literal().as_i64();
      return self.lit_int(to, v);
    }
    self.make_node(NodeKind::Trunc(value), self.prim_ty(to, FpFlags::empty()), None)
  }

  pub fn itof(&self, value: &'m Node<'m>, to: Prim, flags: FpFlags) -> &'m Node<'m> {
    let ty = self.prim_ty(to, flags);
    if value.ty.kind == TypeKind::Bottom { return self.bottom_of(ty); }
    if value.is_literal() {
      let v = value.literal().as_f64();
      return match to { Prim::F32 => self.lit_f32(v as f32, flags), Prim::F64 => self.lit_f64(v, flags), _ => unreachable!() };
    }
    self.make_node(NodeKind::Itof(value), ty, None)
  }

  pub fn ftoi(&self, value: &'m Node<'m>, to: Prim) -> &'m Node<'m> {
    let ty = self.prim_ty(to, FpFlags::empty());
    if value.ty.kind == TypeKind::Bottom { return self.bottom_of(ty); }
    if value.is_literal() {
      let v = value.literal().as_f64();
      return self.lit_int(to, v as i64);
    }
    self.make_node(NodeKind::Ftoi(value), ty, None)
  }

  // ---- canonicalization helpers -------------------------------------------

  fn prim_of(n: &Node) -> Prim { match n.ty.kind { TypeKind::Prim(p, _) => p, _ => panic!("non-prim operand") } }

  /// `node_should_switch_ops`: canonical operand order for a commutative
  /// op — literals sort left, otherwise order by arena address. Used both
  /// to pick a canonical shape and, via `can_switch_comparands`, to decide
  /// whether a comparison may be flipped.
  fn should_switch(a: &'m Node<'m>, b: &'m Node<'m>) -> bool {
    match (a.is_literal(), b.is_literal()) {
      (false, true) => true,
      (true, false) => false,
      _ => (a as *const Node as usize) > (b as *const Node as usize),
    }
  }

  fn fold_cmp(op: CmpOp, a: Literal, b: Literal, signed: bool) -> bool {
    if signed {
      let (x, y) = (a.as_i64(), b.as_i64());
      match op { CmpOp::Gt => x > y, CmpOp::Ge => x >= y, CmpOp::Lt => x < y, CmpOp::Le => x <= y, CmpOp::Ne => x != y, CmpOp::Eq => x == y }
    } else {
      let (x, y) = (a.as_u64(), b.as_u64());
      match op { CmpOp::Gt => x > y, CmpOp::Ge => x >= y, CmpOp::Lt => x < y, CmpOp::Le => x <= y, CmpOp::Ne => x != y, CmpOp::Eq => x == y }
    }
  }

  /// `make_cmpop`: constant-fold, canonicalize operand order (flipping the
  /// relation when doing so), and apply the small set of identities that
  /// hold regardless of operand values (`x cmp x`, `0 > x`/`0 <= x` on an
  /// unsigned `x`).
  pub fn cmp(&self, op: CmpOp, a: &'m Node<'m>, b: &'m Node<'m>) -> &'m Node<'m> {
    if a.ty.kind == TypeKind::Bottom || b.ty.kind == TypeKind::Bottom { return self.bottom_of(self.bool_ty()); }
    let p = Self::prim_of(a);

    if a.is_literal() && b.is_literal() {
      return self.lit_bool(Self::fold_cmp(op, a.literal(), b.literal(), p.is_signed_int()));
    }

    if std::ptr::eq(a, b) {
      return self.lit_bool(matches!(op, CmpOp::Ge | CmpOp::Le | CmpOp::Eq));
    }

    if p.is_unsigned_int() && a.is_zero() {
      match op {
        CmpOp::Gt => return self.lit_bool(false),
        CmpOp::Le => return self.lit_bool(true),
        _ => {}
      }
    }

    if Self::should_switch(a, b) {
      return self.cmp(op.swapped(), b, a);
    }

    self.make_node(NodeKind::Cmp(op, a, b), self.bool_ty(), None)
  }

  fn fold_binop(op: BinOp, p: Prim, a: Literal, b: Literal) -> Literal {
    if p.is_float() {
      let (x, y) = (a.as_f64(), b.as_f64());
      let r = match op {
        BinOp::Add => x + y, BinOp::Sub => x - y, BinOp::Mul => x * y, BinOp::Div => x / y,
        BinOp::Rem => x % y, _ => panic!("non-arith binop on float"),
      };
      return match p { Prim::F32 => Literal::f32(r as f32), Prim::F64 => Literal::f64(r), _ => unreachable!() };
    }
    let w = p.bitwidth();
    let mask = |v: i64| if w >= 64 { v } else { v & ((1i64 << w) - 1) };
    if p.is_signed_int() {
      let (x, y) = (a.as_i64(), b.as_i64());
      let r = match op {
        BinOp::Add => x.wrapping_add(y), BinOp::Sub => x.wrapping_sub(y), BinOp::Mul => x.wrapping_mul(y),
        BinOp::Div => if y == 0 { 0 } else { x.wrapping_div(y) }, BinOp::Rem => if y == 0 { 0 } else { x.wrapping_rem(y) },
        BinOp::And => x & y, BinOp::Or => x | y, BinOp::Xor => x ^ y,
        BinOp::Lshft => x.wrapping_shl(y as u32), BinOp::Rshft => x.wrapping_shr(y as u32),
      };
      let r = mask(r);
      return Self::int_literal(p, r);
    }
    let (x, y) = (a.as_u64(), b.as_u64());
    let r = match op {
      BinOp::Add => x.wrapping_add(y), BinOp::Sub => x.wrapping_sub(y), BinOp::Mul => x.wrapping_mul(y),
      BinOp::Div => if y == 0 { 0 } else { x.wrapping_div(y) }, BinOp::Rem => if y == 0 { 0 } else { x.wrapping_rem(y) },
      BinOp::And => x & y, BinOp::Or => x | y, BinOp::Xor => x ^ y,
      BinOp::Lshft => x.wrapping_shl(y as u32), BinOp::Rshft => x.wrapping_shr(y as u32),
    };
    Self::int_literal(p, r as i64)
  }

  fn int_literal(p: Prim, v: i64) -> Literal {
    match p {
      Prim::I8 => Literal::I8(v as i8), Prim::I16 => Literal::I16(v as i16), Prim::I32 => Literal::I32(v as i32), Prim::I64 => Literal::I64(v),
      Prim::U8 => Literal::U8(v as u8), Prim::U16 => Literal::U16(v as u16), Prim::U32 => Literal::U32(v as u32), Prim::U64 => Literal::U64(v as u64),
      Prim::Bool => Literal::Bool(v != 0),
      Prim::F32 | Prim::F64 => unreachable!(),
    }
  }

  /// `make_binop`: the core peephole function. Constant-folds, propagates
  /// bottom, canonicalizes commutative operand order, and applies the
  /// identity/absorption/cancellation/factorization/implication rules
  /// described over each operator family.
  pub fn binop(&self, op: BinOp, a: &'m Node<'m>, b: &'m Node<'m>) -> &'m Node<'m> {
    let ty = a.ty;
    if a.ty.kind == TypeKind::Bottom || b.ty.kind == TypeKind::Bottom { return self.bottom_of(ty); }
    let p = Self::prim_of(a);

    if a.is_literal() && b.is_literal() {
      return self.make_node(NodeKind::Literal(Self::fold_binop(op, p, a.literal(), b.literal())), ty, None);
    }

    // `~(a cmp b)` when xor-ing with all-ones and the other side is a
    // comparison: rewrite to the negated comparison directly.
    if op == BinOp::Xor {
      if a.is_all_ones() && b.is_cmp() {
        if let NodeKind::Cmp(cop, x, y) = b.kind { return self.cmp(cop.negated(), x, y); }
      }
      if b.is_all_ones() && a.is_cmp() {
        if let NodeKind::Cmp(cop, x, y) = a.kind { return self.cmp(cop.negated(), x, y); }
      }
    }

    if op.is_commutative() && Self::should_switch(a, b) {
      return self.binop(op, b, a);
    }

    if std::ptr::eq(a, b) {
      match op {
        BinOp::Sub | BinOp::Xor => return self.zero(p),
        BinOp::And | BinOp::Or => return a,
        _ => {}
      }
    }

    if b.is_zero() {
      match op {
        BinOp::Add | BinOp::Sub | BinOp::Or | BinOp::Xor | BinOp::Lshft | BinOp::Rshft => return a,
        BinOp::Mul => return self.zero(p),
        _ => {}
      }
    }
    if a.is_zero() && op.is_commutative() {
      match op { BinOp::Add | BinOp::Or | BinOp::Xor => return b, BinOp::Mul | BinOp::And => return self.zero(p), _ => {} }
    }
    if b.is_one() && op == BinOp::Mul { return a; }
    if a.is_one() && op == BinOp::Mul { return b; }
    if b.is_all_ones() {
      match op { BinOp::And => return a, BinOp::Or => return self.all_ones(p), _ => {} }
    }
    if a.is_all_ones() && op.is_commutative() {
      match op { BinOp::And => return b, BinOp::Or => return self.all_ones(p), _ => {} }
    }

    // Absorption: a & (a|b) = a, a | (a&b) = a, both operand orders.
    if op == BinOp::And {
      if let NodeKind::Binop(BinOp::Or, l, r) = b.kind { if std::ptr::eq(l, a) || std::ptr::eq(r, a) { return a; } }
      if let NodeKind::Binop(BinOp::Or, l, r) = a.kind { if std::ptr::eq(l, b) || std::ptr::eq(r, b) { return b; } }
    }
    if op == BinOp::Or {
      if let NodeKind::Binop(BinOp::And, l, r) = b.kind { if std::ptr::eq(l, a) || std::ptr::eq(r, a) { return a; } }
      if let NodeKind::Binop(BinOp::And, l, r) = a.kind { if std::ptr::eq(l, b) || std::ptr::eq(r, b) { return b; } }
    }
    // Cancellation: a ^ (a^b) = b, both orders.
    if op == BinOp::Xor {
      if let NodeKind::Binop(BinOp::Xor, l, r) = b.kind {
        if std::ptr::eq(l, a) { return r; }
        if std::ptr::eq(r, a) { return l; }
      }
      if let NodeKind::Binop(BinOp::Xor, l, r) = a.kind {
        if std::ptr::eq(l, b) { return r; }
        if std::ptr::eq(r, b) { return l; }
      }
    }

    // Factorization: distribute a shared factor out of `(l1 op1 l2) op
    // (r1 op1 r2)` when `op1` distributes over `op`.
    if let (NodeKind::Binop(op1, l1, l2), NodeKind::Binop(op2, r1, r2)) = (a.kind, b.kind) {
      if op1 == op2 && Self::is_distributive(op1, op) {
        if std::ptr::eq(l1, r1) { return self.binop(op1, l1, self.binop(op, l2, r2)); }
        if std::ptr::eq(l2, r2) { return self.binop(op1, self.binop(op, l1, r1), l2); }
        if op1.is_commutative() {
          if std::ptr::eq(l1, r2) { return self.binop(op1, l1, self.binop(op, l2, r1)); }
          if std::ptr::eq(l2, r1) { return self.binop(op1, self.binop(op, l1, r2), l2); }
        }
      }
    }

    // Factorization, bare-operand case: one side is already `K · v`, the
    // other is the bare value `v` standing for `1 · v`. `v + K·v = (K+1)·v`
    // and the mirror image for the other operand order.
    if Self::is_distributive(BinOp::Mul, op) {
      if let NodeKind::Binop(BinOp::Mul, m1, m2) = b.kind {
        let one = self.one(p);
        if std::ptr::eq(a, m2) { return self.binop(BinOp::Mul, self.binop(op, one, m1), a); }
        if std::ptr::eq(a, m1) { return self.binop(BinOp::Mul, self.binop(op, one, m2), a); }
      }
      if let NodeKind::Binop(BinOp::Mul, m1, m2) = a.kind {
        let one = self.one(p);
        if std::ptr::eq(b, m2) { return self.binop(BinOp::Mul, self.binop(op, m1, one), b); }
        if std::ptr::eq(b, m1) { return self.binop(BinOp::Mul, self.binop(op, m2, one), b); }
      }
    }

    // Boolean-implication simplification: `a & b` is `a` if `a => b`, and
    // `a | b` is `b` if `a => b` (and symmetrically).
    if ty.is_bool() && (op == BinOp::And || op == BinOp::Or) {
      if op == BinOp::And {
        if self.implies(a, b) { return a; }
        if self.implies(b, a) { return b; }
      } else {
        if self.implies(a, b) { return b; }
        if self.implies(b, a) { return a; }
      }
    }

    self.make_node(NodeKind::Binop(op, a, b), ty, None)
  }

  fn is_distributive(inner: BinOp, outer: BinOp) -> bool {
    matches!((inner, outer), (BinOp::Mul, BinOp::Add) | (BinOp::Mul, BinOp::Sub) | (BinOp::And, BinOp::Or) | (BinOp::Or, BinOp::And))
  }

  pub fn not(&self, a: &'m Node<'m>) -> &'m Node<'m> { self.binop(BinOp::Xor, self.all_ones(Self::prim_of(a)), a) }

  /// `node_implies`: a sound-but-incomplete structural entailment check —
  /// does `a` being true guarantee `b` is true? Distributes De Morgan-style
  /// over and/or/xor on either side, then falls back to relational base
  /// cases over shared right operands.
  pub fn implies(&self, a: &'m Node<'m>, b: &'m Node<'m>) -> bool {
    if std::ptr::eq(a, b) { return true; }

    if let NodeKind::Binop(BinOp::And, l, r) = a.kind {
      if self.implies(l, b) || self.implies(r, b) { return true; }
    }
    if let NodeKind::Binop(BinOp::Or, l, r) = b.kind {
      if self.implies(a, l) || self.implies(a, r) { return true; }
    }
    if let NodeKind::Binop(BinOp::Or, l, r) = a.kind {
      if self.implies(l, b) && self.implies(r, b) { return true; }
    }
    if let NodeKind::Binop(BinOp::And, l, r) = b.kind {
      if self.implies(a, l) && self.implies(a, r) { return true; }
    }

    if let (NodeKind::Cmp(op_a, x1, y1), NodeKind::Cmp(op_b, x2, y2)) = (a.kind, b.kind) {
      if std::ptr::eq(y1, y2) {
        if std::ptr::eq(x1, x2) {
          return Self::cmp_implies_same_operands(op_a, op_b);
        }
        if op_a == op_b && x1.is_literal() && x2.is_literal() {
          return Self::cmp_implies_same_op_literal(op_a, x1.literal(), x2.literal(), Self::prim_of(y1));
        }
      }
    }
    false
  }

  fn cmp_implies_same_operands(a: CmpOp, b: CmpOp) -> bool {
    use CmpOp::*;
    match (a, b) {
      (Gt, Ge) | (Lt, Le) | (Eq, Le) | (Eq, Ge) | (Gt, Ne) | (Lt, Ne) => true,
      _ => a == b,
    }
  }

  fn literal_le(p: Prim, a: Literal, b: Literal) -> bool {
    if p.is_float() { a.as_f64() <= b.as_f64() }
    else if p.is_signed_int() { a.as_i64() <= b.as_i64() }
    else { a.as_u64() <= b.as_u64() }
  }

  /// Same-operator relational entailment over a shared right operand with
  /// two distinct literal left operands, i.e. `Cmp(op, k1, y) => Cmp(op, k2, y)`.
  /// `Gt`/`Ge` read as `x < k`/`x <= k`: a smaller `k` is the stronger claim.
  /// `Lt`/`Le` read as `x > k`/`x >= k`: a larger `k` is the stronger claim.
  fn cmp_implies_same_op_literal(op: CmpOp, k1: Literal, k2: Literal, p: Prim) -> bool {
    match op {
      CmpOp::Gt | CmpOp::Ge => Self::literal_le(p, k1, k2),
      CmpOp::Lt | CmpOp::Le => Self::literal_le(p, k2, k1),
      CmpOp::Eq | CmpOp::Ne => false,
    }
  }

  // ---- memory --------------------------------------------------------------

  pub fn alloc(&self, mem: &'m Node<'m>, elem_ty: &'m Type<'m>) -> &'m Node<'m> {
    let ty = self.tuple_ty(&[self.mem_ty(), self.ptr_ty(elem_ty)]);
    self.make_node(NodeKind::Alloc(mem), ty, None)
  }

  /// `node_dealloc`: asserts the pointer traces back to a matching
  /// `alloc` — a programming-error check, matching the original's
  /// `assert`.
  pub fn dealloc(&self, mem: &'m Node<'m>, ptr: &'m Node<'m>) -> &'m Node<'m> {
    if let NodeKind::Extract(base, idx) = ptr.kind {
      debug_assert!(matches!(base.kind, NodeKind::Alloc(_)) && idx.is_literal() && idx.literal().as_u64() == 1,
        "dealloc on a pointer not traced to a matching alloc");
    }
    self.make_node(NodeKind::Dealloc(mem, ptr), self.mem_ty(), None)
  }

  /// `node_load`: folds away entirely when the pointee type carries no
  /// information.
  pub fn load(&self, mem: &'m Node<'m>, ptr: &'m Node<'m>, pointee: &'m Type<'m>) -> &'m Node<'m> {
    if pointee.is_unit() {
      let unit = self.unit();
      return self.tuple(&[mem, unit]);
    }
    let ty = self.tuple_ty(&[self.mem_ty(), pointee]);
    self.make_node(NodeKind::Load(mem, ptr), ty, None)
  }

  /// `node_store`: storing a unit value is a no-op — the memory token
  /// passes through unchanged.
  pub fn store(&self, mem: &'m Node<'m>, ptr: &'m Node<'m>, value: &'m Node<'m>) -> &'m Node<'m> {
    if value.ty.is_unit() { return mem; }
    self.make_node(NodeKind::Store(mem, ptr, value), self.mem_ty(), None)
  }

  /// `node_known`: folds to `true` for any constant value.
  pub fn known(&self, value: &'m Node<'m>) -> &'m Node<'m> {
    if value.is_const() { return self.lit_bool(true); }
    self.make_node(NodeKind::Known(value), self.bool_ty(), None)
  }

  // ---- control -------------------------------------------------------------

  /// `node_select`: folds on a literal or bottom condition, on
  /// identical branches, and canonicalizes `select(!c, a, b)` to
  /// `select(c, b, a)`.
  pub fn select(&self, cond: &'m Node<'m>, if_true: &'m Node<'m>, if_false: &'m Node<'m>) -> &'m Node<'m> {
    if cond.ty.kind == TypeKind::Bottom { return self.bottom_of(if_true.ty); }
    if cond.is_literal() { return if cond.literal().as_bool() { if_true } else { if_false }; }
    if std::ptr::eq(if_true, if_false) { return if_true; }
    if cond.is_not() {
      if let NodeKind::Binop(BinOp::Xor, _, inner) = cond.kind {
        return self.select(inner, if_false, if_true);
      }
    }
    self.make_node(NodeKind::Select(cond, if_true, if_false), if_true.ty, None)
  }

  pub fn app(&self, callee: &'m Node<'m>, arg: &'m Node<'m>, run_cond: &'m Node<'m>) -> &'m Node<'m> {
    let ty = match callee.ty.kind { TypeKind::Fn(_, codom) => codom, _ => panic!("app of non-fn value") };
    self.make_node(NodeKind::App(callee, arg, run_cond), ty, None)
  }

  /// Type application against an explicit type argument. Left as a thin
  /// extension point (no specialization logic yet lives here) — see
  /// DESIGN.md.
  pub fn tapp(&self, value: &'m Node<'m>, ty_arg: &'m Type<'m>, result_ty: &'m Type<'m>) -> &'m Node<'m> {
    self.make_node(NodeKind::Tapp(value, ty_arg), result_ty, None)
  }

  // ---- replacement -----------------------------------------------------

  /// `node_replace`: redirect every node currently chained to `node`
  /// (including `node` itself) to `with`. Walking `with` to its own
  /// terminus first keeps every chain ending in a single canonical
  /// representative no matter how many times `replace` has been called.
  pub fn replace(&self, node: &'m Node<'m>, with: &'m Node<'m>) {
    let with = with.resolve();
    if std::ptr::eq(node, with) { return; }
    let mut cur = node;
    loop {
      let next = cur.rep_cell().get();
      cur.rep_cell().set(Some(with));
      match next {
        Some(n) => cur = n,
        None => break,
      }
    }
  }

  /// `node_rebuild`: reconstruct a node of the same tag with new operands,
  /// running it back through the same peephole logic as the original
  /// constructor. Used by rewrite passes that walk a graph substituting
  /// operands.
  pub fn rebuild(&self, n: &'m Node<'m>, ops: &[&'m Node<'m>]) -> &'m Node<'m> {
    match n.kind {
      NodeKind::Top | NodeKind::Bottom | NodeKind::Literal(_) | NodeKind::Param(_) | NodeKind::Fn(_) => n,
      NodeKind::Tuple(_) => self.tuple(ops),
      NodeKind::Array(old) => self.array(ops, n.ty.operands().first().copied().unwrap_or(old[0].ty)),
      NodeKind::Struct(_) => self.strukt(ops[0], n.ty),
      NodeKind::Extract(..) => self.extract(ops[0], ops[1]),
      NodeKind::Insert(..) => self.insert(ops[0], ops[1], ops[2]),
      NodeKind::Bitcast(_) => self.bitcast(ops[0], n.ty),
      NodeKind::Extend(_) => self.extend(ops[0], Self::prim_of(n)),
      NodeKind::Trunc(_) => self.trunc(ops[0], Self::prim_of(n)),
      NodeKind::Itof(_) => self.itof(ops[0], Self::prim_of(n), n.ty.fp_flags()),
      NodeKind::Ftoi(_) => self.ftoi(ops[0], Self::prim_of(n)),
      NodeKind::Cmp(op, ..) => self.cmp(op, ops[0], ops[1]),
      NodeKind::Binop(op, ..) => self.binop(op, ops[0], ops[1]),
      NodeKind::Select(..) => self.select(ops[0], ops[1], ops[2]),
      NodeKind::Alloc(_) => self.alloc(ops[0], n.ty.operands()[1].operands()[0]),
      NodeKind::Dealloc(..) => self.dealloc(ops[0], ops[1]),
      NodeKind::Load(..) => self.load(ops[0], ops[1], n.ty.operands()[1]),
      NodeKind::Store(..) => self.store(ops[0], ops[1], ops[2]),
      NodeKind::Known(_) => self.known(ops[0]),
      NodeKind::App(..) => self.app(ops[0], ops[1], ops[2]),
      NodeKind::Tapp(_, ty_arg) => self.tapp(ops[0], ty_arg, n.ty),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::arena::Arena;

  fn setup() -> (Arena,) { (Arena::new(),) }

  #[test]
  fn constant_folds_add() {
    let (arena,) = setup();
    let m = Module::new(&arena);
    let a = m.lit_int(Prim::I32, 2);
    let b = m.lit_int(Prim::I32, 3);
    let sum = m.binop(BinOp::Add, a, b);
    assert_eq!(sum.literal().as_i64(), 5);
  }

  #[test]
  fn commutative_operands_canonicalize() {
    let (arena,) = setup();
    let m = Module::new(&arena);
    let x = m.mk_param(m.mk_fn(m.prim_ty(Prim::I32, FpFlags::empty()), m.prim_ty(Prim::I32, FpFlags::empty()), FnFlags::empty(), None));
    let two = m.lit_int(Prim::I32, 2);
    let a = m.binop(BinOp::Add, x, two);
    let b = m.binop(BinOp::Add, two, x);
    assert!(std::ptr::eq(a, b));
  }

  #[test]
  fn identity_add_zero() {
    let (arena,) = setup();
    let m = Module::new(&arena);
    let f = m.mk_fn(m.prim_ty(Prim::I32, FpFlags::empty()), m.prim_ty(Prim::I32, FpFlags::empty()), FnFlags::empty(), None);
    let x = m.mk_param(f);
    let zero = m.zero(Prim::I32);
    assert!(std::ptr::eq(m.binop(BinOp::Add, x, zero), x));
  }

  #[test]
  fn xor_self_is_zero() {
    let (arena,) = setup();
    let m = Module::new(&arena);
    let f = m.mk_fn(m.prim_ty(Prim::I32, FpFlags::empty()), m.prim_ty(Prim::I32, FpFlags::empty()), FnFlags::empty(), None);
    let x = m.mk_param(f);
    let r = m.binop(BinOp::Xor, x, x);
    assert!(r.is_zero());
  }

  #[test]
  fn and_absorbs_through_or() {
    let (arena,) = setup();
    let m = Module::new(&arena);
    let f = m.mk_fn(m.bool_ty(), m.bool_ty(), FnFlags::empty(), None);
    let a = m.mk_param(f);
    let b = m.lit_bool(true);
    let or_ab = m.binop(BinOp::Or, a, b);
    let r = m.binop(BinOp::And, a, or_ab);
    assert!(std::ptr::eq(r, a));
  }

  #[test]
  fn select_folds_on_literal_condition() {
    let (arena,) = setup();
    let m = Module::new(&arena);
    let t = m.lit_int(Prim::I32, 1);
    let f = m.lit_int(Prim::I32, 2);
    assert!(std::ptr::eq(m.select(m.lit_bool(true), t, f), t));
    assert!(std::ptr::eq(m.select(m.lit_bool(false), t, f), f));
  }

  #[test]
  fn extract_of_insert_same_index_folds() {
    let (arena,) = setup();
    let m = Module::new(&arena);
    let a = m.lit_int(Prim::I32, 1);
    let b = m.lit_int(Prim::I32, 2);
    let tup = m.tuple(&[a, b]);
    let idx0 = m.lit_int(Prim::U32, 0);
    let replaced = m.lit_int(Prim::I32, 99);
    let inserted = m.insert(tup, idx0, replaced);
    let extracted = m.extract(inserted, idx0);
    assert!(std::ptr::eq(extracted, replaced));
  }

  #[test]
  fn replace_redirects_whole_chain() {
    let (arena,) = setup();
    let m = Module::new(&arena);
    let a = m.lit_int(Prim::I32, 1);
    let b = m.lit_int(Prim::I32, 2);
    let c = m.lit_int(Prim::I32, 3);
    m.replace(a, b);
    m.replace(b, c);
    assert!(std::ptr::eq(a.resolve(), c));
  }

  #[test]
  fn use_count_tracks_operand_occurrences() {
    let (arena,) = setup();
    let m = Module::new(&arena);
    let f = m.mk_fn(m.prim_ty(Prim::I32, FpFlags::empty()), m.prim_ty(Prim::I32, FpFlags::empty()), FnFlags::empty(), None);
    let x = m.mk_param(f);
    assert_eq!(x.use_count(), 0);
    let r = m.binop(BinOp::Add, x, x);
    assert_eq!(x.use_count(), 2);
    m.replace(r, x);
    assert_eq!(x.use_count(), 2);
  }

  #[test]
  fn implies_handles_shared_right_operand() {
    let (arena,) = setup();
    let m = Module::new(&arena);
    let f = m.mk_fn(m.prim_ty(Prim::I32, FpFlags::empty()), m.bool_ty(), FnFlags::empty(), None);
    let x = m.mk_param(f);
    let k = m.lit_int(Prim::I32, 5);
    let gt = m.cmp(CmpOp::Gt, x, k);
    let ge = m.cmp(CmpOp::Ge, x, k);
    assert!(m.implies(gt, ge));
  }
}
