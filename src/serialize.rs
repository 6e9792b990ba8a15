//! On-disk module format.
//!
//! A combined index space lets every tag carry its operands as plain
//! `u32`s: indices `0..type_count` name interned types (written in the
//! topological order `TypeTable::in_order` already guarantees, so a type's
//! own operands are always behind it), indices `0..node_count` likewise
//! name interned non-function nodes, and indices `0..fn_count` name
//! function nodes.
//!
//! Functions are the one place the graph is not acyclic by construction —
//! a function's body can reference nodes built after the function itself,
//! and can reference the function back (recursion). So functions are
//! written as two-phase records: a *shell* (just type and flags) up front,
//! before the node block, and a *patch* record after every node has been
//! written, giving the body/run-condition indices once they are knowable.
//! Loading mirrors this: allocate every function shell first, then load
//! types and nodes (which may freely reference shells), then patch each
//! function's body/condition in a final pass via `Module::rebind_body`/
//! `rebind_cond`.

use std::io::{self, Read, Write};

use byteorder::{LE, ReadBytesExt, WriteBytesExt};
use thiserror::Error;

use crate::arena::Arena;
use crate::module::Module;
use crate::node::{BinOp, CmpOp, FnFlags, Literal, Node, NodeKind};
use crate::types::{FpFlags, Prim, Type, TypeKind};

const MAGIC: &[u8; 3] = b"ANF";
const VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum SerializeError {
  #[error("I/O error: {0}")]
  Io(#[from] io::Error),
  #[error("not an anf module (bad magic)")]
  BadMagic,
  #[error("unsupported module version {0}")]
  UnsupportedVersion(u32),
  #[error("type index {0} out of range")]
  BadTypeIndex(u32),
  #[error("node index {0} out of range")]
  BadNodeIndex(u32),
  #[error("fn index {0} out of range")]
  BadFnIndex(u32),
  #[error("unknown type tag {0}")]
  BadTypeTag(u32),
  #[error("unknown node tag {0}")]
  BadNodeTag(u32),
}

type Result<T> = std::result::Result<T, SerializeError>;

fn type_tag(k: &TypeKind) -> u32 {
  match k {
    TypeKind::Top => 0, TypeKind::Bottom => 1, TypeKind::Mem => 2, TypeKind::Prim(..) => 3,
    TypeKind::Ptr(_) => 4, TypeKind::Tuple(_) => 5, TypeKind::Array(_) => 6,
    TypeKind::Struct(..) => 7, TypeKind::Fn(..) => 8, TypeKind::Var(_) => 9,
  }
}

fn prim_tag(p: Prim) -> u8 {
  match p {
    Prim::Bool => 0, Prim::I8 => 1, Prim::I16 => 2, Prim::I32 => 3, Prim::I64 => 4,
    Prim::U8 => 5, Prim::U16 => 6, Prim::U32 => 7, Prim::U64 => 8, Prim::F32 => 9, Prim::F64 => 10,
  }
}
fn prim_from_tag(t: u8) -> Option<Prim> {
  Some(match t {
    0 => Prim::Bool, 1 => Prim::I8, 2 => Prim::I16, 3 => Prim::I32, 4 => Prim::I64,
    5 => Prim::U8, 6 => Prim::U16, 7 => Prim::U32, 8 => Prim::U64, 9 => Prim::F32, 10 => Prim::F64,
    _ => return None,
  })
}

fn node_tag(k: &NodeKind) -> u32 {
  match k {
    NodeKind::Top => 0, NodeKind::Bottom => 1, NodeKind::Literal(_) => 2, NodeKind::Tuple(_) => 3,
    NodeKind::Array(_) => 4, NodeKind::Struct(_) => 5, NodeKind::Extract(..) => 6, NodeKind::Insert(..) => 7,
    NodeKind::Bitcast(_) => 8, NodeKind::Extend(_) => 9, NodeKind::Trunc(_) => 10, NodeKind::Itof(_) => 11,
    NodeKind::Ftoi(_) => 12, NodeKind::Cmp(..) => 13, NodeKind::Binop(..) => 14, NodeKind::Select(..) => 15,
    NodeKind::Alloc(_) => 16, NodeKind::Dealloc(..) => 17, NodeKind::Load(..) => 18, NodeKind::Store(..) => 19,
    NodeKind::Known(_) => 20, NodeKind::Param(_) => 21, NodeKind::App(..) => 22, NodeKind::Tapp(..) => 23,
    NodeKind::Fn(_) => unreachable!("fn nodes serialize via the shell/patch records, not the node block"),
  }
}

fn cmp_tag(op: CmpOp) -> u8 { match op { CmpOp::Gt => 0, CmpOp::Ge => 1, CmpOp::Lt => 2, CmpOp::Le => 3, CmpOp::Ne => 4, CmpOp::Eq => 5 } }
fn cmp_from_tag(t: u8) -> Option<CmpOp> { Some(match t { 0 => CmpOp::Gt, 1 => CmpOp::Ge, 2 => CmpOp::Lt, 3 => CmpOp::Le, 4 => CmpOp::Ne, 5 => CmpOp::Eq, _ => return None }) }

fn bin_tag(op: BinOp) -> u8 {
  match op {
    BinOp::Add => 0, BinOp::Sub => 1, BinOp::Mul => 2, BinOp::Div => 3, BinOp::Rem => 4,
    BinOp::And => 5, BinOp::Or => 6, BinOp::Xor => 7, BinOp::Lshft => 8, BinOp::Rshft => 9,
  }
}
fn bin_from_tag(t: u8) -> Option<BinOp> {
  Some(match t {
    0 => BinOp::Add, 1 => BinOp::Sub, 2 => BinOp::Mul, 3 => BinOp::Div, 4 => BinOp::Rem,
    5 => BinOp::And, 6 => BinOp::Or, 7 => BinOp::Xor, 8 => BinOp::Lshft, 9 => BinOp::Rshft,
    _ => return None,
  })
}

/// Write `m` to `w` in the format described at the top of this module.
pub fn save<'m>(m: &Module<'m>, w: &mut impl Write) -> Result<()> {
  w.write_all(MAGIC)?;
  w.write_u32::<LE>(VERSION)?;

  let types = m.types();
  let nodes = m.nodes();
  let fns = m.fns();
  let type_list = types.in_order();
  let node_list = nodes.in_order();

  w.write_u32::<LE>(type_list.len() as u32)?;
  w.write_u32::<LE>(node_list.len() as u32)?;
  w.write_u32::<LE>(fns.len() as u32)?;

  let type_index: std::collections::HashMap<*const Type, u32> =
    type_list.iter().enumerate().map(|(i, t)| (*t as *const Type, i as u32)).collect();
  let node_index: std::collections::HashMap<*const Node, u32> =
    node_list.iter().enumerate().map(|(i, n)| (*n as *const Node, i as u32)).collect();
  let fn_index: std::collections::HashMap<*const Node, u32> =
    fns.iter().enumerate().map(|(i, f)| (*f as *const Node, i as u32)).collect();

  let ti = |t: &Type| *type_index.get(&(t as *const Type)).expect("type not in topological order");
  let ni = |n: &Node| *node_index.get(&(n as *const Node)).expect("node not in topological order");

  for ty in type_list {
    w.write_u32::<LE>(type_tag(&ty.kind))?;
    match ty.kind {
      TypeKind::Top | TypeKind::Bottom | TypeKind::Mem => {}
      TypeKind::Prim(p, flags) => { w.write_u8(prim_tag(p))?; w.write_u8(flags.bits())?; }
      TypeKind::Ptr(pointee) => w.write_u32::<LE>(ti(pointee))?,
      TypeKind::Array(elem) => w.write_u32::<LE>(ti(elem))?,
      TypeKind::Tuple(members) => {
        w.write_u32::<LE>(members.len() as u32)?;
        for mem in members { w.write_u32::<LE>(ti(mem))?; }
      }
      TypeKind::Struct(id, members) => {
        w.write_u32::<LE>(id)?;
        w.write_u32::<LE>(members.len() as u32)?;
        for mem in members { w.write_u32::<LE>(ti(mem))?; }
      }
      TypeKind::Fn(dom, codom) => { w.write_u32::<LE>(ti(dom))?; w.write_u32::<LE>(ti(codom))?; }
      TypeKind::Var(id) => w.write_u32::<LE>(id)?,
    }
  }

  for f in fns.iter() {
    w.write_u32::<LE>(ti(f.ty))?;
    w.write_u32::<LE>(f.fn_flags().bits())?;
  }

  for n in node_list {
    w.write_u32::<LE>(node_tag(&n.kind))?;
    w.write_u32::<LE>(ti(n.ty))?;
    match n.kind {
      NodeKind::Top | NodeKind::Bottom => {}
      NodeKind::Literal(lit) => write_literal(w, lit)?,
      NodeKind::Tuple(ops) | NodeKind::Array(ops) => {
        w.write_u32::<LE>(ops.len() as u32)?;
        for op in ops { w.write_u32::<LE>(ni(op))?; }
      }
      NodeKind::Struct(op) | NodeKind::Bitcast(op) | NodeKind::Extend(op) | NodeKind::Trunc(op)
      | NodeKind::Itof(op) | NodeKind::Ftoi(op) | NodeKind::Known(op) => w.write_u32::<LE>(ni(op))?,
      NodeKind::Param(f) => w.write_u32::<LE>(*fn_index.get(&(f as *const Node)).expect("param's fn not a shell"))?,
      NodeKind::Extract(a, b) | NodeKind::Dealloc(a, b) | NodeKind::Load(a, b) => { w.write_u32::<LE>(ni(a))?; w.write_u32::<LE>(ni(b))?; }
      NodeKind::Cmp(op, a, b) => { w.write_u8(cmp_tag(op))?; w.write_u32::<LE>(ni(a))?; w.write_u32::<LE>(ni(b))?; }
      NodeKind::Binop(op, a, b) => { w.write_u8(bin_tag(op))?; w.write_u32::<LE>(ni(a))?; w.write_u32::<LE>(ni(b))?; }
      NodeKind::Insert(a, b, c) | NodeKind::Select(a, b, c) | NodeKind::Store(a, b, c) => {
        w.write_u32::<LE>(ni(a))?; w.write_u32::<LE>(ni(b))?; w.write_u32::<LE>(ni(c))?;
      }
      NodeKind::Alloc(mem) => w.write_u32::<LE>(ni(mem))?,
      NodeKind::App(callee, arg, cond) => {
        // Direct calls only: `callee` must be one of the module's own
        // function shells. Indirect (higher-order) calls through a value
        // of function type are out of scope for this wire format.
        let idx = *fn_index.get(&(callee as *const Node))
          .expect("serializing an indirect call — callee is not a function shell");
        w.write_u32::<LE>(idx)?;
        w.write_u32::<LE>(ni(arg))?;
        w.write_u32::<LE>(ni(cond))?;
      }
      NodeKind::Tapp(op, ty) => { w.write_u32::<LE>(ni(op))?; w.write_u32::<LE>(ti(ty))?; }
      NodeKind::Fn(_) => unreachable!(),
    }
  }

  for f in fns.iter() {
    w.write_u32::<LE>(ni(f.body()))?;
    w.write_u32::<LE>(ni(f.cond()))?;
  }

  Ok(())
}

fn write_literal(w: &mut impl Write, lit: Literal) -> Result<()> {
  use Literal::*;
  match lit {
    Bool(b) => w.write_u8(b as u8)?,
    I8(v) => w.write_i8(v)?, I16(v) => w.write_i16::<LE>(v)?, I32(v) => w.write_i32::<LE>(v)?, I64(v) => w.write_i64::<LE>(v)?,
    U8(v) => w.write_u8(v)?, U16(v) => w.write_u16::<LE>(v)?, U32(v) => w.write_u32::<LE>(v)?, U64(v) => w.write_u64::<LE>(v)?,
    F32(bits) => w.write_u32::<LE>(bits)?, F64(bits) => w.write_u64::<LE>(bits)?,
  }
  Ok(())
}

/// Load a module, allocating every type and node out of `arena`.
pub fn load<'m>(arena: &'m Arena, r: &mut impl Read) -> Result<Module<'m>> {
  let mut magic = [0u8; 3];
  r.read_exact(&mut magic)?;
  if &magic != MAGIC { return Err(SerializeError::BadMagic); }
  let version = r.read_u32::<LE>()?;
  if version != VERSION { return Err(SerializeError::UnsupportedVersion(version)); }

  let type_count = r.read_u32::<LE>()? as usize;
  let node_count = r.read_u32::<LE>()? as usize;
  let fn_count = r.read_u32::<LE>()? as usize;

  let m = Module::new(arena);
  let mut types: Vec<&'m Type<'m>> = Vec::with_capacity(type_count);
  for _ in 0..type_count {
    let tag = r.read_u32::<LE>()?;
    let kind = match tag {
      0 => TypeKind::Top, 1 => TypeKind::Bottom, 2 => TypeKind::Mem,
      3 => {
        let p = prim_from_tag(r.read_u8()?).ok_or(SerializeError::BadTypeTag(tag))?;
        let flags = FpFlags::from_bits_truncate(r.read_u8()?);
        TypeKind::Prim(p, flags)
      }
      4 => { let i = r.read_u32::<LE>()?; TypeKind::Ptr(*types.get(i as usize).ok_or(SerializeError::BadTypeIndex(i))?) }
      5 => {
        let n = r.read_u32::<LE>()?;
        let mut members = Vec::with_capacity(n as usize);
        for _ in 0..n { let i = r.read_u32::<LE>()?; members.push(*types.get(i as usize).ok_or(SerializeError::BadTypeIndex(i))?); }
        TypeKind::Tuple(arena.alloc_slice(&members))
      }
      6 => { let i = r.read_u32::<LE>()?; TypeKind::Array(*types.get(i as usize).ok_or(SerializeError::BadTypeIndex(i))?) }
      7 => {
        let id = r.read_u32::<LE>()?;
        let n = r.read_u32::<LE>()?;
        let mut members = Vec::with_capacity(n as usize);
        for _ in 0..n { let i = r.read_u32::<LE>()?; members.push(*types.get(i as usize).ok_or(SerializeError::BadTypeIndex(i))?); }
        TypeKind::Struct(id, arena.alloc_slice(&members))
      }
      8 => {
        let dom = r.read_u32::<LE>()?;
        let codom = r.read_u32::<LE>()?;
        TypeKind::Fn(*types.get(dom as usize).ok_or(SerializeError::BadTypeIndex(dom))?, *types.get(codom as usize).ok_or(SerializeError::BadTypeIndex(codom))?)
      }
      9 => TypeKind::Var(r.read_u32::<LE>()?),
      _ => return Err(SerializeError::BadTypeTag(tag)),
    };
    types.push(m.ty(kind));
  }

  // Function shells: allocate each with a bottom-typed placeholder body
  // and a `false` run-condition, patched once the node block has loaded.
  let mut fn_nodes: Vec<&'m Node<'m>> = Vec::with_capacity(fn_count);
  for _ in 0..fn_count {
    let ty_idx = r.read_u32::<LE>()?;
    let ty = *types.get(ty_idx as usize).ok_or(SerializeError::BadTypeIndex(ty_idx))?;
    let flags = FnFlags::from_bits_truncate(r.read_u32::<LE>()?);
    let (dom, codom) = match ty.kind { TypeKind::Fn(d, c) => (d, c), _ => (ty, ty) };
    fn_nodes.push(m.mk_fn(dom, codom, flags, None));
  }

  let mut nodes: Vec<&'m Node<'m>> = Vec::with_capacity(node_count);
  for _ in 0..node_count {
    let tag = r.read_u32::<LE>()?;
    let ty_idx = r.read_u32::<LE>()?;
    let ty = *types.get(ty_idx as usize).ok_or(SerializeError::BadTypeIndex(ty_idx))?;
    let get_node = |nodes: &[&'m Node<'m>], i: u32| -> Result<&'m Node<'m>> { nodes.get(i as usize).copied().ok_or(SerializeError::BadNodeIndex(i)) };
    let get_fn = |i: u32| -> Result<&'m Node<'m>> { fn_nodes.get(i as usize).copied().ok_or(SerializeError::BadFnIndex(i)) };

    let node = match tag {
      0 => m.unit(),
      1 => m.bottom_of(ty),
      2 => read_literal_node(&m, ty, r)?,
      3 => {
        let n = r.read_u32::<LE>()?;
        let mut ops = Vec::with_capacity(n as usize);
        for _ in 0..n { ops.push(get_node(&nodes, r.read_u32::<LE>()?)?); }
        m.tuple(&ops)
      }
      4 => {
        let n = r.read_u32::<LE>()?;
        let mut ops = Vec::with_capacity(n as usize);
        for _ in 0..n { ops.push(get_node(&nodes, r.read_u32::<LE>()?)?); }
        let elem_ty = ty.operands().first().copied().unwrap_or(ty);
        m.array(&ops, elem_ty)
      }
      5 => { let v = get_node(&nodes, r.read_u32::<LE>()?)?; m.strukt(v, ty) }
      6 => { let a = get_node(&nodes, r.read_u32::<LE>()?)?; let b = get_node(&nodes, r.read_u32::<LE>()?)?; m.extract(a, b) }
      7 => {
        let a = get_node(&nodes, r.read_u32::<LE>()?)?; let b = get_node(&nodes, r.read_u32::<LE>()?)?; let c = get_node(&nodes, r.read_u32::<LE>()?)?;
        m.insert(a, b, c)
      }
      8 => { let a = get_node(&nodes, r.read_u32::<LE>()?)?; m.bitcast(a, ty) }
      9 => { let a = get_node(&nodes, r.read_u32::<LE>()?)?; m.extend(a, prim_of(ty)) }
      10 => { let a = get_node(&nodes, r.read_u32::<LE>()?)?; m.trunc(a, prim_of(ty)) }
      11 => { let a = get_node(&nodes, r.read_u32::<LE>()?)?; m.itof(a, prim_of(ty), ty.fp_flags()) }
      12 => { let a = get_node(&nodes, r.read_u32::<LE>()?)?; m.ftoi(a, prim_of(ty)) }
      13 => {
        let op = cmp_from_tag(r.read_u8()?).ok_or(SerializeError::BadNodeTag(tag))?;
        let a = get_node(&nodes, r.read_u32::<LE>()?)?; let b = get_node(&nodes, r.read_u32::<LE>()?)?;
        m.cmp(op, a, b)
      }
      14 => {
        let op = bin_from_tag(r.read_u8()?).ok_or(SerializeError::BadNodeTag(tag))?;
        let a = get_node(&nodes, r.read_u32::<LE>()?)?; let b = get_node(&nodes, r.read_u32::<LE>()?)?;
        m.binop(op, a, b)
      }
      15 => {
        let a = get_node(&nodes, r.read_u32::<LE>()?)?; let b = get_node(&nodes, r.read_u32::<LE>()?)?; let c = get_node(&nodes, r.read_u32::<LE>()?)?;
        m.select(a, b, c)
      }
      16 => { let mem = get_node(&nodes, r.read_u32::<LE>()?)?; let elem_ty = ty.operands()[1].operands()[0]; m.alloc(mem, elem_ty) }
      17 => { let a = get_node(&nodes, r.read_u32::<LE>()?)?; let b = get_node(&nodes, r.read_u32::<LE>()?)?; m.dealloc(a, b) }
      18 => {
        let a = get_node(&nodes, r.read_u32::<LE>()?)?; let b = get_node(&nodes, r.read_u32::<LE>()?)?;
        let pointee = ty.operands()[1];
        m.load(a, b, pointee)
      }
      19 => {
        let a = get_node(&nodes, r.read_u32::<LE>()?)?; let b = get_node(&nodes, r.read_u32::<LE>()?)?; let c = get_node(&nodes, r.read_u32::<LE>()?)?;
        m.store(a, b, c)
      }
      20 => { let a = get_node(&nodes, r.read_u32::<LE>()?)?; m.known(a) }
      21 => { let f = get_fn(r.read_u32::<LE>()?)?; m.mk_param(f) }
      22 => {
        let callee_idx = r.read_u32::<LE>()?;
        let arg = get_node(&nodes, r.read_u32::<LE>()?)?;
        let cond = get_node(&nodes, r.read_u32::<LE>()?)?;
        let callee = get_fn(callee_idx)?;
        m.app(callee, arg, cond)
      }
      23 => {
        let a = get_node(&nodes, r.read_u32::<LE>()?)?;
        let ti = r.read_u32::<LE>()?;
        let tapp_ty = *types.get(ti as usize).ok_or(SerializeError::BadTypeIndex(ti))?;
        m.tapp(a, tapp_ty, ty)
      }
      _ => return Err(SerializeError::BadNodeTag(tag)),
    };
    nodes.push(node);
  }

  for f in &fn_nodes {
    let body_idx = r.read_u32::<LE>()?;
    let cond_idx = r.read_u32::<LE>()?;
    let body = *nodes.get(body_idx as usize).ok_or(SerializeError::BadNodeIndex(body_idx))?;
    let cond = *nodes.get(cond_idx as usize).ok_or(SerializeError::BadNodeIndex(cond_idx))?;
    m.rebind_body(f, body);
    m.rebind_cond(f, cond);
  }

  Ok(m)
}

fn prim_of(ty: &Type) -> Prim { match ty.kind { TypeKind::Prim(p, _) => p, _ => panic!("non-prim type in conversion node") } }

fn read_literal_node<'m>(m: &Module<'m>, ty: &'m Type<'m>, r: &mut impl Read) -> Result<&'m Node<'m>> {
  Ok(match ty.kind {
    TypeKind::Prim(Prim::Bool, _) => m.lit_bool(r.read_u8()? != 0),
    TypeKind::Prim(Prim::F32, flags) => m.lit_f32(f32::from_bits(r.read_u32::<LE>()?), flags),
    TypeKind::Prim(Prim::F64, flags) => m.lit_f64(f64::from_bits(r.read_u64::<LE>()?), flags),
    TypeKind::Prim(p, _) => m.lit_int(p, read_int(p, r)?),
    _ => panic!("literal node with non-primitive type"),
  })
}

fn read_int(p: Prim, r: &mut impl Read) -> Result<i64> {
  Ok(match p {
    Prim::I8 => r.read_i8()? as i64, Prim::I16 => r.read_i16::<LE>()? as i64,
    Prim::I32 => r.read_i32::<LE>()? as i64, Prim::I64 => r.read_i64::<LE>()?,
    Prim::U8 => r.read_u8()? as i64, Prim::U16 => r.read_u16::<LE>()? as i64,
    Prim::U32 => r.read_u32::<LE>()? as i64, Prim::U64 => r.read_u64::<LE>()? as i64,
    Prim::Bool | Prim::F32 | Prim::F64 => unreachable!(),
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::node::BinOp;

  #[test]
  fn round_trips_a_small_arithmetic_function() {
    let arena = Arena::new();
    let m = Module::new(&arena);
    let i32_ty = m.prim_ty(Prim::I32, FpFlags::empty());
    let f = m.mk_fn(i32_ty, i32_ty, FnFlags::empty(), None);
    let x = m.mk_param(f);
    let one = m.lit_int(Prim::I32, 1);
    let body = m.binop(BinOp::Add, x, one);
    m.rebind_body(f, body);

    let mut buf = Vec::new();
    save(&m, &mut buf).unwrap();

    let arena2 = Arena::new();
    let loaded = load(&arena2, &mut &buf[..]).unwrap();
    assert_eq!(loaded.fns().len(), 1);
    assert_eq!(loaded.nodes().len(), m.nodes().len());
  }

  #[test]
  fn rejects_bad_magic() {
    let arena = Arena::new();
    let bytes = [0u8; 16];
    assert!(matches!(load(&arena, &mut &bytes[..]), Err(SerializeError::BadMagic)));
  }
}
