//! Store-forwarding memory promotion.
//!
//! A narrow mem2reg: when a `load` reads the exact pointer a directly
//! preceding `store` just wrote (same address, no alias reasoning needed
//! since the memory token threading already serializes the two), the load
//! is folded straight to `(mem, stored_value)` — no read from the abstract
//! memory actually happens. This is a rewrite-pass concern, not a
//! construction-time peephole rule: it needs to look one hop upstream
//! through the memory chain, which a context-free node constructor can't
//! do on its own.

use std::collections::HashMap;

use crate::module::Module;
use crate::node::{Node, NodeKind};
use crate::sched::schedule_node;

/// Rebuild the graph rooted at `root`, forwarding every directly-preceding
/// store into the load that immediately follows it on the same pointer.
pub fn promote<'m>(m: &Module<'m>, root: &'m Node<'m>) -> &'m Node<'m> {
  let mut subst: HashMap<*const Node<'m>, &'m Node<'m>> = HashMap::new();

  for n in schedule_node(root) {
    let new_ops: Vec<&'m Node<'m>> = n.operands().into_iter()
      .map(|op| *subst.get(&(op as *const Node<'m>)).unwrap_or(&op))
      .collect();

    let rebuilt = if let NodeKind::Load(..) = n.kind {
      let mem = new_ops[0];
      let ptr = new_ops[1];
      match mem.kind {
        NodeKind::Store(_, store_ptr, value) if std::ptr::eq(store_ptr, ptr) => m.tuple(&[mem, value]),
        _ => m.rebuild(n, &new_ops),
      }
    } else {
      m.rebuild(n, &new_ops)
    };

    subst.insert(n as *const Node<'m>, rebuilt);
  }

  subst.get(&(root as *const Node<'m>)).copied().unwrap_or(root)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::arena::Arena;
  use crate::node::FnFlags;
  use crate::types::{FpFlags, Prim};

  #[test]
  fn elides_a_load_immediately_following_a_matching_store() {
    let arena = Arena::new();
    let m = Module::new(&arena);
    let i32_ty = m.prim_ty(Prim::I32, FpFlags::empty());
    let f = m.mk_fn(m.mem_ty(), i32_ty, FnFlags::empty(), None);
    let mem0 = m.mk_param(f);

    let alloc = m.alloc(mem0, i32_ty);
    let alloc_mem = m.extract(alloc, m.lit_int(Prim::U32, 0));
    let ptr = m.extract(alloc, m.lit_int(Prim::U32, 1));
    let val = m.lit_int(Prim::I32, 42);
    let mem1 = m.store(alloc_mem, ptr, val);
    let loaded = m.load(mem1, ptr, i32_ty);
    let result = m.extract(loaded, m.lit_int(Prim::U32, 1));

    let promoted = promote(&m, result);
    assert!(std::ptr::eq(promoted, val));
  }
}
