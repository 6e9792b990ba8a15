//! Post-order instruction scheduling.
//!
//! Produces a linear order over a graph of nodes suitable for emission:
//! every operand appears before its user, and `param`/`fn`/literal nodes
//! (which have no runtime representation of their own) are left out of the
//! emitted list even though they participate in the traversal.

use std::collections::HashSet;

use crate::node::{Node, NodeKind};

struct Frame<'m> { node: &'m Node<'m>, insert: bool }

/// `schedule_node`: iterative post-order DFS from `root`, skipping
/// `param`/`fn`/literal nodes in the output (they still gate traversal
/// through their operands where relevant, but carry nothing to schedule).
pub fn schedule_node<'m>(root: &'m Node<'m>) -> Vec<&'m Node<'m>> {
  let mut sched = Vec::new();
  let mut done: HashSet<*const Node<'m>> = HashSet::new();
  let mut stack = vec![Frame { node: root, insert: false }];

  while let Some(frame) = stack.pop() {
    if frame.insert {
      sched.push(frame.node);
      continue;
    }
    let skip = matches!(frame.node.kind, NodeKind::Param(_) | NodeKind::Fn(_) | NodeKind::Literal(_));
    if !done.insert(frame.node as *const Node<'m>) { continue; }
    if !skip { stack.push(Frame { node: frame.node, insert: true }); }
    frame.node.for_each_operand(|_, op| {
      if !done.contains(&(op as *const Node<'m>)) {
        stack.push(Frame { node: op, insert: false });
      }
    });
  }

  sched
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::module::Module;
  use crate::node::{BinOp, FnFlags};
  use crate::types::{FpFlags, Prim};
  use crate::arena::Arena;

  #[test]
  fn schedule_orders_operands_before_users() {
    let arena = Arena::new();
    let m = Module::new(&arena);
    let i32_ty = m.prim_ty(Prim::I32, FpFlags::empty());
    let f = m.mk_fn(i32_ty, i32_ty, FnFlags::empty(), None);
    let x = m.mk_param(f);
    let one = m.lit_int(Prim::I32, 1);
    let sum = m.binop(BinOp::Add, x, one);
    let two = m.lit_int(Prim::I32, 2);
    let prod = m.binop(BinOp::Mul, sum, two);

    let sched = schedule_node(prod);
    assert!(!sched.iter().any(|n| std::ptr::eq(*n, x)));
    assert!(!sched.iter().any(|n| std::ptr::eq(*n, one)));
    let sum_pos = sched.iter().position(|n| std::ptr::eq(*n, sum)).unwrap();
    let prod_pos = sched.iter().position(|n| std::ptr::eq(*n, prod)).unwrap();
    assert!(sum_pos < prod_pos);
  }
}
