//! Partial evaluation / call specialization.
//!
//! Given a direct call whose argument is already known, this inlines the
//! callee's body with its parameter substituted by that argument and lets
//! `Module`'s constructors re-fold everything downstream — so a call like
//! `pow3(5)` specializes all the way down to the literal `125` without any
//! dedicated constant-propagation pass: the peephole engine already does
//! that work every time a node gets rebuilt with a literal operand.

use std::collections::HashMap;

use crate::module::Module;
use crate::node::{Node, NodeKind};
use crate::sched::schedule_node;

/// Inline `f`'s body with its parameter replaced by `arg`, returning the
/// specialized value (what `app(f, arg, cond)` would evaluate to).
/// `f` itself is left untouched — this builds a fresh, independent value
/// graph rather than mutating the callee.
pub fn specialize<'m>(m: &Module<'m>, f: &'m Node<'m>, arg: &'m Node<'m>) -> &'m Node<'m> {
  let param = find_param(f);
  let body = f.body();

  let mut subst: HashMap<*const Node<'m>, &'m Node<'m>> = HashMap::new();
  if let Some(param) = param { subst.insert(param as *const Node<'m>, arg); }

  for n in schedule_node(body) {
    if subst.contains_key(&(n as *const Node<'m>)) { continue; }
    let new_ops: Vec<&'m Node<'m>> = n.operands().into_iter()
      .map(|op| *subst.get(&(op as *const Node<'m>)).unwrap_or(&op))
      .collect();
    let rebuilt = m.rebuild(n, &new_ops);
    subst.insert(n as *const Node<'m>, rebuilt);
  }

  subst.get(&(body as *const Node<'m>)).copied().unwrap_or(body)
}

/// Should this call be specialized inline? Mirrors `should_inline`'s
/// shape: small, argument-independent of any surrounding loop, and not
/// already inside its own body (no self-recursive inlining here — that
/// belongs to a fixpoint-aware pass, not this one-shot specializer).
pub fn should_inline(f: &Node, arg: &Node) -> bool {
  arg.is_const() && schedule_node(f.body()).len() <= 64 && !references_self(f)
}

fn references_self(f: &Node) -> bool {
  schedule_node(f.body()).iter().any(|n| matches!(n.kind, NodeKind::App(callee, ..) if std::ptr::eq(callee, f)))
}

/// Find `f`'s own `param` node. There is no direct `fn`-to-`param`
/// pointer, only the reverse (`Param`'s sole operand names its owning
/// `Fn`) — but constructing a `param` always registers a use edge on its
/// `fn`, so `f`'s use-list is guaranteed to carry it.
fn find_param<'m>(f: &'m Node<'m>) -> Option<&'m Node<'m>> {
  f.uses().map(|u| u.user).find(|n| matches!(n.kind, NodeKind::Param(owner) if std::ptr::eq(owner, f)))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::arena::Arena;
  use crate::node::{BinOp, FnFlags};
  use crate::types::{FpFlags, Prim};

  #[test]
  fn power_specializer_folds_to_a_literal() {
    let arena = Arena::new();
    let m = Module::new(&arena);
    let i32_ty = m.prim_ty(Prim::I32, FpFlags::empty());
    let pow3 = m.mk_fn(i32_ty, i32_ty, FnFlags::empty(), None);
    let x = m.mk_param(pow3);
    let x2 = m.binop(BinOp::Mul, x, x);
    let x3 = m.binop(BinOp::Mul, x2, x);
    m.rebind_body(pow3, x3);

    let five = m.lit_int(Prim::I32, 5);
    let result = specialize(&m, pow3, five);
    assert!(result.is_literal());
    assert_eq!(result.literal().as_i64(), 125);
  }

  #[test]
  fn specializing_with_a_non_const_argument_still_substitutes() {
    let arena = Arena::new();
    let m = Module::new(&arena);
    let i32_ty = m.prim_ty(Prim::I32, FpFlags::empty());
    let outer = m.mk_fn(i32_ty, i32_ty, FnFlags::empty(), None);
    let y = m.mk_param(outer);

    let sq = m.mk_fn(i32_ty, i32_ty, FnFlags::empty(), None);
    let x = m.mk_param(sq);
    let x2 = m.binop(BinOp::Mul, x, x);
    m.rebind_body(sq, x2);

    let result = specialize(&m, sq, y);
    assert!(matches!(result.kind, NodeKind::Binop(BinOp::Mul, a, b) if std::ptr::eq(a, y) && std::ptr::eq(b, y)));
  }
}
