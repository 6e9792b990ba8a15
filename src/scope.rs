//! Scope and free-variable computation for a function body.
//!
//! A function's *scope* is every node reachable by flooding forward
//! through use-lists starting at its `param` node — everything that could
//! possibly depend on that parameter. Nested functions complicate this:
//! when the flood reaches a function node defined inside the scope, its own
//! parameter is seeded into the flood too, so the scope extends through
//! closures the way the original scope walk does.
//!
//! Free variables are computed separately, by walking a function's body
//! *backward* through operands (not uses) starting from the body node,
//! stopping at anything already in scope and recording any out-of-scope
//! `param`/`fn` node it reaches.

use std::collections::HashSet;

use crate::node::Node;

/// The set of nodes reachable forward from a function's parameter.
pub struct Scope<'m> {
  nodes: HashSet<*const Node<'m>>,
}

impl<'m> Scope<'m> {
  pub fn contains(&self, n: &'m Node<'m>) -> bool { self.nodes.contains(&(n as *const Node<'m>)) }
  pub fn len(&self) -> usize { self.nodes.len() }
  pub fn is_empty(&self) -> bool { self.nodes.is_empty() }
}

/// `scope_compute`: BFS flood forward over use-lists starting at `param`.
/// `param`'s own owning `fn` is always a scope member — an unused
/// parameter (as in a nested function whose body never reaches its own
/// argument) would otherwise drop the function itself out of its own
/// scope — but it is only added to the result set, never flooded from:
/// flooding through its uses would pull in unrelated callers/holders of
/// the function value, which aren't part of this function's scope.
/// When a discovered node is itself a function, its parameter is folded
/// into the flood too, so scope extends through nested closures.
pub fn scope_compute<'m>(param: &'m Node<'m>) -> Scope<'m> {
  let f = match param.kind {
    crate::node::NodeKind::Param(f) => f,
    _ => panic!("scope_compute expects a param node"),
  };

  let mut nodes: HashSet<*const Node<'m>> = HashSet::new();
  let mut worklist = vec![param];
  nodes.insert(param as *const Node<'m>);
  nodes.insert(f as *const Node<'m>);

  while let Some(n) = worklist.pop() {
    for u in n.uses() {
      let user = u.user;
      let ptr = user as *const Node<'m>;
      if nodes.insert(ptr) {
        worklist.push(user);
      }
    }
  }

  Scope { nodes }
}

/// `scope_compute_fvs`: walk `entry`'s body backward through operands,
/// stopping at nodes already in `scope`, and collect every out-of-scope
/// `param`/`fn` node reached along the way.
pub fn scope_compute_fvs<'m>(body: &'m Node<'m>, scope: &Scope<'m>) -> Vec<&'m Node<'m>> {
  let mut fvs = Vec::new();
  let mut fvs_seen: HashSet<*const Node<'m>> = HashSet::new();
  let mut done: HashSet<*const Node<'m>> = HashSet::new();
  let mut worklist = vec![body];
  done.insert(body as *const Node<'m>);

  while let Some(n) = worklist.pop() {
    if !scope.contains(n) && (matches!(n.kind, crate::node::NodeKind::Param(_)) || n.is_fn()) {
      if fvs_seen.insert(n as *const Node<'m>) { fvs.push(n); }
      continue;
    }
    n.for_each_operand(|_, op| {
      if done.insert(op as *const Node<'m>) { worklist.push(op); }
    });
  }

  fvs
}
