//! The backward-pass driver.
//!
//! Orders the computation graph topologically, then runs each node's
//! `backward` in reverse order so every node sees its full output gradient
//! before propagating to its parents.

use super::GraphNode;
use std::collections::HashSet;
use std::rc::Rc;

/// Runs the backward pass from `root` through the whole graph.
///
/// A `None` root means the starting variable is a leaf; there is nothing to
/// traverse.
pub fn backward(root: Option<Rc<dyn GraphNode>>) {
    let Some(root) = root else { return };

    let mut topo = Vec::new();
    let mut visited = HashSet::new();

    build_topo(root, &mut topo, &mut visited);

    for node in topo.into_iter().rev() {
        node.backward();
    }
}

fn build_topo(
    node: Rc<dyn GraphNode>,
    topo: &mut Vec<Rc<dyn GraphNode>>,
    visited: &mut HashSet<*const ()>,
) {
    // `Rc::as_ptr` on a trait object yields the data pointer, which is a
    // stable identity for visited tracking. The graph is a DAG; nodes
    // reachable through multiple paths (shared subexpressions) must run
    // exactly once.
    let ptr = Rc::as_ptr(&node) as *const ();
    if !visited.insert(ptr) {
        return;
    }

    for parent in node.parents() {
        build_topo(parent, topo, visited);
    }

    topo.push(node);
}
