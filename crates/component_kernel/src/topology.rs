//! Dependency ordering
//!
//! Depth-first topological sort over declared dependencies, driven by an
//! explicit stack instead of recursion. Nodes are marked `Visiting` on entry
//! and `Visited` on exit; reaching a `Visiting` node is a genuine cycle and
//! aborts the whole sort. Dependencies that are not part of the graph are
//! skipped with a warning.

use std::collections::HashMap;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Visited,
}

/// A cycle found while ordering
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("dependency cycle detected at {closing} (visiting: {})", .visiting.join(", "))]
pub struct CycleError {
    /// Ids in the `Visiting` state when the cycle was found, outermost first
    pub visiting: Vec<String>,
    /// The dependency that pointed back into `visiting`
    pub closing: String,
}

impl CycleError {
    /// The cycle itself: from `closing` down the visiting chain and back to `closing`
    pub fn path(&self) -> Vec<String> {
        let start = self
            .visiting
            .iter()
            .position(|id| id == &self.closing)
            .unwrap_or(0);
        let mut path: Vec<String> = self.visiting[start..].to_vec();
        path.push(self.closing.clone());
        path
    }
}

/// Order `nodes` so that every id comes after all of its dependencies.
///
/// `nodes` is `(id, declared dependencies)` in registration order; roots are
/// visited in that order and dependencies in declaration order, so the result
/// is deterministic.
pub fn topological_order(nodes: &[(String, Vec<String>)]) -> Result<Vec<String>, CycleError> {
    let graph: HashMap<&str, &[String]> = nodes
        .iter()
        .map(|(id, deps)| (id.as_str(), deps.as_slice()))
        .collect();

    let mut marks: HashMap<&str, Mark> = HashMap::with_capacity(nodes.len());
    let mut order = Vec::with_capacity(nodes.len());
    let mut stack: Vec<(&str, usize)> = Vec::new();

    for (root, _) in nodes {
        if marks.contains_key(root.as_str()) {
            continue;
        }
        marks.insert(root.as_str(), Mark::Visiting);
        stack.push((root.as_str(), 0));

        while let Some(&(node, next)) = stack.last() {
            let deps = graph.get(node).copied().unwrap_or(&[]);

            let Some(dep) = deps.get(next) else {
                stack.pop();
                marks.insert(node, Mark::Visited);
                order.push(node.to_string());
                continue;
            };

            if let Some(top) = stack.last_mut() {
                top.1 += 1;
            }

            let dep = dep.as_str();
            if !graph.contains_key(dep) {
                warn!("⚠️ Dependency {} of {} is not registered, skipping", dep, node);
                continue;
            }

            match marks.get(dep) {
                Some(Mark::Visited) => {}
                Some(Mark::Visiting) => {
                    return Err(CycleError {
                        visiting: stack.iter().map(|(id, _)| id.to_string()).collect(),
                        closing: dep.to_string(),
                    });
                }
                None => {
                    marks.insert(dep, Mark::Visiting);
                    stack.push((dep, 0));
                }
            }
        }
    }

    Ok(order)
}
