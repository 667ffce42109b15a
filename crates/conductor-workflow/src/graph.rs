use std::collections::{HashMap, HashSet};

use crate::node::TaskNode;

/// Dependency graph of a workflow, for traversal and diagnostics.
///
/// Edges point from a task to the dependencies it waits on.
#[derive(Debug, Clone)]
pub struct Graph {
  /// Task ids in definition order.
  order: Vec<String>,
  /// Reverse adjacency: task_id -> its dependencies.
  reverse_adjacency: HashMap<String, Vec<String>>,
  /// Tasks with no dependencies.
  entry_points: Vec<String>,
}

impl Graph {
  /// Build a graph from task nodes.
  pub fn new(tasks: &[TaskNode]) -> Self {
    let mut reverse_adjacency: HashMap<String, Vec<String>> = HashMap::new();

    // Initialize all nodes
    for task in tasks {
      reverse_adjacency.entry(task.task_id.clone()).or_default();
    }

    for task in tasks {
      for dep in &task.dependencies {
        reverse_adjacency
          .entry(task.task_id.clone())
          .or_default()
          .push(dep.clone());
      }
    }

    let entry_points = tasks
      .iter()
      .filter(|t| t.dependencies.is_empty())
      .map(|t| t.task_id.clone())
      .collect();

    Self {
      order: tasks.iter().map(|t| t.task_id.clone()).collect(),
      reverse_adjacency,
      entry_points,
    }
  }

  /// Get entry points (tasks with no dependencies).
  pub fn entry_points(&self) -> &[String] {
    &self.entry_points
  }

  /// Get the direct dependencies of a task.
  pub fn upstream(&self, task_id: &str) -> &[String] {
    self
      .reverse_adjacency
      .get(task_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// All transitive dependencies of a task.
  pub fn ancestors(&self, task_id: &str) -> HashSet<String> {
    let mut seen = HashSet::new();
    let mut stack: Vec<&str> = self.upstream(task_id).iter().map(String::as_str).collect();
    while let Some(id) = stack.pop() {
      if seen.insert(id.to_string()) {
        stack.extend(self.upstream(id).iter().map(String::as_str));
      }
    }
    seen
  }

  /// Find a dependency cycle among the tasks accepted by `within`.
  ///
  /// Returns the cycle as a closed path (`[a, b, a]` for a depending on b and
  /// b depending on a). Tasks are explored in definition order, so the result
  /// is deterministic.
  pub fn find_cycle<F>(&self, within: F) -> Option<Vec<String>>
  where
    F: Fn(&str) -> bool,
  {
    let mut finished: HashSet<&str> = HashSet::new();
    let mut path: Vec<&str> = Vec::new();

    for start in &self.order {
      if !within(start.as_str()) || finished.contains(start.as_str()) {
        continue;
      }
      if let Some(cycle) = self.visit(start, &within, &mut path, &mut finished) {
        return Some(cycle);
      }
    }
    None
  }

  fn visit<'a, F>(
    &'a self,
    task_id: &'a str,
    within: &F,
    path: &mut Vec<&'a str>,
    finished: &mut HashSet<&'a str>,
  ) -> Option<Vec<String>>
  where
    F: Fn(&str) -> bool,
  {
    if let Some(pos) = path.iter().position(|id| *id == task_id) {
      let mut cycle: Vec<String> = path[pos..].iter().map(|id| id.to_string()).collect();
      cycle.push(task_id.to_string());
      return Some(cycle);
    }
    if finished.contains(task_id) {
      return None;
    }

    path.push(task_id);
    for dep in self.upstream(task_id) {
      if within(dep.as_str())
        && let Some(cycle) = self.visit(dep, within, path, finished)
      {
        return Some(cycle);
      }
    }
    path.pop();
    finished.insert(task_id);
    None
  }
}
