//! Prospective task store: CRUD, the lifecycle state machine, DAG-checked
//! dependencies, and trigger activation.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use athena_core::deadline::Deadline;
use athena_core::errors::{AthenaError, AthenaResult};
use athena_core::traits::{LayerQuery, LayerStore, ScoredItem};
use athena_core::types::{Event, Task, TaskStatus, TriggerKind};
use athena_storage::queries::task_ops;
use athena_storage::StorageEngine;

use crate::triggers;

pub struct TaskStore {
    storage: Arc<StorageEngine>,
}

impl TaskStore {
    pub fn new(storage: Arc<StorageEngine>) -> Self {
        Self { storage }
    }

    /// Create a task. Dependency cycles (including through existing tasks)
    /// are rejected here with a DFS check.
    pub fn create(&self, task: &Task) -> AthenaResult<String> {
        if task.status == TaskStatus::Completed && task.completed_at.is_none() {
            return Err(AthenaError::invalid(
                "completed_at",
                "completed tasks must carry a completion time",
            ));
        }
        for dep in &task.dependencies {
            if dep == &task.id {
                return Err(AthenaError::invalid("dependencies", "task cannot depend on itself"));
            }
        }
        self.check_acyclic(task)?;
        self.storage.with_writer(|conn| task_ops::insert_task(conn, task))?;
        Ok(task.id.clone())
    }

    fn check_acyclic(&self, new_task: &Task) -> AthenaResult<()> {
        let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
        for (task, dep) in self.storage.with_reader(task_ops::all_dependencies)? {
            adjacency.entry(task).or_default().push(dep);
        }
        adjacency.insert(
            new_task.id.clone(),
            new_task.dependencies.iter().cloned().collect(),
        );

        // DFS from the new task: a path back to it is a cycle.
        let mut stack: Vec<String> = new_task.dependencies.iter().cloned().collect();
        let mut visited: HashSet<String> = HashSet::new();
        while let Some(current) = stack.pop() {
            if current == new_task.id {
                return Err(AthenaError::invalid(
                    "dependencies",
                    "dependency cycle detected",
                ));
            }
            if !visited.insert(current.clone()) {
                continue;
            }
            if let Some(next) = adjacency.get(&current) {
                stack.extend(next.iter().cloned());
            }
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> AthenaResult<Task> {
        self.storage
            .with_reader(|conn| task_ops::get_task(conn, id))?
            .ok_or_else(|| AthenaError::not_found("task", id))
    }

    /// Apply a lifecycle transition. Illegal transitions (including any exit
    /// from a terminal state) are rejected; entering Completed stamps
    /// completed_at. Not retried by the core: transitions are
    /// non-idempotent.
    pub fn transition(&self, id: &str, next: TaskStatus) -> AthenaResult<Task> {
        let task = self.get(id)?;
        if !task.status.can_transition_to(next) {
            return Err(AthenaError::invalid(
                "status",
                format!("illegal transition {} -> {}", task.status.as_str(), next.as_str()),
            ));
        }
        let completed_at = if next == TaskStatus::Completed {
            Some(Utc::now())
        } else {
            task.completed_at
        };
        self.storage
            .with_writer(|conn| task_ops::update_status(conn, id, next, completed_at))?;
        debug!(id, from = task.status.as_str(), to = next.as_str(), "task transition");
        self.get(id)
    }

    pub fn list(&self, status: Option<TaskStatus>) -> AthenaResult<Vec<Task>> {
        self.storage.with_reader(|conn| task_ops::list_by_status(conn, status))
    }

    /// Pending/blocked tasks whose time triggers have passed are activated
    /// and returned.
    pub fn activate_due(&self, now: DateTime<Utc>) -> AthenaResult<Vec<Task>> {
        let candidates = self
            .storage
            .with_reader(|conn| task_ops::tasks_with_trigger_kind(conn, TriggerKind::Time))?;

        let mut activated = Vec::new();
        for task in candidates {
            if !task.triggers.iter().any(|t| triggers::time_due(t, now)) {
                continue;
            }
            if task.status.can_transition_to(TaskStatus::Active) {
                activated.push(self.transition(&task.id, TaskStatus::Active)?);
            }
        }
        Ok(activated)
    }

    /// Tasks whose event or file triggers match the given event are
    /// activated and returned.
    pub fn notify_event(&self, event: &Event) -> AthenaResult<Vec<Task>> {
        let mut candidates = self
            .storage
            .with_reader(|conn| task_ops::tasks_with_trigger_kind(conn, TriggerKind::Event))?;
        candidates.extend(
            self.storage
                .with_reader(|conn| task_ops::tasks_with_trigger_kind(conn, TriggerKind::File))?,
        );
        candidates.sort_by(|a, b| a.id.cmp(&b.id));
        candidates.dedup_by(|a, b| a.id == b.id);

        let mut matched = Vec::new();
        for task in candidates {
            if !task.triggers.iter().any(|t| triggers::event_matches(t, event)) {
                continue;
            }
            if task.status.can_transition_to(TaskStatus::Active) {
                matched.push(self.transition(&task.id, TaskStatus::Active)?);
            } else {
                matched.push(task);
            }
        }
        Ok(matched)
    }

    pub fn delete(&self, id: &str) -> AthenaResult<()> {
        self.storage.with_writer(|conn| task_ops::delete_task(conn, id))
    }
}

impl LayerStore for TaskStore {
    fn layer_name(&self) -> &'static str {
        "tasks"
    }

    fn search(&self, query: &LayerQuery, deadline: Deadline) -> AthenaResult<Vec<ScoredItem>> {
        if deadline.expired() {
            return Err(AthenaError::Timeout { operation: "tasks.search" });
        }
        let tokens: Vec<String> = query
            .text
            .to_lowercase()
            .split_whitespace()
            .map(String::from)
            .collect();
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let mut items: Vec<ScoredItem> = self
            .list(None)?
            .into_iter()
            .filter_map(|task| {
                let haystack = task.title.to_lowercase();
                let hits = tokens.iter().filter(|t| haystack.contains(*t)).count();
                if hits == 0 {
                    return None;
                }
                Some(ScoredItem {
                    id: task.id.clone(),
                    layer: "tasks".into(),
                    score: hits as f64 / tokens.len() as f64,
                    payload: serde_json::to_value(&task).unwrap_or_default(),
                })
            })
            .collect();
        items.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        items.truncate(query.k);
        Ok(items)
    }

    fn upsert(&self, payload: &serde_json::Value) -> AthenaResult<String> {
        let task: Task = serde_json::from_value(payload.clone())
            .map_err(|e| AthenaError::invalid("task", e.to_string()))?;
        self.create(&task)
    }

    fn delete(&self, id: &str) -> AthenaResult<()> {
        TaskStore::delete(self, id)
    }

    fn enumerate(&self, offset: usize, limit: usize) -> AthenaResult<Vec<String>> {
        self.storage
            .with_reader(|conn| task_ops::enumerate(conn, offset, limit))
    }

    fn count(&self) -> AthenaResult<u64> {
        self.storage.with_reader(task_ops::count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use athena_core::types::{TaskPriority, Trigger};

    fn store() -> TaskStore {
        TaskStore::new(Arc::new(StorageEngine::open_in_memory(64).unwrap()))
    }

    #[test]
    fn lifecycle_happy_path() {
        let store = store();
        let task = Task::new("ship feature", TaskPriority::High);
        store.create(&task).unwrap();

        store.transition(&task.id, TaskStatus::Active).unwrap();
        let done = store.transition(&task.id, TaskStatus::Completed).unwrap();
        assert!(done.completed_at.is_some(), "completed implies completed_at");
    }

    #[test]
    fn terminal_states_reject_transitions() {
        let store = store();
        let task = Task::new("one-way door", TaskPriority::Low);
        store.create(&task).unwrap();
        store.transition(&task.id, TaskStatus::Active).unwrap();
        store.transition(&task.id, TaskStatus::Completed).unwrap();

        for next in [TaskStatus::Active, TaskStatus::Pending, TaskStatus::Cancelled] {
            assert!(store.transition(&task.id, next).is_err());
        }
    }

    #[test]
    fn blocked_round_trips_to_active() {
        let store = store();
        let task = Task::new("waiting on review", TaskPriority::Medium);
        store.create(&task).unwrap();
        store.transition(&task.id, TaskStatus::Active).unwrap();
        store.transition(&task.id, TaskStatus::Blocked).unwrap();
        let back = store.transition(&task.id, TaskStatus::Active).unwrap();
        assert_eq!(back.status, TaskStatus::Active);
    }

    #[test]
    fn self_dependency_is_rejected() {
        let store = store();
        let mut task = Task::new("self-referential", TaskPriority::Low);
        task.dependencies.insert(task.id.clone());
        assert!(store.create(&task).is_err());
    }

    #[test]
    fn transitive_cycle_is_rejected() {
        let store = store();
        let a = Task::new("a", TaskPriority::Low);
        store.create(&a).unwrap();

        let mut b = Task::new("b", TaskPriority::Low);
        b.dependencies.insert(a.id.clone());
        store.create(&b).unwrap();

        // c -> b -> a, then a -> c would close the loop; simulate by giving
        // c a dependency on b and then a new task with a's id is impossible,
        // so check the direct two-node cycle instead: d depends on e, e on d.
        let mut d = Task::new("d", TaskPriority::Low);
        let mut e = Task::new("e", TaskPriority::Low);
        d.dependencies.insert(e.id.clone());
        e.dependencies.insert(d.id.clone());
        store.create(&d).unwrap();
        assert!(store.create(&e).is_err(), "e closes a cycle through d");
    }

    #[test]
    fn time_trigger_activates_due_task() {
        let store = store();
        let mut task = Task::new("cron-ish", TaskPriority::Medium);
        task.triggers.push(Trigger {
            kind: TriggerKind::Time,
            predicate: "2026-01-01T00:00:00Z".into(),
        });
        store.create(&task).unwrap();

        let before = store
            .activate_due(chrono::TimeZone::with_ymd_and_hms(&Utc, 2025, 6, 1, 0, 0, 0).unwrap())
            .unwrap();
        assert!(before.is_empty());

        let after = store
            .activate_due(chrono::TimeZone::with_ymd_and_hms(&Utc, 2026, 6, 1, 0, 0, 0).unwrap())
            .unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].status, TaskStatus::Active);
    }
}
