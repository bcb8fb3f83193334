//! Task collection engine
//!
//! Pure transformations over task slices: display ordering, filters,
//! statistics, edits and completion toggling. Nothing here performs I/O or
//! mutates its input.

use std::cmp::{Ordering, Reverse};

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::{Result, TaskError};
use crate::models::{NewTask, Priority, StatusFilter, Task, TaskId, TaskPatch, TaskStatistics};

/// Order tasks for display.
///
/// Incomplete tasks come first, then higher priority, then earlier due time.
/// Due times only order tasks that both carry one: within a run of equal
/// completion and priority, timed tasks are sorted among the positions they
/// already occupy and untimed tasks stay where they were. Everything else
/// keeps input order.
pub fn sort_for_display(tasks: &[Task]) -> Vec<Task> {
    let mut sorted = tasks.to_vec();
    sorted.sort_by_key(display_rank);

    for run in sorted.chunk_by_mut(|a, b| display_rank(a) == display_rank(b)) {
        order_due_times(run);
    }

    sorted
}

fn display_rank(task: &Task) -> (bool, Reverse<u8>) {
    (task.completed, Reverse(task.priority.weight()))
}

fn order_due_times(run: &mut [Task]) {
    let slots: Vec<usize> = run
        .iter()
        .enumerate()
        .filter(|(_, t)| t.due_time.is_some())
        .map(|(i, _)| i)
        .collect();
    if slots.len() < 2 {
        return;
    }

    let mut timed: Vec<Task> = slots.iter().map(|&i| run[i].clone()).collect();
    timed.sort_by(compare_due_times);

    for (slot, task) in slots.into_iter().zip(timed) {
        run[slot] = task;
    }
}

fn compare_due_times(a: &Task, b: &Task) -> Ordering {
    match (&a.due_time, &b.due_time) {
        (Some(a), Some(b)) => a.as_str().cmp(b.as_str()),
        _ => Ordering::Equal,
    }
}

/// Keep tasks matching the completion filter, preserving order
pub fn filter_by_status(tasks: &[Task], status: StatusFilter) -> Vec<Task> {
    match status {
        StatusFilter::All => tasks.to_vec(),
        StatusFilter::Active => tasks.iter().filter(|t| !t.completed).cloned().collect(),
        StatusFilter::Completed => tasks.iter().filter(|t| t.completed).cloned().collect(),
    }
}

pub fn filter_by_due_date(tasks: &[Task], date: NaiveDate) -> Vec<Task> {
    tasks
        .iter()
        .filter(|t| t.due_date == Some(date))
        .cloned()
        .collect()
}

pub fn filter_by_priority(tasks: &[Task], priority: Priority) -> Vec<Task> {
    tasks
        .iter()
        .filter(|t| t.priority == priority)
        .cloned()
        .collect()
}

/// Category match ignores surrounding whitespace and ASCII case
pub fn filter_by_category(tasks: &[Task], category: &str) -> Vec<Task> {
    let needle = category.trim();
    tasks
        .iter()
        .filter(|t| {
            t.category
                .as_deref()
                .is_some_and(|c| c.trim().eq_ignore_ascii_case(needle))
        })
        .cloned()
        .collect()
}

/// Derive aggregate counts from a collection
pub fn compute_statistics(tasks: &[Task]) -> TaskStatistics {
    let total = saturating_count(tasks.len());
    let completed = saturating_count(tasks.iter().filter(|t| t.completed).count());

    TaskStatistics {
        total_tasks: total,
        completed_tasks: completed,
        pending_tasks: total - completed,
        completion_rate: completion_rate(completed, total),
    }
}

fn saturating_count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// Whole percentage, rounding halves up (1 of 8 is 13%)
pub fn completion_rate(completed: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    let (completed, total) = (u64::from(completed), u64::from(total));
    ((completed * 200 + total) / (total * 2)) as u32
}

/// Statistics to show when a remote value may be available.
///
/// The remote service is the source of truth; the local count is only a
/// fallback and may briefly disagree with it.
pub fn prefer_remote(remote: Option<TaskStatistics>, tasks: &[Task]) -> TaskStatistics {
    remote.unwrap_or_else(|| compute_statistics(tasks))
}

impl TaskStatistics {
    /// Whether externally supplied numbers agree with each other
    pub fn is_consistent(&self) -> bool {
        self.completed_tasks.checked_add(self.pending_tasks) == Some(self.total_tasks)
            && self.completion_rate == completion_rate(self.completed_tasks, self.total_tasks)
    }
}

fn require_title(title: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(TaskError::validation("title must not be empty"));
    }
    Ok(())
}

/// Build a new task from a creation request
pub fn create_task(id: TaskId, request: NewTask, now: DateTime<Utc>) -> Result<Task> {
    require_title(&request.title)?;

    Ok(Task {
        id,
        title: request.title,
        description: request.description,
        completed: request.completed.unwrap_or(false),
        priority: request.priority.unwrap_or_default(),
        category: request.category,
        due_date: request.due_date,
        due_time: request.due_time,
        created_at: now,
        updated_at: now,
    })
}

/// Return a copy of `task` with the patch's present fields replaced.
///
/// Fails without producing anything when the resulting title would be blank.
/// Completion is left alone; only [`toggle_completion`] changes it.
pub fn apply_edit(task: &Task, patch: &TaskPatch) -> Result<Task> {
    if let Some(title) = &patch.title {
        require_title(title)?;
    }

    let mut edited = task.clone();
    if let Some(title) = &patch.title {
        edited.title = title.clone();
    }
    if let Some(description) = &patch.description {
        edited.description = description.clone();
    }
    if let Some(priority) = patch.priority {
        edited.priority = priority;
    }
    if let Some(category) = &patch.category {
        edited.category = category.clone();
    }
    if let Some(due_date) = patch.due_date {
        edited.due_date = due_date;
    }
    if let Some(due_time) = &patch.due_time {
        edited.due_time = due_time.clone();
    }

    Ok(edited)
}

/// Flip completion; every other field is carried over untouched
pub fn toggle_completion(task: &Task) -> Task {
    Task {
        completed: !task.completed,
        ..task.clone()
    }
}
