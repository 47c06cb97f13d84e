//! # Task Registry
//!
//! The ordered set of queued tasks. Nodes live in a [`Slab`] arena and link
//! to each other by slot key, so the list is doubly linked without any raw
//! pointers: the registry owns every node, and a task leaves the arena only
//! by value through [`TaskList::remove_head`].
//!
//! ## Ordering
//!
//! ```text
//!   head                                                    tail
//!    │                                                        │
//!    ▼                                                        ▼
//!  [NOW #9] ⇄ [NOW #4] ⇄ [REALTIME #2] ⇄ [NORMAL #1] ⇄ [NORMAL #3]
//!   └─ newest immediate first ─┘ └──── stable ascending priority ────┘
//! ```
//!
//! Non-immediate tasks are kept in stable ascending priority: a new task goes
//! after every incumbent whose priority is lower or equal, so equal priorities
//! run in arrival order. Immediate tasks are pushed onto the head.
//!
//! Insertion is O(n). Queues on the controller hold a handful of tasks, and
//! a linear scan keeps the worst case obvious.

use slab::Slab;

use crate::task::Task;
use crate::time::Instant;

struct Node {
    task: Task,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Priority-ordered, doubly linked registry of queued tasks.
pub struct TaskList {
    nodes: Slab<Node>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl TaskList {
    pub fn new() -> Self {
        Self {
            nodes: Slab::new(),
            head: None,
            tail: None,
        }
    }

    /// Create a registry with room for `capacity` tasks before it has to grow.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Slab::with_capacity(capacity),
            head: None,
            tail: None,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// The task that will run next.
    pub fn head(&self) -> Option<&Task> {
        self.head.map(|key| &self.nodes[key].task)
    }

    /// Queue `task` according to its priority.
    pub fn insert(&mut self, task: Task) {
        if self.head.is_none() || task.priority().is_immediate() {
            self.push_front(task);
            return;
        }

        // Last node whose priority is <= the new one.
        let priority = task.priority();
        let mut after = None;
        let mut cursor = self.head;
        while let Some(key) = cursor {
            let node = &self.nodes[key];
            if node.task.priority() > priority {
                break;
            }
            after = Some(key);
            cursor = node.next;
        }

        match after {
            Some(key) => self.insert_after(key, task),
            None => self.push_front(task),
        }
    }

    fn push_front(&mut self, task: Task) {
        let old_head = self.head;
        let key = self.nodes.insert(Node {
            task,
            prev: None,
            next: old_head,
        });

        match old_head {
            Some(old) => self.nodes[old].prev = Some(key),
            None => self.tail = Some(key),
        }
        self.head = Some(key);
    }

    fn insert_after(&mut self, at: usize, task: Task) {
        let next = self.nodes[at].next;
        let key = self.nodes.insert(Node {
            task,
            prev: Some(at),
            next,
        });

        self.nodes[at].next = Some(key);
        match next {
            Some(next) => self.nodes[next].prev = Some(key),
            None => self.tail = Some(key),
        }
    }

    /// Detach the head task and hand it over by value.
    ///
    /// Returns `None` on an empty registry.
    pub fn remove_head(&mut self) -> Option<Task> {
        let key = self.head?;
        let node = self.nodes.remove(key);

        self.head = node.next;
        match node.next {
            Some(next) => self.nodes[next].prev = None,
            None => self.tail = None,
        }

        Some(node.task)
    }

    /// Head-to-tail traversal. Each call starts from the current head.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            nodes: &self.nodes,
            front: self.head,
            back: self.tail,
            len: self.nodes.len(),
        }
    }

    /// The queued task with the least time left before its deadline.
    ///
    /// Time left is measured with [`Instant::remaining_until`], so overdue
    /// tasks rank first and the comparison holds across clock wraparound.
    /// Tasks without a deadline are ignored; ties go to the task nearer the
    /// head. Returns `None` when no queued task has a deadline.
    pub fn nearest_deadline(&self, now: Instant) -> Option<&Task> {
        self.iter()
            .filter_map(|task| task.context().remaining(now).map(|left| (left, task)))
            .min_by_key(|(left, _)| *left)
            .map(|(_, task)| task)
    }
}

impl Default for TaskList {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over queued tasks, see [`TaskList::iter`].
pub struct Iter<'a> {
    nodes: &'a Slab<Node>,
    front: Option<usize>,
    back: Option<usize>,
    len: usize,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Task;

    fn next(&mut self) -> Option<&'a Task> {
        if self.len == 0 {
            return None;
        }
        let nodes = self.nodes;
        let node = &nodes[self.front?];
        self.front = node.next;
        self.len -= 1;
        Some(&node.task)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.len, Some(self.len))
    }
}

impl<'a> DoubleEndedIterator for Iter<'a> {
    fn next_back(&mut self) -> Option<&'a Task> {
        if self.len == 0 {
            return None;
        }
        let nodes = self.nodes;
        let node = &nodes[self.back?];
        self.back = node.prev;
        self.len -= 1;
        Some(&node.task)
    }
}

impl ExactSizeIterator for Iter<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Priority, TaskContext, TaskId, TaskSpec};
    use std::vec::Vec;

    fn noop(_: &TaskContext) {}

    fn task(id: u32, priority: Priority) -> Task {
        Task::new(TaskId::new(id), TaskSpec::new(noop, &[], priority), Instant::ZERO)
    }

    fn task_with_deadline(id: u32, deadline: Option<u32>) -> Task {
        let mut spec = TaskSpec::new(noop, &[], Priority::NORMAL);
        if let Some(deadline) = deadline {
            spec = spec.deadline(Instant::from_ticks(deadline));
        }
        Task::new(TaskId::new(id), spec, Instant::ZERO)
    }

    fn ids(list: &TaskList) -> Vec<u32> {
        list.iter().map(|t| t.id().as_u32()).collect()
    }

    /// Forward and backward traversals agree and every link is mirrored.
    fn assert_links_consistent(list: &TaskList) {
        let forward: Vec<u32> = ids(list);
        let mut backward: Vec<u32> = list.iter().rev().map(|t| t.id().as_u32()).collect();
        backward.reverse();
        assert_eq!(forward, backward);
        assert_eq!(forward.len(), list.len());

        if let Some(head) = list.head {
            assert_eq!(list.nodes[head].prev, None, "head has a predecessor");
        }
        if let Some(tail) = list.tail {
            assert_eq!(list.nodes[tail].next, None, "tail has a successor");
        }
        for (key, node) in list.nodes.iter() {
            if let Some(next) = node.next {
                assert_eq!(list.nodes[next].prev, Some(key));
            }
            if let Some(prev) = node.prev {
                assert_eq!(list.nodes[prev].next, Some(key));
            }
        }
    }

    #[test]
    fn test_ascending_priority_and_fifo_within_priority() {
        let mut list = TaskList::new();
        let priorities = [3, 1, 4, 1, 5, 2, 3, 4, 2, 1];
        for (id, p) in priorities.iter().enumerate() {
            list.insert(task(id as u32, Priority::new(*p)));
        }
        assert_links_consistent(&list);

        let order: Vec<(u32, u32)> = list
            .iter()
            .map(|t| (t.priority().rank(), t.id().as_u32()))
            .collect();
        // Sorting by priority alone is stable, so this is the FIFO-within-priority order.
        let mut expected: Vec<(u32, u32)> = priorities
            .iter()
            .enumerate()
            .map(|(id, p)| (*p, id as u32))
            .collect();
        expected.sort_by_key(|(p, _)| *p);
        assert_eq!(order, expected);
    }

    #[test]
    fn test_lcg_sequences_stay_sorted() {
        let mut seed: u32 = 0x1234_5678;
        for round in 0..20 {
            let mut list = TaskList::new();
            for id in 0..(5 + round) {
                seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                let priority = 1 + (seed >> 24) % 6;
                list.insert(task(id, Priority::new(priority)));
            }
            assert_links_consistent(&list);

            let order: Vec<(u32, u32)> = list
                .iter()
                .map(|t| (t.priority().rank(), t.id().as_u32()))
                .collect();
            assert!(order.windows(2).all(|w| w[0] <= w[1]), "round {}: {:?}", round, order);
        }
    }

    #[test]
    fn test_lower_priority_value_goes_before_head() {
        let mut list = TaskList::new();
        list.insert(task(1, Priority::LOW));
        list.insert(task(2, Priority::HIGH));
        assert_eq!(ids(&list), [2, 1]);
        assert_links_consistent(&list);
    }

    #[test]
    fn test_immediate_goes_to_head_newest_first() {
        let mut list = TaskList::new();
        list.insert(task(1, Priority::REALTIME));
        list.insert(task(2, Priority::NOW));
        list.insert(task(3, Priority::NORMAL));
        list.insert(task(4, Priority::NOW));

        assert_eq!(ids(&list), [4, 2, 1, 3]);
        assert_eq!(list.head().map(|t| t.id()), Some(TaskId::new(4)));
        assert_links_consistent(&list);
    }

    #[test]
    fn test_mixed_scenario_run_order() {
        let mut list = TaskList::new();
        list.insert(task(0xA, Priority::new(3)));
        list.insert(task(0xB, Priority::new(1)));
        list.insert(task(0xC, Priority::new(3)));
        list.insert(task(0xD, Priority::NOW));

        let mut order = Vec::new();
        while let Some(t) = list.remove_head() {
            order.push(t.id().as_u32());
            assert_links_consistent(&list);
        }
        assert_eq!(order, [0xD, 0xB, 0xA, 0xC]);
    }

    #[test]
    fn test_singleton_round_trip() {
        let mut list = TaskList::new();
        list.insert(task(42, Priority::HIGH));
        assert_eq!(list.len(), 1);

        let removed = list.remove_head().expect("one task queued");
        assert_eq!(removed.id(), TaskId::new(42));
        assert!(list.is_empty());
        assert_eq!(list.len(), 0);
        assert_eq!(list.head, None);
        assert_eq!(list.tail, None);
    }

    #[test]
    fn test_remove_head_on_empty_is_none() {
        let mut list = TaskList::new();
        assert!(list.remove_head().is_none());
        assert!(list.head().is_none());
        assert_eq!(list.iter().count(), 0);
    }

    #[test]
    fn test_iter_is_restartable_and_read_only() {
        let mut list = TaskList::new();
        list.insert(task(1, Priority::NORMAL));
        list.insert(task(2, Priority::HIGH));

        assert_eq!(ids(&list), [2, 1]);
        assert_eq!(ids(&list), [2, 1]);
        assert_eq!(list.iter().len(), 2);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_tail_insert_after_removals() {
        let mut list = TaskList::new();
        list.insert(task(1, Priority::HIGH));
        list.insert(task(2, Priority::LOW));
        list.remove_head();
        list.remove_head();
        list.insert(task(3, Priority::NORMAL));
        list.insert(task(4, Priority::LOW));
        list.insert(task(5, Priority::NORMAL));

        assert_eq!(ids(&list), [3, 5, 4]);
        assert_links_consistent(&list);
    }

    #[test]
    fn test_nearest_deadline_picks_smallest_remaining() {
        let mut list = TaskList::new();
        list.insert(task_with_deadline(1, Some(100)));
        list.insert(task_with_deadline(2, Some(50)));
        list.insert(task_with_deadline(3, None));
        list.insert(task_with_deadline(4, Some(200)));

        let picked = list.nearest_deadline(Instant::from_ticks(10));
        assert_eq!(picked.map(|t| t.id()), Some(TaskId::new(2)));
        // The query does not reorder anything.
        assert_eq!(ids(&list), [1, 2, 3, 4]);
    }

    #[test]
    fn test_nearest_deadline_none_without_deadlines() {
        let mut list = TaskList::new();
        assert!(list.nearest_deadline(Instant::ZERO).is_none());

        list.insert(task_with_deadline(1, None));
        list.insert(task_with_deadline(2, None));
        assert!(list.nearest_deadline(Instant::from_ticks(10)).is_none());
    }

    #[test]
    fn test_nearest_deadline_across_clock_wrap() {
        let now = Instant::from_ticks(u32::MAX - 10);
        let mut list = TaskList::new();
        // Wrapped: 11 + 5 = 16 ticks out, numerically tiny.
        list.insert(task_with_deadline(1, Some(5)));
        // 9 ticks out, just before the wrap.
        list.insert(task_with_deadline(2, Some(u32::MAX - 1)));
        // Wrapped: 11 + 40 = 51 ticks out.
        list.insert(task_with_deadline(3, Some(40)));

        let picked = list.nearest_deadline(now);
        assert_eq!(picked.map(|t| t.id()), Some(TaskId::new(2)));

        // Once the clock itself has wrapped, task 2 is overdue and task 1 is
        // 2 ticks out; the overdue one still ranks first.
        let picked = list.nearest_deadline(Instant::from_ticks(3));
        assert_eq!(picked.map(|t| t.id()), Some(TaskId::new(2)));

        let mut list = TaskList::new();
        list.insert(task_with_deadline(1, Some(40)));
        list.insert(task_with_deadline(3, Some(5)));
        assert_eq!(list.nearest_deadline(now).map(|t| t.id()), Some(TaskId::new(3)));
    }

    #[test]
    fn test_nearest_deadline_prefers_overdue() {
        let mut list = TaskList::new();
        list.insert(task_with_deadline(1, Some(20)));
        list.insert(task_with_deadline(2, Some(5)));

        // Task 2 passed its deadline 5 ticks ago; task 1 still has 10 left.
        let picked = list.nearest_deadline(Instant::from_ticks(10));
        assert_eq!(picked.map(|t| t.id()), Some(TaskId::new(2)));
    }

    #[test]
    fn test_nearest_deadline_tie_goes_to_queue_order() {
        let mut list = TaskList::new();
        list.insert(task_with_deadline(1, Some(30)));
        list.insert(task_with_deadline(2, Some(30)));

        let picked = list.nearest_deadline(Instant::ZERO);
        assert_eq!(picked.map(|t| t.id()), Some(TaskId::new(1)));
    }
}
