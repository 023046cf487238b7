//! Delay-aware FIFO queue backing the scheduler.
//!
//! Entries are ordered by insertion. [`DelayQueue::peek`] scans from the
//! front and returns the first entry that is not delayed, skipping over (but
//! not removing) any delayed entries in front of it — a job re-pushed with a
//! future `delay_until` does not block jobs queued after it.

use std::collections::VecDeque;
use std::time::Instant;

use crate::job::{Job, JobId, QueueEntry};

/// Ordered-by-insertion queue of jobs with a per-entry delay filter.
pub struct DelayQueue<T, O> {
    entries: VecDeque<QueueEntry<T, O>>,
}

impl<T, O> DelayQueue<T, O> {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    /// Append a job to the tail of the queue.
    pub fn push(&mut self, job: Job<T, O>, delay_until: Option<Instant>) {
        self.entries.push_back(QueueEntry { job, delay_until });
    }

    /// Return the first entry whose `delay_until` is absent or has elapsed.
    /// Delayed entries in front of it are left in place.
    pub fn peek(&self, now: Instant) -> Option<&Job<T, O>> {
        self.entries
            .iter()
            .find(|entry| entry.delay_until.is_none_or(|t| t <= now))
            .map(|entry| &entry.job)
    }

    /// Remove and return the job with the given id, wherever it sits in the
    /// queue.
    pub fn remove(&mut self, id: JobId) -> Option<Job<T, O>> {
        let pos = self.entries.iter().position(|e| e.job.id() == id)?;
        self.entries.remove(pos).map(|e| e.job)
    }

    /// Total entry count, including delayed entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T, O> Default for DelayQueue<T, O> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobId;
    use std::time::Duration;

    fn job(id: u64, data: u32) -> Job<u32, u32> {
        Job::new(JobId(id), data, None)
    }

    #[test]
    fn peek_skips_delayed_front_entries() {
        let mut q: DelayQueue<u32, u32> = DelayQueue::new();
        let now = Instant::now();
        q.push(job(1, 1), Some(now + Duration::from_secs(60)));
        q.push(job(2, 2), None);

        let ready = q.peek(now).expect("second job should be ready");
        assert_eq!(ready.data, 2);
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn peek_returns_none_when_all_delayed() {
        let mut q: DelayQueue<u32, u32> = DelayQueue::new();
        let now = Instant::now();
        q.push(job(1, 1), Some(now + Duration::from_secs(60)));
        assert!(q.peek(now).is_none());
    }

    #[test]
    fn remove_by_id_drops_correct_entry() {
        let mut q: DelayQueue<u32, u32> = DelayQueue::new();
        q.push(job(1, 1), None);
        q.push(job(2, 2), None);

        let removed = q.remove(JobId(1)).expect("job 1 should exist");
        assert_eq!(removed.data, 1);
        assert_eq!(q.len(), 1);
        assert_eq!(q.peek(Instant::now()).expect("job 2 remains").data, 2);
    }
}
