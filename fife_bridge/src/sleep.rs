use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet};

/// Opaque handle a script registered through `FIFE_RegisterObject`.
pub type ScriptHandle = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sleeping {
    pub handle: ScriptHandle,
    pub sleep_tick: u32,
    pub wake_tick: u32,
    seq: u64,
}

impl Sleeping {
    /// Ticks elapsed past the requested wake time at `now`.
    pub fn overslept(&self, now: u32) -> u32 {
        now.saturating_sub(self.wake_tick)
    }
}

// Ties on wake_tick fall back to registration order.
impl Ord for Sleeping {
    fn cmp(&self, other: &Self) -> Ordering {
        self.wake_tick
            .cmp(&other.wake_tick)
            .then(self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for Sleeping {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Min-heap of pending wake-ups with at most one entry per handle.
#[derive(Debug, Default)]
pub struct SleepQueue {
    heap: BinaryHeap<Reverse<Sleeping>>,
    sleeping: HashSet<ScriptHandle>,
    next_seq: u64,
}

impl SleepQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `handle` to wake `ticks` after `now`. Returns `false`
    /// without touching the heap when the handle is already asleep.
    pub fn schedule(&mut self, handle: ScriptHandle, now: u32, ticks: u32) -> bool {
        if !self.sleeping.insert(handle) {
            return false;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(Sleeping {
            handle,
            sleep_tick: now,
            wake_tick: now.saturating_add(ticks),
            seq,
        }));
        true
    }

    pub fn is_sleeping(&self, handle: ScriptHandle) -> bool {
        self.sleeping.contains(&handle)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn next_wake(&self) -> Option<u32> {
        self.heap.peek().map(|Reverse(entry)| entry.wake_tick)
    }

    /// Remove every entry due at `now`, earliest first. Handles are released
    /// before the caller fires them, so a callback may sleep again.
    pub fn take_due(&mut self, now: u32) -> Vec<Sleeping> {
        let mut due = Vec::new();
        while let Some(Reverse(entry)) = self.heap.peek() {
            if entry.wake_tick > now {
                break;
            }
            let Some(Reverse(entry)) = self.heap.pop() else {
                break;
            };
            self.sleeping.remove(&entry.handle);
            due.push(entry);
        }
        due
    }
}
