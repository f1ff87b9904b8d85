// Copyright (C) 2024, the spdy crate authors.
// All rights reserved.
//
// Redistribution and use in source and binary forms, with or without
// modification, are permitted provided that the following conditions are
// met:
//
//     * Redistributions of source code must retain the above copyright notice,
//       this list of conditions and the following disclaimer.
//
//     * Redistributions in binary form must reproduce the above copyright
//       notice, this list of conditions and the following disclaimer in the
//       documentation and/or other materials provided with the distribution.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS
// IS" AND ANY EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT LIMITED TO,
// THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR
// PURPOSE ARE DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR
// CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL, SPECIAL,
// EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO,
// PROCUREMENT OF SUBSTITUTE GOODS OR SERVICES; LOSS OF USE, DATA, OR
// PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF
// LIABILITY, WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING
// NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE USE OF THIS
// SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::VecDeque;

/// Number of priority bands.
pub const PRIORITY_COUNT: usize = 6;

/// A request's priority band.
///
/// `Highest` is the numerically lowest band and is dispatched first.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Highest = 0,
    High    = 1,
    #[default]
    Medium  = 2,
    Low     = 3,
    Lowest  = 4,
    Idle    = 5,
}

impl Priority {
    pub fn from_wire(v: u8) -> Priority {
        match v {
            0 => Priority::Highest,
            1 => Priority::High,
            2 => Priority::Medium,
            3 => Priority::Low,
            4 => Priority::Lowest,

            // Out-of-range bands are clamped to the least urgent.
            _ => Priority::Idle,
        }
    }

    pub fn to_wire(self) -> u8 {
        self as u8
    }
}

/// Deterministic ordering of not-yet-activated stream requests.
///
/// Entries are dequeued by `(priority band ascending, enqueue sequence
/// ascending)`: a higher-priority request queued later jumps an earlier
/// lower-priority one, while equal-priority requests keep FIFO order.
/// Entries can be removed out of order (caller-side cancellation) without
/// disturbing the relative order of the rest.
#[derive(Default)]
pub struct PendingQueue {
    entries: BTreeMap<(u8, u64), u64>,
    index: HashMap<u64, (u8, u64)>,
    next_seq: u64,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, priority: Priority, request: u64) {
        let key = (priority.to_wire(), self.next_seq);
        self.next_seq += 1;

        self.entries.insert(key, request);
        self.index.insert(request, key);
    }

    /// Dequeues the highest-priority, earliest-queued request.
    pub fn pop(&mut self) -> Option<u64> {
        let (&key, &request) = self.entries.iter().next()?;

        self.entries.remove(&key);
        self.index.remove(&request);

        Some(request)
    }

    /// Removes an enqueued request, returning whether it was present.
    pub fn remove(&mut self, request: u64) -> bool {
        match self.index.remove(&request) {
            Some(key) => {
                self.entries.remove(&key);
                true
            },

            None => false,
        }
    }

    pub fn contains(&self, request: u64) -> bool {
        self.index.contains_key(&request)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes and returns every queued request, in dispatch order.
    pub fn drain(&mut self) -> Vec<u64> {
        self.index.clear();
        let entries = std::mem::take(&mut self.entries);

        entries.into_values().collect()
    }
}

/// FIFO-per-band queue of streams stalled by session flow control,
/// resumed highest-priority-first when the send window is replenished.
#[derive(Default)]
pub struct UnstallQueue {
    queues: [VecDeque<u64>; PRIORITY_COUNT],
}

impl UnstallQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, priority: Priority, request: u64) {
        let queue = &mut self.queues[priority as usize];

        if !queue.contains(&request) {
            queue.push_back(request);
        }
    }

    pub fn pop(&mut self) -> Option<u64> {
        self.queues.iter_mut().find_map(VecDeque::pop_front)
    }

    pub fn remove(&mut self, request: u64) {
        for queue in &mut self.queues {
            queue.retain(|&r| r != request);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.queues.iter().all(VecDeque::is_empty)
    }
}
