// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::Cycle;
use std::collections::BTreeSet;

/// Something that can be woken up. Interfaces sort before routers.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Target {
    Interface(usize),
    Router(usize),
}

/// Wakeups keyed by absolute cycle; duplicates coalesce.
#[derive(Clone, Debug, Default)]
pub struct EventQueue {
    events: BTreeSet<(Cycle, Target)>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, cycle: Cycle, target: Target) {
        self.events.insert((cycle, target));
    }

    pub fn next_cycle(&self) -> Option<Cycle> {
        self.events.iter().next().map(|(cycle, _)| *cycle)
    }

    /// Removes and returns every target due in the earliest cycle.
    pub fn pop_cycle(&mut self) -> Option<(Cycle, Vec<Target>)> {
        let cycle = self.next_cycle()?;
        let mut targets = vec![];
        while let Some((c, target)) = self.events.iter().next().copied() {
            if c != cycle {
                break;
            }
            self.events.remove(&(c, target));
            targets.push(target);
        }
        Some((cycle, targets))
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }
}
