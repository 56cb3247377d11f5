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

use crate::flit::FlitKey;
use crate::link::Timed;
use crate::Cycle;

/// Flow-control message returning one buffer slot of `vc` upstream.
///
/// `is_free_signal` is set on the last flit of a packet: the whole VC is
/// released, not just one slot.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Credit {
    pub vc: usize,
    pub is_free_signal: bool,
    pub time: Cycle,
    pub flit: FlitKey,
}

impl Credit {
    pub fn new(vc: usize, is_free_signal: bool, time: Cycle, flit: FlitKey) -> Self {
        Self {
            vc,
            is_free_signal,
            time,
            flit,
        }
    }
}

impl Timed for Credit {
    fn time(&self) -> Cycle {
        self.time
    }

    fn set_time(&mut self, time: Cycle) {
        self.time = time;
    }
}
