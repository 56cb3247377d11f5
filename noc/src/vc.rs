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

use crate::flit::{Flit, FlitStage, Payload};
use crate::link::FlitBuffer;
use crate::Cycle;

/// Occupancy of a virtual channel. A VC only leaves `Idle` for a new
/// packet and only returns to it after that packet's tail.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VcState {
    Idle,
    /// Never entered: a head binds its route and buffers in the same cycle,
    /// so a VC goes straight from `Idle` to `Active`. Kept so waveform
    /// dumps use the three-state encoding.
    Allocated,
    Active,
}

impl VcState {
    /// Encoding used in waveform dumps.
    pub fn as_u64(&self) -> u64 {
        match self {
            VcState::Idle => 0,
            VcState::Allocated => 1,
            VcState::Active => 2,
        }
    }
}

/// One buffer lane of an input port.
#[derive(Clone, Debug)]
pub struct VirtualChannel {
    id: usize,
    buffer: FlitBuffer,
    state: (VcState, Cycle),
    outport: Option<usize>,
    outvc: Option<usize>,
}

impl VirtualChannel {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            buffer: FlitBuffer::new(),
            state: (VcState::Idle, 0),
            outport: None,
            outvc: None,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn state(&self) -> VcState {
        self.state.0
    }

    /// True when the VC is in `state` and entered it at or before `now`.
    pub fn is_in_state(&self, state: VcState, now: Cycle) -> bool {
        self.state.0 == state && self.state.1 <= now
    }

    pub fn set_active(&mut self, now: Cycle) {
        self.state = (VcState::Active, now);
    }

    pub fn set_idle(&mut self, now: Cycle) {
        self.state = (VcState::Idle, now);
        self.outport = None;
        self.outvc = None;
    }

    pub fn grant_outport(&mut self, outport: usize) {
        self.outport = Some(outport);
    }

    pub fn outport(&self) -> Option<usize> {
        self.outport
    }

    pub fn grant_outvc(&mut self, outvc: usize) {
        self.outvc = Some(outvc);
    }

    pub fn outvc(&self) -> Option<usize> {
        self.outvc
    }

    /// Does the top flit wait for `stage` by `now`?
    pub fn need_stage(&self, stage: FlitStage, now: Cycle) -> bool {
        self.buffer
            .peek()
            .map_or(false, |flit| flit.is_stage(stage, now))
    }

    pub fn insert_flit(&mut self, flit: Flit) {
        self.buffer.insert(flit);
    }

    pub fn peek_top_flit(&self) -> Option<&Flit> {
        self.buffer.peek()
    }

    pub fn consume_top_flit(&mut self) -> Option<Flit> {
        self.buffer.consume()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn functional_write(&mut self, update: &Payload) -> u32 {
        self.buffer
            .iter_mut()
            .map(|flit| flit.functional_write(update) as u32)
            .sum()
    }
}
