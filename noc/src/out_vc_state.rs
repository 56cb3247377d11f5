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

use crate::error::Error;
use crate::vc::VcState;
use crate::Cycle;

/// Upstream view of one downstream virtual channel: its occupancy and the
/// number of free buffer slots left.
#[derive(Clone, Debug)]
pub struct OutVcState {
    id: usize,
    state: (VcState, Cycle),
    credit_count: usize,
    max_credit_count: usize,
}

impl OutVcState {
    pub fn new(id: usize, max_credit_count: usize) -> Self {
        Self {
            id,
            state: (VcState::Idle, 0),
            credit_count: max_credit_count,
            max_credit_count,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn state(&self) -> VcState {
        self.state.0
    }

    pub fn set_state(&mut self, state: VcState, now: Cycle) {
        self.state = (state, now);
    }

    pub fn is_in_state(&self, state: VcState, now: Cycle) -> bool {
        self.state.0 == state && self.state.1 <= now
    }

    pub fn has_credit(&self) -> bool {
        self.credit_count > 0
    }

    pub fn credit_count(&self) -> usize {
        self.credit_count
    }

    pub fn increment_credit(&mut self) -> Result<(), Error> {
        if self.credit_count == self.max_credit_count {
            return Err(Error::CreditOverflow { vc: self.id });
        }
        self.credit_count += 1;
        Ok(())
    }

    pub fn decrement_credit(&mut self) -> Result<(), Error> {
        if self.credit_count == 0 {
            return Err(Error::CreditUnderflow { vc: self.id });
        }
        self.credit_count -= 1;
        Ok(())
    }
}
