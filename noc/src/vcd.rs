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

use chrono;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::Display;
use std::fs;
use std::io;
use std::path;
use std::rc::Rc;
use vcd;

const DEFAULT_VCD_FILE: &str = "noc.vcd";
pub const DEFAULT_TOP_MODULE: &str = "network";
const DEFAULT_VCD_HEADER: &str = "noc VCD";

pub struct VcdWriter {
    writer: vcd::Writer<fs::File>,
    is_error_state: bool,
    scope_stack: Vec<String>,
    id_map: HashMap<String, (vcd::IdCode, usize)>,
    last_value_map: HashMap<vcd::IdCode, u64>,
}

pub struct VcdTraceScope {
    writer: Rc<RefCell<VcdWriter>>,
    scope: String,
}

impl Drop for VcdTraceScope {
    fn drop(&mut self) {
        self.writer.borrow_mut().leave_scope(self.scope.as_str());
    }
}

pub struct VcdDeclScope {
    writer: Rc<RefCell<VcdWriter>>,
    scope: String,
}

impl Drop for VcdDeclScope {
    fn drop(&mut self) {
        self.writer.borrow_mut().upscope(self.scope.as_str());
    }
}

impl VcdWriter {
    pub fn new(dst: path::PathBuf) -> io::Result<Self> {
        let dst_file = fs::File::create(&dst)?;
        log::debug!("VCD file: {}", dst.display());
        Ok(Self {
            writer: vcd::Writer::new(dst_file),
            is_error_state: false,
            scope_stack: vec![],
            id_map: HashMap::new(),
            last_value_map: HashMap::new(),
        })
    }

    /// A writer dumping into the system temp directory.
    pub fn in_temp_dir() -> io::Result<Self> {
        let mut vcd_path = std::env::temp_dir();
        vcd_path.push(DEFAULT_VCD_FILE);
        Self::new(vcd_path)
    }

    fn vcd_error_handler(&mut self, err: io::Error) {
        if !self.is_error_state {
            self.is_error_state = true;
            log::error!("VCD writing failed with error {:?}", err)
        }
    }

    pub fn is_error_state(&self) -> bool {
        self.is_error_state
    }

    pub fn managed_decl_scope<T>(writer: Rc<RefCell<VcdWriter>>, scope: &T) -> VcdDeclScope
    where
        T: Display + ?Sized,
    {
        writer.borrow_mut().add_module(scope);
        VcdDeclScope {
            writer: Rc::clone(&writer),
            scope: scope.to_string(),
        }
    }

    pub fn managed_trace_scope<T>(writer: Rc<RefCell<VcdWriter>>, scope: &T) -> VcdTraceScope
    where
        T: Display + ?Sized,
    {
        writer.borrow_mut().enter_scope(scope);
        VcdTraceScope {
            writer: Rc::clone(&writer),
            scope: scope.to_string(),
        }
    }

    /// Declares every component's signals and records their initial values
    /// at time 0.
    pub fn write_header(writer: Rc<RefCell<Self>>, components: &[&dyn VcdComponent]) {
        {
            let mut w = writer.borrow_mut();
            let header = w
                .writer
                .comment(DEFAULT_VCD_HEADER)
                .and_then(|_| w.writer.date(chrono::Utc::now().to_string().as_str()));
            if let Err(err) = header {
                w.vcd_error_handler(err);
            }
        }
        {
            let _vcd_decl_scope =
                VcdWriter::managed_decl_scope(Rc::clone(&writer), DEFAULT_TOP_MODULE);
            for component in components {
                component.vcd_write_scope(Rc::clone(&writer));
            }
        }
        {
            let mut w = writer.borrow_mut();
            if let Err(err) = w.writer.enddefinitions() {
                w.vcd_error_handler(err);
            }
        }
        VcdWriter::trace_cycle(writer, 0, components);
    }

    /// Records the values of every component at `timestamp`.
    pub fn trace_cycle(writer: Rc<RefCell<Self>>, timestamp: u64, components: &[&dyn VcdComponent]) {
        writer.borrow_mut().timestamp(timestamp);
        let _vcd_trace_scope = VcdWriter::managed_trace_scope(Rc::clone(&writer), DEFAULT_TOP_MODULE);
        for component in components {
            component.vcd_trace(Rc::clone(&writer));
        }
    }

    fn timestamp(&mut self, timestamp: u64) {
        if self.is_error_state {
            return;
        }
        if let Err(err) = self.writer.timestamp(timestamp) {
            self.vcd_error_handler(err);
        }
    }

    fn enter_scope<T: Display + ?Sized>(&mut self, name: &T) {
        self.scope_stack.push(name.to_string())
    }

    fn leave_scope<T: Display + ?Sized>(&mut self, scope: &T) {
        let popped_scope = self.scope_stack.pop();
        debug_assert_eq!(popped_scope, Some(scope.to_string()));
    }

    fn add_module<T: Display + ?Sized>(&mut self, name: &T) {
        if self.is_error_state {
            return;
        }
        match self.writer.add_module(&name.to_string()) {
            Ok(()) => self.scope_stack.push(name.to_string()),
            Err(err) => self.vcd_error_handler(err),
        }
    }

    fn upscope<T: Display + ?Sized>(&mut self, scope: &T) {
        if self.is_error_state {
            return;
        }
        self.leave_scope(scope);
        if let Err(err) = self.writer.upscope() {
            self.vcd_error_handler(err);
        }
    }

    pub fn add_integer_var(&mut self, reference: &str, width: usize) {
        if self.is_error_state {
            return;
        }
        match self
            .writer
            .add_var(vcd::VarType::Integer, width as u32, reference, None)
        {
            Ok(var_id) => {
                let scoped_name = self.scoped_name(reference);
                if self.id_map.contains_key(scoped_name.as_str()) {
                    log::warn!("Scoped name {} was redefined for VCD dumps.", scoped_name);
                }
                self.id_map.insert(scoped_name, (var_id, width));
            }
            Err(err) => self.vcd_error_handler(err),
        }
    }

    /// Records `value` for `name` in the current scope if it changed.
    pub fn change_value(&mut self, name: &str, value: u64) {
        if self.is_error_state {
            return;
        }
        let scoped_name = self.scoped_name(name);
        let (id_code, width) = match self.id_map.get(scoped_name.as_str()) {
            Some(entry) => *entry,
            None => {
                log::warn!(
                    "No such scoped name {} was defined for VCD dumps.",
                    scoped_name
                );
                return;
            }
        };
        if self.last_value_map.get(&id_code) == Some(&value) {
            return;
        }
        let bits: Vec<vcd::Value> = (0..width)
            .rev()
            .map(|bit| {
                if (value >> bit) & 1 == 1 {
                    vcd::Value::V1
                } else {
                    vcd::Value::V0
                }
            })
            .collect();
        match self.writer.change_vector(id_code, &bits) {
            Ok(()) => {
                self.last_value_map.insert(id_code, value);
            }
            Err(err) => self.vcd_error_handler(err),
        }
    }

    fn scoped_name(&self, name: &str) -> String {
        self.scope_stack.join(".") + "." + name
    }
}

/// An object implementing `VcdComponent` declares the signals it traces and
/// records their values; it is responsible for its inner components.
pub trait VcdComponent {
    /// Declares this component's scope and variables.
    fn vcd_write_scope(&self, vcd_writer: Rc<RefCell<VcdWriter>>);

    /// Records the current values of the declared variables.
    fn vcd_trace(&self, vcd_writer: Rc<RefCell<VcdWriter>>);
}
