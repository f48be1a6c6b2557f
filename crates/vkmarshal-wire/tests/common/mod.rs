//! Shared fixtures: a fake driver that hands out sequential handles.

#![allow(dead_code)]

use vkmarshal_types::handle::is_handle_type;
use vkmarshal_types::VulkanApi;
use vkmarshal_wire::{Fields, HostDriver, Value};

pub const FIRST_DRIVER_HANDLE: u64 = 0x1000;

#[derive(Default)]
pub struct FakeDriver {
    next: u64,
    pub calls: Vec<String>,
    /// Parameters as the driver saw them, after outputs were filled in.
    pub seen: Vec<(String, Fields)>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self {
            next: FIRST_DRIVER_HANDLE,
            ..Self::default()
        }
    }

    fn fresh(&mut self) -> u64 {
        let h = self.next;
        self.next += 1;
        h
    }

    pub fn count(&self, api: &str) -> usize {
        self.calls.iter().filter(|c| *c == api).count()
    }

    pub fn last(&self, api: &str) -> Option<&Fields> {
        self.seen.iter().rev().find(|(n, _)| n == api).map(|(_, p)| p)
    }
}

impl HostDriver for FakeDriver {
    fn call(&mut self, api: &VulkanApi, params: &mut Fields) -> Value {
        self.calls.push(api.name.clone());
        for (i, param) in api.parameters.iter().enumerate() {
            if !param.is_output() || !is_handle_type(&param.type_name) {
                continue;
            }
            match &mut params[i].1 {
                Value::Handle(h) => *h = self.fresh(),
                Value::Array(items) => {
                    for item in items.iter_mut() {
                        *item = Value::Handle(self.fresh());
                    }
                }
                _ => {}
            }
        }
        self.seen.push((api.name.clone(), params.clone()));
        if api.has_return() {
            Value::Int(0)
        } else {
            Value::Null
        }
    }
}

pub fn param<'a>(params: &'a Fields, name: &str) -> &'a Value {
    params
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v)
        .unwrap_or_else(|| panic!("no parameter {name}"))
}

pub fn set(params: &mut Fields, name: &str, value: impl Into<Value>) {
    let slot = params
        .iter_mut()
        .find(|(n, _)| n == name)
        .unwrap_or_else(|| panic!("no parameter {name}"));
    slot.1 = value.into();
}
