//! Shared test fakes: a scriptable printer/sensor adapter, a scriptable
//! device link, and an in-memory variable store, used throughout the
//! orchestrator, endless-spool, and command test suites so none of them
//! needs a real serial port or host.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::AceError;
use crate::persist::VariableStore;
use crate::printer::PrinterAdapter;
use crate::protocol::{Response, SlotStatus};
use crate::transport::DeviceLink;

/// A fake [`PrinterAdapter`] with settable switch states and a recorded
/// history of every move/script call, built via [`FakePrinterBuilder`].
#[derive(Debug, Default)]
pub struct FakePrinter {
    extruder_present: bool,
    extruder_endstop: bool,
    toolhead_triggered: bool,
    printing_active: bool,
    pub move_log: Vec<(f64, i64)>,
    pub script_log: Vec<String>,
    store: HashMap<String, String>,
}

impl FakePrinter {
    pub fn builder() -> FakePrinterBuilder {
        FakePrinterBuilder::default()
    }

    pub fn set_extruder_present(&mut self, present: bool) {
        self.extruder_present = present;
        self.extruder_endstop = present;
    }

    pub fn set_toolhead_triggered(&mut self, triggered: bool) {
        self.toolhead_triggered = triggered;
    }

    pub fn set_printing_active(&mut self, active: bool) {
        self.printing_active = active;
    }
}

#[async_trait]
impl PrinterAdapter for FakePrinter {
    fn extruder_switch_present(&self) -> bool {
        self.extruder_present
    }

    fn extruder_endstop_triggered(&self) -> bool {
        self.extruder_endstop
    }

    fn toolhead_switch_triggered(&self) -> bool {
        self.toolhead_triggered
    }

    async fn move_extruder(&mut self, delta_mm: f64, feed_rate: i64) -> Result<(), AceError> {
        self.move_log.push((delta_mm, feed_rate));
        Ok(())
    }

    async fn run_script(&mut self, script: &str) -> Result<(), AceError> {
        self.script_log.push(script.to_string());
        Ok(())
    }

    fn is_printing_active(&self) -> bool {
        self.printing_active
    }

    fn reset_last_position(&mut self) {}
}

impl VariableStore for FakePrinter {
    fn get_raw(&self, key: &str) -> Option<String> {
        self.store.get(key).cloned()
    }

    fn set_raw(&mut self, key: &str, value: String) {
        self.store.insert(key.to_string(), value);
    }
}

/// Builder for [`FakePrinter`], grounded in the rest of the pack's
/// builder-style fake-state constructors.
#[derive(Debug, Default)]
pub struct FakePrinterBuilder {
    extruder_present: bool,
    toolhead_triggered: bool,
    printing_active: bool,
}

impl FakePrinterBuilder {
    pub fn extruder_present(mut self, present: bool) -> Self {
        self.extruder_present = present;
        self
    }

    pub fn toolhead_triggered(mut self, triggered: bool) -> Self {
        self.toolhead_triggered = triggered;
        self
    }

    pub fn printing_active(mut self, active: bool) -> Self {
        self.printing_active = active;
        self
    }

    pub fn build(self) -> FakePrinter {
        FakePrinter {
            extruder_present: self.extruder_present,
            extruder_endstop: self.extruder_present,
            toolhead_triggered: self.toolhead_triggered,
            printing_active: self.printing_active,
            move_log: Vec::new(),
            script_log: Vec::new(),
            store: HashMap::new(),
        }
    }
}

/// A fake [`DeviceLink`] that records every request sent to it and answers
/// with a rule-based response: success unless the method has been marked to
/// fail via [`FakeDeviceLink::fail_method`]. Device readiness and per-slot
/// status are set directly rather than derived from a scripted `get_status`,
/// since the orchestrator and endless-spool monitor read them through
/// [`DeviceLink::is_device_ready`]/[`DeviceLink::device_slot_status`] and
/// never issue `get_status` themselves (that is the writer's idle-poll job).
/// `Clone` shares the underlying state (an `Rc`, not a deep copy), mirroring
/// [`crate::transport::Transport`]'s own clone semantics so a cloned link
/// used by an [`crate::endless_spool::EndlessSpoolMonitor`] observes the same
/// calls and status as the orchestrator it was built from.
#[derive(Debug, Default, Clone)]
pub struct FakeDeviceLink {
    inner: Rc<RefCell<FakeDeviceLinkState>>,
}

#[derive(Debug)]
struct FakeDeviceLinkState {
    calls: Vec<(String, Value)>,
    ready: bool,
    slot_status: [Option<SlotStatus>; 4],
    failing_methods: HashSet<String>,
    noted_loaded_index: i32,
}

impl Default for FakeDeviceLinkState {
    fn default() -> Self {
        FakeDeviceLinkState {
            calls: Vec::new(),
            ready: false,
            slot_status: [None; 4],
            failing_methods: HashSet::new(),
            noted_loaded_index: -1,
        }
    }
}

impl FakeDeviceLink {
    /// A link that reports the device ready with every slot `ready`, which
    /// covers the common case without per-test boilerplate.
    pub fn new_ready() -> Self {
        let link = FakeDeviceLink::default();
        link.set_ready(true);
        for i in 0..4 {
            link.set_slot_status(i, SlotStatus::Ready);
        }
        link
    }

    pub fn set_ready(&self, ready: bool) {
        self.inner.borrow_mut().ready = ready;
    }

    pub fn set_slot_status(&self, index: usize, status: SlotStatus) {
        self.inner.borrow_mut().slot_status[index] = Some(status);
    }

    /// Every subsequent call to `method` responds with a nonzero `code`.
    pub fn fail_method(&self, method: &str) {
        self.inner.borrow_mut().failing_methods.insert(method.to_string());
    }

    /// Every request sent so far, in order, as `(method, params)`.
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.inner.borrow().calls.clone()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.inner.borrow().calls.iter().filter(|(m, _)| m == method).count()
    }

    /// The last value passed to [`DeviceLink::note_current_loaded_index`].
    pub fn noted_loaded_index(&self) -> i32 {
        self.inner.borrow().noted_loaded_index
    }
}

#[async_trait(?Send)]
impl DeviceLink for FakeDeviceLink {
    async fn send_request(&self, method: &str, params: Value) -> Result<Response, AceError> {
        let mut state = self.inner.borrow_mut();
        state.calls.push((method.to_string(), params));
        if state.failing_methods.contains(method) {
            Ok(Response {
                id: 0,
                code: 1,
                msg: format!("{method} failed"),
                result: json!({}),
            })
        } else {
            Ok(Response {
                id: 0,
                code: 0,
                msg: String::new(),
                result: json!({}),
            })
        }
    }

    fn is_device_ready(&self) -> bool {
        self.inner.borrow().ready
    }

    fn device_slot_status(&self, index: usize) -> Option<SlotStatus> {
        self.inner.borrow().slot_status.get(index).copied().flatten()
    }

    fn note_current_loaded_index(&self, index: i32) {
        self.inner.borrow_mut().noted_loaded_index = index;
    }
}
