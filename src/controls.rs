//! Control enumeration and control writes
//!
//! Controls are discovered with the driver's "next control" cursor: the id of the control
//! just returned, with `NEXT_CTRL | NEXT_COMPOUND` or-ed in, asks for the one after it.
//! The walk ends when the driver rejects the query.

use std::collections::BTreeMap;

use serde::{Serialize, Serializer};
use serde_json::Value;
use tracing::{debug, error};

use crate::device::caps::{control_flag_names, ctrl_flag};
use crate::device::{ControlInfo, ControlType, MenuItem, VideoNode};
use crate::error::Error;
use crate::json::JsonEntry;
use crate::names::normalize;

/// Cursor flags requesting the next control, compound controls included.
pub const NEXT_FLAGS: u32 = ctrl_flag::NEXT_CTRL | ctrl_flag::NEXT_COMPOUND;

/// Lazy walk over a device's control descriptors.
///
/// Finite and not restartable: once the driver signals the end, the cursor stays exhausted.
pub struct ControlCursor<'a> {
    node: &'a dyn VideoNode,
    id: u32,
    done: bool,
}

impl<'a> ControlCursor<'a> {
    /// Start a walk from the first control.
    pub fn new(node: &'a dyn VideoNode) -> Self {
        Self {
            node,
            id: 0,
            done: false,
        }
    }
}

impl Iterator for ControlCursor<'_> {
    type Item = ControlInfo;

    fn next(&mut self) -> Option<ControlInfo> {
        if self.done {
            return None;
        }

        match self.node.query_control(self.id | NEXT_FLAGS) {
            Ok(info) => {
                self.id = info.id;
                Some(info)
            }
            Err(err) => {
                debug!(last_id = self.id, error = %err, "end of control list");
                self.done = true;
                None
            }
        }
    }
}

/// Menu entry value as reported to clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuEntry {
    /// MENU label
    Label(String),
    /// INTEGER_MENU value
    Value(i64),
}

impl From<MenuItem> for MenuEntry {
    fn from(item: MenuItem) -> Self {
        match item {
            MenuItem::Label(label) => MenuEntry::Label(label),
            MenuItem::Value(value) => MenuEntry::Value(value),
        }
    }
}

impl Serialize for MenuEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MenuEntry::Label(label) => serializer.serialize_str(label),
            MenuEntry::Value(value) => serializer.collect_str(value),
        }
    }
}

/// A control with its current value and, for menu types, its menu.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlDescriptor {
    /// Driver-assigned id
    #[serde(skip)]
    pub id: u32,
    /// Raw driver name
    #[serde(skip)]
    pub name: String,
    /// Normalised identifier, used as the JSON key
    #[serde(skip)]
    pub canonical_id: String,
    /// Lowest value
    pub minimum: i32,
    /// Highest value
    pub maximum: i32,
    /// Default value
    #[serde(rename = "default")]
    pub default_value: i32,
    /// Increment
    pub step: i32,
    /// Current value
    pub value: i32,
    /// Value type
    #[serde(rename = "type")]
    pub kind: ControlType,
    /// Decoded flag names
    pub flags: Vec<&'static str>,
    /// Menu entries by index; empty for non-menu controls
    pub menu: BTreeMap<u32, MenuEntry>,
}

impl JsonEntry for ControlDescriptor {
    fn json_key(&self) -> &str {
        &self.canonical_id
    }
}

/// Enumerate every control that has a usable name and a readable value.
pub fn enumerate_controls(node: &dyn VideoNode) -> Vec<ControlDescriptor> {
    let mut controls = Vec::new();

    for info in ControlCursor::new(node) {
        let Some(canonical_id) = normalize(&info.name) else {
            debug!(id = info.id, "skipping control with oversized name");
            continue;
        };

        let value = match node.control(info.id) {
            Ok(value) => value,
            Err(err) => {
                debug!(control = %canonical_id, error = %err, "skipping unreadable control");
                continue;
            }
        };

        let menu = if info.kind.has_menu() {
            read_menu(node, &info)
        } else {
            BTreeMap::new()
        };

        controls.push(ControlDescriptor {
            id: info.id,
            canonical_id,
            kind: info.kind,
            minimum: info.minimum,
            maximum: info.maximum,
            default_value: info.default_value,
            step: info.step,
            value,
            flags: control_flag_names(info.flags),
            menu,
            name: info.name,
        });
    }

    controls
}

/// Query every non-negative index in `[minimum, maximum]`; indices the driver rejects are skipped.
fn read_menu(node: &dyn VideoNode, info: &ControlInfo) -> BTreeMap<u32, MenuEntry> {
    let mut menu = BTreeMap::new();
    if info.maximum < 0 || info.maximum < info.minimum {
        return menu;
    }

    for index in info.minimum.max(0) as u32..=info.maximum as u32 {
        match node.query_menu(info.id, info.kind, index) {
            Ok(item) => {
                menu.insert(index, item.into());
            }
            Err(err) => {
                debug!(id = info.id, index, error = %err, "menu index not available");
            }
        }
    }

    menu
}

/// Fixed message for non-numeric write values.
pub const NUMBERS_ONLY: &str = "Only numbers are expected";

/// Outcome of one control write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum WriteOutcome {
    /// Value read back after the write
    Applied(i32),
    /// Error text
    Failed(String),
}

/// Write outcome keyed by the control's canonical id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlWriteResult {
    /// Normalised control identifier
    pub canonical_id: String,
    /// Confirmed value or error
    pub outcome: WriteOutcome,
}

impl JsonEntry for ControlWriteResult {
    fn json_key(&self) -> &str {
        &self.canonical_id
    }
}

impl Serialize for ControlWriteResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.outcome.serialize(serializer)
    }
}

/// Apply every requested value whose key matches a control's canonical id.
///
/// Walks all controls once; keys that match no control are ignored, and each failure is
/// reported for its own control only.
pub fn set_controls(node: &dyn VideoNode, requested: &Value) -> Vec<ControlWriteResult> {
    let mut results = Vec::new();

    for info in ControlCursor::new(node) {
        let Some(canonical_id) = normalize(&info.name) else {
            continue;
        };
        let Some(requested_value) = requested.get(&canonical_id) else {
            continue;
        };

        let outcome = match requested_value.as_f64() {
            Some(number) => write_control(node, &info, &canonical_id, number),
            None => {
                let err = Error::ValidationFailed(NUMBERS_ONLY.to_string());
                error!(control = %canonical_id, "{NUMBERS_ONLY}");
                WriteOutcome::Failed(err.client_message())
            }
        };

        results.push(ControlWriteResult {
            canonical_id,
            outcome,
        });
    }

    results
}

fn write_control(
    node: &dyn VideoNode,
    info: &ControlInfo,
    canonical_id: &str,
    number: f64,
) -> WriteOutcome {
    // Saturating float-to-int conversion, fractional part truncated.
    let value = number as i32;
    debug!(control = %canonical_id, value, "set control");

    let confirmed = node
        .set_control(info.id, value)
        .and_then(|()| node.control(info.id));

    match confirmed {
        Ok(current) => {
            debug!(control = %canonical_id, value = current, "get control");
            WriteOutcome::Applied(current)
        }
        Err(err) => {
            error!(control = %canonical_id, error = %err, "control write failed");
            WriteOutcome::Failed(err.client_message())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::mock::{MockControl, MockDevice, MockNode};
    use crate::json::JsonObject;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn shared(device: MockDevice) -> (Arc<Mutex<MockDevice>>, MockNode) {
        let state = Arc::new(Mutex::new(device));
        let node = MockNode::new(Arc::clone(&state));
        (state, node)
    }

    #[test]
    fn test_cursor_visits_every_control_once() {
        let (_, node) = shared(MockDevice::webcam());
        let names: Vec<String> = ControlCursor::new(&node).map(|c| c.name).collect();
        assert_eq!(names, vec!["Brightness", "Power Line Frequency"]);

        let mut cursor = ControlCursor::new(&node);
        assert!(cursor.by_ref().count() == 2);
        assert!(cursor.next().is_none());
    }

    #[test]
    fn test_enumerate_controls_with_menu() {
        let (_, node) = shared(MockDevice::webcam());
        let controls = enumerate_controls(&node);
        assert_eq!(controls.len(), 2);

        let brightness = &controls[0];
        assert_eq!(brightness.canonical_id, "brightness");
        assert_eq!(brightness.value, 40);
        assert!(brightness.menu.is_empty());

        let power = &controls[1];
        assert_eq!(power.canonical_id, "power_line_frequency");
        assert_eq!(power.menu.len(), 3);
        assert_eq!(power.menu[&1], MenuEntry::Label("50 Hz".to_string()));
    }

    #[test]
    fn test_sparse_menu_spans_full_range() {
        let mut device = MockDevice::webcam();
        device.add_control(MockControl::menu(
            0x009a_0901,
            "Auto Exposure",
            0,
            4,
            &[(0, "Auto Mode"), (2, "Shutter Priority Mode"), (4, "Aperture")],
        ));
        let (_, node) = shared(device);

        let controls = enumerate_controls(&node);
        let exposure = controls
            .iter()
            .find(|c| c.canonical_id == "auto_exposure")
            .expect("auto exposure listed");
        let keys: Vec<u32> = exposure.menu.keys().copied().collect();
        assert_eq!(keys, vec![0, 2, 4]);
    }

    #[test]
    fn test_menu_with_negative_minimum_starts_at_zero() {
        let mut device = MockDevice::webcam();
        device.add_control(MockControl::menu(
            0x009a_091a,
            "Scene Mode",
            -1,
            2,
            &[(0, "None"), (1, "Backlight"), (2, "Beach/Snow")],
        ));
        let (_, node) = shared(device);

        let controls = enumerate_controls(&node);
        let scene = controls
            .iter()
            .find(|c| c.canonical_id == "scene_mode")
            .expect("scene mode listed");
        let keys: Vec<u32> = scene.menu.keys().copied().collect();
        assert_eq!(keys, vec![0, 1, 2]);
        assert_eq!(scene.menu[&2], MenuEntry::Label("Beach/Snow".to_string()));
    }

    #[test]
    fn test_integer_menu_values_serialize_as_strings() {
        let mut device = MockDevice::webcam();
        device.add_control(MockControl::integer_menu(
            0x009f_0901,
            "Link Frequency",
            0,
            1,
            &[(0, 456_000_000), (1, 912_000_000)],
        ));
        let (_, node) = shared(device);
        let controls = enumerate_controls(&node);
        let value = serde_json::to_value(JsonObject(&controls)).unwrap();
        assert_eq!(
            value["link_frequency"]["menu"],
            json!({"0": "456000000", "1": "912000000"})
        );
        assert_eq!(value["link_frequency"]["type"], "INTEGER_MENU");
    }

    #[test]
    fn test_control_listing_shape() {
        let (_, node) = shared(MockDevice::webcam());
        let controls = enumerate_controls(&node);
        let value = serde_json::to_value(JsonObject(&controls)).unwrap();
        assert_eq!(
            value["brightness"],
            json!({
                "type": "INTEGER",
                "minimum": 0,
                "maximum": 100,
                "default": 40,
                "step": 1,
                "value": 40,
                "flags": [],
                "menu": {},
            })
        );
        assert_eq!(
            value["power_line_frequency"]["menu"],
            json!({"0": "Disabled", "1": "50 Hz", "2": "60 Hz"})
        );
    }

    #[test]
    fn test_unreadable_and_badly_named_controls_are_skipped() {
        let mut device = MockDevice::webcam();
        let mut unreadable = MockControl::integer(0x0098_0901, "Contrast", 0, 10, 5);
        unreadable.fail_read = true;
        device.add_control(unreadable);
        device.add_control(MockControl::integer(0x0098_0902, &"x".repeat(200), 0, 1, 0));
        let (_, node) = shared(device);

        let ids: Vec<String> = enumerate_controls(&node)
            .into_iter()
            .map(|c| c.canonical_id)
            .collect();
        assert_eq!(ids, vec!["brightness", "power_line_frequency"]);
    }

    #[test]
    fn test_decoded_flags() {
        let mut device = MockDevice::webcam();
        let mut gain = MockControl::integer(0x0098_0913, "Gain", 0, 255, 10);
        gain.flags = ctrl_flag::SLIDER | ctrl_flag::INACTIVE;
        device.add_control(gain);
        let (_, node) = shared(device);

        let controls = enumerate_controls(&node);
        let gain = controls.iter().find(|c| c.canonical_id == "gain").unwrap();
        assert_eq!(gain.flags, vec!["INACTIVE", "SLIDER"]);
    }

    #[test]
    fn test_set_controls_round_trip() {
        let (state, node) = shared(MockDevice::webcam());
        let results = set_controls(&node, &json!({"brightness": 50}));
        assert_eq!(
            results,
            vec![ControlWriteResult {
                canonical_id: "brightness".to_string(),
                outcome: WriteOutcome::Applied(50),
            }]
        );
        assert_eq!(state.lock().unwrap().value_of("Brightness"), Some(50));
    }

    #[test]
    fn test_set_controls_reports_driver_clamped_value() {
        let (_, node) = shared(MockDevice::webcam());
        let results = set_controls(&node, &json!({"brightness": 250.7}));
        assert_eq!(results[0].outcome, WriteOutcome::Applied(100));
    }

    #[test]
    fn test_set_controls_rejects_non_numbers() {
        let (state, node) = shared(MockDevice::webcam());
        let results = set_controls(&node, &json!({"brightness": "high"}));
        assert_eq!(
            results[0].outcome,
            WriteOutcome::Failed("Error: Only numbers are expected".to_string())
        );
        assert_eq!(state.lock().unwrap().value_of("Brightness"), Some(40));
    }

    #[test]
    fn test_set_controls_reports_failed_read_back() {
        let mut device = MockDevice::webcam();
        let mut focus = MockControl::integer(0x009a_090a, "Focus Absolute", 0, 250, 0);
        focus.flags = ctrl_flag::WRITE_ONLY;
        device.add_control(focus);
        let (state, node) = shared(device);

        let results = set_controls(&node, &json!({"focus_absolute": 120}));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].canonical_id, "focus_absolute");
        match &results[0].outcome {
            WriteOutcome::Failed(text) => {
                assert_eq!(text, "Permission denied");
                assert!(!text.contains("os error"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(state.lock().unwrap().value_of("Focus Absolute"), Some(120));
    }

    #[test]
    fn test_set_controls_ignores_unknown_keys_and_reports_failures() {
        let mut device = MockDevice::webcam();
        let mut locked = MockControl::integer(0x0098_0901, "Contrast", 0, 10, 5);
        locked.flags = ctrl_flag::READ_ONLY;
        device.add_control(locked);
        let (_, node) = shared(device);

        let results = set_controls(
            &node,
            &json!({"contrast": 3, "power_line_frequency": 2, "does_not_exist": 1}),
        );
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].canonical_id, "contrast");
        assert!(matches!(results[0].outcome, WriteOutcome::Failed(ref text) if !text.contains("os error")));
        assert_eq!(results[1].canonical_id, "power_line_frequency");
        assert_eq!(results[1].outcome, WriteOutcome::Applied(2));

        let value = serde_json::to_value(JsonObject(&results)).unwrap();
        assert!(value["contrast"].is_string());
        assert_eq!(value["power_line_frequency"], 2);
    }
}
