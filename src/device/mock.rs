//! In-memory device backend for testing.
//!
//! Simulates the parts of a V4L2 driver the HTTP operations rely on: the control cursor
//! protocol, sparse menus, range clamping on writes and per-query failures.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io;
use std::sync::{Arc, Mutex};

use v4l::FourCC;

use super::caps::{cap, ctrl_flag};
use super::{
    BufferType, Capability, ControlInfo, ControlType, DeviceProvider, FrameSize, MenuItem,
    PixFormat, VideoNode, node_order,
};
use crate::error::{Error, Result};

const EINVAL: i32 = 22;
const EACCES: i32 = 13;

fn einval(request: &'static str) -> Error {
    Error::query(request, io::Error::from_raw_os_error(EINVAL))
}

/// A simulated control.
#[derive(Debug, Clone)]
pub struct MockControl {
    /// Driver id
    pub id: u32,
    /// Raw name
    pub name: String,
    /// Value type
    pub kind: ControlType,
    /// Lowest value
    pub minimum: i32,
    /// Highest value
    pub maximum: i32,
    /// Increment
    pub step: i32,
    /// Default value
    pub default_value: i32,
    /// Raw flag mask
    pub flags: u32,
    /// Current value
    pub value: i32,
    /// Menu entries by index; indices missing here fail like a sparse driver menu
    pub menu: BTreeMap<u32, MenuItem>,
    /// Make `VIDIOC_G_CTRL` fail for this control
    pub fail_read: bool,
}

impl MockControl {
    /// Integer control with range `[minimum, maximum]`.
    pub fn integer(id: u32, name: &str, minimum: i32, maximum: i32, value: i32) -> Self {
        Self {
            id,
            name: name.to_string(),
            kind: ControlType::Integer,
            minimum,
            maximum,
            step: 1,
            default_value: value,
            flags: 0,
            value,
            menu: BTreeMap::new(),
            fail_read: false,
        }
    }

    /// Menu control whose listed indices resolve to labels.
    pub fn menu(id: u32, name: &str, minimum: i32, maximum: i32, labels: &[(u32, &str)]) -> Self {
        Self {
            kind: ControlType::Menu,
            menu: labels
                .iter()
                .map(|(idx, label)| (*idx, MenuItem::Label(label.to_string())))
                .collect(),
            ..Self::integer(id, name, minimum, maximum, minimum)
        }
    }

    /// Integer-menu control whose listed indices resolve to values.
    pub fn integer_menu(
        id: u32,
        name: &str,
        minimum: i32,
        maximum: i32,
        values: &[(u32, i64)],
    ) -> Self {
        Self {
            kind: ControlType::IntegerMenu,
            menu: values
                .iter()
                .map(|(idx, value)| (*idx, MenuItem::Value(*value)))
                .collect(),
            ..Self::integer(id, name, minimum, maximum, minimum)
        }
    }

    fn info(&self) -> ControlInfo {
        ControlInfo {
            id: self.id,
            kind: self.kind,
            name: self.name.clone(),
            minimum: self.minimum,
            maximum: self.maximum,
            step: self.step,
            default_value: self.default_value,
            flags: self.flags,
        }
    }
}

/// State of one simulated device node.
#[derive(Debug, Clone, Default)]
pub struct MockDevice {
    /// Driver name
    pub driver: String,
    /// Card name
    pub card: String,
    /// Bus location
    pub bus_info: String,
    /// Kernel version word
    pub version: u32,
    /// Capability mask
    pub capabilities: u32,
    /// Make `VIDIOC_QUERYCAP` fail
    pub fail_caps: bool,
    /// Pixel formats per buffer type, in driver order
    pub formats: HashMap<BufferType, Vec<FourCC>>,
    /// Frame sizes per pixel format, in driver order
    pub frame_sizes: Vec<(FourCC, Vec<FrameSize>)>,
    /// Buffer types whose `VIDIOC_ENUM_FMT` always fails
    pub failing_formats: HashSet<BufferType>,
    /// Current format per buffer type; missing types fail `VIDIOC_G_FMT`
    pub active: HashMap<BufferType, PixFormat>,
    /// Controls; kept sorted by id like a driver would
    pub controls: Vec<MockControl>,
}

impl MockDevice {
    /// A USB webcam: capture + streaming, YUYV and MJPG, brightness and a power-line menu.
    pub fn webcam() -> Self {
        let yuyv = FourCC::new(b"YUYV");
        let mjpg = FourCC::new(b"MJPG");
        let mut device = Self {
            driver: "uvcvideo".to_string(),
            card: "Mock Webcam".to_string(),
            bus_info: "usb-0000:00:14.0-1".to_string(),
            version: 0x0006_0800,
            capabilities: cap::VIDEO_CAPTURE | cap::STREAMING,
            ..Default::default()
        };
        device
            .formats
            .insert(BufferType::VideoCapture, vec![yuyv, mjpg]);
        device.frame_sizes = vec![
            (
                yuyv,
                vec![
                    FrameSize::Discrete {
                        width: 640,
                        height: 480,
                    },
                    FrameSize::Discrete {
                        width: 1280,
                        height: 720,
                    },
                ],
            ),
            (
                mjpg,
                vec![FrameSize::Stepwise {
                    min_width: 160,
                    min_height: 120,
                    max_width: 1920,
                    max_height: 1080,
                    step_width: 16,
                    step_height: 8,
                }],
            ),
        ];
        device.active.insert(
            BufferType::VideoCapture,
            PixFormat {
                width: 640,
                height: 480,
                pixelformat: yuyv,
                field: 1,
                bytesperline: 1280,
                sizeimage: 614_400,
                colorspace: 8,
                private: 0,
                flags: 0,
            },
        );
        device.add_control(MockControl::integer(0x0098_0900, "Brightness", 0, 100, 40));
        device.add_control(MockControl::menu(
            0x0098_0918,
            "Power Line Frequency",
            0,
            2,
            &[(0, "Disabled"), (1, "50 Hz"), (2, "60 Hz")],
        ));
        device
    }

    /// Insert a control, keeping id order.
    pub fn add_control(&mut self, control: MockControl) {
        self.controls.push(control);
        self.controls.sort_by_key(|c| c.id);
    }

    /// Current value of the control with the given raw name.
    pub fn value_of(&self, name: &str) -> Option<i32> {
        self.controls
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.value)
    }

    fn control_mut(&mut self, id: u32) -> Option<&mut MockControl> {
        self.controls.iter_mut().find(|c| c.id == id)
    }
}

/// Handle onto a shared [`MockDevice`].
pub struct MockNode {
    state: Arc<Mutex<MockDevice>>,
}

impl MockNode {
    /// Wrap shared device state.
    pub fn new(state: Arc<Mutex<MockDevice>>) -> Self {
        Self { state }
    }

    fn with<T>(&self, f: impl FnOnce(&mut MockDevice) -> Result<T>) -> Result<T> {
        let mut state = self.state.lock().expect("mock device mutex poisoned");
        f(&mut state)
    }
}

impl VideoNode for MockNode {
    fn query_caps(&self) -> Result<Capability> {
        self.with(|dev| {
            if dev.fail_caps {
                return Err(einval("VIDIOC_QUERYCAP"));
            }
            Ok(Capability {
                driver: dev.driver.clone(),
                card: dev.card.clone(),
                bus_info: dev.bus_info.clone(),
                version: dev.version,
                capabilities: dev.capabilities,
            })
        })
    }

    fn enum_format(&self, buffer_type: BufferType, index: u32) -> Result<FourCC> {
        self.with(|dev| {
            if dev.failing_formats.contains(&buffer_type) {
                return Err(einval("VIDIOC_ENUM_FMT"));
            }
            dev.formats
                .get(&buffer_type)
                .and_then(|formats| formats.get(index as usize))
                .copied()
                .ok_or_else(|| einval("VIDIOC_ENUM_FMT"))
        })
    }

    fn enum_frame_size(&self, pixel_format: FourCC, index: u32) -> Result<FrameSize> {
        self.with(|dev| {
            dev.frame_sizes
                .iter()
                .find(|(fourcc, _)| *fourcc == pixel_format)
                .and_then(|(_, sizes)| sizes.get(index as usize))
                .copied()
                .ok_or_else(|| einval("VIDIOC_ENUM_FRAMESIZES"))
        })
    }

    fn format(&self, buffer_type: BufferType) -> Result<PixFormat> {
        self.with(|dev| {
            dev.active
                .get(&buffer_type)
                .copied()
                .ok_or_else(|| einval("VIDIOC_G_FMT"))
        })
    }

    fn query_control(&self, id: u32) -> Result<ControlInfo> {
        self.with(|dev| {
            let cursor_flags = ctrl_flag::NEXT_CTRL | ctrl_flag::NEXT_COMPOUND;
            let base = id & !cursor_flags;
            let found = if id & ctrl_flag::NEXT_CTRL != 0 {
                dev.controls.iter().find(|c| c.id > base)
            } else {
                dev.controls.iter().find(|c| c.id == base)
            };
            found
                .map(MockControl::info)
                .ok_or_else(|| einval("VIDIOC_QUERYCTRL"))
        })
    }

    fn query_menu(&self, id: u32, _kind: ControlType, index: u32) -> Result<MenuItem> {
        self.with(|dev| {
            dev.controls
                .iter()
                .find(|c| c.id == id)
                .and_then(|c| c.menu.get(&index))
                .cloned()
                .ok_or_else(|| einval("VIDIOC_QUERYMENU"))
        })
    }

    fn control(&self, id: u32) -> Result<i32> {
        self.with(|dev| {
            let control = dev
                .controls
                .iter()
                .find(|c| c.id == id)
                .ok_or_else(|| einval("VIDIOC_G_CTRL"))?;
            if control.fail_read || control.flags & ctrl_flag::WRITE_ONLY != 0 {
                return Err(Error::query(
                    "VIDIOC_G_CTRL",
                    io::Error::from_raw_os_error(EACCES),
                ));
            }
            Ok(control.value)
        })
    }

    fn set_control(&self, id: u32, value: i32) -> Result<()> {
        self.with(|dev| {
            let control = dev
                .control_mut(id)
                .ok_or_else(|| einval("VIDIOC_S_CTRL"))?;
            if control.flags & ctrl_flag::READ_ONLY != 0 {
                return Err(Error::query(
                    "VIDIOC_S_CTRL",
                    io::Error::from_raw_os_error(EACCES),
                ));
            }
            control.value = value.clamp(control.minimum, control.maximum);
            Ok(())
        })
    }
}

/// Provider serving a fixed set of simulated nodes.
#[derive(Default)]
pub struct MockProvider {
    devices: Mutex<BTreeMap<String, Arc<Mutex<MockDevice>>>>,
}

impl MockProvider {
    /// Create an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a node and return its shared state.
    pub fn insert(&self, node: &str, device: MockDevice) -> Arc<Mutex<MockDevice>> {
        let state = Arc::new(Mutex::new(device));
        self.devices
            .lock()
            .expect("mock provider mutex poisoned")
            .insert(node.to_string(), Arc::clone(&state));
        state
    }
}

impl DeviceProvider for MockProvider {
    fn node_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .devices
            .lock()
            .expect("mock provider mutex poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort_by_key(|name| node_order(name));
        names
    }

    fn open(&self, node: &str) -> Result<Box<dyn VideoNode>> {
        let devices = self.devices.lock().expect("mock provider mutex poisoned");
        let state = devices
            .get(node)
            .ok_or_else(|| Error::DeviceUnavailable(format!("/dev/{node}: No such device")))?;
        Ok(Box::new(MockNode::new(Arc::clone(state))))
    }
}
