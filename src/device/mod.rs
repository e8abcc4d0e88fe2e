//! V4L2 device access
//!
//! Every driver query the HTTP operations need goes through [`VideoNode`], one method per
//! ioctl. The production backend lives in [`node`]; tests use [`mock::MockProvider`].

pub mod caps;
pub mod mock;
#[cfg(feature = "hardware")]
pub mod node;

pub use caps::{BufferType, ControlType};

use crate::error::{Error, Result};
use serde::Serialize;
use v4l::FourCC;

/// File-system prefix every addressable device node must carry.
pub const NODE_PREFIX: &str = "video";

/// Result of `VIDIOC_QUERYCAP`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capability {
    /// Driver name
    pub driver: String,
    /// Card (device) name
    pub card: String,
    /// Bus location
    pub bus_info: String,
    /// Raw kernel version word
    pub version: u32,
    /// Capabilities of the whole physical device
    pub capabilities: u32,
}

/// One supported frame size of a pixel format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FrameSize {
    /// Exact resolution
    Discrete {
        /// Width in pixels
        width: u32,
        /// Height in pixels
        height: u32,
    },
    /// Resolution range
    Stepwise {
        /// Smallest width
        min_width: u32,
        /// Smallest height
        min_height: u32,
        /// Largest width
        max_width: u32,
        /// Largest height
        max_height: u32,
        /// Width increment
        step_width: u32,
        /// Height increment
        step_height: u32,
    },
}

/// Single-planar format fields returned by `VIDIOC_G_FMT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixFormat {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Pixel format code
    pub pixelformat: FourCC,
    /// Raw `V4L2_FIELD_*` value
    pub field: u32,
    /// Line stride in bytes
    pub bytesperline: u32,
    /// Buffer size in bytes
    pub sizeimage: u32,
    /// Raw `V4L2_COLORSPACE_*` value
    pub colorspace: u32,
    /// Driver private field
    pub private: u32,
    /// Format flags
    pub flags: u32,
}

/// Result of `VIDIOC_QUERYCTRL`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlInfo {
    /// Driver-assigned control id
    pub id: u32,
    /// Value type
    pub kind: ControlType,
    /// Human-readable name
    pub name: String,
    /// Lowest accepted value
    pub minimum: i32,
    /// Highest accepted value
    pub maximum: i32,
    /// Value increment
    pub step: i32,
    /// Default value
    pub default_value: i32,
    /// Raw `V4L2_CTRL_FLAG_*` mask
    pub flags: u32,
}

/// Result of `VIDIOC_QUERYMENU`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuItem {
    /// Entry of a MENU control
    Label(String),
    /// Entry of an INTEGER_MENU control
    Value(i64),
}

/// Driver queries against one open device node.
///
/// Implementations must release the underlying handle when dropped.
pub trait VideoNode {
    /// `VIDIOC_QUERYCAP`
    fn query_caps(&self) -> Result<Capability>;

    /// `VIDIOC_ENUM_FMT`: pixel format at `index` for the buffer type.
    fn enum_format(&self, buffer_type: BufferType, index: u32) -> Result<FourCC>;

    /// `VIDIOC_ENUM_FRAMESIZES`: frame size at `index` for the pixel format.
    fn enum_frame_size(&self, pixel_format: FourCC, index: u32) -> Result<FrameSize>;

    /// `VIDIOC_G_FMT`: currently configured format for the buffer type.
    fn format(&self, buffer_type: BufferType) -> Result<PixFormat>;

    /// `VIDIOC_QUERYCTRL`: `id` may carry the `NEXT_CTRL`/`NEXT_COMPOUND` cursor flags.
    fn query_control(&self, id: u32) -> Result<ControlInfo>;

    /// `VIDIOC_QUERYMENU`
    fn query_menu(&self, id: u32, kind: ControlType, index: u32) -> Result<MenuItem>;

    /// `VIDIOC_G_CTRL`
    fn control(&self, id: u32) -> Result<i32>;

    /// `VIDIOC_S_CTRL`
    fn set_control(&self, id: u32, value: i32) -> Result<()>;
}

/// Source of device nodes: discovery plus open.
pub trait DeviceProvider: Send + Sync {
    /// Candidate node names (e.g. "video0"), in listing order.
    fn node_names(&self) -> Vec<String>;

    /// Open a node for the duration of one request.
    fn open(&self, node: &str) -> Result<Box<dyn VideoNode>>;
}

/// Open a node by name, refusing anything that is not a `video*` node.
pub fn open_node(provider: &dyn DeviceProvider, node: &str) -> Result<Box<dyn VideoNode>> {
    if !node.starts_with(NODE_PREFIX) {
        return Err(Error::DeviceUnavailable(format!(
            "'{node}' is not a {NODE_PREFIX}* node"
        )));
    }
    provider.open(node)
}

/// Identity and capabilities of one device node, as listed by `GET /devices`.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    /// Node name, used as the JSON key
    #[serde(skip)]
    pub node: String,
    /// Driver name
    pub driver: String,
    /// Card name
    pub card: String,
    /// Bus location
    pub bus_info: String,
    /// Raw kernel version word
    pub version: u32,
    /// Decoded capability names
    pub capabilities: Vec<&'static str>,
}

impl crate::json::JsonEntry for DeviceInfo {
    fn json_key(&self) -> &str {
        &self.node
    }
}

/// List every node that opens and answers the capability query.
pub fn list_devices(provider: &dyn DeviceProvider) -> Vec<DeviceInfo> {
    let mut devices = Vec::new();

    for node in provider.node_names() {
        let handle = match open_node(provider, &node) {
            Ok(handle) => handle,
            Err(err) => {
                tracing::debug!(node = %node, error = %err, "skipping device");
                continue;
            }
        };

        match handle.query_caps() {
            Ok(cap) => devices.push(DeviceInfo {
                node,
                capabilities: caps::capability_names(cap.capabilities),
                driver: cap.driver,
                card: cap.card,
                bus_info: cap.bus_info,
                version: cap.version,
            }),
            Err(err) => {
                tracing::debug!(node = %node, error = %err, "capability query failed");
            }
        }
    }

    devices
}

/// Sort key placing "video2" before "video10".
pub(crate) fn node_order(name: &str) -> (Option<u32>, String) {
    let index = name
        .strip_prefix(NODE_PREFIX)
        .and_then(|suffix| suffix.parse::<u32>().ok());
    (index, name.to_string())
}

#[cfg(test)]
mod tests {
    use super::mock::{MockDevice, MockProvider};
    use super::*;

    #[test]
    fn test_open_rejects_foreign_prefix() {
        let provider = MockProvider::new();
        provider.insert("video0", MockDevice::webcam());
        assert!(matches!(
            open_node(&provider, "doesnotexist"),
            Err(Error::DeviceUnavailable(_))
        ));
        assert!(matches!(
            open_node(&provider, "video7"),
            Err(Error::DeviceUnavailable(_))
        ));
        assert!(open_node(&provider, "video0").is_ok());
    }

    #[test]
    fn test_list_devices_skips_failing_nodes() {
        let provider = MockProvider::new();
        provider.insert("video0", MockDevice::webcam());
        let mut broken = MockDevice::webcam();
        broken.fail_caps = true;
        provider.insert("video1", broken);

        let devices = list_devices(&provider);
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].node, "video0");
        assert_eq!(devices[0].capabilities, vec!["VIDEO_CAPTURE", "STREAMING"]);
    }

    #[test]
    fn test_node_order() {
        let mut names = vec!["video10", "video2", "video0", "videox"];
        names.sort_by_key(|n| node_order(n));
        assert_eq!(names, vec!["videox", "video0", "video2", "video10"]);
    }
}
