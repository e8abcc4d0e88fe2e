//! Pixel format enumeration and active format readout

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use tracing::debug;
use v4l::FourCC;

use crate::device::caps::{colorspace_name, field_name};
use crate::device::{BufferType, FrameSize, PixFormat, VideoNode};
use crate::json::JsonEntry;

/// Render a FourCC as its four characters.
pub fn fourcc_string(fourcc: &FourCC) -> String {
    String::from_utf8_lossy(&fourcc.repr).into_owned()
}

fn serialize_fourcc<S: Serializer>(fourcc: &FourCC, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&fourcc_string(fourcc))
}

/// One pixel format paired with one of its frame sizes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelFormatDescriptor {
    /// Pixel format code
    pub fourcc: FourCC,
    /// Supported size
    pub frame_size: FrameSize,
}

/// Every format/size pair a buffer type supports, in driver order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferFormats {
    /// Buffer type
    pub buffer_type: BufferType,
    /// Formats in discovery order, one entry per frame size
    pub formats: Vec<PixelFormatDescriptor>,
}

impl JsonEntry for BufferFormats {
    fn json_key(&self) -> &str {
        self.buffer_type.name()
    }
}

impl Serialize for BufferFormats {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.formats.len()))?;
        for descriptor in &self.formats {
            map.serialize_entry(&fourcc_string(&descriptor.fourcc), &descriptor.frame_size)?;
        }
        map.end()
    }
}

/// Enumerate the formats and frame sizes of every supported buffer type.
///
/// A failing capability query yields an empty list; a failing buffer type yields an empty
/// entry for that type while the others are still enumerated.
pub fn enumerate_formats(node: &dyn VideoNode) -> Vec<BufferFormats> {
    let capabilities = match node.query_caps() {
        Ok(cap) => cap.capabilities,
        Err(err) => {
            debug!(error = %err, "capability query failed, no formats reported");
            return Vec::new();
        }
    };

    BufferType::ALL
        .into_iter()
        .filter(|ty| ty.supported_by(capabilities, false))
        .map(|buffer_type| BufferFormats {
            buffer_type,
            formats: formats_for(node, buffer_type),
        })
        .collect()
}

fn formats_for(node: &dyn VideoNode, buffer_type: BufferType) -> Vec<PixelFormatDescriptor> {
    let mut formats = Vec::new();

    for index in 0.. {
        let fourcc = match node.enum_format(buffer_type, index) {
            Ok(fourcc) => fourcc,
            Err(err) => {
                debug!(%buffer_type, index, error = %err, "end of format list");
                break;
            }
        };

        for size_index in 0.. {
            match node.enum_frame_size(fourcc, size_index) {
                Ok(frame_size) => formats.push(PixelFormatDescriptor { fourcc, frame_size }),
                Err(_) => break,
            }
        }
    }

    formats
}

/// Currently configured format of one buffer type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveFormat {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Pixel format code
    #[serde(serialize_with = "serialize_fourcc")]
    pub pixelformat: FourCC,
    /// Field order name
    pub field: String,
    /// Line stride in bytes
    pub bytesperline: u32,
    /// Buffer size in bytes
    pub sizeimage: u32,
    /// Colorspace name
    pub colorspace: String,
    /// Driver private field
    #[serde(rename = "priv")]
    pub private: u32,
    /// Format flags
    pub flags: u32,
}

impl From<PixFormat> for ActiveFormat {
    fn from(pix: PixFormat) -> Self {
        Self {
            width: pix.width,
            height: pix.height,
            pixelformat: pix.pixelformat,
            field: field_name(pix.field),
            bytesperline: pix.bytesperline,
            sizeimage: pix.sizeimage,
            colorspace: colorspace_name(pix.colorspace),
            private: pix.private,
            flags: pix.flags,
        }
    }
}

/// Outcome of reading one buffer type's format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FormatStatus {
    /// Format read successfully
    #[serde(rename = "pix")]
    Configured(ActiveFormat),
    /// Query failed with the given OS error text
    #[serde(rename = "status")]
    Failed(String),
}

/// Active format (or failure) for one buffer type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveFormatEntry {
    /// Buffer type
    pub buffer_type: BufferType,
    /// Read outcome
    pub status: FormatStatus,
}

impl JsonEntry for ActiveFormatEntry {
    fn json_key(&self) -> &str {
        self.buffer_type.name()
    }
}

impl Serialize for ActiveFormatEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.status.serialize(serializer)
    }
}

/// Read the current format of every supported, non-overlay buffer type.
pub fn read_active_format(node: &dyn VideoNode) -> Vec<ActiveFormatEntry> {
    let capabilities = match node.query_caps() {
        Ok(cap) => cap.capabilities,
        Err(err) => {
            debug!(error = %err, "capability query failed, no formats reported");
            return Vec::new();
        }
    };

    BufferType::ALL
        .into_iter()
        .filter(|ty| ty.supported_by(capabilities, true))
        .map(|buffer_type| {
            let status = match node.format(buffer_type) {
                Ok(pix) => FormatStatus::Configured(pix.into()),
                Err(err) => {
                    debug!(%buffer_type, error = %err, "format query failed");
                    FormatStatus::Failed(err.client_message())
                }
            };
            ActiveFormatEntry {
                buffer_type,
                status,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::caps::cap;
    use crate::device::mock::{MockDevice, MockNode};
    use crate::json::JsonObject;
    use serde_json::{Value, json};
    use std::sync::{Arc, Mutex};

    fn node(device: MockDevice) -> MockNode {
        MockNode::new(Arc::new(Mutex::new(device)))
    }

    #[test]
    fn test_enumerates_formats_and_sizes_in_order() {
        let formats = enumerate_formats(&node(MockDevice::webcam()));
        assert_eq!(formats.len(), 1);
        assert_eq!(formats[0].buffer_type, BufferType::VideoCapture);

        let codes: Vec<String> = formats[0]
            .formats
            .iter()
            .map(|d| fourcc_string(&d.fourcc))
            .collect();
        assert_eq!(codes, vec!["YUYV", "YUYV", "MJPG"]);
        assert_eq!(
            formats[0].formats[1].frame_size,
            FrameSize::Discrete {
                width: 1280,
                height: 720
            }
        );
    }

    #[test]
    fn test_serialized_shape_keeps_repeated_fourcc() {
        let formats = enumerate_formats(&node(MockDevice::webcam()));
        let text = serde_json::to_string(&JsonObject(&formats)).unwrap();
        assert_eq!(
            text,
            concat!(
                r#"{"VIDEO_CAPTURE":{"#,
                r#""YUYV":{"type":"DISCRETE","width":640,"height":480},"#,
                r#""YUYV":{"type":"DISCRETE","width":1280,"height":720},"#,
                r#""MJPG":{"type":"STEPWISE","min_width":160,"min_height":120,"max_width":1920,"max_height":1080,"step_width":16,"step_height":8}"#,
                r#"}}"#
            )
        );
    }

    #[test]
    fn test_failing_buffer_type_does_not_void_others() {
        let mut device = MockDevice::webcam();
        device.capabilities |= cap::VIDEO_OUTPUT;
        device.failing_formats.insert(BufferType::VideoCapture);
        device
            .formats
            .insert(BufferType::VideoOutput, vec![FourCC::new(b"MJPG")]);

        let formats = enumerate_formats(&node(device));
        assert_eq!(formats.len(), 2);
        assert_eq!(formats[0].buffer_type, BufferType::VideoCapture);
        assert!(formats[0].formats.is_empty());
        assert_eq!(formats[1].buffer_type, BufferType::VideoOutput);
        assert_eq!(formats[1].formats.len(), 1);
    }

    #[test]
    fn test_overlay_listed_for_formats_but_not_active() {
        let mut device = MockDevice::webcam();
        device.capabilities |= cap::VIDEO_OVERLAY;
        let node = node(device);

        let listed: Vec<BufferType> = enumerate_formats(&node)
            .into_iter()
            .map(|f| f.buffer_type)
            .collect();
        assert_eq!(
            listed,
            vec![BufferType::VideoCapture, BufferType::VideoOverlay]
        );

        let active: Vec<BufferType> = read_active_format(&node)
            .into_iter()
            .map(|f| f.buffer_type)
            .collect();
        assert_eq!(active, vec![BufferType::VideoCapture]);
    }

    #[test]
    fn test_sdr_and_meta_capabilities_are_not_reported() {
        let mut device = MockDevice::webcam();
        device.capabilities |= cap::META_CAPTURE | cap::SDR_CAPTURE | cap::SDR_OUTPUT;
        let pix = device.active[&BufferType::VideoCapture];
        for ty in [
            BufferType::SdrCapture,
            BufferType::SdrOutput,
            BufferType::MetaCapture,
        ] {
            device.formats.insert(ty, vec![FourCC::new(b"GREY")]);
            device.active.insert(ty, pix);
        }
        let node = node(device);

        let listed: Vec<BufferType> = enumerate_formats(&node)
            .into_iter()
            .map(|f| f.buffer_type)
            .collect();
        assert_eq!(listed, vec![BufferType::VideoCapture]);

        let active: Vec<BufferType> = read_active_format(&node)
            .into_iter()
            .map(|f| f.buffer_type)
            .collect();
        assert_eq!(active, vec![BufferType::VideoCapture]);
    }

    #[test]
    fn test_capability_failure_yields_empty_result() {
        let mut device = MockDevice::webcam();
        device.fail_caps = true;
        let node = node(device);
        assert!(enumerate_formats(&node).is_empty());
        assert!(read_active_format(&node).is_empty());
    }

    #[test]
    fn test_active_format_partial_failure() {
        let mut device = MockDevice::webcam();
        device.capabilities |= cap::VIDEO_OUTPUT;
        let entries = read_active_format(&node(device));
        let value: Value = serde_json::to_value(JsonObject(&entries)).unwrap();

        assert_eq!(
            value["VIDEO_CAPTURE"]["pix"],
            json!({
                "width": 640,
                "height": 480,
                "pixelformat": "YUYV",
                "field": "NONE",
                "bytesperline": 1280,
                "sizeimage": 614400,
                "colorspace": "SRGB",
                "priv": 0,
                "flags": 0,
            })
        );
        assert!(value["VIDEO_OUTPUT"]["status"].is_string());
        assert!(value["VIDEO_OUTPUT"].get("pix").is_none());
    }

    #[test]
    fn test_unknown_enum_values_are_stringified() {
        let mut device = MockDevice::webcam();
        if let Some(pix) = device.active.get_mut(&BufferType::VideoCapture) {
            pix.field = 42;
            pix.colorspace = 99;
        }
        let entries = read_active_format(&node(device));
        match &entries[0].status {
            FormatStatus::Configured(active) => {
                assert_eq!(active.field, "42");
                assert_eq!(active.colorspace, "99");
            }
            other => panic!("unexpected status {other:?}"),
        }
    }
}
