//! Fixed V4L2 value tables and their decoders
//!
//! Bitmasks are decoded by scanning an ordered `(bit, name)` table, so the order of the
//! emitted names follows the table, not the numeric bit order.

use serde::Serialize;
use std::borrow::Cow;
use std::fmt;

/// Ordered `(value, name)` lookup table.
pub type NameTable = [(u32, &'static str)];

/// Device capability bits (`V4L2_CAP_*`).
pub mod cap {
    #![allow(missing_docs)]
    pub const VIDEO_CAPTURE: u32 = 0x0000_0001;
    pub const VIDEO_OUTPUT: u32 = 0x0000_0002;
    pub const VIDEO_OVERLAY: u32 = 0x0000_0004;
    pub const VBI_CAPTURE: u32 = 0x0000_0010;
    pub const VBI_OUTPUT: u32 = 0x0000_0020;
    pub const SLICED_VBI_CAPTURE: u32 = 0x0000_0040;
    pub const SLICED_VBI_OUTPUT: u32 = 0x0000_0080;
    pub const RDS_CAPTURE: u32 = 0x0000_0100;
    pub const VIDEO_OUTPUT_OVERLAY: u32 = 0x0000_0200;
    pub const HW_FREQ_SEEK: u32 = 0x0000_0400;
    pub const RDS_OUTPUT: u32 = 0x0000_0800;
    pub const VIDEO_CAPTURE_MPLANE: u32 = 0x0000_1000;
    pub const VIDEO_OUTPUT_MPLANE: u32 = 0x0000_2000;
    pub const VIDEO_M2M_MPLANE: u32 = 0x0000_4000;
    pub const VIDEO_M2M: u32 = 0x0000_8000;
    pub const TUNER: u32 = 0x0001_0000;
    pub const AUDIO: u32 = 0x0002_0000;
    pub const RADIO: u32 = 0x0004_0000;
    pub const MODULATOR: u32 = 0x0008_0000;
    pub const SDR_CAPTURE: u32 = 0x0010_0000;
    pub const EXT_PIX_FORMAT: u32 = 0x0020_0000;
    pub const SDR_OUTPUT: u32 = 0x0040_0000;
    pub const META_CAPTURE: u32 = 0x0080_0000;
    pub const READWRITE: u32 = 0x0100_0000;
    pub const ASYNCIO: u32 = 0x0200_0000;
    pub const STREAMING: u32 = 0x0400_0000;
    pub const META_OUTPUT: u32 = 0x0800_0000;
    pub const TOUCH: u32 = 0x1000_0000;
    pub const IO_MC: u32 = 0x2000_0000;
    pub const DEVICE_CAPS: u32 = 0x8000_0000;
}

/// Control flag bits (`V4L2_CTRL_FLAG_*`).
pub mod ctrl_flag {
    #![allow(missing_docs)]
    pub const DISABLED: u32 = 0x0001;
    pub const GRABBED: u32 = 0x0002;
    pub const READ_ONLY: u32 = 0x0004;
    pub const UPDATE: u32 = 0x0008;
    pub const INACTIVE: u32 = 0x0010;
    pub const SLIDER: u32 = 0x0020;
    pub const WRITE_ONLY: u32 = 0x0040;
    pub const VOLATILE: u32 = 0x0080;
    pub const HAS_PAYLOAD: u32 = 0x0100;
    pub const EXECUTE_ON_WRITE: u32 = 0x0200;
    pub const MODIFY_LAYOUT: u32 = 0x0400;

    /// Cursor flag: return the first control with an id above the one given.
    pub const NEXT_CTRL: u32 = 0x8000_0000;
    /// Cursor flag: include compound controls in the iteration.
    pub const NEXT_COMPOUND: u32 = 0x4000_0000;
}

/// Device capability names, in reporting order.
pub static CAPABILITY_NAMES: &NameTable = &[
    (cap::VIDEO_CAPTURE, "VIDEO_CAPTURE"),
    (cap::VIDEO_OUTPUT, "VIDEO_OUTPUT"),
    (cap::VIDEO_OVERLAY, "VIDEO_OVERLAY"),
    (cap::VBI_CAPTURE, "VBI_CAPTURE"),
    (cap::VBI_OUTPUT, "VBI_OUTPUT"),
    (cap::SLICED_VBI_CAPTURE, "SLICED_VBI_CAPTURE"),
    (cap::SLICED_VBI_OUTPUT, "SLICED_VBI_OUTPUT"),
    (cap::RDS_CAPTURE, "RDS_CAPTURE"),
    (cap::VIDEO_OUTPUT_OVERLAY, "VIDEO_OUTPUT_OVERLAY"),
    (cap::HW_FREQ_SEEK, "HW_FREQ_SEEK"),
    (cap::RDS_OUTPUT, "RDS_OUTPUT"),
    (cap::VIDEO_CAPTURE_MPLANE, "VIDEO_CAPTURE_MPLANE"),
    (cap::VIDEO_OUTPUT_MPLANE, "VIDEO_OUTPUT_MPLANE"),
    (cap::VIDEO_M2M_MPLANE, "VIDEO_M2M_MPLANE"),
    (cap::VIDEO_M2M, "VIDEO_M2M"),
    (cap::TUNER, "TUNER"),
    (cap::AUDIO, "AUDIO"),
    (cap::RADIO, "RADIO"),
    (cap::MODULATOR, "MODULATOR"),
    (cap::READWRITE, "READWRITE"),
    (cap::ASYNCIO, "ASYNCIO"),
    (cap::STREAMING, "STREAMING"),
    (cap::DEVICE_CAPS, "DEVICE_CAPS"),
    // Newer kernel capabilities, appended so the established prefix keeps its order.
    (cap::SDR_CAPTURE, "SDR_CAPTURE"),
    (cap::EXT_PIX_FORMAT, "EXT_PIX_FORMAT"),
    (cap::SDR_OUTPUT, "SDR_OUTPUT"),
    (cap::META_CAPTURE, "META_CAPTURE"),
    (cap::META_OUTPUT, "META_OUTPUT"),
    (cap::TOUCH, "TOUCH"),
    (cap::IO_MC, "IO_MC"),
];

/// Control flag names, in reporting order.
pub static CONTROL_FLAG_NAMES: &NameTable = &[
    (ctrl_flag::DISABLED, "DISABLED"),
    (ctrl_flag::GRABBED, "GRABBED"),
    (ctrl_flag::READ_ONLY, "READ_ONLY"),
    (ctrl_flag::UPDATE, "UPDATE"),
    (ctrl_flag::INACTIVE, "INACTIVE"),
    (ctrl_flag::SLIDER, "SLIDER"),
    (ctrl_flag::WRITE_ONLY, "WRITE_ONLY"),
    (ctrl_flag::VOLATILE, "VOLATILE"),
    (ctrl_flag::HAS_PAYLOAD, "HAS_PAYLOAD"),
    (ctrl_flag::EXECUTE_ON_WRITE, "EXECUTE_ON_WRITE"),
    (ctrl_flag::MODIFY_LAYOUT, "MODIFY_LAYOUT"),
];

/// Field order names indexed by `V4L2_FIELD_*` value.
pub static FIELD_NAMES: &NameTable = &[
    (0, "ANY"),
    (1, "NONE"),
    (2, "TOP"),
    (3, "BOTTOM"),
    (4, "INTERLACED"),
    (5, "SEQ_TB"),
    (6, "SEQ_BT"),
    (7, "ALTERNATE"),
    (8, "INTERLACED_TB"),
    (9, "INTERLACED_BT"),
];

/// Colorspace names indexed by `V4L2_COLORSPACE_*` value.
pub static COLORSPACE_NAMES: &NameTable = &[
    (0, "DEFAULT"),
    (1, "SMPTE170M"),
    (2, "SMPTE240M"),
    (3, "REC709"),
    (4, "BT878"),
    (5, "470_SYSTEM_M"),
    (6, "470_SYSTEM_BG"),
    (7, "JPEG"),
    (8, "SRGB"),
    (9, "OPRGB"),
    (10, "BT2020"),
    (11, "RAW"),
    (12, "DCI_P3"),
];

/// Names of every table entry whose bit is set in `mask`, in table order.
pub fn decode_bits(table: &NameTable, mask: u32) -> Vec<&'static str> {
    table
        .iter()
        .filter(|(bit, _)| mask & bit != 0)
        .map(|(_, name)| *name)
        .collect()
}

/// Look up an enumerated value; unknown values render as their decimal string.
pub fn enum_name(table: &NameTable, value: u32) -> String {
    table
        .iter()
        .find(|(v, _)| *v == value)
        .map(|(_, name)| (*name).to_string())
        .unwrap_or_else(|| value.to_string())
}

/// Capability names for a device capability mask.
pub fn capability_names(mask: u32) -> Vec<&'static str> {
    decode_bits(CAPABILITY_NAMES, mask)
}

/// Flag names for a control flag mask.
pub fn control_flag_names(mask: u32) -> Vec<&'static str> {
    decode_bits(CONTROL_FLAG_NAMES, mask)
}

/// Field order name (`V4L2_FIELD_*`).
pub fn field_name(field: u32) -> String {
    enum_name(FIELD_NAMES, field)
}

/// Colorspace name (`V4L2_COLORSPACE_*`).
pub fn colorspace_name(colorspace: u32) -> String {
    enum_name(COLORSPACE_NAMES, colorspace)
}

/// V4L2 buffer types (`V4L2_BUF_TYPE_*`) a device node may expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferType {
    /// Single-planar video capture
    VideoCapture,
    /// Single-planar video output
    VideoOutput,
    /// Video overlay
    VideoOverlay,
    /// Raw VBI capture
    VbiCapture,
    /// Raw VBI output
    VbiOutput,
    /// Sliced VBI capture
    SlicedVbiCapture,
    /// Sliced VBI output
    SlicedVbiOutput,
    /// Video output overlay
    VideoOutputOverlay,
    /// Multi-planar video capture
    VideoCaptureMplane,
    /// Multi-planar video output
    VideoOutputMplane,
    /// Software defined radio capture
    SdrCapture,
    /// Software defined radio output
    SdrOutput,
    /// Metadata capture
    MetaCapture,
}

impl BufferType {
    /// Every known buffer type, in ascending code order.
    pub const ALL: [BufferType; 13] = [
        BufferType::VideoCapture,
        BufferType::VideoOutput,
        BufferType::VideoOverlay,
        BufferType::VbiCapture,
        BufferType::VbiOutput,
        BufferType::SlicedVbiCapture,
        BufferType::SlicedVbiOutput,
        BufferType::VideoOutputOverlay,
        BufferType::VideoCaptureMplane,
        BufferType::VideoOutputMplane,
        BufferType::SdrCapture,
        BufferType::SdrOutput,
        BufferType::MetaCapture,
    ];

    /// Numeric `V4L2_BUF_TYPE_*` code.
    pub fn code(self) -> u32 {
        match self {
            BufferType::VideoCapture => 1,
            BufferType::VideoOutput => 2,
            BufferType::VideoOverlay => 3,
            BufferType::VbiCapture => 4,
            BufferType::VbiOutput => 5,
            BufferType::SlicedVbiCapture => 6,
            BufferType::SlicedVbiOutput => 7,
            BufferType::VideoOutputOverlay => 8,
            BufferType::VideoCaptureMplane => 9,
            BufferType::VideoOutputMplane => 10,
            BufferType::SdrCapture => 11,
            BufferType::SdrOutput => 12,
            BufferType::MetaCapture => 13,
        }
    }

    /// Name used as the JSON key for this buffer type.
    pub fn name(self) -> &'static str {
        match self {
            BufferType::VideoCapture => "VIDEO_CAPTURE",
            BufferType::VideoOutput => "VIDEO_OUTPUT",
            BufferType::VideoOverlay => "VIDEO_OVERLAY",
            BufferType::VbiCapture => "VBI_CAPTURE",
            BufferType::VbiOutput => "VBI_OUTPUT",
            BufferType::SlicedVbiCapture => "SLICED_VBI_CAPTURE",
            BufferType::SlicedVbiOutput => "SLICED_VBI_OUTPUT",
            BufferType::VideoOutputOverlay => "VIDEO_OUTPUT_OVERLAY",
            BufferType::VideoCaptureMplane => "VIDEO_CAPTURE_MPLANE",
            BufferType::VideoOutputMplane => "VIDEO_OUTPUT_MPLANE",
            BufferType::SdrCapture => "SDR_CAPTURE",
            BufferType::SdrOutput => "SDR_OUTPUT",
            BufferType::MetaCapture => "META_CAPTURE",
        }
    }

    /// Capability bit that advertises this buffer type.
    pub fn capability(self) -> u32 {
        match self {
            BufferType::VideoCapture => cap::VIDEO_CAPTURE,
            BufferType::VideoOutput => cap::VIDEO_OUTPUT,
            BufferType::VideoOverlay => cap::VIDEO_OVERLAY,
            BufferType::VbiCapture => cap::VBI_CAPTURE,
            BufferType::VbiOutput => cap::VBI_OUTPUT,
            BufferType::SlicedVbiCapture => cap::SLICED_VBI_CAPTURE,
            BufferType::SlicedVbiOutput => cap::SLICED_VBI_OUTPUT,
            BufferType::VideoOutputOverlay => cap::VIDEO_OUTPUT_OVERLAY,
            BufferType::VideoCaptureMplane => cap::VIDEO_CAPTURE_MPLANE,
            BufferType::VideoOutputMplane => cap::VIDEO_OUTPUT_MPLANE,
            BufferType::SdrCapture => cap::SDR_CAPTURE,
            BufferType::SdrOutput => cap::SDR_OUTPUT,
            BufferType::MetaCapture => cap::META_CAPTURE,
        }
    }

    /// Whether this is one of the overlay types, which have no single current format.
    pub fn is_overlay(self) -> bool {
        matches!(
            self,
            BufferType::VideoOverlay | BufferType::VideoOutputOverlay
        )
    }

    /// SDR and metadata buffers carry no pixel format; they are never reported.
    pub fn has_pixel_format(self) -> bool {
        !matches!(
            self,
            BufferType::SdrCapture | BufferType::SdrOutput | BufferType::MetaCapture
        )
    }

    /// Whether a device with the given capability mask supports this buffer type.
    pub fn supported_by(self, capabilities: u32, exclude_overlay: bool) -> bool {
        if !self.has_pixel_format() || (exclude_overlay && self.is_overlay()) {
            return false;
        }
        capabilities & self.capability() != 0
    }
}

impl fmt::Display for BufferType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Control value types (`V4L2_CTRL_TYPE_*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlType {
    /// Signed 32-bit integer
    Integer,
    /// On/off switch
    Boolean,
    /// Indexed list of labels
    Menu,
    /// Action without a value
    Button,
    /// Signed 64-bit integer
    Integer64,
    /// Control class marker
    CtrlClass,
    /// String payload
    String,
    /// Bit field
    Bitmask,
    /// Indexed list of 64-bit integers
    IntegerMenu,
    /// Any other (compound) type, by raw code
    Other(u32),
}

impl ControlType {
    /// Menu-like types whose entries are enumerated with `VIDIOC_QUERYMENU`.
    pub fn has_menu(self) -> bool {
        matches!(self, ControlType::Menu | ControlType::IntegerMenu)
    }

    /// Raw `V4L2_CTRL_TYPE_*` code.
    pub fn code(self) -> u32 {
        match self {
            ControlType::Integer => 1,
            ControlType::Boolean => 2,
            ControlType::Menu => 3,
            ControlType::Button => 4,
            ControlType::Integer64 => 5,
            ControlType::CtrlClass => 6,
            ControlType::String => 7,
            ControlType::Bitmask => 8,
            ControlType::IntegerMenu => 9,
            ControlType::Other(code) => code,
        }
    }

    /// Name reported in control listings.
    pub fn name(self) -> Cow<'static, str> {
        let name = match self {
            ControlType::Integer => "INTEGER",
            ControlType::Boolean => "BOOLEAN",
            ControlType::Menu => "MENU",
            ControlType::Button => "BUTTON",
            ControlType::Integer64 => "INTEGER64",
            ControlType::CtrlClass => "CTRL_CLASS",
            ControlType::String => "STRING",
            ControlType::Bitmask => "BITMASK",
            ControlType::IntegerMenu => "INTEGER_MENU",
            ControlType::Other(code) => return Cow::Owned(format!("0x{code:04x}")),
        };
        Cow::Borrowed(name)
    }
}

impl From<u32> for ControlType {
    fn from(code: u32) -> Self {
        match code {
            1 => ControlType::Integer,
            2 => ControlType::Boolean,
            3 => ControlType::Menu,
            4 => ControlType::Button,
            5 => ControlType::Integer64,
            6 => ControlType::CtrlClass,
            7 => ControlType::String,
            8 => ControlType::Bitmask,
            9 => ControlType::IntegerMenu,
            other => ControlType::Other(other),
        }
    }
}

impl Serialize for ControlType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_bits_follows_table_order() {
        static TABLE: &NameTable = &[(0x4, "A"), (0x1, "B"), (0x2, "C")];
        assert_eq!(decode_bits(TABLE, 0x4 | 0x2), vec!["A", "C"]);
        assert_eq!(decode_bits(TABLE, 0x2 | 0x4), vec!["A", "C"]);
        assert!(decode_bits(TABLE, 0).is_empty());
    }

    #[test]
    fn test_capability_names() {
        assert_eq!(
            capability_names(cap::STREAMING | cap::VIDEO_CAPTURE),
            vec!["VIDEO_CAPTURE", "STREAMING"]
        );
        assert_eq!(
            capability_names(cap::DEVICE_CAPS | cap::EXT_PIX_FORMAT | cap::VIDEO_CAPTURE),
            vec!["VIDEO_CAPTURE", "DEVICE_CAPS", "EXT_PIX_FORMAT"]
        );
    }

    #[test]
    fn test_control_flag_names() {
        assert_eq!(
            control_flag_names(ctrl_flag::SLIDER | ctrl_flag::READ_ONLY),
            vec!["READ_ONLY", "SLIDER"]
        );
        // Cursor flags are not control flags.
        assert!(control_flag_names(ctrl_flag::NEXT_CTRL).is_empty());
    }

    #[test]
    fn test_enum_names_with_fallback() {
        assert_eq!(field_name(1), "NONE");
        assert_eq!(field_name(9), "INTERLACED_BT");
        assert_eq!(field_name(10), "10");
        assert_eq!(colorspace_name(8), "SRGB");
        assert_eq!(colorspace_name(12), "DCI_P3");
        assert_eq!(colorspace_name(13), "13");
    }

    #[test]
    fn test_buffer_type_codes_ascend() {
        for (idx, ty) in BufferType::ALL.iter().enumerate() {
            assert_eq!(ty.code(), idx as u32 + 1);
        }
    }

    #[test]
    fn test_supports_respects_overlay_exclusion() {
        let caps = cap::VIDEO_CAPTURE | cap::VIDEO_OVERLAY;
        assert!(BufferType::VideoCapture.supported_by(caps, true));
        assert!(BufferType::VideoOverlay.supported_by(caps, false));
        assert!(!BufferType::VideoOverlay.supported_by(caps, true));
        assert!(!BufferType::VideoOutput.supported_by(caps, false));
    }

    #[test]
    fn test_sdr_and_meta_never_supported() {
        let caps = cap::SDR_CAPTURE | cap::SDR_OUTPUT | cap::META_CAPTURE;
        for ty in [
            BufferType::SdrCapture,
            BufferType::SdrOutput,
            BufferType::MetaCapture,
        ] {
            assert!(!ty.has_pixel_format());
            assert!(!ty.supported_by(caps, false), "{ty}");
            assert!(!ty.supported_by(caps, true), "{ty}");
        }
        assert!(BufferType::VideoCaptureMplane.has_pixel_format());
    }

    #[test]
    fn test_control_type_mapping() {
        assert_eq!(ControlType::from(3), ControlType::Menu);
        assert_eq!(ControlType::from(9), ControlType::IntegerMenu);
        assert!(ControlType::Menu.has_menu());
        assert!(!ControlType::Integer.has_menu());
        assert_eq!(ControlType::Menu.name(), "MENU");
        assert!(matches!(ControlType::IntegerMenu.name(), Cow::Borrowed("INTEGER_MENU")));
        assert_eq!(ControlType::from(0x0100).name(), "0x0100");
        assert_eq!(ControlType::from(0x0100).code(), 0x0100);
    }
}
