//! V4L2 device backend over the `v4l` crate's raw ioctl layer

use std::fs;
use std::mem;
use std::os::raw::{c_int, c_void};
use std::path::{Path, PathBuf};

use v4l::FourCC;
use v4l::v4l_sys::{
    v4l2_capability, v4l2_control, v4l2_fmtdesc, v4l2_format, v4l2_frmsizeenum, v4l2_queryctrl,
    v4l2_querymenu,
};
use v4l::v4l2;
use v4l::v4l2::vidioc;

use super::{
    BufferType, Capability, ControlInfo, ControlType, DeviceProvider, FrameSize, MenuItem,
    NODE_PREFIX, PixFormat, VideoNode, node_order,
};
use crate::error::{Error, Result};

const FRMSIZE_TYPE_DISCRETE: u32 = 1;
const FRMSIZE_TYPE_CONTINUOUS: u32 = 2;
const FRMSIZE_TYPE_STEPWISE: u32 = 3;

/// An open `/dev/videoN` node. The file descriptor is closed on drop.
pub struct V4l2Node {
    device: v4l::Device,
    path: PathBuf,
}

impl V4l2Node {
    /// Open the node at `path` (read/write, non-blocking).
    pub fn open(path: &Path) -> Result<Self> {
        let device = v4l::Device::with_path(path).map_err(|e| {
            Error::DeviceUnavailable(format!("Failed to open {}: {e}", path.display()))
        })?;
        Ok(Self {
            device,
            path: path.to_path_buf(),
        })
    }

    /// Path the node was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn fd(&self) -> c_int {
        self.device.handle().fd()
    }
}

fn arg<T>(value: &mut T) -> *mut c_void {
    value as *mut T as *mut c_void
}

/// Decode a NUL-terminated fixed-size driver string.
fn c_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

impl VideoNode for V4l2Node {
    fn query_caps(&self) -> Result<Capability> {
        // SAFETY: plain C struct, all-zero is a valid bit pattern.
        let mut cap: v4l2_capability = unsafe { mem::zeroed() };
        let ret = unsafe { v4l2::ioctl(self.fd(), vidioc::VIDIOC_QUERYCAP, arg(&mut cap)) };
        ret.map_err(|e| Error::query("VIDIOC_QUERYCAP", e))?;

        Ok(Capability {
            driver: c_string(&cap.driver),
            card: c_string(&cap.card),
            bus_info: c_string(&cap.bus_info),
            version: cap.version,
            capabilities: cap.capabilities,
        })
    }

    fn enum_format(&self, buffer_type: BufferType, index: u32) -> Result<FourCC> {
        let mut desc: v4l2_fmtdesc = unsafe { mem::zeroed() };
        desc.index = index;
        desc.type_ = buffer_type.code();
        let ret = unsafe { v4l2::ioctl(self.fd(), vidioc::VIDIOC_ENUM_FMT, arg(&mut desc)) };
        ret.map_err(|e| Error::query("VIDIOC_ENUM_FMT", e))?;

        Ok(FourCC::new(&desc.pixelformat.to_le_bytes()))
    }

    fn enum_frame_size(&self, pixel_format: FourCC, index: u32) -> Result<FrameSize> {
        let mut size: v4l2_frmsizeenum = unsafe { mem::zeroed() };
        size.index = index;
        size.pixel_format = u32::from_le_bytes(pixel_format.repr);
        let ret = unsafe { v4l2::ioctl(self.fd(), vidioc::VIDIOC_ENUM_FRAMESIZES, arg(&mut size)) };
        ret.map_err(|e| Error::query("VIDIOC_ENUM_FRAMESIZES", e))?;

        // SAFETY: the driver fills the union member selected by `type_`.
        unsafe {
            match size.type_ {
                FRMSIZE_TYPE_DISCRETE => {
                    let discrete = size.__bindgen_anon_1.discrete;
                    Ok(FrameSize::Discrete {
                        width: discrete.width,
                        height: discrete.height,
                    })
                }
                FRMSIZE_TYPE_CONTINUOUS | FRMSIZE_TYPE_STEPWISE => {
                    let stepwise = size.__bindgen_anon_1.stepwise;
                    Ok(FrameSize::Stepwise {
                        min_width: stepwise.min_width,
                        min_height: stepwise.min_height,
                        max_width: stepwise.max_width,
                        max_height: stepwise.max_height,
                        step_width: stepwise.step_width,
                        step_height: stepwise.step_height,
                    })
                }
                other => Err(Error::query(
                    "VIDIOC_ENUM_FRAMESIZES",
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        format!("unknown frame size type {other}"),
                    ),
                )),
            }
        }
    }

    fn format(&self, buffer_type: BufferType) -> Result<PixFormat> {
        let mut fmt: v4l2_format = unsafe { mem::zeroed() };
        fmt.type_ = buffer_type.code();
        let ret = unsafe { v4l2::ioctl(self.fd(), vidioc::VIDIOC_G_FMT, arg(&mut fmt)) };
        ret.map_err(|e| Error::query("VIDIOC_G_FMT", e))?;

        // SAFETY: every union member is plain data; non-pix buffer types are reinterpreted
        // through the single-planar layout.
        let pix = unsafe { fmt.fmt.pix };
        Ok(PixFormat {
            width: pix.width,
            height: pix.height,
            pixelformat: FourCC::new(&pix.pixelformat.to_le_bytes()),
            field: pix.field,
            bytesperline: pix.bytesperline,
            sizeimage: pix.sizeimage,
            colorspace: pix.colorspace,
            private: pix.priv_,
            flags: pix.flags,
        })
    }

    fn query_control(&self, id: u32) -> Result<ControlInfo> {
        let mut query: v4l2_queryctrl = unsafe { mem::zeroed() };
        query.id = id;
        let ret = unsafe { v4l2::ioctl(self.fd(), vidioc::VIDIOC_QUERYCTRL, arg(&mut query)) };
        ret.map_err(|e| Error::query("VIDIOC_QUERYCTRL", e))?;

        Ok(ControlInfo {
            id: query.id,
            kind: ControlType::from(query.type_),
            name: c_string(&query.name),
            minimum: query.minimum,
            maximum: query.maximum,
            step: query.step,
            default_value: query.default_value,
            flags: query.flags,
        })
    }

    fn query_menu(&self, id: u32, kind: ControlType, index: u32) -> Result<MenuItem> {
        let mut menu: v4l2_querymenu = unsafe { mem::zeroed() };
        menu.id = id;
        menu.index = index;
        let ret = unsafe { v4l2::ioctl(self.fd(), vidioc::VIDIOC_QUERYMENU, arg(&mut menu)) };
        ret.map_err(|e| Error::query("VIDIOC_QUERYMENU", e))?;

        // SAFETY: MENU controls fill `name`, INTEGER_MENU controls fill `value`.
        let entry = menu.__bindgen_anon_1;
        Ok(match kind {
            ControlType::IntegerMenu => MenuItem::Value(unsafe { entry.value }),
            _ => MenuItem::Label(c_string(unsafe { &entry.name })),
        })
    }

    fn control(&self, id: u32) -> Result<i32> {
        let mut ctrl = v4l2_control { id, value: 0 };
        let ret = unsafe { v4l2::ioctl(self.fd(), vidioc::VIDIOC_G_CTRL, arg(&mut ctrl)) };
        ret.map_err(|e| Error::query("VIDIOC_G_CTRL", e))?;
        Ok(ctrl.value)
    }

    fn set_control(&self, id: u32, value: i32) -> Result<()> {
        let mut ctrl = v4l2_control { id, value };
        let ret = unsafe { v4l2::ioctl(self.fd(), vidioc::VIDIOC_S_CTRL, arg(&mut ctrl)) };
        ret.map_err(|e| Error::query("VIDIOC_S_CTRL", e))
    }
}

/// Provider backed by a device directory such as `/dev`.
#[derive(Debug, Clone)]
pub struct DevFs {
    root: PathBuf,
}

impl DevFs {
    /// Serve nodes found under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl DeviceProvider for DevFs {
    fn node_names(&self) -> Vec<String> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!(dir = %self.root.display(), error = %err, "cannot read device directory");
                return Vec::new();
            }
        };

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| name.starts_with(NODE_PREFIX))
            .collect();
        names.sort_by_key(|name| node_order(name));
        names
    }

    fn open(&self, node: &str) -> Result<Box<dyn VideoNode>> {
        let path = self.root.join(node);
        let handle = V4l2Node::open(&path)?;
        tracing::trace!(path = %handle.path().display(), "opened device node");
        Ok(Box::new(handle))
    }
}
