//! Test doubles for the device surface.

use std::collections::VecDeque;

use render_protocol::{PixelBlock, PixelFormat, ReadbackRect};

use crate::device::{
    ContextEvent, Device, DeviceCapabilities, DeviceError, DrawFrame, ResourceBinding,
    ResourceSlot, UniformSlot,
};

#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    Uniform { slot: UniformSlot, values: Vec<f32> },
    ResourceUpload { slot: ResourceSlot },
    ResourceClear { slot: ResourceSlot },
    ResourceRebind { slot: ResourceSlot },
    Resize { width: u32, height: u32 },
    Clear { rgba: [f32; 4] },
    Draw { width: u32, height: u32, hdr: bool },
    Readback { rect: ReadbackRect },
}

/// Device double that records every call and replays injected context
/// events. Readbacks return a mid-grey block clipped to the surface.
pub struct RecordingDevice {
    pub calls: Vec<RecordedCall>,
    pub capabilities: DeviceCapabilities,
    pub pending_context_events: VecDeque<ContextEvent>,
    /// Makes the next `draw` fail with this backend message.
    pub fail_next_draw: Option<String>,
    surface_width: u32,
    surface_height: u32,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            capabilities: DeviceCapabilities {
                max_dimension: 8192,
                hdr_surface: true,
                float_readback: true,
            },
            pending_context_events: VecDeque::new(),
            fail_next_draw: None,
            surface_width: 1280,
            surface_height: 720,
        }
    }

    pub fn uniform_pushes(&self, slot: UniformSlot) -> Vec<&[f32]> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                RecordedCall::Uniform { slot: s, values } if *s == slot => {
                    Some(values.as_slice())
                }
                _ => None,
            })
            .collect()
    }

    pub fn uniform_push_count(&self) -> usize {
        self.calls
            .iter()
            .filter(|call| matches!(call, RecordedCall::Uniform { .. }))
            .count()
    }

    pub fn upload_count(&self, slot: ResourceSlot) -> usize {
        self.calls
            .iter()
            .filter(|call| matches!(call, RecordedCall::ResourceUpload { slot: s } if *s == slot))
            .count()
    }

    pub fn rebind_count(&self, slot: ResourceSlot) -> usize {
        self.calls
            .iter()
            .filter(|call| matches!(call, RecordedCall::ResourceRebind { slot: s } if *s == slot))
            .count()
    }

    pub fn draw_count(&self) -> usize {
        self.calls
            .iter()
            .filter(|call| matches!(call, RecordedCall::Draw { .. }))
            .count()
    }

    pub fn take_calls(&mut self) -> Vec<RecordedCall> {
        std::mem::take(&mut self.calls)
    }
}

impl Default for RecordingDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl Device for RecordingDevice {
    fn capabilities(&self) -> DeviceCapabilities {
        self.capabilities
    }

    fn bind_uniform(&mut self, slot: UniformSlot, values: &[f32]) {
        self.calls.push(RecordedCall::Uniform {
            slot,
            values: values.to_vec(),
        });
    }

    fn bind_resource(&mut self, slot: ResourceSlot, binding: ResourceBinding<'_>) {
        self.calls.push(match binding {
            ResourceBinding::Rebind => RecordedCall::ResourceRebind { slot },
            ResourceBinding::Upload(_) => RecordedCall::ResourceUpload { slot },
            ResourceBinding::Clear => RecordedCall::ResourceClear { slot },
        });
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.surface_width = width;
        self.surface_height = height;
        self.calls.push(RecordedCall::Resize { width, height });
    }

    fn clear(&mut self, rgba: [f32; 4]) {
        self.calls.push(RecordedCall::Clear { rgba });
    }

    fn draw(&mut self, frame: DrawFrame<'_>) -> Result<(), DeviceError> {
        self.calls.push(RecordedCall::Draw {
            width: frame.block.width,
            height: frame.block.height,
            hdr: frame.colorimetry.is_some(),
        });
        match self.fail_next_draw.take() {
            Some(message) => Err(DeviceError::Backend(message)),
            None => Ok(()),
        }
    }

    fn readback(&mut self, rect: ReadbackRect) -> Result<Option<PixelBlock>, DeviceError> {
        self.calls.push(RecordedCall::Readback { rect });
        if rect.width == 0
            || rect.height == 0
            || rect.x >= self.surface_width
            || rect.y >= self.surface_height
        {
            return Ok(None);
        }
        let width = rect.width.min(self.surface_width - rect.x);
        let height = rect.height.min(self.surface_height - rect.y);
        Ok(Some(PixelBlock {
            width,
            height,
            format: PixelFormat::Rgba8,
            bytes: vec![0x7f; width as usize * height as usize * 4].into_boxed_slice(),
        }))
    }

    fn poll_context_event(&mut self) -> Option<ContextEvent> {
        self.pending_context_events.pop_front()
    }
}
