//! Frame hand-off staging.
//!
//! Double-buffering helper on the caller side: the next displayable frame is
//! decoded into a transferable `PixelBlock` while the previous one is still
//! in flight. At most one block is staged at a time; staging a different
//! source releases the superseded block immediately, and `take_staged`
//! yields the block exactly once.

use render_protocol::{PixelBlock, PixelFormat};
use thiserror::Error;

/// Identity of a frame source. Staging under a new key supersedes whatever
/// is currently staged; restaging the same key is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceKey(pub u64);

#[derive(Debug)]
pub enum FrameSource {
    /// PNG or JPEG bytes, decoded to 8-bit RGBA.
    Encoded { key: SourceKey, bytes: Vec<u8> },
    /// Already-decoded 8-bit RGBA.
    Raw { key: SourceKey, block: PixelBlock },
    /// Interleaved linear float RGBA, e.g. a decoded HDR frame.
    RawFloat {
        key: SourceKey,
        width: u32,
        height: u32,
        rgba: Vec<f32>,
    },
}

impl FrameSource {
    pub fn key(&self) -> SourceKey {
        match self {
            FrameSource::Encoded { key, .. } => *key,
            FrameSource::Raw { key, .. } => *key,
            FrameSource::RawFloat { key, .. } => *key,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageError {
    #[error("image decode failed: {0}")]
    Decode(String),
    #[error("pixel data does not match its declared dimensions")]
    MalformedBlock,
}

#[derive(Debug)]
struct StagedFrame {
    key: SourceKey,
    block: PixelBlock,
}

#[derive(Debug, Default)]
pub struct FrameStage {
    staged: Option<StagedFrame>,
}

impl FrameStage {
    pub fn new() -> Self {
        Self { staged: None }
    }

    /// Decode `source` into the staged slot.
    ///
    /// A staged-but-unconsumed block for a different key is released before
    /// the new decode is attempted, so a decode failure leaves the slot
    /// empty rather than holding a stale frame. Restaging the currently
    /// staged key keeps the existing block; the decode is already paid for.
    pub fn stage(&mut self, source: FrameSource) -> Result<(), StageError> {
        match &self.staged {
            Some(staged) if staged.key == source.key() => return Ok(()),
            Some(_) => self.staged = None,
            None => {}
        }

        let key = source.key();
        let block = decode(source)?;
        self.staged = Some(StagedFrame { key, block });
        Ok(())
    }

    /// Take the staged block, clearing the slot. Yields once per stage.
    pub fn take_staged(&mut self) -> Option<PixelBlock> {
        self.staged.take().map(|staged| staged.block)
    }

    pub fn staged_key(&self) -> Option<SourceKey> {
        self.staged.as_ref().map(|staged| staged.key)
    }

    /// Release whatever is staged, as on session disposal.
    pub fn clear(&mut self) {
        self.staged = None;
    }
}

fn decode(source: FrameSource) -> Result<PixelBlock, StageError> {
    match source {
        FrameSource::Encoded { bytes, .. } => {
            let decoded = image::load_from_memory(&bytes)
                .map_err(|error| StageError::Decode(error.to_string()))?;
            let rgba = decoded.to_rgba8();
            let (width, height) = rgba.dimensions();
            Ok(PixelBlock {
                width,
                height,
                format: PixelFormat::Rgba8,
                bytes: rgba.into_raw().into_boxed_slice(),
            })
        }
        FrameSource::Raw { block, .. } => {
            if !block.is_well_formed() {
                return Err(StageError::MalformedBlock);
            }
            Ok(block)
        }
        FrameSource::RawFloat {
            width,
            height,
            rgba,
            ..
        } => {
            if width == 0 || height == 0 || rgba.len() != width as usize * height as usize * 4 {
                return Err(StageError::MalformedBlock);
            }
            Ok(PixelBlock {
                width,
                height,
                format: PixelFormat::Rgba32Float,
                bytes: bytemuck::cast_slice(&rgba).to_vec().into_boxed_slice(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_source(key: u64, fill: u8) -> FrameSource {
        FrameSource::Raw {
            key: SourceKey(key),
            block: PixelBlock {
                width: 2,
                height: 2,
                format: PixelFormat::Rgba8,
                bytes: vec![fill; 16].into_boxed_slice(),
            },
        }
    }

    #[test]
    fn staging_a_newer_source_releases_the_unconsumed_one() {
        let mut stage = FrameStage::new();

        stage.stage(raw_source(1, 0xaa)).expect("stage A");
        stage.stage(raw_source(2, 0xbb)).expect("stage B");

        let block = stage.take_staged().expect("B staged");
        assert_eq!(block.bytes[0], 0xbb);
        assert!(stage.take_staged().is_none());
    }

    #[test]
    fn take_staged_yields_exactly_once() {
        let mut stage = FrameStage::new();
        stage.stage(raw_source(7, 0x11)).expect("stage");

        assert!(stage.take_staged().is_some());
        assert!(stage.take_staged().is_none());
        assert_eq!(stage.staged_key(), None);
    }

    #[test]
    fn restaging_the_same_key_keeps_the_existing_block() {
        let mut stage = FrameStage::new();
        stage.stage(raw_source(3, 0x42)).expect("stage");
        stage.stage(raw_source(3, 0x99)).expect("restage no-op");

        let block = stage.take_staged().expect("staged");
        assert_eq!(block.bytes[0], 0x42);
    }

    #[test]
    fn failed_decode_leaves_nothing_staged() {
        let mut stage = FrameStage::new();
        stage.stage(raw_source(1, 0xaa)).expect("stage A");

        let error = stage
            .stage(FrameSource::Encoded {
                key: SourceKey(2),
                bytes: vec![0xde, 0xad, 0xbe, 0xef],
            })
            .expect_err("garbage bytes cannot decode");
        assert!(matches!(error, StageError::Decode(_)));

        // A was already superseded; the failed decode staged nothing.
        assert!(stage.take_staged().is_none());
    }

    #[test]
    fn encoded_png_round_trips_through_the_stage() {
        let image = image::RgbaImage::from_pixel(3, 2, image::Rgba([10, 20, 30, 255]));
        let mut bytes = Vec::new();
        image
            .write_to(
                &mut std::io::Cursor::new(&mut bytes),
                image::ImageFormat::Png,
            )
            .expect("encode test png");

        let mut stage = FrameStage::new();
        stage
            .stage(FrameSource::Encoded {
                key: SourceKey(5),
                bytes,
            })
            .expect("decode png");

        let block = stage.take_staged().expect("staged");
        assert_eq!((block.width, block.height), (3, 2));
        assert_eq!(block.format, PixelFormat::Rgba8);
        assert_eq!(&block.bytes[0..4], &[10, 20, 30, 255]);
    }

    #[test]
    fn float_frames_stage_as_rgba32_float() {
        let mut stage = FrameStage::new();
        stage
            .stage(FrameSource::RawFloat {
                key: SourceKey(9),
                width: 1,
                height: 1,
                rgba: vec![0.25, 0.5, 0.75, 1.0],
            })
            .expect("stage float frame");

        let block = stage.take_staged().expect("staged");
        assert_eq!(block.format, PixelFormat::Rgba32Float);
        assert!(block.is_well_formed());
        let values: Vec<f32> = block
            .bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_ne_bytes(chunk.try_into().expect("4-byte chunk")))
            .collect();
        assert_eq!(values, vec![0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn malformed_raw_input_is_rejected() {
        let mut stage = FrameStage::new();
        let error = stage
            .stage(FrameSource::Raw {
                key: SourceKey(1),
                block: PixelBlock {
                    width: 4,
                    height: 4,
                    format: PixelFormat::Rgba8,
                    bytes: vec![0; 3].into_boxed_slice(),
                },
            })
            .expect_err("length mismatch");
        assert_eq!(error, StageError::MalformedBlock);

        stage.stage(raw_source(2, 0x01)).expect("stage");
        stage.clear();
        assert!(stage.take_staged().is_none());
    }
}
