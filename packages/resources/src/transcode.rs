//! Pure byte-to-byte image transformation for one resource type.
//!
//! | Type spec | Operation |
//! |---|---|
//! | `max_width == 0` | no resize |
//! | `aspect_ratio == 0` | width-only proportional resize, never upscales |
//! | `aspect_ratio > 0` | `resize_to_fill` to exactly `max_width x round(max_width / aspect)` |
//!
//! An optional crop box is applied before resizing. Output is always JPEG at
//! the type's quality.

use std::fmt;
use std::str::FromStr;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ColorType, DynamicImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::ResourceType;

const FILTER: FilterType = FilterType::CatmullRom;

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("Source is not a decodable image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("Crop box {crop} lies outside the {width}x{height} source")]
    CropOutOfBounds {
        crop: CropBox,
        width: u32,
        height: u32,
    },

    #[error("Crop box {0} has no area")]
    EmptyCrop(CropBox),

    #[error("Failed to encode output: {0}")]
    Encode(#[source] image::ImageError),
}

/// A region of the source image, in source pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    fn fits(&self, width: u32, height: u32) -> bool {
        u64::from(self.x) + u64::from(self.width) <= u64::from(width)
            && u64::from(self.y) + u64::from(self.height) <= u64::from(height)
    }
}

impl fmt::Display for CropBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.x, self.y, self.width, self.height)
    }
}

impl FromStr for CropBox {
    type Err = String;

    /// Parses `x,y,w,h`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s
            .split(',')
            .map(|p| p.trim().parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| format!("invalid crop box {s:?}: {e}"))?;
        match parts.as_slice() {
            &[x, y, width, height] => Ok(Self::new(x, y, width, height)),
            _ => Err(format!("crop box {s:?} must be x,y,w,h")),
        }
    }
}

/// Transcoded bytes and the dimensions they decode to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcoded {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Produces the rendition of `source` described by `spec`.
pub fn transcode(
    source: &[u8],
    spec: &ResourceType,
    crop: Option<CropBox>,
) -> Result<Transcoded, TranscodeError> {
    let mut img = image::load_from_memory(source).map_err(TranscodeError::Decode)?;

    if let Some(crop) = crop {
        if crop.width == 0 || crop.height == 0 {
            return Err(TranscodeError::EmptyCrop(crop));
        }
        if !crop.fits(img.width(), img.height()) {
            return Err(TranscodeError::CropOutOfBounds {
                crop,
                width: img.width(),
                height: img.height(),
            });
        }
        img = img.crop_imm(crop.x, crop.y, crop.width, crop.height);
    }

    let img = resize(img, spec);
    encode(&img, spec.quality)
}

fn resize(img: DynamicImage, spec: &ResourceType) -> DynamicImage {
    if spec.max_width == 0 {
        return img;
    }

    match spec.target_height() {
        Some(height) => img.resize_to_fill(spec.max_width, height.max(1), FILTER),
        None => {
            if img.width() <= spec.max_width {
                return img;
            }
            let height = (f64::from(img.height()) * f64::from(spec.max_width)
                / f64::from(img.width()))
            .round()
            .max(1.0) as u32;
            img.resize_exact(spec.max_width, height, FILTER)
        }
    }
}

fn encode(img: &DynamicImage, quality: u8) -> Result<Transcoded, TranscodeError> {
    let rgb = img.to_rgb8();
    let mut bytes = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut bytes, quality);
    encoder
        .encode(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8.into())
        .map_err(TranscodeError::Encode)?;

    Ok(Transcoded {
        bytes,
        width: rgb.width(),
        height: rgb.height(),
    })
}
