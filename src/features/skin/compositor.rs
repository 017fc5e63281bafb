//! 皮肤位图的纯函数变换：裁剪、帽子层检测与合成、缩放、编码。
//!
//! 这里没有任何 I/O，所有函数都可以在任意阻塞线程上直接调用。

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ExtendedColorType, ImageEncoder, RgbaImage};

use crate::error::SkinError;

use super::types::OutputFormat;

pub const HEAD_X: u32 = 8;
pub const HEAD_Y: u32 = 8;
pub const HELM_X: u32 = 40;
pub const HELM_Y: u32 = 8;
/// 头部 / 帽子层边长
pub const FACE_SIZE: u32 = 8;

pub const SKIN_WIDTH: u32 = 64;

/// 解码皮肤字节，并校验为 64×32（旧版）或 64×64 的像素网格。
pub fn decode_skin(bytes: &[u8]) -> Result<RgbaImage, SkinError> {
    let img = image::load_from_memory(bytes)?.to_rgba8();
    let (w, h) = img.dimensions();
    if w != SKIN_WIDTH || (h != 32 && h != 64) {
        return Err(SkinError::DecodeFailure(format!(
            "皮肤尺寸非法: {w}x{h}（期望 64x32 或 64x64）"
        )));
    }
    Ok(img)
}

/// 裁剪固定矩形区域。调用方只使用固定偏移，越界属于编程错误。
pub fn crop(skin: &RgbaImage, x: u32, y: u32, w: u32, h: u32) -> RgbaImage {
    debug_assert!(x + w <= skin.width() && y + h <= skin.height());
    imageops::crop_imm(skin, x, y, w, h).to_image()
}

pub fn head(skin: &RgbaImage) -> RgbaImage {
    crop(skin, HEAD_X, HEAD_Y, FACE_SIZE, FACE_SIZE)
}

pub fn helm_layer(skin: &RgbaImage) -> RgbaImage {
    crop(skin, HELM_X, HELM_Y, FACE_SIZE, FACE_SIZE)
}

/// 帽子层是否存在：区域内任一像素 alpha 非 0 即视为存在。
///
/// 旧版纹理用纯黑填充空帽子层，这里不做特判，统一以透明度为准。
pub fn has_helm(skin: &RgbaImage) -> bool {
    (HELM_Y..HELM_Y + FACE_SIZE)
        .flat_map(|y| (HELM_X..HELM_X + FACE_SIZE).map(move |x| (x, y)))
        .any(|(x, y)| skin.get_pixel(x, y)[3] != 0)
}

/// 头部 + 帽子层合成；无帽子层时原样返回头部。
pub fn composite(skin: &RgbaImage) -> RgbaImage {
    let mut out = head(skin);
    if has_helm(skin) {
        imageops::overlay(&mut out, &helm_layer(skin), 0, 0);
    }
    out
}

/// 等比缩放到指定宽度（头部为正方形，结果即 size×size）。
///
/// 像素画使用最近邻采样，放大后保持硬边。
pub fn resize(img: &RgbaImage, width: u32) -> RgbaImage {
    let (w, h) = img.dimensions();
    let width = width.max(1);
    let height = ((u64::from(h) * u64::from(width)) / u64::from(w.max(1))).max(1) as u32;
    if (w, h) == (width, height) {
        return img.clone();
    }
    imageops::resize(img, width, height, FilterType::Nearest)
}

/// 序列化为目标格式。相同输入 + 格式始终得到相同字节。
pub fn encode(img: &RgbaImage, format: OutputFormat, jpeg_quality: u8) -> Result<Vec<u8>, SkinError> {
    let (w, h) = img.dimensions();
    let mut out = Vec::new();
    let result = match format {
        OutputFormat::Png => {
            PngEncoder::new(Cursor::new(&mut out)).write_image(img, w, h, ExtendedColorType::Rgba8)
        }
        OutputFormat::Jpeg => {
            // JPEG 不支持 alpha，转为 RGB
            let rgb = DynamicImage::ImageRgba8(img.clone()).to_rgb8();
            JpegEncoder::new_with_quality(Cursor::new(&mut out), jpeg_quality.clamp(1, 100))
                .write_image(&rgb, w, h, ExtendedColorType::Rgb8)
        }
    };
    result.map_err(|e| SkinError::Encode(e.to_string()))?;
    Ok(out)
}
