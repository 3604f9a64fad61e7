//! # DIB 解码
//!
//! 剪贴板里的 "device-independent bitmap" 是去掉了 14 字节 `BITMAPFILEHEADER`
//! 的 BMP。这里补回文件头再交给 `image` 的 BMP 解码器。
//!
//! 补文件头的关键是算出像素数据的偏移：
//! 信息头长度 + 紧随 40 字节信息头的颜色掩码 + 调色板。

use image::{DynamicImage, ImageFormat};

use crate::error::AppError;

const FILE_HEADER_LEN: usize = 14;
const CORE_HEADER_LEN: usize = 12;
const INFO_HEADER_LEN: usize = 40;

const BI_BITFIELDS: u32 = 3;
const BI_ALPHABITFIELDS: u32 = 6;

fn read_u16(bytes: &[u8], at: usize) -> Option<u16> {
    let raw = bytes.get(at..at + 2)?;
    Some(u16::from_le_bytes([raw[0], raw[1]]))
}

fn read_u32(bytes: &[u8], at: usize) -> Option<u32> {
    let raw = bytes.get(at..at + 4)?;
    Some(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

/// 计算像素数据相对 DIB 起始处的偏移
fn pixel_data_offset(dib: &[u8]) -> Result<usize, AppError> {
    let truncated = || AppError::InvalidBitmap(format!("DIB 数据过短: {} 字节", dib.len()));

    let header_len = read_u32(dib, 0).ok_or_else(truncated)? as usize;
    if header_len < CORE_HEADER_LEN || header_len > dib.len() {
        return Err(AppError::InvalidBitmap(format!("DIB 信息头长度异常: {}", header_len)));
    }

    let offset = if header_len == CORE_HEADER_LEN {
        // BITMAPCOREHEADER：调色板项为 3 字节 RGBTRIPLE
        let bit_count = read_u16(dib, 10).ok_or_else(truncated)?;
        let palette = if bit_count <= 8 { 1usize << bit_count } else { 0 };
        header_len + palette * 3
    } else {
        if header_len < INFO_HEADER_LEN {
            return Err(AppError::InvalidBitmap(format!("DIB 信息头长度异常: {}", header_len)));
        }
        let bit_count = read_u16(dib, 14).ok_or_else(truncated)?;
        let compression = read_u32(dib, 16).ok_or_else(truncated)?;
        let colors_used = read_u32(dib, 32).ok_or_else(truncated)? as usize;

        let masks = match (header_len, compression) {
            (INFO_HEADER_LEN, BI_BITFIELDS) => 3 * 4,
            (INFO_HEADER_LEN, BI_ALPHABITFIELDS) => 4 * 4,
            _ => 0,
        };
        let palette = if colors_used > 0 {
            colors_used
        } else if bit_count <= 8 {
            1usize << bit_count
        } else {
            0
        };
        header_len + masks + palette * 4
    };

    if offset > dib.len() {
        return Err(AppError::InvalidBitmap(format!(
            "DIB 像素偏移越界: {} > {}",
            offset,
            dib.len()
        )));
    }
    Ok(offset)
}

/// 将剪贴板 DIB 字节解码为图像
pub fn decode_dib(dib: &[u8]) -> Result<DynamicImage, AppError> {
    let offset = pixel_data_offset(dib)?;
    let total_len = u32::try_from(FILE_HEADER_LEN + dib.len())
        .map_err(|_| AppError::InvalidBitmap("DIB 数据过大".to_string()))?;
    let data_offset = (FILE_HEADER_LEN + offset) as u32;

    let mut bmp = Vec::with_capacity(FILE_HEADER_LEN + dib.len());
    bmp.extend_from_slice(b"BM");
    bmp.extend_from_slice(&total_len.to_le_bytes());
    bmp.extend_from_slice(&[0; 4]);
    bmp.extend_from_slice(&data_offset.to_le_bytes());
    bmp.extend_from_slice(dib);

    Ok(image::load_from_memory_with_format(&bmp, ImageFormat::Bmp)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, ImageBuffer, Luma, Rgb, Rgba};
    use std::io::Cursor;

    fn encode_as_dib(image: DynamicImage) -> Vec<u8> {
        let mut bmp = Cursor::new(Vec::new());
        image
            .write_to(&mut bmp, ImageFormat::Bmp)
            .expect("bmp encode failed");
        bmp.into_inner().split_off(FILE_HEADER_LEN)
    }

    #[test]
    fn decodes_24_bit_dib() {
        let source = ImageBuffer::from_fn(7, 3, |x, y| Rgb([x as u8 * 30, y as u8 * 60, 9]));
        let decoded = decode_dib(&encode_as_dib(DynamicImage::ImageRgb8(source.clone())))
            .expect("decode failed");
        assert_eq!(decoded.dimensions(), (7, 3));
        assert_eq!(decoded.to_rgb8(), source);
    }

    #[test]
    fn decodes_32_bit_bitfields_dib() {
        let source = ImageBuffer::from_fn(5, 4, |x, y| Rgba([x as u8, y as u8, 200, 255]));
        let decoded =
            decode_dib(&encode_as_dib(DynamicImage::ImageRgba8(source))).expect("decode failed");
        assert_eq!(decoded.dimensions(), (5, 4));
    }

    #[test]
    fn decodes_paletted_dib() {
        let source = ImageBuffer::from_fn(6, 2, |x, _| Luma([x as u8 * 40]));
        let decoded =
            decode_dib(&encode_as_dib(DynamicImage::ImageLuma8(source))).expect("decode failed");
        assert_eq!(decoded.dimensions(), (6, 2));
    }

    #[test]
    fn masks_follow_plain_info_header_with_bitfields() {
        let mut header = vec![0u8; INFO_HEADER_LEN + 12 + 4];
        header[0..4].copy_from_slice(&(INFO_HEADER_LEN as u32).to_le_bytes());
        header[14..16].copy_from_slice(&32u16.to_le_bytes());
        header[16..20].copy_from_slice(&BI_BITFIELDS.to_le_bytes());
        assert_eq!(pixel_data_offset(&header).expect("offset"), INFO_HEADER_LEN + 12);
    }

    #[test]
    fn rejects_truncated_or_garbage_input() {
        assert!(decode_dib(&[]).is_err());
        assert!(decode_dib(&[40, 0, 0]).is_err());
        assert!(decode_dib(&[0xff; 64]).is_err());
    }
}
