//! # 截获图片模型
//!
//! `CapturedImage` 表示一次截获过程中从剪贴板解码出的 RGBA 像素，
//! 由持久化流程独占，写入结束（无论成败）后即丢弃。

use image::RgbaImage;

use crate::error::AppError;

/// 解码后的剪贴板图片：RGBA 像素 + 原始宽高。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedImage {
    /// 图像宽度（像素）。
    pub width: u32,
    /// 图像高度（像素）。
    pub height: u32,
    /// RGBA 字节数组（`width * height * 4`）。
    pub rgba: Vec<u8>,
}

impl CapturedImage {
    /// 从 RGBA 字节构造，校验长度与尺寸一致。
    pub fn from_rgba(width: u32, height: u32, rgba: Vec<u8>) -> Result<Self, AppError> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|pixels| pixels.checked_mul(4))
            .ok_or_else(|| AppError::InvalidBitmap("图片尺寸溢出".to_string()))?;

        if width == 0 || height == 0 {
            return Err(AppError::InvalidBitmap(format!("图片尺寸为空: {}x{}", width, height)));
        }
        if rgba.len() != expected {
            return Err(AppError::InvalidBitmap(format!(
                "像素长度不匹配: 期望 {} 实际 {}",
                expected,
                rgba.len()
            )));
        }

        Ok(Self { width, height, rgba })
    }

    /// 宽高
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// 转换为 `image` crate 的图像缓冲区。
    pub fn to_rgba_image(&self) -> Result<RgbaImage, AppError> {
        RgbaImage::from_raw(self.width, self.height, self.rgba.clone())
            .ok_or_else(|| AppError::InvalidBitmap("创建图像缓冲区失败".to_string()))
    }
}

impl From<RgbaImage> for CapturedImage {
    fn from(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            rgba: image.into_raw(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_buffer_length() {
        assert!(CapturedImage::from_rgba(2, 2, vec![0; 15]).is_err());
        assert!(CapturedImage::from_rgba(0, 2, Vec::new()).is_err());
        let ok = CapturedImage::from_rgba(2, 2, vec![0; 16]).expect("valid buffer");
        assert_eq!(ok.dimensions(), (2, 2));
    }
}
