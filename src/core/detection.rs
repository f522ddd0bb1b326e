//! Sawdust coverage detection.
//!
//! Sawdust shows up in a photo as fine, bright, high-frequency speckle. A median
//! filter removes exactly that speckle, so the difference between the original
//! and the median-filtered image isolates the dust. The pipeline is:
//!
//! 1. denoise (median filter)
//! 2. difference (original minus denoised, saturating)
//! 3. grayscale
//! 4. binary threshold (fixed level or Otsu)
//! 5. morphological closing, to join neighbouring particles
//! 6. ratio of white pixels to all pixels (the coverage)

use crate::domain::model::StageImages;
use crate::utils::error::{Result, WatcherError};
use crate::utils::validation::{validate_odd_kernel, validate_positive_number, validate_range};
use image::{
    imageops::FilterType, EncodableLayout, GrayImage, ImageBuffer, Luma, Pixel,
    PixelWithColorType, Rgb, RgbImage,
};
use std::path::Path;

pub const WHITE: u8 = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdMode {
    /// 像素值大於此值即視為粉塵
    Fixed(u8),
    /// 以 Otsu 法自動決定門檻
    Otsu,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectionParams {
    pub noise_size: u32,
    pub threshold: ThresholdMode,
    pub morph_size: u32,
    pub morph_iterations: u32,
    pub scale: f64,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            noise_size: 11,
            threshold: ThresholdMode::Fixed(32),
            morph_size: 5,
            morph_iterations: 3,
            scale: 1.0,
        }
    }
}

impl DetectionParams {
    pub fn validate(&self) -> Result<()> {
        validate_odd_kernel("detection.noise_size", self.noise_size)?;
        validate_odd_kernel("detection.morph_size", self.morph_size)?;
        validate_positive_number("detection.morph_iterations", self.morph_iterations as u64, 1)?;
        if self.scale <= 0.0 {
            return Err(WatcherError::InvalidConfigValueError {
                field: "detection.scale".to_string(),
                value: self.scale.to_string(),
                reason: "Scale must be greater than 0".to_string(),
            });
        }
        validate_range("detection.scale", self.scale, f64::MIN_POSITIVE, 1.0)
    }
}

#[derive(Debug, Clone)]
pub struct DetectionOutput {
    pub coverage_ratio: f64,
    pub threshold_level: u8,
    pub stages: StageImages,
}

/// 讀取彩色影像
pub fn load_image(path: &Path) -> Result<RgbImage> {
    let img = image::open(path).map_err(|e| {
        WatcherError::detection(format!(
            "Image failed to load from '{}': {}",
            path.display(),
            e
        ))
    })?;
    Ok(img.to_rgb8())
}

/// 儲存影像，格式由副檔名決定
pub fn write_image<P>(img: &ImageBuffer<P, Vec<P::Subpixel>>, path: &Path) -> Result<()>
where
    P: Pixel + PixelWithColorType,
    [P::Subpixel]: EncodableLayout,
{
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    img.save(path)?;
    Ok(())
}

/// 編碼成 PNG 位元組
pub fn encode_png<P>(img: &ImageBuffer<P, Vec<P::Subpixel>>) -> Result<Vec<u8>>
where
    P: Pixel + PixelWithColorType,
    [P::Subpixel]: EncodableLayout,
{
    let mut cursor = std::io::Cursor::new(Vec::new());
    img.write_to(&mut cursor, image::ImageFormat::Png)?;
    Ok(cursor.into_inner())
}

/// 依比例縮放影像
pub fn rescale_image(img: &RgbImage, scale: f64) -> Result<RgbImage> {
    if !(scale > 0.0 && scale.is_finite()) {
        return Err(WatcherError::detection(format!(
            "Invalid scale factor: {}",
            scale
        )));
    }

    let width = (img.width() as f64 * scale) as u32;
    let height = (img.height() as f64 * scale) as u32;
    if width == 0 || height == 0 {
        return Err(WatcherError::detection(format!(
            "Scale {} reduces a {}x{} image to nothing",
            scale,
            img.width(),
            img.height()
        )));
    }

    if width == img.width() && height == img.height() {
        return Ok(img.clone());
    }

    // 縮小時 Triangle 濾波器的支撐範圍隨比例放大，近似區域平均（權重為三角形而非等權）
    Ok(image::imageops::resize(img, width, height, FilterType::Triangle))
}

/// 逐通道中值濾波，邊界以複製邊緣像素處理
pub fn median_blur(img: &RgbImage, ksize: u32) -> RgbImage {
    let (width, height) = img.dimensions();
    let data = median_filter_raw(img.as_raw(), width as usize, height as usize, 3, ksize as usize);
    RgbImage::from_raw(width, height, data).unwrap_or_else(|| img.clone())
}

fn median_filter_raw(
    src: &[u8],
    width: usize,
    height: usize,
    channels: usize,
    ksize: usize,
) -> Vec<u8> {
    let mut dst = vec![0u8; src.len()];
    if width == 0 || height == 0 {
        return dst;
    }

    let r = (ksize / 2) as isize;
    let half = (ksize * ksize / 2) as u32;
    let clamp = |v: isize, len: usize| v.clamp(0, len as isize - 1) as usize;
    let at = |x: usize, y: usize, c: usize| src[(y * width + x) * channels + c] as usize;

    // 每列以直方圖滑動視窗計算中值
    for c in 0..channels {
        for y in 0..height {
            let mut hist = [0u32; 256];
            for dy in -r..=r {
                let yy = clamp(y as isize + dy, height);
                for dx in -r..=r {
                    hist[at(clamp(dx, width), yy, c)] += 1;
                }
            }
            dst[y * width * channels + c] = histogram_median(&hist, half);

            for x in 1..width {
                let leaving = clamp(x as isize - r - 1, width);
                let entering = clamp(x as isize + r, width);
                for dy in -r..=r {
                    let yy = clamp(y as isize + dy, height);
                    hist[at(leaving, yy, c)] -= 1;
                    hist[at(entering, yy, c)] += 1;
                }
                dst[(y * width + x) * channels + c] = histogram_median(&hist, half);
            }
        }
    }

    dst
}

fn histogram_median(hist: &[u32; 256], half: u32) -> u8 {
    let mut seen = 0;
    for (value, &count) in hist.iter().enumerate() {
        seen += count;
        if seen > half {
            return value as u8;
        }
    }
    WHITE
}

/// 逐通道飽和相減 `a - b`
pub fn subtract(a: &RgbImage, b: &RgbImage) -> Result<RgbImage> {
    if a.dimensions() != b.dimensions() {
        return Err(WatcherError::detection(format!(
            "Cannot subtract images of different sizes: {:?} and {:?}",
            a.dimensions(),
            b.dimensions()
        )));
    }

    let data = a
        .as_raw()
        .iter()
        .zip(b.as_raw())
        .map(|(x, y)| x.saturating_sub(*y))
        .collect();
    RgbImage::from_raw(a.width(), a.height(), data)
        .ok_or_else(|| WatcherError::detection("Difference buffer has the wrong length"))
}

/// 0.299 R + 0.587 G + 0.114 B，14 位元定點運算
pub fn to_grayscale(img: &RgbImage) -> GrayImage {
    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        let Rgb([r, g, b]) = *img.get_pixel(x, y);
        let luma = (4899 * r as u32 + 9617 * g as u32 + 1868 * b as u32 + 8192) >> 14;
        Luma([luma as u8])
    })
}

/// Otsu 法：最大化前景與背景的類間變異數
pub fn otsu_level(gray: &GrayImage) -> u8 {
    let mut hist = [0u64; 256];
    for &p in gray.as_raw() {
        hist[p as usize] += 1;
    }

    let total = gray.as_raw().len() as f64;
    let sum_all: f64 = hist
        .iter()
        .enumerate()
        .map(|(value, &count)| value as f64 * count as f64)
        .sum();

    let mut weight_bg = 0.0;
    let mut sum_bg = 0.0;
    let mut best_level = 0u8;
    let mut best_variance = -1.0;

    for (level, &count) in hist.iter().enumerate() {
        weight_bg += count as f64;
        sum_bg += level as f64 * count as f64;
        if weight_bg == 0.0 {
            continue;
        }
        let weight_fg = total - weight_bg;
        if weight_fg == 0.0 {
            break;
        }

        let mean_bg = sum_bg / weight_bg;
        let mean_fg = (sum_all - sum_bg) / weight_fg;
        let variance = weight_bg * weight_fg * (mean_bg - mean_fg).powi(2);
        if variance > best_variance {
            best_variance = variance;
            best_level = level as u8;
        }
    }

    best_level
}

/// 二值化：大於門檻為 255，其餘為 0。回傳影像與實際使用的門檻
pub fn threshold(gray: &GrayImage, mode: ThresholdMode) -> (GrayImage, u8) {
    let level = match mode {
        ThresholdMode::Fixed(level) => level,
        ThresholdMode::Otsu => otsu_level(gray),
    };

    let binary = GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        if gray.get_pixel(x, y)[0] > level {
            Luma([WHITE])
        } else {
            Luma([0])
        }
    });

    (binary, level)
}

#[derive(Clone, Copy)]
enum Morph {
    Dilate,
    Erode,
}

/// 方形結構元素的膨脹或侵蝕，影像外的像素不參與運算
fn morph_pass(img: &GrayImage, size: u32, op: Morph) -> GrayImage {
    let (width, height) = img.dimensions();
    let r = size / 2;
    let pick = |a: u8, b: u8| match op {
        Morph::Dilate => a.max(b),
        Morph::Erode => a.min(b),
    };
    let identity = match op {
        Morph::Dilate => 0,
        Morph::Erode => WHITE,
    };

    // 方形核可拆成水平與垂直兩次一維運算
    let horizontal = GrayImage::from_fn(width, height, |x, y| {
        let lo = x.saturating_sub(r);
        let hi = (x + r).min(width - 1);
        (lo..=hi).fold(Luma([identity]), |acc, xx| {
            Luma([pick(acc[0], img.get_pixel(xx, y)[0])])
        })
    });

    GrayImage::from_fn(width, height, |x, y| {
        let lo = y.saturating_sub(r);
        let hi = (y + r).min(height - 1);
        (lo..=hi).fold(Luma([identity]), |acc, yy| {
            Luma([pick(acc[0], horizontal.get_pixel(x, yy)[0])])
        })
    })
}

pub fn dilate(img: &GrayImage, size: u32) -> GrayImage {
    morph_pass(img, size, Morph::Dilate)
}

pub fn erode(img: &GrayImage, size: u32) -> GrayImage {
    morph_pass(img, size, Morph::Erode)
}

/// 閉運算：先膨脹 `iterations` 次，再侵蝕 `iterations` 次
pub fn morph_close(img: &GrayImage, size: u32, iterations: u32) -> GrayImage {
    if img.width() == 0 || img.height() == 0 {
        return img.clone();
    }

    let mut out = img.clone();
    for _ in 0..iterations {
        out = dilate(&out, size);
    }
    for _ in 0..iterations {
        out = erode(&out, size);
    }
    out
}

/// 白色像素佔全部像素的比例
pub fn white_pixel_ratio(img: &GrayImage) -> Result<f64> {
    let pixels = img.as_raw();
    if pixels.is_empty() {
        return Err(WatcherError::detection("Cannot compute coverage of an empty image"));
    }

    let white = pixels.iter().filter(|&&p| p == WHITE).count();
    Ok(white as f64 / pixels.len() as f64)
}

/// 估算影像中的粉塵覆蓋率
pub fn detect(img: &RgbImage, params: &DetectionParams) -> Result<DetectionOutput> {
    params.validate()?;
    if img.width() == 0 || img.height() == 0 {
        return Err(WatcherError::detection("Cannot analyse an empty image"));
    }

    tracing::debug!(
        "Detecting on {}x{} image (noise {}, morph {}x{}, {:?})",
        img.width(),
        img.height(),
        params.noise_size,
        params.morph_size,
        params.morph_iterations,
        params.threshold
    );

    let denoise = median_blur(img, params.noise_size);
    let difference = subtract(img, &denoise)?;
    let grayscale = to_grayscale(&difference);
    let (binary, threshold_level) = threshold(&grayscale, params.threshold);
    tracing::debug!("Threshold level: {}", threshold_level);

    let morph = morph_close(&binary, params.morph_size, params.morph_iterations);
    let coverage_ratio = white_pixel_ratio(&morph)?;

    Ok(DetectionOutput {
        coverage_ratio,
        threshold_level,
        stages: StageImages {
            original: img.clone(),
            denoise,
            difference,
            grayscale,
            threshold: binary,
            morph,
        },
    })
}
