use std::fmt;

/// 相机流支持的输出分辨率 (宽 x 高)
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct StreamSize {
    pub width: u32,
    pub height: u32,
}

impl StreamSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// 像素面积，使用 u64 避免大分辨率溢出
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl fmt::Debug for StreamSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl fmt::Display for StreamSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl From<(u32, u32)> for StreamSize {
    fn from((width, height): (u32, u32)) -> Self {
        Self { width, height }
    }
}

/// 核心：预览尺寸协商
///
/// 在相机支持的分辨率中挑选面积与显示区域最接近的一个。
/// 面积差相同时保留最先出现的候选 (驱动给出的顺序)。
///
/// # Panics
/// `choices` 为空时 panic。调用方负责保证非空 (驱动没有上报尺寸时
/// 应在更早的地方以 `CameraError::NoOutputSizes` 失败)。
pub fn choose_optimal_size(choices: &[StreamSize], view_width: u32, view_height: u32) -> StreamSize {
    let target_area = view_width as u64 * view_height as u64;

    let mut selected = choices[0];
    let mut min_diff = u64::MAX;

    for size in choices {
        let diff = size.area().abs_diff(target_area);
        // 严格小于：保证平局时先到先得
        if diff < min_diff {
            selected = *size;
            min_diff = diff;
        }
    }

    tracing::debug!(
        "Negotiated preview size {} for view {}x{} ({} candidates)",
        selected,
        view_width,
        view_height,
        choices.len()
    );

    selected
}
