use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// 从显示 Surface 读回的像素布局
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum PixelFormat {
    /// 每像素 4 字节，A-R-G-B
    Argb8888,
    /// 每像素 2 字节
    Rgb565,
    /// 仅 alpha 通道
    Alpha8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            Self::Argb8888 => 4,
            Self::Rgb565 => 2,
            Self::Alpha8 => 1,
        }
    }
}

/// 一帧被捕获的画面
///
/// 与驱动 Ring Buffer 解耦：数据是自有的，放在 `Arc<[u8]>` 中，
/// 所以 clone 只增加引用计数，逐帧事件和批次事件可以共享同一块内存。
#[derive(Clone)]
pub struct Frame {
    /// 像素数据 (含行尾 padding)
    pub data: Arc<[u8]>,

    pub width: u32,

    pub height: u32,

    /// 每行字节数，可能大于 width * bpp
    pub stride: usize,

    pub format: PixelFormat,

    /// Surface 侧的帧序号
    pub sequence: u64,

    /// Surface 内容更新的时间 (相对 Surface 创建)
    pub timestamp: Duration,
}

impl Frame {
    /// 构造一个紧密排列 (无 padding) 的帧
    pub fn packed(
        data: impl Into<Arc<[u8]>>,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Self {
        Self {
            data: data.into(),
            width,
            height,
            stride: width as usize * format.bytes_per_pixel(),
            format,
            sequence: 0,
            timestamp: Duration::ZERO,
        }
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn with_timestamp(mut self, timestamp: Duration) -> Self {
        self.timestamp = timestamp;
        self
    }

}

// 不打印像素数据
impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .field("format", &self.format)
            .field("sequence", &self.sequence)
            .field("bytes", &self.data.len())
            .finish()
    }
}
