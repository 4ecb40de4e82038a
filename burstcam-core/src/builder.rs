use std::time::Duration;

use crate::traits::{AfMode, LensFacing};

/// 开设备时等待互斥许可的默认上限
pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_millis(2500);

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serialize", serde(default))]
pub struct PreviewConfig {
    pub facing: LensFacing,
    #[cfg_attr(feature = "serialize", serde(with = "millis"))]
    pub open_timeout: Duration,
    pub af_mode: AfMode,
    pub background_thread_name: String,
    pub worker_threads: usize, // 相机回调很轻，默认 1 个后台线程
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl PreviewConfig {
    pub fn new() -> Self {
        Self {
            facing: LensFacing::Front,
            open_timeout: DEFAULT_OPEN_TIMEOUT,
            af_mode: AfMode::ContinuousPicture,
            background_thread_name: "CameraBackground".to_string(),
            worker_threads: 1,
        }
    }

    /// 选择哪一侧的镜头
    pub fn facing(mut self, facing: LensFacing) -> Self {
        self.facing = facing;
        self
    }

    /// 开设备时最多等多久互斥许可
    pub fn open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = timeout;
        self
    }

    /// 预览请求首选的对焦模式
    pub fn af_mode(mut self, mode: AfMode) -> Self {
        self.af_mode = mode;
        self
    }

    pub fn background_thread_name<S: Into<String>>(mut self, name: S) -> Self {
        self.background_thread_name = name.into();
        self
    }

    /// 后台线程数 (至少 1)
    pub fn worker_threads(mut self, count: usize) -> Self {
        self.worker_threads = count.max(1);
        self
    }
}

#[cfg(feature = "serialize")]
impl PreviewConfig {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(feature = "serialize")]
mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
