use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;

use crate::error::Result;
use crate::frame::Frame;
use crate::geometry::StreamSize;
use crate::transform::{Matrix, Rotation};

// --- 相机身份与属性 ---

/// 物理相机的不透明标识 (由驱动分配)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct CameraId(String);

impl CameraId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CameraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CameraId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for CameraId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// 镜头朝向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum LensFacing {
    #[default]
    Front,
    Back,
    External,
}

bitflags! {
    /// 相机支持的自动对焦模式集合
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
    pub struct AfModes: u32 {
        const OFF = 1 << 0;
        const AUTO = 1 << 1;
        const MACRO = 1 << 2;
        const CONTINUOUS_VIDEO = 1 << 3;
        const CONTINUOUS_PICTURE = 1 << 4;
        const EDOF = 1 << 5;
    }
}

/// 单个自动对焦模式 (写入 CaptureRequest)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum AfMode {
    Off,
    Auto,
    Macro,
    ContinuousVideo,
    #[default]
    ContinuousPicture,
    Edof,
}

impl AfMode {
    pub fn flag(&self) -> AfModes {
        match self {
            Self::Off => AfModes::OFF,
            Self::Auto => AfModes::AUTO,
            Self::Macro => AfModes::MACRO,
            Self::ContinuousVideo => AfModes::CONTINUOUS_VIDEO,
            Self::ContinuousPicture => AfModes::CONTINUOUS_PICTURE,
            Self::Edof => AfModes::EDOF,
        }
    }

    /// 在相机支持的集合里为预览挑一个对焦模式
    ///
    /// 优先使用 `preferred`；不支持时按连续拍照、连续视频、单次自动的顺序回退，
    /// 都不支持就关闭对焦。
    /// 驱动没有上报任何模式时原样返回 `preferred`。
    pub fn resolve(preferred: AfMode, supported: AfModes) -> AfMode {
        if supported.is_empty() || supported.contains(preferred.flag()) {
            return preferred;
        }
        [AfMode::ContinuousPicture, AfMode::ContinuousVideo, AfMode::Auto]
            .into_iter()
            .find(|mode| supported.contains(mode.flag()))
            .unwrap_or(AfMode::Off)
    }
}

/// 相机静态属性
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CameraCharacteristics {
    /// 镜头朝向，驱动不清楚时为 None
    pub facing: Option<LensFacing>,

    /// 预览 Surface 可用的输出分辨率，保持驱动给出的顺序
    pub output_sizes: Vec<StreamSize>,

    pub af_modes: AfModes,
}

// --- 采集请求 ---

/// 输出 Surface 的不透明句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceTarget(pub u64);

/// 重复预览请求
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CaptureRequest {
    pub targets: Vec<SurfaceTarget>,
    pub af_mode: Option<AfMode>,
}

impl CaptureRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_target(&mut self, target: SurfaceTarget) {
        self.targets.push(target);
    }

    pub fn set_af_mode(&mut self, mode: AfMode) {
        self.af_mode = Some(mode);
    }
}

// --- 驱动回调 ---

/// 驱动上报的设备级错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceErrorCode {
    CameraInUse,
    MaxCamerasInUse,
    CameraDisabled,
    CameraDevice,
    CameraService,
    Unknown(i32),
}

impl From<i32> for DeviceErrorCode {
    fn from(code: i32) -> Self {
        match code {
            1 => Self::CameraInUse,
            2 => Self::MaxCamerasInUse,
            3 => Self::CameraDisabled,
            4 => Self::CameraDevice,
            5 => Self::CameraService,
            other => Self::Unknown(other),
        }
    }
}

/// 打开设备的异步结果，以及打开后的断连/错误通知
pub enum DeviceEvent {
    Opened(Box<dyn CameraDevice>),
    Disconnected,
    Error(DeviceErrorCode),
}

impl fmt::Debug for DeviceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Opened(device) => write!(f, "Opened({})", device.id()),
            Self::Disconnected => f.write_str("Disconnected"),
            Self::Error(code) => write!(f, "Error({:?})", code),
        }
    }
}

/// 采集会话配置的异步结果
pub enum SessionEvent {
    Configured(Box<dyn CaptureSession>),
    ConfigureFailed,
}

impl fmt::Debug for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configured(_) => f.write_str("Configured"),
            Self::ConfigureFailed => f.write_str("ConfigureFailed"),
        }
    }
}

/// 驱动回调的投递端
///
/// 驱动可以在任意线程调用 `deliver`；接收方决定在哪个执行上下文处理事件。
/// Core 不绑定具体的 channel 实现。
pub struct Callback<E> {
    sink: Arc<dyn Fn(E) + Send + Sync>,
}

impl<E> Callback<E> {
    pub fn new<F>(sink: F) -> Self
    where
        F: Fn(E) + Send + Sync + 'static,
    {
        Self {
            sink: Arc::new(sink),
        }
    }

    pub fn deliver(&self, event: E) {
        (self.sink)(event)
    }
}

impl<E> Clone for Callback<E> {
    fn clone(&self) -> Self {
        Self {
            sink: Arc::clone(&self.sink),
        }
    }
}

impl<E> fmt::Debug for Callback<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Callback")
    }
}

pub type DeviceCallback = Callback<DeviceEvent>;
pub type SessionCallback = Callback<SessionEvent>;

// --- 核心 Trait 定义 ---

/// 1. 驱动入口：相机枚举与打开
pub trait CameraDriver: Send + Sync {
    fn camera_ids(&self) -> Result<Vec<CameraId>>;

    fn characteristics(&self, id: &CameraId) -> Result<CameraCharacteristics>;

    /// 异步打开设备
    /// 返回 Err 表示驱动当场拒绝；否则结果稍后通过 `callback` 投递
    fn open_camera(&self, id: &CameraId, callback: DeviceCallback) -> Result<()>;
}

/// 2. 已打开的物理设备
pub trait CameraDevice: Send + Sync {
    fn id(&self) -> &CameraId;

    /// 异步创建单/多 Surface 的采集会话，结果通过 `callback` 投递
    fn create_capture_session(
        &self,
        outputs: Vec<SurfaceTarget>,
        callback: SessionCallback,
    ) -> Result<()>;

    fn close(&self);
}

/// 3. 配置完成的采集管线
pub trait CaptureSession: Send + Sync {
    /// 提交常驻请求，直到被替换或会话关闭
    fn set_repeating_request(&self, request: CaptureRequest) -> Result<()>;

    fn close(&self);
}

/// 能读回当前画面的东西
pub trait FrameSource {
    /// 读取当前内容；None 表示暂时不可用
    fn read_frame(&self) -> Option<Frame>;
}

/// 4. 宿主提供的显示 Surface
pub trait DisplaySurface: FrameSource + Send + Sync {
    fn is_available(&self) -> bool;

    /// 当前宽高
    fn size(&self) -> (u32, u32);

    fn target(&self) -> SurfaceTarget;

    /// 把 Surface 的 buffer 尺寸绑定到协商出的预览分辨率
    fn set_default_buffer_size(&self, size: StreamSize);

    fn rotation(&self) -> Rotation;

    fn set_transform(&self, matrix: Matrix);
}

/// 帧捕获监听者
pub trait FrameCaptureListener: Send + Sync {
    /// 每捕获一帧调用一次，按捕获顺序
    fn on_frame_captured(&self, frame: &Frame);

    /// 整个批次完成时调用一次
    fn on_frames_captured(&self, frames: &[Frame]);
}

/// 宿主 Surface 生命周期通知
pub trait SurfaceListener {
    fn on_surface_available(&self, width: u32, height: u32) -> Result<()>;

    fn on_surface_size_changed(&self, width: u32, height: u32) -> Result<()>;

    fn on_surface_destroyed(&self) -> Result<()>;

    fn on_surface_updated(&self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn af_mode_prefers_requested() {
        let supported = AfModes::AUTO | AfModes::CONTINUOUS_PICTURE;
        assert_eq!(
            AfMode::resolve(AfMode::ContinuousPicture, supported),
            AfMode::ContinuousPicture
        );
    }

    #[test]
    fn af_mode_falls_back() {
        assert_eq!(
            AfMode::resolve(AfMode::ContinuousPicture, AfModes::AUTO | AfModes::OFF),
            AfMode::Auto
        );
        assert_eq!(
            AfMode::resolve(AfMode::Macro, AfModes::CONTINUOUS_VIDEO),
            AfMode::ContinuousVideo
        );
        // 定焦镜头
        assert_eq!(
            AfMode::resolve(AfMode::ContinuousPicture, AfModes::OFF),
            AfMode::Off
        );
        // 驱动没上报
        assert_eq!(
            AfMode::resolve(AfMode::ContinuousPicture, AfModes::empty()),
            AfMode::ContinuousPicture
        );
    }

    #[test]
    fn device_error_codes() {
        assert_eq!(DeviceErrorCode::from(1), DeviceErrorCode::CameraInUse);
        assert_eq!(DeviceErrorCode::from(5), DeviceErrorCode::CameraService);
        assert_eq!(DeviceErrorCode::from(42), DeviceErrorCode::Unknown(42));
    }

    #[test]
    fn callback_delivers_to_sink() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: DeviceCallback = Callback::new(move |event: DeviceEvent| {
            sink.lock().unwrap().push(format!("{:?}", event));
        });
        let clone = callback.clone();
        callback.deliver(DeviceEvent::Disconnected);
        clone.deliver(DeviceEvent::Error(DeviceErrorCode::CameraDisabled));
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["Disconnected", "Error(CameraDisabled)"]
        );
    }
}
