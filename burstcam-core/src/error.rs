use std::time::Duration;

use thiserror::Error;

use crate::traits::{CameraId, LensFacing};

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("No camera found facing {0:?}")]
    NoCameraFound(LensFacing),

    #[error("Time out waiting to lock camera opening (waited {0:?})")]
    OpenTimedOut(Duration),

    #[error("Camera driver rejected the call: {0}")]
    DriverAccess(String),

    #[error("Capture session could not be configured")]
    SessionConfigureFailed,

    /// 等待开/关互斥许可时被打断，调用方必须把它当作致命错误
    #[error("Interrupted while waiting for the camera open/close lock")]
    InterruptedWait,

    #[error("Burst frame count must be positive")]
    InvalidBurstCount,

    #[error("Cannot get available preview sizes for camera {0}")]
    NoOutputSizes(CameraId),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CameraError {
    /// 便捷构造：驱动层拒绝调用
    pub fn driver<S: Into<String>>(reason: S) -> Self {
        Self::DriverAccess(reason.into())
    }

    /// 是否为 "本次尝试致命" 的错误 (不应自动重试)
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::OpenTimedOut(_) | Self::InterruptedWait)
    }
}

pub type Result<T> = std::result::Result<T, CameraError>;
