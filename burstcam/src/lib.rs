pub mod capture;
pub(crate) mod internal; // 内部模块，不对外暴露
pub mod preview;
pub mod session;

// Re-export 核心 crate，实现驱动 / Surface 时不必再单独依赖
pub use burstcam_core;

pub use capture::{
    channel_listener, CaptureEvent, CaptureState, ChannelListener, FrameCaptureController,
};
pub use preview::CameraPreview;
pub use session::{DeviceSessionManager, SessionPhase};

/// 预置模块，用户可以通过 `use burstcam::prelude::*;` 导入常用项
pub mod prelude {
    pub use crate::capture::{channel_listener, CaptureEvent, CaptureState};
    pub use crate::preview::CameraPreview;
    pub use crate::session::SessionPhase;
    pub use burstcam_core::prelude::*;
}
