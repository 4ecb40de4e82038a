// 开启一些 Clippy 检查，保证代码质量
#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

// 模块定义
pub mod builder;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod traits;
pub mod transform;

// 方便用户使用的 Prelude
pub mod prelude {
    pub use crate::builder::PreviewConfig;
    pub use crate::error::{CameraError, Result};
    pub use crate::frame::{Frame, PixelFormat};
    pub use crate::geometry::{choose_optimal_size, StreamSize};
    pub use crate::traits::{
        CameraDriver, DisplaySurface, FrameCaptureListener, FrameSource, LensFacing,
        SurfaceListener,
    };
    pub use crate::transform::{compute_preview_transform, Matrix, Rotation};
}

// 版本与构建信息常量
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
