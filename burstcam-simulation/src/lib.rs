//! 不依赖硬件的相机驱动与显示 Surface
//!
//! 回调的投递时机可以脚本化 (立即 / 挂起后手动完成 / 失败)，
//! 用来复现开关设备的竞态。

#![warn(missing_debug_implementations, rust_2018_idioms)]

mod driver;
mod surface;

pub use driver::{OpenBehavior, SessionBehavior, SimDriver, SimStats};
pub use surface::SimSurface;
