use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use burstcam_core::frame::{Frame, PixelFormat};
use burstcam_core::geometry::StreamSize;
use burstcam_core::traits::{DisplaySurface, FrameSource, SurfaceTarget};
use burstcam_core::transform::{Matrix, Rotation};

static NEXT_SURFACE_ID: AtomicU64 = AtomicU64::new(1);

// 仿真帧的固定尺寸，小一点省内存
const SIM_FRAME_WIDTH: u32 = 4;
const SIM_FRAME_HEIGHT: u32 = 4;

#[derive(Debug)]
struct SurfaceState {
    available: bool,
    size: (u32, u32),
    rotation: Rotation,
    buffer_size: Option<StreamSize>,
    transform: Matrix,
    // 脚本化的读回结果；None 表示该次读回不可用
    scripted: VecDeque<Option<Frame>>,
    sequence: u64,
}

/// 仿真显示 Surface
///
/// 脚本队列为空时，每次 `read_frame` 都会生成一帧新画面
/// (像素值 = 序号低 8 位)；Surface 不可用时返回 None。
#[derive(Debug)]
pub struct SimSurface {
    id: u64,
    state: Mutex<SurfaceState>,
}

impl SimSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            id: NEXT_SURFACE_ID.fetch_add(1, Ordering::Relaxed),
            state: Mutex::new(SurfaceState {
                available: true,
                size: (width, height),
                rotation: Rotation::Rotation0,
                buffer_size: None,
                transform: Matrix::identity(),
                scripted: VecDeque::new(),
                sequence: 0,
            }),
        }
    }

    /// 尚未可用的 Surface (宿主还没完成布局)
    pub fn unavailable(width: u32, height: u32) -> Self {
        let surface = Self::new(width, height);
        surface.set_available(false);
        surface
    }

    fn state(&self) -> MutexGuard<'_, SurfaceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_available(&self, available: bool) {
        self.state().available = available;
    }

    pub fn resize(&self, width: u32, height: u32) {
        self.state().size = (width, height);
    }

    pub fn set_rotation(&self, rotation: Rotation) {
        self.state().rotation = rotation;
    }

    /// 下一次读回返回这一帧
    pub fn push_frame(&self, frame: Frame) {
        self.state().scripted.push_back(Some(frame));
    }

    /// 下一次读回不可用
    pub fn push_unavailable(&self) {
        self.state().scripted.push_back(None);
    }

    pub fn buffer_size(&self) -> Option<StreamSize> {
        self.state().buffer_size
    }

    pub fn transform(&self) -> Matrix {
        self.state().transform
    }
}

impl FrameSource for SimSurface {
    fn read_frame(&self) -> Option<Frame> {
        let mut state = self.state();
        if let Some(scripted) = state.scripted.pop_front() {
            return scripted;
        }
        if !state.available {
            return None;
        }

        state.sequence += 1;
        let seq = state.sequence;
        let pixels = vec![seq as u8; (SIM_FRAME_WIDTH * SIM_FRAME_HEIGHT * 4) as usize];
        Some(
            Frame::packed(pixels, SIM_FRAME_WIDTH, SIM_FRAME_HEIGHT, PixelFormat::Argb8888)
                .with_sequence(seq)
                .with_timestamp(Duration::from_millis(seq * 33)),
        )
    }
}

impl DisplaySurface for SimSurface {
    fn is_available(&self) -> bool {
        self.state().available
    }

    fn size(&self) -> (u32, u32) {
        self.state().size
    }

    fn target(&self) -> SurfaceTarget {
        SurfaceTarget(self.id)
    }

    fn set_default_buffer_size(&self, size: StreamSize) {
        self.state().buffer_size = Some(size);
    }

    fn rotation(&self) -> Rotation {
        self.state().rotation
    }

    fn set_transform(&self, matrix: Matrix) {
        self.state().transform = matrix;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_frames_come_first() {
        let surface = SimSurface::new(640, 480);
        surface.push_unavailable();
        surface.push_frame(Frame::packed(vec![9u8; 4], 1, 1, PixelFormat::Argb8888).with_sequence(100));

        assert!(surface.read_frame().is_none());
        assert_eq!(surface.read_frame().unwrap().sequence, 100);
        // 脚本耗尽后自动生成
        assert_eq!(surface.read_frame().unwrap().sequence, 1);
        assert_eq!(surface.read_frame().unwrap().sequence, 2);
    }

    #[test]
    fn unavailable_surface_yields_nothing() {
        let surface = SimSurface::unavailable(640, 480);
        assert!(!surface.is_available());
        assert!(surface.read_frame().is_none());
    }

    #[test]
    fn targets_are_unique() {
        assert_ne!(SimSurface::new(1, 1).target(), SimSurface::new(1, 1).target());
    }
}
