//! 预览门面：把宿主 Surface 的生命周期接到会话管理与连拍控制上

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tracing::{debug, info};

use burstcam_core::builder::PreviewConfig;
use burstcam_core::error::{CameraError, Result};
use burstcam_core::traits::{CameraDriver, DisplaySurface, FrameCaptureListener, SurfaceListener};
use burstcam_core::transform::compute_preview_transform;

use crate::capture::{CaptureState, FrameCaptureController};
use crate::session::{DeviceSessionManager, SessionPhase};

/// 相机预览
///
/// 宿主 (UI 层) 把 Surface 通知通过 [`SurfaceListener`] 转进来，
/// 应用层调用 `start_preview` / `close_camera` / `start_capturing_frames`。
pub struct CameraPreview {
    sessions: DeviceSessionManager,
    surface: Arc<dyn DisplaySurface>,
    capture: Mutex<FrameCaptureController>,
    listener: RwLock<Option<Arc<dyn FrameCaptureListener>>>,
}

impl std::fmt::Debug for CameraPreview {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraPreview")
            .field("sessions", &self.sessions)
            .field("capture", &self.capture_state())
            .finish()
    }
}

impl CameraPreview {
    pub fn new(
        driver: Arc<dyn CameraDriver>,
        surface: Arc<dyn DisplaySurface>,
        config: PreviewConfig,
    ) -> Result<Self> {
        Ok(Self {
            sessions: DeviceSessionManager::new(driver, config)?,
            surface,
            capture: Mutex::new(FrameCaptureController::new()),
            listener: RwLock::new(None),
        })
    }

    pub fn sessions(&self) -> &DeviceSessionManager {
        &self.sessions
    }

    pub fn session_phase(&self) -> SessionPhase {
        self.sessions.phase()
    }

    pub fn capture_state(&self) -> CaptureState {
        self.controller().state()
    }

    fn controller(&self) -> MutexGuard<'_, FrameCaptureController> {
        self.capture.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 开始预览
    /// Surface 尚不可用时什么也不做，等 `on_surface_available` 再打开
    pub fn start_preview(&self) -> Result<()> {
        if !self.surface.is_available() {
            info!("Surface not available yet, deferring camera open");
            return Ok(());
        }
        let (width, height) = self.surface.size();
        self.sessions.open(Arc::clone(&self.surface), width, height)
    }

    pub fn close_camera(&self) -> Result<()> {
        self.sessions.close()
    }

    /// 开始连拍 `count` 帧，之后每次 Surface 更新抓一帧
    pub fn start_capturing_frames(&self, count: usize) -> Result<()> {
        let count = NonZeroUsize::new(count).ok_or(CameraError::InvalidBurstCount)?;
        info!("Starting burst capture of {} frames", count);
        self.controller().start_burst(count);
        Ok(())
    }

    /// 注册帧捕获监听者，替换之前的
    pub fn set_frame_capture_listener(&self, listener: Arc<dyn FrameCaptureListener>) {
        *self.listener.write().unwrap_or_else(PoisonError::into_inner) = Some(listener);
    }

    pub fn clear_frame_capture_listener(&self) {
        *self.listener.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl SurfaceListener for CameraPreview {
    fn on_surface_available(&self, width: u32, height: u32) -> Result<()> {
        self.sessions.open(Arc::clone(&self.surface), width, height)
    }

    fn on_surface_size_changed(&self, width: u32, height: u32) -> Result<()> {
        let Some(buffer) = self.sessions.native_buffer_size()? else {
            debug!("No camera to compute a preview transform for");
            return Ok(());
        };
        let rotation = self.surface.rotation();
        let matrix = compute_preview_transform(width, height, rotation, buffer);
        debug!(
            "Preview transform for {}x{} at {:?} (buffer {}): {:?}",
            width, height, rotation, buffer, matrix
        );
        self.surface.set_transform(matrix);
        Ok(())
    }

    fn on_surface_destroyed(&self) -> Result<()> {
        self.sessions.close()
    }

    fn on_surface_updated(&self) {
        let events = self.controller().on_surface_updated(self.surface.as_ref());
        if events.is_empty() {
            return;
        }

        // 回调在锁外执行，监听者可以在回调里重新发起连拍
        let listener = self
            .listener
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(listener) = listener {
            for event in &events {
                event.dispatch(listener.as_ref());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{channel_listener, CaptureEvent};
    use burstcam_core::frame::{Frame, PixelFormat};
    use burstcam_core::geometry::StreamSize;
    use burstcam_core::traits::{AfModes, LensFacing};
    use burstcam_core::transform::Rotation;
    use burstcam_simulation::{SimDriver, SimSurface};
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(2);

    fn preview(driver: &SimDriver, surface: &Arc<SimSurface>) -> CameraPreview {
        CameraPreview::new(
            Arc::new(driver.clone()),
            surface.clone(),
            PreviewConfig::new(),
        )
        .unwrap()
    }

    #[test]
    fn start_preview_streams_and_bursts() {
        let driver = SimDriver::phone();
        let surface = Arc::new(SimSurface::new(800, 600));
        let preview = preview(&driver, &surface);
        let (listener, rx) = channel_listener();
        preview.set_frame_capture_listener(Arc::new(listener));

        preview.start_preview().unwrap();
        assert!(preview
            .sessions()
            .wait_for_phase(SessionPhase::OpenStreaming, WAIT));

        preview.start_capturing_frames(3).unwrap();
        for _ in 0..4 {
            preview.on_surface_updated();
        }

        let events: Vec<CaptureEvent> = rx.try_iter().collect();
        assert_eq!(events.len(), 4);
        let singles: Vec<u64> = events[..3]
            .iter()
            .map(|e| match e {
                CaptureEvent::FrameCaptured(f) => f.sequence,
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(singles, vec![1, 2, 3]);
        match &events[3] {
            CaptureEvent::BurstCompleted(frames) => {
                let seqs: Vec<u64> = frames.iter().map(|f| f.sequence).collect();
                assert_eq!(seqs, vec![1, 2, 3]);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(preview.capture_state(), CaptureState::Idle);
    }

    #[test]
    fn start_preview_waits_for_surface() {
        let driver = SimDriver::phone();
        let surface = Arc::new(SimSurface::unavailable(1280, 720));
        let preview = preview(&driver, &surface);

        preview.start_preview().unwrap();
        assert_eq!(driver.stats().open_calls(), 0);
        assert_eq!(preview.session_phase(), SessionPhase::Closed);

        surface.set_available(true);
        preview.on_surface_available(1280, 720).unwrap();
        assert!(preview
            .sessions()
            .wait_for_phase(SessionPhase::OpenStreaming, WAIT));
        assert_eq!(surface.buffer_size(), Some(StreamSize::new(1280, 720)));
    }

    #[test]
    fn zero_frame_burst_is_rejected() {
        let driver = SimDriver::phone();
        let surface = Arc::new(SimSurface::new(800, 600));
        let preview = preview(&driver, &surface);

        assert!(matches!(
            preview.start_capturing_frames(0),
            Err(CameraError::InvalidBurstCount)
        ));
        assert_eq!(preview.capture_state(), CaptureState::Idle);
    }

    #[test]
    fn size_change_applies_rotation_transform() {
        let driver = SimDriver::phone();
        let surface = Arc::new(SimSurface::new(800, 600));
        surface.set_rotation(Rotation::Rotation180);
        let preview = preview(&driver, &surface);

        preview.on_surface_size_changed(800, 600).unwrap();
        let (x, y) = surface.transform().map_point(0.0, 0.0);
        assert!((x - 800.0).abs() < 1e-3 && (y - 600.0).abs() < 1e-3);

        surface.set_rotation(Rotation::Rotation0);
        preview.on_surface_size_changed(800, 600).unwrap();
        assert!(surface.transform().is_identity());
    }

    #[test]
    fn transform_does_not_depend_on_session_state() {
        let driver = SimDriver::phone();
        let surface = Arc::new(SimSurface::new(800, 600));
        surface.set_rotation(Rotation::Rotation270);
        let preview = preview(&driver, &surface);
        let expected =
            compute_preview_transform(800, 600, Rotation::Rotation270, StreamSize::new(1920, 1080));

        preview.on_surface_size_changed(800, 600).unwrap();
        assert_eq!(surface.transform(), expected);

        // 打开后协商出的 640x480 不参与变换
        preview.on_surface_available(800, 600).unwrap();
        assert!(preview
            .sessions()
            .wait_for_phase(SessionPhase::OpenStreaming, WAIT));
        assert_eq!(surface.buffer_size(), Some(StreamSize::new(640, 480)));
        preview.on_surface_size_changed(800, 600).unwrap();
        assert_eq!(surface.transform(), expected);
    }

    #[test]
    fn size_change_without_front_camera_is_noop() {
        let driver = SimDriver::new().camera(
            "0",
            LensFacing::Back,
            vec![StreamSize::new(640, 480)],
            AfModes::empty(),
        );
        let surface = Arc::new(SimSurface::new(800, 600));
        surface.set_rotation(Rotation::Rotation180);
        let preview = preview(&driver, &surface);

        preview.on_surface_size_changed(800, 600).unwrap();
        assert!(surface.transform().is_identity());
    }

    #[test]
    fn destroyed_surface_closes_camera_mid_burst() {
        let driver = SimDriver::phone();
        let surface = Arc::new(SimSurface::new(800, 600));
        let preview = preview(&driver, &surface);

        preview.on_surface_available(800, 600).unwrap();
        assert!(preview
            .sessions()
            .wait_for_phase(SessionPhase::OpenStreaming, WAIT));
        preview.start_capturing_frames(5).unwrap();
        preview.on_surface_updated();

        preview.on_surface_destroyed().unwrap();
        assert_eq!(preview.session_phase(), SessionPhase::Closed);
        assert_eq!(driver.stats().live_devices(), 0);
        assert_eq!(driver.stats().live_sessions(), 0);
        assert_eq!(
            preview.capture_state(),
            CaptureState::Capturing {
                captured: 1,
                requested: 5
            }
        );
    }

    #[test]
    fn unavailable_readback_does_not_count() {
        let driver = SimDriver::phone();
        let surface = Arc::new(SimSurface::new(800, 600));
        let preview = preview(&driver, &surface);
        let (listener, rx) = channel_listener();
        preview.set_frame_capture_listener(Arc::new(listener));

        preview.start_capturing_frames(2).unwrap();
        surface.push_unavailable();
        surface.push_frame(Frame::packed(vec![9u8; 4], 1, 1, PixelFormat::Argb8888).with_sequence(42));
        for _ in 0..3 {
            preview.on_surface_updated();
        }

        let batch = rx
            .try_iter()
            .find_map(|e| match e {
                CaptureEvent::BurstCompleted(frames) => Some(frames),
                _ => None,
            })
            .unwrap();
        let seqs: Vec<u64> = batch.iter().map(|f| f.sequence).collect();
        assert_eq!(seqs, vec![42, 1]);
    }

    #[test]
    fn replaced_listener_gets_later_events() {
        let driver = SimDriver::phone();
        let surface = Arc::new(SimSurface::new(800, 600));
        let preview = preview(&driver, &surface);
        let (first, first_rx) = channel_listener();
        let (second, second_rx) = channel_listener();

        preview.set_frame_capture_listener(Arc::new(first));
        preview.start_capturing_frames(2).unwrap();
        preview.on_surface_updated();
        preview.set_frame_capture_listener(Arc::new(second));
        preview.on_surface_updated();

        assert_eq!(first_rx.try_iter().count(), 1);
        assert_eq!(second_rx.try_iter().count(), 2);

        // 没有监听者时照样推进状态
        preview.clear_frame_capture_listener();
        preview.start_capturing_frames(1).unwrap();
        preview.on_surface_updated();
        assert_eq!(preview.capture_state(), CaptureState::Idle);
    }
}
