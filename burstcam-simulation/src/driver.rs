use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use burstcam_core::error::{CameraError, Result};
use burstcam_core::geometry::StreamSize;
use burstcam_core::traits::{
    AfModes, CameraCharacteristics, CameraDevice, CameraDriver, CameraId, CaptureRequest,
    CaptureSession, DeviceCallback, DeviceErrorCode, DeviceEvent, LensFacing, SessionCallback,
    SessionEvent, SurfaceTarget,
};

/// `open_camera` 的脚本化行为
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenBehavior {
    /// 调用时立即投递 Opened
    Immediate,
    /// 挂起，等待 `complete_pending_open` / `fail_pending_open`
    Deferred,
    /// 立即投递 Disconnected
    Disconnect,
    /// 立即投递 Error
    Fail(DeviceErrorCode),
    /// 驱动当场拒绝 (返回 Err)
    Reject,
}

/// `create_capture_session` 的脚本化行为
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionBehavior {
    Immediate,
    Deferred,
    Fail,
    Reject,
}

/// 驱动侧计数器，测试用来检查 "同一时刻至多一个活设备"
#[derive(Debug, Default)]
pub struct SimStats {
    pub open_calls: AtomicUsize,
    pub live_devices: AtomicUsize,
    pub max_live_devices: AtomicUsize,
    pub closed_devices: AtomicUsize,
    pub live_sessions: AtomicUsize,
    pub closed_sessions: AtomicUsize,
    requests: Mutex<Vec<CaptureRequest>>,
}

impl SimStats {
    pub fn live_devices(&self) -> usize {
        self.live_devices.load(Ordering::SeqCst)
    }

    pub fn max_live_devices(&self) -> usize {
        self.max_live_devices.load(Ordering::SeqCst)
    }

    pub fn live_sessions(&self) -> usize {
        self.live_sessions.load(Ordering::SeqCst)
    }

    pub fn open_calls(&self) -> usize {
        self.open_calls.load(Ordering::SeqCst)
    }

    /// 所有提交过的重复请求
    pub fn repeating_requests(&self) -> Vec<CaptureRequest> {
        lock(&self.requests).clone()
    }

    fn device_opened(&self) {
        let live = self.live_devices.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_live_devices.fetch_max(live, Ordering::SeqCst);
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

struct SimCamera {
    id: CameraId,
    characteristics: CameraCharacteristics,
}

struct PendingOpen {
    id: CameraId,
    callback: DeviceCallback,
}

struct PendingSession {
    outputs: Vec<SurfaceTarget>,
    callback: SessionCallback,
}

struct Inner {
    cameras: Vec<SimCamera>,
    open_behavior: Mutex<OpenBehavior>,
    session_behavior: Mutex<SessionBehavior>,
    enumeration_fails: AtomicBool,
    repeating_fails: AtomicBool,
    pending_opens: Mutex<VecDeque<PendingOpen>>,
    pending_sessions: Mutex<VecDeque<PendingSession>>,
    // 最近一次打开成功的设备回调，用于模拟热拔插
    last_opened: Mutex<Option<DeviceCallback>>,
    stats: Arc<SimStats>,
}

/// 仿真驱动
#[derive(Clone)]
pub struct SimDriver {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SimDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimDriver")
            .field("cameras", &self.inner.cameras.len())
            .field("stats", &self.inner.stats)
            .finish()
    }
}

impl Default for SimDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl SimDriver {
    /// 不带任何相机的驱动
    pub fn new() -> Self {
        Self::with_cameras(Vec::new())
    }

    /// 典型手机：后置 "0"，前置 "1"
    pub fn phone() -> Self {
        let sizes = vec![
            StreamSize::new(1920, 1080),
            StreamSize::new(1280, 720),
            StreamSize::new(640, 480),
        ];
        Self::new()
            .camera("0", LensFacing::Back, sizes.clone(), AfModes::all())
            .camera(
                "1",
                LensFacing::Front,
                sizes,
                AfModes::OFF | AfModes::AUTO | AfModes::CONTINUOUS_PICTURE,
            )
    }

    fn with_cameras(cameras: Vec<SimCamera>) -> Self {
        Self {
            inner: Arc::new(Inner {
                cameras,
                open_behavior: Mutex::new(OpenBehavior::Immediate),
                session_behavior: Mutex::new(SessionBehavior::Immediate),
                enumeration_fails: AtomicBool::new(false),
                repeating_fails: AtomicBool::new(false),
                pending_opens: Mutex::new(VecDeque::new()),
                pending_sessions: Mutex::new(VecDeque::new()),
                last_opened: Mutex::new(None),
                stats: Arc::new(SimStats::default()),
            }),
        }
    }

    /// 追加一台相机 (只能在共享给别人之前调用)
    pub fn camera(
        self,
        id: &str,
        facing: LensFacing,
        output_sizes: Vec<StreamSize>,
        af_modes: AfModes,
    ) -> Self {
        let mut cameras: Vec<SimCamera> = match Arc::try_unwrap(self.inner) {
            Ok(inner) => inner.cameras,
            Err(shared) => shared
                .cameras
                .iter()
                .map(|c| SimCamera {
                    id: c.id.clone(),
                    characteristics: c.characteristics.clone(),
                })
                .collect(),
        };
        cameras.push(SimCamera {
            id: CameraId::from(id),
            characteristics: CameraCharacteristics {
                facing: Some(facing),
                output_sizes,
                af_modes,
            },
        });
        Self::with_cameras(cameras)
    }

    pub fn stats(&self) -> Arc<SimStats> {
        Arc::clone(&self.inner.stats)
    }

    pub fn set_open_behavior(&self, behavior: OpenBehavior) {
        *lock(&self.inner.open_behavior) = behavior;
    }

    pub fn set_session_behavior(&self, behavior: SessionBehavior) {
        *lock(&self.inner.session_behavior) = behavior;
    }

    /// 让 camera_ids / characteristics 返回驱动错误
    pub fn set_enumeration_fails(&self, fails: bool) {
        self.inner.enumeration_fails.store(fails, Ordering::SeqCst);
    }

    /// 让会话的 set_repeating_request 返回驱动错误
    pub fn set_repeating_fails(&self, fails: bool) {
        self.inner.repeating_fails.store(fails, Ordering::SeqCst);
    }

    pub fn pending_opens(&self) -> usize {
        lock(&self.inner.pending_opens).len()
    }

    pub fn pending_sessions(&self) -> usize {
        lock(&self.inner.pending_sessions).len()
    }

    /// 完成最早一个挂起的打开请求
    pub fn complete_pending_open(&self) -> bool {
        let pending = lock(&self.inner.pending_opens).pop_front();
        match pending {
            Some(p) => {
                self.inner.deliver_opened(p.id, p.callback);
                true
            }
            None => false,
        }
    }

    pub fn fail_pending_open(&self, code: DeviceErrorCode) -> bool {
        let pending = lock(&self.inner.pending_opens).pop_front();
        match pending {
            Some(p) => {
                p.callback.deliver(DeviceEvent::Error(code));
                true
            }
            None => false,
        }
    }

    /// 完成最早一个挂起的会话配置
    pub fn complete_pending_session(&self) -> bool {
        let pending = lock(&self.inner.pending_sessions).pop_front();
        match pending {
            Some(p) => {
                self.inner.deliver_configured(p.outputs, p.callback);
                true
            }
            None => false,
        }
    }

    /// 模拟已打开设备被拔出
    pub fn disconnect_live(&self) -> bool {
        let callback = lock(&self.inner.last_opened).clone();
        match callback {
            Some(cb) => {
                cb.deliver(DeviceEvent::Disconnected);
                true
            }
            None => false,
        }
    }

    fn find(&self, id: &CameraId) -> Result<&SimCamera> {
        self.inner
            .cameras
            .iter()
            .find(|c| &c.id == id)
            .ok_or_else(|| CameraError::driver(format!("unknown camera id {}", id)))
    }
}

impl Inner {
    fn deliver_opened(self: &Arc<Self>, id: CameraId, callback: DeviceCallback) {
        self.stats.device_opened();
        *lock(&self.last_opened) = Some(callback.clone());
        let device = SimDevice {
            id,
            inner: Arc::clone(self),
            closed: AtomicBool::new(false),
        };
        callback.deliver(DeviceEvent::Opened(Box::new(device)));
    }

    fn deliver_configured(
        self: &Arc<Self>,
        outputs: Vec<SurfaceTarget>,
        callback: SessionCallback,
    ) {
        self.stats.live_sessions.fetch_add(1, Ordering::SeqCst);
        let session = SimCaptureSession {
            outputs,
            inner: Arc::clone(self),
            closed: AtomicBool::new(false),
        };
        callback.deliver(SessionEvent::Configured(Box::new(session)));
    }
}

impl CameraDriver for SimDriver {
    fn camera_ids(&self) -> Result<Vec<CameraId>> {
        if self.inner.enumeration_fails.load(Ordering::SeqCst) {
            return Err(CameraError::driver("camera service unavailable"));
        }
        Ok(self.inner.cameras.iter().map(|c| c.id.clone()).collect())
    }

    fn characteristics(&self, id: &CameraId) -> Result<CameraCharacteristics> {
        if self.inner.enumeration_fails.load(Ordering::SeqCst) {
            return Err(CameraError::driver("camera service unavailable"));
        }
        Ok(self.find(id)?.characteristics.clone())
    }

    fn open_camera(&self, id: &CameraId, callback: DeviceCallback) -> Result<()> {
        self.find(id)?;
        self.inner.stats.open_calls.fetch_add(1, Ordering::SeqCst);

        let behavior = *lock(&self.inner.open_behavior);
        tracing::debug!("SimDriver: open {} ({:?})", id, behavior);

        match behavior {
            OpenBehavior::Immediate => self.inner.deliver_opened(id.clone(), callback),
            OpenBehavior::Deferred => lock(&self.inner.pending_opens).push_back(PendingOpen {
                id: id.clone(),
                callback,
            }),
            OpenBehavior::Disconnect => callback.deliver(DeviceEvent::Disconnected),
            OpenBehavior::Fail(code) => callback.deliver(DeviceEvent::Error(code)),
            OpenBehavior::Reject => {
                return Err(CameraError::driver(format!("camera {} is disabled", id)))
            }
        }
        Ok(())
    }
}

struct SimDevice {
    id: CameraId,
    inner: Arc<Inner>,
    closed: AtomicBool,
}

impl CameraDevice for SimDevice {
    fn id(&self) -> &CameraId {
        &self.id
    }

    fn create_capture_session(
        &self,
        outputs: Vec<SurfaceTarget>,
        callback: SessionCallback,
    ) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CameraError::driver("device already closed"));
        }
        let behavior = *lock(&self.inner.session_behavior);
        match behavior {
            SessionBehavior::Immediate => self.inner.deliver_configured(outputs, callback),
            SessionBehavior::Deferred => {
                lock(&self.inner.pending_sessions).push_back(PendingSession { outputs, callback })
            }
            SessionBehavior::Fail => callback.deliver(SessionEvent::ConfigureFailed),
            SessionBehavior::Reject => {
                return Err(CameraError::driver("createCaptureSession rejected"))
            }
        }
        Ok(())
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.inner.stats.live_devices.fetch_sub(1, Ordering::SeqCst);
            self.inner
                .stats
                .closed_devices
                .fetch_add(1, Ordering::SeqCst);
        }
    }
}

struct SimCaptureSession {
    outputs: Vec<SurfaceTarget>,
    inner: Arc<Inner>,
    closed: AtomicBool,
}

impl CaptureSession for SimCaptureSession {
    fn set_repeating_request(&self, request: CaptureRequest) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CameraError::driver("session closed"));
        }
        if request.targets.iter().any(|t| !self.outputs.contains(t)) {
            return Err(CameraError::driver("request targets a surface outside the session"));
        }
        if self.inner.repeating_fails.load(Ordering::SeqCst) {
            return Err(CameraError::driver("setRepeatingRequest failed"));
        }
        lock(&self.inner.stats.requests).push(request);
        Ok(())
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let stats = &self.inner.stats;
            stats.live_sessions.fetch_sub(1, Ordering::SeqCst);
            stats.closed_sessions.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn channel_callback() -> (DeviceCallback, mpsc::Receiver<DeviceEvent>) {
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        let cb = DeviceCallback::new(move |e| {
            let _ = lock(&tx).send(e);
        });
        (cb, rx)
    }

    #[test]
    fn phone_has_front_and_back() {
        let driver = SimDriver::phone();
        let ids = driver.camera_ids().unwrap();
        assert_eq!(ids.len(), 2);
        let front = driver.characteristics(&CameraId::from("1")).unwrap();
        assert_eq!(front.facing, Some(LensFacing::Front));
        assert_eq!(front.output_sizes[0], StreamSize::new(1920, 1080));
    }

    #[test]
    fn deferred_open_tracks_live_devices() {
        let driver = SimDriver::phone();
        driver.set_open_behavior(OpenBehavior::Deferred);
        let (cb, rx) = channel_callback();
        driver.open_camera(&CameraId::from("1"), cb).unwrap();
        assert!(rx.try_recv().is_err());
        assert_eq!(driver.pending_opens(), 1);

        assert!(driver.complete_pending_open());
        let device = match rx.recv().unwrap() {
            DeviceEvent::Opened(d) => d,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(driver.stats().live_devices(), 1);
        device.close();
        device.close();
        assert_eq!(driver.stats().live_devices(), 0);
        assert_eq!(driver.stats().max_live_devices(), 1);
    }

    #[test]
    fn reject_and_unknown_ids_are_driver_errors() {
        let driver = SimDriver::phone();
        driver.set_open_behavior(OpenBehavior::Reject);
        let (cb, _rx) = channel_callback();
        assert!(matches!(
            driver.open_camera(&CameraId::from("1"), cb.clone()),
            Err(CameraError::DriverAccess(_))
        ));
        assert!(matches!(
            driver.open_camera(&CameraId::from("9"), cb),
            Err(CameraError::DriverAccess(_))
        ));
    }
}
