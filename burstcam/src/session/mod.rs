//! 设备会话管理
//!
//! 状态机：`Closed -> Opening -> OpenIdle -> OpenStreaming -> Closing -> Closed`，
//! 打开过程中或打开后出错 / 断连都直接回到 `Closed`。
//!
//! 开与关由一个单许可信号量互斥：许可覆盖整个打开 (直到驱动回调把设备装入状态)
//! 或整个关闭过程，而不只是状态字段的写入。

mod events;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info};

use burstcam_core::builder::PreviewConfig;
use burstcam_core::error::{CameraError, Result};
use burstcam_core::geometry::StreamSize;
use burstcam_core::traits::{
    AfMode, CameraCharacteristics, CameraDevice, CameraDriver, CameraId, CaptureSession,
    DeviceCallback, DeviceEvent, DisplaySurface,
};

use crate::internal::runtime::BackgroundContext;

/// 会话所处阶段
///
/// 没有单独的 `Error` 阶段：打开失败、断连和驱动错误都直接发布 `Closed`。
/// 阶段通过 `watch` 发布，只保留最新值，一闪而过的 `Error` 订阅者多半收不到。
/// 失败原因看日志；同步调用的失败由 `open` / `close` 的返回值给出。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Closed,
    Opening,
    /// 设备已打开，预览请求尚未启动
    OpenIdle,
    /// 重复预览请求运行中
    OpenStreaming,
    Closing,
}

impl SessionPhase {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::OpenIdle | Self::OpenStreaming)
    }
}

/// 打开成功后配置会话所需的一切
pub(crate) struct SessionPlan {
    pub(crate) surface: Arc<dyn DisplaySurface>,
    pub(crate) view_width: u32,
    pub(crate) view_height: u32,
    pub(crate) output_sizes: Vec<StreamSize>,
    pub(crate) af_mode: AfMode,
}

#[derive(Default)]
struct SessionState {
    // 每次打开 / 关闭递增，旧回调据此识别自己已过期
    generation: u64,
    camera_id: Option<CameraId>,
    device: Option<Box<dyn CameraDevice>>,
    capture_session: Option<Box<dyn CaptureSession>>,
    preview_size: Option<StreamSize>,
    stop_loop: Option<oneshot::Sender<()>>,
}

/// 后台事件循环与调用方共享的部分
pub(crate) struct Shared {
    permit: Arc<Semaphore>,
    state: Mutex<SessionState>,
    phase: watch::Sender<SessionPhase>,
}

impl Shared {
    fn new() -> Self {
        let (phase, _) = watch::channel(SessionPhase::Closed);
        Self {
            permit: Arc::new(Semaphore::new(1)),
            state: Mutex::new(SessionState::default()),
            phase,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // 调用方需持有 state 锁，保证阶段与状态一致
    fn set_phase(&self, phase: SessionPhase) {
        let previous = self.phase.send_replace(phase);
        if previous != phase {
            debug!("Session phase {:?} -> {:?}", previous, phase);
        }
    }

    /// 关闭 CaptureSession 再关闭设备，并让所有在途回调过期
    fn teardown(&self, state: &mut SessionState) {
        if let Some(stop) = state.stop_loop.take() {
            let _ = stop.send(());
        }
        if let Some(session) = state.capture_session.take() {
            session.close();
        }
        if let Some(device) = state.device.take() {
            info!("Closing camera {}", device.id());
            device.close();
        }
        state.camera_id = None;
        state.preview_size = None;
        state.generation += 1;
    }

    /// 驱动当场拒绝或回调通道提前断开：回到 Closed
    fn abandon_opening(&self, generation: u64) {
        let mut state = self.lock_state();
        if state.generation == generation && state.device.is_none() {
            state.stop_loop = None;
            state.camera_id = None;
            self.set_phase(SessionPhase::Closed);
        }
    }
}

/// 设备会话管理器
///
/// 公开方法通常在宿主 UI 线程调用，也可以在宿主自己的 tokio Runtime 里调用：
/// 等待许可的工作交给管理器私有的后台上下文，调用方只阻塞在 channel 上。
/// 驱动回调同样在这个后台上下文处理。
pub struct DeviceSessionManager {
    driver: Arc<dyn CameraDriver>,
    config: PreviewConfig,
    shared: Arc<Shared>,
    background: BackgroundContext,
}

impl std::fmt::Debug for DeviceSessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSessionManager")
            .field("phase", &self.phase())
            .field("config", &self.config)
            .finish()
    }
}

impl DeviceSessionManager {
    pub fn new(driver: Arc<dyn CameraDriver>, config: PreviewConfig) -> Result<Self> {
        let background =
            BackgroundContext::new(&config.background_thread_name, config.worker_threads)?;
        Ok(Self {
            driver,
            config,
            shared: Arc::new(Shared::new()),
            background,
        })
    }

    pub fn config(&self) -> &PreviewConfig {
        &self.config
    }

    pub fn phase(&self) -> SessionPhase {
        *self.shared.phase.borrow()
    }

    /// 订阅阶段变化
    pub fn subscribe_phase(&self) -> watch::Receiver<SessionPhase> {
        self.shared.phase.subscribe()
    }

    /// 阻塞直到进入 `target` 阶段，超时返回 false
    pub fn wait_for_phase(&self, target: SessionPhase, timeout: Duration) -> bool {
        let mut rx = self.shared.phase.subscribe();
        self.background
            .call(async move {
                matches!(
                    tokio::time::timeout(timeout, rx.wait_for(|phase| *phase == target)).await,
                    Ok(Ok(_))
                )
            })
            .unwrap_or(false)
    }

    /// 当前打开的相机
    pub fn camera_id(&self) -> Option<CameraId> {
        self.shared.lock_state().camera_id.clone()
    }

    /// 最近一次协商出的预览分辨率
    pub fn preview_size(&self) -> Option<StreamSize> {
        self.shared.lock_state().preview_size
    }

    /// 相机原生 buffer 尺寸：所选相机上报的第一个输出尺寸
    ///
    /// 与是否已协商预览分辨率无关，同样的 Surface 尺寸与旋转总得到同样的变换。
    /// 找不到匹配朝向的相机时返回 `Ok(None)`。
    pub fn native_buffer_size(&self) -> Result<Option<StreamSize>> {
        match self.select_camera() {
            Ok((_, characteristics)) => Ok(characteristics.output_sizes.first().copied()),
            Err(CameraError::NoCameraFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// 按配置的朝向选相机
    fn select_camera(&self) -> Result<(CameraId, CameraCharacteristics)> {
        let facing = self.config.facing;
        for id in self.driver.camera_ids()? {
            let characteristics = self.driver.characteristics(&id)?;
            if characteristics.facing == Some(facing) {
                return Ok((id, characteristics));
            }
        }
        Err(CameraError::NoCameraFound(facing))
    }

    /// 打开相机，成功后自动配置预览会话
    ///
    /// 返回 Ok 只表示打开请求已经发出；结果通过 `phase()` 观察。
    pub fn open(&self, surface: Arc<dyn DisplaySurface>, width: u32, height: u32) -> Result<()> {
        let (camera_id, characteristics) = self.select_camera()?;
        let permit = self.acquire_for_open()?;

        if characteristics.output_sizes.is_empty() {
            return Err(CameraError::NoOutputSizes(camera_id));
        }

        let (generation, stop_rx) = {
            let mut state = self.shared.lock_state();
            if state.device.is_some() || state.capture_session.is_some() {
                info!("Camera still open, closing it before re-opening");
                self.shared.teardown(&mut state);
            }
            state.generation += 1;
            let (stop_tx, stop_rx) = oneshot::channel();
            state.stop_loop = Some(stop_tx);
            state.camera_id = Some(camera_id.clone());
            self.shared.set_phase(SessionPhase::Opening);
            (state.generation, stop_rx)
        };

        let plan = SessionPlan {
            surface,
            view_width: width,
            view_height: height,
            output_sizes: characteristics.output_sizes,
            af_mode: AfMode::resolve(self.config.af_mode, characteristics.af_modes),
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let callback = DeviceCallback::new(move |event| {
            // 循环已结束：迟到的设备没人接手，直接关掉
            if let Err(mpsc::error::SendError(DeviceEvent::Opened(device))) = tx.send(event) {
                device.close();
            }
        });

        self.background.spawn(events::run_device_loop(
            Arc::clone(&self.shared),
            generation,
            permit,
            rx,
            stop_rx,
            plan,
        ));

        info!("Opening camera {} for a {}x{} surface", camera_id, width, height);
        if let Err(e) = self.driver.open_camera(&camera_id, callback) {
            error!("Failed to open camera {}: {}", camera_id, e);
            self.shared.abandon_opening(generation);
            return Err(e);
        }
        Ok(())
    }

    fn acquire_for_open(&self) -> Result<OwnedSemaphorePermit> {
        let timeout = self.config.open_timeout;
        let permit = Arc::clone(&self.shared.permit);
        let acquired = self
            .background
            .call(async move { tokio::time::timeout(timeout, permit.acquire_owned()).await });
        match acquired {
            Some(Ok(Ok(permit))) => Ok(permit),
            Some(Ok(Err(_))) | None => Err(CameraError::InterruptedWait),
            Some(Err(_)) => {
                error!("Time out waiting to lock camera opening ({:?})", timeout);
                Err(CameraError::OpenTimedOut(timeout))
            }
        }
    }

    /// 关闭采集会话与设备
    ///
    /// 不限时等待互斥许可；已经关闭时是空操作。
    pub fn close(&self) -> Result<()> {
        let permit = Arc::clone(&self.shared.permit);
        let _permit = self
            .background
            .call(permit.acquire_owned())
            .and_then(|acquired| acquired.ok())
            .ok_or(CameraError::InterruptedWait)?;

        let mut state = self.shared.lock_state();
        if state.device.is_none() && state.capture_session.is_none() {
            // 可能还残留一个等待中的循环 (例如驱动从未回调)
            if let Some(stop) = state.stop_loop.take() {
                let _ = stop.send(());
                state.generation += 1;
            }
            state.camera_id = None;
            self.shared.set_phase(SessionPhase::Closed);
            return Ok(());
        }

        self.shared.set_phase(SessionPhase::Closing);
        self.shared.teardown(&mut state);
        self.shared.set_phase(SessionPhase::Closed);
        Ok(())
    }

    /// 关闭互斥许可并释放设备
    ///
    /// 其他线程上正在等待许可的 open / close 会得到 `InterruptedWait`，
    /// 之后的调用同样失败。
    pub fn shutdown(&self) {
        if self.shared.permit.is_closed() {
            return;
        }
        self.shared.permit.close();
        let mut state = self.shared.lock_state();
        self.shared.teardown(&mut state);
        self.shared.set_phase(SessionPhase::Closed);
        info!("Camera session manager shut down");
    }
}

impl Drop for DeviceSessionManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
