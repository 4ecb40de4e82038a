use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, OwnedSemaphorePermit};
use tracing::{debug, error, info, warn};

use burstcam_core::error::CameraError;
use burstcam_core::geometry::choose_optimal_size;
use burstcam_core::traits::{
    CameraDevice, CaptureRequest, DeviceErrorCode, DeviceEvent, SessionCallback, SessionEvent,
};

use super::{SessionPhase, SessionPlan, SessionState, Shared};

/// 单次打开尝试的后台事件循环
///
/// 持有打开许可直到设备装入状态 (或打开失败)；之后继续处理会话配置结果
/// 与迟到的断连通知，直到被 `stop` 叫停或设备丢失。
pub(super) async fn run_device_loop(
    shared: Arc<Shared>,
    generation: u64,
    permit: OwnedSemaphorePermit,
    mut device_events: mpsc::UnboundedReceiver<DeviceEvent>,
    mut stop: oneshot::Receiver<()>,
    plan: SessionPlan,
) {
    let mut opening_permit = Some(permit);
    let mut device_channel_open = true;

    let (session_tx, mut session_events) = mpsc::unbounded_channel();
    let session_callback = SessionCallback::new(move |event| {
        // 循环已结束：配置好的会话没人接手，直接关掉
        if let Err(mpsc::error::SendError(SessionEvent::Configured(session))) =
            session_tx.send(event)
        {
            session.close();
        }
    });

    loop {
        tokio::select! {
            _ = &mut stop => {
                debug!("Device loop {} stopped", generation);
                break;
            }
            event = device_events.recv(), if device_channel_open => match event {
                Some(DeviceEvent::Opened(device)) => {
                    let installed = shared.on_opened(generation, device, &plan, &session_callback);
                    // 设备已装入状态 (或已丢弃)，打开过程结束
                    opening_permit.take();
                    if !installed {
                        break;
                    }
                }
                Some(DeviceEvent::Disconnected) => {
                    shared.on_device_lost(generation, opening_permit.take(), None).await;
                    break;
                }
                Some(DeviceEvent::Error(code)) => {
                    shared.on_device_lost(generation, opening_permit.take(), Some(code)).await;
                    break;
                }
                None => {
                    if opening_permit.take().is_some() {
                        // 驱动在回调之前丢掉了回调对象
                        warn!("Camera driver dropped the open callback without an outcome");
                        shared.abandon_opening(generation);
                        break;
                    }
                    device_channel_open = false;
                }
            },
            Some(event) = session_events.recv() => shared.on_session_event(generation, event, &plan),
        }
    }

    // 清理已排队但没处理的事件，保证不留下活句柄
    device_events.close();
    while let Ok(event) = device_events.try_recv() {
        if let DeviceEvent::Opened(device) = event {
            device.close();
        }
    }
    session_events.close();
    while let Ok(event) = session_events.try_recv() {
        if let SessionEvent::Configured(session) = event {
            session.close();
        }
    }
}

impl Shared {
    /// 设备打开成功：装入状态并立即开始配置会话
    ///
    /// 打开已过期 (期间发生了 close / re-open) 时关闭设备并返回 false。
    fn on_opened(
        &self,
        generation: u64,
        device: Box<dyn CameraDevice>,
        plan: &SessionPlan,
        callback: &SessionCallback,
    ) -> bool {
        let mut state = self.lock_state();
        if state.generation != generation {
            debug!("Discarding stale open of camera {}", device.id());
            device.close();
            return false;
        }

        info!("Camera {} opened", device.id());
        state.device = Some(device);
        self.set_phase(SessionPhase::OpenIdle);
        self.configure_session(&mut state, plan, callback);
        true
    }

    /// 协商预览尺寸，绑定 Surface buffer，创建单 Surface 采集会话
    fn configure_session(
        &self,
        state: &mut SessionState,
        plan: &SessionPlan,
        callback: &SessionCallback,
    ) {
        let Some(device) = state.device.as_ref() else {
            return;
        };

        let size = choose_optimal_size(&plan.output_sizes, plan.view_width, plan.view_height);
        plan.surface.set_default_buffer_size(size);
        state.preview_size = Some(size);

        if let Err(e) = device.create_capture_session(vec![plan.surface.target()], callback.clone())
        {
            // 宽松策略：设备保持打开，只是没有预览
            error!("Failed to create capture session: {}", e);
        }
    }

    fn on_session_event(&self, generation: u64, event: SessionEvent, plan: &SessionPlan) {
        match event {
            SessionEvent::Configured(session) => {
                let mut state = self.lock_state();
                if state.generation != generation || state.device.is_none() {
                    // 配置完成前相机已被关闭
                    debug!("Camera closed before session configured, abandoning it");
                    session.close();
                    return;
                }
                if let Some(previous) = state.capture_session.take() {
                    previous.close();
                }

                let mut request = CaptureRequest::new();
                request.add_target(plan.surface.target());
                request.set_af_mode(plan.af_mode);

                match session.set_repeating_request(request) {
                    Ok(()) => {
                        info!(
                            "Preview started at {}",
                            state
                                .preview_size
                                .map(|s| s.to_string())
                                .unwrap_or_default()
                        );
                        self.set_phase(SessionPhase::OpenStreaming);
                    }
                    Err(e) => error!("Failed to start repeating preview request: {}", e),
                }
                state.capture_session = Some(session);
            }
            SessionEvent::ConfigureFailed => {
                warn!("{}", CameraError::SessionConfigureFailed);
            }
        }
    }

    /// 断连或驱动错误：两者处理一致，释放设备回到 Closed
    async fn on_device_lost(
        &self,
        generation: u64,
        held: Option<OwnedSemaphorePermit>,
        code: Option<DeviceErrorCode>,
    ) {
        // 打开之后的断连也要走同一把互斥许可
        let _permit = match held {
            Some(permit) => permit,
            None => match Arc::clone(&self.permit).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            },
        };

        let mut state = self.lock_state();
        if state.generation != generation {
            return;
        }
        match code {
            Some(code) => error!("Camera device error: {:?}", code),
            None => warn!("Camera disconnected"),
        }
        self.teardown(&mut state);
        self.set_phase(SessionPhase::Closed);
    }
}
