use crossbeam_channel::{unbounded, Receiver, Sender};

use burstcam_core::frame::Frame;
use burstcam_core::traits::FrameCaptureListener;

use super::CaptureEvent;

/// 把捕获回调转成通道消息的监听者
///
/// 回调在宿主 UI 线程上触发；另一线程通过 `Receiver` 同步地等待帧。
/// 接收端被丢弃后，事件直接丢掉。
#[derive(Debug, Clone)]
pub struct ChannelListener {
    tx: Sender<CaptureEvent>,
}

impl ChannelListener {
    pub fn new(tx: Sender<CaptureEvent>) -> Self {
        Self { tx }
    }

    fn forward(&self, event: CaptureEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("Capture receiver dropped, discarding event");
        }
    }
}

impl FrameCaptureListener for ChannelListener {
    fn on_frame_captured(&self, frame: &Frame) {
        self.forward(CaptureEvent::FrameCaptured(frame.clone()));
    }

    fn on_frames_captured(&self, frames: &[Frame]) {
        self.forward(CaptureEvent::BurstCompleted(frames.to_vec()));
    }
}

/// 创建一对 (监听者, 接收端)
pub fn channel_listener() -> (ChannelListener, Receiver<CaptureEvent>) {
    let (tx, rx) = unbounded();
    (ChannelListener::new(tx), rx)
}
