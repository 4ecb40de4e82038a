//! 有界连拍：从预览 Surface 抓取固定数量的帧

mod channel;

pub use channel::{channel_listener, ChannelListener};

use std::num::NonZeroUsize;

use burstcam_core::frame::Frame;
use burstcam_core::traits::{FrameCaptureListener, FrameSource};

/// 控制器对外产生的事件
#[derive(Debug, Clone)]
pub enum CaptureEvent {
    /// 捕获到一帧
    FrameCaptured(Frame),
    /// 批次完成，按捕获顺序
    BurstCompleted(Vec<Frame>),
}

impl CaptureEvent {
    /// 投递给监听者
    pub fn dispatch(&self, listener: &dyn FrameCaptureListener) {
        match self {
            Self::FrameCaptured(frame) => listener.on_frame_captured(frame),
            Self::BurstCompleted(frames) => listener.on_frames_captured(frames),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Capturing { captured: usize, requested: usize },
}

// 已捕获数量就是 frames.len()，始终 <= requested
#[derive(Debug)]
struct CaptureBurst {
    requested: NonZeroUsize,
    frames: Vec<Frame>,
}

/// 连拍状态机：`Idle -> Capturing -> Idle`
///
/// 只在投递 Surface 更新的那个线程上改动；多线程调用方需要自己加锁。
#[derive(Debug, Default)]
pub struct FrameCaptureController {
    burst: Option<CaptureBurst>,
}

impl FrameCaptureController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> CaptureState {
        match &self.burst {
            None => CaptureState::Idle,
            Some(burst) => CaptureState::Capturing {
                captured: burst.frames.len(),
                requested: burst.requested.get(),
            },
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.burst.is_some()
    }

    /// 开始一次连拍
    /// 正在连拍时再次调用会从零重新开始，之前攒下的帧被丢弃
    pub fn start_burst(&mut self, count: NonZeroUsize) {
        if let Some(previous) = &self.burst {
            tracing::debug!(
                "Restarting burst, discarding {}/{} frames",
                previous.frames.len(),
                previous.requested
            );
        }
        self.burst = Some(CaptureBurst {
            requested: count,
            frames: Vec::with_capacity(count.get()),
        });
    }

    /// 处理一次 Surface 内容更新
    ///
    /// 不在连拍时什么也不做。读回不可用时跳过本次，不计数。
    /// 返回本次产生的事件 (最多一帧事件加一个批次完成事件)。
    pub fn on_surface_updated(&mut self, source: &dyn FrameSource) -> Vec<CaptureEvent> {
        let mut events = Vec::new();

        let Some(burst) = self.burst.as_mut() else {
            return events;
        };

        if burst.frames.len() < burst.requested.get() {
            match source.read_frame() {
                Some(frame) => {
                    burst.frames.push(frame.clone());
                    tracing::debug!(
                        "Captured frame {}/{} (seq {})",
                        burst.frames.len(),
                        burst.requested,
                        frame.sequence
                    );
                    events.push(CaptureEvent::FrameCaptured(frame));
                }
                None => {
                    tracing::debug!("Surface content unavailable, skipping tick");
                }
            }
        }

        if burst.frames.len() == burst.requested.get() {
            // 批次完成：清空状态回到 Idle
            if let Some(done) = self.burst.take() {
                tracing::info!("Burst of {} frames completed", done.frames.len());
                events.push(CaptureEvent::BurstCompleted(done.frames));
            }
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burstcam_core::frame::PixelFormat;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// 按脚本返回帧；脚本耗尽后按序号自动生成
    struct ScriptedSource {
        script: RefCell<VecDeque<Option<u64>>>,
        next: Cell<u64>,
    }

    impl ScriptedSource {
        fn new() -> Self {
            Self {
                script: RefCell::new(VecDeque::new()),
                next: Cell::new(1),
            }
        }

        fn unavailable_next(&self) {
            self.script.borrow_mut().push_back(None);
        }
    }

    impl FrameSource for ScriptedSource {
        fn read_frame(&self) -> Option<Frame> {
            if let Some(entry) = self.script.borrow_mut().pop_front() {
                entry?;
            }
            let seq = self.next.get();
            self.next.set(seq + 1);
            Some(Frame::packed(vec![seq as u8; 4], 1, 1, PixelFormat::Argb8888).with_sequence(seq))
        }
    }

    #[derive(Default)]
    struct Recorder {
        frames: Mutex<Vec<u64>>,
        batches: Mutex<Vec<Vec<u64>>>,
    }

    impl FrameCaptureListener for Recorder {
        fn on_frame_captured(&self, frame: &Frame) {
            self.frames.lock().unwrap().push(frame.sequence);
        }

        fn on_frames_captured(&self, frames: &[Frame]) {
            self.batches
                .lock()
                .unwrap()
                .push(frames.iter().map(|f| f.sequence).collect());
        }
    }

    fn count(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    fn tick(controller: &mut FrameCaptureController, source: &dyn FrameSource, recorder: &Recorder) {
        for event in controller.on_surface_updated(source) {
            event.dispatch(recorder);
        }
    }

    #[test]
    fn burst_of_three_emits_three_frames_and_one_batch() {
        let source = ScriptedSource::new();
        let recorder = Recorder::default();
        let mut controller = FrameCaptureController::new();

        controller.start_burst(count(3));
        for _ in 0..3 {
            tick(&mut controller, &source, &recorder);
        }

        assert_eq!(*recorder.frames.lock().unwrap(), vec![1, 2, 3]);
        assert_eq!(*recorder.batches.lock().unwrap(), vec![vec![1, 2, 3]]);
        assert_eq!(controller.state(), CaptureState::Idle);

        // 完成后的 tick 不做任何事
        tick(&mut controller, &source, &recorder);
        assert_eq!(recorder.frames.lock().unwrap().len(), 3);
        assert_eq!(recorder.batches.lock().unwrap().len(), 1);
        assert_eq!(source.next.get(), 4);
    }

    #[test]
    fn idle_ticks_do_not_read_surface() {
        let source = ScriptedSource::new();
        let mut controller = FrameCaptureController::new();
        assert!(controller.on_surface_updated(&source).is_empty());
        assert_eq!(source.next.get(), 1);
    }

    #[test]
    fn unavailable_frame_is_skipped_without_counting() {
        let source = ScriptedSource::new();
        let recorder = Recorder::default();
        let mut controller = FrameCaptureController::new();

        controller.start_burst(count(2));
        source.unavailable_next();
        let events = controller.on_surface_updated(&source);
        assert!(events.is_empty());
        assert_eq!(
            controller.state(),
            CaptureState::Capturing {
                captured: 0,
                requested: 2
            }
        );

        tick(&mut controller, &source, &recorder);
        tick(&mut controller, &source, &recorder);
        assert_eq!(*recorder.batches.lock().unwrap(), vec![vec![1, 2]]);
    }

    #[test]
    fn restart_mid_burst_discards_progress() {
        let source = ScriptedSource::new();
        let recorder = Recorder::default();
        let mut controller = FrameCaptureController::new();

        controller.start_burst(count(3));
        tick(&mut controller, &source, &recorder);
        tick(&mut controller, &source, &recorder);
        assert_eq!(
            controller.state(),
            CaptureState::Capturing {
                captured: 2,
                requested: 3
            }
        );

        controller.start_burst(count(2));
        assert_eq!(
            controller.state(),
            CaptureState::Capturing {
                captured: 0,
                requested: 2
            }
        );
        tick(&mut controller, &source, &recorder);
        tick(&mut controller, &source, &recorder);

        // 批次里只有重新开始之后的帧
        assert_eq!(*recorder.batches.lock().unwrap(), vec![vec![3, 4]]);
        assert_eq!(*recorder.frames.lock().unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn single_frame_burst_completes_on_first_tick() {
        let source = ScriptedSource::new();
        let mut controller = FrameCaptureController::new();
        controller.start_burst(count(1));

        let events = controller.on_surface_updated(&source);
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], CaptureEvent::FrameCaptured(f) if f.sequence == 1));
        assert!(matches!(&events[1], CaptureEvent::BurstCompleted(frames) if frames.len() == 1));
        assert!(!controller.is_capturing());
    }

    #[test]
    fn batch_shares_pixels_with_frame_events() {
        let source = ScriptedSource::new();
        let mut controller = FrameCaptureController::new();
        controller.start_burst(count(1));

        let events = controller.on_surface_updated(&source);
        match (&events[0], &events[1]) {
            (CaptureEvent::FrameCaptured(single), CaptureEvent::BurstCompleted(batch)) => {
                assert!(std::sync::Arc::ptr_eq(&single.data, &batch[0].data));
            }
            other => panic!("unexpected events {:?}", other),
        }
    }
}
