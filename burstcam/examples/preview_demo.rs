// burstcam/examples/preview_demo.rs

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use burstcam::prelude::*;
use burstcam_simulation::{SimDriver, SimSurface};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    // 1. 仿真手机：后置 "0"，前置 "1"
    let driver = Arc::new(SimDriver::phone());
    let stats = driver.stats();

    // 2. 宿主 Surface 一开始还没布局好
    let surface = Arc::new(SimSurface::unavailable(1080, 1920));
    surface.set_rotation(Rotation::Rotation270);

    let preview = CameraPreview::new(driver, surface.clone(), PreviewConfig::new())?;
    let (listener, frames) = channel_listener();
    preview.set_frame_capture_listener(Arc::new(listener));

    // 3. 不可用时 start_preview 什么也不做
    preview.start_preview()?;
    println!("Phase after start_preview: {:?}", preview.session_phase());

    // 4. 宿主通知 Surface 可用 -> 打开前置相机
    surface.set_available(true);
    preview.on_surface_available(1080, 1920)?;
    preview.on_surface_size_changed(1080, 1920)?;
    if !preview
        .sessions()
        .wait_for_phase(SessionPhase::OpenStreaming, Duration::from_secs(2))
    {
        bail!("Preview did not start");
    }
    println!(
        "Streaming at {:?}, transform {:?}",
        preview.sessions().preview_size(),
        surface.transform()
    );

    // 5. 连拍 5 帧，模拟宿主每 33ms 一次的内容更新
    preview.start_capturing_frames(5)?;
    while preview.capture_state() != CaptureState::Idle {
        preview.on_surface_updated();
        std::thread::sleep(Duration::from_millis(33));
    }

    for event in frames.try_iter() {
        match event {
            CaptureEvent::FrameCaptured(frame) => println!("  frame {:?}", frame),
            CaptureEvent::BurstCompleted(batch) => {
                println!("Burst completed with {} frames", batch.len())
            }
        }
    }

    // 6. Surface 销毁 -> 关闭相机
    preview.on_surface_destroyed()?;
    println!(
        "Phase {:?}, live devices {}",
        preview.session_phase(),
        stats.live_devices()
    );
    Ok(())
}
