//! Browser glue: frame scheduling and console logging

use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;

use crate::driver::{FrameHandle, FrameScheduler};

pub fn init_logging() {
    console_error_panic_hook::set_once();
    let _ = console_log::init_with_level(log::Level::Info);
}

/// Schedules frames with `requestAnimationFrame`.
///
/// The callback is the host's frame entry point; it should call
/// `BubbleField::on_frame`.
pub struct RafScheduler {
    callback: Closure<dyn FnMut(f64)>,
}

impl RafScheduler {
    pub fn new(on_frame: impl FnMut(f64) + 'static) -> Self {
        Self {
            callback: Closure::<dyn FnMut(f64)>::new(on_frame),
        }
    }
}

impl FrameScheduler for RafScheduler {
    fn request_frame(&mut self) -> Option<FrameHandle> {
        let window = web_sys::window()?;
        match window.request_animation_frame(self.callback.as_ref().unchecked_ref()) {
            Ok(id) => Some(FrameHandle(id as u64)),
            Err(e) => {
                log::warn!("requestAnimationFrame failed: {:?}", e);
                None
            }
        }
    }

    fn cancel_frame(&mut self, handle: FrameHandle) {
        if let Some(window) = web_sys::window() {
            let _ = window.cancel_animation_frame(handle.0 as i32);
        }
    }
}
