//! Bubblefield entry point
//!
//! Web: mounts a field against the in-process bridge, ticks it from
//! `requestAnimationFrame` and pumps it from a wall-clock interval; rendering
//! is left to the page, which polls `bubbles_json()`.
//! Native: runs the whole loop headless and prints the final snapshot.

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

#[cfg(target_arch = "wasm32")]
mod wasm_app {
    use std::cell::RefCell;
    use std::rc::{Rc, Weak};
    use wasm_bindgen::prelude::*;

    use bubblefield::persistence::MemoryBridge;
    use bubblefield::platform::SystemClock;
    use bubblefield::platform::web::RafScheduler;
    use bubblefield::sim::{BubbleId, User};
    use bubblefield::{BubbleField, Settings};

    type WebField = BubbleField<MemoryBridge, RafScheduler>;

    /// Live-feed drain and flush check period
    const PUMP_INTERVAL_MS: i32 = 100;

    thread_local! {
        static FIELD: RefCell<Option<Rc<RefCell<WebField>>>> = const { RefCell::new(None) };
    }

    fn with_field<T>(f: impl FnOnce(&mut WebField) -> T) -> Option<T> {
        FIELD.with(|slot| {
            let field = slot.borrow().clone()?;
            let mut field = field.borrow_mut();
            Some(f(&mut field))
        })
    }

    fn viewport_size(window: &web_sys::Window) -> (f32, f32) {
        let width = window.inner_width().ok().and_then(|v| v.as_f64()).unwrap_or(1280.0);
        let height = window.inner_height().ok().and_then(|v| v.as_f64()).unwrap_or(800.0);
        (width as f32, height as f32)
    }

    pub fn run() {
        bubblefield::platform::init_logging();
        log::info!("Bubblefield starting...");

        let Some(window) = web_sys::window() else {
            log::warn!("No window; nothing to do");
            return;
        };
        let settings = Settings::load();
        let (width, height) = viewport_size(&window);

        let clock = Rc::new(SystemClock);
        let bridge = MemoryBridge::with_demo_content(clock.clone());

        // The frame callback needs the field, which owns the scheduler
        let target: Rc<RefCell<Weak<RefCell<WebField>>>> = Rc::new(RefCell::new(Weak::new()));
        let scheduler = {
            let target = target.clone();
            RafScheduler::new(move |_timestamp| {
                let Some(field) = target.borrow().upgrade() else {
                    return;
                };
                field.borrow_mut().on_frame();
            })
        };

        let field = Rc::new(RefCell::new(BubbleField::new(
            &settings, width, height, bridge, scheduler, clock,
        )));
        *target.borrow_mut() = Rc::downgrade(&field);
        field.borrow_mut().mount();

        // Live feed and position flush run on wall-clock time, not on frames:
        // an empty field schedules no frames and background tabs throttle rAF
        let pump_interval = {
            let field = field.clone();
            let closure = Closure::<dyn FnMut()>::new(move || {
                field.borrow_mut().pump();
            });
            let id = window
                .set_interval_with_callback_and_timeout_and_arguments_0(
                    closure.as_ref().unchecked_ref(),
                    PUMP_INTERVAL_MS,
                )
                .map_err(|e| log::warn!("Failed to start pump timer: {:?}", e))
                .ok();
            closure.forget();
            id
        };

        // Handle resize
        {
            let window_clone = window.clone();
            let field = field.clone();
            let closure = Closure::<dyn FnMut()>::new(move || {
                let (width, height) = viewport_size(&window_clone);
                field.borrow_mut().resize(width, height);
            });
            let _ = window.add_event_listener_with_callback("resize", closure.as_ref().unchecked_ref());
            closure.forget();
        }

        // Stop cleanly when the page goes away
        {
            let window_clone = window.clone();
            let field = field.clone();
            let closure = Closure::<dyn FnMut()>::new(move || {
                if let Some(id) = pump_interval {
                    window_clone.clear_interval_with_handle(id);
                }
                field.borrow_mut().teardown();
            });
            let _ = window.add_event_listener_with_callback("pagehide", closure.as_ref().unchecked_ref());
            closure.forget();
        }

        FIELD.with(|slot| *slot.borrow_mut() = Some(field));
        log::info!("Field ready");
    }

    /// Post a message as the guest user. Returns the bubble id.
    #[wasm_bindgen]
    pub fn add_bubble(message: &str, author_name: &str) -> Result<String, JsValue> {
        let author = User {
            id: format!("guest-{}", author_name),
            name: author_name.to_string(),
            avatar: None,
            aura: 0,
            is_online: true,
        };
        with_field(|field| field.add_bubble(message, &author))
            .ok_or_else(|| JsValue::from_str("field not ready"))?
            .map(|id| id.to_string())
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    #[wasm_bindgen]
    pub fn add_reaction(id: &str) {
        with_field(|field| field.add_reaction(&BubbleId::from(id)));
    }

    /// Current bubbles for the page to draw
    #[wasm_bindgen]
    pub fn bubbles_json() -> String {
        with_field(|field| field.snapshot_json().unwrap_or_default()).unwrap_or_default()
    }
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn wasm_main() {
    wasm_app::run();
}

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    bubblefield::platform::init_logging();
    log::info!("Bubblefield (native) starting...");
    native_demo::run();
}

#[cfg(target_arch = "wasm32")]
fn main() {
    // WASM entry point is wasm_main, this is just to satisfy the compiler
}

#[cfg(not(target_arch = "wasm32"))]
mod native_demo {
    use std::path::PathBuf;
    use std::rc::Rc;

    use bubblefield::driver::ManualScheduler;
    use bubblefield::persistence::{Bridge, BubbleDraft, MemoryBridge};
    use bubblefield::platform::{Clock, SystemClock};
    use bubblefield::sim::User;
    use bubblefield::{BubbleField, Settings};

    const FRAMES: usize = 600;

    pub fn run() {
        // Optional settings file as the only argument
        let settings = std::env::args()
            .nth(1)
            .map(PathBuf::from)
            .map(|path| Settings::load_from(&path))
            .unwrap_or_default();

        let clock: Rc<dyn Clock> = Rc::new(SystemClock);
        let bridge = MemoryBridge::with_demo_content(clock.clone());
        let mut other_client = bridge.clone();

        let mut field = BubbleField::new(
            &settings,
            1280.0,
            800.0,
            bridge,
            ManualScheduler::new(),
            clock,
        );
        field.on_error(|e| log::warn!("Bridge error: {}", e));
        field.mount();

        let me = User {
            id: "me".to_string(),
            name: "You".to_string(),
            avatar: None,
            aura: 0,
            is_online: true,
        };
        match field.add_bubble("Hello from the native demo!", &me) {
            Ok(id) => log::info!("Posted bubble {}", id),
            Err(e) => log::warn!("Message rejected: {}", e),
        }

        for frame in 0..FRAMES {
            if field.scheduler_mut().fire().is_some() {
                field.on_frame();
            }

            // Another client posts halfway through
            if frame == FRAMES / 2 {
                let draft = BubbleDraft {
                    author: User {
                        id: "2".to_string(),
                        name: "TechExplorer".to_string(),
                        avatar: None,
                        aura: 38,
                        is_online: true,
                    },
                    message: "Anyone else watching these drift? 🫧".to_string(),
                    pos: glam::Vec2::new(500.0, 400.0),
                    vel: glam::Vec2::new(-0.02, 0.01),
                };
                if let Err(e) = other_client.insert(&draft) {
                    log::warn!("Remote insert failed: {}", e);
                }
            }

            let merged = field.pump();
            if merged > 0 {
                log::info!("Frame {}: merged {} bubble(s) from the feed", frame, merged);
            }
        }

        if let Some(first) = field.bubbles().first() {
            let id = first.id.clone();
            field.add_reaction(&id);
            if let Some(age) = field.age_of(&id) {
                log::info!("Oldest bubble {} posted {}", id, age);
            }
        }
        field.flush();
        field.teardown();

        println!("\n{} bubbles after {} frames:", field.bubbles().len(), field.frames());
        match field.snapshot_json() {
            Ok(json) => println!("{}", json),
            Err(e) => log::warn!("Snapshot failed: {}", e),
        }
    }
}
