//! Field settings and preferences
//!
//! Persisted as JSON: a file natively, LocalStorage on web.

use serde::{Deserialize, Serialize};

use crate::consts::*;
use crate::sim::{Margins, PhysicsParams};

/// Motion feel presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MotionPreset {
    Calm,
    #[default]
    Lively,
}

impl MotionPreset {
    pub fn as_str(&self) -> &'static str {
        match self {
            MotionPreset::Calm => "Calm",
            MotionPreset::Lively => "Lively",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "calm" => Some(MotionPreset::Calm),
            "lively" => Some(MotionPreset::Lively),
            _ => None,
        }
    }

    /// Initial drift speed for new bubbles
    pub fn spawn_speed(&self) -> f32 {
        match self {
            MotionPreset::Calm => SPAWN_SPEED * 0.4,
            MotionPreset::Lively => SPAWN_SPEED,
        }
    }

    /// Per-tick damping
    pub fn damping(&self) -> f32 {
        match self {
            MotionPreset::Calm => 0.995,
            MotionPreset::Lively => DAMPING,
        }
    }
}

/// Field settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub preset: MotionPreset,

    // === Layout ===
    /// Distance kept from each viewport edge
    pub margins: Margins,

    // === Physics ===
    pub physics: PhysicsParams,
    /// Initial velocity range for new bubbles
    pub spawn_speed: f32,

    // === Sync ===
    /// Bubbles kept while following the live feed
    pub retention: usize,
    /// Milliseconds between position flushes
    pub flush_interval_ms: i64,
    /// Seed for spawn placement (entropy when absent)
    pub spawn_seed: Option<u64>,

    // === Accessibility ===
    /// New bubbles start at rest and motion settles quickly
    pub reduced_motion: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            preset: MotionPreset::Lively,
            margins: Margins::default(),
            physics: PhysicsParams::default(),
            spawn_speed: SPAWN_SPEED,
            retention: DEFAULT_RETENTION,
            flush_interval_ms: FLUSH_INTERVAL_MS,
            spawn_seed: None,
            reduced_motion: false,
        }
    }
}

impl Settings {
    /// Create settings from a motion preset
    pub fn from_preset(preset: MotionPreset) -> Self {
        let mut settings = Self::default();
        settings.apply_preset(preset);
        settings
    }

    /// Apply a motion preset (updates preset-dependent values)
    pub fn apply_preset(&mut self, preset: MotionPreset) {
        self.preset = preset;
        self.spawn_speed = preset.spawn_speed();
        self.physics.damping = preset.damping();
    }

    /// Spawn speed after accessibility settings
    pub fn effective_spawn_speed(&self) -> f32 {
        if self.reduced_motion { 0.0 } else { self.spawn_speed }
    }

    /// Physics after accessibility settings
    pub fn effective_physics(&self) -> PhysicsParams {
        let mut physics = self.physics;
        if self.reduced_motion {
            physics.damping = physics.damping.min(0.98);
        }
        physics
    }

    /// Clamp values that would break the simulation
    pub fn validated(mut self) -> Self {
        let defaults = PhysicsParams::default();
        let physics = &mut self.physics;
        if !(physics.damping > 0.0 && physics.damping <= 1.0) {
            physics.damping = defaults.damping;
        }
        if !physics.repulsion.is_finite() || physics.repulsion < 0.0 {
            physics.repulsion = defaults.repulsion;
        }
        if !physics.min_separation.is_finite() || physics.min_separation < 0.0 {
            physics.min_separation = defaults.min_separation;
        }
        if !self.spawn_speed.is_finite() || self.spawn_speed < 0.0 {
            self.spawn_speed = SPAWN_SPEED;
        }
        self.retention = self.retention.max(1);
        self.flush_interval_ms = self.flush_interval_ms.max(100);
        self
    }

    /// LocalStorage key
    #[allow(dead_code)]
    const STORAGE_KEY: &'static str = "bubblefield_settings";

    /// Load settings from LocalStorage (WASM only)
    #[cfg(target_arch = "wasm32")]
    pub fn load() -> Self {
        let storage = web_sys::window()
            .and_then(|w| w.local_storage().ok())
            .flatten();

        if let Some(storage) = storage {
            if let Ok(Some(json)) = storage.get_item(Self::STORAGE_KEY) {
                if let Ok(settings) = serde_json::from_str::<Settings>(&json) {
                    log::info!("Loaded settings from LocalStorage");
                    return settings.validated();
                }
            }
        }

        log::info!("Using default settings");
        Self::default()
    }

    /// Save settings to LocalStorage (WASM only)
    #[cfg(target_arch = "wasm32")]
    pub fn save(&self) {
        let storage = web_sys::window()
            .and_then(|w| w.local_storage().ok())
            .flatten();

        if let Some(storage) = storage {
            if let Ok(json) = serde_json::to_string(self) {
                let _ = storage.set_item(Self::STORAGE_KEY, &json);
                log::info!("Settings saved");
            }
        }
    }

    /// Load settings from a JSON file, falling back to defaults
    #[cfg(not(target_arch = "wasm32"))]
    pub fn load_from(path: &std::path::Path) -> Self {
        let parsed = std::fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|json| serde_json::from_str::<Settings>(&json).map_err(|e| e.to_string()));

        match parsed {
            Ok(settings) => {
                log::info!("Loaded settings from {}", path.display());
                settings.validated()
            }
            Err(e) => {
                log::info!("Using default settings ({}: {})", path.display(), e);
                Self::default()
            }
        }
    }

    /// Save settings as pretty JSON
    #[cfg(not(target_arch = "wasm32"))]
    pub fn save_to(&self, path: &std::path::Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        log::info!("Settings saved to {}", path.display());
        Ok(())
    }
}
