//! Application configuration
//!
//! One YAML document with a `playback` section (engine timings and editor
//! selectors), an `api` section (tour service) and the post type tours are
//! authored for. `TOURGUIDE_*` environment variables override the timings.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use tour_store::ApiConfig;
use tourguide_core_types::PlaybackConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub playback: PlaybackConfig,
    pub api: ApiConfig,
    pub post_type: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            playback: PlaybackConfig::default(),
            api: ApiConfig::default(),
            post_type: "post".to_string(),
        }
    }
}

const TIMING_OVERRIDES: &[&str] = &[
    "TOURGUIDE_PRECONDITION_TIMEOUT_MS",
    "TOURGUIDE_POLL_INTERVAL_MS",
    "TOURGUIDE_CLICK_GRACE_MS",
    "TOURGUIDE_COMPLETION_SETTLE_MS",
    "TOURGUIDE_LOOKAHEAD_TIMEOUT_MS",
    "TOURGUIDE_BLOCK_APPEAR_TIMEOUT_MS",
];

fn timing_field<'a>(playback: &'a mut PlaybackConfig, key: &str) -> Option<&'a mut u64> {
    match key {
        "TOURGUIDE_PRECONDITION_TIMEOUT_MS" => Some(&mut playback.precondition_timeout_ms),
        "TOURGUIDE_POLL_INTERVAL_MS" => Some(&mut playback.poll_interval_ms),
        "TOURGUIDE_CLICK_GRACE_MS" => Some(&mut playback.click_grace_ms),
        "TOURGUIDE_COMPLETION_SETTLE_MS" => Some(&mut playback.completion_settle_ms),
        "TOURGUIDE_LOOKAHEAD_TIMEOUT_MS" => Some(&mut playback.lookahead_timeout_ms),
        "TOURGUIDE_BLOCK_APPEAR_TIMEOUT_MS" => Some(&mut playback.block_appear_timeout_ms),
        _ => None,
    }
}

impl Config {
    /// Apply overrides read through `lookup` (normally the process environment).
    /// Values that are not valid integers are ignored with a warning.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        for key in TIMING_OVERRIDES.iter().copied() {
            let Some(raw) = lookup(key) else {
                continue;
            };
            match raw.trim().parse::<u64>() {
                Ok(value) => {
                    debug!(key, value, "timing override");
                    if let Some(field) = timing_field(&mut self.playback, key) {
                        *field = value;
                    }
                }
                Err(_) => warn!(key, value = %raw, "ignoring non-numeric override"),
            }
        }

        if let Some(url) = lookup("TOURGUIDE_API_BASE_URL") {
            self.api.base_url = url;
        }
        if let Some(nonce) = lookup("TOURGUIDE_API_NONCE") {
            self.api.nonce = Some(nonce);
        }
        if let Some(post_type) = lookup("TOURGUIDE_POST_TYPE") {
            self.post_type = post_type;
        }
    }
}
