use serde::{Deserialize, Serialize};

/// End-of-session aggregate, computed once when the session stops.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatistics {
    pub total_duration: f64,
    pub time_on_screen: f64,
    pub time_lost: f64,
    pub percentage_on_screen: f64,
    pub percentage_lost: f64,
    pub total_samples: u64,
    pub valid_samples: u64,
    pub screen_samples: u64,
    pub lost_samples: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterSnapshot {
    pub frames_seen: u64,
    pub images_saved: u64,
    pub image_failures: u64,
    pub forward_failures: u64,
    pub samples_appended: u64,
    pub sample_failures: u64,
}
