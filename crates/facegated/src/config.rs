use facegate_core::{EnrollmentConfig, GateConfig, LivenessConfig};

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Identity-match endpoint (POST, JSON descriptor).
    pub matcher_url: String,
    /// Enrollment-validation endpoint (POST, JSON array of descriptors).
    pub enroll_url: String,
    /// Timeout in milliseconds for one remote call.
    pub match_timeout_ms: u64,
    /// Debounce window before the gate check runs.
    pub debounce_ms: u64,
    /// Longest a steady frame stream may postpone the gate check.
    pub debounce_max_wait_ms: u64,
    /// Continuous detection required before a remote call.
    pub min_continuous_ms: u64,
    /// How long a rejection or error stays up before the same face retries.
    pub retry_after_ms: u64,
    pub min_blinks: u32,
    pub min_head_movements: u32,
    /// Mean absolute descriptor difference still treated as the same face.
    pub same_face_epsilon: f32,
    /// Expected descriptor length from the recognition network.
    pub descriptor_len: usize,
    /// Detections scored below this are treated as no face.
    pub min_detection_confidence: f32,
    /// Cosine similarity required between enrollment scans.
    pub enroll_threshold: f32,
    /// Minimum spacing between accepted enrollment scans.
    pub enroll_interval_ms: u64,
}

impl Config {
    /// Load configuration from `FACEGATE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self {
            matcher_url: std::env::var("FACEGATE_MATCHER_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8080/api/face/verify".to_string()),
            enroll_url: std::env::var("FACEGATE_ENROLL_URL").unwrap_or_else(|_| {
                "http://127.0.0.1:8080/api/face/validate-enrollment".to_string()
            }),
            match_timeout_ms: env_u64("FACEGATE_MATCH_TIMEOUT_MS", 10_000),
            debounce_ms: env_u64("FACEGATE_DEBOUNCE_MS", 300),
            debounce_max_wait_ms: env_u64("FACEGATE_DEBOUNCE_MAX_WAIT_MS", 600),
            min_continuous_ms: env_u64("FACEGATE_MIN_CONTINUOUS_MS", 3000),
            retry_after_ms: env_u64("FACEGATE_RETRY_AFTER_MS", 2000),
            min_blinks: env_u32("FACEGATE_MIN_BLINKS", 1),
            min_head_movements: env_u32("FACEGATE_MIN_HEAD_MOVEMENTS", 2),
            same_face_epsilon: env_f32("FACEGATE_SAME_FACE_EPSILON", 0.05),
            descriptor_len: env_usize("FACEGATE_DESCRIPTOR_LEN", 128),
            min_detection_confidence: env_f32("FACEGATE_MIN_DETECTION_CONFIDENCE", 0.5),
            enroll_threshold: env_f32("FACEGATE_ENROLL_THRESHOLD", 0.65),
            enroll_interval_ms: env_u64("FACEGATE_ENROLL_INTERVAL_MS", 1000),
        }
    }

    pub fn gate_config(&self) -> GateConfig {
        GateConfig {
            liveness: LivenessConfig {
                min_blinks: self.min_blinks,
                min_head_movements: self.min_head_movements,
                ..LivenessConfig::default()
            },
            same_face_epsilon: self.same_face_epsilon,
            descriptor_len: self.descriptor_len,
            min_continuous_ms: self.min_continuous_ms,
            debounce_ms: self.debounce_ms,
            debounce_max_wait_ms: self.debounce_max_wait_ms,
            match_timeout_ms: self.match_timeout_ms,
            retry_after_ms: self.retry_after_ms,
        }
    }

    pub fn enrollment_config(&self) -> EnrollmentConfig {
        EnrollmentConfig {
            similarity_threshold: self.enroll_threshold,
            descriptor_len: self.descriptor_len,
        }
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
