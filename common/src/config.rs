use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    pub override_ttl_ms: u64,
    pub verify_interval_ms: u64,
    pub enforce_interval_ms: u64,
    pub schedule_interval_ms: u64,
    pub command_backoff_ms: u64,
    pub max_command_attempts: u32,
    pub max_store_attempts: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            override_ttl_ms: 1_800_000,
            verify_interval_ms: 30_000,
            enforce_interval_ms: 60_000,
            schedule_interval_ms: 300_000,
            command_backoff_ms: 6_000,
            max_command_attempts: 3,
            max_store_attempts: 3,
        }
    }
}

impl ControllerConfig {
    pub fn sanitize(&mut self) {
        self.override_ttl_ms = self.override_ttl_ms.clamp(60_000, 86_400_000);
        self.verify_interval_ms = self.verify_interval_ms.max(1_000);
        self.enforce_interval_ms = self.enforce_interval_ms.max(1_000);
        self.schedule_interval_ms = self.schedule_interval_ms.max(1_000);
        self.command_backoff_ms = self.command_backoff_ms.min(60_000);
        self.max_command_attempts = self.max_command_attempts.clamp(1, 10);
        self.max_store_attempts = self.max_store_attempts.clamp(1, 10);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub controller: ControllerConfig,
    pub timezone: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            controller: ControllerConfig::default(),
            timezone: "Asia/Jerusalem".to_string(),
        }
    }
}
