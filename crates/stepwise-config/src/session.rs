//! Session manager timing and buffering configuration

use crate::constants::{
    DEFAULT_LOCATION_QUERY_TIMEOUT_MS, DEFAULT_MAX_STACK_FRAMES, DEFAULT_OUTPUT_BUFFER_LINES,
    DEFAULT_PAUSE_CONFIRM_TIMEOUT_MS, DEFAULT_PORT_RANGE_END, DEFAULT_PORT_RANGE_START,
    DEFAULT_SESSION_EVENT_CAPACITY, DEFAULT_STEP_TIMEOUT_MS, DEFAULT_STOP_ON_ENTRY_TIMEOUT_MS,
    DEFAULT_THREAD_QUERY_TIMEOUT_MS,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Wait for the stop or termination that follows a step (ms)
    #[serde(default = "default_step_timeout_ms")]
    pub step_timeout_ms: u64,
    /// Wait for the threads query issued by pause (ms)
    #[serde(default = "default_thread_query_timeout_ms")]
    pub thread_query_timeout_ms: u64,
    /// Wait for the stop after a pause request (ms)
    #[serde(default = "default_pause_confirm_timeout_ms")]
    pub pause_confirm_timeout_ms: u64,
    /// Wait for the initial stop when stop-on-entry is requested (ms)
    #[serde(default = "default_stop_on_entry_timeout_ms")]
    pub stop_on_entry_timeout_ms: u64,
    /// Wait for the top-frame query that locates a stop (ms)
    #[serde(default = "default_location_query_timeout_ms")]
    pub location_query_timeout_ms: u64,
    #[serde(default = "default_max_stack_frames")]
    pub max_stack_frames: i64,
    /// Program output lines kept per session
    #[serde(default = "default_output_buffer_lines")]
    pub output_buffer_lines: usize,
    /// Capacity of per-session event channels
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    #[serde(default = "default_port_range_start")]
    pub port_range_start: u16,
    #[serde(default = "default_port_range_end")]
    pub port_range_end: u16,
}

fn default_step_timeout_ms() -> u64 {
    DEFAULT_STEP_TIMEOUT_MS
}

fn default_thread_query_timeout_ms() -> u64 {
    DEFAULT_THREAD_QUERY_TIMEOUT_MS
}

fn default_pause_confirm_timeout_ms() -> u64 {
    DEFAULT_PAUSE_CONFIRM_TIMEOUT_MS
}

fn default_stop_on_entry_timeout_ms() -> u64 {
    DEFAULT_STOP_ON_ENTRY_TIMEOUT_MS
}

fn default_location_query_timeout_ms() -> u64 {
    DEFAULT_LOCATION_QUERY_TIMEOUT_MS
}

fn default_max_stack_frames() -> i64 {
    DEFAULT_MAX_STACK_FRAMES
}

fn default_output_buffer_lines() -> usize {
    DEFAULT_OUTPUT_BUFFER_LINES
}

fn default_event_capacity() -> usize {
    DEFAULT_SESSION_EVENT_CAPACITY
}

fn default_port_range_start() -> u16 {
    DEFAULT_PORT_RANGE_START
}

fn default_port_range_end() -> u16 {
    DEFAULT_PORT_RANGE_END
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            step_timeout_ms: default_step_timeout_ms(),
            thread_query_timeout_ms: default_thread_query_timeout_ms(),
            pause_confirm_timeout_ms: default_pause_confirm_timeout_ms(),
            stop_on_entry_timeout_ms: default_stop_on_entry_timeout_ms(),
            location_query_timeout_ms: default_location_query_timeout_ms(),
            max_stack_frames: default_max_stack_frames(),
            output_buffer_lines: default_output_buffer_lines(),
            event_capacity: default_event_capacity(),
            port_range_start: default_port_range_start(),
            port_range_end: default_port_range_end(),
        }
    }
}

impl SessionConfig {
    /// Problems with this section, prefixed with `session.`
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let positive = [
            ("step_timeout_ms", self.step_timeout_ms),
            ("thread_query_timeout_ms", self.thread_query_timeout_ms),
            ("pause_confirm_timeout_ms", self.pause_confirm_timeout_ms),
            ("stop_on_entry_timeout_ms", self.stop_on_entry_timeout_ms),
            ("location_query_timeout_ms", self.location_query_timeout_ms),
        ];
        for (name, value) in positive {
            if value == 0 {
                errors.push(format!("session.{} must be greater than 0", name));
            }
        }
        if self.max_stack_frames <= 0 {
            errors.push("session.max_stack_frames must be greater than 0".to_string());
        }
        if self.event_capacity == 0 {
            errors.push("session.event_capacity must be greater than 0".to_string());
        }
        if self.port_range_start == 0 || self.port_range_start > self.port_range_end {
            errors.push(format!(
                "session.port_range_start ({}) must be non-zero and <= session.port_range_end ({})",
                self.port_range_start, self.port_range_end
            ));
        }
        errors
    }
}
