use std::time::Duration;

use crate::RequestCode;

/// Configuration of a [`crate::ChannelFacade`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub struct BridgeConfig {
    /// Name of the method channel the runtime talks to.
    pub channel_name: String,
    /// Request code reserved for camera capture results.
    pub capture_request_code: RequestCode,
    /// How long a capture waits for its result before resolving as cancelled.
    /// `None` waits until the result arrives or the facade is disposed.
    pub capture_timeout: Option<Duration>,
    /// Report capture capability even when no USB video device is attached,
    /// since the system camera serves as a fallback.
    pub advertise_fallback_capture: bool,
}

impl BridgeConfig {
    pub fn channel_name(mut self, name: impl Into<String>) -> Self {
        self.channel_name = name.into();
        self
    }

    pub fn capture_request_code(mut self, code: i32) -> Self {
        self.capture_request_code = RequestCode(code);
        self
    }

    pub fn capture_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.capture_timeout = timeout;
        self
    }

    pub fn advertise_fallback_capture(mut self, advertise: bool) -> Self {
        self.advertise_fallback_capture = advertise;
        self
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            channel_name: "com.example.demo_ai_even/uvc_camera".to_string(),
            capture_request_code: RequestCode(1001),
            capture_timeout: None,
            advertise_fallback_capture: true,
        }
    }
}
