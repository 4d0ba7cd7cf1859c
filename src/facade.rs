use std::sync::Arc;

use log::{debug, info};

use crate::capture::{CaptureLauncher, CaptureRequestFlow, ImageDecoder};
use crate::discovery::{DeviceDiscovery, UsbEnumerator};
use crate::error::ErrorKind;
use crate::multiplexer::{EventMultiplexer, EventSink};
use crate::{BridgeConfig, Error, RequestCode, Result, ResultStatus, Value};

/// Operations the runtime may invoke on the camera channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Initialize,
    Capture,
    Dispose,
}

impl Method {
    /// Parses a method name received from the runtime.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "initialize" => Some(Method::Initialize),
            "capture" => Some(Method::Capture),
            "dispose" => Some(Method::Dispose),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Method::Initialize => "initialize",
            Method::Capture => "capture",
            Method::Dispose => "dispose",
        }
    }
}

impl std::str::FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Method::from_name(s).ok_or_else(|| Error::new(ErrorKind::NotImplemented, s))
    }
}

/// Reply to [`Method::Initialize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Some capture path (USB or system camera) is usable.
    pub has_capture_capability: bool,
    /// A USB video device is attached.
    pub is_usb_device: bool,
}

impl Capabilities {
    /// Encodes the reply with the keys the runtime side reads.
    pub fn to_value(&self) -> Value {
        Value::map([
            ("hasCamera", self.has_capture_capability),
            ("isUsbCamera", self.is_usb_device),
        ])
    }
}

/// Adapter between the runtime's method/event channels and the routing core.
///
/// Platform callbacks enter through [`ChannelFacade::on_activity_result`]; runtime
/// stream-handler callbacks through [`ChannelFacade::on_listen`] and
/// [`ChannelFacade::on_cancel`].
pub struct ChannelFacade {
    config: BridgeConfig,
    capture: CaptureRequestFlow,
    discovery: DeviceDiscovery,
    events: Arc<EventMultiplexer>,
}

impl ChannelFacade {
    /// Creates the facade on the process-wide [`EventMultiplexer`].
    ///
    /// `enumerator` is `None` when the platform has no USB service.
    pub fn new(
        config: BridgeConfig,
        launcher: Arc<dyn CaptureLauncher>,
        enumerator: Option<Arc<dyn UsbEnumerator>>,
    ) -> Self {
        let capture = CaptureRequestFlow::with_timeout(
            config.capture_request_code,
            launcher,
            config.capture_timeout,
        );
        let discovery = enumerator.map_or_else(DeviceDiscovery::unavailable, DeviceDiscovery::new);
        info!("initialized channel {}", config.channel_name);
        Self {
            config,
            capture,
            discovery,
            events: EventMultiplexer::global(),
        }
    }

    /// Routes events through `events` instead of the process-wide registry.
    pub fn with_events(mut self, events: Arc<EventMultiplexer>) -> Self {
        self.events = events;
        self
    }

    pub fn with_decoder(mut self, decoder: Box<dyn ImageDecoder>) -> Self {
        self.capture.set_decoder(decoder);
        self
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn capture_flow(&self) -> &CaptureRequestFlow {
        &self.capture
    }

    pub fn discovery(&self) -> &DeviceDiscovery {
        &self.discovery
    }

    pub fn events(&self) -> &Arc<EventMultiplexer> {
        &self.events
    }

    /// Handles a method call by name. Unknown names fail with
    /// [`ErrorKind::NotImplemented`].
    pub async fn method_call(&self, name: &str) -> Result<Value> {
        debug!("method call on {}: {name}", self.config.channel_name);
        let method: Method = name.parse()?;
        self.invoke(method).await
    }

    /// Handles one method call. Capture resolves once its external result arrives.
    pub async fn invoke(&self, method: Method) -> Result<Value> {
        match method {
            Method::Initialize => Ok(self.capabilities().to_value()),
            Method::Capture => {
                let pending = self.capture.initiate()?;
                pending.outcome().await.into_reply()
            }
            Method::Dispose => {
                self.capture.dispose();
                Ok(Value::Null)
            }
        }
    }

    /// Probes the capture paths.
    pub fn capabilities(&self) -> Capabilities {
        let is_usb_device = self.discovery.has_video_capable_device();
        let caps = Capabilities {
            has_capture_capability: is_usb_device || self.config.advertise_fallback_capture,
            is_usb_device,
        };
        info!("capabilities: {caps:?}");
        caps
    }

    /// Forwards an activity result from the platform. Results with other request
    /// codes are ignored and `false` is returned.
    pub fn on_activity_result(
        &self,
        request_code: i32,
        status: i32,
        payload: Option<Value>,
    ) -> bool {
        self.capture.handle_activity_result(
            RequestCode(request_code),
            ResultStatus(status),
            payload,
        )
    }

    /// The runtime started listening on the event channel under `key`.
    pub fn on_listen(&self, key: &str, sink: Arc<dyn EventSink>) {
        self.events.subscribe(key, sink);
    }

    /// The runtime stopped listening under `key`.
    pub fn on_cancel(&self, key: &str) {
        self.events.unsubscribe(key);
    }

    /// Disposes the capture flow and ends every event subscription.
    pub fn teardown(&self) {
        self.capture.dispose();
        self.events.close_all();
    }
}
