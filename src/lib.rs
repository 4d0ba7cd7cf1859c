//! Routing core of a native bridge that exposes camera capture and USB video
//! devices to an embedded application runtime over method/event channels.
//!
//! The crate owns the request/response and event-routing logic only:
//! - [`ResultDispatcher`] matches asynchronous platform results back to the pending caller;
//! - [`CaptureRequestFlow`] runs one photo request from launch to completion;
//! - [`DeviceDiscovery`] classifies the attached USB devices;
//! - [`EventMultiplexer`] fans events out to subscribers identified by a key;
//! - [`ChannelFacade`] ties them to the runtime's calls and callbacks.
//!
//! Platform services (starting the system camera, enumerating USB devices, decoding
//! images) are supplied through the [`CaptureLauncher`], [`UsbEnumerator`] and
//! [`ImageDecoder`] traits.

pub use capture::{CaptureLauncher, CaptureRequestFlow, CaptureState, ImageDecoder, JpegPassthrough};
pub use config::BridgeConfig;
pub use discovery::{
    matches_video_class, DeviceDescriptor, DeviceDiscovery, InterfaceDescriptor, UsbEnumerator,
};
pub use dispatcher::{PendingRequest, ResultDispatcher, Token};
pub use error::{Error, ErrorKind};
pub use facade::{Capabilities, ChannelFacade, Method};
pub use multiplexer::{ChannelSink, Event, EventMultiplexer, EventSink, EventStream};

/// Convenience alias for a result with [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

pub mod capture;
pub mod discovery;
pub mod error;
mod types;
pub use types::*;

mod async_util;
mod config;
mod dispatcher;
mod facade;
mod multiplexer;
