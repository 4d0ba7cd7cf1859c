use std::sync::Arc;
use std::time::Duration;

use async_lock::Mutex;
use log::{debug, error, info, warn};

use crate::dispatcher::{PendingRequest, ResultDispatcher, Token};
use crate::error::ErrorKind;
use crate::{CaptureOutcome, Error, RequestCode, Result, ResultStatus, Value};

/// Key of the image inside a capture result payload.
pub const IMAGE_EXTRA: &str = "data";

/// Platform hook that starts the external capture action (a system camera picker
/// or a hardware trigger).
pub trait CaptureLauncher: Send + Sync {
    /// Checks if some handler can service the capture action. Must not start anything.
    fn is_available(&self) -> bool;

    /// Starts the capture action. Its result is expected back through
    /// [`CaptureRequestFlow::handle_activity_result`] under `code`.
    ///
    /// This must return without waiting for the result.
    fn launch(&self, code: RequestCode) -> Result<()>;
}

/// Extracts encoded image bytes from the image entry of a result payload.
pub trait ImageDecoder: Send + Sync {
    /// Errors are reported to the caller as [`ErrorKind::DecodeFailure`].
    fn decode(&self, image: &Value) -> Result<Vec<u8>>;
}

/// Accepts JPEG data and passes it through unchanged.
///
/// The data must open with a start-of-image marker and contain an end-of-image
/// marker after it. Bytes trailing the end marker (padding, vendor trailers) are
/// kept as they are.
#[derive(Debug, Clone, Copy, Default)]
pub struct JpegPassthrough;

const JPEG_SOI: [u8; 2] = [0xff, 0xd8];
const JPEG_EOI: [u8; 2] = [0xff, 0xd9];

impl ImageDecoder for JpegPassthrough {
    fn decode(&self, image: &Value) -> Result<Vec<u8>> {
        let bytes = image.as_bytes().ok_or_else(|| {
            Error::new(ErrorKind::DecodeFailure, "image entry is not a byte array")
        })?;
        let is_jpeg = bytes.starts_with(&JPEG_SOI)
            && bytes[JPEG_SOI.len()..].windows(2).any(|w| w == JPEG_EOI);
        if !is_jpeg {
            return Err(Error::new(
                ErrorKind::DecodeFailure,
                format!("{} bytes of non-JPEG data", bytes.len()),
            ));
        }
        Ok(bytes.to_vec())
    }
}

/// Publicly observable state of a [`CaptureRequestFlow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Requested,
}

#[derive(Debug, Clone, Copy)]
enum FlowState {
    Idle,
    Requested(Token),
}

/// Coordinates one photo request: start the capture, await the external result,
/// decode it and complete the caller.
///
/// The flow owns its [`ResultDispatcher`]; the pending request is reachable only
/// through the flow and the [`PendingRequest`] handed to the caller.
pub struct CaptureRequestFlow {
    code: RequestCode,
    dispatcher: ResultDispatcher,
    state: Mutex<FlowState>,
    launcher: Mutex<Option<Arc<dyn CaptureLauncher>>>,
    decoder: Box<dyn ImageDecoder>,
}

impl CaptureRequestFlow {
    pub fn new(code: RequestCode, launcher: Arc<dyn CaptureLauncher>) -> Self {
        Self::with_timeout(code, launcher, None)
    }

    /// Creates a flow whose callers give up after `timeout` and see
    /// [`CaptureOutcome::Cancelled`].
    pub fn with_timeout(
        code: RequestCode,
        launcher: Arc<dyn CaptureLauncher>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            code,
            dispatcher: ResultDispatcher::new(timeout),
            state: Mutex::new(FlowState::Idle),
            launcher: Mutex::new(Some(launcher)),
            decoder: Box::new(JpegPassthrough),
        }
    }

    /// Replaces the default [`JpegPassthrough`] decoder.
    pub fn set_decoder(&mut self, decoder: Box<dyn ImageDecoder>) {
        self.decoder = decoder;
    }

    /// Registers `launcher` again after [`CaptureRequestFlow::dispose`].
    pub fn attach(&self, launcher: Arc<dyn CaptureLauncher>) {
        self.launcher.lock_blocking().replace(launcher);
    }

    pub fn request_code(&self) -> RequestCode {
        self.code
    }

    /// A request that timed out or whose caller went away counts as finished.
    pub fn state(&self) -> CaptureState {
        let mut state = self.state.lock_blocking();
        match *state {
            FlowState::Requested(token) if self.dispatcher.pending_token(self.code) == Some(token) => {
                CaptureState::Requested
            }
            FlowState::Requested(token) => {
                debug!("capture {token:?} is no longer live");
                *state = FlowState::Idle;
                CaptureState::Idle
            }
            FlowState::Idle => CaptureState::Idle,
        }
    }

    /// Starts a capture.
    ///
    /// Fails with [`ErrorKind::AlreadyPending`] while another capture is live. When no
    /// handler can service the action, the returned request is already resolved with
    /// [`ErrorKind::NoDeviceAvailable`] and nothing is launched.
    pub fn initiate(&self) -> Result<PendingRequest> {
        let mut state = self.state.lock_blocking();
        if let FlowState::Requested(token) = *state {
            if self.dispatcher.pending_token(self.code) == Some(token) {
                return Err(Error::new(
                    ErrorKind::AlreadyPending,
                    "a capture is already in progress",
                ));
            }
            // the previous caller timed out or went away
            debug!("discarding abandoned capture {token:?}");
        }
        let pending = self.dispatcher.begin(self.code)?;
        let token = pending.token();

        let launcher = self
            .launcher
            .lock_blocking()
            .clone()
            .filter(|launcher| launcher.is_available());
        let Some(launcher) = launcher else {
            warn!("no camera is available to service the capture");
            *state = FlowState::Idle;
            drop(state);
            self.dispatcher.resolve_token(
                self.code,
                token,
                CaptureOutcome::Error(Error::new(
                    ErrorKind::NoDeviceAvailable,
                    "no camera is available",
                )),
            );
            return Ok(pending);
        };
        *state = FlowState::Requested(token);
        drop(state);

        // The state lock is released so that a launcher delivering its result
        // synchronously does not deadlock.
        info!("launching capture {}", self.code);
        if let Err(e) = launcher.launch(self.code) {
            error!("failed to open the camera: {e}");
            self.finish(token, CaptureOutcome::Error(Error::new(ErrorKind::LaunchFailed, e)));
        }
        Ok(pending)
    }

    /// Routes an external result to this flow. Returns `false` if `code` belongs to
    /// somebody else, in which case nothing happens.
    pub fn handle_activity_result(
        &self,
        code: RequestCode,
        status: ResultStatus,
        payload: Option<Value>,
    ) -> bool {
        if code != self.code {
            return false;
        }
        self.on_external_result(status, payload);
        true
    }

    /// Completes the live capture from its external result, then returns to idle
    /// whatever the outcome. A result with no capture in flight is ignored.
    pub fn on_external_result(&self, status: ResultStatus, payload: Option<Value>) {
        let prev = std::mem::replace(&mut *self.state.lock_blocking(), FlowState::Idle);
        let FlowState::Requested(token) = prev else {
            debug!("ignoring result for {} with no capture in flight", self.code);
            return;
        };
        let outcome = self.classify(status, payload);
        debug!("capture {} finished: {}", self.code, describe(&outcome));
        self.dispatcher.resolve_token(self.code, token, outcome);
    }

    fn classify(&self, status: ResultStatus, payload: Option<Value>) -> CaptureOutcome {
        if !status.is_ok() {
            return CaptureOutcome::Cancelled;
        }
        let image = payload
            .as_ref()
            .and_then(|payload| payload.get(IMAGE_EXTRA))
            .filter(|image| !image.is_null());
        let Some(image) = image else {
            return CaptureOutcome::NoImage;
        };
        match self.decoder.decode(image) {
            Ok(bytes) => CaptureOutcome::ImageBytes(bytes),
            Err(e) => CaptureOutcome::Error(Error::new(ErrorKind::DecodeFailure, e.message())),
        }
    }

    fn finish(&self, token: Token, outcome: CaptureOutcome) {
        let mut state = self.state.lock_blocking();
        if matches!(*state, FlowState::Requested(t) if t == token) {
            *state = FlowState::Idle;
        }
        drop(state);
        self.dispatcher.resolve_token(self.code, token, outcome);
    }

    /// Cancels the live capture, if any, and unregisters the launcher.
    /// Calling it again does nothing.
    pub fn dispose(&self) {
        if self.launcher.lock_blocking().take().is_some() {
            info!("disposing capture flow {}", self.code);
        }
        *self.state.lock_blocking() = FlowState::Idle;
        self.dispatcher.cancel_all();
    }
}

fn describe(outcome: &CaptureOutcome) -> String {
    match outcome {
        CaptureOutcome::ImageBytes(bytes) => format!("{} image bytes", bytes.len()),
        CaptureOutcome::Cancelled => "cancelled".into(),
        CaptureOutcome::NoImage => "no image".into(),
        CaptureOutcome::Error(e) => e.to_string(),
    }
}
