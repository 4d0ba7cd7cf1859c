use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use async_lock::Mutex;
use log::{debug, info};

use crate::async_util::{oneshot, timeout, Completer, Completion};
use crate::error::ErrorKind;
use crate::{CaptureOutcome, RequestCode, Result};

/// Identity of one [`PendingRequest`]; never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token(usize);

impl Token {
    fn next() -> Self {
        static NEXT_TOKEN: AtomicUsize = AtomicUsize::new(0);
        Token(NEXT_TOKEN.fetch_add(1, Ordering::SeqCst))
    }
}

struct Slot {
    token: Token,
    completer: Completer<CaptureOutcome>,
}

type Slots = Mutex<HashMap<RequestCode, Slot>>;

/// Holds at most one in-flight request per request code and completes it when the
/// matching "foreign" callback arrives.
///
/// `begin` and `resolve` may be called from different threads; every read-modify-write
/// of the slot table happens under one lock.
pub struct ResultDispatcher {
    slots: Arc<Slots>,
    timeout: Option<Duration>,
}

/// One outstanding asynchronous operation, returned by [`ResultDispatcher::begin`].
///
/// Dropping it before the outcome arrives releases the request code, and a later
/// `resolve` for it becomes a no-op.
pub struct PendingRequest {
    code: RequestCode,
    token: Token,
    created: Instant,
    completion: Option<Completion<CaptureOutcome>>,
    taken: Option<CaptureOutcome>,
    slots: Weak<Slots>,
    timeout: Option<Duration>,
}

impl ResultDispatcher {
    /// Creates an empty dispatcher. With `timeout` set, a waiter that hears nothing
    /// within that duration gets [`CaptureOutcome::Cancelled`].
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            timeout,
        }
    }

    /// Registers a new pending request for `code`.
    ///
    /// Fails with [`ErrorKind::AlreadyPending`] if one is outstanding; the existing
    /// request is left untouched.
    pub fn begin(&self, code: RequestCode) -> Result<PendingRequest> {
        let mut slots = self.slots.lock_blocking();
        if let Some(slot) = slots.get(&code) {
            if !slot.completer.is_abandoned() {
                return Err(crate::Error::new(
                    ErrorKind::AlreadyPending,
                    format!("request {code} is already in flight"),
                ));
            }
            debug!("replacing abandoned request {code}");
        }
        let token = Token::next();
        let (completer, completion) = oneshot();
        slots.insert(code, Slot { token, completer });
        Ok(PendingRequest {
            code,
            token,
            created: Instant::now(),
            completion: Some(completion),
            taken: None,
            slots: Arc::downgrade(&self.slots),
            timeout: self.timeout,
        })
    }

    /// Completes the request pending for `code` with `outcome`.
    ///
    /// Returns `false` (and does nothing) if no request is pending, since callbacks
    /// may arrive after disposal.
    pub fn resolve(&self, code: RequestCode, outcome: CaptureOutcome) -> bool {
        let slot = self.slots.lock_blocking().remove(&code);
        Self::complete(code, slot, outcome)
    }

    /// Like [`ResultDispatcher::resolve`], but only if the pending request is the
    /// one identified by `token`. A stale token never resolves a newer request.
    pub fn resolve_token(&self, code: RequestCode, token: Token, outcome: CaptureOutcome) -> bool {
        let slot = {
            let mut slots = self.slots.lock_blocking();
            match slots.get(&code) {
                Some(slot) if slot.token == token => slots.remove(&code),
                _ => None,
            }
        };
        Self::complete(code, slot, outcome)
    }

    fn complete(code: RequestCode, slot: Option<Slot>, outcome: CaptureOutcome) -> bool {
        let Some(slot) = slot else {
            debug!("no pending request for {code}, dropping the result");
            return false;
        };
        let delivered = slot.completer.complete(outcome);
        if !delivered {
            debug!("waiter for {code} is gone");
        }
        delivered
    }

    /// Resolves every outstanding request with [`CaptureOutcome::Cancelled`].
    pub fn cancel_all(&self) {
        let drained: Vec<_> = self.slots.lock_blocking().drain().collect();
        for (code, slot) in drained {
            info!("cancelling pending request {code}");
            let _ = slot.completer.complete(CaptureOutcome::Cancelled);
        }
    }

    /// Checks if a live request is outstanding for `code`.
    pub fn is_pending(&self, code: RequestCode) -> bool {
        self.pending_token(code).is_some()
    }

    /// Returns the token of the live request outstanding for `code`, if any.
    pub fn pending_token(&self, code: RequestCode) -> Option<Token> {
        self.slots
            .lock_blocking()
            .get(&code)
            .filter(|slot| !slot.completer.is_abandoned())
            .map(|slot| slot.token)
    }
}

impl Default for ResultDispatcher {
    fn default() -> Self {
        Self::new(None)
    }
}

impl PendingRequest {
    pub fn code(&self) -> RequestCode {
        self.code
    }

    pub fn token(&self) -> Token {
        self.token
    }

    /// Time elapsed since the request was registered.
    pub fn age(&self) -> Duration {
        self.created.elapsed()
    }

    /// Returns the outcome if it has already been delivered, without waiting.
    ///
    /// The outcome is kept, so a later [`PendingRequest::outcome`] still returns it.
    pub fn try_outcome(&mut self) -> Option<CaptureOutcome> {
        if self.taken.is_none() {
            self.taken = self.completion.as_ref()?.try_take();
        }
        self.taken.clone()
    }

    /// Waits for the outcome.
    ///
    /// Returns [`CaptureOutcome::Cancelled`] when the dispatcher goes away or the
    /// configured timeout is reached; in the latter case the request code is released.
    pub async fn outcome(mut self) -> CaptureOutcome {
        if let Some(outcome) = self.taken.take() {
            return outcome;
        }
        let Some(completion) = self.completion.take() else {
            return CaptureOutcome::Cancelled;
        };
        let res = match self.timeout {
            Some(dur) => {
                let res = timeout(completion.wait(), dur).await;
                if res.is_none() {
                    info!("request {} timed out after {dur:?}", self.code);
                }
                res.flatten()
            }
            None => completion.wait().await,
        };
        res.unwrap_or(CaptureOutcome::Cancelled)
    }

    fn release(&self) {
        let Some(slots) = self.slots.upgrade() else {
            return;
        };
        let mut slots = slots.lock_blocking();
        if slots.get(&self.code).is_some_and(|slot| slot.token == self.token) {
            slots.remove(&self.code);
        }
    }
}

impl std::fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingRequest")
            .field("code", &self.code)
            .field("token", &self.token)
            .field("age", &self.age())
            .finish()
    }
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_lite::future::block_on;
    use std::sync::atomic::AtomicBool;

    const CODE: RequestCode = RequestCode(1001);

    #[test]
    fn resolve_delivers_the_outcome() {
        let dispatcher = ResultDispatcher::default();
        let pending = dispatcher.begin(CODE).unwrap();
        assert!(dispatcher.is_pending(CODE));
        assert!(dispatcher.resolve(CODE, CaptureOutcome::ImageBytes(vec![0xff, 0xd8])));
        assert!(!dispatcher.is_pending(CODE));
        assert_eq!(
            block_on(pending.outcome()),
            CaptureOutcome::ImageBytes(vec![0xff, 0xd8])
        );
    }

    #[test]
    fn resolve_without_pending_is_a_no_op() {
        let dispatcher = ResultDispatcher::default();
        assert!(!dispatcher.resolve(CODE, CaptureOutcome::NoImage));
    }

    #[test]
    fn second_resolve_does_not_reach_anyone() {
        let dispatcher = ResultDispatcher::default();
        let pending = dispatcher.begin(CODE).unwrap();
        assert!(dispatcher.resolve(CODE, CaptureOutcome::NoImage));
        assert!(!dispatcher.resolve(CODE, CaptureOutcome::Cancelled));
        assert_eq!(block_on(pending.outcome()), CaptureOutcome::NoImage);
    }

    #[test]
    fn second_begin_is_rejected() {
        let dispatcher = ResultDispatcher::default();
        let first = dispatcher.begin(CODE).unwrap();
        let err = dispatcher.begin(CODE).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyPending);

        // the first caller is not orphaned
        assert!(dispatcher.resolve(CODE, CaptureOutcome::Cancelled));
        assert_eq!(block_on(first.outcome()), CaptureOutcome::Cancelled);
        assert!(dispatcher.begin(CODE).is_ok());
    }

    #[test]
    fn codes_are_independent() {
        let dispatcher = ResultDispatcher::default();
        let mut a = dispatcher.begin(CODE).unwrap();
        let b = dispatcher.begin(RequestCode(1002)).unwrap();
        assert!(dispatcher.resolve(RequestCode(1002), CaptureOutcome::NoImage));
        assert!(a.try_outcome().is_none());
        assert_eq!(block_on(b.outcome()), CaptureOutcome::NoImage);
    }

    #[test]
    fn stale_token_is_ignored() {
        let dispatcher = ResultDispatcher::default();
        let old = dispatcher.begin(CODE).unwrap();
        let old_token = old.token();
        drop(old);

        let new = dispatcher.begin(CODE).unwrap();
        assert!(!dispatcher.resolve_token(CODE, old_token, CaptureOutcome::NoImage));
        assert!(dispatcher.resolve_token(CODE, new.token(), CaptureOutcome::Cancelled));
        assert_eq!(block_on(new.outcome()), CaptureOutcome::Cancelled);
    }

    #[test]
    fn dropping_the_request_frees_the_code() {
        let dispatcher = ResultDispatcher::default();
        drop(dispatcher.begin(CODE).unwrap());
        assert!(!dispatcher.is_pending(CODE));
        assert!(!dispatcher.resolve(CODE, CaptureOutcome::NoImage));
    }

    #[test]
    fn cancel_all_resolves_everything() {
        let dispatcher = ResultDispatcher::default();
        let a = dispatcher.begin(CODE).unwrap();
        let b = dispatcher.begin(RequestCode(7)).unwrap();
        dispatcher.cancel_all();
        assert_eq!(block_on(a.outcome()), CaptureOutcome::Cancelled);
        assert_eq!(block_on(b.outcome()), CaptureOutcome::Cancelled);
        dispatcher.cancel_all();
    }

    #[test]
    fn timeout_cancels_and_releases() {
        let dispatcher = ResultDispatcher::new(Some(Duration::from_millis(20)));
        let pending = dispatcher.begin(CODE).unwrap();
        assert_eq!(block_on(pending.outcome()), CaptureOutcome::Cancelled);
        assert!(!dispatcher.is_pending(CODE));
        assert!(!dispatcher.resolve(CODE, CaptureOutcome::NoImage));
    }

    #[test]
    fn outcome_after_try_outcome_is_the_same() {
        let dispatcher = ResultDispatcher::default();
        let mut pending = dispatcher.begin(CODE).unwrap();
        assert!(dispatcher.resolve(CODE, CaptureOutcome::NoImage));
        assert_eq!(pending.try_outcome(), Some(CaptureOutcome::NoImage));
        assert_eq!(pending.try_outcome(), Some(CaptureOutcome::NoImage));
        assert_eq!(block_on(pending.outcome()), CaptureOutcome::NoImage);
    }

    #[test]
    fn stale_token_never_resolves_across_threads() {
        let dispatcher = ResultDispatcher::default();
        let stale = dispatcher.begin(CODE).unwrap().token();
        let done = AtomicBool::new(false);

        std::thread::scope(|s| {
            s.spawn(|| {
                while !done.load(Ordering::SeqCst) {
                    assert!(!dispatcher.resolve_token(CODE, stale, CaptureOutcome::NoImage));
                }
            });
            for i in 0..2000u32 {
                let pending = dispatcher.begin(CODE).unwrap();
                let image = CaptureOutcome::ImageBytes(i.to_le_bytes().to_vec());
                assert!(dispatcher.resolve_token(CODE, pending.token(), image.clone()));
                assert_eq!(block_on(pending.outcome()), image);
            }
            done.store(true, Ordering::SeqCst);
        });
        assert!(!dispatcher.is_pending(CODE));
    }

    #[test]
    fn dropped_dispatcher_cancels_waiter() {
        let dispatcher = ResultDispatcher::default();
        let pending = dispatcher.begin(CODE).unwrap();
        drop(dispatcher);
        assert_eq!(block_on(pending.outcome()), CaptureOutcome::Cancelled);
    }
}
