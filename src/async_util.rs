use std::future::Future;
use std::time::Duration;

use futures_lite::FutureExt;
use futures_timer::Delay;

/// Creates a single-shot completion pair.
pub fn oneshot<T>() -> (Completer<T>, Completion<T>) {
    let (sender, receiver) = async_channel::bounded(1);
    (Completer { sender }, Completion { receiver })
}

/// Sending half of a single-shot completion.
///
/// `complete` consumes the completer, so a value can be delivered at most once.
/// Dropping it without completing makes [`Completion::wait`] return `None`.
pub struct Completer<T> {
    sender: async_channel::Sender<T>,
}

/// Receiving half of a single-shot completion.
pub struct Completion<T> {
    receiver: async_channel::Receiver<T>,
}

impl<T> Completer<T> {
    /// Delivers `value`. Returns `false` if the receiving side is already gone.
    pub fn complete(self, value: T) -> bool {
        self.sender.try_send(value).is_ok()
    }

    /// Checks if the receiving side has been dropped.
    pub fn is_abandoned(&self) -> bool {
        self.sender.is_closed()
    }
}

impl<T> Completion<T> {
    /// Waits for the value. Returns `None` if the completer was dropped without completing.
    pub async fn wait(self) -> Option<T> {
        self.receiver.recv().await.ok()
    }

    /// Takes the value if it has already been delivered.
    pub fn try_take(&self) -> Option<T> {
        self.receiver.try_recv().ok()
    }
}

/// Runs `fut` until it finishes or `dur` elapses, whichever comes first.
/// Returns `None` on timeout.
pub async fn timeout<T>(fut: impl Future<Output = T>, dur: Duration) -> Option<T> {
    async { Some(fut.await) }
        .or(async {
            Delay::new(dur).await;
            None
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_lite::future::block_on;

    #[test]
    fn completes_once() {
        let (completer, completion) = oneshot();
        assert!(completion.try_take().is_none());
        assert!(completer.complete(7));
        assert_eq!(block_on(completion.wait()), Some(7));
    }

    #[test]
    fn dropped_completer_yields_none() {
        let (completer, completion) = oneshot::<u8>();
        drop(completer);
        assert_eq!(block_on(completion.wait()), None);
    }

    #[test]
    fn abandoned_receiver_is_observable() {
        let (completer, completion) = oneshot::<u8>();
        assert!(!completer.is_abandoned());
        drop(completion);
        assert!(completer.is_abandoned());
        assert!(!completer.complete(1));
    }

    #[test]
    fn timeout_expires() {
        let res = block_on(timeout(futures_lite::future::pending::<()>(), Duration::from_millis(20)));
        assert_eq!(res, None);
        let res = block_on(timeout(async { 3 }, Duration::from_secs(5)));
        assert_eq!(res, Some(3));
    }
}
