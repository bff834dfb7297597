use crate::StatusMessage;
use futures::channel::mpsc::Receiver;
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio_util::sync::CancellationToken;

/// The progress of one bundle action: an `InProgress` message followed by a single `Succeeded` or
/// `Failed` message, after which the stream ends.
///
/// Closing or dropping the stream cancels the action. A cancelled action still tears down its
/// sandbox, and its terminal message can still be read from a closed stream.
#[derive(Debug)]
pub struct StatusStream {
    receiver: Receiver<StatusMessage>,
    cancel: CancellationToken,
}

impl StatusStream {
    pub(crate) fn new(receiver: Receiver<StatusMessage>, cancel: CancellationToken) -> Self {
        Self { receiver, cancel }
    }

    /// Asks the action to stop at the next opportunity.
    pub fn close(&mut self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Stream for StatusStream {
    type Item = StatusMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.receiver).poll_next(cx)
    }
}

impl Drop for StatusStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
