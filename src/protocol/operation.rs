//! Pending-operation bookkeeping for the request/response half of the
//! protocol: one `Operation` per in-flight sequence number.

use tokio::sync::oneshot;

use crate::error::IncError;
use crate::message::Message;

/// Lifecycle of a single request awaiting its reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    Queued,
    InFlight,
    Completed,
    Failed,
    Cancelled,
    TimedOut,
}

/// A pending request: the channel its caller is awaiting on, plus state
/// for introspection (used by tests and diagnostics).
pub struct Operation {
    pub state: OperationState,
    reply_tx: Option<oneshot::Sender<Result<Message, IncError>>>,
}

impl Operation {
    pub fn new(reply_tx: oneshot::Sender<Result<Message, IncError>>) -> Self {
        Operation {
            state: OperationState::InFlight,
            reply_tx: Some(reply_tx),
        }
    }

    /// Complete this operation by handing the reply to its waiter.
    pub fn complete(mut self, reply: Message) {
        self.state = OperationState::Completed;
        if let Some(tx) = self.reply_tx.take() {
            let _ = tx.send(Ok(reply));
        }
    }

    /// Fail this operation, e.g. on transport closure or timeout.
    pub fn fail(mut self, err: IncError) {
        self.state = OperationState::Failed;
        if let Some(tx) = self.reply_tx.take() {
            let _ = tx.send(Err(err));
        }
    }

    pub fn cancel(mut self) {
        self.state = OperationState::Cancelled;
        if let Some(tx) = self.reply_tx.take() {
            let _ = tx.send(Err(IncError::Cancelled));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn complete_delivers_reply_to_waiter() {
        let (tx, rx) = oneshot::channel();
        let op = Operation::new(tx);
        let reply = Message::new(crate::message::MessageType::MethodReply, 1, 1, vec![]);
        op.complete(reply.clone());
        let got = rx.await.unwrap().unwrap();
        assert_eq!(got.header.sequence_number, reply.header.sequence_number);
    }

    #[tokio::test]
    async fn cancel_delivers_cancelled_error() {
        let (tx, rx) = oneshot::channel();
        let op = Operation::new(tx);
        op.cancel();
        assert!(matches!(rx.await.unwrap(), Err(IncError::Cancelled)));
    }
}
