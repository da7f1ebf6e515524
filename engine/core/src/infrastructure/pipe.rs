// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Outgoing pipes: the transport between one queue and one recipient.
//!
//! Pipes are FIFO per channel. [`LocalPipe`] feeds the recipient's mailbox
//! directly and is what in-process swarms use.

use crate::domain::message::Message;
use crate::domain::variable::AgentId;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PipeError {
    #[error("Pipe to '{0}' is closed")]
    Closed(AgentId),

    #[error("Transport failure towards '{recipient}': {detail}")]
    Transport { recipient: AgentId, detail: String },
}

/// Sending end of a channel towards one recipient.
pub trait OutgoingPipe<U>: Send + Sync {
    fn recipient(&self) -> &AgentId;

    fn push(&self, message: Message<U>) -> Result<(), PipeError>;

    /// Further pushes fail with [`PipeError::Closed`].
    fn close(&self);
}

pub type MailboxSender<U> = mpsc::UnboundedSender<Message<U>>;
pub type MailboxReceiver<U> = mpsc::UnboundedReceiver<Message<U>>;

/// Unbounded mailbox channel.
pub fn mailbox<U>() -> (MailboxSender<U>, MailboxReceiver<U>) {
    mpsc::unbounded_channel()
}

/// In-process pipe writing into the recipient's mailbox.
pub struct LocalPipe<U> {
    recipient: AgentId,
    sender: parking_lot::RwLock<Option<MailboxSender<U>>>,
}

impl<U> LocalPipe<U> {
    pub fn new(recipient: AgentId, sender: MailboxSender<U>) -> Self {
        Self {
            recipient,
            sender: parking_lot::RwLock::new(Some(sender)),
        }
    }
}

impl<U: Send + Sync> OutgoingPipe<U> for LocalPipe<U> {
    fn recipient(&self) -> &AgentId {
        &self.recipient
    }

    fn push(&self, message: Message<U>) -> Result<(), PipeError> {
        let guard = self.sender.read();
        let sender = guard
            .as_ref()
            .ok_or_else(|| PipeError::Closed(self.recipient.clone()))?;
        sender
            .send(message)
            .map_err(|_| PipeError::Closed(self.recipient.clone()))
    }

    fn close(&self) {
        self.sender.write().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::message::Payload;

    #[tokio::test]
    async fn test_local_pipe_is_fifo() {
        let (tx, mut rx) = mailbox::<i64>();
        let pipe = LocalPipe::new(AgentId::from("b"), tx);
        for stamp in 1..=3 {
            pipe.push(Message::new(AgentId::from("a"), Payload::Start, stamp)).unwrap();
        }
        for stamp in 1..=3 {
            assert_eq!(rx.recv().await.unwrap().nccc, stamp);
        }
    }

    #[test]
    fn test_closed_pipe_rejects_messages() {
        let (tx, rx) = mailbox::<i64>();
        let pipe = LocalPipe::new(AgentId::from("b"), tx);
        pipe.close();
        let err = pipe.push(Message::new(AgentId::from("a"), Payload::Finished, 0)).unwrap_err();
        assert_eq!(err, PipeError::Closed(AgentId::from("b")));

        let (tx, rx2) = mailbox::<i64>();
        drop(rx2);
        let dangling = LocalPipe::new(AgentId::from("c"), tx);
        assert!(dangling.push(Message::new(AgentId::from("a"), Payload::Start, 0)).is_err());
        drop(rx);
    }
}
