// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Per-Agent Message Queue
//!
//! Every agent owns exactly one [`Queue`]: an unbounded FIFO mailbox drained
//! by a dedicated tokio task. The worker is the single serialization point
//! for the agent's protocol state; policies run on it one message at a time.
//!
//! ## Dispatch
//!
//! Incoming policies are registered for message types. A message of type
//! `UTIL` reaches the policies registered for `UTIL`, `DPOP` and `ANY`, in
//! registration order, each at most once. Dispatch iterates over a snapshot
//! of the registry, so a policy may register further policies while handling
//! a message; they see the next message.
//!
//! ## Sending
//!
//! | Call | Route |
//! |------|-------|
//! | [`QueueHandle::send`] | outgoing policies, then the recipient's pipe |
//! | [`QueueHandle::send_to_self`] | outgoing policies, then the own mailbox |
//! | [`QueueHandle::send_to_multi`] | outgoing policies once, then every pipe |
//!
//! Any outgoing policy answering [`Decision::Discard`] drops the message.
//! Surviving messages carry the sender's NCCC clock; the receiver merges it
//! into its own clock before dispatch.

use crate::domain::addable::Addable;
use crate::domain::message::{Message, MessageType, Payload};
use crate::domain::problem::NcccClock;
use crate::domain::variable::AgentId;
use crate::infrastructure::pipe::{mailbox, LocalPipe, MailboxReceiver, MailboxSender, OutgoingPipe, PipeError};
use crate::infrastructure::stats::MessageStats;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn, Instrument};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Agent '{agent}' has no pipe to '{recipient}'")]
    UnknownRecipient { agent: AgentId, recipient: AgentId },

    #[error(transparent)]
    Pipe(#[from] PipeError),

    #[error("Queue of agent '{0}' has ended")]
    Ended(AgentId),
}

/// Vote of an outgoing policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Discard,
    DontCare,
}

/// Handler for received messages, run on the queue's worker.
pub trait IncomingMessagePolicy<U>: Send {
    fn notify_in(&mut self, message: &Message<U>, queue: &QueueHandle<U>);
}

/// Observer of sent messages, able to veto them.
pub trait OutgoingMessagePolicy<U>: Send {
    fn notify_out(&mut self, message: &Message<U>) -> Decision;
}

pub type SharedIncoming<U> = Arc<Mutex<dyn IncomingMessagePolicy<U>>>;
pub type SharedOutgoing<U> = Arc<Mutex<dyn OutgoingMessagePolicy<U>>>;

struct Shared<U> {
    agent: AgentId,
    mailbox: MailboxSender<U>,
    incoming: RwLock<Vec<(&'static str, SharedIncoming<U>)>>,
    outgoing: RwLock<Vec<(&'static str, SharedOutgoing<U>)>>,
    pipes: RwLock<HashMap<AgentId, Arc<dyn OutgoingPipe<U>>>>,
    stats: RwLock<Option<Arc<MessageStats>>>,
    nccc: NcccClock,
    ended: AtomicBool,
}

/// Cloneable access to a queue: registration and sending.
pub struct QueueHandle<U>(Arc<Shared<U>>);

impl<U> Clone for QueueHandle<U> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

/// Policies of `registry` matching the lineage of `kind`, deduplicated, in
/// registration order.
fn matching<P: ?Sized>(registry: &RwLock<Vec<(&'static str, Arc<Mutex<P>>)>>, kind: &'static MessageType) -> Vec<Arc<Mutex<P>>> {
    let snapshot = registry.read().clone();
    let mut selected: Vec<Arc<Mutex<P>>> = Vec::new();
    for (name, policy) in snapshot {
        if !kind.lineage().any(|t| t.name() == name) {
            continue;
        }
        if selected.iter().any(|p| std::ptr::addr_eq(Arc::as_ptr(p), Arc::as_ptr(&policy))) {
            continue;
        }
        selected.push(policy);
    }
    selected
}

impl<U: Addable> QueueHandle<U> {
    pub fn agent(&self) -> &AgentId {
        &self.0.agent
    }

    pub fn nccc(&self) -> &NcccClock {
        &self.0.nccc
    }

    pub fn is_ended(&self) -> bool {
        self.0.ended.load(Ordering::SeqCst)
    }

    /// A pipe other queues use to reach this one.
    pub fn local_pipe(&self) -> LocalPipe<U> {
        LocalPipe::new(self.0.agent.clone(), self.0.mailbox.clone())
    }

    pub fn add_output_pipe(&self, recipient: AgentId, pipe: Arc<dyn OutgoingPipe<U>>) {
        self.0.pipes.write().insert(recipient, pipe);
    }

    pub fn has_pipe(&self, recipient: &AgentId) -> bool {
        self.0.pipes.read().contains_key(recipient)
    }

    pub fn add_incoming_policy(&self, types: &[&'static MessageType], policy: SharedIncoming<U>) {
        let mut registry = self.0.incoming.write();
        for kind in types {
            registry.push((kind.name(), Arc::clone(&policy)));
        }
    }

    pub fn add_outgoing_policy(&self, types: &[&'static MessageType], policy: SharedOutgoing<U>) {
        let mut registry = self.0.outgoing.write();
        for kind in types {
            registry.push((kind.name(), Arc::clone(&policy)));
        }
    }

    pub fn set_stats(&self, stats: Option<Arc<MessageStats>>) {
        *self.0.stats.write() = stats;
    }

    /// Send `payload` to the queue of `to`.
    pub fn send(&self, to: &AgentId, payload: Payload<U>) -> Result<(), QueueError> {
        let Some(message) = self.admit(payload)? else {
            return Ok(());
        };
        self.deliver(to, message)
    }

    /// Enqueue `payload` into this queue's own mailbox.
    pub fn send_to_self(&self, payload: Payload<U>) -> Result<(), QueueError> {
        let Some(message) = self.admit(payload)? else {
            return Ok(());
        };
        self.enqueue_local(message)
    }

    /// Same payload to every recipient, checked by the outgoing policies once.
    pub fn send_to_multi<'a, I>(&self, recipients: I, payload: Payload<U>) -> Result<(), QueueError>
    where
        I: IntoIterator<Item = &'a AgentId>,
    {
        let Some(message) = self.admit(payload)? else {
            return Ok(());
        };
        for recipient in recipients {
            self.deliver(recipient, message.clone())?;
        }
        Ok(())
    }

    /// Stamp the payload and run the outgoing policies. `None` if vetoed.
    fn admit(&self, payload: Payload<U>) -> Result<Option<Message<U>>, QueueError> {
        if self.is_ended() {
            return Err(QueueError::Ended(self.0.agent.clone()));
        }
        let message = Message::new(self.0.agent.clone(), payload, self.0.nccc.get());
        let mut discard = false;
        for policy in matching(&self.0.outgoing, message.kind()) {
            if policy.lock().notify_out(&message) == Decision::Discard {
                discard = true;
            }
        }
        if discard {
            trace!(agent = %self.0.agent, kind = %message.kind(), "Outgoing message discarded by policy");
            return Ok(None);
        }
        Ok(Some(message))
    }

    fn deliver(&self, to: &AgentId, message: Message<U>) -> Result<(), QueueError> {
        // Messages between variables of the same agent never leave the process.
        if *to == self.0.agent {
            return self.enqueue_local(message);
        }
        let pipe = self
            .0
            .pipes
            .read()
            .get(to)
            .cloned()
            .ok_or_else(|| QueueError::UnknownRecipient {
                agent: self.0.agent.clone(),
                recipient: to.clone(),
            })?;
        if let Some(stats) = self.0.stats.read().as_ref() {
            stats.record(&self.0.agent, to, &message.payload);
        }
        pipe.push(message)?;
        Ok(())
    }

    fn enqueue_local(&self, message: Message<U>) -> Result<(), QueueError> {
        self.0
            .mailbox
            .send(message)
            .map_err(|_| QueueError::Ended(self.0.agent.clone()))
    }

    fn dispatch(&self, message: &Message<U>) {
        let policies = matching(&self.0.incoming, message.kind());
        if policies.is_empty() {
            debug!(agent = %self.0.agent, kind = %message.kind(), "No policy registered for message");
        }
        for policy in policies {
            policy.lock().notify_in(message, self);
        }
    }

    fn close_pipes(&self) {
        let pipes: Vec<_> = self.0.pipes.write().drain().map(|(_, pipe)| pipe).collect();
        for pipe in pipes {
            pipe.close();
        }
    }
}

/// Outgoing policy logging every message at trace level.
#[derive(Debug, Default)]
pub struct TraceOutgoing;

impl<U: Addable> OutgoingMessagePolicy<U> for TraceOutgoing {
    fn notify_out(&mut self, message: &Message<U>) -> Decision {
        trace!(
            sender = %message.sender,
            kind = %message.kind(),
            nccc = message.nccc,
            payload = ?message.payload,
            "Sending message"
        );
        Decision::DontCare
    }
}

/// An agent's mailbox and worker.
pub struct Queue<U> {
    handle: QueueHandle<U>,
    mailbox: Option<MailboxReceiver<U>>,
    worker: Option<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl<U: Addable> Queue<U> {
    pub fn new(agent: AgentId, nccc: NcccClock, stats: Option<Arc<MessageStats>>) -> Self {
        let (sender, receiver) = mailbox();
        let shared = Shared {
            agent,
            mailbox: sender,
            incoming: RwLock::new(Vec::new()),
            outgoing: RwLock::new(Vec::new()),
            pipes: RwLock::new(HashMap::new()),
            stats: RwLock::new(stats),
            nccc,
            ended: AtomicBool::new(false),
        };
        Self {
            handle: QueueHandle(Arc::new(shared)),
            mailbox: Some(receiver),
            worker: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn handle(&self) -> &QueueHandle<U> {
        &self.handle
    }

    pub fn agent(&self) -> &AgentId {
        self.handle.agent()
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Spawn the worker. Must be called within a tokio runtime; calling it
    /// twice has no effect.
    pub fn start(&mut self) {
        let Some(mut mailbox) = self.mailbox.take() else {
            warn!(agent = %self.handle.agent(), "Queue already started");
            return;
        };
        let handle = self.handle.clone();
        let cancel = self.cancel.clone();
        let span = tracing::info_span!("agent", agent = %handle.agent());

        self.worker = Some(tokio::spawn(
            async move {
                debug!("Queue worker started");
                loop {
                    let message = tokio::select! {
                        _ = cancel.cancelled() => break,
                        received = mailbox.recv() => match received {
                            Some(message) => message,
                            None => break,
                        },
                    };
                    handle.nccc().observe(message.nccc);
                    let finished = matches!(message.payload, Payload::Finished);
                    handle.dispatch(&message);
                    if finished {
                        debug!("FINISHED received, stopping worker");
                        break;
                    }
                }
                debug!("Queue worker stopped");
            }
            .instrument(span),
        ));
    }

    /// Wait for the worker to stop on its own (after `FINISHED`).
    pub async fn join(&mut self) {
        if let Some(worker) = self.worker.as_mut() {
            if let Err(e) = worker.await {
                if e.is_panic() {
                    warn!(agent = %self.handle.agent(), "Queue worker panicked");
                }
            }
            self.worker = None;
        }
    }

    /// Hard stop: interrupt the worker, close every pipe and release the
    /// stats monitor. Unprocessed messages are discarded.
    pub fn end(&mut self) {
        self.handle.0.ended.store(true, Ordering::SeqCst);
        self.cancel.cancel();
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
        self.handle.close_pipes();
        self.handle.set_stats(None);
        debug!(agent = %self.handle.agent(), "Queue ended");
    }
}

impl<U> Drop for Queue<U> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
