// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod pipe;
pub mod queue;
pub mod stats;
pub mod opt_store;

pub use opt_store::{build_store, InMemoryOptTableStore, OnDiskOptTableStore, OptTableStore, StoreError};
pub use pipe::{mailbox, LocalPipe, MailboxReceiver, MailboxSender, OutgoingPipe, PipeError};
pub use queue::{
    Decision, IncomingMessagePolicy, OutgoingMessagePolicy, Queue, QueueError, QueueHandle, SharedIncoming,
    SharedOutgoing, TraceOutgoing,
};
pub use stats::{MessageStats, PairStats, StatsSnapshot, TypeStats};
