//! Dedicated OS thread per shard.
//!
//! The worker thread owns its [`QueueConsumer`]; callers talk to it through
//! a command channel and block on a per-request reply channel. Because only
//! the worker thread ever touches the allocator, allocations on one shard are
//! serialized without any locking in the pipeline itself.

use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

use crate::consumer::{BatchResult, QueueConsumer};
use crate::degradation::DegradationState;
use crate::error::AllocError;
use crate::event::EventPayload;
use crate::queue::{EventQueue, InMemoryEventQueue};

enum Command {
    Enqueue(EventPayload, Sender<Result<(), AllocError>>),
    ProcessBatch(usize, Sender<Result<BatchResult, AllocError>>),
    Drain(Sender<Result<BatchResult, AllocError>>),
    Degradation(Sender<DegradationState>),
    Shutdown,
}

pub struct ShardWorker<Q: EventQueue + 'static = InMemoryEventQueue> {
    shard: String,
    commands: Sender<Command>,
    handle: Option<JoinHandle<QueueConsumer<Q>>>,
}

impl<Q: EventQueue + 'static> ShardWorker<Q> {
    /// Move `consumer` onto a thread named `agora-shard-<shard>`.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::WorkerSpawn`] if the OS refuses the thread.
    pub fn spawn(shard: impl Into<String>, consumer: QueueConsumer<Q>) -> Result<Self, AllocError> {
        let shard = shard.into();
        let (commands, inbox) = mpsc::channel();
        let name = format!("agora-shard-{shard}");
        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || run(consumer, &inbox))
            .map_err(|err| AllocError::WorkerSpawn(err.to_string()))?;
        info!(%shard, "shard worker started");
        Ok(Self {
            shard,
            commands,
            handle: Some(handle),
        })
    }

    #[must_use]
    pub fn shard(&self) -> &str {
        &self.shard
    }

    /// # Errors
    ///
    /// Returns [`AllocError::WorkerDisconnected`] if the thread has exited,
    /// or the queue's own error.
    pub fn enqueue(&self, event: EventPayload) -> Result<(), AllocError> {
        self.request(|reply| Command::Enqueue(event, reply))?
    }

    /// # Errors
    ///
    /// Returns [`AllocError::WorkerDisconnected`] if the thread has exited,
    /// or the batch's own error.
    pub fn process_batch(&self, max_events: usize) -> Result<BatchResult, AllocError> {
        self.request(|reply| Command::ProcessBatch(max_events, reply))?
    }

    /// # Errors
    ///
    /// Returns [`AllocError::WorkerDisconnected`] if the thread has exited,
    /// or the batch's own error.
    pub fn drain(&self) -> Result<BatchResult, AllocError> {
        self.request(Command::Drain)?
    }

    /// # Errors
    ///
    /// Returns [`AllocError::WorkerDisconnected`] if the thread has exited.
    pub fn degradation(&self) -> Result<DegradationState, AllocError> {
        self.request(Command::Degradation)
    }

    /// Stop the thread and hand back the consumer with its state intact.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::WorkerDisconnected`] if the thread panicked.
    pub fn shutdown(mut self) -> Result<QueueConsumer<Q>, AllocError> {
        let handle = self.handle.take().ok_or_else(|| self.disconnected())?;
        // A closed channel means the thread already left its loop.
        let _ = self.commands.send(Command::Shutdown);
        handle.join().map_err(|_| self.disconnected())
    }

    fn request<T>(&self, command: impl FnOnce(Sender<T>) -> Command) -> Result<T, AllocError> {
        let (reply, response) = mpsc::channel();
        self.commands
            .send(command(reply))
            .map_err(|_| self.disconnected())?;
        response.recv().map_err(|_| self.disconnected())
    }

    fn disconnected(&self) -> AllocError {
        AllocError::WorkerDisconnected {
            shard: self.shard.clone(),
        }
    }
}

impl<Q: EventQueue + 'static> Drop for ShardWorker<Q> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.commands.send(Command::Shutdown);
            if handle.join().is_err() {
                warn!(shard = %self.shard, "shard worker panicked");
            }
        }
    }
}

fn run<Q: EventQueue>(mut consumer: QueueConsumer<Q>, inbox: &Receiver<Command>) -> QueueConsumer<Q> {
    while let Ok(command) = inbox.recv() {
        match command {
            Command::Enqueue(event, reply) => {
                let _ = reply.send(consumer.enqueue(event));
            }
            Command::ProcessBatch(max_events, reply) => {
                let _ = reply.send(consumer.process_batch(max_events));
            }
            Command::Drain(reply) => {
                let _ = reply.send(consumer.drain());
            }
            Command::Degradation(reply) => {
                let _ = reply.send(consumer.allocator().degradation().state());
            }
            Command::Shutdown => break,
        }
    }
    debug!("shard worker loop exited");
    consumer
}
