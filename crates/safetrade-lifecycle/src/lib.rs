//! # safetrade-lifecycle: Transition Execution
//!
//! Turns the pure state machines of `safetrade-state` into committed,
//! concurrency-safe writes:
//!
//! - [`repository`]: the storage trait with its compare-and-swap write
//!   path, plus an in-memory implementation.
//! - [`executor`]: load, validate, apply, swap, notify.
//! - [`notify`]: transition events and the non-blocking dispatcher.
//! - [`codes`]: transaction codes, payment references, invoice numbers.
//! - [`service`]: the operations exposed over HTTP, including the
//!   dispute/transaction composites.

pub mod codes;
pub mod executor;
pub mod notify;
pub mod repository;
pub mod service;

pub use executor::TransitionExecutor;
pub use notify::{
    LoggingNotifier, NotificationDispatcher, Notifier, NotifyError, RecordingNotifier,
    TransitionEvent,
};
pub use repository::{MemoryRepository, Repository, RepositoryError};
pub use service::{LifecycleSettings, Repositories, SafeTradeService};
