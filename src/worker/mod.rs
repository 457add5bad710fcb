//! The solver worker and the host's handle to it.
//!
//! - [`protocol`]: request/response records with correlation ids.
//! - [`SolverClient`]: the host side; resolves each awaited request by id.
//! - [`SolverWorker`]: the worker side; a sequential state machine.
//! - transports: [`spawn_thread`], [`spawn_process`], [`serve_stdio`].

mod client;
pub mod protocol;
mod service;
mod transport;

pub use client::SolverClient;
pub use protocol::{Kind, Request, RequestFrame, Response, WorkerMessage};
pub use service::SolverWorker;
pub use transport::{serve_lines, serve_stdio, spawn_process, spawn_thread, WorkerChannels};
