//! gannet-core: endpoint-dispatch core of a TChannel-style RPC layer.
//!
//! This crate maps inbound wire calls to registered application
//! handlers. The framing/socket layer hands the dispatcher a [`Request`]
//! whose first argument stream is still unread; the dispatcher drains it
//! to obtain the endpoint name, resolves a handler, negotiates the
//! argument scheme, reserves a [`Response`] with the [`Connection`], and
//! invokes the handler. Success flushes the response; an explicit
//! invalid-endpoint signal or an uncaught fault becomes the matching
//! wire error frame.
//!
//! # Quick start
//!
//! ```ignore
//! use std::sync::Arc;
//! use gannet_core::{HandlerRegistry, RequestDispatcher};
//!
//! let mut registry = HandlerRegistry::default();
//! registry.register("echo", |request, response, _proxy| async move {
//!     let payload = request.arg(2).expect("arg3 present");
//!     while let Some(chunk) = payload.read().await {
//!         response.write(chunk);
//!     }
//!     Ok(())
//! });
//!
//! let dispatcher = RequestDispatcher::new(registry, channel, events);
//! let response = dispatcher.handle_call(request, connection).await?;
//! ```
//!
//! # Concurrency model
//!
//! Dispatch for one connection is single-task: the phases of
//! [`RequestDispatcher::handle_call`] are sequential suspension points,
//! never concurrent with themselves. Running dispatch for one connection
//! from multiple tasks requires a [`Connection`] implementation with its
//! own mutual exclusion around the reservation table.

mod channel;
mod connection;
mod dispatch;
mod error;
mod event;
mod promise;
mod proxy;
mod registry;
mod request;
mod response;
mod scheme;
mod trace;

pub use channel::*;
pub use connection::*;
pub use dispatch::*;
pub use error::*;
pub use event::*;
pub use promise::*;
pub use proxy::*;
pub use registry::*;
pub use request::*;
pub use response::*;
pub use scheme::*;
pub use trace::*;
