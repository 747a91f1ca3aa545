//! Control plane and external control surface of the aural audio server.
//!
//! The [`ControlPlane`] aggregate owns every process-wide mutable piece:
//! device registry, observer bus, BT arena and policy, detectors, and the
//! main-thread handler table. The event loop ([`ControlPlane::run_iteration`])
//! is the single point where messages, timers, and alerts interleave, in
//! that order.
//!
//! The control surface ([`rpc`]) is transport agnostic: requests arrive as
//! typed [`rpc::ControlRequest`] values and replies leave as
//! [`rpc::ControlReply`]; signal fan-out mirrors the observer alerts through
//! [`signals::SignalSink`]. Wiring either onto a concrete message bus is a
//! transport crate's job.

pub mod cli;
pub mod config;
pub mod plane;
pub mod rpc;
pub mod signals;
pub mod state;
pub mod text;

pub use config::{SchedPolicy, ServerConfig};
pub use plane::ControlPlane;
pub use rpc::{ControlError, ControlReply, ControlRequest};
pub use signals::{Signal, SignalBridge, SignalSink};
pub use state::SystemState;
