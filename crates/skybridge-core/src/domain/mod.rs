//! Domain entities for SkyBridge.
//!
//! This module contains pure business logic with no infrastructure
//! dependencies: no sockets, no file system, no OS capture APIs.  Everything
//! here can be compiled and unit-tested on any platform without setup.
//!
//! # Sub-modules
//!
//! - **`peer`** – The discovered-device model: [`peer::PeerDevice`] and the
//!   [`peer::TransportHint`] set that drives negotiation ordering.
//!
//! - **`capability`** – Maps raw device names/models to a platform
//!   classification and the transports that platform is known to speak.
//!
//! - **`transport`** – The closed [`transport::Transport`] sum type that
//!   negotiation produces, plus the cloud [`transport::AccountEndpoint`].
//!
//! - **`quality`** – Per-medium link-quality estimation producing
//!   [`quality::LinkQuality`] records.
//!
//! - **`display`** – The tiered resolution/frame-rate menu and the mode
//!   selection rule that clamps it to the device's real screen.
//!
//! - **`adaptive`** – The frame-rate/compression controller and the bitrate
//!   recommendation rule fed by per-second connection statistics.

pub mod adaptive;
pub mod capability;
pub mod display;
pub mod peer;
pub mod quality;
pub mod transport;
