//! Audio data types and device I/O.
//!
//! - [`frame`] - the fixed-size PCM frame and its wire codec
//! - [`capture`] - cpal input device -> outgoing frame payloads
//! - [`sink`] - the [`sink::AudioSink`] seam and the cpal output device

pub mod capture;
pub mod frame;
pub mod sink;

pub use frame::Frame;
pub use sink::{AudioSink, CpalSink};
