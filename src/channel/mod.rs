//! # Channel Module
//!
//! Typed FIFO channels for communication between threads, supporting both
//! bounded buffering and zero-capacity rendezvous hand-off.
//!
//! ## Overview
//!
//! A [`Channel`] carries values of a single type between any number of
//! senders and receivers:
//!
//! - **Bounded mode** (`capacity > 0`): the channel buffers up to `capacity`
//!   values. `send` blocks while the buffer is full.
//! - **Rendezvous mode** (`capacity == 0`): every `send` synchronizes with a
//!   receiver. The sender does not return until the receiver has taken the
//!   value.
//!
//! Closing a channel wakes every blocked party. Senders fail from that point
//! on; receivers drain whatever is still buffered and then observe the close.
//!
//! ## Example
//!
//! ```rust
//! use girder::channel::Channel;
//! use std::sync::Arc;
//! use std::thread;
//!
//! let ch = Arc::new(Channel::bounded(4));
//! let tx = ch.clone();
//! let producer = thread::spawn(move || {
//!     for i in 0..8 {
//!         tx.send(i).unwrap();
//!     }
//!     tx.close();
//! });
//!
//! let mut seen = Vec::new();
//! while let Some(v) = ch.recv() {
//!     seen.push(v);
//! }
//! producer.join().unwrap();
//! assert_eq!(seen, (0..8).collect::<Vec<_>>());
//! ```

mod core;

pub use core::{Channel, SendError, TryRecvError, TrySendError};
