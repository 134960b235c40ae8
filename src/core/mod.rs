//! # Core Wire Components
//!
//! Low-level packet handling, framing, and pooled buffer management.
//!
//! This module provides the foundation for the wire protocol: the packet
//! format, the incremental frame codec, and the size-classed buffer pool
//! that backs packet bodies.
//!
//! ## Components
//! - **Packet**: Binary message with typed append/read cursor operations
//! - **Codec**: Incremental framer tolerating arbitrarily fragmented reads
//! - **Pool**: Size-classed buffer reuse to avoid per-packet allocation
//!
//! ## Wire Format
//! ```text
//! [MessageId(2, LE)] [BodyLength(4, LE)] [Body(N)]
//! ```
//!
//! ## Security
//! - Body length validated against the configured maximum before allocation
//! - Message ids below the control threshold never reach application code

pub mod codec;
pub mod packet;
pub mod pool;
