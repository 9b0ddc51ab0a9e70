//! Wire protocol: line framing and message parsing/rendering.

mod line;
mod message;

pub use line::LineFramer;
pub use message::{InboundLine, Message, Prefix};

/// Maximum line length accepted from a client, per RFC 2812 §2.3.
pub const MAX_LINE_LEN: usize = 512;
