//! Wire protocol for depot.
//!
//! A connection carries one JSON request document and receives zero or more
//! response parts: a plain-text acknowledgement, a JSON document, or the raw
//! bytes of a repository archive. [`DepotCodec`] handles message boundaries.

pub mod codec;
pub mod error;
pub mod message;

pub use codec::{DepotCodec, Framing, MAX_FRAME_SIZE};
pub use error::{ProtocolError, ProtocolResult};
pub use message::{
    actions, decode_content, is_ack, ErrorDocument, RepositoryList, Request, Response, ACK_TEXT,
    CONTENT_ENGINE, MAX_MESSAGE_SIZE,
};
