pub mod bitfield;
pub mod message;
pub mod piece;
pub mod request;

pub use bitfield::Bitfield;
pub use message::{Message, MessageError, MessageId};
pub use piece::{PieceBlock, PieceBlockError};
pub use request::Request;
