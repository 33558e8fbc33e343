//! The three composable stream adapters of §4.1: a bounded view
//! ([`Substream`]), MSB-first bit buffering ([`BitStream`]), and raw-byte
//! mirroring for checksum-style fields ([`CaptureStream`]).

pub mod bitstream;
pub mod capture;
pub mod substream;

pub use bitstream::BitStream;
pub use capture::{CaptureBuf, CaptureStream};
pub use substream::Substream;
