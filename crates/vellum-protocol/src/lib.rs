//! Wire format shared by the composition client and the remote compositor.
//!
//! - [`command`]: packet layouts, opcodes and little-endian decode helpers.
//! - [`writer`]: a batch builder that frames fixed and variable-size packets.

#![forbid(unsafe_code)]

pub mod command;
pub mod writer;

pub use command::{CmdOpcode, DecodeError, ResourceHandle, ResourceType};
pub use writer::CommandWriter;
