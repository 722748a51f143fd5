//! Wire format of a proof frame.
//!
//! There is a single message shape, with no type byte and no handshake:
//!
//! ```text
//! u32 BE  root length | root (UTF-8)
//! u32 BE  proof length | proof (UTF-8)
//! u32 BE  loss as IEEE-754 bits
//! ```

use pouw_common::proof::Proof;
use std::{
    io::{self, Read},
    string::FromUtf8Error,
};
use thiserror::Error;

// Size of a length prefix and of the loss field
const U32_SIZE: usize = 4;

#[derive(Debug, Error)]
pub enum PacketError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("{field} is {size} bytes, maximum is {max}")]
    FieldTooLarge {
        field: &'static str,
        size: usize,
        max: usize,
    },

    #[error("{field} is not valid UTF-8: {source}")]
    InvalidUtf8 {
        field: &'static str,
        #[source]
        source: FromUtf8Error,
    },
}

/// Total size of the frame carrying this proof
pub fn frame_size(proof: &Proof) -> usize {
    U32_SIZE * 3 + proof.root.len() + proof.proof.len()
}

/// Encode a proof into a frame, refusing fields that peers would reject
pub fn encode_proof(proof: &Proof, max_field_size: usize) -> Result<Vec<u8>, PacketError> {
    let mut buffer = Vec::with_capacity(frame_size(proof));
    write_string(&mut buffer, "root", &proof.root, max_field_size)?;
    write_string(&mut buffer, "proof", &proof.proof, max_field_size)?;
    buffer.extend_from_slice(&proof.loss.to_bits().to_be_bytes());
    Ok(buffer)
}

/// Read one frame, returning the proof and the number of bytes consumed
pub fn read_proof<R: Read>(
    reader: &mut R,
    max_field_size: usize,
) -> Result<(Proof, usize), PacketError> {
    let root = read_string(reader, "root", max_field_size)?;
    let proof = read_string(reader, "proof", max_field_size)?;
    let loss = f32::from_bits(read_u32(reader)?);

    let proof = Proof::new(root, proof, loss);
    let size = frame_size(&proof);
    Ok((proof, size))
}

fn write_string(
    buffer: &mut Vec<u8>,
    field: &'static str,
    value: &str,
    max: usize,
) -> Result<(), PacketError> {
    if value.len() > max {
        return Err(PacketError::FieldTooLarge {
            field,
            size: value.len(),
            max,
        });
    }

    buffer.extend_from_slice(&(value.len() as u32).to_be_bytes());
    buffer.extend_from_slice(value.as_bytes());
    Ok(())
}

fn read_u32<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut bytes = [0u8; U32_SIZE];
    reader.read_exact(&mut bytes)?;
    Ok(u32::from_be_bytes(bytes))
}

fn read_string<R: Read>(
    reader: &mut R,
    field: &'static str,
    max: usize,
) -> Result<String, PacketError> {
    let size = read_u32(reader)? as usize;
    if size > max {
        return Err(PacketError::FieldTooLarge { field, size, max });
    }

    let mut bytes = vec![0u8; size];
    reader.read_exact(&mut bytes)?;
    String::from_utf8(bytes).map_err(|source| PacketError::InvalidUtf8 { field, source })
}
