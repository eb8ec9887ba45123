//! Answer-To-Reset storage

use std::{fmt, ops::Deref};

use heapless::Vec;

use crate::{
    constants::MAX_ATR_SIZE,
    error::{Error, Result},
};

/// ATR bytes, never longer than [`MAX_ATR_SIZE`]
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Atr(Vec<u8, MAX_ATR_SIZE>);

impl Atr {
    /// Copy an ATR out of a byte slice
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Vec::from_slice(bytes).map(Self).map_err(|_| Error::InsufficientBuffer {
            required: bytes.len(),
            available: MAX_ATR_SIZE,
        })
    }

    /// ATR bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Copy the ATR into a caller buffer, returning the number of bytes written
    ///
    /// Nothing is written when the buffer is too small.
    pub fn copy_to(&self, buffer: &mut [u8]) -> Result<usize> {
        let len = self.0.len();
        if len > buffer.len() {
            return Err(Error::InsufficientBuffer {
                required: len,
                available: buffer.len(),
            });
        }
        buffer[..len].copy_from_slice(&self.0);
        Ok(len)
    }
}

impl Deref for Atr {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for Atr {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Atr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Atr({})", hex::encode(&self.0))
    }
}

impl fmt::Display for Atr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode_upper(&self.0))
    }
}
