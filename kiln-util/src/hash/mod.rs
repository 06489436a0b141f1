//! Identifying elements of the output cache.

pub use self::{blake3::*, file::*};

use std::fmt;

mod blake3;
mod file;

/// Cryptographic hash used to name entries in the output cache.
///
/// # Examples
///
/// A hash can be computed using [`Blake3`].
/// Displaying a hash produces a lower-case hexadecimal string.
///
/// ```
/// use kiln_util::hash::Blake3;
/// let hash = Blake3::new().update(b"Hello, world!").finalize();
/// assert_eq!(hash.to_string(), "ede5c0b10f2ec4979c69b52f61e42ff5\
///                               b413519ce09be0f14d098dcfe5f6f98d");
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Hash(pub [u8; 32]);

impl fmt::Display for Hash
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Error returned when parsing a [`Hash`] from a hex string fails.
#[derive(Debug, thiserror::Error)]
#[error("Invalid hash string: {0:?}")]
pub struct ParseHashError(String);

impl std::str::FromStr for Hash
{
    type Err = ParseHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        let bytes = s.as_bytes();
        if bytes.len() != 64 {
            return Err(ParseHashError(s.to_owned()));
        }

        let mut out = [0u8; 32];
        for (i, chunk) in bytes.chunks_exact(2).enumerate() {
            let hi = hex_nibble(chunk[0]).ok_or_else(|| ParseHashError(s.to_owned()))?;
            let lo = hex_nibble(chunk[1]).ok_or_else(|| ParseHashError(s.to_owned()))?;
            out[i] = hi << 4 | lo;
        }

        Ok(Self(out))
    }
}

fn hex_nibble(c: u8) -> Option<u8>
{
    match c {
        b'0' ..= b'9' => Some(c - b'0'),
        b'a' ..= b'f' => Some(c - b'a' + 10),
        b'A' ..= b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn round_trip()
    {
        let hash = Blake3::new().update(b"round trip").finalize();
        let parsed: Hash = hash.to_string().parse().unwrap();
        assert_eq!(hash, parsed);
    }

    #[test]
    fn rejects_garbage()
    {
        assert!("not a hash".parse::<Hash>().is_err());
        assert!("".parse::<Hash>().is_err());
    }
}
