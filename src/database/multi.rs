//! Container format holding several tagged sub-databases in one buffer.
//!
//! ```text
//! repeated: i32 magic | u32 length | zero padding to 8-byte alignment | payload
//! i32 0 terminator
//! ```

use crate::error::{Result, StarTrackerError};
use crate::serialize::{ByteReader, ByteWriter};

pub const CATALOG_MAGIC: i32 = 0xF9A2_83BC_u32 as i32;
pub const PAIR_DISTANCE_MAGIC: i32 = 0x2536_F009;

const ALIGNMENT: usize = 8;

#[derive(Debug, Default)]
pub struct MultiDatabaseBuilder {
    w: ByteWriter,
}

impl MultiDatabaseBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sub-database. Magic zero is reserved for the terminator.
    pub fn add(&mut self, magic: i32, payload: &[u8]) -> Result<()> {
        if magic == 0 {
            return Err(StarTrackerError::degenerate("magic value 0 is reserved"));
        }
        let len = u32::try_from(payload.len())
            .map_err(|_| StarTrackerError::degenerate("sub-database exceeds 4 GiB"))?;
        self.w.put_i32(magic);
        self.w.put_u32(len);
        self.w.pad_to(ALIGNMENT);
        self.w.put_bytes(payload);
        Ok(())
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.w.put_i32(0);
        self.w.into_bytes()
    }
}

/// Parsed view over a container buffer; payloads borrow from it.
#[derive(Debug, Clone)]
pub struct MultiDatabase<'a> {
    entries: Vec<(i32, &'a [u8])>,
}

impl<'a> MultiDatabase<'a> {
    pub fn parse(bytes: &'a [u8]) -> Result<Self> {
        let mut r = ByteReader::new(bytes);
        let mut entries = Vec::new();
        loop {
            let magic = r.i32()?;
            if magic == 0 {
                break;
            }
            let len = r.u32()? as usize;
            r.skip_to_alignment(ALIGNMENT)?;
            let payload = r.take(len)?;
            entries.push((magic, payload));
        }
        Ok(Self { entries })
    }

    /// Payload of the first sub-database tagged `magic`.
    pub fn sub_database(&self, magic: i32) -> Option<&'a [u8]> {
        self.entries
            .iter()
            .find(|(m, _)| *m == magic)
            .map(|(_, payload)| *payload)
    }

    pub fn magics(&self) -> impl Iterator<Item = i32> + '_ {
        self.entries.iter().map(|(m, _)| *m)
    }
}
