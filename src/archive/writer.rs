//! Sequential writer for addressed archives.
//!
//! The header and a zeroed address table are written up front; records are
//! appended in id order and their addresses patched into the table by
//! [`AddressedWriter::finish`].

use std::io::{BufWriter, Seek, SeekFrom, Write};

use byteorder::{LittleEndian, WriteBytesExt};

use super::format::*;
use crate::util::{Error, Result};

/// Output stream that tracks its own position.
pub struct AddressedWriter<W: Write + Seek> {
    writer: BufWriter<W>,
    pos: u64,
    extended: bool,
    count: u32,
    addresses: Vec<u32>,
}

impl<W: Write + Seek> AddressedWriter<W> {
    /// Start an archive holding exactly `count` records.
    pub fn new(inner: W, signature: u32, count: u32, extended: bool) -> Result<Self> {
        if count > max_count(extended) {
            return Err(Error::CapacityExceeded {
                what: "record count",
                limit: u64::from(max_count(extended)),
            });
        }

        let mut out = Self {
            writer: BufWriter::with_capacity(1024 * 1024, inner),
            pos: 0,
            extended,
            count,
            addresses: Vec::with_capacity(count as usize),
        };

        out.writer.write_u32::<LittleEndian>(signature)?;
        if extended {
            out.writer.write_u32::<LittleEndian>(count)?;
        } else {
            out.writer.write_u16::<LittleEndian>(count as u16)?;
        }
        out.pos = header_size(extended);

        let table = vec![0u8; count as usize * ADDRESS_SIZE as usize];
        out.write_bytes(&table)?;
        Ok(out)
    }

    /// Get the current write position.
    #[inline]
    pub fn pos(&self) -> u64 {
        self.pos
    }

    /// Records written so far.
    #[inline]
    pub fn written(&self) -> u32 {
        self.addresses.len() as u32
    }

    /// Append the next record, or an empty slot for `None`. Returns its id.
    pub fn write_record(&mut self, payload: Option<&[u8]>) -> Result<u32> {
        match payload {
            Some(bytes) => self.write_raw(bytes),
            None => self.write_empty(),
        }
    }

    /// Append the next record with the given payload. Returns its id.
    pub fn write_raw(&mut self, payload: &[u8]) -> Result<u32> {
        self.check_room()?;
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(Error::CapacityExceeded {
                what: "record payload size",
                limit: MAX_PAYLOAD_SIZE as u64,
            });
        }
        let address = u32::try_from(self.pos).map_err(|_| Error::CapacityExceeded {
            what: "archive size",
            limit: u64::from(u32::MAX),
        })?;

        self.write_bytes(&COLOR_KEY)?;
        self.writer.write_u16::<LittleEndian>(payload.len() as u16)?;
        self.pos += 2;
        self.write_bytes(payload)?;

        self.addresses.push(address);
        Ok(self.written())
    }

    /// Append an empty record (address 0). Returns its id.
    pub fn write_empty(&mut self) -> Result<u32> {
        self.check_room()?;
        self.addresses.push(0);
        Ok(self.written())
    }

    /// Patch the address table and hand back the underlying stream.
    ///
    /// Fails unless exactly `count` records were written.
    pub fn finish(mut self) -> Result<W> {
        if self.written() != self.count {
            return Err(Error::invalid(format!(
                "archive declares {} records but {} were written",
                self.count,
                self.written()
            )));
        }

        let end = self.pos;
        self.writer.flush()?;
        self.writer.seek(SeekFrom::Start(header_size(self.extended)))?;
        for address in &self.addresses {
            self.writer.write_u32::<LittleEndian>(*address)?;
        }
        self.writer.flush()?;
        self.writer.seek(SeekFrom::Start(end))?;

        self.writer
            .into_inner()
            .map_err(|e| Error::Io(e.into_error()))
    }

    fn check_room(&self) -> Result<()> {
        if self.written() >= self.count {
            return Err(Error::CapacityExceeded {
                what: "records beyond declared count",
                limit: u64::from(self.count),
            });
        }
        Ok(())
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data)?;
        self.pos += data.len() as u64;
        Ok(())
    }
}
