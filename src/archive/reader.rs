//! Random-access reader for addressed archives.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use parking_lot::RwLock;
use tracing::{debug, warn};

use super::format::*;
use crate::util::{Error, Result};

/// Backing bytes of an open archive.
/// Supports both memory-mapped and buffered I/O modes.
enum Backing {
    /// Memory-mapped file (preferred)
    Mmap(Mmap),
    /// Seek-and-read under a lock (fallback)
    File(RwLock<File>),
}

/// An open addressed archive.
///
/// Reading a record is `&self` and safe from several threads at once.
pub struct AddressedReader {
    backing: Backing,
    path: PathBuf,
    size: u64,
    signature: u32,
    count: u32,
    extended: bool,
}

impl AddressedReader {
    /// Open an archive, memory-mapping it when the `mmap` feature is on.
    pub fn open(path: impl AsRef<Path>, expected_signature: u32, extended: bool) -> Result<Self> {
        Self::open_opts(path, expected_signature, extended, cfg!(feature = "mmap"))
    }

    /// Open an archive with optional memory mapping.
    ///
    /// Fails with [`Error::SignatureMismatch`] unless the stored signature equals
    /// `expected_signature`, and with [`Error::UnexpectedEof`] if the address
    /// table runs past the end of the file.
    pub fn open_opts(
        path: impl AsRef<Path>,
        expected_signature: u32,
        extended: bool,
        use_mmap: bool,
    ) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::FileNotFound(path.to_path_buf())
            } else {
                Error::Io(e)
            }
        })?;

        let size = file.metadata()?.len();
        let header_len = header_size(extended);
        if size < header_len {
            return Err(Error::UnexpectedEof(size));
        }

        let backing = if use_mmap {
            // Safety: the file is opened read-only; compiles never write in place
            Backing::Mmap(unsafe { Mmap::map(&file) }?)
        } else {
            Backing::File(RwLock::new(file))
        };

        let mut reader = Self {
            backing,
            path: path.to_path_buf(),
            size,
            signature: 0,
            count: 0,
            extended,
        };

        reader.signature = reader.read_u32(0)?;
        if reader.signature != expected_signature {
            return Err(Error::SignatureMismatch {
                expected: expected_signature,
                actual: reader.signature,
            });
        }

        reader.count = if extended {
            reader.read_u32(SIGNATURE_SIZE)?
        } else {
            u32::from(reader.read_u16(SIGNATURE_SIZE)?)
        };

        let table_end = header_len + u64::from(reader.count) * ADDRESS_SIZE;
        if table_end > size {
            return Err(Error::UnexpectedEof(table_end));
        }

        debug!(
            path = %path.display(),
            count = reader.count,
            extended,
            "opened addressed archive"
        );
        Ok(reader)
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn signature(&self) -> u32 {
        self.signature
    }

    /// Number of records (the last valid id).
    #[inline]
    pub fn count(&self) -> u32 {
        self.count
    }

    #[inline]
    pub fn is_extended(&self) -> bool {
        self.extended
    }

    /// Get the total file size.
    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Address of a record; 0 means empty.
    pub fn address(&self, id: u32) -> Result<u32> {
        if id == 0 || id > self.count {
            return Err(Error::IndexOutOfRange { id, count: self.count });
        }
        self.read_u32(address_slot(id, self.extended))
    }

    /// Read the payload of record `id` (1-based). `None` for an empty record.
    ///
    /// Id 0 is the canonical empty record and is never looked up.
    pub fn read_record(&self, id: u32) -> Result<Option<Vec<u8>>> {
        if id == 0 {
            return Ok(None);
        }
        let address = u64::from(self.address(id)?);
        if address == 0 {
            return Ok(None);
        }
        if address + RECORD_PREFIX_SIZE > self.size {
            warn!(id, address, size = self.size, "record address past end of archive");
            return Err(Error::UnexpectedEof(address + RECORD_PREFIX_SIZE));
        }

        // The colour key is informational and not validated.
        let len = self.read_u16(address + COLOR_KEY.len() as u64)? as usize;
        Ok(Some(self.read_bytes(address + RECORD_PREFIX_SIZE, len)?))
    }

    /// Read bytes at a specific position.
    pub fn read_bytes(&self, pos: u64, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_into(pos, &mut buf)?;
        Ok(buf)
    }

    /// Read bytes into an existing buffer.
    pub fn read_into(&self, pos: u64, buf: &mut [u8]) -> Result<()> {
        let end = pos + buf.len() as u64;
        if end > self.size {
            return Err(Error::UnexpectedEof(end));
        }

        match &self.backing {
            Backing::Mmap(mmap) => {
                buf.copy_from_slice(&mmap[pos as usize..end as usize]);
                Ok(())
            }
            Backing::File(file) => {
                let mut f = file.write();
                f.seek(SeekFrom::Start(pos))?;
                f.read_exact(buf).map_err(|e| Error::from_read(e, pos))
            }
        }
    }

    /// Read a u32 value at the given position.
    pub fn read_u32(&self, pos: u64) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_into(pos, &mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    /// Read a u16 value at the given position.
    pub fn read_u16(&self, pos: u64) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.read_into(pos, &mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }
}

impl std::fmt::Debug for AddressedReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddressedReader")
            .field("path", &self.path)
            .field("signature", &format_args!("0x{:08X}", self.signature))
            .field("count", &self.count)
            .field("extended", &self.extended)
            .finish()
    }
}
