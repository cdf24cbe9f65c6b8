use crate::errors::{Error, ErrorKind};
use crate::header::{
    name_flags, CompressionMethod, DataDescriptor, EndOfCentralDirectoryFixed,
    ZipCentralFileHeaderFixed, ZipLocalFileHeaderFixed, CENTRAL_HEADER_SIGNATURE,
    END_OF_CENTRAL_DIR_SIGNATURE, FLAG_DATA_DESCRIPTOR, LOCAL_FILE_HEADER_SIGNATURE,
    VERSION_NEEDED,
};
use crate::mode::{external_attributes, CREATOR_UNIX, DEFAULT_FILE_PERMISSIONS};
use crate::sink::ByteSink;
use crate::time::{DosDateTime, UtcDateTime};
use log::{debug, trace};

const U32_LIMIT: u64 = u32::MAX as u64;

/// Optional per-entry metadata.
///
/// ```rust
/// let options = pipezip::EntryOptions::new()
///     .last_modified(pipezip::time::UtcDateTime::from_unix(1_700_000_000))
///     .unix_permissions(0o755);
/// # let _ = options;
/// ```
#[derive(Debug, Clone, Default)]
pub struct EntryOptions {
    modification_time: Option<UtcDateTime>,
    unix_permissions: Option<u32>,
}

impl EntryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the entry's modification time. Without one, the DOS timestamp
    /// fields stay zero.
    pub fn last_modified(mut self, modification_time: UtcDateTime) -> Self {
        self.modification_time = Some(modification_time);
        self
    }

    /// Sets the entry's UNIX permission bits. Defaults to 0o644.
    pub fn unix_permissions(mut self, permissions: u32) -> Self {
        self.unix_permissions = Some(permissions);
        self
    }

    fn dos_parts(&self) -> (u16, u16) {
        self.modification_time
            .as_ref()
            .map(|dt| DosDateTime::from(dt).into_parts())
            .unwrap_or((0, 0))
    }

    fn permissions(&self) -> u32 {
        self.unix_permissions.unwrap_or(DEFAULT_FILE_PERMISSIONS)
    }
}

/// Running byte count and CRC accumulator for the entry being streamed.
#[derive(Debug)]
struct EntryAccounting {
    written: u64,
    crc: Option<crc32fast::Hasher>,
}

impl EntryAccounting {
    /// Accounting for an entry whose CRC the caller supplied at open.
    fn supplied() -> Self {
        EntryAccounting {
            written: 0,
            crc: None,
        }
    }

    /// Accounting that folds every streamed chunk into a CRC32 state.
    fn computing() -> Self {
        EntryAccounting {
            written: 0,
            crc: Some(crc32fast::Hasher::new()),
        }
    }

    fn update(&mut self, bytes: &[u8]) {
        self.written += bytes.len() as u64;
        if let Some(hasher) = self.crc.as_mut() {
            hasher.update(bytes);
        }
    }

    fn crc32(&self) -> u32 {
        self.crc
            .as_ref()
            .map(|hasher| hasher.clone().finalize())
            .unwrap_or(0)
    }
}

/// Declared sizes and checksum, fixed when a known-size entry is opened.
#[derive(Debug, Clone, Copy)]
struct DeclaredSizes {
    uncompressed: u64,
    compressed: u64,
    crc32: u32,
}

#[derive(Debug)]
struct OpenEntry {
    name: String,
    method: CompressionMethod,
    flags: u16,
    local_header_offset: u64,
    declared: Option<DeclaredSizes>,
    accounting: EntryAccounting,
    dos_time: u16,
    dos_date: u16,
    permissions: u32,
}

#[derive(Debug)]
struct CompletedEntry {
    name: String,
    method: CompressionMethod,
    flags: u16,
    local_header_offset: u64,
    compressed_size: u64,
    uncompressed_size: u64,
    crc32: u32,
    dos_time: u16,
    dos_date: u16,
    permissions: u32,
}

/// Streams a ZIP archive into a forward-only [`ByteSink`].
///
/// The writer never seeks: local file headers carry the sizes declared at
/// entry open (or defer them to a data descriptor), and the central
/// directory is assembled at [`finalize`](ArchiveWriter::finalize) from
/// metadata retained per completed entry.
///
/// ```rust
/// let mut out = Vec::new();
/// let mut archive = pipezip::ArchiveWriter::new(&mut out).unwrap();
/// let body = b"Hello, world!";
/// archive
///     .open_stored_entry("hello.txt", body.len() as u64, pipezip::crc32(body))
///     .unwrap();
/// archive.append_body(body).unwrap();
/// archive.close_current_entry().unwrap();
/// archive.finalize().unwrap();
/// archive.close().unwrap();
/// ```
#[derive(Debug)]
pub struct ArchiveWriter<S: ByteSink> {
    sink: S,
    position: u64,
    entries: Vec<CompletedEntry>,
    current: Option<OpenEntry>,
    finalized: bool,
    closed: bool,
}

impl<S: ByteSink> ArchiveWriter<S> {
    /// Creates a writer owning `sink` from its first byte.
    ///
    /// The sink's position query is probed once here; a destination that
    /// cannot answer it fails with [`ErrorKind::InvalidOutput`] before any
    /// bytes are written.
    pub fn new(sink: S) -> Result<Self, Error> {
        if sink.position().is_err() {
            return Err(Error::from(ErrorKind::InvalidOutput));
        }

        Ok(ArchiveWriter {
            sink,
            position: 0,
            entries: Vec::new(),
            current: None,
            finalized: false,
            closed: false,
        })
    }

    /// The number of bytes this writer has handed to the sink so far.
    ///
    /// This ledger is authoritative; the sink's own position is never
    /// consulted after construction.
    pub fn position(&self) -> u64 {
        self.position
    }

    fn emit(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.sink.append(bytes).map_err(Error::io)?;
        self.position += bytes.len() as u64;
        Ok(())
    }

    fn ensure_idle(&self) -> Result<(), Error> {
        if self.closed {
            return Err(Error::invalid_state("writer is closed"));
        }
        if self.finalized {
            return Err(Error::invalid_state("archive is finalized"));
        }
        if self.current.is_some() {
            return Err(Error::invalid_state("an entry is already open"));
        }
        Ok(())
    }

    /// Opens an entry stored without compression. `declared_size` and
    /// `crc32` describe the body the caller will stream; returns the ledger
    /// position after the local header.
    pub fn open_stored_entry(
        &mut self,
        name: &str,
        declared_size: u64,
        crc32: u32,
    ) -> Result<u64, Error> {
        self.open_stored_entry_with_options(name, declared_size, crc32, &EntryOptions::default())
    }

    pub fn open_stored_entry_with_options(
        &mut self,
        name: &str,
        declared_size: u64,
        crc32: u32,
        options: &EntryOptions,
    ) -> Result<u64, Error> {
        let declared = DeclaredSizes {
            uncompressed: declared_size,
            compressed: declared_size,
            crc32,
        };
        self.open_entry(name, CompressionMethod::Stored, Some(declared), options)
    }

    /// Opens a deflated entry whose body the caller has already compressed.
    /// The writer performs no compression of its own; `compressed_size` is
    /// the byte count the caller will stream.
    pub fn open_compressed_entry(
        &mut self,
        name: &str,
        uncompressed_size: u64,
        compressed_size: u64,
        crc32: u32,
    ) -> Result<u64, Error> {
        self.open_compressed_entry_with_options(
            name,
            uncompressed_size,
            compressed_size,
            crc32,
            &EntryOptions::default(),
        )
    }

    pub fn open_compressed_entry_with_options(
        &mut self,
        name: &str,
        uncompressed_size: u64,
        compressed_size: u64,
        crc32: u32,
        options: &EntryOptions,
    ) -> Result<u64, Error> {
        let declared = DeclaredSizes {
            uncompressed: uncompressed_size,
            compressed: compressed_size,
            crc32,
        };
        self.open_entry(name, CompressionMethod::Deflated, Some(declared), options)
    }

    /// Opens a stored entry whose size is unknown up front.
    ///
    /// The local header carries zero sizes with general purpose bit 3 set;
    /// the CRC and byte count observed while streaming are emitted in a data
    /// descriptor when the entry closes.
    pub fn open_streaming_entry(&mut self, name: &str) -> Result<u64, Error> {
        self.open_streaming_entry_with_options(name, &EntryOptions::default())
    }

    pub fn open_streaming_entry_with_options(
        &mut self,
        name: &str,
        options: &EntryOptions,
    ) -> Result<u64, Error> {
        self.open_entry(name, CompressionMethod::Stored, None, options)
    }

    fn open_entry(
        &mut self,
        name: &str,
        method: CompressionMethod,
        declared: Option<DeclaredSizes>,
        options: &EntryOptions,
    ) -> Result<u64, Error> {
        self.ensure_idle()?;

        if name.len() > u16::MAX as usize {
            return Err(Error::invalid_input("entry name too long"));
        }

        if let Some(declared) = &declared {
            if declared.uncompressed > U32_LIMIT || declared.compressed > U32_LIMIT {
                return Err(Error::invalid_input("entry size exceeds 32-bit limit"));
            }
        }

        let local_header_offset = self.position;
        if local_header_offset > U32_LIMIT {
            return Err(Error::invalid_input(
                "local header offset exceeds 32-bit limit",
            ));
        }

        let mut flags = name_flags(name);
        if declared.is_none() {
            flags |= FLAG_DATA_DESCRIPTOR;
        }

        let (dos_time, dos_date) = options.dos_parts();

        let header = ZipLocalFileHeaderFixed {
            signature: LOCAL_FILE_HEADER_SIGNATURE,
            version_needed: VERSION_NEEDED,
            flags,
            compression_method: method.as_id(),
            last_mod_time: dos_time,
            last_mod_date: dos_date,
            crc32: declared.map(|d| d.crc32).unwrap_or(0),
            compressed_size: declared.map(|d| d.compressed as u32).unwrap_or(0),
            uncompressed_size: declared.map(|d| d.uncompressed as u32).unwrap_or(0),
            file_name_len: name.len() as u16,
            extra_field_len: 0,
        };

        self.emit(&header.to_bytes())?;
        self.emit(name.as_bytes())?;

        let accounting = if declared.is_some() {
            EntryAccounting::supplied()
        } else {
            EntryAccounting::computing()
        };

        self.current = Some(OpenEntry {
            name: name.to_string(),
            method,
            flags,
            local_header_offset,
            declared,
            accounting,
            dos_time,
            dos_date,
            permissions: options.permissions(),
        });

        debug!(
            "opened {:?} entry {:?} at offset {}",
            method, name, local_header_offset
        );
        Ok(self.position)
    }

    /// Streams body bytes for the open entry. Chunk boundaries are the
    /// caller's choice; accounting is cumulative across calls.
    pub fn append_body(&mut self, bytes: &[u8]) -> Result<u64, Error> {
        if self.current.is_none() {
            return Err(Error::invalid_state("no entry is open"));
        }

        self.emit(bytes)?;
        if let Some(entry) = self.current.as_mut() {
            entry.accounting.update(bytes);
            trace!("appended {} bytes to {:?}", bytes.len(), entry.name);
        }
        Ok(self.position)
    }

    /// Validates the streamed body and freezes the entry into the central
    /// directory metadata.
    ///
    /// For known-size entries the accumulated byte count must equal the
    /// declared (compressed) size exactly; a mismatch fails the archive with
    /// [`ErrorKind::EntryBodySizeMismatch`]. Deferred-size entries instead
    /// record whatever was observed and emit a data descriptor.
    pub fn close_current_entry(&mut self) -> Result<u64, Error> {
        let entry = self
            .current
            .take()
            .ok_or_else(|| Error::invalid_state("no entry is open"))?;

        let (compressed_size, uncompressed_size, crc32) = match entry.declared {
            Some(declared) => {
                let actual = entry.accounting.written;
                if actual != declared.compressed {
                    return Err(Error::from(ErrorKind::EntryBodySizeMismatch {
                        expected: declared.compressed,
                        actual,
                    }));
                }
                (declared.compressed, declared.uncompressed, declared.crc32)
            }
            None => {
                let observed = entry.accounting.written;
                if observed > U32_LIMIT {
                    return Err(Error::invalid_input("entry size exceeds 32-bit limit"));
                }
                let crc32 = entry.accounting.crc32();
                let descriptor = DataDescriptor {
                    crc32,
                    compressed_size: observed as u32,
                    uncompressed_size: observed as u32,
                };
                self.emit(&descriptor.to_bytes())?;
                trace!("wrote data descriptor for {:?}", entry.name);
                (observed, observed, crc32)
            }
        };

        debug!(
            "closed entry {:?} ({} bytes compressed, {} uncompressed)",
            entry.name, compressed_size, uncompressed_size
        );

        self.entries.push(CompletedEntry {
            name: entry.name,
            method: entry.method,
            flags: entry.flags,
            local_header_offset: entry.local_header_offset,
            compressed_size,
            uncompressed_size,
            crc32,
            dos_time: entry.dos_time,
            dos_date: entry.dos_date,
            permissions: entry.permissions,
        });

        Ok(self.position)
    }

    /// Writes the central directory and end record, sealing the archive.
    ///
    /// Any still-open entry must have been closed by the caller first; this
    /// never closes one implicitly.
    pub fn finalize(&mut self) -> Result<u64, Error> {
        if self.closed {
            return Err(Error::invalid_state("writer is closed"));
        }
        if self.finalized {
            return Err(Error::invalid_state("archive is already finalized"));
        }
        if self.current.is_some() {
            return Err(Error::invalid_state("an entry is still open"));
        }

        let central_directory_offset = self.position;
        if central_directory_offset > U32_LIMIT {
            return Err(Error::invalid_input(
                "central directory offset exceeds 32-bit limit",
            ));
        }
        if self.entries.len() > u16::MAX as usize {
            return Err(Error::invalid_input("too many entries for one archive"));
        }

        let completed = std::mem::take(&mut self.entries);
        for entry in &completed {
            let header = ZipCentralFileHeaderFixed {
                signature: CENTRAL_HEADER_SIGNATURE,
                version_made_by: (CREATOR_UNIX << 8) | VERSION_NEEDED,
                version_needed: VERSION_NEEDED,
                flags: entry.flags,
                compression_method: entry.method.as_id(),
                last_mod_time: entry.dos_time,
                last_mod_date: entry.dos_date,
                crc32: entry.crc32,
                compressed_size: entry.compressed_size as u32,
                uncompressed_size: entry.uncompressed_size as u32,
                file_name_len: entry.name.len() as u16,
                extra_field_len: 0,
                file_comment_len: 0,
                disk_number_start: 0,
                internal_file_attrs: 0,
                external_file_attrs: external_attributes(entry.permissions),
                local_header_offset: entry.local_header_offset as u32,
            };
            self.emit(&header.to_bytes())?;
            self.emit(entry.name.as_bytes())?;
        }

        let central_directory_size = self.position - central_directory_offset;
        let total_entries = completed.len() as u16;
        self.entries = completed;

        let end_record = EndOfCentralDirectoryFixed {
            signature: END_OF_CENTRAL_DIR_SIGNATURE,
            disk_number: 0,
            central_directory_disk: 0,
            entries_on_disk: total_entries,
            total_entries,
            central_directory_size: central_directory_size as u32,
            central_directory_offset: central_directory_offset as u32,
            comment_len: 0,
        };
        self.emit(&end_record.to_bytes())?;

        self.finalized = true;
        debug!(
            "finalized archive: {} entries, central directory {} bytes at offset {}",
            total_entries, central_directory_size, central_directory_offset
        );
        Ok(self.position)
    }

    /// Releases the sink. Idempotent: repeat calls return the same position
    /// and write nothing.
    ///
    /// Closing does not finalize. A closed-but-unfinalized destination holds
    /// a truncated, directory-less archive, which is the defined outcome of
    /// abandoning an archive mid-write.
    pub fn close(&mut self) -> Result<u64, Error> {
        if !self.closed {
            self.sink.close().map_err(Error::io)?;
            self.closed = true;
        }
        Ok(self.position)
    }
}

impl<S: ByteSink> Drop for ArchiveWriter<S> {
    /// Releases the sink on every exit path. Close failures are swallowed
    /// here so an in-flight error keeps propagating unchanged; nothing is
    /// finalized on behalf of the caller.
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.sink.close();
        }
    }
}
