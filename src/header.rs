//! Fixed-layout ZIP records.
//!
//! Every record here is a little-endian, fixed-width prefix of a variable
//! sized structure (the variable tail being the entry name). Encoders return
//! fixed byte arrays so the writer can hand them to the sink in one append;
//! decoders exist for the trailing structures a consumer locates by offset.

use crate::errors::{Error, ErrorKind};

pub(crate) const LOCAL_FILE_HEADER_SIGNATURE: u32 = 0x04034b50;
pub(crate) const DATA_DESCRIPTOR_SIGNATURE: u32 = 0x08074b50;
pub(crate) const CENTRAL_HEADER_SIGNATURE: u32 = 0x02014b50;
pub(crate) const END_OF_CENTRAL_DIR_SIGNATURE: u32 = 0x06054b50;

/// Version needed to extract: 2.0, plain deflate and folder support.
pub(crate) const VERSION_NEEDED: u16 = 20;

/// General purpose bit 3: sizes and CRC deferred to a data descriptor.
pub(crate) const FLAG_DATA_DESCRIPTOR: u16 = 0x08;
/// General purpose bit 11: the entry name is UTF-8 encoded (EFS).
pub(crate) const FLAG_UTF8_ENCODING: u16 = 0x800;

/// How an entry's body bytes are stored in the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    /// Body bytes are the entry content, byte for byte.
    Stored,
    /// Body bytes are a raw deflate stream produced by the caller.
    Deflated,
}

impl CompressionMethod {
    pub(crate) fn as_id(self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflated => 8,
        }
    }
}

/// Computes the general purpose flag contribution of an entry name.
///
/// Bit 11 is set if and only if the name contains a byte outside the 7-bit
/// ASCII range, signaling UTF-8 rather than the legacy code page.
pub(crate) fn name_flags(name: &str) -> u16 {
    if name.bytes().any(|b| b >= 0x80) {
        FLAG_UTF8_ENCODING
    } else {
        0
    }
}

#[inline(always)]
fn le_u16(d: &[u8]) -> u16 {
    u16::from_le_bytes([d[0], d[1]])
}

#[inline(always)]
fn le_u32(d: &[u8]) -> u32 {
    u32::from_le_bytes([d[0], d[1], d[2], d[3]])
}

/// The fixed portion of a local file header; the entry name follows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZipLocalFileHeaderFixed {
    pub signature: u32,
    pub version_needed: u16,
    pub flags: u16,
    pub compression_method: u16,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub file_name_len: u16,
    pub extra_field_len: u16,
}

impl ZipLocalFileHeaderFixed {
    pub const SIZE: usize = 30;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.signature.to_le_bytes());
        buf[4..6].copy_from_slice(&self.version_needed.to_le_bytes());
        buf[6..8].copy_from_slice(&self.flags.to_le_bytes());
        buf[8..10].copy_from_slice(&self.compression_method.to_le_bytes());
        buf[10..12].copy_from_slice(&self.last_mod_time.to_le_bytes());
        buf[12..14].copy_from_slice(&self.last_mod_date.to_le_bytes());
        buf[14..18].copy_from_slice(&self.crc32.to_le_bytes());
        buf[18..22].copy_from_slice(&self.compressed_size.to_le_bytes());
        buf[22..26].copy_from_slice(&self.uncompressed_size.to_le_bytes());
        buf[26..28].copy_from_slice(&self.file_name_len.to_le_bytes());
        buf[28..30].copy_from_slice(&self.extra_field_len.to_le_bytes());
        buf
    }

    pub fn parse(data: &[u8]) -> Result<ZipLocalFileHeaderFixed, Error> {
        if data.len() < Self::SIZE {
            return Err(Error::invalid_input("local file header truncated"));
        }

        let result = ZipLocalFileHeaderFixed {
            signature: le_u32(&data[0..4]),
            version_needed: le_u16(&data[4..6]),
            flags: le_u16(&data[6..8]),
            compression_method: le_u16(&data[8..10]),
            last_mod_time: le_u16(&data[10..12]),
            last_mod_date: le_u16(&data[12..14]),
            crc32: le_u32(&data[14..18]),
            compressed_size: le_u32(&data[18..22]),
            uncompressed_size: le_u32(&data[22..26]),
            file_name_len: le_u16(&data[26..28]),
            extra_field_len: le_u16(&data[28..30]),
        };

        if result.signature != LOCAL_FILE_HEADER_SIGNATURE {
            return Err(Error::from(ErrorKind::InvalidInput {
                msg: format!(
                    "invalid local file header signature: 0x{:08x}",
                    result.signature
                ),
            }));
        }

        Ok(result)
    }
}

/// Data descriptor: trails the body when sizes were deferred at entry open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataDescriptor {
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
}

impl DataDescriptor {
    pub const SIZE: usize = 16;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&DATA_DESCRIPTOR_SIGNATURE.to_le_bytes());
        buf[4..8].copy_from_slice(&self.crc32.to_le_bytes());
        buf[8..12].copy_from_slice(&self.compressed_size.to_le_bytes());
        buf[12..16].copy_from_slice(&self.uncompressed_size.to_le_bytes());
        buf
    }

    pub fn parse(data: &[u8]) -> Result<DataDescriptor, Error> {
        if data.len() < Self::SIZE {
            return Err(Error::invalid_input("data descriptor truncated"));
        }

        if le_u32(&data[0..4]) != DATA_DESCRIPTOR_SIGNATURE {
            return Err(Error::invalid_input("invalid data descriptor signature"));
        }

        Ok(DataDescriptor {
            crc32: le_u32(&data[4..8]),
            compressed_size: le_u32(&data[8..12]),
            uncompressed_size: le_u32(&data[12..16]),
        })
    }
}

/// The fixed portion of a central directory file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZipCentralFileHeaderFixed {
    pub signature: u32,
    pub version_made_by: u16,
    pub version_needed: u16,
    pub flags: u16,
    pub compression_method: u16,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub file_name_len: u16,
    pub extra_field_len: u16,
    pub file_comment_len: u16,
    pub disk_number_start: u16,
    pub internal_file_attrs: u16,
    pub external_file_attrs: u32,
    pub local_header_offset: u32,
}

impl ZipCentralFileHeaderFixed {
    pub const SIZE: usize = 46;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.signature.to_le_bytes());
        buf[4..6].copy_from_slice(&self.version_made_by.to_le_bytes());
        buf[6..8].copy_from_slice(&self.version_needed.to_le_bytes());
        buf[8..10].copy_from_slice(&self.flags.to_le_bytes());
        buf[10..12].copy_from_slice(&self.compression_method.to_le_bytes());
        buf[12..14].copy_from_slice(&self.last_mod_time.to_le_bytes());
        buf[14..16].copy_from_slice(&self.last_mod_date.to_le_bytes());
        buf[16..20].copy_from_slice(&self.crc32.to_le_bytes());
        buf[20..24].copy_from_slice(&self.compressed_size.to_le_bytes());
        buf[24..28].copy_from_slice(&self.uncompressed_size.to_le_bytes());
        buf[28..30].copy_from_slice(&self.file_name_len.to_le_bytes());
        buf[30..32].copy_from_slice(&self.extra_field_len.to_le_bytes());
        buf[32..34].copy_from_slice(&self.file_comment_len.to_le_bytes());
        buf[34..36].copy_from_slice(&self.disk_number_start.to_le_bytes());
        buf[36..38].copy_from_slice(&self.internal_file_attrs.to_le_bytes());
        buf[38..42].copy_from_slice(&self.external_file_attrs.to_le_bytes());
        buf[42..46].copy_from_slice(&self.local_header_offset.to_le_bytes());
        buf
    }

    pub fn parse(data: &[u8]) -> Result<ZipCentralFileHeaderFixed, Error> {
        if data.len() < Self::SIZE {
            return Err(Error::invalid_input("central directory header truncated"));
        }

        let result = ZipCentralFileHeaderFixed {
            signature: le_u32(&data[0..4]),
            version_made_by: le_u16(&data[4..6]),
            version_needed: le_u16(&data[6..8]),
            flags: le_u16(&data[8..10]),
            compression_method: le_u16(&data[10..12]),
            last_mod_time: le_u16(&data[12..14]),
            last_mod_date: le_u16(&data[14..16]),
            crc32: le_u32(&data[16..20]),
            compressed_size: le_u32(&data[20..24]),
            uncompressed_size: le_u32(&data[24..28]),
            file_name_len: le_u16(&data[28..30]),
            extra_field_len: le_u16(&data[30..32]),
            file_comment_len: le_u16(&data[32..34]),
            disk_number_start: le_u16(&data[34..36]),
            internal_file_attrs: le_u16(&data[36..38]),
            external_file_attrs: le_u32(&data[38..42]),
            local_header_offset: le_u32(&data[42..46]),
        };

        if result.signature != CENTRAL_HEADER_SIGNATURE {
            return Err(Error::from(ErrorKind::InvalidInput {
                msg: format!(
                    "invalid central directory header signature: 0x{:08x}",
                    result.signature
                ),
            }));
        }

        Ok(result)
    }
}

/// End of central directory record. Always the final bytes of the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndOfCentralDirectoryFixed {
    pub signature: u32,
    pub disk_number: u16,
    pub central_directory_disk: u16,
    pub entries_on_disk: u16,
    pub total_entries: u16,
    pub central_directory_size: u32,
    pub central_directory_offset: u32,
    pub comment_len: u16,
}

impl EndOfCentralDirectoryFixed {
    pub const SIZE: usize = 22;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.signature.to_le_bytes());
        buf[4..6].copy_from_slice(&self.disk_number.to_le_bytes());
        buf[6..8].copy_from_slice(&self.central_directory_disk.to_le_bytes());
        buf[8..10].copy_from_slice(&self.entries_on_disk.to_le_bytes());
        buf[10..12].copy_from_slice(&self.total_entries.to_le_bytes());
        buf[12..16].copy_from_slice(&self.central_directory_size.to_le_bytes());
        buf[16..20].copy_from_slice(&self.central_directory_offset.to_le_bytes());
        buf[20..22].copy_from_slice(&self.comment_len.to_le_bytes());
        buf
    }

    pub fn parse(data: &[u8]) -> Result<EndOfCentralDirectoryFixed, Error> {
        if data.len() < Self::SIZE {
            return Err(Error::invalid_input(
                "end of central directory record truncated",
            ));
        }

        let result = EndOfCentralDirectoryFixed {
            signature: le_u32(&data[0..4]),
            disk_number: le_u16(&data[4..6]),
            central_directory_disk: le_u16(&data[6..8]),
            entries_on_disk: le_u16(&data[8..10]),
            total_entries: le_u16(&data[10..12]),
            central_directory_size: le_u32(&data[12..16]),
            central_directory_offset: le_u32(&data[16..20]),
            comment_len: le_u16(&data[20..22]),
        };

        if result.signature != END_OF_CENTRAL_DIR_SIGNATURE {
            return Err(Error::from(ErrorKind::InvalidInput {
                msg: format!(
                    "invalid end of central directory signature: 0x{:08x}",
                    result.signature
                ),
            }));
        }

        Ok(result)
    }
}
