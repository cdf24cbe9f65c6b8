use pipezip::{
    ArchiveWriter, EndOfCentralDirectoryFixed, ErrorKind, ZipCentralFileHeaderFixed,
    ZipLocalFileHeaderFixed,
};


/// One entry recovered from a finished archive by walking its central
/// directory, the way a compliant reader would.
pub struct ParsedEntry {
    pub name: String,
    pub central: ZipCentralFileHeaderFixed,
    pub local: ZipLocalFileHeaderFixed,
    pub body: Vec<u8>,
}

pub fn parse_archive(data: &[u8]) -> (EndOfCentralDirectoryFixed, Vec<ParsedEntry>) {
    assert!(data.len() >= EndOfCentralDirectoryFixed::SIZE);
    let eocd_start = data.len() - EndOfCentralDirectoryFixed::SIZE;
    let eocd = EndOfCentralDirectoryFixed::parse(&data[eocd_start..]).unwrap();
    assert_eq!(eocd.comment_len, 0);
    assert_eq!(
        eocd.central_directory_offset as usize + eocd.central_directory_size as usize,
        eocd_start,
        "central directory must end where the end record begins"
    );

    let mut pos = eocd.central_directory_offset as usize;
    let mut entries = Vec::new();
    for _ in 0..eocd.total_entries {
        let central = ZipCentralFileHeaderFixed::parse(&data[pos..]).unwrap();
        pos += ZipCentralFileHeaderFixed::SIZE;
        let name =
            std::str::from_utf8(&data[pos..pos + central.file_name_len as usize]).unwrap();
        pos += central.file_name_len as usize
            + central.extra_field_len as usize
            + central.file_comment_len as usize;

        let local_start = central.local_header_offset as usize;
        let local = ZipLocalFileHeaderFixed::parse(&data[local_start..]).unwrap();
        let body_start = local_start
            + ZipLocalFileHeaderFixed::SIZE
            + local.file_name_len as usize
            + local.extra_field_len as usize;
        let body = data[body_start..body_start + central.compressed_size as usize].to_vec();

        entries.push(ParsedEntry {
            name: name.to_string(),
            central,
            local,
            body,
        });
    }
    (eocd, entries)
}

#[test]
fn stored_entry_positions_are_exact() {
    let mut out = Vec::new();
    let mut archive = ArchiveWriter::new(&mut out).unwrap();

    // Header overhead for an 8-byte name is 30 + 8.
    let offset = archive.open_stored_entry("file.jpg", 182_919, 0).unwrap();
    assert_eq!(offset, 38);

    let position = archive.append_body(&vec![0u8; 8912]).unwrap();
    assert_eq!(position, 8950);
    assert_eq!(archive.position(), 8950);
}

#[test]
fn stored_size_mismatch_is_fatal() {
    let mut out = Vec::new();
    let mut archive = ArchiveWriter::new(&mut out).unwrap();
    archive.open_stored_entry("file", 123, 0).unwrap();
    archive.append_body(b"ab").unwrap();

    let err = archive.close_current_entry().unwrap_err();
    assert!(matches!(
        err.kind(),
        ErrorKind::EntryBodySizeMismatch {
            expected: 123,
            actual: 2
        }
    ));
    assert_eq!(
        err.to_string(),
        "Wrong number of bytes written for entry (expected 123, got 2)"
    );
}

#[test]
fn compressed_size_mismatch_is_fatal() {
    let mut out = Vec::new();
    let mut archive = ArchiveWriter::new(&mut out).unwrap();
    archive.open_compressed_entry("file", 500, 123, 0).unwrap();
    archive.append_body(b"ab").unwrap();

    let err = archive.close_current_entry().unwrap_err();
    assert!(matches!(
        err.kind(),
        ErrorKind::EntryBodySizeMismatch {
            expected: 123,
            actual: 2
        }
    ));
}

#[test]
fn close_is_idempotent() {
    let mut out = Vec::new();
    let mut archive = ArchiveWriter::new(&mut out).unwrap();
    let body = b"payload";
    archive
        .open_stored_entry("a.txt", body.len() as u64, pipezip::crc32(body))
        .unwrap();
    archive.append_body(body).unwrap();
    archive.close_current_entry().unwrap();
    let finalized_at = archive.finalize().unwrap();

    let first = archive.close().unwrap();
    let second = archive.close().unwrap();
    assert_eq!(first, finalized_at);
    assert_eq!(first, second);
    drop(archive);
    assert_eq!(out.len() as u64, finalized_at);
}

#[test]
fn two_stored_entries_end_to_end() {
    let body_a = b"first entry body".to_vec();
    let body_b = vec![42u8; 1024];

    let mut out = Vec::new();
    let mut archive = ArchiveWriter::new(&mut out).unwrap();

    archive
        .open_stored_entry("a.txt", body_a.len() as u64, pipezip::crc32(&body_a))
        .unwrap();
    // Chunking is the caller's choice.
    archive.append_body(&body_a[..5]).unwrap();
    archive.append_body(&body_a[5..]).unwrap();
    archive.close_current_entry().unwrap();

    archive
        .open_stored_entry("b/c.bin", body_b.len() as u64, pipezip::crc32(&body_b))
        .unwrap();
    archive.append_body(&body_b).unwrap();
    archive.close_current_entry().unwrap();

    let total = archive.finalize().unwrap();
    archive.close().unwrap();
    drop(archive);

    // Total length is recomputable from the recorded metadata alone.
    let expected_total = (30 + "a.txt".len() + body_a.len())
        + (30 + "b/c.bin".len() + body_b.len())
        + (46 + "a.txt".len())
        + (46 + "b/c.bin".len())
        + 22;
    assert_eq!(total, expected_total as u64);
    assert_eq!(out.len() as u64, total);

    let (eocd, entries) = parse_archive(&out);
    assert_eq!(eocd.total_entries, 2);
    assert_eq!(eocd.entries_on_disk, 2);
    assert_eq!(eocd.disk_number, 0);

    // Directory order is write order.
    assert_eq!(entries[0].name, "a.txt");
    assert_eq!(entries[1].name, "b/c.bin");

    assert_eq!(entries[0].central.local_header_offset, 0);
    assert_eq!(
        entries[1].central.local_header_offset as usize,
        30 + "a.txt".len() + body_a.len()
    );

    for (entry, body) in entries.iter().zip([&body_a, &body_b]) {
        assert_eq!(entry.central.compression_method, 0);
        assert_eq!(entry.central.crc32, pipezip::crc32(body));
        assert_eq!(entry.central.compressed_size as usize, body.len());
        assert_eq!(entry.central.uncompressed_size as usize, body.len());
        assert_eq!(&entry.body, body);
        // Local header agrees with the directory.
        assert_eq!(entry.local.crc32, entry.central.crc32);
        assert_eq!(entry.local.compressed_size, entry.central.compressed_size);
        assert_eq!(entry.local.flags, entry.central.flags);
    }
}

#[test]
fn deflated_entry_round_trips() {
    use std::io::Read;

    let raw: Vec<u8> = (0..=255u8).cycle().take(20_000).collect();

    let mut compressed = Vec::new();
    let summary = pipezip::deflate_in_blocks(&raw[..], &mut compressed, 4096).unwrap();
    assert_eq!(summary.compressed_size as usize, compressed.len());

    let mut out = Vec::new();
    let mut archive = ArchiveWriter::new(&mut out).unwrap();
    archive
        .open_compressed_entry(
            "data.bin",
            summary.uncompressed_size,
            summary.compressed_size,
            summary.crc32,
        )
        .unwrap();
    // Stream with chunk boundaries unrelated to the compression block size.
    for chunk in compressed.chunks(777) {
        archive.append_body(chunk).unwrap();
    }
    archive.close_current_entry().unwrap();
    archive.finalize().unwrap();
    archive.close().unwrap();
    drop(archive);

    let (_, entries) = parse_archive(&out);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].central.compression_method, 8);
    assert_eq!(entries[0].central.uncompressed_size as usize, raw.len());

    let mut decoder = flate2::read::DeflateDecoder::new(&entries[0].body[..]);
    let mut recovered = Vec::new();
    decoder.read_to_end(&mut recovered).unwrap();
    assert_eq!(recovered, raw);
    assert_eq!(pipezip::crc32(&recovered), entries[0].central.crc32);
}

#[test]
fn streaming_entry_emits_data_descriptor() {
    let mut out = Vec::new();
    let mut archive = ArchiveWriter::new(&mut out).unwrap();
    archive.open_streaming_entry("stream.log").unwrap();
    archive.append_body(b"first line\n").unwrap();
    archive.append_body(b"second line\n").unwrap();
    archive.close_current_entry().unwrap();
    archive.finalize().unwrap();
    drop(archive);

    let body = b"first line\nsecond line\n";
    let (_, entries) = parse_archive(&out);
    let entry = &entries[0];

    // Sizes were deferred: local header holds zeros with bit 3 set.
    assert_ne!(entry.local.flags & 0x08, 0);
    assert_eq!(entry.local.crc32, 0);
    assert_eq!(entry.local.compressed_size, 0);
    assert_eq!(entry.local.uncompressed_size, 0);

    // The directory carries the observed values.
    assert_eq!(entry.central.uncompressed_size as usize, body.len());
    assert_eq!(entry.central.crc32, pipezip::crc32(body));
    assert_eq!(&entry.body, body);

    // The descriptor trails the body with the same values.
    let descriptor_start = entry.central.local_header_offset as usize
        + ZipLocalFileHeaderFixed::SIZE
        + entry.local.file_name_len as usize
        + body.len();
    let descriptor =
        pipezip::DataDescriptor::parse(&out[descriptor_start..descriptor_start + 16]).unwrap();
    assert_eq!(descriptor.crc32, pipezip::crc32(body));
    assert_eq!(descriptor.compressed_size as usize, body.len());
    assert_eq!(descriptor.uncompressed_size as usize, body.len());
}

#[test]
fn empty_archive_is_just_an_end_record() {
    let mut out = Vec::new();
    let mut archive = ArchiveWriter::new(&mut out).unwrap();
    let total = archive.finalize().unwrap();
    archive.close().unwrap();
    drop(archive);

    assert_eq!(total, EndOfCentralDirectoryFixed::SIZE as u64);
    let (eocd, entries) = parse_archive(&out);
    assert_eq!(eocd.total_entries, 0);
    assert_eq!(eocd.central_directory_size, 0);
    assert!(entries.is_empty());
}

#[test]
fn abandoned_archive_has_no_directory() {
    let mut out = Vec::new();
    {
        let mut archive = ArchiveWriter::new(&mut out).unwrap();
        archive.open_stored_entry("partial.bin", 100, 0).unwrap();
        archive.append_body(b"only some bytes").unwrap();
        // Dropped mid-entry: the sink keeps what was written, nothing more.
    }
    assert_eq!(out.len(), 30 + "partial.bin".len() + b"only some bytes".len());
    assert!(EndOfCentralDirectoryFixed::parse(&out[out.len() - 22..]).is_err());
}
