//! Content sniffing for uploaded files.
//!
//! Uploads are classified from their leading bytes, never from the declared
//! file name or `Content-Type`.

use std::io::{self, Read, Seek, SeekFrom};
use thiserror::Error;

/// Number of leading bytes inspected when sniffing.
pub const SNIFF_LEN: u64 = 512;

/// The only content type accepted for uploads.
pub const ALLOWED_CONTENT_TYPE: &str = "image/png";

const OCTET_STREAM: &str = "application/octet-stream";
const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

#[derive(Error, Debug)]
pub enum FileTypeError {
    #[error("failed to read the file header")]
    HeaderUnreadable(#[source] io::Error),

    #[error("file does not support seeking")]
    NotSeekable,

    #[error("failed to reset the file position")]
    ResetFailed(#[source] io::Error),

    #[error("only PNG files are allowed, detected {detected}")]
    InvalidType { detected: &'static str },
}

/// Signatures checked in order; the first prefix match wins.
const SIGNATURES: &[(&[u8], &str)] = &[
    (b"\x89PNG\r\n\x1a\n", "image/png"),
    (b"\xff\xd8\xff", "image/jpeg"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"\x00\x00\x01\x00", "image/x-icon"),
    (b"\x00\x00\x02\x00", "image/x-icon"),
    (b"BM", "image/bmp"),
    (b"%PDF-", "application/pdf"),
    (b"PK\x03\x04", "application/zip"),
    (b"\x1f\x8b\x08", "application/x-gzip"),
];

/// Classify `header` by its magic bytes.
pub fn sniff_content_type(header: &[u8]) -> &'static str {
    if let Some((_, content_type)) = SIGNATURES
        .iter()
        .find(|(signature, _)| header.starts_with(signature))
    {
        return *content_type;
    }

    // RIFF container: "RIFF" <size:4> "WEBPVP"
    if header.len() >= 14 && header.starts_with(b"RIFF") && header[8..14] == *b"WEBPVP" {
        return "image/webp";
    }

    if !header.is_empty() && !header.iter().any(|b| is_binary_byte(*b)) {
        return TEXT_PLAIN;
    }

    OCTET_STREAM
}

fn is_binary_byte(b: u8) -> bool {
    matches!(b, 0x00..=0x08 | 0x0b | 0x0e..=0x1a | 0x1c..=0x1f)
}

/// Check that `file` holds a PNG image and rewind it to the start.
///
/// Up to [`SNIFF_LEN`] bytes are read. The position is back at 0 whenever the
/// header could be read and the stream rewound, including when the type is
/// rejected.
pub fn validate_file_type<R: Read + Seek>(file: &mut R) -> Result<(), FileTypeError> {
    let mut header = Vec::with_capacity(SNIFF_LEN as usize);
    (&mut *file)
        .take(SNIFF_LEN)
        .read_to_end(&mut header)
        .map_err(FileTypeError::HeaderUnreadable)?;

    if header.is_empty() {
        return Err(FileTypeError::HeaderUnreadable(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "file is empty",
        )));
    }

    file.seek(SeekFrom::Start(0)).map_err(|e| match e.kind() {
        io::ErrorKind::Unsupported => FileTypeError::NotSeekable,
        _ => FileTypeError::ResetFailed(e),
    })?;

    let detected = sniff_content_type(&header);
    if detected != ALLOWED_CONTENT_TYPE {
        return Err(FileTypeError::InvalidType { detected });
    }

    Ok(())
}
