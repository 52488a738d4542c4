//! Test data builders.

use lightbox_core::checksum::Checksum;

/// Boundary used by the multipart body builder.
pub const BOUNDARY: &str = "lightbox-test-boundary";

/// Render a PNG with a gradient so resizing has something to chew on.
pub fn test_png(width: u32, height: u32) -> Vec<u8> {
    use image::{ImageBuffer, Rgb};

    let img = ImageBuffer::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x * y) % 256) as u8])
    });
    let mut bytes = Vec::new();
    img.write_to(
        &mut std::io::Cursor::new(&mut bytes),
        image::ImageFormat::Png,
    )
    .unwrap();
    bytes
}

/// Lowercase hex MD5 of a byte slice.
pub fn md5_hex(data: &[u8]) -> String {
    Checksum::compute(data).to_hex()
}

/// Split bytes into equally sized chunks (the last one may be shorter).
pub fn split_chunks(data: &[u8], chunk_size: usize) -> Vec<Vec<u8>> {
    data.chunks(chunk_size).map(|c| c.to_vec()).collect()
}

/// Fields of a chunk upload form.
pub struct ChunkFormFields<'a> {
    pub upload_id: &'a str,
    pub chunk_index: u32,
    pub total_chunks: u32,
    pub chunk_checksum: &'a str,
    pub chunk: &'a [u8],
    pub file_name: Option<&'a str>,
    pub mime_type: Option<&'a str>,
}

/// Build a multipart/form-data body for POST /upload/chunk.
pub fn multipart_chunk_body(fields: &ChunkFormFields<'_>) -> Vec<u8> {
    let mut body = Vec::new();

    let mut text_field = |name: &str, value: &str| {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
        );
        body.extend_from_slice(value.as_bytes());
        body.extend_from_slice(b"\r\n");
    };

    text_field("upload_id", fields.upload_id);
    text_field("chunk_index", &fields.chunk_index.to_string());
    text_field("total_chunks", &fields.total_chunks.to_string());
    text_field("chunk_checksum", fields.chunk_checksum);
    if let Some(file_name) = fields.file_name {
        text_field("file_name", file_name);
        text_field("file_size", &fields.chunk.len().to_string());
    }
    if let Some(mime_type) = fields.mime_type {
        text_field("mime_type", mime_type);
    }

    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        b"Content-Disposition: form-data; name=\"chunk\"; filename=\"chunk.bin\"\r\n",
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(fields.chunk);
    body.extend_from_slice(b"\r\n");
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    body
}
