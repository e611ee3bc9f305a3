//! Transparent decompression of input files.
//!
//! Gzip input is recognised by its magic bytes rather than the file
//! extension. Multi-member gzip files (concatenated streams) are read to the
//! end.

use std::io::{BufRead, BufReader, Read};

use flate2::read::MultiGzDecoder;

use immostat_types::error::Result;

use crate::vfs::VirtualFileSystem;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Wrap `reader` in a gzip decoder if its first bytes are the gzip magic.
pub fn decompress_if_gzip(reader: Box<dyn Read + Send>) -> Result<Box<dyn Read + Send>> {
    let mut buffered = BufReader::new(reader);
    let is_gzip = buffered.fill_buf()?.starts_with(&GZIP_MAGIC);
    if is_gzip {
        Ok(Box::new(MultiGzDecoder::new(buffered)))
    } else {
        Ok(Box::new(buffered))
    }
}

/// Open `path` on `fs`, decompressing it when it is gzip.
pub fn open_input(fs: &dyn VirtualFileSystem, path: &str) -> Result<Box<dyn Read + Send>> {
    decompress_if_gzip(fs.open_read(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    use flate2::write::GzEncoder;
    use flate2::Compression;

    fn gzip(bytes: &[u8]) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(bytes).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn test_plain_passthrough() {
        let mut out = String::new();
        decompress_if_gzip(Box::new(Cursor::new(b"a,b\n1,2\n".to_vec())))
            .unwrap()
            .read_to_string(&mut out)
            .unwrap();
        assert_eq!(out, "a,b\n1,2\n");
    }

    #[test]
    fn test_gzip_detected() {
        let mut out = String::new();
        decompress_if_gzip(Box::new(Cursor::new(gzip(b"a,b\n1,2\n"))))
            .unwrap()
            .read_to_string(&mut out)
            .unwrap();
        assert_eq!(out, "a,b\n1,2\n");
    }

    #[test]
    fn test_multi_member_gzip() {
        let mut data = gzip(b"a,b\n");
        data.extend(gzip(b"1,2\n"));
        let mut out = String::new();
        decompress_if_gzip(Box::new(Cursor::new(data)))
            .unwrap()
            .read_to_string(&mut out)
            .unwrap();
        assert_eq!(out, "a,b\n1,2\n");
    }

    #[test]
    fn test_truncated_gzip_fails_on_read() {
        let data = gzip(b"date_mutation,valeur_fonciere\n2023-01-01,100000\n");
        let truncated = data[..data.len() / 2].to_vec();
        let mut out = String::new();
        let result = decompress_if_gzip(Box::new(Cursor::new(truncated)))
            .unwrap()
            .read_to_string(&mut out);
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_input() {
        let mut out = String::new();
        decompress_if_gzip(Box::new(Cursor::new(Vec::new())))
            .unwrap()
            .read_to_string(&mut out)
            .unwrap();
        assert!(out.is_empty());
    }
}
