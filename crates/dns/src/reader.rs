use std::collections::HashSet;

use anyhow::{bail, ensure};

use crate::domain_name::DomainName;

/// Maximum encoded length of a domain name (RFC 1035 section 2.3.4).
const MAX_NAME_LEN: usize = 255;

/// A cursor over a DNS message buffer.
pub struct DnsMessageReader<'a> {
    buffer: &'a [u8],
    /// Position in bytes.
    position: usize,
}

impl<'a> DnsMessageReader<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, position: 0 }
    }

    /// Seek to a position inside the buffer.
    pub fn seek(&mut self, pos: usize) -> anyhow::Result<()> {
        let len = self.buffer.len();
        ensure!(pos <= len, "seek out of bounds: pos={} len={}", pos, len);
        self.position = pos;
        Ok(())
    }

    #[inline]
    fn need(&self, need: usize, what: &str) -> anyhow::Result<()> {
        let rem = self.remaining();
        ensure!(
            need <= rem,
            "buffer underflow at pos {} while reading {}: need {} bytes, have {}",
            self.position,
            what,
            need,
            rem
        );
        Ok(())
    }

    pub fn read_u8(&mut self) -> anyhow::Result<u8> {
        self.need(1, "u8")?;
        let byte = self.buffer[self.position];
        self.position += 1;
        Ok(byte)
    }

    pub fn read_u16(&mut self) -> anyhow::Result<u16> {
        self.need(2, "u16")?;
        let bytes = &self.buffer[self.position..self.position + 2];
        self.position += 2;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_u32(&mut self) -> anyhow::Result<u32> {
        self.need(4, "u32")?;
        let b = &self.buffer[self.position..self.position + 4];
        self.position += 4;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read a u16 without advancing.
    pub fn peek_u16(&self) -> anyhow::Result<u16> {
        self.need(2, "u16")?;
        let bytes = &self.buffer[self.position..self.position + 2];
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    /// Read a possibly compressed domain name.
    pub fn read_qname(&mut self) -> anyhow::Result<DomainName> {
        let mut pos = self.position;
        let mut jumped = false;
        let mut seen = HashSet::new();
        let mut labels: Vec<&[u8]> = Vec::new();
        let mut encoded_len = 0usize;

        loop {
            let Some(&length) = self.buffer.get(pos) else {
                bail!("qname out of bounds at pos {} (buf len {})", pos, self.buffer.len());
            };

            match length & 0xC0 {
                0xC0 => {
                    ensure!(
                        pos + 2 <= self.buffer.len(),
                        "truncated compression pointer at pos {}",
                        pos
                    );
                    let offset = (((length & 0x3F) as usize) << 8) | self.buffer[pos + 1] as usize;

                    if !seen.insert(offset) {
                        bail!("qname compression pointer loop detected at pos {}", pos);
                    }
                    ensure!(
                        offset < self.buffer.len(),
                        "compression pointer offset {} out of bounds (buf len {})",
                        offset,
                        self.buffer.len()
                    );

                    if !jumped {
                        self.position = pos + 2;
                    }
                    pos = offset;
                    jumped = true;
                }
                0x00 if length == 0 => {
                    if !jumped {
                        self.position = pos + 1;
                    }
                    break;
                }
                0x00 => {
                    let label_len = length as usize;
                    let start = pos + 1;
                    ensure!(
                        start + label_len <= self.buffer.len(),
                        "label overruns buffer at pos {}: need {} bytes, have {}",
                        start,
                        label_len,
                        self.buffer.len().saturating_sub(start)
                    );

                    encoded_len += 1 + label_len;
                    ensure!(encoded_len < MAX_NAME_LEN, "qname exceeds {} bytes", MAX_NAME_LEN);

                    labels.push(&self.buffer[start..start + label_len]);

                    pos = start + label_len;
                    if !jumped {
                        self.position = pos;
                    }
                }
                other => bail!("unsupported label type 0x{:02x} at pos {}", other, pos),
            }
        }

        DomainName::from_labels(labels)
    }

    /// Read a specified number of bytes from the DNS message.
    pub fn read_bytes(&mut self, length: usize) -> anyhow::Result<&'a [u8]> {
        self.need(length, "raw bytes")?;
        let data = &self.buffer[self.position..self.position + length];
        self.position += length;
        Ok(data)
    }

    /// Current reading position in the buffer.
    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Return the number of unread bytes remaining in the reader's buffer.
    ///
    /// # Examples
    ///
    /// ```
    /// use sinkhole_dns::reader::DnsMessageReader;
    /// let buf = [0u8, 1, 2];
    /// let mut r = DnsMessageReader::new(&buf);
    /// assert_eq!(r.remaining(), 3);
    /// r.seek(1).unwrap();
    /// assert_eq!(r.remaining(), 2);
    /// ```
    #[inline]
    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.position
    }
}

/// Trait for types that can be directly parsed from a DNS message.
pub trait DnsReadable: Sized {
    fn read_from(reader: &mut DnsMessageReader) -> anyhow::Result<Self>;
}

#[cfg(test)]
mod tests {
    use super::DnsMessageReader;
    use crate::domain_name::DomainName;

    #[test]
    fn test_read_integers() {
        let data = [42u8, 0x12, 0x34, 0x12, 0x34, 0x56, 0x78];
        let mut reader = DnsMessageReader::new(&data);

        assert_eq!(reader.read_u8().unwrap(), 42);
        assert_eq!(reader.peek_u16().unwrap(), 0x1234);
        assert_eq!(reader.read_u16().unwrap(), 0x1234);
        assert_eq!(reader.read_u32().unwrap(), 0x12345678);
        assert!(reader.read_u8().is_err());
    }

    #[test]
    fn test_buffer_underflow_leaves_position() {
        let data = [1, 2];
        let mut reader = DnsMessageReader::new(&data);

        assert!(reader.read_u32().is_err());
        assert_eq!(reader.position(), 0);
        assert_eq!(reader.read_u16().unwrap(), 0x0102);
    }

    #[test]
    fn test_seek() {
        let data = [1, 2, 3, 4, 5];
        let mut reader = DnsMessageReader::new(&data);

        reader.seek(3).unwrap();
        assert_eq!(reader.read_u8().unwrap(), 4);
        reader.seek(5).unwrap();
        assert_eq!(reader.remaining(), 0);
        assert!(reader.seek(6).is_err());
    }

    #[test]
    fn test_read_qname_simple() {
        let data = vec![7, b'e', b'x', b'a', b'm', b'p', b'l', b'e', 3, b'c', b'o', b'm', 0];
        let mut reader = DnsMessageReader::new(&data);

        let name = reader.read_qname().unwrap();
        assert_eq!(name.as_str(), "example.com");
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_read_qname_preserves_case() {
        let data = vec![3, b'A', b'd', b'S', 3, b'c', b'o', b'm', 0];
        let mut reader = DnsMessageReader::new(&data);

        assert_eq!(reader.read_qname().unwrap().as_str(), "AdS.com");
    }

    #[test]
    fn test_read_qname_root() {
        let data = vec![0];
        let mut reader = DnsMessageReader::new(&data);

        assert_eq!(reader.read_qname().unwrap(), DomainName::root());
    }

    #[test]
    fn test_read_qname_with_compression() {
        let mut data = vec![7, b'e', b'x', b'a', b'm', b'p', b'l', b'e', 3, b'c', b'o', b'm', 0];
        data.extend_from_slice(&[3, b'w', b'w', b'w', 0xC0, 0x00, 0xFF]);

        let mut reader = DnsMessageReader::new(&data);

        assert_eq!(reader.read_qname().unwrap().as_str(), "example.com");
        assert_eq!(reader.read_qname().unwrap().as_str(), "www.example.com");
        // Position continues right after the pointer.
        assert_eq!(reader.read_u8().unwrap(), 0xFF);
    }

    #[test]
    fn test_read_qname_malformed() {
        // pointer to itself
        assert!(DnsMessageReader::new(&[0xC0, 0x00]).read_qname().is_err());
        // pointer out of bounds
        assert!(DnsMessageReader::new(&[0xC0, 0xFF]).read_qname().is_err());
        // label longer than buffer
        assert!(DnsMessageReader::new(&[10, b'a', b'b', b'c']).read_qname().is_err());
        // missing terminator
        assert!(DnsMessageReader::new(&[3, b'c', b'o', b'm']).read_qname().is_err());
        // reserved label type
        assert!(DnsMessageReader::new(&[0x40, 0x00]).read_qname().is_err());
    }

    #[test]
    fn test_read_qname_binary_labels() {
        let data = vec![3, b'a', b'.', b'b', 2, 0xFF, 0x00, 3, b'c', b'o', b'm', 0];
        let mut reader = DnsMessageReader::new(&data);

        let name = reader.read_qname().unwrap();
        let labels: Vec<&[u8]> = name.labels().collect();
        assert_eq!(labels, vec![&b"a.b"[..], &[0xFF, 0x00], b"com"]);
        assert_eq!(name.as_str(), "a\\.b.\\255\\000.com");
    }

    #[test]
    fn test_read_bytes() {
        let data = [1, 2, 3, 4, 5];
        let mut reader = DnsMessageReader::new(&data);

        assert_eq!(reader.read_bytes(0).unwrap().len(), 0);
        assert_eq!(reader.read_bytes(3).unwrap(), &[1, 2, 3]);
        assert_eq!(reader.position(), 3);
        assert!(reader.read_bytes(3).is_err());
    }
}
