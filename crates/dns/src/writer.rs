use anyhow::ensure;
use bytes::{BufMut, Bytes, BytesMut};

use crate::domain_name::DomainName;

/// Classic DNS-over-UDP payload limit without EDNS.
pub const MIN_UDP_PAYLOAD: usize = 512;

/// Largest message the 16-bit length fields allow.
pub const MAX_MESSAGE_SIZE: usize = u16::MAX as usize;

pub struct DnsMessageWriter {
    buf: BytesMut,
    max_len: usize,
}

impl DnsMessageWriter {
    /// Create a writer that refuses to grow beyond `max_len` bytes.
    pub fn new_with_max(max_len: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(max_len.min(MIN_UDP_PAYLOAD)),
            max_len,
        }
    }

    /// Create a writer limited to the classic 512 byte payload.
    pub fn new() -> Self {
        Self::new_with_max(MIN_UDP_PAYLOAD)
    }

    #[inline]
    fn ensure_space(&mut self, need: usize, what: &str) -> anyhow::Result<()> {
        let cur = self.buf.len();
        let new_len = cur
            .checked_add(need)
            .ok_or_else(|| anyhow::anyhow!("length overflow"))?;
        ensure!(
            new_len <= self.max_len,
            "buffer overflow while writing {}: need={} current_len={} max_len={}",
            what,
            need,
            cur,
            self.max_len
        );
        self.buf.reserve(need);
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> anyhow::Result<()> {
        self.ensure_space(1, "u8")?;
        self.buf.put_u8(value);
        Ok(())
    }

    pub fn write_u16(&mut self, value: u16) -> anyhow::Result<()> {
        self.ensure_space(2, "u16")?;
        self.buf.put_u16(value);
        Ok(())
    }

    pub fn write_u32(&mut self, value: u32) -> anyhow::Result<()> {
        self.ensure_space(4, "u32")?;
        self.buf.put_u32(value);
        Ok(())
    }

    /// Write an uncompressed domain name, label octets as stored.
    pub fn write_qname(&mut self, name: &DomainName) -> anyhow::Result<()> {
        let total = 1 + name.labels().map(|label| 1 + label.len()).sum::<usize>();
        self.ensure_space(total, "qname")?;

        for label in name.labels() {
            self.buf.put_u8(label.len() as u8);
            self.buf.extend_from_slice(label);
        }
        self.buf.put_u8(0);
        Ok(())
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> anyhow::Result<()> {
        self.ensure_space(data.len(), "raw bytes")?;
        self.buf.extend_from_slice(data);
        Ok(())
    }

    /// Overwrite already written bytes starting at `pos`.
    pub fn overwrite_bytes(&mut self, pos: usize, data: &[u8]) -> anyhow::Result<()> {
        let end = pos
            .checked_add(data.len())
            .ok_or_else(|| anyhow::anyhow!("length overflow"))?;
        ensure!(
            end <= self.buf.len(),
            "overwrite out of bounds: pos={} len={} written={}",
            pos,
            data.len(),
            self.buf.len()
        );
        self.buf[pos..end].copy_from_slice(data);
        Ok(())
    }

    /// Number of bytes written so far.
    #[inline]
    pub fn position(&self) -> usize {
        self.buf.len()
    }

    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }
}

impl Default for DnsMessageWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Trait for types that can be written into a DNS message.
pub trait DnsWritable {
    fn write_to(&self, writer: &mut DnsMessageWriter) -> anyhow::Result<()>;
}
