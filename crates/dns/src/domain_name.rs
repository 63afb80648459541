use std::fmt::{Display, Formatter};
use std::hash::Hash;
use std::ops::Deref;
use std::sync::Arc;

use anyhow::{bail, ensure};

/// Longest label allowed on the wire.
const MAX_LABEL_LEN: usize = 63;

/// Longest encoded name, length octets and root terminator included.
const MAX_WIRE_LEN: usize = 255;

/// A wrapper type for domain names.
///
/// Labels are kept as the raw octets seen on the wire, case included, so a
/// decoded name encodes back to the same bytes. The text form has no trailing
/// root dot and escapes `.`, `\` and non-printable octets the way zone files
/// do (`\.`, `\\`, `\DDD`). The root itself is `"."`.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct DomainName {
    labels: Arc<[Box<[u8]>]>,
    text: Arc<str>,
}

impl DomainName {
    /// The root domain.
    pub fn root() -> Self {
        Self {
            labels: Arc::from(Vec::new()),
            text: Arc::from("."),
        }
    }

    /// Build a name from raw wire labels, root excluded.
    pub fn from_labels<I, L>(labels: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = L>,
        L: Into<Box<[u8]>>,
    {
        let labels: Vec<Box<[u8]>> = labels.into_iter().map(Into::into).collect();
        if labels.is_empty() {
            return Ok(Self::root());
        }

        let mut wire_len = 1;
        for label in &labels {
            ensure!(!label.is_empty(), "empty domain label");
            ensure!(label.len() <= MAX_LABEL_LEN, "domain label too long: {} bytes", label.len());
            wire_len += 1 + label.len();
        }
        ensure!(wire_len <= MAX_WIRE_LEN, "domain name too long: {} bytes on the wire", wire_len);

        let mut text = String::new();
        for (i, label) in labels.iter().enumerate() {
            if i > 0 {
                text.push('.');
            }
            escape_label(label, &mut text);
        }

        Ok(Self {
            labels: Arc::from(labels),
            text: Arc::from(text),
        })
    }

    /// Parse an ASCII name in text form. One trailing dot is accepted, and
    /// `\.`, `\\` and `\DDD` escapes are understood.
    pub fn from_ascii(s: impl AsRef<str>) -> anyhow::Result<Self> {
        let str = s.as_ref().trim();

        if str == "." || str.is_empty() {
            return Ok(Self::root());
        }
        ensure!(str.is_ascii(), "domain name is not ASCII: {}", str);

        let bytes = str.as_bytes();
        let mut labels = Vec::new();
        let mut current = Vec::new();
        let mut i = 0;

        while i < bytes.len() {
            match bytes[i] {
                b'\\' => {
                    let digits = bytes.get(i + 1..i + 4).filter(|d| d.iter().all(u8::is_ascii_digit));
                    if let Some(digits) = digits {
                        let value = digits.iter().fold(0u16, |acc, d| acc * 10 + u16::from(d - b'0'));
                        ensure!(value <= 255, "escape \\{} out of range in: {}", value, str);
                        current.push(value as u8);
                        i += 4;
                    } else {
                        let Some(&next) = bytes.get(i + 1) else {
                            bail!("dangling escape in: {}", str);
                        };
                        current.push(next);
                        i += 2;
                    }
                }
                b'.' => {
                    ensure!(!current.is_empty(), "empty domain label in: {}", str);
                    labels.push(std::mem::take(&mut current));
                    i += 1;
                }
                other => {
                    current.push(other);
                    i += 1;
                }
            }
        }
        if !current.is_empty() {
            labels.push(current);
        }

        Self::from_labels(labels)
    }

    /// Raw labels, leftmost first.
    pub fn labels(&self) -> impl Iterator<Item = &[u8]> {
        self.labels.iter().map(|label| &**label)
    }

    /// Get the string representation of the DomainName.
    pub fn as_str(&self) -> &str {
        &self.text
    }
}

fn escape_label(label: &[u8], out: &mut String) {
    for &b in label {
        match b {
            b'.' | b'\\' => {
                out.push('\\');
                out.push(b as char);
            }
            0x21..=0x7E => out.push(b as char),
            _ => out.push_str(&format!("\\{:03}", b)),
        }
    }
}

impl Deref for DomainName {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.text
    }
}

impl Display for DomainName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.text)
    }
}
