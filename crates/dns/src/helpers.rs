/// Length of the fixed DNS message header.
pub const HEADER_LEN: usize = 12;

/// Extracts the transaction ID from a DNS message.
pub fn extract_transaction_id(data: &[u8]) -> Option<u16> {
    if data.len() < 2 {
        return None;
    }
    Some(u16::from_be_bytes([data[0], data[1]]))
}

/// Whether the QR bit is set, i.e. the message is a response.
pub fn is_response(data: &[u8]) -> Option<bool> {
    data.get(2).map(|b| b & 0x80 != 0)
}

/// Whether the TC bit is set on a raw DNS message.
pub fn is_truncated(data: &[u8]) -> Option<bool> {
    if data.len() < HEADER_LEN {
        return None;
    }
    Some(data[2] & 0x02 != 0)
}
