//! Advertising-data (AD structure) parsing.
//!
//! A payload is a sequence of `[len][type][len - 1 bytes of data]`
//! structures. A zero length marks the end of the significant part; a
//! structure running past the end of the buffer is treated the same way.

/// AD type: incomplete list of 16-bit service UUIDs.
pub const AD_TYPE_UUID16_INCOMPLETE: u8 = 0x02;
/// AD type: complete list of 16-bit service UUIDs.
pub const AD_TYPE_UUID16_COMPLETE: u8 = 0x03;
/// AD type: shortened local name.
pub const AD_TYPE_NAME_SHORT: u8 = 0x08;
/// AD type: complete local name.
pub const AD_TYPE_NAME_COMPLETE: u8 = 0x09;

/// Iterator over `(ad_type, data)` pairs of a payload.
pub struct AdFields<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for AdFields<'a> {
    type Item = (u8, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let len = *self.data.get(self.pos)? as usize;
        if len == 0 || self.pos + len >= self.data.len() {
            self.pos = self.data.len();
            return None;
        }
        let ad_type = self.data[self.pos + 1];
        let field = &self.data[self.pos + 2..self.pos + 1 + len];
        self.pos += len + 1;
        Some((ad_type, field))
    }
}

pub fn ad_fields(data: &[u8]) -> AdFields<'_> {
    AdFields { data, pos: 0 }
}

/// Data of the first structure with the given AD type.
pub fn find_field(data: &[u8], ad_type: u8) -> Option<&[u8]> {
    ad_fields(data).find_map(|(t, field)| (t == ad_type).then_some(field))
}

/// Complete local name, if present and valid UTF-8.
pub fn extract_complete_name(data: &[u8]) -> Option<&str> {
    let name = find_field(data, AD_TYPE_NAME_COMPLETE)?;
    core::str::from_utf8(name).ok()
}

/// Check whether a 16-bit service UUID is listed (complete or incomplete list).
pub fn contains_service_uuid16(data: &[u8], uuid: u16) -> bool {
    let uuid_le = uuid.to_le_bytes();
    ad_fields(data)
        .filter(|(t, _)| *t == AD_TYPE_UUID16_INCOMPLETE || *t == AD_TYPE_UUID16_COMPLETE)
        .any(|(_, field)| field.chunks_exact(2).any(|chunk| chunk == uuid_le))
}
