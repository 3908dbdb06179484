// 🔤 Feed Decoder
// The feed is served in windows-1251, not UTF-8. A UTF-8 decode of the same
// bytes mangles every Cyrillic currency name, so only the exact code page
// transform is allowed here.

use crate::error::IngestError;
use encoding_rs::WINDOWS_1251;

/// Code page the remote feed is published in
pub const FEED_ENCODING: &str = "windows-1251";

/// Decode raw feed bytes into text.
///
/// Strict: the one byte code page 1251 leaves undefined (`0x98`) is an
/// `IngestError::Encoding`, never a silent replacement or C1 control.
pub fn decode_feed(raw: &[u8]) -> Result<String, IngestError> {
    let (text, had_errors) = WINDOWS_1251.decode_without_bom_handling(raw);

    if had_errors || text.chars().any(is_undefined_slot) {
        return Err(IngestError::Encoding {
            encoding: FEED_ENCODING,
        });
    }

    Ok(text.into_owned())
}

/// Undefined code page slots surface as C1 controls after decoding
fn is_undefined_slot(c: char) -> bool {
    ('\u{80}'..='\u{9F}').contains(&c)
}
