//! Incremental text decoding of body fragments
//!
//! Fragments can split a multi-byte character anywhere. The decoder keeps the
//! incomplete tail of one fragment and prepends it to the next, so the
//! concatenation of all decoded pieces equals a one-shot decode of the whole
//! body.

use encoding_rs::{CoderResult, Decoder, Encoding, UTF_8};

/// Streaming decoder for one body
pub struct TextDecoder {
    encoding: &'static Encoding,
    decoder: Decoder,
}

impl Default for TextDecoder {
    fn default() -> Self {
        Self::utf8()
    }
}

impl TextDecoder {
    /// UTF-8 decoder
    #[must_use]
    pub fn utf8() -> Self {
        Self::with_encoding(UTF_8)
    }

    /// Pick a decoder from a `content-type` header value
    ///
    /// Charset labels resolve the way browsers resolve them, so `latin1`,
    /// `iso-8859-1` and `ascii` all decode as windows-1252. A missing or
    /// unknown charset decodes as UTF-8.
    #[must_use]
    pub fn for_content_type(content_type: Option<&str>) -> Self {
        let encoding = content_type
            .and_then(charset)
            .and_then(|label| Encoding::for_label(label.as_bytes()))
            .unwrap_or(UTF_8);
        Self::with_encoding(encoding)
    }

    fn with_encoding(encoding: &'static Encoding) -> Self {
        Self {
            encoding,
            decoder: encoding.new_decoder_with_bom_removal(),
        }
    }

    /// Name of the encoding in use
    #[must_use]
    pub fn encoding(&self) -> &'static str {
        self.encoding.name()
    }

    /// Decode one fragment, holding back an incomplete trailing character
    pub fn decode(&mut self, fragment: &[u8]) -> String {
        self.run(fragment, false)
    }

    /// Flush whatever is still pending at end of stream
    ///
    /// An incomplete trailing sequence becomes U+FFFD. The decoder starts
    /// over afterwards.
    pub fn finish(&mut self) -> String {
        let out = self.run(&[], true);
        self.decoder = self.encoding.new_decoder_with_bom_removal();
        out
    }

    fn run(&mut self, mut input: &[u8], last: bool) -> String {
        let mut out = String::new();
        loop {
            let room = self
                .decoder
                .max_utf8_buffer_length(input.len())
                .unwrap_or(input.len());
            out.reserve(room.max(4));
            let (result, read, _) = self.decoder.decode_to_string(input, &mut out, last);
            input = &input[read..];
            if let CoderResult::InputEmpty = result {
                return out;
            }
        }
    }
}

impl std::fmt::Debug for TextDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextDecoder")
            .field("encoding", &self.encoding.name())
            .finish_non_exhaustive()
    }
}

fn charset(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"').to_ascii_lowercase())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_in_pieces(bytes: &[u8], split: usize) -> String {
        let mut decoder = TextDecoder::utf8();
        let mut out = decoder.decode(&bytes[..split]);
        out.push_str(&decoder.decode(&bytes[split..]));
        out.push_str(&decoder.finish());
        out
    }

    #[test]
    fn test_split_multibyte_character() {
        let text = "héllo 世界";
        let bytes = text.as_bytes();
        for split in 0..=bytes.len() {
            assert_eq!(decode_in_pieces(bytes, split), text, "split at {split}");
        }
    }

    #[test]
    fn test_incomplete_piece_is_held_back() {
        let mut decoder = TextDecoder::utf8();
        // First two bytes of a three-byte character
        assert_eq!(decoder.decode(&[b'a', 0xE4, 0xB8]), "a");
        assert_eq!(decoder.decode(&[0x96]), "世");
    }

    #[test]
    fn test_invalid_bytes_replaced() {
        let mut decoder = TextDecoder::utf8();
        assert_eq!(decoder.decode(&[b'a', 0xFF, b'b']), "a\u{FFFD}b");
    }

    #[test]
    fn test_dangling_sequence_at_finish() {
        let mut decoder = TextDecoder::utf8();
        assert_eq!(decoder.decode(&[b'x', 0xE4]), "x");
        assert_eq!(decoder.finish(), "\u{FFFD}");
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn test_bom_stripped_once() {
        let mut decoder = TextDecoder::utf8();
        assert_eq!(decoder.decode(&[0xEF, 0xBB]), "");
        assert_eq!(decoder.decode(&[0xBF, b'o', b'k']), "ok");
        assert_eq!(decoder.decode(&[0xEF, 0xBB, 0xBF]), "\u{FEFF}");
    }

    #[test]
    fn test_charset_selection() {
        let mut latin = TextDecoder::for_content_type(Some("text/plain; charset=ISO-8859-1"));
        assert_eq!(latin.decode(&[0x63, 0x61, 0x66, 0xE9]), "café");

        let mut quoted = TextDecoder::for_content_type(Some("text/html; charset=\"latin1\""));
        assert_eq!(quoted.decode(&[0xE9]), "é");

        let mut unknown = TextDecoder::for_content_type(Some("text/plain; charset=x-made-up"));
        assert_eq!(unknown.encoding(), "UTF-8");
        assert_eq!(unknown.decode("ok".as_bytes()), "ok");

        let mut missing = TextDecoder::for_content_type(None);
        assert_eq!(missing.decode("é".as_bytes()), "é");
    }

    #[test]
    fn test_windows_1252_high_range() {
        let mut decoder =
            TextDecoder::for_content_type(Some("text/plain; charset=windows-1252"));
        assert_eq!(decoder.encoding(), "windows-1252");
        assert_eq!(decoder.decode(&[0x80, 0x93, 0x94]), "€“”");

        // Latin-1 and ASCII labels resolve to the same table
        let mut latin = TextDecoder::for_content_type(Some("text/plain; charset=iso-8859-1"));
        assert_eq!(latin.decode(&[0x80]), "€");
        let mut ascii = TextDecoder::for_content_type(Some("text/plain; charset=us-ascii"));
        assert_eq!(ascii.decode(&[0x93, b'q', 0x94]), "“q”");
    }

    #[test]
    fn test_other_labels_stream() {
        let mut decoder = TextDecoder::for_content_type(Some("text/plain; charset=Shift_JIS"));
        // "日本" split inside the first character
        let bytes = [0x93, 0xFA, 0x96, 0x7B];
        let mut out = decoder.decode(&bytes[..1]);
        out.push_str(&decoder.decode(&bytes[1..]));
        out.push_str(&decoder.finish());
        assert_eq!(out, "日本");
    }
}
