//! UTF-8 decoding of raw network chunks.
//!
//! Chunk boundaries are not aligned to characters. A multi-byte sequence
//! split across two chunks is held back and completed by the next call;
//! whatever is still pending when the stream terminates is flushed as
//! U+FFFD.

const REPLACEMENT: char = '\u{FFFD}';

#[derive(Debug, Default)]
pub struct ByteDecoder {
    pending: Vec<u8>,
}

impl ByteDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes `chunk`, prefixed by any bytes carried over from the previous
    /// call. With `terminated` set, nothing is carried forward.
    pub fn decode(&mut self, chunk: &[u8], terminated: bool) -> String {
        let mut bytes = std::mem::take(&mut self.pending);
        bytes.extend_from_slice(chunk);

        let mut out = String::with_capacity(bytes.len());
        let mut rest: &[u8] = &bytes;
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match e.error_len() {
                        Some(bad) => {
                            out.push(REPLACEMENT);
                            rest = &after[bad..];
                        }
                        // Truncated sequence at the end of the input.
                        None => {
                            if terminated {
                                out.push(REPLACEMENT);
                            } else {
                                self.pending = after.to_vec();
                            }
                            break;
                        }
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_passes_through() {
        let mut d = ByteDecoder::new();
        assert_eq!(d.decode(b"Paris is ", false), "Paris is ");
        assert_eq!(d.decode(&[], true), "");
    }

    #[test]
    fn split_multibyte_char_is_joined_across_chunks() {
        let bytes = "café".as_bytes();
        let (head, tail) = bytes.split_at(bytes.len() - 1);
        let mut d = ByteDecoder::new();
        assert_eq!(d.decode(head, false), "caf");
        assert_eq!(d.decode(tail, false), "é");
        // Nothing left to flush.
        assert_eq!(d.decode(&[], true), "");
    }

    #[test]
    fn dangling_bytes_flush_as_replacement_on_termination() {
        let euro = "€".as_bytes();
        let mut d = ByteDecoder::new();
        assert_eq!(d.decode(&euro[..2], false), "");
        assert_eq!(d.decode(&[], true), "\u{FFFD}");
        assert_eq!(d.decode(b"x", false), "x");
    }

    #[test]
    fn invalid_bytes_mid_chunk_are_replaced() {
        let mut d = ByteDecoder::new();
        assert_eq!(d.decode(b"a\xFFb", false), "a\u{FFFD}b");
    }
}
