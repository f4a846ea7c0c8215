//! Escape sequences for operator-typed text.
//!
//! Operators type plain lines, but sometimes need to put control bytes on the
//! wire. [`decode`] turns the sequences below into the bytes they stand for:
//!
//! | typed  | byte |
//! |--------|------|
//! | `\r`   | 0x0D |
//! | `\n`   | 0x0A |
//! | `\t`   | 0x09 |
//! | `\\`   | 0x5C |
//! | `\xHH` | 0xHH |
//!
//! Anything else after a backslash is passed through untouched, backslash
//! included. Decoding never fails.

/// Decodes escape sequences in `input` into the bytes to transmit.
pub fn decode(input: &str) -> Vec<u8> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'\\' {
            out.push(bytes[i]);
            i += 1;
            continue;
        }

        match bytes.get(i + 1) {
            Some(b'r') => {
                out.push(0x0D);
                i += 2;
            }
            Some(b'n') => {
                out.push(0x0A);
                i += 2;
            }
            Some(b't') => {
                out.push(0x09);
                i += 2;
            }
            Some(b'\\') => {
                out.push(0x5C);
                i += 2;
            }
            Some(b'x') => match hex_pair(bytes.get(i + 2..i + 4)) {
                Some(value) => {
                    out.push(value);
                    i += 4;
                }
                None => {
                    out.push(b'\\');
                    i += 1;
                }
            },
            _ => {
                out.push(b'\\');
                i += 1;
            }
        }
    }

    out
}

fn hex_pair(digits: Option<&[u8]>) -> Option<u8> {
    let digits = digits?;
    let high = hex_value(digits[0])?;
    let low = hex_value(digits[1])?;
    Some((high << 4) | low)
}

fn hex_value(digit: u8) -> Option<u8> {
    // Both cases are accepted.
    (digit as char).to_digit(16).map(|value| value as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_every_supported_sequence() {
        assert_eq!(
            decode(r"a\nb\tc\\d\x41"),
            vec![b'a', 0x0A, b'b', 0x09, b'c', 0x5C, b'd', 0x41]
        );
        assert_eq!(decode(r"\r"), vec![0x0D]);
    }

    #[test]
    fn plain_text_is_unchanged() {
        assert_eq!(decode("hello world"), b"hello world".to_vec());
        assert_eq!(decode(""), Vec::<u8>::new());
    }

    #[test]
    fn malformed_hex_keeps_the_backslash() {
        assert_eq!(decode(r"bad\x1"), br"bad\x1".to_vec());
        assert_eq!(decode(r"\xZZ"), br"\xZZ".to_vec());
        assert_eq!(decode(r"\x"), br"\x".to_vec());
        assert_eq!(decode(r"\x4G"), br"\x4G".to_vec());
    }

    #[test]
    fn hex_digits_are_case_insensitive() {
        assert_eq!(decode(r"\x1b\x1B\xff"), vec![0x1B, 0x1B, 0xFF]);
    }

    #[test]
    fn unknown_and_trailing_backslashes_pass_through() {
        assert_eq!(decode(r"\q"), br"\q".to_vec());
        assert_eq!(decode("end\\"), b"end\\".to_vec());
    }

    #[test]
    fn escaped_backslash_does_not_start_a_new_sequence() {
        // `\\n` is an escaped backslash followed by a plain `n`.
        assert_eq!(decode(r"\\n"), vec![0x5C, b'n']);
    }

    #[test]
    fn multibyte_text_survives_decoding() {
        assert_eq!(decode("héllo\\t"), [&"héllo".as_bytes()[..], &[0x09]].concat());
    }
}
