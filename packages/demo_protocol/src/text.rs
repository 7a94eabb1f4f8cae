/// Turns a byte stream into `output`/`input` text without ever cutting a
/// character in half.
///
/// A read may end inside a multi-byte character; those trailing bytes are
/// carried into the next [`TextDecoder::push`]. Bytes that can never form a
/// character become U+FFFD. Call [`TextDecoder::reset`] whenever the stream
/// changes owner so a stale tail cannot prefix the new stream.
#[derive(Debug, Default, Clone)]
pub struct TextDecoder {
    carry: Vec<u8>,
}

impl TextDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.carry.clear();
    }

    /// Bytes held back waiting for the rest of their character
    pub fn pending(&self) -> usize {
        self.carry.len()
    }

    pub fn push(&mut self, chunk: &[u8]) -> String {
        self.carry.extend_from_slice(chunk);
        let cut = complete_prefix(&self.carry);
        let text = String::from_utf8_lossy(&self.carry[..cut]).into_owned();
        self.carry.drain(..cut);
        text
    }
}

/// Length of `bytes` without a trailing, still incomplete character.
fn complete_prefix(bytes: &[u8]) -> usize {
    let floor = bytes.len().saturating_sub(3);
    for start in (floor..bytes.len()).rev() {
        let width = match bytes[start] {
            0x80..=0xBF => continue,
            0xC2..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF4 => 4,
            _ => return bytes.len(),
        };
        return if bytes.len() - start < width {
            start
        } else {
            bytes.len()
        };
    }
    bytes.len()
}
