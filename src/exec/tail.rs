/// Keeps the last `capacity` bytes appended to it.
#[derive(Debug, Clone, Default)]
pub struct TailBuffer {
    buf: Vec<u8>,
    capacity: usize,
}

impl TailBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity.min(8 * 1024)),
            capacity,
        }
    }

    pub fn push(&mut self, data: &[u8]) {
        if self.capacity == 0 {
            return;
        }
        if data.len() >= self.capacity {
            self.buf.clear();
            self.buf.extend_from_slice(&data[data.len() - self.capacity..]);
            return;
        }
        let overflow = (self.buf.len() + data.len()).saturating_sub(self.capacity);
        if overflow > 0 {
            self.buf.drain(..overflow);
        }
        self.buf.extend_from_slice(data);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_keeps_last_bytes() {
        let mut t = TailBuffer::new(5);
        t.push(b"abc");
        t.push(b"def");
        assert_eq!(t.as_bytes(), b"bcdef");
        t.push(b"0123456789");
        assert_eq!(t.as_bytes(), b"56789");
    }

    #[test]
    fn test_zero_capacity() {
        let mut t = TailBuffer::new(0);
        t.push(b"abc");
        assert!(t.is_empty());
    }

    proptest! {
        #[test]
        fn prop_equals_suffix_of_everything(
            chunks in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..40), 0..20),
            cap in 1usize..64,
        ) {
            let mut t = TailBuffer::new(cap);
            let mut all = Vec::new();
            for c in &chunks {
                t.push(c);
                all.extend_from_slice(c);
            }
            let start = all.len().saturating_sub(cap);
            prop_assert_eq!(t.as_bytes(), &all[start..]);
        }
    }
}
