//! Producer inputs accepted by the writer pipeline.
//!
//! A producer supplies the bytes of an artifact: eagerly, as a chunk
//! sequence, as a lazy fallible stream, or as a deferred thunk returning
//! any of those. `execute` only resolves the thunk on a cache miss, which
//! is what makes read-through writes cheap on hits.

use std::fmt;
use std::io;

use bytes::Bytes;

type ChunkIter = Box<dyn Iterator<Item = io::Result<Bytes>> + Send>;
type Thunk = Box<dyn FnOnce() -> Producer + Send>;

/// Bytes for one artifact.
///
/// Chunked variants are treated as the concatenation of their chunks. A
/// stream item of `Err` aborts the write; the staged temp file is removed
/// before the error propagates.
pub enum Producer {
    /// A single contiguous buffer.
    Bytes(Bytes),
    /// An eager sequence of chunks.
    Chunks(Vec<Bytes>),
    /// A lazy, fallible stream of chunks.
    Stream(ChunkIter),
    /// A deferred producer, resolved once when the bytes are needed.
    Thunk(Thunk),
}

impl Producer {
    /// A producer of zero bytes.
    pub fn empty() -> Self {
        Producer::Bytes(Bytes::new())
    }

    /// A producer over a fallible chunk iterator.
    pub fn stream<I>(chunks: I) -> Self
    where
        I: IntoIterator<Item = io::Result<Bytes>>,
        I::IntoIter: Send + 'static,
    {
        Producer::Stream(Box::new(chunks.into_iter()))
    }

    /// A producer resolved by calling `func` when the bytes are needed.
    ///
    /// The thunk may itself return a thunk; resolution iterates.
    pub fn thunk(func: impl FnOnce() -> Producer + Send + 'static) -> Self {
        Producer::Thunk(Box::new(func))
    }

    /// Resolve thunks and flatten into a chunk iterator.
    pub(crate) fn into_chunks(self) -> ChunkIter {
        let mut producer = self;
        loop {
            producer = match producer {
                Producer::Thunk(func) => func(),
                Producer::Bytes(bytes) => return Box::new(std::iter::once(Ok(bytes))),
                Producer::Chunks(chunks) => return Box::new(chunks.into_iter().map(Ok)),
                Producer::Stream(stream) => return stream,
            };
        }
    }
}

impl fmt::Debug for Producer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Producer::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Producer::Chunks(chunks) => f.debug_tuple("Chunks").field(&chunks.len()).finish(),
            Producer::Stream(_) => f.write_str("Stream(..)"),
            Producer::Thunk(_) => f.write_str("Thunk(..)"),
        }
    }
}

impl From<Bytes> for Producer {
    fn from(bytes: Bytes) -> Self {
        Producer::Bytes(bytes)
    }
}

impl From<Vec<u8>> for Producer {
    fn from(bytes: Vec<u8>) -> Self {
        Producer::Bytes(Bytes::from(bytes))
    }
}

impl From<&[u8]> for Producer {
    fn from(bytes: &[u8]) -> Self {
        Producer::Bytes(Bytes::copy_from_slice(bytes))
    }
}

impl From<&str> for Producer {
    fn from(s: &str) -> Self {
        Producer::Bytes(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<String> for Producer {
    fn from(s: String) -> Self {
        Producer::Bytes(Bytes::from(s.into_bytes()))
    }
}

impl From<Vec<Bytes>> for Producer {
    fn from(chunks: Vec<Bytes>) -> Self {
        Producer::Chunks(chunks)
    }
}

impl From<Vec<Vec<u8>>> for Producer {
    fn from(chunks: Vec<Vec<u8>>) -> Self {
        Producer::Chunks(chunks.into_iter().map(Bytes::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(producer: Producer) -> Vec<u8> {
        let mut out = Vec::new();
        for chunk in producer.into_chunks() {
            out.extend_from_slice(&chunk.unwrap());
        }
        out
    }

    #[test]
    fn bytes_yield_one_chunk() {
        assert_eq!(collect(Producer::from("hello")), b"hello");
    }

    #[test]
    fn chunks_concatenate() {
        let producer = Producer::from(vec![b"he".to_vec(), b"ll".to_vec(), b"o".to_vec()]);
        assert_eq!(collect(producer), b"hello");
    }

    #[test]
    fn stream_yields_lazily() {
        let producer = Producer::stream((0u8..3).map(|i| Ok(Bytes::from(vec![i]))));
        assert_eq!(collect(producer), &[0, 1, 2]);
    }

    #[test]
    fn thunk_resolves_to_inner() {
        let producer = Producer::thunk(|| Producer::from("deferred"));
        assert_eq!(collect(producer), b"deferred");
    }

    #[test]
    fn nested_thunks_resolve() {
        let producer = Producer::thunk(|| Producer::thunk(|| Producer::from("deep")));
        assert_eq!(collect(producer), b"deep");
    }

    #[test]
    fn empty_producer_yields_no_bytes() {
        assert_eq!(collect(Producer::empty()), b"");
    }

    #[test]
    fn stream_error_propagates() {
        let producer = Producer::stream(vec![
            Ok(Bytes::from_static(b"a")),
            Err(io::Error::other("explode")),
        ]);
        let mut chunks = producer.into_chunks();
        assert_eq!(chunks.next().unwrap().unwrap(), Bytes::from_static(b"a"));
        assert!(chunks.next().unwrap().is_err());
    }
}
