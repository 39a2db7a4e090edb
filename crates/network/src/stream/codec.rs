use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

use super::StreamError;

const LENGTH_PREFIX: usize = 4;

/// Length-delimited framing with a hard upper bound on frame size.
///
/// The declared length is checked before any payload is buffered, and an
/// end of input inside a frame is reported as [`StreamError::Truncated`].
#[derive(Debug)]
pub(crate) struct FrameCodec {
    length_codec: LengthDelimitedCodec,
    max_frame_size: usize,
    expected: Option<usize>,
}

impl FrameCodec {
    pub(crate) fn new(max_frame_size: usize) -> Self {
        Self {
            length_codec: LengthDelimitedCodec::builder()
                .length_field_length(LENGTH_PREFIX)
                .max_frame_length(max_frame_size)
                .new_codec(),
            max_frame_size,
            expected: None,
        }
    }
}

impl Decoder for FrameCodec {
    type Item = BytesMut;
    type Error = StreamError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.expected.is_none() {
            let Some(mut prefix) = src.get(..LENGTH_PREFIX) else {
                return Ok(None);
            };

            let size = usize::try_from(prefix.get_u32()).unwrap_or(usize::MAX);

            if size > self.max_frame_size {
                return Err(StreamError::FrameTooLarge {
                    size,
                    max: self.max_frame_size,
                });
            }

            self.expected = Some(size);
        }

        let frame = self.length_codec.decode(src)?;

        if frame.is_some() {
            self.expected = None;
        }

        Ok(frame)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }

        if self.expected.is_none() && src.is_empty() {
            return Ok(None);
        }

        Err(StreamError::Truncated {
            expected: self.expected,
            received: src.len(),
        })
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = StreamError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.len() > self.max_frame_size {
            return Err(StreamError::FrameTooLarge {
                size: item.len(),
                max: self.max_frame_size,
            });
        }

        self.length_codec.encode(item, dst).map_err(StreamError::Io)
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;
    use tokio_test::io::Builder;
    use tokio_util::codec::FramedRead;

    use super::*;

    #[test]
    fn test_frame_encoding_decoding() {
        let mut buffer = BytesMut::new();
        let mut codec = FrameCodec::new(64);

        codec
            .encode(Bytes::from_static(b"{\"title\":\"t\"}"), &mut buffer)
            .unwrap();
        assert_eq!(&buffer[..LENGTH_PREFIX], &[0, 0, 0, 13], "prefix must be big-endian");

        let decoded = codec.decode(&mut buffer).unwrap();
        assert_eq!(
            decoded.as_deref(),
            Some(&b"{\"title\":\"t\"}"[..]),
            "frame changed across the codec"
        );
        assert!(buffer.is_empty(), "frame bytes were left behind");
    }

    #[test]
    fn test_partial_frame_waits_for_more_input() {
        let mut codec = FrameCodec::new(64);
        let mut buffer = BytesMut::from(&[0_u8, 0, 0, 5, b'a', b'b'][..]);

        assert!(codec.decode(&mut buffer).unwrap().is_none(), "frame is incomplete");

        buffer.extend_from_slice(b"cde");
        let decoded = codec.decode(&mut buffer).unwrap();
        assert_eq!(decoded.as_deref(), Some(&b"abcde"[..]), "frame was not reassembled");
    }

    #[test]
    fn test_oversized_prefix_is_rejected_before_buffering() {
        let mut codec = FrameCodec::new(8);
        let mut buffer = BytesMut::from(&[0_u8, 0, 1, 0][..]);

        let err = codec.decode(&mut buffer).unwrap_err();
        assert!(
            matches!(err, StreamError::FrameTooLarge { size: 256, max: 8 }),
            "got {err:?}"
        );
    }

    #[test]
    fn test_eof_inside_prefix_is_truncation() {
        let mut codec = FrameCodec::new(8);
        let mut buffer = BytesMut::from(&[0_u8, 0][..]);

        let err = codec.decode_eof(&mut buffer).unwrap_err();
        assert!(
            matches!(
                err,
                StreamError::Truncated {
                    expected: None,
                    received: 2
                }
            ),
            "got {err:?}"
        );
    }

    #[tokio::test]
    async fn test_truncated_stream() {
        let mut stream = Builder::new()
            .read(&[0, 0, 16, 0])
            .read(b"0123456789")
            .build();
        let mut framed = FramedRead::new(&mut stream, FrameCodec::new(4_096));

        let err = framed.next().await.unwrap().unwrap_err();
        assert!(
            matches!(
                err,
                StreamError::Truncated {
                    expected: Some(4_096),
                    received: 10
                }
            ),
            "got {err:?}"
        );
    }
}
