//! Encoding and decoding of datagrams.
//!
//! Everything here is a pure function of its inputs. The receive path calls
//! [`decode`] on every datagram; the publish path calls [`WireCodec::encode`],
//! which picks the short or fragmented form from the configured
//! [`FragmentationPolicy`].

use crate::{
    DecodeError, EncodeError, Fragment, FragmentHeader, FragmentationPolicy,
    Packet, ShortMessage, FRAGMENT_HEADER_LEN, FRAGMENT_MAGIC,
    MAX_CHANNEL_LEN, MAX_FRAGMENTS, SHORT_MAGIC,
};

// ---------------------------------------------------------------------------
// WireCodec
// ---------------------------------------------------------------------------

/// Encoder bound to a [`FragmentationPolicy`].
///
/// ```rust
/// use castline_protocol::{decode, Packet, WireCodec};
///
/// let codec = WireCodec::default();
/// let datagrams = codec.encode("odom", 1, &[1, 2]).unwrap();
/// assert_eq!(datagrams.len(), 1);
///
/// match decode(&datagrams[0]).unwrap() {
///     Packet::Short(msg) => assert_eq!(msg.payload, vec![1, 2]),
///     Packet::Fragment(_) => unreachable!(),
/// }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct WireCodec {
    policy: FragmentationPolicy,
}

impl WireCodec {
    pub fn new(policy: FragmentationPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &FragmentationPolicy {
        &self.policy
    }

    /// Encodes a message as one short datagram.
    ///
    /// # Errors
    /// - [`EncodeError::ChannelTooLong`] / [`EncodeError::ChannelContainsNul`]
    ///   for an unencodable channel name.
    /// - [`EncodeError::PayloadTooLarge`] if the datagram would exceed
    ///   `max_unfragmented_size`.
    pub fn encode_short(
        &self,
        channel: &str,
        sequence: u32,
        payload: &[u8],
    ) -> Result<Vec<u8>, EncodeError> {
        validate_channel(channel)?;

        let size = FragmentationPolicy::short_size(channel.len(), payload.len());
        if size > self.policy.max_unfragmented_size {
            return Err(EncodeError::PayloadTooLarge {
                size,
                max: self.policy.max_unfragmented_size,
            });
        }

        let mut buf = Vec::with_capacity(size);
        buf.extend_from_slice(&SHORT_MAGIC.to_be_bytes());
        buf.extend_from_slice(&sequence.to_be_bytes());
        put_channel(&mut buf, channel);
        buf.extend_from_slice(payload);
        Ok(buf)
    }

    /// Splits a message into fragment datagrams using the policy's
    /// `max_fragment_payload`. See [`encode_fragments`].
    pub fn encode_fragments(
        &self,
        channel: &str,
        sequence: u32,
        payload: &[u8],
    ) -> Result<Vec<Vec<u8>>, EncodeError> {
        encode_fragments(
            channel,
            sequence,
            payload,
            self.policy.max_fragment_payload,
        )
    }

    /// Encodes a message in whichever form the policy calls for: one short
    /// datagram when it fits `max_unfragmented_size`, two or more fragments
    /// otherwise.
    ///
    /// # Errors
    /// [`FragmentationPolicy::validate`] failures, plus the errors of the
    /// chosen form.
    pub fn encode(
        &self,
        channel: &str,
        sequence: u32,
        payload: &[u8],
    ) -> Result<Vec<Vec<u8>>, EncodeError> {
        self.policy.validate()?;
        if self.policy.fits_short(channel.len(), payload.len()) {
            Ok(vec![self.encode_short(channel, sequence, payload)?])
        } else {
            self.encode_fragments(channel, sequence, payload)
        }
    }
}

// ---------------------------------------------------------------------------
// Fragmentation
// ---------------------------------------------------------------------------

/// Splits `payload` into at least two consecutive chunks of at most
/// `max_fragment_payload` bytes and encodes one fragment datagram per chunk.
///
/// A payload that would fit one chunk is halved instead, since a lone
/// fragment is the short form's job. Every fragment carries the shared
/// sequence, total size and count; the first also carries the channel name.
/// Offsets are `index * chunk`, so the chunks reassemble byte-for-byte.
///
/// # Errors
/// - [`EncodeError::PayloadEmpty`] for a zero-length payload.
/// - [`EncodeError::TooFewFragments`] for a one-byte payload.
/// - [`EncodeError::InvalidFragmentSize`] if `max_fragment_payload` is 0.
/// - [`EncodeError::TooManyFragments`] past 65,535 chunks.
/// - Channel errors as for [`WireCodec::encode_short`].
pub fn encode_fragments(
    channel: &str,
    sequence: u32,
    payload: &[u8],
    max_fragment_payload: usize,
) -> Result<Vec<Vec<u8>>, EncodeError> {
    validate_channel(channel)?;
    if max_fragment_payload == 0 {
        return Err(EncodeError::InvalidFragmentSize);
    }
    if payload.is_empty() {
        return Err(EncodeError::PayloadEmpty);
    }
    if payload.len() < 2 {
        return Err(EncodeError::TooFewFragments {
            size: payload.len(),
        });
    }

    let chunk_size = max_fragment_payload.min(payload.len().div_ceil(2));
    let count = payload.len().div_ceil(chunk_size);
    let fragment_count = u16::try_from(count).map_err(|_| {
        EncodeError::TooManyFragments {
            count,
            max: MAX_FRAGMENTS,
        }
    })?;
    let total_payload_size =
        u32::try_from(payload.len()).map_err(|_| EncodeError::PayloadTooLarge {
            size: payload.len(),
            max: u32::MAX as usize,
        })?;

    let mut datagrams = Vec::with_capacity(count);
    for (index, chunk) in payload.chunks(chunk_size).enumerate() {
        // Both casts are bounded by the checks above: index < count <= u16::MAX
        // and offset < payload.len() <= u32::MAX.
        let header = FragmentHeader {
            sequence,
            total_payload_size,
            fragment_offset: (index * chunk_size) as u32,
            fragment_index: index as u16,
            fragment_count,
        };
        let channel = (index == 0).then_some(channel);
        datagrams.push(write_fragment(&header, channel, chunk));
    }

    Ok(datagrams)
}

fn write_fragment(
    header: &FragmentHeader,
    channel: Option<&str>,
    chunk: &[u8],
) -> Vec<u8> {
    let channel_len = channel.map_or(0, |c| c.len() + 1);
    let mut buf =
        Vec::with_capacity(FRAGMENT_HEADER_LEN + channel_len + chunk.len());
    buf.extend_from_slice(&FRAGMENT_MAGIC.to_be_bytes());
    buf.extend_from_slice(&header.sequence.to_be_bytes());
    buf.extend_from_slice(&header.total_payload_size.to_be_bytes());
    buf.extend_from_slice(&header.fragment_offset.to_be_bytes());
    buf.extend_from_slice(&header.fragment_index.to_be_bytes());
    buf.extend_from_slice(&header.fragment_count.to_be_bytes());
    if let Some(channel) = channel {
        put_channel(&mut buf, channel);
    }
    buf.extend_from_slice(chunk);
    buf
}

fn validate_channel(channel: &str) -> Result<(), EncodeError> {
    if channel.len() > MAX_CHANNEL_LEN {
        return Err(EncodeError::ChannelTooLong {
            len: channel.len(),
            max: MAX_CHANNEL_LEN,
        });
    }
    if channel.as_bytes().contains(&0) {
        return Err(EncodeError::ChannelContainsNul);
    }
    Ok(())
}

fn put_channel(buf: &mut Vec<u8>, channel: &str) {
    buf.extend_from_slice(channel.as_bytes());
    buf.push(0);
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Interprets one received datagram.
///
/// # Errors
/// - [`DecodeError::UnknownMagic`] for an unrecognised leading marker.
/// - [`DecodeError::Truncated`] if a fixed header runs past the end.
/// - [`DecodeError::MalformedChannel`] for an unterminated, oversized or
///   non-UTF-8 channel field.
/// - [`DecodeError::InvalidFragment`] for a fragment whose index, count or
///   extent is inconsistent.
pub fn decode(datagram: &[u8]) -> Result<Packet, DecodeError> {
    let mut reader = Reader::new(datagram);
    match reader.u32()? {
        SHORT_MAGIC => decode_short(reader).map(Packet::Short),
        FRAGMENT_MAGIC => decode_fragment(reader).map(Packet::Fragment),
        other => Err(DecodeError::UnknownMagic(other)),
    }
}

fn decode_short(mut reader: Reader<'_>) -> Result<ShortMessage, DecodeError> {
    let sequence = reader.u32()?;
    let channel = reader.channel()?;
    Ok(ShortMessage {
        channel,
        sequence,
        payload: reader.rest().to_vec(),
    })
}

fn decode_fragment(mut reader: Reader<'_>) -> Result<Fragment, DecodeError> {
    let header = FragmentHeader {
        sequence: reader.u32()?,
        total_payload_size: reader.u32()?,
        fragment_offset: reader.u32()?,
        fragment_index: reader.u16()?,
        fragment_count: reader.u16()?,
    };

    if header.fragment_count == 0 {
        return Err(DecodeError::InvalidFragment(
            "fragment count is zero".into(),
        ));
    }
    if header.fragment_index >= header.fragment_count {
        return Err(DecodeError::InvalidFragment(format!(
            "index {} out of range for {} fragments",
            header.fragment_index, header.fragment_count
        )));
    }

    let channel = if header.fragment_index == 0 {
        Some(reader.channel()?)
    } else {
        None
    };
    let payload = reader.rest();

    let end = u64::from(header.fragment_offset) + payload.len() as u64;
    if end > u64::from(header.total_payload_size) {
        return Err(DecodeError::InvalidFragment(format!(
            "chunk ends at byte {end}, past total size {}",
            header.total_payload_size
        )));
    }

    Ok(Fragment {
        header,
        channel,
        payload: payload.to_vec(),
    })
}

/// Bounds-checked big-endian cursor over a datagram.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let end = self.pos + n;
        if end > self.buf.len() {
            return Err(DecodeError::Truncated {
                needed: end,
                available: self.buf.len(),
            });
        }
        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u16(&mut self) -> Result<u16, DecodeError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn channel(&mut self) -> Result<String, DecodeError> {
        let rest = &self.buf[self.pos..];
        let window = &rest[..rest.len().min(MAX_CHANNEL_LEN + 1)];

        let Some(nul) = window.iter().position(|&b| b == 0) else {
            return Err(DecodeError::MalformedChannel(
                if rest.len() > MAX_CHANNEL_LEN {
                    "longer than 254 bytes"
                } else {
                    "missing NUL terminator"
                },
            ));
        };

        let name = std::str::from_utf8(&window[..nul])
            .map_err(|_| DecodeError::MalformedChannel("not valid UTF-8"))?;
        self.pos += nul + 1;
        Ok(name.to_owned())
    }

    fn rest(self) -> &'a [u8] {
        &self.buf[self.pos..]
    }
}

// =========================================================================
// Tests
// =========================================================================
