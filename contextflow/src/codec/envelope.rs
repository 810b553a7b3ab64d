//! The versioned byte envelope around serialized snapshots.
//!
//! Layout (big-endian):
//!
//! ```text
//! field_count: i16
//! 1. units:      count: i16, then per unit len: i32 + bytes
//! 2. metadata:   present: u8, then len: u16 + UTF-8 when present
//! 3. providers:  count: i16, then per name tag: u8 + len: u16 + UTF-8
//! 4. captured:   epoch millis: i64
//! ```
//!
//! Readers need fields 1-3. Field 4 is optional (`i64::MIN` when unknown) and any
//! field past the last one a reader knows is ignored.

use super::names;
use crate::errors::{ContextError, Result};
use bytes::{Buf, BufMut, BytesMut};

/// Fields written by this version.
pub(crate) const FIELD_COUNT: i16 = 4;
/// Fields every reader requires.
pub(crate) const REQUIRED_FIELDS: i16 = 3;

/// Decoded envelope contents. Unit payloads stay opaque.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Envelope {
    pub(crate) units: Vec<Vec<u8>>,
    pub(crate) metadata_identifier: Option<String>,
    pub(crate) providers: Vec<String>,
    pub(crate) captured_at_millis: Option<i64>,
}

impl Envelope {
    pub(crate) fn encode(&self) -> Result<Vec<u8>> {
        if self.units.len() != self.providers.len() {
            return Err(ContextError::serialization(format!(
                "{} unit payloads for {} providers",
                self.units.len(),
                self.providers.len()
            )));
        }
        let count = i16::try_from(self.units.len())
            .map_err(|_| ContextError::serialization("too many context units"))?;

        let payload_len: usize = self.units.iter().map(Vec::len).sum();
        let mut buf = BytesMut::with_capacity(64 + payload_len);

        buf.put_i16(FIELD_COUNT);

        buf.put_i16(count);
        for unit in &self.units {
            let len = i32::try_from(unit.len())
                .map_err(|_| ContextError::serialization("context unit too large"))?;
            buf.put_i32(len);
            buf.put_slice(unit);
        }

        match &self.metadata_identifier {
            Some(id) => {
                buf.put_u8(1);
                put_str(&mut buf, id)?;
            }
            None => buf.put_u8(0),
        }

        buf.put_i16(count);
        for name in &self.providers {
            let (tag, written) = names::compress(name);
            buf.put_u8(tag);
            put_str(&mut buf, written)?;
        }

        buf.put_i64(self.captured_at_millis.unwrap_or(i64::MIN));

        Ok(buf.to_vec())
    }

    pub(crate) fn decode(mut input: &[u8]) -> Result<Self> {
        let buf = &mut input;

        let field_count = get_i16(buf, "field count")?;
        if field_count < REQUIRED_FIELDS {
            return Err(ContextError::serialization(format!(
                "expected at least {REQUIRED_FIELDS} fields, found {field_count}"
            )));
        }

        let unit_count = get_count(buf, "unit count")?;
        let mut units = Vec::with_capacity(unit_count.min(buf.remaining()));
        for _ in 0..unit_count {
            let len = usize::try_from(get_i32(buf, "unit length")?)
                .map_err(|_| ContextError::serialization("negative unit length"))?;
            units.push(take(buf, len, "unit payload")?.to_vec());
        }

        let metadata_identifier = match get_u8(buf, "metadata flag")? {
            0 => None,
            1 => Some(get_str(buf, "metadata identifier")?),
            other => {
                return Err(ContextError::serialization(format!(
                    "invalid metadata flag {other}"
                )))
            }
        };

        let provider_count = get_count(buf, "provider count")?;
        if provider_count != unit_count {
            return Err(ContextError::serialization(format!(
                "{unit_count} unit payloads for {provider_count} providers"
            )));
        }
        let mut providers = Vec::with_capacity(provider_count);
        for _ in 0..provider_count {
            let tag = get_u8(buf, "provider name tag")?;
            let written = get_str(buf, "provider name")?;
            providers.push(names::expand(tag, &written)?);
        }

        let captured_at_millis = if field_count >= 4 {
            Some(get_i64(buf, "capture time")?).filter(|&millis| millis != i64::MIN)
        } else {
            None
        };

        Ok(Self {
            units,
            metadata_identifier,
            providers,
            captured_at_millis,
        })
    }
}

fn put_str(buf: &mut BytesMut, value: &str) -> Result<()> {
    let len = u16::try_from(value.len())
        .map_err(|_| ContextError::serialization(format!("string too long: {} bytes", value.len())))?;
    buf.put_u16(len);
    buf.put_slice(value.as_bytes());
    Ok(())
}

fn need(buf: &[u8], len: usize, what: &str) -> Result<()> {
    if buf.remaining() < len {
        return Err(ContextError::serialization(format!(
            "truncated input reading {what}: need {len} bytes, have {}",
            buf.remaining()
        )));
    }
    Ok(())
}

fn get_u8(buf: &mut &[u8], what: &str) -> Result<u8> {
    need(*buf, 1, what)?;
    Ok(buf.get_u8())
}

fn get_i16(buf: &mut &[u8], what: &str) -> Result<i16> {
    need(*buf, 2, what)?;
    Ok(buf.get_i16())
}

fn get_i32(buf: &mut &[u8], what: &str) -> Result<i32> {
    need(*buf, 4, what)?;
    Ok(buf.get_i32())
}

fn get_i64(buf: &mut &[u8], what: &str) -> Result<i64> {
    need(*buf, 8, what)?;
    Ok(buf.get_i64())
}

fn get_count(buf: &mut &[u8], what: &str) -> Result<usize> {
    let count = get_i16(buf, what)?;
    usize::try_from(count).map_err(|_| ContextError::serialization(format!("negative {what}")))
}

fn take<'a>(buf: &mut &'a [u8], len: usize, what: &str) -> Result<&'a [u8]> {
    let slice: &'a [u8] = *buf;
    need(slice, len, what)?;
    let (head, tail) = slice.split_at(len);
    *buf = tail;
    Ok(head)
}

fn get_str(buf: &mut &[u8], what: &str) -> Result<String> {
    need(*buf, 2, what)?;
    let len = usize::from(buf.get_u16());
    let raw = take(buf, len, what)?;
    String::from_utf8(raw.to_vec())
        .map_err(|e| ContextError::serialization(format!("{what} is not UTF-8: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> Envelope {
        Envelope {
            units: vec![b"{\"value\":\"t\"}".to_vec(), Vec::new()],
            metadata_identifier: Some("shop#web.war".to_string()),
            providers: vec![
                "contextflow.transaction.context.provider".to_string(),
                "acme.tenant".to_string(),
            ],
            captured_at_millis: Some(1_700_000_000_000),
        }
    }

    #[test]
    fn test_encode_decode() {
        let envelope = sample();
        let bytes = envelope.encode().unwrap();
        assert_eq!(Envelope::decode(&bytes).unwrap(), envelope);
    }

    #[test]
    fn test_header_and_abbreviated_name_layout() {
        let envelope = Envelope {
            units: vec![vec![0xAB]],
            metadata_identifier: None,
            providers: vec!["contextflow.tx.context.provider".to_string()],
            captured_at_millis: None,
        };
        let bytes = envelope.encode().unwrap();

        let mut expected = vec![0x00, 0x04]; // field count
        expected.extend([0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0xAB]); // units
        expected.push(0x00); // no metadata
        expected.extend([0x00, 0x01, 0x01, 0x00, 0x02, b't', b'x']); // names
        expected.extend(i64::MIN.to_be_bytes());
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_unknown_trailing_fields_are_ignored() {
        let mut bytes = sample().encode().unwrap();
        bytes[0..2].copy_from_slice(&6i16.to_be_bytes());
        bytes.extend([0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x01]);

        assert_eq!(Envelope::decode(&bytes).unwrap(), sample());
    }

    #[test]
    fn test_three_field_input_has_no_capture_time() {
        let mut bytes = sample().encode().unwrap();
        bytes[0..2].copy_from_slice(&3i16.to_be_bytes());
        bytes.truncate(bytes.len() - 8);

        let decoded = Envelope::decode(&bytes).unwrap();
        assert_eq!(decoded.captured_at_millis, None);
        assert_eq!(decoded.providers, sample().providers);
    }

    #[test]
    fn test_too_few_fields_rejected() {
        let mut bytes = sample().encode().unwrap();
        bytes[0..2].copy_from_slice(&2i16.to_be_bytes());
        assert!(Envelope::decode(&bytes).is_err());
    }

    #[test]
    fn test_truncated_input_rejected_at_every_length() {
        let bytes = sample().encode().unwrap();
        for len in 0..bytes.len() {
            let err = Envelope::decode(&bytes[..len]).unwrap_err();
            assert!(matches!(err, ContextError::Serialization(_)), "length {len}");
        }
    }

    #[test]
    fn test_count_mismatch_rejected() {
        let envelope = Envelope {
            units: vec![vec![1]],
            metadata_identifier: None,
            providers: vec!["a".to_string()],
            captured_at_millis: None,
        };
        let mut bytes = envelope.encode().unwrap();
        // provider count sits after: field count (2) + units (2 + 4 + 1) + metadata flag (1)
        bytes[10..12].copy_from_slice(&2i16.to_be_bytes());
        let err = Envelope::decode(&bytes).unwrap_err();
        assert!(err.to_string().contains("1 unit payloads for 2 providers"));
    }
}
