//! TLV8 encoding/decoding for HAP pairing messages.
//!
//! TLV8 format: [Type: 1 byte][Length: 1 byte][Value: 0-255 bytes]
//! Values longer than 255 bytes are fragmented across consecutive records
//! of the same type.
//!
//! Decoding is lenient: a trailing record whose declared length runs past
//! the end of the buffer is dropped, integer records with a length other
//! than one are skipped, and unassigned types decode as [`TlvType::Separator`].

use hap_core::{Permissions, TlvErrorCode};

/// Largest value carried by a single record.
pub const MAX_FRAGMENT: usize = 255;

/// TLV type constants for HAP pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TlvType {
    Method = 0x00,
    Identifier = 0x01,
    Salt = 0x02,
    PublicKey = 0x03,
    Proof = 0x04,
    EncryptedData = 0x05,
    State = 0x06,
    Error = 0x07,
    RetryDelay = 0x08,
    Certificate = 0x09,
    Signature = 0x0A,
    Permissions = 0x0B,
    Separator = 0xFF,
}

/// How a type's value is represented on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    Integer,
    Text,
    Bytes,
    Empty,
}

impl TlvType {
    /// Convert from raw byte. Unassigned values map to `Separator`.
    pub fn from_byte(b: u8) -> Self {
        match b {
            0x00 => Self::Method,
            0x01 => Self::Identifier,
            0x02 => Self::Salt,
            0x03 => Self::PublicKey,
            0x04 => Self::Proof,
            0x05 => Self::EncryptedData,
            0x06 => Self::State,
            0x07 => Self::Error,
            0x08 => Self::RetryDelay,
            0x09 => Self::Certificate,
            0x0A => Self::Signature,
            0x0B => Self::Permissions,
            _ => Self::Separator,
        }
    }

    fn kind(self) -> ValueKind {
        match self {
            Self::Method | Self::State | Self::Error | Self::RetryDelay | Self::Permissions => {
                ValueKind::Integer
            }
            Self::Identifier => ValueKind::Text,
            Self::Salt
            | Self::PublicKey
            | Self::Proof
            | Self::EncryptedData
            | Self::Certificate
            | Self::Signature => ValueKind::Bytes,
            Self::Separator => ValueKind::Empty,
        }
    }
}

/// Value of a single TLV item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlvValue {
    Integer(u8),
    Text(String),
    Bytes(Vec<u8>),
    Empty,
}

/// One decoded (or to-be-encoded) item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlvItem {
    pub tag: TlvType,
    pub value: TlvValue,
}

/// Ordered TLV8 message. Duplicate tags are allowed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tlv8 {
    items: Vec<TlvItem>,
}

impl Tlv8 {
    /// Create empty TLV8 message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a TLV8 buffer.
    ///
    /// A byte-valued record of exactly [`MAX_FRAGMENT`] bytes continues into
    /// the immediately following record of the same type.
    pub fn parse(data: &[u8]) -> Self {
        let mut items: Vec<TlvItem> = Vec::new();
        // Index of a byte item whose last fragment was full length.
        let mut continuing: Option<usize> = None;
        let mut i = 0;

        while i + 2 <= data.len() {
            let tag = TlvType::from_byte(data[i]);
            let len = data[i + 1] as usize;
            i += 2;

            if i + len > data.len() {
                break;
            }
            let value = &data[i..i + len];
            i += len;

            let extend = continuing.take();
            match tag.kind() {
                ValueKind::Integer => {
                    if len == 1 {
                        items.push(TlvItem { tag, value: TlvValue::Integer(value[0]) });
                    }
                }
                ValueKind::Text => items.push(TlvItem {
                    tag,
                    value: TlvValue::Text(String::from_utf8_lossy(value).into_owned()),
                }),
                ValueKind::Bytes => {
                    let idx = match extend {
                        Some(idx) if items[idx].tag == tag => {
                            if let TlvValue::Bytes(existing) = &mut items[idx].value {
                                existing.extend_from_slice(value);
                            }
                            idx
                        }
                        _ => {
                            items.push(TlvItem { tag, value: TlvValue::Bytes(value.to_vec()) });
                            items.len() - 1
                        }
                    };
                    if len == MAX_FRAGMENT {
                        continuing = Some(idx);
                    }
                }
                ValueKind::Empty => items.push(TlvItem { tag, value: TlvValue::Empty }),
            }
        }

        Self { items }
    }

    /// Encode to bytes, preserving item order.
    pub fn encode(&self) -> Vec<u8> {
        let mut result = Vec::new();

        for item in &self.items {
            let typ = item.tag as u8;
            match &item.value {
                TlvValue::Integer(v) => result.extend_from_slice(&[typ, 1, *v]),
                TlvValue::Text(s) => {
                    let bytes = &s.as_bytes()[..s.len().min(MAX_FRAGMENT)];
                    result.push(typ);
                    result.push(bytes.len() as u8);
                    result.extend_from_slice(bytes);
                }
                TlvValue::Bytes(v) if v.is_empty() => result.extend_from_slice(&[typ, 0]),
                TlvValue::Bytes(v) => {
                    for chunk in v.chunks(MAX_FRAGMENT) {
                        result.push(typ);
                        result.push(chunk.len() as u8);
                        result.extend_from_slice(chunk);
                    }
                }
                TlvValue::Empty => result.extend_from_slice(&[typ, 0]),
            }
        }

        result
    }

    /// All items in wire order.
    pub fn items(&self) -> &[TlvItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn push(&mut self, tag: TlvType, value: TlvValue) {
        self.items.push(TlvItem { tag, value });
    }

    pub fn push_u8(&mut self, tag: TlvType, value: u8) {
        self.push(tag, TlvValue::Integer(value));
    }

    pub fn push_bytes(&mut self, tag: TlvType, value: impl Into<Vec<u8>>) {
        self.push(tag, TlvValue::Bytes(value.into()));
    }

    pub fn push_str(&mut self, tag: TlvType, value: impl Into<String>) {
        self.push(tag, TlvValue::Text(value.into()));
    }

    pub fn push_separator(&mut self) {
        self.push(TlvType::Separator, TlvValue::Empty);
    }

    /// Builder form of [`Tlv8::push_u8`].
    pub fn with_u8(mut self, tag: TlvType, value: u8) -> Self {
        self.push_u8(tag, value);
        self
    }

    pub fn with_bytes(mut self, tag: TlvType, value: impl Into<Vec<u8>>) -> Self {
        self.push_bytes(tag, value);
        self
    }

    pub fn with_str(mut self, tag: TlvType, value: impl Into<String>) -> Self {
        self.push_str(tag, value);
        self
    }

    /// Last value recorded for `tag`.
    pub fn get(&self, tag: TlvType) -> Option<&TlvValue> {
        self.items.iter().rev().find(|item| item.tag == tag).map(|item| &item.value)
    }

    pub fn contains(&self, tag: TlvType) -> bool {
        self.get(tag).is_some()
    }

    pub fn get_u8(&self, tag: TlvType) -> Option<u8> {
        match self.get(tag)? {
            TlvValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_bytes(&self, tag: TlvType) -> Option<&[u8]> {
        match self.get(tag)? {
            TlvValue::Bytes(v) => Some(v.as_slice()),
            TlvValue::Text(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    pub fn get_str(&self, tag: TlvType) -> Option<&str> {
        match self.get(tag)? {
            TlvValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn state(&self) -> Option<u8> {
        self.get_u8(TlvType::State)
    }

    pub fn method(&self) -> Option<u8> {
        self.get_u8(TlvType::Method)
    }

    /// Raw error byte, if the message carries one.
    pub fn error(&self) -> Option<u8> {
        self.get_u8(TlvType::Error)
    }

    pub fn error_code(&self) -> Option<TlvErrorCode> {
        self.error().and_then(TlvErrorCode::from_byte)
    }

    /// Retry delay in seconds (for backoff responses).
    pub fn retry_delay(&self) -> Option<u8> {
        self.get_u8(TlvType::RetryDelay)
    }

    pub fn permissions(&self) -> Option<Permissions> {
        self.get_u8(TlvType::Permissions).map(Permissions::from_byte)
    }

    /// Get error description string.
    pub fn error_description(&self) -> Option<String> {
        let raw = self.error()?;
        let name = TlvErrorCode::from_byte(raw)
            .map(TlvErrorCode::description)
            .unwrap_or("Unassigned error code");
        let mut desc = format!("Error 0x{:02x}: {}", raw, name);
        if let Some(delay) = self.retry_delay().filter(|d| *d > 0) {
            desc.push_str(&format!(" (retry after {} seconds)", delay));
        }
        Some(desc)
    }

    /// Split a separator-delimited list into its records.
    pub fn records(&self) -> Vec<Tlv8> {
        let mut records = Vec::new();
        let mut current = Tlv8::new();
        for item in &self.items {
            if item.tag == TlvType::Separator {
                records.push(std::mem::take(&mut current));
            } else {
                current.items.push(item.clone());
            }
        }
        if !current.is_empty() {
            records.push(current);
        }
        records
    }

    /// `{State, Error}` response reporting a failed step.
    pub fn error_response(state: u8, code: TlvErrorCode) -> Self {
        Self::new()
            .with_u8(TlvType::State, state)
            .with_u8(TlvType::Error, code.as_byte())
    }

    /// Response carrying only a state.
    pub fn state_only(state: u8) -> Self {
        Self::new().with_u8(TlvType::State, state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod parsing {
        use super::*;

        #[test]
        fn parse_empty() {
            let tlv = Tlv8::parse(&[]);
            assert!(tlv.is_empty());
            assert!(!tlv.contains(TlvType::State));
        }

        #[test]
        fn parse_multiple_tlvs() {
            let data = [
                0x06, 0x01, 0x01, // State=1
                0x00, 0x01, 0x00, // Method=0
            ];
            let tlv = Tlv8::parse(&data);
            assert_eq!(tlv.state(), Some(0x01));
            assert_eq!(tlv.method(), Some(0x00));
            assert_eq!(tlv.items()[0].tag, TlvType::State);
        }

        #[test]
        fn truncated_trailing_record_is_dropped() {
            let data = [0x06, 0x01, 0x03, 0x03, 0x05, 0x01, 0x02];
            let tlv = Tlv8::parse(&data);
            assert_eq!(tlv.items().len(), 1);
            assert_eq!(tlv.state(), Some(3));
            assert!(!tlv.contains(TlvType::PublicKey));
        }

        #[test]
        fn lone_trailing_type_byte_is_dropped() {
            let tlv = Tlv8::parse(&[0x06, 0x01, 0x02, 0x07]);
            assert_eq!(tlv.state(), Some(2));
            assert_eq!(tlv.items().len(), 1);
        }

        #[test]
        fn integer_with_wrong_length_is_ignored() {
            let data = [0x06, 0x02, 0x01, 0x02, 0x07, 0x00];
            let tlv = Tlv8::parse(&data);
            assert_eq!(tlv.state(), None);
            assert_eq!(tlv.error(), None);
        }

        #[test]
        fn last_scalar_occurrence_wins() {
            let data = [0x06, 0x01, 0x01, 0x06, 0x01, 0x05];
            let tlv = Tlv8::parse(&data);
            assert_eq!(tlv.state(), Some(5));
        }

        #[test]
        fn unknown_type_becomes_separator() {
            let data = [0x13, 0x04, 0x10, 0x00, 0x00, 0x00, 0x06, 0x01, 0x01];
            let tlv = Tlv8::parse(&data);
            assert_eq!(tlv.items()[0].tag, TlvType::Separator);
            assert_eq!(tlv.items()[0].value, TlvValue::Empty);
            assert_eq!(tlv.state(), Some(1));
        }

        #[test]
        fn parse_fragmented_value() {
            let mut data = vec![0x03, 0xFF];
            data.extend(vec![0xAA; 255]);
            data.extend([0x03, 0x2D]);
            data.extend(vec![0xBB; 45]);

            let tlv = Tlv8::parse(&data);
            let pk = tlv.get_bytes(TlvType::PublicKey).unwrap();
            assert_eq!(pk.len(), 300);
            assert!(pk[..255].iter().all(|&b| b == 0xAA));
            assert!(pk[255..].iter().all(|&b| b == 0xBB));
            assert_eq!(tlv.items().len(), 1);
        }

        #[test]
        fn short_record_does_not_continue() {
            let data = [0x0A, 0x02, 0x01, 0x02, 0x0A, 0x01, 0x03];
            let tlv = Tlv8::parse(&data);
            assert_eq!(tlv.items().len(), 2);
            assert_eq!(tlv.get_bytes(TlvType::Signature), Some([0x03].as_slice()));
        }

        #[test]
        fn intervening_record_breaks_continuation() {
            let mut data = vec![0x05, 0xFF];
            data.extend(vec![0x11; 255]);
            data.extend([0x06, 0x01, 0x02]);
            data.extend([0x05, 0x01, 0x22]);

            let tlv = Tlv8::parse(&data);
            assert_eq!(tlv.items().len(), 3);
            assert_eq!(tlv.get_bytes(TlvType::EncryptedData), Some([0x22].as_slice()));
        }

        #[test]
        fn identifier_decodes_as_text() {
            let data = [0x01, 0x03, b'a', b'b', b'c'];
            let tlv = Tlv8::parse(&data);
            assert_eq!(tlv.get_str(TlvType::Identifier), Some("abc"));
        }
    }

    mod encoding {
        use super::*;

        #[test]
        fn encode_preserves_order() {
            let tlv = Tlv8::new()
                .with_u8(TlvType::State, 1)
                .with_u8(TlvType::Method, 0);
            assert_eq!(tlv.encode(), vec![0x06, 0x01, 0x01, 0x00, 0x01, 0x00]);
        }

        #[test]
        fn empty_bytes_emit_zero_length_record() {
            let tlv = Tlv8::new().with_bytes(TlvType::Proof, Vec::new());
            assert_eq!(tlv.encode(), vec![0x04, 0x00]);
        }

        #[test]
        fn separator_is_zero_length() {
            let mut tlv = Tlv8::new();
            tlv.push_separator();
            assert_eq!(tlv.encode(), vec![0xFF, 0x00]);
        }

        #[test]
        fn encode_fragments_long_values() {
            let long_value: Vec<u8> = (0..300).map(|i| (i % 256) as u8).collect();
            let tlv = Tlv8::new().with_bytes(TlvType::PublicKey, long_value.clone());

            let encoded = tlv.encode();
            assert_eq!(encoded[0], 0x03);
            assert_eq!(encoded[1], 255);
            assert_eq!(&encoded[2..257], &long_value[..255]);
            assert_eq!(encoded[257], 0x03);
            assert_eq!(encoded[258], 45);
            assert_eq!(&encoded[259..], &long_value[255..]);
        }

        #[test]
        fn long_text_is_truncated() {
            let tlv = Tlv8::new().with_str(TlvType::Identifier, "x".repeat(300));
            let encoded = tlv.encode();
            assert_eq!(encoded[1], 255);
            assert_eq!(encoded.len(), 257);
        }

        #[test]
        fn srp_sized_message_roundtrips() {
            let tlv = Tlv8::new()
                .with_u8(TlvType::State, 3)
                .with_bytes(TlvType::PublicKey, vec![0xAB; 384])
                .with_bytes(TlvType::Proof, vec![0xCD; 64]);

            let decoded = Tlv8::parse(&tlv.encode());
            assert_eq!(decoded, tlv);
        }

        #[test]
        fn list_with_separators_roundtrips() {
            let mut tlv = Tlv8::new().with_u8(TlvType::State, 2);
            tlv.push_str(TlvType::Identifier, "first");
            tlv.push_bytes(TlvType::PublicKey, vec![1u8; 32]);
            tlv.push_u8(TlvType::Permissions, 1);
            tlv.push_separator();
            tlv.push_str(TlvType::Identifier, "second");
            tlv.push_bytes(TlvType::PublicKey, vec![2u8; 32]);
            tlv.push_u8(TlvType::Permissions, 0);

            let decoded = Tlv8::parse(&tlv.encode());
            assert_eq!(decoded, tlv);
        }
    }

    mod accessors {
        use super::*;

        #[test]
        fn get_missing_type() {
            let tlv = Tlv8::new();
            assert_eq!(tlv.get(TlvType::State), None);
            assert_eq!(tlv.get_bytes(TlvType::Salt), None);
        }

        #[test]
        fn typed_getters_reject_other_kinds() {
            let tlv = Tlv8::new().with_bytes(TlvType::State, vec![1]);
            assert_eq!(tlv.state(), None);
        }

        #[test]
        fn error_code_and_description() {
            let tlv = Tlv8::error_response(4, TlvErrorCode::Authentication);
            assert_eq!(tlv.state(), Some(4));
            assert_eq!(tlv.error_code(), Some(TlvErrorCode::Authentication));
            assert!(tlv.error_description().unwrap().contains("0x02"));
        }

        #[test]
        fn description_includes_retry_delay() {
            let tlv = Tlv8::error_response(2, TlvErrorCode::Backoff)
                .with_u8(TlvType::RetryDelay, 30);
            assert!(tlv.error_description().unwrap().contains("30 seconds"));
        }

        #[test]
        fn permissions_accessor() {
            let tlv = Tlv8::new().with_u8(TlvType::Permissions, 1);
            assert_eq!(tlv.permissions(), Some(Permissions::Admin));
        }

        #[test]
        fn records_split_on_separator() {
            let mut tlv = Tlv8::new();
            tlv.push_str(TlvType::Identifier, "a");
            tlv.push_separator();
            tlv.push_str(TlvType::Identifier, "b");

            let records = tlv.records();
            assert_eq!(records.len(), 2);
            assert_eq!(records[0].get_str(TlvType::Identifier), Some("a"));
            assert_eq!(records[1].get_str(TlvType::Identifier), Some("b"));
        }
    }

    mod tlv_type {
        use super::*;

        #[test]
        fn from_byte_known_types() {
            assert_eq!(TlvType::from_byte(0x00), TlvType::Method);
            assert_eq!(TlvType::from_byte(0x02), TlvType::Salt);
            assert_eq!(TlvType::from_byte(0x05), TlvType::EncryptedData);
            assert_eq!(TlvType::from_byte(0x0A), TlvType::Signature);
            assert_eq!(TlvType::from_byte(0x0B), TlvType::Permissions);
            assert_eq!(TlvType::from_byte(0xFF), TlvType::Separator);
        }

        #[test]
        fn from_byte_unknown_is_separator() {
            assert_eq!(TlvType::from_byte(0x0C), TlvType::Separator);
            assert_eq!(TlvType::from_byte(0x13), TlvType::Separator);
            assert_eq!(TlvType::from_byte(0xFE), TlvType::Separator);
        }
    }
}
