#[cfg(test)]
mod tests {
    use tcpmux::codec::base64::{self, DecodeError};

    #[test]
    fn test_padding_cases() {
        assert_eq!(base64::encode(b""), "");
        assert_eq!(base64::encode(b"M"), "TQ==");
        assert_eq!(base64::encode(b"Ma"), "TWE=");
        assert_eq!(base64::encode(b"Man"), "TWFu");
        assert_eq!(base64::encode(b"Many hands"), "TWFueSBoYW5kcw==");
    }

    #[test]
    fn test_round_trip_short_and_long_inputs() {
        let inputs: [&[u8]; 6] = [
            b"",
            b"\x00",
            b"\xff\x00",
            b"abc",
            b"hello, world",
            &[0xAB; 300],
        ];

        for input in inputs {
            let encoded = base64::encode(input);
            assert_eq!(encoded.len(), base64::encoded_len(input.len()));
            assert_eq!(base64::decode(&encoded).expect("Failed to decode"), input);
        }
    }

    #[test]
    fn test_every_byte_value_round_trips() {
        let input: Vec<u8> = (0..=255u8).collect();
        let encoded = base64::encode(&input);

        assert_eq!(base64::decoded_len(&encoded), Ok(256));
        assert_eq!(base64::decode(&encoded).expect("Failed to decode"), input);
    }

    #[test]
    fn test_malformed_inputs_are_rejected() {
        assert_eq!(base64::decode("abc"), Err(DecodeError::InvalidLength(3)));
        assert!(matches!(
            base64::decode("ab!d"),
            Err(DecodeError::InvalidByte { offset: 2, byte: b'!' })
        ));
        assert!(base64::decode("a===").is_err());
    }
}
