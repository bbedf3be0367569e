//! Property-based tests using proptest
//!
//! These tests check the framing and record invariants across randomly
//! generated payloads, keys and corruptions.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use bot_socket_client::config::MAX_MSG_SIZE;
use bot_socket_client::core::header::{Command, PayloadType, WireLayout};
use bot_socket_client::core::packet::{pack, unpack, PacketFields};
use bot_socket_client::protocol::schema::{BinaryRecord, TransferFile, TransferOptions, WriteMsgToChatId};
use bot_socket_client::utils::crypto::{SessionKey, TAG_LEN};
use proptest::prelude::*;

fn layout_strategy() -> impl Strategy<Value = WireLayout> {
    prop_oneof![Just(WireLayout::Embedded), Just(WireLayout::Trailing)]
}

fn key() -> SessionKey {
    SessionKey::from_bytes(*b"0123456789abcdef0123456789abcdef")
}

fn fields(layout: WireLayout) -> PacketFields {
    PacketFields::new(layout, Command::TransferFile, PayloadType::Binary)
}

// Property: a sealed packet opens to exactly the payload that went in
proptest! {
    #[test]
    fn prop_sealed_roundtrip(
        layout in layout_strategy(),
        payload in prop::collection::vec(any::<u8>(), 0..4096),
    ) {
        let packet = pack(fields(layout), &payload, Some(&key()), None).unwrap();
        let (header, opened) = unpack(layout, &packet).unwrap();

        prop_assert_eq!(opened, payload.clone());
        prop_assert!(header.has_session());
        let expected_len = if payload.is_empty() { 0 } else { payload.len() + TAG_LEN };
        prop_assert_eq!(header.payload_length as usize, expected_len);
        prop_assert_eq!(
            packet.len(),
            layout.header_size() + expected_len + layout.trailing_digest_len()
        );
    }
}

// Property: without a key the payload travels in the clear and unchanged
proptest! {
    #[test]
    fn prop_plain_roundtrip(
        layout in layout_strategy(),
        payload in prop::collection::vec(any::<u8>(), 0..2048),
    ) {
        let packet = pack(fields(layout), &payload, None, None).unwrap();
        let body_start = layout.header_size();
        prop_assert_eq!(&packet[body_start..body_start + payload.len()], payload.as_slice());

        let (header, opened) = unpack(layout, &packet).unwrap();
        prop_assert!(!header.has_session());
        prop_assert_eq!(opened, payload);
    }
}

// Property: flipping any single bit of a sealed packet is detected
proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]
    #[test]
    fn prop_any_bit_flip_rejected(
        layout in layout_strategy(),
        payload in prop::collection::vec(any::<u8>(), 1..256),
        position in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let mut packet = pack(fields(layout), &payload, Some(&key()), None).unwrap();
        let at = position.index(packet.len());
        packet[at] ^= 1 << bit;

        prop_assert!(unpack(layout, &packet).is_err(), "flip at byte {} bit {} went unnoticed", at, bit);
    }
}

// Property: a packet never opens under the other layout
proptest! {
    #[test]
    fn prop_layout_mismatch_rejected(
        payload in prop::collection::vec(any::<u8>(), 0..512),
    ) {
        let packet = pack(fields(WireLayout::Trailing), &payload, Some(&key()), None).unwrap();
        prop_assert!(unpack(WireLayout::Embedded, &packet).is_err());

        let packet = pack(fields(WireLayout::Embedded), &payload, Some(&key()), None).unwrap();
        prop_assert!(unpack(WireLayout::Trailing, &packet).is_err());
    }
}

// Property: arbitrary bytes never panic the decoder
proptest! {
    #[test]
    fn prop_garbage_does_not_panic(
        layout in layout_strategy(),
        data in prop::collection::vec(any::<u8>(), 0..512),
    ) {
        let _ = unpack(layout, &data);
    }
}

// Property: padding fills binary records up to their size, and no further
proptest! {
    #[test]
    fn prop_padding_reaches_record_size(
        len in 0usize..300,
    ) {
        let payload = vec![0xAAu8; len];
        let packet = pack(
            PacketFields::new(WireLayout::Embedded, Command::WriteMsgToChatId, PayloadType::Binary),
            &payload,
            Some(&key()),
            Some(WriteMsgToChatId::SIZE),
        )
        .unwrap();
        let (_, opened) = unpack(WireLayout::Embedded, &packet).unwrap();

        prop_assert_eq!(opened.len(), len.max(WriteMsgToChatId::SIZE));
        prop_assert_eq!(&opened[..len], payload.as_slice());
        prop_assert!(opened[len..].iter().all(|&b| b == 0));
    }
}

// Property: message text survives the fixed-width field or is cut short
proptest! {
    #[test]
    fn prop_message_text_field(
        chat in any::<i64>(),
        text in "[a-zA-Z0-9 ]{0,400}",
    ) {
        let record = WriteMsgToChatId { chat, message: text.clone() };
        let bytes = record.to_record();
        prop_assert_eq!(bytes.len(), WriteMsgToChatId::SIZE);

        let parsed = WriteMsgToChatId::read_from(&bytes).unwrap();
        prop_assert_eq!(parsed.chat, chat);
        if text.len() <= MAX_MSG_SIZE {
            prop_assert_eq!(parsed.message, text);
        } else {
            prop_assert_eq!(parsed.message.as_str(), &text[..MAX_MSG_SIZE - 1]);
        }
    }
}

// Property: transfer descriptors keep their paths, hash and flags
proptest! {
    #[test]
    fn prop_transfer_descriptor(
        dest in "/[a-z]{1,40}(/[a-z]{1,40}){0,3}",
        src in "/[a-z]{1,40}",
        sha256 in any::<[u8; 32]>(),
        overwrite in any::<bool>(),
        hash_ignore in any::<bool>(),
        dry_run in any::<bool>(),
    ) {
        let descriptor = TransferFile {
            dest_path: dest,
            src_path: src,
            sha256,
            options: TransferOptions { overwrite, hash_ignore, dry_run },
        };
        let bytes = descriptor.to_record();
        prop_assert_eq!(bytes.len(), TransferFile::SIZE);
        prop_assert_eq!(bytes.len() % 8, 0);
        prop_assert_eq!(TransferFile::read_from(&bytes).unwrap(), descriptor);
    }
}
