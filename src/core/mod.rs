//! # Core Protocol Components
//!
//! Fixed-layout header, packet sealing/opening and payload encodings.
//!
//! ## Components
//! - **Header**: command ids, wire layouts and the fixed header struct
//! - **Packet**: `pack` / `unpack_header` / `unpack_body` with encryption and HMAC
//! - **Serialization**: payload-type tag plus binary/JSON encoding traits
//!
//! ## Wire Format
//! ```text
//! Embedded (v12): [Header(144, digest inside)] [Ciphertext ‖ Tag]
//! Trailing (v13): [Header(80)] [Ciphertext ‖ Tag] [HMAC(32)]
//! ```
//!
//! ## Security
//! - Maximum declared payload: 64MB, checked before allocation
//! - Magic value doubles as the protocol version check
//! - HMAC verified before any decryption is attempted

pub mod header;
pub mod packet;
pub mod serialization;
