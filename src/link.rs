// Copyright (C) Parity Technologies (UK) Ltd.
// This file is part of Polkadot.

// Polkadot is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// Polkadot is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with Polkadot.  If not, see <http://www.gnu.org/licenses/>.

//! Shareable claim-link encoding.
//!
//! A claim link carries the packet id in the URL path and the ephemeral
//! private key in the URI fragment: `{origin}/claim/0x{id}#0x{secret}`.
//! Browsers never send the fragment over the wire, so server logs and
//! referrer headers cannot leak the claim capability. This is a client-side
//! convention only; the chain never sees the secret.

use crate::PacketId;
use rustc_hex::{FromHex, FromHexError, ToHex};
use sp_core::H256;

/// The two independently transmissible fragments of a claim link.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ClaimLink {
	pub packet_id: PacketId,
	/// The ephemeral secp256k1 private key authorizing claims.
	pub secret: [u8; 32],
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum LinkError {
	/// The URL has no `/claim/<id>` path segment.
	MissingId,
	/// The URL has no fragment carrying the secret.
	MissingSecret,
	/// A component is not 32 bytes of hex.
	BadEncoding,
}

impl From<FromHexError> for LinkError {
	fn from(_: FromHexError) -> Self {
		LinkError::BadEncoding
	}
}

fn decode32(s: &str) -> Result<[u8; 32], LinkError> {
	let s = s.strip_prefix("0x").unwrap_or(s);
	let raw: Vec<u8> = s.from_hex()?;
	let mut out = [0u8; 32];
	if raw.len() != out.len() {
		return Err(LinkError::BadEncoding)
	}
	out.copy_from_slice(&raw);
	Ok(out)
}

impl ClaimLink {
	/// Renders the full shareable URL for a web origin like
	/// `https://gifts.example.org`.
	pub fn encode(&self, origin: &str) -> String {
		let id: String = self.packet_id.as_bytes().to_hex();
		let secret: String = self.secret.to_hex();
		format!("{}/claim/0x{}#0x{}", origin.trim_end_matches('/'), id, secret)
	}

	/// Parses a link produced by [`Self::encode`].
	pub fn parse(url: &str) -> Result<Self, LinkError> {
		let (path, fragment) = url.split_once('#').ok_or(LinkError::MissingSecret)?;
		let id = path
			.split_once("/claim/")
			.map(|(_, rest)| rest.trim_end_matches('/'))
			.filter(|id| !id.is_empty())
			.ok_or(LinkError::MissingId)?;
		Ok(ClaimLink { packet_id: H256(decode32(id)?), secret: decode32(fragment)? })
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn link() -> ClaimLink {
		ClaimLink { packet_id: H256([0x11; 32]), secret: [0x22; 32] }
	}

	#[test]
	fn round_trips() {
		let encoded = link().encode("https://gifts.example.org");
		assert!(encoded.starts_with("https://gifts.example.org/claim/0x11"));
		assert_eq!(ClaimLink::parse(&encoded).unwrap(), link());
	}

	#[test]
	fn secret_stays_in_the_fragment() {
		let encoded = link().encode("https://gifts.example.org/");
		let (server_visible, _) = encoded.split_once('#').unwrap();
		assert!(!server_visible.contains("22222222"));
	}

	#[test]
	fn rejects_malformed_links() {
		assert_eq!(
			ClaimLink::parse("https://x.org/claim/0xabcd"),
			Err(LinkError::MissingSecret)
		);
		assert_eq!(ClaimLink::parse("https://x.org/other#0xabcd"), Err(LinkError::MissingId));
		assert_eq!(
			ClaimLink::parse("https://x.org/claim/0xzz#0xabcd"),
			Err(LinkError::BadEncoding)
		);
	}
}
