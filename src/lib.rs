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

//! Pallet for creating and claiming token gift packets ("red packets").
//!
//! A creator locks an amount of a fungible asset into the pallet's sovereign
//! account, splitting it over a fixed number of claim slots. Each packet
//! carries the address of an ephemeral secp256k1 key whose private half lives
//! only inside the shareable claim link: possession of the link is the
//! capability to claim. Claims are authorized either by an Ethereum-style
//! ECDSA signature from that key over `keccak256(packet_id ++ claimer)`, or,
//! for packets restricted to a single recipient, by the claimer simply being
//! the transaction sender. Packets may additionally attach a question; the
//! keccak hash of the normalized answer gates every claim.
//!
//! Payouts are either equal shares of the original deposit or pseudo-random
//! draws, with the final slot always receiving the exact remaining balance so
//! that payouts (plus any post-expiry refund to the creator) sum to the
//! deposit with no dust stranded.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

#[cfg(not(feature = "std"))]
use alloc::{format, string::String};
use alloc::{boxed::Box, vec::Vec};
use codec::{Decode, DecodeWithMemTracking, Encode, MaxEncodedLen};
use frame_support::{
	ensure,
	traits::{
		fungible::NativeOrWithId,
		fungibles::{self, Inspect as _, Mutate as _},
		tokens::Preservation,
		Get, Randomness, UnixTime,
	},
	weights::Weight,
	PalletId,
};
pub use pallet::*;
use scale_info::TypeInfo;
use serde::{self, Deserialize, Deserializer, Serialize, Serializer};
use sp_core::H256;
use sp_io::{crypto::secp256k1_ecdsa_recover, hashing::keccak_256};
use sp_runtime::{
	traits::{AccountIdConversion, CheckedDiv, One, Saturating, Zero},
	Debug as RuntimeDebug, SaturatedConversion,
};

#[cfg(feature = "std")]
pub mod link;

const LOG_TARGET: &str = "runtime::red-packet";

type AssetIdOf<T> =
	<<T as Config>::Assets as fungibles::Inspect<<T as frame_system::Config>::AccountId>>::AssetId;
type BalanceOf<T> =
	<<T as Config>::Assets as fungibles::Inspect<<T as frame_system::Config>::AccountId>>::Balance;

/// Identifier of a packet, derived at creation from the creator, a global
/// nonce and the parent block hash.
pub type PacketId = H256;

pub trait WeightInfo {
	fn create_packet() -> Weight;
	fn claim() -> Weight;
	fn refund() -> Weight;
}

pub struct TestWeightInfo;
impl WeightInfo for TestWeightInfo {
	fn create_packet() -> Weight {
		Weight::zero()
	}
	fn claim() -> Weight {
		Weight::zero()
	}
	fn refund() -> Weight {
		Weight::zero()
	}
}

/// An Ethereum address (i.e. 20 bytes, used to represent an Ethereum account).
///
/// This gets serialized to the 0x-prefixed hex representation.
#[derive(
	Clone,
	Copy,
	PartialEq,
	Eq,
	Encode,
	Decode,
	DecodeWithMemTracking,
	Default,
	RuntimeDebug,
	TypeInfo,
	MaxEncodedLen,
)]
pub struct EthereumAddress(pub [u8; 20]);

impl Serialize for EthereumAddress {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		let hex: String = rustc_hex::ToHex::to_hex(&self.0[..]);
		serializer.serialize_str(&format!("0x{}", hex))
	}
}

impl<'de> Deserialize<'de> for EthereumAddress {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let base_string = String::deserialize(deserializer)?;
		let offset = if base_string.starts_with("0x") { 2 } else { 0 };
		let s = &base_string[offset..];
		if s.len() != 40 {
			Err(serde::de::Error::custom(
				"Bad length of Ethereum address (should be 42 including '0x')",
			))?;
		}
		let raw: Vec<u8> = rustc_hex::FromHex::from_hex(s)
			.map_err(|e| serde::de::Error::custom(format!("{:?}", e)))?;
		let mut r = Self::default();
		r.0.copy_from_slice(&raw);
		Ok(r)
	}
}

#[derive(Encode, Decode, DecodeWithMemTracking, Clone, TypeInfo, MaxEncodedLen)]
pub struct EcdsaSignature(pub [u8; 65]);

impl PartialEq for EcdsaSignature {
	fn eq(&self, other: &Self) -> bool {
		&self.0[..] == &other.0[..]
	}
}

impl core::fmt::Debug for EcdsaSignature {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		write!(f, "EcdsaSignature({:?})", &self.0[..])
	}
}

/// All state of a single packet.
///
/// The record is never removed; once `count` reaches zero (or the balance is
/// refunded) it remains as a permanent historical record.
#[derive(
	Clone,
	Encode,
	Decode,
	DecodeWithMemTracking,
	Eq,
	PartialEq,
	RuntimeDebug,
	TypeInfo,
	MaxEncodedLen,
)]
#[scale_info(skip_type_params(S))]
pub struct PacketInfo<AccountId, AssetId, Balance, S: Get<u32>> {
	/// The account that funded the packet and owns refund rights.
	pub creator: AccountId,
	/// The asset being distributed.
	pub token: AssetId,
	/// Remaining undistributed amount.
	pub balance: Balance,
	/// Amount deposited at creation.
	pub initial_balance: Balance,
	/// Remaining claim slots.
	pub count: u32,
	/// Claim slots at creation.
	pub initial_count: u32,
	/// Whether payouts use the randomized split rather than equal shares.
	pub is_random: bool,
	/// Unix timestamp (seconds) after which claims fail and the creator may
	/// reclaim the remaining balance.
	pub expires_at: u64,
	/// Address of the ephemeral key authorized to sign claims.
	pub signer: EthereumAddress,
	/// If set, the only account allowed to claim; no signature required.
	pub restricted_to: Option<AccountId>,
	/// If set, the keccak hash of the normalized answer to the packet's
	/// question.
	pub answer_hash: Option<H256>,
	/// Display-only text attached by the creator.
	pub message: frame_support::BoundedVec<u8, S>,
}

pub type PacketInfoOf<T> = PacketInfo<
	<T as frame_system::Config>::AccountId,
	AssetIdOf<T>,
	BalanceOf<T>,
	<T as Config>::MaxMessageLength,
>;

#[frame_support::pallet]
pub mod pallet {
	use super::*;
	use frame_support::pallet_prelude::*;
	use frame_system::pallet_prelude::*;

	#[pallet::pallet]
	pub struct Pallet<T>(_);

	/// Configuration trait.
	#[pallet::config]
	pub trait Config: frame_system::Config {
		/// The overarching event type.
		#[allow(deprecated)]
		type RuntimeEvent: From<Event<Self>> + IsType<<Self as frame_system::Config>::RuntimeEvent>;

		/// The assets that packets can distribute.
		type Assets: fungibles::Inspect<Self::AccountId, AssetId: Ord>
			+ fungibles::Mutate<Self::AccountId>;

		/// Wall-clock time, used for packet expiry.
		type TimeProvider: UnixTime;

		/// Entropy for the randomized split. Best-effort fairness only: the
		/// output is deterministic once the block is authored and therefore
		/// not secure against a block author choosing when to include a claim.
		type Randomness: Randomness<Self::Hash, BlockNumberFor<Self>>;

		/// The pallet id from which the fund-custody account is derived.
		#[pallet::constant]
		type PalletId: Get<PalletId>;

		/// Upper bound on the display message attached to a packet.
		#[pallet::constant]
		type MaxMessageLength: Get<u32>;

		/// Helper for selecting the asset the benchmarks distribute.
		#[cfg(feature = "runtime-benchmarks")]
		type BenchmarkHelper: crate::benchmarking::BenchmarkHelper<
			<Self::Assets as fungibles::Inspect<Self::AccountId>>::AssetId,
		>;

		type WeightInfo: WeightInfo;
	}

	#[pallet::event]
	#[pallet::generate_deposit(pub(super) fn deposit_event)]
	pub enum Event<T: Config> {
		/// A new packet was funded.
		PacketCreated {
			id: PacketId,
			creator: T::AccountId,
			token: AssetIdOf<T>,
			total_amount: BalanceOf<T>,
			count: u32,
			expires_at: u64,
			restricted_to: Option<T::AccountId>,
			has_question: bool,
			message: BoundedVec<u8, T::MaxMessageLength>,
		},
		/// Someone claimed a share of a packet.
		Claimed { id: PacketId, who: T::AccountId, amount: BalanceOf<T> },
		/// The creator reclaimed the undistributed balance of an expired
		/// packet.
		Refunded { id: PacketId, creator: T::AccountId, amount: BalanceOf<T> },
	}

	#[pallet::error]
	pub enum Error<T> {
		/// Zero amount, an amount too small to give every slot a unit, or a
		/// disallowed asset.
		InvalidAmount,
		/// A packet needs at least one claim slot.
		InvalidCount,
		/// No packet with this identifier.
		UnknownPacket,
		/// All claim slots of this packet have been taken.
		SoldOut,
		/// The packet holds no balance to refund.
		PacketEmpty,
		/// The packet's claim window has closed.
		PacketExpired,
		/// The packet's claim window is still open, refunds must wait.
		PacketNotExpired,
		/// The caller already claimed a share of this packet.
		AlreadyClaimed,
		/// Restriction mismatch, a signature that does not recover to the
		/// packet's signer, or a refund attempted by a non-creator.
		NotEligible,
		/// The supplied answer does not match the packet's answer hash.
		WrongAnswer,
	}

	/// All packets, living and terminal, by identifier.
	#[pallet::storage]
	pub type Packets<T: Config> = StorageMap<_, Blake2_128Concat, PacketId, PacketInfoOf<T>>;

	/// Accounts that have successfully claimed from a packet.
	#[pallet::storage]
	pub type HasClaimed<T: Config> =
		StorageDoubleMap<_, Blake2_128Concat, PacketId, Blake2_128Concat, T::AccountId, ()>;

	/// Counter mixed into packet id derivation, so two packets created by the
	/// same account in the same block get distinct identifiers.
	#[pallet::storage]
	pub type PacketNonce<T: Config> = StorageValue<_, u64, ValueQuery>;

	#[pallet::hooks]
	impl<T: Config> Hooks<BlockNumberFor<T>> for Pallet<T> {}

	#[pallet::call]
	impl<T: Config> Pallet<T> {
		/// Fund a new packet.
		///
		/// Pulls `total_amount` of `token` from the caller into the pallet's
		/// custody account, so the caller must have set up sufficient
		/// allowance/balance beforehand. Only concrete fungible assets are
		/// accepted; the native asset kind is rejected.
		///
		/// Parameters:
		/// - `token`: The asset to distribute.
		/// - `total_amount`: The full deposit, split over all claim slots.
		///   Must be at least `count` so each slot can receive a unit.
		/// - `count`: The number of claim slots, at least 1.
		/// - `is_random`: Randomized split instead of equal shares.
		/// - `signer`: Address of the ephemeral claim-authorization key. Its
		///   private half goes into the claim link and is never seen on-chain.
		/// - `restricted_to`: Restrict claiming to this single account.
		/// - `duration_secs`: Length of the claim window from now.
		/// - `message`: Display-only text.
		/// - `answer_hash`: `keccak256` of the normalized expected answer, if
		///   the packet poses a question (see [`Pallet::answer_hash`]).
		#[pallet::call_index(0)]
		#[pallet::weight(T::WeightInfo::create_packet())]
		pub fn create_packet(
			origin: OriginFor<T>,
			token: Box<NativeOrWithId<AssetIdOf<T>>>,
			total_amount: BalanceOf<T>,
			count: u32,
			is_random: bool,
			signer: EthereumAddress,
			restricted_to: Option<T::AccountId>,
			duration_secs: u64,
			message: BoundedVec<u8, T::MaxMessageLength>,
			answer_hash: Option<H256>,
		) -> DispatchResult {
			let who = ensure_signed(origin)?;

			let token = match *token {
				NativeOrWithId::WithId(token) => token,
				NativeOrWithId::Native => return Err(Error::<T>::InvalidAmount.into()),
			};
			ensure!(!total_amount.is_zero(), Error::<T>::InvalidAmount);
			ensure!(count >= 1, Error::<T>::InvalidCount);
			ensure!(total_amount >= BalanceOf::<T>::from(count), Error::<T>::InvalidAmount);

			T::Assets::transfer(
				token.clone(),
				&who,
				&Self::account_id(),
				total_amount,
				Preservation::Preserve,
			)?;

			let id = Self::next_packet_id(&who);
			let expires_at = T::TimeProvider::now().as_secs().saturating_add(duration_secs);
			let info = PacketInfo {
				creator: who.clone(),
				token: token.clone(),
				balance: total_amount,
				initial_balance: total_amount,
				count,
				initial_count: count,
				is_random,
				expires_at,
				signer,
				restricted_to: restricted_to.clone(),
				answer_hash,
				message: message.clone(),
			};
			Packets::<T>::insert(id, &info);

			log::debug!(
				target: LOG_TARGET,
				"packet {:?} created by {:?}: {:?} x{} slots, expires at {}",
				id,
				who,
				total_amount,
				count,
				expires_at,
			);

			Self::deposit_event(Event::<T>::PacketCreated {
				id,
				creator: who,
				token,
				total_amount,
				count,
				expires_at,
				restricted_to,
				has_question: answer_hash.is_some(),
				message,
			});
			Ok(())
		}

		/// Claim a share of a packet.
		///
		/// For restricted packets the designated recipient claims with no
		/// signature (`signature: None`); everyone else must present an
		/// Ethereum-style ECDSA signature from the packet's ephemeral key over
		/// `keccak256(packet_id ++ claimer)`. If the packet poses a question,
		/// `answer` must normalize and hash to the stored answer hash.
		#[pallet::call_index(1)]
		#[pallet::weight(T::WeightInfo::claim())]
		pub fn claim(
			origin: OriginFor<T>,
			id: PacketId,
			signature: Option<EcdsaSignature>,
			answer: Option<Vec<u8>>,
		) -> DispatchResult {
			let who = ensure_signed(origin)?;

			let mut info = Packets::<T>::get(id).ok_or(Error::<T>::UnknownPacket)?;
			ensure!(info.count > 0, Error::<T>::SoldOut);
			let now = T::TimeProvider::now().as_secs();
			ensure!(now < info.expires_at, Error::<T>::PacketExpired);
			ensure!(!HasClaimed::<T>::contains_key(id, &who), Error::<T>::AlreadyClaimed);
			Self::ensure_eligible(&id, &info, &who, signature.as_ref())?;
			Self::check_answer(&info, answer.as_deref())?;

			let amount = Self::payout_amount(&info, &id, &who);
			info.balance = info.balance.saturating_sub(amount);
			info.count -= 1;

			// Transfer and state update commit or abort together; dispatch is
			// transactional.
			T::Assets::transfer(
				info.token.clone(),
				&Self::account_id(),
				&who,
				amount,
				Preservation::Expendable,
			)?;
			HasClaimed::<T>::insert(id, &who, ());
			Packets::<T>::insert(id, &info);

			log::debug!(
				target: LOG_TARGET,
				"{:?} claimed {:?} from packet {:?}, {} slots left",
				who,
				amount,
				id,
				info.count,
			);

			Self::deposit_event(Event::<T>::Claimed { id, who, amount });
			Ok(())
		}

		/// Reclaim the undistributed balance of an expired packet.
		///
		/// Only the creator may refund, only once the claim window has closed,
		/// and only while something is left to return. The claim count is left
		/// untouched and the record is kept.
		#[pallet::call_index(2)]
		#[pallet::weight(T::WeightInfo::refund())]
		pub fn refund(origin: OriginFor<T>, id: PacketId) -> DispatchResult {
			let who = ensure_signed(origin)?;

			let mut info = Packets::<T>::get(id).ok_or(Error::<T>::UnknownPacket)?;
			ensure!(info.creator == who, Error::<T>::NotEligible);
			let now = T::TimeProvider::now().as_secs();
			ensure!(now >= info.expires_at, Error::<T>::PacketNotExpired);
			ensure!(!info.balance.is_zero(), Error::<T>::PacketEmpty);

			let amount = info.balance;
			info.balance = Zero::zero();
			T::Assets::transfer(
				info.token.clone(),
				&Self::account_id(),
				&who,
				amount,
				Preservation::Expendable,
			)?;
			Packets::<T>::insert(id, &info);

			log::debug!(target: LOG_TARGET, "packet {:?} refunded {:?} to creator", id, amount);

			Self::deposit_event(Event::<T>::Refunded { id, creator: who, amount });
			Ok(())
		}
	}
}

impl<T: Config> Pallet<T> {
	/// The account holding every live packet's balance.
	pub fn account_id() -> T::AccountId {
		T::PalletId::get().into_account_truncating()
	}

	fn next_packet_id(creator: &T::AccountId) -> PacketId {
		let nonce = PacketNonce::<T>::mutate(|n| {
			let nonce = *n;
			*n = n.wrapping_add(1);
			nonce
		});
		let parent_hash = frame_system::Pallet::<T>::parent_hash();
		H256(keccak_256(&(creator, nonce, parent_hash).encode()))
	}

	/// The digest the ephemeral key signs to authorize `who` to claim `id`.
	pub fn claim_digest(id: &PacketId, who: &T::AccountId) -> [u8; 32] {
		let mut data = id.as_bytes().to_vec();
		who.using_encoded(|encoded| data.extend_from_slice(encoded));
		keccak_256(&data)
	}

	// Constructs the message that Ethereum RPC's `personal_sign` and `eth_sign`
	// would sign for a raw 32-byte digest.
	fn ethereum_signable_message(digest: &[u8; 32]) -> Vec<u8> {
		let mut v = b"\x19Ethereum Signed Message:\n32".to_vec();
		v.extend_from_slice(digest);
		v
	}

	// Attempts to recover the Ethereum address from a message signature signed
	// by using the Ethereum RPC's `personal_sign` and `eth_sign`.
	fn eth_recover(s: &EcdsaSignature, digest: &[u8; 32]) -> Option<EthereumAddress> {
		let msg = keccak_256(&Self::ethereum_signable_message(digest));
		let mut res = EthereumAddress::default();
		res.0
			.copy_from_slice(&keccak_256(&secp256k1_ecdsa_recover(&s.0, &msg).ok()?[..])[12..]);
		Some(res)
	}

	fn ensure_eligible(
		id: &PacketId,
		info: &PacketInfoOf<T>,
		who: &T::AccountId,
		signature: Option<&EcdsaSignature>,
	) -> sp_runtime::DispatchResult {
		match &info.restricted_to {
			// The recipient's identity is already proven by being the caller.
			Some(recipient) if recipient == who => return Ok(()),
			Some(_) => return Err(Error::<T>::NotEligible.into()),
			None => {},
		}
		let signature = signature.ok_or(Error::<T>::NotEligible)?;
		let digest = Self::claim_digest(id, who);
		let signer = Self::eth_recover(signature, &digest).ok_or(Error::<T>::NotEligible)?;
		ensure!(signer == info.signer, Error::<T>::NotEligible);
		Ok(())
	}

	fn check_answer(info: &PacketInfoOf<T>, answer: Option<&[u8]>) -> sp_runtime::DispatchResult {
		let Some(expected) = info.answer_hash else { return Ok(()) };
		let answer = answer.ok_or(Error::<T>::WrongAnswer)?;
		ensure!(Self::answer_hash(answer) == expected, Error::<T>::WrongAnswer);
		Ok(())
	}

	/// The hash a creator stores for an expected answer: keccak of the
	/// whitespace-trimmed, ASCII-lowercased plaintext, so claimers don't fail
	/// on casing.
	pub fn answer_hash(answer: &[u8]) -> H256 {
		let start = answer.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(answer.len());
		let end = answer.iter().rposition(|b| !b.is_ascii_whitespace()).map_or(start, |p| p + 1);
		let normalized: Vec<u8> = answer[start..end].iter().map(|b| b.to_ascii_lowercase()).collect();
		H256(keccak_256(&normalized))
	}

	// How much the next successful claim pays out.
	//
	// The final slot always takes the whole remaining balance, which is what
	// makes payouts sum to the initial deposit in both split modes.
	fn payout_amount(info: &PacketInfoOf<T>, id: &PacketId, who: &T::AccountId) -> BalanceOf<T> {
		if info.count <= 1 {
			return info.balance
		}
		if !info.is_random {
			return info
				.initial_balance
				.checked_div(&info.initial_count.into())
				.unwrap_or_default()
		}

		// Randomized draw in `[floor, max]`: leave at least one minimal share
		// for every remaining slot, and cap at twice the current equal share.
		let floor = T::Assets::minimum_balance(info.token.clone()).max(One::one());
		let remaining_slots: BalanceOf<T> = (info.count - 1).into();
		let spendable = info.balance.saturating_sub(floor.saturating_mul(remaining_slots));
		let cap = info
			.balance
			.saturating_mul(2u32.into())
			.checked_div(&info.count.into())
			.unwrap_or_default();
		let max = spendable.min(cap).max(floor);

		let span = max.saturating_sub(floor).saturated_into::<u128>().saturating_add(1);
		let (seed, _) = T::Randomness::random(&(id, who, info.count).encode());
		let raw = keccak_256(&(seed, id, who, info.count).encode());
		let mut draw = [0u8; 16];
		draw.copy_from_slice(&raw[..16]);
		let offset = u128::from_le_bytes(draw) % span;

		floor.saturating_add(offset.saturated_into()).min(info.balance)
	}
}

#[cfg(test)]
mod mock;


#[cfg(feature = "runtime-benchmarks")]
pub mod benchmarking;
