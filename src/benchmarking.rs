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

//! Red-packet pallet benchmarking.

#![cfg(feature = "runtime-benchmarks")]

use super::*;
use crate::Pallet as RedPacket;

use frame_benchmarking::{v2::*, whitelisted_caller, BenchmarkError};
use frame_support::{
	assert_ok,
	traits::fungibles::{Create, Mutate},
	BoundedVec,
};
use frame_system::RawOrigin;

/// Provides the asset id the benchmarks distribute.
///
/// If the asset does not exist, it will be created by the benchmark.
pub trait BenchmarkHelper<AssetId> {
	fn gift_asset() -> AssetId;
}

impl<AssetId: From<u32>> BenchmarkHelper<AssetId> for () {
	fn gift_asset() -> AssetId {
		1u32.into()
	}
}

fn setup_funded_account<T: Config>() -> (T::AccountId, AssetIdOf<T>, BalanceOf<T>)
where
	T::Assets: Create<T::AccountId>,
{
	let caller: T::AccountId = whitelisted_caller();
	let asset = T::BenchmarkHelper::gift_asset();
	let min = T::Assets::minimum_balance(asset.clone()).max(One::one());
	if !T::Assets::asset_exists(asset.clone()) {
		assert_ok!(T::Assets::create(asset.clone(), caller.clone(), true, min));
	}
	let total = min.saturating_mul(1_000u32.into());
	assert_ok!(T::Assets::mint_into(asset.clone(), &caller, total.saturating_mul(2u32.into())));
	(caller, asset, total)
}

fn full_message<T: Config>() -> BoundedVec<u8, T::MaxMessageLength> {
	alloc::vec![0x41; T::MaxMessageLength::get() as usize].try_into().expect("sized to the bound")
}

fn create_benchmark_packet<T: Config>(
	creator: &T::AccountId,
	asset: AssetIdOf<T>,
	total: BalanceOf<T>,
	restricted_to: Option<T::AccountId>,
	duration_secs: u64,
) -> PacketId {
	let id = RedPacket::<T>::next_packet_id(creator);
	// Reproduce the id derivation: the nonce was consumed above, so insert
	// the record directly rather than racing the dispatchable.
	let expires_at = T::TimeProvider::now().as_secs().saturating_add(duration_secs);
	let info = PacketInfo {
		creator: creator.clone(),
		token: asset,
		balance: total,
		initial_balance: total,
		count: 2,
		initial_count: 2,
		is_random: false,
		expires_at,
		signer: EthereumAddress::default(),
		restricted_to,
		answer_hash: None,
		message: full_message::<T>(),
	};
	Packets::<T>::insert(id, &info);
	id
}

#[benchmarks(where T::Assets: Create<T::AccountId>)]
mod benchmarks {
	use super::*;

	#[benchmark]
	fn create_packet() -> Result<(), BenchmarkError> {
		let (caller, asset, total) = setup_funded_account::<T>();

		#[extrinsic_call]
		_(
			RawOrigin::Signed(caller.clone()),
			Box::new(NativeOrWithId::WithId(asset.clone())),
			total,
			2u32,
			true,
			EthereumAddress::default(),
			None,
			3600,
			full_message::<T>(),
			Some(H256::default()),
		);

		assert_eq!(T::Assets::balance(asset, &RedPacket::<T>::account_id()), total);
		Ok(())
	}

	#[benchmark]
	fn claim() -> Result<(), BenchmarkError> {
		let (creator, asset, total) = setup_funded_account::<T>();
		assert_ok!(T::Assets::mint_into(
			asset.clone(),
			&RedPacket::<T>::account_id(),
			total,
		));
		// Restricted packet: the claimer authorizes by being the caller, which
		// is the worst case for storage but skips host-function recovery.
		let id = create_benchmark_packet::<T>(&creator, asset, total, Some(creator.clone()), 3600);

		#[extrinsic_call]
		_(RawOrigin::Signed(creator.clone()), id, None, None);

		assert!(HasClaimed::<T>::contains_key(id, &creator));
		Ok(())
	}

	#[benchmark]
	fn refund() -> Result<(), BenchmarkError> {
		let (creator, asset, total) = setup_funded_account::<T>();
		assert_ok!(T::Assets::mint_into(
			asset.clone(),
			&RedPacket::<T>::account_id(),
			total,
		));
		// Zero duration: the packet is expired the moment it exists.
		let id = create_benchmark_packet::<T>(&creator, asset, total, None, 0);

		#[extrinsic_call]
		_(RawOrigin::Signed(creator.clone()), id);

		assert!(Packets::<T>::get(id).map_or(false, |p| p.balance.is_zero()));
		Ok(())
	}

	impl_benchmark_test_suite!(RedPacket, crate::mock::new_test_ext(), crate::mock::Test);
}
