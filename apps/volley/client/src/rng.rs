//! Deterministic random numbers for spawn offsets and sound jitter.

use std::{hash::Hasher, marker::PhantomData};

use bevy::math::Vec3;
use rand::{Rng, RngCore, SeedableRng};

/// Portable across platforms, unlike `SmallRng`. Not for anything secret.
type InsecureRng = rand_xoshiro::Xoshiro128PlusPlus;

/// Random number generator seeded from the type name of `T`, so every system
/// gets its own reproducible stream. Use it as a `Local`.
pub(crate) struct SeededRng<T> {
	rng: InsecureRng,
	_phantom: PhantomData<T>,
}

impl<T: std::any::Any> Default for SeededRng<T> {
	fn default() -> Self {
		let mut hasher = bevy::utils::AHasher::default();
		hasher.write(std::any::type_name::<T>().as_bytes());
		Self {
			rng: InsecureRng::seed_from_u64(hasher.finish()),
			_phantom: PhantomData,
		}
	}
}

impl<T> SeededRng<T> {
	/// Uniform sample in `[-1, 1]`.
	pub fn jitter(&mut self) -> f32 {
		self.rng.gen_range(-1.0..=1.0)
	}

	/// Offset with every component uniform in `[-extent, extent]`.
	pub fn offset(&mut self, extent: f32) -> Vec3 {
		Vec3::new(self.jitter(), self.jitter(), self.jitter()) * extent
	}
}

impl<T> RngCore for SeededRng<T> {
	fn next_u32(&mut self) -> u32 {
		self.rng.next_u32()
	}

	fn next_u64(&mut self) -> u64 {
		self.rng.next_u64()
	}

	fn fill_bytes(&mut self, dest: &mut [u8]) {
		self.rng.fill_bytes(dest)
	}

	fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
		self.rng.try_fill_bytes(dest)
	}
}

/// Declares a [`SeededRng`] alias along with the marker type it is seeded by.
macro_rules! seed_rng {
	($ident:ident, $seed:ident) => {
		struct $seed;
		type $ident = $crate::rng::SeededRng<$seed>;
	};
}
pub(crate) use seed_rng;

#[cfg(test)]
mod test {
	use super::*;

	seed_rng!(RngA, SeedA);
	seed_rng!(RngB, SeedB);

	#[test]
	fn test_same_seed_same_stream() {
		let a: Vec<u32> = {
			let mut rng = RngA::default();
			(0..8).map(|_| rng.next_u32()).collect()
		};
		let again: Vec<u32> = {
			let mut rng = RngA::default();
			(0..8).map(|_| rng.next_u32()).collect()
		};
		let b: Vec<u32> = {
			let mut rng = RngB::default();
			(0..8).map(|_| rng.next_u32()).collect()
		};
		assert_eq!(a, again);
		assert_ne!(a, b);
	}

	#[test]
	fn test_ranges() {
		let mut rng = RngA::default();
		for _ in 0..1000 {
			let j = rng.jitter();
			assert!((-1.0..=1.0).contains(&j));
			let o = rng.offset(0.1);
			assert!(o.abs().max_element() <= 0.1 + 1e-6);
		}
	}
}
