/*!
# Aprieta: Store Ranges.
*/

use crate::{
	error::bug,
	DeflateError,
	MASTER_BLOCK_SIZE,
};
use std::ops::Range;



#[derive(Debug, Clone, Copy, Eq, PartialEq)]
/// # Store Range.
///
/// A `start..end` over LZ77 store entries, guaranteed non-empty and no
/// larger than a master block. Proving that once at construction saves a lot
/// of repeat checking downstream.
pub(crate) struct StoreRange {
	/// # Start (Inclusive).
	start: usize,

	/// # End (Exclusive).
	end: usize,
}

impl StoreRange {
	/// # New.
	pub(crate) const fn new(start: usize, end: usize) -> Result<Self, DeflateError> {
		if start < end && end - start <= MASTER_BLOCK_SIZE {
			Ok(Self { start, end })
		}
		else { Err(bug!()) }
	}

	/// # Start.
	pub(crate) const fn start(&self) -> usize { self.start }

	/// # End.
	pub(crate) const fn end(&self) -> usize { self.end }

	/// # Length.
	///
	/// Non-zero by construction.
	pub(crate) const fn len(&self) -> usize { self.end - self.start }

	/// # As `Range`.
	pub(crate) const fn rng(&self) -> Range<usize> { self.start..self.end }

	/// # Split at `mid`.
	///
	/// Both halves must be non-empty or this errors out.
	pub(crate) const fn split(&self, mid: usize) -> Result<(Self, Self), DeflateError> {
		if self.start < mid && mid < self.end {
			Ok((
				Self { start: self.start, end: mid },
				Self { start: mid, end: self.end },
			))
		}
		else { Err(bug!()) }
	}
}



#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn t_range() {
		assert!(StoreRange::new(0, 0).is_err());
		assert!(StoreRange::new(3, 2).is_err());
		assert!(StoreRange::new(0, MASTER_BLOCK_SIZE + 1).is_err());
		assert!(StoreRange::new(0, MASTER_BLOCK_SIZE).is_ok());

		let rng = StoreRange::new(1, 5).unwrap();
		assert_eq!(rng.start(), 1);
		assert_eq!(rng.end(), 5);
		assert_eq!(rng.len(), 4);
		assert_eq!(rng.rng(), 1..5);

		let (a, b) = rng.split(3).unwrap();
		assert_eq!(a.rng(), 1..3);
		assert_eq!(b.rng(), 3..5);
		assert!(rng.split(1).is_err());
		assert!(rng.split(5).is_err());
	}
}
