/*!
# Aprieta

A patient, exhaustive DEFLATE encoder. Give it bytes and an iteration
budget; it spends the budget searching for the LZ77 parse, block boundaries,
and Huffman trees that minimize the output, then writes a plain RFC 1951
stream any inflater can read.

This is the wrong tool for anything latency-sensitive. It is the right tool
when the output will be stored or shipped many more times than it is
encoded.

## Examples

```
let data = b"hello hello hello hello";
let raw = aprieta::deflate(&aprieta::Options::default(), data).unwrap();
assert!(raw.len() < data.len());
```
*/

#![deny(unsafe_code)]

#![warn(
	clippy::filetype_is_file,
	clippy::integer_division,
	clippy::needless_borrow,
	clippy::nursery,
	clippy::pedantic,
	clippy::perf,
	clippy::suboptimal_flops,
	clippy::unneeded_field_pattern,
	macro_use_extern_crate,
	missing_copy_implementations,
	missing_debug_implementations,
	missing_docs,
	non_ascii_idents,
	trivial_casts,
	trivial_numeric_casts,
	unreachable_pub,
	unused_crate_dependencies,
	unused_extern_crates,
	unused_import_braces,
)]

#![allow(
	clippy::module_name_repetitions,
	clippy::redundant_pub_crate,
)]

mod bits;
mod blocks;
mod cache;
mod chunk;
mod error;
mod hash;
mod katajainen;
mod lz77;
mod range;
mod rle;
mod split;
mod stats;
mod symbols;
mod tree;

pub use bits::BitWriter;
pub use error::DeflateError;

use chunk::MasterChunks;
use hash::BlockState;
use lz77::Lz77Store;
use range::StoreRange;
use split::SplitPoints;

#[cfg(test)] use miniz_oxide as _;



/// # Litlen Alphabet Size.
pub(crate) const NUM_LL: usize = 288;

/// # Distance Alphabet Size.
pub(crate) const NUM_D: usize = 32;

/// # Window Size.
pub(crate) const WINDOW_SIZE: usize = 32_768;

/// # Window Mask.
pub(crate) const WINDOW_MASK: usize = WINDOW_SIZE - 1;

/// # Minimum Match Length.
pub(crate) const MIN_MATCH: usize = 3;

/// # Maximum Match Length.
pub(crate) const MAX_MATCH: usize = 258;

/// # Sublength Table Size.
///
/// Sublength tables are indexed by length, `0..=MAX_MATCH`.
pub(crate) const SUBLEN_LEN: usize = MAX_MATCH + 1;

/// # Master Block Size.
///
/// Inputs are carved into parts no larger than this before any parsing;
/// per-position scratch structures are sized against it.
pub(crate) const MASTER_BLOCK_SIZE: usize = 1_000_000;

/// # Litlen-Sized Array.
pub(crate) type ArrayLL<T> = [T; NUM_LL];

/// # Distance-Sized Array.
pub(crate) type ArrayD<T> = [T; NUM_D];



#[derive(Debug, Clone, Copy, Eq, PartialEq)]
/// # Compression Options.
pub struct Options {
	/// # Search Iterations Per Block.
	///
	/// More buys (diminishing) compression at (linear) cost. Zero selects
	/// automatically by input size: 60 below 200 KiB, 20 otherwise.
	pub iterations: u32,

	/// # Split Into Multiple Blocks?
	pub block_splitting: bool,

	/// # Maximum Block Count.
	///
	/// Only meaningful when splitting is enabled; zero means unlimited.
	pub block_splitting_max: usize,
}

impl Default for Options {
	fn default() -> Self {
		Self {
			iterations: 15,
			block_splitting: true,
			block_splitting_max: 15,
		}
	}
}

impl Options {
	/// # Iterations for an Input of `len` Bytes.
	const fn resolved_iterations(&self, len: usize) -> u32 {
		if self.iterations == 0 {
			if len < 200_000 { 60 }
			else { 20 }
		}
		else { self.iterations }
	}

	/// # Split-Point Budget.
	const fn max_split_points(&self) -> usize {
		if ! self.block_splitting { 0 }
		else if self.block_splitting_max == 0 { usize::MAX }
		else { self.block_splitting_max - 1 }
	}
}



#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
/// # Block Type Hint.
///
/// Callers can force stored or fixed-tree blocks; the default searches all
/// three types per block.
pub enum BlockKind {
	#[default]
	/// # Whatever Encodes Smallest.
	Automatic,

	/// # Fixed-Tree Blocks Only.
	Fixed,

	/// # Stored Blocks Only.
	Stored,
}



/// # Deflate.
///
/// Compress `data` into a complete raw DEFLATE stream (no gzip or zlib
/// framing) and return the bytes.
///
/// ## Errors
///
/// Errors are internal sanity failures; they cannot occur for any input
/// unless the encoder itself is broken.
///
/// ## Examples
///
/// ```
/// let raw = aprieta::deflate(
///     &aprieta::Options::default(),
///     b"sooner or later everything is bytes",
/// ).unwrap();
/// assert!(! raw.is_empty());
/// ```
pub fn deflate(options: &Options, data: &[u8]) -> Result<Vec<u8>, DeflateError> {
	let mut out = BitWriter::new();
	deflate_into(options, BlockKind::Automatic, true, data, &mut out)?;
	Ok(out.finish())
}

/// # Deflate Into a Writer.
///
/// Append `data`'s blocks to an existing bit stream. When `last` is false
/// no BFINAL flag is written, so further parts can follow; exactly one call
/// per stream must pass `last = true`. (Back-references never cross call
/// boundaries, which any decoder is fine with.)
///
/// ## Errors
///
/// Errors are internal sanity failures; they cannot occur for any input
/// unless the encoder itself is broken.
pub fn deflate_into(
	options: &Options,
	kind: BlockKind,
	last: bool,
	data: &[u8],
	out: &mut BitWriter,
) -> Result<(), DeflateError> {
	// Sizing results from one input say nothing about the next.
	rle::reset_tree_cache();

	// An empty final part still needs a block to carry the BFINAL flag.
	if data.is_empty() {
		if last {
			match kind {
				BlockKind::Stored => out.stored_block(true, &[]),
				_ => blocks::add_empty_block(true, out),
			}
		}
		return Ok(());
	}

	match kind {
		BlockKind::Stored => {
			out.stored_block(last, data);
			Ok(())
		},
		BlockKind::Fixed => {
			let mut state = BlockState::new();
			for chunk in MasterChunks::new(data) {
				let last_part = chunk.arr().len() == data.len();
				blocks::deflate_part_fixed(&mut state, last && last_part, chunk, out)?;
			}
			Ok(())
		},
		BlockKind::Automatic => {
			let numiterations = options.resolved_iterations(data.len());
			let max_points = options.max_split_points();
			let mut state = BlockState::new();
			let mut splits = SplitPoints::new();

			for chunk in MasterChunks::new(data) {
				let last_part = chunk.arr().len() == data.len();
				blocks::deflate_part(
					&mut state,
					&mut splits,
					numiterations,
					max_points,
					last && last_part,
					chunk,
					out,
				)?;
			}
			Ok(())
		},
	}
}



#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn t_options() {
		let opts = Options::default();
		assert_eq!(opts.iterations, 15);
		assert!(opts.block_splitting);
		assert_eq!(opts.block_splitting_max, 15);
		assert_eq!(opts.max_split_points(), 14);
		assert_eq!(opts.resolved_iterations(1000), 15);

		let auto = Options { iterations: 0, ..Options::default() };
		assert_eq!(auto.resolved_iterations(1000), 60);
		assert_eq!(auto.resolved_iterations(500_000), 20);

		let unlimited = Options { block_splitting_max: 0, ..Options::default() };
		assert_eq!(unlimited.max_split_points(), usize::MAX);

		let none = Options { block_splitting: false, ..Options::default() };
		assert_eq!(none.max_split_points(), 0);
	}

	#[test]
	fn t_empty_input() {
		// Empty data still produces a decodable (final) block.
		let raw = deflate(&Options::default(), &[]).unwrap();
		assert!(! raw.is_empty());

		// A non-final empty part writes nothing at all.
		let mut out = BitWriter::new();
		deflate_into(&Options::default(), BlockKind::Automatic, false, &[], &mut out).unwrap();
		assert!(out.is_empty());
	}
}
