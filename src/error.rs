/*!
# Aprieta: Errors.
*/

use std::{
	error::Error,
	fmt,
};



#[derive(Debug, Clone, Copy, Eq, PartialEq)]
/// # Internal Consistency Error.
///
/// This library uses `Result` return types the way other code uses
/// assertions: the sanity checks scattered throughout the encoder cannot fail
/// for any input a caller can actually construct, but if a bug ever broke one
/// of them, bubbling up an error beats writing a stream nothing can decode.
///
/// The source location is recorded so the offending check can be found
/// without a debugger.
pub struct DeflateError {
	/// # Source File.
	file: &'static str,

	/// # Source Line.
	line: u32,
}

impl DeflateError {
	/// # New.
	pub(crate) const fn new(file: &'static str, line: u32) -> Self {
		Self { file, line }
	}
}

impl Error for DeflateError {}

impl fmt::Display for DeflateError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"encoder sanity check failed at {}:{}",
			self.file,
			self.line,
		)
	}
}



/// # Error Macro.
///
/// Capture the current file and line as a `DeflateError`.
macro_rules! bug { () => ( crate::error::DeflateError::new(file!(), line!()) ); }

/// # Expose the macro to the rest of the crate.
pub(crate) use bug;



#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn t_display() {
		let err = bug!();
		let out = err.to_string();
		assert!(out.contains("error.rs"), "Missing file: {out}");
	}
}
