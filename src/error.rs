use crate::hooks::CellId;
use core::fmt::{self, Display, Formatter};

/// Why a state update or render request was not carried out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateError {
	/// The state cell was excised together with the component that owned it.
	Stale { cell: CellId },
	/// The component owning the state (or the reconciler) is no longer part of a rendered tree.
	Detached,
	/// A render pass is already in progress. Render passes must not interleave.
	Busy,
	/// The state cell does not hold a value of the requested type.
	TypeMismatch { expected: &'static str },
}

impl Display for UpdateError {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			UpdateError::Stale { cell } => write!(f, "state cell {:?} was released with its component", cell),
			UpdateError::Detached => write!(f, "the owning component is not part of a rendered tree"),
			UpdateError::Busy => write!(f, "a render pass is already in progress"),
			UpdateError::TypeMismatch { expected } => write!(f, "state cell does not hold a `{}`", expected),
		}
	}
}

impl std::error::Error for UpdateError {}
