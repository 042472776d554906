use thiserror::Error;

/// Reason a [`Once::try_call`](crate::Once::try_call) did not run its action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum TryCallError {
   /// The gate already completed an action and has not been reset since.
   #[error("once gate is already done")]
   Done,
   /// Another caller is inside the gate, running an action or resetting it.
   #[error("once gate is busy")]
   Busy,
}
