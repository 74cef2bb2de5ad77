use thiserror::Error;

/// Failure statuses of the kernel API, mapped 1:1 onto the wrapped RTOS
/// status vocabulary. Success is a plain `Ok`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum KernelError {
    /// Unspecified host-level failure.
    #[error("unspecified kernel error")]
    Internal,

    /// The timeout elapsed before the resource became available.
    #[error("timed out waiting for the resource")]
    Timeout,

    /// The resource is exhausted, still in use, or owned by another thread.
    #[error("resource not available")]
    Resource,

    /// A stale handle or malformed argument.
    #[error("invalid parameter")]
    Parameter,

    /// The operation is not permitted from interrupt context.
    #[error("not permitted in interrupt context")]
    Isr,
}
