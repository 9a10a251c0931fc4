use thiserror::Error;
use vglite_kernel::KernelError;

/// Failure of a driver call.
///
/// Draw operations forward the first failing sub-call's error unchanged, so the variant always
/// names the layer that rejected the request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VgError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("out of resources: {0}")]
    OutOfResources(String),
    #[error("not supported: {0}")]
    NotSupport(&'static str),
    #[error("stall timed out after {0} ms")]
    Timeout(u32),
    #[error("no command buffer is bound")]
    NoContext,
    #[error("kernel I/O failure: {0}")]
    GenericIo(String),
}

pub type VgResult<T> = Result<T, VgError>;

impl VgError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        VgError::InvalidArgument(msg.into())
    }
}

impl From<KernelError> for VgError {
    fn from(err: KernelError) -> Self {
        match err {
            KernelError::InvalidArgument(msg) => VgError::InvalidArgument(msg),
            KernelError::OutOfMemory { requested, free } => VgError::OutOfResources(format!(
                "video memory exhausted: requested {requested} bytes, {free} bytes free"
            )),
            KernelError::Timeout(ms) => VgError::Timeout(ms),
            KernelError::NotSupported(what) => VgError::NotSupport(what),
            KernelError::GenericIo(msg) => VgError::GenericIo(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_errors_keep_their_meaning() {
        assert_eq!(VgError::from(KernelError::Timeout(7)), VgError::Timeout(7));
        assert!(matches!(
            VgError::from(KernelError::OutOfMemory {
                requested: 128,
                free: 64
            }),
            VgError::OutOfResources(_)
        ));
        assert_eq!(
            VgError::from(KernelError::NotSupported("flexa")),
            VgError::NotSupport("flexa")
        );
    }
}
