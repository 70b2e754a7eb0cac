//! Crate-local error taxonomy, one variant per row of the error-handling
//! table: every fallible internal path returns an `RtError`, and exactly
//! one place (the `From` impl below) turns it into an `openxr_sys::Result`
//! at the ABI boundary.

use openxr_sys as xr;

#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RtError {
    #[error("struct type tag, null pointer, or enum value out of range")]
    ValidationFailure,
    #[error("handle is unknown or has been destroyed")]
    HandleInvalid,
    #[error("system id does not match the instance's system")]
    SystemInvalid,
    #[error("call is not valid given another call in flight")]
    CallOrderInvalid,
    #[error("session is not in the state required for this call")]
    SessionNotReady,
    #[error("session is not running")]
    SessionNotRunning,
    #[error("session is not stopping")]
    SessionNotStopping,
    #[error("session does not have input focus")]
    SessionNotFocused,
    #[error("output buffer capacity is smaller than the required count")]
    SizeInsufficient,
    #[error("graphics adapter does not match the submission device's adapter")]
    GraphicsDeviceInvalid,
    #[error("the graphics-requirements call for this API was never made")]
    GraphicsRequirementsCallMissing,
    #[error("path string is not well-formed")]
    PathFormatInvalid,
    #[error("path handle is unknown")]
    PathInvalid,
    #[error("interaction profile does not support this binding path")]
    PathUnsupported,
    #[error("name is already in use")]
    NameDuplicated,
    #[error("action type does not match the requested accessor")]
    ActionTypeMismatch,
    #[error("action's set was never attached to the session")]
    ActionsetNotAttached,
    #[error("one or more action sets are already attached to the session")]
    ActionsetsAlreadyAttached,
    #[error("layer image rect exceeds the referenced swapchain image")]
    SwapchainRectInvalid,
    #[error("only the opaque environment blend mode is supported")]
    EnvironmentBlendModeUnsupported,
    #[error("time must be positive for this call")]
    TimeInvalid,
    #[error("composition layer type is not recognized")]
    LayerInvalid,
    #[error("host runtime initialization failed or the adapter was lost")]
    InstanceLossPending,
    #[error("swapchain format, sample count, array size, or face count is unsupported")]
    FormatUnsupported,
    #[error("host runtime call failed: {0}")]
    HostCallFailed(i32),
}

impl From<hostapi::HostError> for RtError {
    fn from(err: hostapi::HostError) -> Self {
        match err {
            hostapi::HostError::CallFailed(code) => RtError::HostCallFailed(code),
            hostapi::HostError::DeviceLost => RtError::InstanceLossPending,
            hostapi::HostError::TimedOut => RtError::HostCallFailed(-1),
        }
    }
}

impl From<RtError> for xr::Result {
    fn from(err: RtError) -> Self {
        match err {
            RtError::ValidationFailure => xr::Result::ERROR_VALIDATION_FAILURE,
            RtError::HandleInvalid => xr::Result::ERROR_HANDLE_INVALID,
            RtError::SystemInvalid => xr::Result::ERROR_SYSTEM_INVALID,
            RtError::CallOrderInvalid => xr::Result::ERROR_CALL_ORDER_INVALID,
            RtError::SessionNotReady => xr::Result::ERROR_SESSION_NOT_READY,
            RtError::SessionNotRunning => xr::Result::ERROR_SESSION_NOT_RUNNING,
            RtError::SessionNotStopping => xr::Result::ERROR_SESSION_NOT_STOPPING,
            RtError::SessionNotFocused => xr::Result::ERROR_SESSION_NOT_FOCUSED,
            RtError::SizeInsufficient => xr::Result::ERROR_SIZE_INSUFFICIENT,
            RtError::GraphicsDeviceInvalid => xr::Result::ERROR_GRAPHICS_DEVICE_INVALID,
            RtError::GraphicsRequirementsCallMissing => {
                xr::Result::ERROR_GRAPHICS_REQUIREMENTS_CALL_MISSING
            }
            RtError::PathFormatInvalid => xr::Result::ERROR_PATH_FORMAT_INVALID,
            RtError::PathInvalid => xr::Result::ERROR_PATH_INVALID,
            RtError::PathUnsupported => xr::Result::ERROR_PATH_UNSUPPORTED,
            RtError::NameDuplicated => xr::Result::ERROR_NAME_DUPLICATED,
            RtError::ActionTypeMismatch => xr::Result::ERROR_ACTION_TYPE_MISMATCH,
            RtError::ActionsetNotAttached => xr::Result::ERROR_ACTIONSET_NOT_ATTACHED,
            RtError::ActionsetsAlreadyAttached => xr::Result::ERROR_ACTIONSETS_ALREADY_ATTACHED,
            RtError::SwapchainRectInvalid => xr::Result::ERROR_SWAPCHAIN_RECT_INVALID,
            RtError::EnvironmentBlendModeUnsupported => {
                xr::Result::ERROR_ENVIRONMENT_BLEND_MODE_UNSUPPORTED
            }
            RtError::TimeInvalid => xr::Result::ERROR_TIME_INVALID,
            RtError::LayerInvalid => xr::Result::ERROR_LAYER_INVALID,
            RtError::InstanceLossPending => xr::Result::ERROR_INSTANCE_LOST,
            RtError::FormatUnsupported => xr::Result::ERROR_SWAPCHAIN_FORMAT_UNSUPPORTED,
            RtError::HostCallFailed(_) => xr::Result::ERROR_RUNTIME_FAILURE,
        }
    }
}

pub type RtResult<T> = Result<T, RtError>;
