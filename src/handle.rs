//! The seam between OpenXR's opaque integer handles and our internal
//! generational `slotmap` keys.
//!
//! Every non-singleton entity (`Space`, `Swapchain`, `Action`, `ActionSet`)
//! has a `slotmap::new_key_type!` key deriving [`macros::XrHandle`], which
//! wires it to the matching `openxr_sys` handle type. A handle that was
//! never issued, or was issued and then freed, decodes to *some* key value
//! but a lookup against the live `SlotMap` simply misses -- that miss is
//! what turns into `HANDLE_INVALID` at the call site.

/// Converts a slotmap key to and from the OpenXR handle type it backs.
///
/// `Raw` is one of `openxr_sys`'s generated handle types (`xr::Space`,
/// `xr::Swapchain`, ...); those types carry their own inherent
/// `from_raw`/`into_raw` pair, which is all the derive relies on.
pub trait XrHandle: slotmap::Key {
    type Raw;

    fn to_raw(self) -> Self::Raw;
    fn from_raw(raw: Self::Raw) -> Self;
}
