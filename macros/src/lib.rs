use proc_macro::TokenStream;
use quote::quote;
use syn::{DeriveInput, LitStr};

/// Derives the conversion between a `slotmap` key type (as produced by
/// `slotmap::new_key_type!`) and the OpenXR handle type it backs.
///
/// ```ignore
/// slotmap::new_key_type! {
///     #[derive(macros::XrHandle)]
///     #[xr_handle(raw = "openxr_sys::Space")]
///     pub struct SpaceKey;
/// }
/// ```
///
/// generates `impl XrHandle for SpaceKey`, converting the key's `KeyData`
/// losslessly to and from the handle's `u64` representation. A stale or
/// never-issued handle decodes to a key that a lookup in the owning
/// `SlotMap` will simply miss -- callers translate that into `HANDLE_INVALID`
/// rather than the derive doing so, since the session/instance distinction
/// on the error isn't visible here.
#[proc_macro_derive(XrHandle, attributes(xr_handle))]
pub fn derive_xr_handle(tokens: TokenStream) -> TokenStream {
    let input: DeriveInput = syn::parse(tokens).unwrap();
    let name = input.ident;

    let raw_attr = input
        .attrs
        .iter()
        .find(|a| a.path().is_ident("xr_handle"))
        .expect("missing #[xr_handle(raw = \"...\")] attribute");

    let mut raw_ty: Option<LitStr> = None;
    raw_attr
        .parse_nested_meta(|meta| {
            if meta.path.is_ident("raw") {
                let value = meta.value()?;
                raw_ty = Some(value.parse()?);
                Ok(())
            } else {
                Err(meta.error("expected `raw`"))
            }
        })
        .expect("parsing xr_handle attribute failed");

    let raw_ty: syn::Type = raw_ty
        .expect("xr_handle attribute requires `raw = \"...\"`")
        .parse()
        .expect("raw type must be a valid type path");

    quote! {
        impl crate::handle::XrHandle for #name {
            type Raw = #raw_ty;

            fn to_raw(self) -> Self::Raw {
                <#raw_ty>::from_raw(slotmap::Key::data(&self).as_ffi())
            }

            fn from_raw(raw: Self::Raw) -> Self {
                <Self as From<slotmap::KeyData>>::from(slotmap::KeyData::from_ffi(raw.into_raw()))
            }
        }
    }
    .into()
}
