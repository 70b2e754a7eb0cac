#![deny(clippy::all)]

mod dispatch;
mod errors;
mod events;
mod frame;
mod graphics;
mod handle;
mod input;
mod instance;
mod path_interner;
mod pose;
mod runtime;
mod session;
mod settings;
mod spaces;
mod swapchain;
mod time;

use openxr_sys as xr;
use std::ffi::{c_char, CStr};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

macro_rules! warn_unimplemented {
    ($function:literal) => {
        crate::warn_once!("{} unimplemented ({}:{})", $function, file!(), line!());
    };
}
pub(crate) use warn_unimplemented;

macro_rules! warn_once {
    ($literal:literal $(,$($tt:tt)*)?) => {{
        static ONCE: std::sync::Once = std::sync::Once::new();
        ONCE.call_once(|| {
            log::warn!(concat!("[ONCE] ", $literal) $(,$($tt)*)?);
        });
    }}
}
pub(crate) use warn_once;

#[cfg(feature = "tracing")]
macro_rules! tracy_span {
    ($($tt:tt)*) => {
        let _span = tracy_client::span!($($tt)*);
    }
}

#[cfg(not(feature = "tracing"))]
macro_rules! tracy_span {
    ($($tt:tt)*) => {};
}
pub(crate) use tracy_span;

#[cfg(feature = "tracing")]
tracy_client::register_demangler!();

macro_rules! atomic_float {
    ($name:ident, $float:ty, $atomic:ty) => {
        #[derive(Default)]
        struct $name($atomic);

        impl $name {
            #[allow(dead_code)]
            fn new(value: $float) -> Self {
                Self(value.to_bits().into())
            }

            #[allow(dead_code)]
            #[inline]
            fn load(&self) -> $float {
                <$float>::from_bits(self.0.load(Ordering::Relaxed))
            }

            #[allow(dead_code)]
            #[inline]
            fn store(&self, value: $float) {
                self.0.store(value.to_bits(), Ordering::Relaxed)
            }
        }
    };
}

atomic_float!(AtomicF32, f32, AtomicU32);
atomic_float!(AtomicF64, f64, AtomicU64);

/// Sets up `env_logger` writing to both stderr and a rotating-by-launch
/// log file under the XDG state dir, plus a panic hook that logs the
/// backtrace before aborting. Runs once per process regardless of how
/// many times the loader calls into us.
fn init_logging() {
    static ONCE: std::sync::Once = std::sync::Once::new();

    ONCE.call_once(|| {
        let mut builder = env_logger::Builder::new();
        #[allow(unused_mut)]
        let mut startup_err: Option<String> = None;

        #[cfg(not(test))]
        {
            use std::path::Path;

            struct ComboWriter(std::fs::File, std::io::Stderr);

            impl std::io::Write for ComboWriter {
                fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                    let _ = self.0.write(buf)?;
                    self.1.write(buf)
                }

                fn flush(&mut self) -> std::io::Result<()> {
                    self.0.flush()?;
                    self.1.flush()
                }
            }

            let state_dir = std::env::var("XDG_STATE_HOME")
                .or_else(|_| std::env::var("HOME").map(|h| h + "/.local/state"));

            if let Ok(state) = state_dir {
                let path = Path::new(&state).join("novaxr");
                let mut setup = || {
                    let path = path.join("novaxr.log");
                    match std::fs::File::create(path) {
                        Ok(file) => {
                            let writer = ComboWriter(file, std::io::stderr());
                            builder.target(env_logger::Target::Pipe(Box::new(writer)));
                        }
                        Err(e) => startup_err = Some(format!("Failed to create log file: {e:?}")),
                    }
                };

                match std::fs::create_dir_all(&path) {
                    Ok(_) => setup(),
                    Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => setup(),
                    err => {
                        startup_err = Some(format!(
                            "Failed to create log directory ({path:?}): {err:?}"
                        ))
                    }
                }
            }

            std::panic::set_hook(Box::new(|info| {
                log::error!("{info}");
                let backtrace = std::backtrace::Backtrace::force_capture();
                log::error!("Backtrace: \n{backtrace}");
            }));
        }

        // safety: runtime is single-threaded at startup and never changes
        // its own timezone; local-offset's soundness hole doesn't apply.
        unsafe {
            time::util::local_offset::set_soundness(time::util::local_offset::Soundness::Unsound)
        };

        builder
            .filter_level(log::LevelFilter::Info)
            .parse_default_env()
            .is_test(cfg!(test))
            .format(|buf, record| {
                use std::io::Write;
                use time::macros::format_description;

                let style = buf.default_level_style(record.level());
                let now = time::OffsetDateTime::now_local()
                    .unwrap_or_else(|_| time::OffsetDateTime::now_utc());
                let now = now
                    .format(format_description!(
                        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]"
                    ))
                    .unwrap();

                write!(buf, "[{now} {style}{:5}{style:#}", record.level())?;
                if let Some(path) = record.module_path() {
                    write!(buf, " {}", path)?;
                }
                writeln!(buf, " {:?}] {}", std::thread::current().id(), record.args())
            })
            .init();

        log::info!("Initializing NovaXR");
        if let Some(err) = startup_err {
            log::warn!("{err}");
        }
    });
}

fn result_to_code(result: Result<(), errors::RtError>) -> xr::Result {
    match result {
        Ok(()) => xr::Result::SUCCESS,
        Err(e) => e.into(),
    }
}

/// The loader/runtime negotiation ABI predates `xrCreateInstance` and
/// isn't part of the versioned core API `openxr-sys` binds, so the
/// structures are reproduced here from the `XR_LOADER_INTERFACE_*`
/// section of the loader negotiation header.
const LOADER_INTERFACE_STRUCT_LOADER_INFO: u32 = 1;
const LOADER_INTERFACE_STRUCT_RUNTIME_REQUEST: u32 = 2;
const LOADER_INFO_STRUCT_VERSION: u32 = 1;
const RUNTIME_INTERFACE_VERSION: u32 = 1;

#[repr(C)]
pub struct NegotiateLoaderInfo {
    pub struct_type: u32,
    pub struct_version: u32,
    pub struct_size: usize,
    pub min_interface_version: u32,
    pub max_interface_version: u32,
    pub min_api_version: xr::Version,
    pub max_api_version: xr::Version,
}

#[repr(C)]
pub struct NegotiateRuntimeRequest {
    pub struct_type: u32,
    pub struct_version: u32,
    pub struct_size: usize,
    pub runtime_interface_version: u32,
    pub runtime_api_version: xr::Version,
    pub get_instance_proc_addr: Option<xr::pfn::GetInstanceProcAddr>,
}

/// # Safety
///
/// Per the OpenXR loader/runtime negotiation ABI: `info` and `api` must
/// point to valid, correctly-sized structures for the duration of the call.
#[no_mangle]
pub unsafe extern "C" fn xrNegotiateLoaderRuntimeInterface(
    info: *const NegotiateLoaderInfo,
    api: *mut NegotiateRuntimeRequest,
) -> xr::Result {
    init_logging();
    let info = match unsafe { info.as_ref() } {
        Some(info) => info,
        None => return xr::Result::ERROR_INITIALIZATION_FAILED,
    };
    if info.struct_type != LOADER_INTERFACE_STRUCT_LOADER_INFO
        || info.struct_version != LOADER_INFO_STRUCT_VERSION
        || info.min_interface_version > RUNTIME_INTERFACE_VERSION
        || info.max_interface_version < RUNTIME_INTERFACE_VERSION
    {
        return xr::Result::ERROR_INITIALIZATION_FAILED;
    }
    let api = match unsafe { api.as_mut() } {
        Some(api) => api,
        None => return xr::Result::ERROR_INITIALIZATION_FAILED,
    };
    api.struct_type = LOADER_INTERFACE_STRUCT_RUNTIME_REQUEST;
    api.struct_version = LOADER_INFO_STRUCT_VERSION;
    api.runtime_interface_version = RUNTIME_INTERFACE_VERSION;
    api.runtime_api_version = xr::Version::new(1, 0, 0);
    api.get_instance_proc_addr = Some(dispatch::xrGetInstanceProcAddr);
    xr::Result::SUCCESS
}

/// # Safety
///
/// `instance_name` must be a valid pointer for the lifetime of the call.
#[no_mangle]
pub unsafe extern "C" fn xrGetInstanceProcAddr(
    instance: xr::Instance,
    name: *const c_char,
    function: *mut Option<xr::pfn::VoidFunction>,
) -> xr::Result {
    unsafe { dispatch::xrGetInstanceProcAddr(instance, name, function) }
}

pub(crate) fn cstr_to_string(ptr: *const c_char) -> RtResult<String> {
    if ptr.is_null() {
        return Err(errors::RtError::ValidationFailure);
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map(str::to_owned)
        .map_err(|_| errors::RtError::ValidationFailure)
}

use errors::RtResult;
