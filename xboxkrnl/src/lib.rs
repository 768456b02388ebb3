//! # xboxkrnl.exe
//!
//! Host implementations of kernel exports. Each shim reads its declared
//! arguments from the [`ShimCall`], talks to the [`KernelState`] or the
//! virtual filesystem, writes out-parameters big-endian and returns the
//! value for the guest's return register.
//!
//! [`register_module_exports`] binds every export by name and, where the
//! ordinal is known, by ordinal.

pub mod file;
pub mod xconfig;
pub mod xex;

use export_resolver::{ExportEntry, ExportResolver, ShimCall};
use guest_abi::ArgWidth;
use kernel_state::KernelState;
use std::sync::Arc;

pub use xconfig::{FixedSetting, SettingQuery, SettingValue, XCONFIG_SETTINGS};

/// Import library name titles link against
pub const MODULE_NAME: &str = "xboxkrnl.exe";

pub const ORDINAL_EX_GET_XCONFIG_SETTING: u16 = 0x0010;
pub const ORDINAL_XEX_CHECK_EXECUTABLE_PRIVILEGE: u16 = 0x0194;
pub const ORDINAL_XEX_GET_MODULE_HANDLE: u16 = 0x0195;

const EX_GET_XCONFIG_SETTING_ARGS: &[ArgWidth] = &[
    ArgWidth::U16,
    ArgWidth::U16,
    ArgWidth::Pointer,
    ArgWidth::U16,
    ArgWidth::Pointer,
];
const XEX_CHECK_EXECUTABLE_PRIVILEGE_ARGS: &[ArgWidth] = &[ArgWidth::U32];
const XEX_GET_MODULE_HANDLE_ARGS: &[ArgWidth] = &[ArgWidth::Pointer, ArgWidth::Pointer];
const NT_QUERY_FULL_ATTRIBUTES_FILE_ARGS: &[ArgWidth] = &[ArgWidth::Pointer, ArgWidth::Pointer];

fn bind<F>(
    entries: &mut Vec<ExportEntry>,
    name: &str,
    ordinal: Option<u16>,
    signature: &'static [ArgWidth],
    shim: F,
) where
    F: Fn(&mut ShimCall<'_>) -> u64 + Clone + Send + Sync + 'static,
{
    if let Some(ordinal) = ordinal {
        entries.push(ExportEntry::function(MODULE_NAME, ordinal, signature, shim.clone()));
    }
    entries.push(ExportEntry::function(MODULE_NAME, name, signature, shim));
}

/// Binds the xboxkrnl exports against `kernel`.
///
/// Calling this again with another kernel rebinds every export to it.
/// Returns the number of keys bound.
pub fn register_module_exports(resolver: &ExportResolver, kernel: Arc<KernelState>) -> usize {
    let mut entries = Vec::new();

    bind(
        &mut entries,
        "ExGetXConfigSetting",
        Some(ORDINAL_EX_GET_XCONFIG_SETTING),
        EX_GET_XCONFIG_SETTING_ARGS,
        xconfig::ex_get_xconfig_setting,
    );

    let state = Arc::clone(&kernel);
    bind(
        &mut entries,
        "XexCheckExecutablePrivilege",
        Some(ORDINAL_XEX_CHECK_EXECUTABLE_PRIVILEGE),
        XEX_CHECK_EXECUTABLE_PRIVILEGE_ARGS,
        move |call: &mut ShimCall<'_>| xex::xex_check_executable_privilege(&state, call),
    );

    let state = Arc::clone(&kernel);
    bind(
        &mut entries,
        "XexGetModuleHandle",
        Some(ORDINAL_XEX_GET_MODULE_HANDLE),
        XEX_GET_MODULE_HANDLE_ARGS,
        move |call: &mut ShimCall<'_>| xex::xex_get_module_handle(&state, call),
    );

    let state = kernel;
    bind(
        &mut entries,
        "NtQueryFullAttributesFile",
        None,
        NT_QUERY_FULL_ATTRIBUTES_FILE_ARGS,
        move |call: &mut ShimCall<'_>| file::nt_query_full_attributes_file(&state, call),
    );

    let count = resolver.register_exports(entries);
    log::debug!("registered {} {} exports", count, MODULE_NAME);
    count
}
