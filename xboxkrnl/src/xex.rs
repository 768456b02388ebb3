//! Executable and module queries (`Xex*`)

use export_resolver::ShimCall;
use guest_abi::BigEndianCodec;
use kernel_state::KernelState;

/// Longest module name read from guest memory, terminator included
const MAX_MODULE_NAME: usize = 256;

/// `XexCheckExecutablePrivilege(privilege)`.
///
/// `privilege` is a bit position in the executable's system flags, so 6
/// asks for `XEX_SYSTEM_INSECURE_SOCKETS`. Returns a guest BOOL.
pub fn xex_check_executable_privilege(kernel: &KernelState, call: &mut ShimCall<'_>) -> u64 {
    let privilege = call.arg_u32(0);
    log::debug!("XexCheckExecutablePrivilege({:08X})", privilege);

    u64::from(kernel.check_executable_privilege(privilege))
}

/// `XexGetModuleHandle(module_name, module_handle)`.
///
/// Writes the handle of the named module. The lookup reference is dropped
/// before returning, so the guest does not own a reference through the
/// handle. Returns a guest BOOL.
pub fn xex_get_module_handle(kernel: &KernelState, call: &mut ShimCall<'_>) -> u64 {
    let module_name_ptr = call.arg_ptr(0);
    let module_handle_ptr = call.arg_ptr(1);
    log::debug!(
        "XexGetModuleHandle({:08X}, {:08X})",
        module_name_ptr,
        module_handle_ptr
    );

    if module_handle_ptr == 0 {
        return 0;
    }
    let module_name = match call.memory().load_c_string(module_name_ptr, MAX_MODULE_NAME) {
        Ok(name) => name,
        Err(err) => {
            log::warn!("XexGetModuleHandle: bad module name: {}", err);
            return 0;
        }
    };

    let module = match kernel.get_module(&module_name) {
        Ok(module) => module,
        Err(err) => {
            log::debug!("XexGetModuleHandle: {}", err);
            return 0;
        }
    };
    let handle = module.handle();
    if let Err(err) = kernel.release(&module) {
        log::error!("XexGetModuleHandle: {}", err);
    }

    match call.store_u32(module_handle_ptr, handle.as_raw()) {
        Ok(()) => 1,
        Err(err) => {
            log::warn!("XexGetModuleHandle: cannot write handle: {}", err);
            0
        }
    }
}
