//! C-callable callback registry for sign-in state changes and completion.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::ffi::CString;
use std::os::raw::{c_char, c_void};
use std::ptr;

// ── Callback type aliases ───────────────────────────────────────────────────

/// `fn(state_code: i32, user_context: *mut c_void)`
pub type StateCallback = Option<unsafe extern "C" fn(i32, *mut c_void)>;

/// `fn(result_code: i32, payload: *const c_char, user_context: *mut c_void)`
///
/// `payload` is the profile JSON on success, the error message otherwise.
/// It is only valid for the duration of the call.
pub type SignInCompleteCallback = Option<unsafe extern "C" fn(i32, *const c_char, *mut c_void)>;

// ── Send + Sync wrapper for raw pointers ────────────────────────────────────

/// Wrapper so that raw user-context pointers can be stored in a `Mutex`.
/// The caller is responsible for thread-safety of the pointed-to data.
#[derive(Clone, Copy)]
struct SendPtr(*mut c_void);
unsafe impl Send for SendPtr {}
unsafe impl Sync for SendPtr {}

impl Default for SendPtr {
    fn default() -> Self {
        SendPtr(ptr::null_mut())
    }
}

// ── Registry ────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct CallbackRegistry {
    state_cb: StateCallback,
    state_ctx: SendPtr,

    sign_in_cb: SignInCompleteCallback,
    sign_in_ctx: SendPtr,
}

pub static CALLBACKS: Lazy<Mutex<CallbackRegistry>> =
    Lazy::new(|| Mutex::new(CallbackRegistry::default()));

// ── Registration ────────────────────────────────────────────────────────────

pub fn register_state_callback(cb: StateCallback, ctx: *mut c_void) {
    let mut reg = CALLBACKS.lock();
    reg.state_cb = cb;
    reg.state_ctx = SendPtr(ctx);
}

pub fn register_sign_in_callback(cb: SignInCompleteCallback, ctx: *mut c_void) {
    let mut reg = CALLBACKS.lock();
    reg.sign_in_cb = cb;
    reg.sign_in_ctx = SendPtr(ctx);
}

pub fn has_sign_in_callback() -> bool {
    CALLBACKS.lock().sign_in_cb.is_some()
}

// ── Invocation helpers ──────────────────────────────────────────────────────

/// Notify the host application that the sign-in state changed.
pub fn fire_state_change(state: i32) {
    let reg = CALLBACKS.lock();
    if let Some(cb) = reg.state_cb {
        let ctx = reg.state_ctx.0;
        // Drop lock before calling into foreign code to avoid deadlocks.
        drop(reg);
        unsafe { cb(state, ctx) };
    }
}

/// Deliver the result of an asynchronous sign-in.
pub fn fire_sign_in_complete(code: i32, payload: &str) {
    let reg = CALLBACKS.lock();
    if let Some(cb) = reg.sign_in_cb {
        let ctx = reg.sign_in_ctx.0;
        drop(reg);
        if let Ok(c_payload) = CString::new(payload) {
            unsafe { cb(code, c_payload.as_ptr(), ctx) };
        }
    }
}
