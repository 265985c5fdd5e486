//! Sign in with Apple SDK — C FFI entry point
//!
//! Exchanges an Apple identity token with a relying-party backend for a
//! session, then reads the user's profile with that session. Exposed as
//! `extern "C"` functions for Swift, C#, Python, and other hosts via
//! `cdylib`/`staticlib`. All async work is dispatched through the global
//! Tokio runtime.

pub mod auth;
mod callbacks;
pub mod config;
pub mod error;
mod runtime;
#[cfg(test)]
mod test_support;

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_void};
use std::ptr;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use auth::{AuthManager, IdentityAssertion, UserProfile};
use callbacks::{
    fire_sign_in_complete, fire_state_change, has_sign_in_callback, register_sign_in_callback,
    register_state_callback,
};
use config::SdkConfig;
use error::{
    clear_error, last_error_code, set_sdk_error, take_last_error, SdkError, ERROR_NOT_INITIALIZED,
    SUCCESS,
};
use runtime::runtime;

// ── Global SDK state ────────────────────────────────────────────────────────

struct SdkState {
    auth: Arc<AuthManager>,
}

static SDK: Lazy<Mutex<Option<SdkState>>> = Lazy::new(|| Mutex::new(None));

/// Clone the auth manager out of the global state so the SDK lock is not
/// held across network calls.
fn auth_manager() -> Result<Arc<AuthManager>, SdkError> {
    SDK.lock()
        .as_ref()
        .map(|state| state.auth.clone())
        .ok_or(SdkError::NotInitialized)
}

/// Record `err` as the last error and return its code.
fn fail(err: SdkError) -> i32 {
    set_sdk_error(&err);
    err.code()
}

/// Allocate a C string on the heap.  Caller frees via `siwa_free_string`.
fn to_c_string(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cs) => cs.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Read a `*const c_char` into a `&str`, returning `None` on null or invalid UTF-8.
unsafe fn from_c_str<'a>(p: *const c_char) -> Option<&'a str> {
    if p.is_null() {
        return None;
    }
    CStr::from_ptr(p).to_str().ok()
}

/// Optional string argument: null means absent, invalid UTF-8 is an error.
unsafe fn optional_c_str(p: *const c_char, name: &str) -> Result<Option<String>, SdkError> {
    if p.is_null() {
        return Ok(None);
    }
    match from_c_str(p) {
        Some(s) => Ok(Some(s.to_string())),
        None => Err(SdkError::InvalidParam(format!("{} is not valid UTF-8", name))),
    }
}

/// Build an assertion from raw FFI arguments. A null token is passed through
/// as missing so the exchange reports it.
unsafe fn assertion_from_raw(
    identity_token: *const u8,
    identity_token_len: usize,
    email: *const c_char,
    first_name: *const c_char,
    last_name: *const c_char,
) -> Result<IdentityAssertion, SdkError> {
    let token = if identity_token.is_null() {
        None
    } else {
        Some(std::slice::from_raw_parts(identity_token, identity_token_len).to_vec())
    };

    Ok(IdentityAssertion {
        token,
        email: optional_c_str(email, "email")?,
        first_name: optional_c_str(first_name, "first_name")?,
        last_name: optional_c_str(last_name, "last_name")?,
    })
}

/// Drive `fut` to completion on the SDK runtime.
///
/// Refused on a thread that is already inside a Tokio runtime, which covers
/// every SDK callback: nesting `block_on` there would panic across the C ABI.
fn block_on<F: std::future::Future>(fut: F) -> Result<F::Output, SdkError> {
    if tokio::runtime::Handle::try_current().is_ok() {
        return Err(SdkError::Busy(
            "blocking SDK calls are not allowed from SDK callbacks".into(),
        ));
    }
    Ok(runtime().block_on(fut))
}

fn profile_json(profile: &UserProfile) -> Result<String, SdkError> {
    serde_json::to_string(profile)
        .map_err(|e| SdkError::Internal(format!("Failed to encode profile: {}", e)))
}

fn init_with(config: Result<SdkConfig, SdkError>) -> i32 {
    let mut guard = SDK.lock();
    if guard.is_some() {
        log::warn!("SIWA SDK already initialised; ignoring new configuration");
        return SUCCESS;
    }

    // Initialise logger (ignore errors if already set)
    let _ = env_logger::try_init();

    log::info!("SIWA SDK v{} initialising", env!("CARGO_PKG_VERSION"));

    let config = match config {
        Ok(c) => c,
        Err(e) => return fail(e),
    };

    let mut auth = match AuthManager::new(&config) {
        Ok(a) => a,
        Err(e) => return fail(e),
    };
    auth.set_state_listener(|state| fire_state_change(state.as_code()));

    *guard = Some(SdkState {
        auth: Arc::new(auth),
    });

    log::info!(
        "SIWA SDK initialised (backend {}, timeout {}s)",
        config.base_url,
        config.timeout_secs
    );
    SUCCESS
}

// ═══════════════════════════════════════════════════════════════════════════
//  Core (5)
// ═══════════════════════════════════════════════════════════════════════════

/// Initialise the SDK from defaults and `SIWA_*` environment variables.
/// Returns 0 on success, negative on error.
#[no_mangle]
pub extern "C" fn siwa_init() -> i32 {
    clear_error();
    init_with(SdkConfig::from_env())
}

/// Initialise the SDK with JSON options layered over the environment.
///
/// JSON shape: `{"base_url":"https://...","timeout_secs":30,"user_agent":"..."}`,
/// all fields optional.
#[no_mangle]
pub unsafe extern "C" fn siwa_init_ex(options_json: *const c_char) -> i32 {
    clear_error();

    let raw = match from_c_str(options_json) {
        Some(s) => s,
        None => {
            return fail(SdkError::InvalidParam(
                "options_json is null or invalid".into(),
            ))
        }
    };

    init_with(SdkConfig::from_env().and_then(|c| c.with_options_json(raw)))
}

/// Tear down the SDK: drop the session and all state.
#[no_mangle]
pub extern "C" fn siwa_cleanup() {
    clear_error();

    // Release the SDK lock before signing out: the state callback may call
    // back into the SDK.
    let taken = SDK.lock().take();
    if let Some(state) = taken {
        state.auth.sign_out();
        log::info!("SIWA SDK cleaned up");
    }
}

/// Return the SDK version string.  Caller must free with `siwa_free_string`.
#[no_mangle]
pub extern "C" fn siwa_version() -> *mut c_char {
    to_c_string(env!("CARGO_PKG_VERSION"))
}

/// Free a string previously returned by the SDK.
#[no_mangle]
pub unsafe extern "C" fn siwa_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  Auth (8)
// ═══════════════════════════════════════════════════════════════════════════

/// Sign in with the identity token from an Apple ID authorization.
/// Blocks until the exchange and profile fetch finish.  Returns 0 on success.
///
/// `identity_token` points to `identity_token_len` bytes; every string
/// argument may be null.
///
/// Must not be called from an SDK callback; there it fails with
/// `ERROR_BUSY`.  Use `siwa_auth_sign_in_async` instead.
#[no_mangle]
pub unsafe extern "C" fn siwa_auth_sign_in(
    identity_token: *const u8,
    identity_token_len: usize,
    email: *const c_char,
    first_name: *const c_char,
    last_name: *const c_char,
) -> i32 {
    clear_error();

    let assertion =
        match assertion_from_raw(identity_token, identity_token_len, email, first_name, last_name) {
            Ok(a) => a,
            Err(e) => return fail(e),
        };
    let auth = match auth_manager() {
        Ok(a) => a,
        Err(e) => return fail(e),
    };

    match block_on(auth.sign_in(assertion)) {
        Ok(Ok(_)) => SUCCESS,
        Ok(Err(e)) => fail(e.into()),
        Err(e) => fail(e),
    }
}

/// Start a sign-in in the background and return immediately.
///
/// The result arrives through the callback registered with
/// `siwa_on_sign_in_complete`: code 0 with the profile JSON, or a negative
/// code with the error message.  Returns 0 if the attempt was started.
#[no_mangle]
pub unsafe extern "C" fn siwa_auth_sign_in_async(
    identity_token: *const u8,
    identity_token_len: usize,
    email: *const c_char,
    first_name: *const c_char,
    last_name: *const c_char,
) -> i32 {
    clear_error();

    let assertion =
        match assertion_from_raw(identity_token, identity_token_len, email, first_name, last_name) {
            Ok(a) => a,
            Err(e) => return fail(e),
        };
    let auth = match auth_manager() {
        Ok(a) => a,
        Err(e) => return fail(e),
    };

    if !has_sign_in_callback() {
        log::warn!("Async sign-in started without a completion callback registered");
    }

    runtime().spawn(async move {
        let outcome = auth
            .sign_in(assertion)
            .await
            .map_err(SdkError::from)
            .and_then(|profile| profile_json(&profile));
        match outcome {
            Ok(json) => fire_sign_in_complete(SUCCESS, &json),
            Err(e) => {
                set_sdk_error(&e);
                fire_sign_in_complete(e.code(), &e.to_string());
            }
        }
    });

    SUCCESS
}

/// Fetch the signed-in user's profile from the backend as JSON.
/// Returns null on error.  Caller must free the returned string.
/// Must not be called from an SDK callback (fails with `ERROR_BUSY`).
///
/// JSON shape: `{"id":"...","email":"...","firstName":null,"lastName":null}`
#[no_mangle]
pub extern "C" fn siwa_auth_fetch_profile_json() -> *mut c_char {
    clear_error();

    let auth = match auth_manager() {
        Ok(a) => a,
        Err(e) => {
            set_sdk_error(&e);
            return ptr::null_mut();
        }
    };

    let outcome = block_on(auth.fetch_profile())
        .and_then(|fetched| fetched.map_err(SdkError::from))
        .and_then(|profile| profile_json(&profile));
    match outcome {
        Ok(json) => to_c_string(&json),
        Err(e) => {
            set_sdk_error(&e);
            ptr::null_mut()
        }
    }
}

/// Get the profile from the last successful sign-in as JSON, without a
/// network call.  Returns null if not signed in.  Caller must free the
/// returned string.
#[no_mangle]
pub extern "C" fn siwa_auth_get_user_json() -> *mut c_char {
    clear_error();

    let auth = match auth_manager() {
        Ok(a) => a,
        Err(e) => {
            set_sdk_error(&e);
            return ptr::null_mut();
        }
    };

    match auth.current_user().map(|user| profile_json(&user)) {
        Some(Ok(json)) => to_c_string(&json),
        Some(Err(e)) => {
            set_sdk_error(&e);
            ptr::null_mut()
        }
        None => ptr::null_mut(),
    }
}

/// Sign out and drop the session token.
#[no_mangle]
pub extern "C" fn siwa_auth_sign_out() {
    clear_error();

    if let Ok(auth) = auth_manager() {
        auth.sign_out();
    }
}

/// Check if a user is currently signed in.  Returns 1 or 0.
#[no_mangle]
pub extern "C" fn siwa_auth_is_signed_in() -> i32 {
    match auth_manager() {
        Ok(auth) if auth.is_signed_in() => 1,
        _ => 0,
    }
}

/// Current sign-in state code: 0 idle, 1 exchanging, 2 fetching profile,
/// 3 signed in, -1 failed.  Returns `ERROR_NOT_INITIALIZED` before init.
#[no_mangle]
pub extern "C" fn siwa_auth_get_state() -> i32 {
    match auth_manager() {
        Ok(auth) => auth.state().as_code(),
        Err(_) => ERROR_NOT_INITIALIZED,
    }
}

/// Reset a failed sign-in back to idle.
#[no_mangle]
pub extern "C" fn siwa_auth_clear_error() {
    if let Ok(auth) = auth_manager() {
        auth.clear_error();
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  Callbacks (2)
// ═══════════════════════════════════════════════════════════════════════════

/// Register a callback for sign-in state changes.
///
/// The callback may query the SDK but must not make blocking calls such as
/// `siwa_auth_sign_in`.
///
/// Signature: `fn(state_code: i32, user_context: *mut c_void)`
#[no_mangle]
pub extern "C" fn siwa_on_state_change(
    cb: Option<unsafe extern "C" fn(i32, *mut c_void)>,
    ctx: *mut c_void,
) {
    register_state_callback(cb, ctx);
}

/// Register a callback for `siwa_auth_sign_in_async` completion.
///
/// Signature: `fn(result_code: i32, payload: *const c_char, user_context: *mut c_void)`
#[no_mangle]
pub extern "C" fn siwa_on_sign_in_complete(
    cb: Option<unsafe extern "C" fn(i32, *const c_char, *mut c_void)>,
    ctx: *mut c_void,
) {
    register_sign_in_callback(cb, ctx);
}

// ═══════════════════════════════════════════════════════════════════════════
//  Error (3)
// ═══════════════════════════════════════════════════════════════════════════

/// Get the last error message.  Returns null if no error.
/// Caller must free the returned string.
#[no_mangle]
pub extern "C" fn siwa_get_last_error() -> *mut c_char {
    match take_last_error() {
        Some(msg) => to_c_string(&msg),
        None => ptr::null_mut(),
    }
}

/// Get the last error code.  Returns 0 (`SUCCESS`) if no error.
#[no_mangle]
pub extern "C" fn siwa_get_last_error_code() -> i32 {
    last_error_code()
}

/// Clear the stored error state.
#[no_mangle]
pub extern "C" fn siwa_clear_error() {
    clear_error();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{
        ERROR_AUTH, ERROR_BUSY, ERROR_CONFIG, ERROR_INVALID_PARAM, ERROR_UNAUTHORIZED,
    };
    use crate::test_support::FFI_TEST_LOCK;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::mpsc;
    use std::time::{Duration, Instant};

    /// Loopback port nothing listens on; no test here reaches the network.
    const OFFLINE_OPTIONS: &[u8] = b"{\"base_url\":\"http://127.0.0.1:9\",\"timeout_secs\":1}\0";

    fn last_error_message() -> String {
        let ptr = siwa_get_last_error();
        assert!(!ptr.is_null());
        let msg = unsafe { CStr::from_ptr(ptr) }.to_string_lossy().to_string();
        unsafe { siwa_free_string(ptr) };
        msg
    }

    #[test]
    fn calls_before_init_report_not_initialized() {
        let _guard = FFI_TEST_LOCK.lock();
        siwa_cleanup();

        assert!(siwa_auth_fetch_profile_json().is_null());
        assert_eq!(siwa_get_last_error_code(), ERROR_NOT_INITIALIZED);
        assert_eq!(siwa_auth_get_state(), ERROR_NOT_INITIALIZED);
        assert_eq!(siwa_auth_is_signed_in(), 0);

        let token = b"abc";
        let code = unsafe {
            siwa_auth_sign_in(token.as_ptr(), token.len(), ptr::null(), ptr::null(), ptr::null())
        };
        assert_eq!(code, ERROR_NOT_INITIALIZED);
    }

    #[test]
    fn init_ex_rejects_bad_options() {
        let _guard = FFI_TEST_LOCK.lock();
        siwa_cleanup();

        let code = unsafe { siwa_init_ex(b"{not-json}\0".as_ptr() as *const c_char) };
        assert_eq!(code, ERROR_INVALID_PARAM);

        let code = unsafe { siwa_init_ex(b"{\"timeout_secs\":0}\0".as_ptr() as *const c_char) };
        assert_eq!(code, ERROR_CONFIG);

        let code = unsafe { siwa_init_ex(ptr::null()) };
        assert_eq!(code, ERROR_INVALID_PARAM);
        assert_eq!(siwa_auth_get_state(), ERROR_NOT_INITIALIZED);
    }

    #[test]
    fn profile_fetch_without_session_is_unauthorized() {
        let _guard = FFI_TEST_LOCK.lock();
        siwa_cleanup();
        assert_eq!(unsafe { siwa_init_ex(OFFLINE_OPTIONS.as_ptr() as *const c_char) }, SUCCESS);

        assert_eq!(siwa_auth_get_state(), 0);
        assert!(siwa_auth_fetch_profile_json().is_null());
        assert_eq!(siwa_get_last_error_code(), ERROR_UNAUTHORIZED);
        assert!(siwa_auth_get_user_json().is_null());

        siwa_cleanup();
    }

    #[test]
    fn sign_in_without_token_fails_exchange() {
        let _guard = FFI_TEST_LOCK.lock();
        siwa_cleanup();
        assert_eq!(unsafe { siwa_init_ex(OFFLINE_OPTIONS.as_ptr() as *const c_char) }, SUCCESS);

        let code = unsafe {
            siwa_auth_sign_in(
                ptr::null(),
                0,
                b"a@example.com\0".as_ptr() as *const c_char,
                ptr::null(),
                ptr::null(),
            )
        };
        assert_eq!(code, ERROR_AUTH);
        assert!(last_error_message().contains("Identity token missing"));
        assert_eq!(siwa_auth_get_state(), -1);

        siwa_auth_clear_error();
        assert_eq!(siwa_auth_get_state(), 0);

        siwa_cleanup();
    }

    #[test]
    fn sign_in_rejects_non_utf8_name() {
        let _guard = FFI_TEST_LOCK.lock();
        siwa_cleanup();
        assert_eq!(unsafe { siwa_init_ex(OFFLINE_OPTIONS.as_ptr() as *const c_char) }, SUCCESS);

        let token = b"abc";
        let bad_name = [0xffu8, 0xfe, 0x00];
        let code = unsafe {
            siwa_auth_sign_in(
                token.as_ptr(),
                token.len(),
                ptr::null(),
                bad_name.as_ptr() as *const c_char,
                ptr::null(),
            )
        };
        assert_eq!(code, ERROR_INVALID_PARAM);
        assert!(last_error_message().contains("first_name"));

        siwa_cleanup();
    }

    static ASYNC_CODE: AtomicI32 = AtomicI32::new(1);

    unsafe extern "C" fn async_cb(code: i32, _payload: *const c_char, _ctx: *mut c_void) {
        ASYNC_CODE.store(code, Ordering::SeqCst);
    }

    #[test]
    fn async_sign_in_reports_through_callback() {
        let _guard = FFI_TEST_LOCK.lock();
        siwa_cleanup();
        assert_eq!(unsafe { siwa_init_ex(OFFLINE_OPTIONS.as_ptr() as *const c_char) }, SUCCESS);

        ASYNC_CODE.store(1, Ordering::SeqCst);
        siwa_on_sign_in_complete(Some(async_cb), ptr::null_mut());

        let code = unsafe {
            siwa_auth_sign_in_async(ptr::null(), 0, ptr::null(), ptr::null(), ptr::null())
        };
        assert_eq!(code, SUCCESS);

        let deadline = Instant::now() + Duration::from_secs(5);
        while ASYNC_CODE.load(Ordering::SeqCst) == 1 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(ASYNC_CODE.load(Ordering::SeqCst), ERROR_AUTH);

        siwa_on_sign_in_complete(None, ptr::null_mut());
        siwa_cleanup();
    }

    static OBSERVED_STATE: AtomicI32 = AtomicI32::new(i32::MIN);

    unsafe extern "C" fn querying_state_cb(_code: i32, _ctx: *mut c_void) {
        OBSERVED_STATE.store(siwa_auth_get_state(), Ordering::SeqCst);
    }

    #[test]
    fn cleanup_lets_state_callback_query_the_sdk() {
        let _guard = FFI_TEST_LOCK.lock();
        siwa_cleanup();
        assert_eq!(unsafe { siwa_init_ex(OFFLINE_OPTIONS.as_ptr() as *const c_char) }, SUCCESS);

        OBSERVED_STATE.store(i32::MIN, Ordering::SeqCst);
        siwa_on_state_change(Some(querying_state_cb), ptr::null_mut());

        let (done_tx, done_rx) = mpsc::channel();
        std::thread::spawn(move || {
            siwa_cleanup();
            let _ = done_tx.send(());
        });
        let finished = done_rx.recv_timeout(Duration::from_secs(3)).is_ok();
        siwa_on_state_change(None, ptr::null_mut());

        assert!(finished, "siwa_cleanup did not return");
        assert_eq!(OBSERVED_STATE.load(Ordering::SeqCst), ERROR_NOT_INITIALIZED);
    }

    #[test]
    fn blocking_calls_inside_the_runtime_are_refused() {
        let _guard = FFI_TEST_LOCK.lock();
        siwa_cleanup();
        assert_eq!(unsafe { siwa_init_ex(OFFLINE_OPTIONS.as_ptr() as *const c_char) }, SUCCESS);

        let (profile_null, profile_code, sign_in_code) = runtime().block_on(async {
            let profile = siwa_auth_fetch_profile_json();
            let profile_code = siwa_get_last_error_code();
            let token = b"abc";
            let sign_in_code = unsafe {
                siwa_auth_sign_in(
                    token.as_ptr(),
                    token.len(),
                    ptr::null(),
                    ptr::null(),
                    ptr::null(),
                )
            };
            (profile.is_null(), profile_code, sign_in_code)
        });

        assert!(profile_null);
        assert_eq!(profile_code, ERROR_BUSY);
        assert_eq!(sign_in_code, ERROR_BUSY);
        assert!(last_error_message().contains("SDK callbacks"));
        assert_eq!(siwa_auth_get_state(), 0);

        siwa_cleanup();
    }

    #[test]
    fn version_round_trips_through_c_string() {
        let ptr = siwa_version();
        let version = unsafe { CStr::from_ptr(ptr) }.to_string_lossy().to_string();
        unsafe { siwa_free_string(ptr) };
        assert_eq!(version, env!("CARGO_PKG_VERSION"));
    }
}
