//! Programmable test double for a libfabric-style RDMA library.
//!
//! The crate exports the library's C entry points (see [`shim`]) and backs
//! them with a scriptable dispatcher, [`FabricMock`]. Production transport
//! code links against the shim unmodified; test code installs a mock for the
//! duration of a test, scripts per-call return codes and side effects,
//! pre-populates completion queues, and asserts against the invocation log.
//!
//! ```no_run
//! let guard = fimock::install_mock();
//! guard.lock().expect(
//!     fimock::CallId::AvInsert,
//!     fimock::CallScript::fail(fimock::fab::FI_EINVAL),
//! );
//! // ... drive the code under test through the C surface ...
//! ```
//!
//! Everything is synchronous: an intercepted call completes before it
//! returns, and completions are only ever observed because the test enqueued
//! them first. The mock is safe to call from one thread at a time; the
//! install guard serializes tests that share the process-wide slot.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub mod fab;
pub mod mock;
pub mod shim;

pub use mock::{
    CallArgs, CallId, CallScript, CqCompletion, CqError, FabricMock, HandleKind, Invocation,
    MisuseError, SideEffect,
};

// The slot the shim dispatches through, and the lock that keeps two tests
// from sharing it. Poisoning is expected here: misuse tests panic on purpose.
static ACTIVE_MOCK: Mutex<Option<Arc<Mutex<FabricMock>>>> = Mutex::new(None);
static INSTALL_LOCK: Mutex<()> = Mutex::new(());

/// Exclusive ownership of the active mock for the duration of one test.
/// Dropping the guard clears the slot and frees every mock-side allocation.
pub struct MockGuard {
    mock: Arc<Mutex<FabricMock>>,
    _serial: MutexGuard<'static, ()>,
}

impl MockGuard {
    /// Direct access to the mock for scripting and inspection. Do not hold
    /// the returned lock across calls into the shim.
    pub fn lock(&self) -> MutexGuard<'_, FabricMock> {
        self.mock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for MockGuard {
    fn drop(&mut self) {
        let mut slot = ACTIVE_MOCK.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = None;
        self.lock().reset();
        log::debug!("install_mock - active mock torn down");
    }
}

/// Constructs a fresh [`FabricMock`] and installs it as the instance the C
/// entry points dispatch to. Blocks while another guard is alive.
pub fn install_mock() -> MockGuard {
    let serial = INSTALL_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
    let mock = Arc::new(Mutex::new(FabricMock::new()));
    {
        let mut slot = ACTIVE_MOCK.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(mock.clone());
    }
    log::debug!("install_mock - active mock installed");
    MockGuard { mock, _serial: serial }
}

/// Runs `f` against the active mock. Called from every shim entry point;
/// calling through the C surface with no mock installed is test misuse.
pub(crate) fn with_active<R>(f: impl FnOnce(&mut FabricMock) -> R) -> R {
    let mock = {
        let slot = ACTIVE_MOCK.lock().unwrap_or_else(PoisonError::into_inner);
        slot.clone()
    };
    let Some(mock) = mock else {
        panic!("libfabric mock misuse: API called with no mock installed");
    };
    let mut mock = mock.lock().unwrap_or_else(PoisonError::into_inner);
    f(&mut mock)
}
