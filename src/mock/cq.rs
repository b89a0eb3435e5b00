//! Completion queue emulator. Each open CQ holds one ordered, bounded event
//! queue mixing normal completions and error entries; keeping them in a
//! single FIFO is what lets a plain read refuse to skip past a pending error
//! while `readerr` drains errors in the order they were recorded.

use std::collections::VecDeque;
use std::ffi::{CStr, c_char, c_int, c_void};
use std::ptr;

use dashmap::DashMap;

use crate::fab::{
    self, fi_addr_t, fi_cq_data_entry, fi_cq_err_entry,
};

pub const DEFAULT_CQ_DEPTH: usize = 1024;

/// One successful work completion, pre-populated by the test.
#[derive(Debug, Clone)]
pub struct CqCompletion {
    pub op_context: u64,
    pub flags: u64,
    pub len: usize,
    pub buf: u64,
    pub data: u64,
    /// Written by `readfrom`; `FI_ADDR_UNSPEC` goes out when absent.
    pub src_addr: Option<fi_addr_t>,
}

impl CqCompletion {
    pub fn new(op_context: u64, len: usize) -> Self {
        CqCompletion {
            op_context,
            flags: 0,
            len,
            buf: 0,
            data: 0,
            src_addr: None,
        }
    }

    pub fn from_addr(mut self, src_addr: fi_addr_t) -> Self {
        self.src_addr = Some(src_addr);
        self
    }

    pub fn with_data(mut self, data: u64) -> Self {
        self.data = data;
        self
    }

    pub fn with_flags(mut self, flags: u64) -> Self {
        self.flags = flags;
        self
    }

    fn write_entry(&self, slot: *mut fi_cq_data_entry) {
        unsafe {
            *slot = fi_cq_data_entry {
                op_context: self.op_context as *mut c_void,
                flags: self.flags,
                len: self.len,
                buf: self.buf as *mut c_void,
                data: self.data,
            };
        }
    }
}

/// One failed work completion, retrievable only through `readerr`.
#[derive(Debug, Clone)]
pub struct CqError {
    pub op_context: u64,
    pub flags: u64,
    pub len: usize,
    pub err: i64,
    pub prov_errno: i32,
    pub err_data: Vec<u8>,
}

impl CqError {
    pub fn new(op_context: u64, err: i64, prov_errno: i32) -> Self {
        CqError {
            op_context,
            flags: 0,
            len: 0,
            err: err.abs(),
            prov_errno,
            err_data: Vec::new(),
        }
    }

    pub fn with_err_data(mut self, err_data: Vec<u8>) -> Self {
        self.err_data = err_data;
        self
    }
}

#[derive(Debug, Clone)]
enum CqEvent {
    Comp(CqCompletion),
    Err(CqError),
}

#[derive(Debug)]
struct CqState {
    depth: usize,
    events: VecDeque<CqEvent>,
    // Backing storage for the err_data pointer handed out by the most
    // recent readerr; stays valid until the next readerr or close.
    last_err_data: Option<Box<[u8]>>,
}

/// Queue table keyed by CQ handle. The sharded map gives each queue its own
/// critical section, which is all the mutual exclusion multi-threaded
/// polling needs.
#[derive(Debug, Default)]
pub struct CqEmulator {
    queues: DashMap<u64, CqState>,
}

impl CqEmulator {
    pub fn new() -> Self {
        CqEmulator { queues: DashMap::new() }
    }

    /// Registers a queue at open time. Re-opening a preminted queue keeps
    /// whatever the test already enqueued.
    pub fn register(&self, cq: u64, depth: usize) {
        let depth = if depth == 0 { DEFAULT_CQ_DEPTH } else { depth };
        self.queues.entry(cq).or_insert_with(|| CqState {
            depth,
            events: VecDeque::new(),
            last_err_data: None,
        });
    }

    pub fn remove(&self, cq: u64) {
        self.queues.remove(&cq);
    }

    pub fn is_registered(&self, cq: u64) -> bool {
        self.queues.contains_key(&cq)
    }

    pub fn pending(&self, cq: u64) -> usize {
        self.queues.get(&cq).map(|s| s.events.len()).unwrap_or(0)
    }

    fn push(&self, cq: u64, event: CqEvent) {
        let mut state = self
            .queues
            .get_mut(&cq)
            .unwrap_or_else(|| panic!("mock misuse: enqueue on unknown completion queue 0x{cq:x}"));
        if state.events.len() >= state.depth {
            panic!(
                "mock misuse: completion queue 0x{:x} overflow (depth {})",
                cq, state.depth
            );
        }
        state.events.push_back(event);
    }

    /// Test-side enqueue of a normal completion. Overflow and unknown
    /// queues are test-author errors and abort immediately.
    pub fn push_completion(&self, cq: u64, completion: CqCompletion) {
        log::trace!(
            "cq 0x{:x} - enqueue completion context=0x{:x} len={}",
            cq,
            completion.op_context,
            completion.len
        );
        self.push(cq, CqEvent::Comp(completion));
    }

    /// Test-side enqueue of an error entry.
    pub fn push_error(&self, cq: u64, error: CqError) {
        log::trace!(
            "cq 0x{:x} - enqueue error context=0x{:x} prov_errno={}",
            cq,
            error.op_context,
            error.prov_errno
        );
        self.push(cq, CqEvent::Err(error));
    }

    /// Plain read: pops up to `count` completions in FIFO order. Empty queue
    /// reports `-FI_EAGAIN`; an error entry logically next reports
    /// `-FI_EAVAIL` without consuming anything.
    pub unsafe fn read(&self, cq: u64, buf: *mut c_void, count: usize) -> i64 {
        unsafe { self.read_common(cq, buf, count, ptr::null_mut()) }
    }

    /// Like `read`, additionally writing each entry's source address.
    pub unsafe fn readfrom(
        &self,
        cq: u64,
        buf: *mut c_void,
        count: usize,
        src_addr: *mut fi_addr_t,
    ) -> i64 {
        unsafe { self.read_common(cq, buf, count, src_addr) }
    }

    unsafe fn read_common(
        &self,
        cq: u64,
        buf: *mut c_void,
        count: usize,
        src_addr: *mut fi_addr_t,
    ) -> i64 {
        let mut state = self
            .queues
            .get_mut(&cq)
            .unwrap_or_else(|| panic!("mock misuse: read on unknown completion queue 0x{cq:x}"));

        match state.events.front() {
            None => return -fab::FI_EAGAIN,
            Some(CqEvent::Err(_)) => return -fab::FI_EAVAIL,
            Some(CqEvent::Comp(_)) => {}
        }

        let entries = buf as *mut fi_cq_data_entry;
        let mut wrote = 0usize;
        while wrote < count {
            match state.events.front() {
                Some(CqEvent::Comp(_)) => {}
                // Stop at the first pending error; the caller must drain it
                // through readerr before seeing anything behind it.
                _ => break,
            }
            let Some(CqEvent::Comp(completion)) = state.events.pop_front() else {
                break;
            };
            completion.write_entry(unsafe { entries.add(wrote) });
            if !src_addr.is_null() {
                let addr = completion.src_addr.unwrap_or(fab::FI_ADDR_UNSPEC);
                unsafe { *src_addr.add(wrote) = addr };
            }
            wrote += 1;
        }
        log::trace!("cq 0x{:x} - read returned {} of {} requested", cq, wrote, count);
        wrote as i64
    }

    /// Pops the oldest pending error entry, preserving the relative order of
    /// the completions around it. No pending error reports `-FI_EAGAIN`.
    pub unsafe fn readerr(&self, cq: u64, buf: *mut fi_cq_err_entry, _flags: u64) -> i64 {
        let mut state = self
            .queues
            .get_mut(&cq)
            .unwrap_or_else(|| panic!("mock misuse: readerr on unknown completion queue 0x{cq:x}"));

        let pos = state
            .events
            .iter()
            .position(|e| matches!(e, CqEvent::Err(_)));
        let Some(pos) = pos else {
            return -fab::FI_EAGAIN;
        };
        let Some(CqEvent::Err(error)) = state.events.remove(pos) else {
            return -fab::FI_EAGAIN;
        };

        let (err_data, err_data_size) = if error.err_data.is_empty() {
            state.last_err_data = None;
            (ptr::null_mut(), 0)
        } else {
            let boxed = error.err_data.clone().into_boxed_slice();
            let len = boxed.len();
            let data = state.last_err_data.insert(boxed);
            (data.as_mut_ptr() as *mut c_void, len)
        };

        if !buf.is_null() {
            unsafe {
                *buf = fi_cq_err_entry {
                    op_context: error.op_context as *mut c_void,
                    flags: error.flags,
                    len: error.len,
                    buf: ptr::null_mut(),
                    data: 0,
                    tag: 0,
                    olen: 0,
                    err: error.err as c_int,
                    prov_errno: error.prov_errno,
                    err_data,
                    err_data_size,
                };
            }
        }
        log::trace!(
            "cq 0x{:x} - readerr returned err={} prov_errno={}",
            cq,
            error.err,
            error.prov_errno
        );
        1
    }

    /// Renders a provider error into the caller's buffer, truncated and
    /// always NUL-terminated. A missing buffer gets the static fallback.
    pub unsafe fn strerror(
        &self,
        _cq: u64,
        prov_errno: c_int,
        _err_data: *const c_void,
        buf: *mut c_char,
        len: usize,
    ) -> *const c_char {
        static FALLBACK: &CStr = c"provider error";
        if buf.is_null() || len == 0 {
            return FALLBACK.as_ptr();
        }
        let msg = format!("provider error {prov_errno}");
        let bytes = msg.as_bytes();
        let n = bytes.len().min(len - 1);
        unsafe {
            ptr::copy_nonoverlapping(bytes.as_ptr(), buf as *mut u8, n);
            *buf.add(n) = 0;
        }
        buf as *const c_char
    }
}
