//! Lifecycle bookkeeping for mock handles. Every handle crossing the ABI is
//! a heap allocation of the matching `fid_*` struct; its address doubles as
//! the registry key, so later calls can be validated against a still-open
//! record. Records outlive close so double-close and use-after-close stay
//! detectable until reset.

use std::ffi::c_void;
use std::fmt;
use std::ptr;

use hashbrown::HashMap;

use crate::fab::{
    self, fid, fid_av, fid_cq, fid_domain, fid_ep, fid_fabric, fid_mr,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    Fabric,
    Domain,
    Endpoint,
    AddressVector,
    CompletionQueue,
    MemoryRegion,
}

impl HandleKind {
    pub fn fclass(&self) -> usize {
        match self {
            HandleKind::Fabric => fab::FI_CLASS_FABRIC,
            HandleKind::Domain => fab::FI_CLASS_DOMAIN,
            HandleKind::Endpoint => fab::FI_CLASS_EP,
            HandleKind::AddressVector => fab::FI_CLASS_AV,
            HandleKind::CompletionQueue => fab::FI_CLASS_CQ,
            HandleKind::MemoryRegion => fab::FI_CLASS_MR,
        }
    }

    pub fn from_fclass(fclass: usize) -> Option<Self> {
        match fclass {
            fab::FI_CLASS_FABRIC => Some(HandleKind::Fabric),
            fab::FI_CLASS_DOMAIN => Some(HandleKind::Domain),
            fab::FI_CLASS_EP => Some(HandleKind::Endpoint),
            fab::FI_CLASS_AV => Some(HandleKind::AddressVector),
            fab::FI_CLASS_CQ => Some(HandleKind::CompletionQueue),
            fab::FI_CLASS_MR => Some(HandleKind::MemoryRegion),
            _ => None,
        }
    }
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HandleKind::Fabric => "fabric",
            HandleKind::Domain => "domain",
            HandleKind::Endpoint => "endpoint",
            HandleKind::AddressVector => "address vector",
            HandleKind::CompletionQueue => "completion queue",
            HandleKind::MemoryRegion => "memory region",
        };
        f.write_str(name)
    }
}

/// Misuse of the mock itself, as opposed to a scripted library failure.
#[derive(Debug, Clone, PartialEq)]
pub enum MisuseError {
    UnknownHandle(u64),
    HandleClosed(u64),
    WrongKind {
        handle: u64,
        expected: HandleKind,
        actual: HandleKind,
    },
}

impl fmt::Display for MisuseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MisuseError::UnknownHandle(h) => {
                write!(f, "unknown handle 0x{h:x}")
            }
            MisuseError::HandleClosed(h) => {
                write!(f, "handle 0x{h:x} was already closed")
            }
            MisuseError::WrongKind { handle, expected, actual } => {
                write!(f, "handle 0x{handle:x}: expected {expected}, got {actual}")
            }
        }
    }
}

impl std::error::Error for MisuseError {}

#[derive(Debug)]
struct HandleRecord {
    kind: HandleKind,
    open: bool,
}

#[derive(Debug, Default)]
pub struct HandleRegistry {
    handles: HashMap<u64, HandleRecord>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        HandleRegistry { handles: HashMap::new() }
    }

    /// Allocates the fid struct for `kind` and tracks it as open. The
    /// returned value is the allocation's address, usable directly as the
    /// opaque handle across the ABI.
    pub fn allocate(&mut self, kind: HandleKind, context: *mut c_void) -> u64 {
        let header = fid {
            fclass: kind.fclass(),
            context,
            ops: ptr::null_mut(),
        };
        let handle = match kind {
            HandleKind::Fabric => Box::into_raw(Box::new(fid_fabric {
                fid: header,
                api_version: fab::DEFAULT_API_VERSION,
            })) as u64,
            HandleKind::Domain => {
                Box::into_raw(Box::new(fid_domain { fid: header })) as u64
            }
            HandleKind::Endpoint => {
                Box::into_raw(Box::new(fid_ep { fid: header })) as u64
            }
            HandleKind::AddressVector => {
                Box::into_raw(Box::new(fid_av { fid: header })) as u64
            }
            HandleKind::CompletionQueue => Box::into_raw(Box::new(fid_cq {
                fid: header,
                ops: ptr::null_mut(),
            })) as u64,
            HandleKind::MemoryRegion => Box::into_raw(Box::new(fid_mr {
                fid: header,
                mem_desc: ptr::null_mut(),
                key: 0,
            })) as u64,
        };
        self.handles.insert(handle, HandleRecord { kind, open: true });
        log::trace!("registry - allocated {} handle 0x{:x}", kind, handle);
        handle
    }

    /// Marks a handle closed. The allocation is kept quarantined until reset
    /// so stale pointers still resolve to a diagnosable record.
    pub fn release(&mut self, handle: u64) -> Result<HandleKind, MisuseError> {
        let record = self
            .handles
            .get_mut(&handle)
            .ok_or(MisuseError::UnknownHandle(handle))?;
        if !record.open {
            return Err(MisuseError::HandleClosed(handle));
        }
        record.open = false;
        log::trace!("registry - released {} handle 0x{:x}", record.kind, handle);
        Ok(record.kind)
    }

    pub fn is_open(&self, handle: u64) -> bool {
        self.handles.get(&handle).map(|r| r.open).unwrap_or(false)
    }

    pub fn kind_of(&self, handle: u64) -> Option<HandleKind> {
        self.handles.get(&handle).map(|r| r.kind)
    }

    /// Validates that `handle` is known, open and (when given) of the
    /// expected kind.
    pub fn expect_open(
        &self,
        handle: u64,
        kind: Option<HandleKind>,
    ) -> Result<HandleKind, MisuseError> {
        let record = self
            .handles
            .get(&handle)
            .ok_or(MisuseError::UnknownHandle(handle))?;
        if !record.open {
            return Err(MisuseError::HandleClosed(handle));
        }
        if let Some(expected) = kind {
            if record.kind != expected {
                return Err(MisuseError::WrongKind {
                    handle,
                    expected,
                    actual: record.kind,
                });
            }
        }
        Ok(record.kind)
    }

    /// Frees every tracked allocation, open or closed.
    pub fn reset(&mut self) {
        for (handle, record) in self.handles.drain() {
            unsafe {
                match record.kind {
                    HandleKind::Fabric => drop(Box::from_raw(handle as *mut fid_fabric)),
                    HandleKind::Domain => drop(Box::from_raw(handle as *mut fid_domain)),
                    HandleKind::Endpoint => drop(Box::from_raw(handle as *mut fid_ep)),
                    HandleKind::AddressVector => drop(Box::from_raw(handle as *mut fid_av)),
                    HandleKind::CompletionQueue => drop(Box::from_raw(handle as *mut fid_cq)),
                    HandleKind::MemoryRegion => drop(Box::from_raw(handle as *mut fid_mr)),
                }
            }
        }
    }
}

impl Drop for HandleRegistry {
    fn drop(&mut self) {
        self.reset();
    }
}
