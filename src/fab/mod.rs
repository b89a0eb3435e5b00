//! Mirror of the wrapped fabric library's ABI: the `#[repr(C)]` structs the
//! code under test was compiled against, plus the shared constant tables
//! (object classes, error codes, version packing).

use std::ffi::{CStr, c_int};

pub mod info;
pub mod types;

pub use types::{
    fi_addr_t, fi_av_attr, fi_cq_attr, fi_cq_data_entry, fi_cq_entry, fi_cq_err_entry,
    fi_domain_attr, fi_ep_attr, fi_fabric_attr, fi_info, fi_mr_attr, fi_msg, fi_msg_rma,
    fi_ops_cq, fi_rma_iov, fi_rx_attr, fi_tx_attr, fid, fid_av, fid_cq, fid_domain, fid_ep,
    fid_fabric, fid_mr, fid_t,
};

// Object classes carried in fid.fclass.
pub const FI_CLASS_UNSPEC: usize = 0;
pub const FI_CLASS_FABRIC: usize = 1;
pub const FI_CLASS_DOMAIN: usize = 2;
pub const FI_CLASS_EP: usize = 3;
pub const FI_CLASS_AV: usize = 11;
pub const FI_CLASS_MR: usize = 12;
pub const FI_CLASS_CQ: usize = 14;

/// Wildcard source address written by `readfrom` when an entry records none.
pub const FI_ADDR_UNSPEC: fi_addr_t = u64::MAX;

pub const FI_SUCCESS: i64 = 0;

// Errno-aligned error codes. Callers see them negated.
pub const FI_ENOENT: i64 = 2;
pub const FI_EIO: i64 = 5;
pub const FI_EAGAIN: i64 = 11;
pub const FI_ENOMEM: i64 = 12;
pub const FI_EACCES: i64 = 13;
pub const FI_EFAULT: i64 = 14;
pub const FI_EBUSY: i64 = 16;
pub const FI_ENODEV: i64 = 19;
pub const FI_EINVAL: i64 = 22;
pub const FI_EMSGSIZE: i64 = 90;
pub const FI_ENOPROTOOPT: i64 = 92;
pub const FI_EOPNOTSUPP: i64 = 95;
pub const FI_EADDRINUSE: i64 = 98;
pub const FI_EADDRNOTAVAIL: i64 = 99;
pub const FI_ENETDOWN: i64 = 100;
pub const FI_ENETUNREACH: i64 = 101;
pub const FI_ECONNABORTED: i64 = 103;
pub const FI_ECONNRESET: i64 = 104;
pub const FI_ENOBUFS: i64 = 105;
pub const FI_ENOTCONN: i64 = 107;
pub const FI_ESHUTDOWN: i64 = 108;
pub const FI_ETIMEDOUT: i64 = 110;
pub const FI_ECONNREFUSED: i64 = 111;
pub const FI_EHOSTUNREACH: i64 = 113;
pub const FI_EALREADY: i64 = 114;
pub const FI_EINPROGRESS: i64 = 115;
pub const FI_EREMOTEIO: i64 = 121;
pub const FI_ECANCELED: i64 = 125;

// Fabric-specific codes above the errno range.
pub const FI_ERRNO_OFFSET: i64 = 256;
pub const FI_EOTHER: i64 = 256;
pub const FI_ETOOSMALL: i64 = 257;
pub const FI_EOPBADSTATE: i64 = 258;
pub const FI_EAVAIL: i64 = 259;
pub const FI_EBADFLAGS: i64 = 260;
pub const FI_ENOEQ: i64 = 261;
pub const FI_EDOMAIN: i64 = 262;
pub const FI_ENOCQ: i64 = 263;
pub const FI_ECRC: i64 = 264;
pub const FI_ETRUNC: i64 = 265;
pub const FI_ENOKEY: i64 = 266;
pub const FI_ENOAV: i64 = 267;
pub const FI_EOVERRUN: i64 = 268;
pub const FI_ENORX: i64 = 269;
pub const FI_ENOMR: i64 = 270;

/// Packs a major/minor pair the way the library's FI_VERSION macro does.
pub const fn fi_version_pack(major: u16, minor: u16) -> u32 {
    ((major as u32) << 16) | minor as u32
}

pub const DEFAULT_API_VERSION: u32 = fi_version_pack(1, 22);

/// Static message table behind the `fi_strerror` entry point. Accepts either
/// sign, like the real library.
pub fn errno_str(errnum: c_int) -> &'static CStr {
    match errnum.unsigned_abs() as i64 {
        FI_SUCCESS => c"Success",
        FI_ENOENT => c"No such file or directory",
        FI_EIO => c"I/O error",
        FI_EAGAIN => c"Resource temporarily unavailable",
        FI_ENOMEM => c"Cannot allocate memory",
        FI_EACCES => c"Permission denied",
        FI_EFAULT => c"Bad address",
        FI_EBUSY => c"Device or resource busy",
        FI_ENODEV => c"No such device",
        FI_EINVAL => c"Invalid argument",
        FI_EMSGSIZE => c"Message too long",
        FI_ENOPROTOOPT => c"Protocol not available",
        FI_EOPNOTSUPP => c"Operation not supported",
        FI_EADDRINUSE => c"Address already in use",
        FI_EADDRNOTAVAIL => c"Cannot assign requested address",
        FI_ENETDOWN => c"Network is down",
        FI_ENETUNREACH => c"Network is unreachable",
        FI_ECONNABORTED => c"Software caused connection abort",
        FI_ECONNRESET => c"Connection reset by peer",
        FI_ENOBUFS => c"No buffer space available",
        FI_ENOTCONN => c"Transport endpoint is not connected",
        FI_ESHUTDOWN => c"Cannot send after transport endpoint shutdown",
        FI_ETIMEDOUT => c"Connection timed out",
        FI_ECONNREFUSED => c"Connection refused",
        FI_EHOSTUNREACH => c"No route to host",
        FI_EALREADY => c"Operation already in progress",
        FI_EINPROGRESS => c"Operation now in progress",
        FI_EREMOTEIO => c"Remote I/O error",
        FI_ECANCELED => c"Operation canceled",
        FI_EOTHER => c"Unspecified error",
        FI_ETOOSMALL => c"Provided buffer is too small",
        FI_EOPBADSTATE => c"Operation not permitted in current state",
        FI_EAVAIL => c"Error available",
        FI_EBADFLAGS => c"Flags not supported",
        FI_ENOEQ => c"Missing or unavailable event queue",
        FI_EDOMAIN => c"Invalid resource domain",
        FI_ENOCQ => c"Missing or unavailable completion queue",
        FI_ECRC => c"CRC error",
        FI_ETRUNC => c"Truncation error",
        FI_ENOKEY => c"Required key not available",
        FI_ENOAV => c"Missing or unavailable address vector",
        FI_EOVERRUN => c"Queue has been overrun",
        FI_ENORX => c"Receiver not ready, no receive buffers available",
        FI_ENOMR => c"Memory registration limit exceeded",
        _ => c"Unknown error",
    }
}
