//! The C surface. Every function here carries the wrapped library's exact
//! signature and symbol name and forwards synchronously to the active
//! [`FabricMock`](crate::FabricMock). The code under test links against
//! these symbols unmodified.
//!
//! Completion queue reads are not free functions in the wrapped library:
//! callers reach them through the `fi_ops_cq` table inside the handle. The
//! `fi_cq_open` shim installs [`MOCK_CQ_OPS`] into every queue it hands out
//! so those calls land in the emulator.

use std::ffi::{c_char, c_int, c_void};
use std::mem::size_of;

use crate::fab::{
    fi_addr_t, fi_av_attr, fi_cq_attr, fi_cq_err_entry, fi_fabric_attr, fi_info, fi_mr_attr,
    fi_msg, fi_msg_rma, fi_ops_cq, fid, fid_av, fid_cq, fid_domain, fid_ep, fid_fabric, fid_mr,
    fid_t,
};
use crate::with_active;

#[unsafe(no_mangle)]
pub unsafe extern "C-unwind" fn fi_getinfo(
    version: u32,
    node: *const c_char,
    service: *const c_char,
    flags: u64,
    hints: *const fi_info,
    info: *mut *mut fi_info,
) -> c_int {
    with_active(|m| unsafe { m.fi_getinfo(version, node, service, flags, hints, info) })
}

#[unsafe(no_mangle)]
pub unsafe extern "C-unwind" fn fi_freeinfo(info: *mut fi_info) {
    with_active(|m| unsafe { m.fi_freeinfo(info) })
}

#[unsafe(no_mangle)]
pub unsafe extern "C-unwind" fn fi_dupinfo(info: *const fi_info) -> *mut fi_info {
    with_active(|m| unsafe { m.fi_dupinfo(info) })
}

#[unsafe(no_mangle)]
pub unsafe extern "C-unwind" fn fi_allocinfo() -> *mut fi_info {
    with_active(|m| unsafe { m.fi_allocinfo() })
}

#[unsafe(no_mangle)]
pub unsafe extern "C-unwind" fn fi_fabric(
    attr: *mut fi_fabric_attr,
    fabric: *mut *mut fid_fabric,
    context: *mut c_void,
) -> c_int {
    with_active(|m| unsafe { m.fi_fabric(attr, fabric, context) })
}

#[unsafe(no_mangle)]
pub unsafe extern "C-unwind" fn fi_domain(
    fabric: *mut fid_fabric,
    info: *mut fi_info,
    domain: *mut *mut fid_domain,
    context: *mut c_void,
) -> c_int {
    with_active(|m| unsafe { m.fi_domain(fabric, info, domain, context) })
}

#[unsafe(no_mangle)]
pub unsafe extern "C-unwind" fn fi_endpoint(
    domain: *mut fid_domain,
    info: *mut fi_info,
    ep: *mut *mut fid_ep,
    context: *mut c_void,
) -> c_int {
    with_active(|m| unsafe { m.fi_endpoint(domain, info, ep, context) })
}

#[unsafe(no_mangle)]
pub unsafe extern "C-unwind" fn fi_av_open(
    domain: *mut fid_domain,
    attr: *mut fi_av_attr,
    av: *mut *mut fid_av,
    context: *mut c_void,
) -> c_int {
    with_active(|m| unsafe { m.fi_av_open(domain, attr, av, context) })
}

/// Opens a completion queue and routes its operation table to the emulator.
#[unsafe(no_mangle)]
pub unsafe extern "C-unwind" fn fi_cq_open(
    domain: *mut fid_domain,
    attr: *mut fi_cq_attr,
    cq: *mut *mut fid_cq,
    context: *mut c_void,
) -> c_int {
    let ret = with_active(|m| unsafe { m.fi_cq_open(domain, attr, cq, context) });
    if ret == 0 && !cq.is_null() {
        unsafe {
            if !(*cq).is_null() {
                (**cq).ops = &MOCK_CQ_OPS as *const fi_ops_cq as *mut fi_ops_cq;
            }
        }
    }
    ret
}

#[unsafe(no_mangle)]
pub unsafe extern "C-unwind" fn fi_mr_regattr(
    domain: *mut fid_domain,
    attr: *const fi_mr_attr,
    flags: u64,
    mr: *mut *mut fid_mr,
) -> c_int {
    with_active(|m| unsafe { m.fi_mr_regattr(domain, attr, flags, mr) })
}

#[unsafe(no_mangle)]
pub unsafe extern "C-unwind" fn fi_close(fid: *mut fid) -> c_int {
    with_active(|m| unsafe { m.fi_close(fid) })
}

#[unsafe(no_mangle)]
pub unsafe extern "C-unwind" fn fi_ep_bind(ep: *mut fid_ep, bfid: *mut fid, flags: u64) -> c_int {
    with_active(|m| unsafe { m.fi_ep_bind(ep, bfid, flags) })
}

#[unsafe(no_mangle)]
pub unsafe extern "C-unwind" fn fi_enable(ep: *mut fid_ep) -> c_int {
    with_active(|m| unsafe { m.fi_enable(ep) })
}

#[unsafe(no_mangle)]
pub unsafe extern "C-unwind" fn fi_mr_bind(mr: *mut fid_mr, bfid: *mut fid, flags: u64) -> c_int {
    with_active(|m| unsafe { m.fi_mr_bind(mr, bfid, flags) })
}

#[unsafe(no_mangle)]
pub unsafe extern "C-unwind" fn fi_mr_enable(mr: *mut fid_mr) -> c_int {
    with_active(|m| unsafe { m.fi_mr_enable(mr) })
}

#[unsafe(no_mangle)]
pub unsafe extern "C-unwind" fn fi_mr_desc(mr: *mut fid_mr) -> *mut c_void {
    with_active(|m| unsafe { m.fi_mr_desc(mr) })
}

#[unsafe(no_mangle)]
pub unsafe extern "C-unwind" fn fi_mr_key(mr: *mut fid_mr) -> u64 {
    with_active(|m| unsafe { m.fi_mr_key(mr) })
}

#[unsafe(no_mangle)]
pub unsafe extern "C-unwind" fn fi_av_insert(
    av: *mut fid_av,
    addr: *const c_void,
    count: usize,
    fi_addr: *mut fi_addr_t,
    flags: u64,
    context: *mut c_void,
) -> c_int {
    with_active(|m| unsafe { m.fi_av_insert(av, addr, count, fi_addr, flags, context) })
}

#[unsafe(no_mangle)]
pub unsafe extern "C-unwind" fn fi_getname(fid: fid_t, addr: *mut c_void, addrlen: *mut usize) -> c_int {
    with_active(|m| unsafe { m.fi_getname(fid, addr, addrlen) })
}

#[unsafe(no_mangle)]
pub unsafe extern "C-unwind" fn fi_setopt(
    fid: fid_t,
    level: c_int,
    optname: c_int,
    optval: *const c_void,
    optlen: usize,
) -> c_int {
    with_active(|m| unsafe { m.fi_setopt(fid, level, optname, optval, optlen) })
}

#[unsafe(no_mangle)]
pub unsafe extern "C-unwind" fn fi_getopt(
    fid: fid_t,
    level: c_int,
    optname: c_int,
    optval: *mut c_void,
    optlen: *mut usize,
) -> c_int {
    with_active(|m| unsafe { m.fi_getopt(fid, level, optname, optval, optlen) })
}

#[unsafe(no_mangle)]
pub unsafe extern "C-unwind" fn fi_send(
    ep: *mut fid_ep,
    buf: *const c_void,
    len: usize,
    desc: *mut c_void,
    dest_addr: fi_addr_t,
    context: *mut c_void,
) -> isize {
    with_active(|m| unsafe { m.fi_send(ep, buf, len, desc, dest_addr, context) })
}

#[unsafe(no_mangle)]
pub unsafe extern "C-unwind" fn fi_recv(
    ep: *mut fid_ep,
    buf: *mut c_void,
    len: usize,
    desc: *mut c_void,
    src_addr: fi_addr_t,
    context: *mut c_void,
) -> isize {
    with_active(|m| unsafe { m.fi_recv(ep, buf, len, desc, src_addr, context) })
}

#[unsafe(no_mangle)]
pub unsafe extern "C-unwind" fn fi_senddata(
    ep: *mut fid_ep,
    buf: *const c_void,
    len: usize,
    desc: *mut c_void,
    data: u64,
    dest_addr: fi_addr_t,
    context: *mut c_void,
) -> isize {
    with_active(|m| unsafe { m.fi_senddata(ep, buf, len, desc, data, dest_addr, context) })
}

#[unsafe(no_mangle)]
pub unsafe extern "C-unwind" fn fi_recvmsg(ep: *mut fid_ep, msg: *const fi_msg, flags: u64) -> isize {
    with_active(|m| unsafe { m.fi_recvmsg(ep, msg, flags) })
}

#[unsafe(no_mangle)]
pub unsafe extern "C-unwind" fn fi_tsend(
    ep: *mut fid_ep,
    buf: *const c_void,
    len: usize,
    desc: *mut c_void,
    dest_addr: fi_addr_t,
    tag: u64,
    context: *mut c_void,
) -> isize {
    with_active(|m| unsafe { m.fi_tsend(ep, buf, len, desc, dest_addr, tag, context) })
}

#[unsafe(no_mangle)]
pub unsafe extern "C-unwind" fn fi_trecv(
    ep: *mut fid_ep,
    buf: *mut c_void,
    len: usize,
    desc: *mut c_void,
    src_addr: fi_addr_t,
    tag: u64,
    ignore: u64,
    context: *mut c_void,
) -> isize {
    with_active(|m| unsafe { m.fi_trecv(ep, buf, len, desc, src_addr, tag, ignore, context) })
}

#[unsafe(no_mangle)]
pub unsafe extern "C-unwind" fn fi_read(
    ep: *mut fid_ep,
    buf: *mut c_void,
    len: usize,
    desc: *mut c_void,
    src_addr: fi_addr_t,
    addr: u64,
    key: u64,
    context: *mut c_void,
) -> isize {
    with_active(|m| unsafe { m.fi_read(ep, buf, len, desc, src_addr, addr, key, context) })
}

#[unsafe(no_mangle)]
pub unsafe extern "C-unwind" fn fi_write(
    ep: *mut fid_ep,
    buf: *const c_void,
    len: usize,
    desc: *mut c_void,
    dest_addr: fi_addr_t,
    addr: u64,
    key: u64,
    context: *mut c_void,
) -> isize {
    with_active(|m| unsafe { m.fi_write(ep, buf, len, desc, dest_addr, addr, key, context) })
}

#[unsafe(no_mangle)]
pub unsafe extern "C-unwind" fn fi_writedata(
    ep: *mut fid_ep,
    buf: *const c_void,
    len: usize,
    desc: *mut c_void,
    data: u64,
    dest_addr: fi_addr_t,
    addr: u64,
    key: u64,
    context: *mut c_void,
) -> isize {
    with_active(|m| unsafe {
        m.fi_writedata(ep, buf, len, desc, data, dest_addr, addr, key, context)
    })
}

#[unsafe(no_mangle)]
pub unsafe extern "C-unwind" fn fi_writemsg(ep: *mut fid_ep, msg: *const fi_msg_rma, flags: u64) -> isize {
    with_active(|m| unsafe { m.fi_writemsg(ep, msg, flags) })
}

#[unsafe(no_mangle)]
pub unsafe extern "C-unwind" fn fi_strerror(errnum: c_int) -> *const c_char {
    with_active(|m| m.fi_strerror(errnum))
}

#[unsafe(no_mangle)]
pub unsafe extern "C-unwind" fn fi_version() -> u32 {
    with_active(|m| m.fi_version())
}

// Completion queue operations, reached only through the table below.

unsafe extern "C" fn mock_cq_read(cq: *mut fid_cq, buf: *mut c_void, count: usize) -> isize {
    with_active(|m| unsafe { m.fi_cq_read(cq, buf, count) })
}

unsafe extern "C" fn mock_cq_readfrom(
    cq: *mut fid_cq,
    buf: *mut c_void,
    count: usize,
    src_addr: *mut fi_addr_t,
) -> isize {
    with_active(|m| unsafe { m.fi_cq_readfrom(cq, buf, count, src_addr) })
}

unsafe extern "C" fn mock_cq_readerr(
    cq: *mut fid_cq,
    buf: *mut fi_cq_err_entry,
    flags: u64,
) -> isize {
    with_active(|m| unsafe { m.fi_cq_readerr(cq, buf, flags) })
}

unsafe extern "C" fn mock_cq_strerror(
    cq: *mut fid_cq,
    prov_errno: c_int,
    err_data: *const c_void,
    buf: *mut c_char,
    len: usize,
) -> *const c_char {
    with_active(|m| unsafe { m.fi_cq_strerror(cq, prov_errno, err_data, buf, len) })
}

/// Operation table installed into every completion queue handle at open.
pub static MOCK_CQ_OPS: fi_ops_cq = fi_ops_cq {
    size: size_of::<fi_ops_cq>(),
    read: mock_cq_read,
    readfrom: mock_cq_readfrom,
    readerr: mock_cq_readerr,
    strerror: mock_cq_strerror,
};
