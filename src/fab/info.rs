//! Heap management for `fi_info` capability chains. Everything here is
//! allocated with the C allocator so ownership can cross the ABI and come
//! back through `fi_freeinfo` regardless of which side built the chain.

use std::ffi::{c_char, c_void};
use std::mem::size_of;
use std::ptr;

use super::types::{
    fi_domain_attr, fi_ep_attr, fi_fabric_attr, fi_info, fi_rx_attr, fi_tx_attr,
};

unsafe fn calloc_one<T>() -> *mut T {
    let p = unsafe { libc::calloc(1, size_of::<T>()) };
    if p.is_null() {
        panic!("fi_info allocation failed");
    }
    p as *mut T
}

unsafe fn dup_cstr(s: *const c_char) -> *mut c_char {
    if s.is_null() {
        return ptr::null_mut();
    }
    unsafe {
        let len = libc::strlen(s) + 1;
        let p = libc::malloc(len) as *mut c_char;
        if p.is_null() {
            panic!("fi_info string allocation failed");
        }
        ptr::copy_nonoverlapping(s, p, len);
        p
    }
}

unsafe fn dup_buf(src: *const c_void, len: usize) -> *mut c_void {
    if src.is_null() || len == 0 {
        return ptr::null_mut();
    }
    unsafe {
        let p = libc::malloc(len);
        if p.is_null() {
            panic!("fi_info buffer allocation failed");
        }
        ptr::copy_nonoverlapping(src as *const u8, p as *mut u8, len);
        p
    }
}

/// Allocates one zeroed `fi_info` with all attribute blocks present, the
/// shape `fi_allocinfo` hands back for hint building.
pub unsafe fn alloc() -> *mut fi_info {
    unsafe {
        let info: *mut fi_info = calloc_one();
        (*info).tx_attr = calloc_one::<fi_tx_attr>();
        (*info).rx_attr = calloc_one::<fi_rx_attr>();
        (*info).ep_attr = calloc_one::<fi_ep_attr>();
        (*info).domain_attr = calloc_one::<fi_domain_attr>();
        (*info).fabric_attr = calloc_one::<fi_fabric_attr>();
        info
    }
}

/// Deep copy of a single entry; the duplicate is detached from the chain.
pub unsafe fn dup(src: *const fi_info) -> *mut fi_info {
    if src.is_null() {
        return ptr::null_mut();
    }
    unsafe {
        let info = alloc();
        (*info).caps = (*src).caps;
        (*info).mode = (*src).mode;
        (*info).addr_format = (*src).addr_format;
        (*info).handle = (*src).handle;
        (*info).src_addrlen = (*src).src_addrlen;
        (*info).dest_addrlen = (*src).dest_addrlen;
        (*info).src_addr = dup_buf((*src).src_addr, (*src).src_addrlen);
        (*info).dest_addr = dup_buf((*src).dest_addr, (*src).dest_addrlen);

        if !(*src).tx_attr.is_null() {
            *(*info).tx_attr = *(*src).tx_attr;
        }
        if !(*src).rx_attr.is_null() {
            *(*info).rx_attr = *(*src).rx_attr;
        }
        if !(*src).ep_attr.is_null() {
            let auth_key_size = (*(*src).ep_attr).auth_key_size;
            *(*info).ep_attr = *(*src).ep_attr;
            (*(*info).ep_attr).auth_key =
                dup_buf((*(*src).ep_attr).auth_key as *const c_void, auth_key_size) as *mut u8;
        }
        if !(*src).domain_attr.is_null() {
            let name = (*(*src).domain_attr).name;
            *(*info).domain_attr = *(*src).domain_attr;
            (*(*info).domain_attr).name = dup_cstr(name);
        }
        if !(*src).fabric_attr.is_null() {
            let name = (*(*src).fabric_attr).name;
            let prov_name = (*(*src).fabric_attr).prov_name;
            *(*info).fabric_attr = *(*src).fabric_attr;
            (*(*info).fabric_attr).name = dup_cstr(name);
            (*(*info).fabric_attr).prov_name = dup_cstr(prov_name);
        }
        info
    }
}

/// Frees a whole chain, including attribute blocks, strings and address
/// buffers. Safe on null.
pub unsafe fn free(info: *mut fi_info) {
    let mut cur = info;
    while !cur.is_null() {
        unsafe {
            let next = (*cur).next;
            libc::free((*cur).src_addr);
            libc::free((*cur).dest_addr);
            libc::free((*cur).tx_attr as *mut c_void);
            libc::free((*cur).rx_attr as *mut c_void);
            if !(*cur).ep_attr.is_null() {
                libc::free((*(*cur).ep_attr).auth_key as *mut c_void);
                libc::free((*cur).ep_attr as *mut c_void);
            }
            if !(*cur).domain_attr.is_null() {
                libc::free((*(*cur).domain_attr).name as *mut c_void);
                libc::free((*cur).domain_attr as *mut c_void);
            }
            if !(*cur).fabric_attr.is_null() {
                libc::free((*(*cur).fabric_attr).name as *mut c_void);
                libc::free((*(*cur).fabric_attr).prov_name as *mut c_void);
                libc::free((*cur).fabric_attr as *mut c_void);
            }
            libc::free(cur as *mut c_void);
            cur = next;
        }
    }
}
