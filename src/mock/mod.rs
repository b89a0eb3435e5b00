//! The call dispatcher every intercepted entry point forwards to. One method
//! per API function, parameters preserved verbatim; each call is logged,
//! resolved against the scripted behavior for that function, applies its
//! side effects, and returns synchronously. There is no background activity:
//! completions only exist because the test enqueued them.

use std::collections::VecDeque;
use std::ffi::{c_char, c_int, c_void};
use std::ptr;

use hashbrown::HashMap;

use crate::fab::{
    self, fi_addr_t, fi_av_attr, fi_cq_attr, fi_cq_err_entry, fi_fabric_attr, fi_info, fi_mr_attr,
    fi_msg, fi_msg_rma, fid, fid_av, fid_cq, fid_domain, fid_ep, fid_fabric, fid_mr, fid_t, info,
};

pub mod call;
pub mod cq;
pub mod registry;

pub use call::{CallArgs, CallId, CallScript, Invocation, SideEffect};
pub use cq::{CqCompletion, CqEmulator, CqError, DEFAULT_CQ_DEPTH};
pub use registry::{HandleKind, HandleRegistry, MisuseError};

/// Programmable stand-in for the fabric library. Owns the handle registry,
/// the completion queue emulator, the behavior scripts and the invocation
/// log for one test.
#[derive(Debug)]
pub struct FabricMock {
    registry: HandleRegistry,
    cqs: CqEmulator,
    scripts: HashMap<CallId, VecDeque<CallScript>>,
    defaults: HashMap<CallId, CallScript>,
    log: Vec<Invocation>,
    api_version: u32,
    next_fi_addr: fi_addr_t,
    next_mr_key: u64,
}

impl FabricMock {
    pub fn new() -> Self {
        FabricMock {
            registry: HandleRegistry::new(),
            cqs: CqEmulator::new(),
            scripts: HashMap::new(),
            defaults: HashMap::new(),
            log: Vec::new(),
            api_version: fab::DEFAULT_API_VERSION,
            next_fi_addr: 0,
            next_mr_key: 1,
        }
    }

    // ---- configuration surface (test code only) ----

    /// Queues a one-shot script for `call`. Scripts are consumed in FIFO
    /// order, one per matching invocation; exhausted calls fall back to the
    /// per-call default, then to plain success.
    pub fn expect(&mut self, call: CallId, script: CallScript) {
        self.scripts.entry(call).or_default().push_back(script);
    }

    /// Installs a standing default for `call`, used whenever no one-shot
    /// script is pending.
    pub fn set_default(&mut self, call: CallId, script: CallScript) {
        self.defaults.insert(call, script);
    }

    /// Mints an open handle up front so a script can pin the value a later
    /// open call returns. Completion queues are also registered with the
    /// emulator so entries can be enqueued immediately.
    pub fn premint(&mut self, kind: HandleKind) -> u64 {
        let handle = self.registry.allocate(kind, ptr::null_mut());
        if kind == HandleKind::CompletionQueue {
            self.cqs.register(handle, DEFAULT_CQ_DEPTH);
        }
        handle
    }

    pub fn push_completion(&mut self, cq: u64, completion: CqCompletion) {
        self.cqs.push_completion(cq, completion);
    }

    pub fn push_error(&mut self, cq: u64, error: CqError) {
        self.cqs.push_error(cq, error);
    }

    pub fn cq_pending(&self, cq: u64) -> usize {
        self.cqs.pending(cq)
    }

    pub fn invocations(&self) -> &[Invocation] {
        &self.log
    }

    pub fn last_invocation(&self) -> Option<&Invocation> {
        self.log.last()
    }

    pub fn calls_to(&self, call: CallId) -> usize {
        self.log.iter().filter(|i| i.call == call).count()
    }

    pub fn is_open(&self, handle: u64) -> bool {
        self.registry.is_open(handle)
    }

    pub fn kind_of(&self, handle: u64) -> Option<HandleKind> {
        self.registry.kind_of(handle)
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    pub fn set_api_version(&mut self, major: u16, minor: u16) {
        self.api_version = fab::fi_version_pack(major, minor);
    }

    /// Drops all scripts, handles, queues and the log, returning the mock to
    /// its freshly constructed state.
    pub fn reset(&mut self) {
        self.registry.reset();
        self.cqs = CqEmulator::new();
        self.scripts.clear();
        self.defaults.clear();
        self.log.clear();
        self.next_fi_addr = 0;
        self.next_mr_key = 1;
    }

    // ---- dispatch plumbing ----

    fn record(&mut self, call: CallId, args: CallArgs, ret: i64) {
        log::debug!("{:?} - args: {:?}, ret: {}", call, args, ret);
        self.log.push(Invocation { call, args, ret });
    }

    /// One-shot script if pending, otherwise the per-call default.
    fn scripted(&mut self, call: CallId) -> Option<CallScript> {
        if let Some(queue) = self.scripts.get_mut(&call) {
            if let Some(script) = queue.pop_front() {
                return Some(script);
            }
        }
        self.defaults.get(&call).cloned()
    }

    fn resolve(&mut self, call: CallId) -> CallScript {
        self.scripted(call).unwrap_or_else(CallScript::ok)
    }

    fn expect_open(&self, handle: u64, kind: Option<HandleKind>) -> HandleKind {
        self.registry.expect_open(handle, kind).unwrap_or_else(|e| {
            log::error!("mock misuse: {e}");
            panic!("libfabric mock misuse: {e}");
        })
    }

    /// Resolves the handle an open call should return: a pinned, preminted
    /// one when the script says so, a fresh allocation otherwise.
    fn out_handle(&mut self, kind: HandleKind, script: &CallScript, context: *mut c_void) -> u64 {
        if let Some(SideEffect::UseHandle(handle)) = script.effect {
            self.expect_open(handle, Some(kind));
            return handle;
        }
        self.registry.allocate(kind, context)
    }

    // ---- info queries ----

    pub unsafe fn fi_getinfo(
        &mut self,
        version: u32,
        _node: *const c_char,
        _service: *const c_char,
        flags: u64,
        hints: *const fi_info,
        info_out: *mut *mut fi_info,
    ) -> c_int {
        let script = self.resolve(CallId::GetInfo);
        if !script.is_err() && !info_out.is_null() {
            // Honor hints by echoing them back, the way a provider that
            // matches the request exactly would.
            let chain = if hints.is_null() {
                unsafe { info::alloc() }
            } else {
                unsafe { info::dup(hints) }
            };
            unsafe {
                if !(*chain).fabric_attr.is_null() {
                    (*(*chain).fabric_attr).api_version = self.api_version;
                }
                *info_out = chain;
            }
        }
        self.record(CallId::GetInfo, CallArgs::GetInfo { version, flags }, script.ret);
        script.ret as c_int
    }

    pub unsafe fn fi_freeinfo(&mut self, info_ptr: *mut fi_info) {
        unsafe { info::free(info_ptr) };
        self.record(CallId::FreeInfo, CallArgs::None, 0);
    }

    pub unsafe fn fi_dupinfo(&mut self, info_ptr: *const fi_info) -> *mut fi_info {
        let dup = unsafe { info::dup(info_ptr) };
        self.record(CallId::DupInfo, CallArgs::None, 0);
        dup
    }

    pub unsafe fn fi_allocinfo(&mut self) -> *mut fi_info {
        let info_ptr = unsafe { info::alloc() };
        self.record(CallId::AllocInfo, CallArgs::None, 0);
        info_ptr
    }

    // ---- object lifecycle ----

    pub unsafe fn fi_fabric(
        &mut self,
        attr: *mut fi_fabric_attr,
        fabric: *mut *mut fid_fabric,
        context: *mut c_void,
    ) -> c_int {
        let script = self.resolve(CallId::Fabric);
        if !script.is_err() && !fabric.is_null() {
            let handle = self.out_handle(HandleKind::Fabric, &script, context);
            unsafe {
                *fabric = handle as *mut fid_fabric;
                if !attr.is_null() {
                    (*attr).fabric = handle as *mut fid_fabric;
                }
            }
        }
        self.record(
            CallId::Fabric,
            CallArgs::Open { parent: attr as u64, context: context as u64 },
            script.ret,
        );
        script.ret as c_int
    }

    pub unsafe fn fi_domain(
        &mut self,
        fabric: *mut fid_fabric,
        _info: *mut fi_info,
        domain: *mut *mut fid_domain,
        context: *mut c_void,
    ) -> c_int {
        self.expect_open(fabric as u64, Some(HandleKind::Fabric));
        let script = self.resolve(CallId::Domain);
        if !script.is_err() && !domain.is_null() {
            let handle = self.out_handle(HandleKind::Domain, &script, context);
            unsafe { *domain = handle as *mut fid_domain };
        }
        self.record(
            CallId::Domain,
            CallArgs::Open { parent: fabric as u64, context: context as u64 },
            script.ret,
        );
        script.ret as c_int
    }

    pub unsafe fn fi_endpoint(
        &mut self,
        domain: *mut fid_domain,
        _info: *mut fi_info,
        ep: *mut *mut fid_ep,
        context: *mut c_void,
    ) -> c_int {
        self.expect_open(domain as u64, Some(HandleKind::Domain));
        let script = self.resolve(CallId::Endpoint);
        if !script.is_err() && !ep.is_null() {
            let handle = self.out_handle(HandleKind::Endpoint, &script, context);
            unsafe { *ep = handle as *mut fid_ep };
        }
        self.record(
            CallId::Endpoint,
            CallArgs::Open { parent: domain as u64, context: context as u64 },
            script.ret,
        );
        script.ret as c_int
    }

    pub unsafe fn fi_av_open(
        &mut self,
        domain: *mut fid_domain,
        _attr: *mut fi_av_attr,
        av: *mut *mut fid_av,
        context: *mut c_void,
    ) -> c_int {
        self.expect_open(domain as u64, Some(HandleKind::Domain));
        let script = self.resolve(CallId::AvOpen);
        if !script.is_err() && !av.is_null() {
            let handle = self.out_handle(HandleKind::AddressVector, &script, context);
            unsafe { *av = handle as *mut fid_av };
        }
        self.record(
            CallId::AvOpen,
            CallArgs::Open { parent: domain as u64, context: context as u64 },
            script.ret,
        );
        script.ret as c_int
    }

    pub unsafe fn fi_cq_open(
        &mut self,
        domain: *mut fid_domain,
        attr: *mut fi_cq_attr,
        cq: *mut *mut fid_cq,
        context: *mut c_void,
    ) -> c_int {
        self.expect_open(domain as u64, Some(HandleKind::Domain));
        let script = self.resolve(CallId::CqOpen);
        if !script.is_err() && !cq.is_null() {
            let handle = self.out_handle(HandleKind::CompletionQueue, &script, context);
            let depth = if attr.is_null() { 0 } else { unsafe { (*attr).size } };
            // Preminted queues keep whatever the test already enqueued.
            self.cqs.register(handle, depth);
            unsafe { *cq = handle as *mut fid_cq };
        }
        self.record(
            CallId::CqOpen,
            CallArgs::Open { parent: domain as u64, context: context as u64 },
            script.ret,
        );
        script.ret as c_int
    }

    pub unsafe fn fi_mr_regattr(
        &mut self,
        domain: *mut fid_domain,
        attr: *const fi_mr_attr,
        flags: u64,
        mr: *mut *mut fid_mr,
    ) -> c_int {
        self.expect_open(domain as u64, Some(HandleKind::Domain));
        let (access, requested_key, context) = if attr.is_null() {
            (0, 0, ptr::null_mut())
        } else {
            unsafe { ((*attr).access, (*attr).requested_key, (*attr).context) }
        };
        let script = self.resolve(CallId::MrRegattr);
        if !script.is_err() && !mr.is_null() {
            let handle = self.out_handle(HandleKind::MemoryRegion, &script, context);
            let key = match script.effect {
                Some(SideEffect::MrKey(key)) => key,
                _ if requested_key != 0 => requested_key,
                _ => {
                    let key = self.next_mr_key;
                    self.next_mr_key += 1;
                    key
                }
            };
            unsafe {
                let region = handle as *mut fid_mr;
                (*region).key = key;
                // The descriptor is opaque to callers; the handle itself is
                // as deterministic a token as any.
                (*region).mem_desc = handle as *mut c_void;
                *mr = region;
            }
        }
        self.record(
            CallId::MrRegattr,
            CallArgs::MrRegattr { domain: domain as u64, access, requested_key, flags },
            script.ret,
        );
        script.ret as c_int
    }

    pub unsafe fn fi_close(&mut self, fid_ptr: *mut fid) -> c_int {
        let handle = fid_ptr as u64;
        let kind = self.expect_open(handle, None);
        let script = self.resolve(CallId::Close);
        if !script.is_err() {
            // expect_open above makes this infallible.
            let _ = self.registry.release(handle);
            if kind == HandleKind::CompletionQueue {
                self.cqs.remove(handle);
            }
        }
        self.record(CallId::Close, CallArgs::Close { handle }, script.ret);
        script.ret as c_int
    }

    // ---- bind/enable (validated no-ops) ----

    pub unsafe fn fi_ep_bind(&mut self, ep: *mut fid_ep, bfid: *mut fid, flags: u64) -> c_int {
        self.expect_open(ep as u64, Some(HandleKind::Endpoint));
        self.expect_open(bfid as u64, None);
        let script = self.resolve(CallId::EpBind);
        self.record(
            CallId::EpBind,
            CallArgs::Bind { handle: ep as u64, target: bfid as u64, flags },
            script.ret,
        );
        script.ret as c_int
    }

    pub unsafe fn fi_enable(&mut self, ep: *mut fid_ep) -> c_int {
        self.expect_open(ep as u64, Some(HandleKind::Endpoint));
        let script = self.resolve(CallId::Enable);
        self.record(CallId::Enable, CallArgs::Enable { handle: ep as u64 }, script.ret);
        script.ret as c_int
    }

    pub unsafe fn fi_mr_bind(&mut self, mr: *mut fid_mr, bfid: *mut fid, flags: u64) -> c_int {
        self.expect_open(mr as u64, Some(HandleKind::MemoryRegion));
        self.expect_open(bfid as u64, None);
        let script = self.resolve(CallId::MrBind);
        self.record(
            CallId::MrBind,
            CallArgs::Bind { handle: mr as u64, target: bfid as u64, flags },
            script.ret,
        );
        script.ret as c_int
    }

    pub unsafe fn fi_mr_enable(&mut self, mr: *mut fid_mr) -> c_int {
        self.expect_open(mr as u64, Some(HandleKind::MemoryRegion));
        let script = self.resolve(CallId::MrEnable);
        self.record(CallId::MrEnable, CallArgs::Enable { handle: mr as u64 }, script.ret);
        script.ret as c_int
    }

    pub unsafe fn fi_mr_desc(&mut self, mr: *mut fid_mr) -> *mut c_void {
        self.expect_open(mr as u64, Some(HandleKind::MemoryRegion));
        let desc = unsafe { (*mr).mem_desc };
        self.record(CallId::MrDesc, CallArgs::Enable { handle: mr as u64 }, 0);
        desc
    }

    pub unsafe fn fi_mr_key(&mut self, mr: *mut fid_mr) -> u64 {
        self.expect_open(mr as u64, Some(HandleKind::MemoryRegion));
        let key = unsafe { (*mr).key };
        self.record(CallId::MrKey, CallArgs::Enable { handle: mr as u64 }, key as i64);
        key
    }

    // ---- addressing ----

    pub unsafe fn fi_av_insert(
        &mut self,
        av: *mut fid_av,
        addr: *const c_void,
        count: usize,
        fi_addr: *mut fi_addr_t,
        flags: u64,
        _context: *mut c_void,
    ) -> c_int {
        self.expect_open(av as u64, Some(HandleKind::AddressVector));
        let script = self.resolve(CallId::AvInsert);
        if !script.is_err() && !fi_addr.is_null() {
            match &script.effect {
                Some(SideEffect::WriteAddrs(addrs)) => {
                    for (i, resolved) in addrs.iter().take(count).enumerate() {
                        unsafe { *fi_addr.add(i) = *resolved };
                    }
                }
                _ => {
                    for i in 0..count {
                        unsafe { *fi_addr.add(i) = self.next_fi_addr };
                        self.next_fi_addr += 1;
                    }
                }
            }
        }
        // Success reports the number of addresses inserted.
        let ret = if script.is_err() {
            script.ret
        } else if script.ret == 0 {
            count as i64
        } else {
            script.ret
        };
        self.record(
            CallId::AvInsert,
            CallArgs::AvInsert { av: av as u64, addr: addr as u64, count, flags },
            ret,
        );
        ret as c_int
    }

    pub unsafe fn fi_getname(&mut self, fid_ptr: fid_t, addr: *mut c_void, addrlen: *mut usize) -> c_int {
        let handle = fid_ptr as u64;
        self.expect_open(handle, None);
        let script = self.resolve(CallId::GetName);
        let requested = if addrlen.is_null() { 0 } else { unsafe { *addrlen } };
        let mut ret = script.ret;
        if !script.is_err() {
            // Deterministic name: the handle value itself, little endian.
            let name = handle.to_le_bytes();
            if addrlen.is_null() {
                ret = -fab::FI_EINVAL;
            } else if requested < name.len() || addr.is_null() {
                unsafe { *addrlen = name.len() };
                ret = -fab::FI_ETOOSMALL;
            } else {
                unsafe {
                    ptr::copy_nonoverlapping(name.as_ptr(), addr as *mut u8, name.len());
                    *addrlen = name.len();
                }
            }
        }
        self.record(
            CallId::GetName,
            CallArgs::GetName { handle, addrlen: requested },
            ret,
        );
        ret as c_int
    }

    // ---- options ----

    pub unsafe fn fi_setopt(
        &mut self,
        fid_ptr: fid_t,
        level: c_int,
        optname: c_int,
        _optval: *const c_void,
        optlen: usize,
    ) -> c_int {
        self.expect_open(fid_ptr as u64, None);
        let script = self.resolve(CallId::SetOpt);
        self.record(
            CallId::SetOpt,
            CallArgs::Opt { handle: fid_ptr as u64, level, optname, optlen },
            script.ret,
        );
        script.ret as c_int
    }

    pub unsafe fn fi_getopt(
        &mut self,
        fid_ptr: fid_t,
        level: c_int,
        optname: c_int,
        _optval: *mut c_void,
        optlen: *mut usize,
    ) -> c_int {
        self.expect_open(fid_ptr as u64, None);
        let script = self.resolve(CallId::GetOpt);
        let optlen = if optlen.is_null() { 0 } else { unsafe { *optlen } };
        self.record(
            CallId::GetOpt,
            CallArgs::Opt { handle: fid_ptr as u64, level, optname, optlen },
            script.ret,
        );
        script.ret as c_int
    }

    // ---- message verbs ----

    fn msg_verb(
        &mut self,
        call: CallId,
        ep: u64,
        buf: u64,
        len: usize,
        addr: fi_addr_t,
        data: u64,
        tag: u64,
        ignore: u64,
        context: u64,
    ) -> isize {
        self.expect_open(ep, Some(HandleKind::Endpoint));
        let script = self.resolve(call);
        self.record(
            call,
            CallArgs::Msg { ep, buf, len, addr, data, tag, ignore, flags: 0, context },
            script.ret,
        );
        script.ret as isize
    }

    pub unsafe fn fi_send(
        &mut self,
        ep: *mut fid_ep,
        buf: *const c_void,
        len: usize,
        _desc: *mut c_void,
        dest_addr: fi_addr_t,
        context: *mut c_void,
    ) -> isize {
        self.msg_verb(CallId::Send, ep as u64, buf as u64, len, dest_addr, 0, 0, 0, context as u64)
    }

    pub unsafe fn fi_recv(
        &mut self,
        ep: *mut fid_ep,
        buf: *mut c_void,
        len: usize,
        _desc: *mut c_void,
        src_addr: fi_addr_t,
        context: *mut c_void,
    ) -> isize {
        self.msg_verb(CallId::Recv, ep as u64, buf as u64, len, src_addr, 0, 0, 0, context as u64)
    }

    pub unsafe fn fi_senddata(
        &mut self,
        ep: *mut fid_ep,
        buf: *const c_void,
        len: usize,
        _desc: *mut c_void,
        data: u64,
        dest_addr: fi_addr_t,
        context: *mut c_void,
    ) -> isize {
        self.msg_verb(
            CallId::SendData,
            ep as u64,
            buf as u64,
            len,
            dest_addr,
            data,
            0,
            0,
            context as u64,
        )
    }

    pub unsafe fn fi_recvmsg(&mut self, ep: *mut fid_ep, msg: *const fi_msg, flags: u64) -> isize {
        self.expect_open(ep as u64, Some(HandleKind::Endpoint));
        let (buf, len, addr, data, context) = if msg.is_null() {
            (0, 0, 0, 0, 0)
        } else {
            unsafe {
                let m = &*msg;
                let (buf, len) = if m.iov_count > 0 && !m.msg_iov.is_null() {
                    let iov = &*m.msg_iov;
                    (iov.iov_base as u64, iov.iov_len)
                } else {
                    (0, 0)
                };
                (buf, len, m.addr, m.data, m.context as u64)
            }
        };
        let script = self.resolve(CallId::RecvMsg);
        self.record(
            CallId::RecvMsg,
            CallArgs::Msg { ep: ep as u64, buf, len, addr, data, tag: 0, ignore: 0, flags, context },
            script.ret,
        );
        script.ret as isize
    }

    pub unsafe fn fi_tsend(
        &mut self,
        ep: *mut fid_ep,
        buf: *const c_void,
        len: usize,
        _desc: *mut c_void,
        dest_addr: fi_addr_t,
        tag: u64,
        context: *mut c_void,
    ) -> isize {
        self.msg_verb(
            CallId::Tsend,
            ep as u64,
            buf as u64,
            len,
            dest_addr,
            0,
            tag,
            0,
            context as u64,
        )
    }

    pub unsafe fn fi_trecv(
        &mut self,
        ep: *mut fid_ep,
        buf: *mut c_void,
        len: usize,
        _desc: *mut c_void,
        src_addr: fi_addr_t,
        tag: u64,
        ignore: u64,
        context: *mut c_void,
    ) -> isize {
        self.msg_verb(
            CallId::Trecv,
            ep as u64,
            buf as u64,
            len,
            src_addr,
            0,
            tag,
            ignore,
            context as u64,
        )
    }

    // ---- RMA verbs ----

    fn rma_verb(
        &mut self,
        call: CallId,
        ep: u64,
        buf: u64,
        len: usize,
        addr: fi_addr_t,
        rma_addr: u64,
        key: u64,
        data: u64,
        context: u64,
    ) -> isize {
        self.expect_open(ep, Some(HandleKind::Endpoint));
        let script = self.resolve(call);
        self.record(
            call,
            CallArgs::Rma { ep, buf, len, addr, rma_addr, key, data, flags: 0, context },
            script.ret,
        );
        script.ret as isize
    }

    pub unsafe fn fi_read(
        &mut self,
        ep: *mut fid_ep,
        buf: *mut c_void,
        len: usize,
        _desc: *mut c_void,
        src_addr: fi_addr_t,
        addr: u64,
        key: u64,
        context: *mut c_void,
    ) -> isize {
        self.rma_verb(
            CallId::Read,
            ep as u64,
            buf as u64,
            len,
            src_addr,
            addr,
            key,
            0,
            context as u64,
        )
    }

    pub unsafe fn fi_write(
        &mut self,
        ep: *mut fid_ep,
        buf: *const c_void,
        len: usize,
        _desc: *mut c_void,
        dest_addr: fi_addr_t,
        addr: u64,
        key: u64,
        context: *mut c_void,
    ) -> isize {
        self.rma_verb(
            CallId::Write,
            ep as u64,
            buf as u64,
            len,
            dest_addr,
            addr,
            key,
            0,
            context as u64,
        )
    }

    pub unsafe fn fi_writedata(
        &mut self,
        ep: *mut fid_ep,
        buf: *const c_void,
        len: usize,
        _desc: *mut c_void,
        data: u64,
        dest_addr: fi_addr_t,
        addr: u64,
        key: u64,
        context: *mut c_void,
    ) -> isize {
        self.rma_verb(
            CallId::WriteData,
            ep as u64,
            buf as u64,
            len,
            dest_addr,
            addr,
            key,
            data,
            context as u64,
        )
    }

    pub unsafe fn fi_writemsg(
        &mut self,
        ep: *mut fid_ep,
        msg: *const fi_msg_rma,
        flags: u64,
    ) -> isize {
        self.expect_open(ep as u64, Some(HandleKind::Endpoint));
        let (buf, len, addr, rma_addr, key, data, context) = if msg.is_null() {
            (0, 0, 0, 0, 0, 0, 0)
        } else {
            unsafe {
                let m = &*msg;
                let (buf, len) = if m.iov_count > 0 && !m.msg_iov.is_null() {
                    let iov = &*m.msg_iov;
                    (iov.iov_base as u64, iov.iov_len)
                } else {
                    (0, 0)
                };
                let (rma_addr, key) = if m.rma_iov_count > 0 && !m.rma_iov.is_null() {
                    let rma = &*m.rma_iov;
                    (rma.addr, rma.key)
                } else {
                    (0, 0)
                };
                (buf, len, m.addr, rma_addr, key, m.data, m.context as u64)
            }
        };
        let script = self.resolve(CallId::WriteMsg);
        self.record(
            CallId::WriteMsg,
            CallArgs::Rma {
                ep: ep as u64,
                buf,
                len,
                addr,
                rma_addr,
                key,
                data,
                flags,
                context,
            },
            script.ret,
        );
        script.ret as isize
    }

    // ---- completion queue operations (through the fi_ops_cq table) ----

    pub unsafe fn fi_cq_read(&mut self, cq: *mut fid_cq, buf: *mut c_void, count: usize) -> isize {
        self.expect_open(cq as u64, Some(HandleKind::CompletionQueue));
        // A script overrides the emulator so poll-path error injection works
        // without touching the queue contents.
        let ret = match self.scripted(CallId::CqRead) {
            Some(script) => script.ret,
            None => unsafe { self.cqs.read(cq as u64, buf, count) },
        };
        self.record(CallId::CqRead, CallArgs::CqPoll { cq: cq as u64, count }, ret);
        ret as isize
    }

    pub unsafe fn fi_cq_readfrom(
        &mut self,
        cq: *mut fid_cq,
        buf: *mut c_void,
        count: usize,
        src_addr: *mut fi_addr_t,
    ) -> isize {
        self.expect_open(cq as u64, Some(HandleKind::CompletionQueue));
        let ret = match self.scripted(CallId::CqReadFrom) {
            Some(script) => script.ret,
            None => unsafe { self.cqs.readfrom(cq as u64, buf, count, src_addr) },
        };
        self.record(CallId::CqReadFrom, CallArgs::CqPoll { cq: cq as u64, count }, ret);
        ret as isize
    }

    pub unsafe fn fi_cq_readerr(
        &mut self,
        cq: *mut fid_cq,
        buf: *mut fi_cq_err_entry,
        flags: u64,
    ) -> isize {
        self.expect_open(cq as u64, Some(HandleKind::CompletionQueue));
        let ret = match self.scripted(CallId::CqReadErr) {
            Some(script) => script.ret,
            None => unsafe { self.cqs.readerr(cq as u64, buf, flags) },
        };
        self.record(CallId::CqReadErr, CallArgs::CqPoll { cq: cq as u64, count: 1 }, ret);
        ret as isize
    }

    pub unsafe fn fi_cq_strerror(
        &mut self,
        cq: *mut fid_cq,
        prov_errno: c_int,
        err_data: *const c_void,
        buf: *mut c_char,
        len: usize,
    ) -> *const c_char {
        self.expect_open(cq as u64, Some(HandleKind::CompletionQueue));
        let msg = unsafe { self.cqs.strerror(cq as u64, prov_errno, err_data, buf, len) };
        self.record(CallId::CqStrError, CallArgs::StrError { errnum: prov_errno }, 0);
        msg
    }

    // ---- misc ----

    pub fn fi_strerror(&mut self, errnum: c_int) -> *const c_char {
        let msg = fab::errno_str(errnum);
        self.record(CallId::StrError, CallArgs::StrError { errnum }, 0);
        msg.as_ptr()
    }

    pub fn fi_version(&mut self) -> u32 {
        let version = self.api_version;
        self.record(CallId::Version, CallArgs::None, version as i64);
        version
    }
}
