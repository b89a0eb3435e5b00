//! Call descriptors, scripted responses and the invocation log.

use crate::fab::fi_addr_t;

/// One entry per intercepted entry point. Scripts and log records are keyed
/// on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallId {
    GetInfo,
    FreeInfo,
    DupInfo,
    AllocInfo,
    Fabric,
    Domain,
    Endpoint,
    AvOpen,
    CqOpen,
    MrRegattr,
    Close,
    EpBind,
    Enable,
    MrBind,
    MrEnable,
    MrDesc,
    MrKey,
    AvInsert,
    GetName,
    SetOpt,
    GetOpt,
    Send,
    Recv,
    SendData,
    RecvMsg,
    Tsend,
    Trecv,
    Read,
    Write,
    WriteData,
    WriteMsg,
    CqRead,
    CqReadFrom,
    CqReadErr,
    CqStrError,
    StrError,
    Version,
}

/// Scripted side effect applied when the call succeeds.
#[derive(Debug, Clone)]
pub enum SideEffect {
    /// Write this preminted handle to the call's out-parameter instead of
    /// allocating a fresh one.
    UseHandle(u64),
    /// `fi_av_insert`: write these resolved addresses instead of the
    /// sequentially allocated defaults.
    WriteAddrs(Vec<fi_addr_t>),
    /// `fi_mr_regattr`: stamp the registered region with this remote key.
    MrKey(u64),
}

/// One configured response. `ret` is the signed value handed back across the
/// ABI (a negative `FI_E*` code, zero, or a count).
#[derive(Debug, Clone)]
pub struct CallScript {
    pub ret: i64,
    pub effect: Option<SideEffect>,
}

impl CallScript {
    pub fn ok() -> Self {
        CallScript { ret: 0, effect: None }
    }

    pub fn ret(ret: i64) -> Self {
        CallScript { ret, effect: None }
    }

    /// Failure with a positive `FI_E*` code, stored negated as the caller
    /// will see it.
    pub fn fail(code: i64) -> Self {
        CallScript { ret: -code.abs(), effect: None }
    }

    pub fn with_effect(mut self, effect: SideEffect) -> Self {
        self.effect = Some(effect);
        self
    }

    pub fn is_err(&self) -> bool {
        self.ret < 0
    }
}

/// Arguments captured for later assertion, one variant per call shape.
/// Pointers are recorded as raw addresses; the log never dereferences them.
#[derive(Debug, Clone, PartialEq)]
pub enum CallArgs {
    None,
    GetInfo {
        version: u32,
        flags: u64,
    },
    /// Any of the open/register calls: parent handle plus caller context.
    Open {
        parent: u64,
        context: u64,
    },
    MrRegattr {
        domain: u64,
        access: u64,
        requested_key: u64,
        flags: u64,
    },
    Close {
        handle: u64,
    },
    Bind {
        handle: u64,
        target: u64,
        flags: u64,
    },
    Enable {
        handle: u64,
    },
    AvInsert {
        av: u64,
        addr: u64,
        count: usize,
        flags: u64,
    },
    GetName {
        handle: u64,
        addrlen: usize,
    },
    Opt {
        handle: u64,
        level: i32,
        optname: i32,
        optlen: usize,
    },
    /// Send/recv family, tagged included. Unused fields stay zero.
    Msg {
        ep: u64,
        buf: u64,
        len: usize,
        addr: fi_addr_t,
        data: u64,
        tag: u64,
        ignore: u64,
        flags: u64,
        context: u64,
    },
    /// RMA family: remote address and key alongside the local buffer.
    Rma {
        ep: u64,
        buf: u64,
        len: usize,
        addr: fi_addr_t,
        rma_addr: u64,
        key: u64,
        data: u64,
        flags: u64,
        context: u64,
    },
    CqPoll {
        cq: u64,
        count: usize,
    },
    StrError {
        errnum: i32,
    },
}

/// Append-only record of one intercepted call.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub call: CallId,
    pub args: CallArgs,
    pub ret: i64,
}
