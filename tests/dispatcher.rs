#[cfg(test)]
mod dispatcher_tests {
    use std::ffi::c_void;
    use std::mem::MaybeUninit;
    use std::ptr;

    use fimock::fab::{self, fi_addr_t, fi_cq_data_entry, fid_av, fid_domain, fid_ep, fid_mr};
    use fimock::{CallArgs, CallId, CallScript, CqCompletion, FabricMock, HandleKind, SideEffect};

    fn mock() -> FabricMock {
        let _ = env_logger::try_init();
        FabricMock::new()
    }

    #[test]
    fn endpoint_open_returns_pinned_handle() {
        let mut mock = mock();
        let domain = mock.premint(HandleKind::Domain);
        let h1 = mock.premint(HandleKind::Endpoint);
        mock.expect(
            CallId::Endpoint,
            CallScript::ok().with_effect(SideEffect::UseHandle(h1)),
        );

        let mut ep: *mut fid_ep = ptr::null_mut();
        let ret = unsafe {
            mock.fi_endpoint(
                domain as *mut fid_domain,
                ptr::null_mut(),
                &mut ep,
                0x77usize as *mut c_void,
            )
        };
        assert_eq!(ret, 0);
        assert_eq!(ep as u64, h1);

        let last = mock.last_invocation().unwrap();
        assert_eq!(last.call, CallId::Endpoint);
        assert_eq!(last.ret, 0);
        assert_eq!(
            last.args,
            CallArgs::Open { parent: domain, context: 0x77 }
        );
    }

    #[test]
    fn failed_av_insert_writes_no_addresses() {
        let mut mock = mock();
        let av = mock.premint(HandleKind::AddressVector);
        mock.expect(CallId::AvInsert, CallScript::fail(fab::FI_EINVAL));

        let raw_addr = [0u8; 16];
        let mut fi_addrs: [fi_addr_t; 2] = [0xdead, 0xdead];
        let ret = unsafe {
            mock.fi_av_insert(
                av as *mut fid_av,
                raw_addr.as_ptr() as *const c_void,
                2,
                fi_addrs.as_mut_ptr(),
                0,
                ptr::null_mut(),
            )
        };
        assert_eq!(ret, -(fab::FI_EINVAL as i32));
        assert_eq!(fi_addrs, [0xdead, 0xdead], "out-params must stay untouched on failure");
    }

    #[test]
    fn av_insert_defaults_to_sequential_addresses() {
        let mut mock = mock();
        let av = mock.premint(HandleKind::AddressVector);

        let raw_addr = [0u8; 32];
        let mut fi_addrs: [fi_addr_t; 4] = [0; 4];
        let ret = unsafe {
            mock.fi_av_insert(
                av as *mut fid_av,
                raw_addr.as_ptr() as *const c_void,
                4,
                fi_addrs.as_mut_ptr(),
                0,
                ptr::null_mut(),
            )
        };
        assert_eq!(ret, 4, "success reports the insertion count");
        assert_eq!(fi_addrs, [0, 1, 2, 3]);
    }

    #[test]
    fn av_insert_scripted_addresses() {
        let mut mock = mock();
        let av = mock.premint(HandleKind::AddressVector);
        mock.expect(
            CallId::AvInsert,
            CallScript::ok().with_effect(SideEffect::WriteAddrs(vec![0x10, 0x20])),
        );

        let raw_addr = [0u8; 16];
        let mut fi_addrs: [fi_addr_t; 2] = [0; 2];
        let ret = unsafe {
            mock.fi_av_insert(
                av as *mut fid_av,
                raw_addr.as_ptr() as *const c_void,
                2,
                fi_addrs.as_mut_ptr(),
                0,
                ptr::null_mut(),
            )
        };
        assert_eq!(ret, 2);
        assert_eq!(fi_addrs, [0x10, 0x20]);
    }

    #[test]
    fn one_shot_script_consumed_exactly_once() {
        let mut mock = mock();
        let ep = mock.premint(HandleKind::Endpoint);
        mock.expect(CallId::Enable, CallScript::fail(fab::FI_EIO));

        let ret = unsafe { mock.fi_enable(ep as *mut fid_ep) };
        assert_eq!(ret, -(fab::FI_EIO as i32));
        // Script exhausted; the standing default is plain success.
        let ret = unsafe { mock.fi_enable(ep as *mut fid_ep) };
        assert_eq!(ret, 0);
    }

    #[test]
    fn standing_default_applies_until_overridden() {
        let mut mock = mock();
        let ep = mock.premint(HandleKind::Endpoint);
        mock.set_default(CallId::Send, CallScript::ret(0));
        mock.expect(CallId::Send, CallScript::fail(fab::FI_EAGAIN));

        let buf = [0u8; 64];
        let send = |mock: &mut FabricMock| unsafe {
            mock.fi_send(
                ep as *mut fid_ep,
                buf.as_ptr() as *const c_void,
                buf.len(),
                ptr::null_mut(),
                3,
                ptr::null_mut(),
            )
        };
        assert_eq!(send(&mut mock), -(fab::FI_EAGAIN as isize));
        assert_eq!(send(&mut mock), 0);
        assert_eq!(send(&mut mock), 0);
    }

    #[test]
    fn every_call_appends_one_log_entry() {
        let mut mock = mock();
        let ep = mock.premint(HandleKind::Endpoint);
        mock.expect(CallId::Send, CallScript::fail(fab::FI_EAGAIN));

        let buf = [0u8; 8];
        for _ in 0..3 {
            unsafe {
                mock.fi_send(
                    ep as *mut fid_ep,
                    buf.as_ptr() as *const c_void,
                    buf.len(),
                    ptr::null_mut(),
                    0,
                    ptr::null_mut(),
                );
            }
        }
        assert_eq!(mock.calls_to(CallId::Send), 3);
        let rets: Vec<i64> = mock
            .invocations()
            .iter()
            .filter(|i| i.call == CallId::Send)
            .map(|i| i.ret)
            .collect();
        assert_eq!(rets, vec![-fab::FI_EAGAIN, 0, 0]);
    }

    #[test]
    fn configured_failure_leaves_out_param_unwritten() {
        let mut mock = mock();
        let fabric = mock.premint(HandleKind::Fabric);
        mock.expect(CallId::Domain, CallScript::fail(fab::FI_ENOMEM));

        let mut domain: *mut fid_domain = ptr::null_mut();
        let ret = unsafe {
            mock.fi_domain(
                fabric as *mut fab::fid_fabric,
                ptr::null_mut(),
                &mut domain,
                ptr::null_mut(),
            )
        };
        assert_eq!(ret, -(fab::FI_ENOMEM as i32));
        assert!(domain.is_null());
    }

    #[test]
    fn tagged_send_records_tag() {
        let mut mock = mock();
        let ep = mock.premint(HandleKind::Endpoint);

        let buf = [0u8; 32];
        let ret = unsafe {
            mock.fi_tsend(
                ep as *mut fid_ep,
                buf.as_ptr() as *const c_void,
                buf.len(),
                ptr::null_mut(),
                7,
                0x7700,
                0x1234usize as *mut c_void,
            )
        };
        assert_eq!(ret, 0);
        match &mock.last_invocation().unwrap().args {
            CallArgs::Msg { len, addr, tag, context, .. } => {
                assert_eq!(*len, 32);
                assert_eq!(*addr, 7);
                assert_eq!(*tag, 0x7700);
                assert_eq!(*context, 0x1234);
            }
            other => panic!("unexpected args: {other:?}"),
        }
    }

    #[test]
    fn rma_write_records_remote_address_and_key() {
        let mut mock = mock();
        let ep = mock.premint(HandleKind::Endpoint);

        let buf = [0u8; 16];
        let ret = unsafe {
            mock.fi_write(
                ep as *mut fid_ep,
                buf.as_ptr() as *const c_void,
                buf.len(),
                ptr::null_mut(),
                2,
                0xabc0_0000,
                0x51,
                ptr::null_mut(),
            )
        };
        assert_eq!(ret, 0);
        match &mock.last_invocation().unwrap().args {
            CallArgs::Rma { rma_addr, key, addr, .. } => {
                assert_eq!(*rma_addr, 0xabc0_0000);
                assert_eq!(*key, 0x51);
                assert_eq!(*addr, 2);
            }
            other => panic!("unexpected args: {other:?}"),
        }
    }

    #[test]
    fn mr_registration_stamps_key_and_desc() {
        let mut mock = mock();
        let domain = mock.premint(HandleKind::Domain);

        let region = [0u8; 4096];
        let iov = libc::iovec {
            iov_base: region.as_ptr() as *mut c_void,
            iov_len: region.len(),
        };
        let attr = fab::fi_mr_attr {
            mr_iov: &iov,
            iov_count: 1,
            access: 0x3,
            offset: 0,
            requested_key: 0x77,
            context: ptr::null_mut(),
            auth_key_size: 0,
            auth_key: ptr::null_mut(),
            iface: 0,
            device: 0,
        };

        let mut mr: *mut fid_mr = ptr::null_mut();
        let ret =
            unsafe { mock.fi_mr_regattr(domain as *mut fid_domain, &attr, 0, &mut mr) };
        assert_eq!(ret, 0);
        assert!(!mr.is_null());
        assert_eq!(unsafe { mock.fi_mr_key(mr) }, 0x77);
        assert!(!unsafe { mock.fi_mr_desc(mr) }.is_null());
    }

    #[test]
    fn mr_key_script_overrides_requested_key() {
        let mut mock = mock();
        let domain = mock.premint(HandleKind::Domain);
        mock.expect(
            CallId::MrRegattr,
            CallScript::ok().with_effect(SideEffect::MrKey(0xfeed)),
        );

        let mut mr: *mut fid_mr = ptr::null_mut();
        let ret = unsafe {
            mock.fi_mr_regattr(domain as *mut fid_domain, ptr::null(), 0, &mut mr)
        };
        assert_eq!(ret, 0);
        assert_eq!(unsafe { mock.fi_mr_key(mr) }, 0xfeed);
    }

    #[test]
    fn getname_reports_required_length() {
        let mut mock = mock();
        let ep = mock.premint(HandleKind::Endpoint);

        let mut small = [0u8; 4];
        let mut addrlen = small.len();
        let ret = unsafe {
            mock.fi_getname(
                ep as fab::fid_t,
                small.as_mut_ptr() as *mut c_void,
                &mut addrlen,
            )
        };
        assert_eq!(ret, -(fab::FI_ETOOSMALL as i32));
        assert_eq!(addrlen, 8);

        let mut name = [0u8; 8];
        let mut addrlen = name.len();
        let ret = unsafe {
            mock.fi_getname(
                ep as fab::fid_t,
                name.as_mut_ptr() as *mut c_void,
                &mut addrlen,
            )
        };
        assert_eq!(ret, 0);
        assert_eq!(u64::from_le_bytes(name), ep);
    }

    #[test]
    fn close_failure_keeps_handle_open() {
        let mut mock = mock();
        let ep = mock.premint(HandleKind::Endpoint);
        mock.expect(CallId::Close, CallScript::fail(fab::FI_EBUSY));

        let ret = unsafe { mock.fi_close(ep as *mut fab::fid) };
        assert_eq!(ret, -(fab::FI_EBUSY as i32));
        assert!(mock.is_open(ep));

        let ret = unsafe { mock.fi_close(ep as *mut fab::fid) };
        assert_eq!(ret, 0);
        assert!(!mock.is_open(ep));
    }

    #[test]
    #[should_panic(expected = "already closed")]
    fn double_close_aborts() {
        let mut mock = mock();
        let ep = mock.premint(HandleKind::Endpoint);

        unsafe {
            mock.fi_close(ep as *mut fab::fid);
            mock.fi_close(ep as *mut fab::fid);
        }
    }

    #[test]
    #[should_panic(expected = "already closed")]
    fn enable_after_close_aborts() {
        let mut mock = mock();
        let ep = mock.premint(HandleKind::Endpoint);

        unsafe {
            mock.fi_close(ep as *mut fab::fid);
            mock.fi_enable(ep as *mut fid_ep);
        }
    }

    #[test]
    #[should_panic(expected = "expected endpoint, got domain")]
    fn wrong_handle_kind_aborts() {
        let mut mock = mock();
        let domain = mock.premint(HandleKind::Domain);

        unsafe {
            mock.fi_enable(domain as *mut fid_ep);
        }
    }

    #[test]
    #[should_panic(expected = "unknown handle")]
    fn unknown_handle_aborts() {
        let mut mock = mock();
        unsafe {
            mock.fi_enable(0x1234 as *mut fid_ep);
        }
    }

    #[test]
    fn scripted_cq_read_overrides_emulator() {
        let mut mock = mock();
        let cq = mock.premint(HandleKind::CompletionQueue);
        mock.push_completion(cq, CqCompletion::new(0x42, 8));
        mock.expect(CallId::CqRead, CallScript::fail(fab::FI_EIO));

        let mut entries: [fi_cq_data_entry; 1] = unsafe { MaybeUninit::zeroed().assume_init() };
        let ret = unsafe {
            mock.fi_cq_read(cq as *mut fab::fid_cq, entries.as_mut_ptr() as *mut c_void, 1)
        };
        assert_eq!(ret, -(fab::FI_EIO as isize));
        // Injection must not disturb the queue contents.
        assert_eq!(mock.cq_pending(cq), 1);

        let ret = unsafe {
            mock.fi_cq_read(cq as *mut fab::fid_cq, entries.as_mut_ptr() as *mut c_void, 1)
        };
        assert_eq!(ret, 1);
        assert_eq!(entries[0].op_context as u64, 0x42);
    }

    #[test]
    fn bind_calls_are_recorded_no_op_transitions() {
        let mut mock = mock();
        let ep = mock.premint(HandleKind::Endpoint);
        let cq = mock.premint(HandleKind::CompletionQueue);

        let ret = unsafe {
            mock.fi_ep_bind(ep as *mut fid_ep, cq as *mut fab::fid, 0x100)
        };
        assert_eq!(ret, 0);
        assert_eq!(
            mock.last_invocation().unwrap().args,
            CallArgs::Bind { handle: ep, target: cq, flags: 0x100 }
        );
        // Binding produces no completions.
        assert_eq!(mock.cq_pending(cq), 0);
    }

    #[test]
    fn info_alloc_dup_free_roundtrip() {
        let mut mock = mock();

        let info = unsafe { mock.fi_allocinfo() };
        assert!(!info.is_null());
        unsafe {
            (*info).caps = 0xf00d;
            (*(*info).ep_attr).max_msg_size = 9000;
        }

        let dup = unsafe { mock.fi_dupinfo(info) };
        assert!(!dup.is_null());
        unsafe {
            assert_eq!((*dup).caps, 0xf00d);
            assert_eq!((*(*dup).ep_attr).max_msg_size, 9000);
            mock.fi_freeinfo(info);
            mock.fi_freeinfo(dup);
        }
        assert_eq!(mock.calls_to(CallId::FreeInfo), 2);
    }

    #[test]
    fn getinfo_echoes_hints() {
        let mut mock = mock();

        let hints = unsafe { mock.fi_allocinfo() };
        unsafe { (*hints).caps = 0xabcd };

        let mut info: *mut fab::fi_info = ptr::null_mut();
        let ret = unsafe {
            mock.fi_getinfo(
                fab::DEFAULT_API_VERSION,
                ptr::null(),
                ptr::null(),
                0,
                hints,
                &mut info,
            )
        };
        assert_eq!(ret, 0);
        unsafe {
            assert_eq!((*info).caps, 0xabcd);
            assert_eq!((*(*info).fabric_attr).api_version, fab::DEFAULT_API_VERSION);
            mock.fi_freeinfo(hints);
            mock.fi_freeinfo(info);
        }
    }

    #[test]
    fn reset_clears_scripts_log_and_handles() {
        let mut mock = mock();
        let ep = mock.premint(HandleKind::Endpoint);
        mock.expect(CallId::Enable, CallScript::fail(fab::FI_EIO));
        unsafe { mock.fi_enable(ep as *mut fid_ep) };
        assert_eq!(mock.invocations().len(), 1);

        mock.reset();
        assert!(mock.invocations().is_empty());
        assert!(!mock.is_open(ep));

        // The pending-script table was dropped along with everything else.
        let ep = mock.premint(HandleKind::Endpoint);
        assert_eq!(unsafe { mock.fi_enable(ep as *mut fid_ep) }, 0);
    }
}
