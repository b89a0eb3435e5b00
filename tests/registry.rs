#[cfg(test)]
mod registry_tests {
    use std::ptr;

    use fimock::fab;
    use fimock::mock::registry::{HandleKind, HandleRegistry, MisuseError};

    #[test]
    fn allocate_and_query() {
        let _ = env_logger::try_init();

        let mut registry = HandleRegistry::new();
        let fabric = registry.allocate(HandleKind::Fabric, ptr::null_mut());
        let domain = registry.allocate(HandleKind::Domain, ptr::null_mut());

        assert!(registry.is_open(fabric));
        assert!(registry.is_open(domain));
        assert_eq!(registry.kind_of(fabric), Some(HandleKind::Fabric));
        assert_eq!(registry.kind_of(domain), Some(HandleKind::Domain));
        assert_ne!(fabric, domain);
    }

    #[test]
    fn allocated_fid_carries_fclass() {
        let _ = env_logger::try_init();

        let mut registry = HandleRegistry::new();
        let ep = registry.allocate(HandleKind::Endpoint, 0x99usize as *mut _);

        let fid = unsafe { &(*(ep as *mut fab::fid_ep)).fid };
        assert_eq!(fid.fclass, fab::FI_CLASS_EP);
        assert_eq!(fid.context as usize, 0x99);
    }

    #[test]
    fn release_marks_closed() {
        let mut registry = HandleRegistry::new();
        let cq = registry.allocate(HandleKind::CompletionQueue, ptr::null_mut());

        let kind = registry.release(cq).unwrap();
        assert_eq!(kind, HandleKind::CompletionQueue);
        assert!(!registry.is_open(cq));
        // The record survives close so misuse stays diagnosable.
        assert_eq!(registry.kind_of(cq), Some(HandleKind::CompletionQueue));
    }

    #[test]
    fn double_release_is_misuse() {
        let mut registry = HandleRegistry::new();
        let mr = registry.allocate(HandleKind::MemoryRegion, ptr::null_mut());

        registry.release(mr).unwrap();
        assert_eq!(registry.release(mr), Err(MisuseError::HandleClosed(mr)));
    }

    #[test]
    fn unknown_handle_is_misuse() {
        let mut registry = HandleRegistry::new();
        assert_eq!(
            registry.release(0xdead_beef),
            Err(MisuseError::UnknownHandle(0xdead_beef))
        );
        assert!(!registry.is_open(0xdead_beef));
    }

    #[test]
    fn wrong_kind_is_misuse() {
        let mut registry = HandleRegistry::new();
        let av = registry.allocate(HandleKind::AddressVector, ptr::null_mut());

        let err = registry
            .expect_open(av, Some(HandleKind::Endpoint))
            .unwrap_err();
        assert_eq!(
            err,
            MisuseError::WrongKind {
                handle: av,
                expected: HandleKind::Endpoint,
                actual: HandleKind::AddressVector,
            }
        );
        // Kind left unspecified matches anything open.
        assert!(registry.expect_open(av, None).is_ok());
    }

    #[test]
    fn expect_open_rejects_closed() {
        let mut registry = HandleRegistry::new();
        let ep = registry.allocate(HandleKind::Endpoint, ptr::null_mut());
        registry.release(ep).unwrap();

        assert_eq!(
            registry.expect_open(ep, Some(HandleKind::Endpoint)),
            Err(MisuseError::HandleClosed(ep))
        );
    }

    #[test]
    fn fclass_roundtrip() {
        for kind in [
            HandleKind::Fabric,
            HandleKind::Domain,
            HandleKind::Endpoint,
            HandleKind::AddressVector,
            HandleKind::CompletionQueue,
            HandleKind::MemoryRegion,
        ] {
            assert_eq!(HandleKind::from_fclass(kind.fclass()), Some(kind));
        }
        assert_eq!(HandleKind::from_fclass(fab::FI_CLASS_UNSPEC), None);
    }

    #[test]
    fn reset_drops_everything() {
        let mut registry = HandleRegistry::new();
        let fabric = registry.allocate(HandleKind::Fabric, ptr::null_mut());
        let ep = registry.allocate(HandleKind::Endpoint, ptr::null_mut());
        registry.release(ep).unwrap();

        registry.reset();
        assert_eq!(registry.kind_of(fabric), None);
        assert_eq!(registry.kind_of(ep), None);
    }
}
