// Kept in its own test binary: it must observe the process-wide slot while
// no other test has a mock installed.

#[cfg(test)]
mod no_mock_tests {
    use std::ptr;

    use fimock::fab::fid_fabric;
    use fimock::shim;

    #[test]
    #[should_panic(expected = "no mock installed")]
    fn api_call_without_mock_aborts() {
        let _ = env_logger::try_init();
        let mut fabric: *mut fid_fabric = ptr::null_mut();
        unsafe {
            shim::fi_fabric(ptr::null_mut(), &mut fabric, ptr::null_mut());
        }
    }
}
