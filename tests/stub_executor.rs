#![cfg(any(target_arch = "x86", target_arch = "x86_64"))]

use hwrng::internal::stub::{Callable, CheckedCallable, ExecutableStub};
use hwrng::HrError;

/// `mov eax, imm32; ret`
fn ret_imm32(v: u32) -> Vec<u8> {
    let mut code = vec![0xB8];
    code.extend_from_slice(&v.to_le_bytes());
    code.push(0xC3);
    code
}

fn host_or_skip(code: &[u8]) -> Option<ExecutableStub> {
    match ExecutableStub::host(code) {
        Ok(s) => Some(s),
        Err(e @ HrError::PlatformOperation { .. }) => {
            eprintln!("executable memory refused ({e}), skipping");
            None
        }
        Err(e) => panic!("unexpected error: {e}"),
    }
}

#[test]
fn hosted_bytes_are_unchanged() {
    let code = ret_imm32(0xDEAD_BEEF);
    let Some(stub) = host_or_skip(&code) else { return };
    assert_eq!(stub.code(), code.as_slice());
    assert_eq!(stub.len(), code.len());
    assert!(!stub.as_ptr().is_null());
}

#[test]
fn empty_stub_is_rejected() {
    assert!(matches!(ExecutableStub::host(&[]), Err(HrError::InvalidStub)));
}

#[test]
fn callable_returns_register_value() {
    if host_or_skip(&[0xC3]).is_none() {
        return;
    }

    let f = unsafe { Callable::<u32>::prepare(&ret_imm32(42)) }.expect("prepare");
    assert_eq!(f.call(), 42);
    assert_eq!(f.call(), 42);

    let f = unsafe { Callable::<u16>::prepare(&ret_imm32(0x1234_BEEF)) }.expect("prepare");
    assert_eq!(f.call(), 0xBEEF);
}

#[cfg(target_arch = "x86_64")]
#[test]
fn callable_returns_full_rax() {
    if host_or_skip(&[0xC3]).is_none() {
        return;
    }

    // mov rax, imm64; ret
    let mut code = vec![0x48, 0xB8];
    code.extend_from_slice(&0x0123_4567_89AB_CDEFu64.to_le_bytes());
    code.push(0xC3);

    let f = unsafe { Callable::<u64>::prepare(&code) }.expect("prepare");
    assert_eq!(f.call(), 0x0123_4567_89AB_CDEF);
}

/// `mov dword [arg], 7; mov eax, ok; ret` as `extern "C" fn(*mut u32) -> u32`.
fn store_seven(ok: u32) -> Vec<u8> {
    let mut code = Vec::new();
    if cfg!(target_arch = "x86") {
        code.extend_from_slice(&[0x8B, 0x4C, 0x24, 0x04]); // mov ecx, [esp+4]
    }
    let modrm = if cfg!(all(target_arch = "x86_64", not(windows))) { 0x07 } else { 0x01 };
    code.extend_from_slice(&[0xC7, modrm, 0x07, 0x00, 0x00, 0x00]);
    code.push(0xB8);
    code.extend_from_slice(&ok.to_le_bytes());
    code.push(0xC3);
    code
}

#[test]
fn checked_callable_reports_success_flag() {
    if host_or_skip(&[0xC3]).is_none() {
        return;
    }

    let f = unsafe { CheckedCallable::<u32>::prepare(&store_seven(1)) }.expect("prepare");
    assert_eq!(f.call(), Some(7));

    let f = unsafe { CheckedCallable::<u32>::prepare(&store_seven(0)) }.expect("prepare");
    assert_eq!(f.call(), None);
}

#[test]
fn regions_are_released_on_drop() {
    if host_or_skip(&[0xC3]).is_none() {
        return;
    }

    for i in 0..256u32 {
        let f = unsafe { Callable::<u32>::prepare(&ret_imm32(i)) }.expect("prepare");
        assert_eq!(f.call(), i);
    }
}

#[test]
fn callables_cross_threads() {
    if host_or_skip(&[0xC3]).is_none() {
        return;
    }

    let f = std::sync::Arc::new(unsafe { Callable::<u32>::prepare(&ret_imm32(99)) }.expect("prepare"));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let f = f.clone();
            std::thread::spawn(move || f.call())
        })
        .collect();
    for h in handles {
        assert_eq!(h.join().expect("caller panicked"), 99);
    }
}
