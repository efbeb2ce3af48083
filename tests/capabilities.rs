use hwrng::{
    hr_instance, is_cpu_supported, is_rdrand_supported, is_rdseed_supported, HardwareRng, HrError,
};

#[test]
fn flags_are_stable_across_reads() {
    let first = (is_rdrand_supported(), is_rdseed_supported(), is_cpu_supported());
    for _ in 0..1_000 {
        assert_eq!(first, (is_rdrand_supported(), is_rdseed_supported(), is_cpu_supported()));
    }
}

#[test]
fn overall_flag_ors_both_instructions() {
    assert_eq!(is_cpu_supported(), is_rdrand_supported() || is_rdseed_supported());
}

#[test]
fn shared_instance_is_built_once() {
    let a = match hr_instance() {
        Ok(r) => r,
        Err(e @ HrError::PlatformOperation { .. }) => {
            eprintln!("stub memory refused by the OS ({e}), skipping");
            return;
        }
        Err(e) => panic!("unexpected setup error: {e}"),
    };

    let handles: Vec<_> = (0..8)
        .map(|_| std::thread::spawn(|| hr_instance().map(|r| r as *const HardwareRng as usize)))
        .collect();
    for h in handles {
        let addr = h.join().expect("worker thread panicked").expect("shared instance vanished");
        assert_eq!(addr, a as *const HardwareRng as usize);
    }

    assert_eq!(a.capabilities().any(), is_cpu_supported());
    assert_eq!(a.is_supported(), is_cpu_supported());
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
#[test]
fn flags_match_the_cpuid_leaves() {
    let Ok(rng) = hr_instance() else { return };
    let caps = rng.capabilities();
    assert_eq!(caps.rdrand(), std::arch::is_x86_feature_detected!("rdrand"));
    assert_eq!(caps.rdseed(), std::arch::is_x86_feature_detected!("rdseed"));
}

#[test]
fn unsupported_cpu_maps_no_stubs() {
    let Ok(rng) = hr_instance() else { return };
    if !rng.is_supported() {
        assert_eq!(rng.prepared_stubs(), 0);
        assert_eq!(rng.instruction(), None);
    } else {
        assert!(rng.prepared_stubs() >= 4);
        assert!(rng.instruction().is_some());
    }
}
