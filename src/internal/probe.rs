//! CPUID capability probes for RDRAND and RDSEED.
//!
//! Each probe hosts a short stub that only uses CPUID, so it never faults on hardware lacking the
//! feature: an absent leaf reads back as a cleared bit.
//!
//! - RDRAND: CPUID.01H:ECX[30]
//! - RDSEED: CPUID.(EAX=07H, ECX=0):EBX[18], read only when CPUID.00H:EAX reports leaf 7

use crate::internal::config::InstructionPreference;
use crate::internal::diagnostics::*;
use crate::internal::stub_template::Instruction;
use crate::HrOut;

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
use crate::internal::stub::Callable;
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
use crate::internal::stub_template::{PROBE_RDRAND, PROBE_RDSEED};

/// Entropy instructions implemented by the CPU.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Debug, Default)]
pub struct Capabilities {
    rdrand: bool,
    rdseed: bool,
}

impl Capabilities {
    pub const fn none() -> Self {
        Self { rdrand: false, rdseed: false }
    }

    /// Runs both probes once.
    ///
    /// # Errors
    /// `PlatformOperation` if a probe stub cannot be made executable.
    pub fn probe() -> HrResult<Self> {
        let caps = Self { rdrand: probe_rdrand()?, rdseed: probe_rdseed()? };
        HrOut!("rdrand={} rdseed={}", caps.rdrand, caps.rdseed);
        Ok(caps)
    }

    #[inline(always)]
    pub fn rdrand(&self) -> bool {
        self.rdrand
    }

    #[inline(always)]
    pub fn rdseed(&self) -> bool {
        self.rdseed
    }

    /// Either instruction is present.
    #[inline(always)]
    pub fn any(&self) -> bool {
        self.rdrand || self.rdseed
    }

    /// Instruction the generate stubs should use. A preference for an absent instruction falls
    /// back to the other one.
    pub fn select(&self, pref: InstructionPreference) -> Option<Instruction> {
        let rdrand = self.rdrand.then_some(Instruction::RdRand);
        let rdseed = self.rdseed.then_some(Instruction::RdSeed);
        match pref {
            InstructionPreference::Auto | InstructionPreference::RdRand => rdrand.or(rdseed),
            InstructionPreference::RdSeed => rdseed.or(rdrand),
        }
    }
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
fn run_probe(code: &[u8]) -> HrResult<bool> {
    // Probe stubs are `extern "C" fn() -> u32` returning 0 or 1.
    let probe = unsafe { Callable::<u32>::prepare(code)? };
    Ok(probe.call() != 0)
}

/// CPUID.01H:ECX.RDRAND[bit 30].
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub fn probe_rdrand() -> HrResult<bool> {
    run_probe(&PROBE_RDRAND)
}

/// CPUID.(EAX=07H,ECX=0H):EBX.RDSEED[bit 18]. `false` when the max basic leaf is below 7.
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub fn probe_rdseed() -> HrResult<bool> {
    run_probe(&PROBE_RDSEED)
}

#[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
pub fn probe_rdrand() -> HrResult<bool> {
    Ok(false)
}

#[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
pub fn probe_rdseed() -> HrResult<bool> {
    Ok(false)
}
