//! Hand-assembled x86 instruction stubs.
//!
//! Every stub is a complete `extern "C"` function body. The probe and 16/32-bit stubs encode
//! identically in 32-bit and 64-bit mode; the 64-bit generate stubs use REX.W and only exist
//! in 64-bit mode.

use core::fmt;

use crate::internal::dispatch::Width;

pub const STUB_SIZE: usize = 32;

/// `push rbx; mov eax, 1; xor ecx, ecx; cpuid; mov eax, ecx; shr eax, 30; and eax, 1; pop rbx; ret`
pub const PROBE_RDRAND: [u8; 20] = [
    0x53,                         // push rbx
    0xB8, 0x01, 0x00, 0x00, 0x00, // mov eax, 1
    0x31, 0xC9,                   // xor ecx, ecx
    0x0F, 0xA2,                   // cpuid
    0x89, 0xC8,                   // mov eax, ecx
    0xC1, 0xE8, 0x1E,             // shr eax, 30
    0x83, 0xE0, 0x01,             // and eax, 1
    0x5B,                         // pop rbx
    0xC3,                         // ret
];

/// Reads the max basic leaf first: below 7, CPUID.07H returns data of the highest leaf instead.
///
/// `push rbx; xor eax, eax; xor ecx, ecx; cpuid; cmp eax, 7; jb none;`
/// `mov eax, 7; xor ecx, ecx; cpuid; mov eax, ebx; shr eax, 18; and eax, 1; pop rbx; ret;`
/// `none: xor eax, eax; pop rbx; ret`
pub const PROBE_RDSEED: [u8; 35] = [
    0x53,
    0x31, 0xC0,                   // xor eax, eax
    0x31, 0xC9,
    0x0F, 0xA2,                   // cpuid (leaf 0)
    0x83, 0xF8, 0x07,             // cmp eax, 7
    0x72, 0x13,                   // jb none
    0xB8, 0x07, 0x00, 0x00, 0x00,
    0x31, 0xC9,
    0x0F, 0xA2,
    0x89, 0xD8,                   // mov eax, ebx
    0xC1, 0xE8, 0x12,             // shr eax, 18
    0x83, 0xE0, 0x01,
    0x5B,
    0xC3,
    0x31, 0xC0,                   // none:
    0x5B,
    0xC3,
];

/// Entropy instruction encoded into the generate stubs.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Debug)]
pub enum Instruction {
    RdRand,
    RdSeed,
}

impl Instruction {
    /// ModRM byte selecting `/6` (RDRAND) or `/7` (RDSEED) with EAX as the operand.
    #[inline(always)]
    const fn modrm(self) -> u8 {
        match self {
            Instruction::RdRand => 0xF0,
            Instruction::RdSeed => 0xF8,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::RdRand => f.write_str("RDRAND"),
            Instruction::RdSeed => f.write_str("RDSEED"),
        }
    }
}

/// Fixed-capacity stub buffer.
#[derive(Clone, Copy)]
pub struct StubBytes {
    buf: [u8; STUB_SIZE],
    len: usize,
}

impl StubBytes {
    const fn new() -> Self {
        Self { buf: [0u8; STUB_SIZE], len: 0 }
    }

    #[inline(always)]
    fn push(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
        self
    }

    #[inline(always)]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

impl fmt::Debug for StubBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.as_bytes().iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{:02X}", b)?;
        }
        Ok(())
    }
}

/// Operand-size / REX prefix for a width.
#[inline(always)]
fn width_prefix(width: Width) -> &'static [u8] {
    match width {
        Width::W16 => &[0x66],
        Width::W32 => &[],
        Width::W64 => &[0x48],
    }
}

/// Writes `xor eax, eax; <instr> r; ret`.
///
/// Layout for RDRAND:
/// - 16: `31 C0 66 0F C7 F0 C3`
/// - 32: `31 C0 0F C7 F0 C3`
/// - 64: `48 31 C0 48 0F C7 F0 C3`
pub fn write_generate_stub(width: Width, instr: Instruction) -> StubBytes {
    let mut s = StubBytes::new();
    if width == Width::W64 {
        s.push(&[0x48]);
    }
    s.push(&[0x31, 0xC0])
        .push(width_prefix(width))
        .push(&[0x0F, 0xC7, instr.modrm()])
        .push(&[0xC3]);
    s
}

/// ModRM for `mov [arg], eax` where `arg` holds the out pointer.
#[cfg(all(target_arch = "x86_64", not(windows)))]
const OUT_PTR_MODRM: u8 = 0x07; // [rdi]
#[cfg(any(target_arch = "x86", all(target_arch = "x86_64", windows)))]
const OUT_PTR_MODRM: u8 = 0x01; // [rcx] / [ecx]
#[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
const OUT_PTR_MODRM: u8 = 0x07;

/// Writes a stub of signature `extern "C" fn(*mut T) -> u32` that stores the draw through the
/// pointer and returns the carry flag (1 = value produced).
///
/// `[mov ecx, [esp+4]] xor eax, eax; <instr> r; mov [arg], r; setc al; movzx eax, al; ret`
pub fn write_checked_stub(width: Width, instr: Instruction) -> StubBytes {
    let mut s = StubBytes::new();
    if cfg!(target_arch = "x86") {
        s.push(&[0x8B, 0x4C, 0x24, 0x04]); // mov ecx, [esp+4]
    }
    s.push(&[0x31, 0xC0])
        .push(width_prefix(width))
        .push(&[0x0F, 0xC7, instr.modrm()])
        .push(width_prefix(width))
        .push(&[0x89, OUT_PTR_MODRM])
        .push(&[0x0F, 0x92, 0xC0]) // setc al
        .push(&[0x0F, 0xB6, 0xC0]) // movzx eax, al
        .push(&[0xC3]);
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probes_preserve_rbx_and_return() {
        for p in [&PROBE_RDRAND[..], &PROBE_RDSEED[..]] {
            assert_eq!(p[0], 0x53);
            assert_eq!(&p[p.len() - 2..], &[0x5B, 0xC3]);
            assert!(p.windows(2).any(|w| w == [0x0F, 0xA2]));
        }
        assert_eq!(PROBE_RDRAND[2], 1);
        assert_eq!(PROBE_RDRAND[14], 30);
        assert_eq!(PROBE_RDSEED[13], 7);
        assert_eq!(PROBE_RDSEED[25], 18);
    }

    #[test]
    fn rdseed_leaf_is_gated_on_max_leaf() {
        // leaf 0 first, then bail out unless it reports at least 7
        assert_eq!(&PROBE_RDSEED[1..7], &[0x31, 0xC0, 0x31, 0xC9, 0x0F, 0xA2]);
        assert_eq!(&PROBE_RDSEED[7..10], &[0x83, 0xF8, 0x07]);
        assert_eq!(PROBE_RDSEED[10], 0x72);

        let target = 12 + PROBE_RDSEED[11] as usize;
        assert_eq!(&PROBE_RDSEED[target..], &[0x31, 0xC0, 0x5B, 0xC3]);
        // the taken path also ends in pop rbx; ret
        assert_eq!(&PROBE_RDSEED[target - 2..target], &[0x5B, 0xC3]);
    }

    #[test]
    fn generate_layouts() {
        let s = write_generate_stub(Width::W16, Instruction::RdRand);
        assert_eq!(s.as_bytes(), &[0x31, 0xC0, 0x66, 0x0F, 0xC7, 0xF0, 0xC3]);

        let s = write_generate_stub(Width::W32, Instruction::RdRand);
        assert_eq!(s.as_bytes(), &[0x31, 0xC0, 0x0F, 0xC7, 0xF0, 0xC3]);

        let s = write_generate_stub(Width::W64, Instruction::RdSeed);
        assert_eq!(s.as_bytes(), &[0x48, 0x31, 0xC0, 0x48, 0x0F, 0xC7, 0xF8, 0xC3]);
    }

    #[test]
    fn checked_stub_stores_then_returns_carry() {
        let s = write_checked_stub(Width::W64, Instruction::RdRand);
        let b = s.as_bytes();
        assert!(b.len() <= STUB_SIZE);
        assert_eq!(&b[b.len() - 7..], &[0x0F, 0x92, 0xC0, 0x0F, 0xB6, 0xC0, 0xC3]);
        assert!(b.windows(3).any(|w| w == [0x48, 0x89, OUT_PTR_MODRM]));
    }

    #[test]
    fn debug_is_hex() {
        let s = write_generate_stub(Width::W32, Instruction::RdSeed);
        assert_eq!(format!("{:?}", s), "31 C0 0F C7 F8 C3");
    }
}
