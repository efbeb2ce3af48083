/*!
 * ==================================================================================
 *  Project:      hwrng
 *  File:         lib.rs
 *  Author:       8damon
 *  Organization: TITAN Softwork Solutions
 *
 *  License:      “Commons Clause” License Condition v1.0 Apache License
 *  Copyright:    (C) 2026 TITAN Softwork Solutions. All rights reserved.
 *
 *  Licensing Terms:
 *  ----------------------------------------------------------------------------------
 *   - You are free to use, modify, and share this software.
 *   - Commercial use is strictly prohibited.
 *   - Proper credit must be given to TITAN Softwork Solutions.
 *   - Modifications must be clearly documented.
 *   - This software is provided "as-is" without warranties of any kind.
 *
 *  Full License: <https://creativecommons.org/licenses/by-nc/4.0/>
 * ==================================================================================
 */

#![allow(non_snake_case)]
#![allow(unused_variables)]

pub mod internal;

pub use internal::config::{ExecutionMode, InstructionPreference, RngConfig, DEFAULT_RETRY_LIMIT};
pub use internal::diagnostics::{HrError, HrResult, PlatformOp};
pub use internal::dispatch::{EntropyWord, Width};
pub use internal::probe::Capabilities;
pub use internal::rng::HardwareRng;
pub use internal::stub_template::Instruction;

use once_cell::sync::Lazy;

use crate::internal::rng::check_modulo_range;

/// Process-wide instance, probed and prepared on first access.
static G_RNG: Lazy<HrResult<HardwareRng>> = Lazy::new(|| {
    let rng = HardwareRng::detect();
    if let Err(e) = &rng {
        crate::HrOut!("init failed: {}", e);
    }
    rng
});

/// Probes the CPU and prepares the process-wide stubs now instead of on first use.
///
/// # Returns
/// - `Ok(())` once the shared instance exists (supported or not)
/// - `Err(PlatformOperation)` if the OS refused to make a stub executable; the same error is
///   returned by every later generate call
///
/// # Example
/// ```ignore
/// hwrng::hr_init().expect("stub setup refused");
/// ```
pub fn hr_init() -> HrResult<()> {
    hr_instance().map(|_| ())
}

/// The shared [`HardwareRng`].
pub fn hr_instance() -> HrResult<&'static HardwareRng> {
    G_RNG.as_ref().map_err(|e| *e)
}

fn shared_caps() -> Capabilities {
    hr_instance().map(HardwareRng::capabilities).unwrap_or_default()
}

/// CPUID reports RDRAND.
pub fn is_rdrand_supported() -> bool {
    shared_caps().rdrand()
}

/// CPUID reports RDSEED.
pub fn is_rdseed_supported() -> bool {
    shared_caps().rdseed()
}

/// RDRAND or RDSEED is available.
pub fn is_cpu_supported() -> bool {
    shared_caps().any()
}

/// Raw 64-bit draw. Pass `true` for the full signed range; `false` folds negatives to their
/// magnitude (`i64::MIN` stays `i64::MIN`).
///
/// # Errors
/// `UnsupportedHardware`, `ArchitectureMismatch` in a 32-bit process, or the setup error.
pub fn generate_random_long(allow_negative: bool) -> HrResult<i64> {
    hr_instance()?.generate_long(allow_negative)
}

/// Raw 32-bit draw. See [`generate_random_long`].
pub fn generate_random_int(allow_negative: bool) -> HrResult<i32> {
    hr_instance()?.generate_int(allow_negative)
}

/// Raw 16-bit draw. See [`generate_random_long`].
pub fn generate_random_short(allow_negative: bool) -> HrResult<i16> {
    hr_instance()?.generate_short(allow_negative)
}

/// `(draw mod maximum) + minimum`; see [`HardwareRng::generate_range`] for the bias caveat.
///
/// # Errors
/// `InvalidRange` if `minimum >= maximum`, `ZeroMaximum` if `maximum == 0`, otherwise as
/// [`generate_random_long`].
pub fn generate_random_long_range(minimum: i64, maximum: i64) -> HrResult<i64> {
    check_modulo_range(&minimum, &maximum)?;
    hr_instance()?.generate_long_range(minimum, maximum)
}

/// 32-bit ranged draw. See [`generate_random_long_range`].
pub fn generate_random_int_range(minimum: i32, maximum: i32) -> HrResult<i32> {
    check_modulo_range(&minimum, &maximum)?;
    hr_instance()?.generate_int_range(minimum, maximum)
}

/// 16-bit ranged draw. See [`generate_random_long_range`].
pub fn generate_random_short_range(minimum: i16, maximum: i16) -> HrResult<i16> {
    check_modulo_range(&minimum, &maximum)?;
    hr_instance()?.generate_short_range(minimum, maximum)
}
