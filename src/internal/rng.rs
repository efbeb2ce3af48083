//! The entropy facade: capability state plus the prepared per-width stubs.
//!
//! ## States
//! - `Unsupported`: neither instruction present; every generate call fails.
//! - `Ready`: stubs prepared for the selected instruction.
//!
//! Construction is the only transition. A `HardwareRng` is immutable afterwards and can be
//! shared freely between threads.

use core::fmt;

use crate::internal::config::{ExecutionMode, RngConfig};
use crate::internal::diagnostics::*;
use crate::internal::dispatch::{EntropyWord, StubSet, Width, WidthStubs};
use crate::internal::probe::Capabilities;
use crate::internal::stub_template::Instruction;
use crate::HrOut;

enum RngState {
    Unsupported,
    Ready { instr: Instruction, stubs: StubSet },
}

pub struct HardwareRng {
    caps: Capabilities,
    config: RngConfig,
    state: RngState,
}

#[inline(always)]
pub(crate) fn check_range<T: Ord>(minimum: &T, maximum: &T) -> HrResult<()> {
    if minimum >= maximum {
        return Err(HrError::InvalidRange);
    }
    Ok(())
}

/// [`check_range`] plus a non-zero `maximum`, which the modulo mapping divides by.
#[inline(always)]
pub(crate) fn check_modulo_range<T: Ord + Default>(minimum: &T, maximum: &T) -> HrResult<()> {
    check_range(minimum, maximum)?;
    if *maximum == T::default() {
        return Err(HrError::ZeroMaximum);
    }
    Ok(())
}

impl HardwareRng {
    /// Probes the CPU and prepares stubs according to `config`.
    ///
    /// # Errors
    /// `PlatformOperation` if the OS refuses to make a probe or generate stub executable.
    pub fn new(config: RngConfig) -> HrResult<Self> {
        let caps = Capabilities::probe()?;
        Self::build(caps, config)
    }

    /// [`HardwareRng::new`] with the default configuration.
    pub fn detect() -> HrResult<Self> {
        Self::new(RngConfig::default())
    }

    /// An instance in the `Unsupported` state. Nothing is probed or mapped.
    pub fn unsupported(config: RngConfig) -> Self {
        Self { caps: Capabilities::none(), config, state: RngState::Unsupported }
    }

    fn build(caps: Capabilities, mut config: RngConfig) -> HrResult<Self> {
        if !ExecutionMode::native().is_64() {
            config.execution_mode = ExecutionMode::Bits32;
        }

        let state = match caps.select(config.instruction) {
            None => {
                HrOut!("no entropy instruction present");
                RngState::Unsupported
            }
            Some(instr) => {
                let stubs = StubSet::prepare(instr, config.execution_mode.is_64())?;
                HrOut!("ready: {} ({} stubs, {:?})", instr, stubs.len(), config.execution_mode);
                RngState::Ready { instr, stubs }
            }
        };

        Ok(Self { caps, config, state })
    }

    #[inline(always)]
    pub fn capabilities(&self) -> Capabilities {
        self.caps
    }

    #[inline(always)]
    pub fn config(&self) -> &RngConfig {
        &self.config
    }

    #[inline(always)]
    pub fn execution_mode(&self) -> ExecutionMode {
        self.config.execution_mode
    }

    pub fn is_supported(&self) -> bool {
        matches!(self.state, RngState::Ready { .. })
    }

    /// Instruction behind the generate stubs, if any.
    pub fn instruction(&self) -> Option<Instruction> {
        match &self.state {
            RngState::Ready { instr, .. } => Some(*instr),
            RngState::Unsupported => None,
        }
    }

    /// Number of executable regions owned by this instance.
    pub fn prepared_stubs(&self) -> usize {
        match &self.state {
            RngState::Ready { stubs, .. } => stubs.len(),
            RngState::Unsupported => 0,
        }
    }

    fn stubs_for<T: EntropyWord>(&self) -> HrResult<&WidthStubs<T::Raw>> {
        let stubs = match &self.state {
            RngState::Ready { stubs, .. } => stubs,
            RngState::Unsupported => return Err(HrError::UnsupportedHardware),
        };
        if T::WIDTH == Width::W64 && !self.config.execution_mode.is_64() {
            return Err(HrError::ArchitectureMismatch);
        }
        T::stubs(stubs).ok_or(HrError::UninitializedCallable(T::WIDTH))
    }

    /// One raw draw, reinterpreted as `T`.
    ///
    /// With `allow_negative == false` negative draws are folded to their magnitude; `T::MIN`
    /// folds to itself and is returned as is. The carry flag is not checked: a failed draw
    /// reads as zero. Use [`HardwareRng::try_generate`] when that matters.
    ///
    /// # Errors
    /// - `UnsupportedHardware` in the `Unsupported` state.
    /// - `ArchitectureMismatch` for `i64` outside a 64-bit execution mode.
    /// - `UninitializedCallable` if the width was never prepared.
    pub fn generate<T: EntropyWord>(&self, allow_negative: bool) -> HrResult<T> {
        let v = T::from_raw(self.stubs_for::<T>()?.raw.call());
        Ok(if allow_negative { v } else { v.fold() })
    }

    /// `(generate(false) mod maximum) + minimum`.
    ///
    /// The modulus is `maximum`, not the span, so the result is biased and, for a negative
    /// `minimum`, lands in `[minimum, minimum + maximum)` rather than `[minimum, maximum)`. A
    /// negative `maximum` gives `[minimum, minimum + |maximum|)`, so `(-10, -3)` yields
    /// `-10..=-8`.
    /// [`HardwareRng::generate_within`] maps onto the requested range exactly.
    ///
    /// # Errors
    /// `InvalidRange` if `minimum >= maximum`, `ZeroMaximum` if `maximum == 0`, then as
    /// [`HardwareRng::generate`].
    pub fn generate_range<T: EntropyWord>(&self, minimum: T, maximum: T) -> HrResult<T> {
        check_modulo_range(&minimum, &maximum)?;
        Ok(self.generate::<T>(false)?.modulo_range(minimum, maximum))
    }

    fn draw_checked<T: EntropyWord>(&self) -> HrResult<T::Raw> {
        let stubs = self.stubs_for::<T>()?;
        let attempts = self.config.retry_limit.max(1);
        for _ in 0..attempts {
            if let Some(v) = stubs.checked.call() {
                return Ok(v);
            }
            core::hint::spin_loop();
        }
        HrOut!("{} draw empty after {} attempts", T::WIDTH, attempts);
        Err(HrError::EntropyUnavailable { attempts })
    }

    /// Like [`HardwareRng::generate`], but only accepts draws the CPU flagged as valid.
    ///
    /// # Errors
    /// As [`HardwareRng::generate`], plus `EntropyUnavailable` once `retry_limit` attempts
    /// came back empty.
    pub fn try_generate<T: EntropyWord>(&self, allow_negative: bool) -> HrResult<T> {
        let v = T::from_raw(self.draw_checked::<T>()?);
        Ok(if allow_negative { v } else { v.fold() })
    }

    /// Uniform value in `[minimum, maximum)` by rejection sampling over checked draws.
    ///
    /// # Errors
    /// As [`HardwareRng::try_generate`], plus `InvalidRange` if `minimum >= maximum`.
    pub fn generate_within<T: EntropyWord>(&self, minimum: T, maximum: T) -> HrResult<T> {
        check_range(&minimum, &maximum)?;
        loop {
            let raw = self.draw_checked::<T>()?;
            if let Some(v) = T::span_range(raw, minimum, maximum) {
                return Ok(v);
            }
        }
    }

    pub fn generate_long(&self, allow_negative: bool) -> HrResult<i64> {
        self.generate::<i64>(allow_negative)
    }

    pub fn generate_int(&self, allow_negative: bool) -> HrResult<i32> {
        self.generate::<i32>(allow_negative)
    }

    pub fn generate_short(&self, allow_negative: bool) -> HrResult<i16> {
        self.generate::<i16>(allow_negative)
    }

    pub fn generate_long_range(&self, minimum: i64, maximum: i64) -> HrResult<i64> {
        self.generate_range(minimum, maximum)
    }

    pub fn generate_int_range(&self, minimum: i32, maximum: i32) -> HrResult<i32> {
        self.generate_range(minimum, maximum)
    }

    pub fn generate_short_range(&self, minimum: i16, maximum: i16) -> HrResult<i16> {
        self.generate_range(minimum, maximum)
    }
}

impl fmt::Debug for HardwareRng {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HardwareRng")
            .field("caps", &self.caps)
            .field("config", &self.config)
            .field("instruction", &self.instruction())
            .field("prepared_stubs", &self.prepared_stubs())
            .finish()
    }
}
