//! Runtime configuration for a [`HardwareRng`](crate::HardwareRng).

/// Retries per checked draw; Intel recommends giving up on RDRAND after 10.
pub const DEFAULT_RETRY_LIMIT: u32 = 10;

/// Addressing mode the generate stubs are built for.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Debug)]
pub enum ExecutionMode {
    Bits32,
    Bits64,
}

impl ExecutionMode {
    /// Mode of the running process.
    pub const fn native() -> Self {
        if cfg!(target_pointer_width = "64") {
            ExecutionMode::Bits64
        } else {
            ExecutionMode::Bits32
        }
    }

    #[inline(always)]
    pub const fn is_64(self) -> bool {
        matches!(self, ExecutionMode::Bits64)
    }
}

impl Default for ExecutionMode {
    fn default() -> Self {
        Self::native()
    }
}

/// Which entropy instruction the generate stubs use when both are present.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Debug, Default)]
pub enum InstructionPreference {
    /// RDRAND, or RDSEED when only RDSEED exists.
    #[default]
    Auto,
    RdRand,
    RdSeed,
}

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub struct RngConfig {
    pub execution_mode: ExecutionMode,
    pub instruction: InstructionPreference,
    /// Attempts per checked draw before `EntropyUnavailable`. Never zero.
    pub retry_limit: u32,
}

impl Default for RngConfig {
    fn default() -> Self {
        Self {
            execution_mode: ExecutionMode::native(),
            instruction: InstructionPreference::Auto,
            retry_limit: DEFAULT_RETRY_LIMIT,
        }
    }
}

impl RngConfig {
    /// Requests an execution mode. A 32-bit process stays 32-bit.
    pub fn with_execution_mode(mut self, mode: ExecutionMode) -> Self {
        self.execution_mode = if ExecutionMode::native().is_64() { mode } else { ExecutionMode::Bits32 };
        self
    }

    pub fn with_instruction(mut self, pref: InstructionPreference) -> Self {
        self.instruction = pref;
        self
    }

    pub fn with_retry_limit(mut self, attempts: u32) -> Self {
        self.retry_limit = attempts.max(1);
        self
    }
}
