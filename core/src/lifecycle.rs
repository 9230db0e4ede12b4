use std::fmt;

use crate::error::{BridgeError, Result};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BridgePhase {
    #[default]
    Uninitialized,
    SurfaceReady,
    RuntimeLoading,
    RuntimeReady,
    FileLoading,
    RuntimeFailed,
    Disposed,
}

impl BridgePhase {
    pub fn label(self) -> &'static str {
        match self {
            BridgePhase::Uninitialized => "uninitialized",
            BridgePhase::SurfaceReady => "surface-ready",
            BridgePhase::RuntimeLoading => "runtime-loading",
            BridgePhase::RuntimeReady => "runtime-ready",
            BridgePhase::FileLoading => "file-loading",
            BridgePhase::RuntimeFailed => "runtime-failed",
            BridgePhase::Disposed => "disposed",
        }
    }

    pub fn accepts_open(self) -> bool {
        self == BridgePhase::RuntimeReady
    }
}

impl fmt::Display for BridgePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Gate sequencing surface creation, runtime startup and model loads.
///
/// `Uninitialized -> SurfaceReady -> RuntimeLoading -> RuntimeReady`, then
/// any number of `FileLoading -> RuntimeReady` round trips. A failed runtime
/// start parks the gate in `RuntimeFailed`; `Disposed` is terminal and
/// reachable from every phase.
#[derive(Clone, Debug, Default)]
pub struct Lifecycle {
    phase: BridgePhase,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> BridgePhase {
        self.phase
    }

    pub fn surface_created(&mut self) -> Result<()> {
        self.advance(BridgePhase::Uninitialized, BridgePhase::SurfaceReady)
    }

    pub fn begin_runtime_load(&mut self) -> Result<()> {
        self.advance(BridgePhase::SurfaceReady, BridgePhase::RuntimeLoading)
    }

    pub fn runtime_ready(&mut self) -> Result<()> {
        self.advance(BridgePhase::RuntimeLoading, BridgePhase::RuntimeReady)
    }

    pub fn runtime_failed(&mut self) -> Result<()> {
        self.advance(BridgePhase::RuntimeLoading, BridgePhase::RuntimeFailed)
    }

    /// Claims the single load slot. Requests arriving while the runtime is
    /// still starting or another load is in flight are rejected as busy.
    pub fn begin_file_load(&mut self) -> Result<()> {
        match self.phase {
            BridgePhase::RuntimeReady => {
                self.phase = BridgePhase::FileLoading;
                Ok(())
            }
            BridgePhase::RuntimeLoading | BridgePhase::FileLoading => {
                Err(BridgeError::Busy { phase: self.phase })
            }
            BridgePhase::Disposed => Err(BridgeError::Disposed),
            phase => Err(BridgeError::NotReady { phase }),
        }
    }

    /// Releases the load slot, whatever the outcome of the load was.
    pub fn finish_file_load(&mut self) -> Result<()> {
        self.advance(BridgePhase::FileLoading, BridgePhase::RuntimeReady)
    }

    pub fn dispose(&mut self) {
        self.phase = BridgePhase::Disposed;
    }

    pub fn is_disposed(&self) -> bool {
        self.phase == BridgePhase::Disposed
    }

    fn advance(&mut self, from: BridgePhase, to: BridgePhase) -> Result<()> {
        if self.phase == BridgePhase::Disposed {
            return Err(BridgeError::Disposed);
        }
        if self.phase != from {
            return Err(BridgeError::NotReady { phase: self.phase });
        }
        self.phase = to;
        Ok(())
    }
}
