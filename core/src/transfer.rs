use thiserror::Error;

use crate::error::{BridgeError, Result};
use crate::format::ModelFormat;

/// Byte offset into the runtime's linear memory.
pub type HeapOffset = u32;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{entry_point} failed: {message}")]
pub struct RuntimeCallError {
    pub entry_point: &'static str,
    pub message: String,
}

impl RuntimeCallError {
    pub fn new(entry_point: &'static str, message: impl Into<String>) -> Self {
        Self {
            entry_point,
            message: message.into(),
        }
    }
}

/// Capabilities probed on a freshly instantiated runtime.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RuntimeCapabilities {
    pub supports_raw_memory_transfer: bool,
}

impl RuntimeCapabilities {
    pub fn strategy(&self) -> TransferStrategy {
        if self.supports_raw_memory_transfer {
            TransferStrategy::ByMemory
        } else {
            TransferStrategy::ByName
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferStrategy {
    ByName,
    ByMemory,
}

impl TransferStrategy {
    pub fn label(self) -> &'static str {
        match self {
            TransferStrategy::ByName => "by-name",
            TransferStrategy::ByMemory => "by-memory",
        }
    }
}

/// Narrow surface of the embedded geometry runtime.
///
/// The memory entry points (`allocate`, `write_heap`, `release`,
/// `open_from_memory`) are only called when `capabilities()` reports raw
/// memory transfer support.
pub trait GeometryRuntime {
    fn capabilities(&self) -> RuntimeCapabilities;

    fn open_from_content(&self, name: &str, bytes: &[u8]) -> std::result::Result<bool, RuntimeCallError>;

    fn allocate(&self, len: usize) -> std::result::Result<HeapOffset, RuntimeCallError>;

    fn write_heap(&self, offset: HeapOffset, bytes: &[u8]) -> std::result::Result<(), RuntimeCallError>;

    fn release(&self, offset: HeapOffset) -> std::result::Result<(), RuntimeCallError>;

    fn open_from_memory(
        &self,
        name: &str,
        offset: HeapOffset,
        len: usize,
        take_ownership: bool,
    ) -> std::result::Result<bool, RuntimeCallError>;

    fn open_from_url(&self, name: &str, url: &str) -> std::result::Result<(), RuntimeCallError>;

    fn display_ground(&self, visible: bool) -> std::result::Result<(), RuntimeCallError>;
}

/// A user-picked file, fully read into memory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelectedFile {
    name: String,
    bytes: Vec<u8>,
}

impl SelectedFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// How one file reaches the runtime. A `ByMemory` offset is only meaningful
/// between its allocation and the open call that consumes it, so descriptors
/// never leave `ingest`.
#[derive(Debug, PartialEq, Eq)]
pub enum TransferDescriptor<'a> {
    ByName {
        name: &'a str,
        bytes: &'a [u8],
    },
    ByMemory {
        name: &'a str,
        buffer_offset: HeapOffset,
        length: usize,
        free_on_complete: bool,
    },
}

/// What is left of a file once the runtime has it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadedModel {
    pub name: String,
    pub format: ModelFormat,
    pub strategy: TransferStrategy,
    pub length: usize,
    /// Set when the model was accepted but hiding the reference plane failed.
    pub plane_error: Option<RuntimeCallError>,
}

/// Delivers `file` into `runtime` with the strategy its capabilities allow,
/// then hides the reference plane. Once the runtime has accepted the model a
/// failing plane toggle no longer fails the load; it is reported in
/// `LoadedModel::plane_error` instead.
pub fn ingest<R>(runtime: &R, file: SelectedFile) -> Result<LoadedModel>
where
    R: GeometryRuntime + ?Sized,
{
    if file.is_empty() {
        return Err(BridgeError::FileRead {
            name: file.name,
            reason: "file is empty".to_string(),
        });
    }
    let name = file.name();
    let format = ModelFormat::detect(name, file.bytes());
    let strategy = runtime.capabilities().strategy();
    match strategy {
        TransferStrategy::ByName => {
            dispatch(
                runtime,
                TransferDescriptor::ByName {
                    name,
                    bytes: file.bytes(),
                },
            )?;
        }
        TransferStrategy::ByMemory => {
            let offset = stage_in_heap(runtime, name, file.bytes())?;
            dispatch(
                runtime,
                TransferDescriptor::ByMemory {
                    name,
                    buffer_offset: offset,
                    length: file.len(),
                    free_on_complete: true,
                },
            )?;
        }
    }
    let plane_error = runtime.display_ground(false).err();
    Ok(LoadedModel {
        name: file.name.clone(),
        format,
        strategy,
        length: file.len(),
        plane_error,
    })
}

/// Asks the runtime to fetch and open a model itself. Returns the plane
/// toggle failure, if any, the same way `ingest` does.
pub fn open_url<R>(runtime: &R, name: &str, url: &str) -> Result<Option<RuntimeCallError>>
where
    R: GeometryRuntime + ?Sized,
{
    let url = url.trim();
    if url.is_empty() {
        return Err(BridgeError::FileRead {
            name: name.to_string(),
            reason: "model url is empty".to_string(),
        });
    }
    runtime
        .open_from_url(name, url)
        .map_err(|err| transfer_error(name, err))?;
    Ok(runtime.display_ground(false).err())
}

fn stage_in_heap<R>(runtime: &R, name: &str, bytes: &[u8]) -> Result<HeapOffset>
where
    R: GeometryRuntime + ?Sized,
{
    let offset = runtime
        .allocate(bytes.len())
        .map_err(|err| transfer_error(name, err))?;
    if offset == 0 {
        return Err(BridgeError::RuntimeTransfer {
            name: name.to_string(),
            reason: format!("allocation of {} bytes failed", bytes.len()),
        });
    }
    if let Err(err) = runtime.write_heap(offset, bytes) {
        // Ownership has not been handed over yet, so the region is ours to free.
        let mut reason = err.to_string();
        if let Err(release_err) = runtime.release(offset) {
            reason = format!("{reason}; releasing {offset} also failed: {release_err}");
        }
        return Err(BridgeError::RuntimeTransfer {
            name: name.to_string(),
            reason,
        });
    }
    Ok(offset)
}

fn dispatch<R>(runtime: &R, descriptor: TransferDescriptor<'_>) -> Result<()>
where
    R: GeometryRuntime + ?Sized,
{
    let (name, accepted) = match descriptor {
        TransferDescriptor::ByName { name, bytes } => {
            let accepted = runtime
                .open_from_content(name, bytes)
                .map_err(|err| transfer_error(name, err))?;
            (name, accepted)
        }
        TransferDescriptor::ByMemory {
            name,
            buffer_offset,
            length,
            free_on_complete,
        } => {
            // With free_on_complete the runtime owns the region from here on,
            // including when the call throws.
            let accepted = runtime
                .open_from_memory(name, buffer_offset, length, free_on_complete)
                .map_err(|err| transfer_error(name, err))?;
            (name, accepted)
        }
    };
    if !accepted {
        return Err(BridgeError::RuntimeTransfer {
            name: name.to_string(),
            reason: format!("runtime rejected {name}"),
        });
    }
    Ok(())
}

fn transfer_error(name: &str, err: RuntimeCallError) -> BridgeError {
    BridgeError::RuntimeTransfer {
        name: name.to_string(),
        reason: err.to_string(),
    }
}
