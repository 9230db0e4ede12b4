pub mod catalog;
pub mod display;
pub mod error;
pub mod format;
pub mod lifecycle;
pub mod transfer;

pub use catalog::{default_format, format_by_slug, FormatCatalogEntry, FORMAT_CATALOG};
pub use display::{fit_to_display, DisplayMetrics, SurfaceSize};
pub use error::{BridgeError, Result};
pub use format::{FileFilter, ModelFormat};
pub use lifecycle::{BridgePhase, Lifecycle};
pub use transfer::{
    ingest, open_url, GeometryRuntime, HeapOffset, LoadedModel, RuntimeCallError,
    RuntimeCapabilities, SelectedFile, TransferDescriptor, TransferStrategy,
};
