//! On-demand audio clip and spectrogram rendering
//!
//! [`ClipService`] fronts a [`ClipRenderer`] with an LRU [`ClipCache`] and a
//! bounded render pool. The HTTP layer only ever talks to the service.

pub mod cache;
pub mod colormap;
pub mod decode;
pub mod dsp;
pub mod error;
pub mod model;
pub mod renderer;
pub mod service;
pub mod settings;

pub use cache::{CacheStats, ClipCache};
pub use colormap::Colormap;
pub use error::RenderError;
pub use model::{ClipOutcome, ClipPayload, ClipRequest, ClipResult};
pub use renderer::{render_clip, ClipRenderer, SpectrogramRenderer};
pub use service::{default_worker_threads, ClipService};
pub use settings::{merge_settings, RenderSettings};
