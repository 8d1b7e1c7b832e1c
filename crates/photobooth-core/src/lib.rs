pub mod compositor;
pub mod error;
pub mod filters;
pub mod frame;
pub mod preprocess;
pub mod sequencer;
pub mod strip;

pub use compositor::{CapturedShot, FrameCompositor};
pub use error::{BoothError, BoothResult, DeviceError};
pub use filters::{FilterCatalog, FilterOp, FilterSpec};
pub use frame::{DeviceStatus, Frame, FrameSource, StaticFrameSource};
pub use preprocess::ImagePreprocessor;
pub use sequencer::{
    CaptureSequencer, CountdownStep, Generation, Phase, SequenceTiming, SequencerEvent, Session, Step,
};
pub use strip::{StripArtifact, StripExporter};
