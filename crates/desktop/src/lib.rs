//! Desktop collaborators: effectors that drive the real session and observers
//! that capture it.

pub mod capture;
pub mod input;

pub use capture::{
    CommandObserver, FileObserver, DEFAULT_CAPTURE_COMMAND, DEFAULT_MAX_BYTES,
    DEFAULT_MEDIA_TYPE,
};
pub use input::{DryRunInput, XdotoolInput};
