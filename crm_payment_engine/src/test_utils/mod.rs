pub mod prepare_env;
mod recording_crediting;

pub use recording_crediting::{CreditCall, RecordingCrediting};
