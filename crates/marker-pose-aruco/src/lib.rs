//! Marker dictionaries, observations and the detector trait.
//!
//! Quad detection and bit decoding happen outside this workspace. A detector
//! plugs in through [`MarkerDetector`] and hands back [`MarkerObservation`]s
//! whose ids belong to the session's [`DictionaryId`].

mod detector;
mod dictionary;
mod observation;

pub use detector::{retain_in_dictionary, MarkerDetector};
pub use dictionary::{DictionaryId, UnknownDictionary};
pub use observation::MarkerObservation;
