//! The seam between the pose pipeline and a marker detector.

use crate::{DictionaryId, MarkerObservation};
use log::debug;
use marker_pose_core::{GrayImage, RawFrame};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Finds markers of one dictionary in a frame.
///
/// `gray` is the luma conversion of `frame`, made once per frame by the
/// pipeline; it is `None` when the frame carries no pixels. `frame` still
/// provides the index, timestamp and size.
///
/// Implementations must not depend on previous frames; the pipeline treats
/// `detect` as a pure function of its inputs. Order of the returned
/// observations is preserved all the way to the renderer.
pub trait MarkerDetector {
    fn detect(
        &self,
        frame: &RawFrame,
        gray: Option<&GrayImage>,
        dictionary: DictionaryId,
    ) -> Vec<MarkerObservation>;
}

impl<T: MarkerDetector + ?Sized> MarkerDetector for &T {
    fn detect(
        &self,
        frame: &RawFrame,
        gray: Option<&GrayImage>,
        dictionary: DictionaryId,
    ) -> Vec<MarkerObservation> {
        (**self).detect(frame, gray, dictionary)
    }
}

impl<T: MarkerDetector + ?Sized> MarkerDetector for Box<T> {
    fn detect(
        &self,
        frame: &RawFrame,
        gray: Option<&GrayImage>,
        dictionary: DictionaryId,
    ) -> Vec<MarkerObservation> {
        (**self).detect(frame, gray, dictionary)
    }
}

/// Drop observations whose id does not exist in `dictionary`.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip_all, fields(dictionary = %dictionary))
)]
pub fn retain_in_dictionary(
    mut observations: Vec<MarkerObservation>,
    dictionary: DictionaryId,
) -> Vec<MarkerObservation> {
    let before = observations.len();
    observations.retain(|o| dictionary.contains(o.id));
    if observations.len() != before {
        debug!(
            "dropped {} observation(s) with ids outside {dictionary}",
            before - observations.len()
        );
    }
    observations
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point2;

    struct Fixed(Vec<MarkerObservation>);

    impl MarkerDetector for Fixed {
        fn detect(
            &self,
            _frame: &RawFrame,
            _gray: Option<&GrayImage>,
            dictionary: DictionaryId,
        ) -> Vec<MarkerObservation> {
            retain_in_dictionary(self.0.clone(), dictionary)
        }
    }

    fn obs(id: u32) -> MarkerObservation {
        MarkerObservation::new(id, [Point2::origin(); 4])
    }

    #[test]
    fn out_of_range_ids_are_dropped_in_order() {
        let det: Box<dyn MarkerDetector> = Box::new(Fixed(vec![obs(3), obs(60), obs(1), obs(49)]));
        let frame = RawFrame::metadata_only(0, 0.0, 640, 480);
        let ids: Vec<u32> = det
            .detect(&frame, None, DictionaryId::Dict4x4_50)
            .iter()
            .map(|o| o.id)
            .collect();
        assert_eq!(ids, vec![3, 1, 49]);

        let all: Vec<u32> = det
            .detect(&frame, None, DictionaryId::Dict4x4_100)
            .iter()
            .map(|o| o.id)
            .collect();
        assert_eq!(all, vec![3, 60, 1, 49]);
    }
}
