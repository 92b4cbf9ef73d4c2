use serde::{Deserialize, Serialize};

pub use crate::config::TimesMode;
use crate::error::{Result, SpectError};

/// Frame time stamps in seconds.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub enum Timestamps {
    /// One value per frame (beginnings, centers) or per border (borders).
    Points(Vec<f32>),
    /// `(left, right)` border per frame.
    Pairs(Vec<[f32; 2]>),
}

impl Timestamps {
    /// Time stamps for `num_frames` frames at `frame_rate` frames per second.
    ///
    /// `first_frame_len` and `sample_rate` only matter for
    /// [`TimesMode::Borders2`], where each right border lies one frame
    /// duration after the left one.
    ///
    /// # Errors
    /// Fails if `frame_rate` is not positive, or if `sample_rate` is zero in
    /// borders2 mode.
    ///
    /// # Example
    /// ```
    /// use ms_core::timestamps::{Timestamps, TimesMode};
    /// let times = Timestamps::generate(TimesMode::Borders, 2, 10.0, 1024, 44100).unwrap();
    /// assert_eq!(times, Timestamps::Points(vec![0.0, 0.1, 0.2]));
    /// ```
    pub fn generate(
        mode: TimesMode,
        num_frames: usize,
        frame_rate: f64,
        first_frame_len: usize,
        sample_rate: u32,
    ) -> Result<Self> {
        if !frame_rate.is_finite() || frame_rate <= 0.0 {
            return Err(SpectError::config(
                "frame_rate",
                format!("doit être fini et > 0, reçu {frame_rate}"),
            ));
        }
        let dt = 1.0 / frame_rate;
        let at = |k: usize| k as f64 * dt;

        let times = match mode {
            TimesMode::Beginnings => {
                Self::Points((0..num_frames).map(|k| at(k) as f32).collect())
            }
            TimesMode::Centers => {
                Self::Points((0..num_frames).map(|k| (at(k) + dt / 2.0) as f32).collect())
            }
            TimesMode::Borders => Self::Points((0..=num_frames).map(|k| at(k) as f32).collect()),
            TimesMode::Borders2 => {
                if sample_rate == 0 {
                    return Err(SpectError::config("sample_rate", "doit être > 0"));
                }
                let duration = first_frame_len as f64 / f64::from(sample_rate);
                Self::Pairs(
                    (0..num_frames)
                        .map(|k| [at(k) as f32, (at(k) + duration) as f32])
                        .collect(),
                )
            }
        };
        Ok(times)
    }

    /// Number of entries (points or pairs).
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Points(v) => v.len(),
            Self::Pairs(v) => v.len(),
        }
    }

    /// `true` when there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
