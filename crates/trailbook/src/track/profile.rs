//! Distance/elevation series derived from a decoded track.

use serde::Serialize;

use super::codec::{CompressedTrack, TrackCodec};
use super::TrackPoint;
use crate::error::CodecError;

/// One point of an elevation profile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProfileSample {
    /// Cumulative great-circle distance from the first track point, in meters.
    pub distance_m: f64,
    /// Elevation at this point, in meters.
    pub elevation_m: f64,
}

/// Lazy iterator over the elevation profile of a point slice.
///
/// Distance accumulates over every point, but only points that carry an
/// elevation produce a sample. Clone it before consuming to replay the series.
#[derive(Debug, Clone)]
pub struct ProfileIter<'a> {
    points: &'a [TrackPoint],
    index: usize,
    distance_m: f64,
}

impl Iterator for ProfileIter<'_> {
    type Item = ProfileSample;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(point) = self.points.get(self.index) {
            if self.index > 0 {
                self.distance_m += self.points[self.index - 1].distance_to(point);
            }
            self.index += 1;
            if let Some(elevation_m) = point.elevation {
                return Some(ProfileSample {
                    distance_m: self.distance_m,
                    elevation_m,
                });
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.points.len() - self.index))
    }
}

/// Build the lazy elevation profile of an ordered point slice.
#[must_use]
pub fn elevation_profile(points: &[TrackPoint]) -> ProfileIter<'_> {
    ProfileIter {
        points,
        index: 0,
        distance_m: 0.0,
    }
}

/// Decoded points of a track, from which the profile is recomputed on demand.
#[derive(Debug, Clone)]
pub struct ElevationProfile {
    points: Vec<TrackPoint>,
}

impl ElevationProfile {
    /// Decode a compressed track.
    ///
    /// # Errors
    ///
    /// Returns the codec error if the track's payload cannot be decoded.
    pub fn from_track(track: &CompressedTrack) -> Result<Self, CodecError> {
        Ok(Self {
            points: TrackCodec::decode(track)?,
        })
    }

    /// Wrap already decoded points.
    #[must_use]
    pub fn from_points(points: Vec<TrackPoint>) -> Self {
        Self { points }
    }

    /// A fresh pass over the profile.
    #[must_use]
    pub fn iter(&self) -> ProfileIter<'_> {
        elevation_profile(&self.points)
    }

    /// The profile reduced to at most `max_points` samples.
    #[must_use]
    pub fn samples(&self, max_points: usize) -> Vec<ProfileSample> {
        let all: Vec<_> = self.iter().collect();
        subsample(&all, max_points)
    }

    /// Decoded points backing the profile.
    #[must_use]
    pub fn points(&self) -> &[TrackPoint] {
        &self.points
    }
}

impl<'a> IntoIterator for &'a ElevationProfile {
    type Item = ProfileSample;
    type IntoIter = ProfileIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Pick at most `max_points` elements with a uniform stride.
///
/// The first and last elements are always kept when `max_points >= 2`.
/// `max_points == 1` yields the first element and `0` yields nothing.
#[must_use]
pub fn subsample<T: Clone>(series: &[T], max_points: usize) -> Vec<T> {
    let n = series.len();
    if max_points == 0 || n == 0 {
        return Vec::new();
    }
    if n <= max_points {
        return series.to_vec();
    }
    if max_points == 1 {
        return vec![series[0].clone()];
    }
    (0..max_points)
        .map(|i| series[i * (n - 1) / (max_points - 1)].clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn equator_track() -> Vec<TrackPoint> {
        vec![
            TrackPoint::new(0.0, 0.0).with_elevation(0.0),
            TrackPoint::new(0.0, 0.001).with_elevation(10.0),
            TrackPoint::new(0.0, 0.002).with_elevation(0.0),
        ]
    }

    #[test]
    fn test_profile_accumulates_distance() {
        let points = equator_track();
        let samples: Vec<_> = elevation_profile(&points).collect();
        assert_eq!(samples.len(), 3);
        assert!(samples[0].distance_m.abs() < f64::EPSILON);
        // 0.001 degree of longitude at the equator is ~111.2 m
        assert!((samples[1].distance_m - 111.2).abs() < 0.5);
        assert!((samples[2].distance_m - 2.0 * samples[1].distance_m).abs() < 1e-6);
        let elevations: Vec<f64> = samples.iter().map(|s| s.elevation_m).collect();
        assert_eq!(elevations, vec![0.0, 10.0, 0.0]);
    }

    #[test]
    fn test_profile_skips_points_without_elevation() {
        let points = vec![
            TrackPoint::new(0.0, 0.0).with_elevation(100.0),
            TrackPoint::new(0.0, 0.001),
            TrackPoint::new(0.0, 0.002).with_elevation(120.0),
        ];
        let samples: Vec<_> = elevation_profile(&points).collect();
        assert_eq!(samples.len(), 2);
        // distance through the skipped point still counts
        assert!((samples[1].distance_m - 222.4).abs() < 1.0);
    }

    #[test]
    fn test_profile_is_monotonic() {
        let points: Vec<_> = (0..100_i32)
            .map(|i| TrackPoint::new(46.0 + f64::from(i) * 1e-4, 7.0).with_elevation(f64::from(i)))
            .collect();
        let samples: Vec<_> = elevation_profile(&points).collect();
        assert!(samples.windows(2).all(|w| w[0].distance_m <= w[1].distance_m));
    }

    #[test]
    fn test_profile_iteration_is_restartable() {
        let points = equator_track();
        let iter = elevation_profile(&points);
        let first: Vec<_> = iter.clone().collect();
        let second: Vec<_> = iter.collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_profile_empty() {
        assert_eq!(elevation_profile(&[]).count(), 0);
    }

    #[test]
    fn test_profile_from_compressed_track() {
        let track = TrackCodec::compress(&equator_track()).unwrap();
        let profile = ElevationProfile::from_track(&track).unwrap();
        let a: Vec<_> = profile.iter().collect();
        let b: Vec<_> = (&profile).into_iter().collect();
        assert_eq!(a, b);
        assert_eq!(a.len(), 3);
        assert!((a[1].elevation_m - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_subsample_keeps_endpoints() {
        let series: Vec<u32> = (0..10_000).collect();
        let picked = subsample(&series, 500);
        assert_eq!(picked.len(), 500);
        assert_eq!(picked[0], 0);
        assert_eq!(picked[499], 9_999);
        assert!(picked.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_subsample_short_series_unchanged() {
        let series = vec![1, 2, 3];
        assert_eq!(subsample(&series, 10), series);
        assert_eq!(subsample(&series, 3), series);
    }

    #[test]
    fn test_subsample_degenerate_limits() {
        let series = vec![5, 6, 7, 8];
        assert_eq!(subsample(&series, 1), vec![5]);
        assert!(subsample(&series, 0).is_empty());
        assert_eq!(subsample(&series, 2), vec![5, 8]);
        assert!(subsample::<i32>(&[], 5).is_empty());
    }

    #[test]
    fn test_subsample_is_deterministic() {
        let series: Vec<u32> = (0..1_234).collect();
        assert_eq!(subsample(&series, 77), subsample(&series, 77));
        assert_eq!(subsample(&series, 77).len(), 77);
    }

    #[test]
    fn test_profile_samples() {
        let points: Vec<_> = (0..1_000_i32)
            .map(|i| TrackPoint::new(0.0, f64::from(i) * 1e-4).with_elevation(f64::from(i % 50)))
            .collect();
        let profile = ElevationProfile::from_points(points);
        let samples = profile.samples(100);
        assert_eq!(samples.len(), 100);
        assert!(samples[0].distance_m.abs() < f64::EPSILON);
    }
}
