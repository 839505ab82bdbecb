use bevy::prelude::*;

pub trait InterpolateLinear {
    fn interpolate_linear(&self, other: &Self, f: f32) -> Self;
}

impl InterpolateLinear for f32 {
    fn interpolate_linear(&self, other: &Self, f: f32) -> Self {
        self + (other - self) * f
    }
}

impl InterpolateLinear for Vec3 {
    fn interpolate_linear(&self, other: &Self, f: f32) -> Self {
        self.lerp(*other, f)
    }
}

impl InterpolateLinear for Quat {
    fn interpolate_linear(&self, other: &Self, f: f32) -> Self {
        self.slerp(*other, f)
    }
}

/// Samples a keyframe curve at `time`, holding the first and last values outside the
/// curve's range. Returns `None` for an empty curve.
pub fn sample_linear<T: InterpolateLinear + Copy>(times: &[f32], values: &[T], time: f32) -> Option<T> {
    let count = times.len().min(values.len());
    if count == 0 {
        return None;
    }

    let times = &times[..count];
    if time <= times[0] {
        return Some(values[0]);
    }
    if time >= times[count - 1] {
        return Some(values[count - 1]);
    }

    let next = times.partition_point(|t| *t <= time);
    let prev = next - 1;
    let span = times[next] - times[prev];
    if span <= f32::EPSILON {
        return Some(values[next]);
    }

    let f = (time - times[prev]) / span;
    Some(values[prev].interpolate_linear(&values[next], f))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn holds_ends_and_interpolates_inside() {
        let times = [0., 1., 3.];
        let values = [0., 10., 30.];

        assert_eq!(sample_linear(&times, &values, -1.), Some(0.));
        assert_eq!(sample_linear(&times, &values, 5.), Some(30.));
        assert_eq!(sample_linear(&times, &values, 0.5), Some(5.));
        assert_eq!(sample_linear(&times, &values, 2.), Some(20.));
        assert_eq!(sample_linear::<f32>(&[], &[], 2.), None);
    }

    #[test]
    fn duplicate_times_step() {
        let times = [0., 1., 1., 2.];
        let values = [0., 1., 5., 5.];

        assert_eq!(sample_linear(&times, &values, 1.5), Some(5.));
    }
}
