/// Cubic ease-in-out on `t` in `[0, 1]`
pub fn ease_in_out_cubic(t: f32) -> f32 {
    let t = t.clamp(0., 1.);
    if t < 0.5 {
        4. * t * t * t
    } else {
        1. - (-2. * t + 2.).powi(3) / 2.
    }
}

/// Ramp / hold / decay envelope used by short expression pulses and body sways.
///
/// `ramp` and `hold` are fractions of the whole envelope; the decay takes the same time as
/// the ramp and whatever is left after it stays at zero.
pub fn pulse_envelope(progress: f32, ramp: f32, hold: f32) -> f32 {
    if progress <= 0. || progress >= 1. {
        return 0.;
    }
    if ramp <= 0. {
        return if progress < ramp + hold { 1. } else { 0. };
    }

    if progress < ramp {
        ease_in_out_cubic(progress / ramp)
    } else if progress < ramp + hold {
        1.
    } else {
        1. - ease_in_out_cubic((progress - ramp - hold) / ramp)
    }
}
