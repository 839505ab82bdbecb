use bevy::log::debug;
use indexmap::{IndexMap, IndexSet};
use rand::Rng;

use crate::{
    config::{BlendShapeGroup, ExpressionTuning, VisemeWeights},
    idle::random_secs,
    interpolation::easing::pulse_envelope,
};

pub const NEUTRAL: &str = "neutral";
pub const BLINK: &str = "blink";
pub const BLINK_LEFT: &str = "blinkLeft";
pub const BLINK_RIGHT: &str = "blinkRight";
pub const MOUTH_OPEN: &str = "aa";
pub const VISEMES: [&str; 5] = ["aa", "ee", "ih", "oh", "ou"];

/// VRM 1.0 preset expressions
pub const PRESET_EXPRESSIONS: [&str; 18] = [
    "happy",
    "angry",
    "sad",
    "relaxed",
    "surprised",
    "aa",
    "ih",
    "ou",
    "ee",
    "oh",
    "blink",
    "blinkLeft",
    "blinkRight",
    "lookUp",
    "lookDown",
    "lookLeft",
    "lookRight",
    "neutral",
];

fn is_wink(name: &str) -> bool {
    name == BLINK_LEFT || name == BLINK_RIGHT
}

#[derive(Clone, Debug, PartialEq)]
struct Pulse {
    /// Blend shape and peak weight
    targets: Vec<(String, f32)>,
    elapsed: f32,
    duration: f32,
    ramp: f32,
    hold: f32,
    wink: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct BlinkState {
    closed: bool,
    remaining: f32,
}

/// Facial expression weights of one avatar.
///
/// Holds the value of every expression the model exposes. The host copies
/// [`ExpressionDriver::weights`] onto the model's morph targets each frame.
#[derive(Clone, Debug)]
pub struct ExpressionDriver {
    tuning: ExpressionTuning,
    available: IndexSet<String>,
    groups: IndexMap<String, BlendShapeGroup>,
    weights: IndexMap<String, f32>,
    current: String,
    winking: bool,
    pulse: Option<Pulse>,
    blink: Option<BlinkState>,
    talk_remaining: f32,
}

impl ExpressionDriver {
    pub fn new<S: Into<String>>(
        tuning: ExpressionTuning,
        available: impl IntoIterator<Item = S>,
        groups: IndexMap<String, BlendShapeGroup>,
    ) -> Self {
        let available: IndexSet<String> = available.into_iter().map(Into::into).collect();
        let weights = available.iter().map(|name| (name.clone(), 0.)).collect();
        Self {
            tuning,
            available,
            groups,
            weights,
            current: NEUTRAL.into(),
            winking: false,
            pulse: None,
            blink: None,
            talk_remaining: 0.,
        }
    }

    pub fn current(&self) -> &str {
        &self.current
    }

    pub fn weight(&self, name: &str) -> f32 {
        self.weights.get(name).copied().unwrap_or(0.)
    }

    pub fn weights(&self) -> impl Iterator<Item = (&str, f32)> {
        self.weights.iter().map(|(name, weight)| (name.as_str(), *weight))
    }

    pub fn is_winking(&self) -> bool {
        self.winking
    }

    pub fn is_talking(&self) -> bool {
        self.talk_remaining > 0.
    }

    fn set_weight(&mut self, name: &str, weight: f32) {
        let weight = weight.clamp(0., 1.);
        match self.weights.get_mut(name) {
            Some(value) => *value = weight,
            None => {
                self.weights.insert(name.to_string(), weight);
            }
        }
    }

    fn reset_all(&mut self) {
        for weight in self.weights.values_mut() {
            *weight = 0.;
        }
    }

    /// Sets the expression, resetting every other one. `none` and unknown names fall back to
    /// neutral. Returns the expression actually applied.
    pub fn set_expression(&mut self, name: &str) -> &str {
        let name = if name == "none" { NEUTRAL } else { name };

        if let Some(group) = self.groups.get(name).cloned() {
            self.reset_all();
            for (shape, weight) in &group.blend_shapes {
                self.set_weight(shape, *weight);
            }
            self.current = name.to_string();
            return &self.current;
        }

        let name = if self.available.contains(name) {
            name
        } else {
            debug!("Expression not found: {name}");
            NEUTRAL
        };
        self.reset_all();
        self.set_weight(name, 1.);
        self.winking = is_wink(name);
        self.current = name.to_string();
        &self.current
    }

    /// Shows `name` briefly on top of the current expression, following a ramp, hold and
    /// decay envelope
    pub fn pulse(&mut self, name: &str, intensity: f32, duration: f32, ramp: f32, hold: f32) {
        let targets = match self.groups.get(name) {
            Some(group) => group
                .blend_shapes
                .iter()
                .map(|(shape, weight)| (shape.clone(), weight * intensity))
                .collect(),
            None if self.available.contains(name) => vec![(name.to_string(), intensity)],
            None => {
                debug!("Skipping idle expression {name}, the model does not have it");
                return;
            }
        };

        self.end_pulse();
        let wink = is_wink(name);
        if wink {
            self.winking = true;
        }
        self.pulse = Some(Pulse {
            targets,
            elapsed: 0.,
            duration,
            ramp,
            hold,
            wink,
        });
    }

    fn end_pulse(&mut self) {
        let Some(pulse) = self.pulse.take() else {
            return;
        };
        for (shape, _) in &pulse.targets {
            self.set_weight(shape, 0.);
        }
        if pulse.wink {
            self.set_weight(BLINK_LEFT, 0.);
            self.set_weight(BLINK_RIGHT, 0.);
            self.winking = false;
        }
    }

    pub fn set_blinking(&mut self, enabled: bool, rng: &mut impl Rng) {
        if !enabled {
            self.blink = None;
            self.set_weight(BLINK, 0.);
            return;
        }
        if self.blink.is_none() {
            self.blink = Some(BlinkState {
                closed: false,
                remaining: random_secs(rng, self.tuning.blink_interval_secs),
            });
        }
    }

    pub fn is_blinking(&self) -> bool {
        self.blink.is_some()
    }

    /// Moves the mouth for `text`, for as long as it would take to say it
    pub fn talk(&mut self, text: &str) {
        self.talk_remaining = text.chars().count() as f32 * self.tuning.talk_secs_per_char;
    }

    /// Caps every non-mouth expression while the mouth moves
    fn cap_expressions(&mut self) {
        let cap = self.tuning.talk_expression_cap;
        for (name, weight) in self.weights.iter_mut() {
            if !VISEMES.contains(&name.as_str()) {
                *weight = weight.min(cap);
            }
        }
    }

    /// Writes audio driven mouth shapes
    pub fn apply_visemes(&mut self, visemes: VisemeWeights, speaking: bool) {
        if speaking {
            self.cap_expressions();
        }
        self.set_weight("aa", visemes.aa);
        self.set_weight("ee", visemes.ee);
        self.set_weight("ih", visemes.ih);
        self.set_weight("oh", visemes.oh);
        self.set_weight("ou", visemes.ou);
    }

    pub fn close_mouth(&mut self) {
        for viseme in VISEMES {
            self.set_weight(viseme, 0.);
        }
    }

    /// Advances pulses, blinking and text talk. `text_mouth` is false when audio lip sync
    /// drives the mouth instead.
    pub fn update(&mut self, delta: f32, text_mouth: bool, rng: &mut impl Rng) {
        if let Some(pulse) = &mut self.pulse {
            pulse.elapsed += delta;
            if pulse.elapsed >= pulse.duration {
                self.end_pulse();
            } else {
                let progress = pulse.elapsed / pulse.duration;
                let amplitude = pulse_envelope(progress, pulse.ramp, pulse.hold);
                let targets = pulse.targets.clone();
                for (shape, peak) in targets {
                    self.set_weight(&shape, peak * amplitude);
                }
            }
        }

        if let Some(mut blink) = self.blink {
            blink.remaining -= delta;
            if blink.remaining <= 0. {
                if blink.closed {
                    self.set_weight(BLINK, 0.);
                    blink.closed = false;
                    blink.remaining = random_secs(rng, self.tuning.blink_interval_secs);
                } else if self.winking {
                    blink.remaining = random_secs(rng, self.tuning.blink_interval_secs);
                } else {
                    self.set_weight(BLINK, 1.);
                    blink.closed = true;
                    blink.remaining = random_secs(rng, self.tuning.blink_secs);
                }
            }
            self.blink = Some(blink);
        }

        if text_mouth && self.talk_remaining > 0. {
            self.talk_remaining -= delta;
            if self.talk_remaining > 0. {
                let mouth = ((self.talk_remaining * 1000.).sin() + 1.) / 2.;
                self.cap_expressions();
                self.set_weight(MOUTH_OPEN, mouth);
            } else {
                self.talk_remaining = 0.;
                let current = self.current.clone();
                self.set_expression(&current);
                self.set_weight(MOUTH_OPEN, 0.);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn driver() -> ExpressionDriver {
        let mut groups = IndexMap::new();
        groups.insert(
            "smug".to_string(),
            BlendShapeGroup {
                blend_shapes: [("happy".to_string(), 0.5), ("blinkLeft".to_string(), 1.)]
                    .into_iter()
                    .collect(),
            },
        );
        ExpressionDriver::new(ExpressionTuning::default(), PRESET_EXPRESSIONS, groups)
    }

    #[test]
    fn unknown_expressions_fall_back_to_neutral() {
        let mut expressions = driver();
        assert_eq!(expressions.set_expression("happy"), "happy");
        assert_eq!(expressions.weight("happy"), 1.);

        assert_eq!(expressions.set_expression("smirk"), NEUTRAL);
        assert_eq!(expressions.weight("happy"), 0.);
        assert_eq!(expressions.weight(NEUTRAL), 1.);
        assert_eq!(expressions.set_expression("none"), NEUTRAL);
    }

    #[test]
    fn groups_set_several_shapes() {
        let mut expressions = driver();
        expressions.set_expression("angry");
        assert_eq!(expressions.set_expression("smug"), "smug");
        assert_eq!(expressions.weight("angry"), 0.);
        assert_eq!(expressions.weight("happy"), 0.5);
        assert_eq!(expressions.weight("blinkLeft"), 1.);
    }

    #[test]
    fn pulses_rise_and_clear() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut expressions = driver();
        expressions.pulse("surprised", 0.7, 2., 0.3, 0.4);

        expressions.update(1., true, &mut rng);
        assert!((expressions.weight("surprised") - 0.7).abs() < 1e-6);

        expressions.update(1.1, true, &mut rng);
        assert_eq!(expressions.weight("surprised"), 0.);
    }

    #[test]
    fn winks_suppress_blinking() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut expressions = driver();
        expressions.set_blinking(true, &mut rng);
        expressions.pulse(BLINK_RIGHT, 0.8, 30., 0.3, 0.4);
        assert!(expressions.is_winking());

        for _ in 0..(60 * 25) {
            expressions.update(1. / 60., true, &mut rng);
            assert_eq!(expressions.weight(BLINK), 0.);
        }

        expressions.update(6., true, &mut rng);
        assert!(!expressions.is_winking());
    }

    #[test]
    fn blinks_close_then_open() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut expressions = driver();
        expressions.set_blinking(true, &mut rng);

        let mut closed_frames = 0;
        for _ in 0..(60 * 15) {
            expressions.update(1. / 60., true, &mut rng);
            if expressions.weight(BLINK) == 1. {
                closed_frames += 1;
            }
        }
        assert!(closed_frames > 0);
        assert!(closed_frames < 60 * 5);
    }

    #[test]
    fn talking_moves_the_mouth_and_restores() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut expressions = driver();
        expressions.set_expression("happy");
        expressions.talk("hello there");
        assert!((expressions.talk_remaining - 0.55).abs() < 1e-6);

        expressions.update(0.1, true, &mut rng);
        assert!(expressions.weight("happy") <= 0.25);
        assert!(expressions.is_talking());

        expressions.update(1., true, &mut rng);
        assert!(!expressions.is_talking());
        assert_eq!(expressions.weight("happy"), 1.);
        assert_eq!(expressions.weight(MOUTH_OPEN), 0.);
    }
}
