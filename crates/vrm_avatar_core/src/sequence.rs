//! Motion sequences: a linear script of motions, waits and expressions.
//!
//! The textual form is a comma separated list of tokens:
//!
//! - `wave` plays a motion,
//! - `wait:500` pauses for 500 ms; a zero or unreadable wait pauses for the default,
//! - `expression:happy` sets an expression on the previous step,
//! - `point:duration:2000:loop:true:transition:cut` passes options as key/value pairs
//!   (`duration`, `wait`, `loop`, `transition`, `expression`).

use bevy::log::debug;

use crate::{config::SequenceTuning, mixer::Transition, motion::NO_MOTION};

#[derive(Clone, Debug, PartialEq)]
pub struct SequenceStep {
    /// Motion reference, resolved against the motion catalog when the step plays.
    /// `none` keeps the current motion.
    pub motion: String,
    pub duration_ms: Option<u32>,
    pub wait_ms: u32,
    pub expression: Option<String>,
    pub looping: bool,
    pub transition: Transition,
}

impl SequenceStep {
    pub fn motion(motion: impl Into<String>) -> Self {
        Self {
            motion: motion.into(),
            duration_ms: None,
            wait_ms: 0,
            expression: None,
            looping: false,
            transition: Transition::default(),
        }
    }

    pub fn wait(wait_ms: u32) -> Self {
        Self {
            wait_ms,
            ..Self::motion(NO_MOTION)
        }
    }

    pub fn is_wait(&self) -> bool {
        self.motion == NO_MOTION
    }
}

/// Leading decimal digits of `value`, ignoring whatever follows them
fn parse_millis(value: &str) -> Option<u32> {
    let value = value.trim();
    let end = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    value[..end].parse().ok()
}

pub fn parse_sequence(source: &str, tuning: &SequenceTuning) -> Vec<SequenceStep> {
    let mut steps: Vec<SequenceStep> = Vec::new();

    for token in source.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        if let Some(wait) = token.strip_prefix("wait:") {
            let wait_ms = parse_millis(wait)
                .filter(|ms| *ms > 0)
                .unwrap_or(tuning.default_wait_ms);
            steps.push(SequenceStep::wait(wait_ms));
            continue;
        }

        if let Some(expression) = token.strip_prefix("expression:") {
            let expression = expression.split(':').next().unwrap_or_default();
            match steps.last_mut() {
                Some(previous) => previous.expression = Some(expression.to_string()),
                None => debug!("Ignoring expression {expression} with no step before it"),
            }
            continue;
        }

        let mut parts = token.split(':');
        let mut step = SequenceStep::motion(parts.next().unwrap_or_default());
        let options: Vec<&str> = parts.collect();
        for pair in options.chunks(2) {
            let [key, value] = pair else {
                continue;
            };
            if value.is_empty() {
                continue;
            }
            match *key {
                "duration" => step.duration_ms = parse_millis(value).or(step.duration_ms),
                "wait" => step.wait_ms = parse_millis(value).unwrap_or(step.wait_ms),
                "loop" => step.looping = *value == "true",
                "transition" => step.transition = Transition::from_name(value),
                "expression" => step.expression = Some(value.to_string()),
                other => debug!("Unknown sequence option {other}"),
            }
        }
        steps.push(step);
    }

    steps
}

/// When a playing step fades out and when the next one starts, in seconds from the start
/// of the step
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepTiming {
    pub fade_out_after: Option<f32>,
    pub advance_after: f32,
}

impl StepTiming {
    /// `clip_duration` is the natural length of the step's clip, if one is playing
    pub fn compute(
        step: &SequenceStep,
        clip_duration: Option<f32>,
        fade_secs: f32,
        tuning: &SequenceTuning,
    ) -> Self {
        let wait = step.wait_ms as f32 / 1000.;
        let Some(clip_duration) = clip_duration else {
            return Self {
                fade_out_after: None,
                advance_after: wait,
            };
        };

        let play = match step.duration_ms {
            Some(duration) => duration as f32 / 1000.,
            None if step.looping => tuning.loop_step_secs,
            None => clip_duration,
        };
        let fade_at = (play - fade_secs).max(0.);

        if step.looping {
            Self {
                fade_out_after: None,
                advance_after: fade_at + wait,
            }
        } else {
            Self {
                fade_out_after: Some(fade_at),
                advance_after: fade_at + wait + fade_secs,
            }
        }
    }
}

/// Position in a running sequence
#[derive(Clone, Debug, PartialEq)]
pub struct SequencePlayer {
    steps: Vec<SequenceStep>,
    index: Option<usize>,
    looping: bool,
}

impl SequencePlayer {
    pub fn new(steps: Vec<SequenceStep>, looping: bool) -> Self {
        Self {
            steps,
            index: None,
            looping,
        }
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn current(&self) -> Option<&SequenceStep> {
        self.steps.get(self.index?)
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    /// Moves to the next step, wrapping around for looping sequences. Returns `None` once
    /// a non-looping sequence is over.
    pub fn advance(&mut self) -> Option<&SequenceStep> {
        let next = self.index.map_or(0, |index| index + 1);
        let next = if next >= self.steps.len() {
            if !self.looping || self.steps.is_empty() {
                self.index = Some(self.steps.len());
                return None;
            }
            0
        } else {
            next
        };
        self.index = Some(next);
        self.steps.get(next)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_the_mini_language() {
        let steps = parse_sequence("wave,wait:500,point:loop:true", &SequenceTuning::default());

        assert_eq!(
            steps,
            vec![
                SequenceStep::motion("wave"),
                SequenceStep::wait(500),
                SequenceStep {
                    looping: true,
                    ..SequenceStep::motion("point")
                },
            ]
        );
    }

    #[test]
    fn options_expressions_and_bad_numbers() {
        let steps = parse_sequence(
            " nod:duration:2000:transition:cut , expression:happy,,wait:soon, bow:wait:250:expression:sad:bogus",
            &SequenceTuning::default(),
        );

        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0].duration_ms, Some(2000));
        assert_eq!(steps[0].transition, Transition::Cut);
        assert_eq!(steps[0].expression.as_deref(), Some("happy"));
        assert_eq!(steps[1], SequenceStep::wait(500));
        assert_eq!(steps[2].wait_ms, 250);
        assert_eq!(steps[2].expression.as_deref(), Some("sad"));
    }

    #[test]
    fn zero_waits_use_the_default() {
        let steps = parse_sequence("wait:0,wave:wait:0", &SequenceTuning::default());
        assert_eq!(steps[0], SequenceStep::wait(500));
        assert_eq!(steps[1].wait_ms, 0);
    }

    #[test]
    fn step_timing() {
        let tuning = SequenceTuning::default();
        let step = SequenceStep {
            wait_ms: 500,
            ..SequenceStep::motion("wave")
        };

        let timing = StepTiming::compute(&step, Some(2.), 0.3, &tuning);
        assert!((timing.fade_out_after.unwrap() - 1.7).abs() < 1e-6);
        assert!((timing.advance_after - 2.5).abs() < 1e-6);

        let looping = SequenceStep {
            looping: true,
            ..step.clone()
        };
        let timing = StepTiming::compute(&looping, Some(2.), 0.3, &tuning);
        assert_eq!(timing.fade_out_after, None);
        assert!((timing.advance_after - 10.2).abs() < 1e-5);

        let timing = StepTiming::compute(&SequenceStep::wait(800), None, 0.3, &tuning);
        assert_eq!(timing.advance_after, 0.8);
    }

    #[test]
    fn looping_sequences_wrap() {
        let steps = vec![SequenceStep::motion("a"), SequenceStep::motion("b")];

        let mut once = SequencePlayer::new(steps.clone(), false);
        assert_eq!(once.advance().map(|s| s.motion.as_str()), Some("a"));
        assert_eq!(once.advance().map(|s| s.motion.as_str()), Some("b"));
        assert_eq!(once.advance(), None);

        let mut looping = SequencePlayer::new(steps, true);
        looping.advance();
        looping.advance();
        assert_eq!(looping.advance().map(|s| s.motion.as_str()), Some("a"));
    }
}
