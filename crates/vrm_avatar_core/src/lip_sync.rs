//! Audio driven mouth shapes.
//!
//! The host feeds byte frequency bins (as produced by a 2N-point FFT over N bins, loudest
//! = 255) once per frame. Energy in four voice bands is turned into five viseme weights.

use crate::config::{LipSyncTuning, VisemeWeights};

const VERY_LOW_HZ: f32 = 400.;
const LOW_HZ: f32 = 800.;
const MID_HZ: f32 = 1500.;
const HIGH_HZ: f32 = 2500.;
/// Bins past the high band that still count toward the overall level
const TAIL_BINS: usize = 50;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LipSyncFrame {
    pub visemes: VisemeWeights,
    /// Whether the mouth is driven open this frame
    pub speaking: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct BandLevels {
    very_low: f32,
    low: f32,
    mid: f32,
    high: f32,
    total: f32,
}

fn band_levels(bins: &[u8], sample_rate: f32) -> BandLevels {
    let bin_hz = sample_rate / (bins.len().max(1) * 2) as f32;
    let edge = |hz: f32| (hz / bin_hz).floor() as usize;
    let (very_low_end, low_end, mid_end, high_end) =
        (edge(VERY_LOW_HZ), edge(LOW_HZ), edge(MID_HZ), edge(HIGH_HZ));

    let mut sums = [0f32; 4];
    let mut total = 0f32;
    let scanned = bins.len().min(high_end + TAIL_BINS);
    for (index, value) in bins.iter().take(scanned).enumerate() {
        let value = *value as f32;
        total += value;
        let band = if index < very_low_end {
            0
        } else if index < low_end {
            1
        } else if index < mid_end {
            2
        } else if index < high_end {
            3
        } else {
            continue;
        };
        sums[band] += value;
    }

    let average = |sum: f32, width: usize| sum / width.max(1) as f32;
    BandLevels {
        very_low: average(sums[0], very_low_end),
        low: average(sums[1], low_end.saturating_sub(very_low_end)),
        mid: average(sums[2], mid_end.saturating_sub(low_end)),
        high: average(sums[3], high_end.saturating_sub(mid_end)),
        total: average(total, scanned),
    }
}

/// Turns frequency bins into viseme weights, easing the mouth closed during silence.
#[derive(Clone, Copy, Debug, Default)]
pub struct LipSyncAnalyzer {
    tuning: LipSyncTuning,
    current: VisemeWeights,
}

impl LipSyncAnalyzer {
    pub fn new(tuning: LipSyncTuning) -> Self {
        Self {
            tuning,
            current: VisemeWeights::default(),
        }
    }

    pub fn current(&self) -> VisemeWeights {
        self.current
    }

    pub fn reset(&mut self) {
        self.current = VisemeWeights::default();
    }

    pub fn analyze(&mut self, bins: &[u8], delta: f32) -> LipSyncFrame {
        let tuning = &self.tuning;
        let levels = band_levels(bins, tuning.sample_rate);

        if levels.total > tuning.threshold * 2. {
            let open = ((levels.total - tuning.vowel_min) / tuning.vowel_damp
                * (tuning.boost / 10.))
                .min(1.);
            let energy = levels.very_low + levels.low + levels.mid + levels.high + 0.1;
            let BandLevels {
                very_low,
                low,
                mid,
                high,
                ..
            } = levels;
            let shape = |weight: f32, gain: f32| (open * weight * gain).clamp(0., 1.);

            self.current = VisemeWeights {
                ou: shape(1.5 * very_low / energy, 1.),
                oh: shape((1.3 * low + 0.5 * very_low) / energy, 1.1),
                aa: shape((1.5 * mid + 0.5 * low) / energy, 1.3),
                ee: shape((0.8 * high + 0.4 * mid) / energy, 0.9),
                ih: shape(1.2 * high / energy, 0.7),
            };
            return LipSyncFrame {
                visemes: self.current,
                speaking: true,
            };
        }

        let frames = delta * 60.;
        let cutoff = tuning.cutoff;
        let decay = |value: f32, factor: f32| {
            let value = value * factor.powf(frames);
            if value < cutoff { 0. } else { value }
        };
        let rates = tuning.decay;
        self.current = VisemeWeights {
            aa: decay(self.current.aa, rates.aa),
            ee: decay(self.current.ee, rates.ee),
            ih: decay(self.current.ih, rates.ih),
            oh: decay(self.current.oh, rates.oh),
            ou: decay(self.current.ou, rates.ou),
        };
        LipSyncFrame {
            visemes: self.current,
            speaking: false,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    /// 1024 bins over 48 kHz, about 23.4 Hz each
    fn spectrum(band: std::ops::Range<f32>, level: u8) -> Vec<u8> {
        (0..1024)
            .map(|index| {
                let hz = index as f32 * 48000. / 2048.;
                if band.contains(&hz) { level } else { 0 }
            })
            .collect()
    }

    #[test]
    fn silence_keeps_the_mouth_closed() {
        let mut analyzer = LipSyncAnalyzer::new(LipSyncTuning::default());
        let frame = analyzer.analyze(&vec![0; 1024], 1. / 60.);
        assert!(!frame.speaking);
        assert_eq!(frame.visemes, VisemeWeights::default());
    }

    #[test]
    fn low_voices_round_the_mouth() {
        let mut analyzer = LipSyncAnalyzer::new(LipSyncTuning::default());
        let frame = analyzer.analyze(&spectrum(0.0..800., 255), 1. / 60.);
        assert!(frame.speaking);
        assert!(frame.visemes.oh > frame.visemes.aa);
        assert!(frame.visemes.ou > frame.visemes.aa);
        assert!(frame.visemes.ou > frame.visemes.ee);
        assert_eq!(frame.visemes.ih, 0.);
    }

    #[test]
    fn bright_voices_spread_the_mouth() {
        let mut analyzer = LipSyncAnalyzer::new(LipSyncTuning::default());
        let frame = analyzer.analyze(&spectrum(1500.0..2500., 255), 1. / 60.);
        assert!(frame.speaking);
        assert!(frame.visemes.ee > frame.visemes.oh);
        assert!(frame.visemes.ih > frame.visemes.ou);
    }

    #[test]
    fn visemes_decay_to_zero() {
        let mut analyzer = LipSyncAnalyzer::new(LipSyncTuning::default());
        analyzer.analyze(&spectrum(0.0..2500., 255), 1. / 60.);
        let open = analyzer.current();
        assert!(open.aa > 0.);

        let frame = analyzer.analyze(&vec![0; 1024], 1. / 60.);
        assert!(!frame.speaking);
        assert!(frame.visemes.aa < open.aa);

        for _ in 0..10 {
            analyzer.analyze(&vec![0; 1024], 1. / 60.);
        }
        assert_eq!(analyzer.current(), VisemeWeights::default());
    }
}
