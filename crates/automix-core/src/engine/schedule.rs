//! Mix point planning
//!
//! Turns a deck's analysis and transport state into absolute timeline times.
//! Track positions map to timeline times through the playback-rate curve, so
//! a tempo-matched deck's mix points land where its beats actually play.

use super::automation::AudioParam;
use super::track::TrackAnalysis;

/// Delay between the end of the fade-out and the hard stop
pub const STOP_DELAY: f64 = 0.05;

/// How far before mixout a late load-next is pulled
const LOAD_NEXT_MARGIN: f64 = 1e-3;

/// Timeline plan of one play attempt, handed forward as the next deck's seed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Schedule {
    /// Analysed tempo of the deck, if known
    pub bpm: Option<u32>,
    /// Fade-out starts; the next deck's beat anchor lands here
    pub mixin_time: f64,
    /// Fade-out ends
    pub mixout_time: f64,
    /// The next track has to be loaded and analysed from here on
    pub load_next_time: f64,
    pub stop_time: f64,
    /// Natural end of the track at the planned rate
    pub end_time: f64,
}

/// Transport state a schedule is computed from
#[derive(Debug, Clone, Copy)]
pub struct PlanInput {
    pub now: f64,
    /// Timeline time the transport (re)started
    pub start_time: f64,
    /// Track seconds at `start_time`
    pub offset: f64,
    /// Track length in seconds
    pub duration: f64,
    pub analysis: Option<TrackAnalysis>,
    pub sample_rate: u32,
    pub mix_length: f64,
    pub load_ahead: f64,
}

/// Whole beats that fit in a crossfade
///
/// Walks back from the mixout anchor one beat at a time while more than a
/// beat of the crossfade is left. The result is a whole number of beats
/// that falls short of `mix_length` by at most one beat.
pub fn quantized_mix_span(mix_length: f64, interval: f64) -> f64 {
    if !(interval > 0.0) || !(mix_length > 0.0) {
        return mix_length.max(0.0);
    }
    let mut span = 0.0;
    while mix_length - span > interval {
        span += interval;
    }
    span
}

/// Compute the schedule of a deck that is playing from `input.offset`
pub fn plan_schedule(input: &PlanInput, rate: &AudioParam) -> Schedule {
    let time_at = |position: f64| -> f64 {
        rate.time_for_integral(input.start_time, (position - input.offset).max(0.0))
    };

    let end_time = time_at(input.duration);

    let (mixin_time, mixout_time) = match input.analysis {
        Some(analysis)
            if analysis.mixout_anchor > input.offset && analysis.mixout_anchor <= input.duration =>
        {
            let interval = analysis.beat_interval_secs(input.sample_rate);
            let span = quantized_mix_span(input.mix_length, interval);
            let mixin_position = (analysis.mixout_anchor - span).max(input.offset);
            (time_at(mixin_position), time_at(analysis.mixout_anchor))
        }
        Some(analysis) => {
            log::warn!(
                "plan_schedule: mixout anchor {:.2}s unreachable from {:.2}s, hard cut at track end",
                analysis.mixout_anchor,
                input.offset
            );
            (end_time, end_time)
        }
        None => ((end_time - input.mix_length).max(input.start_time), end_time),
    };

    let lead = input.load_ahead + input.mix_length;
    let mut load_next_time = if input.duration - input.offset > lead {
        time_at(input.duration - lead)
    } else {
        input.now
    };
    load_next_time = load_next_time.min(mixin_time);
    if load_next_time >= mixout_time {
        load_next_time = mixout_time - LOAD_NEXT_MARGIN;
    }

    Schedule {
        bpm: input.analysis.map(|a| a.bpm),
        mixin_time,
        mixout_time,
        load_next_time,
        stop_time: mixout_time + STOP_DELAY,
        end_time,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 44100;

    fn analysis(bpm: u32, mixout_anchor: f64) -> TrackAnalysis {
        TrackAnalysis {
            bpm,
            beat_anchor: 0.05,
            mixout_anchor,
            beat_interval_samples: SR as f64 * 60.0 / bpm as f64,
        }
    }

    fn input(duration: f64, analysis: Option<TrackAnalysis>) -> PlanInput {
        PlanInput {
            now: 0.0,
            start_time: 0.0,
            offset: 0.0,
            duration,
            analysis,
            sample_rate: SR,
            mix_length: 20.0,
            load_ahead: 60.0,
        }
    }

    #[test]
    fn test_mix_span_is_whole_beats() {
        assert_eq!(quantized_mix_span(20.0, 0.5), 19.5);
        assert!((quantized_mix_span(20.0, 0.6) - 19.8).abs() < 1e-9);
        assert_eq!(quantized_mix_span(0.3, 0.5), 0.0);
        assert_eq!(quantized_mix_span(20.0, 0.0), 20.0);
    }

    #[test]
    fn test_flat_rate_schedule() {
        let plan = plan_schedule(&input(180.0, Some(analysis(120, 170.0))), &AudioParam::new(1.0));
        assert!((plan.mixout_time - 170.0).abs() < 1e-9);
        assert!((plan.mixin_time - 150.5).abs() < 1e-9);
        assert!((plan.load_next_time - 100.0).abs() < 1e-9);
        assert!((plan.stop_time - 170.05).abs() < 1e-9);
        assert!((plan.end_time - 180.0).abs() < 1e-9);
        assert_eq!(plan.bpm, Some(120));
    }

    #[test]
    fn test_offset_and_start_shift_everything() {
        let mut plan_input = input(180.0, Some(analysis(120, 170.0)));
        plan_input.start_time = 50.0;
        plan_input.now = 50.0;
        plan_input.offset = 10.0;
        let plan = plan_schedule(&plan_input, &AudioParam::new(1.0));
        // mixoutTime = startTime + mixoutAnchor - offset
        assert!((plan.mixout_time - 210.0).abs() < 1e-9);
        assert!((plan.end_time - 220.0).abs() < 1e-9);
    }

    #[test]
    fn test_slowed_deck_stretches_timeline() {
        let mut rate = AudioParam::new(1.0);
        rate.set_value_at_time(0.5, 0.0);
        let plan = plan_schedule(&input(100.0, Some(analysis(120, 90.0))), &rate);
        assert!((plan.mixout_time - 180.0).abs() < 1e-6);
        assert!((plan.end_time - 200.0).abs() < 1e-6);
    }

    #[test]
    fn test_late_start_under_slowed_rate() {
        let mut rate = AudioParam::new(1.0);
        rate.set_value_at_time(0.5, 30.0);
        let mut plan_input = input(100.0, Some(analysis(120, 90.0)));
        plan_input.start_time = 30.0;
        plan_input.now = 30.0;
        plan_input.offset = 20.0;
        let plan = plan_schedule(&plan_input, &rate);
        assert!((plan.mixout_time - 170.0).abs() < 1e-6);
        assert!((plan.end_time - 190.0).abs() < 1e-6);
    }

    #[test]
    fn test_unknown_tempo_fades_out_at_end() {
        let plan = plan_schedule(&input(180.0, None), &AudioParam::new(1.0));
        assert_eq!(plan.bpm, None);
        assert!((plan.mixout_time - 180.0).abs() < 1e-9);
        assert!((plan.mixin_time - 160.0).abs() < 1e-9);
    }

    #[test]
    fn test_passed_anchor_collapses_to_end() {
        let mut plan_input = input(180.0, Some(analysis(120, 30.0)));
        plan_input.offset = 40.0;
        let plan = plan_schedule(&plan_input, &AudioParam::new(1.0));
        assert_eq!(plan.mixin_time, plan.mixout_time);
        assert!((plan.mixout_time - 140.0).abs() < 1e-9);
        assert!(plan.load_next_time < plan.mixout_time);
    }

    #[test]
    fn test_short_track_loads_next_immediately() {
        let mut plan_input = input(50.0, Some(analysis(128, 45.0)));
        plan_input.now = 3.0;
        plan_input.start_time = 3.0;
        let plan = plan_schedule(&plan_input, &AudioParam::new(1.0));
        assert_eq!(plan.load_next_time, 3.0);
    }

    #[test]
    fn test_invariants_hold_across_inputs() {
        let mut slowed = AudioParam::new(1.0);
        slowed.set_value_at_time(0.9, 0.0);
        slowed.set_value_at_time(0.9, 20.0);
        slowed.linear_ramp_to_value_at_time(1.0, 80.0);
        let rates = [AudioParam::new(1.0), slowed];

        for duration in [0.5, 5.0, 19.0, 30.0, 79.0, 81.0, 180.0, 600.0] {
            for anchor_fraction in [None, Some(0.0), Some(0.1), Some(0.5), Some(0.99), Some(1.0), Some(1.5)] {
                for offset_fraction in [0.0, 0.3, 0.95] {
                    for mix_length in [0.0, 4.0, 20.0, 45.0] {
                        for start_time in [0.0, 37.5, 400.0] {
                            for rate in &rates {
                                let mut plan_input = input(
                                    duration,
                                    anchor_fraction.map(|f| analysis(126, duration * f)),
                                );
                                plan_input.offset = duration * offset_fraction;
                                plan_input.mix_length = mix_length;
                                plan_input.start_time = start_time;
                                plan_input.now = start_time;
                                let plan = plan_schedule(&plan_input, rate);
                                assert!(
                                    plan.load_next_time < plan.mixout_time,
                                    "load-next after mixout: {:?} for {:?}",
                                    plan,
                                    plan_input
                                );
                                assert!(plan.mixin_time <= plan.mixout_time, "{:?}", plan);
                                assert!(plan.mixin_time >= start_time, "{:?}", plan);

                                // The remaining track never plays faster than 1x
                                let remaining = duration - plan_input.offset;
                                assert!(plan.end_time >= start_time + remaining - 1e-6, "{:?}", plan);
                                assert!(plan.end_time <= start_time + remaining / 0.9 + 1e-6, "{:?}", plan);
                            }
                        }
                    }
                }
            }
        }
    }
}
