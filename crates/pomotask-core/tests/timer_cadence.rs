//! Long-break cadence holds for any interval setting.

use chrono::{Duration, TimeZone, Utc};
use pomotask_core::events::Event;
use pomotask_core::timer::{IntervalTimer, TaskBinding, TimerConfig, TimerMode};
use proptest::prelude::*;

/// Run the current interval to completion, returning the mode it switched to.
fn finish_interval(timer: &mut IntervalTimer, now: &mut chrono::DateTime<Utc>) -> TimerMode {
    loop {
        *now += Duration::seconds(1);
        if let Some(Event::IntervalCompleted { to, .. }) = timer.tick(*now) {
            return to;
        }
    }
}

proptest! {
    #[test]
    fn every_nth_break_is_long(interval in 1u32..=6, focus_count in 1usize..=14) {
        let mut timer = IntervalTimer::new(TimerConfig::new(1, 1, 1, interval));
        let mut now = Utc.with_ymd_and_hms(2026, 1, 5, 8, 0, 0).unwrap();
        timer.start(now, TaskBinding::Keep);

        for n in 1..=focus_count {
            let brk = finish_interval(&mut timer, &mut now);
            let expected = if n % interval as usize == 0 {
                TimerMode::LongBreak
            } else {
                TimerMode::ShortBreak
            };
            prop_assert_eq!(brk, expected);
            prop_assert_eq!(finish_interval(&mut timer, &mut now), TimerMode::Focus);
        }
        prop_assert_eq!(timer.snapshot().total_focus_completed as usize, focus_count);
    }

    #[test]
    fn countdown_never_goes_below_one_while_running(ticks in 0u32..400) {
        let mut timer = IntervalTimer::new(TimerConfig::new(1, 2, 3, 2));
        let start = Utc.with_ymd_and_hms(2026, 1, 5, 8, 0, 0).unwrap();
        timer.start(start, TaskBinding::Keep);
        for i in 0..ticks {
            timer.tick(start + Duration::seconds(i64::from(i) + 1));
            prop_assert!(timer.time_left_secs() >= 1);
            prop_assert!(timer.is_running());
        }
    }
}
