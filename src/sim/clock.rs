/// Converts host frame callbacks into simulation steps.
///
/// At most one step is due per frame. Time owed beyond `max_backlog`
/// periods is dropped so a stalled host does not trigger a catch-up burst.
#[derive(Clone, Debug)]
pub struct TickClock {
    /// Ticks per second. `None` steps on every frame.
    tick_rate: Option<f64>,
    /// Seconds of simulation time owed
    accumulated: f64,
    last_frame_ms: Option<f64>,
    max_backlog: u32,
}

impl TickClock {
    pub fn new(tick_rate: Option<f32>) -> Self {
        Self {
            tick_rate: tick_rate.filter(|r| *r > 0.0).map(f64::from),
            accumulated: 0.0,
            last_frame_ms: None,
            max_backlog: 2,
        }
    }

    pub fn tick_rate(&self) -> Option<f64> {
        self.tick_rate
    }

    /// Record a frame at `now_ms` and report whether a step is due.
    /// The first frame is always due.
    pub fn due(&mut self, now_ms: f64) -> bool {
        let Some(last) = self.last_frame_ms.replace(now_ms) else {
            return true;
        };
        let Some(rate) = self.tick_rate else {
            return true;
        };
        let period = rate.recip();
        self.accumulated += ((now_ms - last) / 1000.0).max(0.0);
        self.accumulated = self.accumulated.min(period * self.max_backlog as f64);
        if self.accumulated >= period {
            self.accumulated -= period;
            true
        } else {
            false
        }
    }
}

/// Measures the achieved tick rate over a fixed window.
#[derive(Clone, Debug)]
pub struct RateMeter {
    window_ms: f64,
    window_start: Option<f64>,
    ticks: u32,
}

impl Default for RateMeter {
    fn default() -> Self {
        Self::new(2000.0)
    }
}

impl RateMeter {
    pub fn new(window_ms: f64) -> Self {
        Self {
            window_ms,
            window_start: None,
            ticks: 0,
        }
    }

    /// Count `ticks` at `now_ms`. Returns `(ticks per second, ticks, seconds)`
    /// once a window has elapsed, then starts a new one.
    pub fn record(&mut self, now_ms: f64, ticks: u32) -> Option<(f64, u32, f64)> {
        let start = *self.window_start.get_or_insert(now_ms);
        self.ticks += ticks;
        let elapsed_ms = now_ms - start;
        if elapsed_ms < self.window_ms {
            return None;
        }
        let seconds = elapsed_ms / 1000.0;
        let ticks = std::mem::take(&mut self.ticks);
        self.window_start = Some(now_ms);
        Some((ticks as f64 / seconds, ticks, seconds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uncapped_clock_is_always_due() {
        let mut clock = TickClock::new(None);
        assert!((0..5).all(|i| clock.due(i as f64)));
    }

    #[test]
    fn zero_rate_means_uncapped() {
        assert_eq!(TickClock::new(Some(0.0)).tick_rate(), None);
    }

    #[test]
    fn first_frame_is_due() {
        let mut clock = TickClock::new(Some(5.0));
        assert!(clock.due(1000.0));
        assert!(!clock.due(1016.0));
    }

    #[test]
    fn steps_once_per_period() {
        // 5 ticks/s at 60 fps: roughly one step every 12 frames
        let mut clock = TickClock::new(Some(5.0));
        let frame = 1000.0 / 60.0;
        let steps = (0..=600).filter(|i| clock.due(*i as f64 * frame)).count();
        // first frame plus ten seconds at 5/s
        assert!((49..=51).contains(&steps), "{steps}");
    }

    #[test]
    fn stall_does_not_cause_a_burst() {
        let mut clock = TickClock::new(Some(10.0));
        assert!(clock.due(0.0));
        assert!(clock.due(10_000.0));
        // backlog is capped at two periods
        assert!(clock.due(10_001.0));
        assert!(!clock.due(10_002.0));
    }

    #[test]
    fn meter_reports_once_per_window() {
        let mut meter = RateMeter::new(2000.0);
        assert_eq!(meter.record(0.0, 1), None);
        assert_eq!(meter.record(1000.0, 9), None);
        let (rate, ticks, secs) = meter.record(2000.0, 10).unwrap();
        assert_eq!(ticks, 20);
        assert_eq!(secs, 2.0);
        assert_eq!(rate, 10.0);
        assert_eq!(meter.record(2500.0, 1), None);
    }
}
