//! Stoppable game clock.
//!
//! Wall ticks come from the windowing backend (milliseconds); the clock
//! subtracts every stopped interval so that `ticks()` freezes while time is
//! stopped and resumes without a jump. Pausing the game stops the clock the
//! same way, which is what keeps time-based commands from advancing across a
//! pause.

#[derive(Debug, Clone)]
pub struct Clock {
    start_time: i64,
    time_stop: bool,
    stop_start_time: i64,
    total_stopped_time: i64,
}

impl Clock {
    /// Create a clock starting at the given wall tick.
    pub fn new(wall: i64) -> Self {
        Self {
            start_time: wall,
            time_stop: false,
            stop_start_time: 0,
            total_stopped_time: 0,
        }
    }

    /// Game ticks: wall ticks minus all stopped time.
    pub fn ticks(&self, wall: i64) -> i64 {
        let stopped_time = self.total_stopped_time
            + if self.time_stop {
                wall - self.stop_start_time
            } else {
                0
            };
        wall - self.start_time - stopped_time
    }

    pub fn stopped(&self) -> bool {
        self.time_stop
    }

    pub fn stop_time(&mut self, wall: i64) {
        if self.time_stop {
            return;
        }
        self.time_stop = true;
        self.stop_start_time = wall;
    }

    pub fn resume_time(&mut self, wall: i64) {
        if !self.time_stop {
            return;
        }
        self.time_stop = false;
        self.total_stopped_time += wall - self.stop_start_time;
    }

    /// Total unscaled seconds of game time.
    pub fn seconds(&self, wall: i64) -> i64 {
        self.ticks(wall) / 1000
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticks_advance_with_wall() {
        let clock = Clock::new(1000);
        assert_eq!(clock.ticks(1000), 0);
        assert_eq!(clock.ticks(1500), 500);
    }

    #[test]
    fn test_stop_freezes_ticks() {
        let mut clock = Clock::new(0);
        clock.stop_time(200);
        assert_eq!(clock.ticks(200), 200);
        assert_eq!(clock.ticks(900), 200);
    }

    #[test]
    fn test_resume_excludes_stopped_interval() {
        let mut clock = Clock::new(0);
        clock.stop_time(200);
        clock.resume_time(700);
        assert_eq!(clock.ticks(700), 200);
        assert_eq!(clock.ticks(1000), 500);
    }

    #[test]
    fn test_double_stop_is_noop() {
        let mut clock = Clock::new(0);
        clock.stop_time(100);
        clock.stop_time(400);
        clock.resume_time(500);
        assert_eq!(clock.ticks(500), 100);
    }

    #[test]
    fn test_seconds() {
        let clock = Clock::new(0);
        assert_eq!(clock.seconds(2500), 2);
    }
}
