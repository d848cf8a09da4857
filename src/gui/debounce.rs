/// Generation counter for debounced dispatch (timer-reset pattern).
///
/// Every input change arms a fresh generation and schedules a delayed message
/// carrying it. When a delayed message arrives, only the newest generation is
/// still current; older timers have been superseded and their messages are
/// dropped, so rapid changes coalesce into a single dispatch.
#[derive(Debug, Default)]
pub struct Debounce {
    generation: u64,
}

impl Debounce {
    pub fn arm(&mut self) -> u64 {
        self.generation = self.generation.wrapping_add(1);
        self.generation
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_trigger_fires() {
        let mut debounce = Debounce::default();
        let generation = debounce.arm();
        assert!(debounce.is_current(generation));
    }

    #[test]
    fn rapid_triggers_coalesce_to_the_last_one() {
        let mut debounce = Debounce::default();
        let first = debounce.arm();
        let second = debounce.arm();
        let last = debounce.arm();

        assert!(!debounce.is_current(first));
        assert!(!debounce.is_current(second));
        assert!(debounce.is_current(last));
    }
}
