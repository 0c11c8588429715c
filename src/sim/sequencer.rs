/// One of the two cell-state buffers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferId {
    A,
    B,
}

impl BufferId {
    pub fn index(self) -> usize {
        match self {
            BufferId::A => 0,
            BufferId::B => 1,
        }
    }
    pub fn other(self) -> BufferId {
        match self {
            BufferId::A => BufferId::B,
            BufferId::B => BufferId::A,
        }
    }
}

/// The (source, destination) pair for a single compute dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Roles {
    pub read: BufferId,
    pub write: BufferId,
}

impl Roles {
    pub fn for_step(step: u64) -> Roles {
        let read = if step % 2 == 0 { BufferId::A } else { BufferId::B };
        Roles {
            read,
            write: read.other(),
        }
    }
}

/// Tracks the simulation step and derives buffer roles from its parity.
///
/// The sequencer never touches buffer contents; it only hands out labels.
#[derive(Clone, Debug, Default)]
pub struct StepSequencer {
    step: u64,
}

impl StepSequencer {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn step(&self) -> u64 {
        self.step
    }
    pub fn current_roles(&self) -> Roles {
        Roles::for_step(self.step)
    }
    pub fn advance(&mut self) {
        self.step += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_zero_reading_a() {
        let seq = StepSequencer::new();
        assert_eq!(seq.step(), 0);
        assert_eq!(
            seq.current_roles(),
            Roles {
                read: BufferId::A,
                write: BufferId::B
            }
        );
    }

    #[test]
    fn roles_swap_every_step_with_period_two() {
        for step in 0..64 {
            let now = Roles::for_step(step);
            let next = Roles::for_step(step + 1);
            assert_ne!(now, next);
            assert_eq!(now.read, next.write);
            assert_eq!(now, Roles::for_step(step + 2));
        }
    }

    #[test]
    fn source_never_aliases_destination() {
        let mut seq = StepSequencer::new();
        for _ in 0..100 {
            let roles = seq.current_roles();
            assert_ne!(roles.read, roles.write);
            seq.advance();
        }
        assert_eq!(seq.step(), 100);
    }

    #[test]
    fn current_roles_has_no_side_effects() {
        let seq = StepSequencer::new();
        let first = seq.current_roles();
        let second = seq.current_roles();
        assert_eq!(first, second);
        assert_eq!(seq.step(), 0);
    }
}
